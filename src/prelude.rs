//! Everything application code usually needs, in one import.
//!
//! ```
//! use graphtx::prelude::*;
//! ```

pub use crate::client::{Connector, RowCursor, collect_rows};
pub use crate::result::{FromValue, GraphRecord};
pub use crate::{
    Client, ConnectionConfig, Context, GraphError, Node, Params, Record, Result,
    TransactionOptions, Value, graph_record,
};
