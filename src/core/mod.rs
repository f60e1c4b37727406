pub mod error;
pub mod normalize;
pub mod value;

pub use error::{GraphError, Result};
pub use normalize::{normalize, normalize_params};
pub use value::{Node, Params, Record, Value};
