// ============================================================================
// Result Decoding
// ============================================================================
//
// Rows come back as graph-native values. `flatten` turns them into plain
// trees, and `GraphRecord` types declared with `graph_record!` bind those
// trees field by field.
//
// ============================================================================

pub mod decode;
pub mod flatten;
mod macros;

pub use decode::{FromValue, GraphRecord, decode_rows};
pub use flatten::flatten;
