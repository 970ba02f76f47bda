//! Property → signal lookup table
//!
//! The table is produced outside this crate (static parsing of vendor sources)
//! and supplied as JSON. It is loaded once and shared read-only across sessions.

pub mod json;
pub mod names;
pub mod table;

// Re-export key types for convenience
pub use names::extract_property_names;
pub use table::{Access, PropertyRecord, PropertyTable, TableStats};
