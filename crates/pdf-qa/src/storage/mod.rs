//! Persistent storage: query records and uploaded documents

pub mod bucket;
pub mod query_table;

pub use bucket::{citation_link, DocumentBucket, ObjectInfo};
pub use query_table::QueryTable;
