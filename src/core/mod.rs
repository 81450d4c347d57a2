// Storage engine: keyed records, secondary indexes, ordered cursors, and the on-disk log.
pub mod cursor;
pub mod error;
pub mod frame;
pub mod key;
pub mod schema;
pub mod store;
