//! Purpose: Define the public Rust API boundary for contactbench.
//! Exports: Contact model, store handles, sources, migration, benchmarks, and errors.
//! Role: Additive-only surface used by the CLI and integration tests.
//! Invariants: Engine internals (frames, headers) stay behind this boundary.

pub use crate::bench::{
    BenchFormat, ClearReport, ScanReport, SourceReport, SuiteArgs, benchmark_clear,
    benchmark_scan, benchmark_source, run_suite, write_table,
};
pub use crate::contact::{
    ContactCursor, ContactField, ContactRecord, ContactStore, DisplayName, FAVORITES, RawContact,
    UNDEFINED, build_sort_key, classify, compare_groups, contact_schema, display_name,
    group_rank, has_name, normalize, to_ascii,
};
pub use crate::core::cursor::{Cursor, CursorEntry, Direction};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::key::{IndexKey, KeyRange, collate};
pub use crate::core::schema::{IndexSchema, StoreSchema, TableSchema};
pub use crate::core::store::{Durability, Store, StoreInfo, StoreOptions};
pub use crate::migrate::{MigrationReport, migrate, migrate_directory};
pub use crate::report::{ReportSink, StatusLine, TracingSink, status_json};
pub use crate::source::{
    ContactDirectory, ContactSource, JsonFileDirectory, JsonFileSource, MemoryDirectory,
    MemorySource, SortField, SortHint, SortOrder,
};
