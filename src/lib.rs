//! Purpose: Library crate behind the `contactbench` CLI and its tests.
//! Exports: `api` (public surface), `contact`, `source`, `migrate`, `bench`, `report`, `core`.
//! Role: Contact normalization, the indexed contact store, and timing harnesses.
//! Invariants: Library code never installs a tracing subscriber or writes to stdout.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod bench;
pub mod contact;
pub mod core;
pub mod migrate;
pub mod report;
pub mod source;
