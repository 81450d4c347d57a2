//! Purpose: Copy every contact from a directory into the store, normalized, in enumeration order.
//! Exports: `MigrationReport`, `migrate`, `migrate_directory`.
//! Role: The write path of the benchmark; the only caller of `ContactStore::insert` in bulk.
//! Invariants: At most one insert is in flight; the next pull waits for the prior insert.
//! Invariants: Any failure stops the run and carries the number already migrated.
//! Invariants: Already-inserted records are never rolled back.
use std::time::Instant;

use tracing::{info, warn};

use crate::contact::{ContactStore, normalize};
use crate::core::error::Error;
use crate::report::{FILL_DONE, FIRST_CONTACT, ReportSink, StatusLine, elapsed_ms};
use crate::source::{ContactDirectory, ContactSource, SortHint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    pub count: u64,
    pub elapsed_ms: u64,
    pub first_result_ms: Option<u64>,
}

/// Drains `source` into `store`. On error the returned `Error::count()` is the number of
/// records inserted before the failure.
pub async fn migrate<S, R>(
    source: &mut S,
    store: &ContactStore,
    sink: &mut R,
) -> Result<MigrationReport, Error>
where
    S: ContactSource,
    R: ReportSink,
{
    let start = Instant::now();
    info!(store = %store.path().display(), "migration started");
    let mut count = 0u64;
    let mut first_result_ms = None;
    loop {
        let raw = match source.next_contact().await {
            Ok(Some(raw)) => raw,
            Ok(None) => break,
            Err(err) => return Err(aborted(err, count)),
        };
        let record = normalize(&raw);
        if let Err(err) = store.insert(&record).await {
            return Err(aborted(err, count));
        }
        count += 1;
        if first_result_ms.is_none() {
            let elapsed = elapsed_ms(start);
            first_result_ms = Some(elapsed);
            sink.report(StatusLine::new(FIRST_CONTACT, count, elapsed));
        }
    }

    let elapsed = elapsed_ms(start);
    sink.report(StatusLine::new(FILL_DONE, count, elapsed));
    info!(count, elapsed_ms = elapsed, "migration finished");
    Ok(MigrationReport {
        count,
        elapsed_ms: elapsed,
        first_result_ms,
    })
}

/// Starts a fresh enumeration of `directory` and migrates it.
pub async fn migrate_directory<D, R>(
    directory: &D,
    hint: SortHint,
    store: &ContactStore,
    sink: &mut R,
) -> Result<MigrationReport, Error>
where
    D: ContactDirectory,
    R: ReportSink,
{
    let mut source = directory.enumerate(hint)?;
    migrate(&mut source, store, sink).await
}

fn aborted(err: Error, count: u64) -> Error {
    warn!(count, kind = ?err.kind(), "migration aborted");
    err.with_count(count)
}
