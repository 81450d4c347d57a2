// Benchmark harness for contact stores.
//
// Purpose:
// - Time the three operations that matter for a contact list: enumerating the source,
//   filling the store, and walking it in display order.
// - Emit machine-readable JSON and a human-readable table.
//
// Design notes:
// - Every timing is also reported as a status line so interactive runs show progress.
// - Suite rounds run back to back against one store; no concurrent writers during scans.

use std::collections::BTreeMap;
use std::io::Write;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde_json::{Value, json};
use tracing::{debug, info};

use crate::contact::{ContactStore, normalize};
use crate::core::error::{Error, ErrorKind};
use crate::migrate::migrate_directory;
use crate::report::{
    CLEAR_DONE, FIRST_CONTACT, FIRST_STORED, ReportSink, SCAN_DONE, SOURCE_DONE, StatusLine,
    elapsed_ms,
};
use crate::source::{ContactDirectory, ContactSource, SortField, SortHint, SortOrder};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BenchFormat {
    Json,
    Table,
    Both,
}

impl BenchFormat {
    pub fn parse(input: &str) -> Result<Self, Error> {
        match input.trim() {
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            "both" => Ok(Self::Both),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message("invalid --format (use json|table|both)")),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ScanReport {
    pub first_result_ms: Option<u64>,
    pub total_ms: u64,
    pub count: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SourceReport {
    pub first_result_ms: Option<u64>,
    pub total_ms: u64,
    pub count: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ClearReport {
    pub removed: u64,
    pub elapsed_ms: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct SuiteArgs {
    pub scans: u32,
    pub hint: SortHint,
}

impl Default for SuiteArgs {
    fn default() -> Self {
        Self {
            scans: 3,
            hint: SortHint::default(),
        }
    }
}

/// Walks the store in sort-key order and times the first record and the whole traversal.
/// The cursor is dropped before returning on every path.
pub async fn benchmark_scan<R: ReportSink>(
    store: &ContactStore,
    sink: &mut R,
) -> Result<ScanReport, Error> {
    let start = Instant::now();
    let mut cursor = store.scan_ordered().await.map_err(|err| scan_error(err, 0))?;
    let mut count = 0u64;
    let mut first_result_ms = None;
    while cursor
        .next()
        .await
        .map_err(|err| scan_error(err, count))?
        .is_some()
    {
        count += 1;
        if first_result_ms.is_none() {
            let elapsed = elapsed_ms(start);
            first_result_ms = Some(elapsed);
            sink.report(StatusLine::new(FIRST_STORED, count, elapsed));
        }
    }
    drop(cursor);

    let total_ms = elapsed_ms(start);
    sink.report(StatusLine::new(SCAN_DONE, count, total_ms));
    debug!(count, total_ms, "ordered scan finished");
    Ok(ScanReport {
        first_result_ms,
        total_ms,
        count,
    })
}

/// Enumerates the directory and normalizes each contact without storing anything.
pub async fn benchmark_source<D, R>(
    directory: &D,
    hint: SortHint,
    sink: &mut R,
) -> Result<SourceReport, Error>
where
    D: ContactDirectory,
    R: ReportSink,
{
    let start = Instant::now();
    let mut source = directory.enumerate(hint)?;
    let mut count = 0u64;
    let mut first_result_ms = None;
    while let Some(raw) = source
        .next_contact()
        .await
        .map_err(|err| err.with_count(count))?
    {
        std::hint::black_box(normalize(&raw));
        count += 1;
        if first_result_ms.is_none() {
            let elapsed = elapsed_ms(start);
            first_result_ms = Some(elapsed);
            sink.report(StatusLine::new(FIRST_CONTACT, count, elapsed));
        }
    }
    let total_ms = elapsed_ms(start);
    sink.report(StatusLine::new(SOURCE_DONE, count, total_ms));
    Ok(SourceReport {
        first_result_ms,
        total_ms,
        count,
    })
}

pub async fn benchmark_clear<R: ReportSink>(
    store: &ContactStore,
    sink: &mut R,
) -> Result<ClearReport, Error> {
    let start = Instant::now();
    let removed = store.clear().await?;
    let elapsed = elapsed_ms(start);
    sink.report(StatusLine::new(CLEAR_DONE, removed, elapsed));
    info!(removed, elapsed_ms = elapsed, "store cleared");
    Ok(ClearReport {
        removed,
        elapsed_ms: elapsed,
    })
}

/// Clear, migrate, then `args.scans` ordered scans. Returns the JSON report.
pub async fn run_suite<D, R>(
    directory: &D,
    store: &ContactStore,
    args: SuiteArgs,
    sink: &mut R,
) -> Result<Value, Error>
where
    D: ContactDirectory,
    R: ReportSink,
{
    let started = SystemTime::now();
    let mut results = Vec::new();

    let clear = benchmark_clear(store, sink).await?;
    results.push(result_entry("clear", clear.removed, clear.elapsed_ms, None));

    let fill = migrate_directory(directory, args.hint, store, sink).await?;
    results.push(result_entry(
        "migrate",
        fill.count,
        fill.elapsed_ms,
        fill.first_result_ms,
    ));

    let mut first_ms = Vec::new();
    let mut total_ms = Vec::new();
    for round in 0..args.scans {
        let scan = benchmark_scan(store, sink).await?;
        debug!(round, total_ms = scan.total_ms, "scan round");
        results.push(result_entry(
            "scan",
            scan.count,
            scan.total_ms,
            scan.first_result_ms,
        ));
        if let Some(first) = scan.first_result_ms {
            first_ms.push(first as f64);
        }
        total_ms.push(scan.total_ms as f64);
    }
    first_ms.sort_by(f64::total_cmp);
    total_ms.sort_by(f64::total_cmp);

    Ok(json!({
        "name": "contactbench",
        "version": env!("CARGO_PKG_VERSION"),
        "ts": rfc3339_now(started),
        "system": system_json(),
        "params": {
            "store": store.path().display().to_string(),
            "scans": args.scans,
            "sort_hint": hint_json(args.hint),
            "debug_build": cfg!(debug_assertions),
        },
        "results": results,
        "scan_latency": {
            "first_result_ms": latency_summary(&first_ms),
            "total_ms": latency_summary(&total_ms),
        },
    }))
}

pub fn write_table<W: Write>(value: &Value, out: &mut W) -> Result<(), Error> {
    let results = value
        .get("results")
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::new(ErrorKind::Internal).with_message("bench results missing"))?;

    writeln!(out, "contactbench (table)").map_err(table_error)?;
    writeln!(
        out,
        "{:>8}  {:>9}  {:>10}  {:>10}  {:>12}",
        "bench", "contacts", "first_ms", "total_ms", "ms/contact"
    )
    .map_err(table_error)?;

    for item in results {
        let bench = item.get("bench").and_then(|v| v.as_str()).unwrap_or("?");
        let contacts = item.get("contacts").and_then(|v| v.as_u64()).unwrap_or(0);
        let first = item
            .get("first_result_ms")
            .and_then(|v| v.as_u64())
            .map(|ms| ms.to_string())
            .unwrap_or_else(|| "-".to_string());
        let total = item.get("duration_ms").and_then(|v| v.as_u64()).unwrap_or(0);
        let per_contact = item
            .get("ms_per_contact")
            .and_then(|v| v.as_f64())
            .unwrap_or(f64::NAN);
        writeln!(
            out,
            "{bench:>8}  {contacts:>9}  {first:>10}  {total:>10}  {per_contact:>12.4}"
        )
        .map_err(table_error)?;
    }
    Ok(())
}

fn scan_error(err: Error, count: u64) -> Error {
    let err = if err.kind() == ErrorKind::StoreIo {
        err
    } else {
        Error::new(ErrorKind::StoreIo)
            .with_message("ordered scan failed")
            .with_source(err)
    };
    err.with_count(count)
}

fn table_error(err: std::io::Error) -> Error {
    Error::new(ErrorKind::Internal)
        .with_message("failed to write bench table")
        .with_source(err)
}

fn result_entry(bench: &str, contacts: u64, duration_ms: u64, first_result_ms: Option<u64>) -> Value {
    let per = if contacts == 0 { 1 } else { contacts } as f64;
    let secs = (duration_ms as f64 / 1000.0).max(1e-9);

    let mut map = BTreeMap::new();
    map.insert("bench".to_string(), json!(bench));
    map.insert("contacts".to_string(), json!(contacts));
    map.insert("duration_ms".to_string(), json!(duration_ms));
    map.insert("ms_per_contact".to_string(), json!(duration_ms as f64 / per));
    map.insert("contacts_per_sec".to_string(), json!(contacts as f64 / secs));
    if let Some(first) = first_result_ms {
        map.insert("first_result_ms".to_string(), json!(first));
    }
    Value::Object(map.into_iter().collect())
}

fn hint_json(hint: SortHint) -> Value {
    let by = hint.by.map(|field| match field {
        SortField::GivenName => "givenName",
        SortField::FamilyName => "familyName",
    });
    let order = match hint.order {
        SortOrder::Ascending => "ascending",
        SortOrder::Descending => "descending",
    };
    json!({ "sortBy": by, "sortOrder": order })
}

fn latency_summary(sorted_ms: &[f64]) -> Value {
    if sorted_ms.is_empty() {
        return json!({});
    }
    json!({
        "min": sorted_ms.first().copied().unwrap_or(0.0),
        "p50": quantile(sorted_ms, 0.50),
        "p95": quantile(sorted_ms, 0.95),
        "max": sorted_ms.last().copied().unwrap_or(0.0),
    })
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let clamped = q.clamp(0.0, 1.0);
    let idx = ((sorted.len() - 1) as f64 * clamped).round() as usize;
    sorted
        .get(idx)
        .copied()
        .unwrap_or_else(|| sorted[sorted.len() - 1])
}

fn system_json() -> Value {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    json!({
        "os": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "cpus": cpus,
    })
}

pub(crate) fn rfc3339_now(ts: SystemTime) -> String {
    let dur = ts.duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = dur.as_secs() as i64;
    let nsec = dur.subsec_nanos();
    let tm = time::OffsetDateTime::from_unix_timestamp(secs)
        .unwrap_or(time::OffsetDateTime::UNIX_EPOCH);
    let tm = tm.replace_nanosecond(nsec).unwrap_or(tm);
    tm.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
