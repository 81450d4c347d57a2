//! Purpose: Hold top-level CLI command dispatch for `contactbench`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Each command opens the store at most once and drops it before returning.
//! Invariants: Scans never overlap a fill; commands run their steps sequentially.

use super::*;
use contactbench::api::{
    BenchFormat, ContactRecord, JsonFileDirectory, SuiteArgs, TracingSink, benchmark_clear,
    benchmark_scan, benchmark_source, migrate_directory, run_suite, write_table,
};
use store_info_json::store_info_json;

pub(super) fn dispatch_command(command: Command, context: StoreContext) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "contactbench", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_version_output();
            Ok(RunOutcome::ok())
        }
        Command::CheckSource { source, hint } => {
            let directory = JsonFileDirectory::new(source);
            let mut sink = |line: StatusLine| emit_status(&line);
            block_on(benchmark_source(&directory, hint.hint(), &mut sink))??;
            Ok(RunOutcome::ok())
        }
        Command::Fill {
            source,
            clear,
            hint,
        } => {
            let directory = JsonFileDirectory::new(source);
            block_on(async {
                let mut sink = |line: StatusLine| emit_status(&line);
                let store = context.open().await?;
                if clear {
                    benchmark_clear(&store, &mut sink).await?;
                }
                migrate_directory(&directory, hint.hint(), &store, &mut sink).await
            })??;
            Ok(RunOutcome::ok())
        }
        Command::Scan { list } => {
            block_on(async {
                let mut sink = |line: StatusLine| emit_status(&line);
                let store = context.open().await?;
                benchmark_scan(&store, &mut sink).await?;
                if list {
                    let mut cursor = store.scan_ordered().await?;
                    while let Some(record) = cursor.next().await? {
                        emit_json(record_json(&record)?);
                    }
                }
                Ok::<_, Error>(())
            })??;
            Ok(RunOutcome::ok())
        }
        Command::Clear => {
            block_on(async {
                let mut sink = |line: StatusLine| emit_status(&line);
                let store = context.open().await?;
                benchmark_clear(&store, &mut sink).await
            })??;
            Ok(RunOutcome::ok())
        }
        Command::Bench {
            source,
            scans,
            format,
            hint,
        } => {
            let format = BenchFormat::parse(&format)?;
            let directory = JsonFileDirectory::new(source);
            let args = SuiteArgs {
                scans,
                hint: hint.hint(),
            };
            let value = block_on(async {
                let store = context.open().await?;
                run_suite(&directory, &store, args, &mut TracingSink).await
            })??;
            if matches!(format, BenchFormat::Json | BenchFormat::Both) {
                emit_json(value.clone());
            }
            if matches!(format, BenchFormat::Table | BenchFormat::Both) {
                write_table(&value, &mut io::stderr().lock())?;
            }
            Ok(RunOutcome::ok())
        }
        Command::Info => {
            let info = block_on(async {
                let store = context.open().await?;
                Ok::<_, Error>(store.info().await)
            })??;
            emit_json(store_info_json(&context.name, &info));
            Ok(RunOutcome::ok())
        }
    }
}

fn record_json(record: &ContactRecord) -> Result<Value, Error> {
    serde_json::to_value(record).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode contact")
            .with_source(err)
    })
}
