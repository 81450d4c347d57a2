//! Purpose: `contactbench` CLI entry point.
//! Role: Binary crate root; parses args, installs logging, delegates to command dispatch.
//! Invariants: Status lines and results go to stdout; diagnostics and logs go to stderr.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: All store access goes through `api::ContactStore` (lock + log replay).
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::future::Future;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use clap::{
    CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod store_info_json;
mod store_paths;

use contactbench::api::{
    ContactStore, Durability, Error, ErrorKind, SortField, SortHint, SortOrder, StatusLine,
    StoreOptions, status_json, to_exit_code,
};
use store_paths::{StoreNameResolveError, default_store_dir, resolve_named_store_path};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Internal)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome { exit_code });
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `contactbench --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing();

    let color_mode = cli.color;
    let context = match StoreContext::from_cli(&cli) {
        Ok(context) => context,
        Err(err) => return Err((err, color_mode)),
    };

    command_dispatch::dispatch_command(cli.command, context)
        .map_err(add_store_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "contactbench",
    version,
    about = "Migrate contacts into an indexed local store and time ordered scans",
    long_about = None,
    after_help = r#"EXAMPLES
  $ contactbench check-source contacts.jsonl
  $ contactbench fill contacts.jsonl --clear
  $ contactbench scan
  $ contactbench bench contacts.jsonl --scans 5 --format both
  $ contactbench info

NOTES
  - Default store: ~/.contactbench/stores/contacts.store (override with --dir/--store)
  - Contact files are a JSON array or JSON Lines of raw contacts
  - Set RUST_LOG=info to see engine events on stderr"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        env = "CONTACTBENCH_DIR",
        help = "Store directory (default: ~/.contactbench/stores)",
        value_hint = ValueHint::DirPath
    )]
    dir: Option<PathBuf>,
    #[arg(
        long,
        env = "CONTACTBENCH_STORE",
        default_value = "contacts",
        help = "Store name inside --dir"
    )]
    store: String,
    #[arg(long, default_value = "fast", help = "Durability mode: fast|flush")]
    durability: String,
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SortByArg {
    GivenName,
    FamilyName,
    None,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SortOrderArg {
    Ascending,
    Descending,
}

#[derive(clap::Args, Clone, Copy, Debug)]
struct HintArgs {
    #[arg(long, value_enum, default_value = "given-name", help = "Order requested from the source")]
    sort_by: SortByArg,
    #[arg(long, value_enum, default_value = "ascending", help = "Direction for --sort-by")]
    sort_order: SortOrderArg,
}

impl HintArgs {
    fn hint(self) -> SortHint {
        SortHint {
            by: match self.sort_by {
                SortByArg::GivenName => Some(SortField::GivenName),
                SortByArg::FamilyName => Some(SortField::FamilyName),
                SortByArg::None => None,
            },
            order: match self.sort_order {
                SortOrderArg::Ascending => SortOrder::Ascending,
                SortOrderArg::Descending => SortOrder::Descending,
            },
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Enumerate a contact file and normalize every entry without storing",
        after_help = r#"EXAMPLES
  $ contactbench check-source contacts.jsonl
  $ contactbench check-source contacts.json --sort-by family-name --sort-order descending"#
    )]
    CheckSource {
        #[arg(help = "Contact file (JSON array or JSON Lines)", value_hint = ValueHint::FilePath)]
        source: PathBuf,
        #[command(flatten)]
        hint: HintArgs,
    },
    #[command(
        about = "Normalize a contact file into the store, one insert at a time",
        after_help = r#"NOTES
  - Fails on the first duplicate id; the error reports how many contacts were stored
  - Use --clear to start from an empty store"#
    )]
    Fill {
        #[arg(help = "Contact file (JSON array or JSON Lines)", value_hint = ValueHint::FilePath)]
        source: PathBuf,
        #[arg(long, help = "Clear the store before filling")]
        clear: bool,
        #[command(flatten)]
        hint: HintArgs,
    },
    #[command(about = "Walk the store in sort-key order and time it")]
    Scan {
        #[arg(long, help = "Print each contact as JSON after the timing lines")]
        list: bool,
    },
    #[command(about = "Remove every contact from the store")]
    Clear,
    #[command(
        about = "Run clear, fill, and repeated scans; report JSON and/or a table",
        after_help = r#"NOTES
  - JSON goes to stdout; the table goes to stderr
  - Status lines are suppressed unless RUST_LOG=info"#
    )]
    Bench {
        #[arg(help = "Contact file (JSON array or JSON Lines)", value_hint = ValueHint::FilePath)]
        source: PathBuf,
        #[arg(long, default_value_t = 3, help = "Number of ordered scans")]
        scans: u32,
        #[arg(long, default_value = "json", help = "Output format: json|table|both")]
        format: String,
        #[command(flatten)]
        hint: HintArgs,
    },
    #[command(about = "Show store path, schema, and record count")]
    Info,
    #[command(about = "Generate shell completion scripts")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
    #[command(about = "Print version info")]
    Version,
}

/// Store location and options resolved from global flags.
struct StoreContext {
    name: String,
    path: PathBuf,
    options: StoreOptions,
}

impl StoreContext {
    fn from_cli(cli: &Cli) -> Result<Self, Error> {
        let dir = cli.dir.clone().unwrap_or_else(default_store_dir);
        let path = resolve_store_path(&cli.store, &dir)?;
        let options = StoreOptions::new().with_durability(parse_durability(&cli.durability)?);
        Ok(Self {
            name: cli.store.clone(),
            path,
            options,
        })
    }

    async fn open(&self) -> Result<ContactStore, Error> {
        ContactStore::open(&self.path, self.options).await
    }
}

fn resolve_store_path(name: &str, dir: &Path) -> Result<PathBuf, Error> {
    resolve_named_store_path(name, dir).map_err(|err| match err {
        StoreNameResolveError::Empty => Error::new(ErrorKind::Usage)
            .with_message("store name is empty")
            .with_hint("Pass a name like --store contacts."),
        StoreNameResolveError::ContainsPathSeparator => Error::new(ErrorKind::Usage)
            .with_message("store name must not contain '/'")
            .with_hint("Use --dir to choose the directory and --store for the file name."),
    })
}

fn parse_durability(input: &str) -> Result<Durability, Error> {
    match input.trim() {
        "fast" => Ok(Durability::Fast),
        "flush" => Ok(Durability::Flush),
        _ => Err(Error::new(ErrorKind::Usage)
            .with_message("invalid --durability (use fast|flush)")),
    }
}

fn block_on<F: Future>(future: F) -> Result<F::Output, Error> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to start runtime")
                .with_source(err)
        })?;
    Ok(runtime.block_on(future))
}

fn add_store_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::DuplicateKey => err.with_hint(
            "A contact with this id is already stored. Use `fill --clear` to start over.",
        ),
        ErrorKind::SourceEnumeration => {
            err.with_hint("Check the contact file: one JSON object per line, or a JSON array.")
        }
        ErrorKind::StoreIo => err.with_hint("I/O error. Check the path, filesystem, and disk space."),
        ErrorKind::Permission => err.with_hint(
            "Permission denied. Check directory permissions or use --dir to a writable location.",
        ),
        _ => err,
    }
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_BACKTRACE=1 and share command/context if it persists.",
    )
}

fn emit_version_output() {
    if io::stdout().is_terminal() {
        println!("contactbench {}", env!("CARGO_PKG_VERSION"));
    } else {
        emit_json(json!({
            "name": "contactbench",
            "version": env!("CARGO_PKG_VERSION"),
        }));
    }
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

/// Status lines: plain text on a terminal, one JSON object per line otherwise.
fn emit_status(line: &StatusLine) {
    if io::stdout().is_terminal() {
        println!("{line}");
    } else {
        emit_json(status_json(line));
    }
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Busy => "store is busy".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
        ErrorKind::SourceEnumeration => "contact source failed".to_string(),
        ErrorKind::StoreOpen => "failed to open store".to_string(),
        ErrorKind::DuplicateKey => "duplicate contact id".to_string(),
        ErrorKind::StoreIo => "store i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(key) = err.key() {
        inner.insert("key".to_string(), json!(key));
    }
    if let Some(count) = err.count() {
        inner.insert("count".to_string(), json!(count));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    if let Some(key) = err.key() {
        lines.push(format!(
            "{} {key}",
            colorize_label("key:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(count) = err.count() {
        lines.push(format!(
            "{} {count}",
            colorize_label("stored before failure:", use_color, AnsiColor::Yellow)
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
