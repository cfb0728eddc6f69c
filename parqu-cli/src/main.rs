use anyhow::Context;
use clap::{Parser, ValueEnum};
use parqu_core::{
    format_json, format_report, scan_path, Config, DetailLevel, ParqError, ScanOptions,
};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const EXIT_INTERRUPTED: u8 = 130;

// reject zero at parse time
fn parse_pool_size(s: &str) -> Result<usize, String> {
    let v: usize = s.parse().map_err(|_| format!("not a positive integer: {s}"))?;
    if v >= 1 {
        Ok(v)
    } else {
        Err("pool size must be at least 1".into())
    }
}

fn parse_detail(s: &str) -> Result<DetailLevel, String> {
    let v: u8 = s.parse().map_err(|_| format!("not a detail level: {s}"))?;
    DetailLevel::try_from(v).map_err(|e| e.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "UPPER")]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

#[derive(Parser)]
#[command(name = "parqu", version, about = "Print Parquet footer metadata for every matching file under a path")]
struct Cli {
    /// local path, file://, s3://, hdfs:// or webhdfs:// URI (file or directory)
    path: String,
    /// glob matched against file basenames
    #[arg(long)]
    inc: Option<String>,
    /// 0 = names only, 1 = summary, 2 = full metadata with column statistics
    #[arg(long, default_value = "1", value_parser = parse_detail)]
    details: DetailLevel,
    /// number of parallel workers
    #[arg(long, value_parser = parse_pool_size)]
    pool: Option<usize>,
    #[arg(long, value_enum, ignore_case = true, default_value = "ERROR")]
    log: LogLevel,
    /// descend into subdirectories
    #[arg(long)]
    recurse: bool,
    /// validate footer structure; structural problems become CorruptFileError
    #[arg(long)]
    check: bool,
    /// emit a JSON document instead of text
    #[arg(long)]
    json: bool,
}

fn init_tracing(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// first interrupt drains the pool; a second one abandons in-flight reads
fn interrupted_twice(flag: &AtomicBool) -> bool {
    flag.swap(true, Ordering::SeqCst)
}

fn run(cli: Cli, cancel: Arc<AtomicBool>) -> anyhow::Result<()> {
    let config = Config::load().context("cannot load configuration")?;
    let mut options = ScanOptions::from_config(&cli.path, &config);
    if let Some(pattern) = cli.inc {
        options.pattern = pattern;
    }
    if let Some(pool) = cli.pool {
        options.pool = pool;
    }
    options.recurse = cli.recurse;
    options.check = cli.check;
    options.detail = cli.details;
    tracing::debug!("scan options: {options:?}");

    let mut outcome = scan_path(&options, &config, Some(cancel))?;
    if outcome.skipped > 0 {
        tracing::warn!("{} directories could not be listed and were skipped", outcome.skipped);
    }
    let out = if cli.json {
        format_json(&mut outcome.results)?
    } else {
        format_report(&mut outcome.results, options.detail)
    };
    print!("{out}");
    if cli.json {
        println!();
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log);

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    let handler = move || {
        if interrupted_twice(&flag) {
            eprintln!("parqu: interrupted");
            std::process::exit(EXIT_INTERRUPTED.into());
        }
    };
    if let Err(e) = ctrlc::set_handler(handler) {
        tracing::warn!("cannot install interrupt handler: {e}");
    }

    match run(cli, cancel) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if matches!(e.downcast_ref::<ParqError>(), Some(ParqError::Interrupted)) => {
            eprintln!("parqu: interrupted");
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Err(e) => {
            eprintln!("parqu: {e:#}");
            ExitCode::FAILURE
        }
    }
}
