use anyhow::{Context, Result};
use cdn_log_processor::config::resolve_timezone;
use cdn_log_processor::log_reader::LogFileReader;
use cdn_log_processor::output::write_json_atomic;
use cdn_log_processor::progress_events::ProgressReporter;
use cdn_log_processor::summary::{FileSummary, Summary, SummaryReport};
use cdn_log_processor::LogParser;
use clap::Parser;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// CDN access log summary - transfer totals, cache status and expired tokens
#[derive(clap::Parser, Debug)]
#[command(name = "cdn_log_summary")]
#[command(about = "Decodes CDN access logs and reports transfer totals and expired tokens")]
struct Args {
    /// Access log files (plain, .gz or .zst)
    #[arg(required = true)]
    logs: Vec<PathBuf>,

    /// IANA time zone the log timestamps are written in. Without it, $TZ is used
    /// when it names an IANA zone, otherwise UTC; /etc/localtime is not consulted
    #[arg(long)]
    timezone: Option<String>,

    /// Also write the JSON summary to this path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print each decoded record as a JSON line
    #[arg(long)]
    emit_records: bool,

    /// Emit JSON progress events to stdout
    #[arg(short, long)]
    progress: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let reporter = ProgressReporter::new(args.progress, args.logs.len());
    reporter.emit_started();

    match run(&args, &reporter) {
        Ok(report) => {
            reporter.emit_complete(&format!(
                "Summarized {} records ({})",
                report.total.records_decoded, report.total.total_size
            ));
            Ok(())
        }
        Err(e) => {
            reporter.emit_failed(&format!("{:#}", e));
            Err(e)
        }
    }
}

fn run(args: &Args, reporter: &ProgressReporter) -> Result<SummaryReport> {
    let env_tz = std::env::var("TZ").ok();
    let timezone = resolve_timezone(args.timezone.as_deref(), env_tz.as_deref())?;
    let parser = LogParser::new(timezone).context("Failed to build access log parser")?;

    info!(files = args.logs.len(), timezone = %timezone, "Starting log summary");
    let started = Instant::now();

    let files = args
        .logs
        .par_iter()
        .map(|path| -> Result<FileSummary> {
            let summary = summarize_file(path, &parser, args.emit_records)?;
            reporter.file_finished(format!(
                "{}: {} records, {} rejected",
                path.display(),
                summary.records_decoded,
                summary.lines_rejected
            ));
            Ok(FileSummary {
                path: path.display().to_string(),
                summary,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let report = SummaryReport::new(timezone.name().to_string(), files);

    info!(
        records = report.total.records_decoded,
        rejected = report.total.lines_rejected,
        expired = report.total.tokens_expired,
        total_size = %report.total.total_size,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Log summary completed"
    );

    if let Some(output) = &args.output {
        write_json_atomic(output, &report)?;
        info!(path = %output.display(), "Wrote summary");
    }

    println!("{}", serde_json::to_string(&report)?);
    Ok(report)
}

fn summarize_file(path: &Path, parser: &LogParser, emit_records: bool) -> Result<Summary> {
    let mut reader = LogFileReader::open(path)?;
    let mut summary = Summary::new();
    let mut line = String::new();
    let mut line_number: u64 = 0;

    info!(path = %path.display(), "Reading log file");

    while reader.next_line(&mut line)? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        let decoded = parser.decode(&line);
        match &decoded {
            Ok(record) if emit_records => println!("{}", serde_json::to_string(record)?),
            Ok(_) => {}
            Err(e) => debug!(path = %reader.path().display(), line_number, error = %e, "Skipping line"),
        }

        if let Err(e) = summary.observe(&decoded) {
            warn!(path = %reader.path().display(), line_number, error = %e, "Token expiry check failed");
        }
    }

    info!(
        path = %path.display(),
        lines = summary.lines_read,
        rejected = summary.lines_rejected,
        total_size = %summary.total_size,
        "Finished log file"
    );

    Ok(summary)
}
