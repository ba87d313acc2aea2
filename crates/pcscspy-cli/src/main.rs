use std::env;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{ArgAction, Parser};
use log::{debug, info};
use pcscspy_core::{
    DispatchError, OutputFormat, SessionError, TraceOptions, TraceSummary, decode_trace,
    decode_trace_file,
};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit ",
    env!("PCSCSPY_BUILD_COMMIT"),
    ", built ",
    env!("PCSCSPY_BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "pcsc-spy")]
#[command(version, long_version = LONG_VERSION)]
#[command(
    about = "Decode the PC/SC call trace written by the spy library.",
    long_about = None,
    after_help = "Examples:\n  pcsc-spy\n  pcsc-spy --color /tmp/pcsc-spy\n  pcsc-spy --json --stats trace.log\n  cat trace.log | pcsc-spy -"
)]
struct Cli {
    /// Trace to read: named pipe, regular file, or `-` for stdin
    /// [default: $HOME/pcsc-spy]
    #[arg(env = "PCSC_SPY_INPUT")]
    input: Option<PathBuf>,

    /// Highlight function names and failed calls with ANSI colors
    #[arg(long)]
    color: bool,

    /// Write one JSON object per call instead of text
    #[arg(long, conflicts_with = "color")]
    json: bool,

    /// Print per-function totals on stderr when the trace ends
    #[arg(long)]
    stats: bool,

    /// Skip unknown functions and stray lines instead of stopping
    #[arg(long)]
    keep_going: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(2)
        }
    }
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(format!("{err:#}"), None)
    }
}

impl From<DispatchError> for CliError {
    fn from(err: DispatchError) -> Self {
        let hint = match &err {
            DispatchError::Open { .. } => Some(
                "run the traced program with LD_PRELOAD=libpcscspy.so, or pass a trace file"
                    .to_string(),
            ),
            DispatchError::EmptyStream | DispatchError::WrongVersion { .. } => {
                Some("the input does not look like a pcsc-spy trace".to_string())
            }
            DispatchError::UnknownFunction { .. } | DispatchError::UnexpectedLine { .. } => {
                Some("use --keep-going to skip to the next call".to_string())
            }
            _ => None,
        };
        CliError::new(err.to_string(), hint)
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn default_input() -> PathBuf {
    match env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join("pcsc-spy"),
        None => PathBuf::from("/tmp").join("pcsc-spy"),
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let input = cli.input.unwrap_or_else(default_input);
    let options = TraceOptions {
        format: if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        },
        color: cli.color,
        keep_going: cli.keep_going,
    };
    debug!("options: {options:?}");

    let stdout = io::stdout().lock();
    let result = if input == Path::new("-") {
        info!("reading trace from stdin");
        decode_trace(io::stdin().lock(), stdout, &options)
    } else {
        info!("reading trace from {}", input.display());
        decode_trace_file(&input, stdout, &options)
    };

    let summary = match result {
        Ok(summary) => summary,
        Err(err) if is_broken_pipe(&err) => {
            debug!("stdout closed, stopping");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    if cli.stats {
        print_stats(&summary, cli.json)?;
    }
    Ok(())
}

fn is_broken_pipe(err: &DispatchError) -> bool {
    matches!(
        err,
        DispatchError::Session(SessionError::Output(io)) if io.kind() == ErrorKind::BrokenPipe
    )
}

fn print_stats(summary: &TraceSummary, json: bool) -> Result<(), CliError> {
    let mut stderr = io::stderr().lock();
    if json {
        let line = serde_json::to_string(summary).context("JSON serialization failed")?;
        writeln!(stderr, "{line}").context("failed to write stats")?;
        return Ok(());
    }

    let mut header = format!("{} calls", summary.calls);
    if summary.unknown_calls > 0 {
        header.push_str(&format!(", {} unknown", summary.unknown_calls));
    }
    if summary.skipped_lines > 0 {
        header.push_str(&format!(", {} lines skipped", summary.skipped_lines));
    }
    if summary.truncated {
        header.push_str(", last call truncated");
    }
    writeln!(stderr, "{header}").context("failed to write stats")?;

    for entry in &summary.functions {
        writeln!(
            stderr,
            "  {:<24} calls={} failures={} total={} max={}",
            entry.function,
            entry.calls,
            entry.failures,
            format_usec(entry.total_elapsed_usec),
            format_usec(entry.max_elapsed_usec),
        )
        .context("failed to write stats")?;
    }
    Ok(())
}

fn format_usec(usec: i64) -> String {
    let sign = if usec < 0 { "-" } else { "" };
    let usec = usec.unsigned_abs();
    format!("{sign}{}.{:06}", usec / 1_000_000, usec % 1_000_000)
}
