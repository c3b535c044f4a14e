//! Purpose: `stdio-worker` CLI entry point.
//! Role: Binary crate root; parses args, wires stdin/stdout to the worker loop.
//! Invariants: stdout only carries computation results, one JSON value per line.
//! Invariants: Logs and errors go to stderr; errors are JSON when stderr is not a terminal.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Idle timeout and closed input both exit 0.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::time::Duration;

use clap::{Parser, ValueEnum, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

use stdio_worker::api::{Error, ErrorKind, to_exit_code};
use stdio_worker::compute::{Builtin, BuiltinOptions, Computation};
use stdio_worker::driver::{WorkerConfig, run_worker, stdin_source};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
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
            ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                return Ok(RunOutcome::with_code(0));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `stdio-worker --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    init_tracing();
    serve(cli).map_err(|err| (err, color_mode))
}

#[derive(Debug, Parser)]
#[command(
    name = "stdio-worker",
    version,
    about = "Apply a function to JSON calls read from stdin, one result per line",
    long_about = None,
    after_help = r#"PROTOCOL
  stdin:  one call per line, {"args": [...], "kwargs": {...}}
  stdout: one JSON result per line, flushed after every call

The worker exits when stdin closes or when no input arrives within --timeout.

EXAMPLES
  $ echo '{"args":[3],"kwargs":{}}' | stdio-worker --warmup 0
  4
  $ stdio-worker --function offset --timeout 30s
  $ RUST_LOG=info stdio-worker --function count"#
)]
struct Cli {
    #[arg(
        long,
        default_value = "5s",
        value_parser = parse_duration,
        help = "Stop after this long without input (e.g. 500ms, 5s, 0.1)"
    )]
    timeout: Duration,
    #[arg(
        long,
        default_value = "5s",
        value_parser = parse_duration,
        help = "Startup delay before the first read, emulating one-time setup"
    )]
    warmup: Duration,
    #[arg(
        long,
        value_enum,
        default_value = "increment",
        help = "Function applied to each call"
    )]
    function: FunctionCli,
    #[arg(
        long = "load-delay",
        default_value = "2s",
        value_parser = parse_duration,
        help = "Model load time for --function offset"
    )]
    load_delay: Duration,
    #[arg(
        long,
        value_enum,
        default_value = "auto",
        help = "Colorize error output on a terminal: auto|always|never"
    )]
    color: ColorMode,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum FunctionCli {
    /// x + 1
    Increment,
    /// x + load(model_id), caching the last model
    Offset,
    /// number of calls so far
    Count,
}

impl From<FunctionCli> for Builtin {
    fn from(value: FunctionCli) -> Self {
        match value {
            FunctionCli::Increment => Builtin::Increment,
            FunctionCli::Offset => Builtin::Offset,
            FunctionCli::Count => Builtin::Count,
        }
    }
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

fn serve(cli: Cli) -> Result<RunOutcome, Error> {
    let config = WorkerConfig {
        idle_timeout: cli.timeout,
        warmup: cli.warmup,
    };
    let options = BuiltinOptions {
        load_delay: cli.load_delay,
    };
    let mut computation = Builtin::from(cli.function).build(&options);
    tracing::info!(
        function = computation.name(),
        timeout_ms = config.idle_timeout.as_millis() as u64,
        "worker starting"
    );

    let source = stdin_source()?;
    let stdout = io::stdout();
    let summary = run_worker(source, stdout.lock(), &mut computation, &config)?;
    tracing::info!(records = summary.records, end = ?summary.end, "worker finished");
    Ok(RunOutcome::ok())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn parse_duration(input: &str) -> Result<Duration, Error> {
    let invalid = || {
        Error::new(ErrorKind::Usage)
            .with_message("invalid duration")
            .with_hint("Use a number plus ms|s|m|h (e.g. 10s), or plain seconds (e.g. 0.5).")
    };
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }
    if let Ok(seconds) = trimmed.parse::<f64>() {
        return Duration::try_from_secs_f64(seconds).map_err(|_| invalid());
    }
    let split = trimmed.char_indices().find(|(_, ch)| !ch.is_ascii_digit());
    let (num_str, unit) = match split {
        Some((idx, _)) => trimmed.split_at(idx),
        None => ("", ""),
    };
    if num_str.is_empty() || unit.is_empty() {
        return Err(invalid());
    }
    let value: u64 = num_str.parse().map_err(|_| invalid())?;
    let millis = match unit {
        "ms" => value,
        "s" => value.saturating_mul(1_000),
        "m" => value.saturating_mul(60_000),
        "h" => value.saturating_mul(3_600_000),
        _ => return Err(invalid()),
    };
    Ok(Duration::from_millis(millis))
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

impl AnsiColor {
    fn paint(self, label: &str, enabled: bool) -> String {
        let code = match self {
            AnsiColor::Red => 31,
            AnsiColor::Yellow => 33,
        };
        if enabled {
            format!("\u{1b}[{code}m{label}\u{1b}[0m")
        } else {
            label.to_string()
        }
    }
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let stderr = io::stderr();
    let rendered = if stderr.is_terminal() {
        error_text(err, color_mode.use_color(true))
    } else {
        serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
            "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
        })
    };
    eprintln!("{rendered}");
}

fn error_message(err: &Error) -> &str {
    err.message().unwrap_or(match err.kind() {
        ErrorKind::Internal => "internal error",
        ErrorKind::Usage => "usage error",
        ErrorKind::Decode => "invalid input",
        ErrorKind::Compute => "computation failed",
        ErrorKind::Io => "i/o error",
    })
}

fn error_causes(err: &Error) -> Vec<String> {
    std::iter::successors(err.source(), |&cause| cause.source())
        .map(ToString::to_string)
        .collect()
}

// Optional context attached to an error, in display order.
fn error_details(err: &Error) -> Vec<(&'static str, Value)> {
    let mut details = Vec::new();
    if let Some(hint) = err.hint() {
        details.push(("hint", json!(hint)));
    }
    if let Some(line) = err.line() {
        details.push(("line", json!(line)));
    }
    if let Some(snippet) = err.snippet() {
        details.push(("snippet", json!(snippet)));
    }
    details
}

fn error_json(err: &Error) -> Value {
    let mut body = Map::new();
    body.insert("kind".into(), json!(format!("{:?}", err.kind())));
    body.insert("message".into(), json!(error_message(err)));
    body.extend(
        error_details(err)
            .into_iter()
            .map(|(key, value)| (key.to_string(), value)),
    );
    let causes = error_causes(err);
    if !causes.is_empty() {
        body.insert("causes".into(), json!(causes));
    }
    json!({ "error": body })
}

fn error_text(err: &Error, use_color: bool) -> String {
    let headline = format!(
        "{} {}",
        AnsiColor::Red.paint("error:", use_color),
        error_message(err)
    );
    let details = error_details(err).into_iter().map(|(key, value)| {
        let label = match key {
            "snippet" => "input:".to_string(),
            key => format!("{key}:"),
        };
        let text = match value {
            Value::String(text) => text,
            other => other.to_string(),
        };
        format!("{} {text}", AnsiColor::Yellow.paint(&label, use_color))
    });
    let causes = error_causes(err)
        .into_iter()
        .map(|cause| {
            format!(
                "{} {cause}",
                AnsiColor::Yellow.paint("caused by:", use_color)
            )
        });
    std::iter::once(headline)
        .chain(details)
        .chain(causes)
        .collect::<Vec<_>>()
        .join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    err.to_string()
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.strip_prefix("error:").unwrap_or(line).trim().to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}
