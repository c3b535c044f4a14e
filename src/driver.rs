//! Purpose: Drive one computation over a bounded stream of input records.
//! Exports: `WorkerConfig`, `RunSummary`, `run_worker`, `drive`, `stdin_source`, `DEFAULT_WARMUP`.
//! Role: Glue between `InputReader`, a `Computation`, and a line-oriented JSON writer.
//! Invariants: Exactly one output line per input record, flushed before the next read.
//! Invariants: The first decode, compute, or write error ends the run; nothing is skipped.
//! Invariants: Warm-up happens once, before the first read attempt.

use std::fs::File;
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use crate::compute::Computation;
use crate::core::error::{Error, ErrorKind};
use crate::core::readiness::ReadySource;
use crate::core::reader::{DEFAULT_IDLE_TIMEOUT, EndReason, InputReader, ReadOutcome};
use crate::core::record::InputRecord;

pub const DEFAULT_WARMUP: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WorkerConfig {
    pub idle_timeout: Duration,
    pub warmup: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            warmup: DEFAULT_WARMUP,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RunSummary {
    pub records: u64,
    pub end: EndReason,
}

pub fn run_worker<R, W, C>(
    source: R,
    writer: W,
    computation: &mut C,
    config: &WorkerConfig,
) -> Result<RunSummary, Error>
where
    R: Read + ReadySource,
    W: Write,
    C: Computation + ?Sized,
{
    if !config.warmup.is_zero() {
        info!(
            warmup_ms = config.warmup.as_millis() as u64,
            "warming up before reading input"
        );
        thread::sleep(config.warmup);
    }
    let mut inputs = InputReader::new(source, config.idle_timeout);
    drive(&mut inputs, writer, computation)
}

pub fn drive<R, W, C>(
    inputs: &mut InputReader<R, InputRecord>,
    mut writer: W,
    computation: &mut C,
) -> Result<RunSummary, Error>
where
    R: Read + ReadySource,
    W: Write,
    C: Computation + ?Sized,
{
    let mut records = 0u64;
    loop {
        let record = match inputs.next_record()? {
            ReadOutcome::Record(record) => record,
            ReadOutcome::Ended(end) => {
                match end {
                    EndReason::TimedOut => info!(
                        records,
                        timeout_ms = inputs.timeout().as_millis() as u64,
                        "no input before idle timeout; stopping"
                    ),
                    EndReason::Closed => info!(records, "input closed; stopping"),
                    EndReason::Failed => {}
                }
                return Ok(RunSummary { records, end });
            }
        };

        let line = inputs.lines_read();
        debug!(
            line,
            function = computation.name(),
            args = record.args.len(),
            kwargs = record.kwargs.len(),
            "calling"
        );
        let result = computation
            .call(&record.args, &record.kwargs)
            .map_err(|err| match err.line() {
                Some(_) => err,
                None => err.with_line(line),
            })?;
        write_json_line(&mut writer, &result)?;
        records += 1;
    }
}

fn write_json_line<W: Write>(writer: &mut W, payload: &Value) -> Result<(), Error> {
    serde_json::to_writer(&mut *writer, payload).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode result")
            .with_source(err)
    })?;
    writer.write_all(b"\n").map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write result")
            .with_source(err)
    })?;
    writer.flush().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to flush result")
            .with_source(err)
    })
}

/// Owned handle on the process stdin, bypassing the standard library's stdin buffer
/// so readiness checks see every unread byte.
pub fn stdin_source() -> Result<File, Error> {
    #[cfg(unix)]
    let owned = {
        use std::os::fd::AsFd;
        io::stdin().as_fd().try_clone_to_owned()
    };
    #[cfg(windows)]
    let owned = {
        use std::os::windows::io::AsHandle;
        io::stdin().as_handle().try_clone_to_owned()
    };
    owned.map(File::from).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to open stdin")
            .with_source(err)
    })
}
