//! Purpose: Pull decoded JSON lines from a byte source under an idle timeout.
//! Exports: `InputReader`, `ReadOutcome`, `EndReason`, `DEFAULT_IDLE_TIMEOUT`.
//! Role: Lazy, one-shot record sequence feeding the worker driver.
//! Invariants: Nothing is waited for or read until the caller asks for the next record.
//! Invariants: Once ended (timeout, close, or fatal error) the reader never yields again.
//! Invariants: Records come out in input order; malformed lines are fatal, never skipped.
//! Invariants: Buffered bytes bypass the readiness wait so already-read lines are not stranded.

use std::io::{BufRead, BufReader, Read};
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::time::Duration;

use bstr::ByteSlice;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_json::error::Category;

use crate::core::error::{Error, ErrorKind};
use crate::core::readiness::{ReadySource, WaitOutcome};

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_SNIPPET_BYTES: usize = 120;

/// Why a reader stopped producing records.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EndReason {
    /// No input became ready within the idle timeout.
    TimedOut,
    /// A read returned zero bytes.
    Closed,
    /// A read or decode error was returned to the caller.
    Failed,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ReadOutcome<T> {
    Record(T),
    Ended(EndReason),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ReaderState {
    Open,
    Ended(EndReason),
}

pub struct InputReader<R, T = Value> {
    reader: BufReader<R>,
    timeout: Duration,
    state: ReaderState,
    line: Vec<u8>,
    lines_read: u64,
    _record: PhantomData<fn() -> T>,
}

impl<R, T> InputReader<R, T>
where
    R: Read + ReadySource,
    T: DeserializeOwned,
{
    pub fn new(source: R, timeout: Duration) -> Self {
        Self {
            reader: BufReader::new(source),
            timeout,
            state: ReaderState::Open,
            line: Vec::new(),
            lines_read: 0,
            _record: PhantomData,
        }
    }

    pub fn with_default_timeout(source: R) -> Self {
        Self::new(source, DEFAULT_IDLE_TIMEOUT)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        match self.state {
            ReaderState::Open => None,
            ReaderState::Ended(reason) => Some(reason),
        }
    }

    /// Number of non-empty reads so far, including a line that failed to decode.
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    /// Wait up to the idle timeout for one line and decode it.
    pub fn next_record(&mut self) -> Result<ReadOutcome<T>, Error> {
        if let ReaderState::Ended(reason) = self.state {
            return Ok(ReadOutcome::Ended(reason));
        }

        if self.reader.buffer().is_empty() {
            match self.reader.get_ref().wait_ready(self.timeout) {
                Ok(WaitOutcome::Ready) => {}
                Ok(WaitOutcome::TimedOut) => return Ok(self.end(EndReason::TimedOut)),
                Err(err) => {
                    return Err(self.fail(
                        Error::new(ErrorKind::Io)
                            .with_message("failed to wait for input")
                            .with_source(err),
                    ));
                }
            }
        }

        self.line.clear();
        let read = match self.reader.read_until(b'\n', &mut self.line) {
            Ok(read) => read,
            Err(err) => {
                return Err(self.fail(
                    Error::new(ErrorKind::Io)
                        .with_message("failed to read input")
                        .with_source(err),
                ));
            }
        };
        if read == 0 {
            return Ok(self.end(EndReason::Closed));
        }
        self.lines_read += 1;

        match decode_line::<T>(&self.line, self.lines_read) {
            Ok(value) => Ok(ReadOutcome::Record(value)),
            Err(err) => Err(self.fail(err)),
        }
    }

    fn end(&mut self, reason: EndReason) -> ReadOutcome<T> {
        self.state = ReaderState::Ended(reason);
        ReadOutcome::Ended(reason)
    }

    fn fail(&mut self, err: Error) -> Error {
        self.state = ReaderState::Ended(EndReason::Failed);
        err
    }
}

impl<R, T> Iterator for InputReader<R, T>
where
    R: Read + ReadySource,
    T: DeserializeOwned,
{
    type Item = Result<T, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(ReadOutcome::Record(value)) => Some(Ok(value)),
            Ok(ReadOutcome::Ended(_)) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

impl<R, T> FusedIterator for InputReader<R, T>
where
    R: Read + ReadySource,
    T: DeserializeOwned,
{
}

fn decode_line<T: DeserializeOwned>(raw: &[u8], line_no: u64) -> Result<T, Error> {
    let body = strip_terminator(raw);
    let text = body.to_str().map_err(|err| {
        Error::new(ErrorKind::Decode)
            .with_message("input line is not valid utf-8")
            .with_line(line_no)
            .with_snippet(truncate_snippet(&body.to_str_lossy(), MAX_SNIPPET_BYTES))
            .with_source(err)
    })?;
    serde_json::from_str(text).map_err(|err| {
        let (message, hint) = match err.classify() {
            Category::Data => (
                "input line does not match the expected record shape",
                r#"Send one object per line: {"args": [...], "kwargs": {...}}."#,
            ),
            Category::Io | Category::Syntax | Category::Eof => (
                "invalid json input",
                "Each input line must hold exactly one JSON value.",
            ),
        };
        Error::new(ErrorKind::Decode)
            .with_message(message)
            .with_hint(hint)
            .with_line(line_no)
            .with_snippet(truncate_snippet(text, MAX_SNIPPET_BYTES))
            .with_source(err)
    })
}

fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn truncate_snippet(input: &str, max: usize) -> String {
    if input.len() <= max {
        return input.to_string();
    }
    let suffix = "...";
    if max <= suffix.len() {
        return suffix[..max].to_string();
    }
    let mut take = max - suffix.len();
    while !input.is_char_boundary(take) {
        take -= 1;
    }
    let mut snippet = String::with_capacity(take + suffix.len());
    snippet.push_str(&input[..take]);
    snippet.push_str(suffix);
    snippet
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::readiness::AlwaysReady;
    use crate::core::record::InputRecord;
    use serde_json::json;

    fn memory(input: &[u8]) -> InputReader<AlwaysReady<&[u8]>> {
        InputReader::new(AlwaysReady(input), Duration::from_millis(100))
    }

    #[test]
    fn yields_lines_in_order_then_closes() {
        let mut reader = memory(b"{\"a\":1}\n[2]\n\"three\"\n");
        let values: Vec<Value> = reader.by_ref().collect::<Result<_, _>>().expect("values");
        assert_eq!(values, vec![json!({"a": 1}), json!([2]), json!("three")]);
        assert_eq!(reader.end_reason(), Some(EndReason::Closed));
        assert_eq!(reader.lines_read(), 3);
    }

    #[test]
    fn empty_input_yields_nothing() {
        let mut reader = memory(b"");
        assert!(reader.next().is_none());
        assert_eq!(reader.end_reason(), Some(EndReason::Closed));
    }

    #[test]
    fn ended_reader_stays_ended() {
        let mut reader = memory(b"1\n");
        assert_eq!(
            reader.next_record().expect("first"),
            ReadOutcome::Record(json!(1))
        );
        assert_eq!(
            reader.next_record().expect("second"),
            ReadOutcome::Ended(EndReason::Closed)
        );
        assert_eq!(
            reader.next_record().expect("third"),
            ReadOutcome::Ended(EndReason::Closed)
        );
    }

    #[test]
    fn crlf_and_missing_final_newline_are_accepted() {
        let reader = memory(b"{\"x\":1}\r\n{\"x\":2}");
        let values: Vec<Value> = reader.collect::<Result<_, _>>().expect("values");
        assert_eq!(values, vec![json!({"x": 1}), json!({"x": 2})]);
    }

    #[test]
    fn malformed_line_is_fatal() {
        let mut reader = memory(b"{\"ok\":true}\nnot-json\n{\"never\":1}\n");
        assert_eq!(reader.next().expect("first").expect("ok"), json!({"ok": true}));

        let err = reader.next().expect("second").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(err.line(), Some(2));
        assert_eq!(err.snippet(), Some("not-json"));
        assert_eq!(err.message(), Some("invalid json input"));

        assert!(reader.next().is_none());
        assert_eq!(reader.end_reason(), Some(EndReason::Failed));
    }

    #[test]
    fn blank_line_is_malformed() {
        let mut reader = memory(b"\n");
        let err = reader.next().expect("item").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(err.line(), Some(1));
    }

    #[test]
    fn invalid_utf8_is_a_decode_error() {
        let mut reader = memory(b"\xff\xfe\n");
        let err = reader.next().expect("item").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(err.message(), Some("input line is not valid utf-8"));
    }

    #[test]
    fn typed_records_report_shape_errors() {
        let mut reader: InputReader<_, InputRecord> = InputReader::new(
            AlwaysReady(&b"{\"args\":[3],\"kwargs\":{}}\n{\"args\":3}\n"[..]),
            Duration::from_millis(100),
        );
        let first = reader.next().expect("first").expect("record");
        assert_eq!(first.args, vec![json!(3)]);

        let err = reader.next().expect("second").unwrap_err();
        assert_eq!(
            err.message(),
            Some("input line does not match the expected record shape")
        );
        assert!(err.hint().expect("hint").contains("kwargs"));
    }

    #[test]
    fn snippets_are_truncated_on_char_boundaries() {
        assert_eq!(truncate_snippet("short", 10), "short");
        assert_eq!(truncate_snippet("abcdefghij", 8), "abcde...");
        assert_eq!(truncate_snippet("ééééé", 6), "é...");
        assert_eq!(truncate_snippet("abcdef", 2), "..");
    }

    #[cfg(unix)]
    mod pipes {
        use super::*;
        use std::io::Write;
        use std::os::unix::net::UnixStream;
        use std::time::Instant;

        #[test]
        fn idle_source_times_out_promptly() {
            let (source, _writer) = UnixStream::pair().expect("pair");
            let mut reader: InputReader<_> = InputReader::new(source, Duration::from_millis(100));
            let start = Instant::now();
            assert!(reader.next().is_none());
            assert!(start.elapsed() < Duration::from_secs(2));
            assert_eq!(reader.end_reason(), Some(EndReason::TimedOut));
        }

        #[test]
        fn input_after_timeout_is_ignored() {
            let (source, mut writer) = UnixStream::pair().expect("pair");
            let mut reader: InputReader<_> = InputReader::new(source, Duration::from_millis(50));
            assert!(reader.next().is_none());

            writer.write_all(b"{\"late\":true}\n").expect("write");
            assert!(reader.next().is_none());
            assert_eq!(reader.end_reason(), Some(EndReason::TimedOut));
        }

        #[test]
        fn closed_after_k_lines_yields_exactly_k() {
            let (source, mut writer) = UnixStream::pair().expect("pair");
            writer.write_all(b"1\n2\n3\n").expect("write");
            drop(writer);

            let mut reader: InputReader<_> = InputReader::new(source, Duration::from_secs(5));
            let values: Vec<Value> = reader.by_ref().collect::<Result<_, _>>().expect("values");
            assert_eq!(values, vec![json!(1), json!(2), json!(3)]);
            assert_eq!(reader.end_reason(), Some(EndReason::Closed));
        }

        #[test]
        fn buffered_lines_do_not_wait_on_the_source() {
            let (source, mut writer) = UnixStream::pair().expect("pair");
            writer.write_all(b"1\n2\n").expect("write");

            let mut reader: InputReader<_> = InputReader::new(source, Duration::from_secs(30));
            let start = Instant::now();
            assert_eq!(reader.next().expect("first").expect("ok"), json!(1));
            assert_eq!(reader.next().expect("second").expect("ok"), json!(2));
            assert!(start.elapsed() < Duration::from_secs(5));
            drop(writer);
        }

        #[test]
        fn waits_lazily_for_each_record() {
            let (source, mut writer) = UnixStream::pair().expect("pair");
            let mut reader: InputReader<_> = InputReader::new(source, Duration::from_secs(5));

            writer.write_all(b"{\"n\":1}\n").expect("write");
            assert_eq!(reader.next().expect("first").expect("ok"), json!({"n": 1}));

            writer.write_all(b"{\"n\":2}\n").expect("write");
            assert_eq!(reader.next().expect("second").expect("ok"), json!({"n": 2}));

            drop(writer);
            assert!(reader.next().is_none());
            assert_eq!(reader.end_reason(), Some(EndReason::Closed));
        }
    }
}
