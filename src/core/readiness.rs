//! Purpose: Block until an input source has bytes to read, bounded by a timeout.
//! Exports: `ReadySource`, `WaitOutcome`, `AlwaysReady`, `wait_fd` (unix).
//! Role: The only suspension point besides the line read itself.
//! Invariants: A wait never blocks longer than its timeout (modulo scheduling).
//! Invariants: Hang-up and error conditions report `Ready`; the following read surfaces them.
//! Invariants: `EINTR` retries with the remaining time instead of failing or restarting the clock.

use std::fs::File;
use std::io::{self, Read};
use std::time::Duration;

#[cfg(unix)]
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
#[cfg(unix)]
use std::time::Instant;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
}

/// A byte source that can report read readiness without consuming input.
pub trait ReadySource {
    fn wait_ready(&self, timeout: Duration) -> io::Result<WaitOutcome>;
}

/// Wraps a source that never blocks (in-memory buffers, already-drained pipes).
#[derive(Clone, Debug)]
pub struct AlwaysReady<R>(pub R);

impl<R: Read> Read for AlwaysReady<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R> ReadySource for AlwaysReady<R> {
    fn wait_ready(&self, _timeout: Duration) -> io::Result<WaitOutcome> {
        Ok(WaitOutcome::Ready)
    }
}

#[cfg(unix)]
pub fn wait_fd(fd: BorrowedFd<'_>, timeout: Duration) -> io::Result<WaitOutcome> {
    let deadline = Instant::now().checked_add(timeout);
    loop {
        let remaining = match deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => timeout,
        };
        let mut pollfd = libc::pollfd {
            fd: fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let rc = unsafe { libc::poll(&mut pollfd, 1, poll_timeout_millis(remaining)) };
        if rc == 0 {
            // A single poll is capped at c_int::MAX ms; keep waiting until the real deadline.
            if deadline_passed(deadline, Instant::now()) {
                return Ok(WaitOutcome::TimedOut);
            }
            continue;
        }
        if rc > 0 {
            if pollfd.revents & libc::POLLNVAL != 0 {
                return Err(io::Error::from_raw_os_error(libc::EBADF));
            }
            return Ok(WaitOutcome::Ready);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            continue;
        }
        return Err(err);
    }
}

// `None` means the deadline overflowed `Instant`, i.e. wait forever.
#[cfg(unix)]
fn deadline_passed(deadline: Option<Instant>, now: Instant) -> bool {
    deadline.is_some_and(|deadline| now >= deadline)
}

// Rounds up so sub-millisecond remainders still wait instead of busy-looping.
#[cfg(unix)]
fn poll_timeout_millis(timeout: Duration) -> libc::c_int {
    let millis = timeout.as_nanos().div_ceil(1_000_000);
    millis.min(libc::c_int::MAX as u128) as libc::c_int
}

#[cfg(unix)]
impl ReadySource for File {
    fn wait_ready(&self, timeout: Duration) -> io::Result<WaitOutcome> {
        wait_fd(self.as_fd(), timeout)
    }
}

#[cfg(unix)]
impl ReadySource for UnixStream {
    fn wait_ready(&self, timeout: Duration) -> io::Result<WaitOutcome> {
        wait_fd(self.as_fd(), timeout)
    }
}

// No portable readiness primitive for anonymous pipes here; reads simply block.
#[cfg(not(unix))]
impl ReadySource for File {
    fn wait_ready(&self, _timeout: Duration) -> io::Result<WaitOutcome> {
        Ok(WaitOutcome::Ready)
    }
}
