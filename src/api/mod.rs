//! Purpose: Define the public Rust API boundary for the worker library.
//! Exports: Reader, readiness, record, and error types used by the CLI and tests.
//! Role: Additive-only surface; hides internal module layout.
//! Invariants: Internal modules remain private and are not directly exposed.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
#[cfg(unix)]
pub use crate::core::readiness::wait_fd;
pub use crate::core::readiness::{AlwaysReady, ReadySource, WaitOutcome};
pub use crate::core::reader::{DEFAULT_IDLE_TIMEOUT, EndReason, InputReader, ReadOutcome};
pub use crate::core::record::InputRecord;
