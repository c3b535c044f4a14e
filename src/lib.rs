//! Purpose: Library crate behind the `stdio-worker` binary and its tests.
//! Exports: `api` (reader, records, errors), `compute` (computations), `driver` (run loop).
//! Role: Keeps the read/compute/write loop testable without spawning a process.
//! Invariants: No process-wide mutable state; callers own readers, caches, and counters.
//! Invariants: Core modules stay private; `api` is the supported path to them.
pub mod api;
pub mod compute;
mod core;
pub mod driver;
