//! Purpose: Define the per-line unit of work read from the input stream.
//! Exports: `InputRecord`.
//! Role: Typed view of `{"args": [...], "kwargs": {...}}` consumed by computations.
//! Invariants: Both fields are required; unknown extra fields are ignored.

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct InputRecord {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}
