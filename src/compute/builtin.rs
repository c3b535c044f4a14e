//! Purpose: Built-in computations selectable from the command line.
//! Exports: `Builtin`, `BuiltinOptions`, `Increment`, `Offset`, `Count`, `DEFAULT_LOAD_DELAY`.
//! Role: Reference workloads for the worker loop, each owning its own state.
//! Invariants: `Offset` loads a model at most once per consecutive run of equal model ids.
//! Invariants: `Count` results are strictly increasing within one worker.

use std::thread;
use std::time::Duration;

use serde_json::{Map, Value, json};
use tracing::info;

use super::{Computation, Counter, SingleSlotCache, add, bind};
use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_LOAD_DELAY: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Builtin {
    Increment,
    Offset,
    Count,
}

#[derive(Clone, Copy, Debug)]
pub struct BuiltinOptions {
    pub load_delay: Duration,
}

impl Default for BuiltinOptions {
    fn default() -> Self {
        Self {
            load_delay: DEFAULT_LOAD_DELAY,
        }
    }
}

impl Builtin {
    pub fn build(self, options: &BuiltinOptions) -> Box<dyn Computation> {
        match self {
            Builtin::Increment => Box::new(Increment),
            Builtin::Offset => Box::new(Offset::new(options.load_delay)),
            Builtin::Count => Box::new(Count::default()),
        }
    }
}

/// `increment(x) = x + 1`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Increment;

impl Computation for Increment {
    fn name(&self) -> &str {
        "increment"
    }

    fn call(&mut self, args: &[Value], kwargs: &Map<String, Value>) -> Result<Value, Error> {
        let [x] = bind_array::<1>(self.name(), &["x"], args, kwargs)?;
        add(&x, &json!(1))
    }
}

/// `offset(model_id, x) = x + load(model_id)`, remembering only the last model.
#[derive(Debug)]
pub struct Offset {
    models: SingleSlotCache<Value, Value>,
    load_delay: Duration,
}

impl Offset {
    pub fn new(load_delay: Duration) -> Self {
        Self {
            models: SingleSlotCache::new(),
            load_delay,
        }
    }

    pub fn loads(&self) -> u64 {
        self.models.misses()
    }
}

impl Computation for Offset {
    fn name(&self) -> &str {
        "offset"
    }

    fn call(&mut self, args: &[Value], kwargs: &Map<String, Value>) -> Result<Value, Error> {
        let [model_id, x] = bind_array::<2>(self.name(), &["model_id", "x"], args, kwargs)?;
        let load_delay = self.load_delay;
        let weights = self
            .models
            .get_or_try_insert_with(model_key(&model_id), |_| {
                info!(%model_id, delay_ms = load_delay.as_millis() as u64, "loading model");
                if !load_delay.is_zero() {
                    thread::sleep(load_delay);
                }
                Ok::<_, Error>(model_id)
            })?
            .clone();
        add(&x, &weights)
    }
}

/// `count()` returns how many times it has been called, starting at 1.
#[derive(Clone, Copy, Debug, Default)]
pub struct Count {
    counter: Counter,
}

impl Computation for Count {
    fn name(&self) -> &str {
        "count"
    }

    fn call(&mut self, args: &[Value], kwargs: &Map<String, Value>) -> Result<Value, Error> {
        bind(self.name(), &[], args, kwargs)?;
        Ok(json!(self.counter.increase()))
    }
}

// Ids compare by numeric value, so `2` and `2.0` name the same model.
fn model_key(model_id: &Value) -> Value {
    let Value::Number(number) = model_id else {
        return model_id.clone();
    };
    match number.as_f64() {
        Some(float)
            if number.is_f64()
                && float.fract() == 0.0
                && float >= i64::MIN as f64
                && float < i64::MAX as f64 =>
        {
            json!(float as i64)
        }
        _ => model_id.clone(),
    }
}

fn bind_array<const N: usize>(
    function: &str,
    params: &[&str; N],
    args: &[Value],
    kwargs: &Map<String, Value>,
) -> Result<[Value; N], Error> {
    let bound = bind(function, params, args, kwargs)?;
    <[Value; N]>::try_from(bound).map_err(|bound| {
        Error::new(ErrorKind::Internal).with_message(format!(
            "{function}(): bound {} values for {N} parameters",
            bound.len()
        ))
    })
}
