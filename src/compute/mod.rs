//! Purpose: Define the computation seam the worker applies to each input record.
//! Exports: `Computation`, `bind`, `add`, built-ins, `SingleSlotCache`, `Counter`.
//! Role: Keeps argument binding and numeric helpers out of the read/write loop.
//! Invariants: Binding follows positional-then-keyword call semantics with no silent drops.
//! Invariants: State lives in computation values, never in process globals.

mod builtin;
mod cache;
mod counter;

use serde_json::{Map, Number, Value};

use crate::core::error::{Error, ErrorKind};

pub use builtin::{Builtin, BuiltinOptions, Count, DEFAULT_LOAD_DELAY, Increment, Offset};
pub use cache::SingleSlotCache;
pub use counter::Counter;

pub trait Computation {
    fn name(&self) -> &str;
    fn call(&mut self, args: &[Value], kwargs: &Map<String, Value>) -> Result<Value, Error>;
}

impl<C: Computation + ?Sized> Computation for Box<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn call(&mut self, args: &[Value], kwargs: &Map<String, Value>) -> Result<Value, Error> {
        (**self).call(args, kwargs)
    }
}

fn compute_error(function: &str, message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Compute).with_message(format!("{function}(): {}", message.into()))
}

/// Match call arguments to named parameters, returning values in parameter order.
pub fn bind(
    function: &str,
    params: &[&str],
    args: &[Value],
    kwargs: &Map<String, Value>,
) -> Result<Vec<Value>, Error> {
    if args.len() > params.len() {
        return Err(compute_error(
            function,
            format!(
                "takes {} positional argument(s) but {} were given",
                params.len(),
                args.len()
            ),
        ));
    }

    let mut bound: Vec<Option<Value>> = args.iter().cloned().map(Some).collect();
    bound.resize(params.len(), None);

    for (name, value) in kwargs {
        let Some(index) = params.iter().position(|param| *param == name.as_str()) else {
            return Err(compute_error(
                function,
                format!("got an unexpected keyword argument '{name}'"),
            ));
        };
        if bound[index].is_some() {
            return Err(compute_error(
                function,
                format!("got multiple values for argument '{name}'"),
            ));
        }
        bound[index] = Some(value.clone());
    }

    bound
        .into_iter()
        .zip(params)
        .map(|(value, name)| {
            value.ok_or_else(|| {
                compute_error(
                    function,
                    format!("missing required argument '{name}'"),
                )
            })
        })
        .collect()
}

/// Add two JSON numbers, keeping integer results integral where they fit.
pub fn add(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    let (Value::Number(left), Value::Number(right)) = (lhs, rhs) else {
        return Err(Error::new(ErrorKind::Compute)
            .with_message(format!("cannot add {} and {}", type_name(lhs), type_name(rhs))));
    };

    if let (Some(a), Some(b)) = (integer(left), integer(right)) {
        let sum = a + b;
        if let Ok(sum) = i64::try_from(sum) {
            return Ok(Value::Number(sum.into()));
        }
        if let Ok(sum) = u64::try_from(sum) {
            return Ok(Value::Number(sum.into()));
        }
    }

    let sum = left.as_f64().unwrap_or(f64::NAN) + right.as_f64().unwrap_or(f64::NAN);
    Number::from_f64(sum).map(Value::Number).ok_or_else(|| {
        Error::new(ErrorKind::Compute).with_message("sum is not a finite number")
    })
}

fn integer(number: &Number) -> Option<i128> {
    number
        .as_i64()
        .map(i128::from)
        .or_else(|| number.as_u64().map(i128::from))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kwargs(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("kwargs must be an object"),
        }
    }

    #[test]
    fn bind_mixes_positional_and_keyword() {
        let bound = bind(
            "offset",
            &["model_id", "x"],
            &[json!(2)],
            &kwargs(json!({"x": 5})),
        )
        .expect("bound");
        assert_eq!(bound, vec![json!(2), json!(5)]);
    }

    #[test]
    fn bind_rejects_extra_positional() {
        let err = bind("increment", &["x"], &[json!(1), json!(2)], &Map::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Compute);
        assert_eq!(
            err.message(),
            Some("increment(): takes 1 positional argument(s) but 2 were given")
        );
    }

    #[test]
    fn bind_rejects_unknown_duplicate_and_missing() {
        let unknown = bind("increment", &["x"], &[], &kwargs(json!({"y": 1}))).unwrap_err();
        assert!(unknown.message().unwrap().contains("unexpected keyword argument 'y'"));

        let duplicate =
            bind("increment", &["x"], &[json!(1)], &kwargs(json!({"x": 1}))).unwrap_err();
        assert!(duplicate.message().unwrap().contains("multiple values for argument 'x'"));

        let missing = bind("increment", &["x"], &[], &Map::new()).unwrap_err();
        assert!(missing.message().unwrap().contains("missing required argument 'x'"));
    }

    #[test]
    fn add_keeps_integers_integral() {
        assert_eq!(add(&json!(3), &json!(1)).unwrap(), json!(4));
        assert_eq!(add(&json!(-10), &json!(1)).unwrap(), json!(-9));
        assert_eq!(add(&json!(u64::MAX - 1), &json!(1)).unwrap(), json!(u64::MAX));
        assert_eq!(add(&json!(-1), &json!(u64::MAX)).unwrap(), json!(u64::MAX - 1));
        assert_eq!(add(&json!(i64::MIN), &json!(u64::MAX)).unwrap(), json!(i64::MAX));
    }

    #[test]
    fn add_falls_back_to_floats() {
        assert_eq!(add(&json!(2.5), &json!(1)).unwrap(), json!(3.5));
        let big = add(&json!(u64::MAX), &json!(u64::MAX)).unwrap();
        assert!(big.is_f64());
        assert!(big.as_f64().unwrap() > 3.6e19);
    }

    #[test]
    fn add_rejects_non_numbers() {
        let err = add(&json!("3"), &json!(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Compute);
        assert_eq!(err.message(), Some("cannot add string and number"));
    }
}
