//! Argument resolution - turns an [`Arg`] into the options value
//!
//! Runs at the instant the owning task starts, against one results snapshot.
//! Every late-bound part is resolved before the operation is invoked.

use serde_json::{Map, Value};

use crate::error::FluidError;
use crate::store::Results;

use super::arg::{Arg, Field};
use super::expr::Deferred;

/// Resolve `arg` for the task whose result name is `target`
pub fn resolve(arg: &Arg, target: &str, results: &Results) -> Result<Value, FluidError> {
    match arg {
        Arg::Value(value) => Ok(value.clone()),
        Arg::Deferred(deferred) => evaluate(deferred, target, results, None),
        Arg::Computed(compute) => compute(results).map_err(|e| FluidError::ComputedArgument {
            target: target.to_string(),
            reason: e.to_string(),
        }),
        Arg::Object(fields) => {
            let mut object = Map::with_capacity(fields.len());
            for (key, field) in fields {
                let value = match field {
                    Field::Value(value) => value.clone(),
                    Field::Deferred(deferred) => evaluate(deferred, target, results, Some(key))?,
                };
                object.insert(key.clone(), value);
            }
            Ok(Value::Object(object))
        }
    }
}

fn evaluate(
    deferred: &Deferred,
    target: &str,
    results: &Results,
    field: Option<&str>,
) -> Result<Value, FluidError> {
    deferred
        .evaluate(results)
        .map_err(|e| FluidError::DeferredEvaluation {
            target: target.to_string(),
            expression: deferred.source().to_string(),
            reason: match field {
                Some(field) => format!("field '{}': {}", field, e),
                None => e.to_string(),
            },
        })
}
