//! Arg - the single options argument passed to an operation
//!
//! An argument is either known at queue time (`Value`) or produced when the
//! owning task runs (`Deferred`, `Computed`, or an `Object` whose fields may be
//! deferred).

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::OperationError;
use crate::store::Results;

use super::expr::Deferred;

/// Closure computing an argument from the results snapshot
pub type ComputeFn = Arc<dyn Fn(&Results) -> Result<Value, OperationError> + Send + Sync>;

/// Options argument of a queued task
#[derive(Clone)]
pub enum Arg {
    /// Plain value, passed through unchanged
    Value(Value),
    /// Expression evaluated against the results snapshot
    Deferred(Deferred),
    /// Closure evaluated against the results snapshot
    Computed(ComputeFn),
    /// Object whose direct fields may be deferred
    Object(Vec<(String, Field)>),
}

/// Field of an [`Arg::Object`]
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Value(Value),
    Deferred(Deferred),
}

impl Arg {
    /// `null` argument
    pub fn none() -> Self {
        Arg::Value(Value::Null)
    }

    /// Argument computed from the results snapshot when the task runs
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&Results) -> Result<Value, OperationError> + Send + Sync + 'static,
    {
        Arg::Computed(Arc::new(f))
    }

    /// Start an object argument
    pub fn object() -> ObjectArg {
        ObjectArg::default()
    }

    /// Check if resolving this argument needs the results snapshot
    pub fn is_late_bound(&self) -> bool {
        match self {
            Arg::Value(_) => false,
            Arg::Deferred(_) | Arg::Computed(_) => true,
            Arg::Object(fields) => fields.iter().any(|(_, f)| matches!(f, Field::Deferred(_))),
        }
    }
}

impl Default for Arg {
    fn default() -> Self {
        Arg::none()
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Arg::Deferred(d) => f.debug_tuple("Deferred").field(&d.source()).finish(),
            Arg::Computed(_) => f.write_str("Computed(<fn>)"),
            Arg::Object(fields) => f.debug_map().entries(fields.iter().map(|(k, v)| (k, v))).finish(),
        }
    }
}

/// Builder for [`Arg::Object`]
///
/// Field order is preserved; a repeated key keeps its first position and the
/// last value.
#[derive(Debug, Clone, Default)]
pub struct ObjectArg {
    fields: Vec<(String, Field)>,
}

impl ObjectArg {
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Field>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((key, value)),
        }
        self
    }

    pub fn build(self) -> Arg {
        Arg::Object(self.fields)
    }
}

impl From<ObjectArg> for Arg {
    fn from(object: ObjectArg) -> Self {
        object.build()
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

impl From<Deferred> for Arg {
    fn from(deferred: Deferred) -> Self {
        Arg::Deferred(deferred)
    }
}

impl From<Map<String, Value>> for Arg {
    fn from(map: Map<String, Value>) -> Self {
        Arg::Value(Value::Object(map))
    }
}

impl From<()> for Arg {
    fn from(_: ()) -> Self {
        Arg::none()
    }
}

macro_rules! arg_from_json {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Arg {
                fn from(value: $ty) -> Self {
                    Arg::Value(Value::from(value))
                }
            }

            impl From<$ty> for Field {
                fn from(value: $ty) -> Self {
                    Field::Value(Value::from(value))
                }
            }
        )*
    };
}

arg_from_json!(&str, String, bool, i32, i64, u32, u64, f64);

impl From<Value> for Field {
    fn from(value: Value) -> Self {
        Field::Value(value)
    }
}

impl From<Deferred> for Field {
    fn from(deferred: Deferred) -> Self {
        Field::Deferred(deferred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::expr::deferred;
    use serde_json::json;

    #[test]
    fn conversions_produce_plain_values() {
        assert!(matches!(Arg::from(1), Arg::Value(v) if v == json!(1)));
        assert!(matches!(Arg::from("x"), Arg::Value(v) if v == json!("x")));
        assert!(matches!(Arg::from(()), Arg::Value(Value::Null)));
        assert!(matches!(Arg::from(json!({"a": 1})), Arg::Value(_)));
        assert!(matches!(Arg::from(deferred("a")), Arg::Deferred(_)));
    }

    #[test]
    fn late_bound_detection() {
        assert!(!Arg::from(5).is_late_bound());
        assert!(Arg::from(deferred("a")).is_late_bound());
        assert!(Arg::computed(|_| Ok(Value::Null)).is_late_bound());

        let plain = Arg::object().field("a", 1).build();
        assert!(!plain.is_late_bound());
        let mixed = Arg::object().field("a", 1).field("b", deferred("x")).build();
        assert!(mixed.is_late_bound());
    }

    #[test]
    fn object_builder_keeps_order_and_last_value() {
        let arg = Arg::object()
            .field("b", 1)
            .field("a", 2)
            .field("b", 3)
            .build();
        let Arg::Object(fields) = arg else {
            panic!("expected object");
        };
        assert_eq!(
            fields,
            vec![
                ("b".to_string(), Field::Value(json!(3))),
                ("a".to_string(), Field::Value(json!(2))),
            ]
        );
    }

    #[test]
    fn debug_hides_closures() {
        let arg = Arg::computed(|_| Ok(Value::Null));
        assert_eq!(format!("{:?}", arg), "Computed(<fn>)");
        assert_eq!(format!("{:?}", Arg::from(deferred("a + 1"))), "Deferred(\"a + 1\")");
    }
}
