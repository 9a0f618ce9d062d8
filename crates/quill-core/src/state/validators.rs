//! Built-in value validators.
//!
//! A validator inspects a candidate value and either accepts it or returns a
//! reason. A rejected value rejects that one write only.
//!
//! ```ignore
//! use quill_core::state::validators;
//!
//! let schema = StateSchema::new()
//!     .with("foo", AttributeDescriptor::new().validator(validators::array_of(validators::number())));
//! ```

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::value::Value;

/// Where a value is being validated.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub key: &'a str,
    /// Type name of the container's owner.
    pub owner: &'a str,
}

/// A rejected write.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid value {attempted:?} for state key `{key}`: {reason}")]
pub struct ValidationError {
    pub key: String,
    pub attempted: Value,
    pub reason: String,
}

type CheckFn = dyn Fn(&Value, &ValidationContext<'_>) -> Result<(), String>;

/// A shared validation function. Compared by identity.
#[derive(Clone)]
pub struct Validator(Rc<CheckFn>);

impl Validator {
    /// Validator returning a reason on failure.
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&Value, &ValidationContext<'_>) -> Result<(), String> + 'static,
    {
        Self(Rc::new(check))
    }

    /// Validator accepting values for which `predicate` returns `true`.
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + 'static,
    {
        Self::new(move |value, _| {
            if predicate(value) {
                Ok(())
            } else {
                Err(format!("{value:?} rejected by validator"))
            }
        })
    }

    pub fn check(&self, value: &Value, context: &ValidationContext<'_>) -> Result<(), String> {
        (self.0)(value, context)
    }

    pub fn ptr_eq(&self, other: &Validator) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl PartialEq for Validator {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Validator(...)")
    }
}

fn expect_kind(value: &Value, expected: &str, ok: bool) -> Result<(), String> {
    if ok {
        Ok(())
    } else {
        Err(format!("expected {expected}, got {}", value.kind()))
    }
}

/// Accepts anything.
pub fn any() -> Validator {
    Validator::new(|_, _| Ok(()))
}

pub fn bool() -> Validator {
    Validator::new(|value, _| expect_kind(value, "bool", matches!(value, Value::Bool(_))))
}

/// Accepts `Int` and `Float`.
pub fn number() -> Validator {
    Validator::new(|value, _| expect_kind(value, "number", value.as_f64().is_some()))
}

pub fn string() -> Validator {
    Validator::new(|value, _| expect_kind(value, "string", matches!(value, Value::Str(_))))
}

pub fn array() -> Validator {
    Validator::new(|value, _| expect_kind(value, "list", matches!(value, Value::List(_))))
}

/// Accepts maps and objects.
pub fn object() -> Validator {
    Validator::new(|value, _| {
        expect_kind(
            value,
            "object",
            matches!(value, Value::Map(_) | Value::Object(_)),
        )
    })
}

pub fn func() -> Validator {
    Validator::new(|value, _| expect_kind(value, "listener", matches!(value, Value::Listener(_))))
}

/// Accepts lists whose every item passes `inner`.
pub fn array_of(inner: Validator) -> Validator {
    Validator::new(move |value, context| {
        let items = value
            .as_list()
            .ok_or_else(|| format!("expected list, got {}", value.kind()))?;
        for (index, item) in items.iter().enumerate() {
            inner
                .check(item, context)
                .map_err(|reason| format!("item {index}: {reason}"))?;
        }
        Ok(())
    })
}

/// Accepts maps whose every value passes `inner`.
pub fn object_of(inner: Validator) -> Validator {
    Validator::new(move |value, context| {
        let map = value
            .as_map()
            .ok_or_else(|| format!("expected map, got {}", value.kind()))?;
        for (key, item) in map {
            inner
                .check(item, context)
                .map_err(|reason| format!("field `{key}`: {reason}"))?;
        }
        Ok(())
    })
}

/// Accepts `Value::Object` instances wrapping a `T`.
pub fn instance_of<T: Any>() -> Validator {
    Validator::new(|value, _| match value.as_object() {
        Some(object) if object.is::<T>() => Ok(()),
        Some(object) => Err(format!(
            "expected instance of {}, got {}",
            std::any::type_name::<T>(),
            object.type_name()
        )),
        None => Err(format!(
            "expected instance of {}, got {}",
            std::any::type_name::<T>(),
            value.kind()
        )),
    })
}

/// Accepts values equal to one of `allowed`.
pub fn one_of(allowed: Vec<Value>) -> Validator {
    Validator::new(move |value, _| {
        if allowed.contains(value) {
            Ok(())
        } else {
            Err(format!("{value:?} is not one of {allowed:?}"))
        }
    })
}

/// Accepts values passing at least one of `validators`.
pub fn one_of_type(validators: Vec<Validator>) -> Validator {
    Validator::new(move |value, context| {
        if validators.iter().any(|v| v.check(value, context).is_ok()) {
            Ok(())
        } else {
            Err(format!("{} matches none of the allowed types", value.kind()))
        }
    })
}

/// Accepts maps whose listed fields pass their validators. Missing fields
/// are checked as `Null`; extra fields are allowed.
pub fn shape_of(fields: Vec<(&str, Validator)>) -> Validator {
    let fields: Vec<(String, Validator)> = fields
        .into_iter()
        .map(|(name, validator)| (name.to_string(), validator))
        .collect();
    Validator::new(move |value, context| {
        let map = value
            .as_map()
            .ok_or_else(|| format!("expected map, got {}", value.kind()))?;
        for (name, validator) in &fields {
            let field = map.get(name).cloned().unwrap_or_default();
            validator
                .check(&field, context)
                .map_err(|reason| format!("field `{name}`: {reason}"))?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const CTX: ValidationContext<'static> = ValidationContext {
        key: "foo",
        owner: "Test",
    };

    fn ok(validator: &Validator, value: impl Into<Value>) -> bool {
        validator.check(&value.into(), &CTX).is_ok()
    }

    #[test]
    fn primitive_validators() {
        assert!(ok(&number(), 1));
        assert!(ok(&number(), 1.5));
        assert!(!ok(&number(), "1"));
        assert!(ok(&string(), "x"));
        assert!(!ok(&bool(), 0));
        assert!(ok(&func(), Value::listener(|_| {})));
        assert!(ok(&any(), ()));
    }

    #[test]
    fn array_of_numbers() {
        let validator = array_of(number());
        assert!(ok(&validator, vec![1, 2, 3]));

        let mixed = Value::List(vec![1.into(), "2".into(), 3.into()]);
        let err = validator.check(&mixed, &CTX).unwrap_err();
        assert_eq!(err, "item 1: expected number, got string");
    }

    #[test]
    fn instance_of_checks_type() {
        struct Widget;
        let validator = instance_of::<Widget>();
        assert!(ok(&validator, Value::object(Widget)));
        assert!(!ok(&validator, Value::object(5u8)));
        assert!(!ok(&validator, 5));
    }

    #[test]
    fn one_of_and_one_of_type() {
        assert!(ok(&one_of(vec!["a".into(), "b".into()]), "b"));
        assert!(!ok(&one_of(vec!["a".into()]), "c"));
        let either = one_of_type(vec![string(), number()]);
        assert!(ok(&either, 1));
        assert!(!ok(&either, true));
    }

    #[test]
    fn shape_of_checks_listed_fields() {
        let validator = shape_of(vec![("name", string()), ("age", number())]);
        let mut map = BTreeMap::new();
        map.insert("name".to_string(), Value::from("ada"));
        map.insert("age".to_string(), Value::from(36));
        map.insert("extra".to_string(), Value::from(true));
        assert!(ok(&validator, map.clone()));

        map.remove("age");
        assert!(!ok(&validator, map));
    }

    #[test]
    fn predicate_and_identity() {
        let positive = Validator::predicate(|v| v.as_f64().is_some_and(|n| n > 0.0));
        assert!(ok(&positive, 1));
        assert!(!ok(&positive, -2));
        assert_eq!(positive, positive.clone());
        assert_ne!(positive, any());
    }
}
