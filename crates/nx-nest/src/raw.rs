#![forbid(unsafe_code)]

//! Raw leaf values fed to conversion, and JSON ingestion.

use nx_core::{Literal, TensorValue, TypedValue, Value};
use serde::{Deserialize, Serialize};

use crate::error::{NestError, Result};
use crate::structure::{KeyedMap, Path, PathComponent, Structure, child_path, path_to_string};

/// A leaf before conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Complex(f64, f64),
    Text(String),
    /// Host array that has not been through conversion.
    Array(TensorValue),
    /// Value produced by an earlier conversion.
    Typed(TypedValue),
}

impl RawValue {
    /// Typed values and host arrays; stacking several of these is never implicit.
    #[must_use]
    pub fn is_typed_or_array(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Typed(_))
    }

    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Complex(..) => "complex",
            Self::Text(_) => "text",
            Self::Array(_) => "array",
            Self::Typed(_) => "typed",
        }
    }

    /// Raw form of an already materialized value, as a tensor row would be.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Scalar(Literal::I64(v)) => Self::Int(v),
            Value::Scalar(Literal::Bool(v)) => Self::Bool(v),
            Value::Scalar(Literal::F64Bits(bits)) => Self::Float(f64::from_bits(bits)),
            Value::Scalar(lit @ (Literal::Complex64Bits(..) | Literal::Complex128Bits(..))) => {
                let (re, im) = lit.as_complex128().unwrap_or((f64::NAN, f64::NAN));
                Self::Complex(re, im)
            }
            Value::Tensor(tensor) => Self::Array(tensor),
        }
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<TensorValue> for RawValue {
    fn from(value: TensorValue) -> Self {
        Self::Array(value)
    }
}

impl From<TypedValue> for RawValue {
    fn from(value: TypedValue) -> Self {
        Self::Typed(value)
    }
}

impl Structure<RawValue> {
    /// Builds a raw structure from JSON: arrays become sequences, objects
    /// become mappings, integers `Int`, other numbers `Float`. `null` has no
    /// raw counterpart and is rejected.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        from_json_at(&Path::new(), json)
    }
}

fn from_json_at(path: &Path, json: &serde_json::Value) -> Result<Structure<RawValue>> {
    let child = |component: PathComponent| child_path(path, component);
    match json {
        serde_json::Value::Null => Err(NestError::InvalidJson {
            path: path_to_string(path),
            detail: "null has no raw value".to_owned(),
        }),
        serde_json::Value::Bool(b) => Ok(Structure::Leaf(RawValue::Bool(*b))),
        serde_json::Value::Number(number) => {
            if let Some(v) = number.as_i64() {
                Ok(Structure::Leaf(RawValue::Int(v)))
            } else if let Some(v) = number.as_f64() {
                Ok(Structure::Leaf(RawValue::Float(v)))
            } else {
                Err(NestError::InvalidJson {
                    path: path_to_string(path),
                    detail: format!("number {number} is out of range"),
                })
            }
        }
        serde_json::Value::String(s) => Ok(Structure::Leaf(RawValue::Text(s.clone()))),
        serde_json::Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| from_json_at(&child(PathComponent::Index(index)), item))
            .collect::<Result<Vec<_>>>()
            .map(Structure::Seq),
        serde_json::Value::Object(object) => {
            let mut map = KeyedMap::new();
            for (key, item) in object {
                map.insert(
                    key.clone(),
                    from_json_at(&child(PathComponent::Key(key.clone())), item)?,
                )?;
            }
            Ok(Structure::Map(map))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RawValue;
    use crate::error::NestError;
    use crate::structure::Structure;
    use nx_core::{TypedValue, Value};
    use serde_json::json;

    #[test]
    fn from_json_builds_nested_structure() {
        let structure =
            Structure::from_json(&json!({"a": [1, 2.5], "b": true})).expect("valid json");
        let leaves: Vec<RawValue> = structure.flatten().into_iter().cloned().collect();
        assert_eq!(
            leaves,
            vec![RawValue::Int(1), RawValue::Float(2.5), RawValue::Bool(true)]
        );
        assert_eq!(structure.depth(), 2);
    }

    #[test]
    fn from_json_rejects_null_with_path() {
        let err = Structure::from_json(&json!({"a": [1, null]})).expect_err("null is invalid");
        assert!(matches!(err, NestError::InvalidJson { ref path, .. } if path == "a.1"));
    }

    #[test]
    fn typed_and_array_leaves_are_flagged() {
        assert!(RawValue::Typed(TypedValue::new(Value::scalar_i64(1))).is_typed_or_array());
        assert!(!RawValue::Int(1).is_typed_or_array());
    }

    #[test]
    fn from_value_unwraps_scalars() {
        assert_eq!(RawValue::from_value(Value::scalar_f64(0.5)), RawValue::Float(0.5));
        assert_eq!(RawValue::from_value(Value::scalar_bool(false)), RawValue::Bool(false));
    }
}
