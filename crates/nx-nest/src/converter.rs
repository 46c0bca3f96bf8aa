#![forbid(unsafe_code)]

//! The leaf-conversion capability consumed by the engine, and a dense
//! reference implementation.

use nx_core::{DType, Shape, TensorValue, TypedValue, Value, cast_value};

use crate::error::ConvertError;
use crate::raw::RawValue;
use crate::structure::Structure;

/// Target constraints for one conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvertRequest<'a> {
    /// Required dtype; a value that cannot be represented in it fails.
    pub dtype: Option<DType>,
    /// Preferred dtype, applied only when the value converts cleanly.
    pub dtype_hint: Option<DType>,
    /// Fully qualified name for a newly created value.
    pub name: Option<&'a str>,
}

/// Converts a raw value, possibly a whole container, into one typed value.
///
/// The engine may call `convert` on a container and then again on each of its
/// children when the first call fails, so implementations must be free of
/// side effects.
pub trait LeafConverter {
    fn convert(
        &self,
        value: &Structure<RawValue>,
        request: &ConvertRequest<'_>,
    ) -> Result<TypedValue, ConvertError>;
}

impl<F> LeafConverter for F
where
    F: Fn(&Structure<RawValue>, &ConvertRequest<'_>) -> Result<TypedValue, ConvertError>,
{
    fn convert(
        &self,
        value: &Structure<RawValue>,
        request: &ConvertRequest<'_>,
    ) -> Result<TypedValue, ConvertError> {
        self(value, request)
    }
}

/// Materializes scalars, host arrays and rectangular sequences (or records)
/// of them into dense values.
///
/// - sequences and records stack their children along a new leading axis;
/// - mappings and text are type errors, ragged or mixed children value errors;
/// - already typed values pass through untouched, but must match `dtype`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseConverter;

impl LeafConverter for DenseConverter {
    fn convert(
        &self,
        value: &Structure<RawValue>,
        request: &ConvertRequest<'_>,
    ) -> Result<TypedValue, ConvertError> {
        if let Some(RawValue::Typed(existing)) = value.as_leaf() {
            return pass_through(existing, request);
        }

        let inferred = materialize(value)?;
        let value = match (request.dtype, request.dtype_hint) {
            (Some(dtype), _) => cast_value(&inferred, dtype).ok_or_else(|| {
                ConvertError::type_error(format!(
                    "cannot convert a {} value to dtype {dtype}",
                    inferred.dtype()
                ))
            })?,
            (None, Some(hint)) => cast_value(&inferred, hint).unwrap_or(inferred),
            (None, None) => inferred,
        };
        Ok(TypedValue {
            value,
            name: request.name.map(str::to_owned),
        })
    }
}

fn pass_through(
    existing: &TypedValue,
    request: &ConvertRequest<'_>,
) -> Result<TypedValue, ConvertError> {
    if let Some(dtype) = request.dtype
        && existing.dtype() != dtype
    {
        return Err(ConvertError::type_error(format!(
            "typed value has dtype {} but {dtype} was requested",
            existing.dtype()
        )));
    }
    Ok(existing.clone())
}

fn materialize(node: &Structure<RawValue>) -> Result<Value, ConvertError> {
    match node.unannotated() {
        Structure::Leaf(raw) => match raw {
            RawValue::Int(v) => Ok(Value::scalar_i64(*v)),
            RawValue::Float(v) => Ok(Value::scalar_f64(*v)),
            RawValue::Bool(v) => Ok(Value::scalar_bool(*v)),
            RawValue::Complex(re, im) => Ok(Value::scalar_complex128(*re, *im)),
            RawValue::Text(text) => Err(ConvertError::type_error(format!(
                "text '{text}' has no numeric representation"
            ))),
            RawValue::Array(tensor) => Ok(Value::Tensor(tensor.clone())),
            RawValue::Typed(typed) => Ok(typed.value.clone()),
        },
        Structure::Seq(items) => stack_children(items.iter()),
        Structure::Record(record) => stack_children(record.iter().map(|(_, item)| item)),
        Structure::Map(_) => Err(ConvertError::type_error(
            "a mapping cannot be converted to a single value",
        )),
        Structure::Annotated(_, inner) => materialize(inner),
    }
}

fn stack_children<'a>(
    children: impl Iterator<Item = &'a Structure<RawValue>>,
) -> Result<Value, ConvertError> {
    let values = children.map(materialize).collect::<Result<Vec<_>, _>>()?;
    if values.is_empty() {
        return Ok(Value::Tensor(TensorValue::new(
            DType::F64,
            Shape::vector(0),
            Vec::new(),
        )?));
    }
    Ok(Value::Tensor(TensorValue::stack_axis0(&widen_for_stack(values))?))
}

/// Tensors of different numeric dtypes are widened to a common dtype before
/// stacking, as scalars are by `stack_axis0`.
fn widen_for_stack(values: Vec<Value>) -> Vec<Value> {
    let all_tensors = values.iter().all(|value| matches!(value, Value::Tensor(_)));
    let first = values.first().map(Value::dtype);
    if !all_tensors || values.iter().all(|value| Some(value.dtype()) == first) {
        return values;
    }
    let target = if values.iter().any(|value| value.dtype().is_complex()) {
        DType::Complex128
    } else if values.iter().any(|value| value.dtype() == DType::Bool) {
        return values;
    } else {
        DType::F64
    };
    values
        .iter()
        .map(|value| cast_value(value, target))
        .collect::<Option<Vec<_>>>()
        .unwrap_or(values)
}
