#![forbid(unsafe_code)]

use crate::{DType, Literal, Shape, TensorValue, Value};

/// The dtype a literal carries when it is not wrapped in a tensor.
#[inline]
#[must_use]
pub fn literal_dtype(literal: Literal) -> DType {
    match literal {
        Literal::I64(_) => DType::I64,
        Literal::Bool(_) => DType::Bool,
        Literal::F64Bits(_) => DType::F64,
        Literal::Complex64Bits(..) => DType::Complex64,
        Literal::Complex128Bits(..) => DType::Complex128,
    }
}

/// Cast a literal to `dtype` if the conversion is safe.
///
/// Integers widen to floats and complex numbers, floats widen to complex,
/// booleans only convert to booleans. Narrowing a float to an integer or
/// an out-of-range integer to `I32` returns `None`.
#[must_use]
pub fn cast_literal(literal: Literal, dtype: DType) -> Option<Literal> {
    match (literal, dtype) {
        (Literal::I64(v), DType::I64) => Some(Literal::I64(v)),
        (Literal::I64(v), DType::I32) => i32::try_from(v).ok().map(|_| Literal::I64(v)),
        (Literal::I64(v), DType::F64) => Some(Literal::from_f64(v as f64)),
        (Literal::I64(v), DType::F32) => Some(Literal::from_f64(f64::from(v as f32))),
        (Literal::I64(v), DType::Complex64) => Some(Literal::from_complex64(v as f32, 0.0)),
        (Literal::I64(v), DType::Complex128) => Some(Literal::from_complex128(v as f64, 0.0)),
        (Literal::F64Bits(bits), DType::F64) => Some(Literal::F64Bits(bits)),
        (Literal::F64Bits(bits), DType::F32) => {
            Some(Literal::from_f64(f64::from(f64::from_bits(bits) as f32)))
        }
        (Literal::F64Bits(bits), DType::Complex64) => {
            Some(Literal::from_complex64(f64::from_bits(bits) as f32, 0.0))
        }
        (Literal::F64Bits(bits), DType::Complex128) => {
            Some(Literal::from_complex128(f64::from_bits(bits), 0.0))
        }
        (Literal::Bool(b), DType::Bool) => Some(Literal::Bool(b)),
        (Literal::Complex64Bits(re, im), DType::Complex64) => {
            Some(Literal::Complex64Bits(re, im))
        }
        (Literal::Complex64Bits(re, im), DType::Complex128) => Some(Literal::from_complex128(
            f64::from(f32::from_bits(re)),
            f64::from(f32::from_bits(im)),
        )),
        (Literal::Complex128Bits(re, im), DType::Complex128) => {
            Some(Literal::Complex128Bits(re, im))
        }
        (Literal::Complex128Bits(re, im), DType::Complex64) => Some(Literal::from_complex64(
            f64::from_bits(re) as f32,
            f64::from_bits(im) as f32,
        )),
        _ => None,
    }
}

/// Cast every element of `value` to `dtype`.
///
/// A scalar whose target dtype has no literal of its own (`F32`, `I32`)
/// becomes a rank-0 tensor so the requested dtype is not lost.
#[must_use]
pub fn cast_value(value: &Value, dtype: DType) -> Option<Value> {
    match value {
        Value::Scalar(lit) => {
            let cast = cast_literal(*lit, dtype)?;
            if literal_dtype(cast) == dtype {
                Some(Value::Scalar(cast))
            } else {
                TensorValue::new(dtype, Shape::scalar(), vec![cast])
                    .ok()
                    .map(Value::Tensor)
            }
        }
        Value::Tensor(tensor) => {
            if tensor.dtype == dtype {
                return Some(value.clone());
            }
            if !tensor_cast_allowed(tensor.dtype, dtype) {
                return None;
            }
            let elements = tensor
                .elements
                .iter()
                .map(|lit| cast_literal(*lit, dtype))
                .collect::<Option<Vec<_>>>()?;
            TensorValue::new(dtype, tensor.shape.clone(), elements)
                .ok()
                .map(Value::Tensor)
        }
    }
}

// Storage literals of an F32 tensor are F64Bits, so the literal-level rule
// alone would let F32 -> I64 through for integral-looking payloads.
fn tensor_cast_allowed(from: DType, to: DType) -> bool {
    match from {
        DType::Bool => to == DType::Bool,
        DType::I32 | DType::I64 => to != DType::Bool,
        DType::F32 | DType::F64 => to.is_floating() || to.is_complex(),
        DType::Complex64 | DType::Complex128 => to.is_complex(),
    }
}
