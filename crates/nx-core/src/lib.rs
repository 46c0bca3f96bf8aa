#![forbid(unsafe_code)]

pub mod cast;
pub mod scope;

pub use cast::{cast_literal, cast_value, literal_dtype};
pub use scope::NameScope;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    F32,
    F64,
    I32,
    I64,
    Bool,
    Complex64,
    Complex128,
}

impl DType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::F32 => "float32",
            Self::F64 => "float64",
            Self::I32 => "int32",
            Self::I64 => "int64",
            Self::Bool => "bool",
            Self::Complex64 => "complex64",
            Self::Complex128 => "complex128",
        }
    }

    #[must_use]
    pub fn is_floating(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    #[must_use]
    pub fn is_complex(self) -> bool {
        matches!(self, Self::Complex64 | Self::Complex128)
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    pub dims: Vec<u32>,
}

impl Shape {
    #[must_use]
    pub fn scalar() -> Self {
        Self { dims: Vec::new() }
    }

    #[must_use]
    pub fn vector(len: u32) -> Self {
        Self { dims: vec![len] }
    }

    /// Length of a new axis; fails when it does not fit a `u32` dimension.
    pub fn axis_len(len: usize) -> Result<u32, ValueError> {
        u32::try_from(len).map_err(|_| ValueError::ShapeOverflow {
            shape: Self::vector(u32::MAX),
        })
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    #[must_use]
    pub fn element_count(&self) -> Option<u64> {
        self.dims
            .iter()
            .try_fold(1_u64, |acc, dim| acc.checked_mul(u64::from(*dim)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Literal {
    I64(i64),
    Bool(bool),
    F64Bits(u64),
    Complex64Bits(u32, u32),
    Complex128Bits(u64, u64),
}

impl Literal {
    #[must_use]
    pub fn from_f64(value: f64) -> Self {
        Self::F64Bits(value.to_bits())
    }

    #[must_use]
    pub fn from_complex64(re: f32, im: f32) -> Self {
        Self::Complex64Bits(re.to_bits(), im.to_bits())
    }

    #[must_use]
    pub fn from_complex128(re: f64, im: f64) -> Self {
        Self::Complex128Bits(re.to_bits(), im.to_bits())
    }

    #[must_use]
    pub fn as_f64(self) -> Option<f64> {
        match self {
            Self::F64Bits(bits) => Some(f64::from_bits(bits)),
            Self::I64(value) => Some(value as f64),
            Self::Bool(_) | Self::Complex64Bits(..) | Self::Complex128Bits(..) => None,
        }
    }

    #[must_use]
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Self::I64(value) => Some(value),
            Self::Bool(_)
            | Self::F64Bits(_)
            | Self::Complex64Bits(..)
            | Self::Complex128Bits(..) => None,
        }
    }

    #[must_use]
    pub fn as_complex128(self) -> Option<(f64, f64)> {
        match self {
            Self::Complex128Bits(re, im) => Some((f64::from_bits(re), f64::from_bits(im))),
            Self::Complex64Bits(re, im) => Some((
                f64::from(f32::from_bits(re)),
                f64::from(f32::from_bits(im)),
            )),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_complex(self) -> bool {
        matches!(self, Self::Complex64Bits(..) | Self::Complex128Bits(..))
    }
}

/// A converted value: a scalar literal or a dense tensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Scalar(Literal),
    Tensor(TensorValue),
}

impl Value {
    #[must_use]
    pub fn scalar_i64(value: i64) -> Self {
        Self::Scalar(Literal::I64(value))
    }

    #[must_use]
    pub fn scalar_f64(value: f64) -> Self {
        Self::Scalar(Literal::from_f64(value))
    }

    #[must_use]
    pub fn scalar_bool(value: bool) -> Self {
        Self::Scalar(Literal::Bool(value))
    }

    #[must_use]
    pub fn scalar_complex128(re: f64, im: f64) -> Self {
        Self::Scalar(Literal::from_complex128(re, im))
    }

    pub fn vector_i64(values: &[i64]) -> Result<Self, ValueError> {
        let elements = values.iter().copied().map(Literal::I64).collect::<Vec<_>>();
        Ok(Self::Tensor(TensorValue::new(
            DType::I64,
            Shape::vector(Shape::axis_len(values.len())?),
            elements,
        )?))
    }

    pub fn vector_f64(values: &[f64]) -> Result<Self, ValueError> {
        let elements = values
            .iter()
            .copied()
            .map(Literal::from_f64)
            .collect::<Vec<_>>();
        Ok(Self::Tensor(TensorValue::new(
            DType::F64,
            Shape::vector(Shape::axis_len(values.len())?),
            elements,
        )?))
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Scalar(lit) => literal_dtype(*lit),
            Self::Tensor(t) => t.dtype,
        }
    }

    #[must_use]
    pub fn shape(&self) -> Shape {
        match self {
            Self::Scalar(_) => Shape::scalar(),
            Self::Tensor(t) => t.shape.clone(),
        }
    }

    #[must_use]
    pub fn as_tensor(&self) -> Option<&TensorValue> {
        match self {
            Self::Scalar(_) => None,
            Self::Tensor(tensor) => Some(tensor),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorValue {
    pub dtype: DType,
    pub shape: Shape,
    pub elements: Vec<Literal>,
}

impl TensorValue {
    pub fn new(dtype: DType, shape: Shape, elements: Vec<Literal>) -> Result<Self, ValueError> {
        let expected_count = shape.element_count().ok_or(ValueError::ShapeOverflow {
            shape: shape.clone(),
        })?;

        if expected_count != elements.len() as u64 {
            return Err(ValueError::ElementCountMismatch {
                shape,
                expected_count,
                actual_count: elements.len(),
            });
        }

        Ok(Self {
            dtype,
            shape,
            elements,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    #[must_use]
    pub fn leading_dim(&self) -> Option<u32> {
        self.shape.dims.first().copied()
    }

    pub fn slice_axis0(&self, index: usize) -> Result<Value, ValueError> {
        let axis_size = self
            .leading_dim()
            .ok_or(ValueError::RankZeroAxisSliceUnsupported)?;
        if index >= axis_size as usize {
            return Err(ValueError::SliceIndexOutOfBounds {
                index,
                axis_size: axis_size as usize,
            });
        }

        let slice_len = self
            .shape
            .dims
            .iter()
            .skip(1)
            .try_fold(1_usize, |acc, dim| acc.checked_mul(*dim as usize))
            .ok_or(ValueError::ShapeOverflow {
                shape: self.shape.clone(),
            })?;
        let start = index
            .checked_mul(slice_len)
            .ok_or(ValueError::ShapeOverflow {
                shape: self.shape.clone(),
            })?;
        let elements = self.elements[start..start + slice_len].to_vec();

        if self.rank() == 1 && literal_dtype(elements[0]) == self.dtype {
            return Ok(Value::Scalar(elements[0]));
        }
        let subshape = Shape {
            dims: self.shape.dims[1..].to_vec(),
        };
        Ok(Value::Tensor(TensorValue::new(
            self.dtype, subshape, elements,
        )?))
    }

    /// Rows along the leading axis, in order.
    pub fn unstack_axis0(&self) -> Result<Vec<Value>, ValueError> {
        let axis_size = self
            .leading_dim()
            .ok_or(ValueError::RankZeroAxisSliceUnsupported)?;
        (0..axis_size as usize)
            .map(|index| self.slice_axis0(index))
            .collect()
    }

    /// Stacks values of one kind along a new leading axis.
    ///
    /// Scalars stack into a vector whose dtype is inferred from the literals;
    /// tensors must agree on dtype and shape.
    pub fn stack_axis0(slices: &[Value]) -> Result<Self, ValueError> {
        if slices.is_empty() {
            return Err(ValueError::EmptyAxisStack);
        }

        match &slices[0] {
            Value::Scalar(first) => {
                let mut elements = Vec::with_capacity(slices.len());
                elements.push(*first);
                for value in &slices[1..] {
                    let Value::Scalar(lit) = value else {
                        return Err(ValueError::MixedAxisStackKinds);
                    };
                    elements.push(*lit);
                }
                let dtype = infer_dtype_from_literals(&elements);
                let elements = if elements.iter().all(|lit| literal_dtype(*lit) == dtype) {
                    elements
                } else {
                    elements
                        .into_iter()
                        .map(|lit| {
                            cast_literal(lit, dtype).ok_or(ValueError::AxisStackDTypeMismatch {
                                expected: dtype,
                                actual: literal_dtype(lit),
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()?
                };
                TensorValue::new(
                    dtype,
                    Shape::vector(Shape::axis_len(slices.len())?),
                    elements,
                )
            }
            Value::Tensor(first) => {
                let mut elements = Vec::with_capacity(first.elements.len() * slices.len());
                elements.extend_from_slice(&first.elements);
                for value in &slices[1..] {
                    let Value::Tensor(tensor) = value else {
                        return Err(ValueError::MixedAxisStackKinds);
                    };
                    if tensor.dtype != first.dtype {
                        return Err(ValueError::AxisStackDTypeMismatch {
                            expected: first.dtype,
                            actual: tensor.dtype,
                        });
                    }
                    if tensor.shape != first.shape {
                        return Err(ValueError::AxisStackShapeMismatch {
                            expected: first.shape.clone(),
                            actual: tensor.shape.clone(),
                        });
                    }
                    elements.extend_from_slice(&tensor.elements);
                }

                let mut dims = Vec::with_capacity(first.shape.rank() + 1);
                dims.push(Shape::axis_len(slices.len())?);
                dims.extend_from_slice(&first.shape.dims);
                TensorValue::new(first.dtype, Shape { dims }, elements)
            }
        }
    }

    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        self.elements.iter().copied().map(Literal::as_f64).collect()
    }

    pub fn to_i64_vec(&self) -> Option<Vec<i64>> {
        self.elements.iter().copied().map(Literal::as_i64).collect()
    }
}

/// The canonical typed representation produced by leaf conversion.
///
/// `name` is the fully qualified name assigned when the value was created;
/// values that passed through conversion unchanged keep their original name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedValue {
    pub value: Value,
    pub name: Option<String>,
}

impl TypedValue {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self { value, name: None }
    }

    #[must_use]
    pub fn named(value: Value, name: impl Into<String>) -> Self {
        Self {
            value,
            name: Some(name.into()),
        }
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.value.dtype()
    }

    #[must_use]
    pub fn shape(&self) -> Shape {
        self.value.shape()
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("shape element count overflowed: {:?}", shape.dims)]
    ShapeOverflow { shape: Shape },
    #[error(
        "tensor element count mismatch for shape {:?}: expected {expected_count}, got {actual_count}",
        shape.dims
    )]
    ElementCountMismatch {
        shape: Shape,
        expected_count: u64,
        actual_count: usize,
    },
    #[error("cannot axis-slice rank-0 scalar tensor")]
    RankZeroAxisSliceUnsupported,
    #[error("axis-slice index {index} out of bounds for axis size {axis_size}")]
    SliceIndexOutOfBounds { index: usize, axis_size: usize },
    #[error("cannot stack empty slice list")]
    EmptyAxisStack,
    #[error("cannot stack mixed scalar/tensor slice kinds")]
    MixedAxisStackKinds,
    #[error("stack shape mismatch: expected {:?}, got {:?}", expected.dims, actual.dims)]
    AxisStackShapeMismatch { expected: Shape, actual: Shape },
    #[error("stack dtype mismatch: expected {expected}, got {actual}")]
    AxisStackDTypeMismatch { expected: DType, actual: DType },
}

/// I64 if all literals are integers, Bool if all are booleans, Complex128 if
/// any is complex, otherwise F64.
fn infer_dtype_from_literals(elements: &[Literal]) -> DType {
    if elements.is_empty() {
        return DType::F64;
    }
    if elements
        .iter()
        .all(|literal| matches!(literal, Literal::I64(_)))
    {
        DType::I64
    } else if elements
        .iter()
        .all(|literal| matches!(literal, Literal::Bool(_)))
    {
        DType::Bool
    } else if elements.iter().any(|literal| literal.is_complex()) {
        DType::Complex128
    } else {
        DType::F64
    }
}

#[cfg(test)]
mod tests {
    use super::{DType, Literal, Shape, TensorValue, TypedValue, Value, ValueError};

    #[test]
    fn tensor_value_rejects_element_count_mismatch() {
        let err = TensorValue::new(DType::I64, Shape { dims: vec![2, 2] }, vec![Literal::I64(1)])
            .expect_err("mismatched element count should fail");
        assert!(matches!(
            err,
            ValueError::ElementCountMismatch {
                expected_count: 4,
                actual_count: 1,
                ..
            }
        ));
    }

    #[test]
    fn axis_len_accepts_u32_lengths() {
        assert_eq!(Shape::axis_len(3).expect("small axis"), 3);
        assert_eq!(Shape::axis_len(u32::MAX as usize).expect("max axis"), u32::MAX);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn axis_len_overflow_is_a_shape_error() {
        let err = Shape::axis_len(u32::MAX as usize + 1).expect_err("axis too long");
        assert!(matches!(err, ValueError::ShapeOverflow { .. }));
    }

    #[test]
    fn stack_scalars_infers_integer_vector() {
        let stacked = TensorValue::stack_axis0(&[Value::scalar_i64(1), Value::scalar_i64(2)])
            .expect("scalars should stack");
        assert_eq!(stacked.dtype, DType::I64);
        assert_eq!(stacked.shape, Shape::vector(2));
        assert_eq!(stacked.to_i64_vec(), Some(vec![1, 2]));
    }

    #[test]
    fn stack_mixed_numeric_scalars_promotes_to_float() {
        let stacked = TensorValue::stack_axis0(&[Value::scalar_i64(1), Value::scalar_f64(2.5)])
            .expect("numeric scalars should stack");
        assert_eq!(stacked.dtype, DType::F64);
        assert_eq!(stacked.to_f64_vec(), Some(vec![1.0, 2.5]));
    }

    #[test]
    fn stack_bool_with_number_is_rejected() {
        let err = TensorValue::stack_axis0(&[Value::scalar_bool(true), Value::scalar_f64(2.5)])
            .expect_err("bool cannot be promoted to float");
        assert!(matches!(err, ValueError::AxisStackDTypeMismatch { .. }));
    }

    #[test]
    fn stack_tensors_prepends_axis() {
        let row = Value::vector_i64(&[1, 2, 3]).expect("vector should build");
        let stacked =
            TensorValue::stack_axis0(&[row.clone(), row]).expect("equal tensors should stack");
        assert_eq!(stacked.shape.dims, vec![2, 3]);
    }

    #[test]
    fn stack_ragged_tensors_fails() {
        let a = Value::vector_i64(&[1, 2]).expect("vector should build");
        let b = Value::vector_i64(&[1, 2, 3]).expect("vector should build");
        let err = TensorValue::stack_axis0(&[a, b]).expect_err("ragged stack should fail");
        assert!(matches!(err, ValueError::AxisStackShapeMismatch { .. }));
    }

    #[test]
    fn unstack_matrix_yields_rows() {
        let a = Value::vector_f64(&[1.0, 2.0]).expect("vector should build");
        let b = Value::vector_f64(&[3.0, 4.0]).expect("vector should build");
        let matrix = TensorValue::stack_axis0(&[a.clone(), b.clone()]).expect("stack");
        let rows = matrix.unstack_axis0().expect("rows");
        assert_eq!(rows, vec![a, b]);
    }

    #[test]
    fn unstack_rank_zero_fails() {
        let scalar = TensorValue::new(DType::F32, Shape::scalar(), vec![Literal::from_f64(1.0)])
            .expect("rank-0 tensor should build");
        assert_eq!(
            scalar.unstack_axis0(),
            Err(ValueError::RankZeroAxisSliceUnsupported)
        );
    }

    #[test]
    fn typed_value_reports_dtype_and_name() {
        let typed = TypedValue::named(Value::scalar_bool(true), "root/flag");
        assert_eq!(typed.dtype(), DType::Bool);
        assert_eq!(typed.name(), Some("root/flag"));
        assert_eq!(typed.shape(), Shape::scalar());
    }

    #[test]
    fn value_error_display_is_actionable() {
        let err = ValueError::AxisStackDTypeMismatch {
            expected: DType::I64,
            actual: DType::F64,
        };
        let msg = err.to_string();
        assert!(msg.contains("int64"));
        assert!(msg.contains("float64"));
    }
}
