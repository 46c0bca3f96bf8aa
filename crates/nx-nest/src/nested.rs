#![forbid(unsafe_code)]

//! Conversion of a raw nested value under nested dtype and dtype-hint
//! structures, with per-leaf names.

use nx_core::{DType, NameScope, TypedValue};

use crate::broadcast::broadcast_structure;
use crate::config::NestConfig;
use crate::convert::{ConversionEngine, TypeTag};
use crate::converter::{ConvertRequest, LeafConverter};
use crate::error::{NestError, Result};
use crate::raw::RawValue;
use crate::structure::{Path, Structure, assert_same_shape, path_to_string, try_map_up_to};

/// Builder for one nested conversion.
///
/// ```
/// use nx_core::DType;
/// use nx_nest::{DenseConverter, NestedConversion, Structure};
///
/// let value = Structure::from_json(&serde_json::json!({"a": 1, "b": 2}))?;
/// let out = NestedConversion::new(&DenseConverter)
///     .with_dtype(DType::F64)
///     .with_name("root")
///     .run(&value)?;
/// let names: Vec<_> = out.flatten().iter().map(|v| v.name().unwrap_or("")).collect();
/// assert_eq!(names, ["root/a", "root/b"]);
/// # Ok::<(), nx_nest::NestError>(())
/// ```
pub struct NestedConversion<'c> {
    converter: &'c dyn LeafConverter,
    dtype: TypeTag,
    dtype_hint: TypeTag,
    allow_packing: bool,
    name: Option<String>,
    config: NestConfig,
}

impl<'c> NestedConversion<'c> {
    #[must_use]
    pub fn new(converter: &'c dyn LeafConverter) -> Self {
        Self {
            converter,
            dtype: Structure::Leaf(None),
            dtype_hint: Structure::Leaf(None),
            allow_packing: false,
            name: None,
            config: NestConfig::default(),
        }
    }

    #[must_use]
    pub fn with_dtype(mut self, dtype: impl Into<TypeTag>) -> Self {
        self.dtype = dtype.into();
        self
    }

    #[must_use]
    pub fn with_dtype_hint(mut self, dtype_hint: impl Into<TypeTag>) -> Self {
        self.dtype_hint = dtype_hint.into();
        self
    }

    /// Permit a single leaf position to absorb a container holding typed
    /// values or arrays, stacking them into one value.
    #[must_use]
    pub fn allow_packing(mut self, allow: bool) -> Self {
        self.allow_packing = allow;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: NestConfig) -> Self {
        self.config = config;
        self
    }

    pub fn run(&self, value: &Structure<RawValue>) -> Result<Structure<TypedValue>> {
        let engine = ConversionEngine::new(self.converter).with_config(self.config);
        engine.check_depth(value)?;
        engine.check_depth(&self.dtype)?;
        engine.check_depth(&self.dtype_hint)?;

        let (dtype, dtype_hint) = self.reconcile(value)?;
        if !dtype.is_nested() {
            let tag = dtype.as_leaf().copied().flatten();
            let hint = dtype_hint.as_leaf().copied().flatten();
            return self
                .convert_position(&engine, &Path::new(), value, tag, hint, self.name.as_deref())
                .map(Structure::Leaf);
        }

        let tags = dtype.zip(&dtype_hint)?;
        let scope = self.name.as_deref().map(NameScope::new);
        try_map_up_to(&tags, value, |path, (tag, hint), sub| {
            let name = scope
                .as_ref()
                .map(|scope| scope.qualify(&path_to_string(path)));
            self.convert_position(&engine, path, sub, *tag, *hint, name.as_deref())
                .map(Structure::Leaf)
        })
    }

    /// Brings the dtype and hint structures to a common shape. A single tag
    /// is tiled over the other structure; two nested ones must already
    /// agree. When neither is nested, a mapping root lends its keyed part
    /// as the shape so each entry gets its own name; any other root is one
    /// conversion.
    fn reconcile(&self, value: &Structure<RawValue>) -> Result<(TypeTag, TypeTag)> {
        let reconciled = match (self.dtype.is_nested(), self.dtype_hint.is_nested()) {
            (true, true) => {
                assert_same_shape(&self.dtype, &self.dtype_hint)?;
                (self.dtype.clone(), self.dtype_hint.clone())
            }
            (true, false) => (
                self.dtype.clone(),
                broadcast_structure(&self.dtype, self.dtype_hint.clone()),
            ),
            (false, true) => (
                broadcast_structure(&self.dtype_hint, self.dtype.clone()),
                self.dtype_hint.clone(),
            ),
            (false, false) => match value.unannotated() {
                Structure::Map(_) if !value.markers().force_leaf => {
                    let skeleton = value.keyed_skeleton();
                    (
                        broadcast_structure(&skeleton, self.dtype.clone()),
                        broadcast_structure(&skeleton, self.dtype_hint.clone()),
                    )
                }
                _ => (self.dtype.clone(), self.dtype_hint.clone()),
            },
        };
        tracing::debug!(
            dtype = %reconciled.0.shape_summary(),
            hint = %reconciled.1.shape_summary(),
            allow_packing = self.allow_packing,
            "reconciled type structures"
        );
        Ok(reconciled)
    }

    fn convert_position(
        &self,
        engine: &ConversionEngine<'_>,
        path: &Path,
        sub: &Structure<RawValue>,
        dtype: Option<DType>,
        dtype_hint: Option<DType>,
        name: Option<&str>,
    ) -> Result<TypedValue> {
        if !self.allow_packing
            && sub.is_nested()
            && sub.flatten().iter().any(|leaf| leaf.is_typed_or_array())
        {
            return Err(NestError::ImplicitStack {
                path: path_to_string(path),
                value: describe(sub),
            });
        }
        engine.convert_leaf(
            path,
            sub,
            &ConvertRequest {
                dtype,
                dtype_hint,
                name,
            },
        )
    }
}

impl std::fmt::Debug for NestedConversion<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NestedConversion")
            .field("dtype", &self.dtype)
            .field("dtype_hint", &self.dtype_hint)
            .field("allow_packing", &self.allow_packing)
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn describe(sub: &Structure<RawValue>) -> String {
    let kinds = sub
        .flatten()
        .iter()
        .map(|leaf| leaf.kind_name())
        .collect::<Vec<_>>();
    format!("{} of [{}]", sub.shape_summary(), kinds.join(", "))
}

/// Converts `value` under `dtype` and `dtype_hint`, each either a single tag
/// or a structure matching `value` down to its leaves.
pub fn convert_nested(
    converter: &dyn LeafConverter,
    value: &Structure<RawValue>,
    dtype: impl Into<TypeTag>,
    dtype_hint: impl Into<TypeTag>,
    allow_packing: bool,
    name: Option<&str>,
) -> Result<Structure<TypedValue>> {
    let mut conversion = NestedConversion::new(converter)
        .with_dtype(dtype)
        .with_dtype_hint(dtype_hint)
        .allow_packing(allow_packing);
    if let Some(name) = name {
        conversion = conversion.with_name(name);
    }
    conversion.run(value)
}

#[cfg(test)]
mod tests {
    use super::{NestedConversion, convert_nested};
    use crate::config::NestConfig;
    use crate::converter::DenseConverter;
    use crate::convert::TypeTag;
    use crate::error::NestError;
    use crate::raw::RawValue;
    use crate::structure::Structure;
    use nx_core::{DType, TypedValue, Value};
    use serde_json::json;

    fn raw(json: serde_json::Value) -> Structure<RawValue> {
        Structure::from_json(&json).expect("valid fixture")
    }

    fn typed_int(v: i64) -> TypedValue {
        TypedValue::new(Value::scalar_i64(v))
    }

    fn typed_leaf(v: i64) -> Structure<RawValue> {
        Structure::leaf(RawValue::Typed(typed_int(v)))
    }

    #[test]
    fn single_tag_is_broadcast_over_nested_tag() {
        let dtype: TypeTag = Structure::seq([Structure::seq([Structure::leaf(None)])]);
        let value = Structure::seq([Structure::seq([typed_leaf(1)])]);
        let out = convert_nested(&DenseConverter, &value, dtype, None::<DType>, false, None)
            .expect("reconciled conversion");
        assert_eq!(
            out,
            Structure::seq([Structure::seq([Structure::leaf(typed_int(1))])])
        );
    }

    #[test]
    fn typed_values_are_not_stacked_implicitly() {
        let value = Structure::seq([
            Structure::seq([typed_leaf(1)]),
            Structure::seq([typed_leaf(2)]),
        ]);
        let none = None::<DType>;
        let err = convert_nested(&DenseConverter, &value, none, none, false, None)
            .expect_err("packing is off");
        assert!(matches!(err, NestError::ImplicitStack { ref path, .. } if path.is_empty()));

        let out = convert_nested(&DenseConverter, &value, none, none, true, None)
            .expect("packing is on");
        let packed = out.as_leaf().expect("one stacked value");
        assert_eq!(packed.shape().dims, vec![2, 1]);
        assert_eq!(
            packed.value.as_tensor().and_then(|t| t.to_i64_vec()),
            Some(vec![1, 2])
        );
    }

    #[test]
    fn plain_scalars_pack_without_permission() {
        let value = raw(json!([[1], [2]]));
        let out = convert_nested(&DenseConverter, &value, None::<DType>, None::<DType>, false, None)
            .expect("raw scalars may stack");
        assert_eq!(out.as_leaf().expect("single value").shape().dims, vec![2, 1]);
    }

    #[test]
    fn keyed_entries_are_named_under_the_root() {
        let out = NestedConversion::new(&DenseConverter)
            .with_name("root")
            .run(&raw(json!({"a": 1, "b": 2})))
            .expect("named conversion");
        let names = out
            .flatten()
            .iter()
            .map(|value| value.name().map(str::to_owned))
            .collect::<Vec<_>>();
        assert_eq!(names, vec![Some("root/a".to_owned()), Some("root/b".to_owned())]);
    }

    #[test]
    fn record_roots_convert_as_one_value() {
        let pair = Structure::record(
            "Pair",
            [
                ("a", Structure::leaf(RawValue::Int(1))),
                ("b", Structure::leaf(RawValue::Int(2))),
            ],
        )
        .expect("record");

        let out = NestedConversion::new(&DenseConverter)
            .with_name("pair")
            .run(&pair.clone().force_leaf())
            .expect("force-leaf record");
        let leaf = out.as_leaf().expect("one value");
        assert_eq!(leaf.shape().dims, vec![2]);
        assert_eq!(leaf.name(), Some("pair"));

        let out = NestedConversion::new(&DenseConverter)
            .with_dtype(DType::I64)
            .run(&pair)
            .expect("record under a dtype");
        let leaf = out.as_leaf().expect("one value");
        assert_eq!(leaf.dtype(), DType::I64);
        assert_eq!(leaf.shape().dims, vec![2]);
    }

    #[test]
    fn force_leaf_mapping_is_not_split_into_entries() {
        let err = NestedConversion::new(&DenseConverter)
            .run(&raw(json!({"a": 1, "b": 2})).force_leaf())
            .expect_err("a mapping is never one value");
        assert!(matches!(err, NestError::Conversion { ref path, .. } if path.is_empty()));
    }

    #[test]
    fn nested_positions_use_dotted_paths() {
        let dtype: TypeTag = Structure::map([(
            "layer",
            Structure::seq([Structure::leaf(Some(DType::F64)), Structure::leaf(None)]),
        )])
        .expect("map");
        let out = NestedConversion::new(&DenseConverter)
            .with_dtype(dtype)
            .with_name("net")
            .run(&raw(json!({"layer": [[1, 2], 3]})))
            .expect("nested conversion");
        let leaves = out.flatten();
        assert_eq!(leaves[0].name(), Some("net/layer.0"));
        assert_eq!(leaves[0].dtype(), DType::F64);
        assert_eq!(leaves[1].name(), Some("net/layer.1"));
        assert_eq!(leaves[1].dtype(), DType::I64);
    }

    #[test]
    fn hint_is_tiled_and_applied_softly() {
        let err = NestedConversion::new(&DenseConverter)
            .with_dtype_hint(DType::F64)
            .run(&raw(json!({"a": 1, "b": "x"})))
            .expect_err("text still fails");
        assert!(matches!(err, NestError::Conversion { ref path, .. } if path == "b"));

        let out = NestedConversion::new(&DenseConverter)
            .with_dtype_hint(DType::I64)
            .run(&raw(json!({"a": 1.5})))
            .expect("hint that cannot apply is ignored");
        assert_eq!(out.flatten()[0].dtype(), DType::F64);
    }

    #[test]
    fn single_dtype_is_tiled_over_nested_hint() {
        let hint: TypeTag = Structure::seq([Structure::leaf(None), Structure::leaf(None)]);
        let value = raw(json!([1, 2]));
        let out = convert_nested(&DenseConverter, &value, DType::F64, hint, false, None)
            .expect("dtype tiled over hint");
        let leaves = out.flatten();
        assert_eq!(leaves.len(), 2);
        assert!(leaves.iter().all(|leaf| leaf.dtype() == DType::F64));
        assert!(leaves.iter().all(|leaf| leaf.shape().dims.is_empty()));
    }

    #[test]
    fn matching_dtype_and_hint_structures_combine() {
        let dtype: TypeTag =
            Structure::seq([Structure::leaf(Some(DType::F64)), Structure::leaf(None)]);
        let hint: TypeTag =
            Structure::seq([Structure::leaf(None), Structure::leaf(Some(DType::F64))]);
        let out = NestedConversion::new(&DenseConverter)
            .with_dtype(dtype)
            .with_dtype_hint(hint)
            .with_name("pair")
            .run(&raw(json!([1, 2])))
            .expect("same tag structures");
        let leaves = out.flatten();
        assert_eq!(leaves[0].dtype(), DType::F64);
        assert_eq!(leaves[1].dtype(), DType::F64);
        assert_eq!(leaves[1].name(), Some("pair/1"));
    }

    #[test]
    fn host_arrays_are_not_stacked_implicitly() {
        let row = |values: &[i64]| {
            let tensor = Value::vector_i64(values)
                .ok()
                .and_then(|value| value.as_tensor().cloned())
                .expect("vector");
            Structure::leaf(RawValue::Array(tensor))
        };
        let value = Structure::seq([row(&[1, 2]), row(&[3, 4])]);
        let err = NestedConversion::new(&DenseConverter)
            .run(&value)
            .expect_err("arrays need packing");
        assert!(matches!(err, NestError::ImplicitStack { ref path, .. } if path.is_empty()));

        let out = NestedConversion::new(&DenseConverter)
            .allow_packing(true)
            .run(&value)
            .expect("packing is on");
        let packed = out.as_leaf().expect("one stacked value");
        assert_eq!(packed.shape().dims, vec![2, 2]);
        assert_eq!(
            packed.value.as_tensor().and_then(|t| t.to_i64_vec()),
            Some(vec![1, 2, 3, 4])
        );
    }

    #[test]
    fn mismatched_dtype_and_hint_structures_fail() {
        let dtype: TypeTag = Structure::seq([Structure::leaf(None), Structure::leaf(None)]);
        let hint: TypeTag = Structure::seq([Structure::leaf(None)]);
        let value = raw(json!([1, 2]));
        let err = convert_nested(&DenseConverter, &value, dtype, hint, false, None)
            .expect_err("tag structures disagree");
        assert!(matches!(err, NestError::ShapeMismatch { .. }));
    }

    #[test]
    fn value_must_match_the_tag_structure() {
        let dtype: TypeTag = Structure::map([("a", Structure::leaf(None))]).expect("map");
        let value = raw(json!({"b": 1}));
        let err = convert_nested(&DenseConverter, &value, dtype, None::<DType>, false, None)
            .expect_err("keys differ");
        assert!(matches!(err, NestError::ShapeMismatch { .. }));
    }

    #[test]
    fn deep_values_are_rejected_before_conversion() {
        let err = NestedConversion::new(&DenseConverter)
            .with_config(NestConfig::default().with_max_depth(1))
            .run(&raw(json!([[1]])))
            .expect_err("too deep");
        assert_eq!(err, NestError::DepthExceeded { depth: 2, limit: 1 });
    }
}
