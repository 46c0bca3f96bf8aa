#![forbid(unsafe_code)]

//! Reconciles nested values with nested type descriptions and converts their
//! leaves into typed values.

pub mod broadcast;
pub mod call;
pub mod classify;
pub mod config;
pub mod convert;
pub mod converter;
pub mod error;
pub mod nested;
pub mod raw;
pub mod structure;

pub use broadcast::broadcast_structure;
pub use call::{
    CallArgs, ExpandLeaf, NestCallback, NestedCallable, resolve_and_call, resolve_call_args,
};
pub use classify::{NodeKind, classify, expand_as_args, expand_as_kwargs, maybe_convertible};
pub use config::{DEFAULT_MAX_DEPTH, NestConfig};
pub use convert::{ConversionEngine, TypeTag};
pub use converter::{ConvertRequest, DenseConverter, LeafConverter};
pub use error::{ConvertError, ConvertErrorKind, NestError, Result};
pub use nested::{NestedConversion, convert_nested};
pub use raw::RawValue;
pub use structure::{
    KeyedMap, Markers, Path, PathComponent, Record, Structure, assert_same_shape, path_to_string,
    try_map_up_to,
};

use nx_core::{DType, TypedValue};

/// Converts `value` whole where possible, falling back one level at a time.
pub fn convert_to_typed(
    converter: &dyn LeafConverter,
    value: &Structure<RawValue>,
    dtype: Option<DType>,
    name: Option<&str>,
) -> Result<Structure<TypedValue>> {
    ConversionEngine::new(converter).convert(value, dtype, name)
}

/// Converts a call-argument bundle; see [`ConversionEngine::convert_args`].
pub fn convert_args(
    converter: &dyn LeafConverter,
    args: &Structure<RawValue>,
    dtype: Option<&TypeTag>,
    name: Option<&str>,
) -> Result<Structure<TypedValue>> {
    ConversionEngine::new(converter).convert_args(args, dtype, name)
}
