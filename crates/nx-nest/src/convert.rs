#![forbid(unsafe_code)]

//! Whole-or-parts conversion of raw nested values.
//!
//! Each container is first offered to the converter as one value. When that
//! fails with a recoverable error the engine descends one level and tries
//! each child the same way, so the output keeps as much of the input nesting
//! as the converter could not absorb.

use nx_core::{DType, TypedValue};

use crate::classify::{expand_as_args, expand_as_kwargs, maybe_convertible};
use crate::config::NestConfig;
use crate::converter::{ConvertRequest, LeafConverter};
use crate::error::{NestError, Result};
use crate::raw::RawValue;
use crate::structure::{Path, Structure, child_path, path_to_string, try_map_up_to};

/// A nested structure of optional dtypes; `None` leaves mean "infer".
pub type TypeTag = Structure<Option<DType>>;

impl From<DType> for Structure<Option<DType>> {
    fn from(dtype: DType) -> Self {
        Structure::Leaf(Some(dtype))
    }
}

impl From<Option<DType>> for Structure<Option<DType>> {
    fn from(dtype: Option<DType>) -> Self {
        Structure::Leaf(dtype)
    }
}

pub struct ConversionEngine<'c> {
    converter: &'c dyn LeafConverter,
    config: NestConfig,
}

impl<'c> ConversionEngine<'c> {
    #[must_use]
    pub fn new(converter: &'c dyn LeafConverter) -> Self {
        Self {
            converter,
            config: NestConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: NestConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn config(&self) -> NestConfig {
        self.config
    }

    /// Converts `value`, keeping only the nesting the converter rejects.
    ///
    /// With a `dtype` the value is converted as a single unit. Every produced
    /// value is named `name`; names are not qualified per position here.
    pub fn convert(
        &self,
        value: &Structure<RawValue>,
        dtype: Option<DType>,
        name: Option<&str>,
    ) -> Result<Structure<TypedValue>> {
        self.check_depth(value)?;
        self.convert_at(&Path::new(), value, dtype, name)
    }

    /// Converts a bundle of call arguments.
    ///
    /// Without `dtype`, a bundle that would expand into positional or
    /// keyword arguments is converted argument by argument. With `dtype`,
    /// each top-level tag position converts the matching part of `args`.
    pub fn convert_args(
        &self,
        args: &Structure<RawValue>,
        dtype: Option<&TypeTag>,
        name: Option<&str>,
    ) -> Result<Structure<TypedValue>> {
        self.check_depth(args)?;
        let Some(tags) = dtype else {
            if (expand_as_args(args) || expand_as_kwargs(args))
                && let Some(converted) = args.try_map_children(|component, child| {
                    let path = child_path(&Path::new(), component);
                    self.convert_at(&path, child, None, name)
                })
            {
                return converted;
            }
            return self.convert_at(&Path::new(), args, None, name);
        };
        self.check_depth(tags)?;
        try_map_up_to(tags, args, |path, tag, sub| {
            self.convert_at(path, sub, *tag, name)
        })
    }

    /// A single converter call on `value`, with no structural fallback.
    pub fn convert_leaf(
        &self,
        path: &Path,
        value: &Structure<RawValue>,
        request: &ConvertRequest<'_>,
    ) -> Result<TypedValue> {
        tracing::trace!(
            path = %path_to_string(path),
            dtype = ?request.dtype,
            hint = ?request.dtype_hint,
            "converting leaf"
        );
        self.converter
            .convert(value, request)
            .map_err(|source| NestError::Conversion {
                path: path_to_string(path),
                source,
            })
    }

    pub(crate) fn check_depth<L>(&self, value: &Structure<L>) -> Result<()> {
        let depth = value.depth();
        if depth > self.config.max_depth {
            return Err(NestError::DepthExceeded {
                depth,
                limit: self.config.max_depth,
            });
        }
        Ok(())
    }

    fn convert_at(
        &self,
        path: &Path,
        value: &Structure<RawValue>,
        dtype: Option<DType>,
        name: Option<&str>,
    ) -> Result<Structure<TypedValue>> {
        let request = ConvertRequest {
            dtype,
            dtype_hint: None,
            name,
        };
        if dtype.is_some() || !value.is_nested() {
            return self.convert_leaf(path, value, &request).map(Structure::Leaf);
        }

        if maybe_convertible(value) {
            match self.converter.convert(value, &request) {
                Ok(typed) => return Ok(Structure::Leaf(typed)),
                Err(err) if err.is_recoverable() => {
                    tracing::debug!(
                        path = %path_to_string(path),
                        node = %value.shape_summary(),
                        error = %err,
                        "whole conversion failed, descending into children"
                    );
                }
                Err(source) => {
                    return Err(NestError::Conversion {
                        path: path_to_string(path),
                        source,
                    });
                }
            }
        }

        match value.try_map_children(|component, child| {
            self.convert_at(&child_path(path, component), child, None, name)
        }) {
            Some(converted) => converted,
            None => self.convert_leaf(path, value, &request).map(Structure::Leaf),
        }
    }
}

impl std::fmt::Debug for ConversionEngine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
