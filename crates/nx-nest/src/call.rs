#![forbid(unsafe_code)]

//! Calling user-supplied functions with a nested argument bundle.
//!
//! A bundle is expanded positionally (`f(a, b)`), by keyword (`f(x=a)`), or
//! passed whole (`f(args)`). Arity is checked by the callee, not here.

use nx_core::{TypedValue, Value};

use crate::classify::{expand_as_args, expand_as_kwargs};
use crate::error::{NestError, Result};
use crate::raw::RawValue;
use crate::structure::{KeyedMap, Structure};

/// The argument list a callee receives.
#[derive(Debug, Clone, PartialEq)]
pub enum CallArgs<L> {
    Positional(Vec<Structure<L>>),
    Keyword(KeyedMap<Structure<L>>),
    Single(Structure<L>),
}

/// Leaves that can be spread into positional arguments when marked
/// force-positional. Tensors spread along their leading axis.
pub trait ExpandLeaf: Sized {
    fn expand_positional(&self) -> Option<Vec<Self>>;
}

impl ExpandLeaf for RawValue {
    fn expand_positional(&self) -> Option<Vec<Self>> {
        match self {
            Self::Array(tensor) => tensor
                .unstack_axis0()
                .ok()
                .map(|rows| rows.into_iter().map(RawValue::from_value).collect()),
            Self::Typed(typed) => typed.expand_positional().map(|rows| {
                rows.into_iter().map(RawValue::Typed).collect()
            }),
            _ => None,
        }
    }
}

impl ExpandLeaf for TypedValue {
    fn expand_positional(&self) -> Option<Vec<Self>> {
        match &self.value {
            Value::Scalar(_) => None,
            Value::Tensor(tensor) => tensor
                .unstack_axis0()
                .ok()
                .map(|rows| rows.into_iter().map(TypedValue::new).collect()),
        }
    }
}

/// Decides the calling convention for `args`. Exactly one form is chosen.
pub fn resolve_call_args<L: ExpandLeaf>(args: Structure<L>) -> CallArgs<L> {
    if expand_as_args(&args) {
        CallArgs::Positional(positional_items(args.into_unannotated()))
    } else if expand_as_kwargs(&args) {
        match args.into_unannotated() {
            Structure::Map(map) => CallArgs::Keyword(map),
            other => CallArgs::Single(other),
        }
    } else {
        CallArgs::Single(args)
    }
}

fn positional_items<L: ExpandLeaf>(args: Structure<L>) -> Vec<Structure<L>> {
    match args {
        Structure::Seq(items) => items,
        Structure::Record(record) => record.into_values(),
        Structure::Leaf(leaf) => match leaf.expand_positional() {
            Some(rows) => rows.into_iter().map(Structure::Leaf).collect(),
            None => vec![Structure::Leaf(leaf)],
        },
        other @ (Structure::Map(_) | Structure::Annotated(..)) => vec![other],
    }
}

/// A function that accepts nested arguments in any of the three forms.
pub trait NestedCallable<L> {
    type Output;

    fn call_positional(&self, args: Vec<Structure<L>>) -> Result<Self::Output>;

    fn call_keyword(&self, kwargs: KeyedMap<Structure<L>>) -> Result<Self::Output>;

    fn call_single(&self, arg: Structure<L>) -> Result<Self::Output>;
}

/// Invokes `callable` with `args` expanded per [`resolve_call_args`].
pub fn resolve_and_call<L, C>(callable: &C, args: Structure<L>) -> Result<C::Output>
where
    L: ExpandLeaf,
    C: NestedCallable<L>,
{
    match resolve_call_args(args) {
        CallArgs::Positional(items) => {
            tracing::trace!(arity = items.len(), "calling with positional arguments");
            callable.call_positional(items)
        }
        CallArgs::Keyword(kwargs) => {
            tracing::trace!(arity = kwargs.len(), "calling with keyword arguments");
            callable.call_keyword(kwargs)
        }
        CallArgs::Single(arg) => callable.call_single(arg),
    }
}

type CallbackFn<L, R> = Box<dyn Fn(Vec<Structure<L>>) -> Result<R> + Send + Sync>;

/// A named closure with declared parameter names. Binds positional and
/// keyword arguments to its parameters before invoking the closure, and
/// raises the arity errors a real call would.
pub struct NestCallback<L, R> {
    name: String,
    params: Vec<String>,
    func: CallbackFn<L, R>,
}

impl<L, R> NestCallback<L, R> {
    pub fn new<F>(name: &str, params: &[&str], func: F) -> Self
    where
        F: Fn(Vec<Structure<L>>) -> Result<R> + Send + Sync + 'static,
    {
        NestCallback {
            name: name.to_string(),
            params: params.iter().map(|param| (*param).to_string()).collect(),
            func: Box::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    fn arity_error(&self, actual: usize) -> NestError {
        NestError::ArgumentCount {
            callee: self.name.clone(),
            expected: self.params.len(),
            actual,
        }
    }
}

impl<L, R> NestedCallable<L> for NestCallback<L, R> {
    type Output = R;

    fn call_positional(&self, args: Vec<Structure<L>>) -> Result<R> {
        if args.len() != self.params.len() {
            return Err(self.arity_error(args.len()));
        }
        (self.func)(args)
    }

    fn call_keyword(&self, mut kwargs: KeyedMap<Structure<L>>) -> Result<R> {
        let mut bound = Vec::with_capacity(self.params.len());
        for param in &self.params {
            let value = kwargs
                .remove(param)
                .ok_or_else(|| NestError::MissingKeyword {
                    callee: self.name.clone(),
                    keyword: param.clone(),
                })?;
            bound.push(value);
        }
        if let Some(extra) = kwargs.keys().next() {
            return Err(NestError::UnknownKeyword {
                callee: self.name.clone(),
                keyword: extra.to_owned(),
            });
        }
        (self.func)(bound)
    }

    fn call_single(&self, arg: Structure<L>) -> Result<R> {
        if self.params.len() != 1 {
            return Err(self.arity_error(1));
        }
        (self.func)(vec![arg])
    }
}

impl<L, R> std::fmt::Debug for NestCallback<L, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NestCallback")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{CallArgs, NestCallback, resolve_and_call, resolve_call_args};
    use crate::error::NestError;
    use crate::raw::RawValue;
    use crate::structure::Structure;
    use nx_core::{TypedValue, Value};

    fn int(v: i64) -> Structure<RawValue> {
        Structure::leaf(RawValue::Int(v))
    }

    fn as_int(arg: &Structure<RawValue>) -> i64 {
        match arg.as_leaf() {
            Some(RawValue::Int(v)) => *v,
            other => panic!("expected int leaf, got {other:?}"),
        }
    }

    /// `f(a, b) = 10 * a + b`, so argument order is visible in the result.
    fn two_arg() -> NestCallback<RawValue, i64> {
        NestCallback::new("f", &["a", "b"], |args| {
            Ok(10 * as_int(&args[0]) + as_int(&args[1]))
        })
    }

    fn one_arg() -> NestCallback<RawValue, Structure<RawValue>> {
        NestCallback::new("g", &["x"], |mut args| Ok(args.remove(0)))
    }

    #[test]
    fn sequence_expands_positionally() {
        let result = resolve_and_call(&two_arg(), Structure::seq([int(1), int(2)]))
            .expect("two positional args");
        assert_eq!(result, 12);
    }

    #[test]
    fn mapping_expands_by_keyword() {
        let args = Structure::map([("b", int(2)), ("a", int(1))]).expect("map");
        assert_eq!(resolve_and_call(&two_arg(), args).expect("kwargs bind"), 12);

        let args = Structure::map([("x", int(1))]).expect("map");
        let result = resolve_and_call(&one_arg(), args).expect("f(x=1)");
        assert_eq!(result, int(1));
    }

    #[test]
    fn force_positional_mapping_still_binds_by_keyword() {
        let args = Structure::map([("b", int(2)), ("a", int(1))])
            .expect("map")
            .force_positional();
        assert!(matches!(resolve_call_args(args.clone()), CallArgs::Keyword(_)));
        assert_eq!(resolve_and_call(&two_arg(), args).expect("kwargs bind"), 12);
    }

    #[test]
    fn scalar_is_passed_whole() {
        let result = resolve_and_call(&one_arg(), int(5)).expect("f(5)");
        assert_eq!(result, int(5));
    }

    #[test]
    fn record_is_passed_whole() {
        let point = Structure::record("Point", [("x", int(1)), ("y", int(2))]).expect("record");
        let result = resolve_and_call(&one_arg(), point.clone()).expect("record is one arg");
        assert_eq!(result, point);
    }

    #[test]
    fn force_positional_record_expands_fields() {
        let point = Structure::record("Point", [("x", int(3)), ("y", int(4))])
            .expect("record")
            .force_positional();
        assert_eq!(resolve_and_call(&two_arg(), point).expect("fields spread"), 34);
    }

    #[test]
    fn force_leaf_sequence_is_passed_whole() {
        let args = Structure::seq([int(1), int(2)]).force_leaf();
        assert!(matches!(resolve_call_args(args), CallArgs::Single(_)));
    }

    #[test]
    fn force_positional_tensor_spreads_rows() {
        let typed = TypedValue::new(Value::vector_i64(&[1, 2]).expect("vector"));
        let args = Structure::leaf(RawValue::Typed(typed)).force_positional();
        let CallArgs::Positional(rows) = resolve_call_args(args) else {
            panic!("force-positional tensor should expand");
        };
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn force_positional_scalar_is_single_positional() {
        let args = int(7).force_positional();
        let CallArgs::Positional(items) = resolve_call_args(args) else {
            panic!("force-positional scalar should expand");
        };
        assert_eq!(items, vec![int(7)]);
    }

    #[test]
    fn arity_mismatch_surfaces_from_callee() {
        let err = resolve_and_call(&two_arg(), Structure::seq([int(1), int(2), int(3)]))
            .expect_err("three args for two params");
        assert_eq!(
            err,
            NestError::ArgumentCount {
                callee: "f".to_owned(),
                expected: 2,
                actual: 3,
            }
        );

        let err = resolve_and_call(&two_arg(), int(1)).expect_err("one arg for two params");
        assert!(matches!(err, NestError::ArgumentCount { actual: 1, .. }));
    }

    #[test]
    fn keyword_binding_reports_missing_and_unknown() {
        let args = Structure::map([("a", int(1))]).expect("map");
        let err = resolve_and_call(&two_arg(), args).expect_err("b is missing");
        assert!(matches!(err, NestError::MissingKeyword { ref keyword, .. } if keyword == "b"));

        let args = Structure::map([("a", int(1)), ("b", int(2)), ("c", int(3))]).expect("map");
        let err = resolve_and_call(&two_arg(), args).expect_err("c is unknown");
        assert!(matches!(err, NestError::UnknownKeyword { ref keyword, .. } if keyword == "c"));
    }
}
