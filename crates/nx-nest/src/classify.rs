#![forbid(unsafe_code)]

//! Node classification for call expansion and whole-value conversion.

use crate::structure::{Markers, Structure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Leaf,
    Positional,
    Keyed,
    /// Traversable for conversion, but not expandable as call arguments.
    Record,
}

/// Rules, first match wins: force-leaf, mapping, record, sequence,
/// force-positional, otherwise leaf.
#[must_use]
pub fn classify<L>(value: &Structure<L>) -> NodeKind {
    let Markers {
        force_leaf,
        force_positional,
    } = value.markers();
    if force_leaf {
        return NodeKind::Leaf;
    }
    match value.unannotated() {
        Structure::Map(_) => NodeKind::Keyed,
        Structure::Record(_) => NodeKind::Record,
        Structure::Seq(_) => NodeKind::Positional,
        Structure::Leaf(_) | Structure::Annotated(..) if force_positional => NodeKind::Positional,
        Structure::Leaf(_) | Structure::Annotated(..) => NodeKind::Leaf,
    }
}

/// Whether `args` is passed to a callee as `f(a, b, ...)`. Force-positional
/// spreads records and leaves; a mapping stays keyed.
#[must_use]
pub fn expand_as_args<L>(args: &Structure<L>) -> bool {
    match classify(args) {
        NodeKind::Positional => true,
        NodeKind::Record => args.markers().force_positional,
        NodeKind::Keyed | NodeKind::Leaf => false,
    }
}

/// Whether `args` is passed to a callee as `f(k=v, ...)`.
#[must_use]
pub fn expand_as_kwargs<L>(args: &Structure<L>) -> bool {
    classify(args) == NodeKind::Keyed
}

/// Whether a whole-value conversion attempt makes sense for `value`.
/// Records are converted field by field unless forced to be a leaf.
#[must_use]
pub fn maybe_convertible<L>(value: &Structure<L>) -> bool {
    !matches!(value.unannotated(), Structure::Record(_)) || value.markers().force_leaf
}

#[cfg(test)]
mod tests {
    use super::{NodeKind, classify, expand_as_args, expand_as_kwargs, maybe_convertible};
    use crate::structure::Structure;

    fn point() -> Structure<i64> {
        Structure::record("Point", [("x", Structure::leaf(1)), ("y", Structure::leaf(2))])
            .expect("record should build")
    }

    #[test]
    fn classification_follows_container_kind() {
        assert_eq!(classify(&Structure::leaf(1)), NodeKind::Leaf);
        assert_eq!(classify(&Structure::seq([Structure::leaf(1)])), NodeKind::Positional);
        assert_eq!(
            classify(&Structure::map([("a", Structure::leaf(1))]).expect("map")),
            NodeKind::Keyed
        );
        assert_eq!(classify(&point()), NodeKind::Record);
    }

    #[test]
    fn force_leaf_wins_over_everything() {
        let forced = Structure::seq([Structure::leaf(1)]).force_leaf().force_positional();
        assert_eq!(classify(&forced), NodeKind::Leaf);
        assert!(!expand_as_args(&forced));
        assert!(!expand_as_kwargs(&forced));
    }

    #[test]
    fn force_positional_promotes_leaves_only() {
        assert_eq!(
            classify(&Structure::leaf(5).force_positional()),
            NodeKind::Positional
        );
        // Records keep their kind but become expandable.
        let record = point().force_positional();
        assert_eq!(classify(&record), NodeKind::Record);
        assert!(expand_as_args(&record));
    }

    #[test]
    fn force_positional_mapping_stays_keyed() {
        let map = Structure::map([("a", Structure::leaf(1))])
            .expect("map")
            .force_positional();
        assert_eq!(classify(&map), NodeKind::Keyed);
        assert!(!expand_as_args(&map));
        assert!(expand_as_kwargs(&map));
    }

    #[test]
    fn records_are_not_expandable_by_default() {
        assert!(!expand_as_args(&point()));
        assert!(!expand_as_kwargs(&point()));
    }

    #[test]
    fn records_are_whole_converted_only_when_forced() {
        assert!(!maybe_convertible(&point()));
        assert!(maybe_convertible(&point().force_leaf()));
        assert!(maybe_convertible(&Structure::seq([Structure::leaf(1)])));
    }

    #[test]
    fn classification_is_stable() {
        let value = Structure::map([("a", Structure::seq([Structure::leaf(1)]))]).expect("map");
        assert_eq!(classify(&value), classify(&value));
    }
}
