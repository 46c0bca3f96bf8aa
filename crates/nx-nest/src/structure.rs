#![forbid(unsafe_code)]

//! The nested `Structure` model and its generic traversals.
//!
//! A structure is a closed tree of leaves and three container kinds. Override
//! markers ride on an explicit `Annotated` node instead of on the value.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{NestError, Result};

/// One step from a container to a child.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathComponent {
    Index(usize),
    Key(String),
    Field(String),
}

impl std::fmt::Display for PathComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Key(key) | Self::Field(key) => f.write_str(key),
        }
    }
}

pub type Path = SmallVec<[PathComponent; 4]>;

/// Joins path components with `.`, e.g. `a.0.b`.
#[must_use]
pub fn path_to_string(path: &[PathComponent]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

pub(crate) fn child_path(path: &Path, component: PathComponent) -> Path {
    let mut child = path.clone();
    child.push(component);
    child
}

/// Override markers attachable to any node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Markers {
    /// Treat the node as atomic for call expansion even if it is a container.
    pub force_leaf: bool,
    /// Expand the node positionally even if it is not a plain sequence.
    pub force_positional: bool,
}

impl Markers {
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            force_leaf: self.force_leaf || other.force_leaf,
            force_positional: self.force_positional || other.force_positional,
        }
    }
}

/// Insertion-ordered mapping with unique keys.
///
/// Equality ignores order: two maps are equal when they hold the same keys
/// bound to equal values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyedMap<T> {
    entries: Vec<(String, T)>,
}

impl<T> KeyedMap<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn from_entries<K, I>(entries: I) -> Result<Self>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, T)>,
    {
        let mut map = Self::new();
        for (key, value) in entries {
            map.insert(key, value)?;
        }
        Ok(map)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: T) -> Result<()> {
        let key = key.into();
        if self.contains_key(&key) {
            return Err(NestError::DuplicateKey { key });
        }
        self.entries.push((key, value));
        Ok(())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value)
    }

    pub fn remove(&mut self, key: &str) -> Option<T> {
        let index = self
            .entries
            .iter()
            .position(|(candidate, _)| candidate == key)?;
        Some(self.entries.remove(index).1)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(candidate, _)| candidate == key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    #[must_use]
    pub fn same_keys<U>(&self, other: &KeyedMap<U>) -> bool {
        self.len() == other.len() && self.keys().all(|key| other.contains_key(key))
    }
}

impl<T> Default for KeyedMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PartialEq> PartialEq for KeyedMap<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key).is_some_and(|theirs| theirs == value))
    }
}

impl<T: Eq> Eq for KeyedMap<T> {}

impl<T> IntoIterator for KeyedMap<T> {
    type Item = (String, T);
    type IntoIter = std::vec::IntoIter<(String, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// A named record type with a fixed, ordered set of named fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record<T> {
    type_name: String,
    fields: Vec<(String, T)>,
}

impl<T> Record<T> {
    pub fn new<K, I>(type_name: impl Into<String>, fields: I) -> Result<Self>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, T)>,
    {
        let mut collected: Vec<(String, T)> = Vec::new();
        for (field, value) in fields {
            let field = field.into();
            if collected.iter().any(|(existing, _)| *existing == field) {
                return Err(NestError::DuplicateKey { key: field });
            }
            collected.push((field, value));
        }
        Ok(Self {
            type_name: type_name.into(),
            fields: collected,
        })
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&T> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn into_values(self) -> Vec<T> {
        self.fields.into_iter().map(|(_, value)| value).collect()
    }

    fn same_layout<U>(&self, other: &Record<U>) -> bool {
        self.type_name == other.type_name && self.field_names().eq(other.field_names())
    }
}

/// A nested structure over leaves of type `L`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Structure<L> {
    Leaf(L),
    Seq(Vec<Structure<L>>),
    Map(KeyedMap<Structure<L>>),
    Record(Record<Structure<L>>),
    Annotated(Markers, Box<Structure<L>>),
}

impl<L: Eq> Eq for Structure<L> {}

impl<L> Structure<L> {
    #[must_use]
    pub fn leaf(value: L) -> Self {
        Self::Leaf(value)
    }

    pub fn seq(items: impl IntoIterator<Item = Structure<L>>) -> Self {
        Self::Seq(items.into_iter().collect())
    }

    pub fn map<K: Into<String>>(
        entries: impl IntoIterator<Item = (K, Structure<L>)>,
    ) -> Result<Self> {
        Ok(Self::Map(KeyedMap::from_entries(entries)?))
    }

    pub fn record<K: Into<String>>(
        type_name: impl Into<String>,
        fields: impl IntoIterator<Item = (K, Structure<L>)>,
    ) -> Result<Self> {
        Ok(Self::Record(Record::new(type_name, fields)?))
    }

    /// Wraps `self` with the force-leaf marker.
    #[must_use]
    pub fn force_leaf(self) -> Self {
        self.annotate(Markers {
            force_leaf: true,
            force_positional: false,
        })
    }

    /// Wraps `self` with the force-positional marker.
    #[must_use]
    pub fn force_positional(self) -> Self {
        self.annotate(Markers {
            force_leaf: false,
            force_positional: true,
        })
    }

    #[must_use]
    pub fn annotate(self, markers: Markers) -> Self {
        match self {
            Self::Annotated(existing, inner) => Self::Annotated(existing.union(markers), inner),
            other => Self::Annotated(markers, Box::new(other)),
        }
    }

    /// Union of the markers on every annotation layer wrapping this node.
    #[must_use]
    pub fn markers(&self) -> Markers {
        let mut markers = Markers::default();
        let mut node = self;
        while let Self::Annotated(layer, inner) = node {
            markers = markers.union(*layer);
            node = inner;
        }
        markers
    }

    /// The node with every annotation layer stripped.
    #[must_use]
    pub fn unannotated(&self) -> &Self {
        let mut node = self;
        while let Self::Annotated(_, inner) = node {
            node = inner;
        }
        node
    }

    /// Owned counterpart of [`Structure::unannotated`].
    #[must_use]
    pub fn into_unannotated(self) -> Self {
        let mut node = self;
        while let Self::Annotated(_, inner) = node {
            node = *inner;
        }
        node
    }

    /// Whether the node is a container, regardless of markers.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        matches!(
            self.unannotated(),
            Self::Seq(_) | Self::Map(_) | Self::Record(_)
        )
    }

    #[must_use]
    pub fn as_leaf(&self) -> Option<&L> {
        match self.unannotated() {
            Self::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    /// Container nesting depth; a leaf has depth 0 and every annotation
    /// layer counts as a level. Computed without recursion so it is safe to
    /// call on untrusted input.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(self, 0_usize)];
        while let Some((node, depth)) = stack.pop() {
            match node {
                Self::Leaf(_) => max_depth = max_depth.max(depth),
                Self::Annotated(_, inner) => {
                    max_depth = max_depth.max(depth + 1);
                    stack.push((inner, depth + 1));
                }
                Self::Seq(items) => {
                    max_depth = max_depth.max(depth + 1);
                    stack.extend(items.iter().map(|item| (item, depth + 1)));
                }
                Self::Map(map) => {
                    max_depth = max_depth.max(depth + 1);
                    stack.extend(map.iter().map(|(_, item)| (item, depth + 1)));
                }
                Self::Record(record) => {
                    max_depth = max_depth.max(depth + 1);
                    stack.extend(record.iter().map(|(_, item)| (item, depth + 1)));
                }
            }
        }
        max_depth
    }

    /// Leaves in depth-first order; mappings and records in their stored order.
    #[must_use]
    pub fn flatten(&self) -> Vec<&L> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a L>) {
        match self {
            Self::Leaf(leaf) => out.push(leaf),
            Self::Seq(items) => items.iter().for_each(|item| item.collect_leaves(out)),
            Self::Map(map) => map.iter().for_each(|(_, item)| item.collect_leaves(out)),
            Self::Record(record) => record.iter().for_each(|(_, item)| item.collect_leaves(out)),
            Self::Annotated(_, inner) => inner.collect_leaves(out),
        }
    }

    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.flatten().len()
    }

    /// Applies `f` to every leaf, keeping containers and markers.
    pub fn map_leaves<M>(&self, mut f: impl FnMut(&L) -> M) -> Structure<M> {
        self.map_leaves_inner(&mut f)
    }

    fn map_leaves_inner<M>(&self, f: &mut impl FnMut(&L) -> M) -> Structure<M> {
        match self {
            Self::Leaf(leaf) => Structure::Leaf(f(leaf)),
            Self::Seq(items) => Structure::Seq(items.iter().map(|i| i.map_leaves_inner(f)).collect()),
            Self::Map(map) => Structure::Map(KeyedMap {
                entries: map
                    .iter()
                    .map(|(key, item)| (key.to_owned(), item.map_leaves_inner(f)))
                    .collect(),
            }),
            Self::Record(record) => Structure::Record(Record {
                type_name: record.type_name.clone(),
                fields: record
                    .iter()
                    .map(|(name, item)| (name.to_owned(), item.map_leaves_inner(f)))
                    .collect(),
            }),
            Self::Annotated(markers, inner) => {
                Structure::Annotated(*markers, Box::new(inner.map_leaves_inner(f)))
            }
        }
    }

    /// Applies `f` to every leaf together with its path from the root.
    pub fn map_with_paths<M>(&self, mut f: impl FnMut(&Path, &L) -> M) -> Structure<M> {
        self.map_with_paths_inner(&Path::new(), &mut f)
    }

    fn map_with_paths_inner<M>(
        &self,
        path: &Path,
        f: &mut impl FnMut(&Path, &L) -> M,
    ) -> Structure<M> {
        match self {
            Self::Leaf(leaf) => Structure::Leaf(f(path, leaf)),
            Self::Annotated(markers, inner) => {
                Structure::Annotated(*markers, Box::new(inner.map_with_paths_inner(path, f)))
            }
            Self::Seq(items) => Structure::Seq(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        item.map_with_paths_inner(
                            &child_path(path, PathComponent::Index(index)),
                            f,
                        )
                    })
                    .collect(),
            ),
            Self::Map(map) => Structure::Map(KeyedMap {
                entries: map
                    .iter()
                    .map(|(key, item)| {
                        let component = PathComponent::Key(key.to_owned());
                        let mapped = item.map_with_paths_inner(&child_path(path, component), f);
                        (key.to_owned(), mapped)
                    })
                    .collect(),
            }),
            Self::Record(record) => Structure::Record(Record {
                type_name: record.type_name.clone(),
                fields: record
                    .iter()
                    .map(|(name, item)| {
                        let component = PathComponent::Field(name.to_owned());
                        let mapped = item.map_with_paths_inner(&child_path(path, component), f);
                        (name.to_owned(), mapped)
                    })
                    .collect(),
            }),
        }
    }

    /// Rebuilds a composite node from its immediate children mapped by `f`,
    /// preserving the container kind, keys, field order and markers.
    ///
    /// Returns `None` for leaves.
    pub fn try_map_children<M, E>(
        &self,
        mut f: impl FnMut(PathComponent, &Structure<L>) -> std::result::Result<Structure<M>, E>,
    ) -> Option<std::result::Result<Structure<M>, E>> {
        self.try_map_children_inner(&mut f)
    }

    fn try_map_children_inner<M, E>(
        &self,
        f: &mut impl FnMut(PathComponent, &Structure<L>) -> std::result::Result<Structure<M>, E>,
    ) -> Option<std::result::Result<Structure<M>, E>> {
        let rebuilt = match self {
            Self::Leaf(_) => return None,
            Self::Annotated(markers, inner) => {
                return inner
                    .try_map_children_inner(f)
                    .map(|result| result.map(|s| Structure::Annotated(*markers, Box::new(s))));
            }
            Self::Seq(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| f(PathComponent::Index(index), item))
                .collect::<std::result::Result<Vec<_>, E>>()
                .map(Structure::Seq),
            Self::Map(map) => map
                .iter()
                .map(|(key, item)| {
                    f(PathComponent::Key(key.to_owned()), item).map(|s| (key.to_owned(), s))
                })
                .collect::<std::result::Result<Vec<_>, E>>()
                .map(|entries| Structure::Map(KeyedMap { entries })),
            Self::Record(record) => record
                .iter()
                .map(|(name, item)| {
                    f(PathComponent::Field(name.to_owned()), item).map(|s| (name.to_owned(), s))
                })
                .collect::<std::result::Result<Vec<_>, E>>()
                .map(|fields| {
                    Structure::Record(Record {
                        type_name: record.type_name.clone(),
                        fields,
                    })
                }),
        };
        Some(rebuilt)
    }

    /// Immediate children with the path component leading to each.
    #[must_use]
    pub fn children(&self) -> Vec<(PathComponent, &Structure<L>)> {
        match self.unannotated() {
            Self::Leaf(_) | Self::Annotated(..) => Vec::new(),
            Self::Seq(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| (PathComponent::Index(index), item))
                .collect(),
            Self::Map(map) => map
                .iter()
                .map(|(key, item)| (PathComponent::Key(key.to_owned()), item))
                .collect(),
            Self::Record(record) => record
                .iter()
                .map(|(name, item)| (PathComponent::Field(name.to_owned()), item))
                .collect(),
        }
    }

    /// Short description of this node's container kind, for diagnostics.
    #[must_use]
    pub fn shape_summary(&self) -> String {
        match self.unannotated() {
            Self::Leaf(_) | Self::Annotated(..) => "leaf".to_owned(),
            Self::Seq(items) => format!("seq[{}]", items.len()),
            Self::Map(map) => format!("map{{{}}}", map.keys().collect::<Vec<_>>().join(", ")),
            Self::Record(record) => format!(
                "record {}({})",
                record.type_name(),
                record.field_names().collect::<Vec<_>>().join(", ")
            ),
        }
    }

    /// Same container kinds, key sets and field layouts at every level.
    /// Markers are not part of the shape.
    #[must_use]
    pub fn same_shape<M>(&self, other: &Structure<M>) -> bool {
        assert_same_shape(self, other).is_ok()
    }

    /// The part of the tree made of mappings and records; any sequence,
    /// leaf or force-leaf node below it becomes a unit leaf.
    #[must_use]
    pub fn keyed_skeleton(&self) -> Structure<()> {
        if self.markers().force_leaf {
            return Structure::Leaf(());
        }
        match self.unannotated() {
            Self::Map(map) => Structure::Map(KeyedMap {
                entries: map
                    .iter()
                    .map(|(key, item)| (key.to_owned(), item.keyed_skeleton()))
                    .collect(),
            }),
            Self::Record(record) => Structure::Record(Record {
                type_name: record.type_name.clone(),
                fields: record
                    .iter()
                    .map(|(name, item)| (name.to_owned(), item.keyed_skeleton()))
                    .collect(),
            }),
            Self::Leaf(_) | Self::Seq(_) | Self::Annotated(..) => Structure::Leaf(()),
        }
    }

    /// Pairs the leaves of two structures of identical shape. Mappings pair
    /// by key, so entry order may differ; the output follows `self`.
    pub fn zip<M: Clone>(&self, other: &Structure<M>) -> Result<Structure<(L, M)>>
    where
        L: Clone,
    {
        assert_same_shape(self, other)?;
        try_map_up_to(self, other, |path, left, right| match right.as_leaf() {
            Some(right) => Ok(Structure::Leaf((left.clone(), right.clone()))),
            None => Err(NestError::ShapeMismatch {
                path: path_to_string(path),
                expected: "leaf".to_owned(),
                actual: right.shape_summary(),
            }),
        })
    }
}

/// Structural-equality check; fails with the first differing path.
pub fn assert_same_shape<A, B>(expected: &Structure<A>, actual: &Structure<B>) -> Result<()> {
    assert_same_shape_at(&Path::new(), expected, actual)
}

fn assert_same_shape_at<A, B>(
    path: &Path,
    expected: &Structure<A>,
    actual: &Structure<B>,
) -> Result<()> {
    let mismatch = || NestError::ShapeMismatch {
        path: path_to_string(path),
        expected: expected.shape_summary(),
        actual: actual.shape_summary(),
    };
    match (expected.unannotated(), actual.unannotated()) {
        (Structure::Leaf(_), Structure::Leaf(_)) => Ok(()),
        (Structure::Seq(left), Structure::Seq(right)) => {
            if left.len() != right.len() {
                return Err(mismatch());
            }
            for (index, (l, r)) in left.iter().zip(right).enumerate() {
                assert_same_shape_at(&child_path(path, PathComponent::Index(index)), l, r)?;
            }
            Ok(())
        }
        (Structure::Map(left), Structure::Map(right)) => {
            if !left.same_keys(right) {
                return Err(mismatch());
            }
            for (key, l) in left.iter() {
                let r = right.get(key).ok_or_else(mismatch)?;
                assert_same_shape_at(&child_path(path, PathComponent::Key(key.to_owned())), l, r)?;
            }
            Ok(())
        }
        (Structure::Record(left), Structure::Record(right)) => {
            if !left.same_layout(right) {
                return Err(mismatch());
            }
            for ((name, l), (_, r)) in left.iter().zip(right.iter()) {
                assert_same_shape_at(
                    &child_path(path, PathComponent::Field(name.to_owned())),
                    l,
                    r,
                )?;
            }
            Ok(())
        }
        _ => Err(mismatch()),
    }
}

/// Maps `f` over the leaves of `shallow`, handing it the sub-structure of
/// `deep` found at the same path. The output has `shallow`'s shape with each
/// shallow leaf replaced by the structure `f` returns.
///
/// `deep` must match `shallow` down to `shallow`'s leaves: mappings by key
/// set, sequences and records by arity (a sequence may stand against a
/// record and vice versa). Below a shallow leaf `deep` may nest freely.
pub fn try_map_up_to<T, L, M, E>(
    shallow: &Structure<T>,
    deep: &Structure<L>,
    mut f: impl FnMut(&Path, &T, &Structure<L>) -> std::result::Result<Structure<M>, E>,
) -> std::result::Result<Structure<M>, E>
where
    E: From<NestError>,
{
    map_up_to_inner(&Path::new(), shallow, deep, &mut f)
}

fn map_up_to_inner<T, L, M, E>(
    path: &Path,
    shallow: &Structure<T>,
    deep: &Structure<L>,
    f: &mut impl FnMut(&Path, &T, &Structure<L>) -> std::result::Result<Structure<M>, E>,
) -> std::result::Result<Structure<M>, E>
where
    E: From<NestError>,
{
    let mismatch = || NestError::ShapeMismatch {
        path: path_to_string(path),
        expected: shallow.shape_summary(),
        actual: deep.shape_summary(),
    };
    let deep_children = deep.children();
    match shallow {
        Structure::Annotated(markers, inner) => {
            let mapped = map_up_to_inner(path, inner, deep, f)?;
            Ok(Structure::Annotated(*markers, Box::new(mapped)))
        }
        Structure::Leaf(tag) => f(path, tag, deep),
        Structure::Seq(items) => {
            if !matches!(deep.unannotated(), Structure::Seq(_) | Structure::Record(_))
                || deep_children.len() != items.len()
            {
                return Err(mismatch().into());
            }
            let mut mapped = Vec::with_capacity(items.len());
            for (index, (item, (_, child))) in items.iter().zip(deep_children).enumerate() {
                let sub_path = child_path(path, PathComponent::Index(index));
                mapped.push(map_up_to_inner(&sub_path, item, child, f)?);
            }
            Ok(Structure::Seq(mapped))
        }
        Structure::Record(record) => {
            if !matches!(deep.unannotated(), Structure::Seq(_) | Structure::Record(_))
                || deep_children.len() != record.arity()
            {
                return Err(mismatch().into());
            }
            let mut fields = Vec::with_capacity(record.arity());
            for ((name, item), (_, child)) in record.iter().zip(deep_children) {
                let sub_path = child_path(path, PathComponent::Field(name.to_owned()));
                fields.push((name.to_owned(), map_up_to_inner(&sub_path, item, child, f)?));
            }
            Ok(Structure::Record(Record {
                type_name: record.type_name.clone(),
                fields,
            }))
        }
        Structure::Map(map) => {
            let Structure::Map(deep_map) = deep.unannotated() else {
                return Err(mismatch().into());
            };
            if !map.same_keys(deep_map) {
                return Err(mismatch().into());
            }
            let mut entries = Vec::with_capacity(map.len());
            for (key, item) in map.iter() {
                let child = deep_map.get(key).ok_or_else(mismatch)?;
                let sub_path = child_path(path, PathComponent::Key(key.to_owned()));
                entries.push((key.to_owned(), map_up_to_inner(&sub_path, item, child, f)?));
            }
            Ok(Structure::Map(KeyedMap { entries }))
        }
    }
}
