#![forbid(unsafe_code)]

use crate::structure::Structure;

/// Broadcasts `from_structure` to the shape of `to_structure`.
///
/// If `from_structure` flattens to a single leaf, that leaf is placed at every
/// leaf position of `to_structure`. Anything else is returned unchanged; a
/// caller that needs matching shapes checks them afterwards.
///
/// ```
/// use nx_nest::{Structure, broadcast_structure};
///
/// let to = Structure::seq(["a", "b", "c"].map(Structure::leaf));
/// let from = broadcast_structure(&to, Structure::leaf("d"));
/// assert_eq!(from, Structure::seq(["d", "d", "d"].map(Structure::leaf)));
/// ```
pub fn broadcast_structure<T, L: Clone>(
    to_structure: &Structure<T>,
    from_structure: Structure<L>,
) -> Structure<L> {
    let single = match from_structure.flatten().as_slice() {
        [only] => Some((*only).clone()),
        _ => None,
    };
    match single {
        Some(leaf) => to_structure.map_leaves(|_| leaf.clone()),
        None => from_structure,
    }
}
