//! Treap primitives and the divide-and-conquer merge engine.
//!
//! Everything here is generic over the node kind: the set and map pools
//! each implement [`Factory`], and their nodes implement [`TreapNode`].
//! All functions are pure with respect to existing nodes; structural change
//! only ever allocates new interned nodes.
//!
//! Node priorities are a fixed function of the key, so the shape of a tree
//! is determined by its key set alone.  Two consequences the merge code
//! leans on:
//!
//! * equal subtrees are pointer-equal, so `Arc::ptr_eq` both tests content
//!   equality in O(1) and lets merges skip shared subtrees entirely;
//! * when two roots rank `Left` or `Right`, the winning root's key cannot
//!   occur anywhere in the losing tree (its priority would contradict the
//!   losing root's heap position), so splitting the loser never has to
//!   handle an equal key.

use std::cmp::Ordering;
use std::sync::Arc;

pub(crate) type Link<N> = Option<Arc<N>>;

pub(crate) type KeyOf<F> = <<F as Factory>::Node as TreapNode>::Key;

/// Read-only view of one tree node.
pub(crate) trait TreapNode: Sized {
    type Key: Ord;

    fn key(&self) -> &Self::Key;
    fn priority(&self) -> u64;
    /// Subtree size.
    fn len(&self) -> usize;
    fn left(&self) -> &Link<Self>;
    fn right(&self) -> &Link<Self>;
}

/// Canonicalizing node constructors for one node kind.
pub(crate) trait Factory {
    type Node: TreapNode;
    /// What a leaf is built from: the key for sets, the entry for maps.
    type Item;

    fn make_leaf(&self, item: Self::Item) -> Arc<Self::Node>;

    /// Interns a node carrying `parent`'s payload and priority over new
    /// children.
    fn make_from(
        &self,
        parent: &Arc<Self::Node>,
        left: Link<Self::Node>,
        right: Link<Self::Node>,
    ) -> Arc<Self::Node>;
}

/// How two roots relate in the treap order.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Ranking {
    /// Left root outranks (lower priority): it becomes the merge root.
    Left,
    /// Same position: equal priority and equal key.
    Same,
    Right,
    /// Same position but different payload.  Only produced by the map
    /// containers' entry-aware ranker.
    SameKey,
}

/// Ranks two roots by `(priority, key)`.
pub(crate) fn rank<N: TreapNode>(left: &N, right: &N) -> Ranking {
    match left.priority().cmp(&right.priority()) {
        Ordering::Less => Ranking::Left,
        Ordering::Greater => Ranking::Right,
        Ordering::Equal => match left.key().cmp(right.key()) {
            Ordering::Less => Ranking::Left,
            Ordering::Greater => Ranking::Right,
            Ordering::Equal => Ranking::Same,
        },
    }
}

pub(crate) fn len<N: TreapNode>(link: &Link<N>) -> usize {
    link.as_ref().map_or(0, |n| n.len())
}

/// Pointer identity on optional nodes.  Under hash-consing this is content
/// equality.
pub(crate) fn same_node<N>(a: &Link<N>, b: &Link<N>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

/// Returns `parent` with its left child replaced, reusing `parent` itself
/// when the child is unchanged.
pub(crate) fn replace_left<F: Factory>(
    f: &F,
    parent: &Arc<F::Node>,
    child: Link<F::Node>,
) -> Arc<F::Node> {
    if same_node(parent.left(), &child) {
        Arc::clone(parent)
    } else {
        f.make_from(parent, child, parent.right().clone())
    }
}

pub(crate) fn replace_right<F: Factory>(
    f: &F,
    parent: &Arc<F::Node>,
    child: Link<F::Node>,
) -> Arc<F::Node> {
    if same_node(parent.right(), &child) {
        Arc::clone(parent)
    } else {
        f.make_from(parent, parent.left().clone(), child)
    }
}

/// Concatenates two trees.  Every key in `left` must be less than every key
/// in `right`.
pub(crate) fn join<F: Factory>(f: &F, left: &Link<F::Node>, right: &Link<F::Node>) -> Link<F::Node> {
    let l = match left {
        Some(l) => l,
        None => return right.clone(),
    };
    let r = match right {
        Some(r) => r,
        None => return left.clone(),
    };
    match rank(l.as_ref(), r.as_ref()) {
        Ranking::Left => Some(replace_right(f, l, join(f, l.right(), right))),
        Ranking::Right => Some(replace_left(f, r, join(f, left, r.left()))),
        _ => unreachable!("join requires disjoint key ranges"),
    }
}

/// Splits a tree into the subtrees holding keys `< key` and keys `>= key`.
pub(crate) fn split<F: Factory>(
    f: &F,
    link: &Link<F::Node>,
    key: &KeyOf<F>,
) -> (Link<F::Node>, Link<F::Node>) {
    let p = match link {
        Some(p) => p,
        None => return (None, None),
    };
    match p.key().cmp(key) {
        Ordering::Less => {
            let (lo, hi) = split(f, p.right(), key);
            (Some(replace_right(f, p, lo)), hi)
        }
        _ => {
            let (lo, hi) = split(f, p.left(), key);
            (lo, Some(replace_left(f, p, hi)))
        }
    }
}

/// The first `count` elements as a tree.
pub(crate) fn head<F: Factory>(f: &F, link: &Link<F::Node>, count: usize) -> Link<F::Node> {
    let mut link = link;
    while let Some(n) = link {
        if count > len(n.left()) {
            break;
        }
        link = n.left();
    }
    let n = match link {
        Some(n) => n,
        None => return None,
    };
    if count == n.len() {
        return link.clone();
    }
    Some(replace_right(f, n, head(f, n.right(), count - len(n.left()) - 1)))
}

/// All but the first `first` elements as a tree.
pub(crate) fn tail<F: Factory>(f: &F, link: &Link<F::Node>, first: usize) -> Link<F::Node> {
    let mut link = link;
    let mut first = first;
    while let Some(n) = link {
        if first <= len(n.left()) {
            break;
        }
        first -= len(n.left()) + 1;
        link = n.right();
    }
    match link {
        Some(n) if first > 0 => Some(replace_left(f, n, tail(f, n.left(), first))),
        _ => link.clone(),
    }
}

/// The node at in-order index `k`, or `None` when out of range.
pub(crate) fn at_index<N: TreapNode>(link: &Link<N>, mut k: usize) -> Option<&N> {
    let mut node = link.as_deref()?;
    if k >= node.len() {
        return None;
    }
    loop {
        let left = len(node.left());
        match k.cmp(&left) {
            Ordering::Less => node = node.left().as_deref()?,
            Ordering::Equal => return Some(node),
            Ordering::Greater => {
                k -= left + 1;
                node = node.right().as_deref()?;
            }
        }
    }
}

/// The leftmost node for which `below` is false, with its in-order index.
/// When every node is below, returns `(None, len)`.
pub(crate) fn lower_bound<'a, N: TreapNode>(
    link: &'a Link<N>,
    mut below: impl FnMut(&N) -> bool,
) -> (Option<&'a N>, usize) {
    let mut best = (None, len(link));
    let mut pos = 0;
    let mut cur = link.as_deref();
    while let Some(n) = cur {
        if below(n) {
            pos += len(n.left()) + 1;
            cur = n.right().as_deref();
        } else {
            best = (Some(n), pos + len(n.left()));
            cur = n.left().as_deref();
        }
    }
    best
}

pub(crate) fn union<F: Factory>(
    f: &F,
    left: &Link<F::Node>,
    right: &Link<F::Node>,
) -> Link<F::Node> {
    let (l, r) = match (left, right) {
        _ if same_node(left, right) => return left.clone(),
        (None, _) => return right.clone(),
        (_, None) => return left.clone(),
        (Some(l), Some(r)) => (l, r),
    };
    match rank(l.as_ref(), r.as_ref()) {
        Ranking::Left => {
            let (lo, hi) = split(f, right, l.key());
            Some(f.make_from(l, union(f, l.left(), &lo), union(f, l.right(), &hi)))
        }
        Ranking::Right => {
            let (lo, hi) = split(f, left, r.key());
            Some(f.make_from(r, union(f, &lo, r.left()), union(f, &hi, r.right())))
        }
        // Both roots carry the same key: keep the left one.
        _ => Some(f.make_from(l, union(f, l.left(), r.left()), union(f, l.right(), r.right()))),
    }
}

pub(crate) fn intersection<F, R>(
    f: &F,
    ranker: &R,
    left: &Link<F::Node>,
    right: &Link<F::Node>,
) -> Link<F::Node>
where
    F: Factory,
    R: Fn(&F::Node, &F::Node) -> Ranking,
{
    let (l, r) = match (left, right) {
        (Some(l), Some(r)) => (l, r),
        _ => return None,
    };
    if Arc::ptr_eq(l, r) {
        return left.clone();
    }
    match ranker(l, r) {
        Ranking::Left => {
            let (lo, hi) = split(f, right, l.key());
            join(
                f,
                &intersection(f, ranker, l.left(), &lo),
                &intersection(f, ranker, l.right(), &hi),
            )
        }
        Ranking::Right => {
            let (lo, hi) = split(f, left, r.key());
            join(
                f,
                &intersection(f, ranker, &lo, r.left()),
                &intersection(f, ranker, &hi, r.right()),
            )
        }
        Ranking::SameKey => join(
            f,
            &intersection(f, ranker, l.left(), r.left()),
            &intersection(f, ranker, l.right(), r.right()),
        ),
        Ranking::Same => Some(f.make_from(
            l,
            intersection(f, ranker, l.left(), r.left()),
            intersection(f, ranker, l.right(), r.right()),
        )),
    }
}

pub(crate) fn difference<F, R>(
    f: &F,
    ranker: &R,
    left: &Link<F::Node>,
    right: &Link<F::Node>,
) -> Link<F::Node>
where
    F: Factory,
    R: Fn(&F::Node, &F::Node) -> Ranking,
{
    if same_node(left, right) {
        return None;
    }
    let l = match left {
        Some(l) => l,
        None => return None,
    };
    let r = match right {
        Some(r) => r,
        None => return left.clone(),
    };
    match ranker(l, r) {
        Ranking::Left => {
            let (lo, hi) = split(f, right, l.key());
            Some(f.make_from(
                l,
                difference(f, ranker, l.left(), &lo),
                difference(f, ranker, l.right(), &hi),
            ))
        }
        Ranking::Right => {
            let (lo, hi) = split(f, left, r.key());
            join(
                f,
                &difference(f, ranker, &lo, r.left()),
                &difference(f, ranker, &hi, r.right()),
            )
        }
        Ranking::SameKey => Some(f.make_from(
            l,
            difference(f, ranker, l.left(), r.left()),
            difference(f, ranker, l.right(), r.right()),
        )),
        Ranking::Same => join(
            f,
            &difference(f, ranker, l.left(), r.left()),
            &difference(f, ranker, l.right(), r.right()),
        ),
    }
}

pub(crate) fn symmetric_difference<F: Factory>(
    f: &F,
    left: &Link<F::Node>,
    right: &Link<F::Node>,
) -> Link<F::Node> {
    let l = match left {
        Some(l) => l,
        None => return right.clone(),
    };
    let r = match right {
        Some(r) => r,
        None => return left.clone(),
    };
    if Arc::ptr_eq(l, r) {
        return None;
    }
    match rank(l.as_ref(), r.as_ref()) {
        Ranking::Left => {
            let (lo, hi) = split(f, right, l.key());
            Some(f.make_from(
                l,
                symmetric_difference(f, l.left(), &lo),
                symmetric_difference(f, l.right(), &hi),
            ))
        }
        Ranking::Right => {
            let (lo, hi) = split(f, left, r.key());
            Some(f.make_from(
                r,
                symmetric_difference(f, &lo, r.left()),
                symmetric_difference(f, &hi, r.right()),
            ))
        }
        _ => join(
            f,
            &symmetric_difference(f, l.left(), r.left()),
            &symmetric_difference(f, l.right(), r.right()),
        ),
    }
}

/// Does `left` contain every element of `right`?
pub(crate) fn includes<F, R>(
    f: &F,
    ranker: &R,
    left: &Link<F::Node>,
    right: &Link<F::Node>,
) -> bool
where
    F: Factory,
    R: Fn(&F::Node, &F::Node) -> Ranking,
{
    let r = match right {
        Some(r) => r,
        None => return true,
    };
    if same_node(left, right) {
        return true;
    }
    let l = match left {
        Some(l) => l,
        None => return false,
    };
    if l.len() < r.len() {
        return false;
    }
    match ranker(l, r) {
        Ranking::Left => {
            let (lo, hi) = split(f, right, l.key());
            includes(f, ranker, l.left(), &lo) && includes(f, ranker, l.right(), &hi)
        }
        Ranking::Same => {
            includes(f, ranker, l.left(), r.left()) && includes(f, ranker, l.right(), r.right())
        }
        // A Right or SameKey root is in `right` only, so inclusion fails.
        _ => false,
    }
}

/// Removes the node whose key equals `key`.  The returned flag is internal
/// to the recursion: it reports that the search bottomed out, letting
/// ancestors rebuild (or keep) their spine without a second comparison.
pub(crate) fn remove_key<F: Factory>(
    f: &F,
    link: &Link<F::Node>,
    key: &KeyOf<F>,
) -> (Link<F::Node>, bool) {
    let p = match link {
        Some(p) => p,
        None => return (None, false),
    };
    if *p.key() < *key {
        let (sub, settled) = remove_key(f, p.right(), key);
        if settled {
            (Some(replace_right(f, p, sub)), true)
        } else {
            (link.clone(), false)
        }
    } else {
        let (sub, settled) = remove_key(f, p.left(), key);
        if settled {
            return (Some(replace_left(f, p, sub)), true);
        }
        if *p.key() != *key {
            return (link.clone(), true);
        }
        (join(f, p.left(), p.right()), true)
    }
}

/// Builds a tree from arbitrary input by unioning batches of doubling
/// size (1, 1, 2, 4, ...).  Random input costs O(n log n) expected;
/// presorted input degrades to O(n) because successive batches only touch
/// a tree edge.
pub(crate) fn build<F, I>(f: &F, iter: &mut I) -> Link<F::Node>
where
    F: Factory,
    I: Iterator<Item = F::Item>,
{
    build_batch(f, iter, u32::MAX)
}

fn build_batch<F, I>(f: &F, iter: &mut I, max_depth: u32) -> Link<F::Node>
where
    F: Factory,
    I: Iterator<Item = F::Item>,
{
    let item = match iter.next() {
        Some(item) => item,
        None => return None,
    };
    let mut root = Some(f.make_leaf(item));
    for depth in 0..max_depth {
        let branch = build_batch(f, iter, depth);
        if branch.is_none() {
            break;
        }
        root = union(f, &root, &branch);
    }
    root
}
