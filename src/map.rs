//! A sorted map layered over the set engine.
//!
//! Every map node embeds the canonical set node for its key position, so a
//! map tree is congruent to the set tree over its keys and
//! [`Map::key_set`] is constant time.  Map merges run through the same
//! engine as set merges; operations that compare whole entries
//! (intersection, difference, includes) use an entry-aware ranking that
//! distinguishes equal keys with different mapped values.

use std::fmt::{Debug, Formatter};
use std::hash::{BuildHasher, Hash};
use std::iter::FusedIterator;
use std::ops::{Index, Range};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxBuildHasher;

use crate::cursor::RawCursor;
use crate::error::Error;
use crate::intern::{self, InternTable};
use crate::set::{Set, SetCore, SetNode, SetProvider};
use crate::tree::{self, Factory, Link, Ranking, TreapNode};

/// An immutable, interned map node.
///
/// The key, priority, and subtree size all live in `key_node`; the map
/// node adds only the mapped value and the map-level children.
pub(crate) struct MapNode<K, V, S> {
    mapped: V,
    key_node: Arc<SetNode<K, S>>,
    hash: u64,
    left: Link<MapNode<K, V, S>>,
    right: Link<MapNode<K, V, S>>,
    pool: Arc<MapCore<K, V, S>>,
}

impl<K, V, S> MapNode<K, V, S> {
    pub(crate) fn mapped(&self) -> &V {
        &self.mapped
    }

    #[cfg(test)]
    pub(crate) fn key_node(&self) -> &Arc<SetNode<K, S>> {
        &self.key_node
    }
}

fn link_hash<K, V, S>(link: &Link<MapNode<K, V, S>>) -> u64 {
    link.as_ref().map_or(0, |n| n.hash)
}

fn key_link<K, V, S>(link: &Link<MapNode<K, V, S>>) -> Link<SetNode<K, S>> {
    link.as_ref().map(|n| Arc::clone(&n.key_node))
}

impl<K: Ord, V, S> TreapNode for MapNode<K, V, S> {
    type Key = K;

    fn key(&self) -> &K {
        self.key_node.value()
    }

    fn priority(&self) -> u64 {
        self.key_node.priority()
    }

    fn len(&self) -> usize {
        self.key_node.len()
    }

    fn left(&self) -> &Link<Self> {
        &self.left
    }

    fn right(&self) -> &Link<Self> {
        &self.right
    }
}

impl<K, V, S> Drop for MapNode<K, V, S> {
    fn drop(&mut self) {
        let ptr: *const Self = self;
        self.pool.table.lock().evict(self.hash, ptr);
    }
}

/// Shared state of one map provider: the map interning table, the hasher
/// for mapped values, and the set pool the key nodes live in.
pub(crate) struct MapCore<K, V, S> {
    table: Mutex<InternTable<MapNode<K, V, S>>>,
    hasher: S,
    keys: Arc<SetCore<K, S>>,
}

impl<K, V, S> Drop for MapCore<K, V, S> {
    fn drop(&mut self) {
        debug_assert!(self.table.lock().is_empty());
    }
}

impl<K, V, S> MapCore<K, V, S>
where
    K: Clone + Hash + Ord,
    V: Clone + Hash + Eq,
    S: BuildHasher,
{
    fn new(hasher: S, keys: Arc<SetCore<K, S>>) -> Arc<Self> {
        Arc::new(MapCore {
            table: Mutex::new(InternTable::new()),
            hasher,
            keys,
        })
    }

    fn len(&self) -> usize {
        self.table.lock().len()
    }

    fn make(
        self: &Arc<Self>,
        mapped: V,
        key_node: Arc<SetNode<K, S>>,
        left: Link<MapNode<K, V, S>>,
        right: Link<MapNode<K, V, S>>,
    ) -> Arc<MapNode<K, V, S>> {
        let hash = intern::hash_combine(
            intern::hash_combine(link_hash(&left), link_hash(&right)),
            intern::hash_combine(self.hasher.hash_one(&mapped), key_node.node_hash()),
        );
        // See SetCore::make: parked candidates must outlive the guard.
        let mut holding = Vec::new();
        let mut table = self.table.lock();
        if let Some(existing) = table.find(
            hash,
            |n| {
                tree::same_node(&n.left, &left)
                    && tree::same_node(&n.right, &right)
                    && Arc::ptr_eq(&n.key_node, &key_node)
                    && n.mapped == mapped
            },
            &mut holding,
        ) {
            return existing;
        }
        let node = Arc::new(MapNode {
            mapped,
            key_node,
            hash,
            left,
            right,
            pool: Arc::clone(self),
        });
        table.insert(hash, &node);
        node
    }

    /// Interns the entry node for `(key, mapped)` over the given children,
    /// building its key-set node in lock-step.
    fn make_entry(
        self: &Arc<Self>,
        key: K,
        mapped: V,
        left: Link<MapNode<K, V, S>>,
        right: Link<MapNode<K, V, S>>,
    ) -> Arc<MapNode<K, V, S>> {
        let priority = intern::intmix(self.keys.key_hash(&key));
        let key_node = self.keys.make(key, priority, key_link(&left), key_link(&right));
        self.make(mapped, key_node, left, right)
    }
}

impl<K, V, S> Factory for Arc<MapCore<K, V, S>>
where
    K: Clone + Hash + Ord,
    V: Clone + Hash + Eq,
    S: BuildHasher,
{
    type Node = MapNode<K, V, S>;
    type Item = (K, V);

    fn make_leaf(&self, (key, mapped): (K, V)) -> Arc<MapNode<K, V, S>> {
        self.make_entry(key, mapped, None, None)
    }

    fn make_from(
        &self,
        parent: &Arc<MapNode<K, V, S>>,
        left: Link<MapNode<K, V, S>>,
        right: Link<MapNode<K, V, S>>,
    ) -> Arc<MapNode<K, V, S>> {
        let key_node = self
            .keys
            .make_from(&parent.key_node, key_link(&left), key_link(&right));
        self.make(parent.mapped.clone(), key_node, left, right)
    }
}

/// Ranks two map roots as whole entries: equal keys with different mapped
/// values are the same position but not the same element.
fn rank_entries<K: Ord, V: Eq, S>(l: &MapNode<K, V, S>, r: &MapNode<K, V, S>) -> Ranking {
    match tree::rank(l, r) {
        Ranking::Same if l.mapped != r.mapped => Ranking::SameKey,
        rk => rk,
    }
}

/// Entries of the map whose keys are in the set.
///
/// Descends on the map while splitting the set, ranking the map root's
/// key node against the set root.  A submap whose key tree *is* the set
/// operand is returned whole.
fn intersect_keys<K, V, S>(
    f: &Arc<MapCore<K, V, S>>,
    left: &Link<MapNode<K, V, S>>,
    right: &Link<SetNode<K, S>>,
) -> Link<MapNode<K, V, S>>
where
    K: Clone + Hash + Ord,
    V: Clone + Hash + Eq,
    S: BuildHasher,
{
    let (l, r) = match (left, right) {
        (Some(l), Some(r)) => (l, r),
        _ => return None,
    };
    if Arc::ptr_eq(&l.key_node, r) {
        return left.clone();
    }
    match tree::rank(l.key_node.as_ref(), r.as_ref()) {
        Ranking::Left => {
            let (lo, hi) = tree::split(&f.keys, right, l.key());
            tree::join(
                f,
                &intersect_keys(f, l.left(), &lo),
                &intersect_keys(f, l.right(), &hi),
            )
        }
        Ranking::Right => {
            let (lo, hi) = tree::split(f, left, r.key());
            tree::join(
                f,
                &intersect_keys(f, &lo, r.left()),
                &intersect_keys(f, &hi, r.right()),
            )
        }
        _ => Some(f.make_from(
            l,
            intersect_keys(f, l.left(), r.left()),
            intersect_keys(f, l.right(), r.right()),
        )),
    }
}

/// Entries of the map whose keys are not in the set.
fn subtract_keys<K, V, S>(
    f: &Arc<MapCore<K, V, S>>,
    left: &Link<MapNode<K, V, S>>,
    right: &Link<SetNode<K, S>>,
) -> Link<MapNode<K, V, S>>
where
    K: Clone + Hash + Ord,
    V: Clone + Hash + Eq,
    S: BuildHasher,
{
    let l = match left {
        Some(l) => l,
        None => return None,
    };
    let r = match right {
        Some(r) => r,
        None => return left.clone(),
    };
    if Arc::ptr_eq(&l.key_node, r) {
        return None;
    }
    match tree::rank(l.key_node.as_ref(), r.as_ref()) {
        Ranking::Left => {
            let (lo, hi) = tree::split(&f.keys, right, l.key());
            Some(f.make_from(
                l,
                subtract_keys(f, l.left(), &lo),
                subtract_keys(f, l.right(), &hi),
            ))
        }
        Ranking::Right => {
            let (lo, hi) = tree::split(f, left, r.key());
            tree::join(
                f,
                &subtract_keys(f, &lo, r.left()),
                &subtract_keys(f, &hi, r.right()),
            )
        }
        _ => tree::join(
            f,
            &subtract_keys(f, l.left(), r.left()),
            &subtract_keys(f, l.right(), r.right()),
        ),
    }
}

fn default_core<K, V, S>() -> Arc<MapCore<K, V, S>>
where
    K: Clone + Hash + Ord + Send + Sync + 'static,
    V: Clone + Hash + Eq + Send + Sync + 'static,
    S: BuildHasher + Default + Send + Sync + 'static,
{
    intern::default_pool(|| MapCore::new(S::default(), crate::set::default_core::<K, S>()))
}

/// A map node pool.  It extends a set provider: key nodes are interned in
/// the embedded set pool, assignment nodes in this pool.
pub struct MapProvider<K, V, S = FxBuildHasher> {
    core: Arc<MapCore<K, V, S>>,
}

impl<K, V, S> Clone for MapProvider<K, V, S> {
    fn clone(&self) -> Self {
        MapProvider {
            core: Arc::clone(&self.core),
        }
    }
}

impl<K, V> MapProvider<K, V>
where
    K: Clone + Hash + Ord + Send + Sync + 'static,
    V: Clone + Hash + Eq + Send + Sync + 'static,
{
    /// Creates a provider extending the process-wide default set provider.
    pub fn new() -> Self {
        MapProvider {
            core: MapCore::new(
                FxBuildHasher::default(),
                crate::set::default_core::<K, FxBuildHasher>(),
            ),
        }
    }
}

impl<K, V> Default for MapProvider<K, V>
where
    K: Clone + Hash + Ord + Send + Sync + 'static,
    V: Clone + Hash + Eq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> MapProvider<K, V, S>
where
    K: Clone + Hash + Ord,
    V: Clone + Hash + Eq,
    S: BuildHasher,
{
    /// Creates a provider extending an explicit set provider.  Maps from
    /// this provider interoperate with sets from `set_provider`.
    pub fn with_set_provider(set_provider: &SetProvider<K, S>) -> Self
    where
        S: Default,
    {
        Self::with_hasher(S::default(), set_provider)
    }

    pub fn with_hasher(hasher: S, set_provider: &SetProvider<K, S>) -> Self {
        MapProvider {
            core: MapCore::new(hasher, Arc::clone(set_provider.core())),
        }
    }

    /// Number of live map nodes owned by this provider (key nodes are
    /// counted by the set provider).
    pub fn size(&self) -> usize {
        self.core.len()
    }

    /// The set provider this map provider extends.
    pub fn set_provider(&self) -> SetProvider<K, S> {
        SetProvider::from_core(Arc::clone(&self.core.keys))
    }
}

impl<K, V, S> Debug for MapProvider<K, V, S>
where
    K: Clone + Hash + Ord,
    V: Clone + Hash + Eq,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapProvider").field("size", &self.size()).finish()
    }
}

/// A sorted map from keys to values, persistent and confluent.
///
/// Shares all the properties of [`Set`]: O(1) `clone`, `==`, and
/// [`hash`](Map::hash); merge costs bounded by the smaller operand and by
/// the symmetric difference.  Two maps relate entry-wise: an entry is
/// common to both operands only when key *and* mapped value agree.
///
/// # Examples
/// ```
/// use interned_collections::Map;
///
/// let a = Map::<&str, i32>::from([("a", 1), ("b", 2)]);
/// let b = Map::<&str, i32>::from([("b", 9), ("c", 3)]);
/// let u = a.union(&b); // left operand wins at shared keys
/// assert_eq!(u[&"b"], 2);
/// assert_eq!(u.len(), 3);
/// ```
pub struct Map<K, V, S = FxBuildHasher> {
    core: Arc<MapCore<K, V, S>>,
    root: Link<MapNode<K, V, S>>,
}

impl<K, V, S> Clone for Map<K, V, S> {
    fn clone(&self) -> Self {
        Map {
            core: Arc::clone(&self.core),
            root: self.root.clone(),
        }
    }
}

impl<K, V, S> Map<K, V, S>
where
    K: Clone + Hash + Ord + Send + Sync + 'static,
    V: Clone + Hash + Eq + Send + Sync + 'static,
    S: BuildHasher + Default + Send + Sync + 'static,
{
    /// Creates an empty map on the process-wide default provider for this
    /// parameterization.
    pub fn new() -> Self {
        Map {
            core: default_core::<K, V, S>(),
            root: None,
        }
    }
}

impl<K, V, S> Default for Map<K, V, S>
where
    K: Clone + Hash + Ord + Send + Sync + 'static,
    V: Clone + Hash + Eq + Send + Sync + 'static,
    S: BuildHasher + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> Map<K, V, S>
where
    K: Clone + Hash + Ord,
    V: Clone + Hash + Eq,
    S: BuildHasher,
{
    pub fn new_in(provider: &MapProvider<K, V, S>) -> Self {
        Map {
            core: Arc::clone(&provider.core),
            root: None,
        }
    }

    /// Creates a map from an iterator on the given provider.  The first
    /// occurrence of a key wins.
    pub fn from_iter_in<I: IntoIterator<Item = (K, V)>>(
        iter: I,
        provider: &MapProvider<K, V, S>,
    ) -> Self {
        let mut iter = iter.into_iter();
        let root = tree::build(&provider.core, &mut iter);
        Map {
            core: Arc::clone(&provider.core),
            root,
        }
    }

    pub fn provider(&self) -> MapProvider<K, V, S> {
        MapProvider {
            core: Arc::clone(&self.core),
        }
    }

    pub fn len(&self) -> usize {
        tree::len(&self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// The combined hash of all entries.  Constant time.
    pub fn hash(&self) -> u64 {
        link_hash(&self.root)
    }

    pub fn clear(&mut self) {
        self.root = None;
    }

    /// The set of this map's keys.  Constant time: the root of the key
    /// set already exists inside the map's root node.
    ///
    /// # Examples
    /// ```
    /// use interned_collections::{Map, Set};
    ///
    /// let m = Map::from([(1, "one"), (2, "two")]);
    /// let keys: Set<i32> = [1, 2].into();
    /// assert_eq!(m.key_set(), keys);
    /// ```
    pub fn key_set(&self) -> Set<K, S> {
        Set::from_parts(Arc::clone(&self.core.keys), key_link(&self.root))
    }

    /// Inserts an entry unless its key is already present, returning the
    /// number of entries inserted (0 or 1).
    pub fn insert(&mut self, entry: (K, V)) -> usize {
        let leaf = Some(self.core.make_leaf(entry));
        let next = tree::union(&self.core, &self.root, &leaf);
        self.grow(next)
    }

    /// Inserts every entry of an iterator whose key is not already
    /// present, returning the number of entries inserted.
    pub fn insert_all<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) -> usize {
        let mut iter = iter.into_iter();
        let batch = tree::build(&self.core, &mut iter);
        let next = tree::union(&self.core, &self.root, &batch);
        self.grow(next)
    }

    /// Inserts every entry of another map whose key is not already
    /// present, returning the number of entries inserted.
    pub fn insert_map(&mut self, other: &Self) -> usize {
        self.check(other);
        let next = tree::union(&self.core, &self.root, &other.root);
        self.grow(next)
    }

    /// Inserts an entry, replacing any entry with the same key.  Returns
    /// whether the map changed.
    ///
    /// # Examples
    /// ```
    /// use interned_collections::Map;
    ///
    /// let mut m = Map::<&str, i32>::from([("a", 1), ("b", 2)]);
    /// assert!(m.insert_or_assign(("a", 9)));
    /// assert_eq!(m[&"a"], 9);
    /// assert!(!m.insert_or_assign(("a", 9)));
    /// ```
    pub fn insert_or_assign(&mut self, entry: (K, V)) -> bool {
        let leaf = Some(self.core.make_leaf(entry));
        self.assign(tree::union(&self.core, &leaf, &self.root))
    }

    /// Inserts every entry of an iterator, replacing entries with equal
    /// keys.  Returns whether the map changed.
    pub fn insert_or_assign_all<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) -> bool {
        let mut iter = iter.into_iter();
        let batch = tree::build(&self.core, &mut iter);
        self.assign(tree::union(&self.core, &batch, &self.root))
    }

    /// Inserts every entry of another map, replacing entries with equal
    /// keys.  Returns whether the map changed.
    pub fn insert_or_assign_map(&mut self, other: &Self) -> bool {
        self.check(other);
        self.assign(tree::union(&self.core, &other.root, &self.root))
    }

    /// Erases the entry with the given key, returning the number of
    /// entries erased (0 or 1).
    pub fn erase(&mut self, key: &K) -> usize {
        let (next, _) = tree::remove_key(&self.core, &self.root, key);
        self.shrink(next)
    }

    /// Erases every entry that is also in `other` (same key and same
    /// mapped value), returning the number of entries erased.
    pub fn erase_map(&mut self, other: &Self) -> usize {
        self.check(other);
        let next = tree::difference(&self.core, &rank_entries, &self.root, &other.root);
        self.shrink(next)
    }

    /// Keeps only the entries that are also in `other` (same key and same
    /// mapped value), returning the number of entries erased.
    pub fn retain_map(&mut self, other: &Self) -> usize {
        self.check(other);
        let next = tree::intersection(&self.core, &rank_entries, &self.root, &other.root);
        self.shrink(next)
    }

    /// Erases every entry whose key is in the given set, returning the
    /// number of entries erased.
    pub fn erase_keys(&mut self, keys: &Set<K, S>) -> usize {
        self.check_set(keys);
        let next = subtract_keys(&self.core, &self.root, keys.root());
        self.shrink(next)
    }

    /// Keeps only the entries whose key is in the given set, returning
    /// the number of entries erased.
    pub fn retain_keys(&mut self, keys: &Set<K, S>) -> usize {
        self.check_set(keys);
        let next = intersect_keys(&self.core, &self.root, keys.root());
        self.shrink(next)
    }

    /// Erases the entries at the given index range, returning the number
    /// of entries erased.
    pub fn erase_range(&mut self, range: Range<usize>) -> usize {
        self.check_range(&range);
        let lo = tree::head(&self.core, &self.root, range.start);
        let hi = tree::tail(&self.core, &self.root, range.end);
        let next = tree::join(&self.core, &lo, &hi);
        self.shrink(next)
    }

    /// Keeps only the entries at the given index range, returning the
    /// number of entries erased.
    pub fn retain_range(&mut self, range: Range<usize>) -> usize {
        self.check_range(&range);
        let kept = tree::head(&self.core, &self.root, range.end);
        let next = tree::tail(&self.core, &kept, range.start);
        self.shrink(next)
    }

    /// The union of two maps.  At keys present in both, the entry comes
    /// from `self`.
    pub fn union(&self, other: &Self) -> Self {
        self.check(other);
        self.derived(tree::union(&self.core, &self.root, &other.root))
    }

    /// The entries present in both maps with equal mapped values.
    pub fn intersection(&self, other: &Self) -> Self {
        self.check(other);
        self.derived(tree::intersection(
            &self.core,
            &rank_entries,
            &self.root,
            &other.root,
        ))
    }

    /// The entries of `self` not present in `other`.  An entry whose key
    /// exists in `other` under a different mapped value is kept.
    pub fn difference(&self, other: &Self) -> Self {
        self.check(other);
        self.derived(tree::difference(
            &self.core,
            &rank_entries,
            &self.root,
            &other.root,
        ))
    }

    /// The entries whose keys are in the given set.
    pub fn intersect_with(&self, keys: &Set<K, S>) -> Self {
        self.check_set(keys);
        self.derived(intersect_keys(&self.core, &self.root, keys.root()))
    }

    /// The entries whose keys are not in the given set.
    pub fn subtract(&self, keys: &Set<K, S>) -> Self {
        self.check_set(keys);
        self.derived(subtract_keys(&self.core, &self.root, keys.root()))
    }

    /// Does this map contain every entry of `other`, mapped values
    /// included?
    pub fn includes(&self, other: &Self) -> bool {
        self.check(other);
        tree::includes(&self.core, &rank_entries, &self.root, &other.root)
    }

    /// The mapped value at `key`, or [`Error::KeyNotFound`].
    ///
    /// # Examples
    /// ```
    /// use interned_collections::{Error, Map};
    ///
    /// let m = Map::<&str, i32>::from([("a", 1)]);
    /// assert_eq!(m.at(&"a"), Ok(&1));
    /// assert_eq!(m.at(&"b"), Err(Error::KeyNotFound));
    /// ```
    pub fn at(&self, key: &K) -> Result<&V, Error> {
        self.get(key).ok_or(Error::KeyNotFound)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.find(key).map(|(_, v)| v)
    }

    pub fn find(&self, key: &K) -> Option<(&K, &V)> {
        let (node, _) = tree::lower_bound(&self.root, |n| *n.key() < *key);
        node.filter(|n| *n.key() == *key)
            .map(|n| (n.key(), n.mapped()))
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// 1 if an entry with the key is present, 0 otherwise.
    pub fn count(&self, key: &K) -> usize {
        self.get(key).is_some() as usize
    }

    /// 1 if exactly this entry is present, 0 otherwise.
    pub fn count_entry(&self, key: &K, mapped: &V) -> usize {
        matches!(self.get(key), Some(v) if v == mapped) as usize
    }

    /// Index of the first entry whose key is not less than `key`.
    pub fn lower_bound(&self, key: &K) -> usize {
        tree::lower_bound(&self.root, |n| *n.key() < *key).1
    }

    /// Index of the first entry whose key is greater than `key`.
    pub fn upper_bound(&self, key: &K) -> usize {
        tree::lower_bound(&self.root, |n| *n.key() <= *key).1
    }

    pub fn equal_range(&self, key: &K) -> Range<usize> {
        self.lower_bound(key)..self.upper_bound(key)
    }

    /// The entry at in-order index `k`.
    pub fn at_index(&self, k: usize) -> Option<(&K, &V)> {
        tree::at_index(&self.root, k).map(|n| (n.key(), n.mapped()))
    }

    pub fn first(&self) -> Option<(&K, &V)> {
        self.at_index(0)
    }

    pub fn last(&self) -> Option<(&K, &V)> {
        self.len().checked_sub(1).and_then(|k| self.at_index(k))
    }

    pub fn iter(&self) -> Iter<'_, K, V, S> {
        Iter::over(&self.root, 0..self.len())
    }

    /// Iterates over the entries at the given index range.
    pub fn iter_range(&self, range: Range<usize>) -> Iter<'_, K, V, S> {
        self.check_range(&range);
        Iter::over(&self.root, range)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }

    /// A cursor positioned at index `pos`.
    pub fn cursor_at(&self, pos: usize) -> Cursor<'_, K, V, S> {
        Cursor {
            raw: RawCursor::new(&self.root, pos),
        }
    }

    fn derived(&self, root: Link<MapNode<K, V, S>>) -> Self {
        Map {
            core: Arc::clone(&self.core),
            root,
        }
    }

    fn grow(&mut self, next: Link<MapNode<K, V, S>>) -> usize {
        let before = self.len();
        self.root = next;
        self.len() - before
    }

    fn shrink(&mut self, next: Link<MapNode<K, V, S>>) -> usize {
        let before = self.len();
        self.root = next;
        before - self.len()
    }

    fn assign(&mut self, next: Link<MapNode<K, V, S>>) -> bool {
        let changed = !tree::same_node(&next, &self.root);
        self.root = next;
        changed
    }

    fn check(&self, other: &Self) {
        debug_assert!(
            Arc::ptr_eq(&self.core, &other.core),
            "maps belong to different providers"
        );
    }

    fn check_set(&self, keys: &Set<K, S>) {
        debug_assert!(
            Arc::ptr_eq(&self.core.keys, keys.core()),
            "the set does not share the map's set provider"
        );
    }

    fn check_range(&self, range: &Range<usize>) {
        assert!(
            range.start <= range.end && range.end <= self.len(),
            "index range out of bounds"
        );
    }
}

impl<K, V, S> PartialEq for Map<K, V, S> {
    /// Content equality, decided by root identity.  Constant time.
    fn eq(&self, other: &Self) -> bool {
        debug_assert!(
            Arc::ptr_eq(&self.core, &other.core),
            "maps belong to different providers"
        );
        tree::same_node(&self.root, &other.root)
    }
}

impl<K, V, S> Eq for Map<K, V, S> {}

impl<K, V, S> Hash for Map<K, V, S> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(link_hash(&self.root));
    }
}

impl<K, V, S> Debug for Map<K, V, S>
where
    K: Clone + Hash + Ord + Debug,
    V: Clone + Hash + Eq + Debug,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> FromIterator<(K, V)> for Map<K, V, S>
where
    K: Clone + Hash + Ord + Send + Sync + 'static,
    V: Clone + Hash + Eq + Send + Sync + 'static,
    S: BuildHasher + Default + Send + Sync + 'static,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Map::new();
        map.insert_all(iter);
        map
    }
}

impl<K, V, S, const N: usize> From<[(K, V); N]> for Map<K, V, S>
where
    K: Clone + Hash + Ord + Send + Sync + 'static,
    V: Clone + Hash + Eq + Send + Sync + 'static,
    S: BuildHasher + Default + Send + Sync + 'static,
{
    fn from(entries: [(K, V); N]) -> Self {
        Self::from_iter(entries)
    }
}

impl<K, V, S> Extend<(K, V)> for Map<K, V, S>
where
    K: Clone + Hash + Ord,
    V: Clone + Hash + Eq,
    S: BuildHasher,
{
    /// Extends the map, keeping the existing entry wherever a key is
    /// already present.
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.insert_all(iter);
    }
}

impl<K, V, S> Index<&K> for Map<K, V, S>
where
    K: Clone + Hash + Ord,
    V: Clone + Hash + Eq,
    S: BuildHasher,
{
    type Output = V;

    fn index(&self, key: &K) -> &V {
        match self.get(key) {
            Some(v) => v,
            None => panic!("key not found in Map"),
        }
    }
}

impl<K, V, S> std::ops::BitOr for &Map<K, V, S>
where
    K: Clone + Hash + Ord,
    V: Clone + Hash + Eq,
    S: BuildHasher,
{
    type Output = Map<K, V, S>;

    fn bitor(self, rhs: Self) -> Map<K, V, S> {
        self.union(rhs)
    }
}

impl<K, V, S> std::ops::BitAnd for &Map<K, V, S>
where
    K: Clone + Hash + Ord,
    V: Clone + Hash + Eq,
    S: BuildHasher,
{
    type Output = Map<K, V, S>;

    fn bitand(self, rhs: Self) -> Map<K, V, S> {
        self.intersection(rhs)
    }
}

impl<K, V, S> std::ops::Sub for &Map<K, V, S>
where
    K: Clone + Hash + Ord,
    V: Clone + Hash + Eq,
    S: BuildHasher,
{
    type Output = Map<K, V, S>;

    fn sub(self, rhs: Self) -> Map<K, V, S> {
        self.difference(rhs)
    }
}

impl<K, V, S> std::ops::BitAnd<&Set<K, S>> for &Map<K, V, S>
where
    K: Clone + Hash + Ord,
    V: Clone + Hash + Eq,
    S: BuildHasher,
{
    type Output = Map<K, V, S>;

    fn bitand(self, rhs: &Set<K, S>) -> Map<K, V, S> {
        self.intersect_with(rhs)
    }
}

impl<K, V, S> std::ops::Sub<&Set<K, S>> for &Map<K, V, S>
where
    K: Clone + Hash + Ord,
    V: Clone + Hash + Eq,
    S: BuildHasher,
{
    type Output = Map<K, V, S>;

    fn sub(self, rhs: &Set<K, S>) -> Map<K, V, S> {
        self.subtract(rhs)
    }
}

impl<K, V, S> std::ops::BitOrAssign<&Map<K, V, S>> for Map<K, V, S>
where
    K: Clone + Hash + Ord,
    V: Clone + Hash + Eq,
    S: BuildHasher,
{
    fn bitor_assign(&mut self, rhs: &Map<K, V, S>) {
        self.insert_map(rhs);
    }
}

impl<K, V, S> std::ops::BitAndAssign<&Map<K, V, S>> for Map<K, V, S>
where
    K: Clone + Hash + Ord,
    V: Clone + Hash + Eq,
    S: BuildHasher,
{
    fn bitand_assign(&mut self, rhs: &Map<K, V, S>) {
        self.retain_map(rhs);
    }
}

impl<K, V, S> std::ops::SubAssign<&Map<K, V, S>> for Map<K, V, S>
where
    K: Clone + Hash + Ord,
    V: Clone + Hash + Eq,
    S: BuildHasher,
{
    fn sub_assign(&mut self, rhs: &Map<K, V, S>) {
        self.erase_map(rhs);
    }
}

impl<K, V, S> std::ops::BitAndAssign<&Set<K, S>> for Map<K, V, S>
where
    K: Clone + Hash + Ord,
    V: Clone + Hash + Eq,
    S: BuildHasher,
{
    fn bitand_assign(&mut self, rhs: &Set<K, S>) {
        self.retain_keys(rhs);
    }
}

impl<K, V, S> std::ops::SubAssign<&Set<K, S>> for Map<K, V, S>
where
    K: Clone + Hash + Ord,
    V: Clone + Hash + Eq,
    S: BuildHasher,
{
    fn sub_assign(&mut self, rhs: &Set<K, S>) {
        self.erase_keys(rhs);
    }
}

impl<'a, K, V, S> IntoIterator for &'a Map<K, V, S>
where
    K: Clone + Hash + Ord,
    V: Clone + Hash + Eq,
    S: BuildHasher,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V, S>;

    fn into_iter(self) -> Iter<'a, K, V, S> {
        self.iter()
    }
}

/// Double-ended iterator over a map's entries in key order.
pub struct Iter<'a, K, V, S = FxBuildHasher> {
    front: RawCursor<'a, MapNode<K, V, S>>,
    back: RawCursor<'a, MapNode<K, V, S>>,
}

impl<'a, K: Ord, V, S> Iter<'a, K, V, S> {
    fn over(root: &'a Link<MapNode<K, V, S>>, range: Range<usize>) -> Self {
        Iter {
            front: RawCursor::new(root, range.start),
            back: RawCursor::new(root, range.end),
        }
    }
}

impl<'a, K: Ord, V, S> Iterator for Iter<'a, K, V, S> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.front.pos() >= self.back.pos() {
            return None;
        }
        let node = self.front.get()?;
        self.front.seek(self.front.pos() + 1);
        Some((node.key(), node.mapped()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.back.pos().saturating_sub(self.front.pos());
        (len, Some(len))
    }
}

impl<'a, K: Ord, V, S> DoubleEndedIterator for Iter<'a, K, V, S> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front.pos() >= self.back.pos() {
            return None;
        }
        self.back.seek(self.back.pos() - 1);
        let node = self.back.get()?;
        Some((node.key(), node.mapped()))
    }
}

impl<'a, K: Ord, V, S> ExactSizeIterator for Iter<'a, K, V, S> {}

impl<'a, K: Ord, V, S> FusedIterator for Iter<'a, K, V, S> {}

/// A stateful bidirectional cursor over a map's in-order positions.
pub struct Cursor<'a, K, V, S = FxBuildHasher> {
    raw: RawCursor<'a, MapNode<K, V, S>>,
}

impl<'a, K: Ord, V, S> Cursor<'a, K, V, S> {
    /// The cursor's current in-order index.
    pub fn index(&self) -> usize {
        self.raw.pos()
    }

    /// The entry at the current position, or `None` past either end.
    pub fn get(&mut self) -> Option<(&'a K, &'a V)> {
        self.raw.get().map(|n| (n.key(), n.mapped()))
    }

    pub fn seek(&mut self, pos: usize) {
        self.raw.seek(pos);
    }

    pub fn move_next(&mut self) {
        let pos = self.raw.pos();
        if pos < self.raw.total() {
            self.raw.seek(pos + 1);
        }
    }

    pub fn move_prev(&mut self) {
        let pos = self.raw.pos();
        if pos > 0 {
            self.raw.seek(pos - 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn providers() -> (SetProvider<&'static str>, MapProvider<&'static str, i32>) {
        let sp = SetProvider::new();
        let mp = MapProvider::with_set_provider(&sp);
        (sp, mp)
    }

    // The map tree must be congruent to its key-set tree at every node.
    fn chk_congruent<K, V, S>(map: &Map<K, V, S>)
    where
        K: Clone + Hash + Ord,
        V: Clone + Hash + Eq,
        S: BuildHasher,
    {
        fn walk<K: Ord, V, S>(link: &Link<MapNode<K, V, S>>) {
            let n = match link {
                Some(n) => n,
                None => return,
            };
            assert!(tree::same_node(
                &key_link(n.left()),
                n.key_node().left()
            ));
            assert!(tree::same_node(
                &key_link(n.right()),
                n.key_node().right()
            ));
            walk(n.left());
            walk(n.right());
        }
        walk(&map.root);
        assert_eq!(map.key_set().len(), map.len());
    }

    #[test]
    fn key_set_is_the_canonical_set_over_the_keys() {
        let (sp, mp) = providers();
        let map = Map::from_iter_in([("b", 2), ("a", 1), ("c", 3)], &mp);
        let keys = Set::from_iter_in(["a", "b", "c"], &sp);
        assert_eq!(map.key_set(), keys);
        chk_congruent(&map);
    }

    #[test]
    fn insert_keeps_and_assign_replaces() {
        let (_, mp) = providers();
        let mut map = Map::from_iter_in([("a", 1), ("b", 2)], &mp);
        assert_eq!(map.insert(("a", 9)), 0);
        assert_eq!(map.get(&"a"), Some(&1));
        assert!(map.insert_or_assign(("a", 9)));
        assert_eq!(map.get(&"a"), Some(&9));
        assert_eq!(map.get(&"b"), Some(&2));
        assert!(!map.insert_or_assign(("a", 9)));
        chk_congruent(&map);
    }

    #[test]
    fn entry_aware_merges() {
        let (_, mp) = providers();
        let a = Map::from_iter_in([("a", 1), ("b", 2), ("c", 3)], &mp);
        let b = Map::from_iter_in([("a", 1), ("b", 9), ("d", 4)], &mp);

        let i = a.intersection(&b);
        assert_eq!(i.iter().collect::<Vec<_>>(), [(&"a", &1)]);

        // A key mapped to a different value in b is not an entry of b.
        let d = a.difference(&b);
        assert_eq!(d.iter().collect::<Vec<_>>(), [(&"b", &2), (&"c", &3)]);

        let u = a.union(&b);
        assert_eq!(u.get(&"b"), Some(&2));
        assert_eq!(u.get(&"d"), Some(&4));
        assert!(u.includes(&a));
        assert!(!u.includes(&b));
        chk_congruent(&u);
    }

    #[test]
    fn merges_with_key_sets() {
        let (sp, mp) = providers();
        let map = Map::from_iter_in([("a", 1), ("b", 2), ("c", 3)], &mp);
        let picked = Set::from_iter_in(["a", "c"], &sp);

        let kept = map.intersect_with(&picked);
        assert_eq!(kept.iter().collect::<Vec<_>>(), [(&"a", &1), (&"c", &3)]);

        let rest = map.subtract(&Set::from_iter_in(["b"], &sp));
        assert_eq!(rest.key_set(), picked);
        chk_congruent(&kept);
        chk_congruent(&rest);

        // The whole key set short-circuits to the map itself or nothing.
        assert_eq!(map.intersect_with(&map.key_set()), map);
        assert!(map.subtract(&map.key_set()).is_empty());
    }

    #[test]
    fn at_reports_missing_keys() {
        let (_, mp) = providers();
        let map = Map::from_iter_in([("a", 1)], &mp);
        assert_eq!(map.at(&"a"), Ok(&1));
        assert_eq!(map.at(&"z"), Err(crate::Error::KeyNotFound));
    }

    #[test]
    fn provider_sizes_return_to_baseline() {
        let (sp, mp) = providers();
        {
            let a = Map::from_iter_in([("a", 1), ("b", 2), ("c", 3)], &mp);
            let b = a.clone();
            assert_eq!(a, b);
            assert_eq!(mp.size(), 3);
            assert_eq!(sp.size(), 3);
        }
        assert_eq!(mp.size(), 0);
        assert_eq!(sp.size(), 0);
    }
}
