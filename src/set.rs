//! A sorted set whose instances share hash-consed nodes.

use std::fmt::{Debug, Formatter};
use std::hash::{BuildHasher, Hash};
use std::iter::FusedIterator;
use std::ops::Range;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxBuildHasher;

use crate::cursor::RawCursor;
use crate::intern::{self, InternTable};
use crate::tree::{self, Factory, Link, TreapNode};

/// An immutable, interned tree node.
///
/// The priority is `intmix` of the key's hash and never depends on tree
/// shape, which makes the shape of a tree a pure function of its key set.
pub(crate) struct SetNode<K, S> {
    value: K,
    priority: u64,
    size: usize,
    hash: u64,
    left: Link<SetNode<K, S>>,
    right: Link<SetNode<K, S>>,
    pool: Arc<SetCore<K, S>>,
}

impl<K, S> SetNode<K, S> {
    pub(crate) fn value(&self) -> &K {
        &self.value
    }

    pub(crate) fn node_hash(&self) -> u64 {
        self.hash
    }
}

pub(crate) fn link_hash<K, S>(link: &Link<SetNode<K, S>>) -> u64 {
    link.as_ref().map_or(0, |n| n.hash)
}

impl<K: Ord, S> TreapNode for SetNode<K, S> {
    type Key = K;

    fn key(&self) -> &K {
        &self.value
    }

    fn priority(&self) -> u64 {
        self.priority
    }

    fn len(&self) -> usize {
        self.size
    }

    fn left(&self) -> &Link<Self> {
        &self.left
    }

    fn right(&self) -> &Link<Self> {
        &self.right
    }
}

impl<K, S> Drop for SetNode<K, S> {
    fn drop(&mut self) {
        let ptr: *const Self = self;
        self.pool.table.lock().evict(self.hash, ptr);
        // The child links are released after this body, outside the table
        // lock; a child reaching zero re-enters the lock sequentially.
    }
}

/// Shared state of one set provider: the interning table and the key
/// hasher.
pub(crate) struct SetCore<K, S> {
    table: Mutex<InternTable<SetNode<K, S>>>,
    hasher: S,
}

impl<K, S> Drop for SetCore<K, S> {
    fn drop(&mut self) {
        // Every node owns the pool, so the pool unwinds only after the
        // last node is gone.
        debug_assert!(self.table.lock().is_empty());
    }
}

impl<K, S> SetCore<K, S>
where
    K: Clone + Hash + Ord,
    S: BuildHasher,
{
    pub(crate) fn new(hasher: S) -> Arc<Self> {
        Arc::new(SetCore {
            table: Mutex::new(InternTable::new()),
            hasher,
        })
    }

    pub(crate) fn key_hash(&self, key: &K) -> u64 {
        self.hasher.hash_one(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Returns the canonical node for the given shape, interning a new one
    /// only when no equivalent exists.
    pub(crate) fn make(
        self: &Arc<Self>,
        value: K,
        priority: u64,
        left: Link<SetNode<K, S>>,
        right: Link<SetNode<K, S>>,
    ) -> Arc<SetNode<K, S>> {
        let size = 1 + tree::len(&left) + tree::len(&right);
        let hash = intern::hash_combine(
            intern::hash_combine(link_hash(&left), link_hash(&right)),
            priority,
        );
        // Probe candidates parked here may hold a node's last strong
        // reference; they must not drop before the table guard does.
        let mut holding = Vec::new();
        let mut table = self.table.lock();
        if let Some(existing) = table.find(
            hash,
            |n| {
                tree::same_node(&n.left, &left)
                    && tree::same_node(&n.right, &right)
                    && n.value == value
            },
            &mut holding,
        ) {
            return existing;
        }
        let node = Arc::new(SetNode {
            value,
            priority,
            size,
            hash,
            left,
            right,
            pool: Arc::clone(self),
        });
        table.insert(hash, &node);
        node
    }

    pub(crate) fn make_leaf(self: &Arc<Self>, value: K) -> Arc<SetNode<K, S>> {
        let priority = intern::intmix(self.key_hash(&value));
        self.make(value, priority, None, None)
    }

    pub(crate) fn make_from(
        self: &Arc<Self>,
        parent: &Arc<SetNode<K, S>>,
        left: Link<SetNode<K, S>>,
        right: Link<SetNode<K, S>>,
    ) -> Arc<SetNode<K, S>> {
        self.make(parent.value.clone(), parent.priority, left, right)
    }
}

impl<K, S> Factory for Arc<SetCore<K, S>>
where
    K: Clone + Hash + Ord,
    S: BuildHasher,
{
    type Node = SetNode<K, S>;
    type Item = K;

    fn make_leaf(&self, item: K) -> Arc<SetNode<K, S>> {
        SetCore::make_leaf(self, item)
    }

    fn make_from(
        &self,
        parent: &Arc<SetNode<K, S>>,
        left: Link<SetNode<K, S>>,
        right: Link<SetNode<K, S>>,
    ) -> Arc<SetNode<K, S>> {
        SetCore::make_from(self, parent, left, right)
    }
}

pub(crate) fn default_core<K, S>() -> Arc<SetCore<K, S>>
where
    K: Clone + Hash + Ord + Send + Sync + 'static,
    S: BuildHasher + Default + Send + Sync + 'static,
{
    intern::default_pool(|| SetCore::new(S::default()))
}

/// A node pool. Sets created from the same provider share structurally
/// equal nodes; sets from different providers never do, and combining them
/// is a caller error.
///
/// Cloning a provider is cheap and yields a handle to the same pool.
pub struct SetProvider<K, S = FxBuildHasher> {
    core: Arc<SetCore<K, S>>,
}

impl<K, S> Clone for SetProvider<K, S> {
    fn clone(&self) -> Self {
        SetProvider {
            core: Arc::clone(&self.core),
        }
    }
}

impl<K> SetProvider<K>
where
    K: Clone + Hash + Ord,
{
    pub fn new() -> Self {
        Self::with_hasher(FxBuildHasher::default())
    }
}

impl<K> Default for SetProvider<K>
where
    K: Clone + Hash + Ord,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, S> SetProvider<K, S>
where
    K: Clone + Hash + Ord,
    S: BuildHasher,
{
    pub fn with_hasher(hasher: S) -> Self {
        SetProvider {
            core: SetCore::new(hasher),
        }
    }

    /// Number of live nodes owned by this provider.
    pub fn size(&self) -> usize {
        self.core.len()
    }

    pub(crate) fn core(&self) -> &Arc<SetCore<K, S>> {
        &self.core
    }

    pub(crate) fn from_core(core: Arc<SetCore<K, S>>) -> Self {
        SetProvider { core }
    }
}

impl<K, S> Debug for SetProvider<K, S>
where
    K: Clone + Hash + Ord,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetProvider").field("size", &self.size()).finish()
    }
}

/// A sorted set of values, persistent and confluent.
///
/// A clone shares its entire representation with the original, and any two
/// sets from the same provider with equal content are represented by the
/// same root node.  Consequently `clone`, `==`, and [`hash`](Set::hash)
/// are constant time, and the merge operations skip subtrees the operands
/// share.
///
/// Let n be the size of the larger operand of a merge, m the size of the
/// smaller, and d the size of the symmetric difference.  Merges run in
/// `O(min(m log(n/m), d log(n/d)))` expected time and memory.
///
/// # Examples
/// ```
/// use interned_collections::Set;
///
/// let a: Set<&str> = ["pear", "apple"].into();
/// let b: Set<&str> = ["apple", "quince"].into();
/// let u = a.union(&b);
/// assert_eq!(u.len(), 3);
/// assert!(u.includes(&a) && u.includes(&b));
/// ```
pub struct Set<K, S = FxBuildHasher> {
    core: Arc<SetCore<K, S>>,
    root: Link<SetNode<K, S>>,
}

impl<K, S> Clone for Set<K, S> {
    fn clone(&self) -> Self {
        Set {
            core: Arc::clone(&self.core),
            root: self.root.clone(),
        }
    }
}

impl<K, S> Set<K, S>
where
    K: Clone + Hash + Ord + Send + Sync + 'static,
    S: BuildHasher + Default + Send + Sync + 'static,
{
    /// Creates an empty set on the process-wide default provider for this
    /// parameterization.
    pub fn new() -> Self {
        Set {
            core: default_core::<K, S>(),
            root: None,
        }
    }
}

impl<K, S> Default for Set<K, S>
where
    K: Clone + Hash + Ord + Send + Sync + 'static,
    S: BuildHasher + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, S> Set<K, S>
where
    K: Clone + Hash + Ord,
    S: BuildHasher,
{
    /// Creates an empty set on the given provider.
    pub fn new_in(provider: &SetProvider<K, S>) -> Self {
        Set {
            core: Arc::clone(provider.core()),
            root: None,
        }
    }

    /// Creates a set from an iterator on the given provider.
    ///
    /// O(n log n) expected on random input, O(n) on presorted input.
    pub fn from_iter_in<I: IntoIterator<Item = K>>(iter: I, provider: &SetProvider<K, S>) -> Self {
        let mut iter = iter.into_iter();
        let root = tree::build(provider.core(), &mut iter);
        Set {
            core: Arc::clone(provider.core()),
            root,
        }
    }

    /// A handle to the provider backing this set.
    pub fn provider(&self) -> SetProvider<K, S> {
        SetProvider::from_core(Arc::clone(&self.core))
    }

    pub fn len(&self) -> usize {
        tree::len(&self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// The combined hash of all elements.  Constant time.
    pub fn hash(&self) -> u64 {
        link_hash(&self.root)
    }

    /// Drops all elements.  Constant time.
    pub fn clear(&mut self) {
        self.root = None;
    }

    /// Inserts a value, returning the number of elements inserted (0 or 1).
    ///
    /// # Examples
    /// ```
    /// use interned_collections::Set;
    ///
    /// let mut s = Set::new();
    /// assert_eq!(s.insert(2), 1);
    /// assert_eq!(s.insert(2), 0);
    /// ```
    pub fn insert(&mut self, value: K) -> usize {
        let leaf = Some(self.core.make_leaf(value));
        let next = tree::union(&self.core, &self.root, &leaf);
        self.grow(next)
    }

    /// Inserts every value of an iterator, returning the number of
    /// elements inserted.
    pub fn insert_all<I: IntoIterator<Item = K>>(&mut self, iter: I) -> usize {
        let mut iter = iter.into_iter();
        let batch = tree::build(&self.core, &mut iter);
        let next = tree::union(&self.core, &self.root, &batch);
        self.grow(next)
    }

    /// Inserts every element of another set, returning the number of
    /// elements inserted.
    pub fn insert_set(&mut self, other: &Self) -> usize {
        self.check(other);
        let next = tree::union(&self.core, &self.root, &other.root);
        self.grow(next)
    }

    /// Erases a key, returning the number of elements erased (0 or 1).
    pub fn erase(&mut self, key: &K) -> usize {
        let (next, _) = tree::remove_key(&self.core, &self.root, key);
        self.shrink(next)
    }

    /// Erases every element of another set, returning the number of
    /// elements erased.
    pub fn erase_set(&mut self, other: &Self) -> usize {
        self.check(other);
        let next = tree::difference(&self.core, &tree::rank, &self.root, &other.root);
        self.shrink(next)
    }

    /// Keeps only the elements also contained in another set, returning
    /// the number of elements erased.
    pub fn retain_set(&mut self, other: &Self) -> usize {
        self.check(other);
        let next = tree::intersection(&self.core, &tree::rank, &self.root, &other.root);
        self.shrink(next)
    }

    /// Erases the elements at the given index range, returning the number
    /// of elements erased.
    pub fn erase_range(&mut self, range: Range<usize>) -> usize {
        self.check_range(&range);
        let lo = tree::head(&self.core, &self.root, range.start);
        let hi = tree::tail(&self.core, &self.root, range.end);
        let next = tree::join(&self.core, &lo, &hi);
        self.shrink(next)
    }

    /// Keeps only the elements at the given index range, returning the
    /// number of elements erased.
    pub fn retain_range(&mut self, range: Range<usize>) -> usize {
        self.check_range(&range);
        let kept = tree::head(&self.core, &self.root, range.end);
        let next = tree::tail(&self.core, &kept, range.start);
        self.shrink(next)
    }

    pub fn union(&self, other: &Self) -> Self {
        self.check(other);
        self.derived(tree::union(&self.core, &self.root, &other.root))
    }

    pub fn intersection(&self, other: &Self) -> Self {
        self.check(other);
        self.derived(tree::intersection(
            &self.core,
            &tree::rank,
            &self.root,
            &other.root,
        ))
    }

    /// The elements of `self` that are not in `other`.
    pub fn difference(&self, other: &Self) -> Self {
        self.check(other);
        self.derived(tree::difference(
            &self.core,
            &tree::rank,
            &self.root,
            &other.root,
        ))
    }

    pub fn symmetric_difference(&self, other: &Self) -> Self {
        self.check(other);
        self.derived(tree::symmetric_difference(&self.core, &self.root, &other.root))
    }

    /// Does this set contain every element of `other`?
    ///
    /// Returns immediately when `other` is larger or when the two sets
    /// share their root.
    pub fn includes(&self, other: &Self) -> bool {
        self.check(other);
        tree::includes(&self.core, &tree::rank, &self.root, &other.root)
    }

    /// Returns the stored element equal to `key`.
    pub fn find(&self, key: &K) -> Option<&K> {
        let (node, _) = tree::lower_bound(&self.root, |n| *n.key() < *key);
        node.filter(|n| *n.key() == *key).map(|n| n.value())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// 1 if the key is present, 0 otherwise.
    pub fn count(&self, key: &K) -> usize {
        self.find(key).is_some() as usize
    }

    /// Index of the first element not less than `key`.
    pub fn lower_bound(&self, key: &K) -> usize {
        tree::lower_bound(&self.root, |n| *n.key() < *key).1
    }

    /// Index of the first element greater than `key`.
    pub fn upper_bound(&self, key: &K) -> usize {
        tree::lower_bound(&self.root, |n| *n.key() <= *key).1
    }

    pub fn equal_range(&self, key: &K) -> Range<usize> {
        self.lower_bound(key)..self.upper_bound(key)
    }

    /// The element at in-order index `k`.
    pub fn at_index(&self, k: usize) -> Option<&K> {
        tree::at_index(&self.root, k).map(|n| n.value())
    }

    pub fn first(&self) -> Option<&K> {
        self.at_index(0)
    }

    pub fn last(&self) -> Option<&K> {
        self.len().checked_sub(1).and_then(|k| self.at_index(k))
    }

    pub fn iter(&self) -> Iter<'_, K, S> {
        Iter::over(&self.root, 0..self.len())
    }

    /// Iterates over the elements at the given index range.
    pub fn iter_range(&self, range: Range<usize>) -> Iter<'_, K, S> {
        self.check_range(&range);
        Iter::over(&self.root, range)
    }

    /// A cursor positioned at index `pos`.
    pub fn cursor_at(&self, pos: usize) -> Cursor<'_, K, S> {
        Cursor {
            raw: RawCursor::new(&self.root, pos),
        }
    }

    pub(crate) fn from_parts(core: Arc<SetCore<K, S>>, root: Link<SetNode<K, S>>) -> Self {
        Set { core, root }
    }

    pub(crate) fn core(&self) -> &Arc<SetCore<K, S>> {
        &self.core
    }

    pub(crate) fn root(&self) -> &Link<SetNode<K, S>> {
        &self.root
    }

    fn derived(&self, root: Link<SetNode<K, S>>) -> Self {
        Set {
            core: Arc::clone(&self.core),
            root,
        }
    }

    fn grow(&mut self, next: Link<SetNode<K, S>>) -> usize {
        let before = self.len();
        self.root = next;
        self.len() - before
    }

    fn shrink(&mut self, next: Link<SetNode<K, S>>) -> usize {
        let before = self.len();
        self.root = next;
        before - self.len()
    }

    fn check(&self, other: &Self) {
        debug_assert!(
            Arc::ptr_eq(&self.core, &other.core),
            "sets belong to different providers"
        );
    }

    fn check_range(&self, range: &Range<usize>) {
        assert!(
            range.start <= range.end && range.end <= self.len(),
            "index range out of bounds"
        );
    }
}

impl<K, S> PartialEq for Set<K, S> {
    /// Content equality, decided by root identity.  Constant time.
    fn eq(&self, other: &Self) -> bool {
        debug_assert!(
            Arc::ptr_eq(&self.core, &other.core),
            "sets belong to different providers"
        );
        tree::same_node(&self.root, &other.root)
    }
}

impl<K, S> Eq for Set<K, S> {}

impl<K, S> Hash for Set<K, S> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(link_hash(&self.root));
    }
}

impl<K, S> Debug for Set<K, S>
where
    K: Clone + Hash + Ord + Debug,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<K, S> FromIterator<K> for Set<K, S>
where
    K: Clone + Hash + Ord + Send + Sync + 'static,
    S: BuildHasher + Default + Send + Sync + 'static,
{
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut set = Set::new();
        set.insert_all(iter);
        set
    }
}

impl<K, S, const N: usize> From<[K; N]> for Set<K, S>
where
    K: Clone + Hash + Ord + Send + Sync + 'static,
    S: BuildHasher + Default + Send + Sync + 'static,
{
    fn from(values: [K; N]) -> Self {
        Self::from_iter(values)
    }
}

impl<K, S> Extend<K> for Set<K, S>
where
    K: Clone + Hash + Ord,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = K>>(&mut self, iter: I) {
        self.insert_all(iter);
    }
}

impl<K, S> std::ops::BitOr for &Set<K, S>
where
    K: Clone + Hash + Ord,
    S: BuildHasher,
{
    type Output = Set<K, S>;

    fn bitor(self, rhs: Self) -> Set<K, S> {
        self.union(rhs)
    }
}

impl<K, S> std::ops::BitAnd for &Set<K, S>
where
    K: Clone + Hash + Ord,
    S: BuildHasher,
{
    type Output = Set<K, S>;

    fn bitand(self, rhs: Self) -> Set<K, S> {
        self.intersection(rhs)
    }
}

impl<K, S> std::ops::Sub for &Set<K, S>
where
    K: Clone + Hash + Ord,
    S: BuildHasher,
{
    type Output = Set<K, S>;

    fn sub(self, rhs: Self) -> Set<K, S> {
        self.difference(rhs)
    }
}

impl<K, S> std::ops::BitXor for &Set<K, S>
where
    K: Clone + Hash + Ord,
    S: BuildHasher,
{
    type Output = Set<K, S>;

    fn bitxor(self, rhs: Self) -> Set<K, S> {
        self.symmetric_difference(rhs)
    }
}

impl<K, S> std::ops::BitOrAssign<&Set<K, S>> for Set<K, S>
where
    K: Clone + Hash + Ord,
    S: BuildHasher,
{
    fn bitor_assign(&mut self, rhs: &Set<K, S>) {
        self.insert_set(rhs);
    }
}

impl<K, S> std::ops::BitAndAssign<&Set<K, S>> for Set<K, S>
where
    K: Clone + Hash + Ord,
    S: BuildHasher,
{
    fn bitand_assign(&mut self, rhs: &Set<K, S>) {
        self.retain_set(rhs);
    }
}

impl<K, S> std::ops::SubAssign<&Set<K, S>> for Set<K, S>
where
    K: Clone + Hash + Ord,
    S: BuildHasher,
{
    fn sub_assign(&mut self, rhs: &Set<K, S>) {
        self.erase_set(rhs);
    }
}

impl<K, S> std::ops::BitXorAssign<&Set<K, S>> for Set<K, S>
where
    K: Clone + Hash + Ord,
    S: BuildHasher,
{
    fn bitxor_assign(&mut self, rhs: &Set<K, S>) {
        self.check(rhs);
        self.root = tree::symmetric_difference(&self.core, &self.root, &rhs.root);
    }
}

impl<'a, K, S> IntoIterator for &'a Set<K, S>
where
    K: Clone + Hash + Ord,
    S: BuildHasher,
{
    type Item = &'a K;
    type IntoIter = Iter<'a, K, S>;

    fn into_iter(self) -> Iter<'a, K, S> {
        self.iter()
    }
}

/// Double-ended iterator over a set's elements in sorted order.
pub struct Iter<'a, K, S = FxBuildHasher> {
    front: RawCursor<'a, SetNode<K, S>>,
    back: RawCursor<'a, SetNode<K, S>>,
}

impl<'a, K: Ord, S> Iter<'a, K, S> {
    fn over(root: &'a Link<SetNode<K, S>>, range: Range<usize>) -> Self {
        Iter {
            front: RawCursor::new(root, range.start),
            back: RawCursor::new(root, range.end),
        }
    }
}

impl<'a, K: Ord, S> Iterator for Iter<'a, K, S> {
    type Item = &'a K;

    fn next(&mut self) -> Option<&'a K> {
        if self.front.pos() >= self.back.pos() {
            return None;
        }
        let node = self.front.get()?;
        self.front.seek(self.front.pos() + 1);
        Some(node.value())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.back.pos().saturating_sub(self.front.pos());
        (len, Some(len))
    }
}

impl<'a, K: Ord, S> DoubleEndedIterator for Iter<'a, K, S> {
    fn next_back(&mut self) -> Option<&'a K> {
        if self.front.pos() >= self.back.pos() {
            return None;
        }
        self.back.seek(self.back.pos() - 1);
        let node = self.back.get()?;
        Some(node.value())
    }
}

impl<'a, K: Ord, S> ExactSizeIterator for Iter<'a, K, S> {}

impl<'a, K: Ord, S> FusedIterator for Iter<'a, K, S> {}

/// A stateful bidirectional cursor over a set's in-order positions.
///
/// Stepping to an adjacent position is amortized constant time; a distant
/// [`seek`](Cursor::seek) costs one O(log n) descent on the next access.
pub struct Cursor<'a, K, S = FxBuildHasher> {
    raw: RawCursor<'a, SetNode<K, S>>,
}

impl<'a, K: Ord, S> Cursor<'a, K, S> {
    /// The cursor's current in-order index.
    pub fn index(&self) -> usize {
        self.raw.pos()
    }

    /// The element at the current position, or `None` past either end.
    pub fn get(&mut self) -> Option<&'a K> {
        self.raw.get().map(|n| n.value())
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

    // Structural soundness of one tree: strict in-order ordering, the
    // (priority, key) heap property, and the cached size and hash fields.
    fn chk<K, S>(set: &Set<K, S>) -> usize
    where
        K: Clone + Hash + Ord,
        S: BuildHasher,
    {
        fn walk<'a, K: Ord, S>(
            link: &'a Link<SetNode<K, S>>,
            last: &mut Option<&'a K>,
        ) -> (usize, u64) {
            let n = match link {
                Some(n) => n,
                None => return (0, 0),
            };
            for child in [n.left(), n.right()].into_iter().flatten() {
                assert!(
                    matches!(tree::rank(n.as_ref(), child.as_ref()), tree::Ranking::Left),
                    "parent must outrank its children"
                );
            }
            let (left_size, left_hash) = walk(n.left(), last);
            if let Some(prev) = *last {
                assert!(prev < n.key(), "in-order must be strictly sorted");
            }
            *last = Some(n.key());
            let (right_size, right_hash) = walk(n.right(), last);
            assert_eq!(n.len(), left_size + 1 + right_size);
            assert_eq!(
                n.node_hash(),
                intern::hash_combine(intern::hash_combine(left_hash, right_hash), n.priority())
            );
            (n.len(), n.node_hash())
        }

        let mut last = None;
        let (size, _) = walk(set.root(), &mut last);
        assert_eq!(size, set.len());
        size
    }

    #[test]
    fn canonical_roots_for_any_insertion_order() {
        let provider = SetProvider::<u32>::new();
        let mut a = Set::new_in(&provider);
        for v in 0..100 {
            a.insert(v * 7 % 100);
        }
        let b = Set::from_iter_in((0..100).rev(), &provider);
        let mut c = Set::new_in(&provider);
        c.insert_all(0..100);

        chk(&a);
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert!(tree::same_node(a.root(), b.root()));
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn insert_and_erase_count() {
        let provider = SetProvider::<u32>::new();
        let mut s = Set::new_in(&provider);
        assert_eq!(s.insert(3), 1);
        assert_eq!(s.insert(3), 0);
        assert_eq!(s.insert(5), 1);
        assert_eq!(s.erase(&4), 0);
        assert_eq!(s.erase(&3), 1);
        assert_eq!(s.erase(&3), 0);
        assert_eq!(s.len(), 1);
        chk(&s);
    }

    #[test]
    fn provider_size_returns_to_baseline() {
        let provider = SetProvider::<u32>::new();
        assert_eq!(provider.size(), 0);
        {
            let a = Set::from_iter_in(0..1000, &provider);
            let b = Set::from_iter_in((0..1000).rev(), &provider);
            assert_eq!(a, b);
            assert_eq!(provider.size(), 1000);
            let d = a.difference(&b);
            assert!(d.is_empty());
        }
        assert_eq!(provider.size(), 0);
    }

    #[test]
    fn interning_shares_subtrees_across_sets() {
        let provider = SetProvider::<u32>::new();
        let a = Set::from_iter_in(0..100, &provider);
        let before = provider.size();
        // Same content again allocates nothing new.
        let b = Set::from_iter_in(0..100, &provider);
        assert_eq!(provider.size(), before);
        assert_eq!(a, b);
    }

    #[test]
    fn merges_are_structurally_sound() {
        let provider = SetProvider::<u32>::new();
        let a = Set::from_iter_in((0..200).filter(|v| v % 2 == 0), &provider);
        let b = Set::from_iter_in(100..300, &provider);
        for s in [
            a.union(&b),
            a.intersection(&b),
            a.difference(&b),
            a.symmetric_difference(&b),
        ] {
            chk(&s);
        }
        assert!(a.union(&b).includes(&a));
        assert!(a.union(&b).includes(&b));
    }

    #[test]
    fn range_operations() {
        let provider = SetProvider::<u32>::new();
        let mut s = Set::from_iter_in(0..10, &provider);
        assert_eq!(s.erase_range(2..5), 3);
        assert_eq!(s.iter().copied().collect::<Vec<_>>(), [0, 1, 5, 6, 7, 8, 9]);
        chk(&s);
        assert_eq!(s.retain_range(1..4), 4);
        assert_eq!(s.iter().copied().collect::<Vec<_>>(), [1, 5, 6]);
        chk(&s);
    }

    #[test]
    fn cursor_steps_both_ways() {
        let provider = SetProvider::<u32>::new();
        let s = Set::from_iter_in(0..50, &provider);
        let mut cur = s.cursor_at(0);
        for expect in 0..50 {
            assert_eq!(cur.get(), Some(&expect));
            cur.move_next();
        }
        assert_eq!(cur.get(), None);
        let mut cur = s.cursor_at(49);
        for expect in (0..50).rev() {
            assert_eq!(cur.get(), Some(&expect));
            cur.move_prev();
        }
        assert_eq!(cur.index(), 0);
        let mut cur = s.cursor_at(10);
        cur.move_next();
        cur.move_prev();
        cur.move_prev();
        assert_eq!(cur.get(), Some(&9));
        cur.seek(42);
        assert_eq!(cur.get(), Some(&42));
    }
}
