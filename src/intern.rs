//! Hash-consing infrastructure shared by the set and map node pools.
//!
//! An [`InternTable`] maps node content to the unique live node with that
//! content.  It stores weak references: the table itself never keeps a node
//! alive.  A node's `Drop` impl calls [`InternTable::evict`] under the pool
//! mutex, and probes treat an un-upgradable slot as absent, so a node whose
//! strong count reached zero can never be handed out again.

use std::any::{Any, TypeId};
use std::sync::{Arc, OnceLock, Weak};

use hashbrown::HashTable;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Thomas Wang's 64-bit integer mix.  Node priorities are `intmix` of the
/// key's hash, which decorrelates treap shape from the hash function's
/// bucket behavior.
pub(crate) fn intmix(mut key: u64) -> u64 {
    key = (!key).wrapping_add(key << 21);
    key ^= key >> 24;
    key = key.wrapping_add(key << 3).wrapping_add(key << 8);
    key ^= key >> 14;
    key = key.wrapping_add(key << 2).wrapping_add(key << 4);
    key ^= key >> 28;
    key.wrapping_add(key << 31)
}

pub(crate) fn hash_combine(h1: u64, h2: u64) -> u64 {
    h1 ^ h2
        .wrapping_add(0x9e37_79b9_7f4a_7c15)
        .wrapping_add(h1 << 6)
        .wrapping_add(h1 >> 2)
}

/// Smallest slot count the table will shrink to.
const MIN_SLOTS: usize = 8;

struct Slot<N> {
    // Content hash, cached so the table can rehash and match slots whose
    // node is already dead.
    hash: u64,
    node: Weak<N>,
}

/// Weak interning table for one node kind.
///
/// All access happens under the owning pool's mutex.
pub(crate) struct InternTable<N> {
    slots: HashTable<Slot<N>>,
}

impl<N> InternTable<N> {
    pub(crate) fn new() -> Self {
        InternTable {
            slots: HashTable::new(),
        }
    }

    /// Number of interned nodes.
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Looks up a live node with the given content hash accepted by
    /// `matches`.
    ///
    /// Upgraded candidates that fail the match are parked in `holding`
    /// rather than dropped: the caller holds the pool mutex, and releasing
    /// what might be a node's last strong reference would re-enter the
    /// mutex from the node's destructor.  `holding` must outlive the lock
    /// guard.
    pub(crate) fn find(
        &self,
        hash: u64,
        mut matches: impl FnMut(&N) -> bool,
        holding: &mut Vec<Arc<N>>,
    ) -> Option<Arc<N>> {
        let mut found = None;
        let _ = self.slots.find(hash, |slot| {
            if slot.hash != hash {
                return false;
            }
            match slot.node.upgrade() {
                Some(node) => {
                    if matches(&node) {
                        found = Some(node);
                        true
                    } else {
                        holding.push(node);
                        false
                    }
                }
                None => false,
            }
        });
        found
    }

    /// Records a freshly created node.  The caller must have probed first;
    /// a dead slot with equal content may remain until its node's `Drop`
    /// clears it.
    pub(crate) fn insert(&mut self, hash: u64, node: &Arc<N>) {
        let _ = self.slots.insert_unique(
            hash,
            Slot {
                hash,
                node: Arc::downgrade(node),
            },
            |slot| slot.hash,
        );
    }

    /// Removes the slot belonging to exactly this node, if it is still the
    /// one recorded.  Called from the node's `Drop`.
    pub(crate) fn evict(&mut self, hash: u64, node: *const N) {
        if let Ok(entry) = self
            .slots
            .find_entry(hash, |slot| std::ptr::eq(slot.node.as_ptr(), node))
        {
            let _ = entry.remove();
        }
        if self.slots.capacity() >= MIN_SLOTS * 4
            && self.slots.len() <= self.slots.capacity() / 4
        {
            let target = self.slots.len().max(MIN_SLOTS);
            self.slots.shrink_to(target, |slot| slot.hash);
        }
    }
}

static DEFAULT_POOLS: OnceLock<Mutex<FxHashMap<TypeId, Box<dyn Any + Send + Sync>>>> =
    OnceLock::new();

/// Returns the process-wide default pool for a parameterization, creating
/// it on first use.
pub(crate) fn default_pool<P>(make: impl FnOnce() -> Arc<P>) -> Arc<P>
where
    P: Any + Send + Sync,
{
    let pools = DEFAULT_POOLS.get_or_init(|| Mutex::new(FxHashMap::default()));
    let mut pools = pools.lock();
    pools
        .entry(TypeId::of::<P>())
        .or_insert_with(|| Box::new(make()))
        .downcast_ref::<Arc<P>>()
        .unwrap()
        .clone()
}
