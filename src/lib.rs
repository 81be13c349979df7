//! # Confluently persistent sorted collections with shared nodes
//!
//! `interned-collections` provides a sorted [`Set`] and [`Map`] backed by
//! immutable treaps whose nodes are hash-consed: within one provider, every
//! distinct subtree is represented by exactly one node in memory.  Because
//! node identity coincides with content, cloning a container, comparing two
//! containers for equal content, and hashing a container are all constant
//! time.
//!
//! Tree shape is a pure function of the contained keys (node priorities are
//! derived from key hashes), so the same elements produce the same root no
//! matter what order they were inserted in.  Merge operations exploit this:
//! `union`, `intersection`, `difference` and friends skip over subtrees the
//! two inputs share, giving an expected cost of
//! `O(min(m log(n/m), d log(n/d)))` where `m` is the smaller input, `n` the
//! larger, and `d` the size of the symmetric difference.  Merging two large,
//! nearly identical containers is nearly free.
//!
//! Nodes live in a [`SetProvider`] or [`MapProvider`] pool.  Containers from
//! the same provider share nodes; containers from different providers never
//! do, and combining them is a caller error.  Every parameterization has a
//! lazily created process-wide default provider, used by [`Set::new`] and
//! [`Map::new`].
//!
//! ```
//! use interned_collections::Set;
//!
//! let a: Set<u32> = (0..1000).collect();
//! let mut b = a.clone(); // constant time, shares every node
//! b.insert(1000);
//! let d = b.difference(&a); // cost bounded by what differs
//! assert_eq!(d.iter().copied().collect::<Vec<_>>(), [1000]);
//! assert!(b.includes(&a));
//! ```

mod cursor;
mod error;
mod intern;
pub mod map;
pub mod set;
mod tree;

pub use error::Error;
pub use map::{Map, MapProvider};
pub use set::{Set, SetProvider};
