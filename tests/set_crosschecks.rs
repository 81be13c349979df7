//! Crosschecks of `Set` against `std::collections::BTreeSet`.

use interned_collections::{Set, SetProvider};
use proptest::prelude::*;
use std::collections::BTreeSet as StdSet;

mod common;
use common::*;

fn set_pair(u: &[u16], provider: &SetProvider<u16>) -> (Set<u16>, StdSet<u16>) {
    (
        Set::from_iter_in(u.iter().copied(), provider),
        u.iter().copied().collect(),
    )
}

fn check_build_and_query(u: U16Seq) {
    let provider = SetProvider::new();
    let (set, model) = set_pair(&u, &provider);

    assert_eq!(set.len(), model.len());
    assert_eq!(set.is_empty(), model.is_empty());
    assert_eq_iters(set.iter(), model.iter());
    assert_eq_iters(set.iter().rev(), model.iter().rev());
    assert_eq!(set.first(), model.first());
    assert_eq!(set.last(), model.last());

    for k in 0..64 {
        assert_eq!(set.contains(&k), model.contains(&k));
        assert_eq!(set.count(&k), model.contains(&k) as usize);
    }
    for (i, v) in model.iter().enumerate() {
        assert_eq!(set.at_index(i), Some(v));
    }
    assert_eq!(set.at_index(model.len()), None);
}

fn check_insert_erase(u: U16Seq, w: Vec<u16>) {
    let provider = SetProvider::new();
    let (mut set, mut model) = set_pair(&u, &provider);

    for k in w {
        if k % 3 == 0 {
            assert_eq!(set.erase(&k), model.remove(&k) as usize);
        } else {
            assert_eq!(set.insert(k), model.insert(k) as usize);
        }
    }
    assert_eq_iters(set.iter(), model.iter());
}

fn check_merges(u: U16Seq, v: U16Seq) {
    let provider = SetProvider::new();
    let (a, ma) = set_pair(&u, &provider);
    let (b, mb) = set_pair(&v, &provider);

    assert_eq_iters(a.union(&b).iter(), ma.union(&mb));
    assert_eq_iters(a.intersection(&b).iter(), ma.intersection(&mb));
    assert_eq_iters(a.difference(&b).iter(), ma.difference(&mb));
    assert_eq_iters(
        a.symmetric_difference(&b).iter(),
        ma.symmetric_difference(&mb),
    );
    assert_eq!(a.includes(&b), mb.is_subset(&ma));

    // The in-place forms agree with the out-of-place forms.
    let mut c = a.clone();
    c |= &b;
    assert_eq!(c, a.union(&b));
    let mut c = a.clone();
    c &= &b;
    assert_eq!(c, a.intersection(&b));
    let mut c = a.clone();
    c -= &b;
    assert_eq!(c, a.difference(&b));
    let mut c = a.clone();
    c ^= &b;
    assert_eq!(c, a.symmetric_difference(&b));
}

fn check_bounds(u: U16Seq, k: u16) {
    let provider = SetProvider::new();
    let (set, model) = set_pair(&u, &provider);

    let lower = model.iter().filter(|&&v| v < k).count();
    let upper = model.iter().filter(|&&v| v <= k).count();
    assert_eq!(set.lower_bound(&k), lower);
    assert_eq!(set.upper_bound(&k), upper);
    assert_eq!(set.equal_range(&k), lower..upper);
    assert_eq!(set.find(&k), model.get(&k));
}

fn check_index_ranges(u: U16Seq, first: usize, last: usize) {
    let provider = SetProvider::new();
    let (set, model) = set_pair(&u, &provider);
    let sorted: Vec<u16> = model.iter().copied().collect();
    let last = last.min(sorted.len());
    let first = first.min(last);

    let mut erased = set.clone();
    assert_eq!(erased.erase_range(first..last), last - first);
    let mut expect = sorted.clone();
    expect.drain(first..last);
    assert_eq_iters(erased.iter(), expect.iter());

    let mut retained = set.clone();
    assert_eq!(retained.retain_range(first..last), sorted.len() - (last - first));
    assert_eq_iters(retained.iter(), sorted[first..last].iter());

    assert_eq_iters(set.iter_range(first..last), sorted[first..last].iter());
}

fn check_canonical_roots(u: U16Seq) {
    let provider = SetProvider::new();
    let a = Set::from_iter_in(u.iter().copied(), &provider);
    let b = Set::from_iter_in(u.iter().rev().copied(), &provider);
    let mut c = Set::new_in(&provider);
    for &k in &u {
        c.insert(k);
    }
    // Same elements, any insertion order: same interned root.
    assert_eq!(a, b);
    assert_eq!(b, c);
    assert_eq!(a.hash(), b.hash());

    let d = Set::from_iter_in(a.iter().copied(), &provider);
    assert_eq!(a, d);
}

proptest! {
    #[test]
    fn test_build_and_query(u in small_int_seq()) {
        check_build_and_query(u);
    }

    #[test]
    fn test_insert_erase(u in u16_seq(64, 48), w in prop::collection::vec(0u16..64, 0..48)) {
        check_insert_erase(u, w);
    }

    #[test]
    fn test_merges(u in small_int_seq(), v in small_int_seq()) {
        check_merges(u, v);
    }

    #[test]
    fn test_overlapping_merges(u in u16_seq(64, 128), v in u16_seq(64, 128)) {
        check_merges(u, v);
    }

    #[test]
    fn test_bounds(u in small_int_seq(), k in 0u16..1024) {
        check_bounds(u, k);
    }

    #[test]
    fn test_index_ranges(u in small_int_seq(), first in 0usize..512, last in 0usize..512) {
        check_index_ranges(u, first, last);
    }

    #[test]
    fn test_canonical_roots(u in small_int_seq()) {
        check_canonical_roots(u);
    }
}

#[test]
fn union_of_small_sets() {
    let provider = SetProvider::new();
    let a = Set::from_iter_in([1, 2, 3], &provider);
    let b = Set::from_iter_in([3, 4, 5], &provider);
    let u = a.union(&b);
    assert_eq!(u.len(), 5);
    assert_eq_iters(u.iter(), [1, 2, 3, 4, 5].iter());

    let reversed = Set::from_iter_in([5, 4, 3, 2, 1], &provider);
    assert_eq!(u.hash(), reversed.hash());
    assert_eq!(u, reversed);
}

#[test]
fn empty_and_singleton_boundaries() {
    let provider = SetProvider::new();
    let empty = Set::new_in(&provider);
    let one = Set::from_iter_in([7u16], &provider);

    assert_eq!(empty.union(&one), one);
    assert_eq!(one.union(&empty), one);
    assert!(empty.intersection(&one).is_empty());
    assert!(one.intersection(&empty).is_empty());
    assert_eq!(one.difference(&empty), one);
    assert!(empty.difference(&one).is_empty());
    assert_eq!(one.symmetric_difference(&empty), one);
    assert!(one.includes(&empty));
    assert!(!empty.includes(&one));
    assert_eq!(empty.hash(), 0);
}

#[test]
fn sets_differing_at_one_key() {
    let provider = SetProvider::new();
    let a = Set::from_iter_in(0..1000u16, &provider);
    let mut b = a.clone();
    b.erase(&500);
    b.insert(1000);

    assert_eq_iters(a.difference(&b).iter(), [500].iter());
    assert_eq_iters(b.difference(&a).iter(), [1000].iter());
    assert_eq_iters(a.symmetric_difference(&b).iter(), [500, 1000].iter());
    assert_eq!(a.intersection(&b).len(), 999);
}

#[test]
fn default_provider_containers_interoperate() {
    let a: Set<u32> = (0..100).collect();
    let b = Set::from([5u32, 1, 3]);
    assert!(a.includes(&b));
    let mut c = a.clone();
    c.extend(100..110);
    assert_eq!(c.difference(&a).len(), 10);
}

#[test]
fn equality_is_constant_time_root_identity() {
    let provider = SetProvider::new();
    let interleaved = (0..10_000u16).step_by(2).chain((1..10_000u16).step_by(2));
    let a = Set::from_iter_in(interleaved, &provider);
    let b = Set::from_iter_in(0..10_000u16, &provider);
    assert_eq!(a, b);
    let mut c = b.clone();
    c.erase(&9_999);
    assert_ne!(a, c);
}
