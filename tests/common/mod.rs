#![allow(dead_code)]

use proptest::prelude::*;

pub fn assert_eq_iters<I: Iterator, J: Iterator<Item = I::Item>>(mut i: I, mut j: J)
where
    I::Item: std::fmt::Debug + PartialEq,
{
    loop {
        match (i.next(), j.next()) {
            (None, None) => return,
            (a, b) => assert_eq!(a, b),
        }
    }
}

pub type U16Seq = Vec<u16>;

pub fn u16_seq(max: u16, len: usize) -> impl Strategy<Value = U16Seq> {
    prop::collection::vec(0..max, 0..len)
}

pub fn small_int_seq() -> impl Strategy<Value = U16Seq> {
    u16_seq(1024, 512)
}

pub type U16Pairs = Vec<(u16, u16)>;

pub fn u16_pairs(max: u16, len: usize) -> impl Strategy<Value = U16Pairs> {
    prop::collection::vec((0..max, 0..max), 0..len)
}

pub fn small_int_pairs() -> impl Strategy<Value = U16Pairs> {
    u16_pairs(1024, 512)
}
