#![cfg(test)]

// Property tests for List kept inside the crate so they can look at node
// links directly.

use crate::error::RuntimeError;
use crate::list::{Linked, NodeId, ValueList};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Add(i8),
    AddSorted(i8),
    InsertBefore(usize, i8),
    Remove(usize),
    PopFront,
    Find(i8),
    Slice(usize, usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<i8>().prop_map(Op::Add),
        any::<i8>().prop_map(Op::AddSorted),
        (0usize..16, any::<i8>()).prop_map(|(i, v)| Op::InsertBefore(i, v)),
        (0usize..16).prop_map(Op::Remove),
        Just(Op::PopFront),
        (-4i8..4).prop_map(Op::Find),
        (0usize..16, 0usize..16).prop_map(|(a, b)| Op::Slice(a, b)),
    ]
}

fn check_links(sut: &ValueList<i8>) -> Result<(), TestCaseError> {
    let ids: Vec<NodeId> = sut.ids().collect();
    prop_assert_eq!(ids.len(), sut.len());
    prop_assert_eq!(ids.first().copied(), sut.first());
    prop_assert_eq!(ids.last().copied(), sut.last());
    for w in ids.windows(2) {
        prop_assert_eq!(sut.next(w[0]), Some(w[1]));
        prop_assert_eq!(sut.prev(w[1]), Some(w[0]));
    }
    let back: Vec<NodeId> = sut.ids().rev().collect();
    prop_assert_eq!(back, ids.into_iter().rev().collect::<Vec<_>>());
    Ok(())
}

// Property: state-machine equivalence against a Vec of (id, value).
// - Order after every op matches the model, forwards and backwards.
// - add_sorted inserts before the first strictly greater value.
// - Removed ids are reported stale and never resolve again.
// - find returns the first node holding the value.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_list_matches_vec_model(ops in proptest::collection::vec(arb_op(), 1..80)) {
        let mut sut: ValueList<i8> = ValueList::new();
        let mut model: Vec<(NodeId, i8)> = Vec::new();
        let mut stale: Vec<NodeId> = Vec::new();

        for op in ops {
            match op {
                Op::Add(v) => {
                    let id = sut.add(v);
                    model.push((id, v));
                }
                Op::AddSorted(v) => {
                    let at = model.iter().position(|&(_, x)| x > v).unwrap_or(model.len());
                    let id = sut.add_sorted(v);
                    model.insert(at, (id, v));
                }
                Op::InsertBefore(i, v) => {
                    if model.is_empty() {
                        continue;
                    }
                    let at = i % model.len();
                    let id = sut.insert_before(model[at].0, v).unwrap();
                    model.insert(at, (id, v));
                }
                Op::Remove(i) => {
                    if model.is_empty() {
                        continue;
                    }
                    let (id, v) = model.remove(i % model.len());
                    prop_assert_eq!(sut.remove(id), Ok(v));
                    stale.push(id);
                }
                Op::PopFront => {
                    let expected = if model.is_empty() {
                        None
                    } else {
                        let (id, v) = model.remove(0);
                        stale.push(id);
                        Some(v)
                    };
                    prop_assert_eq!(sut.pop_front(), expected);
                }
                Op::Find(v) => {
                    let expected = model.iter().find(|&&(_, x)| x == v).map(|&(id, _)| id);
                    prop_assert_eq!(sut.find(&v), expected);
                }
                Op::Slice(a, b) => {
                    let end = b.min(model.len());
                    let begin = a.min(end);
                    let got: Vec<i8> = sut.slice(a, b).iter().copied().collect();
                    let want: Vec<i8> = model[begin..end].iter().map(|&(_, v)| v).collect();
                    prop_assert_eq!(got, want);
                }
            }

            let values: Vec<i8> = sut.iter().copied().collect();
            let want: Vec<i8> = model.iter().map(|&(_, v)| v).collect();
            prop_assert_eq!(values, want);
            check_links(&sut)?;
            for &id in &stale {
                prop_assert!(sut.get(id).is_none());
                prop_assert_eq!(sut.remove(id), Err(RuntimeError::StaleNode));
            }
        }
    }
}

// Detached intrusive values never carry links out of the list.
#[derive(Debug)]
struct Item {
    links: crate::list::Links,
    v: u8,
}

impl Linked for Item {
    fn links(&self) -> &crate::list::Links {
        &self.links
    }
    fn links_mut(&mut self) -> &mut crate::list::Links {
        &mut self.links
    }
}

proptest! {
    #[test]
    fn prop_intrusive_drain_unlinks(vs in proptest::collection::vec(any::<u8>(), 0..32)) {
        let mut l: crate::list::IntrusiveList<Item> = crate::list::IntrusiveList::with_order(
            |a: &Item, b: &Item| a.v.cmp(&b.v),
            |a: &Item, b: &Item| a.v == b.v,
        );
        for &v in &vs {
            l.add_sorted(Item { links: Default::default(), v });
        }
        let drained = l.drain();
        prop_assert!(l.is_empty());
        prop_assert!(drained.iter().all(|it| !it.links.is_linked()));
        let mut sorted = vs.clone();
        sorted.sort();
        prop_assert_eq!(drained.iter().map(|it| it.v).collect::<Vec<_>>(), sorted);
    }
}
