// Map property tests.
//
// Property 1: state-machine equivalence against BTreeMap.
//  - Operations: put, remove, get, iterate.
//  - Invariant: len() matches the model after every op; in-order keys are
//    the model's sorted keys; get(k) after remove(k) is None and every other
//    key keeps its value.
//
// Property 2: any insertion order iterates sorted, under a reversed
// comparator as well.
use proptest::prelude::*;
use rc_runtime::{Map, RuntimeError};
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
enum Op {
    Put(u8, i32),
    Remove(u8),
    Get(u8),
    Iterate,
}

fn arb_op() -> impl Strategy<Value = Op> {
    // Keys from a small range so removals and overwrites hit.
    prop_oneof![
        3 => (0u8..32, any::<i32>()).prop_map(|(k, v)| Op::Put(k, v)),
        2 => (0u8..32).prop_map(Op::Remove),
        1 => (0u8..32).prop_map(Op::Get),
        1 => Just(Op::Iterate),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_map_matches_btreemap(ops in proptest::collection::vec(arb_op(), 1..120)) {
        let mut sut: Map<u8, i32> = Map::new();
        let mut model: BTreeMap<u8, i32> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Put(k, v) => {
                    sut.put(k, v);
                    model.insert(k, v);
                }
                Op::Remove(k) => {
                    let expected = model.remove(&k).map(|v| (k, v)).ok_or(RuntimeError::NotFound);
                    prop_assert_eq!(sut.remove(&k), expected);
                    prop_assert!(sut.get(&k).is_none());
                }
                Op::Get(k) => {
                    prop_assert_eq!(sut.get(&k), model.get(&k));
                    prop_assert_eq!(sut.contains(&k), model.contains_key(&k));
                }
                Op::Iterate => {
                    let got: Vec<(u8, i32)> = sut.pairs().map(|(k, v)| (*k, *v)).collect();
                    let want: Vec<(u8, i32)> = model.iter().map(|(k, v)| (*k, *v)).collect();
                    prop_assert_eq!(got, want);
                }
            }
            prop_assert_eq!(sut.len(), model.len());
            prop_assert!(sut.height() <= sut.len());
        }

        for (k, v) in &model {
            prop_assert_eq!(sut.get(k), Some(v));
        }
        prop_assert_eq!(sut.first().and_then(|id| sut.entry(id)).map(|p| p.key), model.keys().next().copied());
        prop_assert_eq!(sut.last().and_then(|id| sut.entry(id)).map(|p| p.key), model.keys().next_back().copied());
    }

    #[test]
    fn prop_any_insertion_order_iterates_sorted(keys in proptest::collection::vec(any::<i16>(), 0..64)) {
        let mut up: Map<i16, ()> = Map::new();
        let mut down: Map<i16, ()> = Map::with_comparator(|a: &i16, b: &i16| b.cmp(a));
        for &k in &keys {
            up.put(k, ());
            down.put(k, ());
        }
        let mut want: Vec<i16> = keys.clone();
        want.sort();
        want.dedup();
        prop_assert_eq!(up.keys().copied().collect::<Vec<_>>(), want.clone());
        want.reverse();
        prop_assert_eq!(down.keys().copied().collect::<Vec<_>>(), want);
        prop_assert_eq!(up.iter().len(), up.len());
    }
}
