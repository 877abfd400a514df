#![cfg(test)]

// Property tests for Array and Sequence. They run inside the crate so they
// can compare the raw slot run, sentinel included, against a Vec model.

use crate::array::{Array, Slot};
use crate::error::RuntimeError;
use crate::heap::{allocate, Obj};
use crate::sequence::{Sequence, INITIAL_CAPACITY};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum ArrayOp {
    Set(usize, i32),
    Resize(usize),
    Copy(usize, usize),
}

fn arb_array_op() -> impl Strategy<Value = ArrayOp> {
    prop_oneof![
        4 => (0usize..24, any::<i32>()).prop_map(|(i, v)| ArrayOp::Set(i, v)),
        1 => (0usize..24).prop_map(ArrayOp::Resize),
        1 => (0usize..24, 0usize..24).prop_map(|(a, b)| ArrayOp::Copy(a, b)),
    ]
}

fn check_sentinel<T: Slot + PartialEq + core::fmt::Debug>(
    a: &Array<T>,
    model: &[T],
) -> Result<(), TestCaseError> {
    let slots = a.as_slice_with_sentinel();
    prop_assert_eq!(slots.len(), model.len() + 1);
    prop_assert_eq!(&slots[..model.len()], model);
    prop_assert!(a.sentinel().is_zero());
    prop_assert!(slots[model.len()].is_zero());
    Ok(())
}

#[derive(Clone, Debug)]
enum SeqOp {
    Append(i64),
    AppendMany(Vec<i64>),
    Pop,
}

fn arb_seq_op() -> impl Strategy<Value = SeqOp> {
    prop_oneof![
        6 => any::<i64>().prop_map(SeqOp::Append),
        2 => proptest::collection::vec(any::<i64>(), 0..12).prop_map(SeqOp::AppendMany),
        1 => Just(SeqOp::Pop),
    ]
}

proptest! {
    // Whatever is written, including zeros, the slot at index len reads as
    // zero and the elements match the model.
    #[test]
    fn prop_sentinel_survives_writes(
        len in 0usize..16,
        ops in proptest::collection::vec(arb_array_op(), 1..48),
    ) {
        let mut a: Array<i32> = Array::new(len);
        let mut model = vec![0i32; len];
        check_sentinel(&a, &model)?;

        for op in ops {
            match op {
                ArrayOp::Set(i, v) => {
                    let res = a.set(i, v);
                    if i < model.len() {
                        prop_assert_eq!(res, Ok(model[i]));
                        model[i] = v;
                    } else {
                        prop_assert_eq!(
                            res,
                            Err(RuntimeError::OutOfBounds { index: i, len: model.len() })
                        );
                    }
                }
                ArrayOp::Resize(n) => {
                    a = a.resize(n);
                    model.resize(n, 0);
                }
                ArrayOp::Copy(from, to) => {
                    match a.copy(from, to) {
                        Ok(c) => {
                            prop_assert!(from <= to && to <= model.len());
                            check_sentinel(&c, &model[from..to])?;
                        }
                        Err(e) => {
                            prop_assert_eq!(
                                e,
                                RuntimeError::InvalidRange { from, to, len: model.len() }
                            );
                        }
                    }
                }
            }
            check_sentinel(&a, &model)?;
        }
    }

    // After k appends a sequence closes to an array of length k, in append
    // order; capacity only ever doubles from its start.
    #[test]
    fn prop_sequence_closes_in_append_order(
        ops in proptest::collection::vec(arb_seq_op(), 0..64),
    ) {
        let mut s: Sequence<i64> = Sequence::new();
        let mut model: Vec<i64> = Vec::new();
        for op in ops {
            match op {
                SeqOp::Append(v) => {
                    s.append(v);
                    model.push(v);
                }
                SeqOp::AppendMany(vs) => {
                    s.append_many(&vs);
                    model.extend_from_slice(&vs);
                }
                SeqOp::Pop => {
                    prop_assert_eq!(s.pop(), model.pop());
                }
            }
            prop_assert_eq!(s.len(), model.len());
            prop_assert!(s.capacity() >= s.len());
            prop_assert!(s.capacity() >= INITIAL_CAPACITY);
            prop_assert!(s.capacity().is_power_of_two());
            prop_assert_eq!(s.as_slice(), model.as_slice());
        }
        let a = s.close();
        prop_assert_eq!(a.len(), model.len());
        check_sentinel(&a, &model)?;
    }

    // Closing moves counted elements: each handle is held once per append
    // until the array goes away.
    #[test]
    fn prop_closed_pointer_arrays_hold_one_count_per_slot(
        picks in proptest::collection::vec(0usize..4, 0..24),
    ) {
        let objs: Vec<Obj<u8>> = (0..4u8).map(allocate).collect();
        let mut s: Sequence<Option<Obj<u8>>> = Sequence::new();
        for &i in &picks {
            s.append(Some(objs[i].retain()));
        }
        let a = s.close();
        prop_assert_eq!(a.len(), picks.len());
        prop_assert!(a.sentinel().is_none());
        for (i, o) in objs.iter().enumerate() {
            let held = picks.iter().filter(|&&p| p == i).count();
            prop_assert_eq!(o.refcount(), 1 + held);
        }
        drop(a);
        prop_assert!(objs.iter().all(|o| o.refcount() == 1));
    }
}
