//! rc-runtime: reference-counted allocation and generic containers for a
//! single-threaded library runtime.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: one small ownership core that every container builds on, plus a
//!   capability layer so generic code can walk "whatever it was handed"
//!   without naming the container type.
//! - Layers:
//!   - heap: `Obj<T>` counted handles over heap blocks with optional
//!     finalizers. A per-thread live table keyed by generational `Handle`s
//!     answers `refcount(handle)` (-1 for anything that is not ours) and
//!     keeps allocation counters for leak checks. `Ptr<T>` is the explicit
//!     owned-vs-foreign union.
//!   - array / sequence: `Array<T>` stores `len + 1` slots, the last one
//!     always zero. `Sequence<T>` grows by doubling and closes into an
//!     array by moving its elements; no element is cloned or retained.
//!   - list: one generic doubly linked `List<N>`; the node type selects
//!     container mode (`ValueList`) or intrusive mode (`IntrusiveList`).
//!   - map: an unbalanced BST (`Tree<E>`) reusing the list links, in
//!     key/value (`Map`) and struct (`StructMap`) flavours, with an
//!     explicit-stack in-order iterator.
//!   - simple_map: flat `[k, v, k, v, .., None]` arrays.
//!   - iface: `Iterable` / `Accessor` traits. `get_iterator` / `get_lookup`
//!     take a `&dyn Dispatch`: built-in containers answer directly at any
//!     element type, client types through a `TypeId`-keyed registry.
//!
//! Constraints
//! - Single-threaded: every handle is `!Send`/`!Sync`; process-wide state
//!   (live table, capability registry) is per thread.
//! - Ownership is carried by element types. A container of `Obj<T>` releases
//!   its elements when it is dropped; a container of `&'static T` owns
//!   nothing; a container of `String` owns its copies.
//! - Stable, generational keys behind `Handle`, `NodeId` and `EntryId`; a
//!   stale id is reported, never dereferenced.
//! - Reentrancy: list and map operations that run user comparators or
//!   predicates hold a debug-only guard; a callback re-entering the same
//!   container panics in debug builds.
//!
//! Overflow semantics
//! - Reference-count overflow aborts the process, matching `Rc`.
//!
//! Notes and non-goals
//! - No cycle collection; cycles of `Obj` leak, as with `Rc`.
//! - The map is never rebalanced. Sorted insertion builds a chain and
//!   `Tree::height` reports it.
//! - No thread safety and no locking.
//!
//! Logging goes through `tracing`; the crate never installs a subscriber.
//! The `alloc-trace` feature adds a `trace!` event per allocation and free.

pub mod array;
mod array_proptest;
pub mod error;
pub mod heap;
pub mod iface;
pub mod list;
mod list_proptest;
pub mod map;
mod reentrancy;
pub mod sequence;
pub mod simple_map;

// Public surface
pub use array::{Array, Pointer, Slot};
pub use error::{Result, RuntimeError};
pub use heap::{
    allocate, allocate_with_finalizer, refcount, BlockInfo, BlockKind, Handle, HeapStats, Obj,
    Ptr,
};
pub use iface::{
    get_iterator, get_lookup, register_accessor, register_capability, register_iterable,
    Accessor, Capability, Dispatch, Iter, Iterable, Lookup, Sentinel,
};
pub use list::{DynList, IntrusiveList, Linked, Links, List, ListMode, NodeId, ValueList};
pub use map::{EntryId, Keyed, Map, Pair, StructMap, Tree, VisitOrder};
pub use sequence::Sequence;
pub use simple_map::SimpleMap;
