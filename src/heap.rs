//! Allocation core: counted heap blocks, finalizers and the live-allocation
//! table.
//!
//! Every `Obj<T>` points at one heap block holding the reference count, an
//! optional finalizer and the payload. Each live block is also registered
//! in a per-thread table keyed by generational `Handle`s; the table answers
//! "is this one of ours" in O(1) (`refcount` returns -1 otherwise), carries
//! the block metadata (`BlockInfo`), and keeps the allocated/released
//! counters used for leak checks.
//!
//! Invariants
//! - A block is registered from the moment it is allocated until its count
//!   reaches zero; it is unregistered *before* its finalizer runs, so a
//!   finalizer may freely allocate or release other blocks.
//! - The table never reads payloads; it only reads the count through the
//!   pointer registered alongside the metadata, which stays valid while the
//!   record exists.

use core::any::type_name;
use core::cell::{Cell, RefCell};
use core::marker::PhantomData;
use core::mem::{size_of, ManuallyDrop};
use core::ops::Deref;
use core::ptr::{self, NonNull};
use core::{cmp, fmt, hash};

use slotmap::{DefaultKey, Key, SlotMap};

/// Generational identity of a heap block. Stays unique even after the block
/// is freed and its slot reused, so stale handles are always recognised.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle(DefaultKey);

impl Handle {
    /// A handle that never refers to a block.
    pub fn null() -> Self {
        Handle(DefaultKey::null())
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    /// A single value, optionally finalized on release.
    Struct { finalizer: bool },
    /// `len` elements plus a trailing zero slot. A reference container
    /// releases each element when the array itself is released.
    Array { len: usize, ref_container: bool },
}

/// Metadata kept for every live block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    pub kind: BlockKind,
    pub elem_size: usize,
    pub type_name: &'static str,
}

impl BlockInfo {
    pub fn is_array(&self) -> bool {
        matches!(self.kind, BlockKind::Array { .. })
    }

    pub fn is_ref_container(&self) -> bool {
        matches!(
            self.kind,
            BlockKind::Array {
                ref_container: true,
                ..
            }
        )
    }
}

/// Allocation counters of the current thread's runtime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub allocated: u64,
    pub released: u64,
}

impl HeapStats {
    pub fn live(&self) -> u64 {
        self.allocated - self.released
    }
}

struct Record {
    info: BlockInfo,
    count: NonNull<RefCount>,
}

#[derive(Default)]
struct Table {
    blocks: SlotMap<DefaultKey, Record>,
    stats: HeapStats,
}

impl Table {
    fn register(&mut self, info: BlockInfo, count: NonNull<RefCount>) -> Handle {
        self.stats.allocated += 1;
        Handle(self.blocks.insert(Record { info, count }))
    }

    fn unregister(&mut self, handle: Handle) {
        let removed = self.blocks.remove(handle.0);
        debug_assert!(removed.is_some(), "block unregistered twice");
        self.stats.released += 1;
    }
}

thread_local! {
    static TABLE: RefCell<Table> = RefCell::new(Table::default());
}

fn unregister(handle: Handle) {
    // During thread teardown the table may already be gone; blocks freed
    // after that point simply have nothing left to unregister from.
    let _ = TABLE.try_with(|t| t.borrow_mut().unregister(handle));

    #[cfg(feature = "alloc-trace")]
    tracing::trace!(?handle, "release");
}

/// Single-threaded strong count. Starts at 1 for the allocating owner.
struct RefCount(Cell<usize>);

impl RefCount {
    fn new() -> Self {
        Self(Cell::new(1))
    }

    #[inline]
    fn get(&self) -> usize {
        self.0.get()
    }

    #[inline]
    fn inc(&self) {
        let n = self.0.get().wrapping_add(1);
        self.0.set(n);
        if n == 0 {
            // Same policy as `Rc`: overflow is unrecoverable.
            std::process::abort();
        }
    }

    /// Returns true when the count dropped to zero.
    #[inline]
    fn dec(&self) -> bool {
        let c = self.0.get();
        debug_assert!(c > 0, "refcount underflow");
        self.0.set(c - 1);
        c == 1
    }
}

/// Callback run exactly once when a block's count reaches zero.
pub type Finalizer<T> = Box<dyn FnOnce(&mut T)>;

struct Block<T> {
    count: RefCount,
    handle: Handle,
    finalizer: Option<Finalizer<T>>,
    value: T,
}

/// Counted owning handle to a heap block. `Clone` retains, `Drop` releases.
///
/// Equality, ordering and hashing are by identity (block address), which is
/// the default order used by lists and maps holding handles.
pub struct Obj<T: 'static> {
    block: NonNull<Block<T>>,
    _owns: PhantomData<Block<T>>,
}

pub(crate) fn alloc_block<T: 'static>(
    value: T,
    info: BlockInfo,
    finalizer: Option<Finalizer<T>>,
) -> Obj<T> {
    let raw = Box::into_raw(Box::new(Block {
        count: RefCount::new(),
        handle: Handle::null(),
        finalizer,
        value,
    }));
    // SAFETY: `raw` comes from `Box::into_raw`, so it is non-null and
    // uniquely owned here. Field pointers are taken without intermediate
    // references.
    let (block, count) = unsafe {
        (
            NonNull::new_unchecked(raw),
            NonNull::new_unchecked(ptr::addr_of_mut!((*raw).count)),
        )
    };
    let handle = TABLE.with(|t| t.borrow_mut().register(info, count));
    // SAFETY: still the unique owner; `Handle` is `Copy` so overwriting the
    // placeholder drops nothing.
    unsafe { ptr::addr_of_mut!((*raw).handle).write(handle) };

    #[cfg(feature = "alloc-trace")]
    tracing::trace!(?handle, type_name = info.type_name, "allocate");

    Obj {
        block,
        _owns: PhantomData,
    }
}

/// Allocate a struct-like block with count 1.
pub fn allocate<T: 'static>(value: T) -> Obj<T> {
    let info = BlockInfo {
        kind: BlockKind::Struct { finalizer: false },
        elem_size: size_of::<T>(),
        type_name: type_name::<T>(),
    };
    alloc_block(value, info, None)
}

/// Allocate a struct-like block whose `finalizer` runs when the last handle
/// is released, before the payload is dropped.
pub fn allocate_with_finalizer<T, F>(value: T, finalizer: F) -> Obj<T>
where
    T: 'static,
    F: FnOnce(&mut T) + 'static,
{
    let info = BlockInfo {
        kind: BlockKind::Struct { finalizer: true },
        elem_size: size_of::<T>(),
        type_name: type_name::<T>(),
    };
    alloc_block(value, info, Some(Box::new(finalizer)))
}

/// Current count of the block behind `handle`, or -1 when `handle` is not a
/// live block of this runtime (foreign value, stale or null handle).
pub fn refcount(handle: Handle) -> isize {
    TABLE
        .try_with(|t| {
            t.borrow().blocks.get(handle.0).map(|rec| {
                // SAFETY: the record is removed before its block is freed.
                unsafe { rec.count.as_ref().get() as isize }
            })
        })
        .ok()
        .flatten()
        .unwrap_or(-1)
}

pub fn is_live(handle: Handle) -> bool {
    refcount(handle) >= 0
}

pub fn info(handle: Handle) -> Option<BlockInfo> {
    TABLE
        .try_with(|t| t.borrow().blocks.get(handle.0).map(|rec| rec.info))
        .ok()
        .flatten()
}

/// Number of blocks currently alive on this thread.
pub fn live() -> usize {
    TABLE.with(|t| t.borrow().blocks.len())
}

pub fn stats() -> HeapStats {
    TABLE.with(|t| t.borrow().stats)
}

impl<T: 'static> Obj<T> {
    #[inline]
    fn block(&self) -> &Block<T> {
        // SAFETY: the block stays allocated while any `Obj` to it exists.
        unsafe { self.block.as_ref() }
    }

    /// Add an owner and return the new handle.
    #[inline]
    pub fn retain(&self) -> Self {
        self.block().count.inc();
        Obj {
            block: self.block,
            _owns: PhantomData,
        }
    }

    /// Give up this owner; frees the block when it was the last one.
    #[inline]
    pub fn release(self) {
        drop(self)
    }

    pub fn refcount(&self) -> usize {
        self.block().count.get()
    }

    pub fn handle(&self) -> Handle {
        self.block().handle
    }

    pub fn info(&self) -> Option<BlockInfo> {
        info(self.handle())
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        a.block == b.block
    }

    /// Mutable access when this is the only owner.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.refcount() == 1 {
            // SAFETY: count 1 means no other `Obj` aliases the block, and
            // `&mut self` excludes other borrows through this one.
            Some(unsafe { &mut (*self.block.as_ptr()).value })
        } else {
            None
        }
    }

    /// Take the payload out of a uniquely owned block. The block is freed
    /// without running its finalizer: ownership leaves the runtime instead
    /// of ending.
    pub fn try_unwrap(self) -> Result<T, Self> {
        if self.refcount() != 1 {
            return Err(self);
        }
        let this = ManuallyDrop::new(self);
        // SAFETY: count 1 and `this` is never dropped, so the box is
        // reconstituted exactly once.
        let block = unsafe { Box::from_raw(this.block.as_ptr()) };
        unregister(block.handle);
        let Block { value, .. } = *block;
        Ok(value)
    }
}

impl<T: 'static> Drop for Obj<T> {
    fn drop(&mut self) {
        if !self.block().count.dec() {
            return;
        }
        // SAFETY: the count reached zero, so this was the last handle and
        // nobody else can observe the block.
        let mut block = unsafe { Box::from_raw(self.block.as_ptr()) };
        unregister(block.handle);
        if let Some(finalize) = block.finalizer.take() {
            finalize(&mut block.value);
        }
    }
}

impl<T: 'static> Clone for Obj<T> {
    fn clone(&self) -> Self {
        self.retain()
    }
}

impl<T: 'static> Deref for Obj<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.block().value
    }
}

impl<T: 'static> AsRef<T> for Obj<T> {
    fn as_ref(&self) -> &T {
        self
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Obj<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Obj")
            .field("refcount", &self.refcount())
            .field("value", &**self)
            .finish()
    }
}

impl<T: 'static> PartialEq for Obj<T> {
    fn eq(&self, other: &Self) -> bool {
        Obj::ptr_eq(self, other)
    }
}

impl<T: 'static> Eq for Obj<T> {}

impl<T: 'static> PartialOrd for Obj<T> {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: 'static> Ord for Obj<T> {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.block.as_ptr().cmp(&other.block.as_ptr())
    }
}

impl<T: 'static> hash::Hash for Obj<T> {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.block.as_ptr().hash(state);
    }
}

/// A value that is either one of ours (counted) or foreign (static data the
/// runtime does not manage). Comparisons look at the contents.
pub enum Ptr<T: ?Sized + 'static> {
    Owned(Obj<Box<T>>),
    Foreign(&'static T),
}

impl<T: ?Sized + 'static> Ptr<T> {
    pub fn owned(value: Box<T>) -> Self {
        Ptr::Owned(allocate(value))
    }

    pub fn foreign(value: &'static T) -> Self {
        Ptr::Foreign(value)
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Ptr::Owned(_))
    }

    /// Count of an owned value, -1 for a foreign one.
    pub fn refcount(&self) -> isize {
        match self {
            Ptr::Owned(o) => o.refcount() as isize,
            Ptr::Foreign(_) => -1,
        }
    }

    pub fn handle(&self) -> Option<Handle> {
        match self {
            Ptr::Owned(o) => Some(o.handle()),
            Ptr::Foreign(_) => None,
        }
    }

    /// Another reference to the same value: retains owned values and reuses
    /// the identity of foreign ones.
    pub fn share(&self) -> Self {
        match self {
            Ptr::Owned(o) => Ptr::Owned(o.retain()),
            Ptr::Foreign(v) => Ptr::Foreign(*v),
        }
    }

    /// A reference guaranteed to be counted: foreign values are copied into
    /// a fresh block, owned values are retained.
    pub fn make_owned(&self) -> Self
    where
        Box<T>: From<&'static T>,
    {
        match self {
            Ptr::Owned(o) => Ptr::Owned(o.retain()),
            Ptr::Foreign(v) => Ptr::owned(Box::from(*v)),
        }
    }
}

impl<T: ?Sized + 'static> Deref for Ptr<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self {
            Ptr::Owned(o) => o,
            Ptr::Foreign(v) => v,
        }
    }
}

impl<T: ?Sized + 'static> AsRef<T> for Ptr<T> {
    fn as_ref(&self) -> &T {
        self
    }
}

impl<T: ?Sized + 'static> Clone for Ptr<T> {
    fn clone(&self) -> Self {
        self.share()
    }
}

impl From<&'static str> for Ptr<str> {
    fn from(s: &'static str) -> Self {
        Ptr::Foreign(s)
    }
}

impl From<String> for Ptr<str> {
    fn from(s: String) -> Self {
        Ptr::owned(s.into_boxed_str())
    }
}

impl<T: ?Sized + fmt::Debug + 'static> fmt::Debug for Ptr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ptr::Owned(o) => f.debug_tuple("Owned").field(&&***o).finish(),
            Ptr::Foreign(v) => f.debug_tuple("Foreign").field(v).finish(),
        }
    }
}

impl<T: ?Sized + fmt::Display + 'static> fmt::Display for Ptr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

impl<T: ?Sized + PartialEq + 'static> PartialEq for Ptr<T> {
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl<T: ?Sized + Eq + 'static> Eq for Ptr<T> {}

impl<T: ?Sized + PartialOrd + 'static> PartialOrd for Ptr<T> {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        (**self).partial_cmp(&**other)
    }
}

impl<T: ?Sized + Ord + 'static> Ord for Ptr<T> {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        (**self).cmp(&**other)
    }
}

impl<T: ?Sized + hash::Hash + 'static> hash::Hash for Ptr<T> {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        (**self).hash(state)
    }
}
