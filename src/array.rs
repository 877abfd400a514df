//! Counted fixed-size arrays with a zeroed trailing sentinel slot.
//!
//! An `Array<T>` of length `n` always stores `n + 1` slots; slot `n` holds
//! `T::zero()` so that pointer arrays can also be scanned without knowing
//! their length. The size is fixed at creation: `resize` and `copy` build
//! new arrays.

use core::any::{type_name, Any};
use core::mem::{self, size_of};
use core::{fmt, ops, slice};

use tracing::debug;

use crate::error::{Result, RuntimeError};
use crate::heap::{self, BlockInfo, BlockKind, Handle, Obj, Ptr};

/// Element types that have a distinguished zero value.
pub trait Slot: Sized + 'static {
    /// True when elements own counted handles, making the array a
    /// reference container: releasing it releases every element.
    const COUNTED: bool = false;

    /// True for nullable pointer slots. Only arrays of these can hold
    /// string keys, so only they answer key lookups.
    const POINTER: bool = false;

    fn zero() -> Self;

    fn is_zero(&self) -> bool;

    /// The element as seen by generic iteration. Pointer slots expose their
    /// pointee rather than the `Option` wrapper.
    fn payload(&self) -> &dyn Any {
        self
    }
}

macro_rules! zeroed_slot {
    ($($t:ty => $zero:expr),* $(,)?) => {
        $(
            impl Slot for $t {
                #[inline]
                fn zero() -> Self {
                    $zero
                }
                #[inline]
                fn is_zero(&self) -> bool {
                    *self == $zero
                }
            }
        )*
    };
}

zeroed_slot! {
    i8 => 0, i16 => 0, i32 => 0, i64 => 0, isize => 0,
    u8 => 0, u16 => 0, u32 => 0, u64 => 0, usize => 0,
    f32 => 0.0, f64 => 0.0,
    bool => false, char => '\0',
}

/// Pointer-like element types; `Option<P>` is their nullable slot form.
pub trait Pointer: 'static {
    const COUNTED: bool;
}

impl<T: 'static> Pointer for Obj<T> {
    const COUNTED: bool = true;
}

impl<T: ?Sized + 'static> Pointer for Ptr<T> {
    const COUNTED: bool = true;
}

impl<T: ?Sized + 'static> Pointer for &'static T {
    const COUNTED: bool = false;
}

impl<T: ?Sized + 'static> Pointer for Box<T> {
    const COUNTED: bool = false;
}

impl Pointer for String {
    const COUNTED: bool = false;
}

impl<P: Pointer> Slot for Option<P> {
    const COUNTED: bool = P::COUNTED;
    const POINTER: bool = true;

    #[inline]
    fn zero() -> Self {
        None
    }

    #[inline]
    fn is_zero(&self) -> bool {
        self.is_none()
    }

    fn payload(&self) -> &dyn Any {
        match self {
            Some(p) => p,
            None => self,
        }
    }
}

fn array_info<T: Slot>(len: usize) -> BlockInfo {
    BlockInfo {
        kind: BlockKind::Array {
            len,
            ref_container: T::COUNTED,
        },
        elem_size: size_of::<T>(),
        type_name: type_name::<T>(),
    }
}

/// Counted array handle. `Clone` retains the same array.
pub struct Array<T: Slot> {
    slots: Obj<Box<[T]>>,
}

impl<T: Slot> Array<T> {
    /// An array of `len` zero elements.
    pub fn new(len: usize) -> Self {
        Self::from_slots((0..=len).map(|_| T::zero()).collect())
    }

    pub fn from_vec(mut values: Vec<T>) -> Self {
        values.push(T::zero());
        Self::from_slots(values.into_boxed_slice())
    }

    /// Wrap slots whose last element is already the sentinel.
    pub(crate) fn from_slots(slots: Box<[T]>) -> Self {
        debug_assert!(slots.last().map_or(false, T::is_zero));
        let len = slots.len() - 1;
        Self {
            slots: heap::alloc_block(slots, array_info::<T>(len), None),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn elem_size(&self) -> usize {
        size_of::<T>()
    }

    pub fn is_ref_container(&self) -> bool {
        T::COUNTED
    }

    pub fn handle(&self) -> Handle {
        self.slots.handle()
    }

    pub fn refcount(&self) -> usize {
        self.slots.refcount()
    }

    pub fn retain(&self) -> Self {
        Self {
            slots: self.slots.retain(),
        }
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Obj::ptr_eq(&a.slots, &b.slots)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.slots[..self.len()]
    }

    pub fn as_slice_with_sentinel(&self) -> &[T] {
        &self.slots
    }

    /// The trailing slot; always reads as `T::zero()`.
    pub fn sentinel(&self) -> &T {
        &self.slots[self.len()]
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// Mutable view of the elements (sentinel excluded). Fails when the
    /// array has other owners.
    pub fn as_mut_slice(&mut self) -> Result<&mut [T]> {
        let len = self.len();
        let refcount = self.slots.refcount();
        match self.slots.get_mut() {
            Some(slots) => Ok(&mut slots[..len]),
            None => Err(RuntimeError::Shared { refcount }),
        }
    }

    /// Store `value` at `index`, returning the previous element.
    pub fn set(&mut self, index: usize, value: T) -> Result<T> {
        let len = self.len();
        let elems = self.as_mut_slice()?;
        let slot = elems
            .get_mut(index)
            .ok_or(RuntimeError::OutOfBounds { index, len })?;
        Ok(mem::replace(slot, value))
    }

    /// A new array of `new_len` elements holding this array's prefix,
    /// zero-padded. A uniquely owned array hands its elements over (so
    /// nothing is released twice); a shared one has them cloned.
    pub fn resize(mut self, new_len: usize) -> Self
    where
        T: Clone,
    {
        let old_len = self.len();
        let mut elems = match self.slots.get_mut() {
            Some(slots) => {
                let mut v = mem::take(slots).into_vec();
                v.truncate(old_len);
                v
            }
            None => self.as_slice().to_vec(),
        };
        drop(self);
        elems.resize_with(new_len, T::zero);
        debug!(old_len, new_len, elem = type_name::<T>(), "array resize");
        Self::from_vec(elems)
    }

    /// A new array holding elements `[from, to)`.
    pub fn copy(&self, from: usize, to: usize) -> Result<Self>
    where
        T: Clone,
    {
        let len = self.len();
        if from > to || to > len {
            return Err(RuntimeError::InvalidRange { from, to, len });
        }
        Ok(Self::from_vec(self.as_slice()[from..to].to_vec()))
    }

    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.as_slice().to_vec()
    }
}

impl<T: Slot> Clone for Array<T> {
    fn clone(&self) -> Self {
        self.retain()
    }
}

impl<T: Slot> ops::Index<usize> for Array<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.as_slice()[index]
    }
}

impl<'a, T: Slot> IntoIterator for &'a Array<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Slot> FromIterator<T> for Array<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<T: Slot + fmt::Debug> fmt::Debug for Array<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}
