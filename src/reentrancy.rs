//! Debug-only guard against user callbacks re-entering a container.
//!
//! Lists and maps call user code (comparators, equality functions,
//! predicates) while walking their links. A callback that reaches back into
//! the same container through a raw pointer would observe half-updated
//! links, so every such walk holds a `Busy` token. In release builds the
//! guard is a zero-sized no-op.

#[cfg(debug_assertions)]
use core::cell::Cell;
use core::marker::PhantomData;

#[derive(Debug)]
pub struct CallbackGuard {
    #[cfg(debug_assertions)]
    active: Cell<Option<&'static str>>,
    _nosend: PhantomData<*mut ()>,
}

impl CallbackGuard {
    pub const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            active: Cell::new(None),
            _nosend: PhantomData,
        }
    }

    /// Mark `op` as running. Panics in debug builds if another operation on
    /// the same container has not finished yet.
    #[inline]
    pub fn enter(&self, op: &'static str) -> Busy<'_> {
        #[cfg(debug_assertions)]
        {
            if let Some(outer) = self.active.get() {
                panic!("reentrant call to `{op}` while `{outer}` is running a callback");
            }
            self.active.set(Some(op));
            Busy { owner: self }
        }

        #[cfg(not(debug_assertions))]
        {
            let _ = op;
            Busy { _z: PhantomData }
        }
    }
}

impl Default for CallbackGuard {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Busy<'a> {
    #[cfg(debug_assertions)]
    owner: &'a CallbackGuard,
    #[cfg(not(debug_assertions))]
    _z: PhantomData<&'a ()>,
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            debug_assert!(self.owner.active.get().is_some());
            self.owner.active.set(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CallbackGuard;

    #[test]
    fn sequential_operations_are_fine() {
        let g = CallbackGuard::new();
        {
            let _b = g.enter("find");
        }
        let _b = g.enter("add_sorted");
    }

    #[cfg(debug_assertions)]
    #[test]
    fn nested_entry_panics_in_debug() {
        let g = CallbackGuard::new();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _outer = g.enter("find");
            let _inner = g.enter("remove");
        }));
        assert!(res.is_err(), "nested entry must panic in debug builds");
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn nested_entry_is_noop_in_release() {
        let g = CallbackGuard::new();
        let _outer = g.enter("find");
        let _inner = g.enter("remove");
    }
}
