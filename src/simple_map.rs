//! Flat key/value arrays.
//!
//! A `SimpleMap` is an `Array<Option<T>>` laid out as
//! `[k0, v0, k1, v1, ..., None]`: keys and values alternate and the array's
//! zero sentinel ends the map. Lookup is a linear scan. It is the cheapest
//! way to hand a handful of named values to code that only needs an
//! `Accessor`.

use core::slice;

use crate::array::{Array, Pointer};
use crate::map::Map;

pub struct SimpleMap<T: Pointer> {
    array: Array<Option<T>>,
}

impl<T: Pointer> SimpleMap<T> {
    pub fn new() -> Self {
        Self {
            array: Array::new(0),
        }
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (T, T)>,
    {
        let flat = pairs
            .into_iter()
            .flat_map(|(k, v)| [Some(k), Some(v)])
            .collect();
        Self { array: flat }
    }

    /// Treat an existing flat array as a simple map.
    pub fn from_array(array: Array<Option<T>>) -> Self {
        Self { array }
    }

    /// Export a map in key order. Walks the map's in-order iterator, so
    /// stack use stays flat however tall the tree is.
    pub fn from_map(map: &Map<T, T>) -> Self
    where
        T: Clone,
    {
        let flat = map
            .iter()
            .flat_map(|p| [Some(p.key.clone()), Some(p.value.clone())])
            .collect();
        Self { array: flat }
    }

    /// Number of complete pairs before the first empty slot.
    pub fn len(&self) -> usize {
        self.pairs().count()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs().next().is_none()
    }

    /// Walks the slots two at a time; a missing key or value ends the map.
    pub fn pairs(&self) -> Pairs<'_, T> {
        Pairs {
            slots: self.array.as_slice_with_sentinel().chunks_exact(2),
            done: false,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &T> + '_ {
        self.pairs().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.pairs().map(|(_, v)| v)
    }

    pub fn as_array(&self) -> &Array<Option<T>> {
        &self.array
    }

    pub fn into_array(self) -> Array<Option<T>> {
        self.array
    }
}

impl<T: Pointer + AsRef<str>> SimpleMap<T> {
    /// Value stored under the first key equal to `key`.
    pub fn get(&self, key: &str) -> Option<&T> {
        self.pairs()
            .find(|(k, _)| AsRef::<str>::as_ref(*k) == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

impl<T: Pointer> Default for SimpleMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Pointer> Clone for SimpleMap<T> {
    fn clone(&self) -> Self {
        Self {
            array: self.array.retain(),
        }
    }
}

pub struct Pairs<'a, T> {
    slots: slice::ChunksExact<'a, Option<T>>,
    done: bool,
}

impl<'a, T> Iterator for Pairs<'a, T> {
    type Item = (&'a T, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.slots.next()? {
            [Some(k), Some(v)] => Some((k, v)),
            _ => {
                self.done = true;
                None
            }
        }
    }
}
