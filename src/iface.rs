//! Capability layer: iterate or look up values in any container without
//! naming its concrete type.
//!
//! Two routes lead to the same `Iter` / `Lookup` objects:
//! - static: every container implements `Iterable` (and, where it is keyed,
//!   `Accessor`) directly;
//! - dynamic: `get_iterator` / `get_lookup` take a `&dyn Dispatch`. Built-in
//!   containers answer through `Dispatch` at any element type; client types
//!   implement `Dispatch` with its defaults and are resolved through a
//!   per-thread registry of constructors keyed by `TypeId`. The registry is
//!   seeded with the simple-map kinds on first use and only grows afterwards.
//!
//! Foreign sentinel-terminated arrays (static data the runtime does not
//! own) take part through the `Sentinel` adapter.
//!
//! Key lookups compare strings. A key counts as a string when it is one of
//! the string-like kinds the runtime stores: `&'static str`, `String`,
//! `Box<str>`, `Ptr<str>` or `Obj<String>`.

use core::any::{type_name, Any, TypeId};
use core::fmt;
use std::cell::RefCell;

use hashbrown::HashMap;
use tracing::debug;

use crate::array::{Array, Pointer, Slot};
use crate::error::{Result, RuntimeError};
use crate::heap::{Obj, Ptr};
use crate::list::{List, Node};
use crate::map::{Keyed, Tree};
use crate::sequence::Sequence;
use crate::simple_map::SimpleMap;

/// Source of an `Iter`. `next_pair` is only meaningful for keyed
/// containers; the two calls advance the same position.
pub trait Cursor<'a> {
    fn next_value(&mut self) -> Option<&'a dyn Any>;

    fn next_pair(&mut self) -> Option<(&'a dyn Any, &'a dyn Any)> {
        None
    }
}

struct Values<I>(I);

impl<'a, I> Cursor<'a> for Values<I>
where
    I: Iterator<Item = &'a dyn Any>,
{
    fn next_value(&mut self) -> Option<&'a dyn Any> {
        self.0.next()
    }
}

struct Pairs<I>(I);

impl<'a, I> Cursor<'a> for Pairs<I>
where
    I: Iterator<Item = (&'a dyn Any, &'a dyn Any)>,
{
    fn next_value(&mut self) -> Option<&'a dyn Any> {
        self.0.next().map(|(_, v)| v)
    }

    fn next_pair(&mut self) -> Option<(&'a dyn Any, &'a dyn Any)> {
        self.0.next()
    }
}

/// Uniform iterator over a borrowed container.
pub struct Iter<'a> {
    cursor: Box<dyn Cursor<'a> + 'a>,
}

impl<'a> Iter<'a> {
    pub fn new<C: Cursor<'a> + 'a>(cursor: C) -> Self {
        Self {
            cursor: Box::new(cursor),
        }
    }

    /// An iterator that yields values only.
    pub fn values<I>(values: I) -> Self
    where
        I: Iterator<Item = &'a dyn Any> + 'a,
    {
        Self::new(Values(values))
    }

    /// An iterator over key/value pairs; plain `next` yields the values.
    pub fn pairs<I>(pairs: I) -> Self
    where
        I: Iterator<Item = (&'a dyn Any, &'a dyn Any)> + 'a,
    {
        Self::new(Pairs(pairs))
    }

    /// Next key/value pair, or `None` for containers without keys.
    pub fn next_pair(&mut self) -> Option<(&'a dyn Any, &'a dyn Any)> {
        self.cursor.next_pair()
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a dyn Any;

    fn next(&mut self) -> Option<&'a dyn Any> {
        self.cursor.next_value()
    }
}

impl fmt::Debug for Iter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").finish_non_exhaustive()
    }
}

/// Uniform string-keyed lookup over a borrowed container.
pub struct Lookup<'a> {
    find: Box<dyn Fn(&str) -> Option<&'a dyn Any> + 'a>,
}

impl<'a> Lookup<'a> {
    pub fn new<F>(find: F) -> Self
    where
        F: Fn(&str) -> Option<&'a dyn Any> + 'a,
    {
        Self {
            find: Box::new(find),
        }
    }

    pub fn of<C: Accessor + ?Sized>(container: &'a C) -> Self {
        Self::new(move |key| container.lookup(key))
    }

    pub fn get(&self, key: &str) -> Option<&'a dyn Any> {
        (self.find)(key)
    }
}

impl fmt::Debug for Lookup<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lookup").finish_non_exhaustive()
    }
}

pub trait Iterable {
    fn dyn_iter(&self) -> Iter<'_>;
}

pub trait Accessor {
    fn lookup(&self, key: &str) -> Option<&dyn Any>;
}

/// A foreign array terminated by its first `None`; the length is never
/// stored, only found by scanning.
#[derive(Clone, Copy, Debug)]
pub struct Sentinel<'a, T> {
    slots: &'a [Option<T>],
}

impl<'a, T> Sentinel<'a, T> {
    pub const fn new(slots: &'a [Option<T>]) -> Self {
        Self { slots }
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a T> {
        self.slots.iter().map_while(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// String view of a key, for the string-like kinds the runtime stores.
fn key_str(key: &dyn Any) -> Option<&str> {
    if let Some(s) = key.downcast_ref::<&'static str>() {
        Some(*s)
    } else if let Some(s) = key.downcast_ref::<String>() {
        Some(s.as_str())
    } else if let Some(s) = key.downcast_ref::<Box<str>>() {
        Some(&**s)
    } else if let Some(p) = key.downcast_ref::<Ptr<str>>() {
        Some(&**p)
    } else {
        key.downcast_ref::<Obj<String>>().map(|o| o.as_str())
    }
}

/// Linear scan over a flat `[k0, v0, k1, v1, ..]` slot run, ending at the
/// first empty key or value.
fn scan_pairs<'a, T: Slot>(slots: &'a [T], key: &str) -> Option<&'a dyn Any> {
    slots
        .chunks_exact(2)
        .map_while(|pair| match pair {
            [k, v] if !k.is_zero() && !v.is_zero() => Some((k, v)),
            _ => None,
        })
        .find(|(k, _)| key_str(k.payload()) == Some(key))
        .map(|(_, v)| v.payload())
}

impl<T: Slot> Iterable for Array<T> {
    fn dyn_iter(&self) -> Iter<'_> {
        Iter::values(self.iter().map(Slot::payload))
    }
}

impl<T: Slot> Iterable for Sequence<T> {
    fn dyn_iter(&self) -> Iter<'_> {
        Iter::values(self.as_slice().iter().map(Slot::payload))
    }
}

impl<T: Pointer> Iterable for Sentinel<'_, T> {
    fn dyn_iter(&self) -> Iter<'_> {
        Iter::values(self.iter().map(|v| v as &dyn Any))
    }
}

impl<N: Node> Iterable for List<N> {
    fn dyn_iter(&self) -> Iter<'_> {
        Iter::values(self.iter().map(|v| v as &dyn Any))
    }
}

impl<E: Keyed> Iterable for Tree<E> {
    fn dyn_iter(&self) -> Iter<'_> {
        Iter::pairs(self.iter().map(|e| (e.key_any(), e.value_any())))
    }
}

impl<T: Pointer> Iterable for SimpleMap<T> {
    fn dyn_iter(&self) -> Iter<'_> {
        Iter::pairs(self.pairs().map(|(k, v)| (k as &dyn Any, v as &dyn Any)))
    }
}

impl<C: Iterable + 'static> Iterable for Obj<C> {
    fn dyn_iter(&self) -> Iter<'_> {
        (**self).dyn_iter()
    }
}

impl<T: Pointer> Accessor for SimpleMap<T> {
    fn lookup(&self, key: &str) -> Option<&dyn Any> {
        scan_pairs(self.as_array().as_slice(), key)
    }
}

/// Reads the array as a flat key/value run. Arrays of plain values have no
/// string keys and never match.
impl<T: Slot> Accessor for Array<T> {
    fn lookup(&self, key: &str) -> Option<&dyn Any> {
        scan_pairs(self.as_slice(), key)
    }
}

impl<T: Pointer> Accessor for Sentinel<'_, T> {
    fn lookup(&self, key: &str) -> Option<&dyn Any> {
        scan_pairs(self.slots, key)
    }
}

/// String-equality scan in key order. The tree's own comparator is not
/// consulted, so a map ordered case-insensitively still looks up by exact
/// string here.
impl<E: Keyed> Accessor for Tree<E> {
    fn lookup(&self, key: &str) -> Option<&dyn Any> {
        self.iter()
            .find(|e| key_str(e.key_any()) == Some(key))
            .map(|e| e.value_any())
    }
}

impl<C: Accessor + 'static> Accessor for Obj<C> {
    fn lookup(&self, key: &str) -> Option<&dyn Any> {
        (**self).lookup(key)
    }
}

/// Upcast to `Any`; provided for every `'static` type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// What `get_iterator` and `get_lookup` accept.
///
/// The built-in containers answer at every element type. A client type
/// implements this with the default methods (`impl Dispatch for Env {}`)
/// and registers its capabilities instead.
pub trait Dispatch: AsAny + 'static {
    fn as_iterable(&self) -> Option<&dyn Iterable> {
        None
    }

    fn as_accessor(&self) -> Option<&dyn Accessor> {
        None
    }
}

impl<T: Pointer> Dispatch for Sentinel<'static, T> {
    fn as_iterable(&self) -> Option<&dyn Iterable> {
        Some(self)
    }

    fn as_accessor(&self) -> Option<&dyn Accessor> {
        Some(self)
    }
}

impl<T: Slot> Dispatch for Array<T> {
    fn as_iterable(&self) -> Option<&dyn Iterable> {
        Some(self)
    }

    fn as_accessor(&self) -> Option<&dyn Accessor> {
        if T::POINTER {
            Some(self)
        } else {
            None
        }
    }
}

impl<N: Node> Dispatch for List<N> {
    fn as_iterable(&self) -> Option<&dyn Iterable> {
        Some(self)
    }
}

impl<T: Slot> Dispatch for Sequence<T> {
    fn as_iterable(&self) -> Option<&dyn Iterable> {
        Some(self)
    }
}

impl<E: Keyed> Dispatch for Tree<E> {
    fn as_iterable(&self) -> Option<&dyn Iterable> {
        Some(self)
    }

    fn as_accessor(&self) -> Option<&dyn Accessor> {
        Some(self)
    }
}

impl<T: Pointer> Dispatch for SimpleMap<T> {
    fn as_iterable(&self) -> Option<&dyn Iterable> {
        Some(self)
    }

    fn as_accessor(&self) -> Option<&dyn Accessor> {
        Some(self)
    }
}

impl<C: Dispatch> Dispatch for Obj<C> {
    fn as_iterable(&self) -> Option<&dyn Iterable> {
        (**self).as_iterable()
    }

    fn as_accessor(&self) -> Option<&dyn Accessor> {
        (**self).as_accessor()
    }
}

pub type IterFn = for<'a> fn(&'a dyn Any) -> Option<Iter<'a>>;
pub type LookupFn = for<'a> fn(&'a dyn Any) -> Option<Lookup<'a>>;

/// A constructor registered for one concrete type.
#[derive(Clone, Copy)]
pub enum Capability {
    Iterable(IterFn),
    Accessor(LookupFn),
}

fn iter_as<C: Iterable + 'static>(value: &dyn Any) -> Option<Iter<'_>> {
    value.downcast_ref::<C>().map(C::dyn_iter)
}

fn lookup_as<C: Accessor + 'static>(value: &dyn Any) -> Option<Lookup<'_>> {
    value.downcast_ref::<C>().map(Lookup::of)
}

impl Capability {
    pub fn iterable<C: Iterable + 'static>() -> Self {
        Capability::Iterable(iter_as::<C>)
    }

    pub fn accessor<C: Accessor + 'static>() -> Self {
        Capability::Accessor(lookup_as::<C>)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Capability::Iterable(_) => "Iterable",
            Capability::Accessor(_) => "Accessor",
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Default)]
struct Registry {
    caps: HashMap<TypeId, Vec<Capability>>,
    ready: bool,
}

impl Registry {
    fn add(&mut self, type_id: TypeId, cap: Capability) {
        self.caps.entry(type_id).or_default().push(cap);
    }

    fn add_keyed<C: Iterable + Accessor + 'static>(&mut self) {
        self.add(TypeId::of::<C>(), Capability::iterable::<C>());
        self.add(TypeId::of::<C>(), Capability::accessor::<C>());
    }

    fn ensure_defaults(&mut self) {
        if self.ready {
            return;
        }
        self.ready = true;

        self.add_keyed::<SimpleMap<&'static str>>();
        self.add_keyed::<SimpleMap<String>>();
        self.add_keyed::<SimpleMap<Ptr<str>>>();

        debug!(types = self.caps.len(), "capability registry initialised");
    }

    fn constructors(&self, type_id: TypeId) -> &[Capability] {
        self.caps.get(&type_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::default());
}

fn with_registry<R>(f: impl FnOnce(&mut Registry) -> R) -> R {
    REGISTRY.with(|r| {
        let mut r = r.borrow_mut();
        r.ensure_defaults();
        f(&mut r)
    })
}

/// Append a capability for `type_id`. Earlier registrations win when a
/// type has several constructors of the same kind.
pub fn register_capability(type_id: TypeId, capability: Capability) {
    with_registry(|r| r.add(type_id, capability));
    debug!(?type_id, ?capability, "capability registered");
}

pub fn register_iterable<C: Iterable + 'static>() {
    register_capability(TypeId::of::<C>(), Capability::iterable::<C>());
    debug!(container = type_name::<C>(), "iterable registered");
}

pub fn register_accessor<C: Accessor + 'static>() {
    register_capability(TypeId::of::<C>(), Capability::accessor::<C>());
    debug!(container = type_name::<C>(), "accessor registered");
}

/// True when `type_id` has at least one registered capability named
/// `capability`. Built-in containers answer through `Dispatch` and need no
/// registration, so this only speaks for the registry.
pub fn has_capability(type_id: TypeId, capability: &str) -> bool {
    with_registry(|r| r.constructors(type_id).iter().any(|c| c.name() == capability))
}

/// Iterator over whatever `value` is: its own `Iterable` when it has one,
/// otherwise the first registered constructor for its concrete type.
pub fn get_iterator(value: &dyn Dispatch) -> Result<Iter<'_>> {
    if let Some(it) = value.as_iterable() {
        return Ok(it.dyn_iter());
    }
    let any = value.as_any();
    let type_id = (*any).type_id();
    let ctors: Vec<IterFn> = with_registry(|r| {
        r.constructors(type_id)
            .iter()
            .filter_map(|c| match c {
                Capability::Iterable(f) => Some(*f),
                Capability::Accessor(_) => None,
            })
            .collect()
    });
    ctors
        .into_iter()
        .find_map(|ctor| ctor(any))
        .ok_or(RuntimeError::NoCapability {
            capability: "Iterable",
            type_id,
        })
}

/// Key lookup over whatever `value` is, resolved like `get_iterator`.
///
/// Lookups compare keys as strings. For a `Map` this is a scan in key
/// order that ignores the map's comparator: with a case-insensitive
/// comparator `Map::get` finds "Host" under "host" but this lookup does
/// not.
pub fn get_lookup(value: &dyn Dispatch) -> Result<Lookup<'_>> {
    if let Some(acc) = value.as_accessor() {
        return Ok(Lookup::of(acc));
    }
    let any = value.as_any();
    let type_id = (*any).type_id();
    let ctors: Vec<LookupFn> = with_registry(|r| {
        r.constructors(type_id)
            .iter()
            .filter_map(|c| match c {
                Capability::Accessor(f) => Some(*f),
                Capability::Iterable(_) => None,
            })
            .collect()
    });
    ctors
        .into_iter()
        .find_map(|ctor| ctor(any))
        .ok_or(RuntimeError::NoCapability {
            capability: "Accessor",
            type_id,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::allocate;
    use crate::list::ValueList;
    use crate::map::{Map, StructMap};

    fn strs(it: Iter<'_>) -> Vec<&'static str> {
        it.filter_map(|v| v.downcast_ref::<&'static str>().copied())
            .collect()
    }

    static FOREIGN: [Option<&str>; 4] = [Some("x"), Some("y"), Some("z"), None];

    /// Invariant: every container kind yields as many elements as it holds,
    /// in its natural order.
    #[test]
    fn dispatch_over_container_kinds() {
        let sentinel = Sentinel::new(&FOREIGN);
        let array: Array<Option<&'static str>> =
            Array::from_vec(vec![Some("x"), Some("y"), Some("z")]);
        let mut list: ValueList<&'static str> = ValueList::new();
        for s in ["x", "y", "z"] {
            list.add(s);
        }
        let simple = SimpleMap::from_pairs([("k1", "x"), ("k2", "y"), ("k3", "z")]);

        let want = vec!["x", "y", "z"];
        assert_eq!(strs(get_iterator(&sentinel).unwrap()), want);
        assert_eq!(strs(get_iterator(&array).unwrap()), want);
        assert_eq!(strs(get_iterator(&list).unwrap()), want);
        assert_eq!(strs(get_iterator(&simple).unwrap()), want);
        assert_eq!(sentinel.len(), 3);
    }

    #[test]
    fn simple_map_pairs_through_next_pair() {
        let m = SimpleMap::from_pairs([("a", "1"), ("b", "2")]);
        let mut it = get_iterator(&m).unwrap();
        let mut seen = Vec::new();
        while let Some((k, v)) = it.next_pair() {
            seen.push((
                *k.downcast_ref::<&str>().unwrap(),
                *v.downcast_ref::<&str>().unwrap(),
            ));
        }
        assert_eq!(seen, vec![("a", "1"), ("b", "2")]);
    }

    #[test]
    fn value_only_iterators_have_no_pairs() {
        let a: Array<i64> = Array::from_vec(vec![1, 2]);
        let mut it = a.dyn_iter();
        assert!(it.next_pair().is_none());
        let total: i64 = it.filter_map(|v| v.downcast_ref::<i64>()).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn lookup_scans_string_keys() {
        let flat: Array<Option<String>> = Array::from_vec(vec![
            Some("host".into()),
            Some("localhost".into()),
            Some("port".into()),
            Some("8080".into()),
        ]);
        let l = get_lookup(&flat).unwrap();
        assert_eq!(
            l.get("port").and_then(|v| v.downcast_ref::<String>()).map(String::as_str),
            Some("8080")
        );
        assert!(l.get("user").is_none());

        let mut m: Map<String, String> = Map::new();
        m.put("b".into(), "2".into());
        let l = get_lookup(&m).unwrap();
        assert_eq!(
            l.get("b").and_then(|v| v.downcast_ref::<String>()).cloned(),
            Some("2".to_string())
        );
    }

    #[test]
    fn unregistered_type_reports_missing_capability() {
        struct Opaque;
        impl Dispatch for Opaque {}

        let err = get_iterator(&Opaque).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::NoCapability {
                capability: "Iterable",
                type_id: TypeId::of::<Opaque>(),
            }
        );
        assert!(get_lookup(&Array::<i64>::new(1)).is_err());
        assert!(get_lookup(&ValueList::<i64>::new()).is_err());
        assert!(has_capability(TypeId::of::<SimpleMap<&'static str>>(), "Accessor"));
        assert!(!has_capability(TypeId::of::<Opaque>(), "Iterable"));
    }

    #[derive(Debug)]
    struct Rec {
        name: &'static str,
        age: u32,
    }

    impl Keyed for Rec {
        type Key = &'static str;
        fn key(&self) -> &&'static str {
            &self.name
        }
    }

    /// Struct maps yield whole records and look them up by key, with no
    /// registration.
    #[test]
    fn struct_maps_dispatch_without_registration() {
        let mut m: StructMap<Rec> = StructMap::new();
        m.put_struct(Rec { name: "q", age: 3 });
        m.put_struct(Rec { name: "p", age: 9 });

        let names: Vec<&str> = get_iterator(&m)
            .unwrap()
            .filter_map(|v| v.downcast_ref::<Rec>())
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["p", "q"]);

        let l = get_lookup(&m).unwrap();
        assert_eq!(l.get("q").and_then(|v| v.downcast_ref::<Rec>()).map(|r| r.age), Some(3));
        assert!(l.get("r").is_none());
    }

    struct Pair2(&'static str, &'static str);

    impl Iterable for Pair2 {
        fn dyn_iter(&self) -> Iter<'_> {
            Iter::values([&self.0 as &dyn Any, &self.1 as &dyn Any].into_iter())
        }
    }

    impl Dispatch for Pair2 {}

    #[test]
    fn client_types_resolve_through_the_registry() {
        let p = Pair2("l", "r");
        assert!(get_iterator(&p).is_err());
        register_iterable::<Pair2>();
        assert_eq!(strs(get_iterator(&p).unwrap()), vec!["l", "r"]);
        assert!(get_lookup(&p).is_err());
    }

    #[test]
    fn counted_containers_iterate_through_their_handle() {
        let shared = allocate(SimpleMap::from_pairs([("a", "1")]));
        assert_eq!(shared.dyn_iter().count(), 1);
        assert!(Lookup::of(&shared).get("a").is_some());
        assert_eq!(get_iterator(&shared).unwrap().count(), 1);
        assert!(get_lookup(&shared).unwrap().get("a").is_some());
    }

    #[test]
    fn keys_of_every_string_kind_match() {
        let owned: Box<str> = "b".into();
        assert_eq!(key_str(&"a"), Some("a"));
        assert_eq!(key_str(&owned), Some("b"));
        assert_eq!(key_str(&Ptr::<str>::foreign("c")), Some("c"));
        assert_eq!(key_str(&allocate(String::from("d"))), Some("d"));
        assert_eq!(key_str(&7u32), None);
    }
}
