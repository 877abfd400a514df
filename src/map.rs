//! Ordered maps on an unbalanced binary search tree.
//!
//! `Tree<E>` stores entries that know their own key (`Keyed`). Two flavours
//! share the implementation:
//! - `Map<K, V>`: key/value mode, entries are `Pair<K, V>`;
//! - `StructMap<T>`: struct mode, the client type carries its key.
//!
//! Nodes reuse the list `Links` (`prev` is the left child, `next` the right
//! child) and live in a generational arena. The tree is never rebalanced, so
//! sorted insertion degrades to a chain; `height()` makes that observable.
//! Iteration is in ascending comparator order.

use core::any::Any;
use core::cmp::Ordering;
use core::{fmt, mem};
use std::rc::Rc;

use slotmap::{DefaultKey, SlotMap};

use crate::error::{Result, RuntimeError};
use crate::list::Links;
use crate::reentrancy::CallbackGuard;

/// An entry that carries its own ordering key.
pub trait Keyed: Sized + 'static {
    type Key: 'static;

    fn key(&self) -> &Self::Key;

    /// What generic iteration yields for this entry.
    fn value_any(&self) -> &dyn Any {
        self
    }

    fn key_any(&self) -> &dyn Any {
        self.key()
    }
}

/// Key/value entry of a `Map`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pair<K, V> {
    pub key: K,
    pub value: V,
}

impl<K: 'static, V: 'static> Keyed for Pair<K, V> {
    type Key = K;

    fn key(&self) -> &K {
        &self.key
    }

    fn value_any(&self) -> &dyn Any {
        &self.value
    }
}

/// Stable reference to a map entry. Survives value overwrites and struct
/// replacement; goes stale when the entry is removed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct EntryId(DefaultKey);

impl EntryId {
    pub fn entry<'a, E: Keyed>(&self, tree: &'a Tree<E>) -> Option<&'a E> {
        tree.entry(*self)
    }
}

struct TreeNode<E> {
    links: Links,
    entry: E,
}

/// Where a descent stopped: the slot that points (or would point) at the
/// node for a key.
#[derive(Clone, Copy, Debug)]
enum Link {
    Root,
    Left(DefaultKey),
    Right(DefaultKey),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisitOrder {
    Pre,
    In,
    Post,
}

type KeyCmp<K> = Rc<dyn Fn(&K, &K) -> Ordering>;

pub struct Tree<E: Keyed> {
    nodes: SlotMap<DefaultKey, TreeNode<E>>,
    root: Option<DefaultKey>,
    cmp: KeyCmp<E::Key>,
    guard: CallbackGuard,
}

pub type Map<K, V> = Tree<Pair<K, V>>;
pub type StructMap<T> = Tree<T>;

impl<E: Keyed> Tree<E>
where
    E::Key: Ord,
{
    pub fn new() -> Self {
        Self::with_comparator(Ord::cmp)
    }
}

impl<E: Keyed> Default for Tree<E>
where
    E::Key: Ord,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Keyed> Tree<E> {
    pub fn with_comparator<C>(cmp: C) -> Self
    where
        C: Fn(&E::Key, &E::Key) -> Ordering + 'static,
    {
        Self {
            nodes: SlotMap::with_key(),
            root: None,
            cmp: Rc::new(cmp),
            guard: CallbackGuard::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn locate(&self, key: &E::Key, op: &'static str) -> (Link, Option<DefaultKey>) {
        let _busy = self.guard.enter(op);
        let mut link = Link::Root;
        let mut cur = self.root;
        while let Some(k) = cur {
            let node = &self.nodes[k];
            match (self.cmp)(key, node.entry.key()) {
                Ordering::Less => {
                    link = Link::Left(k);
                    cur = node.links.prev;
                }
                Ordering::Greater => {
                    link = Link::Right(k);
                    cur = node.links.next;
                }
                Ordering::Equal => return (link, Some(k)),
            }
        }
        (link, None)
    }

    fn set_link(&mut self, link: Link, child: Option<DefaultKey>) {
        match link {
            Link::Root => self.root = child,
            Link::Left(p) => self.nodes[p].links.prev = child,
            Link::Right(p) => self.nodes[p].links.next = child,
        }
    }

    /// Insert `entry`, or replace the entry with an equal key in place
    /// (same position, same children, same `EntryId`). Returns the displaced
    /// entry, if any.
    pub fn insert(&mut self, entry: E) -> (EntryId, Option<E>) {
        match self.locate(entry.key(), "insert") {
            (_, Some(k)) => {
                let old = mem::replace(&mut self.nodes[k].entry, entry);
                (EntryId(k), Some(old))
            }
            (link, None) => {
                let k = self.nodes.insert(TreeNode {
                    links: Links::new(),
                    entry,
                });
                self.set_link(link, Some(k));
                (EntryId(k), None)
            }
        }
    }

    /// Struct-mode put: a duplicate key replaces the stored entry, which is
    /// dropped.
    pub fn put_struct(&mut self, entry: E) -> EntryId {
        self.insert(entry).0
    }

    pub fn get_entry(&self, key: &E::Key) -> Option<&E> {
        let (_, found) = self.locate(key, "get");
        found.map(|k| &self.nodes[k].entry)
    }

    pub fn contains(&self, key: &E::Key) -> bool {
        self.locate(key, "contains").1.is_some()
    }

    pub fn find_id(&self, key: &E::Key) -> Option<EntryId> {
        self.locate(key, "find_id").1.map(EntryId)
    }

    pub fn entry(&self, id: EntryId) -> Option<&E> {
        self.nodes.get(id.0).map(|n| &n.entry)
    }

    /// Unlink the entry for `key` and return it.
    ///
    /// Without a right child the left child takes the node's place.
    /// Otherwise the right child does, and the left subtree is hung off the
    /// left-most node of the right subtree.
    pub fn remove_entry(&mut self, key: &E::Key) -> Result<E> {
        let (link, found) = self.locate(key, "remove");
        let node = found
            .and_then(|k| self.nodes.remove(k))
            .ok_or(RuntimeError::NotFound)?;
        let Links {
            prev: left,
            next: right,
        } = node.links;
        let replacement = match (left, right) {
            (_, None) => left,
            (None, Some(r)) => Some(r),
            (Some(l), Some(r)) => {
                let mut m = r;
                while let Some(smaller) = self.nodes[m].links.prev {
                    m = smaller;
                }
                self.nodes[m].links.prev = Some(l);
                Some(r)
            }
        };
        self.set_link(link, replacement);
        Ok(node.entry)
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub fn height(&self) -> usize {
        let mut best = 0;
        let mut stack: Vec<(DefaultKey, usize)> = self.root.map(|r| (r, 1)).into_iter().collect();
        while let Some((k, depth)) = stack.pop() {
            best = best.max(depth);
            let links = self.nodes[k].links;
            stack.extend(links.prev.map(|c| (c, depth + 1)));
            stack.extend(links.next.map(|c| (c, depth + 1)));
        }
        best
    }

    fn edge(&self, mut pick: impl FnMut(&Links) -> Option<DefaultKey>) -> Option<EntryId> {
        let mut cur = self.root?;
        while let Some(k) = pick(&self.nodes[cur].links) {
            cur = k;
        }
        Some(EntryId(cur))
    }

    /// Entry with the smallest key.
    pub fn first(&self) -> Option<EntryId> {
        self.edge(|l| l.prev)
    }

    /// Entry with the largest key.
    pub fn last(&self) -> Option<EntryId> {
        self.edge(|l| l.next)
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
    }

    pub fn iter(&self) -> InOrder<'_, E> {
        let mut it = InOrder {
            nodes: &self.nodes,
            stack: Vec::new(),
            remaining: self.len(),
        };
        it.descend_left(self.root);
        it
    }

    /// Depth-first walk calling `f` on every entry in the given order.
    ///
    /// Recursive: stack depth equals `height()`, which for a map filled in
    /// key order is its length. Use `iter()` to walk large chain-shaped
    /// maps.
    pub fn visit<F>(&self, order: VisitOrder, mut f: F)
    where
        F: FnMut(&E),
    {
        let _busy = self.guard.enter("visit");
        self.visit_from(self.root, order, &mut f);
    }

    fn visit_from(&self, at: Option<DefaultKey>, order: VisitOrder, f: &mut dyn FnMut(&E)) {
        let Some(k) = at else { return };
        let node = &self.nodes[k];
        if order == VisitOrder::Pre {
            f(&node.entry);
        }
        self.visit_from(node.links.prev, order, f);
        if order == VisitOrder::In {
            f(&node.entry);
        }
        self.visit_from(node.links.next, order, f);
        if order == VisitOrder::Post {
            f(&node.entry);
        }
    }
}

impl<K: 'static, V: 'static> Tree<Pair<K, V>> {
    /// Key/value put: a duplicate key keeps its node and key, and only the
    /// value slot is overwritten (the old value is dropped).
    pub fn put(&mut self, key: K, value: V) -> EntryId {
        match self.locate(&key, "put") {
            (_, Some(k)) => {
                self.nodes[k].entry.value = value;
                EntryId(k)
            }
            (link, None) => {
                let k = self.nodes.insert(TreeNode {
                    links: Links::new(),
                    entry: Pair { key, value },
                });
                self.set_link(link, Some(k));
                EntryId(k)
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.get_entry(key).map(|p| &p.value)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let (_, found) = self.locate(key, "get_mut");
        found.map(|k| &mut self.nodes[k].entry.value)
    }

    pub fn remove(&mut self, key: &K) -> Result<(K, V)> {
        self.remove_entry(key).map(|p| (p.key, p.value))
    }

    pub fn pairs(&self) -> impl ExactSizeIterator<Item = (&K, &V)> + '_ {
        self.iter().map(|p| (&p.key, &p.value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.iter().map(|p| &p.key)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|p| &p.value)
    }
}

impl<E: Keyed + fmt::Debug> fmt::Debug for Tree<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

struct Frame {
    node: DefaultKey,
    /// Set once the node itself has been yielded; its right subtree is next.
    yielded: bool,
}

/// In-order iterator driven by an explicit stack, so it can stop and resume
/// between calls without recursion.
pub struct InOrder<'a, E> {
    nodes: &'a SlotMap<DefaultKey, TreeNode<E>>,
    stack: Vec<Frame>,
    remaining: usize,
}

impl<'a, E> InOrder<'a, E> {
    fn descend_left(&mut self, mut cur: Option<DefaultKey>) {
        while let Some(k) = cur {
            self.stack.push(Frame {
                node: k,
                yielded: false,
            });
            cur = self.nodes[k].links.prev;
        }
    }
}

impl<'a, E> Iterator for InOrder<'a, E> {
    type Item = &'a E;

    fn next(&mut self) -> Option<&'a E> {
        let nodes = self.nodes;
        loop {
            let top = self.stack.last_mut()?;
            if !top.yielded {
                top.yielded = true;
                self.remaining -= 1;
                return Some(&nodes[top.node].entry);
            }
            let done = self.stack.pop()?;
            self.descend_left(nodes[done.node].links.next);
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<E> ExactSizeIterator for InOrder<'_, E> {}

impl<'a, E: Keyed> IntoIterator for &'a Tree<E> {
    type Item = &'a E;
    type IntoIter = InOrder<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::allocate;

    #[derive(Debug, Clone, PartialEq)]
    struct Rec {
        name: String,
        n: u32,
    }

    impl Keyed for Rec {
        type Key = String;
        fn key(&self) -> &String {
            &self.name
        }
    }

    fn rec(name: &str, n: u32) -> Rec {
        Rec {
            name: name.to_string(),
            n,
        }
    }

    fn keys_of<V: 'static>(m: &Map<i32, V>) -> Vec<i32> {
        m.keys().copied().collect()
    }

    /// Invariant: a duplicate put overwrites the value and keeps `len`.
    #[test]
    fn duplicate_put_overwrites_value() {
        let mut m: Map<&str, i32> = Map::new();
        let a = m.put("a", 1);
        m.put("b", 2);
        assert_eq!(m.put("a", 3), a);
        assert_eq!(m.len(), 2);
        let pairs: Vec<_> = m.pairs().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(pairs, vec![("a", 3), ("b", 2)]);
    }

    #[test]
    fn overwrite_releases_old_value() {
        let old = allocate(1u8);
        let new = allocate(2u8);
        let mut m: Map<u8, _> = Map::new();
        m.put(0, old.retain());
        assert_eq!(old.refcount(), 2);
        m.put(0, new.retain());
        assert_eq!(old.refcount(), 1);
        assert_eq!(new.refcount(), 2);
        drop(m);
        assert_eq!(new.refcount(), 1);
    }

    /// Invariant: sorted insertion yields a chain (no rebalancing).
    #[test]
    fn sorted_insertion_degrades_to_chain() {
        let mut m: Map<i32, ()> = Map::new();
        for k in 0..32 {
            m.put(k, ());
        }
        assert_eq!(m.height(), 32);

        let mut balanced: Map<i32, ()> = Map::new();
        for k in [4, 2, 6, 1, 3, 5, 7] {
            balanced.put(k, ());
        }
        assert_eq!(balanced.height(), 3);
        assert_eq!(keys_of(&balanced), (1..=7).collect::<Vec<_>>());
    }

    #[test]
    fn remove_leaf_single_child_and_two_children() {
        let mut m: Map<i32, i32> = Map::new();
        for k in [50, 30, 70, 20, 40, 60, 80, 35, 45, 65] {
            m.put(k, k * 10);
        }
        assert_eq!(m.remove(&20), Ok((20, 200)));
        assert_eq!(m.remove(&60), Ok((60, 600)));
        assert_eq!(m.remove(&30), Ok((30, 300)));
        assert_eq!(keys_of(&m), vec![35, 40, 45, 50, 65, 70, 80]);
        assert_eq!(m.remove(&50), Ok((50, 500)));
        assert_eq!(keys_of(&m), vec![35, 40, 45, 65, 70, 80]);
        assert_eq!(m.get(&45), Some(&450));
        assert_eq!(m.remove(&50), Err(RuntimeError::NotFound));
        assert_eq!(m.len(), 6);
    }

    /// Invariant: with both children present, the left subtree hangs off
    /// the left-most node of the right subtree.
    #[test]
    fn remove_reattaches_left_subtree_under_right() {
        let mut m: Map<i32, ()> = Map::new();
        for k in [10, 5, 20, 15, 3] {
            m.put(k, ());
        }
        m.remove(&10).unwrap();
        // 20 takes the root, 15 keeps its place, 5 hangs under 15.
        assert_eq!(m.entry(m.first().unwrap()).unwrap().key, 3);
        assert_eq!(m.height(), 4);
        let mut pre = Vec::new();
        m.visit(VisitOrder::Pre, |p| pre.push(p.key));
        assert_eq!(pre, vec![20, 15, 5, 3]);
    }

    #[test]
    fn struct_replacement_keeps_position() {
        let mut m: StructMap<Rec> = StructMap::new();
        for (i, name) in ["m", "f", "t", "c", "h"].iter().enumerate() {
            m.put_struct(rec(name, i as u32));
        }
        let before = m.height();
        let id = m.find_id(&"f".to_string()).unwrap();
        let (same, old) = m.insert(rec("f", 99));
        assert_eq!(same, id);
        assert_eq!(old, Some(rec("f", 1)));
        assert_eq!(m.height(), before);
        assert_eq!(m.len(), 5);
        assert_eq!(id.entry(&m).map(|r| r.n), Some(99));
        let names: Vec<&str> = m.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["c", "f", "h", "m", "t"]);
        assert_eq!(m.remove_entry(&"m".to_string()).map(|r| r.n), Ok(0));
        assert!(!m.contains(&"m".to_string()));
    }

    #[test]
    fn visit_orders() {
        let mut m: Map<i32, ()> = Map::new();
        for k in [2, 1, 3] {
            m.put(k, ());
        }
        let collect = |order| {
            let mut out = Vec::new();
            m.visit(order, |p| out.push(p.key));
            out
        };
        assert_eq!(collect(VisitOrder::Pre), vec![2, 1, 3]);
        assert_eq!(collect(VisitOrder::In), vec![1, 2, 3]);
        assert_eq!(collect(VisitOrder::Post), vec![1, 3, 2]);
    }

    #[test]
    fn in_order_iterator_resumes() {
        let mut m: Map<i32, ()> = Map::new();
        for k in [5, 3, 8, 1, 4, 9] {
            m.put(k, ());
        }
        let mut it = m.iter();
        assert_eq!(it.len(), 6);
        assert_eq!(it.next().map(|p| p.key), Some(1));
        assert_eq!(it.next().map(|p| p.key), Some(3));
        assert_eq!(it.len(), 4);
        let rest: Vec<i32> = it.map(|p| p.key).collect();
        assert_eq!(rest, vec![4, 5, 8, 9]);
    }

    #[test]
    fn custom_comparator_and_edges() {
        let mut m: Map<i32, &str> = Map::with_comparator(|a: &i32, b: &i32| b.cmp(a));
        m.put(1, "one");
        m.put(3, "three");
        m.put(2, "two");
        assert_eq!(keys_of(&m), vec![3, 2, 1]);
        assert_eq!(m.entry(m.first().unwrap()).unwrap().value, "three");
        assert_eq!(m.entry(m.last().unwrap()).unwrap().value, "one");
        if let Some(v) = m.get_mut(&2) {
            *v = "deux";
        }
        assert_eq!(m.get(&2), Some(&"deux"));
        m.clear();
        assert!(m.is_empty());
        assert_eq!(m.first(), None);
        assert_eq!(m.height(), 0);
    }
}
