//! Doubly linked lists in two storage modes.
//!
//! `List<N>` is one chain implementation parameterised by its node type:
//! - `ValueList<T>` (container mode): each node is a `Boxed<T>` wrapping the
//!   client's value next to the links.
//! - `IntrusiveList<T>` (intrusive mode): the client's value embeds its own
//!   `Links` and is stored as the node itself (`Embedded<T>`), no wrapper.
//!
//! Nodes live in a generational arena, so a `NodeId` for a removed node is
//! detected (`RuntimeError::StaleNode`) instead of dangling. What a list
//! does with a removed value follows from its element type: a list of
//! `Obj<T>` releases it, a list of `String` drops its copy, a list of
//! `&'static T` owns nothing.

use core::cmp::Ordering;
use core::fmt;
use std::rc::Rc;

use slotmap::{DefaultKey, SlotMap};
use tracing::warn;

use crate::array::{Array, Slot};
use crate::error::{Result, RuntimeError};
use crate::reentrancy::CallbackGuard;

/// Stable reference to a list node.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeId(DefaultKey);

impl NodeId {
    pub fn value<'a, N: Node>(&self, list: &'a List<N>) -> Option<&'a N::Value> {
        list.get(*self)
    }

    pub fn value_mut<'a, N: Node>(&self, list: &'a mut List<N>) -> Option<&'a mut N::Value> {
        list.get_mut(*self)
    }
}

/// Neighbour links embedded in every node. Maps reuse the same shape with
/// `prev` as the left child and `next` as the right child.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Links {
    pub(crate) prev: Option<DefaultKey>,
    pub(crate) next: Option<DefaultKey>,
}

impl Links {
    pub const fn new() -> Self {
        Self {
            prev: None,
            next: None,
        }
    }

    /// True while the owner sits in a chain with at least one neighbour.
    pub fn is_linked(&self) -> bool {
        self.prev.is_some() || self.next.is_some()
    }
}

/// Types that carry their own `Links` and can be stored intrusively.
pub trait Linked {
    fn links(&self) -> &Links;
    fn links_mut(&mut self) -> &mut Links;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListMode {
    Container,
    Intrusive,
}

/// Node representation used by a `List`.
pub trait Node: Linked + Sized + 'static {
    type Value: 'static;
    const MODE: ListMode;

    fn wrap(value: Self::Value) -> Self;
    fn value(&self) -> &Self::Value;
    fn value_mut(&mut self) -> &mut Self::Value;
    fn into_value(self) -> Self::Value;
}

/// Container-mode node: a separate record holding the value.
pub struct Boxed<T> {
    links: Links,
    value: T,
}

impl<T> Linked for Boxed<T> {
    fn links(&self) -> &Links {
        &self.links
    }
    fn links_mut(&mut self) -> &mut Links {
        &mut self.links
    }
}

impl<T: 'static> Node for Boxed<T> {
    type Value = T;
    const MODE: ListMode = ListMode::Container;

    fn wrap(value: T) -> Self {
        Boxed {
            links: Links::new(),
            value,
        }
    }
    fn value(&self) -> &T {
        &self.value
    }
    fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }
    fn into_value(self) -> T {
        self.value
    }
}

/// Intrusive-mode node: the value itself, linked through its own `Links`.
#[repr(transparent)]
pub struct Embedded<T>(T);

impl<T: Linked> Linked for Embedded<T> {
    fn links(&self) -> &Links {
        self.0.links()
    }
    fn links_mut(&mut self) -> &mut Links {
        self.0.links_mut()
    }
}

impl<T: Linked + 'static> Node for Embedded<T> {
    type Value = T;
    const MODE: ListMode = ListMode::Intrusive;

    fn wrap(value: T) -> Self {
        Embedded(value)
    }
    fn value(&self) -> &T {
        &self.0
    }
    fn value_mut(&mut self) -> &mut T {
        &mut self.0
    }
    fn into_value(mut self) -> T {
        // A detached value must not keep pointing into its old chain.
        *self.0.links_mut() = Links::new();
        self.0
    }
}

pub type ValueList<T> = List<Boxed<T>>;
pub type IntrusiveList<T> = List<Embedded<T>>;

type CmpFn<T> = Rc<dyn Fn(&T, &T) -> Ordering>;
type EqFn<T> = Rc<dyn Fn(&T, &T) -> bool>;

pub struct List<N: Node> {
    nodes: SlotMap<DefaultKey, N>,
    first: Option<DefaultKey>,
    last: Option<DefaultKey>,
    cmp: CmpFn<N::Value>,
    eq: EqFn<N::Value>,
    guard: CallbackGuard,
}

impl<N: Node> List<N>
where
    N::Value: Ord,
{
    /// A list ordered by `Ord`: address order for `Obj` handles, string
    /// order for strings, numeric order for integers.
    pub fn new() -> Self {
        Self::with_order(Ord::cmp, |a: &N::Value, b: &N::Value| a == b)
    }
}

impl<N: Node> Default for List<N>
where
    N::Value: Ord,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Node> List<N> {
    /// A list using `cmp` for sorted insertion and `eq` for `find`.
    pub fn with_order<C, E>(cmp: C, eq: E) -> Self
    where
        C: Fn(&N::Value, &N::Value) -> Ordering + 'static,
        E: Fn(&N::Value, &N::Value) -> bool + 'static,
    {
        Self::from_parts(Rc::new(cmp), Rc::new(eq))
    }

    fn from_parts(cmp: CmpFn<N::Value>, eq: EqFn<N::Value>) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            first: None,
            last: None,
            cmp,
            eq,
            guard: CallbackGuard::new(),
        }
    }

    /// An empty list sharing this list's ordering.
    fn empty_like(&self) -> Self {
        Self::from_parts(self.cmp.clone(), self.eq.clone())
    }

    pub fn mode(&self) -> ListMode {
        N::MODE
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn first(&self) -> Option<NodeId> {
        self.first.map(NodeId)
    }

    pub fn last(&self) -> Option<NodeId> {
        self.last.map(NodeId)
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0)?.links().next.map(NodeId)
    }

    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0)?.links().prev.map(NodeId)
    }

    pub fn get(&self, id: NodeId) -> Option<&N::Value> {
        self.nodes.get(id.0).map(Node::value)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut N::Value> {
        self.nodes.get_mut(id.0).map(Node::value_mut)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id.0)
    }

    /// Append at the tail.
    pub fn add(&mut self, value: N::Value) -> NodeId {
        let mut node = N::wrap(value);
        *node.links_mut() = Links {
            prev: self.last,
            next: None,
        };
        let k = self.nodes.insert(node);
        match self.last {
            Some(l) => self.nodes[l].links_mut().next = Some(k),
            None => self.first = Some(k),
        }
        self.last = Some(k);
        NodeId(k)
    }

    /// Insert immediately before `at`.
    pub fn insert_before(&mut self, at: NodeId, value: N::Value) -> Result<NodeId> {
        if !self.nodes.contains_key(at.0) {
            return Err(RuntimeError::StaleNode);
        }
        Ok(NodeId(self.link_before(at.0, N::wrap(value))))
    }

    fn link_before(&mut self, at: DefaultKey, mut node: N) -> DefaultKey {
        let prev = self.nodes[at].links().prev;
        *node.links_mut() = Links {
            prev,
            next: Some(at),
        };
        let k = self.nodes.insert(node);
        self.nodes[at].links_mut().prev = Some(k);
        match prev {
            Some(p) => self.nodes[p].links_mut().next = Some(k),
            None => self.first = Some(k),
        }
        k
    }

    /// Insert before the first node that sorts after `value`; equal values
    /// keep their insertion order. O(n).
    pub fn add_sorted(&mut self, value: N::Value) -> NodeId {
        let after = {
            let _busy = self.guard.enter("add_sorted");
            self.walk()
                .find(|(_, n)| (self.cmp)(n.value(), &value) == Ordering::Greater)
                .map(|(k, _)| k)
        };
        match after {
            Some(k) => NodeId(self.link_before(k, N::wrap(value))),
            None => self.add(value),
        }
    }

    fn unlink(&mut self, k: DefaultKey) -> Option<N> {
        let node = self.nodes.remove(k)?;
        let Links { prev, next } = *node.links();
        match prev {
            Some(p) => self.nodes[p].links_mut().next = next,
            None => self.first = next,
        }
        match next {
            Some(n) => self.nodes[n].links_mut().prev = prev,
            None => self.last = prev,
        }
        Some(node)
    }

    /// Detach a node and hand its value back to the caller.
    pub fn remove(&mut self, id: NodeId) -> Result<N::Value> {
        self.unlink(id.0)
            .map(Node::into_value)
            .ok_or(RuntimeError::StaleNode)
    }

    pub fn pop_front(&mut self) -> Option<N::Value> {
        let k = self.first?;
        self.unlink(k).map(Node::into_value)
    }

    /// First node equal to `value` under the list's equality function.
    pub fn find(&self, value: &N::Value) -> Option<NodeId> {
        let _busy = self.guard.enter("find");
        self.walk()
            .find(|(_, n)| (self.eq)(n.value(), value))
            .map(|(k, _)| NodeId(k))
    }

    pub fn find_if<P>(&self, mut pred: P) -> Option<NodeId>
    where
        P: FnMut(&N::Value) -> bool,
    {
        let _busy = self.guard.enter("find_if");
        self.walk()
            .find(|(_, n)| pred(n.value()))
            .map(|(k, _)| NodeId(k))
    }

    /// A new list holding clones of the values matching `pred`.
    pub fn filter<P>(&self, mut pred: P) -> Self
    where
        P: FnMut(&N::Value) -> bool,
        N::Value: Clone,
    {
        let _busy = self.guard.enter("filter");
        let mut out = self.empty_like();
        for v in self.iter().filter(|v| pred(*v)) {
            out.add(v.clone());
        }
        out
    }

    /// A new list holding clones of the values at positions `[begin, end)`,
    /// clamped to the list length.
    pub fn slice(&self, begin: usize, end: usize) -> Self
    where
        N::Value: Clone,
    {
        let end = end.min(self.len());
        let begin = begin.min(end);
        let mut out = self.empty_like();
        for v in self.iter().skip(begin).take(end - begin) {
            out.add(v.clone());
        }
        out
    }

    /// Append clones of every value of `src`. Returns how many were added.
    pub fn extend_copy(&mut self, src: &Self) -> usize
    where
        N::Value: Clone,
    {
        for v in src.iter() {
            self.add(v.clone());
        }
        src.len()
    }

    /// Move every value of `src` to the tail of this list, leaving `src`
    /// empty. Lists of different storage modes are left untouched.
    pub fn extend_move(&mut self, src: &mut dyn DynList<N::Value>) -> Result<usize> {
        let (dst_mode, src_mode) = (self.mode(), src.mode());
        if dst_mode != src_mode {
            warn!(?dst_mode, ?src_mode, "refusing to merge lists of different storage modes");
            return Err(RuntimeError::ModeMismatch {
                dst: dst_mode,
                src: src_mode,
            });
        }
        let values = src.drain_values();
        let moved = values.len();
        for v in values {
            self.add(v);
        }
        Ok(moved)
    }

    /// Remove every value, front to back.
    pub fn drain(&mut self) -> Vec<N::Value> {
        let mut out = Vec::with_capacity(self.len());
        while let Some(v) = self.pop_front() {
            out.push(v);
        }
        out
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.first = None;
        self.last = None;
    }

    /// Export the values into a counted array, in list order.
    pub fn to_array(&self) -> Array<N::Value>
    where
        N::Value: Slot + Clone,
    {
        self.iter().cloned().collect()
    }

    fn walk(&self) -> Walk<'_, N> {
        Walk {
            nodes: &self.nodes,
            front: self.first,
            back: self.last,
            remaining: self.len(),
        }
    }

    pub fn iter(&self) -> Iter<'_, N> {
        Iter { walk: self.walk() }
    }

    pub fn ids(&self) -> Ids<'_, N> {
        Ids { walk: self.walk() }
    }
}

impl<N: Node> fmt::Debug for List<N>
where
    N::Value: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Storage-agnostic view of a list, used to move values between lists
/// whose node types differ.
pub trait DynList<T> {
    fn mode(&self) -> ListMode;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn push(&mut self, value: T) -> NodeId;
    fn drain_values(&mut self) -> Vec<T>;
}

impl<N: Node> DynList<N::Value> for List<N> {
    fn mode(&self) -> ListMode {
        N::MODE
    }
    fn len(&self) -> usize {
        self.nodes.len()
    }
    fn push(&mut self, value: N::Value) -> NodeId {
        self.add(value)
    }
    fn drain_values(&mut self) -> Vec<N::Value> {
        self.drain()
    }
}

struct Walk<'a, N> {
    nodes: &'a SlotMap<DefaultKey, N>,
    front: Option<DefaultKey>,
    back: Option<DefaultKey>,
    remaining: usize,
}

impl<'a, N: Linked> Iterator for Walk<'a, N> {
    type Item = (DefaultKey, &'a N);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let k = self.front?;
        let node = self.nodes.get(k)?;
        self.front = node.links().next;
        self.remaining -= 1;
        Some((k, node))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<N: Linked> DoubleEndedIterator for Walk<'_, N> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let k = self.back?;
        let node = self.nodes.get(k)?;
        self.back = node.links().prev;
        self.remaining -= 1;
        Some((k, node))
    }
}

/// Front-to-back iterator over values.
pub struct Iter<'a, N> {
    walk: Walk<'a, N>,
}

impl<'a, N: Node> Iterator for Iter<'a, N> {
    type Item = &'a N::Value;

    fn next(&mut self) -> Option<Self::Item> {
        self.walk.next().map(|(_, n)| n.value())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.walk.size_hint()
    }
}

impl<N: Node> DoubleEndedIterator for Iter<'_, N> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.walk.next_back().map(|(_, n)| n.value())
    }
}

impl<N: Node> ExactSizeIterator for Iter<'_, N> {}

/// Front-to-back iterator over node ids.
pub struct Ids<'a, N> {
    walk: Walk<'a, N>,
}

impl<N: Node> Iterator for Ids<'_, N> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        self.walk.next().map(|(k, _)| NodeId(k))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.walk.size_hint()
    }
}

impl<N: Node> DoubleEndedIterator for Ids<'_, N> {
    fn next_back(&mut self) -> Option<NodeId> {
        self.walk.next_back().map(|(k, _)| NodeId(k))
    }
}

impl<'a, N: Node> IntoIterator for &'a List<N> {
    type Item = &'a N::Value;
    type IntoIter = Iter<'a, N>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
