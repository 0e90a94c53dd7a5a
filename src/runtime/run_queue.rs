//! Circular run queue of fibers.
//!
//! Nodes live in a fixed-capacity arena and link to each other by index, forming a single cycle.
//! `last` is the insertion point as well as the predecessor of `current`,
//! which keeps appending and removing the running node O(1) on a singly linked ring.
//!
//! ```text
//!   last ──► current ──► b ──► c ──┐
//!    ▲                             │
//!    └─────────────────────────────┘
//! ```
//!
//! The arena is an inline array sized at compile time, vacant slots form a free list.

use core::mem;

/// Index of a node in the arena, stable for the node's lifetime.
pub(crate) type Key = usize;

#[derive(Debug)]
struct Node<T> {
    value: T,
    next: Key,
}

#[derive(Debug)]
enum Slot<T> {
    Vacant { next_free: Option<Key> },
    Occupied(Node<T>),
}

#[derive(Debug)]
pub(crate) struct RunQueue<T, const CAP: usize> {
    slots: [Slot<T>; CAP],
    /// Most recently vacated slot.
    free: Option<Key>,
    /// Slots from here on were never occupied.
    untouched: Key,
    len: usize,
    last: Option<Key>,
    current: Option<Key>,
}

impl<T, const CAP: usize> RunQueue<T, CAP> {
    pub(crate) const fn new() -> Self {
        RunQueue {
            slots: [const { Slot::Vacant { next_free: None } }; CAP],
            free: None,
            untouched: 0,
            len: 0,
            last: None,
            current: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn current(&self) -> Option<Key> {
        self.current
    }

    pub(crate) fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        match self.slots.get_mut(key)? {
            Slot::Occupied(node) => Some(&mut node.value),
            Slot::Vacant { .. } => None,
        }
    }

    fn node(&self, key: Key) -> &Node<T> {
        match &self.slots[key] {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => unreachable!("linked slot {key} is vacant"),
        }
    }

    fn node_mut(&mut self, key: Key) -> &mut Node<T> {
        match &mut self.slots[key] {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => unreachable!("linked slot {key} is vacant"),
        }
    }

    fn vacant_key(&self) -> Option<Key> {
        match self.free {
            Some(key) => Some(key),
            None if self.untouched < CAP => Some(self.untouched),
            None => None,
        }
    }

    fn occupy(&mut self, key: Key, node: Node<T>) {
        match mem::replace(&mut self.slots[key], Slot::Occupied(node)) {
            Slot::Vacant { next_free } if self.free == Some(key) => self.free = next_free,
            Slot::Vacant { .. } => self.untouched += 1,
            Slot::Occupied(_) => unreachable!("slot {key} is occupied"),
        }
        self.len += 1;
    }

    fn vacate(&mut self, key: Key) -> Node<T> {
        let vacant = Slot::Vacant { next_free: self.free };
        match mem::replace(&mut self.slots[key], vacant) {
            Slot::Occupied(node) => {
                self.free = Some(key);
                self.len -= 1;
                node
            }
            Slot::Vacant { .. } => unreachable!("slot {key} is vacant"),
        }
    }

    /// Appends a node right after `last`, so it runs at the end of the current round.
    ///
    /// Returns [`None`] without touching the queue when the arena is full.
    pub(crate) fn push(&mut self, value: T) -> Option<Key> {
        let key = self.vacant_key()?;

        match self.last {
            None => self.occupy(key, Node { value, next: key }),
            Some(last) => {
                let next = self.node(last).next;
                self.occupy(key, Node { value, next });
                self.node_mut(last).next = key;
            }
        }

        self.last = Some(key);
        Some(key)
    }

    /// Makes the head of the queue current.
    pub(crate) fn start(&mut self) -> Option<Key> {
        let last = self.last?;
        self.current = Some(self.node(last).next);
        self.current
    }

    /// Moves on to the node after `current`.
    ///
    /// Returns [`None`] when there's no other node to move to.
    pub(crate) fn advance(&mut self) -> Option<Key> {
        let current = self.current?;
        let next = self.node(current).next;

        if next == current {
            return None;
        }

        self.last = Some(current);
        self.current = Some(next);
        Some(next)
    }

    /// Unlinks `current`, making its successor current.
    ///
    /// Returns the removed value and the new current node, [`None`] once the queue is empty.
    pub(crate) fn remove_current(&mut self) -> Option<(T, Option<Key>)> {
        let current = self.current?;
        let last = self.last?;
        debug_assert_eq!(self.node(last).next, current, "last must precede current");

        let removed = self.vacate(current);

        if last == current {
            self.last = None;
            self.current = None;
        } else {
            self.node_mut(last).next = removed.next;
            self.current = Some(removed.next);
        }

        Some((removed.value, self.current))
    }

    /// Forgets which node is current, leaving the ring intact.
    pub(crate) fn stop(&mut self) {
        self.current = None;
    }

    /// Values in the order they'll run, starting from the head.
    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = (Key, &T)> + '_ {
        let head = self.last.map(|last| self.node(last).next);
        let mut cursor = head;
        let mut remaining = self.len;

        core::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            remaining -= 1;

            let key = cursor?;
            let node = self.node(key);
            cursor = Some(node.next);
            Some((key, &node.value))
        })
    }
}
