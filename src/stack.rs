//! Ordered view stacks.
//!
//! A stack is a doubly linked list threaded through a map keyed by view, so membership checks,
//! unlinking and moving to the front are O(1) while the insertion order is preserved. A view can
//! be linked into a given stack at most once.

use std::collections::HashMap;

use crate::view::ViewId;

#[derive(Debug, Clone, Copy)]
struct Link {
    prev: Option<ViewId>,
    next: Option<ViewId>,
}

#[derive(Debug, Default, Clone)]
pub struct ViewStack {
    head: Option<ViewId>,
    tail: Option<ViewId>,
    links: HashMap<ViewId, Link>,
}

pub struct Iter<'a> {
    stack: &'a ViewStack,
    front: Option<ViewId>,
    back: Option<ViewId>,
    remaining: usize,
}

impl ViewStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn contains(&self, id: ViewId) -> bool {
        self.links.contains_key(&id)
    }

    pub fn first(&self) -> Option<ViewId> {
        self.head
    }

    pub fn last(&self) -> Option<ViewId> {
        self.tail
    }

    pub fn push_front(&mut self, id: ViewId) {
        assert!(!self.contains(id), "{id:?} is already linked into this stack");

        let link = Link {
            prev: None,
            next: self.head,
        };
        match self.head {
            Some(head) => self.link_mut(head).prev = Some(id),
            None => self.tail = Some(id),
        }
        self.head = Some(id);
        self.links.insert(id, link);
    }

    pub fn push_back(&mut self, id: ViewId) {
        assert!(!self.contains(id), "{id:?} is already linked into this stack");

        let link = Link {
            prev: self.tail,
            next: None,
        };
        match self.tail {
            Some(tail) => self.link_mut(tail).next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.links.insert(id, link);
    }

    /// Unlinks the view, returns whether it was linked.
    pub fn remove(&mut self, id: ViewId) -> bool {
        let Some(link) = self.links.remove(&id) else {
            return false;
        };

        match link.prev {
            Some(prev) => self.link_mut(prev).next = link.next,
            None => self.head = link.next,
        }
        match link.next {
            Some(next) => self.link_mut(next).prev = link.prev,
            None => self.tail = link.prev,
        }

        true
    }

    /// Moves an already linked view to the front.
    pub fn move_to_front(&mut self, id: ViewId) {
        assert!(self.remove(id), "{id:?} is not linked into this stack");
        self.push_front(id);
    }

    pub fn clear(&mut self) {
        self.head = None;
        self.tail = None;
        self.links.clear();
    }

    /// Replaces the contents with the views of `other`, in the same order.
    pub fn relink_from(&mut self, other: &ViewStack) {
        self.clear();
        for id in other.iter() {
            self.push_back(id);
        }
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            stack: self,
            front: self.head,
            back: self.tail,
            remaining: self.len(),
        }
    }

    fn link_mut(&mut self, id: ViewId) -> &mut Link {
        self.links
            .get_mut(&id)
            .unwrap_or_else(|| panic!("view {id:?} is not in the stack"))
    }
}

impl Iterator for Iter<'_> {
    type Item = ViewId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let id = self.front?;
        self.front = self.stack.links[&id].next;
        self.remaining -= 1;
        Some(id)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl DoubleEndedIterator for Iter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let id = self.back?;
        self.back = self.stack.links[&id].prev;
        self.remaining -= 1;
        Some(id)
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a ViewStack {
    type Item = ViewId;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
