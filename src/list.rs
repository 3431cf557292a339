//! # Node Store
//!
//! The node pool and the sorted, delta-encoded expiry list threaded through
//! it. Each linked node's `ticks_to_expire` counts from the expiry of the
//! node before it (the head counts from the instance's `ticks_current`),
//! so inserting or removing a node only touches its immediate successor.
//!
//! ```text
//!   head ─► [A: 40] ─► [B: 0] ─► [C: 25] ─► None
//!           t+40       t+40      t+65
//! ```
//!
//! Insertion refuses to place a slot-reserving node where its window
//! `[expiry, expiry + ticks_slot)` would overlap another reservation; the
//! Job decides what to do about the refusal.

use crate::node::Node;
use crate::user::SlotCursor;

/// Why [`NodeList::enqueue`] refused a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Collision {
    /// The window overlaps this node's reservation.
    Node(u8),
    /// The window overlaps a reservation whose node has already expired
    /// and left its place in the list.
    Reserved,
}

/// Node pool plus the sorted list and previous-slot bookkeeping.
pub struct NodeList<const NODES: usize> {
    pub(crate) nodes: [Node; NODES],

    /// Node expiring first.
    pub(crate) head: Option<u8>,

    /// Last expired node that reserved a slot, while the slot lasts.
    pub(crate) slot_previous: Option<u8>,

    /// Remaining reservation of the last expired slot, from `ticks_current`.
    pub(crate) ticks_slot_previous: u32,
}

impl<const NODES: usize> NodeList<NODES> {
    const CAPACITY: usize = {
        assert!(NODES > 0, "node pool must not be empty");
        assert!(NODES <= u8::MAX as usize, "node ids are u8");
        NODES
    };

    pub const fn new() -> Self {
        let _ = Self::CAPACITY;
        Self {
            nodes: [Node::EMPTY; NODES],
            head: None,
            slot_previous: None,
            ticks_slot_previous: 0,
        }
    }

    /// Node expiring first.
    pub fn head(&self) -> Option<u8> {
        self.head
    }

    /// Read access to a pool entry.
    pub fn node(&self, id: u8) -> Option<&Node> {
        self.nodes.get(id as usize)
    }

    /// Linked nodes in expiry order with their ticks from `ticks_current`.
    pub fn iter(&self) -> Iter<'_, NODES> {
        Iter {
            list: self,
            current: self.head,
            ticks: 0,
        }
    }

    /// Link node `id` at its expiry, unless it collides.
    ///
    /// `ticks_to_expire` of the node is taken as ticks from
    /// `ticks_current` and is rewritten relative to its new predecessor.
    /// Nodes with an equal expiry stay ahead of the newcomer.
    pub(crate) fn enqueue(&mut self, id: u8) -> Result<(), Collision> {
        let ticks_slot = self.nodes[id as usize].ticks_slot;
        let mut ticks_to_expire = self.nodes[id as usize].ticks_to_expire;
        let mut ticks_slot_previous = self.ticks_slot_previous;
        let mut id_slot_previous = None;
        let mut previous = None;
        let mut current = self.head;

        // Find the insertion point, tracking the reservation in force there
        while let Some(id_current) = current {
            let node = &self.nodes[id_current as usize];
            let ticks_to_expire_current = node.ticks_to_expire;
            if ticks_to_expire < ticks_to_expire_current {
                break;
            }
            ticks_to_expire -= ticks_to_expire_current;

            if node.ticks_slot != 0 {
                ticks_slot_previous = node.ticks_slot;
                id_slot_previous = Some(id_current);
            } else if ticks_slot_previous > ticks_to_expire_current {
                ticks_slot_previous -= ticks_to_expire_current;
            } else {
                ticks_slot_previous = 0;
            }

            previous = current;
            current = node.next;
        }

        if ticks_slot != 0 {
            if ticks_slot_previous > ticks_to_expire {
                return Err(id_slot_previous.map_or(Collision::Reserved, Collision::Node));
            }
            if let Some(id_collide) = self.by_slot_get(current, ticks_to_expire + ticks_slot) {
                return Err(Collision::Node(id_collide));
            }
        }

        let node = &mut self.nodes[id as usize];
        node.ticks_to_expire = ticks_to_expire;
        node.next = current;

        match previous {
            None => self.head = Some(id),
            Some(id_previous) => self.nodes[id_previous as usize].next = Some(id),
        }

        if let Some(id_current) = current {
            self.nodes[id_current as usize].ticks_to_expire -= ticks_to_expire;
        }

        Ok(())
    }

    /// Unlink node `id`, handing its delta to its successor.
    ///
    /// Returns the node's ticks to expiry from `ticks_current`, or 0 if it
    /// was not linked.
    pub(crate) fn dequeue(&mut self, id: u8) -> u32 {
        let mut previous = None;
        let mut current = self.head;
        let mut total = 0u32;

        while let Some(id_current) = current {
            if id_current == id {
                break;
            }
            let node = &self.nodes[id_current as usize];
            total += node.ticks_to_expire;
            previous = current;
            current = node.next;
        }

        if current.is_none() {
            return 0;
        }

        let next = self.nodes[id as usize].next;
        let timeout = self.nodes[id as usize].ticks_to_expire;

        match previous {
            None => self.head = next,
            Some(id_previous) => self.nodes[id_previous as usize].next = next,
        }

        if let Some(id_next) = next {
            self.nodes[id_next as usize].ticks_to_expire += timeout;
        }

        total + timeout
    }

    /// First slot-reserving node from `from` onward that expires within
    /// `ticks_slot` ticks (measured from `from`'s predecessor).
    pub(crate) fn by_slot_get(&self, from: Option<u8>, mut ticks_slot: u32) -> Option<u8> {
        let mut current = from;
        while let Some(id) = current {
            let node = &self.nodes[id as usize];
            if ticks_slot <= node.ticks_to_expire {
                return None;
            }
            if node.ticks_slot != 0 {
                return Some(id);
            }
            ticks_slot -= node.ticks_to_expire;
            current = node.next;
        }
        None
    }

    /// Advance `cursor` to the next slot-reserving node.
    ///
    /// A cursor with no id, or taken at a different `ticks_current`,
    /// restarts at the head.
    pub(crate) fn next_slot_get(&self, cursor: SlotCursor, ticks_current: u32) -> SlotCursor {
        let (mut current, mut ticks_to_expire) = match cursor.id {
            Some(id) if cursor.ticks_current == ticks_current && (id as usize) < NODES => {
                (self.nodes[id as usize].next, cursor.ticks_to_expire)
            }
            _ => (self.head, 0),
        };

        while let Some(id) = current {
            let node = &self.nodes[id as usize];
            ticks_to_expire += node.ticks_to_expire;
            if node.ticks_slot != 0 {
                break;
            }
            current = node.next;
        }

        SlotCursor {
            id: current,
            ticks_current,
            ticks_to_expire,
        }
    }
}

impl<const NODES: usize> Default for NodeList<NODES> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over linked nodes, yielding `(id, ticks from ticks_current)`.
pub struct Iter<'a, const NODES: usize> {
    list: &'a NodeList<NODES>,
    current: Option<u8>,
    ticks: u32,
}

impl<'a, const NODES: usize> Iterator for Iter<'a, NODES> {
    type Item = (u8, u32);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        let node = &self.list.nodes[id as usize];
        self.ticks += node.ticks_to_expire;
        self.current = node.next;
        Some((id, self.ticks))
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
