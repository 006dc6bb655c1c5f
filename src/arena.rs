//! Arena Allocator - O(1) slab allocator with generational handles.
//!
//! Resting orders live in one contiguous block of slots. A free list
//! threaded through the `next` field of unused slots gives O(1)
//! allocation and deallocation. Every slot carries a generation that is
//! bumped on free, so a handle to a freed (and possibly reused) slot can
//! never alias the new occupant.

use std::fmt;

use rust_decimal::Decimal;

use crate::command::{OrderId, Side};

/// Sentinel value representing a null/invalid index (like nullptr)
pub const NULL_INDEX: u32 = u32::MAX;

/// Raw slot index, used for intra-level linkage
pub type ArenaIndex = u32;

/// Stable reference to a resting order: slot index plus the generation
/// the slot had when the order was stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OrderHandle {
    index: ArenaIndex,
    generation: u32,
}

impl OrderHandle {
    #[inline]
    pub const fn index(self) -> ArenaIndex {
        self.index
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

/// A single resting order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderNode {
    /// Engine-assigned order ID
    pub order_id: OrderId,
    /// Book side the order rests on
    pub side: Side,
    /// Limit price
    pub price: Decimal,
    /// Remaining quantity to fill
    pub qty: Decimal,

    // === Linkage (FIFO queue pointers within a PriceLevel) ===
    /// Index of next order at same price level
    pub next: ArenaIndex,
    /// Index of previous order (enables O(1) cancel)
    pub prev: ArenaIndex,
}

impl OrderNode {
    /// Create a new unlinked order node
    #[inline]
    pub fn new(order_id: OrderId, side: Side, price: Decimal, qty: Decimal) -> Self {
        Self {
            order_id,
            side,
            price,
            qty,
            next: NULL_INDEX,
            prev: NULL_INDEX,
        }
    }

    const fn empty() -> Self {
        Self {
            order_id: 0,
            side: Side::Buy,
            price: Decimal::ZERO,
            qty: Decimal::ZERO,
            next: NULL_INDEX,
            prev: NULL_INDEX,
        }
    }
}

#[derive(Clone, Copy)]
struct Slot {
    node: OrderNode,
    generation: u32,
    occupied: bool,
}

/// Slab of order nodes with O(1) allocation and deallocation.
///
/// Pre-allocates `capacity` slots and grows on demand past that.
pub struct Arena {
    /// Contiguous block of slots
    slots: Vec<Slot>,

    /// Head of the free list (index of first available slot)
    free_head: ArenaIndex,

    /// Number of currently allocated nodes
    allocated_count: u32,
}

impl Arena {
    /// Create a new arena with the specified pre-allocated capacity.
    ///
    /// # Panics
    /// Panics if capacity is not below `NULL_INDEX`.
    pub fn new(capacity: u32) -> Self {
        assert!(capacity < NULL_INDEX, "Capacity must be less than NULL_INDEX");

        let mut slots = vec![
            Slot {
                node: OrderNode::empty(),
                generation: 0,
                occupied: false,
            };
            capacity as usize
        ];

        // Thread the free list through all slots
        for (i, slot) in slots.iter_mut().enumerate() {
            let next = i as u32 + 1;
            slot.node.next = if next < capacity { next } else { NULL_INDEX };
        }

        Self {
            slots,
            free_head: if capacity > 0 { 0 } else { NULL_INDEX },
            allocated_count: 0,
        }
    }

    /// Store a node and return its handle.
    ///
    /// Returns `None` only if the index space is exhausted.
    ///
    /// # Complexity
    /// O(1) amortized - pops from head of free list, or appends a slot
    pub fn alloc(&mut self, node: OrderNode) -> Option<OrderHandle> {
        let index = if self.free_head != NULL_INDEX {
            let index = self.free_head;
            self.free_head = self.slots[index as usize].node.next;
            index
        } else {
            let index = u32::try_from(self.slots.len()).ok().filter(|&i| i < NULL_INDEX)?;
            self.slots.push(Slot {
                node: OrderNode::empty(),
                generation: 0,
                occupied: false,
            });
            index
        };

        let slot = &mut self.slots[index as usize];
        slot.node = OrderNode {
            next: NULL_INDEX,
            prev: NULL_INDEX,
            ..node
        };
        slot.occupied = true;
        self.allocated_count += 1;

        Some(OrderHandle {
            index,
            generation: slot.generation,
        })
    }

    /// Release a node back to the arena, returning its contents.
    ///
    /// Returns `None` for a stale or already-freed handle.
    ///
    /// # Complexity
    /// O(1) - pushes to head of free list
    pub fn free(&mut self, handle: OrderHandle) -> Option<OrderNode> {
        let free_head = self.free_head;
        let slot = self.live_slot_mut(handle)?;
        let node = slot.node;

        slot.occupied = false;
        slot.generation = slot.generation.wrapping_add(1);
        slot.node = OrderNode::empty();
        slot.node.next = free_head;

        self.free_head = handle.index;
        self.allocated_count -= 1;
        Some(node)
    }

    /// Resolve a handle to its node, if still live.
    #[inline]
    pub fn get(&self, handle: OrderHandle) -> Option<&OrderNode> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.occupied && s.generation == handle.generation)
            .map(|s| &s.node)
    }

    /// Resolve a handle to its node mutably, if still live.
    #[inline]
    pub fn get_mut(&mut self, handle: OrderHandle) -> Option<&mut OrderNode> {
        self.live_slot_mut(handle).map(|s| &mut s.node)
    }

    /// Current handle for an occupied slot (used when walking level linkage).
    #[inline]
    pub fn handle_at(&self, index: ArenaIndex) -> Option<OrderHandle> {
        self.slots
            .get(index as usize)
            .filter(|s| s.occupied)
            .map(|s| OrderHandle {
                index,
                generation: s.generation,
            })
    }

    /// Node at a raw index. Linkage indices are only ever read from live
    /// nodes, so the caller guarantees the slot is occupied.
    #[inline]
    pub(crate) fn node(&self, index: ArenaIndex) -> &OrderNode {
        debug_assert!(self.slots[index as usize].occupied, "linked to free slot");
        &self.slots[index as usize].node
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, index: ArenaIndex) -> &mut OrderNode {
        debug_assert!(self.slots[index as usize].occupied, "linked to free slot");
        &mut self.slots[index as usize].node
    }

    fn live_slot_mut(&mut self, handle: OrderHandle) -> Option<&mut Slot> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.occupied && s.generation == handle.generation)
    }

    /// Returns the number of currently allocated nodes.
    #[inline]
    pub fn allocated(&self) -> u32 {
        self.allocated_count
    }

    /// Returns the number of slots, used or free.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the arena is empty (no allocated nodes).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.allocated_count == 0
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.slots.len())
            .field("allocated", &self.allocated_count)
            .field("free_head", &self.free_head)
            .finish()
    }
}
