//! Price Level - A FIFO queue of orders at a single price point.
//!
//! Implements a doubly-linked list using arena indices for O(1)
//! insertion, removal from head, and removal from arbitrary position.

use rust_decimal::Decimal;

use crate::arena::{Arena, ArenaIndex, OrderHandle, NULL_INDEX};

/// A queue of orders at a specific price level.
///
/// Orders are processed in FIFO order (price-time priority).
/// The doubly-linked structure enables O(1) cancel from any position.
#[derive(Clone, Copy, Debug)]
pub struct PriceLevel {
    /// Index of the oldest order (highest priority, first to match)
    pub head: ArenaIndex,
    /// Index of the newest order (last to match)
    pub tail: ArenaIndex,
    /// Aggregate quantity at this level
    pub total_qty: Decimal,
    /// Number of orders at this level
    pub count: u32,
}

impl PriceLevel {
    /// Create a new empty price level
    #[inline]
    pub const fn new() -> Self {
        Self {
            head: NULL_INDEX,
            tail: NULL_INDEX,
            total_qty: Decimal::ZERO,
            count: 0,
        }
    }

    /// Level with an aggregate but no resting orders (external depth)
    #[inline]
    pub const fn synthetic(qty: Decimal) -> Self {
        Self {
            head: NULL_INDEX,
            tail: NULL_INDEX,
            total_qty: qty,
            count: 0,
        }
    }

    /// Returns true if there are no orders at this level
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append an order to the tail of the queue (newest order).
    ///
    /// # Complexity
    /// O(1)
    pub fn push_back(&mut self, arena: &mut Arena, handle: OrderHandle) {
        let index = handle.index();
        let qty = arena.node(index).qty;

        if self.tail == NULL_INDEX {
            // Empty list: new node becomes both head and tail
            debug_assert!(self.head == NULL_INDEX);
            self.head = index;
            self.tail = index;
            let node = arena.node_mut(index);
            node.prev = NULL_INDEX;
            node.next = NULL_INDEX;
        } else {
            arena.node_mut(self.tail).next = index;
            let node = arena.node_mut(index);
            node.prev = self.tail;
            node.next = NULL_INDEX;
            self.tail = index;
        }

        self.count += 1;
        // Callers check the sum fits before resting
        self.total_qty = self.total_qty.saturating_add(qty);
    }

    /// Remove and return the head order (oldest/highest priority).
    ///
    /// The order is NOT freed from the arena; caller must do that.
    ///
    /// # Complexity
    /// O(1)
    pub fn pop_front(&mut self, arena: &mut Arena) -> Option<ArenaIndex> {
        if self.head == NULL_INDEX {
            return None;
        }
        let index = self.head;
        self.remove(arena, index);
        Some(index)
    }

    /// Remove an order from anywhere in the queue.
    ///
    /// The order's remaining quantity is subtracted from the aggregate.
    /// The order is NOT freed from the arena; caller must do that.
    ///
    /// # Returns
    /// `true` if the level now holds no orders.
    ///
    /// # Complexity
    /// O(1)
    pub fn remove(&mut self, arena: &mut Arena, index: ArenaIndex) -> bool {
        let node = arena.node(index);
        let prev_idx = node.prev;
        let next_idx = node.next;
        let qty = node.qty;

        if prev_idx == NULL_INDEX {
            debug_assert!(self.head == index);
            self.head = next_idx;
        } else {
            arena.node_mut(prev_idx).next = next_idx;
        }

        if next_idx == NULL_INDEX {
            debug_assert!(self.tail == index);
            self.tail = prev_idx;
        } else {
            arena.node_mut(next_idx).prev = prev_idx;
        }

        self.count -= 1;
        self.subtract_qty(qty);

        // Clear the removed node's linkage
        let node = arena.node_mut(index);
        node.prev = NULL_INDEX;
        node.next = NULL_INDEX;

        self.count == 0
    }

    /// Peek at the head order without removing it.
    ///
    /// # Returns
    /// Index of the head order, or `NULL_INDEX` if empty.
    #[inline]
    pub const fn peek_head(&self) -> ArenaIndex {
        self.head
    }

    /// Update the aggregate after a partial fill.
    ///
    /// Call this after modifying an order's qty directly. Saturates at
    /// zero when an adjusted aggregate is smaller than the queued orders.
    #[inline]
    pub fn subtract_qty(&mut self, qty: Decimal) {
        self.total_qty = (self.total_qty - qty).max(Decimal::ZERO);
    }

    /// Apply an administrative delta to the aggregate only.
    #[inline]
    pub fn adjust_qty(&mut self, delta: Decimal) {
        self.total_qty = self.total_qty.saturating_add(delta);
    }

    /// Walk the queue head to tail, yielding arena indices.
    pub fn iter<'a>(&self, arena: &'a Arena) -> LevelIter<'a> {
        LevelIter {
            arena,
            cursor: self.head,
        }
    }

    /// Sum of the remaining quantities of the queued orders, `None` if
    /// it exceeds the decimal range.
    pub fn resting_qty(&self, arena: &Arena) -> Option<Decimal> {
        self.iter(arena)
            .try_fold(Decimal::ZERO, |acc, i| acc.checked_add(arena.node(i).qty))
    }
}

impl Default for PriceLevel {
    fn default() -> Self {
        Self::new()
    }
}

/// FIFO iterator over a level's queue
pub struct LevelIter<'a> {
    arena: &'a Arena,
    cursor: ArenaIndex,
}

impl Iterator for LevelIter<'_> {
    type Item = ArenaIndex;

    fn next(&mut self) -> Option<ArenaIndex> {
        if self.cursor == NULL_INDEX {
            return None;
        }
        let index = self.cursor;
        self.cursor = self.arena.node(index).next;
        Some(index)
    }
}
