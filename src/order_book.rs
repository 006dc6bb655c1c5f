//! Order Book - The central limit order book data structure.
//!
//! Maintains one ordered level store per side and an O(1) locator index
//! from order id to (side, price, arena handle).

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::iter::Rev;
use std::ops::Bound;

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;

use crate::arena::{Arena, OrderHandle, OrderNode, NULL_INDEX};
use crate::command::{OrderId, Side};
use crate::price_level::PriceLevel;

/// Where a resting order lives. Present iff the order rests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Locator {
    /// Order side (selects the level store)
    pub side: Side,
    /// Price level (selects the PriceLevel)
    pub price: Decimal,
    /// Stable arena handle
    pub handle: OrderHandle,
}

/// Ordered price levels for one side of the book.
///
/// Bids iterate best-first descending, asks ascending.
#[derive(Debug, Clone)]
pub struct LevelStore {
    side: Side,
    levels: BTreeMap<Decimal, PriceLevel>,
}

/// Best-first iterator over a level store
pub enum BestFirst<'a> {
    Ascending(btree_map::Iter<'a, Decimal, PriceLevel>),
    Descending(Rev<btree_map::Iter<'a, Decimal, PriceLevel>>),
}

impl<'a> Iterator for BestFirst<'a> {
    type Item = (Decimal, &'a PriceLevel);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        match self {
            BestFirst::Ascending(it) => it.next(),
            BestFirst::Descending(it) => it.next(),
        }
        .map(|(p, l)| (*p, l))
    }
}

impl LevelStore {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn side(&self) -> Side {
        self.side
    }

    /// Levels from best to worst price
    #[inline]
    pub fn iter_best_first(&self) -> BestFirst<'_> {
        match self.side {
            Side::Buy => BestFirst::Descending(self.levels.iter().rev()),
            Side::Sell => BestFirst::Ascending(self.levels.iter()),
        }
    }

    /// Best level, including levels that only carry an adjusted aggregate
    #[inline]
    pub fn best(&self) -> Option<(Decimal, &PriceLevel)> {
        self.iter_best_first().next()
    }

    /// Best level that has at least one resting order to trade against
    #[inline]
    pub fn best_matchable(&self) -> Option<(Decimal, &PriceLevel)> {
        self.iter_best_first().find(|(_, l)| !l.is_empty())
    }

    #[inline]
    pub fn get(&self, price: Decimal) -> Option<&PriceLevel> {
        self.levels.get(&price)
    }

    #[inline]
    pub fn get_mut(&mut self, price: Decimal) -> Option<&mut PriceLevel> {
        self.levels.get_mut(&price)
    }

    #[inline]
    pub fn get_or_create(&mut self, price: Decimal) -> &mut PriceLevel {
        self.levels.entry(price).or_default()
    }

    #[inline]
    pub fn remove(&mut self, price: Decimal) -> Option<PriceLevel> {
        self.levels.remove(&price)
    }

    /// Whether `price` is at least as good as `bound` for this side.
    ///
    /// Used for IOC/FOK limits: a sell level satisfies a buyer's bound
    /// when `price <= bound`, a buy level satisfies a seller's bound when
    /// `price >= bound`. Equality satisfies the bound.
    #[inline]
    pub fn within_bound(&self, price: Decimal, bound: Decimal) -> bool {
        match self.side {
            Side::Sell => price <= bound,
            Side::Buy => price >= bound,
        }
    }

    /// Highest order-backed price a taker limited by `bound` could trade
    /// against on this side.
    pub fn highest_reachable(&self, bound: Option<Decimal>) -> Option<Decimal> {
        match self.side {
            Side::Sell => {
                let upto = bound.map_or(Bound::Unbounded, Bound::Included);
                self.levels
                    .range((Bound::Unbounded, upto))
                    .rev()
                    .find(|(_, l)| !l.is_empty())
                    .map(|(p, _)| *p)
            }
            Side::Buy => self
                .best_matchable()
                .map(|(p, _)| p)
                .filter(|p| bound.map_or(true, |b| *p >= b)),
        }
    }

    /// Number of levels
    #[inline]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Top `depth` (price, aggregate) pairs, best first
    pub fn depth(&self, depth: usize) -> Vec<(Decimal, Decimal)> {
        self.iter_best_first()
            .take(depth)
            .map(|(p, l)| (p, l.total_qty))
            .collect()
    }
}

/// Outcome of filling the head order of a level
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeadFill {
    /// The resting order that was hit
    pub order_id: OrderId,
    /// Quantity taken from it
    pub filled: Decimal,
    /// Its remaining quantity after the fill
    pub remaining: Decimal,
}

/// Two-sided book plus the locator index.
pub struct OrderBook {
    /// Bid price levels (buy orders)
    bids: LevelStore,
    /// Ask price levels (sell orders)
    asks: LevelStore,
    /// Order lookup map: OrderId -> Locator
    locators: FxHashMap<OrderId, Locator>,
}

impl OrderBook {
    /// Create a new empty order book
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a new order book with pre-allocated locator capacity
    pub fn with_capacity(orders: usize) -> Self {
        Self {
            bids: LevelStore::new(Side::Buy),
            asks: LevelStore::new(Side::Sell),
            locators: FxHashMap::with_capacity_and_hasher(orders, Default::default()),
        }
    }

    // ========================================================================
    // Side Access
    // ========================================================================

    #[inline]
    pub fn side(&self, side: Side) -> &LevelStore {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    #[inline]
    pub fn side_mut(&mut self, side: Side) -> &mut LevelStore {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    #[inline]
    pub fn bids(&self) -> &LevelStore {
        &self.bids
    }

    #[inline]
    pub fn asks(&self) -> &LevelStore {
        &self.asks
    }

    /// Best bid (price, aggregate)
    #[inline]
    pub fn best_bid(&self) -> Option<(Decimal, Decimal)> {
        self.bids.best().map(|(p, l)| (p, l.total_qty))
    }

    /// Best ask (price, aggregate)
    #[inline]
    pub fn best_ask(&self) -> Option<(Decimal, Decimal)> {
        self.asks.best().map(|(p, l)| (p, l.total_qty))
    }

    /// Calculate spread (best_ask - best_bid)
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some(ask - bid),
            _ => None,
        }
    }

    // ========================================================================
    // Order Management
    // ========================================================================

    /// Place an order at the tail of its level and index it.
    ///
    /// Returns `None` if the order id is already resting or the arena is
    /// out of index space; nothing is modified in either case.
    pub fn rest_order(&mut self, arena: &mut Arena, node: OrderNode) -> Option<OrderHandle> {
        if self.locators.contains_key(&node.order_id) {
            return None;
        }
        let handle = arena.alloc(node)?;

        self.locators.insert(
            node.order_id,
            Locator {
                side: node.side,
                price: node.price,
                handle,
            },
        );
        self.side_mut(node.side)
            .get_or_create(node.price)
            .push_back(arena, handle);

        Some(handle)
    }

    /// Remove an order from the book (cancel).
    ///
    /// Unlinks it from its level, drops the level if no orders remain,
    /// invalidates the locator and frees the arena slot.
    pub fn remove_order(&mut self, arena: &mut Arena, order_id: OrderId) -> Option<OrderNode> {
        let loc = self.locators.remove(&order_id)?;
        let store = self.side_mut(loc.side);

        if let Some(level) = store.get_mut(loc.price) {
            if level.remove(arena, loc.handle.index()) {
                store.remove(loc.price);
            }
        }
        arena.free(loc.handle)
    }

    /// Fill up to `qty` of the head order at (`side`, `price`).
    ///
    /// Decrements the order and the level aggregate. A filled order is
    /// unlinked, its locator dropped and its slot freed in the same step;
    /// a level whose queue empties is removed.
    ///
    /// Returns `None` if there is no order-backed level at that price.
    pub fn fill_head(
        &mut self,
        arena: &mut Arena,
        side: Side,
        price: Decimal,
        qty: Decimal,
    ) -> Option<HeadFill> {
        let level = self.side_mut(side).get_mut(price)?;
        let head = level.peek_head();
        if head == NULL_INDEX {
            return None;
        }

        let node = arena.node_mut(head);
        let order_id = node.order_id;
        let fill = qty.min(node.qty);
        node.qty -= fill;
        let remaining = node.qty;
        level.subtract_qty(fill);

        if remaining <= Decimal::ZERO {
            // remove() subtracts the node's (zero) remainder
            let now_empty = level.remove(arena, head);
            if now_empty {
                self.side_mut(side).remove(price);
            }
            if let Some(loc) = self.locators.remove(&order_id) {
                arena.free(loc.handle);
            }
        }

        Some(HeadFill {
            order_id,
            filled: fill,
            remaining,
        })
    }

    /// Look up an order's locator by ID.
    #[inline]
    pub fn get_order(&self, order_id: OrderId) -> Option<&Locator> {
        self.locators.get(&order_id)
    }

    /// Check if an order exists.
    #[inline]
    pub fn contains_order(&self, order_id: OrderId) -> bool {
        self.locators.contains_key(&order_id)
    }

    // ========================================================================
    // Administrative Level Adjustment
    // ========================================================================

    /// Add `delta` to the aggregate at (`side`, `price`) without touching
    /// individual orders.
    ///
    /// Creates the level on a positive delta if absent; ignores a
    /// non-positive delta on an absent level; removes the level when the
    /// aggregate drops to zero or below. Orders still queued on a removed
    /// level are evicted with it and returned, so their locators never
    /// outlive the level.
    ///
    /// Returns the new aggregate (zero if the level is gone) and any
    /// evicted orders.
    pub fn adjust_level(
        &mut self,
        arena: &mut Arena,
        side: Side,
        price: Decimal,
        delta: Decimal,
    ) -> (Decimal, Vec<OrderNode>) {
        let store = self.side_mut(side);
        let new_qty = match store.get_mut(price) {
            Some(level) => {
                level.adjust_qty(delta);
                level.total_qty
            }
            None if delta > Decimal::ZERO => {
                store.levels.insert(price, PriceLevel::synthetic(delta));
                return (delta, Vec::new());
            }
            None => return (Decimal::ZERO, Vec::new()),
        };

        if new_qty > Decimal::ZERO {
            return (new_qty, Vec::new());
        }

        let mut evicted = Vec::new();
        if let Some(level) = store.remove(price) {
            let indices: Vec<_> = level.iter(arena).collect();
            for index in indices {
                let order_id = arena.node(index).order_id;
                if let Some(loc) = self.locators.remove(&order_id) {
                    evicted.extend(arena.free(loc.handle));
                }
            }
        }
        (Decimal::ZERO, evicted)
    }

    // ========================================================================
    // Utility Methods
    // ========================================================================

    /// Get the total number of resting orders
    pub fn order_count(&self) -> usize {
        self.locators.len()
    }

    /// Get the number of bid levels
    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    /// Get the number of ask levels
    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    /// Check if the book holds no orders and no levels
    pub fn is_empty(&self) -> bool {
        self.locators.is_empty() && self.bids.is_empty() && self.asks.is_empty()
    }

    /// Get (aggregate, order count) at a price level
    pub fn depth_at(&self, side: Side, price: Decimal) -> (Decimal, u32) {
        self.side(side)
            .get(price)
            .map(|l| (l.total_qty, l.count))
            .unwrap_or((Decimal::ZERO, 0))
    }

    /// Check structural invariants, returning a description of each
    /// violation found.
    ///
    /// With `strict_aggregates`, every level's aggregate must also be
    /// positive and equal the sum of its queued orders (true unless
    /// `adjust_level` was used).
    pub fn audit(&self, arena: &Arena, strict_aggregates: bool) -> Vec<String> {
        let mut problems = Vec::new();

        for store in [&self.bids, &self.asks] {
            let mut previous: Option<Decimal> = None;
            for (price, level) in store.iter_best_first() {
                if let Some(prev) = previous {
                    let ordered = match store.side {
                        Side::Buy => price < prev,
                        Side::Sell => price > prev,
                    };
                    if !ordered {
                        problems.push(format!("{} level {} out of order", store.side, price));
                    }
                }
                previous = Some(price);

                if (strict_aggregates || level.is_empty()) && level.total_qty <= Decimal::ZERO {
                    problems.push(format!("{} level {} has aggregate {}", store.side, price, level.total_qty));
                }

                let mut count = 0u32;
                for index in level.iter(arena) {
                    count += 1;
                    let node = arena.node(index);
                    match self.locators.get(&node.order_id) {
                        Some(loc)
                            if loc.side == store.side
                                && loc.price == price
                                && loc.handle.index() == index => {}
                        _ => problems.push(format!("order {} has a bad locator", node.order_id)),
                    }
                    if node.qty <= Decimal::ZERO {
                        problems.push(format!("order {} rests with qty {}", node.order_id, node.qty));
                    }
                }
                if count != level.count {
                    problems.push(format!("{} level {} count mismatch", store.side, price));
                }
                if strict_aggregates && level.resting_qty(arena) != Some(level.total_qty) {
                    problems.push(format!("{} level {} aggregate drift", store.side, price));
                }
            }
        }

        for (order_id, loc) in &self.locators {
            if arena.get(loc.handle).map(|n| n.order_id) != Some(*order_id) {
                problems.push(format!("locator for {} is dangling", order_id));
            }
        }

        if let (Some((bid, _)), Some((ask, _))) = (
            self.bids.best_matchable(),
            self.asks.best_matchable(),
        ) {
            if bid >= ask {
                problems.push(format!("book crossed: bid {} >= ask {}", bid, ask));
            }
        }

        problems
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBook")
            .field("best_bid", &self.best_bid())
            .field("best_ask", &self.best_ask())
            .field("bid_levels", &self.bids.len())
            .field("ask_levels", &self.asks.len())
            .field("order_count", &self.locators.len())
            .finish()
    }
}
