//! Matching Engine - Core order matching algorithms.
//!
//! Four lifetimes share one book:
//! 1. LIMIT: rest on the own side, then clear any crossed levels
//! 2. MARKET: consume the opposite side with no price bound
//! 3. IOC: consume the opposite side up to a limit price, drop the rest
//! 4. FOK: check that the bound covers the whole quantity, then run as IOC
//!
//! Priority is price first, then arrival order within a level.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, trace, warn};

use crate::arena::{Arena, OrderNode};
use crate::command::{
    BookUpdate, CanceledOrder, OrderId, OrderRequest, OrderType, RestingOrder, Side, Trade,
};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::fees::FeeSchedule;
use crate::market_data::{BookSnapshot, MarketDataView, TopOfBook};
use crate::order_book::OrderBook;
use crate::sequence::SequenceGenerator;

/// Callback invoked once per trade, in generation order.
///
/// Runs while the engine is locked: it must not block and must not call
/// back into the same engine.
pub type TradeListener = Arc<dyn Fn(&Trade) + Send + Sync>;

/// Source of trade timestamps, in microseconds since the Unix epoch
pub type Clock = fn() -> i64;

fn system_clock() -> i64 {
    Utc::now().timestamp_micros()
}

/// Result of one order submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Id assigned to the submitted order
    pub order_id: OrderId,
    pub side: Side,
    pub order_type: OrderType,
    /// Trades produced by this submission only
    pub trades: Vec<Trade>,
    /// Quantity left resting in the book (LIMIT only)
    pub resting_qty: Decimal,
}

impl Execution {
    /// Total quantity traded across all fills
    pub fn filled_qty(&self) -> Decimal {
        self.trades.iter().map(|t| t.quantity).sum()
    }
}

/// The matching engine core
pub struct MatchingEngine {
    symbol: String,
    /// Memory arena for order nodes
    pub arena: Arena,
    /// The limit order book
    pub book: OrderBook,
    fees: FeeSchedule,
    order_ids: SequenceGenerator,
    trade_ids: SequenceGenerator,
    /// Append-only trade history
    trade_log: Vec<Trade>,
    listener: Option<TradeListener>,
    clock: Clock,
    /// Set once `adjust_level` has run; aggregates may then differ from
    /// the sum of queued orders
    adjusted: bool,
}

impl MatchingEngine {
    /// Create an engine for `symbol` with default ids and capacity
    pub fn new(symbol: impl Into<String>, fees: FeeSchedule) -> Self {
        Self::from_config(&EngineConfig {
            symbol: symbol.into(),
            fees,
            ..EngineConfig::default()
        })
    }

    /// Create an engine from an already validated configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            symbol: config.symbol.clone(),
            arena: Arena::new(config.order_capacity),
            book: OrderBook::with_capacity(config.order_capacity as usize),
            fees: config.fees,
            order_ids: SequenceGenerator::starting_at(config.first_order_id),
            trade_ids: SequenceGenerator::starting_at(config.first_trade_id),
            trade_log: Vec::new(),
            listener: None,
            clock: system_clock,
            adjusted: false,
        }
    }

    /// Replace the timestamp source
    pub fn set_clock(&mut self, clock: Clock) {
        self.clock = clock;
    }

    /// Install the trade listener. Only one may be installed per engine.
    pub fn set_listener(&mut self, listener: TradeListener) -> Result<()> {
        if self.listener.is_some() {
            return Err(EngineError::ListenerAlreadyRegistered);
        }
        self.listener = Some(listener);
        Ok(())
    }

    // ========================================================================
    // Intake
    // ========================================================================

    /// Process a new order.
    ///
    /// # Algorithm
    /// 1. Validate; a rejected request draws no id and changes nothing
    /// 2. Check that every fill and the resting aggregate stay in range
    /// 3. Draw a fresh order id
    /// 4. Dispatch on the order type
    ///
    /// # Returns
    /// The trades produced by this order, and what is left resting.
    pub fn process_submit(&mut self, request: OrderRequest) -> Result<Execution> {
        request.validate()?;
        self.check_range(&request)?;

        let order_id = self.order_ids.next_id();
        let first_trade = self.trade_log.len();
        let side = request.side;

        let resting_qty = match request.order_type {
            OrderType::Limit => {
                let node = OrderNode::new(order_id, side, request.price, request.quantity);
                self.book
                    .rest_order(&mut self.arena, node)
                    .ok_or(EngineError::ArenaExhausted)?;
                self.clear_crossed_levels(side)?;
                self.resting_qty(order_id)
            }
            OrderType::Market => {
                self.consume(order_id, side, request.quantity, None)?;
                Decimal::ZERO
            }
            OrderType::Ioc => {
                self.consume(order_id, side, request.quantity, Some(request.price))?;
                Decimal::ZERO
            }
            OrderType::Fok => {
                if self.fok_available(side, request.quantity, request.price) >= request.quantity {
                    self.consume(order_id, side, request.quantity, Some(request.price))?;
                } else {
                    debug!(order_id, %side, qty = %request.quantity, "fok killed");
                }
                Decimal::ZERO
            }
        };

        let trades = self.trade_log[first_trade..].to_vec();
        debug!(
            order_id,
            %side,
            order_type = %request.order_type,
            price = %request.price,
            qty = %request.quantity,
            fills = trades.len(),
            resting = %resting_qty,
            "order processed"
        );

        Ok(Execution {
            order_id,
            side,
            order_type: request.order_type,
            trades,
            resting_qty,
        })
    }

    /// Reject a request whose fills or resting aggregate would leave the
    /// decimal range.
    ///
    /// Every fill is at most `quantity`. A LIMIT fills at or below its own
    /// price; other types fill no higher than the highest opposite price
    /// they can reach. Bounding that one notional bounds every fill.
    fn check_range(&self, request: &OrderRequest) -> Result<()> {
        let side = request.side;
        let bound = match request.order_type {
            OrderType::Limit => {
                self.fees.fees_for(request.price, request.quantity)?;
                let (level_qty, _) = self.book.depth_at(side, request.price);
                level_qty
                    .checked_add(request.quantity)
                    .ok_or(EngineError::Overflow("level aggregate"))?;
                return Ok(());
            }
            OrderType::Market => None,
            OrderType::Ioc | OrderType::Fok => Some(request.price),
        };

        if let Some(price) = self.book.side(side.opposite()).highest_reachable(bound) {
            self.fees.fees_for(price, request.quantity)?;
        }
        Ok(())
    }

    /// Trade the book out of any crossed state.
    ///
    /// While the best order-backed bid is at or above the best order-backed
    /// ask, the two head orders trade at the ask price for the smaller of
    /// their quantities. Orders on the `aggressor` side are the takers.
    ///
    /// Fees are computed before either order is touched, so an overflow
    /// leaves the book as it was before that fill.
    ///
    /// # Returns
    /// Number of trades executed
    pub fn clear_crossed_levels(&mut self, aggressor: Side) -> Result<usize> {
        let mut executed = 0;

        loop {
            let (bid_price, ask_price, qty) = {
                let bid = self.book.bids().best_matchable();
                let ask = self.book.asks().best_matchable();
                match (bid, ask) {
                    (Some((bid_price, bid_level)), Some((ask_price, ask_level)))
                        if bid_price >= ask_price =>
                    {
                        let bid_qty = self.arena.node(bid_level.peek_head()).qty;
                        let ask_qty = self.arena.node(ask_level.peek_head()).qty;
                        (bid_price, ask_price, bid_qty.min(ask_qty))
                    }
                    _ => break,
                }
            };
            let fees = self.fees.fees_for(ask_price, qty)?;

            let bid_fill = self.book.fill_head(&mut self.arena, Side::Buy, bid_price, qty);
            let ask_fill = self.book.fill_head(&mut self.arena, Side::Sell, ask_price, qty);
            let (Some(bid_fill), Some(ask_fill)) = (bid_fill, ask_fill) else {
                break;
            };

            let (maker_id, taker_id) = match aggressor {
                Side::Buy => (ask_fill.order_id, bid_fill.order_id),
                Side::Sell => (bid_fill.order_id, ask_fill.order_id),
            };
            self.record_trade(ask_price, qty, fees, maker_id, taker_id, aggressor);
            executed += 1;
        }

        Ok(executed)
    }

    /// Consume the opposite side for an order that never rests.
    ///
    /// With a `bound`, stops at the first level worse than it; equality
    /// satisfies the bound.
    ///
    /// # Returns
    /// Unfilled quantity, which the caller discards
    fn consume(
        &mut self,
        taker_id: OrderId,
        side: Side,
        mut remaining: Decimal,
        bound: Option<Decimal>,
    ) -> Result<Decimal> {
        let maker_side = side.opposite();

        while remaining > Decimal::ZERO {
            let store = self.book.side(maker_side);
            let Some((price, level)) = store.best_matchable() else {
                break;
            };
            if let Some(limit) = bound {
                if !store.within_bound(price, limit) {
                    break;
                }
            }
            let head_qty = self.arena.node(level.peek_head()).qty;
            let fees = self.fees.fees_for(price, remaining.min(head_qty))?;

            let Some(fill) = self.book.fill_head(&mut self.arena, maker_side, price, remaining)
            else {
                break;
            };
            remaining -= fill.filled;
            self.record_trade(price, fill.filled, fees, fill.order_id, taker_id, side);
        }

        Ok(remaining)
    }

    /// Liquidity a FOK order could reach within `bound`.
    ///
    /// Walks order-backed opposite levels best to worst, summing level
    /// aggregates, and stops once `quantity` is covered or a level falls
    /// outside the bound.
    pub fn fok_available(&self, side: Side, quantity: Decimal, bound: Decimal) -> Decimal {
        let store = self.book.side(side.opposite());
        let mut available = Decimal::ZERO;

        for (price, level) in store.iter_best_first() {
            if available >= quantity || !store.within_bound(price, bound) {
                break;
            }
            if !level.is_empty() {
                available = available.saturating_add(level.total_qty);
            }
        }

        available
    }

    fn record_trade(
        &mut self,
        price: Decimal,
        quantity: Decimal,
        (maker_fee, taker_fee): (Decimal, Decimal),
        maker_order_id: OrderId,
        taker_order_id: OrderId,
        aggressor_side: Side,
    ) {
        let trade = Trade {
            trade_id: self.trade_ids.next_id(),
            symbol: self.symbol.clone(),
            price,
            quantity,
            timestamp_us: (self.clock)(),
            maker_order_id,
            taker_order_id,
            aggressor_side,
            maker_fee,
            taker_fee,
        };
        trace!(
            trade_id = trade.trade_id,
            %price,
            %quantity,
            maker = maker_order_id,
            taker = taker_order_id,
            "trade"
        );

        if let Some(listener) = &self.listener {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(&trade))).is_err() {
                error!(trade_id = trade.trade_id, "trade listener panicked");
            }
        }
        self.trade_log.push(trade);
    }

    fn resting_qty(&self, order_id: OrderId) -> Decimal {
        self.book
            .get_order(order_id)
            .and_then(|loc| self.arena.get(loc.handle))
            .map_or(Decimal::ZERO, |node| node.qty)
    }

    // ========================================================================
    // Cancel & Adjust
    // ========================================================================

    /// Cancel a resting order.
    pub fn cancel(&mut self, order_id: OrderId) -> Result<CanceledOrder> {
        let node = self
            .book
            .remove_order(&mut self.arena, order_id)
            .ok_or(EngineError::OrderNotFound(order_id))?;

        debug!(order_id, side = %node.side, price = %node.price, qty = %node.qty, "order canceled");
        Ok(CanceledOrder {
            order_id,
            side: node.side,
            price: node.price,
            canceled_qty: node.qty,
        })
    }

    /// Add `delta` to a level's aggregate without touching its orders.
    ///
    /// Creates the level on a positive delta, removes it once the
    /// aggregate reaches zero or below. Orders still queued on a removed
    /// level are dropped from the book with it. After any adjustment a
    /// level's aggregate is no longer guaranteed to equal the sum of its
    /// orders.
    pub fn adjust_level(&mut self, side: Side, price: Decimal, delta: Decimal) -> Result<BookUpdate> {
        if price <= Decimal::ZERO {
            return Err(EngineError::InvalidPrice(price));
        }
        let (current, _) = self.book.depth_at(side, price);
        current
            .checked_add(delta)
            .ok_or(EngineError::Overflow("level aggregate"))?;

        self.adjusted = true;
        let (new_qty, evicted) = self.book.adjust_level(&mut self.arena, side, price, delta);
        if !evicted.is_empty() {
            let ids: Vec<_> = evicted.iter().map(|n| n.order_id).collect();
            warn!(%side, %price, ?ids, "level removed with resting orders");
        }
        debug!(%side, %price, %delta, %new_qty, "level adjusted");

        Ok(BookUpdate {
            side,
            price,
            new_qty,
        })
    }

    // ========================================================================
    // Utility Methods
    // ========================================================================

    #[inline]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[inline]
    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Best bid and offer, empty sides as `Quote::EMPTY`
    #[inline]
    pub fn top_of_book(&self) -> TopOfBook {
        TopOfBook::from_book(&self.book)
    }

    /// Depth snapshot stamped with `at`
    pub fn snapshot(&self, depth: usize, at: DateTime<Utc>) -> BookSnapshot {
        BookSnapshot::capture(&self.symbol, &self.book, depth, at)
    }

    /// Market data to publish for lock-free readers
    pub fn market_data_view(&self, depth: usize) -> MarketDataView {
        MarketDataView::capture(&self.book, depth)
    }

    /// Get the spread
    #[inline]
    pub fn spread(&self) -> Option<Decimal> {
        self.book.spread()
    }

    /// Get total resting order count
    #[inline]
    pub fn order_count(&self) -> usize {
        self.book.order_count()
    }

    /// Look up a resting order
    pub fn order(&self, order_id: OrderId) -> Option<RestingOrder> {
        let loc = self.book.get_order(order_id)?;
        let node = self.arena.get(loc.handle)?;
        Some(RestingOrder {
            order_id,
            side: loc.side,
            price: loc.price,
            remaining: node.qty,
        })
    }

    /// Every trade executed so far, oldest first
    #[inline]
    pub fn trades(&self) -> &[Trade] {
        &self.trade_log
    }

    #[inline]
    pub fn trade_count(&self) -> usize {
        self.trade_log.len()
    }

    /// Structural invariant violations, empty when the book is sound.
    ///
    /// Aggregate drift is only reported while no level has been adjusted.
    pub fn audit(&self) -> Vec<String> {
        self.book.audit(&self.arena, !self.adjusted)
    }

    /// Compute a hash of the current state (for determinism testing)
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        for side in [Side::Buy, Side::Sell] {
            for (price, level) in self.book.side(side).iter_best_first() {
                price.hash(&mut hasher);
                level.total_qty.hash(&mut hasher);
                for index in level.iter(&self.arena) {
                    let node = self.arena.node(index);
                    node.order_id.hash(&mut hasher);
                    node.qty.hash(&mut hasher);
                }
            }
            0xffu8.hash(&mut hasher);
        }

        self.book.order_count().hash(&mut hasher);
        self.trade_log.len().hash(&mut hasher);
        self.order_ids.peek().hash(&mut hasher);
        self.trade_ids.peek().hash(&mut hasher);

        hasher.finish()
    }
}

impl std::fmt::Debug for MatchingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchingEngine")
            .field("symbol", &self.symbol)
            .field("book", &self.book)
            .field("trades", &self.trade_log.len())
            .field("listener", &self.listener.is_some())
            .finish()
    }
}
