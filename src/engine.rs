//! Engine - Thread-safe front for one instrument.
//!
//! Every mutation takes the book's write lock and runs to completion
//! before the next is admitted. Market-data reads either share that lock
//! or read a view published at the end of each mutation, depending on
//! `ReadConsistency`.

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::info;

use crate::command::{
    BookUpdate, CanceledOrder, Command, OrderAccepted, OrderId, OrderRequest, OrderType,
    OutputEvent, RestingOrder, Side, Trade,
};
use crate::config::{EngineConfig, ReadConsistency};
use crate::error::Result;
use crate::market_data::{BookSnapshot, MarketDataView, TopOfBook};
use crate::matching::{Clock, Execution, MatchingEngine, TradeListener};

/// Shareable matching engine for a single instrument.
pub struct Engine {
    config: EngineConfig,
    /// The underlying matching engine
    matcher: RwLock<MatchingEngine>,
    /// Last published market data (`ReadConsistency::Published` only)
    published: RwLock<MarketDataView>,
}

impl Engine {
    /// Create an engine from a configuration, validating it first.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Engine with default settings for `symbol`
    pub fn with_symbol(symbol: impl Into<String>) -> Result<Self> {
        Self::new(EngineConfig::new(symbol))
    }

    fn build(config: EngineConfig) -> Self {
        info!(
            symbol = %config.symbol,
            maker_rate = %config.fees.maker_rate,
            taker_rate = %config.fees.taker_rate,
            read_consistency = ?config.read_consistency,
            "matching engine started"
        );
        let matcher = MatchingEngine::from_config(&config);
        Self {
            matcher: RwLock::new(matcher),
            published: RwLock::new(MarketDataView::default()),
            config,
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Submit an order and return the trades it produced.
    ///
    /// An FOK that cannot be filled, or an IOC/MARKET order with nothing
    /// to trade against, returns `Ok` with no trades.
    pub fn submit(&self, request: OrderRequest) -> Result<Vec<Trade>> {
        self.execute(request).map(|exec| exec.trades)
    }

    /// Submit from individual parts
    pub fn submit_parts(
        &self,
        price: Decimal,
        quantity: Decimal,
        side: Side,
        order_type: OrderType,
    ) -> Result<Vec<Trade>> {
        self.submit(OrderRequest::new(side, order_type, price, quantity))
    }

    /// Submit an order and return the full execution report
    pub fn execute(&self, request: OrderRequest) -> Result<Execution> {
        let mut matcher = self.matcher.write();
        let exec = matcher.process_submit(request)?;
        self.publish(&matcher);
        Ok(exec)
    }

    /// Cancel a resting order by id.
    pub fn cancel(&self, order_id: OrderId) -> Result<CanceledOrder> {
        let mut matcher = self.matcher.write();
        let canceled = matcher.cancel(order_id)?;
        self.publish(&matcher);
        Ok(canceled)
    }

    /// Adjust a level's aggregate directly. See
    /// [`MatchingEngine::adjust_level`].
    pub fn adjust_level(&self, side: Side, price: Decimal, delta: Decimal) -> Result<BookUpdate> {
        let mut matcher = self.matcher.write();
        let update = matcher.adjust_level(side, price, delta)?;
        self.publish(&matcher);
        Ok(update)
    }

    /// Process a single command and return output events.
    ///
    /// This is the uniform entry point for replay: failures become
    /// `OutputEvent::Rejected` instead of errors.
    pub fn process_command(&self, cmd: Command) -> Vec<OutputEvent> {
        match cmd {
            Command::Submit(request) => match self.execute(request) {
                Ok(exec) => {
                    let mut events: Vec<_> =
                        exec.trades.into_iter().map(OutputEvent::Trade).collect();
                    if exec.resting_qty > Decimal::ZERO {
                        events.push(OutputEvent::Accepted(OrderAccepted {
                            order_id: exec.order_id,
                            side: exec.side,
                            price: request.price,
                            quantity: exec.resting_qty,
                        }));
                    }
                    events
                }
                Err(e) => vec![OutputEvent::Rejected(e.to_string())],
            },
            Command::Cancel(cancel) => match self.cancel(cancel.order_id) {
                Ok(canceled) => vec![OutputEvent::Canceled(canceled)],
                Err(e) => vec![OutputEvent::Rejected(e.to_string())],
            },
            Command::AdjustLevel(adjust) => {
                match self.adjust_level(adjust.side, adjust.price, adjust.delta) {
                    Ok(update) => vec![OutputEvent::BookDelta(update)],
                    Err(e) => vec![OutputEvent::Rejected(e.to_string())],
                }
            }
        }
    }

    /// Register the trade hook. Fails if one is already registered.
    pub fn set_trade_listener(&self, listener: TradeListener) -> Result<()> {
        self.matcher.write().set_listener(listener)
    }

    /// Replace the trade timestamp source
    pub fn set_clock(&self, clock: Clock) {
        self.matcher.write().set_clock(clock);
    }

    /// Called with the write guard held, so published views are ordered
    /// exactly like the mutations that produced them.
    fn publish(&self, matcher: &MatchingEngine) {
        if self.config.read_consistency == ReadConsistency::Published {
            *self.published.write() = matcher.market_data_view(self.config.published_depth);
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Best bid and offer. An empty side is `Quote::EMPTY`.
    pub fn best_bid_offer(&self) -> TopOfBook {
        match self.config.read_consistency {
            ReadConsistency::Strict => self.matcher.read().top_of_book(),
            ReadConsistency::Published => self.published.read().bbo,
        }
    }

    /// Top `depth` levels per side, stamped with the current time
    pub fn snapshot(&self, depth: usize) -> BookSnapshot {
        let now = Utc::now();
        match self.config.read_consistency {
            ReadConsistency::Strict => self.matcher.read().snapshot(depth, now),
            ReadConsistency::Published => {
                self.published.read().snapshot(&self.config.symbol, depth, now)
            }
        }
    }

    /// Get the spread
    #[inline]
    pub fn spread(&self) -> Option<Decimal> {
        self.best_bid_offer().spread()
    }

    /// Look up a resting order
    pub fn order(&self, order_id: OrderId) -> Option<RestingOrder> {
        self.matcher.read().order(order_id)
    }

    /// Copy of the trade log, oldest first
    pub fn trades(&self) -> Vec<Trade> {
        self.matcher.read().trades().to_vec()
    }

    pub fn trade_count(&self) -> usize {
        self.matcher.read().trade_count()
    }

    /// Get total order count.
    pub fn order_count(&self) -> usize {
        self.matcher.read().order_count()
    }

    #[inline]
    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Structural invariant violations, empty when the book is sound
    pub fn audit(&self) -> Vec<String> {
        self.matcher.read().audit()
    }

    /// Compute state hash for determinism testing.
    pub fn state_hash(&self) -> u64 {
        self.matcher.read().state_hash()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::build(EngineConfig::default())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("symbol", &self.config.symbol)
            .field("read_consistency", &self.config.read_consistency)
            .finish()
    }
}
