//! Market data projections: top of book and depth snapshots.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::command::Side;
use crate::order_book::OrderBook;

/// A (price, aggregate quantity) pair
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quote {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl Quote {
    /// Sentinel for an empty side
    pub const EMPTY: Quote = Quote {
        price: Decimal::ZERO,
        quantity: Decimal::ZERO,
    };

    #[inline]
    pub const fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }

    /// True for the empty-side sentinel.
    ///
    /// A present level always has a positive aggregate, so emptiness is a
    /// quantity test, never a price test.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.quantity.is_zero()
    }
}

impl From<(Decimal, Decimal)> for Quote {
    fn from((price, quantity): (Decimal, Decimal)) -> Self {
        Self { price, quantity }
    }
}

/// Best bid and offer. An empty side is `Quote::EMPTY`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopOfBook {
    pub bid: Quote,
    pub ask: Quote,
}

impl TopOfBook {
    pub fn from_book(book: &OrderBook) -> Self {
        Self {
            bid: book.best_bid().map(Quote::from).unwrap_or(Quote::EMPTY),
            ask: book.best_ask().map(Quote::from).unwrap_or(Quote::EMPTY),
        }
    }

    #[inline]
    pub fn best_bid(&self) -> Option<Quote> {
        Some(self.bid).filter(|q| !q.is_empty())
    }

    #[inline]
    pub fn best_ask(&self) -> Option<Quote> {
        Some(self.ask).filter(|q| !q.is_empty())
    }

    /// Quote for one side
    #[inline]
    pub fn side(&self, side: Side) -> Quote {
        match side {
            Side::Buy => self.bid,
            Side::Sell => self.ask,
        }
    }

    pub fn spread(&self) -> Option<Decimal> {
        Some(self.best_ask()?.price - self.best_bid()?.price)
    }

    /// (bid price, bid qty, ask price, ask qty)
    pub fn as_tuple(&self) -> (Decimal, Decimal, Decimal, Decimal) {
        (self.bid.price, self.bid.quantity, self.ask.price, self.ask.quantity)
    }
}

/// Depth snapshot record.
///
/// Serialized shape:
///
/// ```text
/// { "symbol": "BTC-USD",
///   "timestamp": "2024-05-01T12:00:00.123456Z",
///   "bbo": { "bid": {"price", "quantity"}, "ask": {"price", "quantity"} },
///   "bids": [ {"price", "quantity"}, ... ],   // best first
///   "asks": [ {"price", "quantity"}, ... ] }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub symbol: String,
    /// UTC, RFC 3339, six fractional digits
    pub timestamp: String,
    pub bbo: TopOfBook,
    pub bids: Vec<Quote>,
    pub asks: Vec<Quote>,
}

impl BookSnapshot {
    /// Capture the top `depth` levels per side of a live book
    pub fn capture(symbol: &str, book: &OrderBook, depth: usize, at: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            timestamp: format_timestamp(at),
            bbo: TopOfBook::from_book(book),
            bids: quotes(book, Side::Buy, depth),
            asks: quotes(book, Side::Sell, depth),
        }
    }
}

/// Market data published after each mutation, for readers that must not
/// wait on the book lock.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MarketDataView {
    pub bbo: TopOfBook,
    pub bids: Vec<Quote>,
    pub asks: Vec<Quote>,
}

impl MarketDataView {
    /// Capture BBO plus up to `depth` levels per side
    pub fn capture(book: &OrderBook, depth: usize) -> Self {
        Self {
            bbo: TopOfBook::from_book(book),
            bids: quotes(book, Side::Buy, depth),
            asks: quotes(book, Side::Sell, depth),
        }
    }

    /// Snapshot from the published view. Depth is capped at what was
    /// published.
    pub fn snapshot(&self, symbol: &str, depth: usize, at: DateTime<Utc>) -> BookSnapshot {
        BookSnapshot {
            symbol: symbol.to_string(),
            timestamp: format_timestamp(at),
            bbo: self.bbo,
            bids: self.bids.iter().take(depth).copied().collect(),
            asks: self.asks.iter().take(depth).copied().collect(),
        }
    }
}

fn quotes(book: &OrderBook, side: Side, depth: usize) -> Vec<Quote> {
    book.side(side)
        .depth(depth)
        .into_iter()
        .map(Quote::from)
        .collect()
}

/// RFC 3339 UTC with microsecond precision and a `Z` suffix
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
