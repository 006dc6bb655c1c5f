//! Command and Event types for the matching engine.
//!
//! Commands are inputs from the API layer (or a replay file).
//! Events are outputs to trade and market data consumers.

use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Engine-assigned order identifier
pub type OrderId = u64;

/// Engine-assigned trade identifier
pub type TradeId = u64;

/// Order side
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    /// Buy side (bids)
    Buy,
    /// Sell side (asks)
    Sell,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim();
        if token.eq_ignore_ascii_case("BUY") {
            Ok(Side::Buy)
        } else if token.eq_ignore_ascii_case("SELL") {
            Ok(Side::Sell)
        } else {
            Err(EngineError::UnknownSide(s.to_string()))
        }
    }
}

/// Order lifetime semantics
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Rests in the book until matched
    Limit,
    /// Consumes liquidity at any price, never rests
    Market,
    /// Immediate-or-cancel: price-bounded, remainder discarded
    Ioc,
    /// Fill-or-kill: price-bounded, all or nothing
    Fok,
}

impl OrderType {
    /// Whether the order's price participates in matching
    #[inline]
    pub const fn is_priced(self) -> bool {
        !matches!(self, OrderType::Market)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
            OrderType::Ioc => "IOC",
            OrderType::Fok => "FOK",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim();
        [OrderType::Limit, OrderType::Market, OrderType::Ioc, OrderType::Fok]
            .into_iter()
            .find(|t| token.eq_ignore_ascii_case(t.as_str()))
            .ok_or_else(|| EngineError::UnknownOrderType(s.to_string()))
    }
}

/// Liquidity role of one side of a trade
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Resting order that provided liquidity
    Maker,
    /// Incoming order that removed liquidity
    Taker,
}

// ============================================================================
// Input Commands
// ============================================================================

/// A validated-on-submit order request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Order side
    pub side: Side,
    /// Lifetime semantics
    pub order_type: OrderType,
    /// Limit price (ignored for MARKET)
    pub price: Decimal,
    /// Requested quantity
    pub quantity: Decimal,
}

impl OrderRequest {
    pub fn new(side: Side, order_type: OrderType, price: Decimal, quantity: Decimal) -> Self {
        Self {
            side,
            order_type,
            price,
            quantity,
        }
    }

    /// Limit order
    pub fn limit(side: Side, price: Decimal, quantity: Decimal) -> Self {
        Self::new(side, OrderType::Limit, price, quantity)
    }

    /// Market order (price is ignored)
    pub fn market(side: Side, quantity: Decimal) -> Self {
        Self::new(side, OrderType::Market, Decimal::ZERO, quantity)
    }

    /// Immediate-or-cancel order
    pub fn ioc(side: Side, price: Decimal, quantity: Decimal) -> Self {
        Self::new(side, OrderType::Ioc, price, quantity)
    }

    /// Fill-or-kill order
    pub fn fok(side: Side, price: Decimal, quantity: Decimal) -> Self {
        Self::new(side, OrderType::Fok, price, quantity)
    }

    /// Build a request from raw textual tokens, as received from an API layer.
    ///
    /// Side and type tokens are matched case-insensitively; anything else
    /// is rejected rather than defaulted.
    pub fn parse(price: &str, quantity: &str, side: &str, order_type: &str) -> Result<Self> {
        let request = Self {
            side: side.parse()?,
            order_type: order_type.parse()?,
            price: parse_decimal("price", price)?,
            quantity: parse_decimal("quantity", quantity)?,
        };
        request.validate()?;
        Ok(request)
    }

    /// Build a request from floating-point inputs, rejecting NaN and infinities.
    pub fn from_f64(price: f64, quantity: f64, side: Side, order_type: OrderType) -> Result<Self> {
        let request = Self {
            side,
            order_type,
            price: decimal_from_f64("price", price)?,
            quantity: decimal_from_f64("quantity", quantity)?,
        };
        request.validate()?;
        Ok(request)
    }

    /// Reject non-positive quantity, and non-positive price for priced types.
    pub fn validate(&self) -> Result<()> {
        if self.quantity <= Decimal::ZERO {
            return Err(EngineError::InvalidQuantity(self.quantity));
        }
        if self.order_type.is_priced() && self.price <= Decimal::ZERO {
            return Err(EngineError::InvalidPrice(self.price));
        }
        Ok(())
    }
}

/// Parse a decimal token, naming the field in the error
pub fn parse_decimal(field: &'static str, token: &str) -> Result<Decimal> {
    Decimal::from_str(token.trim()).map_err(|_| EngineError::MalformedNumber {
        field,
        token: token.to_string(),
    })
}

/// Checked conversion from `f64`; NaN, infinities and out-of-range values fail.
pub fn decimal_from_f64(field: &'static str, value: f64) -> Result<Decimal> {
    if !value.is_finite() {
        return Err(EngineError::NonFinite { field, value });
    }
    Decimal::from_f64(value)
        .map(|d| d.normalize())
        .ok_or(EngineError::NonFinite { field, value })
}

/// Cancel a resting order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    /// Order ID to cancel
    pub order_id: OrderId,
}

/// Administrative adjustment of a level's aggregate quantity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustLevel {
    /// Which side to adjust
    pub side: Side,
    /// Level price
    pub price: Decimal,
    /// Signed quantity change
    pub delta: Decimal,
}

/// Input commands
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Submit a new order
    Submit(OrderRequest),
    /// Cancel a resting order
    Cancel(CancelOrder),
    /// Adjust a level's aggregate directly
    AdjustLevel(AdjustLevel),
}

// ============================================================================
// Output Events
// ============================================================================

/// An executed trade. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Monotonic trade id
    pub trade_id: TradeId,
    /// Instrument symbol
    pub symbol: String,
    /// Execution price (the maker's price)
    pub price: Decimal,
    /// Executed quantity
    pub quantity: Decimal,
    /// Microseconds since the Unix epoch (UTC)
    pub timestamp_us: i64,
    /// Maker (passive) order ID
    pub maker_order_id: OrderId,
    /// Taker (aggressive) order ID
    pub taker_order_id: OrderId,
    /// Side of the taker
    pub aggressor_side: Side,
    /// Fee charged to the maker
    pub maker_fee: Decimal,
    /// Fee charged to the taker
    pub taker_fee: Decimal,
}

impl Trade {
    /// Price times quantity
    #[inline]
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }
}

/// Order was accepted and (partly) resting in the book
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAccepted {
    pub order_id: OrderId,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Order was canceled
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanceledOrder {
    pub order_id: OrderId,
    pub side: Side,
    pub price: Decimal,
    /// Remaining quantity that was canceled
    pub canceled_qty: Decimal,
}

/// Point-in-time view of a resting order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestingOrder {
    pub order_id: OrderId,
    pub side: Side,
    pub price: Decimal,
    /// Quantity still open
    pub remaining: Decimal,
}

/// Level aggregate after an administrative adjustment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookUpdate {
    /// Which side changed
    pub side: Side,
    /// Price level that changed
    pub price: Decimal,
    /// New aggregate quantity at this price (0 = level removed)
    pub new_qty: Decimal,
}

/// Output events from the engine
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum OutputEvent {
    /// Trade executed
    Trade(Trade),
    /// Order accepted and resting
    Accepted(OrderAccepted),
    /// Order canceled
    Canceled(CanceledOrder),
    /// Level aggregate changed by an adjustment
    BookDelta(BookUpdate),
    /// Command rejected
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_parse_tokens() {
        assert_eq!("BUY".parse::<Side>(), Ok(Side::Buy));
        assert_eq!("sell".parse::<Side>(), Ok(Side::Sell));
        assert_eq!("IOC".parse::<OrderType>(), Ok(OrderType::Ioc));
        assert_eq!("fok".parse::<OrderType>(), Ok(OrderType::Fok));
        assert_eq!(
            "HOLD".parse::<Side>(),
            Err(EngineError::UnknownSide("HOLD".into()))
        );
        assert_eq!(
            "STOP".parse::<OrderType>(),
            Err(EngineError::UnknownOrderType("STOP".into()))
        );
    }

    #[test]
    fn test_parse_request() {
        let req = OrderRequest::parse("100.5", "10", "buy", "limit").unwrap();
        assert_eq!(req.side, Side::Buy);
        assert_eq!(req.order_type, OrderType::Limit);
        assert_eq!(req.price, Decimal::new(1005, 1));
        assert_eq!(req.quantity, Decimal::from(10));

        assert!(matches!(
            OrderRequest::parse("abc", "10", "BUY", "LIMIT"),
            Err(EngineError::MalformedNumber { field: "price", .. })
        ));
    }

    #[test]
    fn test_validation() {
        let zero_qty = OrderRequest::limit(Side::Buy, Decimal::from(100), Decimal::ZERO);
        assert_eq!(zero_qty.validate(), Err(EngineError::InvalidQuantity(Decimal::ZERO)));

        let neg_price = OrderRequest::ioc(Side::Sell, Decimal::from(-1), Decimal::ONE);
        assert_eq!(neg_price.validate(), Err(EngineError::InvalidPrice(Decimal::from(-1))));

        // Market orders ignore price
        let market = OrderRequest::market(Side::Buy, Decimal::ONE);
        assert_eq!(market.validate(), Ok(()));
    }

    #[test]
    fn test_from_f64_rejects_non_finite() {
        assert!(matches!(
            OrderRequest::from_f64(f64::NAN, 1.0, Side::Buy, OrderType::Limit),
            Err(EngineError::NonFinite { field: "price", .. })
        ));
        assert!(matches!(
            OrderRequest::from_f64(100.0, f64::INFINITY, Side::Buy, OrderType::Limit),
            Err(EngineError::NonFinite { field: "quantity", .. })
        ));

        let req = OrderRequest::from_f64(100.25, 2.0, Side::Sell, OrderType::Fok).unwrap();
        assert_eq!(req.price, Decimal::new(10025, 2));
        assert_eq!(req.quantity, Decimal::from(2));
    }
}
