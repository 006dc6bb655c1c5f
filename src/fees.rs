//! Maker/taker fee schedule.
//!
//! Fees are a pure function of the liquidity role and the trade notional
//! (price × quantity). They are attached to each trade and never netted
//! against any balance.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::command::Role;
use crate::error::{EngineError, Result};

/// Proportional fee rates per liquidity role.
///
/// Rates are fractions of notional: `0.001` is 10 bps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Rate charged to the resting side
    pub maker_rate: Decimal,
    /// Rate charged to the incoming side
    pub taker_rate: Decimal,
}

impl FeeSchedule {
    /// Create a validated fee schedule.
    ///
    /// # Errors
    /// `EngineError::InvalidFeeSchedule` unless `taker_rate > maker_rate`
    /// and `taker_rate >= 0`.
    pub fn new(maker_rate: Decimal, taker_rate: Decimal) -> Result<Self> {
        let schedule = Self {
            maker_rate,
            taker_rate,
        };
        schedule.validate()?;
        Ok(schedule)
    }

    pub fn validate(&self) -> Result<()> {
        if self.taker_rate <= self.maker_rate || self.taker_rate.is_sign_negative() {
            return Err(EngineError::InvalidFeeSchedule {
                maker: self.maker_rate,
                taker: self.taker_rate,
            });
        }
        Ok(())
    }

    /// Rate applied to a given role
    #[inline]
    pub fn rate(&self, role: Role) -> Decimal {
        match role {
            Role::Maker => self.maker_rate,
            Role::Taker => self.taker_rate,
        }
    }

    /// Fee for a trade of the given notional, `None` on overflow
    #[inline]
    pub fn fee(&self, role: Role, notional: Decimal) -> Option<Decimal> {
        notional.checked_mul(self.rate(role))
    }

    /// (maker fee, taker fee) for a fill of `quantity` at `price`.
    ///
    /// # Errors
    /// `EngineError::Overflow` if the notional or either fee falls outside
    /// the decimal range.
    #[inline]
    pub fn fees_for(&self, price: Decimal, quantity: Decimal) -> Result<(Decimal, Decimal)> {
        let notional = price
            .checked_mul(quantity)
            .ok_or(EngineError::Overflow("notional"))?;
        let maker = self.fee(Role::Maker, notional).ok_or(EngineError::Overflow("maker fee"))?;
        let taker = self.fee(Role::Taker, notional).ok_or(EngineError::Overflow("taker fee"))?;
        Ok((maker, taker))
    }
}

impl Default for FeeSchedule {
    /// 10 bps maker, 20 bps taker
    fn default() -> Self {
        Self {
            maker_rate: Decimal::new(1, 3),
            taker_rate: Decimal::new(2, 3),
        }
    }
}
