//! Engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::fees::FeeSchedule;

/// How market-data reads relate to in-flight mutations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadConsistency {
    /// Reads share the book lock and always see a state between two
    /// complete intake calls.
    #[default]
    Strict,
    /// Reads see the view published at the end of the last mutation and
    /// never wait on matching. Depth is capped at `published_depth`.
    Published,
}

/// Configuration for one engine instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Instrument symbol stamped on trades and snapshots
    pub symbol: String,
    /// Maker/taker rates
    pub fees: FeeSchedule,
    pub read_consistency: ReadConsistency,
    /// Levels per side kept in the published view
    pub published_depth: usize,
    /// Arena slots pre-allocated for resting orders
    pub order_capacity: u32,
    /// First order id handed out
    pub first_order_id: u64,
    /// First trade id handed out
    pub first_trade_id: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: "BTC-USD".to_string(),
            fees: FeeSchedule::default(),
            read_consistency: ReadConsistency::Strict,
            published_depth: 20,
            order_capacity: 4096,
            first_order_id: 1,
            first_trade_id: 1,
        }
    }
}

impl EngineConfig {
    /// Default configuration for `symbol`
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    pub fn with_fees(mut self, fees: FeeSchedule) -> Self {
        self.fees = fees;
        self
    }

    pub fn with_read_consistency(mut self, read_consistency: ReadConsistency) -> Self {
        self.read_consistency = read_consistency;
        self
    }

    pub fn with_published_depth(mut self, depth: usize) -> Self {
        self.published_depth = depth;
        self
    }

    /// Seed both id sequences
    pub fn with_first_ids(mut self, order_id: u64, trade_id: u64) -> Self {
        self.first_order_id = order_id;
        self.first_trade_id = trade_id;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(EngineError::Config("symbol must not be empty".into()));
        }
        if self.order_capacity == u32::MAX {
            return Err(EngineError::Config("order_capacity out of range".into()));
        }
        self.fees.validate()
    }

    /// Parse and validate a JSON document
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }
}
