//! Price tick
//!
//! The immutable value flowing from producers through the buffer to the sink.

use super::Symbol;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// One price observation for a symbol at a timestamp
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    symbol: Symbol,
    price: f64,
    /// Epoch milliseconds
    timestamp: i64,
}

impl Tick {
    #[inline(always)]
    pub const fn new(symbol: Symbol, price: f64, timestamp: i64) -> Self {
        Self {
            symbol,
            price,
            timestamp,
        }
    }

    /// Tick stamped with the current wall clock
    #[inline]
    pub fn now(symbol: Symbol, price: f64) -> Self {
        Self::new(symbol, price, now_millis())
    }

    #[inline(always)]
    pub const fn symbol(&self) -> Symbol {
        self.symbol
    }

    #[inline(always)]
    pub const fn price(&self) -> f64 {
        self.price
    }

    #[inline(always)]
    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Only strictly positive prices get past ingestion. NaN fails too.
    #[inline(always)]
    pub fn is_admissible(&self) -> bool {
        self.price > 0.0
    }
}

/// Current wall clock in epoch milliseconds
#[inline]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
