//! Core value types
//!
//! - Symbol: inline, `Copy` instrument name
//! - Tick: immutable price observation

pub mod symbol;
pub mod tick;

pub use symbol::{Symbol, SymbolError};
pub use tick::{now_millis, Tick};
