//! Inline instrument symbols
//!
//! Symbols are stored inline as up to 10 ASCII bytes, so a `Symbol` is
//! `Copy` and ticks never allocate on the ingest path.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Instrument symbol (1..=10 printable ASCII bytes)
///
/// Field order matters: the zero-padded bytes come first so the derived
/// `Ord` is lexicographic on the symbol text.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol {
    bytes: [u8; Symbol::MAX_LEN],
    len: u8,
}

/// Reasons a symbol name is refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    #[error("symbol is empty")]
    Empty,
    #[error("symbol is {0} bytes long, max is {max}", max = Symbol::MAX_LEN)]
    TooLong(usize),
    #[error("symbol contains non-printable or non-ASCII byte 0x{0:02x}")]
    InvalidByte(u8),
}

impl Symbol {
    /// Widest symbol the backing store accepts (`VARCHAR(10)`)
    pub const MAX_LEN: usize = 10;

    /// Parse from raw bytes, `None` if the name is not a valid symbol
    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Self::try_from_bytes(bytes).ok()
    }

    fn try_from_bytes(bytes: &[u8]) -> Result<Self, SymbolError> {
        if bytes.is_empty() {
            return Err(SymbolError::Empty);
        }
        if bytes.len() > Self::MAX_LEN {
            return Err(SymbolError::TooLong(bytes.len()));
        }
        if let Some(&bad) = bytes.iter().find(|b| !b.is_ascii_graphic()) {
            return Err(SymbolError::InvalidByte(bad));
        }

        let mut inline = [0u8; Self::MAX_LEN];
        inline[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            bytes: inline,
            len: bytes.len() as u8,
        })
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        // Construction only admits ASCII, so this never falls back.
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or_default()
    }

    #[inline(always)]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    /// Always false; kept for clippy's `len_without_is_empty`
    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl FromStr for Symbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from_bytes(s.as_bytes())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
