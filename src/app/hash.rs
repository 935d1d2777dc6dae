//! Market-set identity hash
//!
//! A registry checkpoint is keyed by the MD5 of the sorted, deduplicated
//! market list so that different input files are tracked independently and
//! re-running the same file resumes it. The hash is stored as its raw 16
//! bytes and rendered as lowercase hex.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::app::models::Market;

/// Identity of an input market set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarketSetHash([u8; 16]);

/// Returned when a hex string is not a valid 32-character MD5
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid market-set hash: {0:?}")]
pub struct InvalidHash(pub String);

impl MarketSetHash {
    /// Hash a market list
    ///
    /// Order and duplicates in `markets` do not affect the result: the
    /// `COUNTRY,POSTAL` lines are sorted and deduplicated before hashing,
    /// each terminated by a newline.
    ///
    /// ```rust
    /// use lineup_builder::app::{Market, MarketSetHash};
    ///
    /// let a = MarketSetHash::from_markets(&[Market::new("USA", "90210"), Market::new("CAN", "M5V")]);
    /// let b = MarketSetHash::from_markets(&[Market::new("CAN", "M5V"), Market::new("USA", "90210")]);
    /// assert_eq!(a, b);
    /// ```
    pub fn from_markets(markets: &[Market]) -> Self {
        let mut lines: Vec<String> = markets.iter().map(Market::hash_line).collect();
        lines.sort();
        lines.dedup();

        let mut context = md5::Context::new();
        for line in &lines {
            context.consume(line.as_bytes());
            context.consume(b"\n");
        }
        MarketSetHash(context.compute().0)
    }

    /// Parse a 32-character hex string (case insensitive)
    pub fn from_hex(hex: &str) -> Result<Self, InvalidHash> {
        if hex.len() != 32 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(InvalidHash(hex.to_string()));
        }

        let mut bytes = [0u8; 16];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).map_err(|_| InvalidHash(hex.to_string()))?;
            bytes[i] = u8::from_str_radix(pair, 16).map_err(|_| InvalidHash(hex.to_string()))?;
        }
        Ok(MarketSetHash(bytes))
    }

    /// Lowercase 32-character hex representation
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// First 8 hex characters, used in archived checkpoint names
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(8);
        hex
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for MarketSetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for MarketSetHash {
    type Err = InvalidHash;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// Serialized as a hex string so it can key a JSON object
impl Serialize for MarketSetHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for MarketSetHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_matches_md5_of_sorted_lines() {
        let markets = vec![Market::new("USA", "90210"), Market::new("CAN", "M5V")];
        let expected = format!("{:x}", md5::compute(b"CAN,M5V\nUSA,90210\n"));

        let hash = MarketSetHash::from_markets(&markets);
        assert_eq!(hash.to_hex(), expected);
        assert_eq!(hash.to_hex().len(), 32);
    }

    #[test]
    fn test_duplicates_and_order_ignored() {
        let a = MarketSetHash::from_markets(&[
            Market::new("USA", "90210"),
            Market::new("USA", "10001"),
        ]);
        let b = MarketSetHash::from_markets(&[
            Market::new("USA", "10001"),
            Market::new("USA", "90210"),
            Market::new("USA", "10001"),
        ]);
        assert_eq!(a, b);

        let c = MarketSetHash::from_markets(&[Market::new("USA", "10001")]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_hex_round_trip_and_short() {
        let hex = "50c9d1c465f3cbff652be1509c2e2a4e";
        let hash: MarketSetHash = hex.to_uppercase().parse().unwrap();
        assert_eq!(hash.to_hex(), hex);
        assert_eq!(hash.short(), "50c9d1c4");
        assert_eq!(hash.as_bytes()[0], 0x50);
    }

    #[test]
    fn test_invalid_hex_rejected() {
        for bad in ["", "50c9d1c4", "50c9d1c465f3cbff652be1509c2e2a4g", "zz"] {
            assert!(MarketSetHash::from_hex(bad).is_err(), "should reject {bad:?}");
        }
    }

    #[test]
    fn test_serializes_as_string() {
        let hash = MarketSetHash::from_markets(&[Market::new("GBR", "SW1A")]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash));
        let back: MarketSetHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
