//! Market source: the flat `country,postal_code` input file
//!
//! Lines are trimmed; blank lines and `#` comments are skipped. Country codes
//! are upper-cased and postal codes normalized per country before
//! de-duplication, so `usa,90210-1234` and `USA,90210` are the same market.

use std::collections::HashSet;
use std::path::Path;

use tracing::debug;

use crate::app::models::Market;
use crate::errors::{MarketResult, MarketSourceError};

/// Read and parse a markets file
pub async fn load_markets(path: &Path) -> MarketResult<Vec<Market>> {
    if !path.exists() {
        return Err(MarketSourceError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| MarketSourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let markets = parse_markets(&content)?;
    if markets.is_empty() {
        return Err(MarketSourceError::Empty {
            path: path.to_path_buf(),
        });
    }

    debug!("Loaded {} markets from {}", markets.len(), path.display());
    Ok(markets)
}

/// Parse market lines, preserving first-occurrence order
pub fn parse_markets(content: &str) -> MarketResult<Vec<Market>> {
    let mut seen = HashSet::new();
    let mut markets = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let market = parse_market_line(line).ok_or_else(|| MarketSourceError::InvalidFormat {
            line: index + 1,
            content: line.to_string(),
        })?;

        if seen.insert(market.clone()) {
            markets.push(market);
        }
    }

    Ok(markets)
}

fn parse_market_line(line: &str) -> Option<Market> {
    let mut fields = line.split(',').map(str::trim);
    let country = fields.next().filter(|f| !f.is_empty())?.to_uppercase();
    let postal = fields.next().filter(|f| !f.is_empty())?;

    let normalized = normalize_postal_code(&country, postal);
    if normalized.is_empty() {
        return None;
    }
    Some(Market::new(country, normalized))
}

/// Normalize a postal code for its country
///
/// - `USA`: digits only, first five, zero-padded on the left
/// - `CAN`: forward sortation area (first three characters)
/// - `GBR`: outward code
/// - anything else is returned unchanged
pub fn normalize_postal_code(country: &str, postal_code: &str) -> String {
    match country {
        "USA" => {
            let digits: String = postal_code.chars().filter(char::is_ascii_digit).collect();
            if digits.is_empty() {
                return digits;
            }
            let mut zip: String = digits.chars().take(5).collect();
            while zip.len() < 5 {
                zip.insert(0, '0');
            }
            zip
        }
        "CAN" => postal_code
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .flat_map(char::to_uppercase)
            .take(3)
            .collect(),
        "GBR" => gbr_outward_code(postal_code),
        _ => postal_code.to_string(),
    }
}

// The inward code of a UK postcode is always three characters.
fn gbr_outward_code(postal_code: &str) -> String {
    let upper = postal_code.to_uppercase();
    let mut parts = upper.split_whitespace();
    let first = parts.next().unwrap_or_default();
    let length = first.chars().count();

    if parts.next().is_some() || length <= 4 {
        return first.to_string();
    }
    first.chars().take(length - 3).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let content = "# markets\n\nUSA,90210\n  usa , 10001 \n# trailing comment\n";
        let markets = parse_markets(content).unwrap();
        assert_eq!(
            markets,
            vec![Market::new("USA", "90210"), Market::new("USA", "10001")]
        );
    }

    #[test]
    fn test_parse_deduplicates_after_normalization() {
        let content = "USA,90210\nUSA,90210-1234\nCAN,M5V 3L9\nCAN,m5v\n";
        let markets = parse_markets(content).unwrap();
        assert_eq!(
            markets,
            vec![Market::new("USA", "90210"), Market::new("CAN", "M5V")]
        );
    }

    #[test]
    fn test_invalid_line_reports_line_number() {
        let content = "USA,90210\n\nJUSTONEFIELD\n";
        match parse_markets(content) {
            Err(MarketSourceError::InvalidFormat { line, content }) => {
                assert_eq!(line, 3);
                assert_eq!(content, "JUSTONEFIELD");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        assert!(parse_markets("USA,\n").is_err());
        assert!(parse_markets(",90210\n").is_err());
    }

    #[test]
    fn test_normalize_postal_codes() {
        assert_eq!(normalize_postal_code("USA", "90210"), "90210");
        assert_eq!(normalize_postal_code("USA", "501"), "00501");
        assert_eq!(normalize_postal_code("USA", "90210-1234"), "90210");
        assert_eq!(normalize_postal_code("CAN", "m5v 3l9"), "M5V");
        assert_eq!(normalize_postal_code("CAN", "K1A-0B1"), "K1A");
        assert_eq!(normalize_postal_code("GBR", "SW1A 1AA"), "SW1A");
        assert_eq!(normalize_postal_code("GBR", "sw1a1aa"), "SW1A");
        assert_eq!(normalize_postal_code("GBR", "M11AE"), "M1");
        assert_eq!(normalize_postal_code("GBR", "EC1A"), "EC1A");
        assert_eq!(normalize_postal_code("DEU", "10115"), "10115");
    }

    #[tokio::test]
    async fn test_load_markets_errors() {
        let temp_dir = TempDir::new().unwrap();

        let missing = temp_dir.path().join("missing.csv");
        assert!(matches!(
            load_markets(&missing).await,
            Err(MarketSourceError::NotFound { .. })
        ));

        let empty = temp_dir.path().join("empty.csv");
        std::fs::write(&empty, "# nothing here\n\n").unwrap();
        assert!(matches!(
            load_markets(&empty).await,
            Err(MarketSourceError::Empty { .. })
        ));

        let good = temp_dir.path().join("markets.csv");
        std::fs::write(&good, "USA,90210\nGBR,SW1A 1AA\n").unwrap();
        let markets = load_markets(&good).await.unwrap();
        assert_eq!(markets.len(), 2);
        assert_eq!(markets[1], Market::new("GBR", "SW1A"));
    }
}
