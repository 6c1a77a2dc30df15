//! Entity identity: `CODE.SUFFIX` symbols normalized into a market, a code,
//! and an asset class.

use crate::error::EntityError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mainland fund codes that trade as ETFs/LOFs.
pub const ETF_CODE_PREFIXES: [&str; 6] = ["51", "58", "15", "16", "50", "53"];

/// Storage name used when sanitizing a display name leaves nothing.
pub const UNKNOWN_NAME: &str = "UNKNOWN";

/// Listing market, derived from the symbol suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Market {
    #[serde(rename = "CN_A")]
    CnA,
    #[serde(rename = "HK")]
    Hk,
    #[serde(rename = "US")]
    Us,
    #[serde(rename = "CN_INDEX")]
    CnIndex,
}

impl Market {
    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "SH" | "SZ" => Some(Market::CnA),
            "HK" => Some(Market::Hk),
            "US" => Some(Market::Us),
            "IDX" => Some(Market::CnIndex),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Market::CnA => "CN_A",
            Market::Hk => "HK",
            Market::Us => "US",
            Market::CnIndex => "CN_INDEX",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asset class. Decides which cache kinds apply to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityClass {
    Equity,
    Index,
    Etf,
}

impl EntityClass {
    /// Indices and ETFs have price history only.
    pub fn is_price_only(self) -> bool {
        matches!(self, EntityClass::Index | EntityClass::Etf)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityClass::Equity => "equity",
            EntityClass::Index => "index",
            EntityClass::Etf => "etf",
        }
    }
}

impl fmt::Display for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityClass {
    type Err = EntityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "equity" | "stock" => Ok(EntityClass::Equity),
            "index" => Ok(EntityClass::Index),
            "etf" | "fund" => Ok(EntityClass::Etf),
            other => Err(EntityError::UnknownClass(other.to_string())),
        }
    }
}

/// A normalized tradable entity.
///
/// Immutable once parsed; `with_name` and `with_class` return a new value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    market: Market,
    code: String,
    suffix: String,
    name: String,
    class: EntityClass,
}

impl EntityId {
    /// Parse `CODE.SUFFIX`. Whitespace is trimmed and case is normalized;
    /// Hong Kong codes are zero-padded to five digits.
    pub fn parse(symbol: &str) -> Result<Self, EntityError> {
        let trimmed = symbol.trim();
        if trimmed.is_empty() {
            return Err(EntityError::Empty);
        }
        let upper = trimmed.to_ascii_uppercase();
        let (raw_code, suffix) = upper
            .rsplit_once('.')
            .ok_or_else(|| EntityError::MissingSuffix {
                input: symbol.to_string(),
            })?;

        let market = Market::from_suffix(suffix).ok_or_else(|| EntityError::UnsupportedSuffix {
            input: symbol.to_string(),
            suffix: suffix.to_string(),
        })?;

        let raw_code = raw_code.trim();
        let valid = !raw_code.is_empty()
            && raw_code
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(EntityError::InvalidCode {
                input: symbol.to_string(),
            });
        }

        let code = match market {
            Market::Hk if raw_code.chars().all(|c| c.is_ascii_digit()) => {
                format!("{raw_code:0>5}")
            }
            _ => raw_code.to_string(),
        };

        let class = default_class(market, &code);
        let name = format!("{code}.{suffix}");

        Ok(Self {
            market,
            code,
            suffix: suffix.to_string(),
            name,
            class,
        })
    }

    /// Attach a display name. Blank names fall back to the symbol.
    pub fn with_name(mut self, name: &str) -> Self {
        let trimmed = name.trim();
        self.name = if trimmed.is_empty() {
            self.symbol()
        } else {
            trimmed.to_string()
        };
        self
    }

    /// Override the inferred asset class.
    pub fn with_class(mut self, class: EntityClass) -> Self {
        self.class = class;
        self
    }

    pub fn market(&self) -> Market {
        self.market
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> EntityClass {
        self.class
    }

    /// Canonical `CODE.SUFFIX` form.
    pub fn symbol(&self) -> String {
        format!("{}.{}", self.code, self.suffix)
    }

    /// Directory segment for per-entity storage: `{sanitized name}_{symbol}`.
    pub fn storage_segment(&self) -> String {
        format!("{}_{}", sanitize_name(&self.name), self.symbol())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.code, self.suffix)
    }
}

impl FromStr for EntityId {
    type Err = EntityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityId::parse(s)
    }
}

fn default_class(market: Market, code: &str) -> EntityClass {
    match market {
        Market::CnIndex => EntityClass::Index,
        Market::CnA if ETF_CODE_PREFIXES.iter().any(|p| code.starts_with(p)) => EntityClass::Etf,
        _ => EntityClass::Equity,
    }
}

/// Make a display name safe as a path segment.
///
/// Whitespace runs become `_`, reserved characters and control characters are
/// dropped, and leading/trailing dots and spaces are stripped.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_space = false;
    for c in name.trim().chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control() {
            continue;
        }
        out.push(c);
    }
    let cleaned = out.trim_matches(|c| c == '.' || c == ' ');
    if cleaned.is_empty() {
        UNKNOWN_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mainland_equity() {
        let e = EntityId::parse("600000.SH").unwrap();
        assert_eq!(e.market(), Market::CnA);
        assert_eq!(e.code(), "600000");
        assert_eq!(e.suffix(), "SH");
        assert_eq!(e.class(), EntityClass::Equity);
        assert_eq!(e.symbol(), "600000.SH");
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        let e = EntityId::parse("  000001.sz ").unwrap();
        assert_eq!(e.symbol(), "000001.SZ");
        assert_eq!(e.market(), Market::CnA);
    }

    #[test]
    fn etf_prefixes_classify_as_etf() {
        for sym in ["510300.SH", "588000.SH", "159915.SZ", "161725.SZ"] {
            assert_eq!(EntityId::parse(sym).unwrap().class(), EntityClass::Etf, "{sym}");
        }
        assert_eq!(EntityId::parse("600519.SH").unwrap().class(), EntityClass::Equity);
    }

    #[test]
    fn idx_suffix_is_index() {
        let e = EntityId::parse("000300.IDX").unwrap();
        assert_eq!(e.market(), Market::CnIndex);
        assert_eq!(e.class(), EntityClass::Index);
        assert!(e.class().is_price_only());
    }

    #[test]
    fn hk_codes_are_zero_padded() {
        let e = EntityId::parse("700.HK").unwrap();
        assert_eq!(e.code(), "00700");
        assert_eq!(e.symbol(), "00700.HK");
    }

    #[test]
    fn us_tickers_keep_letters() {
        let e = EntityId::parse("brk-b.us").unwrap();
        assert_eq!(e.code(), "BRK-B");
        assert_eq!(e.market(), Market::Us);
    }

    #[test]
    fn rejects_malformed_symbols() {
        assert_eq!(EntityId::parse("  "), Err(EntityError::Empty));
        assert!(matches!(
            EntityId::parse("600000"),
            Err(EntityError::MissingSuffix { .. })
        ));
        assert!(matches!(
            EntityId::parse("600000.XX"),
            Err(EntityError::UnsupportedSuffix { .. })
        ));
        assert!(matches!(
            EntityId::parse(".SH"),
            Err(EntityError::InvalidCode { .. })
        ));
        assert!(matches!(
            EntityId::parse("60/00.SH"),
            Err(EntityError::InvalidCode { .. })
        ));
    }

    #[test]
    fn class_override_and_name() {
        let e = EntityId::parse("000300.SH")
            .unwrap()
            .with_class(EntityClass::Index)
            .with_name("沪深300");
        assert_eq!(e.class(), EntityClass::Index);
        assert_eq!(e.storage_segment(), "沪深300_000300.SH");
    }

    #[test]
    fn name_defaults_to_symbol() {
        let e = EntityId::parse("700.hk").unwrap();
        assert_eq!(e.name(), "00700.HK");
        assert_eq!(e.storage_segment(), "00700.HK_00700.HK");

        let blank = EntityId::parse("600000.SH").unwrap().with_name("   ");
        assert_eq!(blank.name(), "600000.SH");
        assert_eq!(blank.storage_segment(), "600000.SH_600000.SH");

        // Only a name that sanitizes to nothing becomes UNKNOWN.
        let junk = EntityId::parse("600000.SH").unwrap().with_name("???");
        assert_eq!(junk.name(), "???");
        assert_eq!(junk.storage_segment(), "UNKNOWN_600000.SH");
    }

    #[test]
    fn sanitize_strips_reserved_characters() {
        assert_eq!(sanitize_name("Ping An  Bank"), "Ping_An_Bank");
        assert_eq!(sanitize_name("*ST/Foo:Bar?"), "STFooBar");
        assert_eq!(sanitize_name("..hidden.."), "hidden");
        assert_eq!(sanitize_name("\u{7}"), UNKNOWN_NAME);
        assert_eq!(sanitize_name(""), UNKNOWN_NAME);
    }

    #[test]
    fn class_from_str() {
        assert_eq!("ETF".parse::<EntityClass>().unwrap(), EntityClass::Etf);
        assert_eq!("index".parse::<EntityClass>().unwrap(), EntityClass::Index);
        assert!("bond".parse::<EntityClass>().is_err());
    }
}
