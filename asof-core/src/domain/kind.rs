//! Cache kinds and which entity classes they apply to.

use super::entity::EntityClass;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// A category of cached data with its own refresh policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CacheKind {
    #[serde(rename = "prices")]
    PriceSeries,
    #[serde(rename = "financials")]
    Financials,
    #[serde(rename = "share_capital")]
    ShareCapital,
    #[serde(rename = "disclosures")]
    Disclosures,
    #[serde(rename = "security_list")]
    SecurityList,
}

impl CacheKind {
    pub const ALL: [CacheKind; 5] = [
        CacheKind::PriceSeries,
        CacheKind::Financials,
        CacheKind::ShareCapital,
        CacheKind::Disclosures,
        CacheKind::SecurityList,
    ];

    /// Kinds that make up a prepared dataset, in assembly order.
    pub const BUNDLE_KINDS: [CacheKind; 4] = [
        CacheKind::PriceSeries,
        CacheKind::Financials,
        CacheKind::ShareCapital,
        CacheKind::Disclosures,
    ];

    pub fn id(self) -> &'static str {
        match self {
            CacheKind::PriceSeries => "prices",
            CacheKind::Financials => "financials",
            CacheKind::ShareCapital => "share_capital",
            CacheKind::Disclosures => "disclosures",
            CacheKind::SecurityList => "security_list",
        }
    }

    /// Whether an entity of `class` carries this kind at all.
    pub fn applies_to(self, class: EntityClass) -> bool {
        match self {
            CacheKind::PriceSeries => true,
            CacheKind::Financials | CacheKind::ShareCapital | CacheKind::Disclosures => {
                class == EntityClass::Equity
            }
            CacheKind::SecurityList => false,
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for CacheKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        CacheKind::ALL
            .into_iter()
            .find(|k| k.id() == wanted)
            .ok_or(ConfigError::UnknownKindName(wanted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_from_str() {
        for kind in CacheKind::ALL {
            assert_eq!(kind.id().parse::<CacheKind>().unwrap(), kind);
        }
        assert!("quotes".parse::<CacheKind>().is_err());
    }

    #[test]
    fn price_only_classes() {
        assert!(CacheKind::PriceSeries.applies_to(EntityClass::Index));
        assert!(!CacheKind::Financials.applies_to(EntityClass::Etf));
        assert!(CacheKind::Disclosures.applies_to(EntityClass::Equity));
        assert!(!CacheKind::SecurityList.applies_to(EntityClass::Equity));
    }

    #[test]
    fn serde_uses_ids() {
        let json = serde_json::to_string(&CacheKind::PriceSeries).unwrap();
        assert_eq!(json, "\"prices\"");
    }
}
