//! The clearance lattice: four canonical tiers with a strict total order.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "INTERNAL")]
    Internal,
    #[serde(rename = "CONFIDENTIAL")]
    Confidential,
    #[serde(rename = "RESTRICTED")]
    Restricted,
    #[serde(rename = "TOP-SECRET")]
    TopSecret,
}

impl Tier {
    pub const ALL: [Tier; 4] = [
        Tier::Internal,
        Tier::Confidential,
        Tier::Restricted,
        Tier::TopSecret,
    ];

    /// Numeric level used for dominance comparisons, 1 (lowest) to 4 (highest).
    pub fn level(self) -> u8 {
        match self {
            Tier::Internal => 1,
            Tier::Confidential => 2,
            Tier::Restricted => 3,
            Tier::TopSecret => 4,
        }
    }

    pub fn canonical_name(self) -> &'static str {
        match self {
            Tier::Internal => "INTERNAL",
            Tier::Confidential => "CONFIDENTIAL",
            Tier::Restricted => "RESTRICTED",
            Tier::TopSecret => "TOP-SECRET",
        }
    }

    /// Parses a tier name, accepting both canonical names and the
    /// deprecated legacy spellings. Legacy names never persist past
    /// ingress.
    pub fn parse(raw: &str) -> Option<Tier> {
        let normalized = raw.trim().to_ascii_uppercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "INTERNAL" | "UNCLASSIFIED" => Some(Tier::Internal),
            "CONFIDENTIAL" => Some(Tier::Confidential),
            "RESTRICTED" | "SECRET" => Some(Tier::Restricted),
            "TOP-SECRET" | "TOPSECRET" => Some(Tier::TopSecret),
            _ => None,
        }
    }

    /// `self` dominates `other` iff `level(self) >= level(other)`.
    pub fn dominates(self, other: Tier) -> bool {
        self.level() >= other.level()
    }

    /// All tiers dominated by `self`, i.e. `{ t : level(t) <= level(self) }`.
    pub fn dominated_tiers(self) -> impl Iterator<Item = Tier> {
        Tier::ALL.into_iter().filter(move |t| self.dominates(*t))
    }

    pub fn max(self, other: Tier) -> Tier {
        if self.dominates(other) {
            self
        } else {
            other
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

impl PartialOrd for Tier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.level().cmp(&other.level())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_order() {
        assert!(Tier::TopSecret.dominates(Tier::Internal));
        assert!(Tier::Restricted.dominates(Tier::Restricted));
        assert!(!Tier::Internal.dominates(Tier::Confidential));
    }

    #[test]
    fn legacy_names_map_to_canonical() {
        assert_eq!(Tier::parse("UNCLASSIFIED"), Some(Tier::Internal));
        assert_eq!(Tier::parse("SECRET"), Some(Tier::Restricted));
        assert_eq!(Tier::parse("TOP_SECRET"), Some(Tier::TopSecret));
        assert_eq!(Tier::parse("unknown"), None);
    }

    #[test]
    fn dominated_tiers_set() {
        let dominated: Vec<Tier> = Tier::Restricted.dominated_tiers().collect();
        assert_eq!(dominated, vec![Tier::Internal, Tier::Confidential, Tier::Restricted]);
    }

    #[test]
    fn max_picks_higher() {
        assert_eq!(Tier::Internal.max(Tier::Confidential), Tier::Confidential);
    }
}
