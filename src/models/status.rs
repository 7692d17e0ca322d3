//! Balance status classification.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fraction of capacity at or below which a balance counts as low.
pub const DEFAULT_LOW_THRESHOLD: Decimal = Decimal::from_parts(1, 0, 0, false, 1); // 0.1

/// Three-state balance status used by both contract-line and modality views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BalanceStatus {
    Available,
    Low,
    Depleted,
}

impl BalanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Low => "LOW",
            Self::Depleted => "DEPLETED",
        }
    }

    /// Parse a status filter value as supplied on the query surface.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "AVAILABLE" => Some(Self::Available),
            "LOW" => Some(Self::Low),
            "DEPLETED" => Some(Self::Depleted),
            _ => None,
        }
    }
}

impl std::fmt::Display for BalanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classify a balance with the default 10% low-water threshold.
pub fn classify(capacity: Decimal, consumed: Decimal) -> BalanceStatus {
    classify_with_threshold(capacity, consumed, DEFAULT_LOW_THRESHOLD)
}

/// Classify a balance against an explicit low-water threshold fraction.
///
/// `capacity` is the contracted quantity for a line or the initial quantity
/// for a modality allocation. Depleted wins over low when available is zero
/// or negative.
pub fn classify_with_threshold(
    capacity: Decimal,
    consumed: Decimal,
    threshold: Decimal,
) -> BalanceStatus {
    let available = capacity - consumed;
    if available <= Decimal::ZERO {
        BalanceStatus::Depleted
    } else if available <= capacity * threshold {
        BalanceStatus::Low
    } else {
        BalanceStatus::Available
    }
}
