//! Loyalty tiers

use serde::{Deserialize, Serialize};
use std::fmt;

pub const SILVER_THRESHOLD: i64 = 200;
pub const GOLD_THRESHOLD: i64 = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LoyaltyTier { Bronze, Silver, Gold }

impl LoyaltyTier {
    pub fn for_points(points: i64) -> Self {
        if points >= GOLD_THRESHOLD { Self::Gold }
        else if points >= SILVER_THRESHOLD { Self::Silver }
        else { Self::Bronze }
    }

    /// Points needed to reach the next tier; `None` at Gold.
    pub fn next_threshold(&self) -> Option<i64> {
        match self {
            Self::Bronze => Some(SILVER_THRESHOLD),
            Self::Silver => Some(GOLD_THRESHOLD),
            Self::Gold => None,
        }
    }

    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Bronze => Some(Self::Silver),
            Self::Silver => Some(Self::Gold),
            Self::Gold => None,
        }
    }
}

impl fmt::Display for LoyaltyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { Self::Bronze => "Bronze", Self::Silver => "Silver", Self::Gold => "Gold" })
    }
}

/// Tier standing for progress display.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LoyaltyProgress {
    pub points: i64,
    pub tier: LoyaltyTier,
    pub next_tier: Option<LoyaltyTier>,
    pub next_threshold: Option<i64>,
    pub points_to_next: Option<i64>,
    /// `min(100, points / next_threshold * 100)`; 100 at Gold.
    pub percent: f64,
}

impl LoyaltyProgress {
    pub fn for_points(points: i64) -> Self {
        let points = points.max(0);
        let tier = LoyaltyTier::for_points(points);
        let next_threshold = tier.next_threshold();
        let percent = match next_threshold {
            Some(threshold) => (points as f64 / threshold as f64 * 100.0).min(100.0),
            None => 100.0,
        };
        Self {
            points,
            tier,
            next_tier: tier.next(),
            next_threshold,
            points_to_next: next_threshold.map(|t| t - points),
            percent,
        }
    }
}
