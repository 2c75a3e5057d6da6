//! Proximity labeling of a price against the retained level tiers

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::registry::{LevelKind, SrLevel};
use crate::config::PriceBand;

/// Label of a price relative to the current tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProximityLabel {
    /// Not at any retained level
    No,
    /// At the support tier with this rank (1 = strongest)
    Support(u8),
    /// At the resistance tier with this rank
    Resistance(u8),
}

impl std::fmt::Display for ProximityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProximityLabel::No => write!(f, "No"),
            ProximityLabel::Support(tier) => write!(f, "S{}", tier),
            ProximityLabel::Resistance(tier) => write!(f, "R{}", tier),
        }
    }
}

impl FromStr for ProximityLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "No" {
            return Ok(ProximityLabel::No);
        }
        if s.len() < 2 || !s.is_char_boundary(1) {
            return Err(format!("malformed proximity label: {s}"));
        }
        let (kind, tier) = s.split_at(1);
        let tier: u8 = tier
            .parse()
            .map_err(|_| format!("malformed proximity label: {s}"))?;
        match kind {
            "S" => Ok(ProximityLabel::Support(tier)),
            "R" => Ok(ProximityLabel::Resistance(tier)),
            _ => Err(format!("malformed proximity label: {s}")),
        }
    }
}

/// Classify a price against a point-in-time level snapshot
///
/// A price is "at" a level when it sits within `touch_tolerance` of the level
/// price. When several levels qualify the lowest tier number wins; among
/// equal tiers the nearest level wins. Pure function: labeling historical
/// candles against the snapshot taken at their own time cannot see swings
/// that formed later.
pub fn classify(price: f64, levels: &[SrLevel], touch_tolerance: PriceBand) -> ProximityLabel {
    levels
        .iter()
        .filter_map(|level| {
            let distance = (price - level.price).abs();
            (distance <= touch_tolerance.width_at(level.price)).then_some((level, distance))
        })
        .min_by(|(a, da), (b, db)| {
            a.tier
                .cmp(&b.tier)
                .then(da.partial_cmp(db).unwrap_or(std::cmp::Ordering::Equal))
        })
        .map(|(level, _)| match level.kind {
            LevelKind::Support => ProximityLabel::Support(level.tier),
            LevelKind::Resistance => ProximityLabel::Resistance(level.tier),
        })
        .unwrap_or(ProximityLabel::No)
}
