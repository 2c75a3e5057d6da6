//! Low-High-Low pattern capture
//!
//! The trade manager anchors an open long to the most recent completed
//! Low→High→Low swing triple preceding the entry: two lows at a similar
//! price with a higher peak between them. The midpoint of the pattern's
//! range is the price above which management switches from stop-loss to
//! trailing take-profit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::swing::{SwingKind, SwingPoint};
use crate::config::PriceBand;
use crate::error::StrategyError;

/// A captured Low→High→Low swing triple
///
/// Read-only once captured for a position; a new position captures a fresh
/// reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LhlReference {
    pub low1_price: f64,
    pub low1_time: DateTime<Utc>,
    pub high_price: f64,
    pub high_time: DateTime<Utc>,
    pub low2_price: f64,
    pub low2_time: DateTime<Utc>,
}

impl LhlReference {
    /// The lower of the two defining lows
    pub fn pattern_low(&self) -> f64 {
        self.low1_price.min(self.low2_price)
    }

    /// Halfway between the pattern low and the peak
    pub fn midpoint(&self) -> f64 {
        let low = self.pattern_low();
        low + (self.high_price - low) / 2.0
    }
}

/// Capture the latest completed triple from swing history strictly before
/// `before`
///
/// Swings must be in detection order. The two lows qualify when they sit
/// within `low_tolerance` of each other (measured at the higher low) and the
/// peak exceeds both.
pub fn latest_reference(
    swings: &[SwingPoint],
    before: DateTime<Utc>,
    low_tolerance: PriceBand,
) -> Result<LhlReference, StrategyError> {
    let prior: Vec<&SwingPoint> = swings.iter().filter(|s| s.timestamp < before).collect();

    for window in prior.windows(3).rev() {
        let (first, peak, second) = (window[0], window[1], window[2]);
        if first.kind != SwingKind::Low
            || peak.kind != SwingKind::High
            || second.kind != SwingKind::Low
        {
            continue;
        }
        if peak.price <= first.price || peak.price <= second.price {
            continue;
        }
        let reference_low = first.price.max(second.price);
        if (first.price - second.price).abs() > low_tolerance.width_at(reference_low) {
            continue;
        }
        return Ok(LhlReference {
            low1_price: first.price,
            low1_time: first.timestamp,
            high_price: peak.price,
            high_time: peak.timestamp,
            low2_price: second.price,
            low2_time: second.timestamp,
        });
    }

    Err(StrategyError::InsufficientHistory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn swing(i: i64, price: f64, kind: SwingKind) -> SwingPoint {
        SwingPoint {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + chrono::Duration::minutes(i * 5),
            price,
            kind,
            source_index: i as usize,
        }
    }

    fn at(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(i * 5)
    }

    #[test]
    fn captures_latest_triple_before_entry() {
        let swings = vec![
            swing(0, 90.0, SwingKind::Low),
            swing(2, 100.0, SwingKind::High),
            swing(4, 90.5, SwingKind::Low),
            swing(6, 98.0, SwingKind::High),
            swing(8, 91.0, SwingKind::Low),
        ];
        let reference = latest_reference(&swings, at(10), PriceBand::Percent(0.02)).unwrap();
        // Latest triple is (90.5, 98.0, 91.0)
        assert_eq!(reference.low1_price, 90.5);
        assert_eq!(reference.high_price, 98.0);
        assert_eq!(reference.low2_price, 91.0);
        assert_eq!(reference.pattern_low(), 90.5);
        assert!((reference.midpoint() - 94.25).abs() < 1e-9);
    }

    #[test]
    fn swings_at_or_after_entry_are_invisible() {
        let swings = vec![
            swing(0, 90.0, SwingKind::Low),
            swing(2, 100.0, SwingKind::High),
            swing(4, 90.5, SwingKind::Low),
        ];
        // Entry at the second low's own timestamp: triple not yet complete
        let result = latest_reference(&swings, at(4), PriceBand::Percent(0.02));
        assert!(matches!(result, Err(StrategyError::InsufficientHistory)));
    }

    #[test]
    fn lows_outside_tolerance_do_not_pair() {
        let swings = vec![
            swing(0, 80.0, SwingKind::Low),
            swing(2, 100.0, SwingKind::High),
            swing(4, 95.0, SwingKind::Low),
        ];
        let result = latest_reference(&swings, at(6), PriceBand::Percent(0.02));
        assert!(matches!(result, Err(StrategyError::InsufficientHistory)));
    }

    #[test]
    fn midpoint_uses_the_lower_low() {
        let reference = LhlReference {
            low1_price: 90.0,
            low1_time: at(0),
            high_price: 100.0,
            high_time: at(2),
            low2_price: 90.4,
            low2_time: at(4),
        };
        assert_eq!(reference.midpoint(), 95.0);
    }
}
