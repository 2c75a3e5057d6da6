//! Tiered support/resistance level registry
//!
//! Swing lows feed support levels, swing highs feed resistance levels. A new
//! swing within the proximity band of an existing level of the same kind
//! merges into it (touch count up, last touch refreshed) instead of opening a
//! new tier. Levels rank by touch count first, recency second; the top
//! `max_per_side` of each kind survive as tiers S1..Sn / R1..Rn.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::swing::{SwingKind, SwingPoint};
use crate::config::PriceBand;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelKind {
    Support,
    Resistance,
}

impl std::fmt::Display for LevelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LevelKind::Support => write!(f, "Support"),
            LevelKind::Resistance => write!(f, "Resistance"),
        }
    }
}

/// A retained support or resistance level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrLevel {
    pub price: f64,
    pub kind: LevelKind,
    /// 1 = strongest tier of its kind
    pub tier: u8,
    /// Timestamp of the swing that first formed the level
    pub formed_at: DateTime<Utc>,
    /// Timestamp of the most recent swing merged into the level
    pub last_touched_at: DateTime<Utc>,
    pub touch_count: u32,
}

impl SrLevel {
    /// Tier label in the "S1".."S10" / "R1".."R10" form
    pub fn tier_label(&self) -> String {
        match self.kind {
            LevelKind::Support => format!("S{}", self.tier),
            LevelKind::Resistance => format!("R{}", self.tier),
        }
    }
}

/// Single-writer registry of tiered levels
///
/// `update` is idempotent: swings already ingested (keyed by timestamp and
/// kind) are skipped, so re-running detection over an unchanged window is a
/// no-op.
#[derive(Debug)]
pub struct LevelRegistry {
    supports: Vec<SrLevel>,
    resistances: Vec<SrLevel>,
    proximity_band: PriceBand,
    max_per_side: usize,
    ingested: HashSet<(i64, SwingKind)>,
}

impl LevelRegistry {
    pub fn new(proximity_band: PriceBand, max_per_side: usize) -> Self {
        Self {
            supports: Vec::new(),
            resistances: Vec::new(),
            proximity_band,
            max_per_side,
            ingested: HashSet::new(),
        }
    }

    /// Ingest newly detected swing points and re-rank the tiers
    pub fn update(&mut self, swings: &[SwingPoint]) {
        let mut changed = false;

        for swing in swings {
            let key = (swing.timestamp.timestamp_millis(), swing.kind);
            if !self.ingested.insert(key) {
                continue;
            }
            changed = true;

            let kind = match swing.kind {
                SwingKind::Low => LevelKind::Support,
                SwingKind::High => LevelKind::Resistance,
            };
            let band = self.proximity_band;
            let levels = self.side_mut(kind);

            match levels
                .iter_mut()
                .find(|l| (l.price - swing.price).abs() <= band.width_at(l.price))
            {
                Some(level) => {
                    level.touch_count += 1;
                    if swing.timestamp > level.last_touched_at {
                        level.last_touched_at = swing.timestamp;
                    }
                }
                None => levels.push(SrLevel {
                    price: swing.price,
                    kind,
                    tier: 0,
                    formed_at: swing.timestamp,
                    last_touched_at: swing.timestamp,
                    touch_count: 1,
                }),
            }
        }

        if changed {
            self.rerank();
        }
    }

    fn side_mut(&mut self, kind: LevelKind) -> &mut Vec<SrLevel> {
        match kind {
            LevelKind::Support => &mut self.supports,
            LevelKind::Resistance => &mut self.resistances,
        }
    }

    /// Rank by touch count, then recency; evict below `max_per_side`
    fn rerank(&mut self) {
        for levels in [&mut self.supports, &mut self.resistances] {
            levels.sort_by(|a, b| {
                b.touch_count
                    .cmp(&a.touch_count)
                    .then(b.last_touched_at.cmp(&a.last_touched_at))
            });
            levels.truncate(self.max_per_side);
            for (i, level) in levels.iter_mut().enumerate() {
                level.tier = (i + 1) as u8;
            }
        }
    }

    /// Point-in-time copy of all retained levels, supports first, tier order
    pub fn snapshot(&self) -> Vec<SrLevel> {
        let mut out = Vec::with_capacity(self.supports.len() + self.resistances.len());
        out.extend(self.supports.iter().cloned());
        out.extend(self.resistances.iter().cloned());
        out
    }

    pub fn support_count(&self) -> usize {
        self.supports.len()
    }

    pub fn resistance_count(&self) -> usize {
        self.resistances.len()
    }
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

    fn registry() -> LevelRegistry {
        LevelRegistry::new(PriceBand::Absolute(1.0), 10)
    }

    #[test]
    fn swings_within_band_merge_instead_of_tiering() {
        let mut reg = registry();
        reg.update(&[
            swing(0, 100.0, SwingKind::Low),
            swing(2, 95.0, SwingKind::Low),
            swing(4, 90.0, SwingKind::Low),
        ]);
        assert_eq!(reg.support_count(), 3);

        // A later low at 95.2 sits inside the 1.0 band of the 95 level
        reg.update(&[swing(6, 95.2, SwingKind::Low)]);
        assert_eq!(reg.support_count(), 3);

        let snapshot = reg.snapshot();
        let merged = snapshot
            .iter()
            .find(|l| l.price == 95.0)
            .expect("95 level retained");
        assert_eq!(merged.touch_count, 2);
        // Two touches outrank the single-touch levels
        assert_eq!(merged.tier, 1);
    }

    #[test]
    fn update_is_idempotent() {
        let mut reg = registry();
        let swings = vec![
            swing(0, 100.0, SwingKind::Low),
            swing(2, 110.0, SwingKind::High),
        ];
        reg.update(&swings);
        let first = reg.snapshot();

        reg.update(&swings);
        let second = reg.snapshot();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.price, b.price);
            assert_eq!(a.tier, b.tier);
            assert_eq!(a.touch_count, b.touch_count);
        }
    }

    #[test]
    fn never_retains_more_than_max_per_side() {
        let mut reg = LevelRegistry::new(PriceBand::Absolute(0.1), 10);
        let swings: Vec<_> = (0..25)
            .map(|i| swing(i, 100.0 + i as f64 * 10.0, SwingKind::Low))
            .collect();
        reg.update(&swings);
        assert_eq!(reg.support_count(), 10);
        assert_eq!(reg.resistance_count(), 0);
    }

    #[test]
    fn recency_breaks_touch_count_ties() {
        let mut reg = registry();
        reg.update(&[
            swing(0, 100.0, SwingKind::High),
            swing(5, 120.0, SwingKind::High),
        ]);
        let snapshot = reg.snapshot();
        let r1 = snapshot.iter().find(|l| l.tier == 1).unwrap();
        assert_eq!(r1.price, 120.0);
        assert_eq!(r1.kind, LevelKind::Resistance);
    }

    #[test]
    fn eviction_drops_lowest_ranked_levels() {
        let mut reg = LevelRegistry::new(PriceBand::Absolute(0.1), 2);
        reg.update(&[
            swing(0, 100.0, SwingKind::Low),
            swing(2, 200.0, SwingKind::Low),
            swing(4, 100.05, SwingKind::Low), // second touch of 100
            swing(6, 300.0, SwingKind::Low),
        ]);
        let snapshot = reg.snapshot();
        assert_eq!(snapshot.len(), 2);
        // 100 has two touches -> S1; 300 is the most recent single touch -> S2
        assert_eq!(snapshot[0].price, 100.0);
        assert_eq!(snapshot[0].tier, 1);
        assert_eq!(snapshot[1].price, 300.0);
        assert_eq!(snapshot[1].tier, 2);
    }
}
