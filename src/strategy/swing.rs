//! Swing point detection
//!
//! A swing low is a candle whose low is strictly below every other low in a
//! symmetric neighborhood of `half_width` candles; swing highs mirror this on
//! the high series. Candles within `half_width` of either window edge have an
//! incomplete neighborhood and are never classified, so a freshly closed
//! candle cannot label itself a swing.
//!
//! Detection is recomputed from scratch on every window change. No
//! incremental state is kept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::candles::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwingKind {
    Low,
    High,
}

/// A detected local price extreme
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwingPoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub kind: SwingKind,
    /// Index of the originating candle within the window it was detected in
    pub source_index: usize,
}

/// Post-detection significance filter
///
/// Filters compose by AND: a candidate survives only if every installed
/// filter keeps it.
pub trait SwingFilter: Send + Sync {
    fn keep(&self, window: &[Candle], point: &SwingPoint) -> bool;
}

/// Keeps swings whose distance from the window's price midpoint is at least
/// `fraction` of the window's full price range
pub struct MinRetracement {
    pub fraction: f64,
}

impl SwingFilter for MinRetracement {
    fn keep(&self, window: &[Candle], point: &SwingPoint) -> bool {
        let lo = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let hi = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let range = hi - lo;
        if range <= 0.0 {
            return false;
        }
        let mid = lo + range / 2.0;
        (point.price - mid).abs() / range >= self.fraction
    }
}

/// Keeps swings whose candle volume is at or above the given percentile of
/// window volume
pub struct MinVolumePercentile {
    pub percentile: f64,
}

impl SwingFilter for MinVolumePercentile {
    fn keep(&self, window: &[Candle], point: &SwingPoint) -> bool {
        let mut volumes: Vec<f64> = window.iter().map(|c| c.volume).collect();
        volumes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let rank = ((volumes.len() - 1) as f64 * self.percentile).round() as usize;
        window[point.source_index].volume >= volumes[rank]
    }
}

/// Drops swings older than `max_candles` positions from the window's end
pub struct MaxAge {
    pub max_candles: usize,
}

impl SwingFilter for MaxAge {
    fn keep(&self, window: &[Candle], point: &SwingPoint) -> bool {
        window.len() - point.source_index <= self.max_candles
    }
}

/// Swing detector over a candle window
pub struct SwingDetector {
    half_width: usize,
    filters: Vec<Box<dyn SwingFilter>>,
}

impl SwingDetector {
    pub fn new(half_width: usize) -> Self {
        Self {
            half_width,
            filters: Vec::new(),
        }
    }

    /// Install an additional significance filter
    pub fn with_filter(mut self, filter: Box<dyn SwingFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Lazily yield all swing points of the window, in candle order
    ///
    /// Ties on the extreme value resolve to the earliest index: the earlier
    /// candle must be strictly better than everything before it and at least
    /// as good as everything after it.
    pub fn detect<'a>(&'a self, window: &'a [Candle]) -> impl Iterator<Item = SwingPoint> + 'a {
        let w = self.half_width;
        let interior = if window.len() > 2 * w {
            w..window.len() - w
        } else {
            0..0
        };

        interior.flat_map(move |i| {
            let mut found: Vec<SwingPoint> = Vec::with_capacity(2);
            if Self::is_extreme(window, i, w, SwingKind::Low) {
                found.push(SwingPoint {
                    timestamp: window[i].timestamp,
                    price: window[i].low,
                    kind: SwingKind::Low,
                    source_index: i,
                });
            }
            if Self::is_extreme(window, i, w, SwingKind::High) {
                found.push(SwingPoint {
                    timestamp: window[i].timestamp,
                    price: window[i].high,
                    kind: SwingKind::High,
                    source_index: i,
                });
            }
            found.retain(|p| self.filters.iter().all(|f| f.keep(window, p)));
            found
        })
    }

    fn is_extreme(window: &[Candle], i: usize, w: usize, kind: SwingKind) -> bool {
        let value = |idx: usize| match kind {
            SwingKind::Low => window[idx].low,
            SwingKind::High => window[idx].high,
        };
        let center = value(i);
        let better = |a: f64, b: f64| match kind {
            SwingKind::Low => a < b,
            SwingKind::High => a > b,
        };

        for j in i.saturating_sub(w)..=(i + w).min(window.len() - 1) {
            if j == i {
                continue;
            }
            let other = value(j);
            if better(other, center) {
                return false;
            }
            // Equal extreme: the earliest index claims the swing
            if other == center && j < i {
                return false;
            }
        }
        true
    }
}
