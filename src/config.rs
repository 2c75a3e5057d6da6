//! Strategy configuration

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::StrategyError;

/// A price distance expressed either in absolute quote units or as a
/// fraction of the reference price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PriceBand {
    /// Fixed distance in quote currency (e.g. 1.0 = one dollar)
    Absolute(f64),
    /// Fraction of the reference price (e.g. 0.005 = 0.5%)
    Percent(f64),
}

impl PriceBand {
    /// Width of the band at the given reference price
    pub fn width_at(&self, price: f64) -> f64 {
        match self {
            PriceBand::Absolute(points) => *points,
            PriceBand::Percent(fraction) => price.abs() * fraction,
        }
    }

    fn value(&self) -> f64 {
        match self {
            PriceBand::Absolute(v) | PriceBand::Percent(v) => *v,
        }
    }

    fn same_units(&self, other: &PriceBand) -> bool {
        matches!(
            (self, other),
            (PriceBand::Absolute(_), PriceBand::Absolute(_))
                | (PriceBand::Percent(_), PriceBand::Percent(_))
        )
    }
}

/// What to do with an open position when the bot is asked to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum ShutdownPolicy {
    /// Close the open position at market before exiting
    Flatten,
    /// Write the open position to disk and resume it on next start
    Persist,
}

/// Configuration for the S/R engine and trade management
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Symbol to trade (e.g. "BTC/USDT")
    pub symbol: String,
    /// Rolling candle window size (older candles are dropped)
    pub window_capacity: usize,
    /// Candles on each side of a swing extreme (half-width of the neighborhood)
    pub swing_half_width: usize,
    /// Maximum support tiers and maximum resistance tiers retained
    pub max_levels_per_side: usize,
    /// New swings within this band of an existing level merge into it
    pub proximity_band: PriceBand,
    /// Price counts as "at" a level within this distance
    pub touch_tolerance: PriceBand,
    /// Entry fires when price sits this close above a support tier
    pub entry_proximity: PriceBand,
    /// Two lows count as the same pattern level within this distance
    pub lhl_low_tolerance: PriceBand,
    /// Margin committed per trade in quote currency
    pub trade_margin_usdt: f64,
    /// Leverage applied to the margin
    pub leverage: u32,
    /// Loss in quote currency at which the stop-loss price is set
    pub stop_loss_usdt: f64,
    /// Trailing exit distance as a fraction of the post-switch peak
    pub take_profit_pct: f64,
    /// Behavior on shutdown with an open position
    pub shutdown: ShutdownPolicy,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            symbol: "BTC/USDT".to_string(),
            window_capacity: 1000,
            swing_half_width: 10,
            max_levels_per_side: 10,
            proximity_band: PriceBand::Percent(0.005),
            touch_tolerance: PriceBand::Percent(0.003),
            entry_proximity: PriceBand::Percent(0.005),
            lhl_low_tolerance: PriceBand::Percent(0.005),
            trade_margin_usdt: 10.0,
            leverage: 10,
            stop_loss_usdt: 1.5,
            take_profit_pct: 0.05,
            shutdown: ShutdownPolicy::Flatten,
        }
    }
}

impl StrategyConfig {
    /// Validate the configuration, failing fast before any candle is processed
    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.swing_half_width == 0 {
            return Err(StrategyError::ConfigurationInvariant(
                "swing_half_width must be at least 1".to_string(),
            ));
        }
        if self.window_capacity <= 2 * self.swing_half_width {
            return Err(StrategyError::ConfigurationInvariant(format!(
                "window_capacity {} leaves no classifiable candles at half-width {}",
                self.window_capacity, self.swing_half_width
            )));
        }
        if !self.touch_tolerance.same_units(&self.proximity_band) {
            return Err(StrategyError::ConfigurationInvariant(
                "touch_tolerance and proximity_band must use the same units".to_string(),
            ));
        }
        if self.touch_tolerance.value() > self.proximity_band.value() {
            return Err(StrategyError::ConfigurationInvariant(format!(
                "touch_tolerance {:?} exceeds proximity_band {:?}",
                self.touch_tolerance, self.proximity_band
            )));
        }
        if self.max_levels_per_side == 0 {
            return Err(StrategyError::ConfigurationInvariant(
                "max_levels_per_side must be at least 1".to_string(),
            ));
        }
        if self.leverage == 0 {
            return Err(StrategyError::ConfigurationInvariant(
                "leverage must be at least 1".to_string(),
            ));
        }
        if self.trade_margin_usdt <= 0.0 || self.stop_loss_usdt <= 0.0 {
            return Err(StrategyError::ConfigurationInvariant(
                "trade_margin_usdt and stop_loss_usdt must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.take_profit_pct) || self.take_profit_pct == 0.0 {
            return Err(StrategyError::ConfigurationInvariant(format!(
                "take_profit_pct {} must be in (0, 1)",
                self.take_profit_pct
            )));
        }
        Ok(())
    }

    /// Position size in base currency for an entry at the given price
    pub fn position_size(&self, entry_price: f64) -> f64 {
        self.trade_margin_usdt * self.leverage as f64 / entry_price
    }

    /// Stop price at which the position loses exactly `stop_loss_usdt`
    pub fn stop_loss_price(&self, entry_price: f64) -> f64 {
        let size = self.position_size(entry_price);
        entry_price - self.stop_loss_usdt / size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(StrategyConfig::default().validate().is_ok());
    }

    #[test]
    fn touch_tolerance_wider_than_proximity_band_is_rejected() {
        let config = StrategyConfig {
            proximity_band: PriceBand::Percent(0.002),
            touch_tolerance: PriceBand::Percent(0.005),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(StrategyError::ConfigurationInvariant(_))
        ));
    }

    #[test]
    fn mixed_band_units_are_rejected() {
        let config = StrategyConfig {
            proximity_band: PriceBand::Percent(0.005),
            touch_tolerance: PriceBand::Absolute(0.1),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn stop_loss_price_loses_configured_amount() {
        let config = StrategyConfig {
            trade_margin_usdt: 10.0,
            leverage: 10,
            stop_loss_usdt: 1.5,
            ..Default::default()
        };
        let entry = 100.0;
        let size = config.position_size(entry);
        let stop = config.stop_loss_price(entry);
        let loss = (entry - stop) * size;
        assert!((loss - 1.5).abs() < 1e-9);
        assert!(stop < entry);
    }

    #[test]
    fn band_width_scales_with_price_only_for_percent() {
        assert_eq!(PriceBand::Absolute(0.5).width_at(20_000.0), 0.5);
        assert!((PriceBand::Percent(0.01).width_at(200.0) - 2.0).abs() < 1e-12);
    }
}
