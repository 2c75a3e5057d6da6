//! Long position management
//!
//! A position starts stop-loss managed. The first close above the midpoint
//! of its captured low-high-low range switches it to trailing take-profit
//! management; the switch never reverts, even if price falls back under the
//! midpoint. Tick evaluation order: stop-loss first while stop-managed, then
//! the midpoint switch, then peak update and trailing exit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lhl::LhlReference;

/// Management mode of an open position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TradeMode {
    /// Exit only on the fixed stop-loss price
    StopLossManaged,
    /// Exit only on the trailing take-profit from the post-switch peak
    TakeProfitManaged { peak_since_switch: f64 },
}

/// An open long position and its management context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub entry_price: f64,
    pub size: f64,
    pub opened_at: DateTime<Utc>,
    pub stop_loss_price: f64,
    pub mode: TradeMode,
    pub lhl: LhlReference,
}

/// What a tick asked the caller to do
///
/// Exits are detected, not applied: the caller closes the position at the
/// exchange and only then clears the machine, so a failed close leaves the
/// trigger armed for the next tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Nothing to do
    Hold,
    /// Crossed the pattern midpoint; now trailing from the given peak
    SwitchedToTakeProfit { peak: f64 },
    /// Stop-loss breached; close at market
    ExitStopLoss { price: f64 },
    /// Fell to the trailing exit under the peak; close at market
    ExitTakeProfit { price: f64, peak: f64 },
}

/// Name of the machine's current state, for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateLabel {
    Idle,
    StopLossManaged,
    TakeProfitManaged,
}

impl std::fmt::Display for StateLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateLabel::Idle => write!(f, "Idle"),
            StateLabel::StopLossManaged => write!(f, "StopLossManaged"),
            StateLabel::TakeProfitManaged => write!(f, "TakeProfitManaged"),
        }
    }
}

/// Point-in-time view of the machine for monitoring and logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub state: StateLabel,
    pub entry_price: Option<f64>,
    pub stop_loss_price: Option<f64>,
    pub peak_since_switch: Option<f64>,
}

/// State machine over at most one open long
#[derive(Debug)]
pub struct TradeStateMachine {
    take_profit_pct: f64,
    position: Option<Position>,
}

impl TradeStateMachine {
    pub fn new(take_profit_pct: f64) -> Self {
        Self {
            take_profit_pct,
            position: None,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    /// Install a freshly filled position. Panics if one is already open; the
    /// engine never enters while holding.
    pub fn open(&mut self, position: Position) {
        assert!(
            self.position.is_none(),
            "attempted to open a second position"
        );
        self.position = Some(position);
    }

    /// Remove and return the open position after a confirmed close
    pub fn close(&mut self) -> Option<Position> {
        self.position.take()
    }

    /// Advance the machine by one price tick
    pub fn on_tick(&mut self, price: f64) -> TickOutcome {
        let Some(position) = self.position.as_mut() else {
            return TickOutcome::Hold;
        };

        let mut just_switched = false;
        if let TradeMode::StopLossManaged = position.mode {
            if price <= position.stop_loss_price {
                return TickOutcome::ExitStopLoss { price };
            }
            if price > position.lhl.midpoint() {
                position.mode = TradeMode::TakeProfitManaged {
                    peak_since_switch: price,
                };
                just_switched = true;
            }
        }

        if let TradeMode::TakeProfitManaged { peak_since_switch } = &mut position.mode {
            *peak_since_switch = peak_since_switch.max(price);
            let peak = *peak_since_switch;
            let take_profit_price = peak * (1.0 - self.take_profit_pct);
            if price <= take_profit_price {
                return TickOutcome::ExitTakeProfit { price, peak };
            }
            if just_switched {
                return TickOutcome::SwitchedToTakeProfit { peak };
            }
        }

        TickOutcome::Hold
    }

    pub fn snapshot(&self) -> PositionSnapshot {
        match &self.position {
            None => PositionSnapshot {
                state: StateLabel::Idle,
                entry_price: None,
                stop_loss_price: None,
                peak_since_switch: None,
            },
            Some(position) => {
                let (state, peak) = match position.mode {
                    TradeMode::StopLossManaged => (StateLabel::StopLossManaged, None),
                    TradeMode::TakeProfitManaged { peak_since_switch } => {
                        (StateLabel::TakeProfitManaged, Some(peak_since_switch))
                    }
                };
                PositionSnapshot {
                    state,
                    entry_price: Some(position.entry_price),
                    stop_loss_price: Some(position.stop_loss_price),
                    peak_since_switch: peak,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference(low: f64, high: f64) -> LhlReference {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        LhlReference {
            low1_price: low,
            low1_time: ts,
            high_price: high,
            high_time: ts + chrono::Duration::minutes(5),
            low2_price: low + 0.2,
            low2_time: ts + chrono::Duration::minutes(10),
        }
    }

    fn open_machine(entry: f64, stop: f64, lhl: LhlReference, tp_pct: f64) -> TradeStateMachine {
        let mut machine = TradeStateMachine::new(tp_pct);
        machine.open(Position {
            symbol: "BTC/USDT".to_string(),
            entry_price: entry,
            size: 1.0,
            opened_at: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            stop_loss_price: stop,
            mode: TradeMode::StopLossManaged,
            lhl,
        });
        machine
    }

    #[test]
    fn stop_loss_exit_before_any_switch() {
        // Entry at 95 with stop at 93; price drops straight to 92
        let mut machine = open_machine(95.0, 93.0, reference(90.0, 100.0), 0.05);
        assert_eq!(machine.on_tick(94.0), TickOutcome::Hold);
        assert_eq!(
            machine.on_tick(92.0),
            TickOutcome::ExitStopLoss { price: 92.0 }
        );
        // Peak was never set
        assert_eq!(machine.snapshot().peak_since_switch, None);
        let closed = machine.close().unwrap();
        assert!(matches!(closed.mode, TradeMode::StopLossManaged));
        assert!(machine.is_flat());
    }

    #[test]
    fn midpoint_switch_then_trailing_exit() {
        // Pattern low 90 / high 100 -> midpoint 95; tp_pct 5%
        let mut machine = open_machine(95.0, 93.0, reference(90.0, 100.0), 0.05);

        assert_eq!(
            machine.on_tick(96.0),
            TickOutcome::SwitchedToTakeProfit { peak: 96.0 }
        );
        assert_eq!(machine.on_tick(100.0), TickOutcome::Hold);
        assert_eq!(machine.snapshot().peak_since_switch, Some(100.0));

        // Trailing exit at peak * 0.95 = 95; a drop to 94 closes
        assert_eq!(
            machine.on_tick(94.0),
            TickOutcome::ExitTakeProfit {
                price: 94.0,
                peak: 100.0
            }
        );
    }

    #[test]
    fn switch_is_one_way() {
        let mut machine = open_machine(95.0, 80.0, reference(90.0, 100.0), 0.10);
        machine.on_tick(96.0);
        assert_eq!(machine.snapshot().state, StateLabel::TakeProfitManaged);

        // Back under the midpoint, even under the old stop: still take-profit
        // managed, and the old stop price no longer exits
        assert_eq!(machine.on_tick(94.0), TickOutcome::Hold);
        assert_eq!(machine.snapshot().state, StateLabel::TakeProfitManaged);
    }

    #[test]
    fn stop_loss_wins_when_already_breached_at_tick() {
        // Stop at 93 and midpoint 95: a tick at 92 is below both checks;
        // the stop fires before the switch is ever evaluated
        let mut machine = open_machine(95.0, 93.0, reference(90.0, 100.0), 0.05);
        assert_eq!(
            machine.on_tick(92.0),
            TickOutcome::ExitStopLoss { price: 92.0 }
        );
    }

    #[test]
    fn failed_close_leaves_trigger_armed() {
        let mut machine = open_machine(95.0, 93.0, reference(90.0, 100.0), 0.05);
        assert_eq!(
            machine.on_tick(92.0),
            TickOutcome::ExitStopLoss { price: 92.0 }
        );
        // Caller could not close; machine unchanged, next tick re-fires
        assert!(!machine.is_flat());
        assert_eq!(
            machine.on_tick(91.5),
            TickOutcome::ExitStopLoss { price: 91.5 }
        );
    }

    #[test]
    fn idle_machine_holds() {
        let mut machine = TradeStateMachine::new(0.05);
        assert_eq!(machine.on_tick(100.0), TickOutcome::Hold);
        assert_eq!(machine.snapshot().state, StateLabel::Idle);
    }
}
