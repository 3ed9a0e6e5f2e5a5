//! Triple-barrier outcome labeling
//!
//! A forward path starts at the entry close (offset 0) and is walked one
//! observation at a time from offset 1. The first offset whose return reaches
//! the profit barrier or the loss barrier decides the label; if neither is
//! touched by `max_hold` the path times out as neutral.
//!
//! ```text
//!            +-- r >= upper ---> HitUpper (+1)
//!   Open ----+-- r <= -lower --> HitLower (-1)
//!            +-- t == max_hold -> TimedOut ( 0)
//! ```

use chrono::NaiveDate;

use crate::config::SearchConfig;
use crate::history::PriceHistory;

/// Direction of a labeled outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Bullish,
    Neutral,
    Bearish,
}

impl Label {
    /// +1 / 0 / -1
    #[inline]
    pub fn value(self) -> i8 {
        match self {
            Label::Bullish => 1,
            Label::Neutral => 0,
            Label::Bearish => -1,
        }
    }
}

/// Which barrier ended the walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitType {
    Upper,
    Lower,
    Timeout,
}

/// Walk state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierState {
    Open,
    HitUpper { day: usize },
    HitLower { day: usize },
    TimedOut,
}

impl BarrierState {
    #[inline]
    pub fn is_open(self) -> bool {
        matches!(self, BarrierState::Open)
    }
}

/// Label of one forward path
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BarrierOutcome {
    pub label: Label,
    /// Triggering offset, or `max_hold` on timeout
    pub hit_day: usize,
    pub hit_type: HitType,
    /// Return at offset `max_hold`, whichever barrier fired
    pub final_return: f64,
}

/// Profit / loss / time barriers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TripleBarrier {
    pub upper: f64,
    pub lower: f64,
    pub max_hold: usize,
}

impl Default for TripleBarrier {
    fn default() -> Self {
        Self::from_config(&SearchConfig::default())
    }
}

impl TripleBarrier {
    pub fn new(upper: f64, lower: f64, max_hold: usize) -> Self {
        Self {
            upper,
            lower,
            max_hold,
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(config.tb_upper, config.tb_lower, config.tb_max_hold.get())
    }

    /// Advance an open walk by the return observed at offset `day`
    pub fn step(&self, state: BarrierState, day: usize, ret: f64) -> BarrierState {
        if !state.is_open() {
            return state;
        }
        if ret >= self.upper {
            BarrierState::HitUpper { day }
        } else if ret <= -self.lower {
            BarrierState::HitLower { day }
        } else if day >= self.max_hold {
            BarrierState::TimedOut
        } else {
            BarrierState::Open
        }
    }

    /// Label `path`, where `path[0]` is the entry close
    ///
    /// Returns `None` if the path holds fewer than `max_hold + 1` closes or
    /// the entry is not a positive price.
    pub fn label(&self, path: &[f64]) -> Option<BarrierOutcome> {
        if self.max_hold == 0 || path.len() <= self.max_hold {
            return None;
        }
        let entry = path[0];
        if !(entry > 0.0) || !entry.is_finite() {
            return None;
        }

        let ret = |t: usize| (path[t] - entry) / entry;

        let mut state = BarrierState::Open;
        for day in 1..=self.max_hold {
            state = self.step(state, day, ret(day));
            if !state.is_open() {
                break;
            }
        }

        let (label, hit_day, hit_type) = match state {
            BarrierState::HitUpper { day } => (Label::Bullish, day, HitType::Upper),
            BarrierState::HitLower { day } => (Label::Bearish, day, HitType::Lower),
            BarrierState::TimedOut | BarrierState::Open => {
                (Label::Neutral, self.max_hold, HitType::Timeout)
            }
        };

        let final_return = ret(self.max_hold);
        final_return.is_finite().then_some(BarrierOutcome {
            label,
            hit_day,
            hit_type,
            final_return,
        })
    }

    /// Label the path that starts at the last close on or before `date`
    pub fn label_at(&self, history: &PriceHistory, date: NaiveDate) -> Option<BarrierOutcome> {
        let start = history.position_on_or_before(date)?;
        let path = history.forward_closes(start, self.max_hold)?;
        self.label(&path)
    }
}
