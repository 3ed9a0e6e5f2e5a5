//! Win-rate statistics over labeled matches
//!
//! Definitions (labels come from [`TripleBarrier`](crate::labeler::TripleBarrier)):
//!
//! - `win_rate = bullish / total`, neutral outcomes count in the denominator
//! - `win_loss_ratio = bullish / max(bearish, 1)`
//! - `avg_return_pct = mean(final_return * 100)`
//! - `avg_holding_days = mean(hit_day)`
//!
//! Every field is zero when nothing could be labeled.

use crate::labeler::{BarrierOutcome, Label};

#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WinRateStats {
    pub total: usize,
    pub bullish: usize,
    pub neutral: usize,
    pub bearish: usize,
    pub win_rate: f64,
    pub win_loss_ratio: f64,
    pub avg_return_pct: f64,
    pub avg_holding_days: f64,
}

impl WinRateStats {
    pub fn from_outcomes<'a, I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = &'a BarrierOutcome>,
    {
        let mut stats = Self::default();
        let mut return_sum = 0.0;
        let mut hold_sum = 0usize;

        for o in outcomes {
            stats.total += 1;
            match o.label {
                Label::Bullish => stats.bullish += 1,
                Label::Neutral => stats.neutral += 1,
                Label::Bearish => stats.bearish += 1,
            }
            return_sum += o.final_return * 100.0;
            hold_sum += o.hit_day;
        }

        if stats.total == 0 {
            return stats;
        }

        let total = stats.total as f64;
        stats.win_rate = stats.bullish as f64 / total;
        stats.win_loss_ratio = stats.bullish as f64 / stats.bearish.max(1) as f64;
        stats.avg_return_pct = return_sum / total;
        stats.avg_holding_days = hold_sum as f64 / total;
        stats
    }
}
