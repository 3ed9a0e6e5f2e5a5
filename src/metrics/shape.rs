//! Compact price-shape descriptor
//!
//! Layout of the 8 components:
//!
//! | idx | feature                                              | range    |
//! |-----|------------------------------------------------------|----------|
//! | 0   | trend sign, last vs first close                      | {-1, +1} |
//! | 1   | tanh(total % change * 10)                            | (-1, 1)  |
//! | 2   | annualized return volatility / 50% ceiling, capped   | [0, 1]   |
//! | 3   | position of the maximum, index / (n - 1)             | [0, 1]   |
//! | 4   | position of the minimum, index / (n - 1)             | [0, 1]   |
//! | 5-7 | tanh(% change * 10) of the head, middle, tail thirds | (-1, 1)  |
//!
//! Directional components are tanh-compressed so a single violent move can not
//! dominate the cosine similarity between two descriptors.

use super::helpers::{cosine_similarity, pct_change, std_dev, unit_remap};

pub const SHAPE_DIM: usize = 8;

/// Shortest sequence the descriptor is defined for
pub const MIN_SHAPE_LEN: usize = 6;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const VOLATILITY_CEILING: f64 = 0.5;
const CHANGE_GAIN: f64 = 10.0;

/// 8-dimensional shape descriptor
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ShapeFeatures(pub [f64; SHAPE_DIM]);

impl ShapeFeatures {
    /// +1.0 for a rising window, -1.0 for a falling one
    #[inline]
    pub fn trend_sign(&self) -> f64 {
        self.0[0]
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Cosine similarity remapped to [0, 1]
    pub fn similarity(&self, other: &ShapeFeatures) -> f64 {
        unit_remap(cosine_similarity(&self.0, &other.0))
    }
}

/// Extract the descriptor, or `None` for fewer than [`MIN_SHAPE_LEN`] points
/// or non-finite prices
pub fn extract_shape_features(prices: &[f64]) -> Option<ShapeFeatures> {
    let n = prices.len();
    if n < MIN_SHAPE_LEN || prices.iter().any(|p| !p.is_finite()) {
        return None;
    }

    let first = prices[0];
    let last = prices[n - 1];
    let trend_sign = if last >= first { 1.0 } else { -1.0 };
    let total_change = (pct_change(first, last) * CHANGE_GAIN).tanh();

    let returns: Vec<f64> = prices.windows(2).map(|w| pct_change(w[0], w[1])).collect();
    let volatility = std_dev(&returns).unwrap_or(0.0) * TRADING_DAYS_PER_YEAR.sqrt();
    let volatility = (volatility / VOLATILITY_CEILING).min(1.0);

    let span = (n - 1) as f64;
    let max_pos = position_of(prices, |candidate, best| candidate > best) as f64 / span;
    let min_pos = position_of(prices, |candidate, best| candidate < best) as f64 / span;

    let third = n / 3;
    let segment_change = |seg: &[f64]| (pct_change(seg[0], seg[seg.len() - 1]) * CHANGE_GAIN).tanh();
    let head = segment_change(&prices[..third]);
    let middle = segment_change(&prices[third..2 * third]);
    let tail = segment_change(&prices[2 * third..]);

    Some(ShapeFeatures([
        trend_sign,
        total_change,
        volatility,
        max_pos,
        min_pos,
        head,
        middle,
        tail,
    ]))
}

/// Index of the first element that wins every `better` comparison
fn position_of(prices: &[f64], better: impl Fn(f64, f64) -> bool) -> usize {
    let mut best = 0;
    for (i, &p) in prices.iter().enumerate().skip(1) {
        if better(p, prices[best]) {
            best = i;
        }
    }
    best
}
