//! Windowed dynamic time warping
//!
//! Both inputs are min-max normalized independently before alignment, so two
//! episodes at very different price levels compare on shape alone. The
//! alignment path is restricted to a Sakoe-Chiba band; when the sequences
//! differ in length the band is widened to `|n - m|` so the final cell stays
//! reachable.

use super::helpers::{distance_to_similarity, min_max_normalize};

/// Default band half-width
pub const DEFAULT_DTW_WINDOW: usize = 5;

/// Length-normalized DTW distance between `a` and `b`
///
/// Returns `+inf` if either sequence is empty. Cost is O(n * window) time and
/// O(m) memory (two rolling rows).
pub fn windowed_dtw(a: &[f64], b: &[f64], window: usize) -> f64 {
    if a.is_empty() || b.is_empty() {
        return f64::INFINITY;
    }

    let a = min_max_normalize(a);
    let b = min_max_normalize(b);
    let (n, m) = (a.len(), b.len());
    // A band wider than the longer sequence constrains nothing
    let band = window.max(n.abs_diff(m)).min(n.max(m));

    let mut prev = vec![f64::INFINITY; m + 1];
    let mut curr = vec![f64::INFINITY; m + 1];
    prev[0] = 0.0;

    for i in 1..=n {
        curr.fill(f64::INFINITY);
        let lo = i.saturating_sub(band).max(1);
        let hi = (i + band).min(m);

        for j in lo..=hi {
            let cost = (a[i - 1] - b[j - 1]).abs();
            let best = prev[j].min(curr[j - 1]).min(prev[j - 1]);
            curr[j] = cost + best;
        }

        std::mem::swap(&mut prev, &mut curr);
    }

    prev[m] / n.max(m) as f64
}

/// `max(0, 1 - windowed_dtw)`, or `None` when the distance is undefined
pub fn dtw_similarity(a: &[f64], b: &[f64], window: usize) -> Option<f64> {
    let distance = windowed_dtw(a, b, window);
    distance.is_finite().then(|| distance_to_similarity(distance))
}
