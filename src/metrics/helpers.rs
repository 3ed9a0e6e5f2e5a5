//! Numeric helpers shared by the distance metrics and the re-ranker
//!
//! Conventions: sequences are oldest-first closes, statistics use population
//! variance, and anything that would divide by a near-zero spread returns a
//! well-defined fallback instead of NaN.

/// Spreads below this are treated as zero
pub const EPS: f64 = 1e-12;

/// Arithmetic mean. Returns `None` for an empty slice.
#[inline]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation. Returns `None` for an empty slice.
#[inline]
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Rescale to [0, 1]. A flat sequence maps to all zeros.
pub fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;
    if !(range > EPS) {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - min) / range).collect()
}

/// Zero mean, unit variance. `None` for empty or zero-variance input.
pub fn z_normalize(values: &[f64]) -> Option<Vec<f64>> {
    let m = mean(values)?;
    let sd = std_dev(values)?;
    if !(sd > EPS) {
        return None;
    }
    Some(values.iter().map(|v| (v - m) / sd).collect())
}

/// Pearson correlation of the z-normalized sequences, in [-1, 1]
///
/// `None` when lengths differ, fewer than two points are given, or either
/// side has zero variance.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let za = z_normalize(a)?;
    let zb = z_normalize(b)?;

    let mut sab = 0.0;
    let mut saa = 0.0;
    let mut sbb = 0.0;
    for (x, y) in za.iter().zip(zb.iter()) {
        sab += x * y;
        saa += x * x;
        sbb += y * y;
    }
    let denom = (saa * sbb).sqrt();
    if !(denom > EPS) {
        return None;
    }
    let r = sab / denom;
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

/// Cosine similarity in [-1, 1]; zero when either vector has no length
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a < 1e-10 || norm_b < 1e-10 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Map a value in [-1, 1] onto [0, 1]
#[inline]
pub fn unit_remap(x: f64) -> f64 {
    ((x + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// `max(0, 1 - distance)`; an infinite or NaN distance is zero similarity
#[inline]
pub fn distance_to_similarity(distance: f64) -> f64 {
    if distance.is_nan() {
        return 0.0;
    }
    (1.0 - distance).max(0.0)
}

/// Fractional change from `from` to `to`, zero when `from` is ~0
#[inline]
pub fn pct_change(from: f64, to: f64) -> f64 {
    if from.abs() > EPS {
        (to - from) / from
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_max_normalize() {
        let n = min_max_normalize(&[10.0, 15.0, 20.0]);
        assert_eq!(n, vec![0.0, 0.5, 1.0]);
        assert_eq!(min_max_normalize(&[5.0, 5.0, 5.0]), vec![0.0; 3]);
        assert!(min_max_normalize(&[]).is_empty());
    }

    #[test]
    fn test_z_normalize() {
        let z = z_normalize(&[1.0, 2.0, 3.0]).unwrap();
        assert!((mean(&z).unwrap()).abs() < 1e-12);
        assert!((std_dev(&z).unwrap() - 1.0).abs() < 1e-12);
        assert!(z_normalize(&[4.0, 4.0]).is_none());
        assert!(z_normalize(&[]).is_none());
    }

    #[test]
    fn test_pearson() {
        let a = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(pearson(&a, &a), Some(1.0));
        let r = pearson(&a, &[2.0, 4.0, 6.0, 8.0]).unwrap();
        assert!((r - 1.0).abs() < 1e-12);
        let r = pearson(&a, &[4.0, 3.0, 2.0, 1.0]).unwrap();
        assert!((r + 1.0).abs() < 1e-12);
        assert!(pearson(&a, &[1.0, 1.0, 1.0, 1.0]).is_none());
        assert!(pearson(&a, &[1.0, 2.0]).is_none());
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-12);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-12);
        assert!((cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]) + 1.0).abs() < 1e-12);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_remaps() {
        assert_eq!(unit_remap(1.0), 1.0);
        assert_eq!(unit_remap(-1.0), 0.0);
        assert_eq!(unit_remap(0.0), 0.5);
        assert_eq!(distance_to_similarity(0.0), 1.0);
        assert_eq!(distance_to_similarity(0.25), 0.75);
        assert_eq!(distance_to_similarity(3.0), 0.0);
        assert_eq!(distance_to_similarity(f64::INFINITY), 0.0);
        assert_eq!(distance_to_similarity(f64::NAN), 0.0);
    }

    #[test]
    fn test_pct_change() {
        assert!((pct_change(100.0, 105.0) - 0.05).abs() < 1e-12);
        assert_eq!(pct_change(0.0, 5.0), 0.0);
    }
}
