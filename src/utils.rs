//! Shared numeric and randomness helpers.

use rand::{SeedableRng, rngs::StdRng};

/// Build a deterministic RNG for the given seed.
pub fn build_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Round to two decimal places, ties to even.
///
/// Ties are decided on the exact binary value, so `0.125` rounds down to
/// `0.12` while `2.675` (stored just below the half) rounds to `2.67`.
pub fn round2(value: f64) -> f64 {
    let scaled = value * 100.0;
    if (scaled - scaled.trunc()).abs() != 0.5 {
        return scaled.round() / 100.0;
    }
    // Exact residual of the product decides near-ties.
    let residual = value.mul_add(100.0, -scaled);
    let rounded = if residual > 0.0 {
        scaled.ceil()
    } else if residual < 0.0 {
        scaled.floor()
    } else {
        2.0 * (scaled / 2.0).round()
    };
    rounded / 100.0
}

/// Format a value rounded to two decimals the way checkpoint names expect:
/// the shortest representation that keeps at least one fractional digit
/// (`16.0`, `-6.29`, `15.5`).
pub fn format_rounded(value: f64) -> String {
    format!("{:?}", round2(value))
}

/// Dot product of two equally sized slices.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Arithmetic mean, `0.0` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population standard deviation, `0.0` for fewer than two values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// `target <- tau * source + (1 - tau) * target`
pub fn soft_update(target: &mut [f64], source: &[f64], tau: f64) {
    debug_assert_eq!(target.len(), source.len());
    for (t, s) in target.iter_mut().zip(source) {
        *t = tau * s + (1.0 - tau) * *t;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_rounded_keeps_one_fractional_digit() {
        assert_eq!(format_rounded(16.0), "16.0");
        assert_eq!(format_rounded(15.5), "15.5");
        assert_eq!(format_rounded(-6.2912), "-6.29");
        assert_eq!(format_rounded(-9.2), "-9.2");
        assert_eq!(format_rounded(3.14159), "3.14");
        assert_eq!(format_rounded(0.125), "0.12");
        assert_eq!(format_rounded(15.125), "15.12");
        assert_eq!(format_rounded(0.375), "0.38");
        assert_eq!(format_rounded(-0.125), "-0.12");
    }

    #[test]
    fn round2_breaks_exact_ties_to_even() {
        assert_eq!(round2(0.125), 0.12);
        assert_eq!(round2(0.625), 0.62);
        assert_eq!(round2(16.875), 16.88);
        assert_eq!(round2(-0.125), -0.12);
    }

    #[test]
    fn round2_follows_the_stored_value_near_ties() {
        assert_eq!(round2(2.675), 2.67);
        assert_eq!(round2(1.005), 1.0);
        assert_eq!(round2(2.675_000_1), 2.68);
        assert_eq!(round2(-1.234), -1.23);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn mean_and_std_of_empty_are_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[]), 0.0);
        assert_eq!(std_dev(&[4.0]), 0.0);
    }

    #[test]
    fn mean_and_std_of_values() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&values), 5.0);
        assert!((std_dev(&values) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn build_rng_is_deterministic_for_a_seed() {
        use rand::Rng;

        let mut a = build_rng(7);
        let mut b = build_rng(7);
        for _ in 0..10 {
            assert_eq!(a.random::<u64>(), b.random::<u64>());
        }
    }

    #[test]
    fn soft_update_blends_toward_source() {
        let mut target = vec![0.0, 1.0];
        soft_update(&mut target, &[1.0, 1.0], 0.5);
        assert_eq!(target, vec![0.5, 1.0]);
    }
}
