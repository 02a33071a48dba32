//! Fractional sibling ordering.
//!
//! Every orderable row stores a `DOUBLE PRECISION sort_order`. Structure
//! synchronization stamps positions `0, 1, 2, ...`; single inserts between two
//! siblings take the midpoint so neighbours keep their values. Once a gap gets
//! narrower than [`MIN_GAP`] the section is renormalized back to integers.

/// Smallest gap at which a midpoint insert is still considered safe.
pub const MIN_GAP: f64 = 1e-9;

/// Order value for a zero-based position in a payload.
pub fn position_order(position: usize) -> f64 {
    position as f64
}

/// Order value for a new sibling placed between `prev` and `next`.
///
/// Returns `None` when the neighbours are too close (or out of order) and the
/// caller should renormalize first.
pub fn order_between(prev: Option<f64>, next: Option<f64>) -> Option<f64> {
    match (prev, next) {
        (None, None) => Some(0.0),
        (Some(p), None) => Some(p.floor() + 1.0),
        (None, Some(n)) => Some(n.ceil() - 1.0),
        (Some(p), Some(n)) => {
            if n - p < MIN_GAP {
                None
            } else {
                Some(p + (n - p) / 2.0)
            }
        }
    }
}

/// Integer orders for `count` siblings, in their current relative order.
pub fn renormalized(count: usize) -> Vec<f64> {
    (0..count).map(position_order).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sibling_starts_at_zero() {
        assert_eq!(order_between(None, None), Some(0.0));
    }

    #[test]
    fn append_goes_past_last_integer() {
        assert_eq!(order_between(Some(3.0), None), Some(4.0));
        assert_eq!(order_between(Some(3.25), None), Some(4.0));
    }

    #[test]
    fn prepend_goes_before_first() {
        assert_eq!(order_between(None, Some(0.0)), Some(-1.0));
        assert_eq!(order_between(None, Some(0.5)), Some(0.0));
    }

    #[test]
    fn insert_between_takes_midpoint() {
        assert_eq!(order_between(Some(1.0), Some(2.0)), Some(1.5));
        let m = order_between(Some(1.0), Some(1.5)).unwrap();
        assert!(m > 1.0 && m < 1.5);
    }

    #[test]
    fn exhausted_gap_requests_renormalization() {
        assert_eq!(order_between(Some(1.0), Some(1.0)), None);
        assert_eq!(order_between(Some(2.0), Some(1.0)), None);
        assert_eq!(order_between(Some(1.0), Some(1.0 + MIN_GAP / 2.0)), None);
    }

    #[test]
    fn repeated_midpoints_eventually_exhaust() {
        let (lo, mut hi) = (0.0, 1.0);
        let mut inserts = 0;
        while let Some(m) = order_between(Some(lo), Some(hi)) {
            hi = m;
            inserts += 1;
            assert!(inserts < 100, "gap never exhausted");
        }
        assert!(inserts > 20);
    }

    #[test]
    fn renormalized_is_dense() {
        assert_eq!(renormalized(3), vec![0.0, 1.0, 2.0]);
        assert!(renormalized(0).is_empty());
    }
}
