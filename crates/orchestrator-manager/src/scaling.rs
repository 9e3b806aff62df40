//! The logarithmic scaling curve (spec §4.6.2). Pure and side-effect free so
//! it can be unit tested without any AWS or HTTP dependency.

/// Target worker count for a task-definition given `pending` jobs, the
/// class's `sensitivity`/`factor` curve parameters, and its capacity bounds.
///
/// `T = clamp(round(sensitivity * ln(pending/factor + 1) + min), min, max)`,
/// with `pending <= 0` forced to `min` and `pending > 0` forced to at least 1
/// even if the curve alone would round down to zero.
pub fn target_capacity(pending: u32, sensitivity: f64, factor: f64, min: u32, max: u32) -> u32 {
    if pending == 0 {
        return min;
    }

    let raw = sensitivity * ((pending as f64 / factor) + 1.0).ln() + min as f64;
    let mut target = raw.round() as i64;

    if target < 1 {
        target = 1;
    }

    target.clamp(min as i64, max as i64) as u32
}

/// Whether a task-definition's cooldown has elapsed since its last scaling
/// action (spec §4.6.2: "If now - L < cooldownSeconds x 1000, do nothing").
pub fn cooldown_elapsed(
    now: chrono::DateTime<chrono::Utc>,
    last_scaled_at: Option<chrono::DateTime<chrono::Utc>>,
    cooldown_seconds: u64,
) -> bool {
    match last_scaled_at {
        None => true,
        Some(last) => (now - last).num_seconds() >= cooldown_seconds as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_pending_targets_min() {
        assert_eq!(target_capacity(0, 2.0, 5.0, 1, 20), 1);
        assert_eq!(target_capacity(0, 2.0, 5.0, 0, 20), 0);
    }

    #[test]
    fn positive_pending_never_rounds_to_zero() {
        let t = target_capacity(1, 0.01, 100.0, 0, 20);
        assert!(t >= 1);
    }

    #[test]
    fn target_grows_with_pending_but_is_sublinear() {
        let low = target_capacity(10, 2.0, 5.0, 1, 100);
        let high = target_capacity(1000, 2.0, 5.0, 1, 100);
        assert!(high > low);
        // Going from 10 to 1000 pending (100x) should not produce anywhere
        // near a 100x jump in target capacity.
        assert!(high < low * 20);
    }

    #[test]
    fn target_is_always_within_bounds() {
        for pending in [0, 1, 5, 50, 500, 5000] {
            let t = target_capacity(pending, 2.0, 5.0, 2, 10);
            assert!((2..=10).contains(&t));
        }
    }

    #[test]
    fn cooldown_blocks_until_elapsed() {
        let now = chrono::Utc::now();
        let last = now - chrono::Duration::seconds(30);
        assert!(!cooldown_elapsed(now, Some(last), 60));
        assert!(cooldown_elapsed(now, Some(last), 20));
        assert!(cooldown_elapsed(now, None, 60));
    }
}
