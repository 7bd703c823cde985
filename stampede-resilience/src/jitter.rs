//! Random delay helpers
//!
//! Used to desynchronize virtual users that would otherwise act in lockstep.

use rand::Rng;
use std::time::Duration;

/// Uniformly random delay in `[0, max]`
pub fn uniform_jitter<R: Rng + ?Sized>(max: Duration, rng: &mut R) -> Duration {
    uniform_between(Duration::ZERO, max, rng)
}

/// Uniformly random delay in `[min, max]`; returns `min` when the range is empty
pub fn uniform_between<R: Rng + ?Sized>(min: Duration, max: Duration, rng: &mut R) -> Duration {
    if max <= min {
        return min;
    }
    let nanos = rng.random_range(min.as_nanos()..=max.as_nanos());
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}
