//! Simulated time.
//!
//! All durations and deltas are Q32.32 fixed-point values so that slicing a
//! step across a queue never creates or loses time: `1.5 - 1` is exactly
//! `0.5`, and a snapshot restores the same bits it saved.

use fixed::types::I32F32;

/// Simulated time: 32 integer bits, 32 fractional bits.
pub type SimTime = I32F32;

/// Tick counter. One tick is one call to `Manager::evaluate`.
pub type Ticks = u64;

/// Convert an f64 to SimTime. Use for setup and tests, never inside a step.
#[inline]
pub fn time_from_f64(v: f64) -> SimTime {
    SimTime::from_num(v)
}

/// Convert SimTime to f64 for display.
#[inline]
pub fn time_to_f64(v: SimTime) -> f64 {
    v.to_num::<f64>()
}

/// Whole simulated seconds.
#[inline]
pub fn secs(v: i32) -> SimTime {
    SimTime::from_num(v)
}

/// `part / whole` clamped into `[0, 1]`. A zero `whole` counts as complete.
pub fn ratio(part: SimTime, whole: SimTime) -> SimTime {
    if whole <= SimTime::ZERO {
        return SimTime::ONE;
    }
    part.checked_div(whole)
        .unwrap_or(SimTime::ONE)
        .clamp(SimTime::ZERO, SimTime::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractional_subtraction_is_exact() {
        let a = time_from_f64(1.5);
        let b = secs(1);
        assert_eq!(a - b, time_from_f64(0.5));
        assert_eq!(time_to_f64(a - b), 0.5);
    }

    #[test]
    fn ratio_clamps_and_handles_zero() {
        assert_eq!(ratio(secs(1), secs(4)), time_from_f64(0.25));
        assert_eq!(ratio(secs(8), secs(4)), SimTime::ONE);
        assert_eq!(ratio(secs(0), secs(0)), SimTime::ONE);
    }

    #[test]
    fn repeated_addition_is_deterministic() {
        // Not exact in binary, but deterministic across runs.
        let tenth = time_from_f64(0.1);
        let mut sum = SimTime::ZERO;
        for _ in 0..10 {
            sum += tenth;
        }
        let again = (0..10).fold(SimTime::ZERO, |acc, _| acc + tenth);
        assert_eq!(sum, again);
    }
}
