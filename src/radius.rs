// src/radius.rs
// Progressive search-radius schedule
// Exists so the shrink rule is a pure function testable without a device
// RELEVANT FILES: src/frame.rs, src/sppm.rs, src/config.rs

/// One progressive-radius update.
///
/// `radius` is the radius used for the frame that just completed, `iteration`
/// the 1-based index of the next frame, `alpha` the shrink exponent in (0, 1).
/// The result never drops below `min_radius`.
#[inline]
pub fn advance(radius: f32, iteration: u32, alpha: f32, min_radius: f32) -> f32 {
    let n = iteration as f32;
    let shrunk = radius * ((n + alpha) / (n + 1.0)).sqrt();
    shrunk.max(min_radius)
}

/// Per-pool radius schedule state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RadiusSchedule {
    pub initial_radius: f32,
    pub alpha: f32,
    pub min_radius: f32,
    current: f32,
}

impl RadiusSchedule {
    pub fn new(initial_radius: f32, alpha: f32, min_radius: f32) -> Self {
        Self {
            initial_radius,
            alpha,
            min_radius,
            current: initial_radius,
        }
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    /// Iteration 0 of a progressive sequence: back to the configured radius.
    pub fn reset(&mut self) {
        self.current = self.initial_radius;
    }

    /// Shrink after collect for the frame that just ran as iteration
    /// `completed_iteration` (0-based frame index).
    pub fn step(&mut self, completed_iteration: u32) -> f32 {
        self.current = advance(
            self.current,
            completed_iteration + 1,
            self.alpha,
            self.min_radius,
        );
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_shrink_factor() {
        // alpha 0.7: frame 1 factor is sqrt(1.7 / 2) = 0.92195.
        let r = advance(0.05, 1, 0.7, 1e-5);
        assert!((r - 0.05 * (1.7f32 / 2.0).sqrt()).abs() < 1e-9);
        assert!((r - 0.0461).abs() < 1e-4);
        let r = advance(0.01, 1, 0.7, 1e-5);
        assert!((r / 0.01 - 0.92195).abs() < 1e-4);
    }

    #[test]
    fn schedule_is_non_increasing_and_floors() {
        let mut sched = RadiusSchedule::new(0.05, 0.7, 1e-3);
        let mut prev = sched.current();
        for frame in 0..10_000u32 {
            let next = sched.step(frame);
            assert!(next <= prev);
            assert!(next >= sched.min_radius);
            prev = next;
        }
        // With a high floor the sequence must have hit it by now.
        assert_eq!(prev, 1e-3);
    }

    #[test]
    fn reset_restores_initial() {
        let mut sched = RadiusSchedule::new(0.01, 0.7, 1e-5);
        sched.step(0);
        sched.step(1);
        assert!(sched.current() < 0.01);
        sched.reset();
        assert_eq!(sched.current(), 0.01);
    }
}
