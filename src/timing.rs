// src/timing.rs
// CPU-side per-frame timer for the progressive sequence
// RELEVANT FILES: src/sppm.rs, src/frame.rs

use std::time::Instant;

/// Records elapsed seconds since the start of the current progressive
/// sequence, one sample per frame. Reset whenever the sequence restarts so
/// convergence time series stay comparable.
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    samples: Vec<f64>,
}

impl FrameTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            samples: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.start = Instant::now();
        self.samples.clear();
    }

    /// Append one sample: seconds elapsed since the last reset.
    pub fn record(&mut self) -> f64 {
        let sec = self.start.elapsed().as_secs_f64();
        self.samples.push(sec);
        sec
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn last(&self) -> Option<f64> {
        self.samples.last().copied()
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_monotonic_samples() {
        let mut timer = FrameTimer::new();
        let a = timer.record();
        let b = timer.record();
        assert!(b >= a);
        assert_eq!(timer.samples().len(), 2);
        assert_eq!(timer.last(), Some(b));
    }

    #[test]
    fn reset_clears_series() {
        let mut timer = FrameTimer::new();
        timer.record();
        timer.reset();
        assert!(timer.samples().is_empty());
        assert_eq!(timer.last(), None);
    }
}
