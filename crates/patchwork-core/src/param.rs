//! Linear parameter smoothing.
//!
//! Used where a block-rate control value has to become an audio-rate signal
//! without zipper noise, such as Control ports feeding CV inputs.

/// A parameter with linear smoothing (constant rate of change).
///
/// Each new target starts a ramp of `transition_time_ms` from the current
/// value. The ramp snaps to the exact target on its last sample.
#[derive(Debug, Clone)]
pub struct LinearSmoothedParam {
    current: f32,
    target: f32,
    increment: f32,
    samples_remaining: u32,
    sample_rate: f32,
    transition_time_ms: f32,
}

impl LinearSmoothedParam {
    /// Create a new linear smoothed parameter.
    pub fn new(initial: f32) -> Self {
        Self::with_config(initial, 44100.0, 10.0)
    }

    /// Create with full configuration.
    pub fn with_config(initial: f32, sample_rate: f32, transition_time_ms: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            increment: 0.0,
            samples_remaining: 0,
            sample_rate,
            transition_time_ms,
        }
    }

    /// Set the target value.
    pub fn set_target(&mut self, target: f32) {
        if (target - self.target).abs() < 1e-9 {
            return;
        }
        self.target = target;

        let samples = (self.transition_time_ms / 1000.0 * self.sample_rate) as u32;
        if samples == 0 {
            self.current = target;
            self.increment = 0.0;
            self.samples_remaining = 0;
        } else {
            self.increment = (target - self.current) / samples as f32;
            self.samples_remaining = samples;
        }
    }

    /// Set value immediately.
    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.increment = 0.0;
        self.samples_remaining = 0;
    }

    /// Get next smoothed value.
    #[inline]
    pub fn advance(&mut self) -> f32 {
        if self.samples_remaining > 0 {
            self.current += self.increment;
            self.samples_remaining -= 1;
            if self.samples_remaining == 0 {
                self.current = self.target;
            }
        }
        self.current
    }

    /// Fills `out` with consecutive smoothed values.
    pub fn fill(&mut self, out: &mut [f32]) {
        if self.samples_remaining == 0 {
            out.fill(self.current);
            return;
        }
        for s in out {
            *s = self.advance();
        }
    }

    /// Get current value without advancing.
    #[inline]
    pub fn get(&self) -> f32 {
        self.current
    }

    /// Get target value.
    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Check if transition is complete.
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.samples_remaining == 0
    }
}

impl Default for LinearSmoothedParam {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_reaches_target_exactly() {
        let mut p = LinearSmoothedParam::with_config(0.0, 1000.0, 10.0);
        p.set_target(1.0);
        let mut out = [0.0; 10];
        p.fill(&mut out);
        assert!((out[4] - 0.5).abs() < 1e-6);
        assert_eq!(out[9], 1.0);
        assert!(p.is_settled());
    }

    #[test]
    fn test_zero_time_is_immediate() {
        let mut p = LinearSmoothedParam::with_config(0.0, 48000.0, 0.0);
        p.set_target(0.7);
        assert_eq!(p.get(), 0.7);
    }

    #[test]
    fn test_settled_fill_is_constant() {
        let mut p = LinearSmoothedParam::new(0.3);
        let mut out = [0.0; 4];
        p.fill(&mut out);
        assert_eq!(out, [0.3; 4]);
    }
}
