//! Block oversampling for nodes that ask to run above the host rate.
//!
//! ```text
//! block → Linear Interpolation (upsample ×N) → node at N×fs → FIR Lowpass → Decimation → block
//! ```
//!
//! Upsampling interpolates linearly between consecutive input samples. The
//! way down pushes every oversampled sample through a 16-tap windowed-sinc
//! FIR and keeps each N-th output.

use crate::buffer::AudioBuffer;

/// Oversampling factors accepted by [`Oversampler::new`].
pub const SUPPORTED_FACTORS: [usize; 3] = [2, 4, 8];

const FILTER_ORDER: usize = 15;
const FILTER_TAPS: usize = FILTER_ORDER + 1;

#[derive(Debug, Clone, Default)]
struct ChannelState {
    prev_sample: f32,
    fir: [f32; FILTER_TAPS],
}

/// Per-channel up/down sampler with its own oversampled work buffer.
#[derive(Debug, Clone)]
pub struct Oversampler {
    factor: usize,
    states: Vec<ChannelState>,
    buffer: AudioBuffer,
}

impl Oversampler {
    /// Creates an oversampler for `num_channels` channels of up to
    /// `block_size` base-rate samples. Returns `None` for unsupported factors.
    pub fn new(factor: usize, num_channels: usize, block_size: usize) -> Option<Self> {
        if !SUPPORTED_FACTORS.contains(&factor) {
            return None;
        }
        Some(Self {
            factor,
            states: vec![ChannelState::default(); num_channels],
            buffer: AudioBuffer::new(num_channels, block_size * factor),
        })
    }

    /// Oversampling factor.
    pub fn factor(&self) -> usize {
        self.factor
    }

    /// Group delay of the decimation filter, in base-rate samples, rounded
    /// to the nearest sample.
    pub fn latency_samples(&self) -> usize {
        // round(FILTER_ORDER / 2 / factor)
        (FILTER_ORDER + self.factor) / (2 * self.factor)
    }

    /// The oversampled work buffer.
    pub fn buffer_mut(&mut self) -> &mut AudioBuffer {
        &mut self.buffer
    }

    fn coefficients(&self) -> &'static [f32; FILTER_TAPS] {
        match self.factor {
            2 => &COEFFS_2X,
            4 => &COEFFS_4X,
            _ => &COEFFS_8X,
        }
    }

    /// Upsamples the first `num_samples` of every channel of `input` into the
    /// work buffer.
    pub fn upsample(&mut self, input: &AudioBuffer, num_samples: usize) {
        let factor = self.factor;
        self.buffer.set_num_samples(num_samples * factor);
        let step = 1.0 / factor as f32;
        let chans = self.states.len().min(input.num_channels());
        for ch in 0..chans {
            let state = &mut self.states[ch];
            let out = self.buffer.channel_mut(ch);
            for (i, &x) in input.channel(ch)[..num_samples].iter().enumerate() {
                for k in 0..factor {
                    let t = (k as f32 + 1.0) * step;
                    out[i * factor + k] = state.prev_sample + t * (x - state.prev_sample);
                }
                state.prev_sample = x;
            }
        }
    }

    /// Filters and decimates the work buffer into channels `0..num_channels`
    /// of `output`.
    pub fn downsample(&mut self, output: &mut AudioBuffer, num_channels: usize, num_samples: usize) {
        let factor = self.factor;
        let coeffs = self.coefficients();
        let chans = num_channels.min(self.states.len()).min(output.num_channels());
        for ch in 0..chans {
            let state = &mut self.states[ch];
            let src = self.buffer.channel(ch);
            let dst = output.channel_mut(ch);
            for i in 0..num_samples.min(dst.len()) {
                let mut acc = 0.0;
                for k in 0..factor {
                    state.fir.copy_within(0..FILTER_TAPS - 1, 1);
                    state.fir[0] = src[i * factor + k];
                    if k == factor - 1 {
                        for (tap, &c) in state.fir.iter().zip(coeffs) {
                            acc += tap * c;
                        }
                    }
                }
                dst[i] = acc;
            }
        }
    }

    /// Clears filter and interpolation state.
    pub fn reset(&mut self) {
        for s in &mut self.states {
            *s = ChannelState::default();
        }
        self.buffer.clear();
    }
}

// Lowpass FIR coefficients for the decimation filter: windowed-sinc with a
// Kaiser window, cutoff at 0.4, 0.2 and 0.1 of the oversampled Nyquist.

#[allow(clippy::excessive_precision)]
#[rustfmt::skip]
static COEFFS_2X: [f32; FILTER_TAPS] = [
    -0.00152541,  0.00000000,  0.01309369,  0.00000000,
    -0.05738920,  0.00000000,  0.29581875,  0.50000434,
     0.29581875,  0.00000000, -0.05738920,  0.00000000,
     0.01309369,  0.00000000, -0.00152541,  0.00000000,
];

#[allow(clippy::excessive_precision)]
#[rustfmt::skip]
static COEFFS_4X: [f32; FILTER_TAPS] = [
    0.0018645282, 0.0068257641, 0.0172712655, 0.0342604001,
    0.0571166576, 0.0830896230, 0.1078345458, 0.1260221675,
    0.1332946246, 0.1260221675, 0.1078345458, 0.0830896230,
    0.0571166576, 0.0342604001, 0.0172712655, 0.0068257641,
];

#[allow(clippy::excessive_precision)]
#[rustfmt::skip]
static COEFFS_8X: [f32; FILTER_TAPS] = [
    0.0048323092, 0.0131400047, 0.0264623493, 0.0438249658,
    0.0634416395, 0.0828886958, 0.0994801510, 0.1107812341,
    0.1151296104, 0.1107812341, 0.0994801510, 0.0828886958,
    0.0634416395, 0.0438249658, 0.0264623493, 0.0131400047,
];
