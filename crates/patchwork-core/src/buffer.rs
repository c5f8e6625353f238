//! Multichannel audio buffers and latency-compensation delay lines.
//!
//! [`AudioBuffer`] doubles as the shared sample pool of a compiled sequence:
//! each pool "buffer index" is one channel. Channels are allocated at compile
//! time with a fixed capacity; the render path only changes the active length
//! within that capacity.
//!
//! [`DelayLine`] is the state behind the delay op: a fixed ring that shifts a
//! channel by a constant number of samples.

/// Multichannel block of `f32` samples.
#[derive(Debug, Clone, Default)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    num_samples: usize,
}

impl AudioBuffer {
    /// Creates a zeroed buffer.
    pub fn new(num_channels: usize, num_samples: usize) -> Self {
        Self {
            channels: (0..num_channels).map(|_| vec![0.0; num_samples]).collect(),
            num_samples,
        }
    }

    /// Builds a buffer from per-channel sample vectors. Channels shorter than
    /// the longest are zero-padded.
    pub fn from_channels(channels: Vec<Vec<f32>>) -> Self {
        let num_samples = channels.iter().map(Vec::len).max().unwrap_or(0);
        let channels = channels
            .into_iter()
            .map(|mut ch| {
                ch.resize(num_samples, 0.0);
                ch
            })
            .collect();
        Self {
            channels,
            num_samples,
        }
    }

    /// Reallocates to the given shape. Not for the render path.
    pub fn set_size(&mut self, num_channels: usize, num_samples: usize) {
        self.channels.resize_with(num_channels, Vec::new);
        for ch in &mut self.channels {
            ch.resize(num_samples, 0.0);
        }
        self.num_samples = num_samples;
    }

    /// Number of channels.
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Active samples per channel.
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Allocated samples per channel.
    pub fn capacity(&self) -> usize {
        self.channels.first().map_or(self.num_samples, Vec::len)
    }

    /// Changes the active length, clamped to the allocated capacity.
    #[inline]
    pub fn set_num_samples(&mut self, num_samples: usize) {
        self.num_samples = num_samples.min(self.capacity());
    }

    /// Active samples of channel `ch`.
    ///
    /// # Panics
    ///
    /// Panics if `ch >= num_channels()`.
    #[inline]
    pub fn channel(&self, ch: usize) -> &[f32] {
        &self.channels[ch][..self.num_samples]
    }

    /// Mutable active samples of channel `ch`.
    ///
    /// # Panics
    ///
    /// Panics if `ch >= num_channels()`.
    #[inline]
    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        let n = self.num_samples;
        &mut self.channels[ch][..n]
    }

    /// Borrows channel `src` immutably and `dst` mutably.
    ///
    /// Returns `None` when `src == dst` or either is out of range.
    pub fn get_ref_and_mut(&mut self, src: usize, dst: usize) -> Option<(&[f32], &mut [f32])> {
        if src == dst || src >= self.channels.len() || dst >= self.channels.len() {
            return None;
        }
        let n = self.num_samples;
        if src < dst {
            let (lo, hi) = self.channels.split_at_mut(dst);
            Some((&lo[src][..n], &mut hi[0][..n]))
        } else {
            let (lo, hi) = self.channels.split_at_mut(src);
            Some((&hi[0][..n], &mut lo[dst][..n]))
        }
    }

    /// Zeroes every channel.
    pub fn clear(&mut self) {
        let n = self.num_samples;
        for ch in &mut self.channels {
            ch[..n].fill(0.0);
        }
    }

    /// Zeroes one channel.
    #[inline]
    pub fn clear_channel(&mut self, ch: usize) {
        self.channel_mut(ch).fill(0.0);
    }

    /// Copies channel `src` onto channel `dst`.
    pub fn copy_channel(&mut self, src: usize, dst: usize) {
        if let Some((from, to)) = self.get_ref_and_mut(src, dst) {
            to.copy_from_slice(from);
        }
    }

    /// Adds channel `src` into channel `dst`.
    pub fn add_channel(&mut self, src: usize, dst: usize) {
        if let Some((from, to)) = self.get_ref_and_mut(src, dst) {
            for (d, s) in to.iter_mut().zip(from) {
                *d += *s;
            }
        }
    }

    /// Copies `samples` into channel `ch`, up to the shorter length.
    pub fn copy_from_slice(&mut self, ch: usize, samples: &[f32]) {
        let dst = self.channel_mut(ch);
        let n = dst.len().min(samples.len());
        dst[..n].copy_from_slice(&samples[..n]);
    }

    /// Adds `samples` into channel `ch`, up to the shorter length.
    pub fn add_from_slice(&mut self, ch: usize, samples: &[f32]) {
        for (d, s) in self.channel_mut(ch).iter_mut().zip(samples) {
            *d += *s;
        }
    }

    /// Copies every common channel of `other` into `self`.
    pub fn copy_from(&mut self, other: &AudioBuffer) {
        let chans = self.num_channels().min(other.num_channels());
        for ch in 0..chans {
            self.copy_from_slice(ch, other.channel(ch));
        }
    }

    /// Multiplies channels `range` by a constant gain.
    pub fn apply_gain(&mut self, channels: core::ops::Range<usize>, gain: f32) {
        if gain == 1.0 {
            return;
        }
        for ch in channels {
            if ch >= self.channels.len() {
                break;
            }
            for s in self.channel_mut(ch) {
                *s *= gain;
            }
        }
    }

    /// Multiplies channels `range` by a linear ramp from `start` to `end`.
    pub fn apply_gain_ramp(&mut self, channels: core::ops::Range<usize>, start: f32, end: f32) {
        if start == end {
            self.apply_gain(channels, start);
            return;
        }
        let n = self.num_samples;
        if n == 0 {
            return;
        }
        let step = (end - start) / n as f32;
        for ch in channels {
            if ch >= self.channels.len() {
                break;
            }
            let mut g = start;
            for s in self.channel_mut(ch) {
                *s *= g;
                g += step;
            }
        }
    }

    /// Root-mean-square level of one channel.
    pub fn rms(&self, ch: usize) -> f32 {
        let samples = self.channel(ch);
        if samples.is_empty() {
            return 0.0;
        }
        let sum: f32 = samples.iter().map(|s| s * s).sum();
        libm::sqrtf(sum / samples.len() as f32)
    }

    /// Largest absolute sample of one channel.
    pub fn peak(&self, ch: usize) -> f32 {
        self.channel(ch).iter().fold(0.0_f32, |m, s| m.max(s.abs()))
    }
}

/// Fixed-delay ring buffer for latency compensation.
///
/// The ring holds `delay + 1` samples with the read position at 0 and the
/// write position at `delay`, so every sample leaves exactly `delay` samples
/// after it entered.
#[derive(Debug, Clone)]
pub struct DelayLine {
    ring: Vec<f32>,
    read_pos: usize,
    write_pos: usize,
    delay: usize,
}

impl DelayLine {
    /// Creates a delay line of `delay` samples.
    pub fn new(delay: usize) -> Self {
        Self {
            ring: vec![0.0; delay + 1],
            read_pos: 0,
            write_pos: delay,
            delay,
        }
    }

    /// Delay in samples.
    pub fn delay(&self) -> usize {
        self.delay
    }

    /// Delays a block in place.
    pub fn process_inplace(&mut self, samples: &mut [f32]) {
        if self.delay == 0 {
            return;
        }
        let len = self.ring.len();
        for s in samples {
            self.ring[self.write_pos] = *s;
            *s = self.ring[self.read_pos];
            self.write_pos += 1;
            if self.write_pos == len {
                self.write_pos = 0;
            }
            self.read_pos += 1;
            if self.read_pos == len {
                self.read_pos = 0;
            }
        }
    }

    /// Clears the ring to silence.
    pub fn clear(&mut self) {
        self.ring.fill(0.0);
        self.read_pos = 0;
        self.write_pos = self.delay;
    }
}
