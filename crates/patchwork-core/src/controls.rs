//! Lock-free per-node playback controls.
//!
//! [`NodeControls`] holds the flags and values that other threads may flip
//! while the node renders: enable, suspend, mute, gains, MIDI filters and
//! delay compensation. The render path reads them once per block.
//! Nothing here changes the graph structure, so none of it needs a rebuild,
//! except delay compensation which feeds latency and is picked up by the
//! next compile.

use core::sync::atomic::{AtomicBool, AtomicI32, AtomicU16, AtomicU32, Ordering};

use crate::midi::{KeyRange, MidiChannels, MidiTranspose};

/// Meter slots per direction.
pub const MAX_METER_CHANNELS: usize = 16;

/// An `f32` stored as its bit pattern in an [`AtomicU32`].
#[derive(Debug, Default)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    /// Creates a new atomic float.
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    /// Loads the value.
    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    /// Stores the value.
    #[inline]
    pub fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

/// Shared playback state of one node.
#[derive(Debug)]
pub struct NodeControls {
    enabled: AtomicBool,
    suspended: AtomicBool,
    muted: AtomicBool,
    mute_inputs: AtomicBool,
    input_gain: AtomicF32,
    gain: AtomicF32,
    key_low: AtomicU32,
    key_high: AtomicU32,
    transpose: AtomicI32,
    midi_channels: AtomicU16,
    midi_programs: AtomicBool,
    midi_program: AtomicI32,
    delay_compensation_ms: AtomicF32,
    input_rms: [AtomicF32; MAX_METER_CHANNELS],
    output_rms: [AtomicF32; MAX_METER_CHANNELS],
}

impl Default for NodeControls {
    fn default() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            suspended: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            mute_inputs: AtomicBool::new(false),
            input_gain: AtomicF32::new(1.0),
            gain: AtomicF32::new(1.0),
            key_low: AtomicU32::new(0),
            key_high: AtomicU32::new(127),
            transpose: AtomicI32::new(0),
            midi_channels: AtomicU16::new(MidiChannels::omni().bits()),
            midi_programs: AtomicBool::new(false),
            midi_program: AtomicI32::new(-1),
            delay_compensation_ms: AtomicF32::new(0.0),
            input_rms: Default::default(),
            output_rms: Default::default(),
        }
    }
}

impl NodeControls {
    /// Controls with every flag at its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the node renders at all. A disabled node passes its inputs
    /// through and silences any extra outputs.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enables or disables the node.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Whether the node runs its bypass path.
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    /// Suspends (bypasses) the node.
    pub fn set_suspended(&self, suspended: bool) {
        self.suspended.store(suspended, Ordering::Release);
    }

    /// Whether the node's output is muted.
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }

    /// Mutes or unmutes the node's output.
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Release);
    }

    /// Whether muting also silences the node's inputs.
    pub fn mutes_inputs(&self) -> bool {
        self.mute_inputs.load(Ordering::Acquire)
    }

    /// Sets whether muting also silences the node's inputs.
    pub fn set_mute_inputs(&self, mute_inputs: bool) {
        self.mute_inputs.store(mute_inputs, Ordering::Release);
    }

    /// Linear input gain.
    pub fn input_gain(&self) -> f32 {
        self.input_gain.get()
    }

    /// Sets the linear input gain (clamped to 0..=4).
    pub fn set_input_gain(&self, gain: f32) {
        self.input_gain.set(gain.clamp(0.0, 4.0));
    }

    /// Linear output gain.
    pub fn gain(&self) -> f32 {
        self.gain.get()
    }

    /// Sets the linear output gain (clamped to 0..=4).
    pub fn set_gain(&self, gain: f32) {
        self.gain.set(gain.clamp(0.0, 4.0));
    }

    /// Accepted note range.
    pub fn key_range(&self) -> KeyRange {
        KeyRange::new(
            self.key_low.load(Ordering::Acquire) as u8,
            self.key_high.load(Ordering::Acquire) as u8,
        )
    }

    /// Sets the accepted note range.
    pub fn set_key_range(&self, range: KeyRange) {
        self.key_low.store(u32::from(range.low), Ordering::Release);
        self.key_high.store(u32::from(range.high), Ordering::Release);
    }

    /// Note transposition.
    pub fn transpose(&self) -> MidiTranspose {
        MidiTranspose::new(self.transpose.load(Ordering::Acquire))
    }

    /// Sets the note transposition in semitones.
    pub fn set_transpose(&self, semitones: i32) {
        self.transpose
            .store(MidiTranspose::new(semitones).offset(), Ordering::Release);
    }

    /// MIDI channels the node listens on.
    pub fn midi_channels(&self) -> MidiChannels {
        MidiChannels::from_bits(self.midi_channels.load(Ordering::Acquire))
    }

    /// Sets the MIDI channels the node listens on.
    pub fn set_midi_channels(&self, channels: MidiChannels) {
        self.midi_channels.store(channels.bits(), Ordering::Release);
    }

    /// Whether program changes are consumed by the node.
    pub fn midi_programs_enabled(&self) -> bool {
        self.midi_programs.load(Ordering::Acquire)
    }

    /// Enables consuming program changes.
    pub fn set_midi_programs_enabled(&self, enabled: bool) {
        self.midi_programs.store(enabled, Ordering::Release);
    }

    /// Last program received, if any.
    pub fn midi_program(&self) -> Option<u8> {
        let p = self.midi_program.load(Ordering::Acquire);
        (0..=127).contains(&p).then_some(p as u8)
    }

    pub(crate) fn set_midi_program(&self, program: u8) {
        self.midi_program.store(i32::from(program), Ordering::Release);
    }

    /// Extra delay in milliseconds added to the node's reported latency.
    pub fn delay_compensation_ms(&self) -> f32 {
        self.delay_compensation_ms.get()
    }

    /// Sets the extra delay. Takes effect on the next rebuild.
    pub fn set_delay_compensation_ms(&self, ms: f32) {
        self.delay_compensation_ms.set(ms.max(0.0));
    }

    /// Delay compensation converted to samples at `sample_rate`.
    pub fn delay_compensation_samples(&self, sample_rate: f64) -> usize {
        let ms = f64::from(self.delay_compensation_ms());
        (sample_rate * ms * 0.001).round().max(0.0) as usize
    }

    /// Last measured input RMS of a channel.
    pub fn input_rms(&self, channel: usize) -> f32 {
        self.input_rms.get(channel).map_or(0.0, AtomicF32::get)
    }

    /// Last measured output RMS of a channel.
    pub fn output_rms(&self, channel: usize) -> f32 {
        self.output_rms.get(channel).map_or(0.0, AtomicF32::get)
    }

    pub(crate) fn store_input_rms(&self, channel: usize, value: f32) {
        if let Some(slot) = self.input_rms.get(channel) {
            slot.set(value);
        }
    }

    pub(crate) fn store_output_rms(&self, channel: usize, value: f32) {
        if let Some(slot) = self.output_rms.get(channel) {
            slot.set(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = NodeControls::new();
        assert!(c.is_enabled());
        assert!(!c.is_suspended());
        assert!(!c.is_muted());
        assert_eq!(c.gain(), 1.0);
        assert_eq!(c.key_range(), KeyRange::FULL);
        assert!(c.midi_channels().is_omni());
        assert_eq!(c.midi_program(), None);
    }

    #[test]
    fn test_delay_compensation_rounds_to_samples() {
        let c = NodeControls::new();
        c.set_delay_compensation_ms(10.0);
        assert_eq!(c.delay_compensation_samples(44100.0), 441);
        c.set_delay_compensation_ms(0.01);
        assert_eq!(c.delay_compensation_samples(48000.0), 0);
        c.set_delay_compensation_ms(-5.0);
        assert_eq!(c.delay_compensation_ms(), 0.0);
    }

    #[test]
    fn test_gain_is_clamped() {
        let c = NodeControls::new();
        c.set_gain(10.0);
        assert_eq!(c.gain(), 4.0);
        c.set_input_gain(-1.0);
        assert_eq!(c.input_gain(), 0.0);
    }
}
