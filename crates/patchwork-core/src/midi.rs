//! MIDI messages, event buffers and per-node MIDI filters.
//!
//! [`MidiBuffer`] holds frame-stamped events in frame order. Its storage is
//! reserved up front; once full, further events are dropped and counted so
//! the render path never allocates.

use core::fmt;

/// Default event capacity of a [`MidiBuffer`].
pub const MIDI_BUFFER_CAPACITY: usize = 1024;

/// A short (1–3 byte) MIDI message.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MidiMessage {
    bytes: [u8; 3],
    len: u8,
}

impl MidiMessage {
    /// Builds a message from raw bytes. Returns `None` for empty input, for
    /// data without a status byte, or for messages longer than three bytes.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.is_empty() || data.len() > 3 || data[0] < 0x80 {
            return None;
        }
        let mut bytes = [0u8; 3];
        bytes[..data.len()].copy_from_slice(data);
        Some(Self {
            bytes,
            len: data.len() as u8,
        })
    }

    fn channel_voice(status: u8, channel: u8, d1: u8, d2: u8) -> Self {
        let ch = channel.clamp(1, 16) - 1;
        Self {
            bytes: [status | ch, d1 & 0x7f, d2 & 0x7f],
            len: 3,
        }
    }

    fn realtime(status: u8) -> Self {
        Self {
            bytes: [status, 0, 0],
            len: 1,
        }
    }

    /// Note-on. `channel` is 1-based.
    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        Self::channel_voice(0x90, channel, note, velocity)
    }

    /// Note-off. `channel` is 1-based.
    pub fn note_off(channel: u8, note: u8, velocity: u8) -> Self {
        Self::channel_voice(0x80, channel, note, velocity)
    }

    /// Control change. `channel` is 1-based.
    pub fn controller(channel: u8, controller: u8, value: u8) -> Self {
        Self::channel_voice(0xB0, channel, controller, value)
    }

    /// All-notes-off (CC 123). `channel` is 1-based.
    pub fn all_notes_off(channel: u8) -> Self {
        Self::controller(channel, 123, 0)
    }

    /// Program change. `channel` is 1-based.
    pub fn program_change(channel: u8, program: u8) -> Self {
        let ch = channel.clamp(1, 16) - 1;
        Self {
            bytes: [0xC0 | ch, program & 0x7f, 0],
            len: 2,
        }
    }

    /// Timing clock (0xF8).
    pub fn clock() -> Self {
        Self::realtime(0xF8)
    }

    /// Start (0xFA).
    pub fn start() -> Self {
        Self::realtime(0xFA)
    }

    /// Continue (0xFB).
    pub fn continue_playback() -> Self {
        Self::realtime(0xFB)
    }

    /// Stop (0xFC).
    pub fn stop() -> Self {
        Self::realtime(0xFC)
    }

    /// Raw bytes of the message.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Status byte.
    #[inline]
    pub fn status(&self) -> u8 {
        self.bytes[0]
    }

    fn kind(&self) -> u8 {
        self.bytes[0] & 0xF0
    }

    /// 1-based channel for channel messages, 0 for system messages.
    pub fn channel(&self) -> u8 {
        if self.kind() == 0xF0 {
            0
        } else {
            (self.bytes[0] & 0x0F) + 1
        }
    }

    /// Note-on with non-zero velocity.
    pub fn is_note_on(&self) -> bool {
        self.kind() == 0x90 && self.bytes[2] > 0
    }

    /// Note-off, including note-on with zero velocity.
    pub fn is_note_off(&self) -> bool {
        self.kind() == 0x80 || (self.kind() == 0x90 && self.bytes[2] == 0)
    }

    /// Either a note-on or a note-off.
    pub fn is_note_on_or_off(&self) -> bool {
        matches!(self.kind(), 0x80 | 0x90)
    }

    /// Note number of a note message.
    pub fn note_number(&self) -> u8 {
        self.bytes[1]
    }

    /// Sets the note number, clamped to 0..=127.
    pub fn set_note_number(&mut self, note: i32) {
        self.bytes[1] = note.clamp(0, 127) as u8;
    }

    /// Velocity byte of a note message.
    pub fn velocity(&self) -> u8 {
        self.bytes[2]
    }

    /// Velocity scaled to 0.0..=1.0.
    pub fn float_velocity(&self) -> f32 {
        f32::from(self.bytes[2]) / 127.0
    }

    /// Sets the velocity from a 0.0..=1.0 value. Note-ons never drop to zero.
    pub fn set_float_velocity(&mut self, velocity: f32) {
        let v = libm::roundf(velocity.clamp(0.0, 1.0) * 127.0) as u8;
        self.bytes[2] = if self.kind() == 0x90 { v.max(1) } else { v };
    }

    /// Control change message.
    pub fn is_controller(&self) -> bool {
        self.kind() == 0xB0
    }

    /// Controller number of a control change.
    pub fn controller_number(&self) -> u8 {
        self.bytes[1]
    }

    /// Value of a control change.
    pub fn controller_value(&self) -> u8 {
        self.bytes[2]
    }

    /// Program change message.
    pub fn is_program_change(&self) -> bool {
        self.kind() == 0xC0
    }

    /// Program number of a program change.
    pub fn program_number(&self) -> u8 {
        self.bytes[1]
    }

    /// Timing clock.
    pub fn is_clock(&self) -> bool {
        self.bytes[0] == 0xF8
    }

    /// Start.
    pub fn is_start(&self) -> bool {
        self.bytes[0] == 0xFA
    }

    /// Continue.
    pub fn is_continue(&self) -> bool {
        self.bytes[0] == 0xFB
    }

    /// Stop.
    pub fn is_stop(&self) -> bool {
        self.bytes[0] == 0xFC
    }
}

impl fmt::Debug for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MidiMessage(")?;
        for (i, b) in self.as_bytes().iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{b:02X}")?;
        }
        write!(f, ")")
    }
}

/// A message stamped with its frame offset inside the current block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent {
    /// Sample offset from the start of the block.
    pub frame: u32,
    /// The message.
    pub message: MidiMessage,
}

/// Frame-ordered list of MIDI events with fixed capacity.
#[derive(Debug, Clone)]
pub struct MidiBuffer {
    events: Vec<MidiEvent>,
    capacity: usize,
    dropped: usize,
}

impl Default for MidiBuffer {
    fn default() -> Self {
        Self::with_capacity(MIDI_BUFFER_CAPACITY)
    }
}

impl MidiBuffer {
    /// Creates a buffer with [`MIDI_BUFFER_CAPACITY`] reserved.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer that holds up to `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Removes all events.
    #[inline]
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Number of events.
    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if there are no events.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Maximum number of events.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events dropped because the buffer was full, since creation.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Inserts an event after any existing events on the same frame.
    /// Returns false if the buffer was full and the event was dropped.
    pub fn add(&mut self, message: MidiMessage, frame: u32) -> bool {
        if self.events.len() >= self.capacity {
            self.dropped += 1;
            return false;
        }
        let pos = self.events.partition_point(|e| e.frame <= frame);
        self.events.insert(pos, MidiEvent { frame, message });
        true
    }

    /// Merges events of `other` whose frame lies in `start..start + len`,
    /// shifting each frame by `offset`.
    pub fn add_events(&mut self, other: &MidiBuffer, start: u32, len: u32, offset: i64) {
        let end = start.saturating_add(len);
        for ev in other.events.iter().filter(|e| e.frame >= start && e.frame < end) {
            let frame = (i64::from(ev.frame) + offset).max(0) as u32;
            self.add(ev.message, frame);
        }
    }

    /// Merges every event of `other`, preserving frames.
    pub fn merge_from(&mut self, other: &MidiBuffer) {
        if self.events.is_empty() {
            self.copy_from(other);
            return;
        }
        for ev in &other.events {
            self.add(ev.message, ev.frame);
        }
    }

    /// Replaces the contents with those of `other`.
    pub fn copy_from(&mut self, other: &MidiBuffer) {
        self.events.clear();
        let take = other.events.len().min(self.capacity);
        self.events.extend_from_slice(&other.events[..take]);
        self.dropped += other.events.len() - take;
    }

    /// Swaps contents with `other`.
    pub fn swap_with(&mut self, other: &mut MidiBuffer) {
        core::mem::swap(self, other);
    }

    /// Iterates events in frame order.
    pub fn iter(&self) -> impl Iterator<Item = &MidiEvent> {
        self.events.iter()
    }

    /// Mutable access to the events. Frames must stay sorted.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut MidiEvent> {
        self.events.iter_mut()
    }

    /// Keeps only events for which `keep` returns true.
    pub fn retain(&mut self, keep: impl FnMut(&mut MidiEvent) -> bool) {
        self.events.retain_mut(keep);
    }

    /// Multiplies every frame by `factor`.
    pub fn scale_frames_up(&mut self, factor: u32) {
        for ev in &mut self.events {
            ev.frame = ev.frame.saturating_mul(factor);
        }
    }

    /// Divides every frame by `factor`.
    pub fn scale_frames_down(&mut self, factor: u32) {
        if factor == 0 {
            return;
        }
        for ev in &mut self.events {
            ev.frame /= factor;
        }
    }
}

impl<'a> IntoIterator for &'a MidiBuffer {
    type Item = &'a MidiEvent;
    type IntoIter = core::slice::Iter<'a, MidiEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// Set of enabled MIDI channels, 1–16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MidiChannels(u16);

impl Default for MidiChannels {
    fn default() -> Self {
        Self::omni()
    }
}

impl MidiChannels {
    /// All channels enabled.
    pub const fn omni() -> Self {
        Self(u16::MAX)
    }

    /// No channel enabled.
    pub const fn none() -> Self {
        Self(0)
    }

    /// Only `channel` (1-based) enabled. 0 yields omni.
    pub fn single(channel: u8) -> Self {
        match channel {
            1..=16 => Self(1 << (channel - 1)),
            _ => Self::omni(),
        }
    }

    /// Builds from a raw bitmask, bit 0 = channel 1.
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw bitmask.
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// True when every channel is enabled.
    pub fn is_omni(self) -> bool {
        self.0 == u16::MAX
    }

    /// True if `channel` (1-based) is enabled. Channel 0 (system) is always on.
    pub fn is_on(self, channel: u8) -> bool {
        match channel {
            0 => true,
            1..=16 => self.0 & (1 << (channel - 1)) != 0,
            _ => false,
        }
    }

    /// Inverse of [`is_on`](Self::is_on).
    pub fn is_off(self, channel: u8) -> bool {
        !self.is_on(channel)
    }

    /// Enables or disables one channel.
    pub fn set_channel(&mut self, channel: u8, on: bool) {
        if (1..=16).contains(&channel) {
            let bit = 1 << (channel - 1);
            if on {
                self.0 |= bit;
            } else {
                self.0 &= !bit;
            }
        }
    }
}

/// Shape applied to incoming note-on velocities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum VelocityCurve {
    /// Velocities pass unchanged.
    #[default]
    Linear,
    /// Slight boost to soft playing.
    Soft,
    /// Stronger boost.
    Softer,
    /// Strongest boost.
    Softest,
    /// Slight attenuation of soft playing.
    Hard,
    /// Stronger attenuation.
    Harder,
    /// Strongest attenuation.
    Hardest,
    /// Every note at full velocity.
    Max,
}

impl VelocityCurve {
    /// All curves in display order.
    pub const ALL: [VelocityCurve; 8] = [
        VelocityCurve::Linear,
        VelocityCurve::Soft,
        VelocityCurve::Softer,
        VelocityCurve::Softest,
        VelocityCurve::Hard,
        VelocityCurve::Harder,
        VelocityCurve::Hardest,
        VelocityCurve::Max,
    ];

    /// Lower-case name used in config files.
    pub fn slug(self) -> &'static str {
        match self {
            VelocityCurve::Linear => "linear",
            VelocityCurve::Soft => "soft",
            VelocityCurve::Softer => "softer",
            VelocityCurve::Softest => "softest",
            VelocityCurve::Hard => "hard",
            VelocityCurve::Harder => "harder",
            VelocityCurve::Hardest => "hardest",
            VelocityCurve::Max => "max",
        }
    }

    /// Parses a [`slug`](Self::slug).
    pub fn from_slug(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.slug().eq_ignore_ascii_case(s))
    }

    fn exponent(self) -> f32 {
        match self {
            VelocityCurve::Linear | VelocityCurve::Max => 1.0,
            VelocityCurve::Soft => 0.75,
            VelocityCurve::Softer => 0.5,
            VelocityCurve::Softest => 0.25,
            VelocityCurve::Hard => 1.5,
            VelocityCurve::Harder => 2.0,
            VelocityCurve::Hardest => 3.0,
        }
    }

    /// Maps a 0.0..=1.0 velocity through the curve.
    pub fn process(self, velocity: f32) -> f32 {
        let v = velocity.clamp(0.0, 1.0);
        match self {
            VelocityCurve::Linear => v,
            VelocityCurve::Max => {
                if v > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            _ => libm::powf(v, self.exponent()),
        }
    }
}

/// Inclusive note range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyRange {
    /// Lowest accepted note.
    pub low: u8,
    /// Highest accepted note.
    pub high: u8,
}

impl Default for KeyRange {
    fn default() -> Self {
        Self::FULL
    }
}

impl KeyRange {
    /// Every note.
    pub const FULL: KeyRange = KeyRange { low: 0, high: 127 };

    /// Creates a range, swapping the bounds if needed.
    pub fn new(low: u8, high: u8) -> Self {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        Self {
            low: low.min(127),
            high: high.min(127),
        }
    }

    /// True unless the range covers every note.
    pub fn is_active(self) -> bool {
        self != Self::FULL
    }

    /// True if `note` lies inside the range.
    pub fn contains(self, note: u8) -> bool {
        note >= self.low && note <= self.high
    }
}

/// Shifts note numbers by a fixed number of semitones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MidiTranspose {
    offset: i32,
}

impl MidiTranspose {
    /// Largest transposition in either direction.
    pub const MAX_OFFSET: i32 = 24;

    /// Creates a transposer, clamping `offset` to ±[`MAX_OFFSET`](Self::MAX_OFFSET).
    pub fn new(offset: i32) -> Self {
        Self {
            offset: offset.clamp(-Self::MAX_OFFSET, Self::MAX_OFFSET),
        }
    }

    /// Semitone offset.
    pub fn offset(self) -> i32 {
        self.offset
    }

    /// Applies the offset to a note message.
    #[inline]
    pub fn process(self, message: &mut MidiMessage) {
        if self.offset != 0 && message.is_note_on_or_off() {
            message.set_note_number(i32::from(message.note_number()) + self.offset);
        }
    }

    /// Applies the offset to every note in a buffer.
    pub fn process_buffer(self, buffer: &mut MidiBuffer) {
        if self.offset == 0 {
            return;
        }
        for ev in buffer.iter_mut() {
            self.process(&mut ev.message);
        }
    }
}
