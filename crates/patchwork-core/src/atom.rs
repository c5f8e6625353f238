//! Atom event buffers.
//!
//! Atoms are frame-stamped typed events. MIDI is one body type among several,
//! which lets an Atom port carry everything a MIDI port can and more.

use crate::midi::{MidiBuffer, MidiMessage};

/// Default event capacity of an [`AtomBuffer`].
pub const ATOM_BUFFER_CAPACITY: usize = 1024;

/// Payload of an atom event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AtomBody {
    /// A MIDI message.
    Midi(MidiMessage),
    /// A float value.
    Float(f32),
    /// An integer value.
    Int(i32),
    /// A boolean value.
    Bool(bool),
}

/// An atom stamped with its frame offset inside the current block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtomEvent {
    /// Sample offset from the start of the block.
    pub frame: u32,
    /// The payload.
    pub body: AtomBody,
}

/// Frame-ordered atom sequence with fixed capacity.
#[derive(Debug, Clone)]
pub struct AtomBuffer {
    events: Vec<AtomEvent>,
    capacity: usize,
}

impl Default for AtomBuffer {
    fn default() -> Self {
        Self::with_capacity(ATOM_BUFFER_CAPACITY)
    }
}

impl AtomBuffer {
    /// Creates a buffer with [`ATOM_BUFFER_CAPACITY`] reserved.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer holding up to `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Removes all events.
    #[inline]
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Inserts an event in frame order. Returns false when full.
    pub fn add(&mut self, frame: u32, body: AtomBody) -> bool {
        if self.events.len() >= self.capacity {
            return false;
        }
        let pos = self.events.partition_point(|e| e.frame <= frame);
        self.events.insert(pos, AtomEvent { frame, body });
        true
    }

    /// Replaces the contents with those of `other`.
    pub fn copy_from(&mut self, other: &AtomBuffer) {
        self.events.clear();
        let take = other.events.len().min(self.capacity);
        self.events.extend_from_slice(&other.events[..take]);
    }

    /// Merges all events of `other`.
    pub fn merge_from(&mut self, other: &AtomBuffer) {
        for ev in &other.events {
            self.add(ev.frame, ev.body);
        }
    }

    /// Appends every MIDI event of `midi` as an atom.
    pub fn append_midi(&mut self, midi: &MidiBuffer) {
        for ev in midi {
            self.add(ev.frame, AtomBody::Midi(ev.message));
        }
    }

    /// Writes the MIDI atoms into `midi`, skipping events past `num_frames`
    /// and non-MIDI bodies.
    pub fn write_midi(&self, midi: &mut MidiBuffer, num_frames: u32) {
        for ev in &self.events {
            if ev.frame > num_frames {
                continue;
            }
            if let AtomBody::Midi(message) = ev.body {
                midi.add(message, ev.frame);
            }
        }
    }

    /// Iterates events in frame order.
    pub fn iter(&self) -> impl Iterator<Item = &AtomEvent> {
        self.events.iter()
    }
}
