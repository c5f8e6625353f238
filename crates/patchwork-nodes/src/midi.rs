//! MIDI sources and sinks.

use patchwork_core::{MidiMessage, Node, NodeError, PortCount, PortList, PortType, RenderContext};
use serde::{Deserialize, Serialize};

use crate::params::{NodeParams, ParamError};

/// Repeating note: on at the start of each interval, off halfway through.
#[derive(Debug, Clone)]
pub struct MidiGenerator {
    ports: PortList,
    channel: u8,
    note: u8,
    velocity: u8,
    interval_ms: f32,
    period: u64,
    position: u64,
}

impl MidiGenerator {
    /// Parameter names accepted by [`from_params`](Self::from_params).
    pub const PARAMS: &'static [&'static str] = &["channel", "note", "velocity", "interval_ms"];

    /// Creates a generator on `channel` (1-16).
    pub fn new(channel: u8, note: u8, velocity: u8, interval_ms: f32) -> Self {
        let mut generator = Self {
            ports: PortCount::new().with(PortType::Midi, 0, 1).to_port_list(),
            channel,
            note,
            velocity,
            interval_ms,
            period: 2,
            position: 0,
        };
        generator.update_period(patchwork_core::DEFAULT_SAMPLE_RATE);
        generator
    }

    /// Builds from named parameters.
    pub fn from_params(params: &NodeParams) -> Result<Self, ParamError> {
        Ok(Self::new(
            params.count("channel", 1, 1..=16)? as u8,
            params.count("note", 60, 0..=127)? as u8,
            params.count("velocity", 100, 1..=127)? as u8,
            params.float("interval_ms", 500.0, 1.0..=60_000.0)?,
        ))
    }

    /// Samples between note ons.
    pub fn period_samples(&self) -> u64 {
        self.period
    }

    fn update_period(&mut self, sample_rate: f64) {
        let samples = (sample_rate * f64::from(self.interval_ms) * 0.001).round() as u64;
        self.period = samples.max(2);
    }
}

impl Node for MidiGenerator {
    fn name(&self) -> &str {
        "MIDI Generator"
    }

    fn ports(&self) -> &PortList {
        &self.ports
    }

    fn prepare(&mut self, sample_rate: f64, _block_size: usize) -> Result<(), NodeError> {
        self.update_period(sample_rate);
        self.position = 0;
        Ok(())
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        let Some(out) = ctx.midi.first_mut() else {
            return;
        };
        let half = self.period / 2;
        for frame in 0..ctx.num_samples {
            let phase = (self.position + frame as u64) % self.period;
            if phase == 0 {
                out.add(MidiMessage::note_on(self.channel, self.note, self.velocity), frame as u32);
            } else if phase == half {
                out.add(MidiMessage::note_off(self.channel, self.note, 0), frame as u32);
            }
        }
        self.position += ctx.num_samples as u64;
    }
}

/// What a [`MidiCapture`] has received, as reported through [`Node::state`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MidiCaptureReport {
    /// Total events received.
    pub events: u64,
    /// Note ons among them.
    pub note_ons: u64,
    /// Program changes among them.
    pub program_changes: u64,
    /// Raw bytes of the most recent event.
    pub last: Option<Vec<u8>>,
}

impl MidiCaptureReport {
    /// Parses a MIDI capture node's state blob.
    pub fn from_state(data: &[u8]) -> Option<Self> {
        serde_json::from_slice(data).ok()
    }
}

/// MIDI sink counting what reaches it.
#[derive(Debug, Clone)]
pub struct MidiCapture {
    ports: PortList,
    events: u64,
    note_ons: u64,
    program_changes: u64,
    last: [u8; 3],
    last_len: usize,
}

impl MidiCapture {
    /// Parameter names accepted by [`from_params`](Self::from_params).
    pub const PARAMS: &'static [&'static str] = &[];

    /// Creates a MIDI sink.
    pub fn new() -> Self {
        Self {
            ports: PortCount::new().with(PortType::Midi, 1, 0).to_port_list(),
            events: 0,
            note_ons: 0,
            program_changes: 0,
            last: [0; 3],
            last_len: 0,
        }
    }

    /// Builds from named parameters.
    pub fn from_params(_params: &NodeParams) -> Result<Self, ParamError> {
        Ok(Self::new())
    }

    /// Total events received.
    pub fn events(&self) -> u64 {
        self.events
    }

    /// Current counters.
    pub fn report(&self) -> MidiCaptureReport {
        MidiCaptureReport {
            events: self.events,
            note_ons: self.note_ons,
            program_changes: self.program_changes,
            last: (self.last_len > 0).then(|| self.last[..self.last_len].to_vec()),
        }
    }
}

impl Default for MidiCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for MidiCapture {
    fn name(&self) -> &str {
        "MIDI Capture"
    }

    fn ports(&self) -> &PortList {
        &self.ports
    }

    fn release(&mut self) {
        self.events = 0;
        self.note_ons = 0;
        self.program_changes = 0;
        self.last_len = 0;
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        let Some(input) = ctx.midi.first() else {
            return;
        };
        for ev in input.iter() {
            self.events += 1;
            if ev.message.is_note_on() {
                self.note_ons += 1;
            }
            if ev.message.is_program_change() {
                self.program_changes += 1;
            }
            let bytes = ev.message.as_bytes();
            self.last_len = bytes.len().min(3);
            self.last[..self.last_len].copy_from_slice(&bytes[..self.last_len]);
        }
    }

    fn state(&self) -> Vec<u8> {
        serde_json::to_vec(&self.report()).unwrap_or_default()
    }
}
