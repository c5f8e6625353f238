//! Audio processors and sinks.

use patchwork_core::{
    DelayLine, LinearSmoothedParam, Node, NodeError, PortCount, PortList, PortType, RenderContext,
};
use serde::{Deserialize, Serialize};

use crate::generators::MAX_CHANNELS;
use crate::params::{NodeParams, ParamError};

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

/// Levels seen by an [`AudioCapture`], as reported through [`Node::state`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureReport {
    /// Highest absolute sample per channel since the last reset.
    pub peaks: Vec<f32>,
    /// RMS of the last block per channel.
    pub last_rms: Vec<f32>,
    /// Blocks rendered.
    pub blocks: u64,
    /// Samples rendered.
    pub frames: u64,
}

impl CaptureReport {
    /// Parses a capture node's state blob.
    pub fn from_state(data: &[u8]) -> Option<Self> {
        serde_json::from_slice(data).ok()
    }
}

/// Audio sink that measures what reaches it.
#[derive(Debug, Clone)]
pub struct AudioCapture {
    ports: PortList,
    report: CaptureReport,
}

impl AudioCapture {
    /// Parameter names accepted by [`from_params`](Self::from_params).
    pub const PARAMS: &'static [&'static str] = &["channels"];

    /// Creates a sink with `channels` inputs.
    pub fn new(channels: usize) -> Self {
        Self {
            ports: PortCount::new()
                .with(PortType::Audio, channels, 0)
                .to_port_list(),
            report: CaptureReport {
                peaks: vec![0.0; channels],
                last_rms: vec![0.0; channels],
                blocks: 0,
                frames: 0,
            },
        }
    }

    /// Builds from named parameters.
    pub fn from_params(params: &NodeParams) -> Result<Self, ParamError> {
        Ok(Self::new(params.count("channels", 2, 1..=MAX_CHANNELS)?))
    }

    /// Current measurements.
    pub fn report(&self) -> &CaptureReport {
        &self.report
    }
}

impl Node for AudioCapture {
    fn name(&self) -> &str {
        "Audio Capture"
    }

    fn ports(&self) -> &PortList {
        &self.ports
    }

    fn release(&mut self) {
        self.report.peaks.fill(0.0);
        self.report.last_rms.fill(0.0);
        self.report.blocks = 0;
        self.report.frames = 0;
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        for (ch, peak) in self.report.peaks.iter_mut().enumerate() {
            *peak = peak.max(ctx.audio.peak(ch));
            self.report.last_rms[ch] = ctx.audio.rms(ch);
        }
        self.report.blocks += 1;
        self.report.frames += ctx.num_samples as u64;
    }

    fn state(&self) -> Vec<u8> {
        serde_json::to_vec(&self.report).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Gain
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct GainState {
    gain: f32,
}

/// Multiplies audio by a gain taken from a Control input.
#[derive(Debug, Clone)]
pub struct Gain {
    ports: PortList,
    channels: usize,
    gain_port: usize,
    gain: LinearSmoothedParam,
}

impl Gain {
    /// Parameter names accepted by [`from_params`](Self::from_params).
    pub const PARAMS: &'static [&'static str] = &["channels", "gain"];

    /// Ramp time for gain changes.
    const SMOOTHING_MS: f32 = 10.0;

    /// Creates a gain stage with `channels` ins and outs.
    pub fn new(channels: usize, gain: f32) -> Self {
        let ports = PortCount::new()
            .with(PortType::Audio, channels, channels)
            .with(PortType::Control, 1, 0)
            .to_port_list();
        let gain_port = ports
            .port_for_channel(PortType::Control, 0, true)
            .unwrap_or(2 * channels);
        Self {
            ports,
            channels,
            gain_port,
            gain: LinearSmoothedParam::new(gain),
        }
    }

    /// Builds from named parameters.
    pub fn from_params(params: &NodeParams) -> Result<Self, ParamError> {
        Ok(Self::new(
            params.count("channels", 2, 1..=MAX_CHANNELS)?,
            params.float("gain", 1.0, 0.0..=16.0)?,
        ))
    }

    /// Index of the Control input.
    pub fn gain_port(&self) -> usize {
        self.gain_port
    }
}

impl Node for Gain {
    fn name(&self) -> &str {
        "Gain"
    }

    fn ports(&self) -> &PortList {
        &self.ports
    }

    fn prepare(&mut self, sample_rate: f64, _block_size: usize) -> Result<(), NodeError> {
        self.gain =
            LinearSmoothedParam::with_config(self.gain.target(), sample_rate as f32, Self::SMOOTHING_MS);
        Ok(())
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        let start = self.gain.get();
        for _ in 0..ctx.num_samples {
            self.gain.advance();
        }
        ctx.audio.apply_gain_ramp(0..self.channels, start, self.gain.get());
    }

    fn parameter(&self, port: usize) -> Option<f32> {
        (port == self.gain_port).then(|| self.gain.target())
    }

    fn set_parameter(&mut self, port: usize, value: f32) {
        if port == self.gain_port {
            self.gain.set_target(value.max(0.0));
        }
    }

    fn state(&self) -> Vec<u8> {
        serde_json::to_vec(&GainState {
            gain: self.gain.target(),
        })
        .unwrap_or_default()
    }

    fn set_state(&mut self, data: &[u8]) {
        if let Ok(state) = serde_json::from_slice::<GainState>(data) {
            self.gain.set_immediate(state.gain.max(0.0));
        }
    }
}

// ---------------------------------------------------------------------------
// Delay
// ---------------------------------------------------------------------------

/// Fixed delay that reports its length as latency.
#[derive(Debug, Clone)]
pub struct Delay {
    ports: PortList,
    lines: Vec<DelayLine>,
}

impl Delay {
    /// Parameter names accepted by [`from_params`](Self::from_params).
    pub const PARAMS: &'static [&'static str] = &["channels", "samples"];

    /// Longest accepted delay.
    pub const MAX_SAMPLES: usize = 192_000;

    /// Creates a delay of `samples` on each of `channels`.
    pub fn new(channels: usize, samples: usize) -> Self {
        Self {
            ports: PortCount::new()
                .with(PortType::Audio, channels, channels)
                .to_port_list(),
            lines: (0..channels).map(|_| DelayLine::new(samples)).collect(),
        }
    }

    /// Builds from named parameters.
    pub fn from_params(params: &NodeParams) -> Result<Self, ParamError> {
        Ok(Self::new(
            params.count("channels", 2, 1..=MAX_CHANNELS)?,
            params.count("samples", 0, 0..=Self::MAX_SAMPLES)?,
        ))
    }
}

impl Node for Delay {
    fn name(&self) -> &str {
        "Delay"
    }

    fn ports(&self) -> &PortList {
        &self.ports
    }

    fn latency_samples(&self) -> usize {
        self.lines.first().map_or(0, DelayLine::delay)
    }

    fn release(&mut self) {
        for line in &mut self.lines {
            line.clear();
        }
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        for (ch, line) in self.lines.iter_mut().enumerate() {
            line.process_inplace(ctx.audio.channel_mut(ch));
        }
    }
}

// ---------------------------------------------------------------------------
// Mixer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct MixerState {
    level: f32,
}

/// Sums `inputs` groups of `channels` into one group of `channels`.
///
/// Input channel `g * channels + c` feeds output channel `c`.
#[derive(Debug, Clone)]
pub struct Mixer {
    ports: PortList,
    channels: usize,
    inputs: usize,
    level: f32,
}

impl Mixer {
    /// Parameter names accepted by [`from_params`](Self::from_params).
    pub const PARAMS: &'static [&'static str] = &["channels", "inputs", "level"];

    /// Creates a mixer.
    pub fn new(channels: usize, inputs: usize, level: f32) -> Self {
        Self {
            ports: PortCount::new()
                .with(PortType::Audio, channels * inputs, channels)
                .to_port_list(),
            channels,
            inputs,
            level,
        }
    }

    /// Builds from named parameters.
    pub fn from_params(params: &NodeParams) -> Result<Self, ParamError> {
        let channels = params.count("channels", 2, 1..=MAX_CHANNELS)?;
        let inputs = params.count("inputs", 2, 1..=MAX_CHANNELS)?;
        Ok(Self::new(channels, inputs, params.float("level", 1.0, 0.0..=16.0)?))
    }
}

impl Node for Mixer {
    fn name(&self) -> &str {
        "Mixer"
    }

    fn ports(&self) -> &PortList {
        &self.ports
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        for group in 1..self.inputs {
            for ch in 0..self.channels {
                ctx.audio.add_channel(group * self.channels + ch, ch);
            }
        }
        ctx.audio.apply_gain(0..self.channels, self.level);
    }

    fn state(&self) -> Vec<u8> {
        serde_json::to_vec(&MixerState { level: self.level }).unwrap_or_default()
    }

    fn set_state(&mut self, data: &[u8]) {
        if let Ok(state) = serde_json::from_slice::<MixerState>(data) {
            self.level = state.level;
        }
    }
}
