//! Audio sources: ramp, sine and constant.
//!
//! Every generator writes the same signal to each of its output channels and
//! has no inputs. Settings round-trip through [`Node::state`] as JSON.

use std::f64::consts::TAU;

use patchwork_core::{Node, NodeError, PortCount, PortList, PortType, RenderContext};
use serde::{Deserialize, Serialize};

use crate::params::{NodeParams, ParamError};

/// Highest channel count a built-in node accepts.
pub const MAX_CHANNELS: usize = 16;

fn output_ports(channels: usize) -> PortList {
    PortCount::new()
        .with(PortType::Audio, 0, channels)
        .to_port_list()
}

/// Copies channel 0 into every other output channel.
fn duplicate_first(ctx: &mut RenderContext<'_>, channels: usize) {
    for ch in 1..channels {
        ctx.audio.copy_channel(0, ch);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct OscillatorState {
    frequency: f32,
    amplitude: f32,
}

/// Rising sawtooth from `-amplitude` to `+amplitude`.
#[derive(Debug, Clone)]
pub struct Ramp {
    ports: PortList,
    channels: usize,
    frequency: f32,
    amplitude: f32,
    phase: f64,
    sample_rate: f64,
}

impl Ramp {
    /// Parameter names accepted by [`from_params`](Self::from_params).
    pub const PARAMS: &'static [&'static str] = &["channels", "frequency", "amplitude"];

    /// Creates a ramp generator.
    pub fn new(channels: usize, frequency: f32, amplitude: f32) -> Self {
        Self {
            ports: output_ports(channels),
            channels,
            frequency,
            amplitude,
            phase: 0.0,
            sample_rate: patchwork_core::DEFAULT_SAMPLE_RATE,
        }
    }

    /// Builds from named parameters.
    pub fn from_params(params: &NodeParams) -> Result<Self, ParamError> {
        Ok(Self::new(
            params.count("channels", 2, 1..=MAX_CHANNELS)?,
            params.float("frequency", 100.0, 0.01..=20000.0)?,
            params.float("amplitude", 1.0, 0.0..=1.0)?,
        ))
    }

    /// Ramp frequency in Hz.
    pub fn frequency(&self) -> f32 {
        self.frequency
    }
}

impl Node for Ramp {
    fn name(&self) -> &str {
        "Ramp"
    }

    fn ports(&self) -> &PortList {
        &self.ports
    }

    fn prepare(&mut self, sample_rate: f64, _block_size: usize) -> Result<(), NodeError> {
        self.sample_rate = sample_rate;
        self.phase = 0.0;
        Ok(())
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        let increment = f64::from(self.frequency) / self.sample_rate;
        let amplitude = self.amplitude;
        for s in ctx.audio.channel_mut(0) {
            *s = (2.0 * self.phase as f32 - 1.0) * amplitude;
            self.phase += increment;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
        }
        duplicate_first(ctx, self.channels);
    }

    fn state(&self) -> Vec<u8> {
        serde_json::to_vec(&OscillatorState {
            frequency: self.frequency,
            amplitude: self.amplitude,
        })
        .unwrap_or_default()
    }

    fn set_state(&mut self, data: &[u8]) {
        if let Ok(state) = serde_json::from_slice::<OscillatorState>(data) {
            self.frequency = state.frequency;
            self.amplitude = state.amplitude;
        }
    }
}

/// Sine oscillator.
#[derive(Debug, Clone)]
pub struct Sine {
    ports: PortList,
    channels: usize,
    frequency: f32,
    amplitude: f32,
    phase: f64,
    sample_rate: f64,
}

impl Sine {
    /// Parameter names accepted by [`from_params`](Self::from_params).
    pub const PARAMS: &'static [&'static str] = &["channels", "frequency", "amplitude"];

    /// Creates a sine oscillator.
    pub fn new(channels: usize, frequency: f32, amplitude: f32) -> Self {
        Self {
            ports: output_ports(channels),
            channels,
            frequency,
            amplitude,
            phase: 0.0,
            sample_rate: patchwork_core::DEFAULT_SAMPLE_RATE,
        }
    }

    /// Builds from named parameters.
    pub fn from_params(params: &NodeParams) -> Result<Self, ParamError> {
        Ok(Self::new(
            params.count("channels", 2, 1..=MAX_CHANNELS)?,
            params.float("frequency", 440.0, 0.01..=20000.0)?,
            params.float("amplitude", 0.5, 0.0..=1.0)?,
        ))
    }
}

impl Node for Sine {
    fn name(&self) -> &str {
        "Sine"
    }

    fn ports(&self) -> &PortList {
        &self.ports
    }

    fn prepare(&mut self, sample_rate: f64, _block_size: usize) -> Result<(), NodeError> {
        self.sample_rate = sample_rate;
        self.phase = 0.0;
        Ok(())
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        let increment = f64::from(self.frequency) / self.sample_rate;
        let amplitude = f64::from(self.amplitude);
        for s in ctx.audio.channel_mut(0) {
            *s = (libm::sin(TAU * self.phase) * amplitude) as f32;
            self.phase += increment;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
        }
        duplicate_first(ctx, self.channels);
    }

    fn state(&self) -> Vec<u8> {
        serde_json::to_vec(&OscillatorState {
            frequency: self.frequency,
            amplitude: self.amplitude,
        })
        .unwrap_or_default()
    }

    fn set_state(&mut self, data: &[u8]) {
        if let Ok(state) = serde_json::from_slice::<OscillatorState>(data) {
            self.frequency = state.frequency;
            self.amplitude = state.amplitude;
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct DcState {
    value: f32,
}

/// Constant output.
#[derive(Debug, Clone)]
pub struct Dc {
    ports: PortList,
    value: f32,
}

impl Dc {
    /// Parameter names accepted by [`from_params`](Self::from_params).
    pub const PARAMS: &'static [&'static str] = &["channels", "value"];

    /// Creates a constant source.
    pub fn new(channels: usize, value: f32) -> Self {
        Self {
            ports: output_ports(channels),
            value,
        }
    }

    /// Builds from named parameters.
    pub fn from_params(params: &NodeParams) -> Result<Self, ParamError> {
        Ok(Self::new(
            params.count("channels", 1, 1..=MAX_CHANNELS)?,
            params.float("value", 0.0, -16.0..=16.0)?,
        ))
    }
}

impl Node for Dc {
    fn name(&self) -> &str {
        "DC"
    }

    fn ports(&self) -> &PortList {
        &self.ports
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        for ch in 0..self.ports.count(PortType::Audio, false) {
            ctx.audio.channel_mut(ch).fill(self.value);
        }
    }

    fn state(&self) -> Vec<u8> {
        serde_json::to_vec(&DcState { value: self.value }).unwrap_or_default()
    }

    fn set_state(&mut self, data: &[u8]) {
        if let Ok(state) = serde_json::from_slice::<DcState>(data) {
            self.value = state.value;
        }
    }
}
