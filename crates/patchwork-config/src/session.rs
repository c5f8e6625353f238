//! Session files: engine settings plus the root graphs to load.
//!
//! A session is a TOML document with an `[engine]` table and any number of
//! `[[graphs]]`, each listing its `[[graphs.nodes]]` and
//! `[[graphs.connections]]`:
//!
//! ```toml
//! name = "Demo"
//!
//! [engine]
//! sample_rate = 48000
//! block_size = 256
//!
//! [[graphs]]
//! name = "Main"
//!
//! [[graphs.nodes]]
//! id = 1
//! type = "gen.sine"
//! params = { frequency = 220.0 }
//!
//! [[graphs.nodes]]
//! id = 2
//! type = "io.audio_out"
//!
//! [[graphs.connections]]
//! source = 1
//! source_port = 0
//! dest = 2
//! dest_port = 0
//! ```

use std::path::Path;

use patchwork_core::{
    ClockSource, Engine, EngineSettings, Graph, KeyRange, MidiChannels, NodeId, PortType,
    RenderMode, RootGraph, VelocityCurve,
};
use patchwork_nodes::{NodeParams, NodeRegistry};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::validation::{ValidationError, validate_session};

fn default_sample_rate() -> u32 {
    48000
}

fn default_block_size() -> usize {
    512
}

fn default_channels() -> usize {
    2
}

fn default_tempo() -> f32 {
    120.0
}

fn default_four() -> u8 {
    4
}

fn default_clock_source() -> String {
    ClockSource::Internal.slug().to_string()
}

fn default_mode() -> String {
    RenderMode::Single.slug().to_string()
}

fn default_velocity_curve() -> String {
    VelocityCurve::Linear.slug().to_string()
}

fn default_true() -> bool {
    true
}

fn default_gain() -> f32 {
    1.0
}

fn is_default_gain(gain: &f32) -> bool {
    *gain == 1.0
}

fn is_true(value: &bool) -> bool {
    *value
}

fn is_zero_u8(value: &u8) -> bool {
    *value == 0
}

fn is_zero_i32(value: &i32) -> bool {
    *value == 0
}

fn is_zero_f32(value: &f32) -> bool {
    *value == 0.0
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Stream format and timing, as stored in the `[engine]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Largest block size.
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Audio input channels.
    #[serde(default = "default_channels")]
    pub inputs: usize,
    /// Audio output channels.
    #[serde(default = "default_channels")]
    pub outputs: usize,
    /// Initial tempo in BPM.
    #[serde(default = "default_tempo")]
    pub tempo: f32,
    /// Beats per bar.
    #[serde(default = "default_four")]
    pub beats_per_bar: u8,
    /// Note value of one beat.
    #[serde(default = "default_four")]
    pub beat_divisor: u8,
    /// `internal` or `midi_clock`.
    #[serde(default = "default_clock_source")]
    pub clock_source: String,
    /// Emit MIDI clock.
    #[serde(default)]
    pub generate_midi_clock: bool,
    /// Route generated clock into the graph input.
    #[serde(default)]
    pub send_clock_to_input: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            block_size: default_block_size(),
            inputs: default_channels(),
            outputs: default_channels(),
            tempo: default_tempo(),
            beats_per_bar: 4,
            beat_divisor: 4,
            clock_source: default_clock_source(),
            generate_midi_clock: false,
            send_clock_to_input: false,
        }
    }
}

impl EngineConfig {
    /// Converts into core engine settings.
    pub fn to_settings(&self) -> Result<EngineSettings, ConfigError> {
        let clock_source = ClockSource::from_slug(&self.clock_source)
            .ok_or_else(|| ValidationError::UnknownClockSource(self.clock_source.clone()))?;
        Ok(EngineSettings {
            sample_rate: f64::from(self.sample_rate),
            block_size: self.block_size,
            inputs: self.inputs,
            outputs: self.outputs,
            tempo: self.tempo,
            beats_per_bar: self.beats_per_bar,
            beat_divisor: self.beat_divisor,
            clock_source,
            generate_midi_clock: self.generate_midi_clock,
            send_clock_to_input: self.send_clock_to_input,
        })
    }
}

// ---------------------------------------------------------------------------
// Nodes and connections
// ---------------------------------------------------------------------------

/// One node of a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node id, unique within the graph.
    pub id: u32,
    /// Registry type id.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Construction parameters.
    #[serde(default, skip_serializing_if = "NodeParams::is_empty")]
    pub params: NodeParams,
    /// Node state restored after construction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<toml::Table>,
    /// Run the node at all.
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub enabled: bool,
    /// Pass audio through instead of rendering.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bypassed: bool,
    /// Silence the outputs.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub muted: bool,
    /// Output gain.
    #[serde(default = "default_gain", skip_serializing_if = "is_default_gain")]
    pub gain: f32,
    /// Note transposition in semitones.
    #[serde(default, skip_serializing_if = "is_zero_i32")]
    pub transpose: i32,
    /// Accepted notes, `[low, high]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_range: Option<[u8; 2]>,
    /// Accepted MIDI channel, 0 for all.
    #[serde(default, skip_serializing_if = "is_zero_u8")]
    pub midi_channel: u8,
    /// Extra latency reported for the node.
    #[serde(default, skip_serializing_if = "is_zero_f32")]
    pub delay_compensation_ms: f32,
}

impl NodeConfig {
    /// A node with default controls.
    pub fn new(id: u32, node_type: impl Into<String>) -> Self {
        Self {
            id,
            node_type: node_type.into(),
            params: NodeParams::new(),
            state: None,
            enabled: true,
            bypassed: false,
            muted: false,
            gain: 1.0,
            transpose: 0,
            key_range: None,
            midi_channel: 0,
            delay_compensation_ms: 0.0,
        }
    }

    /// Builder-style parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.params.set(name, value);
        self
    }
}

/// One connection between two node ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Source node id.
    pub source: u32,
    /// Source port index.
    pub source_port: usize,
    /// Destination node id.
    pub dest: u32,
    /// Destination port index.
    pub dest_port: usize,
}

impl ConnectionConfig {
    /// Creates a connection.
    pub fn new(source: u32, source_port: usize, dest: u32, dest_port: usize) -> Self {
        Self {
            source,
            source_port,
            dest,
            dest_port,
        }
    }
}

// ---------------------------------------------------------------------------
// Graphs
// ---------------------------------------------------------------------------

/// One root graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Display name.
    pub name: String,
    /// `single` or `parallel`.
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Accepted MIDI input channel, 0 for all.
    #[serde(default, skip_serializing_if = "is_zero_u8")]
    pub midi_channel: u8,
    /// Program change selecting this graph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midi_program: Option<u8>,
    /// Curve applied to incoming note velocities.
    #[serde(default = "default_velocity_curve")]
    pub velocity_curve: String,
    /// Audio inputs; defaults to the engine's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_inputs: Option<usize>,
    /// Audio outputs; defaults to the engine's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_outputs: Option<usize>,
    /// MIDI inputs; defaults to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midi_inputs: Option<usize>,
    /// MIDI outputs; defaults to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midi_outputs: Option<usize>,
    /// Nodes.
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    /// Connections.
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

impl GraphConfig {
    /// An empty graph.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: default_mode(),
            midi_channel: 0,
            midi_program: None,
            velocity_curve: default_velocity_curve(),
            audio_inputs: None,
            audio_outputs: None,
            midi_inputs: None,
            midi_outputs: None,
            nodes: Vec::new(),
            connections: Vec::new(),
        }
    }

    /// Builder-style node.
    #[must_use]
    pub fn with_node(mut self, node: NodeConfig) -> Self {
        self.nodes.push(node);
        self
    }

    /// Builder-style connection.
    #[must_use]
    pub fn with_connection(mut self, source: u32, source_port: usize, dest: u32, dest_port: usize) -> Self {
        self.connections
            .push(ConnectionConfig::new(source, source_port, dest, dest_port));
        self
    }

    /// Builds the graph with `engine`'s channel counts as defaults.
    ///
    /// Does not validate first; see [`validate_session`].
    pub fn build(&self, registry: &NodeRegistry, engine: &EngineConfig) -> Result<RootGraph, ConfigError> {
        let mode = RenderMode::from_slug(&self.mode)
            .ok_or_else(|| ValidationError::UnknownMode(self.mode.clone()))?;
        let curve = VelocityCurve::from_slug(&self.velocity_curve)
            .ok_or_else(|| ValidationError::UnknownVelocityCurve(self.velocity_curve.clone()))?;
        let graph_err = |e| ConfigError::graph(&self.name, e);

        let mut graph = Graph::with_name(&self.name);
        let ports = [
            (PortType::Audio, true, self.audio_inputs.unwrap_or(engine.inputs)),
            (PortType::Audio, false, self.audio_outputs.unwrap_or(engine.outputs)),
            (PortType::Midi, true, self.midi_inputs.unwrap_or(1)),
            (PortType::Midi, false, self.midi_outputs.unwrap_or(1)),
        ];
        for (port_type, is_input, count) in ports {
            graph
                .set_num_ports(port_type, count, is_input)
                .map_err(graph_err)?;
        }
        graph.set_midi_channels(MidiChannels::single(self.midi_channel));
        graph.set_velocity_curve(curve);

        for node_config in &self.nodes {
            let mut node = registry.create(&node_config.node_type, &node_config.params)?;
            if let Some(state) = &node_config.state {
                if let Ok(blob) = serde_json::to_vec(state) {
                    node.set_state(&blob);
                }
            }
            let id = graph
                .add_node_with_id(node, NodeId::new(node_config.id))
                .map_err(graph_err)?;
            if let Some(controls) = graph.controls(id) {
                controls.set_enabled(node_config.enabled);
                controls.set_suspended(node_config.bypassed);
                controls.set_muted(node_config.muted);
                controls.set_gain(node_config.gain);
                controls.set_transpose(node_config.transpose);
                if let Some([low, high]) = node_config.key_range {
                    controls.set_key_range(KeyRange::new(low, high));
                }
                controls.set_midi_channels(MidiChannels::single(node_config.midi_channel));
                controls.set_delay_compensation_ms(node_config.delay_compensation_ms);
            }
        }

        for c in &self.connections {
            graph
                .add_connection(
                    NodeId::new(c.source),
                    c.source_port,
                    NodeId::new(c.dest),
                    c.dest_port,
                )
                .map_err(graph_err)?;
        }

        Ok(RootGraph::new(graph)
            .with_mode(mode)
            .with_midi_program(self.midi_program))
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A complete session: engine settings and root graphs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session name.
    pub name: String,
    /// Engine settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Root graphs in selection order.
    #[serde(default)]
    pub graphs: Vec<GraphConfig>,
}

impl SessionConfig {
    /// An empty session with default engine settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            engine: EngineConfig::default(),
            graphs: Vec::new(),
        }
    }

    /// Builder-style graph.
    #[must_use]
    pub fn with_graph(mut self, graph: GraphConfig) -> Self {
        self.graphs.push(graph);
        self
    }

    /// Load a session from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Ok(toml::from_str(&content)?)
    }

    /// Load a session from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the session to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validates, then builds a prepared engine holding every graph.
    pub fn build(&self, registry: &NodeRegistry) -> Result<Engine, ConfigError> {
        validate_session(self, registry)?;
        let mut engine = Engine::new(self.engine.to_settings()?);
        for graph in &self.graphs {
            engine.add_graph(graph.build(registry, &self.engine)?);
        }
        Ok(engine)
    }
}
