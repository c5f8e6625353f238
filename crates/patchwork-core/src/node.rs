//! The node contract.
//!
//! A node is anything with a port layout and a render entry point: an I/O
//! endpoint, an internal processor, a hosted plugin, or a nested
//! [`Graph`](crate::Graph). Nodes are handed to a graph as `Box<dyn Node>` and
//! are referenced by [`NodeId`] from then on.
//!
//! # Render Context
//!
//! [`RenderContext`] gives the node its audio, CV, MIDI and atom channels for
//! the block. Audio channel `c` is both input channel `c` and output channel
//! `c`: inputs are read in place and outputs overwrite them. The buffer is
//! `max(1, ins, outs)` channels wide.

use core::fmt;

use crate::atom::AtomBuffer;
use crate::buffer::AudioBuffer;
use crate::error::NodeError;
use crate::midi::MidiBuffer;
use crate::port::{PortCount, PortList, PortType};
use crate::transport::TransportSnapshot;

/// Stable identifier of a node within its graph.
///
/// Zero means "unassigned". Ids in the reserved range at the top of the `u32`
/// space are never handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodeId(u32);

impl NodeId {
    /// The unassigned id.
    pub const UNASSIGNED: NodeId = NodeId(0);

    /// First id of the reserved range.
    pub const RESERVED_START: u32 = u32::MAX - 2;

    /// Wraps a raw id.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw id.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// True if the id can name a node (non-zero and not reserved).
    pub const fn is_valid(self) -> bool {
        self.0 != 0 && self.0 < Self::RESERVED_START
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability tag telling the graph how to treat a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeRole {
    /// Regular processing node.
    #[default]
    Ordinary,
    /// Feeds the graph's audio input into the graph.
    AudioInput,
    /// Collects audio into the graph's output.
    AudioOutput,
    /// Feeds the graph's MIDI input into the graph.
    MidiInput,
    /// Collects MIDI into the graph's output.
    MidiOutput,
}

impl NodeRole {
    /// True for the four I/O endpoint roles.
    pub fn is_io(self) -> bool {
        !matches!(self, NodeRole::Ordinary)
    }

    /// True for the audio endpoint roles.
    pub fn is_audio_io(self) -> bool {
        matches!(self, NodeRole::AudioInput | NodeRole::AudioOutput)
    }

    /// True for the MIDI endpoint roles.
    pub fn is_midi_io(self) -> bool {
        matches!(self, NodeRole::MidiInput | NodeRole::MidiOutput)
    }

    /// Port type and direction an endpoint exposes inside the graph.
    ///
    /// An audio input endpoint has audio *outputs*: it produces the graph's
    /// input signal for other nodes.
    pub fn endpoint(self) -> Option<(PortType, bool)> {
        match self {
            NodeRole::Ordinary => None,
            NodeRole::AudioInput => Some((PortType::Audio, false)),
            NodeRole::AudioOutput => Some((PortType::Audio, true)),
            NodeRole::MidiInput => Some((PortType::Midi, false)),
            NodeRole::MidiOutput => Some((PortType::Midi, true)),
        }
    }
}

/// Channels handed to [`Node::render`] for one block.
pub struct RenderContext<'a> {
    /// Audio channels, `max(1, ins, outs)` wide.
    pub audio: &'a mut AudioBuffer,
    /// CV channels, `max(1, ins, outs)` wide.
    pub cv: &'a mut AudioBuffer,
    /// MIDI buffers, `max(1, ins, outs)` long.
    pub midi: &'a mut [MidiBuffer],
    /// Atom buffers, `max(1, ins, outs)` long.
    pub atom: &'a mut [AtomBuffer],
    /// Samples to process.
    pub num_samples: usize,
    /// Transport state for the block.
    pub transport: TransportSnapshot,
}

/// A graph vertex.
///
/// Everything except [`render`](Node::render) has a default so simple nodes
/// stay short. `render` must process exactly `ctx.num_samples` samples and
/// must not block or allocate.
pub trait Node: Send {
    /// Display name.
    fn name(&self) -> &str;

    /// Port layout.
    fn ports(&self) -> &PortList;

    /// Processing delay in samples.
    fn latency_samples(&self) -> usize {
        0
    }

    /// Allocates state for the given stream format.
    fn prepare(&mut self, _sample_rate: f64, _block_size: usize) -> Result<(), NodeError> {
        Ok(())
    }

    /// Frees render state. Safe to call repeatedly.
    fn release(&mut self) {}

    /// Processes one block.
    fn render(&mut self, ctx: &mut RenderContext<'_>);

    /// Processes one block while the node is suspended.
    ///
    /// Inputs pass through on matching channels and extra outputs are silenced.
    fn render_bypassed(&mut self, ctx: &mut RenderContext<'_>) {
        let ports = self.ports();
        let ins = ports.count(PortType::Audio, true);
        let outs = ports.count(PortType::Audio, false);
        for ch in ins..outs.min(ctx.audio.num_channels()) {
            ctx.audio.clear_channel(ch);
        }
    }

    /// How the graph treats this node.
    fn role(&self) -> NodeRole {
        NodeRole::Ordinary
    }

    /// Current value of a Control port, if the node exposes one at `port`.
    fn parameter(&self, _port: usize) -> Option<f32> {
        None
    }

    /// Sets the value behind a Control input port.
    fn set_parameter(&mut self, _port: usize, _value: f32) {}

    /// Oversampling factor the node wants to run at (1, 2, 4 or 8).
    fn oversampling_factor(&self) -> usize {
        1
    }

    /// Called when a MIDI program change reaches a node with program changes enabled.
    fn set_midi_program(&mut self, _program: u8) {}

    /// Opaque state blob.
    fn state(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Restores a blob produced by [`state`](Node::state).
    fn set_state(&mut self, _data: &[u8]) {}

    /// Called by the owning graph when its own port counts change. Endpoint
    /// nodes resize themselves to mirror the graph.
    fn refresh_ports(&mut self, _graph_ports: &PortCount) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_validity() {
        assert!(!NodeId::UNASSIGNED.is_valid());
        assert!(NodeId::new(1).is_valid());
        assert!(!NodeId::new(u32::MAX).is_valid());
        assert!(!NodeId::new(NodeId::RESERVED_START).is_valid());
        assert_eq!(NodeId::new(7).to_string(), "7");
    }

    #[test]
    fn test_role_endpoints() {
        assert_eq!(NodeRole::AudioInput.endpoint(), Some((PortType::Audio, false)));
        assert_eq!(NodeRole::MidiOutput.endpoint(), Some((PortType::Midi, true)));
        assert!(NodeRole::AudioOutput.is_audio_io());
        assert!(!NodeRole::MidiInput.is_audio_io());
        assert!(!NodeRole::Ordinary.is_io());
    }
}
