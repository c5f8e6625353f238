//! Graph I/O endpoints.
//!
//! An endpoint has ports in one direction only, mirroring the owning graph's
//! ports in the other: an audio input endpoint exposes one audio *output* per
//! graph audio input. The data transfer itself is done by the render op based
//! on [`NodeRole`], so [`Node::render`] is a no-op here.

use crate::node::{Node, NodeRole, RenderContext};
use crate::port::{PortCount, PortList, PortType};

/// Audio or MIDI endpoint of a graph.
#[derive(Debug, Clone)]
pub struct IoNode {
    role: NodeRole,
    ports: PortList,
}

impl IoNode {
    fn new(role: NodeRole, channels: usize) -> Self {
        let mut node = Self {
            role,
            ports: PortList::new(),
        };
        node.resize(channels);
        node
    }

    /// Endpoint delivering the graph's audio input (stereo until refreshed).
    pub fn audio_input() -> Self {
        Self::new(NodeRole::AudioInput, 2)
    }

    /// Endpoint collecting the graph's audio output (stereo until refreshed).
    pub fn audio_output() -> Self {
        Self::new(NodeRole::AudioOutput, 2)
    }

    /// Endpoint delivering the graph's MIDI input.
    pub fn midi_input() -> Self {
        Self::new(NodeRole::MidiInput, 1)
    }

    /// Endpoint collecting the graph's MIDI output.
    pub fn midi_output() -> Self {
        Self::new(NodeRole::MidiOutput, 1)
    }

    fn resize(&mut self, channels: usize) {
        if let Some((port_type, is_input)) = self.role.endpoint() {
            let mut counts = PortCount::new();
            counts.set(port_type, channels, is_input);
            self.ports = counts.to_port_list();
        }
    }
}

impl Node for IoNode {
    fn name(&self) -> &str {
        match self.role {
            NodeRole::AudioInput => "Audio In",
            NodeRole::AudioOutput => "Audio Out",
            NodeRole::MidiInput => "MIDI In",
            NodeRole::MidiOutput => "MIDI Out",
            NodeRole::Ordinary => "I/O",
        }
    }

    fn ports(&self) -> &PortList {
        &self.ports
    }

    fn render(&mut self, _ctx: &mut RenderContext<'_>) {}

    fn role(&self) -> NodeRole {
        self.role
    }

    fn refresh_ports(&mut self, graph_ports: &PortCount) {
        if let Some((port_type, is_input)) = self.role.endpoint() {
            self.resize(graph_ports.get(port_type, !is_input));
        }
    }
}

/// Channel count a graph gets for an endpoint type it has no ports of.
pub(crate) fn default_endpoint_channels(port_type: PortType) -> usize {
    match port_type {
        PortType::Audio => 2,
        _ => 1,
    }
}
