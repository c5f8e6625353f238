//! The graph container.
//!
//! [`Graph`] owns its nodes and connections, validates every structural edit,
//! and keeps a compiled [`RenderSequence`] in sync with the topology. Mutations
//! made while the graph is prepared recompile immediately; with
//! [`set_auto_rebuild(false)`](Graph::set_auto_rebuild) edits only mark the
//! graph dirty until [`rebuild_if_needed`](Graph::rebuild_if_needed).
//!
//! Compilation is split from installation: [`Graph::compile`] borrows the
//! graph immutably and can run anywhere, [`Graph::install`] swaps the result
//! in with a single move. Rendering takes `&mut self`, so a swap can never
//! overlap a render.
//!
//! # Example
//!
//! ```rust,ignore
//! use patchwork_core::{Graph, IoNode, PortType};
//!
//! let mut graph = Graph::new();
//! let input = graph.add_node(Box::new(IoNode::audio_input()));
//! let output = graph.add_node(Box::new(IoNode::audio_output()));
//! graph.connect_channels(input, 0, output, 0, PortType::Audio)?;
//! graph.connect_channels(input, 1, output, 1, PortType::Audio)?;
//! graph.prepare(48000.0, 256);
//!
//! graph.render(&mut audio, &mut midi);
//! ```

use std::sync::Arc;

use crate::buffer::AudioBuffer;
use crate::builder::{self, RenderSequence};
use crate::connection::{Connection, ConnectionTable, InputLookup};
use crate::controls::NodeControls;
use crate::error::{GraphError, NodeError};
use crate::io_node::default_endpoint_channels;
use crate::midi::{MidiBuffer, MidiChannels, VelocityCurve};
use crate::node::{Node, NodeId, RenderContext};
use crate::ops::OpContext;
use crate::port::{PortCount, PortList, PortType};
use crate::slot::{GraphIo, NodeSlot};
use crate::transport::TransportSnapshot;

/// Sample rate assumed by [`Graph::compile`] on an unprepared graph.
pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;
/// Block size assumed by [`Graph::compile`] on an unprepared graph.
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// A directed graph of nodes with typed port connections.
pub struct Graph {
    name: String,
    nodes: Vec<NodeSlot>,
    connections: ConnectionTable,
    last_node_id: u32,
    prepared: Option<(f64, usize)>,
    dirty: bool,
    auto_rebuild: bool,
    generation: u64,
    sequence: RenderSequence,
    io: GraphIo,
    midi_channels: MidiChannels,
    velocity_curve: VelocityCurve,
    port_count: PortCount,
    ports: PortList,
    transport: TransportSnapshot,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Creates an empty graph with stereo audio and one MIDI port each way.
    pub fn new() -> Self {
        let port_count = PortCount::new()
            .with(PortType::Audio, 2, 2)
            .with(PortType::Midi, 1, 1);
        Self {
            name: String::from("Graph"),
            nodes: Vec::new(),
            connections: ConnectionTable::new(),
            last_node_id: 0,
            prepared: None,
            dirty: false,
            auto_rebuild: true,
            generation: 0,
            sequence: RenderSequence::default(),
            io: GraphIo::default(),
            midi_channels: MidiChannels::omni(),
            velocity_curve: VelocityCurve::Linear,
            ports: port_count.to_port_list(),
            port_count,
            transport: TransportSnapshot::default(),
        }
    }

    /// Creates an empty graph with a display name.
    pub fn with_name(name: impl Into<String>) -> Self {
        let mut graph = Self::new();
        graph.name = name.into();
        graph
    }

    /// Sets the display name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    // ---- nodes ----

    /// Adds a node under a freshly generated id.
    pub fn add_node(&mut self, node: Box<dyn Node>) -> NodeId {
        self.last_node_id += 1;
        let id = NodeId::new(self.last_node_id);
        self.insert_node(id, node);
        id
    }

    /// Adds a node under `id`. An unassigned or reserved id gets a generated
    /// one instead; an explicit id moves the generator past it.
    pub fn add_node_with_id(&mut self, node: Box<dyn Node>, id: NodeId) -> Result<NodeId, GraphError> {
        if !id.is_valid() {
            return Ok(self.add_node(node));
        }
        if self.contains(id) {
            return Err(GraphError::DuplicateNodeId(id));
        }
        self.last_node_id = self.last_node_id.max(id.raw());
        self.insert_node(id, node);
        Ok(id)
    }

    fn insert_node(&mut self, id: NodeId, mut node: Box<dyn Node>) {
        if let Some((port_type, node_is_input)) = node.role().endpoint() {
            let graph_is_input = !node_is_input;
            if self.port_count.get(port_type, graph_is_input) == 0 {
                self.port_count
                    .set(port_type, default_endpoint_channels(port_type), graph_is_input);
                self.ports = self.port_count.to_port_list();
                if let Some((_, block_size)) = self.prepared {
                    self.allocate_io(block_size);
                }
            }
            node.refresh_ports(&self.port_count);
        }

        let mut slot = NodeSlot::new(id, node);
        if let Some((sample_rate, block_size)) = self.prepared {
            slot.prepare(sample_rate, block_size);
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_add: node {id} ({})", slot.node.name());
        self.nodes.push(slot);
        self.topology_changed();
    }

    /// Removes a node and every connection touching it, returning the node.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Box<dyn Node>, GraphError> {
        let index = self.slot_index(id).ok_or(GraphError::NodeNotFound(id))?;
        self.connections.remove_node(id);
        let mut slot = self.nodes.remove(index);
        slot.release();
        // Slot indices shifted; the installed sequence must not run again.
        self.sequence = RenderSequence::default();
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_remove: node {id}");
        self.topology_changed();
        Ok(slot.node)
    }

    /// Removes every node and connection.
    pub fn clear(&mut self) {
        for slot in &mut self.nodes {
            slot.release();
        }
        self.nodes.clear();
        self.connections.clear();
        self.sequence = RenderSequence::default();
        self.topology_changed();
    }

    fn slot_index(&self, id: NodeId) -> Option<usize> {
        self.nodes.iter().position(|s| s.id == id)
    }

    fn slot(&self, id: NodeId) -> Option<&NodeSlot> {
        self.nodes.iter().find(|s| s.id == id)
    }

    /// Returns true if `id` names a node in this graph.
    pub fn contains(&self, id: NodeId) -> bool {
        self.slot(id).is_some()
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(|s| s.id)
    }

    /// Borrows a node.
    pub fn node(&self, id: NodeId) -> Option<&dyn Node> {
        self.slot(id).map(|s| s.node.as_ref())
    }

    /// Mutably borrows a node. Port layout changes made through this
    /// reference take effect after [`refresh_node_ports`](Self::refresh_node_ports).
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut (dyn Node + 'static)> {
        self.nodes
            .iter_mut()
            .find(|s| s.id == id)
            .map(|s| s.node.as_mut())
    }

    /// Shared playback controls of a node.
    pub fn controls(&self, id: NodeId) -> Option<Arc<NodeControls>> {
        self.slot(id).map(|s| Arc::clone(&s.controls))
    }

    /// Returns true if the node prepared successfully for the current format.
    pub fn is_node_prepared(&self, id: NodeId) -> bool {
        self.slot(id).is_some_and(NodeSlot::is_prepared)
    }

    /// Drops connections invalidated by a node's new port layout and recompiles.
    pub fn refresh_node_ports(&mut self, id: NodeId) -> Result<usize, GraphError> {
        if !self.contains(id) {
            return Err(GraphError::NodeNotFound(id));
        }
        let removed = self.remove_illegal_connections();
        self.topology_changed();
        Ok(removed)
    }

    // ---- connections ----

    fn check_ports(
        &self,
        source: NodeId,
        source_port: usize,
        dest: NodeId,
        dest_port: usize,
    ) -> Result<PortType, GraphError> {
        let src = self.slot(source).ok_or(GraphError::NodeNotFound(source))?;
        let dst = self.slot(dest).ok_or(GraphError::NodeNotFound(dest))?;
        if source == dest {
            return Err(GraphError::SelfConnection(source));
        }

        let src_port = src.node.ports().get(source_port).ok_or(GraphError::PortOutOfRange {
            node: source,
            port: source_port,
        })?;
        let dst_port = dst.node.ports().get(dest_port).ok_or(GraphError::PortOutOfRange {
            node: dest,
            port: dest_port,
        })?;
        if src_port.is_input {
            return Err(GraphError::WrongDirection {
                node: source,
                port: source_port,
            });
        }
        if !dst_port.is_input {
            return Err(GraphError::WrongDirection {
                node: dest,
                port: dest_port,
            });
        }
        if !src_port.port_type.can_connect(dst_port.port_type) {
            return Err(GraphError::IncompatibleTypes {
                source_type: src_port.port_type,
                dest_type: dst_port.port_type,
            });
        }
        Ok(dst_port.port_type)
    }

    /// Validates a prospective connection without adding it.
    pub fn check_connection(
        &self,
        source: NodeId,
        source_port: usize,
        dest: NodeId,
        dest_port: usize,
    ) -> Result<(), GraphError> {
        let dest_type = self.check_ports(source, source_port, dest, dest_port)?;
        if self
            .connections
            .get_between(source, source_port, dest, dest_port)
            .is_some()
        {
            return Err(GraphError::DuplicateConnection {
                source_node: source,
                source_port,
                dest,
                dest_port,
            });
        }
        if matches!(dest_type, PortType::Control | PortType::Cv)
            && self.connections.to_port(dest, dest_port).next().is_some()
        {
            return Err(GraphError::ControlFanIn {
                node: dest,
                port: dest_port,
                port_type: dest_type,
            });
        }
        Ok(())
    }

    /// Returns true if [`check_connection`](Self::check_connection) passes.
    pub fn can_connect(&self, source: NodeId, source_port: usize, dest: NodeId, dest_port: usize) -> bool {
        self.check_connection(source, source_port, dest, dest_port).is_ok()
    }

    /// Connects two ports.
    pub fn add_connection(
        &mut self,
        source: NodeId,
        source_port: usize,
        dest: NodeId,
        dest_port: usize,
    ) -> Result<(), GraphError> {
        self.check_connection(source, source_port, dest, dest_port)?;
        self.connections
            .insert(Connection::new(source, source_port, dest, dest_port));
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_connect: {source}:{source_port} → {dest}:{dest_port}");
        self.topology_changed();
        Ok(())
    }

    /// Connects output channel `source_channel` of one node to input channel
    /// `dest_channel` of another, both of `port_type`.
    pub fn connect_channels(
        &mut self,
        source: NodeId,
        source_channel: usize,
        dest: NodeId,
        dest_channel: usize,
        port_type: PortType,
    ) -> Result<(), GraphError> {
        let src = self.slot(source).ok_or(GraphError::NodeNotFound(source))?;
        let dst = self.slot(dest).ok_or(GraphError::NodeNotFound(dest))?;
        let source_port = src
            .node
            .ports()
            .port_for_channel(port_type, source_channel, false)
            .ok_or(GraphError::PortOutOfRange {
                node: source,
                port: source_channel,
            })?;
        let dest_port = dst
            .node
            .ports()
            .port_for_channel(port_type, dest_channel, true)
            .ok_or(GraphError::PortOutOfRange {
                node: dest,
                port: dest_channel,
            })?;
        self.add_connection(source, source_port, dest, dest_port)
    }

    /// Removes one connection. Returns false if it did not exist.
    pub fn remove_connection(
        &mut self,
        source: NodeId,
        source_port: usize,
        dest: NodeId,
        dest_port: usize,
    ) -> bool {
        let removed = self
            .connections
            .remove(&Connection::new(source, source_port, dest, dest_port));
        if removed {
            #[cfg(feature = "tracing")]
            tracing::debug!("graph_disconnect: {source}:{source_port} → {dest}:{dest_port}");
            self.topology_changed();
        }
        removed
    }

    /// Removes every connection touching a node. Returns how many were removed.
    pub fn disconnect_node(&mut self, id: NodeId) -> usize {
        let removed = self.connections.remove_node(id);
        if removed > 0 {
            self.topology_changed();
        }
        removed
    }

    /// Removes connections whose ports no longer exist or no longer match.
    /// Returns how many were removed. Does not recompile.
    pub fn remove_illegal_connections(&mut self) -> usize {
        let illegal: Vec<Connection> = self
            .connections
            .iter()
            .filter(|c| {
                self.check_ports(c.source, c.source_port, c.dest, c.dest_port)
                    .is_err()
            })
            .copied()
            .collect();
        for arc in &illegal {
            self.connections.remove(arc);
        }
        let removed = illegal.len();
        if removed > 0 {
            self.generation += 1;
            self.dirty = true;
            #[cfg(feature = "tracing")]
            tracing::debug!("graph_disconnect: {removed} illegal connections");
        }
        removed
    }

    /// The connection table.
    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    // ---- graph ports ----

    /// The graph's own port layout, as seen by a parent graph.
    pub fn port_count(&self) -> PortCount {
        self.port_count
    }

    /// Sets how many audio or MIDI ports the graph has in one direction.
    /// Endpoint nodes are resized to match and stale connections dropped.
    pub fn set_num_ports(&mut self, port_type: PortType, count: usize, is_input: bool) -> Result<(), GraphError> {
        if !matches!(port_type, PortType::Audio | PortType::Midi) {
            return Err(GraphError::UnsupportedPortType(port_type));
        }
        if self.port_count.get(port_type, is_input) == count {
            return Ok(());
        }
        self.port_count.set(port_type, count, is_input);
        self.ports = self.port_count.to_port_list();
        for slot in &mut self.nodes {
            if slot.node.role().is_io() {
                slot.node.refresh_ports(&self.port_count);
            }
        }
        if let Some((_, block_size)) = self.prepared {
            self.allocate_io(block_size);
        }
        self.remove_illegal_connections();
        self.topology_changed();
        Ok(())
    }

    fn allocate_io(&mut self, block_size: usize) {
        self.io.allocate(
            self.port_count.get(PortType::Audio, true),
            self.port_count.get(PortType::Audio, false),
            block_size,
        );
    }

    // ---- MIDI input filtering ----

    /// Channels the graph accepts on its MIDI input.
    pub fn midi_channels(&self) -> MidiChannels {
        self.midi_channels
    }

    /// Sets the channels the graph accepts on its MIDI input.
    pub fn set_midi_channels(&mut self, channels: MidiChannels) {
        self.midi_channels = channels;
    }

    /// Velocity curve applied to incoming note-ons.
    pub fn velocity_curve(&self) -> VelocityCurve {
        self.velocity_curve
    }

    /// Sets the velocity curve applied to incoming note-ons.
    pub fn set_velocity_curve(&mut self, curve: VelocityCurve) {
        self.velocity_curve = curve;
    }

    /// Sets the transport state handed to nodes on the next render.
    pub fn set_transport(&mut self, transport: TransportSnapshot) {
        self.transport = transport;
    }

    // ---- compilation ----

    fn ordered_slots(&self) -> Vec<usize> {
        let lookup = InputLookup::new(&self.connections);
        let max_depth = self.nodes.len();
        let mut order: Vec<usize> = Vec::with_capacity(self.nodes.len());
        for (index, slot) in self.nodes.iter().enumerate() {
            let position = order
                .iter()
                .position(|&o| lookup.is_an_input_to(slot.id, self.nodes[o].id, max_depth));
            match position {
                Some(p) => order.insert(p, index),
                None => order.push(index),
            }
        }
        order
    }

    /// Node ids in render order: every node after the nodes feeding it,
    /// except where a cycle makes that impossible.
    pub fn ordered_nodes(&self) -> Vec<NodeId> {
        self.ordered_slots()
            .into_iter()
            .map(|i| self.nodes[i].id)
            .collect()
    }

    /// Compiles the current topology without installing it.
    pub fn compile(&self) -> RenderSequence {
        let (sample_rate, block_size) = self
            .prepared
            .unwrap_or((DEFAULT_SAMPLE_RATE, DEFAULT_BLOCK_SIZE));
        let order = self.ordered_slots();
        builder::compile(
            &self.nodes,
            &order,
            &self.connections,
            sample_rate,
            block_size,
            self.generation,
        )
    }

    /// Swaps in a compiled sequence, returning the previous one.
    ///
    /// A sequence compiled before the last structural edit or format change
    /// is dropped with [`GraphError::StaleSequence`] and the installed one is
    /// kept.
    pub fn install(&mut self, sequence: RenderSequence) -> Result<RenderSequence, GraphError> {
        if sequence.generation() != self.generation {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                "graph_install: dropping sequence from generation {} (now {})",
                sequence.generation(),
                self.generation
            );
            return Err(GraphError::StaleSequence {
                compiled: sequence.generation(),
                current: self.generation,
            });
        }
        Ok(self.swap_sequence(sequence))
    }

    fn swap_sequence(&mut self, sequence: RenderSequence) -> RenderSequence {
        self.dirty = false;
        std::mem::replace(&mut self.sequence, sequence)
    }

    /// Counter bumped by every edit that invalidates compiled sequences.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Recompiles and installs. Does nothing while unprepared.
    pub fn rebuild(&mut self) {
        if self.prepared.is_none() {
            self.dirty = true;
            return;
        }
        let sequence = self.compile();

        #[cfg(feature = "tracing")]
        {
            let counts = sequence.buffer_counts();
            let stats = sequence.stats();
            tracing::debug!(
                "graph_sort: {} nodes, order {:?}",
                sequence.order().len(),
                sequence.order()
            );
            tracing::debug!(
                "graph_buffers: {} ops, audio {} midi {} control {} atom {}",
                sequence.len(),
                counts.audio,
                counts.midi,
                counts.control,
                counts.atom
            );
            tracing::debug!(
                "graph_latency: {} samples, {} feedback breaks, {} table misses",
                sequence.latency_samples(),
                stats.feedback_breaks,
                stats.table_misses
            );
            for (i, op) in sequence.ops().iter().enumerate() {
                tracing::debug!("  op[{i}]: {op}");
            }
        }

        self.swap_sequence(sequence);
    }

    /// Rebuilds if a change is pending.
    pub fn rebuild_if_needed(&mut self) {
        if self.dirty {
            self.rebuild();
        }
    }

    /// Returns true if a change has not been compiled yet.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether structural edits recompile immediately (the default).
    pub fn set_auto_rebuild(&mut self, auto: bool) {
        self.auto_rebuild = auto;
    }

    fn topology_changed(&mut self) {
        self.generation += 1;
        self.dirty = true;
        if self.auto_rebuild {
            self.rebuild();
        }
    }

    /// The installed sequence.
    pub fn sequence(&self) -> &RenderSequence {
        &self.sequence
    }

    // ---- lifecycle ----

    /// Prepares every node and compiles.
    pub fn prepare(&mut self, sample_rate: f64, block_size: usize) {
        if self.prepared != Some((sample_rate, block_size)) {
            self.prepared = Some((sample_rate, block_size));
            self.generation += 1;
            self.allocate_io(block_size);
            for slot in &mut self.nodes {
                slot.prepare(sample_rate, block_size);
            }
            #[cfg(feature = "tracing")]
            tracing::debug!(
                "graph_prepare: {} at {sample_rate} Hz, {block_size} samples",
                self.name
            );
        }
        self.rebuild();
    }

    /// Releases every node and drops the compiled sequence.
    pub fn release(&mut self) {
        for slot in &mut self.nodes {
            slot.release();
        }
        self.prepared = None;
        self.generation += 1;
        self.sequence = RenderSequence::default();
        self.dirty = true;
    }

    /// Returns true between [`prepare`](Self::prepare) and [`release`](Self::release).
    pub fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }

    /// Prepared sample rate.
    pub fn sample_rate(&self) -> Option<f64> {
        self.prepared.map(|(sr, _)| sr)
    }

    /// Prepared block size.
    pub fn block_size(&self) -> Option<usize> {
        self.prepared.map(|(_, bs)| bs)
    }

    // ---- rendering ----

    /// Renders one block.
    ///
    /// Processes up to the prepared block size; `audio` is both the graph's
    /// input and its output, `midi` likewise. Samples past the block size and
    /// output channels the graph does not have are cleared.
    pub fn render(&mut self, audio: &mut AudioBuffer, midi: &mut MidiBuffer) {
        let Some((_, block_size)) = self.prepared else {
            audio.clear();
            midi.clear();
            return;
        };
        let num_samples = audio.num_samples().min(block_size);

        let Self {
            nodes,
            io,
            sequence,
            midi_channels,
            velocity_curve,
            transport,
            ..
        } = self;

        io.audio_in.set_num_samples(num_samples);
        io.audio_out.set_num_samples(num_samples);
        for ch in 0..io.audio_in.num_channels() {
            if ch < audio.num_channels() {
                io.audio_in
                    .copy_from_slice(ch, &audio.channel(ch)[..num_samples]);
            } else {
                io.audio_in.clear_channel(ch);
            }
        }

        io.midi_in.clear();
        if midi_channels.is_omni() && *velocity_curve == VelocityCurve::Linear {
            io.midi_in.copy_from(midi);
        } else {
            for ev in midi.iter() {
                let mut message = ev.message;
                let channel = message.channel();
                if channel > 0 && midi_channels.is_off(channel) {
                    continue;
                }
                if message.is_note_on() {
                    message.set_float_velocity(velocity_curve.process(message.float_velocity()));
                }
                io.midi_in.add(message, ev.frame);
            }
        }

        io.audio_out.clear();
        io.midi_out.clear();

        let mut ctx = OpContext {
            nodes: nodes.as_mut_slice(),
            io: &mut *io,
            num_samples,
            transport: *transport,
        };
        sequence.run(&mut ctx);

        for ch in 0..audio.num_channels() {
            let out = audio.channel_mut(ch);
            if ch < io.audio_out.num_channels() {
                out[..num_samples].copy_from_slice(&io.audio_out.channel(ch)[..num_samples]);
                out[num_samples..].fill(0.0);
            } else {
                out.fill(0.0);
            }
        }
        midi.copy_from(&io.midi_out);
    }
}

impl Node for Graph {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> &PortList {
        &self.ports
    }

    fn latency_samples(&self) -> usize {
        self.sequence.latency_samples()
    }

    fn prepare(&mut self, sample_rate: f64, block_size: usize) -> Result<(), NodeError> {
        Graph::prepare(self, sample_rate, block_size);
        Ok(())
    }

    fn release(&mut self) {
        Graph::release(self);
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        self.transport = ctx.transport;
        let num_samples = ctx.num_samples;
        ctx.audio.set_num_samples(num_samples);
        match ctx.midi.first_mut() {
            Some(midi) => Graph::render(self, ctx.audio, midi),
            None => {
                let mut scratch = MidiBuffer::new();
                Graph::render(self, ctx.audio, &mut scratch);
            }
        }
    }
}
