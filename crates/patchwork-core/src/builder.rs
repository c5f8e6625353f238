//! Rendering-sequence compilation.
//!
//! Walks the ordered nodes once, assigning every port a pool buffer and
//! emitting the copy/mix/delay ops that route signal between them, followed
//! by one [`ProcessBufferOp`] per node.
//!
//! # Buffer Assignment
//!
//! Each pool keeps an ownership table. A buffer is either the read-only
//! empty buffer (index 0), free, anonymous scratch for the current node, or
//! owned by the output port that last wrote it. After each node, any buffer
//! whose owner is not read by a node still to come is freed, so pool size
//! tracks the widest point of the graph rather than its port count.
//!
//! # Latency
//!
//! Every node's effective delay is the maximum delay of its direct sources
//! plus its own latency. Sources arriving earlier than that maximum are
//! padded with [`RenderOp::DelayChannel`] so all inputs line up.
//!
//! # Degenerate Input
//!
//! A source whose buffer cannot be found binds to the empty buffer instead of
//! failing. When the source is ordered at or after the reader this is the
//! expected break of a feedback cycle; when it was already processed the
//! table is inconsistent. The two cases are counted separately in
//! [`BuildStats`].

use std::collections::HashMap;

use crate::buffer::DelayLine;
use crate::connection::ConnectionTable;
use crate::node::{NodeId, NodeRole};
use crate::ops::{Pools, RenderOp};
use crate::param::LinearSmoothedParam;
use crate::port::PortType;
use crate::process::{ChannelBindings, ProcessBufferOp};
use crate::slot::NodeSlot;

/// Ramp time used when a Control value drives a CV input.
const PARAM_TO_CV_RAMP_MS: f32 = 5.0;

/// Pool sizes a sequence needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferCounts {
    /// Audio and CV buffers, including the empty buffer.
    pub audio: usize,
    /// MIDI buffers, including the empty buffer.
    pub midi: usize,
    /// Control slots, including the empty slot.
    pub control: usize,
    /// Atom buffers, including the empty buffer.
    pub atom: usize,
}

/// Diagnostics gathered while compiling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Source lookups that broke a feedback cycle.
    pub feedback_breaks: usize,
    /// Source lookups that failed for an already processed source.
    pub table_misses: usize,
    /// Audio endpoints skipped for having no ports in their direction.
    pub skipped_nodes: usize,
}

/// A compiled graph: ops, the pools they run against, and build metadata.
#[derive(Debug, Default)]
pub struct RenderSequence {
    ops: Vec<RenderOp>,
    pools: Pools,
    counts: BufferCounts,
    latency: usize,
    stats: BuildStats,
    order: Vec<NodeId>,
    generation: u64,
}

impl RenderSequence {
    /// Topology generation of the graph this was compiled from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Ops in execution order.
    pub fn ops(&self) -> &[RenderOp] {
        &self.ops
    }

    /// Number of ops.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if nothing would run.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Pool sizes.
    pub fn buffer_counts(&self) -> BufferCounts {
        self.counts
    }

    /// Latency of the graph's audio output, in samples.
    pub fn latency_samples(&self) -> usize {
        self.latency
    }

    /// Build diagnostics.
    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    /// Node render order.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub(crate) fn run(&mut self, ctx: &mut crate::ops::OpContext<'_>) {
        self.pools.begin_block(ctx.num_samples);
        for op in &mut self.ops {
            op.perform(&mut self.pools, ctx);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Owner {
    Zero,
    Free,
    Anonymous,
    Port(NodeId, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pool {
    Audio = 0,
    Midi = 1,
    Control = 2,
    Atom = 3,
}

impl Pool {
    fn of(port_type: PortType) -> Self {
        match port_type {
            PortType::Audio | PortType::Cv => Pool::Audio,
            PortType::Midi => Pool::Midi,
            PortType::Control => Pool::Control,
            PortType::Atom => Pool::Atom,
        }
    }
}

struct Builder<'a> {
    nodes: &'a [NodeSlot],
    order: &'a [usize],
    connections: &'a ConnectionTable,
    sample_rate: f64,
    block_size: usize,
    slot_of: HashMap<NodeId, usize>,
    step_of: HashMap<NodeId, usize>,
    tables: [Vec<Owner>; 4],
    delays: HashMap<NodeId, usize>,
    ops: Vec<RenderOp>,
    stats: BuildStats,
    latency: usize,
}

/// Compiles `order` (indices into `nodes`) into a render sequence.
pub(crate) fn compile(
    nodes: &[NodeSlot],
    order: &[usize],
    connections: &ConnectionTable,
    sample_rate: f64,
    block_size: usize,
    generation: u64,
) -> RenderSequence {
    let mut builder = Builder {
        nodes,
        order,
        connections,
        sample_rate,
        block_size,
        slot_of: nodes.iter().enumerate().map(|(i, s)| (s.id, i)).collect(),
        step_of: order
            .iter()
            .enumerate()
            .map(|(step, &slot)| (nodes[slot].id, step))
            .collect(),
        tables: core::array::from_fn(|_| vec![Owner::Zero]),
        delays: HashMap::new(),
        ops: Vec::new(),
        stats: BuildStats::default(),
        latency: 0,
    };
    for step in 0..order.len() {
        builder.build_node(step);
        builder.mark_unused_buffers_free(step);
    }

    let counts = BufferCounts {
        audio: builder.tables[Pool::Audio as usize].len(),
        midi: builder.tables[Pool::Midi as usize].len(),
        control: builder.tables[Pool::Control as usize].len(),
        atom: builder.tables[Pool::Atom as usize].len(),
    };
    RenderSequence {
        pools: Pools::new(counts.audio, counts.midi, counts.atom, block_size),
        ops: builder.ops,
        counts,
        latency: builder.latency,
        stats: builder.stats,
        order: order.iter().map(|&slot| nodes[slot].id).collect(),
        generation,
    }
}

impl Builder<'_> {
    fn table(&mut self, pool: Pool) -> &mut Vec<Owner> {
        &mut self.tables[pool as usize]
    }

    fn get_free_buffer(&mut self, pool: Pool) -> usize {
        let table = self.table(pool);
        match table.iter().skip(1).position(|o| *o == Owner::Free) {
            Some(i) => i + 1,
            None => {
                table.push(Owner::Free);
                table.len() - 1
            }
        }
    }

    fn claim(&mut self, pool: Pool, owner: Owner) -> usize {
        let buf = self.get_free_buffer(pool);
        self.table(pool)[buf] = owner;
        buf
    }

    fn get_buffer_containing(&self, pool: Pool, node: NodeId, port: usize) -> Option<usize> {
        self.tables[pool as usize]
            .iter()
            .rposition(|o| *o == Owner::Port(node, port))
    }

    fn is_buffer_needed_later(
        &self,
        step: usize,
        ignore_port: Option<usize>,
        source: NodeId,
        source_port: usize,
    ) -> bool {
        self.connections
            .from_port(source, source_port)
            .any(|c| match self.step_of.get(&c.dest) {
                Some(&dest_step) if dest_step > step => true,
                Some(&dest_step) if dest_step == step => Some(c.dest_port) != ignore_port,
                _ => false,
            })
    }

    fn mark_unused_buffers_free(&mut self, step: usize) {
        for pool in [Pool::Audio, Pool::Midi, Pool::Control, Pool::Atom] {
            for i in 1..self.tables[pool as usize].len() {
                let free = match self.tables[pool as usize][i] {
                    Owner::Anonymous => true,
                    Owner::Port(node, port) => !self.is_buffer_needed_later(step + 1, None, node, port),
                    Owner::Zero | Owner::Free => false,
                };
                if free {
                    self.table(pool)[i] = Owner::Free;
                }
            }
        }
    }

    fn delay_of(&self, node: NodeId) -> usize {
        self.delays.get(&node).copied().unwrap_or(0)
    }

    fn source_port_type(&self, node: NodeId, port: usize) -> Option<PortType> {
        let slot = *self.slot_of.get(&node)?;
        self.nodes[slot].node.ports().port_type(port)
    }

    /// Records a failed source lookup and returns the empty buffer.
    fn lookup_miss(&mut self, step: usize, source: NodeId, dest: NodeId) -> usize {
        match self.step_of.get(&source) {
            Some(&source_step) if source_step < step => {
                self.stats.table_misses += 1;
                #[cfg(feature = "tracing")]
                tracing::warn!("graph_build: no buffer for processed source {source} → {dest}");
            }
            _ => {
                self.stats.feedback_breaks += 1;
                #[cfg(feature = "tracing")]
                tracing::debug!("graph_build: feedback break {source} → {dest}");
            }
        }
        #[cfg(not(feature = "tracing"))]
        let _ = dest;
        0
    }

    fn emit_clear(&mut self, port_type: PortType, buffer: usize) {
        match Pool::of(port_type) {
            Pool::Audio => self.ops.push(RenderOp::ClearChannel { buffer }),
            Pool::Midi => self.ops.push(RenderOp::ClearMidi { buffer }),
            Pool::Atom => self.ops.push(RenderOp::ClearAtom { buffer }),
            Pool::Control => {}
        }
    }

    fn emit_copy(&mut self, port_type: PortType, src: usize, dst: usize) {
        match Pool::of(port_type) {
            Pool::Audio => self.ops.push(RenderOp::CopyChannel { src, dst }),
            Pool::Midi => self.ops.push(RenderOp::CopyMidi { src, dst }),
            Pool::Atom => self.ops.push(RenderOp::CopyAtom { src, dst }),
            Pool::Control => {}
        }
    }

    fn emit_add(&mut self, port_type: PortType, src: usize, dst: usize) {
        match Pool::of(port_type) {
            Pool::Audio => self.ops.push(RenderOp::AddChannel { src, dst }),
            Pool::Midi => self.ops.push(RenderOp::AddMidi { src, dst }),
            Pool::Atom => self.ops.push(RenderOp::AddAtom { src, dst }),
            Pool::Control => {}
        }
    }

    fn emit_delay(&mut self, buffer: usize, delay: usize) {
        if buffer != 0 && delay > 0 {
            self.ops.push(RenderOp::DelayChannel {
                buffer,
                delay: DelayLine::new(delay),
            });
        }
    }

    /// Fresh anonymous audio buffer filled from a Control output.
    fn emit_param_to_cv(&mut self, source: NodeId, source_port: usize) -> usize {
        let buffer = self.claim(Pool::Audio, Owner::Anonymous);
        let source_slot = self.slot_of.get(&source).copied().unwrap_or(0);
        let initial = self
            .nodes
            .get(source_slot)
            .and_then(|s| s.node.parameter(source_port))
            .unwrap_or(0.0);
        self.ops.push(RenderOp::ApplyParamToCv {
            source,
            source_slot,
            source_port,
            buffer,
            value: LinearSmoothedParam::with_config(
                initial,
                self.sample_rate as f32,
                PARAM_TO_CV_RAMP_MS,
            ),
        });
        buffer
    }

    fn build_node(&mut self, step: usize) {
        let nodes = self.nodes;
        let slot_index = self.order[step];
        let slot = &nodes[slot_index];
        let id = slot.id;
        let ports = slot.node.ports();
        let role = slot.node.role();
        let counts = ports.counts();

        let skip = match role {
            NodeRole::AudioInput => counts.get(PortType::Audio, false) == 0,
            NodeRole::AudioOutput => counts.get(PortType::Audio, true) == 0,
            _ => false,
        };
        if skip {
            self.stats.skipped_nodes += 1;
            #[cfg(feature = "tracing")]
            tracing::debug!("graph_build: skipping endpoint {id} with no ports");
            return;
        }

        let max_latency = self
            .connections
            .to_node(id)
            .map(|c| self.delay_of(c.source))
            .max()
            .unwrap_or(0);

        let mut bindings = ChannelBindings::for_counts(&counts);

        for port in ports.iter() {
            let port_type = port.port_type;
            let pool = Pool::of(port_type);
            let chan = port.channel;
            let num_ins = counts.get(port_type, true);
            let num_outs = counts.get(port_type, false);

            if !port.is_input {
                if port_type == PortType::Control {
                    self.claim(pool, Owner::Port(id, port.index));
                } else if chan >= num_ins && chan < num_outs {
                    let buf = self.claim(pool, Owner::Port(id, port.index));
                    if let Some(slots) = bindings.slot_mut(port_type) {
                        slots[chan] = buf;
                    }
                }
                continue;
            }

            let mut sources: Vec<(NodeId, usize)> = self
                .connections
                .to_port(id, port.index)
                .map(|c| (c.source, c.source_port))
                .collect();
            sources.sort_unstable();

            if port_type == PortType::Control {
                if let [(source, source_port)] = sources[..] {
                    if let Some(&source_slot) = self.slot_of.get(&source) {
                        self.ops.push(RenderOp::BindParameter {
                            source,
                            source_slot,
                            source_port,
                            dest: id,
                            dest_slot: slot_index,
                            dest_port: port.index,
                        });
                    }
                }
                continue;
            }

            let buf = match sources.len() {
                0 => {
                    if port_type.is_sample_stream() && chan >= num_outs {
                        0
                    } else {
                        let buf = self.claim(pool, Owner::Anonymous);
                        self.emit_clear(port_type, buf);
                        buf
                    }
                }
                1 => self.single_source(
                    step,
                    id,
                    port.index,
                    port_type,
                    chan,
                    num_outs,
                    sources[0],
                    max_latency,
                ),
                _ => self.many_sources(step, id, port.index, port_type, &sources, max_latency),
            };

            if let Some(slots) = bindings.slot_mut(port_type) {
                slots[chan] = buf;
            }
            if chan < num_outs && buf != 0 {
                if let Some(out_port) = ports.port_for_channel(port_type, chan, false) {
                    self.table(pool)[buf] = Owner::Port(id, out_port);
                }
            }
        }

        let controls = &slot.controls;
        let op = ProcessBufferOp::new(
            id,
            slot_index,
            role,
            counts,
            bindings,
            slot.node.oversampling_factor(),
            self.block_size,
            controls,
        );
        let node_delay = max_latency
            + slot.node.latency_samples()
            + op.oversampling_latency()
            + controls.delay_compensation_samples(self.sample_rate);
        self.delays.insert(id, node_delay);

        if role.is_audio_io() && counts.get(PortType::Audio, false) == 0 {
            self.latency = self.latency.max(max_latency);
        }

        self.ops.push(RenderOp::ProcessBuffer(Box::new(op)));
    }

    #[allow(clippy::too_many_arguments)]
    fn single_source(
        &mut self,
        step: usize,
        id: NodeId,
        port: usize,
        port_type: PortType,
        chan: usize,
        num_outs: usize,
        (source, source_port): (NodeId, usize),
        max_latency: usize,
    ) -> usize {
        let pool = Pool::of(port_type);
        let source_type = self.source_port_type(source, source_port);

        if source_type == Some(PortType::Control) {
            return self.emit_param_to_cv(source, source_port);
        }

        let Some(found) = self.get_buffer_containing(pool, source, source_port) else {
            self.lookup_miss(step, source, id);
            if chan < num_outs {
                let buf = self.claim(pool, Owner::Anonymous);
                self.emit_clear(port_type, buf);
                return buf;
            }
            return 0;
        };

        let mut buf = found;
        let source_delay = self.delay_of(source);
        let delayed = port_type.is_sample_stream() && source_delay < max_latency;
        let needed_later = self.is_buffer_needed_later(step, Some(port), source, source_port);
        if needed_later && (chan < num_outs || delayed || !port_type.is_sample_stream()) {
            buf = self.claim(pool, Owner::Anonymous);
            self.emit_copy(port_type, found, buf);
        }

        if delayed {
            self.emit_delay(buf, max_latency - source_delay);
        }
        buf
    }

    fn many_sources(
        &mut self,
        step: usize,
        id: NodeId,
        port: usize,
        port_type: PortType,
        sources: &[(NodeId, usize)],
        max_latency: usize,
    ) -> usize {
        let pool = Pool::of(port_type);
        let sample_stream = port_type.is_sample_stream();

        let reusable = sources.iter().enumerate().find_map(|(i, &(source, source_port))| {
            if self.source_port_type(source, source_port) != Some(port_type) {
                return None;
            }
            let buf = self.get_buffer_containing(pool, source, source_port)?;
            (!self.is_buffer_needed_later(step, Some(port), source, source_port)).then_some((i, buf))
        });

        let (target_index, buf) = match reusable {
            Some((i, buf)) => {
                let source_delay = self.delay_of(sources[i].0);
                if sample_stream && source_delay < max_latency {
                    self.emit_delay(buf, max_latency - source_delay);
                }
                (i, buf)
            }
            None => {
                let buf = self.claim(pool, Owner::Anonymous);
                let (source, source_port) = sources[0];
                match self.get_buffer_containing(pool, source, source_port) {
                    Some(found) => {
                        self.emit_copy(port_type, found, buf);
                        let source_delay = self.delay_of(source);
                        if sample_stream && source_delay < max_latency {
                            self.emit_delay(buf, max_latency - source_delay);
                        }
                    }
                    None => {
                        self.lookup_miss(step, source, id);
                        self.emit_clear(port_type, buf);
                    }
                }
                (0, buf)
            }
        };

        for (i, &(source, source_port)) in sources.iter().enumerate() {
            if i == target_index {
                continue;
            }
            let Some(mut from) = self.get_buffer_containing(pool, source, source_port) else {
                self.lookup_miss(step, source, id);
                continue;
            };
            let source_delay = self.delay_of(source);
            if sample_stream && source_delay < max_latency {
                let delay = max_latency - source_delay;
                if self.is_buffer_needed_later(step, Some(port), source, source_port) {
                    let temp = self.claim(pool, Owner::Anonymous);
                    self.emit_copy(port_type, from, temp);
                    from = temp;
                }
                self.emit_delay(from, delay);
            }
            self.emit_add(port_type, from, buf);
        }
        buf
    }
}
