//! Primitive render operations.
//!
//! A compiled sequence is a flat `Vec<RenderOp>` executed strictly in order
//! against the sequence's buffer pools. Buffer indices are pool indices; index
//! 0 of every pool is the read-only empty buffer and no op writes to it.
//!
//! Only two ops carry state between blocks: [`RenderOp::DelayChannel`] (its
//! ring buffer) and [`RenderOp::ProcessBuffer`] (gain-ramp memory and scratch).

use core::fmt;

use crate::atom::AtomBuffer;
use crate::buffer::{AudioBuffer, DelayLine};
use crate::midi::MidiBuffer;
use crate::node::NodeId;
use crate::param::LinearSmoothedParam;
use crate::process::ProcessBufferOp;
use crate::slot::{GraphIo, NodeSlot};
use crate::transport::TransportSnapshot;

/// The shared buffers a sequence renders into.
#[derive(Debug, Default)]
pub(crate) struct Pools {
    pub audio: AudioBuffer,
    pub midi: Vec<MidiBuffer>,
    pub atom: Vec<AtomBuffer>,
}

impl Pools {
    pub fn new(audio: usize, midi: usize, atom: usize, block_size: usize) -> Self {
        Self {
            audio: AudioBuffer::new(audio.max(1), block_size),
            midi: (0..midi.max(1)).map(|_| MidiBuffer::new()).collect(),
            atom: (0..atom.max(1)).map(|_| AtomBuffer::new()).collect(),
        }
    }

    /// Resets the read-only empty buffers and sets the active block length.
    pub fn begin_block(&mut self, num_samples: usize) {
        self.audio.set_num_samples(num_samples);
        self.audio.clear_channel(0);
        self.midi[0].clear();
        self.atom[0].clear();
    }
}

/// Everything an op may touch besides the pools.
pub(crate) struct OpContext<'a> {
    pub nodes: &'a mut [NodeSlot],
    pub io: &'a mut GraphIo,
    pub num_samples: usize,
    pub transport: TransportSnapshot,
}

/// Borrows `items[src]` immutably and `items[dst]` mutably.
pub(crate) fn pair_mut<T>(items: &mut [T], src: usize, dst: usize) -> Option<(&T, &mut T)> {
    if src == dst || src >= items.len() || dst >= items.len() {
        return None;
    }
    if src < dst {
        let (lo, hi) = items.split_at_mut(dst);
        Some((&lo[src], &mut hi[0]))
    } else {
        let (lo, hi) = items.split_at_mut(src);
        Some((&hi[0], &mut lo[dst]))
    }
}

/// The slot at `index`, provided it still holds node `id`.
pub(crate) fn slot_of(nodes: &[NodeSlot], index: usize, id: NodeId) -> Option<&NodeSlot> {
    nodes.get(index).filter(|s| s.id == id)
}

/// Mutable form of [`slot_of`].
pub(crate) fn slot_of_mut(nodes: &mut [NodeSlot], index: usize, id: NodeId) -> Option<&mut NodeSlot> {
    nodes.get_mut(index).filter(|s| s.id == id)
}

/// One step of a compiled rendering sequence.
pub enum RenderOp {
    /// Zero an audio/CV buffer.
    ClearChannel {
        /// Pool index.
        buffer: usize,
    },
    /// Copy one audio/CV buffer onto another.
    CopyChannel {
        /// Source pool index.
        src: usize,
        /// Destination pool index.
        dst: usize,
    },
    /// Accumulate one audio/CV buffer into another.
    AddChannel {
        /// Source pool index.
        src: usize,
        /// Destination pool index.
        dst: usize,
    },
    /// Delay an audio/CV buffer in place.
    DelayChannel {
        /// Pool index.
        buffer: usize,
        /// Persistent delay state.
        delay: DelayLine,
    },
    /// Empty a MIDI buffer.
    ClearMidi {
        /// Pool index.
        buffer: usize,
    },
    /// Replace a MIDI buffer with another.
    CopyMidi {
        /// Source pool index.
        src: usize,
        /// Destination pool index.
        dst: usize,
    },
    /// Merge one MIDI buffer into another.
    AddMidi {
        /// Source pool index.
        src: usize,
        /// Destination pool index.
        dst: usize,
    },
    /// Empty an atom buffer.
    ClearAtom {
        /// Pool index.
        buffer: usize,
    },
    /// Replace an atom buffer with another.
    CopyAtom {
        /// Source pool index.
        src: usize,
        /// Destination pool index.
        dst: usize,
    },
    /// Merge one atom buffer into another.
    AddAtom {
        /// Source pool index.
        src: usize,
        /// Destination pool index.
        dst: usize,
    },
    /// Forward a Control output value to a Control input.
    BindParameter {
        /// Source node.
        source: NodeId,
        /// Source slot in the graph's node storage.
        source_slot: usize,
        /// Source port.
        source_port: usize,
        /// Destination node.
        dest: NodeId,
        /// Destination slot in the graph's node storage.
        dest_slot: usize,
        /// Destination port.
        dest_port: usize,
    },
    /// Render a Control output value into a CV buffer.
    ApplyParamToCv {
        /// Source node.
        source: NodeId,
        /// Source slot in the graph's node storage.
        source_slot: usize,
        /// Source port.
        source_port: usize,
        /// Destination pool index.
        buffer: usize,
        /// Smoothing state.
        value: LinearSmoothedParam,
    },
    /// Run a node.
    ProcessBuffer(Box<ProcessBufferOp>),
}

impl RenderOp {
    /// Executes the op.
    pub(crate) fn perform(&mut self, pools: &mut Pools, ctx: &mut OpContext<'_>) {
        match self {
            RenderOp::ClearChannel { buffer } => pools.audio.clear_channel(*buffer),
            RenderOp::CopyChannel { src, dst } => pools.audio.copy_channel(*src, *dst),
            RenderOp::AddChannel { src, dst } => pools.audio.add_channel(*src, *dst),
            RenderOp::DelayChannel { buffer, delay } => {
                delay.process_inplace(pools.audio.channel_mut(*buffer));
            }
            RenderOp::ClearMidi { buffer } => pools.midi[*buffer].clear(),
            RenderOp::CopyMidi { src, dst } => {
                if let Some((from, to)) = pair_mut(&mut pools.midi, *src, *dst) {
                    to.copy_from(from);
                }
            }
            RenderOp::AddMidi { src, dst } => {
                if let Some((from, to)) = pair_mut(&mut pools.midi, *src, *dst) {
                    to.merge_from(from);
                }
            }
            RenderOp::ClearAtom { buffer } => pools.atom[*buffer].clear(),
            RenderOp::CopyAtom { src, dst } => {
                if let Some((from, to)) = pair_mut(&mut pools.atom, *src, *dst) {
                    to.copy_from(from);
                }
            }
            RenderOp::AddAtom { src, dst } => {
                if let Some((from, to)) = pair_mut(&mut pools.atom, *src, *dst) {
                    to.merge_from(from);
                }
            }
            RenderOp::BindParameter {
                source,
                source_slot,
                source_port,
                dest,
                dest_slot,
                dest_port,
            } => {
                let value = slot_of(ctx.nodes, *source_slot, *source)
                    .and_then(|s| s.node.parameter(*source_port));
                if let (Some(value), Some(dest)) = (value, slot_of_mut(ctx.nodes, *dest_slot, *dest)) {
                    dest.node.set_parameter(*dest_port, value);
                }
            }
            RenderOp::ApplyParamToCv {
                source,
                source_slot,
                source_port,
                buffer,
                value,
            } => {
                if let Some(v) =
                    slot_of(ctx.nodes, *source_slot, *source).and_then(|s| s.node.parameter(*source_port))
                {
                    value.set_target(v);
                }
                value.fill(pools.audio.channel_mut(*buffer));
            }
            RenderOp::ProcessBuffer(op) => op.perform(pools, ctx),
        }
    }

    /// Node run by a ProcessBuffer op.
    pub fn process_node(&self) -> Option<NodeId> {
        match self {
            RenderOp::ProcessBuffer(op) => Some(op.node_id()),
            _ => None,
        }
    }
}

impl fmt::Display for RenderOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderOp::ClearChannel { buffer } => write!(f, "ClearChannel audio[{buffer}]"),
            RenderOp::CopyChannel { src, dst } => {
                write!(f, "CopyChannel audio[{src}] → audio[{dst}]")
            }
            RenderOp::AddChannel { src, dst } => {
                write!(f, "AddChannel audio[{src}] → audio[{dst}]")
            }
            RenderOp::DelayChannel { buffer, delay } => {
                write!(f, "DelayChannel audio[{buffer}] by {}", delay.delay())
            }
            RenderOp::ClearMidi { buffer } => write!(f, "ClearMidi midi[{buffer}]"),
            RenderOp::CopyMidi { src, dst } => write!(f, "CopyMidi midi[{src}] → midi[{dst}]"),
            RenderOp::AddMidi { src, dst } => write!(f, "AddMidi midi[{src}] → midi[{dst}]"),
            RenderOp::ClearAtom { buffer } => write!(f, "ClearAtom atom[{buffer}]"),
            RenderOp::CopyAtom { src, dst } => write!(f, "CopyAtom atom[{src}] → atom[{dst}]"),
            RenderOp::AddAtom { src, dst } => write!(f, "AddAtom atom[{src}] → atom[{dst}]"),
            RenderOp::BindParameter {
                source,
                source_port,
                dest,
                dest_port,
                ..
            } => write!(
                f,
                "BindParameter node[{source}]:{source_port} → node[{dest}]:{dest_port}"
            ),
            RenderOp::ApplyParamToCv {
                source,
                source_port,
                buffer,
                ..
            } => write!(f, "ApplyParamToCv node[{source}]:{source_port} → audio[{buffer}]"),
            RenderOp::ProcessBuffer(op) => write!(f, "{op}"),
        }
    }
}

impl fmt::Debug for RenderOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
