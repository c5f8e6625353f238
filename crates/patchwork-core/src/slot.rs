//! Graph-owned per-node storage and the graph's external I/O bus.

use std::sync::Arc;

use crate::buffer::AudioBuffer;
use crate::controls::NodeControls;
use crate::midi::MidiBuffer;
use crate::node::{Node, NodeId};

/// A node together with the state the graph keeps for it.
pub(crate) struct NodeSlot {
    pub id: NodeId,
    pub node: Box<dyn Node>,
    pub controls: Arc<NodeControls>,
    /// Format the node was prepared with, `None` when unprepared.
    pub prepared: Option<(f64, usize)>,
    /// Set when the last `prepare` call failed.
    pub prepare_failed: bool,
}

impl NodeSlot {
    pub fn new(id: NodeId, node: Box<dyn Node>) -> Self {
        Self {
            id,
            node,
            controls: Arc::new(NodeControls::new()),
            prepared: None,
            prepare_failed: false,
        }
    }

    /// Prepares the node for `sample_rate`/`block_size`, scaled by its
    /// oversampling factor. A node already prepared with the same format is
    /// left alone; one prepared with a different format is released first.
    pub fn prepare(&mut self, sample_rate: f64, block_size: usize) {
        if self.prepared == Some((sample_rate, block_size)) {
            return;
        }
        if self.prepared.is_some() {
            self.node.release();
            self.prepared = None;
        }
        let factor = self.node.oversampling_factor().max(1);
        match self
            .node
            .prepare(sample_rate * factor as f64, block_size * factor)
        {
            Ok(()) => {
                self.prepared = Some((sample_rate, block_size));
                self.prepare_failed = false;
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "node {} ({}) failed to prepare: {_err}",
                    self.id,
                    self.node.name()
                );
                self.prepare_failed = true;
            }
        }
    }

    pub fn release(&mut self) {
        if self.prepared.take().is_some() {
            self.node.release();
        }
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }
}

/// Audio and MIDI crossing the graph boundary during one render call.
#[derive(Debug, Default)]
pub(crate) struct GraphIo {
    pub audio_in: AudioBuffer,
    pub audio_out: AudioBuffer,
    pub midi_in: MidiBuffer,
    pub midi_out: MidiBuffer,
}

impl GraphIo {
    pub fn allocate(&mut self, inputs: usize, outputs: usize, block_size: usize) {
        self.audio_in = AudioBuffer::new(inputs, block_size);
        self.audio_out = AudioBuffer::new(outputs, block_size);
        self.midi_in.clear();
        self.midi_out.clear();
    }
}
