//! Top-level graphs and the multiplexer that switches between them.
//!
//! An engine hosts any number of [`RootGraph`]s. Every one of them renders on
//! every block so that switching is click-free: the multiplexer crossfades
//! the outgoing and incoming graphs over one block and sends note/pedal
//! kill messages to graphs that stop receiving live MIDI.
//!
//! In [`RenderMode::Single`] only the current graph is audible. Graphs in
//! [`RenderMode::Parallel`] are mixed together whenever the current graph is
//! parallel too.

use crate::buffer::AudioBuffer;
use crate::error::GraphError;
use crate::graph::Graph;
use crate::midi::{MidiBuffer, MidiMessage};
use crate::transport::TransportSnapshot;

/// How a root graph shares the output with its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum RenderMode {
    /// Audible only while it is the current graph.
    #[default]
    Single,
    /// Mixed with every other parallel graph while a parallel graph is current.
    Parallel,
}

impl RenderMode {
    /// Stable name used in session files.
    pub fn slug(self) -> &'static str {
        match self {
            RenderMode::Single => "single",
            RenderMode::Parallel => "parallel",
        }
    }

    /// Parses a slug produced by [`slug`](Self::slug), case-insensitively.
    pub fn from_slug(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Some(RenderMode::Single),
            "parallel" => Some(RenderMode::Parallel),
            _ => None,
        }
    }
}

/// A graph the engine can select, with its selection metadata.
pub struct RootGraph {
    graph: Graph,
    mode: RenderMode,
    midi_program: Option<u8>,
    suspended: bool,
}

impl RootGraph {
    /// Wraps a graph in single mode with no program assigned.
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            mode: RenderMode::Single,
            midi_program: None,
            suspended: false,
        }
    }

    /// Builder-style render mode.
    pub fn with_mode(mut self, mode: RenderMode) -> Self {
        self.mode = mode;
        self
    }

    /// Builder-style program assignment.
    pub fn with_midi_program(mut self, program: Option<u8>) -> Self {
        self.set_midi_program(program);
        self
    }

    /// The wrapped graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Mutable access to the wrapped graph.
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Unwraps the graph.
    pub fn into_graph(self) -> Graph {
        self.graph
    }

    /// Render mode.
    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Changes the render mode.
    pub fn set_mode(&mut self, mode: RenderMode) {
        self.mode = mode;
    }

    /// True in [`RenderMode::Single`].
    pub fn is_single(&self) -> bool {
        self.mode == RenderMode::Single
    }

    /// Program number that selects this graph.
    pub fn midi_program(&self) -> Option<u8> {
        self.midi_program
    }

    /// Assigns the selecting program. Values above 127 clear the assignment.
    pub fn set_midi_program(&mut self, program: Option<u8>) {
        self.midi_program = program.filter(|p| *p < 128);
    }

    /// True when the graph is bypassed.
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Bypasses the graph. A suspended graph passes its input through.
    pub fn set_suspended(&mut self, suspended: bool) {
        self.suspended = suspended;
    }

    /// True when the graph's MIDI channel filter lets `channel` through.
    pub fn accepts_midi_channel(&self, channel: u8) -> bool {
        self.graph.midi_channels().is_on(channel)
    }

    fn render(&mut self, audio: &mut AudioBuffer, midi: &mut MidiBuffer) {
        if !self.suspended {
            self.graph.render(audio, midi);
        }
    }
}

impl From<Graph> for RootGraph {
    fn from(graph: Graph) -> Self {
        Self::new(graph)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProgramRequest {
    program: u8,
    channel: u8,
}

/// Owns the root graphs and renders them into one output.
#[derive(Default)]
pub struct RootGraphs {
    graphs: Vec<RootGraph>,
    current: Option<usize>,
    last: Option<usize>,
    program: Option<ProgramRequest>,
    num_inputs: usize,
    num_outputs: usize,
    prepared: Option<(f64, usize)>,
    audio_temp: AudioBuffer,
    audio_out: AudioBuffer,
    midi_temp: MidiBuffer,
    midi_out: MidiBuffer,
}

impl RootGraphs {
    /// Creates an empty, unprepared multiplexer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates mixing buffers and prepares every graph.
    pub fn prepare(&mut self, sample_rate: f64, block_size: usize, inputs: usize, outputs: usize) {
        self.num_inputs = inputs;
        self.num_outputs = outputs;
        let channels = inputs.max(outputs);
        self.audio_temp.set_size(channels, block_size);
        self.audio_out.set_size(channels, block_size);
        self.midi_temp.clear();
        self.midi_out.clear();
        self.prepared = Some((sample_rate, block_size));
        for root in &mut self.graphs {
            root.graph.prepare(sample_rate, block_size);
        }
    }

    /// Releases every graph and shrinks the mixing buffers.
    pub fn release(&mut self) {
        for root in &mut self.graphs {
            root.graph.release();
        }
        self.prepared = None;
        self.num_inputs = 0;
        self.num_outputs = 0;
        self.audio_temp.set_size(1, 1);
        self.audio_out.set_size(1, 1);
        self.midi_temp.clear();
        self.midi_out.clear();
    }

    /// Returns true between [`prepare`](Self::prepare) and [`release`](Self::release).
    pub fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }

    /// Adds a graph, preparing it if the multiplexer is prepared. The first
    /// graph added becomes current. Returns its index.
    pub fn add(&mut self, mut root: RootGraph) -> usize {
        if let Some((sample_rate, block_size)) = self.prepared {
            root.graph.prepare(sample_rate, block_size);
        }
        self.graphs.push(root);
        let index = self.graphs.len() - 1;
        if index == 0 {
            self.current = Some(0);
            self.last = Some(0);
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("root_add: graph {index} of {}", self.graphs.len());
        index
    }

    /// Removes and releases the graph at `index`.
    ///
    /// Graphs after `index` move down one place and keep their selection.
    /// Removing the current graph selects the graph that takes its place (or
    /// the new last graph) and fades it in on the next block, as a switch.
    pub fn remove(&mut self, index: usize) -> Result<RootGraph, GraphError> {
        if index >= self.graphs.len() {
            return Err(GraphError::GraphIndexOutOfRange {
                index,
                count: self.graphs.len(),
            });
        }
        let mut root = self.graphs.remove(index);
        if self.prepared.is_some() {
            root.graph.release();
        }
        let len = self.graphs.len();
        self.current = match self.current {
            Some(c) if c > index => Some(c - 1),
            Some(c) if c == index => (len > 0).then(|| index.min(len - 1)),
            other => other,
        };
        // No graph is left to fade out when the audible one goes away.
        self.last = match self.last {
            Some(l) if l > index => Some(l - 1),
            Some(l) if l == index => None,
            other => other,
        };
        #[cfg(feature = "tracing")]
        tracing::debug!("root_remove: graph {index}, current now {:?}", self.current);
        Ok(root)
    }

    /// Number of graphs.
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    /// Returns true if there are no graphs.
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// Graph at `index`.
    pub fn get(&self, index: usize) -> Option<&RootGraph> {
        self.graphs.get(index)
    }

    /// Mutable graph at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut RootGraph> {
        self.graphs.get_mut(index)
    }

    /// Iterates the graphs in index order.
    pub fn iter(&self) -> impl Iterator<Item = &RootGraph> {
        self.graphs.iter()
    }

    /// Index of the graph selected for the next block.
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// The current graph.
    pub fn current(&self) -> Option<&RootGraph> {
        self.current.and_then(|i| self.graphs.get(i))
    }

    /// Selects the graph rendered from the next block on.
    pub fn set_current(&mut self, index: usize) -> Result<(), GraphError> {
        if index >= self.graphs.len() {
            return Err(GraphError::GraphIndexOutOfRange {
                index,
                count: self.graphs.len(),
            });
        }
        self.current = Some(index);
        Ok(())
    }

    /// Queues a program change as if it arrived in the previous block.
    pub fn request_program(&mut self, program: u8, channel: u8) {
        self.program = Some(ProgramRequest { program, channel });
    }

    /// Latency of the current graph in samples.
    pub fn latency_samples(&self) -> usize {
        self.current()
            .map_or(0, |root| root.graph.sequence().latency_samples())
    }

    fn find_graph_for_program(&self, request: ProgramRequest) -> Option<usize> {
        if request.program < 128 {
            let found = self.graphs.iter().position(|root| {
                root.midi_program == Some(request.program)
                    && root.accepts_midi_channel(request.channel)
            });
            if found.is_some() {
                return found;
            }
        }
        self.current
    }

    /// Renders one block through every graph.
    ///
    /// `audio` carries the input channels in and the mixed output out; `midi`
    /// is replaced with the merged MIDI output of the audible graphs.
    pub fn render(
        &mut self,
        audio: &mut AudioBuffer,
        midi: &mut MidiBuffer,
        transport: TransportSnapshot,
    ) {
        if let Some(request) = self.program.take() {
            self.current = self.find_graph_for_program(request);
        }

        let count = self.graphs.len();
        let (Some(current), Some((_, block_size))) =
            (self.current.filter(|&c| c < count), self.prepared)
        else {
            audio.clear();
            midi.clear();
            return;
        };

        let num_samples = audio.num_samples().min(block_size);
        let num_chans = audio.num_channels().min(self.audio_out.num_channels());
        let num_inputs = self.num_inputs.min(num_chans);
        let num_outputs = self.num_outputs.min(num_chans);
        let last = self.last.filter(|&l| l < count);
        let changed = last != Some(current);
        let current_single = self.graphs[current].is_single();
        let mode_changed =
            changed && last.is_some_and(|l| self.graphs[current].mode != self.graphs[l].mode);
        let last_single = last.is_some_and(|l| self.graphs[l].is_single());

        let Self {
            graphs,
            audio_temp,
            audio_out,
            midi_temp,
            midi_out,
            ..
        } = self;

        audio_out.set_num_samples(num_samples);
        audio_temp.set_num_samples(num_samples);
        audio_out.clear();
        midi_out.clear();

        for (index, root) in graphs.iter_mut().enumerate() {
            let single = root.is_single();
            let is_current = index == current;

            for ch in 0..audio_temp.num_channels() {
                if ch < num_inputs {
                    audio_temp.copy_from_slice(ch, &audio.channel(ch)[..num_samples]);
                } else {
                    audio_temp.clear_channel(ch);
                }
            }
            midi_temp.clear();

            if (Some(index) == last && changed && last_single) || (changed && current_single && !is_current) {
                for channel in 1..=16 {
                    midi_temp.add(MidiMessage::controller(channel, 64, 0), 0);
                    midi_temp.add(MidiMessage::controller(channel, 66, 0), 0);
                    midi_temp.add(MidiMessage::controller(channel, 69, 0), 0);
                    midi_temp.add(MidiMessage::all_notes_off(channel), 0);
                }
            } else if (is_current && single) || (!current_single && !single) {
                midi_temp.add_events(midi, 0, num_samples as u32, 0);
            }

            root.graph.set_transport(transport);
            root.render(audio_temp, midi_temp);

            if changed && ((current_single && !is_current) || (mode_changed && !current_single && single)) {
                mix_into(audio_out, audio_temp, num_outputs, Some((1.0, 0.0)));
            } else if (is_current && single) || (!single && !current_single) {
                let fade_in = changed && (single || (mode_changed && !single && !current_single));
                mix_into(audio_out, audio_temp, num_outputs, fade_in.then_some((0.0, 1.0)));
                midi_out.merge_from(midi_temp);
            }
        }

        for ch in 0..audio.num_channels() {
            let out = audio.channel_mut(ch);
            if ch < num_chans {
                out[..num_samples].copy_from_slice(audio_out.channel(ch));
                out[num_samples..].fill(0.0);
            } else {
                out.fill(0.0);
            }
        }

        let next_program = midi
            .iter()
            .filter(|ev| (ev.frame as usize) < num_samples && ev.message.is_program_change())
            .last()
            .map(|ev| ProgramRequest {
                program: ev.message.program_number(),
                channel: ev.message.channel(),
            });
        if next_program.is_some() {
            self.program = next_program;
        }

        midi.swap_with(&mut self.midi_out);
        self.last = Some(current);
    }
}

/// Adds the first `channels` channels of `src` into `dst`, optionally
/// scaled by a linear ramp.
fn mix_into(dst: &mut AudioBuffer, src: &mut AudioBuffer, channels: usize, ramp: Option<(f32, f32)>) {
    if let Some((start, end)) = ramp {
        src.apply_gain_ramp(0..channels, start, end);
    }
    for ch in 0..channels {
        dst.add_from_slice(ch, src.channel(ch));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_node::IoNode;
    use crate::node::{Node, RenderContext};
    use crate::port::{PortCount, PortList, PortType};

    /// Writes a constant to every audio output.
    struct Dc {
        ports: PortList,
        value: f32,
    }

    impl Node for Dc {
        fn name(&self) -> &str {
            "dc"
        }
        fn ports(&self) -> &PortList {
            &self.ports
        }
        fn render(&mut self, ctx: &mut RenderContext<'_>) {
            for ch in 0..2 {
                ctx.audio.channel_mut(ch).fill(self.value);
            }
        }
    }

    fn dc_graph(value: f32) -> Graph {
        let mut graph = Graph::new();
        let out = graph.add_node(Box::new(IoNode::audio_output()));
        let dc = graph.add_node(Box::new(Dc {
            ports: PortCount::new().with(PortType::Audio, 0, 2).to_port_list(),
            value,
        }));
        graph.add_connection(dc, 0, out, 0).unwrap();
        graph.add_connection(dc, 1, out, 1).unwrap();
        graph
    }

    fn render_block(graphs: &mut RootGraphs, midi: &mut MidiBuffer) -> AudioBuffer {
        let mut audio = AudioBuffer::new(2, 64);
        graphs.render(&mut audio, midi, TransportSnapshot::default());
        audio
    }

    #[test]
    fn test_mode_slugs() {
        assert_eq!(RenderMode::from_slug("Parallel"), Some(RenderMode::Parallel));
        assert_eq!(RenderMode::from_slug(RenderMode::Single.slug()), Some(RenderMode::Single));
        assert_eq!(RenderMode::from_slug("both"), None);
    }

    #[test]
    fn test_empty_renders_silence() {
        let mut graphs = RootGraphs::new();
        graphs.prepare(48000.0, 64, 2, 2);
        let mut audio = AudioBuffer::new(2, 64);
        audio.channel_mut(0).fill(1.0);
        let mut midi = MidiBuffer::new();
        midi.add(MidiMessage::note_on(1, 60, 100), 0);
        graphs.render(&mut audio, &mut midi, TransportSnapshot::default());
        assert_eq!(audio.peak(0), 0.0);
        assert!(midi.is_empty());
    }

    #[test]
    fn test_single_mode_only_current_is_audible() {
        let mut graphs = RootGraphs::new();
        graphs.prepare(48000.0, 64, 2, 2);
        graphs.add(dc_graph(0.25).into());
        graphs.add(dc_graph(0.5).into());
        let mut midi = MidiBuffer::new();
        let audio = render_block(&mut graphs, &mut midi);
        assert!((audio.channel(0)[10] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_switch_crossfades_over_one_block() {
        let mut graphs = RootGraphs::new();
        graphs.prepare(48000.0, 64, 2, 2);
        graphs.add(dc_graph(1.0).into());
        graphs.add(dc_graph(-1.0).into());
        let mut midi = MidiBuffer::new();
        render_block(&mut graphs, &mut midi);

        graphs.set_current(1).unwrap();
        let audio = render_block(&mut graphs, &mut midi);
        let ch = audio.channel(0);
        assert!(ch[0] > 0.9, "fade starts on the old graph: {}", ch[0]);
        assert!(ch[63] < -0.9, "fade ends on the new graph: {}", ch[63]);

        let audio = render_block(&mut graphs, &mut midi);
        assert!((audio.channel(0)[0] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_parallel_graphs_mix() {
        let mut graphs = RootGraphs::new();
        graphs.prepare(48000.0, 64, 2, 2);
        graphs.add(RootGraph::new(dc_graph(0.25)).with_mode(RenderMode::Parallel));
        graphs.add(RootGraph::new(dc_graph(0.5)).with_mode(RenderMode::Parallel));
        graphs.add(dc_graph(4.0).into());
        let mut midi = MidiBuffer::new();
        let audio = render_block(&mut graphs, &mut midi);
        assert!((audio.channel(1)[5] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_program_change_selects_graph_next_block() {
        let mut graphs = RootGraphs::new();
        graphs.prepare(48000.0, 64, 2, 2);
        graphs.add(dc_graph(0.1).into());
        graphs.add(RootGraph::new(dc_graph(0.2)).with_midi_program(Some(5)));

        let mut midi = MidiBuffer::new();
        midi.add(MidiMessage::program_change(1, 5), 3);
        render_block(&mut graphs, &mut midi);
        assert_eq!(graphs.current_index(), Some(0));

        let mut midi = MidiBuffer::new();
        render_block(&mut graphs, &mut midi);
        assert_eq!(graphs.current_index(), Some(1));
    }

    #[test]
    fn test_program_filtered_by_channel() {
        let mut graphs = RootGraphs::new();
        graphs.prepare(48000.0, 64, 2, 2);
        graphs.add(dc_graph(0.1).into());
        let mut filtered = RootGraph::new(dc_graph(0.2)).with_midi_program(Some(5));
        filtered
            .graph_mut()
            .set_midi_channels(crate::midi::MidiChannels::single(2));
        graphs.add(filtered);

        graphs.request_program(5, 1);
        let mut midi = MidiBuffer::new();
        render_block(&mut graphs, &mut midi);
        assert_eq!(graphs.current_index(), Some(0));

        graphs.request_program(5, 2);
        render_block(&mut graphs, &mut midi);
        assert_eq!(graphs.current_index(), Some(1));
    }

    #[test]
    fn test_remove_before_current_keeps_selection() {
        let mut graphs = RootGraphs::new();
        graphs.prepare(48000.0, 64, 2, 2);
        graphs.add(dc_graph(0.1).into());
        graphs.add(dc_graph(0.2).into());
        graphs.add(dc_graph(0.3).into());
        graphs.set_current(1).unwrap();
        let mut midi = MidiBuffer::new();
        render_block(&mut graphs, &mut midi);
        render_block(&mut graphs, &mut midi);

        graphs.remove(0).unwrap();
        assert_eq!(graphs.current_index(), Some(0));
        let audio = render_block(&mut graphs, &mut midi);
        assert!((audio.channel(0)[0] - 0.2).abs() < 1e-6, "got {}", audio.channel(0)[0]);
        assert!((audio.channel(0)[63] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_removing_current_fades_in_replacement() {
        let mut graphs = RootGraphs::new();
        graphs.prepare(48000.0, 64, 2, 2);
        graphs.add(dc_graph(0.2).into());
        graphs.add(dc_graph(0.3).into());
        let mut midi = MidiBuffer::new();
        render_block(&mut graphs, &mut midi);

        graphs.remove(0).unwrap();
        assert_eq!(graphs.current_index(), Some(0));
        let audio = render_block(&mut graphs, &mut midi);
        let ch = audio.channel(0);
        assert!(ch[0].abs() < 0.01, "fade starts from silence: {}", ch[0]);
        assert!((ch[63] - 0.3).abs() < 0.01, "fade ends on the replacement: {}", ch[63]);

        let audio = render_block(&mut graphs, &mut midi);
        assert!((audio.channel(0)[0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_remove_clamps_indices() {
        let mut graphs = RootGraphs::new();
        graphs.add(dc_graph(0.1).into());
        graphs.add(dc_graph(0.2).into());
        graphs.set_current(1).unwrap();
        graphs.remove(1).unwrap();
        assert_eq!(graphs.current_index(), Some(0));
        assert!(matches!(
            graphs.set_current(3),
            Err(GraphError::GraphIndexOutOfRange { index: 3, count: 1 })
        ));
        graphs.remove(0).unwrap();
        assert_eq!(graphs.current_index(), None);
    }

    #[test]
    fn test_suspended_passes_input() {
        let mut graphs = RootGraphs::new();
        graphs.prepare(48000.0, 64, 2, 2);
        let mut root = RootGraph::new(dc_graph(0.5));
        root.set_suspended(true);
        graphs.add(root);
        let mut audio = AudioBuffer::new(2, 64);
        audio.channel_mut(0).fill(0.3);
        let mut midi = MidiBuffer::new();
        graphs.render(&mut audio, &mut midi, TransportSnapshot::default());
        assert!((audio.channel(0)[0] - 0.3).abs() < 1e-6);
        assert_eq!(audio.peak(1), 0.0);
    }
}
