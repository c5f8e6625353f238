//! The audio engine: root graphs, transport and MIDI clock behind one
//! per-callback entry point.
//!
//! [`Engine`] lives on the audio thread. Everything other threads may want to
//! change while it runs goes through a cloneable [`EngineHandle`]:
//!
//! - active graph selection and clock source flags are atomics,
//! - transport requests go through the shared [`TransportRequests`],
//! - incoming MIDI is queued on a bounded crossbeam channel and drained at the
//!   start of each block,
//! - the MIDI clock follower sits behind a mutex only the MIDI input thread
//!   locks.
//!
//! ```rust,ignore
//! let mut engine = Engine::new(EngineSettings::default());
//! engine.add_graph(RootGraph::new(graph));
//! let handle = engine.handle();
//! handle.transport().request_play_state(true);
//! engine.process(&mut audio, &mut midi);
//! ```

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;

use crate::buffer::AudioBuffer;
use crate::clock::{MidiClockFollower, MidiClockMaster};
use crate::controls::AtomicF32;
use crate::error::GraphError;
use crate::graph::{DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE, Graph};
use crate::midi::{MidiBuffer, MidiMessage};
use crate::root::{RootGraph, RootGraphs};
use crate::transport::{Transport, TransportRequests};

/// Messages the MIDI input queue holds between two blocks.
pub const MIDI_QUEUE_CAPACITY: usize = 1024;

const NO_GRAPH: usize = usize::MAX;

/// Where the engine takes its tempo from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum ClockSource {
    /// The transport's own tempo.
    #[default]
    Internal,
    /// Incoming MIDI clock.
    MidiClock,
}

impl ClockSource {
    /// Stable name used in session files.
    pub fn slug(self) -> &'static str {
        match self {
            ClockSource::Internal => "internal",
            ClockSource::MidiClock => "midi_clock",
        }
    }

    /// Parses a slug produced by [`slug`](Self::slug).
    pub fn from_slug(s: &str) -> Option<Self> {
        match s.trim() {
            "internal" => Some(ClockSource::Internal),
            "midi_clock" => Some(ClockSource::MidiClock),
            _ => None,
        }
    }
}

/// Stream format and timing configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Sample rate in Hz.
    pub sample_rate: f64,
    /// Largest block passed to [`Engine::process`].
    pub block_size: usize,
    /// Audio input channels.
    pub inputs: usize,
    /// Audio output channels.
    pub outputs: usize,
    /// Initial tempo in BPM.
    pub tempo: f32,
    /// Beats per bar.
    pub beats_per_bar: u8,
    /// Note value of one beat.
    pub beat_divisor: u8,
    /// Tempo source.
    pub clock_source: ClockSource,
    /// Emit MIDI clock and start/stop/continue.
    pub generate_midi_clock: bool,
    /// Put generated clock into the graph input instead of the MIDI output.
    pub send_clock_to_input: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            inputs: 2,
            outputs: 2,
            tempo: 120.0,
            beats_per_bar: 4,
            beat_divisor: 4,
            clock_source: ClockSource::Internal,
            generate_midi_clock: false,
            send_clock_to_input: false,
        }
    }
}

impl EngineSettings {
    /// Channels of the buffer [`Engine::process`] expects.
    pub fn channels(&self) -> usize {
        self.inputs.max(self.outputs)
    }
}

struct Shared {
    requested_graph: AtomicUsize,
    current_graph: AtomicUsize,
    external_clock: AtomicBool,
    tempo: AtomicF32,
    follower: Mutex<MidiClockFollower>,
    transport: Arc<TransportRequests>,
}

/// Thread-safe control surface of a running [`Engine`].
#[derive(Clone)]
pub struct EngineHandle {
    shared: Arc<Shared>,
    midi_tx: Sender<MidiMessage>,
}

impl EngineHandle {
    /// Selects the root graph rendered from the next block on. Out-of-range
    /// indices are ignored by the engine.
    pub fn set_active_graph(&self, index: usize) {
        self.shared.requested_graph.store(index, Ordering::Release);
    }

    /// Root graph rendered in the last block.
    pub fn active_graph(&self) -> Option<usize> {
        match self.shared.current_graph.load(Ordering::Acquire) {
            NO_GRAPH => None,
            index => Some(index),
        }
    }

    /// Transport request channel.
    pub fn transport(&self) -> &TransportRequests {
        &self.shared.transport
    }

    /// Sets the session tempo. While following external clock the request
    /// is stored and applied when the engine returns to its internal clock.
    pub fn set_tempo(&self, bpm: f32) {
        self.shared.tempo.set(bpm);
        if !self.shared.external_clock.load(Ordering::Acquire) {
            self.shared.transport.request_tempo(bpm);
        }
    }

    /// Switches the tempo source.
    pub fn set_clock_source(&self, source: ClockSource) {
        let external = source == ClockSource::MidiClock;
        if external {
            self.shared.follower.lock().reset();
        } else {
            self.shared.transport.request_tempo(self.shared.tempo.get());
        }
        self.shared.external_clock.store(external, Ordering::Release);
    }

    /// Current tempo source.
    pub fn clock_source(&self) -> ClockSource {
        if self.shared.external_clock.load(Ordering::Acquire) {
            ClockSource::MidiClock
        } else {
            ClockSource::Internal
        }
    }

    /// Tempo last derived from external clock.
    pub fn external_tempo(&self) -> Option<f32> {
        self.shared.follower.lock().tempo()
    }

    /// Queues a message for the start of the next block. Returns false if
    /// the queue is full.
    pub fn send_midi(&self, message: MidiMessage) -> bool {
        match self.midi_tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => false,
        }
    }

    /// Entry point for a MIDI input device.
    ///
    /// Every message is queued for the graphs. While following external
    /// clock, clock messages also drive the tempo estimate and Start, Stop
    /// and Continue drive the transport. `time` is the arrival time in
    /// seconds on any monotonic clock.
    pub fn handle_incoming_midi(&self, message: MidiMessage, time: f64) {
        self.send_midi(message);
        if !self.shared.external_clock.load(Ordering::Acquire) {
            return;
        }
        let transport = &self.shared.transport;
        if message.is_clock() {
            let tempo = self.shared.follower.lock().process_clock(time);
            if let Some(bpm) = tempo {
                transport.request_tempo(bpm);
            }
        } else if message.is_start() {
            transport.request_play_state(true);
            transport.seek(0);
        } else if message.is_stop() {
            transport.request_play_state(false);
        } else if message.is_continue() {
            transport.request_play_state(true);
        }
    }
}

/// Audio-thread engine.
///
/// Prepared in [`new`](Self::new) and released on drop.
pub struct Engine {
    settings: EngineSettings,
    graphs: RootGraphs,
    transport: Transport,
    clock: MidiClockMaster,
    shared: Arc<Shared>,
    midi_tx: Sender<MidiMessage>,
    midi_rx: Receiver<MidiMessage>,
}

impl Engine {
    /// Creates and prepares an engine with no graphs.
    pub fn new(settings: EngineSettings) -> Self {
        let mut transport = Transport::new(settings.sample_rate, settings.tempo);
        let requests = transport.requests();
        requests.request_meter(settings.beats_per_bar, settings.beat_divisor);
        transport.pre_process(0);

        let mut clock = MidiClockMaster::new();
        clock.set_sample_rate(settings.sample_rate);
        clock.set_tempo(f64::from(transport.tempo()));

        let mut graphs = RootGraphs::new();
        graphs.prepare(
            settings.sample_rate,
            settings.block_size,
            settings.inputs,
            settings.outputs,
        );

        let shared = Arc::new(Shared {
            requested_graph: AtomicUsize::new(NO_GRAPH),
            current_graph: AtomicUsize::new(NO_GRAPH),
            external_clock: AtomicBool::new(settings.clock_source == ClockSource::MidiClock),
            tempo: AtomicF32::new(transport.tempo()),
            follower: Mutex::new(MidiClockFollower::new()),
            transport: requests,
        });
        let (midi_tx, midi_rx) = bounded(MIDI_QUEUE_CAPACITY);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "engine_prepare: {} Hz, {} samples, {} in / {} out",
            settings.sample_rate,
            settings.block_size,
            settings.inputs,
            settings.outputs
        );

        Self {
            settings,
            graphs,
            transport,
            clock,
            shared,
            midi_tx,
            midi_rx,
        }
    }

    /// Settings the engine was prepared with.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Control surface for other threads.
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            shared: Arc::clone(&self.shared),
            midi_tx: self.midi_tx.clone(),
        }
    }

    /// Adds and prepares a root graph. Returns its index.
    pub fn add_graph(&mut self, root: RootGraph) -> usize {
        let index = self.graphs.add(root);
        self.publish_current();
        index
    }

    /// Removes and releases a root graph.
    pub fn remove_graph(&mut self, index: usize) -> Result<RootGraph, GraphError> {
        let root = self.graphs.remove(index)?;
        self.publish_current();
        Ok(root)
    }

    /// The root graphs.
    pub fn graphs(&self) -> &RootGraphs {
        &self.graphs
    }

    /// Mutable access to the root graphs.
    pub fn graphs_mut(&mut self) -> &mut RootGraphs {
        &mut self.graphs
    }

    /// Graph at root index `index`.
    pub fn graph(&self, index: usize) -> Option<&Graph> {
        self.graphs.get(index).map(RootGraph::graph)
    }

    /// Mutable graph at root index `index`.
    pub fn graph_mut(&mut self, index: usize) -> Option<&mut Graph> {
        self.graphs.get_mut(index).map(RootGraph::graph_mut)
    }

    /// Audio-thread transport.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Latency of the current graph in samples.
    pub fn latency_samples(&self) -> usize {
        self.graphs.latency_samples()
    }

    fn publish_current(&self) {
        let current = self.graphs.current_index().unwrap_or(NO_GRAPH);
        self.shared.current_graph.store(current, Ordering::Release);
    }

    /// Renders one block.
    ///
    /// `audio` holds [`EngineSettings::channels`] channels: the device input
    /// on the way in and the mixed output on the way out. `midi` carries the
    /// block's incoming MIDI and is replaced with the graphs' MIDI output.
    pub fn process(&mut self, audio: &mut AudioBuffer, midi: &mut MidiBuffer) {
        let num_samples = audio.num_samples().min(self.settings.block_size);

        while let Ok(message) = self.midi_rx.try_recv() {
            midi.add(message, 0);
        }

        let was_playing = self.transport.is_playing();
        self.transport.pre_process(num_samples);
        let start_frame = self.transport.position_frames();

        if self.settings.generate_midi_clock && self.settings.send_clock_to_input {
            self.render_clock(midi, was_playing, start_frame, num_samples);
        }

        let requested = self.shared.requested_graph.swap(NO_GRAPH, Ordering::AcqRel);
        if requested != NO_GRAPH && Some(requested) != self.graphs.current_index() {
            // Out-of-range requests leave the selection unchanged.
            let _ = self.graphs.set_current(requested);
        }
        self.graphs.render(audio, midi, self.transport.snapshot());
        self.publish_current();

        if self.settings.generate_midi_clock && !self.settings.send_clock_to_input {
            self.render_clock(midi, was_playing, start_frame, num_samples);
        }

        if self.transport.is_playing() {
            self.transport.advance(num_samples);
        }
        self.transport.post_process(num_samples);
    }

    fn render_clock(
        &mut self,
        midi: &mut MidiBuffer,
        was_playing: bool,
        start_frame: i64,
        num_samples: usize,
    ) {
        let playing = self.transport.is_playing();
        if was_playing != playing {
            let message = match (playing, start_frame <= 0) {
                (true, true) => MidiMessage::start(),
                (true, false) => MidiMessage::continue_playback(),
                (false, _) => MidiMessage::stop(),
            };
            midi.add(message, 0);
        }
        self.clock.set_tempo(f64::from(self.transport.tempo()));
        self.clock.render(midi, num_samples);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.graphs.release();
        #[cfg(feature = "tracing")]
        tracing::debug!("engine_release");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EngineSettings {
        EngineSettings {
            sample_rate: 48000.0,
            block_size: 256,
            ..EngineSettings::default()
        }
    }

    fn count(midi: &MidiBuffer, pred: impl Fn(&MidiMessage) -> bool) -> usize {
        midi.iter().filter(|e| pred(&e.message)).count()
    }

    #[test]
    fn test_clock_source_slugs() {
        assert_eq!(ClockSource::from_slug("midi_clock"), Some(ClockSource::MidiClock));
        assert_eq!(ClockSource::from_slug(ClockSource::Internal.slug()), Some(ClockSource::Internal));
        assert_eq!(ClockSource::from_slug("word_clock"), None);
    }

    #[test]
    fn test_no_graphs_renders_silence() {
        let mut engine = Engine::new(settings());
        let mut audio = AudioBuffer::new(2, 256);
        audio.channel_mut(0).fill(0.5);
        let mut midi = MidiBuffer::new();
        engine.process(&mut audio, &mut midi);
        assert_eq!(audio.peak(0), 0.0);
        assert_eq!(engine.handle().active_graph(), None);
    }

    #[test]
    fn test_transport_advances_while_playing() {
        let mut engine = Engine::new(settings());
        let handle = engine.handle();
        let mut audio = AudioBuffer::new(2, 256);
        let mut midi = MidiBuffer::new();

        engine.process(&mut audio, &mut midi);
        assert_eq!(engine.transport().position_frames(), 0);

        handle.transport().request_play_state(true);
        engine.process(&mut audio, &mut midi);
        engine.process(&mut audio, &mut midi);
        assert_eq!(engine.transport().position_frames(), 512);
    }

    #[test]
    fn test_generated_clock_goes_to_output() {
        let mut engine = Engine::new(EngineSettings {
            generate_midi_clock: true,
            ..settings()
        });
        engine.add_graph(RootGraph::new(Graph::new()));
        let handle = engine.handle();
        handle.transport().request_play_state(true);

        let mut audio = AudioBuffer::new(2, 256);
        let mut midi = MidiBuffer::new();
        engine.process(&mut audio, &mut midi);
        assert_eq!(count(&midi, MidiMessage::is_start), 1);
        assert!(count(&midi, MidiMessage::is_clock) >= 1);

        handle.transport().request_play_state(false);
        midi.clear();
        engine.process(&mut audio, &mut midi);
        assert_eq!(count(&midi, MidiMessage::is_stop), 1);

        handle.transport().request_play_state(true);
        midi.clear();
        engine.process(&mut audio, &mut midi);
        assert_eq!(count(&midi, MidiMessage::is_continue), 1);
    }

    #[test]
    fn test_external_start_and_stop() {
        let mut engine = Engine::new(EngineSettings {
            clock_source: ClockSource::MidiClock,
            ..settings()
        });
        let handle = engine.handle();
        let mut audio = AudioBuffer::new(2, 256);
        let mut midi = MidiBuffer::new();

        handle.handle_incoming_midi(MidiMessage::start(), 0.0);
        engine.process(&mut audio, &mut midi);
        assert!(engine.transport().is_playing());

        handle.handle_incoming_midi(MidiMessage::stop(), 0.1);
        engine.process(&mut audio, &mut midi);
        assert!(!engine.transport().is_playing());
    }

    #[test]
    fn test_external_clock_sets_tempo() {
        let mut engine = Engine::new(EngineSettings {
            clock_source: ClockSource::MidiClock,
            ..settings()
        });
        let handle = engine.handle();
        let period = 60.0 / (90.0 * 24.0);
        let mut audio = AudioBuffer::new(2, 256);
        for i in 0..96 {
            handle.handle_incoming_midi(MidiMessage::clock(), f64::from(i) * period);
            if i % 8 == 0 {
                let mut midi = MidiBuffer::new();
                engine.process(&mut audio, &mut midi);
            }
        }
        let mut midi = MidiBuffer::new();
        engine.process(&mut audio, &mut midi);
        assert!((engine.transport().tempo() - 90.0).abs() < 0.5);

        handle.set_clock_source(ClockSource::Internal);
        engine.process(&mut audio, &mut midi);
        assert_eq!(engine.transport().tempo(), 120.0);
    }

    #[test]
    fn test_tempo_ignored_while_following() {
        let mut engine = Engine::new(EngineSettings {
            clock_source: ClockSource::MidiClock,
            ..settings()
        });
        let handle = engine.handle();
        handle.set_tempo(100.0);
        let mut audio = AudioBuffer::new(2, 256);
        let mut midi = MidiBuffer::new();
        engine.process(&mut audio, &mut midi);
        assert_eq!(engine.transport().tempo(), 120.0);

        handle.set_clock_source(ClockSource::Internal);
        engine.process(&mut audio, &mut midi);
        assert_eq!(engine.transport().tempo(), 100.0);
    }

    #[test]
    fn test_queue_overflow_reports_false() {
        let engine = Engine::new(settings());
        let handle = engine.handle();
        for _ in 0..MIDI_QUEUE_CAPACITY {
            assert!(handle.send_midi(MidiMessage::note_on(1, 60, 100)));
        }
        assert!(!handle.send_midi(MidiMessage::note_on(1, 60, 100)));
    }
}
