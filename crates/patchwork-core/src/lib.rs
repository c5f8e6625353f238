//! Patchwork Core - graph compiler and real-time render engine
//!
//! This crate hosts directed graphs of audio/MIDI processing nodes. Nodes
//! expose typed ports, connections join them, and the graph compiles its
//! topology into a flat list of render ops that runs against shared,
//! preallocated buffer pools once per audio callback.
//!
//! # Core Abstractions
//!
//! ## Graph Model
//!
//! - [`Node`] - Object-safe trait every graph vertex implements
//! - [`PortType`], [`PortList`], [`PortCount`] - Typed, directional ports
//! - [`Graph`] - Owns nodes and connections, validates edits, renders blocks
//! - [`IoNode`] - Endpoints moving the graph's own input/output in and out
//! - [`NodeControls`] - Lock-free per-node flags, gains, MIDI filters and meters
//!
//! ## Compilation
//!
//! - [`RenderSequence`] - Compiled, ordered ops plus pool sizes and latency
//! - [`RenderOp`] - Clear/copy/add/delay primitives and node invocations
//! - [`BuildStats`] - Feedback breaks and other degenerate states met while compiling
//!
//! ## Buffers
//!
//! - [`AudioBuffer`] - Multichannel block of samples (also used for CV)
//! - [`MidiBuffer`] - Frame-ordered MIDI events with fixed capacity
//! - [`AtomBuffer`] - Timestamped typed events
//!
//! ## Engine
//!
//! - [`RootGraphs`] - Crossfading multiplexer over selectable top-level graphs
//! - [`Transport`] - Play state, position, tempo and meter
//! - [`MidiClockMaster`], [`MidiClockFollower`] - MIDI clock out and in
//! - [`Engine`], [`EngineHandle`] - Audio-thread context and its cross-thread control
//!
//! # Example
//!
//! ```rust,ignore
//! use patchwork_core::{Engine, EngineSettings, Graph, IoNode, RootGraph};
//!
//! let mut graph = Graph::new();
//! let input = graph.add_node(Box::new(IoNode::audio_input()));
//! let output = graph.add_node(Box::new(IoNode::audio_output()));
//! graph.add_connection(input, 0, output, 0)?;
//! graph.add_connection(input, 1, output, 1)?;
//!
//! let mut engine = Engine::new(EngineSettings::default());
//! engine.add_graph(RootGraph::new(graph));
//!
//! // On the audio thread, once per callback:
//! engine.process(&mut audio, &mut midi);
//! ```
//!
//! # Design Principles
//!
//! - **Real-time safe**: No allocations, locks or panics in the render path
//! - **Never fatal**: Feedback and missing buffers degrade to silence
//! - **Swap, don't share**: Compilation happens off the render path; installing
//!   a new sequence is a single move

pub mod atom;
pub mod buffer;
pub mod builder;
pub mod clock;
pub mod connection;
pub mod controls;
pub mod engine;
pub mod error;
pub mod graph;
pub mod io_node;
pub mod midi;
pub mod node;
pub mod ops;
pub mod oversample;
pub mod param;
pub mod port;
pub mod process;
pub mod root;
mod slot;
pub mod transport;

// Re-export main types at crate root
pub use atom::{ATOM_BUFFER_CAPACITY, AtomBody, AtomBuffer, AtomEvent};
pub use buffer::{AudioBuffer, DelayLine};
pub use builder::{BufferCounts, BuildStats, RenderSequence};
pub use clock::{DelayLockedLoop, MidiClockFollower, MidiClockMaster};
pub use connection::{Connection, ConnectionTable};
pub use controls::{AtomicF32, NodeControls};
pub use engine::{ClockSource, Engine, EngineHandle, EngineSettings, MIDI_QUEUE_CAPACITY};
pub use error::{GraphError, NodeError};
pub use graph::{DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE, Graph};
pub use io_node::IoNode;
pub use midi::{
    KeyRange, MIDI_BUFFER_CAPACITY, MidiBuffer, MidiChannels, MidiEvent, MidiMessage,
    MidiTranspose, VelocityCurve,
};
pub use node::{Node, NodeId, NodeRole, RenderContext};
pub use ops::RenderOp;
pub use oversample::Oversampler;
pub use param::LinearSmoothedParam;
pub use port::{ParsePortTypeError, Port, PortCount, PortList, PortType};
pub use process::{ChannelBindings, ProcessBufferOp};
pub use root::{RenderMode, RootGraph, RootGraphs};
pub use transport::{MAX_TEMPO, MIN_TEMPO, Transport, TransportRequests, TransportSnapshot};
