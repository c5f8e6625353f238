//! Node registry and built-in nodes for patchwork graphs.
//!
//! This crate provides a centralized registry for discovering and
//! instantiating graph nodes by type id, plus the small set of nodes the
//! registry knows about.
//!
//! # Features
//!
//! - **Node Discovery**: List all available node types with metadata
//! - **Factory Pattern**: Create nodes by id from named parameters
//! - **Category System**: I/O, generators, audio, MIDI, control
//! - **State Blobs**: Node settings and measurements as JSON via [`Node::state`]
//!
//! # Example
//!
//! ```rust
//! use patchwork_core::Graph;
//! use patchwork_nodes::{NodeParams, NodeRegistry};
//!
//! let registry = NodeRegistry::new();
//! let mut graph = Graph::new();
//!
//! let params = NodeParams::new().with("frequency", 220.0);
//! let sine = graph.add_node(registry.create("gen.sine", &params).unwrap());
//! let out = graph.add_node(registry.create("io.audio_out", &NodeParams::new()).unwrap());
//! graph.add_connection(sine, 0, out, 0).unwrap();
//! ```
//!
//! [`Node::state`]: patchwork_core::Node::state

pub mod audio;
pub mod control;
pub mod generators;
pub mod midi;
pub mod params;
pub mod registry;

// Re-export main types at crate root
pub use audio::{AudioCapture, CaptureReport, Delay, Gain, Mixer};
pub use control::{ControlValue, CvCapture, CvReport};
pub use generators::{Dc, MAX_CHANNELS, Ramp, Sine};
pub use midi::{MidiCapture, MidiCaptureReport, MidiGenerator};
pub use params::{NodeParams, ParamError};
pub use registry::{NodeCategory, NodeDescriptor, NodeRegistry, RegistryError};
