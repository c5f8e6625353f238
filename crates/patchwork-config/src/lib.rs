//! Session files for patchwork graphs.
//!
//! A session describes the engine's stream format and timing plus a list of
//! root graphs, each with its nodes, node controls, and connections. Sessions
//! are stored as TOML, validated against the node registry, and built into a
//! prepared [`Engine`](patchwork_core::Engine).
//!
//! # Features
//!
//! - **Session Files**: Load and save sessions from TOML files
//! - **Validation**: Check node types, parameters, ids, and ranges up front
//! - **Building**: Turn a session into a ready-to-run engine
//! - **Paths**: Platform-specific session directories
//!
//! # Example
//!
//! ```rust
//! use patchwork_config::{GraphConfig, NodeConfig, SessionConfig};
//! use patchwork_core::{AudioBuffer, MidiBuffer};
//! use patchwork_nodes::NodeRegistry;
//!
//! let session = SessionConfig::new("Demo").with_graph(
//!     GraphConfig::new("Main")
//!         .with_node(NodeConfig::new(1, "gen.sine").with_param("frequency", 220.0))
//!         .with_node(NodeConfig::new(2, "io.audio_out"))
//!         .with_connection(1, 0, 2, 0),
//! );
//!
//! let mut engine = session.build(&NodeRegistry::new()).unwrap();
//! let mut audio = AudioBuffer::new(2, 512);
//! let mut midi = MidiBuffer::new();
//! engine.process(&mut audio, &mut midi);
//! ```

mod error;
mod session;

/// Platform-specific paths for session files.
pub mod paths;

/// Session validation.
pub mod validation;

pub use error::ConfigError;
pub use paths::{
    ensure_user_sessions_dir, find_session, list_sessions_in_dir, list_user_sessions,
    session_name_from_path, user_config_dir, user_sessions_dir,
};
pub use session::{ConnectionConfig, EngineConfig, GraphConfig, NodeConfig, SessionConfig};
pub use validation::{
    ValidationError, ValidationResult, validate_engine_config, validate_graph_config,
    validate_session,
};

/// Re-export commonly used types from patchwork-nodes
pub use patchwork_nodes::{NodeCategory, NodeDescriptor, NodeParams, NodeRegistry};
