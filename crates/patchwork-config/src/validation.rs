//! Session validation.
//!
//! Checks a [`SessionConfig`] against the node registry before anything is
//! built, collecting every problem instead of stopping at the first one.
//!
//! # Example
//!
//! ```rust
//! use patchwork_config::{GraphConfig, NodeConfig, SessionConfig, validate_session};
//! use patchwork_nodes::NodeRegistry;
//!
//! let session = SessionConfig::new("Demo")
//!     .with_graph(GraphConfig::new("Main").with_node(NodeConfig::new(1, "gen.sine")));
//! validate_session(&session, &NodeRegistry::new()).expect("session should be valid");
//! ```

use std::collections::HashSet;

use patchwork_core::{
    ClockSource, MAX_TEMPO, MIN_TEMPO, MidiTranspose, NodeId, RenderMode, VelocityCurve,
};
use patchwork_nodes::{NodeRegistry, RegistryError};
use thiserror::Error;

use crate::session::{EngineConfig, GraphConfig, SessionConfig};

/// Supported sample rates, inclusive.
pub const SAMPLE_RATE_RANGE: (f64, f64) = (8000.0, 384_000.0);

/// Supported block sizes, inclusive.
pub const BLOCK_SIZE_RANGE: (f64, f64) = (1.0, 8192.0);

/// Most audio channels the engine accepts per direction.
pub const MAX_ENGINE_CHANNELS: usize = 64;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// A node names a type the registry does not know.
    #[error("graph '{graph}', node {node}: unknown node type '{node_type}'")]
    UnknownNodeType {
        /// Graph name.
        graph: String,
        /// Node id.
        node: u32,
        /// The unknown type id.
        node_type: String,
    },

    /// Two nodes share an id.
    #[error("graph '{graph}': duplicate node id {node}")]
    DuplicateNodeId {
        /// Graph name.
        graph: String,
        /// Repeated id.
        node: u32,
    },

    /// A node id is reserved.
    #[error("graph '{graph}': node id {node} is not allowed")]
    InvalidNodeId {
        /// Graph name.
        graph: String,
        /// Rejected id.
        node: u32,
    },

    /// A node setting is unusable.
    #[error("graph '{graph}', node {node}: {reason}")]
    InvalidParameter {
        /// Graph name.
        graph: String,
        /// Node id.
        node: u32,
        /// What is wrong.
        reason: String,
    },

    /// A connection refers to a node that is not in the graph.
    #[error("graph '{graph}': connection refers to missing node {node}")]
    DanglingConnection {
        /// Graph name.
        graph: String,
        /// Missing node id.
        node: u32,
    },

    /// Unknown render mode.
    #[error("unknown render mode: {0}")]
    UnknownMode(String),

    /// Unknown velocity curve.
    #[error("unknown velocity curve: {0}")]
    UnknownVelocityCurve(String),

    /// Unknown clock source.
    #[error("unknown clock source: {0}")]
    UnknownClockSource(String),

    /// A numeric setting is outside its range.
    #[error("'{field}' value {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Setting name.
        field: String,
        /// The value that was out of range.
        value: f64,
        /// Minimum allowed value.
        min: f64,
        /// Maximum allowed value.
        max: f64,
    },

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates engine settings and every graph of `session`.
pub fn validate_session(session: &SessionConfig, registry: &NodeRegistry) -> ValidationResult<()> {
    let mut errors = Vec::new();
    validate_engine(&session.engine, &mut errors);
    for graph in &session.graphs {
        validate_graph(graph, registry, &mut errors);
    }
    into_result(errors)
}

/// Validates engine settings only.
pub fn validate_engine_config(engine: &EngineConfig) -> ValidationResult<()> {
    let mut errors = Vec::new();
    validate_engine(engine, &mut errors);
    into_result(errors)
}

/// Validates a single graph.
pub fn validate_graph_config(graph: &GraphConfig, registry: &NodeRegistry) -> ValidationResult<()> {
    let mut errors = Vec::new();
    validate_graph(graph, registry, &mut errors);
    into_result(errors)
}

fn into_result(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

fn check_range(
    errors: &mut Vec<ValidationError>,
    field: &str,
    value: f64,
    (min, max): (f64, f64),
) {
    if !(min..=max).contains(&value) {
        errors.push(ValidationError::OutOfRange {
            field: field.to_string(),
            value,
            min,
            max,
        });
    }
}

fn validate_engine(engine: &EngineConfig, errors: &mut Vec<ValidationError>) {
    check_range(
        errors,
        "engine.sample_rate",
        f64::from(engine.sample_rate),
        SAMPLE_RATE_RANGE,
    );
    check_range(
        errors,
        "engine.block_size",
        engine.block_size as f64,
        BLOCK_SIZE_RANGE,
    );
    let channels = (0.0, MAX_ENGINE_CHANNELS as f64);
    check_range(errors, "engine.inputs", engine.inputs as f64, channels);
    check_range(errors, "engine.outputs", engine.outputs as f64, channels);
    check_range(
        errors,
        "engine.tempo",
        f64::from(engine.tempo),
        (f64::from(MIN_TEMPO), f64::from(MAX_TEMPO)),
    );
    check_range(
        errors,
        "engine.beats_per_bar",
        f64::from(engine.beats_per_bar),
        (1.0, 32.0),
    );
    if !matches!(engine.beat_divisor, 1 | 2 | 4 | 8 | 16 | 32) {
        errors.push(ValidationError::OutOfRange {
            field: "engine.beat_divisor".to_string(),
            value: f64::from(engine.beat_divisor),
            min: 1.0,
            max: 32.0,
        });
    }
    if ClockSource::from_slug(&engine.clock_source).is_none() {
        errors.push(ValidationError::UnknownClockSource(
            engine.clock_source.clone(),
        ));
    }
}

fn validate_graph(graph: &GraphConfig, registry: &NodeRegistry, errors: &mut Vec<ValidationError>) {
    let name = &graph.name;
    if RenderMode::from_slug(&graph.mode).is_none() {
        errors.push(ValidationError::UnknownMode(graph.mode.clone()));
    }
    if VelocityCurve::from_slug(&graph.velocity_curve).is_none() {
        errors.push(ValidationError::UnknownVelocityCurve(
            graph.velocity_curve.clone(),
        ));
    }
    check_range(
        errors,
        &format!("{name}.midi_channel"),
        f64::from(graph.midi_channel),
        (0.0, 16.0),
    );
    if let Some(program) = graph.midi_program {
        check_range(
            errors,
            &format!("{name}.midi_program"),
            f64::from(program),
            (0.0, 127.0),
        );
    }

    let mut ids = HashSet::new();
    for node in &graph.nodes {
        if !NodeId::new(node.id).is_valid() {
            errors.push(ValidationError::InvalidNodeId {
                graph: name.clone(),
                node: node.id,
            });
        } else if !ids.insert(node.id) {
            errors.push(ValidationError::DuplicateNodeId {
                graph: name.clone(),
                node: node.id,
            });
        }

        match registry.create(&node.node_type, &node.params) {
            Ok(_) => {}
            Err(RegistryError::UnknownNode(node_type)) => {
                errors.push(ValidationError::UnknownNodeType {
                    graph: name.clone(),
                    node: node.id,
                    node_type,
                });
            }
            Err(err @ RegistryError::Param { .. }) => {
                errors.push(ValidationError::InvalidParameter {
                    graph: name.clone(),
                    node: node.id,
                    reason: err.to_string(),
                });
            }
        }

        let mut invalid = |reason: String| {
            errors.push(ValidationError::InvalidParameter {
                graph: name.clone(),
                node: node.id,
                reason,
            });
        };
        if let Some([low, high]) = node.key_range
            && (low > high || high > 127)
        {
            invalid(format!("key range [{low}, {high}] is not within 0..=127"));
        }
        if node.transpose.abs() > MidiTranspose::MAX_OFFSET {
            invalid(format!(
                "transpose {} exceeds ±{} semitones",
                node.transpose,
                MidiTranspose::MAX_OFFSET
            ));
        }
        if node.midi_channel > 16 {
            invalid(format!("midi channel {} is not within 0..=16", node.midi_channel));
        }
        if !node.gain.is_finite() || node.gain < 0.0 {
            invalid(format!("gain {} must be finite and non-negative", node.gain));
        }
        if !node.delay_compensation_ms.is_finite() || node.delay_compensation_ms < 0.0 {
            invalid(format!(
                "delay compensation {} ms must be finite and non-negative",
                node.delay_compensation_ms
            ));
        }
    }

    for connection in &graph.connections {
        for id in [connection.source, connection.dest] {
            if !ids.contains(&id) {
                errors.push(ValidationError::DanglingConnection {
                    graph: name.clone(),
                    node: id,
                });
            }
        }
    }
}
