//! Error types for configuration operations.

use std::path::PathBuf;

use patchwork_core::GraphError;
use patchwork_nodes::{ParamError, RegistryError};
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file
    #[error("failed to write file '{path}': {source}")]
    WriteFile {
        /// Path of the file that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to create directory
    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        /// Path of the directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Session not found by name or path
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Unknown node type
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),

    /// Invalid parameter
    #[error("invalid parameter '{param}' for node type '{node}': {reason}")]
    InvalidParameter {
        /// Node type id.
        node: String,
        /// Name of the invalid parameter.
        param: String,
        /// Description of why the parameter is invalid.
        reason: String,
    },

    /// A graph edit was rejected
    #[error("graph '{graph}': {source}")]
    Graph {
        /// Name of the graph being built.
        graph: String,
        /// Underlying graph error.
        #[source]
        source: GraphError,
    },

    /// Validation errors
    #[error("validation failed: {0}")]
    Validation(#[from] crate::validation::ValidationError),
}

impl ConfigError {
    /// Create a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Create a write file error.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::WriteFile {
            path: path.into(),
            source,
        }
    }

    /// Create a create directory error.
    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::CreateDir {
            path: path.into(),
            source,
        }
    }

    /// Create a graph error tagged with the graph's name.
    pub fn graph(graph: impl Into<String>, source: GraphError) -> Self {
        ConfigError::Graph {
            graph: graph.into(),
            source,
        }
    }
}

impl From<RegistryError> for ConfigError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownNode(id) => ConfigError::UnknownNodeType(id),
            RegistryError::Param { node, source } => ConfigError::InvalidParameter {
                node,
                param: param_name(&source).to_owned(),
                reason: source.to_string(),
            },
        }
    }
}

/// Name of the parameter a [`ParamError`] is about.
pub(crate) fn param_name(err: &ParamError) -> &str {
    match err {
        ParamError::OutOfRange { name, .. } | ParamError::NotAnInteger { name, .. } => name,
        ParamError::Unknown(name) => name,
    }
}
