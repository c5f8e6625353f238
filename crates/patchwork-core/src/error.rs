//! Error types for graph mutation and node preparation.
//!
//! Errors only ever surface from the mutation API. The render path has no
//! error channel: degenerate states (feedback, missing buffers) degrade to
//! silence and are counted on the compiled sequence instead.

use thiserror::Error;

use crate::node::NodeId;
use crate::port::PortType;

/// Errors returned by structural graph operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The specified node is not part of the graph.
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    /// A node with this id is already part of the graph.
    #[error("node id {0} is already in use")]
    DuplicateNodeId(NodeId),

    /// Source and destination are the same node.
    #[error("cannot connect node {0} to itself")]
    SelfConnection(NodeId),

    /// The port index does not exist on the node.
    #[error("node {node} has no port {port}")]
    PortOutOfRange {
        /// Node the port was looked up on.
        node: NodeId,
        /// Requested port index.
        port: usize,
    },

    /// The source port is not an output, or the destination port is not an input.
    #[error("port {port} on node {node} has the wrong direction")]
    WrongDirection {
        /// Node owning the port.
        node: NodeId,
        /// Offending port index.
        port: usize,
    },

    /// The port types cannot be connected.
    #[error("cannot connect {source_type} port to {dest_type} port")]
    IncompatibleTypes {
        /// Type of the source port.
        source_type: PortType,
        /// Type of the destination port.
        dest_type: PortType,
    },

    /// Control and CV inputs accept a single incoming connection.
    #[error("{port_type} input {port} on node {node} is already connected")]
    ControlFanIn {
        /// Destination node.
        node: NodeId,
        /// Destination port index.
        port: usize,
        /// Type of the destination port.
        port_type: PortType,
    },

    /// The exact connection already exists.
    #[error("connection {source_node}:{source_port} -> {dest}:{dest_port} already exists")]
    DuplicateConnection {
        /// Source node.
        source_node: NodeId,
        /// Source port index.
        source_port: usize,
        /// Destination node.
        dest: NodeId,
        /// Destination port index.
        dest_port: usize,
    },

    /// The operation is only defined for some port types.
    #[error("operation not supported for {0} ports")]
    UnsupportedPortType(PortType),

    /// A compiled sequence no longer matches the graph it was compiled from.
    #[error("sequence compiled at generation {compiled}, graph is at {current}")]
    StaleSequence {
        /// Generation the sequence was compiled at.
        compiled: u64,
        /// Current generation of the graph.
        current: u64,
    },

    /// A root graph index is out of range.
    #[error("graph index {index} out of range (have {count})")]
    GraphIndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of graphs available.
        count: usize,
    },
}

/// Errors a node may report from [`Node::prepare`](crate::Node::prepare).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NodeError {
    /// The node cannot run at the requested sample rate.
    #[error("unsupported sample rate {0} Hz")]
    UnsupportedSampleRate(f64),

    /// The node cannot run with the requested block size.
    #[error("unsupported block size {0}")]
    UnsupportedBlockSize(usize),

    /// Any other node-specific failure.
    #[error("{0}")]
    Other(String),
}
