//! Node registry and factory.

use patchwork_core::{IoNode, Node};
use thiserror::Error;

use crate::audio::{AudioCapture, Delay, Gain, Mixer};
use crate::control::{ControlValue, CvCapture};
use crate::generators::{Dc, Ramp, Sine};
use crate::midi::{MidiCapture, MidiGenerator};
use crate::params::{NodeParams, ParamError};

/// Category of node for organization and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeCategory {
    /// Graph input and output endpoints
    Io,
    /// Audio sources
    Generator,
    /// Audio processors and sinks
    Audio,
    /// MIDI sources and sinks
    Midi,
    /// Control values and CV sinks
    Control,
}

impl NodeCategory {
    /// Returns a human-readable name for the category.
    pub const fn name(&self) -> &'static str {
        match self {
            NodeCategory::Io => "I/O",
            NodeCategory::Generator => "Generator",
            NodeCategory::Audio => "Audio",
            NodeCategory::Midi => "MIDI",
            NodeCategory::Control => "Control",
        }
    }
}

/// Describes a node type in the registry.
#[derive(Debug, Clone)]
pub struct NodeDescriptor {
    /// Unique identifier (`category.name`).
    pub id: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    /// Brief description.
    pub description: &'static str,
    /// Category for organization.
    pub category: NodeCategory,
    /// Parameter names the factory accepts.
    pub params: &'static [&'static str],
}

/// Errors raised by [`NodeRegistry::create`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    /// No node type has this id.
    #[error("unknown node type '{0}'")]
    UnknownNode(String),

    /// A parameter was rejected.
    #[error("node type '{node}': {source}")]
    Param {
        /// Node type id.
        node: String,
        /// What was wrong with the parameter.
        source: ParamError,
    },
}

type NodeFactory = fn(&NodeParams) -> Result<Box<dyn Node>, ParamError>;

struct RegistryEntry {
    descriptor: NodeDescriptor,
    factory: NodeFactory,
}

/// Registry of all built-in node types.
pub struct NodeRegistry {
    entries: Vec<RegistryEntry>,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRegistry {
    /// Creates a registry with every built-in node registered.
    pub fn new() -> Self {
        let mut registry = Self {
            entries: Vec::with_capacity(16),
        };
        registry.register_io();
        registry.register_builtin_nodes();
        registry
    }

    fn register_io(&mut self) {
        self.register(
            NodeDescriptor {
                id: "io.audio_in",
                name: "Audio In",
                description: "Delivers the graph's audio input",
                category: NodeCategory::Io,
                params: &[],
            },
            |_| Ok(Box::new(IoNode::audio_input())),
        );
        self.register(
            NodeDescriptor {
                id: "io.audio_out",
                name: "Audio Out",
                description: "Collects the graph's audio output",
                category: NodeCategory::Io,
                params: &[],
            },
            |_| Ok(Box::new(IoNode::audio_output())),
        );
        self.register(
            NodeDescriptor {
                id: "io.midi_in",
                name: "MIDI In",
                description: "Delivers the graph's filtered MIDI input",
                category: NodeCategory::Io,
                params: &[],
            },
            |_| Ok(Box::new(IoNode::midi_input())),
        );
        self.register(
            NodeDescriptor {
                id: "io.midi_out",
                name: "MIDI Out",
                description: "Collects the graph's MIDI output",
                category: NodeCategory::Io,
                params: &[],
            },
            |_| Ok(Box::new(IoNode::midi_output())),
        );
    }

    fn register_builtin_nodes(&mut self) {
        self.register(
            NodeDescriptor {
                id: "gen.ramp",
                name: "Ramp",
                description: "Rising sawtooth on every output channel",
                category: NodeCategory::Generator,
                params: Ramp::PARAMS,
            },
            |p| Ok(Box::new(Ramp::from_params(p)?)),
        );
        self.register(
            NodeDescriptor {
                id: "gen.sine",
                name: "Sine",
                description: "Sine oscillator on every output channel",
                category: NodeCategory::Generator,
                params: Sine::PARAMS,
            },
            |p| Ok(Box::new(Sine::from_params(p)?)),
        );
        self.register(
            NodeDescriptor {
                id: "gen.dc",
                name: "DC",
                description: "Constant value on every output channel",
                category: NodeCategory::Generator,
                params: Dc::PARAMS,
            },
            |p| Ok(Box::new(Dc::from_params(p)?)),
        );
        self.register(
            NodeDescriptor {
                id: "audio.capture",
                name: "Audio Capture",
                description: "Sink measuring peak and RMS of its inputs",
                category: NodeCategory::Audio,
                params: AudioCapture::PARAMS,
            },
            |p| Ok(Box::new(AudioCapture::from_params(p)?)),
        );
        self.register(
            NodeDescriptor {
                id: "audio.gain",
                name: "Gain",
                description: "Smoothed gain driven by a Control input",
                category: NodeCategory::Audio,
                params: Gain::PARAMS,
            },
            |p| Ok(Box::new(Gain::from_params(p)?)),
        );
        self.register(
            NodeDescriptor {
                id: "audio.delay",
                name: "Delay",
                description: "Fixed delay reported as latency",
                category: NodeCategory::Audio,
                params: Delay::PARAMS,
            },
            |p| Ok(Box::new(Delay::from_params(p)?)),
        );
        self.register(
            NodeDescriptor {
                id: "audio.mixer",
                name: "Mixer",
                description: "Sums several channel groups into one",
                category: NodeCategory::Audio,
                params: Mixer::PARAMS,
            },
            |p| Ok(Box::new(Mixer::from_params(p)?)),
        );
        self.register(
            NodeDescriptor {
                id: "midi.generator",
                name: "MIDI Generator",
                description: "Repeating note at a fixed interval",
                category: NodeCategory::Midi,
                params: MidiGenerator::PARAMS,
            },
            |p| Ok(Box::new(MidiGenerator::from_params(p)?)),
        );
        self.register(
            NodeDescriptor {
                id: "midi.capture",
                name: "MIDI Capture",
                description: "Sink counting the MIDI events it receives",
                category: NodeCategory::Midi,
                params: MidiCapture::PARAMS,
            },
            |p| Ok(Box::new(MidiCapture::from_params(p)?)),
        );
        self.register(
            NodeDescriptor {
                id: "control.value",
                name: "Value",
                description: "Settable value on a Control output",
                category: NodeCategory::Control,
                params: ControlValue::PARAMS,
            },
            |p| Ok(Box::new(ControlValue::from_params(p)?)),
        );
        self.register(
            NodeDescriptor {
                id: "cv.capture",
                name: "CV Capture",
                description: "Sink recording the range of a CV signal",
                category: NodeCategory::Control,
                params: CvCapture::PARAMS,
            },
            |p| Ok(Box::new(CvCapture::from_params(p)?)),
        );
    }

    fn register(&mut self, descriptor: NodeDescriptor, factory: NodeFactory) {
        self.entries.push(RegistryEntry {
            descriptor,
            factory,
        });
    }

    /// Every registered node type.
    pub fn all_nodes(&self) -> Vec<&NodeDescriptor> {
        self.entries.iter().map(|e| &e.descriptor).collect()
    }

    /// Node types in one category.
    pub fn nodes_in_category(&self, category: NodeCategory) -> Vec<&NodeDescriptor> {
        self.entries
            .iter()
            .filter(|e| e.descriptor.category == category)
            .map(|e| &e.descriptor)
            .collect()
    }

    /// Looks up a node type by id.
    pub fn get(&self, id: &str) -> Option<&NodeDescriptor> {
        self.entries
            .iter()
            .find(|e| e.descriptor.id == id)
            .map(|e| &e.descriptor)
    }

    /// Returns true if `id` names a registered node type.
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Creates a node by type id.
    pub fn create(&self, id: &str, params: &NodeParams) -> Result<Box<dyn Node>, RegistryError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.descriptor.id == id)
            .ok_or_else(|| RegistryError::UnknownNode(id.to_owned()))?;
        let param_error = |source| RegistryError::Param {
            node: id.to_owned(),
            source,
        };
        params
            .check_known(entry.descriptor.params)
            .map_err(param_error)?;
        (entry.factory)(params).map_err(param_error)
    }

    /// Number of registered node types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchwork_core::{NodeRole, PortType};

    #[test]
    fn test_registry_creation() {
        let registry = NodeRegistry::new();
        assert_eq!(registry.len(), 15);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_all_nodes_can_be_created() {
        let registry = NodeRegistry::new();
        for descriptor in registry.all_nodes() {
            let node = registry.create(descriptor.id, &NodeParams::new());
            assert!(node.is_ok(), "failed to create {}", descriptor.id);
        }
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = NodeRegistry::new();
        let mut ids: Vec<_> = registry.all_nodes().iter().map(|d| d.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), registry.len());
    }

    #[test]
    fn test_nodes_by_category() {
        let registry = NodeRegistry::new();
        assert_eq!(registry.nodes_in_category(NodeCategory::Io).len(), 4);
        assert_eq!(registry.nodes_in_category(NodeCategory::Generator).len(), 3);
        assert_eq!(NodeCategory::Midi.name(), "MIDI");
    }

    #[test]
    fn test_io_nodes_have_roles() {
        let registry = NodeRegistry::new();
        let node = registry.create("io.midi_out", &NodeParams::new()).unwrap();
        assert_eq!(node.role(), NodeRole::MidiOutput);
        assert_eq!(node.ports().count(PortType::Midi, true), 1);
    }

    #[test]
    fn test_unknown_node() {
        let registry = NodeRegistry::new();
        assert!(matches!(
            registry.create("gen.noise", &NodeParams::new()),
            Err(RegistryError::UnknownNode(id)) if id == "gen.noise"
        ));
    }

    #[test]
    fn test_unknown_param() {
        let registry = NodeRegistry::new();
        let params = NodeParams::new().with("cutoff", 1000.0);
        assert!(matches!(
            registry.create("audio.gain", &params),
            Err(RegistryError::Param { source: ParamError::Unknown(name), .. }) if name == "cutoff"
        ));
    }

    #[test]
    fn test_param_out_of_range() {
        let registry = NodeRegistry::new();
        let params = NodeParams::new().with("channels", 64.0);
        assert!(matches!(
            registry.create("gen.sine", &params),
            Err(RegistryError::Param { source: ParamError::OutOfRange { .. }, .. })
        ));
    }
}
