//! Typed port vocabulary and channel indexing.
//!
//! Every node exposes an ordered list of [`Port`]s. A port has a dense index
//! within its node, and a zero-based channel number that is dense within its
//! `(type, direction)` pair. The builder maps between the two constantly, so
//! [`PortList`] answers both directions of the lookup.

use core::fmt;
use core::str::FromStr;

/// Signal type carried by a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PortType {
    /// Audio-rate sample stream.
    Audio,
    /// Timestamped MIDI events.
    Midi,
    /// Scalar automation value, updated once per block.
    Control,
    /// Audio-rate modulation signal. Shares the audio buffer pool.
    Cv,
    /// Timestamped typed events (a superset of MIDI).
    Atom,
}

impl PortType {
    /// All port types in declaration order.
    pub const ALL: [PortType; 5] = [
        PortType::Audio,
        PortType::Midi,
        PortType::Control,
        PortType::Cv,
        PortType::Atom,
    ];

    /// Returns true if a port of type `self` may feed a port of type `dest`.
    ///
    /// Same-type connections are always allowed. The only cross-type pair is
    /// Control into CV.
    pub fn can_connect(self, dest: PortType) -> bool {
        self == dest || (self == PortType::Control && dest == PortType::Cv)
    }

    /// Lower-case identifier used in symbols and config files.
    pub fn slug(self) -> &'static str {
        match self {
            PortType::Audio => "audio",
            PortType::Midi => "midi",
            PortType::Control => "control",
            PortType::Cv => "cv",
            PortType::Atom => "atom",
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            PortType::Audio => "Audio",
            PortType::Midi => "MIDI",
            PortType::Control => "Control",
            PortType::Cv => "CV",
            PortType::Atom => "Atom",
        }
    }

    /// Dense index of the type, matching [`PortType::ALL`].
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Returns true for the types that live in the audio sample pool.
    #[inline]
    pub fn is_sample_stream(self) -> bool {
        matches!(self, PortType::Audio | PortType::Cv)
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Error returned when parsing an unknown port type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePortTypeError(String);

impl fmt::Display for ParsePortTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown port type '{}'", self.0)
    }
}

impl std::error::Error for ParsePortTypeError {}

impl FromStr for PortType {
    type Err = ParsePortTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PortType::ALL
            .into_iter()
            .find(|t| t.slug().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParsePortTypeError(s.to_string()))
    }
}

/// A typed, directional signal terminal on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    /// Signal type.
    pub port_type: PortType,
    /// Dense index within the owning node.
    pub index: usize,
    /// Zero-based channel within `(port_type, is_input)`.
    pub channel: usize,
    /// True for inputs, false for outputs.
    pub is_input: bool,
    /// Machine-readable symbol, unique within the node.
    pub symbol: String,
    /// Display name.
    pub name: String,
}

/// Ordered list of a node's ports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortList {
    ports: Vec<Port>,
}

impl PortList {
    /// Creates an empty port list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a port, assigning it the next index and the next channel of
    /// its `(type, direction)` pair. Returns the new port's index.
    pub fn add(
        &mut self,
        port_type: PortType,
        is_input: bool,
        symbol: impl Into<String>,
        name: impl Into<String>,
    ) -> usize {
        let index = self.ports.len();
        let channel = self.count(port_type, is_input);
        self.ports.push(Port {
            port_type,
            index,
            channel,
            is_input,
            symbol: symbol.into(),
            name: name.into(),
        });
        index
    }

    /// Number of ports.
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    /// Returns true if the node has no ports.
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Port at `index`.
    pub fn get(&self, index: usize) -> Option<&Port> {
        self.ports.get(index)
    }

    /// Iterates ports in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter()
    }

    /// Number of ports of `port_type` in the given direction.
    pub fn count(&self, port_type: PortType, is_input: bool) -> usize {
        self.ports
            .iter()
            .filter(|p| p.port_type == port_type && p.is_input == is_input)
            .count()
    }

    /// Port index for a channel of a type and direction.
    pub fn port_for_channel(
        &self,
        port_type: PortType,
        channel: usize,
        is_input: bool,
    ) -> Option<usize> {
        self.ports
            .iter()
            .find(|p| p.port_type == port_type && p.is_input == is_input && p.channel == channel)
            .map(|p| p.index)
    }

    /// Channel number of the port at `index`.
    pub fn channel_of(&self, index: usize) -> Option<usize> {
        self.get(index).map(|p| p.channel)
    }

    /// Type of the port at `index`.
    pub fn port_type(&self, index: usize) -> Option<PortType> {
        self.get(index).map(|p| p.port_type)
    }

    /// Returns true if `index` names an input port.
    pub fn is_input(&self, index: usize) -> bool {
        self.get(index).is_some_and(|p| p.is_input)
    }

    /// Returns true if `index` names an output port.
    pub fn is_output(&self, index: usize) -> bool {
        self.get(index).is_some_and(|p| !p.is_input)
    }

    /// Snapshot of the per-type counts.
    pub fn counts(&self) -> PortCount {
        let mut counts = PortCount::new();
        for port in &self.ports {
            let current = counts.get(port.port_type, port.is_input);
            counts.set(port.port_type, current + 1, port.is_input);
        }
        counts
    }
}

impl<'a> IntoIterator for &'a PortList {
    type Item = &'a Port;
    type IntoIter = core::slice::Iter<'a, Port>;

    fn into_iter(self) -> Self::IntoIter {
        self.ports.iter()
    }
}

/// Per-type, per-direction port counts.
///
/// Used to describe a layout before it is expanded into a [`PortList`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortCount {
    inputs: [usize; 5],
    outputs: [usize; 5],
}

impl PortCount {
    /// All counts zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter for both directions of one type.
    pub fn with(mut self, port_type: PortType, inputs: usize, outputs: usize) -> Self {
        self.inputs[port_type.index()] = inputs;
        self.outputs[port_type.index()] = outputs;
        self
    }

    /// Sets the count of one type and direction.
    pub fn set(&mut self, port_type: PortType, count: usize, is_input: bool) {
        if is_input {
            self.inputs[port_type.index()] = count;
        } else {
            self.outputs[port_type.index()] = count;
        }
    }

    /// Count of one type and direction.
    pub fn get(&self, port_type: PortType, is_input: bool) -> usize {
        if is_input {
            self.inputs[port_type.index()]
        } else {
            self.outputs[port_type.index()]
        }
    }

    /// Expands the counts into a port list: for each type, inputs then outputs.
    pub fn to_port_list(&self) -> PortList {
        let mut list = PortList::new();
        for port_type in PortType::ALL {
            for is_input in [true, false] {
                let dir = if is_input { "in" } else { "out" };
                for ch in 0..self.get(port_type, is_input) {
                    list.add(
                        port_type,
                        is_input,
                        format!("{}_{dir}_{}", port_type.slug(), ch + 1),
                        format!("{} {} {}", port_type.name(), if is_input { "In" } else { "Out" }, ch + 1),
                    );
                }
            }
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_connect_rules() {
        for t in PortType::ALL {
            assert!(t.can_connect(t));
        }
        assert!(PortType::Control.can_connect(PortType::Cv));
        assert!(!PortType::Cv.can_connect(PortType::Control));
        assert!(!PortType::Audio.can_connect(PortType::Cv));
        assert!(!PortType::Midi.can_connect(PortType::Atom));
    }

    #[test]
    fn test_channels_are_dense_per_type_and_direction() {
        let ports = PortCount::new()
            .with(PortType::Audio, 2, 2)
            .with(PortType::Midi, 1, 1)
            .to_port_list();

        assert_eq!(ports.len(), 6);
        assert_eq!(ports.count(PortType::Audio, true), 2);
        assert_eq!(ports.count(PortType::Midi, false), 1);

        let out1 = ports.port_for_channel(PortType::Audio, 1, false).unwrap();
        assert_eq!(out1, 3);
        assert_eq!(ports.channel_of(out1), Some(1));
        assert!(ports.is_output(out1));
        assert_eq!(ports.port_for_channel(PortType::Midi, 0, true), Some(4));
        assert_eq!(ports.port_for_channel(PortType::Midi, 1, true), None);
    }

    #[test]
    fn test_counts_round_trip() {
        let counts = PortCount::new()
            .with(PortType::Audio, 1, 3)
            .with(PortType::Control, 2, 0);
        assert_eq!(counts.to_port_list().counts(), counts);
    }

    #[test]
    fn test_symbols_and_parse() {
        let ports = PortCount::new().with(PortType::Cv, 0, 1).to_port_list();
        assert_eq!(ports.get(0).unwrap().symbol, "cv_out_1");
        assert_eq!("CV".parse::<PortType>(), Ok(PortType::Cv));
        assert!("video".parse::<PortType>().is_err());
    }
}
