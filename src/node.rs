//! Node, port and connection model shared by the control and audio sides.

use alloc::vec::Vec;
use core::fmt;

/// Unique identifier for a node within an engine.
///
/// Ids are allocated by the [`Controller`](crate::Controller), but any `u64`
/// can be wrapped for hosts that bring their own numbering.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Address one of this node's ports.
    pub const fn port(self, port: PortId) -> PortRef {
        PortRef { node: self, port }
    }

    pub const fn audio_in(self) -> PortRef {
        self.port(PortId::AUDIO_IN)
    }

    pub const fn audio_out(self) -> PortRef {
        self.port(PortId::AUDIO_OUT)
    }

    pub const fn midi_in(self) -> PortRef {
        self.port(PortId::MIDI_IN)
    }

    pub const fn midi_out(self) -> PortRef {
        self.port(PortId::MIDI_OUT)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a port, unique within its node.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PortId(pub u16);

impl PortId {
    pub const AUDIO_IN: PortId = PortId(0);
    pub const AUDIO_OUT: PortId = PortId(1);
    pub const MIDI_IN: PortId = PortId(2);
    pub const MIDI_OUT: PortId = PortId(3);
}

/// Identifier of a hosted plugin instance.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PluginId(pub u64);

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plugin-{}", self.0)
    }
}

/// Identifier of a MIDI clip.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ClipId(pub u64);

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clip-{}", self.0)
    }
}

/// Identifier of a note inside a clip.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NoteId(pub u64);

/// The role a node plays in the mix. Fixed at creation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum NodeKind {
    /// Track driven by MIDI clips through an instrument plugin
    InstrumentTrack,
    /// Track carrying recorded or live audio
    AudioTrack,
    /// Summing bus
    Bus,
    /// Standalone processor, e.g. a shared send effect
    Plugin,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum SignalType {
    Audio,
    Midi,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Direction {
    Input,
    Output,
}

/// A typed, directional endpoint on a node. Immutable once created.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Port {
    pub id: PortId,
    pub signal: SignalType,
    pub direction: Direction,
    /// Channel count for audio ports; always 1 for MIDI.
    pub channels: u16,
}

impl Port {
    pub const fn audio_input(id: PortId, channels: u16) -> Self {
        Self { id, signal: SignalType::Audio, direction: Direction::Input, channels }
    }

    pub const fn audio_output(id: PortId, channels: u16) -> Self {
        Self { id, signal: SignalType::Audio, direction: Direction::Output, channels }
    }

    pub const fn midi_input(id: PortId) -> Self {
        Self { id, signal: SignalType::Midi, direction: Direction::Input, channels: 1 }
    }

    pub const fn midi_output(id: PortId) -> Self {
        Self { id, signal: SignalType::Midi, direction: Direction::Output, channels: 1 }
    }
}

/// Address of a port: owning node plus port id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PortRef {
    pub node: NodeId,
    pub port: PortId,
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.port.0)
    }
}

/// A directed link from an output port to an input port.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Connection {
    pub source: PortRef,
    pub dest: PortRef,
    pub signal: SignalType,
}

/// A node as the router sees it: identity, role and ports.
///
/// The standard constructors give every node a main audio input and output
/// (ids [`PortId::AUDIO_IN`] and [`PortId::AUDIO_OUT`]); instrument tracks
/// and plugin nodes also get MIDI ports. All audio inputs of a node are
/// summed into one input buffer when rendering.
#[derive(Clone, Debug)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    ports: Vec<Port>,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind, channels: u16) -> Self {
        let mut ports = Vec::with_capacity(4);
        ports.push(Port::audio_input(PortId::AUDIO_IN, channels));
        ports.push(Port::audio_output(PortId::AUDIO_OUT, channels));

        match kind {
            NodeKind::InstrumentTrack => {
                ports.push(Port::midi_input(PortId::MIDI_IN));
                ports.push(Port::midi_output(PortId::MIDI_OUT));
            }
            NodeKind::Plugin => ports.push(Port::midi_input(PortId::MIDI_IN)),
            NodeKind::AudioTrack | NodeKind::Bus => {}
        }

        Self { id, kind, ports }
    }

    pub fn instrument_track(id: NodeId, channels: u16) -> Self {
        Self::new(id, NodeKind::InstrumentTrack, channels)
    }

    pub fn audio_track(id: NodeId, channels: u16) -> Self {
        Self::new(id, NodeKind::AudioTrack, channels)
    }

    pub fn bus(id: NodeId, channels: u16) -> Self {
        Self::new(id, NodeKind::Bus, channels)
    }

    pub fn plugin(id: NodeId, channels: u16) -> Self {
        Self::new(id, NodeKind::Plugin, channels)
    }

    /// Add or replace a port, e.g. a sidechain input.
    pub fn with_port(mut self, port: Port) -> Self {
        match self.ports.iter_mut().find(|p| p.id == port.id) {
            Some(existing) => *existing = port,
            None => self.ports.push(port),
        }
        self
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn port(&self, id: PortId) -> Option<&Port> {
        self.ports.iter().find(|p| p.id == id)
    }

    /// Channel count of the main audio output (0 if the node has none).
    pub fn output_channels(&self) -> u16 {
        self.port(PortId::AUDIO_OUT).map(|p| p.channels).unwrap_or(0)
    }

    /// Widest audio input on the node.
    pub fn input_channels(&self) -> u16 {
        self.ports
            .iter()
            .filter(|p| p.signal == SignalType::Audio && p.direction == Direction::Input)
            .map(|p| p.channels)
            .max()
            .unwrap_or(0)
    }
}
