//! Error types

use alloc::string::String;
use thiserror::Error;

use crate::node::{ClipId, NodeId, NodeKind, PluginId, PortRef};

/// Error type for control-side engine operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Node {0} already exists")]
    DuplicateNode(NodeId),

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Node limit of {0} reached")]
    TooManyNodes(usize),

    #[error("Connection limit of {0} reached")]
    TooManyConnections(usize),

    #[error("Connection rejected: {0}")]
    Connect(#[from] ConnectError),

    #[error("Connection {from} -> {to} does not exist")]
    UnknownConnection { from: PortRef, to: PortRef },

    #[error("Cycle detected in routing graph at node {0}")]
    CycleDetected(NodeId),

    #[error("Unknown plugin {plugin} on node {node}")]
    UnknownPlugin { node: NodeId, plugin: PluginId },

    #[error("Plugin chain of node {node} is full ({limit} plugins)")]
    TooManyPlugins { node: NodeId, limit: usize },

    #[error("Plugin '{plugin}' has no parameter named '{name}'")]
    UnknownParameter { plugin: String, name: String },

    #[error("Operation needs a {expected:?} node, but {node} is {actual:?}")]
    WrongNodeKind {
        node: NodeId,
        expected: NodeKind,
        actual: NodeKind,
    },

    #[error("Node {node} already has {limit} clips")]
    TooManyClips { node: NodeId, limit: usize },

    #[error("Unknown clip {clip} on node {node}")]
    UnknownClip { node: NodeId, clip: ClipId },

    #[error("Invalid clip range: start={start}, duration={duration}")]
    InvalidClipRange { start: f64, duration: f64 },

    #[error("Invalid note: pitch={pitch}, velocity={velocity}, duration={duration}")]
    InvalidNote { pitch: u8, velocity: u8, duration: f64 },

    #[error("Invalid tempo: {0}. Must be between 1.0 and 999.0 BPM")]
    InvalidTempo(f64),

    #[error("Invalid beat position: {0}. Must be finite and non-negative")]
    InvalidBeat(f64),

    #[error("Invalid time signature: {numerator}/{denominator}")]
    InvalidTimeSignature { numerator: u8, denominator: u8 },

    #[error("Tempo map is full ({0} points)")]
    TempoMapFull(usize),

    #[error("Invalid automation point: beat={beat}, value={value}")]
    InvalidAutomationPoint { beat: f64, value: f32 },

    #[error("Node {node} already has {limit} automation lanes")]
    TooManyAutomationLanes { node: NodeId, limit: usize },

    #[cfg(feature = "cpal_sink")]
    #[error("No default output device available")]
    NoOutputDevice,

    #[cfg(feature = "cpal_sink")]
    #[error("Unsupported sample format: {0}")]
    UnsupportedSampleFormat(String),

    #[cfg(feature = "cpal_sink")]
    #[error("Audio device not available")]
    DeviceNotAvailable(#[from] cpal::DefaultStreamConfigError),

    #[cfg(feature = "cpal_sink")]
    #[error("Failed to build audio stream")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[cfg(feature = "cpal_sink")]
    #[error("Failed to play audio stream")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[cfg(feature = "cpal_sink")]
    #[error("Audio thread exited before the stream started")]
    StreamThreadGone,
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Reasons a connection between two ports is rejected.
///
/// Checked in the order listed; the first failing rule is reported.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("unknown port {0}")]
    UnknownPort(PortRef),

    #[error("signal types differ")]
    SignalMismatch,

    #[error("source {0} is not an output")]
    SourceNotOutput(PortRef),

    #[error("destination {0} is not an input")]
    DestNotInput(PortRef),

    #[error("a node cannot connect to itself")]
    SelfConnection,

    #[error("destination has {available} channels, source needs {needed}")]
    ChannelMismatch { needed: u16, available: u16 },

    #[error("connection already exists")]
    Duplicate,

    #[error("connection would create a cycle")]
    WouldCycle,
}

/// Failure reported by a hosted plugin while processing a block.
///
/// Carries only static text so it can be built on the audio thread.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginError {
    #[error("plugin is not prepared for this block size")]
    NotPrepared,

    #[error("unsupported channel layout")]
    UnsupportedLayout,

    #[error("{0}")]
    Failed(&'static str),
}
