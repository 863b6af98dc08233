//! Mutation records sent from the control thread to the audio thread.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use crate::automation::{AutomationLane, AutomationTarget};
use crate::buffer::DelayLine;
use crate::midi::{MidiClip, Note};
use crate::node::{ClipId, Connection, NodeId, PluginId};
use crate::plugin::Plugin;
use crate::render::RenderNode;
use crate::timeline::TimeSignature;

/// Mix parameters of a node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeParameter {
    /// Level in dB; -96 dB and below is silence
    Volume(f32),
    /// Linear level
    Gain(f32),
    /// -1.0 (left) to 1.0 (right)
    Pan(f32),
    Mute(bool),
    Solo(bool),
    /// Audio tracks only: feed the host input into the track
    InputMonitoring(bool),
}

/// One mutation of the render graph.
///
/// Commands are moved through the channel and applied exactly once. Any
/// storage the audio side keeps (nodes, plugins, note lists, delay lines)
/// travels inside the command, allocated on the control thread.
pub enum Command {
    AddNode(Box<RenderNode>),
    RemoveNode(NodeId),
    AddConnection(Connection),
    RemoveConnection(Connection),
    SetConnectionGain {
        connection: Connection,
        gain: f32,
    },
    /// Alignment delay applied where this connection is summed
    SetConnectionDelay {
        connection: Connection,
        delay: Option<Box<DelayLine>>,
    },
    /// Alignment delay applied where a sink node is summed into the master
    SetCompensation {
        node: NodeId,
        delay: Option<Box<DelayLine>>,
    },
    AddPluginToNode {
        node: NodeId,
        plugin_id: PluginId,
        index: usize,
        plugin: Box<dyn Plugin>,
    },
    RemovePluginFromNode {
        node: NodeId,
        plugin_id: PluginId,
    },
    MovePluginInChain {
        node: NodeId,
        plugin_id: PluginId,
        index: usize,
    },
    SetNodeParameter {
        node: NodeId,
        parameter: NodeParameter,
    },
    SetPluginParameter {
        node: NodeId,
        plugin_id: PluginId,
        index: usize,
        value: f32,
    },
    SetPluginBypass {
        node: NodeId,
        plugin_id: PluginId,
        bypassed: bool,
    },
    AddClip {
        node: NodeId,
        clip: Box<MidiClip>,
    },
    RemoveClip {
        node: NodeId,
        clip: ClipId,
    },
    /// Install a clip's note list after notes were added
    ScheduleNotes {
        node: NodeId,
        clip: ClipId,
        notes: Vec<Note>,
    },
    /// Install a clip's note list after notes were removed; sounding notes
    /// that are gone get their note-off
    RemoveNotes {
        node: NodeId,
        clip: ClipId,
        notes: Vec<Note>,
    },
    /// Install or replace the lane driving `target`; `None` removes it
    SetAutomation {
        node: NodeId,
        target: AutomationTarget,
        lane: Option<Box<AutomationLane>>,
    },
    SetTempo {
        beat: f64,
        bpm: f64,
    },
    RemoveTempo {
        beat: f64,
    },
    SetTimeSignature {
        beat: f64,
        signature: TimeSignature,
    },
    RemoveTimeSignature {
        beat: f64,
    },
    Play,
    Stop,
    Seek(f64),
    ClearProject,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::AddNode(_) => "AddNode",
            Command::RemoveNode(_) => "RemoveNode",
            Command::AddConnection(_) => "AddConnection",
            Command::RemoveConnection(_) => "RemoveConnection",
            Command::SetConnectionGain { .. } => "SetConnectionGain",
            Command::SetConnectionDelay { .. } => "SetConnectionDelay",
            Command::SetCompensation { .. } => "SetCompensation",
            Command::AddPluginToNode { .. } => "AddPluginToNode",
            Command::RemovePluginFromNode { .. } => "RemovePluginFromNode",
            Command::MovePluginInChain { .. } => "MovePluginInChain",
            Command::SetNodeParameter { .. } => "SetNodeParameter",
            Command::SetPluginParameter { .. } => "SetPluginParameter",
            Command::SetPluginBypass { .. } => "SetPluginBypass",
            Command::AddClip { .. } => "AddClip",
            Command::RemoveClip { .. } => "RemoveClip",
            Command::ScheduleNotes { .. } => "ScheduleNotes",
            Command::RemoveNotes { .. } => "RemoveNotes",
            Command::SetAutomation { .. } => "SetAutomation",
            Command::SetTempo { .. } => "SetTempo",
            Command::RemoveTempo { .. } => "RemoveTempo",
            Command::SetTimeSignature { .. } => "SetTimeSignature",
            Command::RemoveTimeSignature { .. } => "RemoveTimeSignature",
            Command::Play => "Play",
            Command::Stop => "Stop",
            Command::Seek(_) => "Seek",
            Command::ClearProject => "ClearProject",
        }
    }

    /// The node this command targets, if any.
    pub fn target(&self) -> Option<NodeId> {
        match self {
            Command::AddNode(node) => Some(node.id()),
            Command::RemoveNode(node)
            | Command::SetCompensation { node, .. }
            | Command::AddPluginToNode { node, .. }
            | Command::RemovePluginFromNode { node, .. }
            | Command::MovePluginInChain { node, .. }
            | Command::SetNodeParameter { node, .. }
            | Command::SetPluginParameter { node, .. }
            | Command::SetPluginBypass { node, .. }
            | Command::AddClip { node, .. }
            | Command::RemoveClip { node, .. }
            | Command::ScheduleNotes { node, .. }
            | Command::RemoveNotes { node, .. }
            | Command::SetAutomation { node, .. } => Some(*node),
            Command::AddConnection(c)
            | Command::RemoveConnection(c)
            | Command::SetConnectionGain { connection: c, .. }
            | Command::SetConnectionDelay { connection: c, .. } => Some(c.dest.node),
            _ => None,
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target() {
            Some(node) => write!(f, "{}({})", self.name(), node),
            None => f.write_str(self.name()),
        }
    }
}
