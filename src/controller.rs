//! Control-thread handle of an engine.
//!
//! The [`Controller`] validates every edit against the [`Router`] and its
//! own mirror of plugin and clip state, then records the matching commands
//! for the audio thread. Edits made inside [`Controller::batch`] reach the
//! audio thread together, in one drain.

use alloc::boxed::Box;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use delegate::delegate;
use hashbrown::HashMap;
use tracing::{debug, info};

use crate::automation::{AutomationLane, AutomationPoint, AutomationTarget};
use crate::buffer::DelayLine;
use crate::channel::CommandSender;
use crate::command::{Command, NodeParameter};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::garbage::GarbageCollector;
use crate::midi::{MidiClip, Note};
use crate::monitor::EngineMonitor;
use crate::node::{ClipId, Connection, Node, NodeId, NodeKind, NoteId, PluginId, PortRef, SignalType};
use crate::plugin::{ParameterInfo, Plugin};
use crate::render::RenderNode;
use crate::router::{Router, RouterStats};
use crate::timeline::{TempoMap, TimeSignature};

/// What the control side remembers about a hosted plugin.
#[derive(Clone, Debug)]
pub struct PluginInfo {
    pub id: PluginId,
    pub name: String,
    pub parameters: Vec<ParameterInfo>,
    pub latency: u32,
    pub bypassed: bool,
}

#[derive(Debug, Default)]
struct NodeRecord {
    plugins: Vec<PluginInfo>,
    clips: Vec<MidiClip>,
    automated: Vec<AutomationTarget>,
}

impl NodeRecord {
    fn latency(&self) -> u32 {
        self.plugins.iter().filter(|p| !p.bypassed).map(|p| p.latency).sum()
    }

    fn plugin_index(&self, id: PluginId) -> Option<usize> {
        self.plugins.iter().position(|p| p.id == id)
    }

    fn clip_mut(&mut self, id: ClipId) -> Option<&mut MidiClip> {
        self.clips.iter_mut().find(|c| c.id == id)
    }
}

pub struct Controller {
    config: EngineConfig,
    router: Router,
    sender: CommandSender,
    garbage: GarbageCollector,
    monitor: EngineMonitor,
    tempo: TempoMap,
    records: HashMap<NodeId, NodeRecord>,
    next_node: u64,
    next_plugin: u64,
    next_clip: u64,
    next_note: u64,
    staged: Vec<Command>,
    batch_depth: usize,
    /// Compensation last sent per sink node
    sent_master: HashMap<NodeId, u32>,
    /// Alignment delay last sent per audio connection
    sent_edge: HashMap<Connection, u32>,
    /// Router revision the sent delays were computed from
    synced_revision: u64,
}

impl Controller {
    pub(crate) fn new(
        config: EngineConfig,
        tempo: TempoMap,
        sender: CommandSender,
        garbage: GarbageCollector,
        monitor: EngineMonitor,
    ) -> Self {
        Self {
            config,
            router: Router::new(),
            sender,
            garbage,
            monitor,
            tempo,
            records: HashMap::new(),
            next_node: 1,
            next_plugin: 1,
            next_clip: 1,
            next_note: 1,
            staged: Vec::new(),
            batch_depth: 0,
            sent_master: HashMap::new(),
            sent_edge: HashMap::new(),
            synced_revision: 0,
        }
    }

    delegate! {
        to self.router {
            pub fn node_count(&self) -> usize;
            pub fn connection_count(&self) -> usize;
            pub fn connections(&self) -> &[Connection];
            pub fn contains(&self, id: NodeId) -> bool;
            pub fn is_sink(&self, id: NodeId) -> bool;
            pub fn find_path(&self, from: NodeId, to: NodeId) -> Option<Vec<NodeId>>;
            pub fn to_dot(&self) -> String;
            pub fn processing_order(&mut self) -> Result<Vec<NodeId>>;
            pub fn parallel_groups(&mut self) -> Result<Vec<Vec<NodeId>>>;
            pub fn compensation(&mut self, node: NodeId) -> u32;
            pub fn accumulated_latency(&mut self, node: NodeId) -> u32;
            pub fn statistics(&mut self) -> RouterStats;
            #[call(max_latency)]
            pub fn total_latency_samples(&mut self) -> u32;
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn monitor(&self) -> &EngineMonitor {
        &self.monitor
    }

    /// Control-side copy of the tempo map, identical to the audio side's once
    /// pending commands are drained.
    pub fn tempo_map(&self) -> &TempoMap {
        &self.tempo
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.router.node(id)
    }

    pub fn plugins(&self, node: NodeId) -> &[PluginInfo] {
        self.records.get(&node).map(|r| r.plugins.as_slice()).unwrap_or(&[])
    }

    pub fn clip(&self, node: NodeId, clip: ClipId) -> Option<&MidiClip> {
        self.records.get(&node)?.clips.iter().find(|c| c.id == clip)
    }

    /// Parameters of `node` that follow an automation lane.
    pub fn automated(&self, node: NodeId) -> &[AutomationTarget] {
        self.records.get(&node).map(|r| r.automated.as_slice()).unwrap_or(&[])
    }

    /// Run `edits` and send everything they change as one batch, applied by
    /// the audio thread within a single block.
    pub fn batch<R>(&mut self, edits: impl FnOnce(&mut Self) -> R) -> R {
        self.batch_depth += 1;
        let result = edits(self);
        self.batch_depth -= 1;
        self.commit();
        result
    }

    fn stage(&mut self, command: Command) {
        self.staged.push(command);
        self.commit();
    }

    fn commit(&mut self) {
        if self.batch_depth > 0 {
            return;
        }
        // free the disposal ring and retry the backlog on every edit, so
        // callers that never call flush() do not starve either ring
        self.garbage.collect();
        self.sender.flush();
        self.sync_latency();
        if !self.staged.is_empty() {
            let batch = core::mem::take(&mut self.staged);
            self.sender.push_batch(batch);
        }
    }

    /// Retry publishing held-back commands and free what the audio thread
    /// handed back. Returns the number of commands still waiting.
    pub fn flush(&mut self) -> usize {
        self.garbage.collect();
        self.sender.flush()
    }

    /// Free objects retired by the audio thread.
    pub fn collect_garbage(&mut self) -> usize {
        self.garbage.collect()
    }

    /// Commands recorded but not yet visible to the audio thread.
    pub fn pending_commands(&self) -> usize {
        self.sender.pending()
    }

    /// Send the alignment delays that changed since the last commit.
    fn sync_latency(&mut self) {
        if self.router.revision() == self.synced_revision {
            return;
        }
        let order = match self.router.processing_order() {
            Ok(order) => order,
            Err(_) => return,
        };
        self.synced_revision = self.router.revision();

        for node in order {
            let target = if self.router.is_sink(node) {
                self.router.compensation(node)
            } else {
                0
            };
            let sent = self.sent_master.get(&node).copied().unwrap_or(0);
            if sent != target {
                let channels = self.router.node(node).map_or(1, |n| n.output_channels().max(1));
                self.sent_master.insert(node, target);
                debug!(%node, samples = target, "master compensation changed");
                self.staged.push(Command::SetCompensation {
                    node,
                    delay: delay_line(channels, target),
                });
            }
        }

        let audio: Vec<Connection> = self
            .router
            .connections()
            .iter()
            .filter(|c| c.signal == SignalType::Audio)
            .copied()
            .collect();
        for connection in audio {
            let target = self.router.input_delay(connection.source.node, connection.dest.node);
            let sent = self.sent_edge.get(&connection).copied().unwrap_or(0);
            if sent != target {
                let channels = self
                    .router
                    .node(connection.source.node)
                    .map_or(1, |n| n.output_channels().max(1));
                self.sent_edge.insert(connection, target);
                debug!(from = %connection.source, to = %connection.dest, samples = target, "input alignment changed");
                self.staged.push(Command::SetConnectionDelay {
                    connection,
                    delay: delay_line(channels, target),
                });
            }
        }
    }

    fn record(&mut self, node: NodeId) -> Result<&mut NodeRecord> {
        self.records.get_mut(&node).ok_or(Error::UnknownNode(node))
    }

    fn expect_kind(&self, node: NodeId, expected: NodeKind) -> Result<()> {
        let actual = self.router.node(node).ok_or(Error::UnknownNode(node))?.kind;
        if actual != expected {
            return Err(Error::WrongNodeKind { node, expected, actual });
        }
        Ok(())
    }

    /// Create a node of `kind` with a fresh id.
    pub fn create_node(&mut self, kind: NodeKind, channels: u16) -> Result<NodeId> {
        let id = NodeId::new(self.next_node);
        self.add_node(Node::new(id, kind, channels))
    }

    pub fn add_node(&mut self, node: Node) -> Result<NodeId> {
        if self.router.node_count() >= self.config.max_nodes {
            return Err(Error::TooManyNodes(self.config.max_nodes));
        }
        let id = node.id;
        if self.router.contains(id) {
            return Err(Error::DuplicateNode(id));
        }

        let render = Box::new(RenderNode::new(&node, &self.config));
        let kind = node.kind;
        self.router.add_node(node);
        self.records.insert(id, NodeRecord::default());
        self.next_node = self.next_node.max(id.raw() + 1);

        info!(node = %id, ?kind, "node added");
        self.stage(Command::AddNode(render));
        Ok(id)
    }

    /// Remove a node and its connections. Returns `false` if it was not
    /// there.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        if !self.router.remove_node(id) {
            return false;
        }
        self.records.remove(&id);
        self.sent_master.remove(&id);
        self.sent_edge
            .retain(|c, _| c.source.node != id && c.dest.node != id);

        info!(node = %id, "node removed");
        self.stage(Command::RemoveNode(id));
        true
    }

    pub fn connect(&mut self, source: PortRef, dest: PortRef) -> Result<Connection> {
        if self.router.connection_count() >= self.config.max_connections {
            return Err(Error::TooManyConnections(self.config.max_connections));
        }
        let connection = self.router.try_connect(source, dest)?;
        self.stage(Command::AddConnection(connection));
        Ok(connection)
    }

    pub fn disconnect(&mut self, source: PortRef, dest: PortRef) -> Result<()> {
        let connection = self.find_connection(source, dest)?;
        self.router.disconnect(source, dest);
        self.sent_edge.remove(&connection);
        self.stage(Command::RemoveConnection(connection));
        Ok(())
    }

    fn find_connection(&self, source: PortRef, dest: PortRef) -> Result<Connection> {
        self.router
            .connections()
            .iter()
            .find(|c| c.source == source && c.dest == dest)
            .copied()
            .ok_or(Error::UnknownConnection { from: source, to: dest })
    }

    /// Linear gain applied where the connection is summed.
    pub fn set_connection_gain(&mut self, source: PortRef, dest: PortRef, gain: f32) -> Result<()> {
        let connection = self.find_connection(source, dest)?;
        self.stage(Command::SetConnectionGain { connection, gain });
        Ok(())
    }

    /// Prepare `plugin` and insert it into `node`'s chain at `index`
    /// (`None` appends).
    pub fn add_plugin(&mut self, node: NodeId, plugin: impl Plugin, index: Option<usize>) -> Result<PluginId> {
        self.add_boxed_plugin(node, Box::new(plugin), index)
    }

    pub fn add_boxed_plugin(
        &mut self,
        node: NodeId,
        mut plugin: Box<dyn Plugin>,
        index: Option<usize>,
    ) -> Result<PluginId> {
        let limit = self.config.max_plugins_per_node;
        let (sample_rate, block_size) = (self.config.sample_rate, self.config.block_size);
        let id = PluginId(self.next_plugin);

        let record = self.record(node)?;
        if record.plugins.len() >= limit {
            return Err(Error::TooManyPlugins { node, limit });
        }

        plugin.prepare(sample_rate, block_size);
        let info = PluginInfo {
            id,
            name: plugin.name().to_string(),
            parameters: plugin.parameters().to_vec(),
            latency: plugin.latency_samples(),
            bypassed: false,
        };
        let index = index.unwrap_or(record.plugins.len()).min(record.plugins.len());
        info!(%node, plugin = %info.name, latency = info.latency, index, "plugin added");
        record.plugins.insert(index, info);
        let latency = record.latency();

        self.next_plugin += 1;
        self.router.report_latency(node, latency);
        self.stage(Command::AddPluginToNode {
            node,
            plugin_id: id,
            index,
            plugin,
        });
        Ok(id)
    }

    pub fn remove_plugin(&mut self, node: NodeId, plugin: PluginId) -> Result<()> {
        let record = self.record(node)?;
        let index = record
            .plugin_index(plugin)
            .ok_or(Error::UnknownPlugin { node, plugin })?;
        record.plugins.remove(index);
        let latency = record.latency();
        let mut lanes = Vec::new();
        record.automated.retain(|target| match target {
            AutomationTarget::Plugin { plugin: p, .. } if *p == plugin => {
                lanes.push(*target);
                false
            }
            _ => true,
        });

        self.router.report_latency(node, latency);
        self.staged.extend(lanes.into_iter().map(|target| Command::SetAutomation {
            node,
            target,
            lane: None,
        }));
        self.stage(Command::RemovePluginFromNode { node, plugin_id: plugin });
        Ok(())
    }

    pub fn move_plugin(&mut self, node: NodeId, plugin: PluginId, index: usize) -> Result<()> {
        let record = self.record(node)?;
        let from = record
            .plugin_index(plugin)
            .ok_or(Error::UnknownPlugin { node, plugin })?;
        let info = record.plugins.remove(from);
        let index = index.min(record.plugins.len());
        record.plugins.insert(index, info);

        self.stage(Command::MovePluginInChain {
            node,
            plugin_id: plugin,
            index,
        });
        Ok(())
    }

    /// Set a plugin parameter by name. The value is clamped to the
    /// parameter's range.
    pub fn set_plugin_parameter(&mut self, node: NodeId, plugin: PluginId, name: &str, value: f32) -> Result<()> {
        let record = self.record(node)?;
        let info = record
            .plugins
            .iter()
            .find(|p| p.id == plugin)
            .ok_or(Error::UnknownPlugin { node, plugin })?;
        let index = info
            .parameters
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| Error::UnknownParameter {
                plugin: info.name.clone(),
                name: name.to_string(),
            })?;
        let value = info.parameters[index].clamp(value);

        self.stage(Command::SetPluginParameter {
            node,
            plugin_id: plugin,
            index,
            value,
        });
        Ok(())
    }

    /// Bypassed plugins pass their input through and add no latency.
    pub fn set_plugin_bypass(&mut self, node: NodeId, plugin: PluginId, bypassed: bool) -> Result<()> {
        let record = self.record(node)?;
        let index = record
            .plugin_index(plugin)
            .ok_or(Error::UnknownPlugin { node, plugin })?;
        record.plugins[index].bypassed = bypassed;
        let latency = record.latency();

        self.router.report_latency(node, latency);
        self.stage(Command::SetPluginBypass {
            node,
            plugin_id: plugin,
            bypassed,
        });
        Ok(())
    }

    fn set_parameter(&mut self, node: NodeId, parameter: NodeParameter) -> Result<()> {
        if !self.router.contains(node) {
            return Err(Error::UnknownNode(node));
        }
        self.stage(Command::SetNodeParameter { node, parameter });
        Ok(())
    }

    /// Volume in dB; -96 dB and below is silence.
    pub fn set_volume_db(&mut self, node: NodeId, db: f32) -> Result<()> {
        self.set_parameter(node, NodeParameter::Volume(db))
    }

    pub fn set_gain(&mut self, node: NodeId, gain: f32) -> Result<()> {
        self.set_parameter(node, NodeParameter::Gain(gain))
    }

    /// Pan from -1.0 (left) to 1.0 (right).
    pub fn set_pan(&mut self, node: NodeId, pan: f32) -> Result<()> {
        self.set_parameter(node, NodeParameter::Pan(pan))
    }

    pub fn set_mute(&mut self, node: NodeId, mute: bool) -> Result<()> {
        self.set_parameter(node, NodeParameter::Mute(mute))
    }

    pub fn set_solo(&mut self, node: NodeId, solo: bool) -> Result<()> {
        self.set_parameter(node, NodeParameter::Solo(solo))
    }

    /// Feed the host input into an audio track.
    pub fn set_input_monitoring(&mut self, node: NodeId, enabled: bool) -> Result<()> {
        self.expect_kind(node, NodeKind::AudioTrack)?;
        self.set_parameter(node, NodeParameter::InputMonitoring(enabled))
    }

    /// Drive `target` on `node` from a breakpoint lane, replacing any lane
    /// it already has. Automated values win over values set by hand.
    /// Plugin parameter values are clamped to the parameter's range.
    pub fn set_automation(
        &mut self,
        node: NodeId,
        target: AutomationTarget,
        points: Vec<AutomationPoint>,
    ) -> Result<()> {
        let limit = self.config.max_automation_lanes;
        let record = self.record(node)?;
        let range = match target {
            AutomationTarget::Plugin { plugin, index } => {
                let info = record
                    .plugins
                    .iter()
                    .find(|p| p.id == plugin)
                    .ok_or(Error::UnknownPlugin { node, plugin })?;
                let parameter = info.parameters.get(index).ok_or_else(|| Error::UnknownParameter {
                    plugin: info.name.clone(),
                    name: format!("#{}", index),
                })?;
                Some((parameter.min, parameter.max))
            }
            _ => None,
        };

        let mut lane = AutomationLane::new(target, points)?;
        if let Some((min, max)) = range {
            lane = lane.clamped(min, max);
        }
        if !record.automated.contains(&target) {
            if record.automated.len() >= limit {
                return Err(Error::TooManyAutomationLanes { node, limit });
            }
            record.automated.push(target);
        }

        debug!(%node, ?target, points = lane.points().len(), "automation set");
        self.stage(Command::SetAutomation {
            node,
            target,
            lane: Some(Box::new(lane)),
        });
        Ok(())
    }

    /// [`set_automation`](Self::set_automation) for a plugin parameter
    /// named `name`.
    pub fn automate_plugin_parameter(
        &mut self,
        node: NodeId,
        plugin: PluginId,
        name: &str,
        points: Vec<AutomationPoint>,
    ) -> Result<()> {
        let info = self
            .record(node)?
            .plugins
            .iter()
            .find(|p| p.id == plugin)
            .ok_or(Error::UnknownPlugin { node, plugin })?;
        let index = info
            .parameters
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| Error::UnknownParameter {
                plugin: info.name.clone(),
                name: name.to_string(),
            })?;
        self.set_automation(node, AutomationTarget::Plugin { plugin, index }, points)
    }

    /// Stop automating `target`. The parameter keeps its last value.
    /// Returns `false` if it was not automated.
    pub fn clear_automation(&mut self, node: NodeId, target: AutomationTarget) -> bool {
        let Some(record) = self.records.get_mut(&node) else {
            return false;
        };
        let Some(index) = record.automated.iter().position(|t| *t == target) else {
            return false;
        };
        record.automated.remove(index);
        self.stage(Command::SetAutomation {
            node,
            target,
            lane: None,
        });
        true
    }

    /// Add an empty MIDI clip to an instrument track.
    pub fn add_clip(&mut self, node: NodeId, start: f64, duration: f64) -> Result<ClipId> {
        self.expect_kind(node, NodeKind::InstrumentTrack)?;
        if !(start.is_finite() && start >= 0.0 && duration.is_finite() && duration > 0.0) {
            return Err(Error::InvalidClipRange { start, duration });
        }
        let limit = self.config.max_clips_per_node;
        let id = ClipId(self.next_clip);
        let record = self.record(node)?;
        if record.clips.len() >= limit {
            return Err(Error::TooManyClips { node, limit });
        }

        let clip = MidiClip::new(id, start, duration);
        record.clips.push(clip.clone());
        self.next_clip += 1;
        self.stage(Command::AddClip {
            node,
            clip: Box::new(clip),
        });
        Ok(id)
    }

    pub fn remove_clip(&mut self, node: NodeId, clip: ClipId) -> Result<()> {
        let record = self.record(node)?;
        let index = record
            .clips
            .iter()
            .position(|c| c.id == clip)
            .ok_or(Error::UnknownClip { node, clip })?;
        record.clips.remove(index);
        self.staged.retain(|c| !targets_clip(c, node, clip));
        self.stage(Command::RemoveClip { node, clip });
        Ok(())
    }

    /// Add a note to a clip. `start` is in beats from the clip start.
    pub fn add_note(
        &mut self,
        node: NodeId,
        clip: ClipId,
        pitch: u8,
        velocity: u8,
        start: f64,
        duration: f64,
    ) -> Result<NoteId> {
        let valid = pitch <= 127
            && (1..=127).contains(&velocity)
            && start.is_finite()
            && start >= 0.0
            && duration.is_finite()
            && duration > 0.0;
        if !valid {
            return Err(Error::InvalidNote {
                pitch,
                velocity,
                duration,
            });
        }

        let id = NoteId(self.next_note);
        let target = self
            .record(node)?
            .clip_mut(clip)
            .ok_or(Error::UnknownClip { node, clip })?;
        let mut notes = target.notes().to_vec();
        notes.push(Note::new(id, pitch, velocity, start, duration));
        target.replace_notes(notes.clone());

        self.next_note += 1;
        self.staged.retain(|c| !targets_clip(c, node, clip));
        self.stage(Command::ScheduleNotes { node, clip, notes });
        Ok(id)
    }

    /// Remove notes from a clip. Sounding notes among them are released on
    /// the next block. Unknown note ids are ignored.
    pub fn remove_notes(&mut self, node: NodeId, clip: ClipId, notes: &[NoteId]) -> Result<()> {
        let target = self
            .record(node)?
            .clip_mut(clip)
            .ok_or(Error::UnknownClip { node, clip })?;
        let kept: Vec<Note> = target
            .notes()
            .iter()
            .filter(|n| !notes.contains(&n.id))
            .copied()
            .collect();
        target.replace_notes(kept.clone());

        self.staged.retain(|c| !targets_clip(c, node, clip));
        self.stage(Command::RemoveNotes {
            node,
            clip,
            notes: kept,
        });
        Ok(())
    }

    /// Set the tempo from `beat` on.
    pub fn set_tempo(&mut self, beat: f64, bpm: f64) -> Result<()> {
        check_beat(beat)?;
        self.tempo.set_tempo(beat, bpm)?;
        self.stage(Command::SetTempo { beat, bpm });
        Ok(())
    }

    /// Remove the tempo change at `beat`. The tempo at beat 0 cannot be
    /// removed.
    pub fn remove_tempo(&mut self, beat: f64) -> bool {
        if !self.tempo.remove_tempo(beat) {
            return false;
        }
        self.stage(Command::RemoveTempo { beat });
        true
    }

    pub fn set_time_signature(&mut self, beat: f64, numerator: u8, denominator: u8) -> Result<()> {
        check_beat(beat)?;
        let signature = TimeSignature::new(numerator, denominator);
        self.tempo.set_time_signature(beat, signature)?;
        self.stage(Command::SetTimeSignature { beat, signature });
        Ok(())
    }

    pub fn remove_time_signature(&mut self, beat: f64) -> bool {
        if !self.tempo.remove_time_signature(beat) {
            return false;
        }
        self.stage(Command::RemoveTimeSignature { beat });
        true
    }

    pub fn play(&mut self) {
        self.stage(Command::Play);
    }

    /// Stop and rewind to beat 0.
    pub fn stop(&mut self) {
        self.stage(Command::Stop);
    }

    pub fn seek(&mut self, beat: f64) -> Result<()> {
        check_beat(beat)?;
        self.stage(Command::Seek(beat));
        Ok(())
    }

    /// Remove every node and connection. Tempo and transport are kept.
    pub fn clear_project(&mut self) {
        self.router.clear();
        self.records.clear();
        self.sent_master.clear();
        self.sent_edge.clear();
        info!("project cleared");
        self.stage(Command::ClearProject);
    }
}

fn check_beat(beat: f64) -> Result<()> {
    if beat.is_finite() && beat >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidBeat(beat))
    }
}

fn delay_line(channels: u16, samples: u32) -> Option<Box<DelayLine>> {
    (samples > 0).then(|| Box::new(DelayLine::new(channels as usize, samples as usize)))
}

/// A staged note-list replacement for `clip`, superseded by a newer one.
fn targets_clip(command: &Command, node: NodeId, clip: ClipId) -> bool {
    match command {
        Command::ScheduleNotes { node: n, clip: c, .. } | Command::RemoveNotes { node: n, clip: c, .. } => {
            *n == node && *c == clip
        }
        _ => false,
    }
}
