//! Audio-thread mirror of the project graph and the per-block pipeline.
//!
//! The [`RenderGraph`] is owned by the audio thread and changed only by
//! [`apply`](RenderGraph::apply)ing drained commands. Every collection it
//! keeps is sized from [`EngineConfig`] when the graph is built, so neither
//! applying commands nor rendering grows a collection.

mod node;

pub use node::{
    db_to_gain, AudioTrackNode, BusNode, InstrumentNode, MixState, NodeBehavior, NodeVariant,
    PluginNode, RenderNode, SILENCE_DB,
};

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use std::panic::{catch_unwind, AssertUnwindSafe};

use hashbrown::HashMap;
use tracing::{debug, error, warn};

use crate::buffer::{AudioBuffer, DelayLine};
use crate::command::Command;
use crate::config::EngineConfig;
use crate::error::PluginError;
use crate::garbage::{Garbage, GarbageSender};
use crate::node::{Connection, NodeId, SignalType};
use crate::timeline::TempoMap;
use crate::transport::{Transport, TransportContext};

/// Counters kept by the render graph.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub blocks_processed: u64,
    pub samples_processed: u64,
    pub nodes_added: u64,
    pub nodes_removed: u64,
    pub plugins_added: u64,
    pub plugins_removed: u64,
    /// Commands naming a node, connection, plugin or clip that is not there
    pub stale_commands: u64,
    /// Node-blocks rendered as silence after a plugin failure
    pub node_faults: u64,
    /// Blocks rendered as silence because the connections formed a cycle
    pub cycles_detected: u64,
}

struct RenderEdge {
    connection: Connection,
    src_slot: usize,
    dst_slot: usize,
    gain: f32,
    delay: Option<Box<DelayLine>>,
}

#[derive(Clone, Copy, Debug)]
struct Step {
    slot: usize,
    /// Range of this node's incoming edges in `incoming`
    first: usize,
    count: usize,
    /// No outgoing audio connection: summed into the master
    sink: bool,
    /// False while another node is soloed and this one is off its path
    audible: bool,
}

/// Scratch space for rebuilding the schedule, one entry per slot.
struct Scratch {
    in_degree: Vec<usize>,
    ready: Vec<usize>,
    upstream: Vec<bool>,
    downstream: Vec<bool>,
}

impl Scratch {
    fn new(slots: usize) -> Self {
        Self {
            in_degree: vec![0; slots],
            ready: Vec::with_capacity(slots),
            upstream: vec![false; slots],
            downstream: vec![false; slots],
        }
    }
}

pub struct RenderGraph {
    sample_rate: u32,
    block_size: usize,
    slots: Vec<Option<Box<RenderNode>>>,
    index: HashMap<NodeId, usize>,
    edges: Vec<RenderEdge>,
    schedule: Vec<Step>,
    incoming: Vec<usize>,
    scratch: Scratch,
    topology_dirty: bool,
    cycle: bool,
    master: AudioBuffer,
    tempo: TempoMap,
    transport: Transport,
    was_playing: bool,
    last_end: f64,
    retired_dropped_events: u64,
    garbage: GarbageSender,
    stats: RenderStats,
}

impl RenderGraph {
    pub fn new(config: &EngineConfig, tempo: TempoMap, garbage: GarbageSender) -> Self {
        let slots = config.max_nodes;
        Self {
            sample_rate: config.sample_rate,
            block_size: config.block_size,
            slots: (0..slots).map(|_| None).collect(),
            // twice the node limit: a full table of tombstones then rehashes
            // in place instead of growing
            index: HashMap::with_capacity(slots * 2),
            edges: Vec::with_capacity(config.max_connections),
            schedule: Vec::with_capacity(slots),
            incoming: Vec::with_capacity(config.max_connections),
            scratch: Scratch::new(slots),
            topology_dirty: false,
            cycle: false,
            master: AudioBuffer::new(config.output_channels as usize, config.block_size),
            tempo,
            transport: Transport::default(),
            was_playing: false,
            last_end: 0.0,
            retired_dropped_events: 0,
            garbage,
            stats: RenderStats::default(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    pub fn tempo_map(&self) -> &TempoMap {
        &self.tempo
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Master output of the last rendered block.
    pub fn master(&self) -> &AudioBuffer {
        &self.master
    }

    pub fn node_count(&self) -> usize {
        self.index.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots.iter().flatten().map(|n| n.id())
    }

    pub fn node(&self, id: NodeId) -> Option<&RenderNode> {
        let slot = *self.index.get(&id)?;
        self.slots[slot].as_deref()
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut RenderNode> {
        let slot = *self.index.get(&id)?;
        self.slots[slot].as_deref_mut()
    }

    pub fn has_connection(&self, connection: &Connection) -> bool {
        self.edge_position(connection).is_some()
    }

    /// Gain of a connection, if present.
    pub fn connection_gain(&self, connection: &Connection) -> Option<f32> {
        self.edge_position(connection).map(|i| self.edges[i].gain)
    }

    /// Alignment delay on a connection in samples, if present.
    pub fn connection_delay(&self, connection: &Connection) -> Option<usize> {
        self.edge_position(connection)
            .map(|i| self.edges[i].delay.as_ref().map_or(0, |d| d.delay()))
    }

    fn edge_position(&self, connection: &Connection) -> Option<usize> {
        self.edges.iter().position(|e| e.connection == *connection)
    }

    /// Node ids in the order the last schedule renders them. Rebuilds the
    /// schedule first if the topology changed.
    pub fn order(&mut self) -> Vec<NodeId> {
        self.refresh_schedule();
        self.schedule
            .iter()
            .filter_map(|step| self.slots[step.slot].as_ref().map(|n| n.id()))
            .collect()
    }

    /// Note events lost to full buffers, over the life of the graph.
    pub fn dropped_events(&self) -> u64 {
        self.retired_dropped_events
            + self
                .slots
                .iter()
                .flatten()
                .map(|n| n.dropped_events())
                .sum::<u64>()
    }

    /// Context for the next block under the engine-owned transport.
    pub fn transport_context(&self) -> TransportContext {
        self.transport.context(&self.tempo, self.sample_rate, self.block_size)
    }

    /// Move the engine-owned transport past a rendered block.
    pub fn advance_transport(&mut self, ctx: &TransportContext) {
        self.transport.advance(ctx);
    }

    /// Current beat of the engine-owned transport.
    pub fn current_beat(&self) -> f64 {
        self.transport.beat(&self.tempo, self.sample_rate)
    }

    fn dispose(&mut self, item: Garbage) {
        self.garbage.dispose(item);
    }

    fn stale(&mut self, command: &'static str, node: Option<NodeId>) {
        self.stats.stale_commands += 1;
        debug!(command, node = ?node, "ignoring command for missing target");
    }

    /// Apply one command. Payloads the graph does not keep are handed to
    /// the disposal channel.
    pub fn apply(&mut self, command: Command) {
        let name = command.name();
        let target = command.target();

        match command {
            Command::AddNode(node) => self.add_node(node),
            Command::RemoveNode(id) => {
                if !self.remove_node(id) {
                    self.stale(name, target);
                }
            }
            Command::AddConnection(connection) => self.add_connection(connection),
            Command::RemoveConnection(connection) => match self.edge_position(&connection) {
                Some(i) => {
                    let edge = self.edges.swap_remove(i);
                    if let Some(delay) = edge.delay {
                        self.dispose(Garbage::Delay(delay));
                    }
                    self.topology_dirty = true;
                }
                None => self.stale(name, target),
            },
            Command::SetConnectionGain { connection, gain } => match self.edge_position(&connection) {
                Some(i) => self.edges[i].gain = if gain.is_finite() { gain.max(0.0) } else { 0.0 },
                None => self.stale(name, target),
            },
            Command::SetConnectionDelay { connection, delay } => match self.edge_position(&connection) {
                Some(i) => {
                    let old = core::mem::replace(&mut self.edges[i].delay, delay);
                    if let Some(old) = old {
                        self.dispose(Garbage::Delay(old));
                    }
                }
                None => {
                    if let Some(delay) = delay {
                        self.dispose(Garbage::Delay(delay));
                    }
                    self.stale(name, target);
                }
            },
            Command::SetCompensation { node, delay } => match self.node_mut(node) {
                Some(n) => {
                    let old = core::mem::replace(&mut n.master_delay, delay);
                    if let Some(old) = old {
                        self.dispose(Garbage::Delay(old));
                    }
                }
                None => {
                    if let Some(delay) = delay {
                        self.dispose(Garbage::Delay(delay));
                    }
                    self.stale(name, target);
                }
            },
            Command::AddPluginToNode {
                node,
                plugin_id,
                index,
                plugin,
            } => {
                let result = match self.node_mut(node) {
                    Some(n) => n.chain.add(plugin_id, plugin, index),
                    None => Err(plugin),
                };
                match result {
                    Ok(()) => self.stats.plugins_added += 1,
                    Err(plugin) => {
                        self.dispose(Garbage::Plugin(plugin));
                        self.stale(name, target);
                    }
                }
            }
            Command::RemovePluginFromNode { node, plugin_id } => {
                match self.node_mut(node).and_then(|n| n.chain.remove(plugin_id)) {
                    Some(plugin) => {
                        self.stats.plugins_removed += 1;
                        self.dispose(Garbage::Plugin(plugin));
                    }
                    None => self.stale(name, target),
                }
            }
            Command::MovePluginInChain {
                node,
                plugin_id,
                index,
            } => {
                if !self.node_mut(node).is_some_and(|n| n.chain.move_to(plugin_id, index)) {
                    self.stale(name, target);
                }
            }
            Command::SetPluginParameter {
                node,
                plugin_id,
                index,
                value,
            } => {
                let applied = self
                    .node_mut(node)
                    .is_some_and(|n| n.chain.set_parameter(plugin_id, index, value));
                if !applied {
                    self.stale(name, target);
                }
            }
            Command::SetPluginBypass {
                node,
                plugin_id,
                bypassed,
            } => {
                if !self.node_mut(node).is_some_and(|n| n.chain.set_bypass(plugin_id, bypassed)) {
                    self.stale(name, target);
                }
            }
            Command::SetNodeParameter { node, parameter } => match self.node_mut(node) {
                Some(n) => {
                    if n.set_parameter(parameter) {
                        // solo changes which nodes are audible
                        self.topology_dirty = true;
                    }
                }
                None => self.stale(name, target),
            },
            Command::AddClip { node, clip } => {
                let result = match self.node_mut(node).and_then(RenderNode::instrument_mut) {
                    Some(inst) => inst.add_clip(clip),
                    None => Err(clip),
                };
                if let Err(clip) = result {
                    self.dispose(Garbage::Clip(clip));
                    self.stale(name, target);
                }
            }
            Command::RemoveClip { node, clip } => {
                let removed = self
                    .node_mut(node)
                    .and_then(RenderNode::instrument_mut)
                    .and_then(|inst| inst.remove_clip(clip));
                match removed {
                    Some(clip) => self.dispose(Garbage::Clip(clip)),
                    None => self.stale(name, target),
                }
            }
            Command::ScheduleNotes { node, clip, notes } | Command::RemoveNotes { node, clip, notes } => {
                let result = match self.node_mut(node).and_then(RenderNode::instrument_mut) {
                    Some(inst) => inst.replace_notes(clip, notes),
                    None => Err(notes),
                };
                match result {
                    Ok(old) => self.dispose(Garbage::Notes(old)),
                    Err(notes) => {
                        self.dispose(Garbage::Notes(notes));
                        self.stale(name, target);
                    }
                }
            }
            Command::SetTempo { beat, bpm } => {
                let now = self.current_beat();
                self.transport.reanchor(now);
                if let Err(err) = self.tempo.set_tempo(beat, bpm) {
                    warn!(%err, beat, bpm, "tempo change not applied");
                }
            }
            Command::RemoveTempo { beat } => {
                let now = self.current_beat();
                self.transport.reanchor(now);
                if !self.tempo.remove_tempo(beat) {
                    self.stale(name, target);
                }
            }
            Command::SetTimeSignature { beat, signature } => {
                if let Err(err) = self.tempo.set_time_signature(beat, signature) {
                    warn!(%err, beat, "time signature change not applied");
                }
            }
            Command::RemoveTimeSignature { beat } => {
                if !self.tempo.remove_time_signature(beat) {
                    self.stale(name, target);
                }
            }
            Command::SetAutomation { node, target: param, lane } => {
                let Some(n) = self.node_mut(node) else {
                    if let Some(lane) = lane {
                        self.dispose(Garbage::Automation(lane));
                    }
                    self.stale(name, target);
                    return;
                };
                let retired = match lane {
                    Some(lane) => match n.set_automation(lane) {
                        Ok(old) => old,
                        Err(lane) => {
                            warn!(node = %node, "automation lanes full; dropping lane");
                            Some(lane)
                        }
                    },
                    None => n.clear_automation(param),
                };
                if let Some(old) = retired {
                    self.dispose(Garbage::Automation(old));
                }
            }
            Command::Play => self.transport.play(),
            Command::Stop => self.transport.stop(),
            Command::Seek(beat) => self.transport.seek(beat, &self.tempo, self.sample_rate),
            Command::ClearProject => self.clear(),
        }
    }

    fn add_node(&mut self, node: Box<RenderNode>) {
        let id = node.id();
        if self.index.contains_key(&id) {
            warn!(node = %id, "node already present; dropping duplicate");
            self.dispose(Garbage::Node(node));
            return;
        }
        let Some(slot) = self.slots.iter().position(Option::is_none) else {
            warn!(node = %id, "render graph is full; dropping node");
            self.dispose(Garbage::Node(node));
            return;
        };

        self.slots[slot] = Some(node);
        self.index.insert(id, slot);
        self.stats.nodes_added += 1;
        self.topology_dirty = true;
    }

    fn remove_node(&mut self, id: NodeId) -> bool {
        let Some(slot) = self.index.remove(&id) else {
            return false;
        };

        let mut i = 0;
        while i < self.edges.len() {
            if self.edges[i].src_slot == slot || self.edges[i].dst_slot == slot {
                let edge = self.edges.swap_remove(i);
                if let Some(delay) = edge.delay {
                    self.garbage.dispose(Garbage::Delay(delay));
                }
            } else {
                i += 1;
            }
        }

        if let Some(node) = self.slots[slot].take() {
            self.retired_dropped_events += node.dropped_events();
            self.garbage.dispose(Garbage::Node(node));
        }
        self.stats.nodes_removed += 1;
        self.topology_dirty = true;
        true
    }

    fn add_connection(&mut self, connection: Connection) {
        let slots = (
            self.index.get(&connection.source.node).copied(),
            self.index.get(&connection.dest.node).copied(),
        );
        let (Some(src_slot), Some(dst_slot)) = slots else {
            self.stale("AddConnection", Some(connection.dest.node));
            return;
        };
        if self.has_connection(&connection) {
            debug!(from = %connection.source, to = %connection.dest, "connection already present");
            return;
        }
        if self.edges.len() == self.edges.capacity() {
            warn!(from = %connection.source, to = %connection.dest, "connection table is full; dropping connection");
            return;
        }

        self.edges.push(RenderEdge {
            connection,
            src_slot,
            dst_slot,
            gain: 1.0,
            delay: None,
        });
        self.topology_dirty = true;
    }

    fn clear(&mut self) {
        for edge in self.edges.drain(..) {
            if let Some(delay) = edge.delay {
                self.garbage.dispose(Garbage::Delay(delay));
            }
        }
        for slot in self.slots.iter_mut() {
            if let Some(node) = slot.take() {
                self.retired_dropped_events += node.dropped_events();
                self.stats.nodes_removed += 1;
                self.garbage.dispose(Garbage::Node(node));
            }
        }
        self.index.clear();
        self.topology_dirty = true;
        debug!("project cleared");
    }

    fn refresh_schedule(&mut self) {
        if self.topology_dirty {
            self.rebuild_schedule();
            self.topology_dirty = false;
        }
    }

    /// Kahn's algorithm over the slot table, then solo audibility and the
    /// per-node incoming edge lists.
    fn rebuild_schedule(&mut self) {
        let Scratch {
            in_degree,
            ready,
            upstream,
            downstream,
        } = &mut self.scratch;

        self.schedule.clear();
        self.incoming.clear();
        in_degree.iter_mut().for_each(|d| *d = 0);
        ready.clear();

        for edge in &self.edges {
            in_degree[edge.dst_slot] += 1;
        }
        ready.extend(
            self.slots
                .iter()
                .enumerate()
                .filter(|(slot, node)| node.is_some() && in_degree[*slot] == 0)
                .map(|(slot, _)| slot),
        );

        let mut head = 0;
        while head < ready.len() {
            let slot = ready[head];
            head += 1;
            self.schedule.push(Step {
                slot,
                first: 0,
                count: 0,
                sink: true,
                audible: true,
            });
            for edge in self.edges.iter().filter(|e| e.src_slot == slot) {
                in_degree[edge.dst_slot] -= 1;
                if in_degree[edge.dst_slot] == 0 {
                    ready.push(edge.dst_slot);
                }
            }
        }

        let was_cycle = self.cycle;
        self.cycle = self.schedule.len() < self.index.len();
        if self.cycle {
            if !was_cycle {
                error!(
                    ordered = self.schedule.len(),
                    nodes = self.index.len(),
                    "cycle in render graph; output muted until it is removed"
                );
            }
            return;
        }

        for step in self.schedule.iter_mut() {
            step.first = self.incoming.len();
            for (i, edge) in self.edges.iter().enumerate() {
                if edge.dst_slot == step.slot {
                    self.incoming.push(i);
                } else if edge.src_slot == step.slot && edge.connection.signal == SignalType::Audio {
                    step.sink = false;
                }
            }
            step.count = self.incoming.len() - step.first;
        }

        let soloed = |slot: usize| self.slots[slot].as_ref().is_some_and(|n| n.mix.is_soloed());
        if !self.schedule.iter().any(|step| soloed(step.slot)) {
            return;
        }

        // downstream of a solo, walking forward; upstream, walking back
        for step in &self.schedule {
            let fed = self.incoming[step.first..step.first + step.count]
                .iter()
                .any(|&e| downstream[self.edges[e].src_slot]);
            downstream[step.slot] = fed || soloed(step.slot);
        }
        upstream.iter_mut().for_each(|u| *u = false);
        for step in self.schedule.iter().rev() {
            if soloed(step.slot) {
                upstream[step.slot] = true;
            }
            if upstream[step.slot] {
                for &e in &self.incoming[step.first..step.first + step.count] {
                    upstream[self.edges[e].src_slot] = true;
                }
            }
        }
        for step in self.schedule.iter_mut() {
            step.audible = downstream[step.slot] || upstream[step.slot];
        }
    }

    /// Render one block. See [`process_block_with_input`](Self::process_block_with_input).
    pub fn process_block(&mut self, ctx: &TransportContext) -> &AudioBuffer {
        self.process_block_with_input(ctx, None)
    }

    /// Render one block with `ctx`, feeding `host_input` to audio tracks
    /// that monitor their input. Returns the master output.
    ///
    /// Never blocks and never allocates. A node whose plugin chain fails
    /// or panics is silent for the block; the rest of the graph renders.
    pub fn process_block_with_input(
        &mut self,
        ctx: &TransportContext,
        host_input: Option<&AudioBuffer>,
    ) -> &AudioBuffer {
        self.master.clear();
        self.refresh_schedule();

        // leaving the previous window anywhere but its end cuts every note;
        // half a sample of slack absorbs rounding in host-built windows
        let tolerance = 0.5 * ctx.tempo / 60.0 / ctx.sample_rate as f64;
        let jumped = ctx.playing && (ctx.block_start_beat - self.last_end).abs() > tolerance;
        let release = self.was_playing && (!ctx.playing || jumped);
        // a jump also drops ringing tails
        let reset = self.was_playing && jumped;
        self.was_playing = ctx.playing;
        self.last_end = ctx.block_end_beat;
        self.stats.blocks_processed += 1;
        self.stats.samples_processed += ctx.block_size as u64;

        if self.cycle {
            self.stats.cycles_detected += 1;
            return &self.master;
        }

        if reset {
            self.edges
                .iter_mut()
                .filter_map(|e| e.delay.as_deref_mut())
                .for_each(DelayLine::reset);
        }

        for i in 0..self.schedule.len() {
            let step = self.schedule[i];
            let Some(mut node) = self.slots[step.slot].take() else {
                continue;
            };

            let id = node.id();
            node.sample_automation(ctx.block_start_beat);
            let RenderNode {
                variant,
                chain,
                input,
                output,
                events,
                mix,
                master_delay,
                faulted,
                ..
            } = &mut *node;

            input.clear();
            events.clear();
            if reset {
                if let Some(delay) = master_delay.as_deref_mut() {
                    delay.reset();
                }
                if catch_unwind(AssertUnwindSafe(|| chain.reset())).is_err() {
                    node_fault(&mut self.stats, id, faulted, PluginError::Failed("panicked in reset"));
                }
            }
            if release {
                variant.release_notes(events);
            }

            for &e in &self.incoming[step.first..step.first + step.count] {
                let edge = &mut self.edges[e];
                let Some(src) = self.slots[edge.src_slot].as_deref() else {
                    continue;
                };
                match edge.connection.signal {
                    SignalType::Audio => match edge.delay.as_deref_mut() {
                        Some(delay) => delay.process_into(&src.output, input, edge.gain),
                        None => input.add_from(&src.output, edge.gain),
                    },
                    SignalType::Midi => events.extend_from(&src.events),
                }
            }
            if variant.monitors_input() {
                if let Some(host) = host_input {
                    input.add_from(host, 1.0);
                }
            }

            variant.collect_events(ctx, &self.tempo, events);
            events.sort_by_offset();

            if mix.is_muted() || !step.audible {
                output.clear();
                mix.silence();
            } else {
                output.copy_from(input);
                let result = catch_unwind(AssertUnwindSafe(|| chain.process(ctx, events.as_slice(), &mut *output)));
                match result {
                    Ok(Ok(())) => {
                        if *faulted {
                            debug!(node = %id, "node recovered");
                            *faulted = false;
                        }
                        mix.apply(output);
                    }
                    Ok(Err(err)) => {
                        node_fault(&mut self.stats, id, faulted, err);
                        output.clear();
                        mix.silence();
                    }
                    Err(_) => {
                        node_fault(&mut self.stats, id, faulted, PluginError::Failed("panicked"));
                        output.clear();
                        mix.silence();
                    }
                }
            }

            if step.sink {
                match master_delay.as_deref_mut() {
                    Some(delay) => delay.process_into(output, &mut self.master, 1.0),
                    None => self.master.add_from(output, 1.0),
                }
            }

            self.slots[step.slot] = Some(node);
        }

        &self.master
    }

    /// Check the internal tables against each other. Returns one message
    /// per inconsistency; empty when everything agrees.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for (id, &slot) in &self.index {
            match self.slots.get(slot).and_then(|s| s.as_ref()) {
                Some(node) if node.id() == *id => {}
                _ => problems.push(format!("index entry {} points at slot {} which does not hold it", id, slot)),
            }
        }
        let occupied = self.slots.iter().flatten().count();
        if occupied != self.index.len() {
            problems.push(format!("{} occupied slots but {} indexed nodes", occupied, self.index.len()));
        }

        for edge in &self.edges {
            let holds = |slot: usize, id: NodeId| self.slots[slot].as_ref().is_some_and(|n| n.id() == id);
            if !holds(edge.src_slot, edge.connection.source.node) || !holds(edge.dst_slot, edge.connection.dest.node) {
                problems.push(format!(
                    "connection {} -> {} references a missing node",
                    edge.connection.source, edge.connection.dest
                ));
            }
        }
        if self.cycle {
            problems.push(String::from("connections form a cycle"));
        }

        problems
    }
}

fn node_fault(stats: &mut RenderStats, id: NodeId, faulted: &mut bool, err: PluginError) {
    stats.node_faults += 1;
    if !*faulted {
        warn!(node = %id, %err, "plugin chain failed; node silenced");
        *faulted = true;
    }
}
