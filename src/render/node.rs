//! Audio-side state of one node.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::f32::consts::{FRAC_PI_4, SQRT_2};

use crate::automation::{AutomationLane, AutomationTarget};
use crate::buffer::{AudioBuffer, DelayLine};
use crate::command::NodeParameter;
use crate::config::EngineConfig;
use crate::midi::{EventBuffer, MidiClip, Note, NoteScheduler};
use crate::node::{ClipId, Node, NodeId, NodeKind};
use crate::plugin::PluginChain;
use crate::timeline::Timeline;
use crate::transport::TransportContext;

/// Volume at or below this many dB is silence.
pub const SILENCE_DB: f32 = -96.0;

/// What differs between node kinds while rendering.
pub trait NodeBehavior {
    fn kind(&self) -> NodeKind;

    /// Add this block's own note events (e.g. from clips) to `events`.
    fn collect_events(&mut self, ctx: &TransportContext, timeline: &dyn Timeline, events: &mut EventBuffer);

    /// Emit note-offs for everything sounding, after a transport jump.
    fn release_notes(&mut self, events: &mut EventBuffer);

    /// Whether the host input is fed into this node.
    fn monitors_input(&self) -> bool;
}

/// Track that plays MIDI clips.
pub struct InstrumentNode {
    clips: Vec<Box<MidiClip>>,
    scheduler: NoteScheduler,
}

impl InstrumentNode {
    pub fn new(max_clips: usize, max_active_notes: usize) -> Self {
        Self {
            clips: Vec::with_capacity(max_clips),
            scheduler: NoteScheduler::with_capacity(max_active_notes),
        }
    }

    pub fn clips(&self) -> impl Iterator<Item = &MidiClip> {
        self.clips.iter().map(|c| c.as_ref())
    }

    pub fn clip(&self, id: ClipId) -> Option<&MidiClip> {
        self.clips().find(|c| c.id == id)
    }

    pub fn sounding_notes(&self) -> usize {
        self.scheduler.active_count()
    }

    /// Notes skipped because too many were already sounding.
    pub fn dropped_notes(&self) -> u64 {
        self.scheduler.dropped()
    }

    /// Returns the clip back if its id is taken or the clip list is full.
    pub fn add_clip(&mut self, clip: Box<MidiClip>) -> Result<(), Box<MidiClip>> {
        if self.clips.len() == self.clips.capacity() || self.clip(clip.id).is_some() {
            return Err(clip);
        }
        self.clips.push(clip);
        Ok(())
    }

    pub fn remove_clip(&mut self, id: ClipId) -> Option<Box<MidiClip>> {
        let index = self.clips.iter().position(|c| c.id == id)?;
        self.scheduler.release_clip(id);
        Some(self.clips.remove(index))
    }

    /// Install a new note list for `clip` and return the old one. Sounding
    /// notes that are not in the new list are released.
    pub fn replace_notes(&mut self, clip: ClipId, notes: Vec<Note>) -> Result<Vec<Note>, Vec<Note>> {
        match self.clips.iter_mut().find(|c| c.id == clip) {
            Some(target) => {
                let old = target.replace_notes(notes);
                self.scheduler.release_missing(target);
                Ok(old)
            }
            None => Err(notes),
        }
    }
}

impl NodeBehavior for InstrumentNode {
    fn kind(&self) -> NodeKind {
        NodeKind::InstrumentTrack
    }

    fn collect_events(&mut self, ctx: &TransportContext, timeline: &dyn Timeline, events: &mut EventBuffer) {
        let clips = self.clips.iter().map(|c| c.as_ref());
        self.scheduler.schedule(ctx, timeline, clips, events);
    }

    fn release_notes(&mut self, events: &mut EventBuffer) {
        self.scheduler.release_all(events);
    }

    fn monitors_input(&self) -> bool {
        false
    }
}

/// Track carrying audio, optionally from the host input.
#[derive(Default)]
pub struct AudioTrackNode {
    monitoring: bool,
}

impl NodeBehavior for AudioTrackNode {
    fn kind(&self) -> NodeKind {
        NodeKind::AudioTrack
    }

    fn collect_events(&mut self, _ctx: &TransportContext, _timeline: &dyn Timeline, _events: &mut EventBuffer) {}

    fn release_notes(&mut self, _events: &mut EventBuffer) {}

    fn monitors_input(&self) -> bool {
        self.monitoring
    }
}

#[derive(Default)]
pub struct BusNode;

impl NodeBehavior for BusNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Bus
    }

    fn collect_events(&mut self, _ctx: &TransportContext, _timeline: &dyn Timeline, _events: &mut EventBuffer) {}

    fn release_notes(&mut self, _events: &mut EventBuffer) {}

    fn monitors_input(&self) -> bool {
        false
    }
}

/// Standalone processor node, e.g. a shared reverb fed by sends.
#[derive(Default)]
pub struct PluginNode;

impl NodeBehavior for PluginNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Plugin
    }

    fn collect_events(&mut self, _ctx: &TransportContext, _timeline: &dyn Timeline, _events: &mut EventBuffer) {}

    fn release_notes(&mut self, _events: &mut EventBuffer) {}

    fn monitors_input(&self) -> bool {
        false
    }
}

#[enum_delegate::implement(NodeBehavior, pub trait NodeBehavior {
    fn kind(&self) -> NodeKind;
    fn collect_events(&mut self, ctx: &TransportContext, timeline: &dyn Timeline, events: &mut EventBuffer);
    fn release_notes(&mut self, events: &mut EventBuffer);
    fn monitors_input(&self) -> bool;
})]
pub enum NodeVariant {
    Instrument(InstrumentNode),
    Audio(AudioTrackNode),
    Bus(BusNode),
    Plugin(PluginNode),
}

/// Gain, pan, mute and solo of a node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MixState {
    gain: f32,
    pan: f32,
    mute: bool,
    solo: bool,
    /// Per-side gain reached at the end of the last block
    current: [f32; 2],
}

impl Default for MixState {
    fn default() -> Self {
        Self {
            gain: 1.0,
            pan: 0.0,
            mute: false,
            solo: false,
            current: [1.0, 1.0],
        }
    }
}

impl MixState {
    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    pub fn is_muted(&self) -> bool {
        self.mute
    }

    pub fn is_soloed(&self) -> bool {
        self.solo
    }

    pub fn set_volume_db(&mut self, db: f32) {
        self.gain = db_to_gain(db);
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = if gain.is_finite() { gain.max(0.0) } else { 0.0 };
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan = if pan.is_finite() { pan.clamp(-1.0, 1.0) } else { 0.0 };
    }

    /// Left and right gain under a constant-power pan law scaled so the
    /// center position is unity.
    pub fn side_gains(&self) -> [f32; 2] {
        if self.pan == 0.0 {
            return [self.gain, self.gain];
        }
        let angle = (self.pan + 1.0) * FRAC_PI_4;
        [
            self.gain * angle.cos() * SQRT_2,
            self.gain * angle.sin() * SQRT_2,
        ]
    }

    /// Apply gain and pan, ramping from the previous block's values.
    /// Pan only applies to stereo buffers.
    pub fn apply(&mut self, buffer: &mut AudioBuffer) {
        let target = self.side_gains();
        let target = if buffer.channels() == 2 { target } else { [self.gain, self.gain] };
        let start = self.current;
        let frames = buffer.frames().max(1) as f32;

        for (ch, channel) in buffer.iter_channels_mut().enumerate() {
            let side = ch.min(1);
            let (from, to) = (start[side], target[side]);
            if from == to {
                channel.iter_mut().for_each(|s| *s *= to);
            } else {
                let step = (to - from) / frames;
                for (i, s) in channel.iter_mut().enumerate() {
                    *s *= from + step * (i + 1) as f32;
                }
            }
        }

        self.current = target;
    }

    /// Record a block rendered as silence, so the next one fades in.
    pub(crate) fn silence(&mut self) {
        self.current = [0.0, 0.0];
    }
}

pub fn db_to_gain(db: f32) -> f32 {
    if db > SILENCE_DB {
        10f32.powf(db / 20.0)
    } else {
        0.0
    }
}

/// Everything the audio thread keeps for one node.
///
/// Built on the control thread with all buffers at their final size, then
/// moved into the render graph by an `AddNode` command.
pub struct RenderNode {
    id: NodeId,
    pub(crate) variant: NodeVariant,
    pub(crate) chain: PluginChain,
    pub(crate) input: AudioBuffer,
    pub(crate) output: AudioBuffer,
    pub(crate) events: EventBuffer,
    pub(crate) mix: MixState,
    /// Alignment delay on the way into the master sum
    pub(crate) master_delay: Option<Box<DelayLine>>,
    automation: Vec<Box<AutomationLane>>,
    pub(crate) faulted: bool,
}

impl RenderNode {
    pub fn new(node: &Node, config: &EngineConfig) -> Self {
        let variant = match node.kind {
            NodeKind::InstrumentTrack => NodeVariant::Instrument(InstrumentNode::new(
                config.max_clips_per_node,
                config.max_active_notes,
            )),
            NodeKind::AudioTrack => NodeVariant::Audio(AudioTrackNode::default()),
            NodeKind::Bus => NodeVariant::Bus(BusNode),
            NodeKind::Plugin => NodeVariant::Plugin(PluginNode),
        };

        Self {
            id: node.id,
            variant,
            chain: PluginChain::with_capacity(config.max_plugins_per_node),
            input: AudioBuffer::new(node.input_channels().max(1) as usize, config.block_size),
            output: AudioBuffer::new(node.output_channels().max(1) as usize, config.block_size),
            events: EventBuffer::with_capacity(config.max_events_per_block),
            mix: MixState::default(),
            master_delay: None,
            automation: Vec::with_capacity(config.max_automation_lanes),
            faulted: false,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.variant.kind()
    }

    pub fn chain(&self) -> &PluginChain {
        &self.chain
    }

    pub fn mix(&self) -> &MixState {
        &self.mix
    }

    /// Output of the last rendered block, after gain and pan.
    pub fn output(&self) -> &AudioBuffer {
        &self.output
    }

    /// Note events seen by this node in the last rendered block.
    pub fn events(&self) -> &EventBuffer {
        &self.events
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    /// Note events lost on this node to full buffers.
    pub(crate) fn dropped_events(&self) -> u64 {
        self.events.dropped() + self.instrument().map_or(0, InstrumentNode::dropped_notes)
    }

    pub fn master_delay(&self) -> usize {
        self.master_delay.as_ref().map_or(0, |d| d.delay())
    }

    pub fn instrument(&self) -> Option<&InstrumentNode> {
        match &self.variant {
            NodeVariant::Instrument(inst) => Some(inst),
            _ => None,
        }
    }

    pub(crate) fn instrument_mut(&mut self) -> Option<&mut InstrumentNode> {
        match &mut self.variant {
            NodeVariant::Instrument(inst) => Some(inst),
            _ => None,
        }
    }

    pub fn automation(&self, target: AutomationTarget) -> Option<&AutomationLane> {
        self.automation.iter().find(|l| l.target() == target).map(|l| l.as_ref())
    }

    /// Install `lane`, replacing the one for the same target. Returns the
    /// replaced lane, or `lane` itself when the node has no room for it.
    pub(crate) fn set_automation(
        &mut self,
        lane: Box<AutomationLane>,
    ) -> Result<Option<Box<AutomationLane>>, Box<AutomationLane>> {
        match self.automation.iter().position(|l| l.target() == lane.target()) {
            Some(index) => Ok(Some(core::mem::replace(&mut self.automation[index], lane))),
            None if self.automation.len() < self.automation.capacity() => {
                self.automation.push(lane);
                Ok(None)
            }
            None => Err(lane),
        }
    }

    pub(crate) fn clear_automation(&mut self, target: AutomationTarget) -> Option<Box<AutomationLane>> {
        let index = self.automation.iter().position(|l| l.target() == target)?;
        Some(self.automation.swap_remove(index))
    }

    /// Drive every automated parameter to its value at `beat`. Automation
    /// overrides values set by hand.
    pub(crate) fn sample_automation(&mut self, beat: f64) {
        for lane in &self.automation {
            let Some(value) = lane.value_at(beat) else {
                continue;
            };
            match lane.target() {
                AutomationTarget::Volume => self.mix.set_volume_db(value),
                AutomationTarget::Gain => self.mix.set_gain(value),
                AutomationTarget::Pan => self.mix.set_pan(value),
                AutomationTarget::Plugin { plugin, index } => {
                    self.chain.set_parameter(plugin, index, value);
                }
            }
        }
    }

    /// Returns `true` when the solo state changed.
    pub(crate) fn set_parameter(&mut self, parameter: NodeParameter) -> bool {
        match parameter {
            NodeParameter::Volume(db) => self.mix.set_volume_db(db),
            NodeParameter::Gain(gain) => self.mix.set_gain(gain),
            NodeParameter::Pan(pan) => self.mix.set_pan(pan),
            NodeParameter::Mute(mute) => self.mix.mute = mute,
            NodeParameter::Solo(solo) => {
                let changed = self.mix.solo != solo;
                self.mix.solo = solo;
                return changed;
            }
            NodeParameter::InputMonitoring(enabled) => {
                if let NodeVariant::Audio(track) = &mut self.variant {
                    track.monitoring = enabled;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_conversion() {
        assert_eq!(db_to_gain(0.0), 1.0);
        assert!((db_to_gain(-6.0) - 0.501_187).abs() < 1e-5);
        assert_eq!(db_to_gain(-96.0), 0.0);
        assert_eq!(db_to_gain(-120.0), 0.0);
    }

    #[test]
    fn test_pan_law() {
        let mut mix = MixState::default();
        assert_eq!(mix.side_gains(), [1.0, 1.0]);

        mix.set_pan(-1.0);
        let [l, r] = mix.side_gains();
        assert!((l - SQRT_2).abs() < 1e-6 && r.abs() < 1e-6);

        mix.set_pan(0.5);
        let [l, r] = mix.side_gains();
        // constant power: l^2 + r^2 stays 2
        assert!((l * l + r * r - 2.0).abs() < 1e-5);
        assert!(r > l);

        mix.set_pan(7.0);
        assert_eq!(mix.pan(), 1.0);
    }

    #[test]
    fn test_gain_change_ramps() {
        let mut mix = MixState::default();
        mix.set_gain(0.0);

        let mut buffer = AudioBuffer::new(2, 4);
        buffer.iter_channels_mut().for_each(|ch| ch.fill(1.0));
        mix.apply(&mut buffer);
        assert_eq!(buffer.channel(0), &[0.75, 0.5, 0.25, 0.0]);

        buffer.iter_channels_mut().for_each(|ch| ch.fill(1.0));
        mix.apply(&mut buffer);
        assert!(buffer.is_silent());
    }

    #[test]
    fn test_instrument_clip_management() {
        let mut inst = InstrumentNode::new(2, 8);
        assert!(inst.add_clip(Box::new(MidiClip::new(ClipId(1), 0.0, 4.0))).is_ok());
        assert!(inst.add_clip(Box::new(MidiClip::new(ClipId(1), 4.0, 4.0))).is_err());
        assert!(inst.add_clip(Box::new(MidiClip::new(ClipId(2), 4.0, 4.0))).is_ok());
        assert!(inst.add_clip(Box::new(MidiClip::new(ClipId(3), 8.0, 4.0))).is_err());

        assert!(inst.replace_notes(ClipId(9), Vec::new()).is_err());
        assert!(inst.replace_notes(ClipId(2), Vec::new()).is_ok());
        assert!(inst.remove_clip(ClipId(1)).is_some());
        assert!(inst.clip(ClipId(1)).is_none());
    }

    #[test]
    fn test_automation_drives_mix() {
        use crate::automation::AutomationPoint;

        let config = EngineConfig::default();
        let mut node = RenderNode::new(&Node::bus(NodeId::new(1), 2), &config);
        let ramp = vec![AutomationPoint::new(0.0, 0.0), AutomationPoint::new(4.0, 1.0)];
        let lane = AutomationLane::new(AutomationTarget::Gain, ramp).unwrap();
        assert!(matches!(node.set_automation(Box::new(lane)), Ok(None)));

        node.set_parameter(NodeParameter::Gain(0.9));
        node.sample_automation(2.0);
        assert_eq!(node.mix().gain(), 0.5);

        let pan = AutomationLane::new(AutomationTarget::Pan, vec![AutomationPoint::new(0.0, -3.0)]).unwrap();
        node.set_automation(Box::new(pan)).ok().unwrap();
        node.sample_automation(0.0);
        assert_eq!(node.mix().pan(), -1.0);

        assert!(node.clear_automation(AutomationTarget::Gain).is_some());
        assert!(node.automation(AutomationTarget::Gain).is_none());
        node.set_parameter(NodeParameter::Gain(0.9));
        node.sample_automation(2.0);
        assert_eq!(node.mix().gain(), 0.9);
    }

    #[test]
    fn test_automation_lanes_are_bounded() {
        let mut config = EngineConfig::default();
        config.max_automation_lanes = 1;
        let mut node = RenderNode::new(&Node::bus(NodeId::new(1), 2), &config);
        let lane = |target| Box::new(AutomationLane::new(target, Vec::new()).unwrap());

        assert!(node.set_automation(lane(AutomationTarget::Gain)).is_ok());
        // same target replaces
        assert!(matches!(node.set_automation(lane(AutomationTarget::Gain)), Ok(Some(_))));
        assert!(node.set_automation(lane(AutomationTarget::Pan)).is_err());
    }

    #[test]
    fn test_render_node_shapes_follow_ports() {
        let config = EngineConfig::default().with_block_size(64);
        let node = RenderNode::new(&Node::bus(NodeId::new(1), 2), &config);
        assert_eq!(node.kind(), NodeKind::Bus);
        assert_eq!(node.output().channels(), 2);
        assert_eq!(node.output().frames(), 64);

        let mono = RenderNode::new(&Node::audio_track(NodeId::new(2), 1), &config);
        assert_eq!(mono.output().channels(), 1);
    }
}
