//! Engine configuration

use alloc::format;

use crate::error::{Error, Result};
use crate::timeline::TimeSignature;

/// Sizing and defaults for an engine instance.
///
/// Every capacity here is allocated up front so the audio thread never grows
/// a collection while rendering.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Samples per rendered block
    pub block_size: usize,
    /// Channels of the master output
    pub output_channels: u16,
    /// Slots in the control -> audio command ring
    pub command_capacity: usize,
    /// Slots in the audio -> control disposal ring
    pub garbage_capacity: usize,
    pub max_nodes: usize,
    pub max_connections: usize,
    pub max_plugins_per_node: usize,
    pub max_clips_per_node: usize,
    /// Note events a single node can receive in one block
    pub max_events_per_block: usize,
    /// Simultaneously sounding notes per instrument track
    pub max_active_notes: usize,
    pub max_tempo_points: usize,
    /// Automated parameters per node
    pub max_automation_lanes: usize,
    /// Tempo at beat 0
    pub tempo: f64,
    pub time_signature: TimeSignature,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 512,
            output_channels: 2,
            command_capacity: 1024,
            garbage_capacity: 1024,
            max_nodes: 256,
            max_connections: 1024,
            max_plugins_per_node: 16,
            max_clips_per_node: 64,
            max_events_per_block: 512,
            max_active_notes: 256,
            max_tempo_points: 256,
            max_automation_lanes: 16,
            tempo: 120.0,
            time_signature: TimeSignature::new(4, 4),
        }
    }
}

impl EngineConfig {
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_output_channels(mut self, channels: u16) -> Self {
        self.output_channels = channels;
        self
    }

    pub fn with_command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity;
        self
    }

    pub fn with_garbage_capacity(mut self, capacity: usize) -> Self {
        self.garbage_capacity = capacity;
        self
    }

    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    pub fn with_tempo(mut self, bpm: f64) -> Self {
        self.tempo = bpm;
        self
    }

    pub fn with_time_signature(mut self, numerator: u8, denominator: u8) -> Self {
        self.time_signature = TimeSignature::new(numerator, denominator);
        self
    }

    /// Duration of one block in seconds.
    pub fn block_duration(&self) -> f64 {
        self.block_size as f64 / self.sample_rate as f64
    }

    /// Check the configuration for values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(8_000..=384_000).contains(&self.sample_rate) {
            return Err(Error::InvalidConfig(format!(
                "sample_rate must be between 8000 and 384000 Hz, got {}",
                self.sample_rate
            )));
        }

        if self.block_size == 0 || self.block_size > 8192 {
            return Err(Error::InvalidConfig(format!(
                "block_size must be between 1 and 8192, got {}",
                self.block_size
            )));
        }

        if self.output_channels == 0 || self.output_channels > 64 {
            return Err(Error::InvalidConfig(format!(
                "output_channels must be between 1 and 64, got {}",
                self.output_channels
            )));
        }

        if self.command_capacity < 16 {
            return Err(Error::InvalidConfig(format!(
                "command_capacity must be at least 16, got {}",
                self.command_capacity
            )));
        }

        if self.garbage_capacity == 0 {
            return Err(Error::InvalidConfig("garbage_capacity must be non-zero".into()));
        }

        let capacities = [
            ("max_nodes", self.max_nodes),
            ("max_connections", self.max_connections),
            ("max_plugins_per_node", self.max_plugins_per_node),
            ("max_clips_per_node", self.max_clips_per_node),
            ("max_events_per_block", self.max_events_per_block),
            ("max_active_notes", self.max_active_notes),
            ("max_tempo_points", self.max_tempo_points),
            ("max_automation_lanes", self.max_automation_lanes),
        ];
        if let Some((name, _)) = capacities.iter().find(|(_, value)| *value == 0) {
            return Err(Error::InvalidConfig(format!("{} must be non-zero", name)));
        }

        if !self.tempo.is_finite() || !(1.0..=999.0).contains(&self.tempo) {
            return Err(Error::InvalidTempo(self.tempo));
        }

        self.time_signature.validate()
    }
}
