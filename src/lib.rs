//! # mischpult
//!
//! A real-time signal graph engine: tracks, buses and hosted plugins routed
//! through a DAG and rendered in fixed-size blocks from an audio callback.
//!
//! The engine is split in two halves created together by [`engine`]:
//!
//! - [`Controller`] lives on the control thread. It validates every edit
//!   against the [`Router`] (cycle rejection, port checks, latency
//!   compensation) and records commands for the audio thread.
//! - [`AudioProcessor`] lives on the audio thread. Once per block it drains
//!   the pending commands into its [`RenderGraph`] and renders. It never
//!   blocks, never takes a lock and does not allocate while rendering.
//!
//! ```
//! use mischpult::nodes::Sine;
//! use mischpult::{engine, EngineConfig, NodeKind};
//!
//! let (mut controller, mut processor) = engine(EngineConfig::default()).unwrap();
//!
//! let track = controller.create_node(NodeKind::AudioTrack, 2).unwrap();
//! let bus = controller.create_node(NodeKind::Bus, 2).unwrap();
//! controller.connect(track.audio_out(), bus.audio_in()).unwrap();
//! controller.add_plugin(track, Sine::new(440.0), None).unwrap();
//! controller.set_volume_db(bus, -6.0).unwrap();
//!
//! let master = processor.process();
//! assert!(master.peak() > 0.0);
//! ```
//!
//! ## Feature Flags
//!
//! - `cpal_sink` - play an engine through an output device
//!   ([`CpalDevice`], [`CpalOutput`])

extern crate alloc;

mod automation;
mod buffer;
mod channel;
mod command;
mod config;
mod controller;
#[cfg(feature = "cpal_sink")]
mod device;
mod engine;
mod error;
mod garbage;
mod midi;
mod monitor;
mod node;
pub mod nodes;
pub mod plugin;
mod processor;
pub mod render;
mod router;
mod timeline;
mod transport;

pub use automation::{AutomationLane, AutomationPoint, AutomationTarget, Curve};
pub use buffer::{AudioBuffer, DelayLine};
pub use channel::{command_channel, CommandReceiver, CommandSender};
pub use command::{Command, NodeParameter};
pub use config::EngineConfig;
pub use controller::{Controller, PluginInfo};
#[cfg(feature = "cpal_sink")]
pub use device::{CpalDevice, CpalOutput};
pub use engine::engine;
pub use error::{ConnectError, Error, PluginError, Result};
pub use garbage::{garbage_channel, Garbage, GarbageCollector, GarbageSender};
pub use midi::{EventBuffer, MidiClip, Note, NoteEvent, NoteEventKind, NoteScheduler};
pub use monitor::EngineMonitor;
pub use node::{
    ClipId, Connection, Direction, Node, NodeId, NodeKind, NoteId, PluginId, Port, PortId, PortRef, SignalType,
};
pub use plugin::{ParameterInfo, Plugin, PluginChain};
pub use processor::AudioProcessor;
pub use render::{RenderGraph, RenderNode, RenderStats};
pub use router::{Router, RouterStats};
pub use timeline::{Bbt, SignaturePoint, TempoMap, TempoPoint, TimeSignature, Timeline, MAX_BPM, MIN_BPM};
pub use transport::{Transport, TransportContext};
