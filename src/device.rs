//! Playing an engine through a CPAL output device.
//!
//! ```no_run
//! use mischpult::{engine, CpalDevice, CpalOutput};
//!
//! let device = CpalDevice::default_output().unwrap();
//! let (mut controller, processor) = engine(device.engine_config()).unwrap();
//! let _output = CpalOutput::start(&device, processor).unwrap();
//! controller.play();
//! ```

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfig};
use tracing::{error, info};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::processor::AudioProcessor;

/// Scratch size for integer sample formats; larger callbacks grow it once.
const SCRATCH_SAMPLES: usize = 16_384;

/// An audio output device.
pub struct CpalDevice {
    device: cpal::Device,
    config: SupportedStreamConfig,
    name: String,
}

impl CpalDevice {
    /// The system's default output device, if there is one.
    pub fn default_output() -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or(Error::NoOutputDevice)?;
        Self::from_device(device)
    }

    fn from_device(device: cpal::Device) -> Result<Self> {
        let config = device.default_output_config()?;
        let name = device.name().unwrap_or_else(|_| "Unknown".into());
        Ok(Self { device, config, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels()
    }

    /// Engine configuration matching this device's rate and channel count.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_sample_rate(self.sample_rate())
            .with_output_channels(self.channels())
    }
}

/// A running output stream. Dropping it stops playback.
pub struct CpalOutput {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CpalOutput {
    /// Move `processor` into a stream on `device` and start playing.
    ///
    /// The stream lives on its own thread; this returns once it has started
    /// or failed to.
    pub fn start(device: &CpalDevice, processor: AudioProcessor) -> Result<Self> {
        let format = device.config.sample_format();
        let stream_config = device.config.config();
        let cpal_device = device.device.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        info!(device = %device.name, rate = stream_config.sample_rate.0, channels = stream_config.channels, "starting output");

        let thread = std::thread::spawn(move || {
            let stream = match build_stream(&cpal_device, format, &stream_config, processor) {
                Ok(stream) => stream,
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            if let Err(err) = stream.play() {
                let _ = ready_tx.send(Err(err.into()));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // the stream lives as long as this thread
            while !thread_stop.load(Ordering::Acquire) {
                std::thread::park();
            }
        });

        ready_rx.recv().map_err(|_| Error::StreamThreadGone)??;
        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            let _ = thread.join();
        }
    }
}

fn build_stream(
    device: &cpal::Device,
    format: SampleFormat,
    config: &cpal::StreamConfig,
    mut processor: AudioProcessor,
) -> Result<cpal::Stream> {
    let channels = config.channels as usize;
    let on_error = |err: cpal::StreamError| error!(%err, "output stream error");

    let stream = match format {
        SampleFormat::F32 => device.build_output_stream(
            config,
            move |data: &mut [f32], _| processor.process_interleaved(data, channels),
            on_error,
            None,
        )?,
        SampleFormat::I16 => {
            let mut scratch = vec![0.0f32; SCRATCH_SAMPLES];
            device.build_output_stream(
                config,
                move |data: &mut [i16], _| {
                    let buf = scratch_for(&mut scratch, data.len());
                    processor.process_interleaved(buf, channels);
                    for (out, s) in data.iter_mut().zip(buf.iter()) {
                        *out = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    }
                },
                on_error,
                None,
            )?
        }
        SampleFormat::U16 => {
            let mut scratch = vec![0.0f32; SCRATCH_SAMPLES];
            device.build_output_stream(
                config,
                move |data: &mut [u16], _| {
                    let buf = scratch_for(&mut scratch, data.len());
                    processor.process_interleaved(buf, channels);
                    for (out, s) in data.iter_mut().zip(buf.iter()) {
                        *out = ((s.clamp(-1.0, 1.0) + 1.0) * 0.5 * u16::MAX as f32) as u16;
                    }
                },
                on_error,
                None,
            )?
        }
        other => return Err(Error::UnsupportedSampleFormat(format!("{:?}", other))),
    };
    Ok(stream)
}

fn scratch_for(scratch: &mut Vec<f32>, len: usize) -> &mut [f32] {
    if scratch.len() < len {
        scratch.resize(len, 0.0);
    }
    &mut scratch[..len]
}
