use std::sync::Arc;

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::audio_api::AudioCommand;

mod clock;
mod effect;
mod engine;
mod frame;
mod voice;

pub use clock::AudioClock;
pub use frame::StereoFrame;

use engine::Engine;

const COMMAND_CAPACITY: usize = 1024;

pub struct AudioHandle {
    tx: Sender<AudioCommand>,
    clock: Arc<AudioClock>,
    _output_stream: cpal::Stream,
}

impl AudioHandle {
    pub fn send(&self, cmd: AudioCommand) {
        if self.tx.try_send(cmd).is_err() {
            debug!("audio command queue full, dropping");
        }
    }

    // seconds on the audio timeline
    pub fn now(&self) -> f64 {
        self.clock.now()
    }
}

pub fn start_audio() -> anyhow::Result<AudioHandle> {
    let (tx, rx) = crossbeam_channel::bounded::<AudioCommand>(COMMAND_CAPACITY);

    let host = cpal::default_host();
    let device = host.default_output_device().context("no default output device")?;
    let config = device.default_output_config().context("no default output config")?;

    let sample_rate = config.sample_rate();
    let channels = config.channels() as usize;

    match config.sample_format() {
        cpal::SampleFormat::F32 => {
            let clock = Arc::new(AudioClock::new(sample_rate));
            let output_stream = build_output_stream_f32(&device, &config.into(), rx, clock.clone(), channels)?;
            output_stream.play().context("failed to play output stream")?;
            info!(sample_rate, channels, "audio output started");

            Ok(AudioHandle {
                tx,
                clock,
                _output_stream: output_stream,
            })
        }
        _ => anyhow::bail!("unsupported sample format (only f32 supported for now)"),
    }
}

// ── Output stream ─────────────────────────────────────────────────

fn build_output_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    rx: Receiver<AudioCommand>,
    clock: Arc<AudioClock>,
    channels: usize,
) -> anyhow::Result<cpal::Stream> {
    let mut engine = Engine::new(clock);
    let mut scratch: Vec<StereoFrame> = Vec::with_capacity(4096);

    let err_fn = |err| warn!("audio output stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _info| {
            while let Ok(cmd) = rx.try_recv() {
                engine.handle_cmd(cmd);
            }

            // render stereo, then spread it over however many channels the device has
            let n_frames = data.len() / channels.max(1);
            scratch.resize(n_frames, StereoFrame::zero());
            engine.render_block(&mut scratch);
            for (out, f) in data.chunks_exact_mut(channels.max(1)).zip(scratch.iter()) {
                match out {
                    [mono] => *mono = 0.5 * (f.left + f.right),
                    [left, right, rest @ ..] => {
                        *left = f.left;
                        *right = f.right;
                        rest.fill(0.0);
                    }
                    [] => {}
                }
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

// The audio device, if we have one. A failed start is reported once and then
// retried the next time the user does something; until then commands go nowhere.
#[derive(Default)]
pub struct AudioLink {
    handle: Option<AudioHandle>,
    reported: bool,
}

impl AudioLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_online(&self) -> bool {
        self.handle.is_some()
    }

    // `startup` is only called when a fresh device needs the full state
    pub fn ensure_started(&mut self, startup: impl FnOnce() -> Vec<AudioCommand>) {
        if self.handle.is_some() {
            return;
        }
        match start_audio() {
            Ok(handle) => {
                for cmd in startup() {
                    handle.send(cmd);
                }
                self.handle = Some(handle);
                self.reported = false;
            }
            Err(e) => {
                if !self.reported {
                    warn!("audio unavailable, running silent: {e:#}");
                    self.reported = true;
                }
            }
        }
    }

    pub fn send(&self, cmd: AudioCommand) {
        if let Some(handle) = &self.handle {
            handle.send(cmd);
        }
    }

    pub fn now(&self) -> Option<f64> {
        self.handle.as_ref().map(AudioHandle::now)
    }
}
