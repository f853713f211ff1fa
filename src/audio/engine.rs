use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use tracing::debug;

use super::clock::AudioClock;
use super::effect::{Effect, build_effect};
use super::frame::StereoFrame;
use super::voice::Instrument;
use crate::audio_api::{AudioCommand, EffectKind, InstrumentSpec, db_to_gain};
use crate::error::CoreError;
use crate::pipeline::effects::EffectParams;
use crate::shared::TRACK_COUNT;

const MAX_BLOCK: usize = 4096; // bus buffers grow past this only if the device asks
const QUEUE_CAPACITY: usize = 1024;

// a timed command waiting for its frame; ties keep arrival order
struct Scheduled {
    frame: u64,
    seq: u64,
    cmd: AudioCommand,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        (self.frame, self.seq) == (other.frame, other.seq)
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.frame, self.seq).cmp(&(other.frame, other.seq))
    }
}

// one track: instrument -> gain/pan -> master, plus a post-fader send per route
struct Channel {
    instrument: Instrument,
    routes: Vec<EffectKind>,
    gain_l: f32,
    gain_r: f32,
}

impl Channel {
    fn new(spec: &InstrumentSpec) -> Self {
        let mut ch = Self {
            instrument: Instrument::new(&spec.kind, spec.envelope),
            routes: spec.routes.clone(),
            gain_l: 0.0,
            gain_r: 0.0,
        };
        ch.set_mix(spec.volume_db, spec.pan);
        ch
    }

    // equal power pan
    fn set_mix(&mut self, volume_db: f32, pan: f32) {
        let gain = db_to_gain(volume_db);
        let angle = (pan.clamp(-1.0, 1.0) + 1.0) * std::f32::consts::FRAC_PI_4;
        self.gain_l = gain * angle.cos();
        self.gain_r = gain * angle.sin();
    }
}

pub struct Engine {
    sample_rate: f32,
    clock: Arc<AudioClock>,
    channels: Vec<Option<Channel>>,
    effects: Vec<Box<dyn Effect>>, // indexed by EffectKind::index
    buses: Vec<Vec<StereoFrame>>,
    queue: BinaryHeap<Reverse<Scheduled>>,
    seq: u64,
    master_gain: f32,
}

impl Engine {
    pub fn new(clock: Arc<AudioClock>) -> Self {
        let sample_rate = clock.sample_rate() as f32;
        let params = EffectParams::default();
        Self {
            sample_rate,
            channels: (0..TRACK_COUNT).map(|_| None).collect(),
            effects: EffectKind::ALL
                .iter()
                .map(|&kind| build_effect(kind, sample_rate, params.get(kind)))
                .collect(),
            buses: vec![vec![StereoFrame::zero(); MAX_BLOCK]; EffectKind::COUNT],
            queue: BinaryHeap::with_capacity(QUEUE_CAPACITY),
            seq: 0,
            master_gain: 1.0,
            clock,
        }
    }

    // timed commands wait for their frame, everything else lands right away
    pub fn handle_cmd(&mut self, cmd: AudioCommand) {
        match cmd.scheduled_at() {
            Some(at) => {
                let frame = self.clock.frame_at(at);
                self.seq += 1;
                self.queue.push(Reverse(Scheduled {
                    frame,
                    seq: self.seq,
                    cmd,
                }));
            }
            None => self.apply(cmd),
        }
    }

    fn apply(&mut self, cmd: AudioCommand) {
        let result = match cmd {
            AudioCommand::CreateInstrument { track, spec } => match self.channels.get_mut(track) {
                Some(slot) => {
                    *slot = Some(Channel::new(&spec));
                    Ok(())
                }
                None => Err(CoreError::InvalidTrack(track)),
            },
            AudioCommand::Trigger {
                track, note, duration, ..
            } => {
                let release_after = (duration.max(0.0) * self.sample_rate as f64).round() as u64;
                self.channel(track).and_then(|ch| ch.instrument.trigger(note, release_after))
            }
            AudioCommand::NoteOn { track, note, .. } => self.channel(track).and_then(|ch| ch.instrument.note_on(note)),
            AudioCommand::NoteOff { track, .. } => self.channel(track).and_then(|ch| ch.instrument.note_off()),
            AudioCommand::SetEnvelope { track, envelope } => {
                self.channel(track).and_then(|ch| ch.instrument.set_envelope(envelope))
            }
            AudioCommand::SetVoiceTemplate { track, envelope } => {
                self.channel(track).and_then(|ch| ch.instrument.set_voice_template(envelope))
            }
            AudioCommand::SetEffectParam { kind, value } => {
                self.effects[kind.index()].set_param(value);
                Ok(())
            }
            AudioCommand::SetTrackMix { track, volume_db, pan } => self.channel(track).map(|ch| ch.set_mix(volume_db, pan)),
            AudioCommand::SetMasterVolume { db } => {
                self.master_gain = db_to_gain(db);
                Ok(())
            }
        };
        if let Err(e) = result {
            debug!("audio command dropped: {e}");
        }
    }

    fn channel(&mut self, track: usize) -> Result<&mut Channel, CoreError> {
        self.channels
            .get_mut(track)
            .and_then(Option::as_mut)
            .ok_or(CoreError::InvalidTrack(track))
    }

    // Renders one device buffer. The block is cut at every queued command's
    // frame so each one starts exactly where it was scheduled.
    pub fn render_block(&mut self, out: &mut [StereoFrame]) {
        let start = self.clock.frames();
        let mut done = 0;
        while done < out.len() {
            let now = start + done as u64;
            while self.queue.peek().is_some_and(|Reverse(s)| s.frame <= now) {
                if let Some(Reverse(s)) = self.queue.pop() {
                    self.apply(s.cmd);
                }
            }
            let end = match self.queue.peek() {
                Some(Reverse(s)) => done + ((s.frame - now) as usize).min(out.len() - done),
                None => out.len(),
            };
            self.render_span(&mut out[done..end]);
            done = end;
        }
        self.clock.advance(out.len() as u64);
    }

    fn render_span(&mut self, out: &mut [StereoFrame]) {
        let n = out.len();
        let dt = 1.0 / self.sample_rate;
        for bus in self.buses.iter_mut() {
            if bus.len() < n {
                bus.resize(n, StereoFrame::zero());
            }
            bus[..n].fill(StereoFrame::zero());
        }
        out.fill(StereoFrame::zero());

        for ch in self.channels.iter_mut().flatten() {
            for (i, f) in out.iter_mut().enumerate() {
                let frame = StereoFrame::panned(ch.instrument.next_sample(dt), ch.gain_l, ch.gain_r);
                *f += frame;
                for route in &ch.routes {
                    self.buses[route.index()][i] += frame;
                }
            }
        }

        // every effect runs even with an empty bus so tails keep ringing
        for (effect, bus) in self.effects.iter_mut().zip(self.buses.iter_mut()) {
            effect.process(&mut bus[..n]);
            for (f, b) in out.iter_mut().zip(bus.iter()) {
                *f += *b;
            }
        }

        for f in out.iter_mut() {
            *f = *f * self.master_gain;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::voices::VoiceRegistry;
    use crate::shared::Note;

    const SR: u32 = 1_000;

    fn engine() -> (Engine, Arc<AudioClock>) {
        let clock = Arc::new(AudioClock::new(SR));
        let mut engine = Engine::new(clock.clone());
        let mut startup = Vec::new();
        VoiceRegistry::build().startup_commands(&mut startup);
        for cmd in startup {
            engine.handle_cmd(cmd);
        }
        (engine, clock)
    }

    fn render(engine: &mut Engine, frames: usize, block: usize) -> Vec<StereoFrame> {
        let mut out = vec![StereoFrame::zero(); frames];
        for chunk in out.chunks_mut(block) {
            engine.render_block(chunk);
        }
        out
    }

    fn first_sound(buf: &[StereoFrame]) -> Option<usize> {
        buf.iter().position(|f| f.left != 0.0 || f.right != 0.0)
    }

    #[test]
    fn startup_builds_every_channel() {
        let (engine, _) = engine();
        assert!(engine.channels.iter().all(Option::is_some));
    }

    #[test]
    fn trigger_starts_on_its_exact_frame() {
        let (mut engine, clock) = engine();
        engine.handle_cmd(AudioCommand::Trigger {
            track: 1,
            note: Note::new(0, 3),
            at: 0.5,
            duration: 0.25,
        });
        // 64 doesn't divide 500, so the trigger lands mid-block
        let out = render(&mut engine, 1000, 64);
        assert_eq!(first_sound(&out), Some(500));
        assert_eq!(clock.frames(), 1000);
    }

    #[test]
    fn late_commands_fire_at_the_next_block() {
        let (mut engine, _) = engine();
        render(&mut engine, 300, 100);
        engine.handle_cmd(AudioCommand::Trigger {
            track: 1,
            note: Note::new(0, 3),
            at: 0.1,
            duration: 0.25,
        });
        let out = render(&mut engine, 100, 100);
        assert_eq!(first_sound(&out), Some(0));
    }

    #[test]
    fn note_off_waits_for_its_frame() {
        let (mut engine, _) = engine();
        let d4 = Note::new(2, 4);
        engine.handle_cmd(AudioCommand::SetEnvelope {
            track: 6,
            envelope: crate::audio_api::Envelope::new(0.01, 0.01, 0.5, 0.01),
        });
        engine.handle_cmd(AudioCommand::NoteOn { track: 6, note: d4, at: 0.1 });
        engine.handle_cmd(AudioCommand::NoteOff { track: 6, at: 0.4 });

        let silent = |e: &Engine| e.channels[6].as_ref().is_none_or(|ch| ch.instrument.is_silent());
        render(&mut engine, 50, 50);
        assert!(silent(&engine));
        render(&mut engine, 300, 50);
        assert!(!silent(&engine));
        render(&mut engine, 100, 50);
        assert!(silent(&engine));
    }

    #[test]
    fn mismatched_and_unknown_commands_are_dropped() {
        let (mut engine, _) = engine();
        engine.handle_cmd(AudioCommand::NoteOn {
            track: 0,
            note: Note::new(0, 2),
            at: 0.0,
        });
        engine.handle_cmd(AudioCommand::SetTrackMix {
            track: 99,
            volume_db: 0.0,
            pan: 0.0,
        });
        let out = render(&mut engine, 200, 64);
        assert_eq!(first_sound(&out), None);
    }

    #[test]
    fn silent_master_mutes_everything() {
        let (mut engine, _) = engine();
        engine.handle_cmd(AudioCommand::SetMasterVolume { db: -1000.0 });
        engine.handle_cmd(AudioCommand::Trigger {
            track: 0,
            note: Note::new(0, 2),
            at: 0.0,
            duration: 1.0,
        });
        let out = render(&mut engine, 500, 128);
        assert!(out.iter().all(|f| f.left.abs() < 1e-20 && f.right.abs() < 1e-20));
    }
}
