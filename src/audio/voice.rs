use std::f32::consts::TAU;

use crate::audio_api::{Envelope, FilterEnvelope, InstrumentKind, VoiceModel, Waveform};
use crate::error::CoreError;
use crate::shared::Note;

pub const POLY_VOICES: usize = 8; // per pool, allocated up front
const VOICE_GAIN: f32 = 0.25;
const SUSTAIN_SMOOTHING: f32 = 0.001; // per-sample glide toward a moved sustain level
const VIBRATO_DEPTH: f32 = 0.05; // vibrato_amount 1.0 swings the pitch +-5%

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

// Linear ADSR. Times are read every sample, so a knob turned mid-note bends
// the stage that is currently running instead of waiting for the next note.
#[derive(Clone, Copy, Debug)]
pub struct Adsr {
    stage: Stage,
    level: f32,
    attack: f32,
    decay: f32,
    sustain: f32,
    release: f32,
}

impl Adsr {
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        let mut adsr = Self {
            stage: Stage::Idle,
            level: 0.0,
            attack: 0.0,
            decay: 0.0,
            sustain: 0.0,
            release: 0.0,
        };
        adsr.set_times(attack, decay, sustain, release);
        adsr
    }

    fn from_envelope(env: Envelope) -> Self {
        Self::new(env.attack, env.decay, env.sustain, env.release)
    }

    pub fn set_times(&mut self, attack: f32, decay: f32, sustain: f32, release: f32) {
        self.attack = attack.max(1e-4);
        self.decay = decay.max(1e-4);
        self.sustain = sustain.clamp(0.0, 1.0);
        self.release = release.max(1e-4);
    }

    fn set_envelope(&mut self, env: Envelope) {
        self.set_times(env.attack, env.decay, env.sustain, env.release);
    }

    #[cfg(test)]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[cfg(test)]
    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_idle(&self) -> bool {
        self.stage == Stage::Idle
    }

    // restarts from wherever the level is, no click
    pub fn gate_on(&mut self) {
        self.stage = Stage::Attack;
    }

    pub fn gate_off(&mut self) {
        if self.stage != Stage::Idle {
            self.stage = Stage::Release;
        }
    }

    pub fn next(&mut self, dt: f32) -> f32 {
        match self.stage {
            Stage::Idle => {}
            Stage::Attack => {
                self.level += dt / self.attack;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = Stage::Decay;
                }
            }
            Stage::Decay => {
                let next = self.level - dt * (1.0 - self.sustain) / self.decay;
                if next <= self.sustain {
                    // a sustain raised mid-decay is glided up to, not jumped to
                    self.level = self.level.min(self.sustain);
                    self.stage = Stage::Sustain;
                } else {
                    self.level = next;
                }
            }
            Stage::Sustain => {
                self.level += (self.sustain - self.level) * SUSTAIN_SMOOTHING;
            }
            Stage::Release => {
                self.level -= dt / self.release;
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                }
            }
        }
        self.level
    }
}

// what the oscillators of one voice do, flattened out of `InstrumentKind`
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Timbre {
    Basic(Waveform),
    Filtered { waveform: Waveform, filter: FilterEnvelope },
    Am { harmonicity: f32 },
    Fm { harmonicity: f32, modulation_index: f32 },
    Duo { harmonicity: f32, vibrato_amount: f32, vibrato_rate: f32, voices: [Waveform; 2] },
}

impl From<VoiceModel> for Timbre {
    fn from(model: VoiceModel) -> Self {
        match model {
            VoiceModel::Basic(waveform) => Timbre::Basic(waveform),
            VoiceModel::Filtered { waveform, filter } => Timbre::Filtered { waveform, filter },
            VoiceModel::Am { harmonicity } => Timbre::Am { harmonicity },
            VoiceModel::Fm {
                harmonicity,
                modulation_index,
            } => Timbre::Fm {
                harmonicity,
                modulation_index,
            },
        }
    }
}

// phase is in cycles, [0, 1)
#[inline]
fn osc(waveform: Waveform, phase: f32) -> f32 {
    match waveform {
        Waveform::Sine => (TAU * phase).sin(),
        Waveform::Triangle => 4.0 * (phase - 0.5).abs() - 1.0,
        Waveform::Sawtooth => 2.0 * phase - 1.0,
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
    }
}

#[inline]
fn advance(phase: &mut f32, freq: f32, dt: f32) {
    *phase = (*phase + freq * dt).fract();
}

#[derive(Clone, Debug)]
pub struct Voice {
    freq: f32,
    phase: f32,
    mod_phase: f32, // modulator for am/fm, second oscillator for duo
    vib_phase: f32,
    amp: Adsr,
    filter: Adsr,
    lp: f32,
    release_in: Option<u64>, // frames until a pooled voice lets go by itself
}

impl Voice {
    pub fn new(timbre: &Timbre, envelope: Envelope) -> Self {
        let filter = match timbre {
            Timbre::Filtered { filter, .. } => Adsr::new(filter.attack, filter.decay, filter.sustain, filter.release),
            _ => Adsr::new(0.0, 0.0, 1.0, 0.0),
        };
        Self {
            freq: 0.0,
            phase: 0.0,
            mod_phase: 0.0,
            vib_phase: 0.0,
            amp: Adsr::from_envelope(envelope),
            filter,
            lp: 0.0,
            release_in: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.amp.is_idle()
    }

    fn start(&mut self, freq: f32) {
        self.freq = freq;
        self.amp.gate_on();
        self.filter.gate_on();
        self.release_in = None;
    }

    fn release(&mut self) {
        self.amp.gate_off();
        self.filter.gate_off();
        self.release_in = None;
    }

    fn render(&mut self, timbre: &Timbre, dt: f32) -> f32 {
        if self.amp.is_idle() {
            return 0.0;
        }
        match self.release_in {
            Some(0) => self.release(),
            Some(n) => self.release_in = Some(n - 1),
            None => {}
        }

        let level = self.amp.next(dt);
        let sweep = self.filter.next(dt);
        let raw = match *timbre {
            Timbre::Basic(waveform) => {
                let s = osc(waveform, self.phase);
                advance(&mut self.phase, self.freq, dt);
                s
            }
            Timbre::Filtered { waveform, filter } => {
                let s = osc(waveform, self.phase);
                advance(&mut self.phase, self.freq, dt);
                let cutoff = (filter.base_frequency * 2.0_f32.powf(filter.octaves * sweep)).min(0.45 / dt);
                self.lp += (1.0 - (-TAU * cutoff * dt).exp()) * (s - self.lp);
                self.lp
            }
            Timbre::Am { harmonicity } => {
                let carrier = (TAU * self.phase).sin();
                let modulator = 0.5 + 0.5 * (TAU * self.mod_phase).sin();
                advance(&mut self.phase, self.freq, dt);
                advance(&mut self.mod_phase, self.freq * harmonicity, dt);
                carrier * modulator
            }
            Timbre::Fm {
                harmonicity,
                modulation_index,
            } => {
                let modulator = (TAU * self.mod_phase).sin() * modulation_index;
                let s = (TAU * self.phase + modulator).sin();
                advance(&mut self.phase, self.freq, dt);
                advance(&mut self.mod_phase, self.freq * harmonicity, dt);
                s
            }
            Timbre::Duo {
                harmonicity,
                vibrato_amount,
                vibrato_rate,
                voices,
            } => {
                let vibrato = 1.0 + (TAU * self.vib_phase).sin() * vibrato_amount * VIBRATO_DEPTH;
                let s = 0.5 * (osc(voices[0], self.phase) + osc(voices[1], self.mod_phase));
                advance(&mut self.vib_phase, vibrato_rate, dt);
                advance(&mut self.phase, self.freq * vibrato, dt);
                advance(&mut self.mod_phase, self.freq * harmonicity * vibrato, dt);
                s
            }
        };
        raw * level * VOICE_GAIN
    }
}

// A track's sound source. Pools hand out voices from a template and release
// each one on its own timer; single-voice instruments hold one voice that
// note-on/note-off drive directly.
#[derive(Clone, Debug)]
pub enum Instrument {
    Poly { timbre: Timbre, template: Envelope, voices: Vec<Voice> },
    Mono { timbre: Timbre, voice: Voice },
}

impl Instrument {
    pub fn new(kind: &InstrumentKind, envelope: Envelope) -> Self {
        match *kind {
            InstrumentKind::Poly(model) => {
                let timbre = Timbre::from(model);
                Instrument::Poly {
                    timbre,
                    template: envelope,
                    voices: vec![Voice::new(&timbre, envelope); POLY_VOICES],
                }
            }
            InstrumentKind::Fm {
                harmonicity,
                modulation_index,
            } => Self::mono(
                Timbre::Fm {
                    harmonicity,
                    modulation_index,
                },
                envelope,
            ),
            InstrumentKind::Duo {
                harmonicity,
                vibrato_amount,
                vibrato_rate,
                voices,
            } => Self::mono(
                Timbre::Duo {
                    harmonicity,
                    vibrato_amount,
                    vibrato_rate,
                    voices,
                },
                envelope,
            ),
            InstrumentKind::Mono { waveform, filter } => Self::mono(Timbre::Filtered { waveform, filter }, envelope),
        }
    }

    fn mono(timbre: Timbre, envelope: Envelope) -> Self {
        Instrument::Mono {
            voice: Voice::new(&timbre, envelope),
            timbre,
        }
    }

    pub fn trigger(&mut self, note: Note, release_after: u64) -> Result<(), CoreError> {
        match self {
            Instrument::Poly { voices, .. } => {
                // what slot do we write to? steal the first one if all are busy
                let slot = voices.iter().position(|v| v.is_idle()).unwrap_or(0);
                let voice = &mut voices[slot];
                voice.start(note.frequency());
                voice.release_in = Some(release_after);
                Ok(())
            }
            Instrument::Mono { .. } => Err(CoreError::UnsupportedOperation("trigger on a single-voice instrument")),
        }
    }

    pub fn note_on(&mut self, note: Note) -> Result<(), CoreError> {
        match self {
            Instrument::Mono { voice, .. } => {
                voice.start(note.frequency());
                Ok(())
            }
            Instrument::Poly { .. } => Err(CoreError::UnsupportedOperation("note-on on a voice pool")),
        }
    }

    pub fn note_off(&mut self) -> Result<(), CoreError> {
        match self {
            Instrument::Mono { voice, .. } => {
                voice.release();
                Ok(())
            }
            Instrument::Poly { .. } => Err(CoreError::UnsupportedOperation("note-off on a voice pool")),
        }
    }

    pub fn set_envelope(&mut self, envelope: Envelope) -> Result<(), CoreError> {
        match self {
            Instrument::Mono { voice, .. } => {
                voice.amp.set_envelope(envelope);
                Ok(())
            }
            Instrument::Poly { .. } => Err(CoreError::UnsupportedOperation("direct envelope on a voice pool")),
        }
    }

    // new template, and the voices already out converge on it too
    pub fn set_voice_template(&mut self, envelope: Envelope) -> Result<(), CoreError> {
        match self {
            Instrument::Poly { template, voices, .. } => {
                *template = envelope;
                for v in voices.iter_mut() {
                    v.amp.set_envelope(envelope);
                }
                Ok(())
            }
            Instrument::Mono { .. } => Err(CoreError::UnsupportedOperation("voice template on a single-voice instrument")),
        }
    }

    pub fn is_silent(&self) -> bool {
        match self {
            Instrument::Poly { voices, .. } => voices.iter().all(Voice::is_idle),
            Instrument::Mono { voice, .. } => voice.is_idle(),
        }
    }

    pub fn next_sample(&mut self, dt: f32) -> f32 {
        match self {
            Instrument::Poly { timbre, voices, .. } => voices.iter_mut().map(|v| v.render(timbre, dt)).sum(),
            Instrument::Mono { timbre, voice } => voice.render(timbre, dt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::voices::PROFILES;

    const SR: f32 = 1_000.0;
    const DT: f32 = 1.0 / SR;

    fn note(s: &str) -> Note {
        s.parse().unwrap()
    }

    fn run(inst: &mut Instrument, frames: usize) -> Vec<f32> {
        (0..frames).map(|_| inst.next_sample(DT)).collect()
    }

    #[test]
    fn adsr_walks_through_its_stages() {
        let mut env = Adsr::new(0.01, 0.01, 0.5, 0.01);
        env.gate_on();
        for _ in 0..12 {
            env.next(DT);
        }
        assert_eq!(env.stage(), Stage::Decay);
        for _ in 0..12 {
            env.next(DT);
        }
        assert_eq!(env.stage(), Stage::Sustain);
        assert!((env.level() - 0.5).abs() < 0.01);
        env.gate_off();
        for _ in 0..12 {
            env.next(DT);
        }
        assert!(env.is_idle());
        assert_eq!(env.level(), 0.0);
    }

    #[test]
    fn moved_sustain_is_glided_to() {
        let mut env = Adsr::new(0.01, 0.01, 1.0, 0.01);
        env.gate_on();
        for _ in 0..30 {
            env.next(DT);
        }
        assert_eq!(env.stage(), Stage::Sustain);
        env.set_times(0.01, 0.01, 0.2, 0.01);
        let first = env.next(DT);
        assert!(first > 0.99); // no jump
        for _ in 0..10_000 {
            env.next(DT);
        }
        assert!((env.level() - 0.2).abs() < 0.01);
    }

    #[test]
    fn every_profile_builds_and_sounds() {
        for profile in PROFILES.iter() {
            let mut inst = Instrument::new(&profile.kind, Envelope::new(0.01, 0.1, 0.5, 0.05));
            let combined = profile.kind.capabilities().combined_trigger_release;
            if combined {
                inst.trigger(profile.default_note, 100).unwrap();
            } else {
                inst.note_on(profile.default_note).unwrap();
            }
            let out = run(&mut inst, 200);
            assert!(out.iter().all(|s| s.is_finite()), "{}", profile.name);
            assert!(out.iter().any(|s| s.abs() > 1e-4), "{} stayed silent", profile.name);
        }
    }

    #[test]
    fn pooled_voice_releases_on_its_own() {
        let mut inst = Instrument::new(
            &InstrumentKind::Poly(VoiceModel::Basic(Waveform::Sine)),
            Envelope::new(0.01, 0.01, 1.0, 0.01),
        );
        inst.trigger(note("A4"), 50).unwrap();
        run(&mut inst, 40);
        assert!(!inst.is_silent());
        run(&mut inst, 40);
        assert!(inst.is_silent());
    }

    #[test]
    fn full_pool_steals_the_first_voice() {
        let mut inst = Instrument::new(
            &InstrumentKind::Poly(VoiceModel::Basic(Waveform::Sine)),
            Envelope::new(1.0, 1.0, 1.0, 1.0),
        );
        for _ in 0..POLY_VOICES + 3 {
            inst.trigger(note("C3"), 10_000).unwrap();
        }
        let Instrument::Poly { voices, .. } = &inst else {
            panic!("expected a pool");
        };
        assert_eq!(voices.len(), POLY_VOICES);
        assert!(voices.iter().all(|v| !v.is_idle()));
    }

    #[test]
    fn mono_holds_until_note_off() {
        let mut inst = Instrument::new(&PROFILES[6].kind, Envelope::new(0.01, 0.01, 0.5, 0.02));
        inst.note_on(note("D4")).unwrap();
        run(&mut inst, 500);
        assert!(!inst.is_silent());
        inst.note_off().unwrap();
        run(&mut inst, 30);
        assert!(inst.is_silent());
    }

    #[test]
    fn mismatched_commands_are_refused() {
        let mut pool = Instrument::new(&PROFILES[0].kind, PROFILES[0].envelope);
        let mut mono = Instrument::new(&PROFILES[2].kind, PROFILES[2].envelope);
        assert!(pool.note_on(note("C2")).is_err());
        assert!(pool.note_off().is_err());
        assert!(pool.set_envelope(PROFILES[0].envelope).is_err());
        assert!(mono.trigger(note("C2"), 1).is_err());
        assert!(mono.set_voice_template(PROFILES[2].envelope).is_err());
        assert!(pool.set_voice_template(PROFILES[0].envelope).is_ok());
        assert!(mono.set_envelope(PROFILES[2].envelope).is_ok());
    }

    #[test]
    fn template_change_reaches_sounding_voices() {
        let mut inst = Instrument::new(&PROFILES[0].kind, Envelope::new(0.01, 0.01, 1.0, 30.0));
        inst.trigger(note("C2"), 20).unwrap();
        run(&mut inst, 40);
        assert!(!inst.is_silent()); // 30s release still going
        inst.set_voice_template(Envelope::new(0.01, 0.01, 1.0, 0.01)).unwrap();
        run(&mut inst, 20);
        assert!(inst.is_silent());
    }
}
