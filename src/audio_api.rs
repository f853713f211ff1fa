// The contract between the sequencer core and whatever makes the sound.
// The core never touches DSP; it describes instruments once at startup and then
// sends timestamped commands. Times are seconds on the audio clock.

pub use crate::pipeline::effects::EffectKind;
use crate::shared::Note;

pub const MIN_ENVELOPE_SECONDS: f32 = 0.01;
pub const MAX_ENVELOPE_SECONDS: f32 = 30.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EnvelopeStage {
    Attack,
    Decay,
    Sustain,
    Release,
}

impl EnvelopeStage {
    pub const ALL: [EnvelopeStage; 4] = [
        EnvelopeStage::Attack,
        EnvelopeStage::Decay,
        EnvelopeStage::Sustain,
        EnvelopeStage::Release,
    ];

    pub fn label(self) -> &'static str {
        match self {
            EnvelopeStage::Attack => "ATK",
            EnvelopeStage::Decay => "DEC",
            EnvelopeStage::Sustain => "SUS",
            EnvelopeStage::Release => "REL",
        }
    }

    // (min, max) a stage may hold
    pub fn range(self) -> (f32, f32) {
        match self {
            EnvelopeStage::Sustain => (0.0, 1.0),
            _ => (MIN_ENVELOPE_SECONDS, MAX_ENVELOPE_SECONDS),
        }
    }
}

// attack/decay/release in seconds, sustain as a level
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Envelope {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Envelope {
    pub const fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack,
            decay,
            sustain,
            release,
        }
    }

    pub fn get(&self, stage: EnvelopeStage) -> f32 {
        match stage {
            EnvelopeStage::Attack => self.attack,
            EnvelopeStage::Decay => self.decay,
            EnvelopeStage::Sustain => self.sustain,
            EnvelopeStage::Release => self.release,
        }
    }

    pub fn with(mut self, stage: EnvelopeStage, value: f32) -> Self {
        match stage {
            EnvelopeStage::Attack => self.attack = value,
            EnvelopeStage::Decay => self.decay = value,
            EnvelopeStage::Sustain => self.sustain = value,
            EnvelopeStage::Release => self.release = value,
        }
        self
    }

    // Pulls every field back inside its range. A NaN field falls back to the
    // bottom of the range so the invariant holds no matter what came in.
    pub fn clamped(self) -> Self {
        let fix = |stage: EnvelopeStage, v: f32| {
            let (min, max) = stage.range();
            if v.is_nan() { min } else { v.clamp(min, max) }
        };
        Self {
            attack: fix(EnvelopeStage::Attack, self.attack),
            decay: fix(EnvelopeStage::Decay, self.decay),
            sustain: fix(EnvelopeStage::Sustain, self.sustain),
            release: fix(EnvelopeStage::Release, self.release),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Triangle,
    Sawtooth,
    Square,
}

// sweeps a lowpass from base_frequency up `octaves` octaves and back
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FilterEnvelope {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
    pub base_frequency: f32,
    pub octaves: f32,
}

// what a single voice inside a polyphonic pool sounds like
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VoiceModel {
    Basic(Waveform),
    Filtered { waveform: Waveform, filter: FilterEnvelope },
    Am { harmonicity: f32 },
    Fm { harmonicity: f32, modulation_index: f32 },
}

// One tag per timbre profile. Poly pools spawn voices from a template; the
// rest hold a single sustained voice.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InstrumentKind {
    Poly(VoiceModel),
    Fm {
        harmonicity: f32,
        modulation_index: f32,
    },
    Duo {
        harmonicity: f32,
        vibrato_amount: f32,
        vibrato_rate: f32,
        voices: [Waveform; 2],
    },
    Mono {
        waveform: Waveform,
        filter: FilterEnvelope,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub direct_envelope: bool,          // one shared envelope, written in place
    pub combined_trigger_release: bool, // plays and releases from one call
}

impl InstrumentKind {
    pub fn capabilities(&self) -> Capabilities {
        match self {
            InstrumentKind::Poly(_) => Capabilities {
                direct_envelope: false,
                combined_trigger_release: true,
            },
            InstrumentKind::Fm { .. } | InstrumentKind::Duo { .. } | InstrumentKind::Mono { .. } => {
                Capabilities {
                    direct_envelope: true,
                    combined_trigger_release: false,
                }
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            InstrumentKind::Poly(VoiceModel::Basic(_)) => "poly",
            InstrumentKind::Poly(VoiceModel::Filtered { .. }) => "poly/filter",
            InstrumentKind::Poly(VoiceModel::Am { .. }) => "poly/am",
            InstrumentKind::Poly(VoiceModel::Fm { .. }) => "poly/fm",
            InstrumentKind::Fm { .. } => "fm",
            InstrumentKind::Duo { .. } => "duo",
            InstrumentKind::Mono { .. } => "mono",
        }
    }
}

// everything the engine needs to build one track's channel
#[derive(Clone, Debug, PartialEq)]
pub struct InstrumentSpec {
    pub kind: InstrumentKind,
    pub envelope: Envelope,
    pub routes: Vec<EffectKind>,
    pub volume_db: f32,
    pub pan: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AudioCommand {
    // startup (and again whenever the audio device comes back)
    CreateInstrument { track: usize, spec: InstrumentSpec },

    // Timed. Combined instruments get a single Trigger; single-voice instruments
    // get a NoteOn and a separately timed NoteOff.
    Trigger { track: usize, note: Note, at: f64, duration: f64 },
    NoteOn { track: usize, note: Note, at: f64 },
    NoteOff { track: usize, at: f64 },

    // Immediate. SetEnvelope writes a shared envelope in place, SetVoiceTemplate
    // updates a pool's template and every voice it already spawned.
    SetEnvelope { track: usize, envelope: Envelope },
    SetVoiceTemplate { track: usize, envelope: Envelope },
    SetEffectParam { kind: EffectKind, value: f32 },
    SetTrackMix { track: usize, volume_db: f32, pan: f32 },
    SetMasterVolume { db: f32 },
}

impl AudioCommand {
    pub fn scheduled_at(&self) -> Option<f64> {
        match self {
            AudioCommand::Trigger { at, .. }
            | AudioCommand::NoteOn { at, .. }
            | AudioCommand::NoteOff { at, .. } => Some(*at),
            _ => None,
        }
    }
}

pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}
