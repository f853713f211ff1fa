// The voice registry: one instrument per track, built once from a static
// table. Every track gets a different kind of instrument on purpose, so the
// registry keeps the tag around and branches on what each one can do.

use tracing::debug;

use crate::audio_api::{
    AudioCommand, Capabilities, Envelope, FilterEnvelope, InstrumentKind, InstrumentSpec, VoiceModel, Waveform,
};
use crate::error::CoreError;
use crate::pipeline::effects::{EffectKind, EffectParams};
use crate::shared::{Note, TRACK_COUNT};

pub const INITIAL_VOLUME_DB: f32 = -18.0;
pub const VOLUME_RANGE: (f32, f32) = (-60.0, 0.0);
pub const PAN_RANGE: (f32, f32) = (-1.0, 1.0);

#[derive(Clone, Copy, Debug)]
pub struct TimbreProfile {
    pub name: &'static str,
    pub default_note: Note,
    pub kind: InstrumentKind,
    pub envelope: Envelope,
    pub routes: &'static [EffectKind],
}

const C2: Note = Note::new(0, 2);
const G2: Note = Note::new(7, 2);
const EB3: Note = Note::new(3, 3);
const G3: Note = Note::new(7, 3);
const BB3: Note = Note::new(10, 3);
const C4: Note = Note::new(0, 4);
const D4: Note = Note::new(2, 4);

// the filter sweep a pooled mono-style voice gets when nothing else is said
const DEFAULT_FILTER_ENVELOPE: FilterEnvelope = FilterEnvelope {
    attack: 0.6,
    decay: 0.2,
    sustain: 0.5,
    release: 2.0,
    base_frequency: 200.0,
    octaves: 3.0,
};

pub const PROFILES: [TimbreProfile; TRACK_COUNT] = [
    // sub bass pad
    TimbreProfile {
        name: "VOID",
        default_note: C2,
        kind: InstrumentKind::Poly(VoiceModel::Basic(Waveform::Sine)),
        envelope: Envelope::new(4.0, 2.0, 1.0, 10.0),
        routes: &[EffectKind::Filter],
    },
    // soft pad
    TimbreProfile {
        name: "AETHER",
        default_note: G2,
        kind: InstrumentKind::Poly(VoiceModel::Filtered {
            waveform: Waveform::Triangle,
            filter: DEFAULT_FILTER_ENVELOPE,
        }),
        envelope: Envelope::new(3.0, 1.0, 1.0, 8.0),
        routes: &[EffectKind::Reverb],
    },
    // fm bells
    TimbreProfile {
        name: "CRYSTAL",
        default_note: EB3,
        kind: InstrumentKind::Fm {
            harmonicity: 3.01,
            modulation_index: 14.0,
        },
        envelope: Envelope::new(0.1, 4.0, 0.1, 4.0),
        routes: &[EffectKind::Delay],
    },
    // string-like pad
    TimbreProfile {
        name: "RESONANCE",
        default_note: G3,
        kind: InstrumentKind::Poly(VoiceModel::Am { harmonicity: 3.0 }),
        envelope: Envelope::new(2.0, 3.0, 0.5, 6.0),
        routes: &[EffectKind::Chorus],
    },
    // distorted detuned pair
    TimbreProfile {
        name: "FLUX",
        default_note: BB3,
        kind: InstrumentKind::Duo {
            harmonicity: 1.5,
            vibrato_amount: 0.5,
            vibrato_rate: 5.0,
            voices: [Waveform::Sawtooth, Waveform::Sine],
        },
        envelope: Envelope::new(1.5, 0.01, 1.0, 4.0),
        routes: &[EffectKind::Distortion, EffectKind::BitCrush],
    },
    // high fm pad
    TimbreProfile {
        name: "CELESTIA",
        default_note: C4,
        kind: InstrumentKind::Poly(VoiceModel::Fm {
            harmonicity: 3.0,
            modulation_index: 10.0,
        }),
        envelope: Envelope::new(5.0, 2.0, 1.0, 12.0),
        routes: &[EffectKind::Reverb],
    },
    // modulated lead
    TimbreProfile {
        name: "ORBIT",
        default_note: D4,
        kind: InstrumentKind::Mono {
            waveform: Waveform::Square,
            filter: FilterEnvelope {
                attack: 4.0,
                decay: 2.0,
                sustain: 0.5,
                release: 6.0,
                base_frequency: 200.0,
                octaves: 4.0,
            },
        },
        envelope: Envelope::new(2.0, 8.0, 0.2, 8.0),
        routes: &[EffectKind::Delay],
    },
];

#[derive(Clone, Debug)]
pub struct InstrumentHandle {
    kind: InstrumentKind,
    capabilities: Capabilities,
    envelope: Envelope,
}

impl InstrumentHandle {
    fn new(kind: InstrumentKind, envelope: Envelope) -> Self {
        Self {
            kind,
            capabilities: kind.capabilities(),
            envelope: envelope.clamped(),
        }
    }

    pub fn kind(&self) -> &InstrumentKind {
        &self.kind
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn envelope(&self) -> Envelope {
        self.envelope
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mix {
    pub volume_db: f32,
    pub pan: f32,
}

#[derive(Clone, Debug)]
pub struct Track {
    pub index: usize,
    pub name: &'static str,
    pub default_note: Note,
    pub instrument: InstrumentHandle,
    pub mix: Mix,
    pub routes: &'static [EffectKind],
}

impl Track {
    fn spec(&self) -> InstrumentSpec {
        InstrumentSpec {
            kind: self.instrument.kind,
            envelope: self.instrument.envelope,
            routes: self.routes.to_vec(),
            volume_db: self.mix.volume_db,
            pan: self.mix.pan,
        }
    }
}

#[derive(Clone, Debug)]
pub struct VoiceRegistry {
    tracks: Vec<Track>,
    effects: EffectParams,
}

impl VoiceRegistry {
    pub fn build() -> Self {
        let tracks = PROFILES
            .iter()
            .enumerate()
            .map(|(index, profile)| Track {
                index,
                name: profile.name,
                default_note: profile.default_note,
                instrument: InstrumentHandle::new(profile.kind, profile.envelope),
                mix: Mix {
                    volume_db: INITIAL_VOLUME_DB,
                    pan: (index as f32 / TRACK_COUNT as f32) * 2.0 - 1.0, // spread left to right
                },
                routes: profile.routes,
            })
            .collect();

        Self {
            tracks,
            effects: EffectParams::default(),
        }
    }

    // Everything the audio side needs to mirror the registry as it stands now.
    // Sent once at startup and again if the audio device is (re)opened.
    pub fn startup_commands(&self, out: &mut Vec<AudioCommand>) {
        for track in &self.tracks {
            out.push(AudioCommand::CreateInstrument {
                track: track.index,
                spec: track.spec(),
            });
        }
        for (kind, value) in self.effects.iter() {
            out.push(AudioCommand::SetEffectParam { kind, value });
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, track: usize) -> Result<&Track, CoreError> {
        self.tracks.get(track).ok_or(CoreError::InvalidTrack(track))
    }

    fn track_mut(&mut self, track: usize) -> Result<&mut Track, CoreError> {
        self.tracks.get_mut(track).ok_or(CoreError::InvalidTrack(track))
    }

    // Pools play and release from a single command. Single-voice instruments
    // can't, so they get a note-on now and a note-off `duration` later.
    pub fn trigger(
        &self,
        track: usize,
        note: Note,
        start: f64,
        duration: f64,
        out: &mut Vec<AudioCommand>,
    ) -> Result<(), CoreError> {
        let t = self.track(track)?;
        if t.instrument.capabilities().combined_trigger_release {
            out.push(AudioCommand::Trigger {
                track,
                note,
                at: start,
                duration,
            });
        } else {
            out.push(AudioCommand::NoteOn { track, note, at: start });
            out.push(AudioCommand::NoteOff {
                track,
                at: start + duration,
            });
        }
        Ok(())
    }

    pub fn envelope(&self, track: usize) -> Result<Envelope, CoreError> {
        Ok(self.track(track)?.instrument.envelope)
    }

    // Shared envelopes are written in place; pools get their voice template
    // replaced so new voices and the ones already sounding both follow.
    pub fn set_envelope(
        &mut self,
        track: usize,
        envelope: Envelope,
        out: &mut Vec<AudioCommand>,
    ) -> Result<Envelope, CoreError> {
        let t = self.track_mut(track)?;
        let envelope = envelope.clamped();
        t.instrument.envelope = envelope;

        if t.instrument.capabilities().direct_envelope {
            out.push(AudioCommand::SetEnvelope { track, envelope });
        } else {
            out.push(AudioCommand::SetVoiceTemplate { track, envelope });
        }
        debug!(track, ?envelope, "envelope updated");
        Ok(envelope)
    }

    pub fn effect_param(&self, kind: EffectKind) -> f32 {
        self.effects.get(kind)
    }

    pub fn set_effect_param(&mut self, kind: EffectKind, value: f32, out: &mut Vec<AudioCommand>) -> f32 {
        let value = self.effects.set(kind, value);
        out.push(AudioCommand::SetEffectParam { kind, value });
        value
    }

    pub fn set_volume(&mut self, track: usize, volume_db: f32, out: &mut Vec<AudioCommand>) -> Result<f32, CoreError> {
        let t = self.track_mut(track)?;
        if !volume_db.is_nan() {
            t.mix.volume_db = volume_db.clamp(VOLUME_RANGE.0, VOLUME_RANGE.1);
        }
        out.push(mix_command(t));
        Ok(t.mix.volume_db)
    }

    pub fn set_pan(&mut self, track: usize, pan: f32, out: &mut Vec<AudioCommand>) -> Result<f32, CoreError> {
        let t = self.track_mut(track)?;
        if !pan.is_nan() {
            t.mix.pan = pan.clamp(PAN_RANGE.0, PAN_RANGE.1);
        }
        out.push(mix_command(t));
        Ok(t.mix.pan)
    }
}

fn mix_command(t: &Track) -> AudioCommand {
    AudioCommand::SetTrackMix {
        track: t.index,
        volume_db: t.mix.volume_db,
        pan: t.mix.pan,
    }
}
