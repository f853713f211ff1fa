// The vocabulary shared by the tui, the middle layer and the audio side.
//
// The idea of the rendering process:
//   - Only the middle layer holds the pattern, voice and transport state. The
//     tui turns keys/mouse into `InputEvent`s and redraws from a `DisplayState`
//     snapshot every frame.
//   - The middle layer raises `CoreEvent`s (playhead moved, cell changed,
//     parameter changed) that the tui drains after each frame for highlights
//     and the status line.
//
// Keyboard plan (resolved in tui/input.rs):
//   arrows        //  move the grid cursor
//   Enter         //  CellClick at the cursor
//   Space         //  Play / Stop
//   Delete / 0    //  Clear
//   a w s e d f t g y h u j k   //  NoteSelect (one octave + the next C)
//   z / x         //  OctaveChange(-1 / +1)
//   Tab / BackTab //  cycle the selected knob
//   [ / ]         //  KnobDrag on the selected knob, { / } for coarse steps
//   < / >         //  FaderChange on the cursor track
//   ( / )         //  PanChange on the cursor track
//   , / .         //  cycle the selected fx
//   - / =         //  FxParamChange down / up
//   Esc           //  Quit
//
// Mouse: click a cell to toggle it, click a key to select it, press-drag-release
// on a knob for continuous control, wheel over a knob, fader, pan or fx nudges it.

use std::fmt;
use std::str::FromStr;

use crate::audio_api::{Envelope, EnvelopeStage};
use crate::error::CoreError;
use crate::pipeline::controller::{ControllerId, PointerId};
use crate::pipeline::effects::EffectKind;

pub const TRACK_COUNT: usize = 7;
pub const STEP_COUNT: usize = 32;
pub const MIN_OCTAVE: u8 = 1;
pub const MAX_OCTAVE: u8 = 6;
pub const KEYS_PER_KEYBOARD: usize = 13; // one octave plus the C above it

const SHARP_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

// A pitch class plus an octave, spelled like "C3", "Eb3" or "F#4".
// C4 is middle C (midi 60), A4 is 440 Hz.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Note {
    pitch_class: u8, // 0 = C .. 11 = B
    octave: i8,
}

impl Note {
    pub const fn new(pitch_class: u8, octave: i8) -> Self {
        Self {
            pitch_class: pitch_class % 12,
            octave,
        }
    }

    pub fn pitch_class(self) -> u8 {
        self.pitch_class
    }

    pub fn octave(self) -> i8 {
        self.octave
    }

    // pitch name without the octave, what a grid cell shows
    pub fn name(self) -> &'static str {
        SHARP_NAMES[self.pitch_class as usize]
    }

    pub fn midi(self) -> i32 {
        (self.octave as i32 + 1) * 12 + self.pitch_class as i32
    }

    pub fn frequency(self) -> f32 {
        440.0 * 2.0_f32.powf((self.midi() - 69) as f32 / 12.0)
    }

    // the on-screen keyboard: C..B of `octave`, then the C above
    pub fn keyboard(octave: u8) -> [Note; KEYS_PER_KEYBOARD] {
        std::array::from_fn(|i| {
            let octave = octave as i8 + (i / 12) as i8;
            Note::new((i % 12) as u8, octave)
        })
    }

    pub fn is_sharp(self) -> bool {
        matches!(self.pitch_class, 1 | 3 | 6 | 8 | 10)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name(), self.octave)
    }
}

impl FromStr for Note {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidNote(s.to_string());
        let mut chars = s.chars();
        let letter = chars.next().ok_or_else(invalid)?;
        let natural: i32 = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(invalid()),
        };

        let rest = chars.as_str();
        let (accidental, octave_str) = match rest.chars().next() {
            Some('#') => (1, &rest[1..]),
            Some('b') => (-1, &rest[1..]),
            _ => (0, rest),
        };
        let mut octave: i32 = octave_str.parse().map_err(|_| invalid())?;

        // Cb4 is B3, B#3 is C4
        let mut pitch = natural + accidental;
        if pitch < 0 {
            pitch += 12;
            octave -= 1;
        } else if pitch > 11 {
            pitch -= 12;
            octave += 1;
        }
        let octave = i8::try_from(octave).map_err(|_| invalid())?;
        Ok(Note::new(pitch as u8, octave))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum InputEvent {
    // grid
    CellClick { track: usize, step: usize },

    // keyboard
    NoteSelect(Note),
    OctaveChange(i8),

    // transport buttons
    Play,
    Stop,
    Clear,

    // per-track fader, absolute dB
    FaderChange { track: usize, volume_db: f32 },
    // per-track pan, -1 (left) to 1 (right)
    PanChange { track: usize, pan: f32 },

    // one knob nudge without a pointer (keyboard)
    KnobDrag { controller: ControllerId, delta_y: f32 },

    // pointer-driven knob drags
    KnobPointerDown { pointer: PointerId, controller: ControllerId, y: f32 },
    KnobPointerMove { pointer: PointerId, y: f32 },
    KnobPointerUp { pointer: PointerId },

    // fx sliders, absolute value
    FxParamChange { kind: EffectKind, value: f32 },

    Quit,
}

// what a parameter change landed on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamTarget {
    Bpm,
    MasterVolume,
    TrackVolume(usize),
    TrackPan(usize),
    Envelope { track: usize, stage: EnvelopeStage },
    Effect(EffectKind),
}

impl fmt::Display for ParamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamTarget::Bpm => write!(f, "BPM"),
            ParamTarget::MasterVolume => write!(f, "MASTER"),
            ParamTarget::TrackVolume(t) => write!(f, "T{} VOL", t + 1),
            ParamTarget::TrackPan(t) => write!(f, "T{} PAN", t + 1),
            ParamTarget::Envelope { track, stage } => write!(f, "T{} {}", track + 1, stage.label()),
            ParamTarget::Effect(kind) => write!(f, "{} {}", kind.label(), kind.param_label()),
        }
    }
}

// notifications for the projection, drained once per frame
#[derive(Clone, Debug, PartialEq)]
pub enum CoreEvent {
    CurrentStepChanged(Option<usize>), // None = highlight cleared
    CellStateChanged { track: usize, step: usize, note: Option<Note> },
    ParameterChanged { target: ParamTarget, value: f32 },
}

#[derive(Clone, Debug)]
pub struct TrackDisplay {
    pub name: &'static str,
    pub kind_label: &'static str,
    pub default_note: Note,
    pub volume_db: f32,
    pub pan: f32,
    pub envelope: Envelope,
}

#[derive(Clone, Debug)]
pub struct DisplayState {
    pub cells: [[Option<Note>; STEP_COUNT]; TRACK_COUNT],
    pub playing: bool,
    pub playhead: u64,
    pub bpm: f32,
    pub master_volume_db: f32,
    pub selected_note: Note,
    pub octave: u8,
    pub tracks: Vec<TrackDisplay>,
    pub effects: [(EffectKind, f32); EffectKind::COUNT],
    pub dragging: Vec<ControllerId>, // knobs currently held by a pointer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sharps_and_flats() {
        let eb: Note = "Eb3".parse().unwrap();
        let ds: Note = "D#3".parse().unwrap();
        assert_eq!(eb, ds);
        assert_eq!(eb.to_string(), "D#3");
        assert_eq!("Bb3".parse::<Note>().unwrap(), Note::new(10, 3));
        assert_eq!("C2".parse::<Note>().unwrap(), Note::new(0, 2));
    }

    #[test]
    fn accidentals_cross_octave_boundaries() {
        assert_eq!("Cb4".parse::<Note>().unwrap(), Note::new(11, 3));
        assert_eq!("B#3".parse::<Note>().unwrap(), Note::new(0, 4));
    }

    #[test]
    fn rejects_garbage() {
        assert!("H3".parse::<Note>().is_err());
        assert!("C".parse::<Note>().is_err());
        assert!("".parse::<Note>().is_err());
        assert!("C#x".parse::<Note>().is_err());
    }

    #[test]
    fn frequency_is_equal_tempered() {
        let a4: Note = "A4".parse().unwrap();
        assert!((a4.frequency() - 440.0).abs() < 1e-3);
        let c4: Note = "C4".parse().unwrap();
        assert_eq!(c4.midi(), 60);
        assert!((c4.frequency() - 261.626).abs() < 0.01);
    }

    #[test]
    fn keyboard_spans_octave_and_next_c() {
        let keys = Note::keyboard(3);
        assert_eq!(keys[0].to_string(), "C3");
        assert_eq!(keys[1].to_string(), "C#3");
        assert_eq!(keys[11].to_string(), "B3");
        assert_eq!(keys[12].to_string(), "C4");
        assert!(keys[1].is_sharp());
        assert!(!keys[4].is_sharp());
    }
}
