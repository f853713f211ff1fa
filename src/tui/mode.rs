use ratatui::layout::Rect;

use crate::audio_api::EffectKind;
use crate::pipeline::controller::ControllerId;
use crate::shared::{CoreEvent, DisplayState, Note, TRACK_COUNT};

// what sits under a screen cell, filled in by the view every frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Hit {
    Cell { track: usize, step: usize },
    Knob(ControllerId),
    Fader(usize),
    Pan(usize),
    Key(Note),
    Fx(EffectKind),
}

#[derive(Clone, Debug, Default)]
pub struct HitMap {
    zones: Vec<(Rect, Hit)>,
}

impl HitMap {
    pub fn push(&mut self, rect: Rect, hit: Hit) {
        self.zones.push((rect, hit));
    }

    pub fn at(&self, column: u16, row: u16) -> Option<Hit> {
        self.zones
            .iter()
            .find(|(rect, _)| {
                column >= rect.x && column < rect.right() && row >= rect.y && row < rect.bottom()
            })
            .map(|(_, hit)| *hit)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.zones.len()
    }
}

// state local to tui: cursor, knob/fx selection and the last thing that changed.
// playing, octave, volumes and fx values are synced from DisplayState per loop
#[derive(Clone, Debug)]
pub struct TuiState {
    pub cursor_track: usize,
    pub cursor_step: usize,
    pub knobs: Vec<ControllerId>,
    pub selected_knob: usize,
    pub selected_fx: usize,
    // synced from DisplayState each frame
    pub playing: bool,
    pub octave: u8,
    pub volumes: [f32; TRACK_COUNT],
    pub pans: [f32; TRACK_COUNT],
    pub fx_values: [f32; EffectKind::COUNT],
    // fed by core events
    pub playing_step: Option<usize>,
    pub status: String,
    pub hits: HitMap,
}

impl Default for TuiState {
    fn default() -> Self {
        Self {
            cursor_track: 0,
            cursor_step: 0,
            knobs: ControllerId::all(),
            selected_knob: 0,
            selected_fx: 0,
            playing: false,
            octave: 3,
            volumes: [0.0; TRACK_COUNT],
            pans: [0.0; TRACK_COUNT],
            fx_values: [0.0; EffectKind::COUNT],
            playing_step: None,
            status: String::new(),
            hits: HitMap::default(),
        }
    }
}

impl TuiState {
    pub fn sync(&mut self, ds: &DisplayState) {
        self.playing = ds.playing;
        self.octave = ds.octave;
        for (track, t) in ds.tracks.iter().enumerate().take(TRACK_COUNT) {
            self.volumes[track] = t.volume_db;
            self.pans[track] = t.pan;
        }
        for (kind, value) in ds.effects {
            self.fx_values[kind.index()] = value;
        }
    }

    pub fn on_core_event(&mut self, event: &CoreEvent) {
        match event {
            CoreEvent::CurrentStepChanged(step) => self.playing_step = *step,
            CoreEvent::CellStateChanged { track, step, note } => {
                self.status = match note {
                    Some(note) => format!("T{} step {}: {note}", track + 1, step + 1),
                    None => format!("T{} step {}: --", track + 1, step + 1),
                };
            }
            CoreEvent::ParameterChanged { target, value } => {
                self.status = format!("{target} {value:.2}");
            }
        }
    }

    pub fn selected_knob(&self) -> Option<ControllerId> {
        self.knobs.get(self.selected_knob).copied()
    }

    pub fn selected_fx(&self) -> EffectKind {
        EffectKind::ALL[self.selected_fx % EffectKind::COUNT]
    }

    pub fn move_cursor(&mut self, d_track: isize, d_step: isize) {
        use crate::shared::STEP_COUNT;
        self.cursor_track = (self.cursor_track as isize + d_track).rem_euclid(TRACK_COUNT as isize) as usize;
        self.cursor_step = (self.cursor_step as isize + d_step).rem_euclid(STEP_COUNT as isize) as usize;
    }

    pub fn cycle_knob(&mut self, delta: isize) {
        let n = self.knobs.len().max(1) as isize;
        self.selected_knob = (self.selected_knob as isize + delta).rem_euclid(n) as usize;
    }

    pub fn cycle_fx(&mut self, delta: isize) {
        self.selected_fx = (self.selected_fx as isize + delta).rem_euclid(EffectKind::COUNT as isize) as usize;
    }
}
