// Knobs. Each one is a tiny pointer-drag state machine: press captures the
// pointer's y, every move applies (last_y - y) scaled by the knob's
// sensitivity, release lets go. The bank only turns pointer motion into
// deltas; the middle layer reads the bound value, runs it through
// `ControlRange::apply` and writes it back.

use crate::audio_api::EnvelopeStage;
use crate::shared::TRACK_COUNT;

// which pointer is driving a drag; the terminal only ever has one mouse
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PointerId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControllerId {
    Bpm,
    MasterVolume,
    Envelope { track: usize, stage: EnvelopeStage },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlRange {
    pub min: f32,
    pub max: f32,
    pub sensitivity: f32, // value units per unit of pointer travel
}

impl ControlRange {
    // Upward travel (positive delta) raises the value. Whatever comes in, the
    // result is inside [min, max]; a non-finite delta changes nothing.
    pub fn apply(&self, current: f32, delta_y: f32) -> f32 {
        let current = if current.is_nan() { self.min } else { current };
        if !delta_y.is_finite() {
            return current.clamp(self.min, self.max);
        }
        (current + delta_y * self.sensitivity).clamp(self.min, self.max)
    }
}

impl ControllerId {
    pub fn range(&self) -> ControlRange {
        match self {
            ControllerId::Bpm => ControlRange {
                min: 40.0,
                max: 220.0,
                sensitivity: 1.0,
            },
            ControllerId::MasterVolume => ControlRange {
                min: -60.0,
                max: 0.0,
                sensitivity: 0.5,
            },
            ControllerId::Envelope { stage, .. } => {
                let (min, max) = stage.range();
                ControlRange {
                    min,
                    max,
                    sensitivity: 0.01,
                }
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ControllerId::Bpm => "BPM",
            ControllerId::MasterVolume => "VOL",
            ControllerId::Envelope { stage, .. } => stage.label(),
        }
    }

    // the knobs that exist: transport, master, then four per track
    pub fn all() -> Vec<ControllerId> {
        let mut ids = vec![ControllerId::Bpm, ControllerId::MasterVolume];
        for track in 0..TRACK_COUNT {
            for stage in EnvelopeStage::ALL {
                ids.push(ControllerId::Envelope { track, stage });
            }
        }
        ids
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DragState {
    Idle,
    Dragging { pointer: PointerId, last_y: f32 },
}

#[derive(Clone, Debug)]
pub struct Knob {
    id: ControllerId,
    state: DragState,
}

impl Knob {
    pub fn new(id: ControllerId) -> Self {
        Self {
            id,
            state: DragState::Idle,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn held_by(&self, pointer: PointerId) -> bool {
        matches!(self.state, DragState::Dragging { pointer: p, .. } if p == pointer)
    }

    // false if another pointer already has it
    pub fn pointer_down(&mut self, pointer: PointerId, y: f32) -> bool {
        match self.state {
            DragState::Dragging { pointer: p, .. } if p != pointer => false,
            _ => {
                self.state = DragState::Dragging { pointer, last_y: y };
                true
            }
        }
    }

    // the travel since the last event, or None if this pointer isn't dragging us
    pub fn pointer_move(&mut self, pointer: PointerId, y: f32) -> Option<f32> {
        match &mut self.state {
            DragState::Dragging { pointer: p, last_y } if *p == pointer => {
                if !y.is_finite() {
                    return None;
                }
                let delta = *last_y - y;
                *last_y = y;
                Some(delta)
            }
            _ => None,
        }
    }

    pub fn pointer_up(&mut self, pointer: PointerId) -> bool {
        if self.held_by(pointer) {
            self.state = DragState::Idle;
            true
        } else {
            false
        }
    }
}

#[derive(Clone, Debug)]
pub struct ControllerBank {
    knobs: Vec<Knob>,
}

impl Default for ControllerBank {
    fn default() -> Self {
        Self {
            knobs: ControllerId::all().into_iter().map(Knob::new).collect(),
        }
    }
}

impl ControllerBank {
    pub fn new() -> Self {
        Self::default()
    }

    fn knob_mut(&mut self, id: ControllerId) -> Option<&mut Knob> {
        self.knobs.iter_mut().find(|k| k.id == id)
    }

    pub fn knob(&self, id: ControllerId) -> Option<&Knob> {
        self.knobs.iter().find(|k| k.id == id)
    }

    // A pointer drives at most one knob; pressing a new one drops whatever it
    // held before (covers a release we never saw).
    pub fn pointer_down(&mut self, pointer: PointerId, id: ControllerId, y: f32) -> bool {
        if !y.is_finite() {
            return false;
        }
        let Some(target) = self.knob(id) else {
            return false;
        };
        if matches!(target.state, DragState::Dragging { pointer: p, .. } if p != pointer) {
            return false;
        }
        for knob in self.knobs.iter_mut().filter(|k| k.id != id) {
            knob.pointer_up(pointer);
        }
        self.knob_mut(id).is_some_and(|k| k.pointer_down(pointer, y))
    }

    pub fn pointer_move(&mut self, pointer: PointerId, y: f32) -> Option<(ControllerId, f32)> {
        let knob = self.knobs.iter_mut().find(|k| k.held_by(pointer))?;
        let delta = knob.pointer_move(pointer, y)?;
        Some((knob.id, delta))
    }

    pub fn pointer_up(&mut self, pointer: PointerId) -> Option<ControllerId> {
        let knob = self.knobs.iter_mut().find(|k| k.held_by(pointer))?;
        knob.pointer_up(pointer);
        Some(knob.id)
    }

    pub fn dragging(&self) -> Vec<ControllerId> {
        self.knobs
            .iter()
            .filter(|k| matches!(k.state, DragState::Dragging { .. }))
            .map(|k| k.id)
            .collect()
    }
}
