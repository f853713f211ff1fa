// process-wide cursor state: what a cell click writes, which octave the
// keyboard shows, tempo and master level

use crate::shared::{MAX_OCTAVE, MIN_OCTAVE, Note};

pub const INITIAL_NOTE: Note = Note::new(0, 3); // C3
pub const INITIAL_OCTAVE: u8 = 3;

#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    pub selected_note: Note,
    pub octave: u8,
    pub bpm: f32,
    pub master_volume_db: f32,
}

impl Session {
    pub fn new(bpm: f32, master_volume_db: f32) -> Self {
        Self {
            selected_note: INITIAL_NOTE,
            octave: INITIAL_OCTAVE,
            bpm,
            master_volume_db,
        }
    }

    // Moves the keyboard octave, pinned to MIN..=MAX. Returns true if it moved.
    pub fn shift_octave(&mut self, delta: i8) -> bool {
        let next = (self.octave as i16 + delta as i16).clamp(MIN_OCTAVE as i16, MAX_OCTAVE as i16) as u8;
        let moved = next != self.octave;
        self.octave = next;
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_on_c3_octave_3() {
        let session = Session::new(120.0, -12.0);
        assert_eq!(session.selected_note.to_string(), "C3");
        assert_eq!(session.octave, 3);
    }

    #[test]
    fn octave_stays_between_one_and_six() {
        let mut session = Session::new(120.0, -12.0);
        assert!(session.shift_octave(1));
        assert_eq!(session.octave, 4);
        assert!(session.shift_octave(10));
        assert_eq!(session.octave, 6);
        assert!(!session.shift_octave(1));
        assert!(session.shift_octave(-100));
        assert_eq!(session.octave, 1);
    }
}
