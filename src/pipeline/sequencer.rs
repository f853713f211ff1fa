// The playback loop. Two states; every transport tick while running reads one
// column of the pattern and triggers whatever is in it at the tick's own
// timestamp, then moves the playhead on by exactly one.

use tracing::warn;

use crate::audio_api::AudioCommand;
use crate::pipeline::pattern::PatternGrid;
use crate::pipeline::voices::VoiceRegistry;
use crate::shared::STEP_COUNT;

// every note rings for a half note, no per-cell length or velocity
pub const NOTE_BEATS: f64 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayState {
    Stopped,
    Running,
}

#[derive(Clone, Debug)]
pub struct Sequencer {
    state: PlayState,
    playhead: u64, // only ever read modulo STEP_COUNT
}

impl Default for Sequencer {
    fn default() -> Self {
        Self {
            state: PlayState::Stopped,
            playhead: 0,
        }
    }
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.state == PlayState::Running
    }

    pub fn playhead(&self) -> u64 {
        self.playhead
    }

    pub fn current_column(&self) -> usize {
        (self.playhead % STEP_COUNT as u64) as usize
    }

    // Resumes wherever the playhead is, which after a stop is always 0.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        self.state = PlayState::Running;
        true
    }

    // Stop rewinds. Notes already handed to the voices are left to ring out.
    pub fn stop(&mut self) -> bool {
        let was_running = self.is_running();
        self.state = PlayState::Stopped;
        self.playhead = 0;
        was_running
    }

    // One transport tick. Returns the column that was played, None while stopped.
    pub fn tick(
        &mut self,
        at: f64,
        note_duration: f64,
        pattern: &PatternGrid,
        voices: &VoiceRegistry,
        out: &mut Vec<AudioCommand>,
    ) -> Option<usize> {
        if !self.is_running() {
            return None;
        }

        let step = self.current_column();
        for (track, note) in pattern.read_step(step) {
            if let Err(e) = voices.trigger(track, note, at, note_duration, out) {
                warn!(track, step, "skipping trigger: {e}");
            }
        }

        // 2^64 is a multiple of STEP_COUNT, so wrapping keeps the column sequence intact
        self.playhead = self.playhead.wrapping_add(1);
        Some(step)
    }
}
