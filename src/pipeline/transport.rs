// A lookahead transport. The control loop polls it with the current audio time
// and gets back the exact timestamps of every 16th-note tick that falls inside
// the lookahead window, so notes are scheduled against the audio clock instead
// of whenever the loop happened to wake up.

use tracing::warn;

pub const BPM_RANGE: (f32, f32) = (40.0, 220.0);
pub const TICKS_PER_BEAT: f64 = 4.0; // 16th notes

// a tick this far behind `now` (or a clock that jumped backwards) re-anchors
pub const MAX_LATENESS: f64 = 0.25;

// 16th note at the slowest tempo; a pending tick is never further out than
// the horizon plus this
const LONGEST_TICK: f64 = 60.0 / BPM_RANGE.0 as f64 / TICKS_PER_BEAT;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Started,
}

#[derive(Clone, Debug)]
pub struct Transport {
    bpm: f32,
    state: TransportState,
    next_tick: f64,
    lookahead: f64,
}

impl Transport {
    pub fn new(bpm: f32, lookahead: f64) -> Self {
        Self {
            bpm: clamp_bpm(bpm),
            state: TransportState::Stopped,
            next_tick: 0.0,
            lookahead: lookahead.max(0.0),
        }
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    // takes effect from the next tick that hasn't been handed out yet
    pub fn set_bpm(&mut self, bpm: f32) -> f32 {
        if !bpm.is_nan() {
            self.bpm = clamp_bpm(bpm);
        }
        self.bpm
    }

    pub fn tick_period(&self) -> f64 {
        60.0 / self.bpm as f64 / TICKS_PER_BEAT
    }

    // seconds in `beats` quarter notes at the current tempo
    pub fn beats(&self, beats: f64) -> f64 {
        beats * 60.0 / self.bpm as f64
    }

    pub fn is_started(&self) -> bool {
        self.state == TransportState::Started
    }

    // first tick lands exactly at `now`
    pub fn start(&mut self, now: f64) {
        if self.is_started() {
            return;
        }
        self.state = TransportState::Started;
        self.next_tick = now;
    }

    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
    }

    // Every tick timestamp earlier than now + lookahead, oldest first.
    pub fn poll(&mut self, now: f64) -> Vec<f64> {
        if !self.is_started() {
            return Vec::new();
        }

        let horizon = now + self.lookahead;
        if self.next_tick < now - MAX_LATENESS || self.next_tick > horizon + LONGEST_TICK + MAX_LATENESS {
            warn!(
                next_tick = self.next_tick,
                now, "transport drifted from the audio clock, re-anchoring"
            );
            self.next_tick = now;
        }

        let mut ticks = Vec::new();
        while self.next_tick < horizon {
            ticks.push(self.next_tick);
            self.next_tick += self.tick_period();
        }
        ticks
    }
}

fn clamp_bpm(bpm: f32) -> f32 {
    bpm.clamp(BPM_RANGE.0, BPM_RANGE.1)
}
