use std::sync::atomic::{AtomicU64, Ordering};

// Frames rendered so far. The audio callback is the only writer; the control
// loop reads it to know what "now" is on the audio timeline.
#[derive(Debug)]
pub struct AudioClock {
    frames: AtomicU64,
    sample_rate: u32,
}

impl AudioClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: AtomicU64::new(0),
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::Release);
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    // seconds since the stream started
    pub fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    // first frame at or after `secs`; anything in the past maps to frame 0
    pub fn frame_at(&self, secs: f64) -> u64 {
        if !secs.is_finite() || secs <= 0.0 {
            return 0;
        }
        (secs * self.sample_rate as f64).round() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_follows_rendered_frames() {
        let clock = AudioClock::new(48_000);
        assert_eq!(clock.now(), 0.0);
        clock.advance(24_000);
        assert_eq!(clock.now(), 0.5);
        assert_eq!(clock.frame_at(0.5), 24_000);
        assert_eq!(clock.frame_at(-3.0), 0);
        assert_eq!(clock.frame_at(f64::NAN), 0);
    }
}
