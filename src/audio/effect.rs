use std::f32::consts::TAU;

use super::frame::StereoFrame;
use crate::audio_api::EffectKind;

// One shared effect. Each one reads its bus (the sum of every send routed to
// it) and writes its output back in place; the engine sums that into the
// master. Wet/dry effects mix their own dry signal like a plain insert would.
pub trait Effect: Send {
    fn set_param(&mut self, value: f32);
    fn process(&mut self, buf: &mut [StereoFrame]);
}

// delay/chorus/reverb timings; fixed, only the wet amount is live
const DELAY_SECONDS: f32 = 0.25; // an eighth note at 120
const DELAY_FEEDBACK: f32 = 0.5;
const CHORUS_RATE_HZ: f32 = 4.0;
const CHORUS_DELAY_SECONDS: f32 = 0.0025;
const CHORUS_DEPTH: f32 = 0.5;
const REVERB_DECAY_SECONDS: f32 = 5.0;
const REVERB_PREDELAY_SECONDS: f32 = 0.1;

pub fn build_effect(kind: EffectKind, sample_rate: f32, value: f32) -> Box<dyn Effect> {
    let mut effect: Box<dyn Effect> = match kind {
        EffectKind::Delay => Box::new(FeedbackDelay::new(sample_rate)),
        EffectKind::Reverb => Box::new(Reverb::new(sample_rate)),
        EffectKind::Filter => Box::new(LowPass::new(sample_rate)),
        EffectKind::Distortion => Box::new(Distortion::new()),
        EffectKind::Chorus => Box::new(Chorus::new(sample_rate)),
        EffectKind::BitCrush => Box::new(Bitcrusher::new()),
    };
    effect.set_param(value);
    effect
}

#[inline]
fn mix(dry: f32, wet: f32, amount: f32) -> f32 {
    dry * (1.0 - amount) + wet * amount
}

// snaps each sample onto one of 2^bits evenly spaced levels across [-1, 1]
pub struct Bitcrusher {
    bits: u32,
}

impl Bitcrusher {
    pub fn new() -> Self {
        Self { bits: 8 }
    }

    fn step(&self) -> f32 {
        let top_level = (1u32 << self.bits) - 1;
        2.0 / top_level.max(1) as f32
    }
}

#[inline]
fn crush(sample: f32, step: f32) -> f32 {
    let level = ((sample.clamp(-1.0, 1.0) + 1.0) / step).round();
    level * step - 1.0
}

impl Effect for Bitcrusher {
    fn set_param(&mut self, bits: f32) {
        self.bits = bits.clamp(1.0, 16.0).round() as u32;
    }

    fn process(&mut self, buf: &mut [StereoFrame]) {
        let step = self.step();
        for f in buf.iter_mut() {
            f.left = crush(f.left, step);
            f.right = crush(f.right, step);
        }
    }
}

// tanh waveshaper, normalised so a full-scale input stays at full scale
pub struct Distortion {
    drive: f32,
}

impl Distortion {
    pub fn new() -> Self {
        Self { drive: 0.0 }
    }
}

impl Effect for Distortion {
    fn set_param(&mut self, amount: f32) {
        self.drive = amount.clamp(0.0, 1.0);
    }

    fn process(&mut self, buf: &mut [StereoFrame]) {
        let k = 1.0 + self.drive * 10.0;
        let norm = 1.0 / k.tanh();
        let shape = |x: f32| (k * x).tanh() * norm;
        for f in buf.iter_mut() {
            *f = StereoFrame {
                left: shape(f.left),
                right: shape(f.right),
            };
        }
    }
}

// two cascaded one-poles per side, so roughly 12dB/oct
pub struct LowPass {
    sample_rate: f32,
    alpha: f32,
    state: [f32; 4],
}

impl LowPass {
    pub fn new(sample_rate: f32) -> Self {
        let mut lp = Self {
            sample_rate,
            alpha: 1.0,
            state: [0.0; 4],
        };
        lp.set_param(20_000.0);
        lp
    }
}

impl Effect for LowPass {
    fn set_param(&mut self, cutoff: f32) {
        let nyquist = self.sample_rate * 0.5;
        let fc = cutoff.clamp(20.0, 20_000.0).min(nyquist * 0.99);
        self.alpha = 1.0 - (-TAU * fc / self.sample_rate).exp();
    }

    fn process(&mut self, buf: &mut [StereoFrame]) {
        let a = self.alpha;
        let [l1, l2, r1, r2] = &mut self.state;
        for f in buf.iter_mut() {
            *l1 += a * (f.left - *l1);
            *l2 += a * (*l1 - *l2);
            *r1 += a * (f.right - *r1);
            *r2 += a * (*r1 - *r2);
            f.left = *l2;
            f.right = *r2;
        }
    }
}

pub struct FeedbackDelay {
    line: Vec<StereoFrame>,
    pos: usize,
    wet: f32,
}

impl FeedbackDelay {
    pub fn new(sample_rate: f32) -> Self {
        let len = ((DELAY_SECONDS * sample_rate) as usize).max(1);
        Self {
            line: vec![StereoFrame::zero(); len],
            pos: 0,
            wet: 0.0,
        }
    }
}

impl Effect for FeedbackDelay {
    fn set_param(&mut self, wet: f32) {
        self.wet = wet.clamp(0.0, 1.0);
    }

    fn process(&mut self, buf: &mut [StereoFrame]) {
        for f in buf.iter_mut() {
            let delayed = self.line[self.pos];
            self.line[self.pos] = StereoFrame {
                left: f.left + delayed.left * DELAY_FEEDBACK,
                right: f.right + delayed.right * DELAY_FEEDBACK,
            };
            self.pos = (self.pos + 1) % self.line.len();
            f.left = mix(f.left, delayed.left, self.wet);
            f.right = mix(f.right, delayed.right, self.wet);
        }
    }
}

// a short modulated delay, lfo on the right side runs half a cycle behind
pub struct Chorus {
    line: Vec<StereoFrame>,
    pos: usize,
    lfo_phase: f32,
    lfo_inc: f32,
    base_delay: f32, // in frames
    wet: f32,
}

impl Chorus {
    pub fn new(sample_rate: f32) -> Self {
        let base_delay = CHORUS_DELAY_SECONDS * sample_rate;
        let len = (base_delay * (1.0 + CHORUS_DEPTH)) as usize + 4;
        Self {
            line: vec![StereoFrame::zero(); len],
            pos: 0,
            lfo_phase: 0.0,
            lfo_inc: CHORUS_RATE_HZ / sample_rate,
            base_delay,
            wet: 0.0,
        }
    }

    fn read(&self, delay: f32, right: bool) -> f32 {
        let len = self.line.len();
        let delay = delay.clamp(1.0, (len - 2) as f32);
        let whole = delay as usize;
        let frac = delay - whole as f32;
        let a = self.line[(self.pos + len - whole) % len];
        let b = self.line[(self.pos + len - whole - 1) % len];
        if right {
            a.right + (b.right - a.right) * frac
        } else {
            a.left + (b.left - a.left) * frac
        }
    }
}

impl Effect for Chorus {
    fn set_param(&mut self, wet: f32) {
        self.wet = wet.clamp(0.0, 1.0);
    }

    fn process(&mut self, buf: &mut [StereoFrame]) {
        for f in buf.iter_mut() {
            self.line[self.pos] = *f;
            let swing = (TAU * self.lfo_phase).sin() * CHORUS_DEPTH;
            let left = self.read(self.base_delay * (1.0 + swing), false);
            let right = self.read(self.base_delay * (1.0 - swing), true);
            self.pos = (self.pos + 1) % self.line.len();
            self.lfo_phase = (self.lfo_phase + self.lfo_inc).fract();
            f.left = mix(f.left, left, self.wet);
            f.right = mix(f.right, right, self.wet);
        }
    }
}

struct Comb {
    line: Vec<f32>,
    pos: usize,
    feedback: f32,
}

impl Comb {
    fn new(len: usize, sample_rate: f32) -> Self {
        // -60dB after REVERB_DECAY_SECONDS
        let loops = REVERB_DECAY_SECONDS * sample_rate / len as f32;
        Self {
            line: vec![0.0; len],
            pos: 0,
            feedback: 10.0_f32.powf(-3.0 / loops),
        }
    }

    fn tick(&mut self, x: f32) -> f32 {
        let y = self.line[self.pos];
        self.line[self.pos] = x + y * self.feedback;
        self.pos = (self.pos + 1) % self.line.len();
        y
    }
}

struct Allpass {
    line: Vec<f32>,
    pos: usize,
}

impl Allpass {
    const GAIN: f32 = 0.5;

    fn new(len: usize) -> Self {
        Self {
            line: vec![0.0; len],
            pos: 0,
        }
    }

    fn tick(&mut self, x: f32) -> f32 {
        let buffered = self.line[self.pos];
        let y = buffered - x;
        self.line[self.pos] = x + buffered * Self::GAIN;
        self.pos = (self.pos + 1) % self.line.len();
        y
    }
}

// Schroeder style: predelay, four parallel combs, two allpasses, per side
pub struct Reverb {
    predelay: Vec<StereoFrame>,
    pre_pos: usize,
    combs: [Vec<Comb>; 2],
    allpasses: [Vec<Allpass>; 2],
    wet: f32,
}

impl Reverb {
    // tuned at 44.1k, scaled to the device rate
    const COMB_LENGTHS: [usize; 4] = [1557, 1617, 1491, 1422];
    const ALLPASS_LENGTHS: [usize; 2] = [556, 441];
    const STEREO_SPREAD: usize = 23;

    pub fn new(sample_rate: f32) -> Self {
        let scale = sample_rate / 44_100.0;
        let at_rate = |len: usize| ((len as f32 * scale) as usize).max(1);
        let side = |spread: usize| {
            let combs = Self::COMB_LENGTHS
                .iter()
                .map(|&len| Comb::new(at_rate(len + spread), sample_rate))
                .collect();
            let allpasses = Self::ALLPASS_LENGTHS
                .iter()
                .map(|&len| Allpass::new(at_rate(len + spread)))
                .collect();
            (combs, allpasses)
        };
        let (left_combs, left_ap) = side(0);
        let (right_combs, right_ap) = side(Self::STEREO_SPREAD);
        Self {
            predelay: vec![StereoFrame::zero(); ((REVERB_PREDELAY_SECONDS * sample_rate) as usize).max(1)],
            pre_pos: 0,
            combs: [left_combs, right_combs],
            allpasses: [left_ap, right_ap],
            wet: 0.0,
        }
    }

    fn side(combs: &mut [Comb], allpasses: &mut [Allpass], x: f32) -> f32 {
        let mut y = combs.iter_mut().map(|c| c.tick(x)).sum::<f32>() * 0.25;
        for ap in allpasses.iter_mut() {
            y = ap.tick(y);
        }
        y
    }
}

impl Effect for Reverb {
    fn set_param(&mut self, wet: f32) {
        self.wet = wet.clamp(0.0, 1.0);
    }

    fn process(&mut self, buf: &mut [StereoFrame]) {
        let [left_combs, right_combs] = &mut self.combs;
        let [left_ap, right_ap] = &mut self.allpasses;
        for f in buf.iter_mut() {
            let input = self.predelay[self.pre_pos];
            self.predelay[self.pre_pos] = *f;
            self.pre_pos = (self.pre_pos + 1) % self.predelay.len();

            let left = Self::side(left_combs, left_ap, input.left);
            let right = Self::side(right_combs, right_ap, input.right);
            f.left = mix(f.left, left, self.wet);
            f.right = mix(f.right, right, self.wet);
        }
    }
}
