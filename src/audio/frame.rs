use std::ops::{AddAssign, Mul};

// One stereo frame. `repr(C)` keeps it laid out as two plain f32s.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StereoFrame {
    pub left: f32,
    pub right: f32,
}

impl StereoFrame {
    pub fn zero() -> Self {
        Self::default()
    }

    // a mono sample placed by per-side gains
    pub fn panned(sample: f32, gain_l: f32, gain_r: f32) -> Self {
        Self {
            left: sample * gain_l,
            right: sample * gain_r,
        }
    }
}

impl AddAssign for StereoFrame {
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl Mul<f32> for StereoFrame {
    type Output = Self;

    fn mul(self, gain: f32) -> Self {
        Self {
            left: self.left * gain,
            right: self.right * gain,
        }
    }
}
