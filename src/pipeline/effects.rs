// The shared effect parameter set. One value per effect, process-wide; every
// track routed through an effect hears the same setting.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EffectKind {
    Delay,
    Reverb,
    Filter,
    Distortion,
    Chorus,
    BitCrush,
}

impl EffectKind {
    pub const COUNT: usize = 6;

    pub const ALL: [EffectKind; EffectKind::COUNT] = [
        EffectKind::Delay,
        EffectKind::Reverb,
        EffectKind::Filter,
        EffectKind::Distortion,
        EffectKind::Chorus,
        EffectKind::BitCrush,
    ];

    pub fn index(self) -> usize {
        match self {
            EffectKind::Delay => 0,
            EffectKind::Reverb => 1,
            EffectKind::Filter => 2,
            EffectKind::Distortion => 3,
            EffectKind::Chorus => 4,
            EffectKind::BitCrush => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EffectKind::Delay => "DELAY",
            EffectKind::Reverb => "REVERB",
            EffectKind::Filter => "FILTER",
            EffectKind::Distortion => "DIST",
            EffectKind::Chorus => "CHORUS",
            EffectKind::BitCrush => "CRUSH",
        }
    }

    pub fn param_label(self) -> &'static str {
        match self {
            EffectKind::Delay | EffectKind::Reverb | EffectKind::Chorus => "wet",
            EffectKind::Filter => "cutoff",
            EffectKind::Distortion => "amount",
            EffectKind::BitCrush => "bits",
        }
    }

    pub fn range(self) -> (f32, f32) {
        match self {
            EffectKind::Filter => (20.0, 20_000.0),
            EffectKind::BitCrush => (1.0, 16.0),
            _ => (0.0, 1.0),
        }
    }

    pub fn initial(self) -> f32 {
        match self {
            EffectKind::Delay => 0.0,
            EffectKind::Reverb => 0.3,
            EffectKind::Filter => 20_000.0,
            EffectKind::Distortion => 0.2,
            EffectKind::Chorus => 1.0,
            EffectKind::BitCrush => 8.0,
        }
    }

    pub fn clamp(self, value: f32) -> f32 {
        let (min, max) = self.range();
        value.clamp(min, max)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EffectParams {
    values: [f32; EffectKind::COUNT],
}

impl Default for EffectParams {
    fn default() -> Self {
        Self {
            values: EffectKind::ALL.map(EffectKind::initial),
        }
    }
}

impl EffectParams {
    pub fn get(&self, kind: EffectKind) -> f32 {
        self.values[kind.index()]
    }

    // returns the value actually stored; NaN leaves the old value in place
    pub fn set(&mut self, kind: EffectKind, value: f32) -> f32 {
        if !value.is_nan() {
            self.values[kind.index()] = kind.clamp(value);
        }
        self.get(kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EffectKind, f32)> + '_ {
        EffectKind::ALL.into_iter().map(|k| (k, self.get(k)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_initial_values() {
        let params = EffectParams::default();
        assert_eq!(params.get(EffectKind::Reverb), 0.3);
        assert_eq!(params.get(EffectKind::Filter), 20_000.0);
        assert_eq!(params.get(EffectKind::BitCrush), 8.0);
    }

    #[test]
    fn set_clamps_to_range() {
        let mut params = EffectParams::default();
        assert_eq!(params.set(EffectKind::Delay, 4.0), 1.0);
        assert_eq!(params.set(EffectKind::Filter, 3.0), 20.0);
        assert_eq!(params.set(EffectKind::BitCrush, 99.0), 16.0);
        assert_eq!(params.set(EffectKind::Distortion, f32::NEG_INFINITY), 0.0);
    }

    #[test]
    fn nan_is_ignored() {
        let mut params = EffectParams::default();
        assert_eq!(params.set(EffectKind::Chorus, f32::NAN), 1.0);
    }

    #[test]
    fn indices_match_all_order() {
        for (i, kind) in EffectKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }
}
