//! Polyphony-aware master output gain.

use crate::MIN_GAIN;

/// Convert a linear gain to decibels, floored so silence maps to a large
/// negative number instead of `-inf` (the master fader must stay rampable).
pub fn gain_to_db(gain: f32) -> f32 {
    20.0 * gain.max(MIN_GAIN).log10()
}

/// Computes the master fader level from the externally supplied ceiling and
/// the number of simultaneously sounding touches. With scaling enabled, each
/// touch past the first backs the gain off by 5%, floored at 10% of the
/// ceiling, which keeps dense chords out of the limiter.
pub struct MasterGainController {
    ceiling: f32,
    scaling_enabled: bool,
    level_db: f32,
}

impl MasterGainController {
    pub fn new(ceiling: f32, scaling_enabled: bool) -> Self {
        let mut controller = Self {
            ceiling: ceiling.clamp(0.0, 1.0),
            scaling_enabled,
            level_db: 0.0,
        };
        controller.recompute(0);
        controller
    }

    pub fn set_ceiling(&mut self, ceiling: f32) {
        self.ceiling = ceiling.clamp(0.0, 1.0);
    }

    pub fn set_scaling_enabled(&mut self, enabled: bool) {
        self.scaling_enabled = enabled;
    }

    /// Recompute for the current active-touch count; returns the new fader
    /// level in decibels.
    pub fn recompute(&mut self, active_touches: usize) -> f32 {
        let mut gain = self.ceiling;
        if self.scaling_enabled && active_touches > 1 {
            let scale = 1.0 - (active_touches as f32 - 1.0) * 0.05;
            gain *= scale.max(0.1);
        }
        self.level_db = gain_to_db(gain);
        self.level_db
    }

    pub fn level_db(&self) -> f32 {
        self.level_db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_touches_scale_to_point_nine() {
        let mut master = MasterGainController::new(1.0, true);
        let db = master.recompute(3);
        let expected = 20.0 * 0.9_f32.log10();
        assert!((db - expected).abs() < 1e-4, "got {db}, want {expected}");
        assert!((db + 0.915).abs() < 1e-2);
    }

    #[test]
    fn single_touch_is_unscaled() {
        let mut master = MasterGainController::new(1.0, true);
        assert_eq!(master.recompute(1), 0.0);
    }

    #[test]
    fn scaling_floor_holds_at_ten_percent() {
        let mut master = MasterGainController::new(1.0, true);
        let db = master.recompute(100);
        let expected = 20.0 * 0.1_f32.log10();
        assert!((db - expected).abs() < 1e-4);
    }

    #[test]
    fn disabled_scaling_ignores_touch_count() {
        let mut master = MasterGainController::new(0.5, false);
        let alone = master.recompute(1);
        let crowded = master.recompute(8);
        assert_eq!(alone, crowded);
    }

    #[test]
    fn zero_ceiling_stays_finite() {
        let mut master = MasterGainController::new(0.0, true);
        let db = master.recompute(2);
        assert!(db.is_finite());
        assert!(db <= 20.0 * MIN_GAIN.log10() + 1e-4);
    }
}
