//! Anti-teaming feedback model
//!
//! Mass moved between players (not passive growth or decay) feeds two
//! decaying accumulators. When their sum outgrows half the session's score
//! the ratio is published as a mass-decay multiplier the world applies.

use serde::{Deserialize, Serialize};

use crate::game::constants::anti_teaming::{EVENT_BASE_WEIGHT, MAX_RATIO, RETENTION, SCORE_EPSILON};

/// Direction of a player-attributable mass transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeamingEventKind {
    Loss,
    Gain,
}

/// Per-session teaming accumulators.
///
/// Invariants: both accumulators are non-negative, `decay_multiplier >= 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct AntiTeaming {
    loss: f32,
    gain: f32,
    decay_multiplier: f32,
}

impl AntiTeaming {
    pub fn new() -> Self {
        Self {
            loss: 0.0,
            gain: 0.0,
            decay_multiplier: 1.0,
        }
    }

    /// `min((loss + gain) / max(score / 2, eps), 2)`
    pub fn ratio(&self, score: u32) -> f32 {
        let half_score = (score as f32 / 2.0).max(SCORE_EPSILON);
        ((self.loss + self.gain) / half_score).min(MAX_RATIO)
    }

    /// Per-tick decay; runs whether or not event recording is enabled
    pub fn tick(&mut self, score: u32) {
        self.loss *= RETENTION;
        self.gain *= RETENTION;

        let ratio = self.ratio(score);
        if ratio > 1.0 {
            self.decay_multiplier = ratio;
        }
    }

    /// Record a transfer. The weight grows with the current ratio, so
    /// repeated transfers escalate faster.
    pub fn apply_event(&mut self, amount: f32, kind: TeamingEventKind, score: u32) {
        let weight = amount.max(0.0) * (EVENT_BASE_WEIGHT + self.ratio(score));
        match kind {
            TeamingEventKind::Loss => self.loss += weight,
            TeamingEventKind::Gain => self.gain += weight,
        }
    }

    #[inline]
    pub fn decay_multiplier(&self) -> f32 {
        self.decay_multiplier
    }

    #[inline]
    pub fn loss_accumulator(&self) -> f32 {
        self.loss
    }

    #[inline]
    pub fn gain_accumulator(&self) -> f32 {
        self.gain
    }
}

impl Default for AntiTeaming {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const EPSILON: f32 = 1e-4;

    #[test]
    fn test_starts_neutral() {
        let model = AntiTeaming::new();
        assert_eq!(model.decay_multiplier(), 1.0);
        assert_eq!(model.ratio(100), 0.0);
    }

    #[test]
    fn test_decay_rate() {
        let mut model = AntiTeaming::new();
        model.apply_event(100.0, TeamingEventKind::Loss, 1000);
        let before = model.loss_accumulator();
        model.tick(1000);
        assert!((model.loss_accumulator() - before * 0.997).abs() < EPSILON);
    }

    #[test]
    fn test_event_weight_uses_current_ratio() {
        let mut model = AntiTeaming::new();
        // ratio 0 -> weight = amount * 0.5
        model.apply_event(10.0, TeamingEventKind::Gain, 100);
        assert!((model.gain_accumulator() - 5.0).abs() < EPSILON);

        // ratio = 5 / 50 = 0.1 -> weight = 10 * 0.6
        model.apply_event(10.0, TeamingEventKind::Loss, 100);
        assert!((model.loss_accumulator() - 6.0).abs() < EPSILON);
    }

    #[test]
    fn test_multiplier_raised_above_one() {
        let mut model = AntiTeaming::new();
        // 150 weight against half-score 50 -> ratio capped at 2
        model.apply_event(300.0, TeamingEventKind::Gain, 100);
        model.tick(100);
        assert!((model.decay_multiplier() - MAX_RATIO).abs() < EPSILON);
    }

    #[test]
    fn test_multiplier_not_lowered_when_ratio_small() {
        let mut model = AntiTeaming::new();
        model.apply_event(300.0, TeamingEventKind::Gain, 100);
        model.tick(100);
        let raised = model.decay_multiplier();

        // A much larger score drops the ratio under 1; the multiplier stays put
        model.tick(1_000_000);
        assert_eq!(model.decay_multiplier(), raised);
    }

    #[test]
    fn test_multiplier_overwritten_by_lower_ratio_above_one() {
        let mut model = AntiTeaming::new();
        model.apply_event(300.0, TeamingEventKind::Gain, 100);
        model.tick(100);
        assert!((model.decay_multiplier() - 2.0).abs() < EPSILON);

        // gain ~149.55 against half-score 100 -> ratio ~1.5
        model.tick(200);
        let expected = model.gain_accumulator() / 100.0;
        assert!((model.decay_multiplier() - expected).abs() < EPSILON);
        assert!(model.decay_multiplier() < 2.0 && model.decay_multiplier() > 1.0);
    }

    #[test]
    fn test_zero_score_does_not_divide_by_zero() {
        let mut model = AntiTeaming::new();
        model.tick(0);
        assert_eq!(model.decay_multiplier(), 1.0);

        model.apply_event(1.0, TeamingEventKind::Loss, 0);
        model.tick(0);
        assert!(model.decay_multiplier().is_finite());
        assert_eq!(model.decay_multiplier(), MAX_RATIO);
    }

    #[test]
    fn test_negative_amount_ignored() {
        let mut model = AntiTeaming::new();
        model.apply_event(-50.0, TeamingEventKind::Loss, 10);
        assert_eq!(model.loss_accumulator(), 0.0);
    }

    #[test]
    fn test_multiplier_never_below_one_random_history() {
        let mut rng = StdRng::seed_from_u64(0x7ea5);
        let mut model = AntiTeaming::new();

        for _ in 0..10_000 {
            let score = rng.gen_range(0..5_000);
            if rng.gen_bool(0.2) {
                let kind = if rng.gen_bool(0.5) {
                    TeamingEventKind::Loss
                } else {
                    TeamingEventKind::Gain
                };
                model.apply_event(rng.gen_range(-10.0..500.0), kind, score);
            }
            model.tick(score);
            assert!(model.decay_multiplier() >= 1.0);
            assert!(model.loss_accumulator() >= 0.0 && model.gain_accumulator() >= 0.0);
        }
    }
}
