//! Situation tracker - keeps the situation composition current.
//!
//! Signals reinforce the dimension their category maps to; once per turn
//! every dimension relaxes toward the baseline so nothing stays dominant
//! without fresh evidence.

use dialogue_state::{Dimension, SituationComposition};

use crate::config::SituationConfig;
use crate::signals::Signal;

/// Owns the situation composition of one conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct SituationTracker {
    composition: SituationComposition,
    baseline: SituationComposition,
    increment: f32,
    decay_fraction: f32,
}

impl SituationTracker {
    /// Create a tracker resting at the configured baseline.
    pub fn new(config: &SituationConfig) -> Self {
        let baseline = config.baseline_composition();
        Self {
            composition: baseline.clone(),
            baseline,
            increment: config.increment,
            decay_fraction: config.decay_fraction,
        }
    }

    /// Add a fixed increment per signal to its dimension, then renormalize.
    pub fn update(&mut self, signals: &[Signal]) {
        if signals.is_empty() {
            return;
        }
        let increments: Vec<(Dimension, f32)> = signals
            .iter()
            .map(|signal| (signal.dimension(), self.increment))
            .collect();
        self.composition.reinforce(&increments);
    }

    /// Relax toward the baseline. Runs once per turn whether or not `update` did.
    pub fn decay(&mut self) {
        self.composition.decay_toward(&self.baseline, self.decay_fraction);
    }

    /// Top `n` dimensions, descending, ties in table order.
    pub fn dominant(&self, n: usize) -> Vec<(Dimension, f32)> {
        self.composition.dominant(n)
    }

    pub fn composition(&self) -> &SituationComposition {
        &self.composition
    }

    pub fn get(&self, dimension: Dimension) -> f32 {
        self.composition.get(dimension)
    }

    /// Return to the baseline composition.
    pub fn reset(&mut self) {
        self.composition = self.baseline.clone();
    }
}
