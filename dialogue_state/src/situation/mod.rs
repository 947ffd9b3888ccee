//! Situation composition - which kind of conversational work dominates.
//!
//! The composition is a weight per [`Dimension`]. Every mutation renormalizes,
//! so the weights always sum to 1 (within [`NORMALIZATION_TOLERANCE`]) and are
//! never negative.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Allowed deviation of the weight sum from 1.0.
pub const NORMALIZATION_TOLERANCE: f32 = 1e-3;

/// The eight fixed situation dimensions, in table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Discovery,
    Assessment,
    Analysis,
    Recommendation,
    Feasibility,
    Clarification,
    Validation,
    Meta,
}

impl Dimension {
    pub const COUNT: usize = 8;

    pub const ALL: [Dimension; Dimension::COUNT] = [
        Dimension::Discovery,
        Dimension::Assessment,
        Dimension::Analysis,
        Dimension::Recommendation,
        Dimension::Feasibility,
        Dimension::Clarification,
        Dimension::Validation,
        Dimension::Meta,
    ];

    /// Position of this dimension in table order.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Dimension::Discovery => "discovery",
            Dimension::Assessment => "assessment",
            Dimension::Analysis => "analysis",
            Dimension::Recommendation => "recommendation",
            Dimension::Feasibility => "feasibility",
            Dimension::Clarification => "clarification",
            Dimension::Validation => "validation",
            Dimension::Meta => "meta",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Dimension::ALL
            .into_iter()
            .find(|d| d.name() == wanted)
            .ok_or_else(|| format!("unknown situation dimension: {}", s))
    }
}

/// Per-dimension weights, e.g. an action's situation affinity.
pub type DimensionWeights = BTreeMap<Dimension, f32>;

/// Normalized weight vector over the eight dimensions.
///
/// Serialized as a dimension-keyed map; deserialized input is renormalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "DimensionWeights", into = "DimensionWeights")]
pub struct SituationComposition {
    weights: [f32; Dimension::COUNT],
}

impl Default for SituationComposition {
    fn default() -> Self {
        Self::uniform()
    }
}

impl From<DimensionWeights> for SituationComposition {
    fn from(weights: DimensionWeights) -> Self {
        Self::from_weights(&weights)
    }
}

impl From<SituationComposition> for DimensionWeights {
    fn from(composition: SituationComposition) -> Self {
        composition.to_map()
    }
}

impl SituationComposition {
    /// Equal weight on every dimension.
    pub fn uniform() -> Self {
        Self {
            weights: [1.0 / Dimension::COUNT as f32; Dimension::COUNT],
        }
    }

    /// Build from raw weights (missing dimensions count as zero), then normalize.
    pub fn from_weights(weights: &DimensionWeights) -> Self {
        let mut composition = Self {
            weights: [0.0; Dimension::COUNT],
        };
        for (dimension, weight) in weights {
            composition.weights[dimension.index()] = *weight;
        }
        composition.normalize();
        composition
    }

    /// Weight of one dimension.
    pub fn get(&self, dimension: Dimension) -> f32 {
        self.weights[dimension.index()]
    }

    /// Iterate `(dimension, weight)` in table order.
    pub fn iter(&self) -> impl Iterator<Item = (Dimension, f32)> + '_ {
        Dimension::ALL.into_iter().map(|d| (d, self.weights[d.index()]))
    }

    pub fn sum(&self) -> f32 {
        self.weights.iter().sum()
    }

    /// Check the sum and non-negativity invariants.
    pub fn is_normalized(&self) -> bool {
        (self.sum() - 1.0).abs() <= NORMALIZATION_TOLERANCE && self.weights.iter().all(|w| *w >= 0.0)
    }

    /// Add every increment, then renormalize once.
    pub fn reinforce(&mut self, increments: &[(Dimension, f32)]) {
        for (dimension, amount) in increments {
            self.weights[dimension.index()] += amount.max(0.0);
        }
        self.normalize();
    }

    /// Move every dimension `fraction` of the distance toward `baseline`, then renormalize.
    pub fn decay_toward(&mut self, baseline: &SituationComposition, fraction: f32) {
        let fraction = fraction.clamp(0.0, 1.0);
        for (weight, target) in self.weights.iter_mut().zip(baseline.weights.iter()) {
            *weight += fraction * (target - *weight);
        }
        self.normalize();
    }

    /// Top `n` dimensions by weight, descending. Ties keep table order.
    pub fn dominant(&self, n: usize) -> Vec<(Dimension, f32)> {
        let mut ranked: Vec<_> = self.iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(n);
        ranked
    }

    /// Dot product with a sparse weight map.
    pub fn dot(&self, weights: &DimensionWeights) -> f32 {
        weights
            .iter()
            .map(|(dimension, weight)| self.get(*dimension) * weight)
            .sum()
    }

    /// Export as a map keyed by dimension.
    pub fn to_map(&self) -> DimensionWeights {
        self.iter().collect()
    }

    fn normalize(&mut self) {
        for weight in self.weights.iter_mut() {
            if !weight.is_finite() || *weight < 0.0 {
                *weight = 0.0;
            }
        }

        let total: f32 = self.weights.iter().sum();
        if total <= f32::EPSILON {
            *self = Self::uniform();
            return;
        }

        for weight in self.weights.iter_mut() {
            *weight /= total;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_deserialized_weights_are_normalized() {
        let composition: SituationComposition =
            serde_json::from_str(r#"{"discovery": 2.0, "meta": 2.0, "analysis": -1.0}"#).unwrap();
        assert!(composition.is_normalized());
        assert!((composition.get(Dimension::Discovery) - 0.5).abs() < 1e-6);
        assert_eq!(composition.get(Dimension::Analysis), 0.0);

        let json = serde_json::to_value(&composition).unwrap();
        assert_eq!(json["meta"], serde_json::json!(0.5));
        let empty: SituationComposition = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, SituationComposition::uniform());
    }

    #[test]
    fn test_uniform_is_normalized() {
        let composition = SituationComposition::uniform();
        assert!(composition.is_normalized());
        assert!((composition.get(Dimension::Meta) - 0.125).abs() < 1e-6);
    }

    #[test]
    fn test_dimension_parse_and_order() {
        assert_eq!("Clarification".parse::<Dimension>(), Ok(Dimension::Clarification));
        assert!("vibes".parse::<Dimension>().is_err());
        assert_eq!(Dimension::Meta.index(), 7);
        assert!(Dimension::Discovery < Dimension::Assessment);
    }

    #[test]
    fn test_from_weights_normalizes() {
        let mut weights = DimensionWeights::new();
        weights.insert(Dimension::Discovery, 3.0);
        weights.insert(Dimension::Assessment, 1.0);

        let composition = SituationComposition::from_weights(&weights);
        assert!(composition.is_normalized());
        assert!((composition.get(Dimension::Discovery) - 0.75).abs() < 1e-6);
        assert_eq!(composition.get(Dimension::Meta), 0.0);
    }

    #[test]
    fn test_from_empty_weights_falls_back_to_uniform() {
        let composition = SituationComposition::from_weights(&DimensionWeights::new());
        assert_eq!(composition, SituationComposition::uniform());
    }

    #[test]
    fn test_reinforce_raises_dimension() {
        let mut composition = SituationComposition::uniform();
        let before = composition.get(Dimension::Clarification);

        composition.reinforce(&[(Dimension::Clarification, 0.2)]);

        assert!(composition.get(Dimension::Clarification) > before);
        assert!(composition.get(Dimension::Discovery) < 0.125);
        assert!(composition.is_normalized());
    }

    #[test]
    fn test_decay_moves_toward_baseline() {
        let mut weights = DimensionWeights::new();
        weights.insert(Dimension::Meta, 1.0);
        let mut composition = SituationComposition::from_weights(&weights);
        let baseline = SituationComposition::uniform();

        composition.decay_toward(&baseline, 0.1);

        assert!((composition.get(Dimension::Meta) - 0.9125).abs() < 1e-4);
        assert!((composition.get(Dimension::Discovery) - 0.0125).abs() < 1e-4);
        assert!(composition.is_normalized());
    }

    #[test]
    fn test_dominant_tie_break_uses_table_order() {
        let composition = SituationComposition::uniform();
        let top = composition.dominant(3);
        assert_eq!(
            top.iter().map(|(d, _)| *d).collect::<Vec<_>>(),
            vec![Dimension::Discovery, Dimension::Assessment, Dimension::Analysis]
        );
    }

    #[test]
    fn test_dominant_descending() {
        let mut composition = SituationComposition::uniform();
        composition.reinforce(&[(Dimension::Validation, 0.5), (Dimension::Analysis, 0.2)]);

        let top = composition.dominant(2);
        assert_eq!(top[0].0, Dimension::Validation);
        assert_eq!(top[1].0, Dimension::Analysis);
        assert!(top[0].1 >= top[1].1);
    }

    #[test]
    fn test_dot_product() {
        let composition = SituationComposition::uniform();
        let mut affinity = DimensionWeights::new();
        affinity.insert(Dimension::Assessment, 0.8);
        affinity.insert(Dimension::Analysis, 0.4);

        assert!((composition.dot(&affinity) - 0.15).abs() < 1e-6);
    }

    fn dimension_strategy() -> impl Strategy<Value = Dimension> {
        (0..Dimension::COUNT).prop_map(|i| Dimension::ALL[i])
    }

    proptest! {
        #[test]
        fn prop_mutations_keep_composition_normalized(
            steps in proptest::collection::vec(
                (proptest::collection::vec((dimension_strategy(), 0.0f32..2.0), 0..6), 0.0f32..1.0),
                1..40,
            )
        ) {
            let baseline = SituationComposition::uniform();
            let mut composition = SituationComposition::uniform();

            for (increments, fraction) in steps {
                composition.reinforce(&increments);
                prop_assert!(composition.is_normalized());

                composition.decay_toward(&baseline, fraction);
                prop_assert!(composition.is_normalized());
            }
        }
    }
}
