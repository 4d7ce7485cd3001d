use serde::{Deserialize, Serialize};

use crate::chemistry::constants::{DEFAULT_PARENT_FRAC, DEFAULT_REACTION_FRAC};
use crate::data::compound::{AnnotationResult, CandidateCompound};
use crate::data::model::MetabolicModel;

/// Weights of the two relevance components.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelevanceWeights {
    /// Credit for a compound that is, or derives from, a native compound of the model.
    pub parent_frac: f64,
    /// Credit scaled by the reliability of the reaction operators along a route.
    pub reaction_frac: f64,
}

impl Default for RelevanceWeights {
    fn default() -> Self {
        RelevanceWeights { parent_frac: DEFAULT_PARENT_FRAC, reaction_frac: DEFAULT_REACTION_FRAC }
    }
}

/// likelihood that a compound is produced by the organism described by `model`
///
/// Arguments:
///
/// * `compound` - candidate compound with its provenance routes
/// * `model` - metabolic model of the organism
/// * `weights` - parent and reaction weights
///
/// Returns:
///
/// * `f64` - `parent + reaction` for native compounds, `reaction` for other reference
///   compounds, otherwise the best route score where a route earns `reaction` times the
///   product of its operator reliabilities plus `parent` if its parent is native
///
/// Only the immediate parent of each route is considered.
///
/// # Examples
///
/// ```
/// use std::collections::{HashMap, HashSet};
/// use minecore::algorithm::relevance::{score_compound, RelevanceWeights};
/// use minecore::data::compound::{CandidateCompound, Source};
/// use minecore::data::model::MetabolicModel;
///
/// let model = MetabolicModel::new(
///     "eco",
///     HashSet::from(["P".to_string()]),
///     HashMap::from([("op1".to_string(), 0.8)]),
/// );
/// let mut compound = CandidateCompound::new("X", "C6H12O6", 180.0633);
/// compound.generation = 1;
/// compound.sources = vec![Source::new("P", vec!["op1".to_string()])];
///
/// let score = score_compound(&compound, &model, &RelevanceWeights::default());
/// assert!((score - 0.95).abs() < 1e-12);
/// ```
pub fn score_compound(
    compound: &CandidateCompound,
    model: &MetabolicModel,
    weights: &RelevanceWeights,
) -> f64 {
    if model.contains_parent(&compound.id) {
        return weights.parent_frac + weights.reaction_frac;
    }
    if compound.generation == 0 {
        return weights.reaction_frac;
    }

    compound
        .sources
        .iter()
        .map(|source| {
            let reliability: f64 = source.operators.iter().map(|op| model.reliability(op)).product();
            let mut route = weights.reaction_frac * reliability;
            if model.contains_parent(&source.compound_id) {
                route += weights.parent_frac;
            }
            route
        })
        .fold(0.0, f64::max)
}

/// Attaches a likelihood score to every result.
pub fn score_compounds(
    results: &mut [AnnotationResult],
    model: &MetabolicModel,
    weights: &RelevanceWeights,
) {
    for result in results.iter_mut() {
        result.likelihood_score = Some(score_compound(&result.compound, model, weights));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::compound::Source;
    use std::collections::{HashMap, HashSet};

    fn model() -> MetabolicModel {
        MetabolicModel::new(
            "eco",
            HashSet::from(["P".to_string(), "Q".to_string()]),
            HashMap::from([("op1".to_string(), 0.8), ("op2".to_string(), 0.5)]),
        )
    }

    fn predicted(sources: Vec<Source>) -> CandidateCompound {
        let mut c = CandidateCompound::new("X", "C6H12O6", 180.0633);
        c.generation = 1;
        c.sources = sources;
        c
    }

    #[test]
    fn test_native_compound() {
        let w = RelevanceWeights::default();
        let mut c = CandidateCompound::new("P", "C6H12O6", 180.0633);
        c.generation = 3;
        assert_eq!(score_compound(&c, &model(), &w), 1.0);
    }

    #[test]
    fn test_reference_compound_outside_model() {
        let c = CandidateCompound::new("Z", "C6H12O6", 180.0633);
        assert_eq!(score_compound(&c, &model(), &RelevanceWeights::default()), 0.25);
    }

    #[test]
    fn test_route_from_native_parent() {
        let c = predicted(vec![Source::new("P", vec!["op1".to_string()])]);
        assert!((score_compound(&c, &model(), &RelevanceWeights::default()) - 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_operator_zeroes_route() {
        let c = predicted(vec![Source::new("R", vec!["op1".to_string(), "op9".to_string()])]);
        assert_eq!(score_compound(&c, &model(), &RelevanceWeights::default()), 0.0);
    }

    #[test]
    fn test_best_route_wins() {
        let c = predicted(vec![
            Source::new("R", vec!["op1".to_string()]),
            Source::new("Q", vec!["op1".to_string(), "op2".to_string()]),
        ]);
        let score = score_compound(&c, &model(), &RelevanceWeights::default());
        assert!((score - (0.75 + 0.25 * 0.4)).abs() < 1e-12);
    }

    #[test]
    fn test_predicted_without_sources() {
        let c = predicted(Vec::new());
        assert_eq!(score_compound(&c, &model(), &RelevanceWeights::default()), 0.0);
    }

    #[test]
    fn test_scores_are_bounded() {
        let w = RelevanceWeights::default();
        let c = predicted(vec![Source::new("P", Vec::new())]);
        let score = score_compound(&c, &model(), &w);
        assert!((0.0..=w.parent_frac + w.reaction_frac).contains(&score));
    }

    #[test]
    fn test_score_compounds_attaches_scores() {
        let compound = predicted(vec![Source::new("P", vec!["op2".to_string()])]);
        let mut results = vec![AnnotationResult::from_compound(compound)];
        score_compounds(&mut results, &model(), &RelevanceWeights::default());
        assert!((results[0].likelihood_score.unwrap() - 0.875).abs() < 1e-12);
    }
}
