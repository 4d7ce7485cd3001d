//! Ranking of the isomers proposed for each formula.
//!
//! Isomers whose id belongs to a known (target) peak come first, then compounds
//! native to the searched models, then the remaining predicted products.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::data::compound::AnnotationResult;
use crate::data::peak::Peak;

/// A peak whose identity is already established, or at least targeted.
#[derive(Clone, Debug, PartialEq)]
pub struct KnownPeak {
    /// Peak with the formula proposed for it already recorded under its adduct.
    pub peak: Peak,
    /// Compound the peak is known to be.
    pub compound_id: Option<String>,
}

/// Ids of the compounds named by known peaks.
pub fn known_compound_ids(known: &[KnownPeak]) -> HashSet<String> {
    known.iter().filter_map(|k| k.compound_id.clone()).collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum IsomerRank {
    Known,
    Native,
    Other,
}

impl IsomerRank {
    pub fn of(compound_id: &str, known: &HashSet<String>, native: &HashSet<String>) -> Self {
        if known.contains(compound_id) {
            IsomerRank::Known
        } else if native.contains(compound_id) {
            IsomerRank::Native
        } else {
            IsomerRank::Other
        }
    }
}

/// The isomers of one formula split by rank, each group best first.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RankedIsomers {
    pub formula: String,
    pub known: Vec<AnnotationResult>,
    pub native: Vec<AnnotationResult>,
    pub other: Vec<AnnotationResult>,
}

impl RankedIsomers {
    pub fn len(&self) -> usize {
        self.known.len() + self.native.len() + self.other.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Isomers in rank order.
    pub fn iter(&self) -> impl Iterator<Item = &AnnotationResult> {
        self.known.iter().chain(&self.native).chain(&self.other)
    }
}

/// Higher likelihood first, then higher spectral score, then id.
fn by_relevance(a: &AnnotationResult, b: &AnnotationResult) -> Ordering {
    let likelihood = |r: &AnnotationResult| r.likelihood_score.unwrap_or(f64::NEG_INFINITY);
    likelihood(b)
        .total_cmp(&likelihood(a))
        .then_with(|| b.spectral_score.cmp(&a.spectral_score))
        .then_with(|| a.compound.id.cmp(&b.compound.id))
}

/// Groups search results by formula and ranks each group.
///
/// A compound explaining several peaks or adducts is listed once per formula, with
/// its first result. Groups are ordered by formula.
pub fn rank_isomers(
    results: &[AnnotationResult],
    known: &HashSet<String>,
    native: &HashSet<String>,
) -> Vec<RankedIsomers> {
    let mut groups: BTreeMap<&str, (HashSet<&str>, RankedIsomers)> = BTreeMap::new();
    for result in results {
        let formula = result.compound.formula.as_str();
        let (seen, ranked) = groups.entry(formula).or_insert_with(|| {
            (HashSet::new(), RankedIsomers { formula: formula.to_string(), ..Default::default() })
        });
        if !seen.insert(result.compound.id.as_str()) {
            continue;
        }
        let bucket = match IsomerRank::of(&result.compound.id, known, native) {
            IsomerRank::Known => &mut ranked.known,
            IsomerRank::Native => &mut ranked.native,
            IsomerRank::Other => &mut ranked.other,
        };
        bucket.push(result.clone());
    }

    groups
        .into_values()
        .map(|(_, mut ranked)| {
            ranked.known.sort_by(by_relevance);
            ranked.native.sort_by(by_relevance);
            ranked.other.sort_by(by_relevance);
            ranked
        })
        .collect()
}
