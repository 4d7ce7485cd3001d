use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::compound::{CandidateCompound, Fingerprint};
use crate::error::{MineError, Result};
use crate::store::CompoundStore;

/// Slack absorbing the rounding of `t * q` and `q / t` in floating point.
const BOUND_EPSILON: f64 = 1e-9;

/// cardinality window a candidate fingerprint must fall into to reach a Tanimoto
/// coefficient of at least `min_tc` with a query of `query_cardinality` bits
///
/// Arguments:
///
/// * `query_cardinality` - number of set bits in the query fingerprint
/// * `min_tc` - minimum Tanimoto coefficient in `(0, 1]`
///
/// Returns:
///
/// * `(usize, usize)` - inclusive integer bounds `[ceil(t * q), floor(q / t)]`
///
/// # Examples
///
/// ```
/// use minecore::algorithm::similarity::tanimoto_bounds;
///
/// assert_eq!(tanimoto_bounds(20, 0.9).unwrap(), (18, 22));
/// // 7 / 0.14 rounds to 49.99999999999999
/// assert_eq!(tanimoto_bounds(7, 0.14).unwrap(), (1, 50));
/// ```
pub fn tanimoto_bounds(query_cardinality: usize, min_tc: f64) -> Result<(usize, usize)> {
    if !(min_tc > 0.0 && min_tc <= 1.0) {
        return Err(MineError::invalid_input(format!(
            "minimum Tanimoto coefficient must lie in (0, 1], got {min_tc}"
        )));
    }
    Ok(cardinality_window(query_cardinality, min_tc))
}

fn cardinality_window(query_cardinality: usize, min_tc: f64) -> (usize, usize) {
    let q = query_cardinality as f64;
    let lo = (min_tc * q - BOUND_EPSILON).ceil().max(0.0) as usize;
    let hi = (q / min_tc + BOUND_EPSILON).floor() as usize;
    (lo, hi)
}

/// Bookkeeping of one pruned similarity search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneStats {
    /// Compounds returned by the store for the cardinality window.
    pub candidates: usize,
    /// Candidates discarded by the cardinality bound without an exact comparison.
    pub pruned: usize,
    /// Exact Tanimoto computations performed.
    pub exact_comparisons: usize,
    pub accepted: usize,
}

/// Outcome of a pruned structure search.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SimilarityHits {
    pub compounds: Vec<(CandidateCompound, f64)>,
    pub stats: PruneStats,
}

/// Finds compounds similar to a query fingerprint, skipping exact comparisons for
/// candidates whose cardinality alone rules them out.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimilarityPruner {
    min_tc: f64,
    limit: Option<usize>,
}

impl SimilarityPruner {
    pub fn new(min_tc: f64, limit: Option<usize>) -> Result<Self> {
        tanimoto_bounds(0, min_tc)?;
        Ok(SimilarityPruner { min_tc, limit })
    }

    pub fn min_tc(&self) -> f64 {
        self.min_tc
    }

    /// Cardinality window for a query, see [`tanimoto_bounds`].
    pub fn bounds(&self, query_cardinality: usize) -> (usize, usize) {
        cardinality_window(query_cardinality, self.min_tc)
    }

    /// True if a candidate cardinality can still reach the threshold.
    pub fn admits(&self, query_cardinality: usize, candidate_cardinality: usize) -> bool {
        let (lo, hi) = self.bounds(query_cardinality);
        (lo..=hi).contains(&candidate_cardinality)
    }

    /// Runs the pruned search against a store.
    ///
    /// Candidates are visited in store order and the search stops once `limit`
    /// compounds were accepted.
    pub fn search<S: CompoundStore + ?Sized>(
        &self,
        store: &S,
        query: &Fingerprint,
    ) -> Result<SimilarityHits> {
        let q = query.cardinality();
        let (lo, hi) = self.bounds(q);
        let candidates = store.find_by_fingerprint_cardinality(lo, hi)?;

        let mut hits = SimilarityHits::default();
        hits.stats.candidates = candidates.len();

        for candidate in candidates {
            if self.limit.is_some_and(|limit| hits.compounds.len() >= limit) {
                break;
            }
            if !self.admits(q, candidate.fingerprint_len()) {
                hits.stats.pruned += 1;
                continue;
            }
            hits.stats.exact_comparisons += 1;
            let tc = query.tanimoto(&candidate.fingerprint);
            if tc >= self.min_tc {
                hits.compounds.push((candidate, tc));
            }
        }
        hits.stats.accepted = hits.compounds.len();

        debug!(
            query_bits = q,
            lower = lo,
            upper = hi,
            candidates = hits.stats.candidates,
            pruned = hits.stats.pruned,
            exact = hits.stats.exact_comparisons,
            accepted = hits.stats.accepted,
            "similarity search"
        );
        Ok(hits)
    }
}

/// Confirms a substructure match that passed the fingerprint screen.
pub trait SubstructureMatcher {
    fn has_substructure(&self, candidate: &CandidateCompound, query: &Fingerprint) -> bool;
}

/// Accepts every candidate that passed the fingerprint screen.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScreenOnly;

impl SubstructureMatcher for ScreenOnly {
    fn has_substructure(&self, _candidate: &CandidateCompound, _query: &Fingerprint) -> bool {
        true
    }
}

/// Substructure search: candidates whose fingerprint covers every query bit, then
/// confirmed by `matcher`, up to `limit` results in store order.
pub fn substructure_search<S, M>(
    store: &S,
    query: &Fingerprint,
    limit: Option<usize>,
    matcher: &M,
) -> Result<Vec<CandidateCompound>>
where
    S: CompoundStore + ?Sized,
    M: SubstructureMatcher + ?Sized,
{
    let screened = store.find_by_fingerprint_superset(query)?;
    let screened_len = screened.len();

    let mut hits = Vec::new();
    for candidate in screened {
        if limit.is_some_and(|limit| hits.len() >= limit) {
            break;
        }
        if candidate.fingerprint.contains_all(query) && matcher.has_substructure(&candidate, query) {
            hits.push(candidate);
        }
    }

    debug!(query_bits = query.cardinality(), screened = screened_len, accepted = hits.len(), "substructure search");
    Ok(hits)
}
