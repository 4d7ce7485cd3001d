//! Candidate property filtering.
//!
//! Removes store hits whose chemistry or physical properties rule them out for a
//! peak: halogenated formulas, logP outside a range, or a Kovats retention index
//! interval that does not overlap the requested one.

use serde::{Deserialize, Serialize};

use crate::chemistry::formula::contains_halogen;
use crate::data::compound::CandidateCompound;

/// Property filter configuration for candidate compounds.
///
/// All ranges are inclusive. `None` disables a bound.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompoundFilter {
    // Keep halogenated formulas (Cl, Br, F)
    pub halogens: bool,

    // logP bounds
    pub logp_range: Option<(f64, f64)>,

    // Kovats retention index window, matched by interval overlap
    pub kovats_range: Option<(f64, f64)>,
}

impl CompoundFilter {
    /// Create a permissive filter that keeps every candidate.
    pub fn permissive() -> Self {
        Self { halogens: true, logp_range: None, kovats_range: None }
    }

    /// Check if a candidate passes all filter criteria.
    pub fn passes(&self, compound: &CandidateCompound) -> bool {
        if !self.halogens && contains_halogen(&compound.formula) {
            return false;
        }
        if let Some(range) = self.logp_range {
            if !logp_in_range(compound, range) {
                return false;
            }
        }
        if let Some(range) = self.kovats_range {
            if !kovats_overlaps(compound, range) {
                return false;
            }
        }
        true
    }

    /// Filter a list of candidates, returning only those that pass.
    pub fn filter(&self, compounds: Vec<CandidateCompound>) -> Vec<CandidateCompound> {
        compounds.into_iter().filter(|c| self.passes(c)).collect()
    }
}

/// True if the compound has a logP within `[lo, hi]`; compounds without logP fail.
pub fn logp_in_range(compound: &CandidateCompound, (lo, hi): (f64, f64)) -> bool {
    compound.logp.is_some_and(|logp| lo <= logp && logp <= hi)
}

/// True if the compound's Kovats interval overlaps `[lo, hi]`; compounds without one fail.
pub fn kovats_overlaps(compound: &CandidateCompound, (lo, hi): (f64, f64)) -> bool {
    compound.kovats.is_some_and(|(min, max)| min <= hi && max >= lo)
}
