use std::collections::{HashMap, HashSet};

use crate::annotation::filter::{kovats_overlaps, logp_in_range};
use crate::chemistry::formula::looks_like_formula;
use crate::data::compound::{CandidateCompound, Fingerprint};
use crate::data::model::MetabolicModel;
use crate::error::{MineError, Result};

/// A neutral-mass window lookup with optional property predicates.
#[derive(Clone, Debug, PartialEq)]
pub struct MassQuery {
    pub min_mass: f64,
    pub max_mass: f64,
    pub charge: i32,
    pub logp_range: Option<(f64, f64)>,
    pub kovats_range: Option<(f64, f64)>,
}

impl MassQuery {
    pub fn new(min_mass: f64, max_mass: f64, charge: i32) -> Self {
        MassQuery { min_mass, max_mass, charge, logp_range: None, kovats_range: None }
    }

    /// True if a compound satisfies every predicate of this query.
    pub fn matches(&self, compound: &CandidateCompound) -> bool {
        self.min_mass <= compound.mass
            && compound.mass <= self.max_mass
            && compound.charge == self.charge
            && self.logp_range.is_none_or(|range| logp_in_range(compound, range))
            && self.kovats_range.is_none_or(|range| kovats_overlaps(compound, range))
    }
}

/// Most compounds a quick search returns.
pub const QUICK_SEARCH_LIMIT: usize = 500;

/// Record collections a store can list ids for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Collection {
    Compounds,
    Models,
}

impl std::str::FromStr for Collection {
    type Err = MineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "compounds" => Ok(Collection::Compounds),
            "models" => Ok(Collection::Models),
            _ => Err(MineError::invalid_input(format!("unknown collection {s:?}, use compounds or models"))),
        }
    }
}

/// Read access to a library of candidate compounds and metabolic models.
///
/// Implementations return compounds in a stable store order.
pub trait CompoundStore {
    /// Compounds inside the query's mass window with the requested charge.
    fn find_by_mass(&self, query: &MassQuery) -> Result<Vec<CandidateCompound>>;

    /// Compounds whose fingerprint cardinality lies in `[min, max]`.
    fn find_by_fingerprint_cardinality(&self, min: usize, max: usize) -> Result<Vec<CandidateCompound>>;

    /// Compounds whose fingerprint sets every bit of `bits`.
    fn find_by_fingerprint_superset(&self, bits: &Fingerprint) -> Result<Vec<CandidateCompound>>;

    fn metabolic_model(&self, id: &str) -> Result<Option<MetabolicModel>>;

    /// Compounds with the given ids in request order; unknown ids are skipped.
    fn compounds_by_ids(&self, ids: &[String]) -> Result<Vec<CandidateCompound>>;

    fn find_by_formula(&self, formula: &str) -> Result<Vec<CandidateCompound>>;

    /// Compounds with a name equal to `name`, ignoring case.
    fn find_by_name(&self, name: &str) -> Result<Vec<CandidateCompound>>;

    /// Ids of every record of a collection in store order.
    fn ids(&self, collection: Collection) -> Result<Vec<String>>;

    /// Resolves a user-supplied compound identifier: an id, then a formula, then a name.
    ///
    /// At most [`QUICK_SEARCH_LIMIT`] compounds are returned; no match is
    /// [`MineError::CompoundNotFound`].
    fn quick_search(&self, query: &str) -> Result<Vec<CandidateCompound>> {
        let query = query.trim();
        let mut hits = self.compounds_by_ids(&[query.to_string()])?;
        if hits.is_empty() && looks_like_formula(query) {
            hits = self.find_by_formula(query)?;
        }
        if hits.is_empty() {
            hits = self.find_by_name(query)?;
        }
        if hits.is_empty() {
            return Err(MineError::CompoundNotFound { query: query.to_string() });
        }
        hits.truncate(QUICK_SEARCH_LIMIT);
        Ok(hits)
    }

    /// Ids of the models named by whitespace-separated terms, best match first.
    fn model_search(&self, query: &str) -> Result<Vec<String>> {
        let terms: Vec<&str> = query.split_whitespace().collect();
        let mut scored = Vec::new();
        for id in self.ids(Collection::Models)? {
            if let Some(model) = self.metabolic_model(&id)? {
                let score = model.match_score(&terms);
                if score > 0 {
                    scored.push((score, id));
                }
            }
        }
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        Ok(scored.into_iter().map(|(_, id)| id).collect())
    }

    /// Union of the native compound ids of several models.
    fn model_compound_ids(&self, ids: &[String]) -> Result<HashSet<String>> {
        let mut native = HashSet::new();
        for id in ids {
            let model = self
                .metabolic_model(id)?
                .ok_or_else(|| MineError::UnknownModel { id: id.clone() })?;
            native.extend(model.parent_compound_ids);
        }
        Ok(native)
    }
}

/// A vector-backed compound store.
#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    compounds: Vec<CandidateCompound>,
    models: HashMap<String, MetabolicModel>,
}

impl InMemoryStore {
    pub fn new(compounds: Vec<CandidateCompound>) -> Self {
        InMemoryStore { compounds, models: HashMap::new() }
    }

    pub fn with_model(mut self, model: MetabolicModel) -> Self {
        self.add_model(model);
        self
    }

    pub fn insert(&mut self, compound: CandidateCompound) {
        self.compounds.push(compound);
    }

    pub fn add_model(&mut self, model: MetabolicModel) {
        self.models.insert(model.id.clone(), model);
    }

    pub fn len(&self) -> usize {
        self.compounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compounds.is_empty()
    }
}

impl CompoundStore for InMemoryStore {
    fn find_by_mass(&self, query: &MassQuery) -> Result<Vec<CandidateCompound>> {
        Ok(self.compounds.iter().filter(|c| query.matches(c)).cloned().collect())
    }

    fn find_by_fingerprint_cardinality(&self, min: usize, max: usize) -> Result<Vec<CandidateCompound>> {
        Ok(self
            .compounds
            .iter()
            .filter(|c| (min..=max).contains(&c.fingerprint_len()))
            .cloned()
            .collect())
    }

    fn find_by_fingerprint_superset(&self, bits: &Fingerprint) -> Result<Vec<CandidateCompound>> {
        Ok(self
            .compounds
            .iter()
            .filter(|c| c.fingerprint.contains_all(bits))
            .cloned()
            .collect())
    }

    fn metabolic_model(&self, id: &str) -> Result<Option<MetabolicModel>> {
        Ok(self.models.get(id).cloned())
    }

    fn compounds_by_ids(&self, ids: &[String]) -> Result<Vec<CandidateCompound>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.compounds.iter().find(|c| &c.id == id))
            .cloned()
            .collect())
    }

    fn find_by_formula(&self, formula: &str) -> Result<Vec<CandidateCompound>> {
        Ok(self.compounds.iter().filter(|c| c.formula == formula).cloned().collect())
    }

    fn find_by_name(&self, name: &str) -> Result<Vec<CandidateCompound>> {
        let name = name.to_lowercase();
        Ok(self
            .compounds
            .iter()
            .filter(|c| c.names.iter().any(|n| n.to_lowercase() == name))
            .cloned()
            .collect())
    }

    fn ids(&self, collection: Collection) -> Result<Vec<String>> {
        Ok(match collection {
            Collection::Compounds => self.compounds.iter().map(|c| c.id.clone()).collect(),
            Collection::Models => {
                let mut ids: Vec<String> = self.models.keys().cloned().collect();
                ids.sort();
                ids
            }
        })
    }
}
