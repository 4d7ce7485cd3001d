use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{MineError, Result};

/// An organism's metabolic model: the compounds it natively contains and the
/// reliability of each reaction operator for that organism.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetabolicModel {
    #[serde(rename = "_id")]
    pub id: String,
    /// Organism name, e.g. "Escherichia coli K-12 MG1655".
    #[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "Compound_ids", default)]
    pub parent_compound_ids: HashSet<String>,
    /// Operator id to reliability in `[0, 1]`.
    #[serde(rename = "Operators", default)]
    pub operator_reliability: HashMap<String, f64>,
}

impl MetabolicModel {
    pub fn new(
        id: impl Into<String>,
        parent_compound_ids: HashSet<String>,
        operator_reliability: HashMap<String, f64>,
    ) -> Self {
        MetabolicModel { id: id.into(), name: None, parent_compound_ids, operator_reliability }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Number of search terms naming this model: a term matches the id or a word of
    /// the organism name, ignoring case.
    pub fn match_score(&self, terms: &[&str]) -> usize {
        let words: Vec<String> = self
            .name
            .iter()
            .flat_map(|name| name.split(|c: char| !c.is_alphanumeric()))
            .filter(|word| !word.is_empty())
            .map(str::to_lowercase)
            .collect();
        terms
            .iter()
            .map(|term| term.to_lowercase())
            .filter(|term| term.eq_ignore_ascii_case(&self.id) || words.contains(term))
            .count()
    }

    pub fn contains_parent(&self, compound_id: &str) -> bool {
        self.parent_compound_ids.contains(compound_id)
    }

    /// Reliability of an operator; unknown operators are 0.
    pub fn reliability(&self, operator: &str) -> f64 {
        self.operator_reliability.get(operator).copied().unwrap_or(0.0)
    }

    /// Checks that every reliability lies in `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if let Some((op, r)) = self
            .operator_reliability
            .iter()
            .find(|(_, r)| !(0.0..=1.0).contains(*r))
        {
            return Err(MineError::invalid_input(format!(
                "model {}: reliability {r} of operator {op} is outside [0, 1]",
                self.id
            )));
        }
        Ok(())
    }
}
