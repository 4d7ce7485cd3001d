use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::spectrum::MzSpectrum;

/// One provenance route: a parent compound and the reaction operators applied to it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "Compound")]
    pub compound_id: String,
    #[serde(rename = "Operators", default)]
    pub operators: Vec<String>,
}

impl Source {
    pub fn new(compound_id: impl Into<String>, operators: Vec<String>) -> Self {
        Source { compound_id: compound_id.into(), operators }
    }
}

/// A structural fingerprint stored as a sorted set of on-bit positions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<u32>", into = "Vec<u32>")]
pub struct Fingerprint {
    bits: Vec<u32>,
}

impl Fingerprint {
    /// Creates a fingerprint from bit positions; duplicates are collapsed.
    ///
    /// # Examples
    ///
    /// ```
    /// use minecore::data::compound::Fingerprint;
    ///
    /// let fp = Fingerprint::new(vec![9, 1, 5, 5]);
    /// assert_eq!(fp.bits(), &[1, 5, 9]);
    /// assert_eq!(fp.cardinality(), 3);
    /// ```
    pub fn new(mut bits: Vec<u32>) -> Self {
        bits.sort_unstable();
        bits.dedup();
        Fingerprint { bits }
    }

    pub fn bits(&self) -> &[u32] {
        &self.bits
    }

    /// Number of set bits.
    pub fn cardinality(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Size of the intersection with another fingerprint.
    pub fn intersection_len(&self, other: &Fingerprint) -> usize {
        let (mut i, mut j, mut count) = (0, 0, 0);
        while i < self.bits.len() && j < other.bits.len() {
            match self.bits[i].cmp(&other.bits[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    count += 1;
                    i += 1;
                    j += 1;
                }
            }
        }
        count
    }

    /// Tanimoto coefficient |A ∩ B| / |A ∪ B|; two empty fingerprints score 0.
    pub fn tanimoto(&self, other: &Fingerprint) -> f64 {
        let shared = self.intersection_len(other);
        let union = self.cardinality() + other.cardinality() - shared;
        if union == 0 {
            0.0
        } else {
            shared as f64 / union as f64
        }
    }

    /// True if every bit of `other` is also set here.
    pub fn contains_all(&self, other: &Fingerprint) -> bool {
        self.intersection_len(other) == other.cardinality()
    }
}

impl From<Vec<u32>> for Fingerprint {
    fn from(bits: Vec<u32>) -> Self {
        Fingerprint::new(bits)
    }
}

impl From<Fingerprint> for Vec<u32> {
    fn from(fp: Fingerprint) -> Self {
        fp.bits
    }
}

/// A known or predicted compound record held by a compound store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateCompound {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "Formula")]
    pub formula: String,
    #[serde(rename = "Mass")]
    pub mass: f64,
    #[serde(rename = "Charge", default)]
    pub charge: i32,
    #[serde(rename = "Generation", default)]
    pub generation: u32,
    #[serde(rename = "Sources", default)]
    pub sources: Vec<Source>,
    #[serde(rename = "SMILES", default, skip_serializing_if = "Option::is_none")]
    pub smiles: Option<String>,
    #[serde(rename = "Names", default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
    #[serde(rename = "logP", default, skip_serializing_if = "Option::is_none")]
    pub logp: Option<f64>,
    /// Kovats retention index range `(min, max)`.
    #[serde(rename = "Kovats", default, skip_serializing_if = "Option::is_none")]
    pub kovats: Option<(f64, f64)>,
    #[serde(rename = "RDKit_fp", default, skip_serializing_if = "Fingerprint::is_empty")]
    pub fingerprint: Fingerprint,
    /// Predicted fragment spectra keyed by fragmentation energy level.
    #[serde(rename = "Spectra", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reference_spectra: BTreeMap<u32, MzSpectrum>,
}

impl CandidateCompound {
    pub fn new(id: impl Into<String>, formula: impl Into<String>, mass: f64) -> Self {
        CandidateCompound {
            id: id.into(),
            formula: formula.into(),
            mass,
            ..Default::default()
        }
    }

    /// Cardinality of the fingerprint, the `len_RDKit_fp` of a stored record.
    pub fn fingerprint_len(&self) -> usize {
        self.fingerprint.cardinality()
    }

    pub fn reference_spectrum(&self, energy_level: u32) -> Option<&MzSpectrum> {
        self.reference_spectra.get(&energy_level)
    }

    /// Display name: the first common name, or the id.
    pub fn display_name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(self.id.as_str())
    }
}

/// Output view of a compound with the annotations attached by a search.
///
/// The fingerprint is never serialized and reference spectra are dropped before a
/// result leaves the engine.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnnotationResult {
    #[serde(flatten)]
    pub compound: CandidateCompound,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adduct: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_name: Option<String>,
    #[serde(rename = "Spectral_score", skip_serializing_if = "Option::is_none")]
    pub spectral_score: Option<u32>,
    #[serde(rename = "Likelihood_score", skip_serializing_if = "Option::is_none")]
    pub likelihood_score: Option<f64>,
}

impl AnnotationResult {
    /// Copies a compound into a result annotated with the adduct and peak it explains.
    pub fn annotated(compound: &CandidateCompound, adduct: &str, peak_name: &str) -> Self {
        AnnotationResult {
            compound: compound.clone(),
            adduct: Some(adduct.to_string()),
            peak_name: Some(peak_name.to_string()),
            spectral_score: None,
            likelihood_score: None,
        }
    }

    /// Wraps a structure-search hit, stripping the fingerprint and spectra.
    pub fn from_compound(compound: CandidateCompound) -> Self {
        let mut result = AnnotationResult {
            compound,
            adduct: None,
            peak_name: None,
            spectral_score: None,
            likelihood_score: None,
        };
        result.strip();
        result
    }

    /// Removes bulky fields that are not part of the result payload.
    pub fn strip(&mut self) {
        self.compound.fingerprint = Fingerprint::default();
        self.compound.reference_spectra.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tanimoto() {
        let a = Fingerprint::new(vec![1, 2, 3, 4]);
        let b = Fingerprint::new(vec![3, 4, 5, 6]);
        assert_eq!(a.intersection_len(&b), 2);
        assert!((a.tanimoto(&b) - 2.0 / 6.0).abs() < 1e-12);
        assert_eq!(a.tanimoto(&a), 1.0);
        assert_eq!(Fingerprint::default().tanimoto(&Fingerprint::default()), 0.0);
    }

    #[test]
    fn test_contains_all() {
        let a = Fingerprint::new(vec![1, 2, 3, 4]);
        assert!(a.contains_all(&Fingerprint::new(vec![2, 4])));
        assert!(!a.contains_all(&Fingerprint::new(vec![2, 5])));
        assert!(a.contains_all(&Fingerprint::default()));
    }

    #[test]
    fn test_compound_from_store_json() {
        let json = r#"{
            "_id": "Cabc", "Formula": "C6H12O6", "Mass": 180.0633, "Charge": 0,
            "Generation": 1, "Sources": [{"Compound": "Cparent", "Operators": ["2.7.1.a"]}],
            "RDKit_fp": [5, 1, 3], "Spectra": {"20": [[43.0, 1.0]]}
        }"#;
        let compound: CandidateCompound = serde_json::from_str(json).unwrap();
        assert_eq!(compound.fingerprint_len(), 3);
        assert_eq!(compound.sources[0].operators, vec!["2.7.1.a".to_string()]);
        assert_eq!(compound.reference_spectrum(20).unwrap().len(), 1);
        assert!(compound.reference_spectrum(10).is_none());
    }

    #[test]
    fn test_result_wire_names() {
        let mut compound = CandidateCompound::new("C1", "C6H12O6", 180.0633);
        compound.fingerprint = Fingerprint::new(vec![1, 2]);
        let mut result = AnnotationResult::annotated(&compound, "[M+H]+", "181.0712");
        result.strip();
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["adduct"], "[M+H]+");
        assert_eq!(value["peak_name"], "181.0712");
        assert!(value.get("Spectral_score").is_none());
        assert!(value.get("RDKit_fp").is_none());
        assert!(value.get("Likelihood_score").is_none());
    }

    #[test]
    fn test_structure_hit_omits_search_fields() {
        let mut result = AnnotationResult::from_compound(CandidateCompound::new("C1", "C6H12O6", 180.0633));
        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("adduct").is_none());
        assert!(value.get("peak_name").is_none());
        assert!(value.get("Spectral_score").is_none());

        result.spectral_score = Some(870);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["Spectral_score"], 870);
    }
}
