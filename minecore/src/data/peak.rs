use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::algorithm::spectral::SpectrumScorer;
use crate::chemistry::constants::SPECTRAL_SCORE_SCALE;
use crate::data::adduct::Polarity;
use crate::data::compound::{AnnotationResult, CandidateCompound};
use crate::data::spectrum::MzSpectrum;
use crate::error::{MineError, Result};

/// Initial value of [`Peak::min_steps`] before any hit is recorded.
pub const MIN_STEPS_UNSET: u32 = u32::MAX;

/// An unknown peak as it arrives in a batch request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeakRecord {
    pub name: String,
    #[serde(default)]
    pub retention_time: f64,
    pub mz: f64,
    pub polarity: String,
    #[serde(default)]
    pub fragment_spectrum: Option<MzSpectrum>,
}

/// An observed MS signal and the annotations accumulated for it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Peak {
    pub name: String,
    pub retention_time: f64,
    pub mz: f64,
    pub polarity: Polarity,
    pub fragment_spectrum: Option<MzSpectrum>,
    /// Proposed formulas grouped by the adduct that produced them.
    pub formulas: BTreeMap<String, BTreeSet<String>>,
    pub isomers: Vec<AnnotationResult>,
    pub total_hits: usize,
    pub native_hit: bool,
    /// Smallest generation among hits, [`MIN_STEPS_UNSET`] while unmatched.
    pub min_steps: u32,
}

impl Peak {
    pub fn new(name: impl Into<String>, retention_time: f64, mz: f64, polarity: Polarity) -> Self {
        Peak {
            name: name.into(),
            retention_time,
            mz,
            polarity,
            fragment_spectrum: None,
            formulas: BTreeMap::new(),
            isomers: Vec::new(),
            total_hits: 0,
            native_hit: false,
            min_steps: MIN_STEPS_UNSET,
        }
    }

    pub fn with_fragment_spectrum(mut self, spectrum: MzSpectrum) -> Self {
        self.fragment_spectrum = Some(spectrum);
        self
    }

    /// True once at least one candidate was recorded.
    pub fn is_matched(&self) -> bool {
        self.total_hits > 0
    }

    /// Adds a formula under an adduct, creating the adduct entry on first use.
    ///
    /// Returns false if the pair was already present.
    pub fn add_formula(&mut self, adduct: &str, formula: &str) -> bool {
        self.formulas
            .entry(adduct.to_string())
            .or_default()
            .insert(formula.to_string())
    }

    /// Number of distinct (adduct, formula) pairs.
    pub fn total_formulas(&self) -> usize {
        self.formulas.values().map(BTreeSet::len).sum()
    }

    /// Records a store hit for this peak under the given adduct.
    pub fn record_hit(&mut self, compound: &CandidateCompound, adduct: &str, native: bool) {
        self.total_hits += 1;
        if native {
            self.native_hit = true;
        }
        self.min_steps = self.min_steps.min(compound.generation);
        self.add_formula(adduct, &compound.formula);
        self.isomers.push(AnnotationResult::annotated(compound, adduct, &self.name));
    }

    /// Scores every isomer's reference spectrum at `energy_level` against this peak's
    /// fragment spectrum, then sorts isomers by descending score with unscored ones last.
    ///
    /// Reference spectra are dropped from the isomers afterwards.
    pub fn score_isomers<S: SpectrumScorer + ?Sized>(
        &mut self,
        scorer: &S,
        energy_level: u32,
    ) -> Result<()> {
        let query = match &self.fragment_spectrum {
            Some(spectrum) if !spectrum.is_empty() => spectrum,
            _ => return Err(MineError::EmptyFragmentSpectrum { peak: self.name.clone() }),
        };

        for isomer in self.isomers.iter_mut() {
            isomer.spectral_score = match isomer.compound.reference_spectrum(energy_level) {
                Some(reference) => {
                    let similarity = scorer.score(query, reference)?;
                    Some((similarity * SPECTRAL_SCORE_SCALE).round() as u32)
                }
                None => None,
            };
            isomer.compound.reference_spectra.clear();
        }

        // Option orders None below Some, so a descending sort puts unscored isomers last.
        self.isomers.sort_by(|a, b| b.spectral_score.cmp(&a.spectral_score));
        Ok(())
    }
}

impl TryFrom<PeakRecord> for Peak {
    type Error = MineError;

    fn try_from(record: PeakRecord) -> Result<Self> {
        let polarity = record.polarity.parse::<Polarity>()?;
        let mut peak = Peak::new(record.name, record.retention_time, record.mz, polarity);
        peak.fragment_spectrum = record.fragment_spectrum;
        Ok(peak)
    }
}
