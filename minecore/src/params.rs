use serde::{Deserialize, Serialize};

use crate::algorithm::spectral::{SpectralMatcher, SpectralMetric};
use crate::annotation::filter::CompoundFilter;
use crate::chemistry::constants::{DEFAULT_FRAGMENT_TOLERANCE, MDA_PER_DA, PPM};
use crate::data::adduct::Polarity;
use crate::error::{MineError, Result};

/// Precursor mass tolerance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MassTolerance {
    /// Parts per million of the candidate mass.
    Ppm(f64),
    /// Absolute window in Dalton.
    Dalton(f64),
}

impl MassTolerance {
    /// Half-width of the mass window around `mass`, in Dalton.
    ///
    /// # Examples
    ///
    /// ```
    /// use minecore::params::MassTolerance;
    ///
    /// assert!((MassTolerance::Ppm(10.0).window(200.0) - 0.002).abs() < 1e-12);
    /// assert_eq!(MassTolerance::Dalton(0.002).window(200.0), 0.002);
    /// ```
    pub fn window(&self, mass: f64) -> f64 {
        match *self {
            MassTolerance::Ppm(ppm) => ppm / PPM * mass,
            MassTolerance::Dalton(da) => da,
        }
    }
}

/// Parameters of one MS annotation request.
///
/// `tolerance` is in ppm when `ppm` is set, otherwise in milli-Dalton.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    pub store_id: String,
    pub tolerance: f64,
    pub polarity: Polarity,
    /// Restrict the search to these adduct names; all adducts when `None`.
    pub adducts: Option<Vec<String>>,
    /// Models defining native compounds. The first one also scores relevance.
    pub model_ids: Option<Vec<String>>,
    pub ppm: bool,
    pub logp_range: Option<(f64, f64)>,
    pub kovats_range: Option<(f64, f64)>,
    pub halogens: bool,
    pub verbose: bool,
    pub energy_level: Option<u32>,
    pub scoring_function: Option<SpectralMetric>,
}

impl Default for SearchParams {
    fn default() -> Self {
        SearchParams {
            store_id: "mine".to_string(),
            tolerance: 2.0,
            polarity: Polarity::Positive,
            adducts: None,
            model_ids: None,
            ppm: false,
            logp_range: None,
            kovats_range: None,
            halogens: false,
            verbose: false,
            energy_level: None,
            scoring_function: None,
        }
    }
}

impl SearchParams {
    pub fn mass_tolerance(&self) -> MassTolerance {
        if self.ppm {
            MassTolerance::Ppm(self.tolerance)
        } else {
            MassTolerance::Dalton(self.tolerance / MDA_PER_DA)
        }
    }

    /// m/z tolerance for aligning fragment peaks, in Dalton.
    pub fn fragment_epsilon(&self) -> f64 {
        if self.ppm {
            DEFAULT_FRAGMENT_TOLERANCE
        } else {
            self.tolerance / MDA_PER_DA
        }
    }

    pub fn compound_filter(&self) -> CompoundFilter {
        CompoundFilter {
            halogens: self.halogens,
            logp_range: self.logp_range,
            kovats_range: self.kovats_range,
        }
    }

    /// The spectral matcher for MS2 requests; both `energy_level` and
    /// `scoring_function` must be set.
    pub fn spectral_matcher(&self) -> Result<(SpectralMatcher, u32)> {
        let energy_level = self.energy_level.ok_or_else(|| {
            MineError::invalid_input("energy_level must be specified for MS2 searches")
        })?;
        let metric = self.scoring_function.ok_or_else(|| {
            MineError::invalid_input(
                "scoring_function must be specified for MS2 searches; use 'jaccard' or 'dot product'",
            )
        })?;
        Ok((SpectralMatcher::new(metric, self.fragment_epsilon()), energy_level))
    }

    /// Rejects negative tolerances and inverted ranges.
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(MineError::invalid_input(format!(
                "tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        for (name, range) in [("logp_range", self.logp_range), ("kovats_range", self.kovats_range)] {
            if let Some((lo, hi)) = range {
                if lo > hi {
                    return Err(MineError::invalid_input(format!(
                        "{name} lower bound {lo} exceeds upper bound {hi}"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_tolerance_is_millidalton() {
        let params = SearchParams { tolerance: 3.0, ..Default::default() };
        assert_eq!(params.mass_tolerance(), MassTolerance::Dalton(0.003));
        assert!((params.fragment_epsilon() - 0.003).abs() < 1e-15);
    }

    #[test]
    fn test_ppm_fragment_epsilon() {
        let params = SearchParams { tolerance: 10.0, ppm: true, ..Default::default() };
        assert_eq!(params.mass_tolerance(), MassTolerance::Ppm(10.0));
        assert_eq!(params.fragment_epsilon(), 0.01);
    }

    #[test]
    fn test_defaults_from_partial_json() {
        let params: SearchParams =
            serde_json::from_str(r#"{"tolerance": 5.0, "polarity": "Negative", "scoring_function": "jaccard"}"#)
                .unwrap();
        assert_eq!(params.tolerance, 5.0);
        assert_eq!(params.polarity, Polarity::Negative);
        assert!(!params.halogens);
        assert_eq!(params.scoring_function, Some(SpectralMetric::Jaccard));
    }

    #[test]
    fn test_ms2_requirements() {
        let params = SearchParams::default();
        assert!(params.spectral_matcher().is_err());
        let params = SearchParams {
            energy_level: Some(20),
            scoring_function: Some(SpectralMetric::DotProduct),
            ..Default::default()
        };
        let (matcher, level) = params.spectral_matcher().unwrap();
        assert_eq!(level, 20);
        assert!((matcher.epsilon - 0.002).abs() < 1e-15);
    }

    #[test]
    fn test_validate() {
        assert!(SearchParams::default().validate().is_ok());
        assert!(SearchParams { tolerance: -1.0, ..Default::default() }.validate().is_err());
        assert!(SearchParams { logp_range: Some((3.0, 1.0)), ..Default::default() }
            .validate()
            .is_err());
    }
}
