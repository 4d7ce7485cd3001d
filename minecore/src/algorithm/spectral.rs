use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::data::spectrum::MzSpectrum;
use crate::error::{MineError, Result};

/// aligns two m/z-sorted spectra with a merge scan
///
/// Arguments:
///
/// * `list1` - first spectrum
/// * `list2` - second spectrum
/// * `epsilon` - m/z tolerance in Dalton, peaks closer than this are matched
///
/// Returns:
///
/// * `Vec<(f64, f64)>` - intensity pairs, 0 where a peak has no partner in the other spectrum
///
/// Two peaks with identical m/z that are not within `epsilon` (only possible for a
/// non-positive epsilon or NaN m/z) cannot be ordered and raise `InvariantViolation`.
///
/// # Examples
///
/// ```
/// use minecore::algorithm::spectral::approximate_matches;
/// use minecore::data::spectrum::MzSpectrum;
///
/// let a = MzSpectrum::new(vec![100.0, 200.0], vec![1.0, 2.0]);
/// let b = MzSpectrum::new(vec![100.005, 300.0], vec![3.0, 4.0]);
/// let pairs = approximate_matches(&a, &b, 0.01).unwrap();
/// assert_eq!(pairs, vec![(1.0, 3.0), (2.0, 0.0), (0.0, 4.0)]);
/// ```
pub fn approximate_matches(
    list1: &MzSpectrum,
    list2: &MzSpectrum,
    epsilon: f64,
) -> Result<Vec<(f64, f64)>> {
    let mut pairs = Vec::with_capacity(list1.len() + list2.len());
    let (mut i, mut j) = (0, 0);

    while i < list1.len() && j < list2.len() {
        let (mz1, int1) = (list1.mz[i], list1.intensity[i]);
        let (mz2, int2) = (list2.mz[j], list2.intensity[j]);

        if (mz1 - mz2).abs() < epsilon {
            pairs.push((int1, int2));
            i += 1;
            j += 1;
        } else if mz1 < mz2 {
            pairs.push((int1, 0.0));
            i += 1;
        } else if mz2 < mz1 {
            pairs.push((0.0, int2));
            j += 1;
        } else {
            return Err(MineError::InvariantViolation {
                message: format!(
                    "cannot align peaks at m/z {mz1} and {mz2} with tolerance {epsilon}"
                ),
            });
        }
    }

    pairs.extend(list1.intensity[i..].iter().map(|&int1| (int1, 0.0)));
    pairs.extend(list2.intensity[j..].iter().map(|&int2| (0.0, int2)));

    Ok(pairs)
}

/// cosine similarity of the aligned intensity vectors of two spectra
///
/// Returns 0 when either spectrum has no intensity.
pub fn dot_product(x: &MzSpectrum, y: &MzSpectrum, epsilon: f64) -> Result<f64> {
    let pairs = approximate_matches(x, y, epsilon)?;
    let a = DVector::from_iterator(pairs.len(), pairs.iter().map(|p| p.0));
    let b = DVector::from_iterator(pairs.len(), pairs.iter().map(|p| p.1));

    let denominator = a.norm() * b.norm();
    if denominator == 0.0 {
        return Ok(0.0);
    }
    Ok(a.dot(&b) / denominator)
}

/// fraction of peaks shared by two spectra
///
/// `shared / (len(x) + len(y) - shared)` where `shared` counts aligned pairs with
/// both intensities nonzero. Two empty spectra score 0.
pub fn jaccard(x: &MzSpectrum, y: &MzSpectrum, epsilon: f64) -> Result<f64> {
    let pairs = approximate_matches(x, y, epsilon)?;
    let shared = pairs.iter().filter(|(a, b)| *a != 0.0 && *b != 0.0).count();

    let denominator = x.len() + y.len() - shared;
    if denominator == 0 {
        return Ok(0.0);
    }
    Ok(shared as f64 / denominator as f64)
}

/// Similarity metric applied to an observed and a reference spectrum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectralMetric {
    #[default]
    DotProduct,
    Jaccard,
}

impl FromStr for SpectralMetric {
    type Err = MineError;

    fn from_str(token: &str) -> Result<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "dot product" | "dot_product" | "dotproduct" | "cosine" => Ok(SpectralMetric::DotProduct),
            "jaccard" | "jacquard" => Ok(SpectralMetric::Jaccard),
            other => Err(MineError::invalid_input(format!(
                "unknown scoring function {other:?}, expected 'jaccard' or 'dot product'"
            ))),
        }
    }
}

impl Display for SpectralMetric {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SpectralMetric::DotProduct => write!(f, "dot product"),
            SpectralMetric::Jaccard => write!(f, "jaccard"),
        }
    }
}

/// Scores an observed spectrum against a reference spectrum.
pub trait SpectrumScorer {
    fn score(&self, query: &MzSpectrum, reference: &MzSpectrum) -> Result<f64>;
}

/// A metric bound to the m/z tolerance used to align peaks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpectralMatcher {
    pub metric: SpectralMetric,
    pub epsilon: f64,
}

impl SpectralMatcher {
    pub fn new(metric: SpectralMetric, epsilon: f64) -> Self {
        SpectralMatcher { metric, epsilon }
    }
}

impl SpectrumScorer for SpectralMatcher {
    fn score(&self, query: &MzSpectrum, reference: &MzSpectrum) -> Result<f64> {
        match self.metric {
            SpectralMetric::DotProduct => dot_product(query, reference, self.epsilon),
            SpectralMetric::Jaccard => jaccard(query, reference, self.epsilon),
        }
    }
}
