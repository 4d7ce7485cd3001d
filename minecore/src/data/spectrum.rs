use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Fragment peaks of one compound or one unknown: a predicted reference spectrum
/// stored per energy level, or the observed MS2 spectrum of a precursor.
///
/// Peaks are kept sorted by ascending m/z so spectral matching can walk two spectra
/// side by side. Stored and imported as a list of `[mz, intensity]` pairs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<(f64, f64)>", into = "Vec<(f64, f64)>")]
pub struct MzSpectrum {
    pub mz: Vec<f64>,
    pub intensity: Vec<f64>,
}

impl MzSpectrum {
    /// Pairs parallel m/z and intensity columns, as read from MGF, MSP or mzXML,
    /// into a sorted spectrum. Surplus entries of the longer column are dropped.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use minecore::data::spectrum::MzSpectrum;
    /// let spectrum = MzSpectrum::new(vec![200.0, 100.0], vec![20.0, 10.0]);
    /// assert_eq!(spectrum.mz, vec![100.0, 200.0]);
    /// assert_eq!(spectrum.intensity, vec![10.0, 20.0]);
    /// ```
    pub fn new(mz: Vec<f64>, intensity: Vec<f64>) -> Self {
        Self::from_pairs(mz.into_iter().zip(intensity).collect())
    }

    /// Spectrum from `(mz, intensity)` pairs in any order.
    pub fn from_pairs(mut pairs: Vec<(f64, f64)>) -> Self {
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (mz, intensity) = pairs.into_iter().unzip();
        MzSpectrum { mz, intensity }
    }

    pub fn len(&self) -> usize {
        self.mz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz.is_empty()
    }

    /// Iterates the peaks as `(mz, intensity)` pairs in m/z order.
    pub fn peaks(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.mz.iter().copied().zip(self.intensity.iter().copied())
    }
}

impl From<Vec<(f64, f64)>> for MzSpectrum {
    fn from(pairs: Vec<(f64, f64)>) -> Self {
        MzSpectrum::from_pairs(pairs)
    }
}

impl From<MzSpectrum> for Vec<(f64, f64)> {
    fn from(spectrum: MzSpectrum) -> Self {
        spectrum.mz.into_iter().zip(spectrum.intensity).collect()
    }
}

impl Display for MzSpectrum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (mz, intensity) in self.peaks() {
            writeln!(f, "{mz} {intensity}")?;
        }
        Ok(())
    }
}
