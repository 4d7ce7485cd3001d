use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::data::peak::Peak;

/// Aggregate statistics over an annotated batch of peaks.
///
/// Averages are taken over matched peaks only and are `None` when no peak matched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSummary {
    pub peaks: usize,
    pub matched_peaks: usize,
    pub native_peaks: usize,
    pub total_hits: usize,
    pub total_formulas: usize,
    pub average_hits_per_peak: Option<f64>,
    pub average_formulas_per_peak: Option<f64>,
}

impl AnnotationSummary {
    pub fn from_peaks(peaks: &[Peak]) -> Self {
        let matched: Vec<&Peak> = peaks.iter().filter(|p| p.is_matched()).collect();

        let hits: Vec<f64> = matched.iter().map(|p| p.total_hits as f64).collect();
        let formulas: Vec<f64> = matched.iter().map(|p| p.total_formulas() as f64).collect();
        let average = |values: &[f64]| (!values.is_empty()).then(|| values.iter().mean());

        AnnotationSummary {
            peaks: peaks.len(),
            matched_peaks: matched.len(),
            native_peaks: matched.iter().filter(|p| p.native_hit).count(),
            total_hits: matched.iter().map(|p| p.total_hits).sum(),
            total_formulas: matched.iter().map(|p| p.total_formulas()).sum(),
            average_hits_per_peak: average(&hits),
            average_formulas_per_peak: average(&formulas),
        }
    }
}
