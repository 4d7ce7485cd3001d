//! Retention-time clustering of annotated peaks.
//!
//! Peaks eluting together may be different adducts of one compound or isomers of one
//! formula. Groups are formed around every peak from the neighbours within half the
//! cluster span, and formulas proposed by more than one (peak, adduct) pair of a group
//! are reported.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::data::peak::Peak;

/// A formula proposed for several co-eluting (peak, adduct) pairs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaCluster {
    pub formula: String,
    pub members: Vec<(String, String)>,
}

/// Groups peaks by retention time and reports formulas shared within a group.
///
/// # Arguments
///
/// * `peaks` - annotated peaks
/// * `span` - total retention-time span of a cluster
///
/// # Returns
///
/// Formula clusters ordered by formula. Duplicate groups are only reported once.
pub fn cluster_peaks(peaks: &[Peak], span: f64) -> Vec<FormulaCluster> {
    let tolerance = span / 2.0;
    let order: Vec<usize> = (0..peaks.len())
        .sorted_by(|&a, &b| peaks[a].retention_time.total_cmp(&peaks[b].retention_time))
        .collect();

    let mut groups: BTreeSet<Vec<usize>> = BTreeSet::new();
    for (i, &centre) in order.iter().enumerate() {
        let rt = peaks[centre].retention_time;
        let backward = order[..i]
            .iter()
            .rev()
            .take_while(|&&j| rt - peaks[j].retention_time <= tolerance);
        let forward = order[i + 1..]
            .iter()
            .take_while(|&&j| peaks[j].retention_time - rt <= tolerance);

        let group: Vec<usize> = std::iter::once(&centre)
            .chain(backward)
            .chain(forward)
            .copied()
            .sorted()
            .collect();
        if group.len() > 1 {
            groups.insert(group);
        }
    }

    let mut clusters = Vec::new();
    for group in &groups {
        let mut by_formula: BTreeMap<&str, Vec<(String, String)>> = BTreeMap::new();
        for &index in group {
            let peak = &peaks[index];
            for (adduct, formulas) in &peak.formulas {
                for formula in formulas {
                    by_formula
                        .entry(formula.as_str())
                        .or_default()
                        .push((peak.name.clone(), adduct.clone()));
                }
            }
        }
        clusters.extend(
            by_formula
                .into_iter()
                .filter(|(_, members)| members.len() > 1)
                .map(|(formula, members)| FormulaCluster { formula: formula.to_string(), members }),
        );
    }

    clusters.sort_by(|a, b| a.formula.cmp(&b.formula));
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::adduct::Polarity;

    fn peak(name: &str, rt: f64, entries: &[(&str, &str)]) -> Peak {
        let mut p = Peak::new(name, rt, 100.0, Polarity::Positive);
        for (adduct, formula) in entries {
            p.add_formula(adduct, formula);
        }
        p
    }

    #[test]
    fn test_coeluting_adducts_cluster() {
        let peaks = vec![
            peak("a", 10.0, &[("[M+H]+", "C6H12O6")]),
            peak("b", 10.4, &[("[M+Na]+", "C6H12O6"), ("[M+K]+", "C4H8O2")]),
            peak("c", 30.0, &[("[M+H]+", "C6H12O6")]),
        ];
        let clusters = cluster_peaks(&peaks, 1.0);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].formula, "C6H12O6");
        assert_eq!(
            clusters[0].members,
            vec![("a".to_string(), "[M+H]+".to_string()), ("b".to_string(), "[M+Na]+".to_string())]
        );
    }

    #[test]
    fn test_isolated_peaks_do_not_cluster() {
        let peaks = vec![
            peak("a", 10.0, &[("[M+H]+", "C6H12O6")]),
            peak("b", 12.0, &[("[M+Na]+", "C6H12O6")]),
        ];
        assert!(cluster_peaks(&peaks, 1.0).is_empty());
    }

    #[test]
    fn test_single_peak_with_two_adducts() {
        let peaks = vec![
            peak("a", 5.0, &[("[M+H]+", "C2H4O2"), ("[M+Na]+", "C2H4O2")]),
            peak("b", 5.1, &[]),
        ];
        let clusters = cluster_peaks(&peaks, 0.5);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members.len(), 2);
    }
}
