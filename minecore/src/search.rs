use std::collections::HashSet;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, warn};

use crate::algorithm::relevance::{score_compounds, RelevanceWeights};
use crate::algorithm::similarity::{substructure_search, PruneStats, SimilarityPruner, SubstructureMatcher};
use crate::annotation::annotator::PeakAnnotator;
use crate::annotation::ranking::{rank_isomers, RankedIsomers};
use crate::annotation::summary::AnnotationSummary;
use crate::data::adduct::{AdductTable, Polarity};
use crate::data::compound::{AnnotationResult, Fingerprint};
use crate::data::peak::Peak;
use crate::error::{MineError, Result};
use crate::params::SearchParams;
use crate::store::CompoundStore;

/// Flattened results of an MS search together with the batch statistics.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchOutcome {
    pub results: Vec<AnnotationResult>,
    pub summary: AnnotationSummary,
}

/// Coordinates adduct annotation, spectral scoring, structure search and relevance
/// scoring against one compound store.
pub struct SearchOrchestrator<'a, S: CompoundStore + ?Sized> {
    store: &'a S,
    positive: AdductTable,
    negative: AdductTable,
    weights: RelevanceWeights,
}

impl<'a, S: CompoundStore + ?Sized> SearchOrchestrator<'a, S> {
    /// Orchestrator using the bundled adduct tables and default relevance weights.
    pub fn new(store: &'a S) -> Self {
        SearchOrchestrator {
            store,
            positive: AdductTable::default_positive(),
            negative: AdductTable::default_negative(),
            weights: RelevanceWeights::default(),
        }
    }

    pub fn with_adduct_tables(mut self, positive: AdductTable, negative: AdductTable) -> Self {
        self.positive = positive;
        self.negative = negative;
        self
    }

    pub fn with_weights(mut self, weights: RelevanceWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn adduct_table(&self, polarity: Polarity) -> &AdductTable {
        match polarity {
            Polarity::Positive => &self.positive,
            Polarity::Negative => &self.negative,
        }
    }

    /// Positive and negative tables restricted to `params.adducts`.
    fn adduct_subsets(&self, params: &SearchParams) -> Result<(AdductTable, AdductTable)> {
        match &params.adducts {
            None => Ok((self.positive.clone(), self.negative.clone())),
            Some(names) => {
                if let Some(unknown) = names
                    .iter()
                    .find(|n| self.positive.get(n.as_str()).is_none() && self.negative.get(n.as_str()).is_none())
                {
                    return Err(MineError::invalid_input(format!("unknown adduct {unknown:?}")));
                }
                Ok((self.positive.select_known(names), self.negative.select_known(names)))
            }
        }
    }

    fn native_ids(&self, params: &SearchParams) -> Result<HashSet<String>> {
        match &params.model_ids {
            Some(ids) if !ids.is_empty() => self.store.model_compound_ids(ids),
            _ => Ok(HashSet::new()),
        }
    }

    /// Annotates every peak of a batch in order.
    ///
    /// A store failure stops the batch; peaks annotated before the failure keep their hits.
    pub fn annotate_batch(&self, peaks: &mut [Peak], params: &SearchParams) -> Result<AnnotationSummary> {
        params.validate()?;
        let (positive, negative) = self.adduct_subsets(params)?;
        let native = self.native_ids(params)?;
        let annotator = PeakAnnotator::new(self.store, params, &native);

        let total = peaks.len();
        for (i, peak) in peaks.iter_mut().enumerate() {
            annotator.annotate(peak, &positive, &negative)?;
            debug!(peak = %peak.name, hits = peak.total_hits, "annotated {} of {} peaks", i + 1, total);
        }

        Ok(self.summarize(peaks))
    }

    fn summarize(&self, peaks: &[Peak]) -> AnnotationSummary {
        let summary = AnnotationSummary::from_peaks(peaks);
        if summary.matched_peaks == 0 && !peaks.is_empty() {
            warn!(peaks = summary.peaks, "no peak matched; per-peak averages omitted");
        }
        info!(
            matched = summary.matched_peaks,
            peaks = summary.peaks,
            average_hits = ?summary.average_hits_per_peak,
            average_formulas = ?summary.average_formulas_per_peak,
            "proposed matches"
        );
        summary
    }

    /// MS1 search: annotate the batch and flatten the isomers of all peaks.
    pub fn ms_adduct_search(&self, peaks: &mut [Peak], params: &SearchParams) -> Result<SearchOutcome> {
        let summary = self.annotate_batch(peaks, params)?;
        self.collect_results(peaks, params, summary)
    }

    /// MS2 search: MS1 annotation followed by spectral scoring of every peak's isomers.
    pub fn ms2_search(&self, peaks: &mut [Peak], params: &SearchParams) -> Result<SearchOutcome> {
        let (matcher, energy_level) = params.spectral_matcher()?;
        if let Some(peak) = peaks
            .iter()
            .find(|p| p.fragment_spectrum.as_ref().is_none_or(|s| s.is_empty()))
        {
            return Err(MineError::EmptyFragmentSpectrum { peak: peak.name.clone() });
        }

        let summary = self.annotate_batch(peaks, params)?;
        for peak in peaks.iter_mut() {
            peak.score_isomers(&matcher, energy_level)?;
        }
        debug!(metric = %matcher.metric, energy_level, epsilon = matcher.epsilon, "scored isomers");
        self.collect_results(peaks, params, summary)
    }

    fn collect_results(
        &self,
        peaks: &[Peak],
        params: &SearchParams,
        summary: AnnotationSummary,
    ) -> Result<SearchOutcome> {
        let mut results: Vec<AnnotationResult> =
            peaks.iter().flat_map(|peak| peak.isomers.iter().cloned()).collect();
        results.iter_mut().for_each(AnnotationResult::strip);

        if let Some(model_id) = params.model_ids.as_ref().and_then(|ids| ids.first()) {
            self.score_with_model(&mut results, model_id)?;
        }
        Ok(SearchOutcome { results, summary })
    }

    /// Attaches likelihood scores against a metabolic model fetched once from the store.
    pub fn score_with_model(&self, results: &mut [AnnotationResult], model_id: &str) -> Result<()> {
        let model = self
            .store
            .metabolic_model(model_id)?
            .ok_or_else(|| MineError::UnknownModel { id: model_id.to_string() })?;
        score_compounds(results, &model, &self.weights);
        Ok(())
    }

    /// Ranks the isomers of every proposed formula: compounds of known peaks first, then
    /// compounds native to `params.model_ids`, then the rest.
    pub fn rank_isomers(
        &self,
        results: &[AnnotationResult],
        known: &HashSet<String>,
        params: &SearchParams,
    ) -> Result<Vec<RankedIsomers>> {
        let native = self.native_ids(params)?;
        let ranked = rank_isomers(results, known, &native);
        debug!(formulas = ranked.len(), known = known.len(), native = native.len(), "ranked isomers");
        Ok(ranked)
    }

    /// Compounds with a Tanimoto coefficient of at least `min_tc` to the query.
    pub fn similarity_search(
        &self,
        query: &Fingerprint,
        min_tc: f64,
        limit: Option<usize>,
        model_id: Option<&str>,
    ) -> Result<(Vec<AnnotationResult>, PruneStats)> {
        let hits = SimilarityPruner::new(min_tc, limit)?.search(self.store, query)?;
        let mut results: Vec<AnnotationResult> = hits
            .compounds
            .into_iter()
            .map(|(compound, _)| AnnotationResult::from_compound(compound))
            .collect();
        if let Some(model_id) = model_id {
            self.score_with_model(&mut results, model_id)?;
        }
        Ok((results, hits.stats))
    }

    /// Compounds containing the query substructure, confirmed by `matcher`.
    pub fn substructure_search<M: SubstructureMatcher + ?Sized>(
        &self,
        query: &Fingerprint,
        limit: Option<usize>,
        matcher: &M,
        model_id: Option<&str>,
    ) -> Result<Vec<AnnotationResult>> {
        let mut results: Vec<AnnotationResult> = substructure_search(self.store, query, limit, matcher)?
            .into_iter()
            .map(AnnotationResult::from_compound)
            .collect();
        if let Some(model_id) = model_id {
            self.score_with_model(&mut results, model_id)?;
        }
        Ok(results)
    }
}

impl<S: CompoundStore + Sync + ?Sized> SearchOrchestrator<'_, S> {
    /// Parallel version of [`SearchOrchestrator::annotate_batch`] on a dedicated pool.
    pub fn annotate_batch_par(
        &self,
        peaks: &mut [Peak],
        params: &SearchParams,
        num_threads: usize,
    ) -> Result<AnnotationSummary> {
        params.validate()?;
        let (positive, negative) = self.adduct_subsets(params)?;
        let native = self.native_ids(params)?;
        let annotator = PeakAnnotator::new(self.store, params, &native);

        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| MineError::invalid_input(format!("cannot start {num_threads} worker threads: {e}")))?;
        pool.install(|| {
            peaks
                .par_iter_mut()
                .try_for_each(|peak| annotator.annotate(peak, &positive, &negative))
        })?;

        Ok(self.summarize(peaks))
    }

    /// [`SearchOrchestrator::ms_adduct_search`] with the batch annotated on `num_threads` workers.
    pub fn ms_adduct_search_par(
        &self,
        peaks: &mut [Peak],
        params: &SearchParams,
        num_threads: usize,
    ) -> Result<SearchOutcome> {
        let summary = self.annotate_batch_par(peaks, params, num_threads)?;
        self.collect_results(peaks, params, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::algorithm::similarity::ScreenOnly;
    use crate::algorithm::spectral::SpectralMetric;
    use crate::data::compound::{CandidateCompound, Source};
    use crate::data::model::MetabolicModel;
    use crate::data::spectrum::MzSpectrum;
    use crate::store::InMemoryStore;

    fn library() -> InMemoryStore {
        let mut glucose = CandidateCompound::new("glc", "C6H12O6", 180.0633);
        glucose.fingerprint = Fingerprint::new((0..20).collect());
        glucose.reference_spectra.insert(20, MzSpectrum::new(vec![43.0189, 59.013], vec![1.0, 1.0]));

        let mut predicted = CandidateCompound::new("pred", "C6H12O6", 180.0634);
        predicted.generation = 1;
        predicted.sources = vec![Source::new("glc", vec!["op1".to_string()])];
        predicted.fingerprint = Fingerprint::new((0..19).collect());

        let model = MetabolicModel::new(
            "eco",
            HashSet::from(["glc".to_string()]),
            HashMap::from([("op1".to_string(), 0.4)]),
        );
        InMemoryStore::new(vec![glucose, predicted]).with_model(model)
    }

    fn batch() -> Vec<Peak> {
        vec![
            Peak::new("181.0706", 0.0, 181.0706, Polarity::Positive),
            Peak::new("999.9", 0.0, 999.9, Polarity::Positive),
        ]
    }

    #[test]
    fn test_batch_one_match_one_miss() {
        let store = library();
        let orchestrator = SearchOrchestrator::new(&store);
        let mut peaks = batch();
        let summary = orchestrator.annotate_batch(&mut peaks, &SearchParams::default()).unwrap();

        assert!(peaks[0].total_hits >= 1);
        assert_eq!(peaks[1].total_hits, 0);
        assert_eq!(summary.matched_peaks, 1);
        assert_eq!(summary.average_hits_per_peak, Some(peaks[0].total_hits as f64));
    }

    #[test]
    fn test_parallel_batch_matches_sequential() {
        let store = library();
        let orchestrator = SearchOrchestrator::new(&store);
        let params = SearchParams::default();

        let mut sequential = batch();
        let mut parallel = batch();
        let a = orchestrator.annotate_batch(&mut sequential, &params).unwrap();
        let b = orchestrator.annotate_batch_par(&mut parallel, &params, 2).unwrap();
        assert_eq!(a, b);
        assert_eq!(sequential, parallel);

        let outcome = orchestrator.ms_adduct_search_par(&mut batch(), &params, 2).unwrap();
        assert_eq!(outcome.summary, a);
        assert_eq!(outcome.results.len(), sequential[0].isomers.len());
    }

    #[test]
    fn test_rank_known_and_native_isomers() {
        let store = library();
        let orchestrator = SearchOrchestrator::new(&store);
        let params = SearchParams { model_ids: Some(vec!["eco".to_string()]), ..Default::default() };
        let outcome = orchestrator.ms_adduct_search(&mut batch(), &params).unwrap();

        let known = HashSet::from(["pred".to_string()]);
        let ranked = orchestrator.rank_isomers(&outcome.results, &known, &params).unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].formula, "C6H12O6");
        assert_eq!(ranked[0].known[0].compound.id, "pred");
        assert_eq!(ranked[0].native[0].compound.id, "glc");
        assert!(ranked[0].other.is_empty());

        let missing = SearchParams { model_ids: Some(vec!["hsa".to_string()]), ..Default::default() };
        assert!(matches!(
            orchestrator.rank_isomers(&outcome.results, &known, &missing),
            Err(MineError::UnknownModel { .. })
        ));
    }

    #[test]
    fn test_ms1_results_are_flattened_and_scored() {
        let store = library();
        let orchestrator = SearchOrchestrator::new(&store);
        let params = SearchParams { model_ids: Some(vec!["eco".to_string()]), ..Default::default() };
        let mut peaks = batch();
        let outcome = orchestrator.ms_adduct_search(&mut peaks, &params).unwrap();

        assert_eq!(outcome.results.len(), 2);
        assert!(peaks[0].native_hit);
        let glc = outcome.results.iter().find(|r| r.compound.id == "glc").unwrap();
        assert_eq!(glc.likelihood_score, Some(1.0));
        assert_eq!(glc.peak_name.as_deref(), Some("181.0706"));
        let pred = outcome.results.iter().find(|r| r.compound.id == "pred").unwrap();
        assert!((pred.likelihood_score.unwrap() - 0.85).abs() < 1e-12);
        assert!(outcome.results.iter().all(|r| r.compound.fingerprint.is_empty()));
    }

    #[test]
    fn test_adduct_subset() {
        let store = library();
        let orchestrator = SearchOrchestrator::new(&store);
        let mut peaks = batch();
        let params = SearchParams { adducts: Some(vec!["[M+Na]+".to_string()]), ..Default::default() };
        orchestrator.annotate_batch(&mut peaks, &params).unwrap();
        assert_eq!(peaks[0].total_hits, 0);

        let params = SearchParams { adducts: Some(vec!["[M+Xe]+".to_string()]), ..Default::default() };
        assert!(orchestrator.annotate_batch(&mut batch(), &params).is_err());
    }

    #[test]
    fn test_ms2_scores_isomers() {
        let store = library();
        let orchestrator = SearchOrchestrator::new(&store);
        let params = SearchParams {
            energy_level: Some(20),
            scoring_function: Some(SpectralMetric::DotProduct),
            ..Default::default()
        };
        let spectrum = MzSpectrum::new(vec![43.0189, 59.013], vec![1.0, 1.0]);
        let mut peaks = vec![Peak::new("181.0706", 0.0, 181.0706, Polarity::Positive).with_fragment_spectrum(spectrum)];

        let outcome = orchestrator.ms2_search(&mut peaks, &params).unwrap();
        assert_eq!(outcome.results[0].compound.id, "glc");
        assert_eq!(outcome.results[0].spectral_score, Some(1000));
        assert_eq!(outcome.results[1].spectral_score, None);
    }

    #[test]
    fn test_ms2_requires_fragment_spectra() {
        let store = library();
        let orchestrator = SearchOrchestrator::new(&store);
        let params = SearchParams {
            energy_level: Some(20),
            scoring_function: Some(SpectralMetric::Jaccard),
            ..Default::default()
        };
        let err = orchestrator.ms2_search(&mut batch(), &params).unwrap_err();
        assert!(matches!(err, MineError::EmptyFragmentSpectrum { .. }));
    }

    #[test]
    fn test_similarity_search_with_model() {
        let store = library();
        let orchestrator = SearchOrchestrator::new(&store);
        let query = Fingerprint::new((0..20).collect());
        let (results, stats) = orchestrator.similarity_search(&query, 0.9, None, Some("eco")).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(stats.exact_comparisons, 2);
        assert!(results.iter().all(|r| r.likelihood_score.is_some()));

        let err = orchestrator.similarity_search(&query, 0.9, None, Some("hsa")).unwrap_err();
        assert!(matches!(err, MineError::UnknownModel { .. }));
    }

    #[test]
    fn test_substructure_search() {
        let store = library();
        let orchestrator = SearchOrchestrator::new(&store);
        let query = Fingerprint::new(vec![19]);
        let results = orchestrator.substructure_search(&query, None, &ScreenOnly, None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].compound.id, "glc");
    }
}
