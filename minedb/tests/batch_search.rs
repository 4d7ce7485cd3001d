use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use minecore::algorithm::similarity::SimilarityPruner;
use minecore::algorithm::spectral::SpectralMetric;
use minecore::annotation::ranking::known_compound_ids;
use minecore::data::adduct::Polarity;
use minecore::data::compound::{CandidateCompound, Fingerprint, Source};
use minecore::data::model::MetabolicModel;
use minecore::data::spectrum::MzSpectrum;
use minecore::error::MineError;
use minecore::params::SearchParams;
use minecore::search::SearchOrchestrator;
use minecore::store::CompoundStore;
use minedb::error::DbError;
use minedb::io::output::{load_bincode, write_results};
use minedb::io::peaks::{parse_known_peaks, PeakSource};
use minedb::store::sqlite::{SharedSqliteStore, SqliteStore};

fn scratch_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("minedb-{}-{name}", std::process::id()))
}

fn library() -> SqliteStore {
    let mut glucose = CandidateCompound::new("glc", "C6H12O6", 180.0633);
    glucose.fingerprint = Fingerprint::new((0..20).collect());
    glucose.reference_spectra.insert(20, MzSpectrum::new(vec![43.0189, 59.013], vec![1.0, 1.0]));

    let mut predicted = CandidateCompound::new("pred", "C6H12O6", 180.0634);
    predicted.generation = 1;
    predicted.sources = vec![Source::new("glc", vec!["op1".to_string()])];
    predicted.fingerprint = Fingerprint::new((0..19).collect());

    let mut chlorinated = CandidateCompound::new("cl", "C6H11ClO6", 180.0633);
    chlorinated.fingerprint = Fingerprint::new((5..30).collect());

    let mut store = SqliteStore::open_in_memory().unwrap();
    store.import_compounds(&[glucose, predicted, chlorinated]).unwrap();
    store
        .import_models(&[MetabolicModel::new(
            "eco",
            HashSet::from(["glc".to_string()]),
            HashMap::from([("op1".to_string(), 0.4)]),
        )])
        .unwrap();
    store
}

#[test]
fn ms1_batch_one_match_one_miss() {
    let store = library();
    let peaks_text = "181.0706\n999.9\n".to_string();
    let mut peaks = PeakSource::Form { text: peaks_text, polarity: Polarity::Positive, ms2: false }
        .parse()
        .unwrap();

    let params = SearchParams { model_ids: Some(vec!["eco".to_string()]), ..Default::default() };
    let outcome = SearchOrchestrator::new(&store).ms_adduct_search(&mut peaks, &params).unwrap();

    assert_eq!(outcome.summary.peaks, 2);
    assert_eq!(outcome.summary.matched_peaks, 1);
    assert!(peaks[0].native_hit);
    assert_eq!(peaks[0].min_steps, 0);
    assert_eq!(peaks[1].total_hits, 0);

    let ids: HashSet<&str> = outcome.results.iter().map(|r| r.compound.id.as_str()).collect();
    assert_eq!(ids, HashSet::from(["glc", "pred"]));
    let pred = outcome.results.iter().find(|r| r.compound.id == "pred").unwrap();
    assert!((pred.likelihood_score.unwrap() - 0.85).abs() < 1e-12);
    assert!(outcome.results.iter().all(|r| r.adduct.as_deref() == Some("[M+H]+")));
}

#[test]
fn ms1_parallel_on_shared_store() {
    let shared = SharedSqliteStore::new(library());
    let text = "181.0706\n203.0526\n999.9\n".to_string();
    let params = SearchParams::default();
    let orchestrator = SearchOrchestrator::new(&shared);

    let mut sequential = PeakSource::Form { text: text.clone(), polarity: Polarity::Positive, ms2: false }
        .parse()
        .unwrap();
    let mut parallel = PeakSource::Form { text, polarity: Polarity::Positive, ms2: false }.parse().unwrap();
    let a = orchestrator.ms_adduct_search(&mut sequential, &params).unwrap();
    let b = orchestrator.ms_adduct_search_par(&mut parallel, &params, 3).unwrap();

    assert_eq!(a, b);
    assert_eq!(shared.into_inner().compound_count().unwrap(), 3);
}

#[test]
fn ms2_search_from_mgf() {
    let store = library();
    let mgf = "BEGIN IONS\nTITLE=glucose\nPEPMASS=181.0706\nRTINSECONDS=12.5\n\
               43.0189 1.0\n59.013 1.0\nEND IONS\n"
        .to_string();
    let mut peaks = PeakSource::Mgf { text: mgf, polarity: Polarity::Positive }.parse().unwrap();
    let params = SearchParams {
        energy_level: Some(20),
        scoring_function: Some(SpectralMetric::DotProduct),
        ..Default::default()
    };

    let outcome = SearchOrchestrator::new(&store).ms2_search(&mut peaks, &params).unwrap();
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.results[0].compound.id, "glc");
    assert_eq!(outcome.results[0].spectral_score, Some(1000));
    assert_eq!(outcome.results[1].spectral_score, None);
    assert!(outcome.results.iter().all(|r| r.compound.reference_spectra.is_empty()));
}

#[test]
fn ms2_search_requires_fragments() {
    let store = library();
    let mut peaks = PeakSource::Form { text: "181.0706\n".into(), polarity: Polarity::Positive, ms2: false }
        .parse()
        .unwrap();
    let params = SearchParams {
        energy_level: Some(20),
        scoring_function: Some(SpectralMetric::Jaccard),
        ..Default::default()
    };
    assert!(matches!(
        SearchOrchestrator::new(&store).ms2_search(&mut peaks, &params),
        Err(MineError::EmptyFragmentSpectrum { .. })
    ));
}

#[test]
fn similarity_pruning_matches_brute_force() {
    let store = library();
    let query = Fingerprint::new((0..20).collect());
    let all = [
        Fingerprint::new((0..20).collect()),
        Fingerprint::new((0..19).collect()),
        Fingerprint::new((5..30).collect()),
    ];

    for min_tc in [0.5, 0.8, 0.9, 1.0] {
        let hits = SimilarityPruner::new(min_tc, None).unwrap().search(&store, &query).unwrap();
        let expected = all.iter().filter(|fp| fp.tanimoto(&query) >= min_tc).count();
        assert_eq!(hits.compounds.len(), expected, "min_tc = {min_tc}");
        assert_eq!(hits.stats.accepted, expected);
    }
}

#[test]
fn similarity_keeps_candidate_exactly_at_threshold() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let mut wide = CandidateCompound::new("wide", "C20H30O2", 302.2246);
    wide.fingerprint = Fingerprint::new((0..50).collect());
    let mut narrow = CandidateCompound::new("narrow", "C2H6O", 46.0419);
    narrow.fingerprint = Fingerprint::new((0..6).collect());
    store.import_compounds(&[wide, narrow]).unwrap();

    // 7 / 50 == 0.14 exactly; the f64 quotient 7 / 0.14 falls just below 50
    let query = Fingerprint::new((0..7).collect());
    let hits = SimilarityPruner::new(0.14, None).unwrap().search(&store, &query).unwrap();
    let ids: Vec<&str> = hits.compounds.iter().map(|(c, _)| c.id.as_str()).collect();
    assert_eq!(ids, vec!["wide", "narrow"]);
    assert_eq!(hits.stats.candidates, 2);
}

#[test]
fn known_peaks_rank_isomers() {
    let store = library();
    let mut peaks = PeakSource::Form { text: "181.0706\n".into(), polarity: Polarity::Positive, ms2: false }
        .parse()
        .unwrap();
    let known = parse_known_peaks("glucose standard,0.0,181.0706,+,C6H12O6,[M+H]+,pred\n").unwrap();
    let params = SearchParams { model_ids: Some(vec!["eco".to_string()]), ..Default::default() };

    let orchestrator = SearchOrchestrator::new(&store);
    let outcome = orchestrator.ms_adduct_search(&mut peaks, &params).unwrap();
    let ranked = orchestrator.rank_isomers(&outcome.results, &known_compound_ids(&known), &params).unwrap();

    assert_eq!(ranked.len(), 1);
    let order: Vec<&str> = ranked[0].iter().map(|r| r.compound.id.as_str()).collect();
    assert_eq!(order, vec!["pred", "glc"]);
    assert_eq!(ranked[0].native.len(), 1);
}

#[test]
fn quick_search_resolves_ids_formulas_and_names() {
    let mut store = library();
    let mut named = CandidateCompound::new("ace", "C2H4O2", 60.0211);
    named.names = vec!["Acetic acid".to_string()];
    store.import_compounds(&[named]).unwrap();

    assert_eq!(store.quick_search("pred").unwrap()[0].id, "pred");
    assert_eq!(store.quick_search("C6H11ClO6").unwrap()[0].id, "cl");
    assert_eq!(store.quick_search("ACETIC ACID").unwrap()[0].id, "ace");
    assert!(matches!(store.quick_search("caffeine"), Err(MineError::CompoundNotFound { .. })));
    assert_eq!(store.model_search("eco").unwrap(), vec!["eco".to_string()]);
}

#[test]
fn unknown_model_is_fatal() {
    let store = library();
    let orchestrator = SearchOrchestrator::new(&store);
    let query = Fingerprint::new((0..20).collect());
    assert!(matches!(
        orchestrator.similarity_search(&query, 0.9, None, Some("hsa")),
        Err(MineError::UnknownModel { .. })
    ));
}

#[test]
fn import_json_library() {
    let path = scratch_path("library.json");
    let library = serde_json::json!({
        "compounds": [
            {"_id": "glc", "Formula": "C6H12O6", "Mass": 180.0633, "RDKit_fp": [1, 2, 3]},
            {"_id": "fru", "Formula": "C6H12O6", "Mass": 180.0634, "Generation": 1,
             "Sources": [{"Compound": "glc", "Operators": ["op1"]}]}
        ],
        "models": [{"_id": "eco", "Compound_ids": ["glc"], "Operators": {"op1": 0.5}}]
    });
    std::fs::write(&path, library.to_string()).unwrap();

    let mut store = SqliteStore::open_in_memory().unwrap();
    assert_eq!(store.import_json(&path).unwrap(), (2, 1));
    assert_eq!(store.compound_count().unwrap(), 2);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn results_round_trip_through_bincode() {
    let store = library();
    let mut peaks = PeakSource::Form { text: "181.0706\n".into(), polarity: Polarity::Positive, ms2: false }
        .parse()
        .unwrap();
    let outcome = SearchOrchestrator::new(&store)
        .ms_adduct_search(&mut peaks, &SearchParams::default())
        .unwrap();

    let path = scratch_path("hits.bin");
    write_results(&path, &outcome.results).unwrap();
    let rows = load_bincode(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(rows.len(), outcome.results.len());
    assert_eq!(rows[0].id, outcome.results[0].compound.id);
    assert_eq!(rows[0].peak_name.as_deref(), Some("181.0706"));

    assert!(matches!(
        write_results(&scratch_path("hits.xlsx"), &outcome.results),
        Err(DbError::Mine(MineError::UnsupportedFormat { .. }))
    ));
}
