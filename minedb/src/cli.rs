use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use minecore::algorithm::similarity::ScreenOnly;
use minecore::algorithm::spectral::SpectralMetric;
use minecore::annotation::cluster::cluster_peaks;
use minecore::annotation::ranking::{known_compound_ids, KnownPeak};
use minecore::data::adduct::{AdductTable, Polarity};
use minecore::data::compound::{AnnotationResult, CandidateCompound, Fingerprint};
use minecore::data::peak::Peak;
use minecore::error::MineError;
use minecore::search::{SearchOrchestrator, SearchOutcome};
use minecore::store::{Collection, CompoundStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{self, Config};
use crate::error::{DbError, Result};
use crate::io::output::{export_spectra_msp, write_json, write_ranked, write_results};
use crate::io::peaks::{parse_known_peaks, PeakSource, PeakSourceFormat};
use crate::store::sqlite::{SharedSqliteStore, SqliteStore};

#[derive(Debug, Parser)]
#[command(name = "minedb", version, about, rename_all = "kebab")]
pub struct Cli {
    /// TOML configuration file.
    #[arg(long, short = 'c', value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,
    /// SQLite compound library, overrides the configured one.
    #[arg(long, short = 'd', value_name = "FILE", global = true)]
    pub database: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Bulk-load a JSON library of compounds and models into the database.
    Import { library: PathBuf },
    /// Adduct search of unknown peaks.
    Ms1 {
        peaks: PathBuf,
        #[command(flatten)]
        search: SearchArgs,
    },
    /// Adduct search followed by fragment spectrum scoring.
    Ms2 {
        peaks: PathBuf,
        #[command(flatten)]
        search: SearchArgs,
        #[arg(long)]
        energy_level: Option<u32>,
        /// `dot product` or `jaccard`.
        #[arg(long)]
        scoring_function: Option<SpectralMetric>,
    },
    /// Compounds similar to a fingerprint.
    Similarity {
        #[command(flatten)]
        structure: StructureArgs,
        #[arg(long, default_value_t = 0.7)]
        min_tc: f64,
    },
    /// Compounds containing a substructure fingerprint.
    Substructure {
        #[command(flatten)]
        structure: StructureArgs,
    },
    /// Resolve a compound id, formula or name.
    Lookup {
        query: String,
        #[arg(long, short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Fetch compounds by id.
    Compounds {
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long, short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Metabolic models matching organism codes or names, best match first.
    Models { query: String },
    /// List the ids of a collection: compounds or models.
    Ids { collection: Collection },
    /// List adduct names: positive, negative or all.
    Adducts {
        #[arg(default_value = "all")]
        polarity: String,
    },
    /// Export stored reference spectra as an MSP library.
    Spectra {
        #[arg(long, default_value_t = 20)]
        energy_level: u32,
        /// Keep compounds in or derived from this model.
        #[arg(long)]
        model: Option<String>,
        /// Skip predicted compounds.
        #[arg(long)]
        known_only: bool,
        #[arg(long, short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

/// Overrides of the `[search]` config section.
#[derive(Debug, Args)]
pub struct SearchArgs {
    /// form, mgf, msp or mzxml; taken from the file extension when omitted.
    #[arg(long)]
    pub format: Option<PeakSourceFormat>,
    /// Precursor tolerance in mDa, or ppm with `--ppm`.
    #[arg(long)]
    pub tolerance: Option<f64>,
    #[arg(long)]
    pub ppm: bool,
    #[arg(long)]
    pub polarity: Option<Polarity>,
    /// Metabolic model, repeatable; the first one scores relevance.
    #[arg(long = "model")]
    pub models: Vec<String>,
    /// Restrict to these adducts, repeatable.
    #[arg(long = "adduct")]
    pub adducts: Vec<String>,
    /// Keep halogenated compounds.
    #[arg(long)]
    pub halogens: bool,
    #[arg(long)]
    pub verbose: bool,
    /// Known or targeted peaks, clustered with the unknowns and used to rank isomers.
    #[arg(long, short = 'k', value_name = "FILE")]
    pub known: Option<PathBuf>,
    /// Write isomers ranked known, native, other per formula (.json or .csv).
    #[arg(long, value_name = "FILE")]
    pub ranked: Option<PathBuf>,
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct StructureArgs {
    /// Comma-separated on-bit positions.
    #[arg(long, value_delimiter = ',', required = true)]
    pub fingerprint: Vec<u32>,
    #[arg(long)]
    pub limit: Option<usize>,
    /// Attach likelihood scores against this model.
    #[arg(long)]
    pub model: Option<String>,
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,
}

impl SearchArgs {
    fn apply(&self, config: &mut Config) {
        let search = &mut config.search;
        if let Some(tolerance) = self.tolerance {
            search.tolerance = tolerance;
        }
        search.ppm |= self.ppm;
        if let Some(polarity) = self.polarity {
            search.polarity = polarity;
        }
        if !self.models.is_empty() {
            search.model_ids = Some(self.models.clone());
        }
        if !self.adducts.is_empty() {
            search.adducts = Some(self.adducts.clone());
        }
        search.halogens |= self.halogens;
        search.verbose |= self.verbose;
    }
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = match (&cli.config, &cli.database) {
        (Some(path), _) => config::load(path)?,
        (None, Some(database)) => Config::for_database(database),
        (None, None) => {
            return Err(DbError::Validation {
                message: "either --config or --database must be given.".to_string(),
            });
        }
    };
    if let Some(database) = &cli.database {
        config.database = database.clone();
    }
    Ok(config)
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

pub fn run(cli: Cli) -> Result<()> {
    let mut config = resolve_config(&cli)?;
    match &cli.command {
        Command::Ms1 { search, .. } => search.apply(&mut config),
        Command::Ms2 { search, energy_level, scoring_function, .. } => {
            search.apply(&mut config);
            config.search.energy_level = energy_level.or(config.search.energy_level);
            config.search.scoring_function = scoring_function.or(config.search.scoring_function);
        }
        _ => {}
    }
    config::validate(&config)?;
    init_tracing(&config);

    match cli.command {
        Command::Import { library } => {
            let mut store = SqliteStore::open(&config.database)?;
            store.import_json(&library)?;
            info!(compounds = store.compound_count()?, "database ready");
            Ok(())
        }
        Command::Ms1 { peaks, search } => {
            let mut peaks = read_peaks(&peaks, search.format, &config, false)?;
            let known = read_known_peaks(search.known.as_deref())?;
            ms_search(&config, &mut peaks, &known, &search, false)
        }
        Command::Ms2 { peaks, search, .. } => {
            let mut peaks = read_peaks(&peaks, search.format, &config, true)?;
            let known = read_known_peaks(search.known.as_deref())?;
            ms_search(&config, &mut peaks, &known, &search, true)
        }
        Command::Similarity { structure, min_tc } => {
            let store = SqliteStore::open(&config.database)?;
            let query = Fingerprint::new(structure.fingerprint);
            let (results, stats) = orchestrator(&store, &config)?.similarity_search(
                &query,
                min_tc,
                structure.limit,
                structure.model.as_deref(),
            )?;
            info!(
                candidates = stats.candidates,
                pruned = stats.pruned,
                comparisons = stats.exact_comparisons,
                accepted = stats.accepted,
                "similarity search"
            );
            emit(structure.output.as_deref(), &results)
        }
        Command::Substructure { structure } => {
            let store = SqliteStore::open(&config.database)?;
            let query = Fingerprint::new(structure.fingerprint);
            let results = orchestrator(&store, &config)?.substructure_search(
                &query,
                structure.limit,
                &ScreenOnly,
                structure.model.as_deref(),
            )?;
            emit(structure.output.as_deref(), &results)
        }
        Command::Lookup { query, output } => {
            let store = SqliteStore::open(&config.database)?;
            let compounds = store.quick_search(&query)?;
            info!(query = %query, hits = compounds.len(), "lookup");
            emit(output.as_deref(), &into_results(compounds))
        }
        Command::Compounds { ids, output } => {
            let store = SqliteStore::open(&config.database)?;
            let compounds = store.compounds_by_ids(&ids)?;
            if compounds.len() < ids.len() {
                warn!(requested = ids.len(), found = compounds.len(), "some compound ids are not in the store");
            }
            emit(output.as_deref(), &into_results(compounds))
        }
        Command::Models { query } => {
            let store = SqliteStore::open(&config.database)?;
            print_lines(store.model_search(&query)?)
        }
        Command::Ids { collection } => {
            let store = SqliteStore::open(&config.database)?;
            print_lines(store.ids(collection)?)
        }
        Command::Adducts { polarity } => {
            let (positive, negative) = config.adduct_tables()?;
            let tables: Vec<&AdductTable> = if polarity.eq_ignore_ascii_case("all") {
                vec![&positive, &negative]
            } else {
                match polarity.parse::<Polarity>()? {
                    Polarity::Positive => vec![&positive],
                    Polarity::Negative => vec![&negative],
                }
            };
            let mut stdout = std::io::stdout().lock();
            for table in tables {
                for name in table.names() {
                    writeln!(stdout, "{name}").map_err(stdout_error)?;
                }
            }
            Ok(())
        }
        Command::Spectra { energy_level, model, known_only, output } => {
            let store = SqliteStore::open(&config.database)?;
            let model = match model {
                Some(id) => Some(
                    store
                        .metabolic_model(&id)?
                        .ok_or(MineError::UnknownModel { id })?,
                ),
                None => None,
            };
            let compounds = store.spectra_library(energy_level, model.as_ref(), known_only)?;
            let text = export_spectra_msp(&compounds, energy_level);
            match output {
                Some(path) => fs::write(&path, text).map_err(|err| DbError::Write { path, source: err }),
                None => std::io::stdout().lock().write_all(text.as_bytes()).map_err(stdout_error),
            }
        }
    }
}

fn stdout_error(err: std::io::Error) -> DbError {
    DbError::Write { path: PathBuf::from("<stdout>"), source: err }
}

fn orchestrator<'a, S: CompoundStore + ?Sized>(store: &'a S, config: &Config) -> Result<SearchOrchestrator<'a, S>> {
    let (positive, negative) = config.adduct_tables()?;
    Ok(SearchOrchestrator::new(store)
        .with_adduct_tables(positive, negative)
        .with_weights(config.relevance))
}

/// MS1 or MS2 search of `peaks`; MS1 batches run on `config.threads` workers.
fn ms_search(config: &Config, peaks: &mut [Peak], known: &[KnownPeak], search: &SearchArgs, ms2: bool) -> Result<()> {
    let store = SqliteStore::open(&config.database)?;
    if config.threads > 1 && !ms2 {
        let shared = SharedSqliteStore::new(store);
        let orchestrator = orchestrator(&shared, config)?;
        let outcome = orchestrator.ms_adduct_search_par(peaks, &config.search, config.threads)?;
        report(&orchestrator, config, peaks, known, search, &outcome)
    } else {
        let orchestrator = orchestrator(&store, config)?;
        let outcome = if ms2 {
            orchestrator.ms2_search(peaks, &config.search)?
        } else {
            orchestrator.ms_adduct_search(peaks, &config.search)?
        };
        report(&orchestrator, config, peaks, known, search, &outcome)
    }
}

/// Logs formula clusters and ranked isomers, then emits the search results.
fn report<S: CompoundStore + ?Sized>(
    orchestrator: &SearchOrchestrator<'_, S>,
    config: &Config,
    peaks: &[Peak],
    known: &[KnownPeak],
    search: &SearchArgs,
    outcome: &SearchOutcome,
) -> Result<()> {
    if let Some(span) = config.cluster_span {
        let all: Vec<Peak> = peaks.iter().chain(known.iter().map(|k| &k.peak)).cloned().collect();
        for cluster in cluster_peaks(&all, span) {
            info!(formula = %cluster.formula, members = ?cluster.members, "co-eluting formula");
        }
    }

    if search.known.is_some() || search.ranked.is_some() {
        let ranked = orchestrator.rank_isomers(&outcome.results, &known_compound_ids(known), &config.search)?;
        for group in &ranked {
            info!(
                formula = %group.formula,
                known = group.known.len(),
                native = group.native.len(),
                other = group.other.len(),
                "ranked isomers"
            );
        }
        if let Some(path) = &search.ranked {
            write_ranked(path, &ranked)?;
        }
    }

    emit(search.output.as_deref(), &outcome.results)
}

fn read_known_peaks(path: Option<&Path>) -> Result<Vec<KnownPeak>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let text = fs::read_to_string(path).map_err(|err| DbError::Read { path: path.to_path_buf(), source: err })?;
    let known = parse_known_peaks(&text)?;
    info!(path = %path.display(), peaks = known.len(), "read known peaks");
    Ok(known)
}

fn into_results(compounds: Vec<CandidateCompound>) -> Vec<AnnotationResult> {
    compounds.into_iter().map(AnnotationResult::from_compound).collect()
}

fn print_lines(lines: Vec<String>) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    for line in lines {
        writeln!(stdout, "{line}").map_err(stdout_error)?;
    }
    Ok(())
}

fn read_peaks(path: &Path, format: Option<PeakSourceFormat>, config: &Config, ms2: bool) -> Result<Vec<Peak>> {
    let format = match format {
        Some(format) => format,
        None => PeakSourceFormat::from_path(path)?,
    };
    let text = fs::read_to_string(path).map_err(|err| DbError::Read { path: path.to_path_buf(), source: err })?;
    let peaks = PeakSource::new(format, text, config.search.polarity, ms2).parse()?;
    info!(path = %path.display(), %format, peaks = peaks.len(), "read peaks");
    Ok(peaks)
}

/// Writes results to `output`, or as JSON to stdout.
fn emit(output: Option<&Path>, results: &[AnnotationResult]) -> Result<()> {
    match output {
        Some(path) => write_results(path, results),
        None => {
            let mut stdout = std::io::stdout().lock();
            write_json(&mut stdout, results)?;
            writeln!(stdout).map_err(stdout_error)
        }
    }
}
