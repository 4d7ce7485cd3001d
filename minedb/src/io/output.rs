use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use minecore::annotation::ranking::{IsomerRank, RankedIsomers};
use minecore::data::compound::{AnnotationResult, CandidateCompound};
use minecore::error::MineError;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{DbError, Result};

const CSV_HEADER: &str = "peak_name,adduct,id,formula,mass,generation,spectral_score,likelihood_score";

/// One flattened search hit, the row written to CSV and binary dumps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitRow {
    pub peak_name: Option<String>,
    pub adduct: Option<String>,
    pub id: String,
    pub formula: String,
    pub mass: f64,
    pub generation: u32,
    pub spectral_score: Option<u32>,
    pub likelihood_score: Option<f64>,
}

impl From<&AnnotationResult> for HitRow {
    fn from(r: &AnnotationResult) -> Self {
        HitRow {
            peak_name: r.peak_name.clone(),
            adduct: r.adduct.clone(),
            id: r.compound.id.clone(),
            formula: r.compound.formula.clone(),
            mass: r.compound.mass,
            generation: r.compound.generation,
            spectral_score: r.spectral_score,
            likelihood_score: r.likelihood_score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultFile {
    pub version: u32,
    pub hits: Vec<HitRow>,
}

impl ResultFile {
    pub fn new(hits: Vec<HitRow>) -> Self {
        Self { version: 1, hits }
    }
}

/// Output encoding, chosen by file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Csv,
    Bincode,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match extension.as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "bin" | "bincode" => Ok(OutputFormat::Bincode),
            _ => Err(MineError::UnsupportedFormat { format: format!("{extension:?} output") }.into()),
        }
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|err| DbError::Write { path: path.to_path_buf(), source: err })?;
    Ok(BufWriter::new(file))
}

/// Writes results to `path` in the format implied by its extension.
pub fn write_results(path: &Path, results: &[AnnotationResult]) -> Result<()> {
    let format = OutputFormat::from_path(path)?;
    let mut writer = create(path)?;
    match format {
        OutputFormat::Json => write_json(&mut writer, results)?,
        OutputFormat::Csv => write_csv(&mut writer, results)
            .map_err(|err| DbError::Write { path: path.to_path_buf(), source: err })?,
        OutputFormat::Bincode => {
            let file = ResultFile::new(results.iter().map(HitRow::from).collect());
            bincode::serde::encode_into_std_write(&file, &mut writer, bincode::config::standard())?;
        }
    }
    writer
        .flush()
        .map_err(|err| DbError::Write { path: path.to_path_buf(), source: err })?;
    info!(path = %path.display(), hits = results.len(), "wrote results");
    Ok(())
}

// --- JSON (full result records) ---
pub fn write_json<W: Write, T: Serialize + ?Sized>(writer: W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

// --- CSV (one row per hit) ---
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn optional<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

fn csv_row(row: HitRow) -> String {
    format!(
        "{},{},{},{},{},{},{},{}",
        csv_field(&row.peak_name.unwrap_or_default()),
        csv_field(&row.adduct.unwrap_or_default()),
        csv_field(&row.id),
        csv_field(&row.formula),
        row.mass,
        row.generation,
        optional(&row.spectral_score),
        optional(&row.likelihood_score),
    )
}

pub fn write_csv<W: Write>(mut writer: W, results: &[AnnotationResult]) -> std::io::Result<()> {
    writeln!(writer, "{CSV_HEADER}")?;
    for row in results.iter().map(HitRow::from) {
        writeln!(writer, "{}", csv_row(row))?;
    }
    Ok(())
}

/// Ranked isomers as CSV, one row per isomer prefixed by its rank.
pub fn write_ranked_csv<W: Write>(mut writer: W, ranked: &[RankedIsomers]) -> std::io::Result<()> {
    writeln!(writer, "rank,{CSV_HEADER}")?;
    for group in ranked {
        let ranks = [
            (IsomerRank::Known, &group.known),
            (IsomerRank::Native, &group.native),
            (IsomerRank::Other, &group.other),
        ];
        for (rank, isomers) in ranks {
            for row in isomers.iter().map(HitRow::from) {
                writeln!(writer, "{rank:?},{}", csv_row(row))?;
            }
        }
    }
    Ok(())
}

/// Writes ranked isomers to `path` as JSON or CSV.
pub fn write_ranked(path: &Path, ranked: &[RankedIsomers]) -> Result<()> {
    let format = OutputFormat::from_path(path)?;
    let mut writer = create(path)?;
    match format {
        OutputFormat::Json => write_json(&mut writer, ranked)?,
        OutputFormat::Csv => write_ranked_csv(&mut writer, ranked)
            .map_err(|err| DbError::Write { path: path.to_path_buf(), source: err })?,
        OutputFormat::Bincode => {
            return Err(MineError::UnsupportedFormat { format: "binary ranked output".to_string() }.into());
        }
    }
    writer
        .flush()
        .map_err(|err| DbError::Write { path: path.to_path_buf(), source: err })?;
    info!(path = %path.display(), formulas = ranked.len(), "wrote ranked isomers");
    Ok(())
}

// --- Bincode ---
pub fn load_bincode(path: &Path) -> Result<Vec<HitRow>> {
    let file = File::open(path).map_err(|err| DbError::Read { path: path.to_path_buf(), source: err })?;
    let mut reader = BufReader::new(file);
    let file: ResultFile = bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())?;
    Ok(file.hits)
}

/// Renders the reference spectra at `energy_level` of `compounds` as an MSP library.
///
/// Compounds without a spectrum at that level are skipped.
pub fn export_spectra_msp(compounds: &[CandidateCompound], energy_level: u32) -> String {
    let mut out = String::new();
    for compound in compounds {
        let Some(spectrum) = compound.reference_spectrum(energy_level) else {
            continue;
        };
        // writing into a String cannot fail
        let _ = writeln!(out, "NAME: {}", compound.display_name());
        let _ = writeln!(out, "ID: {}", compound.id);
        let _ = writeln!(out, "FORMULA: {}", compound.formula);
        let _ = writeln!(out, "EXACTMASS: {}", compound.mass);
        if let Some(smiles) = &compound.smiles {
            let _ = writeln!(out, "SMILES: {smiles}");
        }
        let _ = writeln!(out, "GENERATION: {}", compound.generation);
        let _ = writeln!(out, "ENERGY: {energy_level}");
        let _ = writeln!(out, "Num Peaks: {}", spectrum.len());
        let _ = write!(out, "{spectrum}");
        out.push('\n');
    }
    out
}
