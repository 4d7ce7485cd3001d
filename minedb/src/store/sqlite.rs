use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use minecore::data::compound::{CandidateCompound, Fingerprint, Source};
use minecore::data::model::MetabolicModel;
use minecore::data::spectrum::MzSpectrum;
use minecore::error::{MineError, Result as MineResult};
use minecore::store::{Collection, CompoundStore, MassQuery};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{DbError, Result};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS compounds (
    id TEXT PRIMARY KEY,
    formula TEXT NOT NULL,
    mass REAL NOT NULL,
    charge INTEGER NOT NULL DEFAULT 0,
    generation INTEGER NOT NULL DEFAULT 0,
    logp REAL,
    kovats_min REAL,
    kovats_max REAL,
    fp_len INTEGER NOT NULL,
    fingerprint TEXT NOT NULL,
    sources TEXT NOT NULL,
    spectra TEXT NOT NULL,
    smiles TEXT,
    names TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_compounds_mass ON compounds (mass, charge);
CREATE INDEX IF NOT EXISTS idx_compounds_fp_len ON compounds (fp_len);
CREATE INDEX IF NOT EXISTS idx_compounds_formula ON compounds (formula);
CREATE TABLE IF NOT EXISTS compound_names (
    compound_id TEXT NOT NULL,
    name TEXT NOT NULL COLLATE NOCASE
);
CREATE INDEX IF NOT EXISTS idx_compound_names ON compound_names (name);
CREATE INDEX IF NOT EXISTS idx_compound_names_id ON compound_names (compound_id);
CREATE TABLE IF NOT EXISTS models (
    id TEXT PRIMARY KEY,
    name TEXT,
    compound_ids TEXT NOT NULL,
    operators TEXT NOT NULL
);
";

const COMPOUND_COLUMNS: &str =
    "id, formula, mass, charge, generation, logp, kovats_min, kovats_max, fingerprint, sources, spectra, smiles, names";

/// Bulk-import document: compound records and metabolic models.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Library {
    #[serde(default)]
    pub compounds: Vec<CandidateCompound>,
    #[serde(default)]
    pub models: Vec<MetabolicModel>,
}

/// A compound library stored in SQLite, indexed on mass and fingerprint cardinality.
#[derive(Debug)]
pub struct SqliteStore {
    pub connection: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let connection = Connection::open(path)?;
        let store = Self { connection };
        store.ensure_schema()?;
        info!(path = %path.display(), "opened compound store");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        let store = Self { connection };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn ensure_schema(&self) -> Result<()> {
        self.connection.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Inserts or replaces compounds in one transaction.
    pub fn import_compounds(&mut self, compounds: &[CandidateCompound]) -> Result<usize> {
        let tx = self.connection.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO compounds
                 (id, formula, mass, charge, generation, logp, kovats_min, kovats_max,
                  fp_len, fingerprint, sources, spectra, smiles, names)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            )?;
            let mut clear_names = tx.prepare("DELETE FROM compound_names WHERE compound_id = ?1")?;
            let mut insert_name = tx.prepare("INSERT INTO compound_names (compound_id, name) VALUES (?1, ?2)")?;
            for compound in compounds {
                clear_names.execute([&compound.id])?;
                for name in &compound.names {
                    insert_name.execute(params![compound.id, name])?;
                }
                stmt.execute(params![
                    compound.id,
                    compound.formula,
                    compound.mass,
                    compound.charge,
                    compound.generation,
                    compound.logp,
                    compound.kovats.map(|k| k.0),
                    compound.kovats.map(|k| k.1),
                    compound.fingerprint_len() as i64,
                    serde_json::to_string(compound.fingerprint.bits())?,
                    serde_json::to_string(&compound.sources)?,
                    serde_json::to_string(&compound.reference_spectra)?,
                    compound.smiles,
                    serde_json::to_string(&compound.names)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(compounds.len())
    }

    /// Inserts or replaces metabolic models in one transaction.
    pub fn import_models(&mut self, models: &[MetabolicModel]) -> Result<usize> {
        for model in models {
            model.validate()?;
        }
        let tx = self.connection.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO models (id, name, compound_ids, operators) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for model in models {
                let mut compound_ids: Vec<&String> = model.parent_compound_ids.iter().collect();
                compound_ids.sort();
                stmt.execute(params![
                    model.id,
                    model.name,
                    serde_json::to_string(&compound_ids)?,
                    serde_json::to_string(&model.operator_reliability)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(models.len())
    }

    /// Loads a JSON [`Library`] document into the store.
    pub fn import_json(&mut self, path: &Path) -> Result<(usize, usize)> {
        let file = File::open(path).map_err(|err| DbError::Read { path: path.to_path_buf(), source: err })?;
        let library: Library = serde_json::from_reader(BufReader::new(file))?;
        let compounds = self.import_compounds(&library.compounds)?;
        let models = self.import_models(&library.models)?;
        info!(path = %path.display(), compounds, models, "imported library");
        Ok((compounds, models))
    }

    pub fn compound_count(&self) -> Result<usize> {
        let count: i64 = self.connection.query_row("SELECT COUNT(*) FROM compounds", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Compounds carrying a reference spectrum at `energy_level`, optionally restricted to
    /// compounds in or directly derived from a model and to known (generation 0) compounds.
    pub fn spectra_library(
        &self,
        energy_level: u32,
        model: Option<&MetabolicModel>,
        known_only: bool,
    ) -> Result<Vec<CandidateCompound>> {
        let sql = format!("SELECT {COMPOUND_COLUMNS} FROM compounds WHERE spectra != '{{}}' ORDER BY rowid");
        let compounds = self.query_compounds(&sql, &[])?;
        Ok(compounds
            .into_iter()
            .filter(|c| c.reference_spectrum(energy_level).is_some())
            .filter(|c| !known_only || c.generation == 0)
            .filter(|c| {
                model.is_none_or(|m| {
                    m.contains_parent(&c.id) || c.sources.iter().any(|s| m.contains_parent(&s.compound_id))
                })
            })
            .collect())
    }

    fn query_compounds(&self, sql: &str, values: &[Value]) -> rusqlite::Result<Vec<CandidateCompound>> {
        let mut stmt = self.connection.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), compound_from_row)?;
        let mut compounds = Vec::new();
        for compound in rows {
            compounds.push(compound?);
        }
        Ok(compounds)
    }
}

/// SQLite integer for a count, saturating at `i64::MAX`.
fn integer(n: usize) -> Value {
    Value::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

fn json_column<T: DeserializeOwned>(row: &Row, index: usize) -> rusqlite::Result<T> {
    let text: String = row.get(index)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn compound_from_row(row: &Row) -> rusqlite::Result<CandidateCompound> {
    let kovats_min: Option<f64> = row.get(6)?;
    let kovats_max: Option<f64> = row.get(7)?;
    let bits: Vec<u32> = json_column(row, 8)?;
    let sources: Vec<Source> = json_column(row, 9)?;
    let reference_spectra: BTreeMap<u32, MzSpectrum> = json_column(row, 10)?;
    let names: Vec<String> = json_column(row, 12)?;

    Ok(CandidateCompound {
        id: row.get(0)?,
        formula: row.get(1)?,
        mass: row.get(2)?,
        charge: row.get(3)?,
        generation: row.get(4)?,
        logp: row.get(5)?,
        kovats: kovats_min.zip(kovats_max),
        fingerprint: Fingerprint::new(bits),
        sources,
        reference_spectra,
        smiles: row.get(11)?,
        names,
    })
}

impl CompoundStore for SqliteStore {
    fn find_by_mass(&self, query: &MassQuery) -> MineResult<Vec<CandidateCompound>> {
        let mut sql = format!("SELECT {COMPOUND_COLUMNS} FROM compounds WHERE mass >= ?1 AND mass <= ?2 AND charge = ?3");
        let mut values = vec![
            Value::Real(query.min_mass),
            Value::Real(query.max_mass),
            Value::Integer(query.charge as i64),
        ];
        if let Some((lo, hi)) = query.logp_range {
            sql.push_str(&format!(" AND logp >= ?{} AND logp <= ?{}", values.len() + 1, values.len() + 2));
            values.extend([Value::Real(lo), Value::Real(hi)]);
        }
        if let Some((lo, hi)) = query.kovats_range {
            sql.push_str(&format!(" AND kovats_min <= ?{} AND kovats_max >= ?{}", values.len() + 1, values.len() + 2));
            values.extend([Value::Real(hi), Value::Real(lo)]);
        }
        sql.push_str(" ORDER BY rowid");

        self.query_compounds(&sql, &values).map_err(MineError::store)
    }

    fn find_by_fingerprint_cardinality(&self, min: usize, max: usize) -> MineResult<Vec<CandidateCompound>> {
        let sql = format!("SELECT {COMPOUND_COLUMNS} FROM compounds WHERE fp_len >= ?1 AND fp_len <= ?2 ORDER BY rowid");
        self.query_compounds(&sql, &[integer(min), integer(max)])
            .map_err(MineError::store)
    }

    fn find_by_fingerprint_superset(&self, bits: &Fingerprint) -> MineResult<Vec<CandidateCompound>> {
        let sql = format!("SELECT {COMPOUND_COLUMNS} FROM compounds WHERE fp_len >= ?1 ORDER BY rowid");
        let candidates = self
            .query_compounds(&sql, &[integer(bits.cardinality())])
            .map_err(MineError::store)?;
        Ok(candidates.into_iter().filter(|c| c.fingerprint.contains_all(bits)).collect())
    }

    fn metabolic_model(&self, id: &str) -> MineResult<Option<MetabolicModel>> {
        let mut stmt = self
            .connection
            .prepare("SELECT id, name, compound_ids, operators FROM models WHERE id = ?1")
            .map_err(MineError::store)?;
        let mut rows = stmt
            .query_map([id], |row| {
                let compound_ids: HashSet<String> = json_column(row, 2)?;
                let operators: HashMap<String, f64> = json_column(row, 3)?;
                let mut model = MetabolicModel::new(row.get::<_, String>(0)?, compound_ids, operators);
                model.name = row.get(1)?;
                Ok(model)
            })
            .map_err(MineError::store)?;
        rows.next().transpose().map_err(MineError::store)
    }

    fn compounds_by_ids(&self, ids: &[String]) -> MineResult<Vec<CandidateCompound>> {
        let sql = format!("SELECT {COMPOUND_COLUMNS} FROM compounds WHERE id = ?1");
        let mut compounds = Vec::with_capacity(ids.len());
        for id in ids {
            let hit = self
                .query_compounds(&sql, &[Value::Text(id.clone())])
                .map_err(MineError::store)?;
            compounds.extend(hit);
        }
        Ok(compounds)
    }

    fn find_by_formula(&self, formula: &str) -> MineResult<Vec<CandidateCompound>> {
        let sql = format!("SELECT {COMPOUND_COLUMNS} FROM compounds WHERE formula = ?1 ORDER BY rowid");
        self.query_compounds(&sql, &[Value::Text(formula.to_string())])
            .map_err(MineError::store)
    }

    fn find_by_name(&self, name: &str) -> MineResult<Vec<CandidateCompound>> {
        // NOCASE folds ASCII only, lowercase here covers the rest
        let wanted = name.to_lowercase();
        let sql = format!(
            "SELECT {COMPOUND_COLUMNS} FROM compounds WHERE id IN
             (SELECT compound_id FROM compound_names WHERE name = ?1) ORDER BY rowid"
        );
        let compounds = self
            .query_compounds(&sql, &[Value::Text(name.to_string())])
            .map_err(MineError::store)?;
        Ok(compounds
            .into_iter()
            .filter(|c| c.names.iter().any(|n| n.to_lowercase() == wanted))
            .collect())
    }

    fn ids(&self, collection: Collection) -> MineResult<Vec<String>> {
        let sql = match collection {
            Collection::Compounds => "SELECT id FROM compounds ORDER BY rowid",
            Collection::Models => "SELECT id FROM models ORDER BY id",
        };
        let mut stmt = self.connection.prepare(sql).map_err(MineError::store)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(MineError::store)?;
        rows.collect::<rusqlite::Result<Vec<String>>>().map_err(MineError::store)
    }
}

/// A [`SqliteStore`] behind a mutex, shareable by parallel batch annotation.
#[derive(Debug)]
pub struct SharedSqliteStore {
    inner: Mutex<SqliteStore>,
}

impl SharedSqliteStore {
    pub fn new(store: SqliteStore) -> Self {
        Self { inner: Mutex::new(store) }
    }

    fn lock(&self) -> MutexGuard<'_, SqliteStore> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn into_inner(self) -> SqliteStore {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CompoundStore for SharedSqliteStore {
    fn find_by_mass(&self, query: &MassQuery) -> MineResult<Vec<CandidateCompound>> {
        self.lock().find_by_mass(query)
    }

    fn find_by_fingerprint_cardinality(&self, min: usize, max: usize) -> MineResult<Vec<CandidateCompound>> {
        self.lock().find_by_fingerprint_cardinality(min, max)
    }

    fn find_by_fingerprint_superset(&self, bits: &Fingerprint) -> MineResult<Vec<CandidateCompound>> {
        self.lock().find_by_fingerprint_superset(bits)
    }

    fn metabolic_model(&self, id: &str) -> MineResult<Option<MetabolicModel>> {
        self.lock().metabolic_model(id)
    }

    fn compounds_by_ids(&self, ids: &[String]) -> MineResult<Vec<CandidateCompound>> {
        self.lock().compounds_by_ids(ids)
    }

    fn find_by_formula(&self, formula: &str) -> MineResult<Vec<CandidateCompound>> {
        self.lock().find_by_formula(formula)
    }

    fn find_by_name(&self, name: &str) -> MineResult<Vec<CandidateCompound>> {
        self.lock().find_by_name(name)
    }

    fn ids(&self, collection: Collection) -> MineResult<Vec<String>> {
        self.lock().ids(collection)
    }
}
