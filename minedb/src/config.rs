use std::fs;
use std::path::{Path, PathBuf};

use minecore::algorithm::relevance::RelevanceWeights;
use minecore::data::adduct::{AdductTable, Polarity};
use minecore::params::SearchParams;
use serde::{Deserialize, Serialize};

use crate::error::{DbError, Result};

/// Runtime configuration of the `minedb` binary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite compound library.
    pub database: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Worker threads for batch annotation, 1 runs sequentially.
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Whitespace-separated adduct tables replacing the bundled ones.
    #[serde(default)]
    pub positive_adducts: Option<PathBuf>,
    #[serde(default)]
    pub negative_adducts: Option<PathBuf>,
    /// Retention-time span for clustering co-eluting peaks after MS1 searches.
    #[serde(default)]
    pub cluster_span: Option<f64>,
    #[serde(default)]
    pub search: SearchParams,
    #[serde(default)]
    pub relevance: RelevanceWeights,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_threads() -> usize {
    1
}

impl Config {
    /// Default configuration for a database path.
    pub fn for_database(database: impl Into<PathBuf>) -> Self {
        Config {
            database: database.into(),
            log_level: default_log_level(),
            threads: default_threads(),
            positive_adducts: None,
            negative_adducts: None,
            cluster_span: None,
            search: SearchParams::default(),
            relevance: RelevanceWeights::default(),
        }
    }

    /// Positive and negative adduct tables, loaded from the configured files or bundled.
    pub fn adduct_tables(&self) -> Result<(AdductTable, AdductTable)> {
        let positive = match &self.positive_adducts {
            Some(path) => AdductTable::load(path, Polarity::Positive)?,
            None => AdductTable::default_positive(),
        };
        let negative = match &self.negative_adducts {
            Some(path) => AdductTable::load(path, Polarity::Negative)?,
            None => AdductTable::default_negative(),
        };
        Ok((positive, negative))
    }
}

pub fn load(path: &Path) -> Result<Config> {
    let raw = fs::read_to_string(path)
        .map_err(|err| DbError::Read { path: path.to_path_buf(), source: err })?;

    let cfg: Config = toml::from_str(&raw)
        .map_err(|err| DbError::ParseConfig { path: path.to_path_buf(), source: err })?;

    validate(&cfg)?;

    Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
    if cfg.database.as_os_str().is_empty() {
        return Err(DbError::Validation { message: "database must be non-empty.".to_string() });
    }
    if cfg.log_level.trim().is_empty() {
        return Err(DbError::Validation { message: "log_level must be non-empty.".to_string() });
    }
    if cfg.threads == 0 {
        return Err(DbError::Validation {
            message: "threads must be greater than zero.".to_string(),
        });
    }
    if cfg.cluster_span.is_some_and(|span| !(span > 0.0)) {
        return Err(DbError::Validation {
            message: "cluster_span must be greater than zero.".to_string(),
        });
    }
    let weight = 0.0..=1.0;
    if !weight.contains(&cfg.relevance.parent_frac) || !weight.contains(&cfg.relevance.reaction_frac) {
        return Err(DbError::Validation {
            message: "relevance.parent_frac and relevance.reaction_frac must lie in [0, 1]."
                .to_string(),
        });
    }
    cfg.search
        .validate()
        .map_err(|err| DbError::Validation { message: format!("search: {err}") })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let cfg: Config = toml::from_str("database = \"mine.sqlite\"").unwrap();
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.threads, 1);
        assert_eq!(cfg.search, SearchParams::default());
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_search_section() {
        let raw = r#"
            database = "mine.sqlite"
            threads = 4

            [search]
            tolerance = 10.0
            ppm = true
            polarity = "Negative"
            logp_range = [-1.0, 3.0]
            model_ids = ["eco"]

            [relevance]
            parent_frac = 0.5
            reaction_frac = 0.5
        "#;
        let cfg: Config = toml::from_str(raw).unwrap();
        assert!(cfg.search.ppm);
        assert_eq!(cfg.search.polarity, Polarity::Negative);
        assert_eq!(cfg.search.logp_range, Some((-1.0, 3.0)));
        assert_eq!(cfg.relevance.parent_frac, 0.5);
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_rejects_zero_threads() {
        let mut cfg = Config::for_database("mine.sqlite");
        cfg.threads = 0;
        assert!(matches!(validate(&cfg), Err(DbError::Validation { .. })));
    }

    #[test]
    fn test_rejects_weight_above_one() {
        let mut cfg = Config::for_database("mine.sqlite");
        cfg.relevance.parent_frac = 1.5;
        assert!(matches!(validate(&cfg), Err(DbError::Validation { .. })));
    }

    #[test]
    fn test_rejects_inverted_range() {
        let mut cfg = Config::for_database("mine.sqlite");
        cfg.search.kovats_range = Some((1200.0, 1000.0));
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_bundled_adducts() {
        let (positive, negative) = Config::for_database("mine.sqlite").adduct_tables().unwrap();
        assert_eq!(positive.polarity(), Polarity::Positive);
        assert!(negative.get("[M-H]-").is_some());
    }
}
