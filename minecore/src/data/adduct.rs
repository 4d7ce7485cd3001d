use std::fmt::{self, Display, Formatter};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MineError, Result};

/// Name of the adduct that marks compounds already carrying a permanent positive charge.
pub const INNATE_CHARGE_ADDUCT: &str = "[M]+";

/// Ionization mode of a peak or an adduct table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    #[default]
    Positive,
    Negative,
}

impl FromStr for Polarity {
    type Err = MineError;

    /// Accepts `+`, `positive`, `pos`, `true` and `-`, `negative`, `neg`, `false`, case-insensitively.
    fn from_str(token: &str) -> Result<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "+" | "positive" | "pos" | "true" => Ok(Polarity::Positive),
            "-" | "negative" | "neg" | "false" => Ok(Polarity::Negative),
            _ => Err(MineError::InvalidPolarity { token: token.to_string() }),
        }
    }
}

impl Display for Polarity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Polarity::Positive => write!(f, "Positive"),
            Polarity::Negative => write!(f, "Negative"),
        }
    }
}

/// A named ionization rule relating a neutral mass to an observed m/z.
///
/// `mz = mass * mass_multiplier + mass_offset`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdductRule {
    pub name: String,
    pub mass_multiplier: f64,
    pub mass_offset: f64,
}

impl AdductRule {
    /// Creates a new adduct rule.
    ///
    /// # Arguments
    ///
    /// * `name` - the adduct name, e.g. "[M+H]+"
    /// * `mass_multiplier` - strictly positive mass multiplier
    /// * `mass_offset` - signed offset in Dalton
    ///
    /// # Examples
    ///
    /// ```
    /// use minecore::data::adduct::AdductRule;
    ///
    /// let rule = AdductRule::new("[M+H]+", 1.0, 1.007276).unwrap();
    /// assert!((rule.neutral_mass(181.0712) - 180.063924).abs() < 1e-9);
    /// ```
    pub fn new(name: impl Into<String>, mass_multiplier: f64, mass_offset: f64) -> Result<Self> {
        let name = name.into();
        if !(mass_multiplier.is_finite() && mass_multiplier > 0.0) {
            return Err(MineError::invalid_input(format!(
                "adduct {name} has a non-positive mass multiplier {mass_multiplier}"
            )));
        }
        if !mass_offset.is_finite() {
            return Err(MineError::invalid_input(format!(
                "adduct {name} has a non-finite mass offset"
            )));
        }
        Ok(AdductRule { name, mass_multiplier, mass_offset })
    }

    /// Neutral candidate mass for an observed m/z.
    pub fn neutral_mass(&self, mz: f64) -> f64 {
        (mz - self.mass_offset) / self.mass_multiplier
    }

    /// Expected m/z of a neutral mass under this adduct.
    pub fn mz_for_mass(&self, mass: f64) -> f64 {
        mass * self.mass_multiplier + self.mass_offset
    }

    /// True for the rule matching compounds that carry their own positive charge.
    pub fn is_innate_charge(&self) -> bool {
        self.name == INNATE_CHARGE_ADDUCT
    }

    /// Charge a stored compound must have to be a hit under this rule.
    pub fn required_charge(&self) -> i32 {
        if self.is_innate_charge() {
            1
        } else {
            0
        }
    }
}

const POSITIVE_ADDUCTS: &[(&str, f64, f64)] = &[
    ("[M+3H]3+", 0.333333, 1.007276),
    ("[M+2H+Na]3+", 0.333333, 8.334590),
    ("[M+H+2Na]3+", 0.333333, 15.7661904),
    ("[M+3Na]3+", 0.333333, 22.989218),
    ("[M+2H]2+", 0.5, 1.007276),
    ("[M+H+NH4]2+", 0.5, 9.520550),
    ("[M+H+Na]2+", 0.5, 11.998247),
    ("[M+H+K]2+", 0.5, 19.985217),
    ("[M+ACN+2H]2+", 0.5, 21.520550),
    ("[M+2Na]2+", 0.5, 22.989218),
    ("[M+2ACN+2H]2+", 0.5, 42.033823),
    ("[M+3ACN+2H]2+", 0.5, 62.547097),
    ("[M+H]+", 1.0, 1.007276),
    ("[M+NH4]+", 1.0, 18.033823),
    ("[M+Na]+", 1.0, 22.989218),
    ("[M+CH3OH+H]+", 1.0, 33.033489),
    ("[M+K]+", 1.0, 38.963158),
    ("[M+ACN+H]+", 1.0, 42.033823),
    ("[M+2Na-H]+", 1.0, 44.971160),
    ("[M+IsoProp+H]+", 1.0, 61.06534),
    ("[M+ACN+Na]+", 1.0, 64.015765),
    ("[M+2K-H]+", 1.0, 76.919040),
    ("[M+DMSO+H]+", 1.0, 79.02122),
    ("[M+2ACN+H]+", 1.0, 83.060370),
    ("[M+IsoProp+Na+H]+", 1.0, 84.05511),
    ("[2M+H]+", 2.0, 1.007276),
    ("[2M+NH4]+", 2.0, 18.033823),
    ("[2M+Na]+", 2.0, 22.989218),
    ("[2M+K]+", 2.0, 38.963158),
    ("[2M+ACN+H]+", 2.0, 42.033823),
    ("[2M+ACN+Na]+", 2.0, 64.015765),
    ("[M+H-H2O]+", 1.0, -17.00329),
    ("[M]+", 1.0, 0.0),
];

const NEGATIVE_ADDUCTS: &[(&str, f64, f64)] = &[
    ("[M-3H]3-", 0.333333, -1.007276),
    ("[M-2H]2-", 0.5, -1.007276),
    ("[M-H2O-H]-", 1.0, -19.01839),
    ("[M-H]-", 1.0, -1.007276),
    ("[M+Na-2H]-", 1.0, 20.974666),
    ("[M+Cl]-", 1.0, 34.969402),
    ("[M+K-2H]-", 1.0, 36.948606),
    ("[M+FA-H]-", 1.0, 44.998201),
    ("[M+Hac-H]-", 1.0, 59.013851),
    ("[M+Br]-", 1.0, 78.918885),
    ("[M+TFA-H]-", 1.0, 112.985586),
    ("[2M-H]-", 2.0, -1.007276),
    ("[2M+FA-H]-", 2.0, 44.998201),
    ("[2M+Hac-H]-", 2.0, 59.013851),
    ("[3M-H]-", 3.0, -1.007276),
];

/// An ordered, immutable table of adduct rules for one ionization mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdductTable {
    polarity: Polarity,
    rules: Vec<AdductRule>,
}

impl AdductTable {
    pub fn new(polarity: Polarity, rules: Vec<AdductRule>) -> Self {
        AdductTable { polarity, rules }
    }

    fn from_rows(polarity: Polarity, rows: &[(&str, f64, f64)]) -> Self {
        let rules = rows
            .iter()
            .map(|&(name, mass_multiplier, mass_offset)| AdductRule {
                name: name.to_string(),
                mass_multiplier,
                mass_offset,
            })
            .collect();
        AdductTable { polarity, rules }
    }

    /// The bundled positive-mode adduct table.
    pub fn default_positive() -> Self {
        Self::from_rows(Polarity::Positive, POSITIVE_ADDUCTS)
    }

    /// The bundled negative-mode adduct table.
    pub fn default_negative() -> Self {
        Self::from_rows(Polarity::Negative, NEGATIVE_ADDUCTS)
    }

    /// Bundled table for a polarity.
    pub fn default_for(polarity: Polarity) -> Self {
        match polarity {
            Polarity::Positive => Self::default_positive(),
            Polarity::Negative => Self::default_negative(),
        }
    }

    /// Parses a whitespace-separated adduct table.
    ///
    /// Each row holds `name`, `mass_multiplier` and `mass_offset`. Blank lines and lines
    /// starting with `#` are skipped, as is a leading header row whose numeric columns
    /// are not numbers.
    ///
    /// # Examples
    ///
    /// ```
    /// use minecore::data::adduct::{AdductTable, Polarity};
    ///
    /// let text = "Name\tMultiplier\tOffset\n[M+H]+\t1\t1.007276\n[M+Na]+\t1\t22.989218\n";
    /// let table = AdductTable::from_reader(text.as_bytes(), Polarity::Positive).unwrap();
    /// assert_eq!(table.names(), vec!["[M+H]+", "[M+Na]+"]);
    /// ```
    pub fn from_reader<R: BufRead>(reader: R, polarity: Polarity) -> Result<Self> {
        let mut rules = Vec::new();
        let mut first_record = true;

        for (index, line) in reader.lines().enumerate() {
            let line_number = index + 1;
            let line = line.map_err(|e| MineError::AdductTable {
                line: line_number,
                message: e.to_string(),
            })?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = trimmed.split_whitespace().collect();
            if fields.len() != 3 {
                return Err(MineError::AdductTable {
                    line: line_number,
                    message: format!("expected 3 fields, found {}", fields.len()),
                });
            }
            // header, if any, is the first non-comment line
            if std::mem::take(&mut first_record) && fields[1].parse::<f64>().is_err() {
                continue;
            }
            let parse = |field: &str, what: &str| {
                field.parse::<f64>().map_err(|_| MineError::AdductTable {
                    line: line_number,
                    message: format!("{what} {field:?} is not a number"),
                })
            };
            let multiplier = parse(fields[1], "mass multiplier")?;
            let offset = parse(fields[2], "mass offset")?;
            let rule = AdductRule::new(fields[0], multiplier, offset).map_err(|e| {
                MineError::AdductTable { line: line_number, message: e.to_string() }
            })?;
            rules.push(rule);
        }

        Ok(AdductTable { polarity, rules })
    }

    /// Loads an adduct table from a file, see [`AdductTable::from_reader`].
    pub fn load(path: &Path, polarity: Polarity) -> Result<Self> {
        let file = File::open(path).map_err(|source| MineError::ReadAdductTable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file), polarity)
    }

    /// Restricts the table to the named adducts, keeping table order.
    ///
    /// Unknown names are rejected.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        if let Some(unknown) = names.iter().map(AsRef::as_ref).find(|n| self.get(n).is_none()) {
            return Err(MineError::invalid_input(format!(
                "unknown {} adduct {unknown:?}",
                self.polarity.to_string().to_lowercase()
            )));
        }
        let rules = self
            .rules
            .iter()
            .filter(|rule| names.iter().any(|n| n.as_ref() == rule.name))
            .cloned()
            .collect();
        Ok(AdductTable { polarity: self.polarity, rules })
    }

    /// Like [`AdductTable::select`] but silently skips names this table does not know.
    pub fn select_known<S: AsRef<str>>(&self, names: &[S]) -> Self {
        let rules = self
            .rules
            .iter()
            .filter(|rule| names.iter().any(|n| n.as_ref() == rule.name))
            .cloned()
            .collect();
        AdductTable { polarity: self.polarity, rules }
    }

    pub fn get(&self, name: &str) -> Option<&AdductRule> {
        self.rules.iter().find(|rule| rule.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|rule| rule.name.as_str()).collect()
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn iter(&self) -> impl Iterator<Item = &AdductRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
