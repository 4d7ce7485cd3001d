use std::sync::LazyLock;

use regex::Regex;

// Matches chlorine, bromine or fluorine without mistaking iron ("Fe") for fluorine.
static HALOGEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Cl|Br|F(?:[^e]|$)").expect("halogen pattern is valid"));

static FORMULA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[A-Z][a-z]?\d*)+[+-]?$").expect("formula pattern is valid"));

/// True if `text` reads as a molecular formula made of element symbols and counts,
/// with an optional trailing charge sign.
pub fn looks_like_formula(text: &str) -> bool {
    FORMULA.is_match(text)
}

/// checks whether a molecular formula contains a halogen (Cl, Br or F)
///
/// Arguments:
///
/// * `formula` - Hill-notation molecular formula, e.g. "C6H12O6"
///
/// Returns:
///
/// * `bool` - true if the formula carries chlorine, bromine or fluorine
///
/// # Examples
///
/// ```
/// use minecore::chemistry::formula::contains_halogen;
///
/// assert!(contains_halogen("C6H5Cl"));
/// assert!(contains_halogen("CF4"));
/// assert!(!contains_halogen("C34H32FeN4O4"));
/// ```
pub fn contains_halogen(formula: &str) -> bool {
    HALOGEN.is_match(formula)
}
