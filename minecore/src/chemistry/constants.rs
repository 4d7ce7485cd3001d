// Unit conversions and defaults shared by mass matching and scoring

pub const PPM: f64 = 1e6; // parts per million
pub const MDA_PER_DA: f64 = 1e3; // milli-Dalton per Dalton

// Spectral matching
pub const DEFAULT_FRAGMENT_TOLERANCE: f64 = 0.01; // Dalton, used when the precursor tolerance is in ppm
pub const SPECTRAL_SCORE_SCALE: f64 = 1000.0; // similarity scores are reported as integers on 0..=1000

// Relevance scoring
pub const DEFAULT_PARENT_FRAC: f64 = 0.75;
pub const DEFAULT_REACTION_FRAC: f64 = 0.25;
