use std::path::PathBuf;

/// Errors raised by the annotation engine.
#[derive(Debug, thiserror::Error)]
pub enum MineError {
    #[error(
        "Invalid charge specification {token:?}. Use \"+\" or \"Positive\" for positive ions and \"-\" or \"Negative\" for negative ions."
    )]
    InvalidPolarity { token: String },
    #[error("{format} files are not supported.")]
    UnsupportedFormat { format: String },
    #[error("Peak {peak:?} carries no fragment spectrum to score.")]
    EmptyFragmentSpectrum { peak: String },
    #[error("Invariant violated: {message}")]
    InvariantViolation { message: String },
    #[error("Compound store query failed: {source}")]
    Store {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Failed to read adduct table at {path:?}.")]
    ReadAdductTable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed adduct table line {line}: {message}")]
    AdductTable { line: usize, message: String },
    #[error("{message}")]
    InvalidInput { message: String },
    #[error("Metabolic model {id:?} does not exist in the compound store.")]
    UnknownModel { id: String },
    #[error("{query} was not found in the database.")]
    CompoundNotFound { query: String },
}

impl MineError {
    /// Wraps a backend failure raised by a compound store.
    pub fn store<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Store { source: Box::new(source) }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput { message: message.into() }
    }
}

pub type Result<T, E = MineError> = std::result::Result<T, E>;
