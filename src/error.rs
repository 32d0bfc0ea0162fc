use camino::Utf8PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ScrapeError {
    #[error("unknown species: {value} (valid: {valid})")]
    #[diagnostic(help("species names follow IMGT capitalization, e.g. \"Homo sapiens\""))]
    InvalidSpecies { value: String, valid: String },

    #[error("unknown sequence type: {value} (valid: IG, TCR)")]
    InvalidSequenceType { value: String },

    #[error("unknown frame selection: {value} (valid: all, in-frame, in-frame-gaps)")]
    InvalidFrameSelection { value: String },

    #[error("failed to read config file at {path}: {message}")]
    ConfigRead { path: Utf8PathBuf, message: String },

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid IMGT base url: {0}")]
    InvalidBaseUrl(String),

    #[error("IMGT request to {url} failed: {message}")]
    Http {
        url: String,
        message: String,
        transient: bool,
    },

    #[error("IMGT returned status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("listing page for {species} unavailable at {url}: {reason}")]
    #[diagnostic(help("check the species name and network access to the IMGT host"))]
    ListingUnavailable {
        species: String,
        url: String,
        reason: String,
    },

    #[error("no FASTA block found on page {0}")]
    MissingFasta(String),

    #[error("malformed FASTA in {path}: {message}")]
    Fasta { path: Utf8PathBuf, message: String },

    #[error("cannot create output directory {path}: {message}")]
    OutputDir { path: Utf8PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl ScrapeError {
    /// Errors worth another attempt: transport hiccups and throttling/5xx statuses.
    pub fn is_transient(&self) -> bool {
        match self {
            ScrapeError::Http { transient, .. } => *transient,
            ScrapeError::Status { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ScrapeError::InvalidSpecies { .. }
                | ScrapeError::InvalidSequenceType { .. }
                | ScrapeError::InvalidFrameSelection { .. }
                | ScrapeError::ConfigRead { .. }
                | ScrapeError::ConfigParse(_)
                | ScrapeError::InvalidBaseUrl(_)
        )
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}
