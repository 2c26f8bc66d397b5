//! Crate-wide error types.
//!
//! Three classes of failure: fatal (abort the run), recoverable (retried
//! transparently inside the HTTP layer), and soft (logged, the affected
//! subtree becomes null, processing continues). [`FatalError`] models the
//! first class; [`LookupError`] models the second and third — callers
//! decide whether a given variant is worth retrying or whether to fold
//! it into a null subtree and move on.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort the run with a non-zero exit code.
#[derive(Debug, Error)]
pub enum FatalError {
    /// The handle/password credentials were rejected by the personal data
    /// server during authentication.
    #[error("credential failure authenticating as {identifier}: {source}")]
    CredentialFailure {
        /// The handle or DID that failed to authenticate.
        identifier: String,
        /// The underlying error.
        #[source]
        source: anyhow::Error,
    },

    /// The destination column-store table exists but its schema does not
    /// match the expected schema field-for-field.
    #[error(
        "schema incompatible; operator must reconcile manually\nfound:   {found}\ndesired: {desired}"
    )]
    SchemaIncompatible {
        /// JSON rendering of the schema found on the existing table.
        found: String,
        /// JSON rendering of the schema this crate expects to write.
        desired: String,
    },

    /// A required input file (census file, intermediate-state file, CAR
    /// input folder) could not be read.
    #[error("unable to read required input {path}: {source}")]
    UnreadableInput {
        /// The path that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The output destination (file or column-store table) could not be
    /// created or opened.
    #[error("failed to set up output sink: {0}")]
    SinkSetupFailed(#[source] anyhow::Error),

    /// Neither `output-file` nor `output-bq-table` was configured.
    #[error("no output sink configured; pass --output-file or --output-bq-table")]
    NoSinkConfigured,
}

/// Errors from a single network-bound lookup (identity, profile, post,
/// repo download). Distinguishing `Network` from `NonNetwork` lets the
/// retrying HTTP layer retry only the former.
#[derive(Debug, Error, Clone)]
pub enum LookupError {
    /// A transport-level failure (timeout, connection reset, DNS failure)
    /// or a 5xx/429 response. Eligible for retry.
    #[error("network error: {0}")]
    Network(String),

    /// A well-formed response indicating the lookup target does not exist,
    /// or a 4xx (other than 429) response. Not retried; eligible for
    /// negative caching.
    #[error("not found or rejected: {0}")]
    NonNetwork(String),

    /// The identifier was not syntactically valid (not parseable as a DID
    /// or handle).
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}

impl LookupError {
    /// Whether this error class should be retried by the HTTP retry layer.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}
