//! Error type definitions for the news-harvester application
//!
//! Configuration errors fail fast at submission time, before a job record is
//! created. Execution errors are captured into the job record instead of
//! being thrown across the async boundary, since no caller is synchronously
//! waiting on a background job.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Caller input violates a type-specific constraint; rejected before any
    /// job is created and never retried
    #[error("Invalid configuration: {field} - {message}")]
    InvalidConfig { field: String, message: String },

    /// Query or delete against an unknown resource
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Pipeline execution errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Client-side transport failures (a status query itself could not
    /// complete)
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Filesystem errors from artifact handling
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal errors, including illegal job state transitions
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Pipeline execution specific errors
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The executor failed while the job was running; surfaced through the
    /// job record's `error` field
    #[error("Execution failed: {stage} - {message}")]
    Execution { stage: String, message: String },

    /// A concurrency pool slot could not be obtained before the bound
    /// elapsed; treated as a failure of the affected sub-operation
    #[error("Pool '{pool}' exhausted: no free slot within {waited_ms}ms")]
    PoolTimeout { pool: String, waited_ms: u64 },

    /// A network-bound sub-operation exceeded its per-operation timeout
    #[error("Fetch timed out: {url}")]
    FetchTimeout { url: String },

    /// A required input artifact does not exist
    #[error("Input not found: {path}")]
    MissingInput { path: String },

    /// Filesystem errors while reading or writing artifacts
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSONL rows or result payloads
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Create an invalid configuration error
    pub fn invalid_config<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a not found error for a specific resource
    pub fn not_found<R: Into<String>, I: ToString>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            message: err.to_string(),
        }
    }
}

impl PipelineError {
    /// Create an execution error for a named pipeline stage
    pub fn execution<S: Into<String>, M: Into<String>>(stage: S, message: M) -> Self {
        Self::Execution {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create a pool exhaustion timeout error
    pub fn pool_timeout<P: Into<String>>(pool: P, waited_ms: u64) -> Self {
        Self::PoolTimeout {
            pool: pool.into(),
            waited_ms,
        }
    }

    /// Create a fetch timeout error
    pub fn fetch_timeout<U: Into<String>>(url: U) -> Self {
        Self::FetchTimeout { url: url.into() }
    }

    /// Create a missing input error
    pub fn missing_input<P: Into<String>>(path: P) -> Self {
        Self::MissingInput { path: path.into() }
    }
}
