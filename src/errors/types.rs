//! Error type definitions for the IPTV arbiter
//!
//! This module defines all error types used throughout the application,
//! providing a hierarchical error system that keeps the job engine, the
//! storage adapters and the upstream provider clients apart.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Storage adapter errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Upstream provider errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Job engine errors
    #[error("Job error: {0}")]
    Job(#[from] JobError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage adapter errors (job history, providers, titles)
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backing store could not be reached or read
    #[error("Storage unavailable: {message}")]
    Unavailable { message: String },

    /// A write did not make it to the backing store
    #[error("Persist failed for {collection}: {message}")]
    PersistFailed { collection: String, message: String },

    /// Record not found
    #[error("Record not found: {collection} with id {id}")]
    RecordNotFound { collection: String, id: String },

    /// Data serialization/deserialization failures
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failures of file-backed stores
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Upstream provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Authentication against the provider failed; the provider should be
    /// treated as unavailable until the next successful refresh
    #[error("Provider unavailable: {provider_id} - {message}")]
    Unavailable { provider_id: String, message: String },

    /// Network connection timeouts
    #[error("Connection timeout: {url}")]
    Timeout { url: String },

    /// HTTP errors from the provider
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    /// Responses that could not be understood
    #[error("Parse error: {provider_type} - {message}")]
    Parse {
        provider_type: String,
        message: String,
    },

    /// Invalid provider configuration
    #[error("Invalid configuration: {field} - {message}")]
    InvalidConfig { field: String, message: String },

    /// The provider type has no client
    #[error("Unsupported provider type: {provider_type}")]
    Unsupported { provider_type: String },

    /// Cooperative cancellation was observed mid-request
    #[error("Request cancelled")]
    Cancelled,

    /// Transport errors from the HTTP client
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Job engine errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The job already has a live execution
    #[error("Job '{name}' is already running")]
    AlreadyRunning { name: String },

    /// A conflicting job is running
    #[error("Job '{name}' is blocked by running job(s): {}", blockers.join(", "))]
    BlockedByConflict { name: String, blockers: Vec<String> },

    /// Unknown job name
    #[error("Job '{name}' not found")]
    NotFound { name: String },

    /// Cooperative abort was observed
    #[error("Job '{name}' was cancelled")]
    Cancelled { name: String },

    /// The job body returned an error
    #[error("Job '{name}' failed: {message}")]
    Failed { name: String, message: String },

    /// `start()` was called twice
    #[error("Job engine already started")]
    AlreadyStarted,

    /// `start()` was called before `initialize()` succeeded
    #[error("Job engine not initialized")]
    NotInitialized,

    /// Job history could not be queried at initialization
    #[error("Job history storage unavailable: {message}")]
    StorageUnavailable { message: String },

    /// A descriptor has no registered handler
    #[error("No handler registered for job(s): {}", names.join(", "))]
    MissingHandler { names: Vec<String> },
}

/// Configuration and descriptor validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Duration strings must match `^\d+(ms|s|m|h|d)?$`
    #[error("Invalid duration '{value}': expected digits with optional ms/s/m/h/d unit")]
    InvalidDuration { value: String },

    /// Job descriptor set failed validation
    #[error("Invalid job registry: {message}")]
    InvalidRegistry { message: String },

    /// A configuration value is out of range
    #[error("Invalid configuration value for {field}: {message}")]
    Invalid { field: String, message: String },

    /// Configuration file could not be loaded
    #[error("Failed to load configuration: {message}")]
    Load { message: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }
}

impl StorageError {
    /// Create a persist failure for a collection
    pub fn persist_failed<C: Into<String>, M: Into<String>>(collection: C, message: M) -> Self {
        Self::PersistFailed {
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// Create an unavailable error
    pub fn unavailable<M: Into<String>>(message: M) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

impl ProviderError {
    /// Create an unavailable error for a provider
    pub fn unavailable<P: Into<String>, M: Into<String>>(provider_id: P, message: M) -> Self {
        Self::Unavailable {
            provider_id: provider_id.into(),
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse<T: Into<String>, M: Into<String>>(provider_type: T, message: M) -> Self {
        Self::Parse {
            provider_type: provider_type.into(),
            message: message.into(),
        }
    }
}

impl ConfigError {
    pub fn invalid<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invalid_registry<M: Into<String>>(message: M) -> Self {
        Self::InvalidRegistry {
            message: message.into(),
        }
    }
}
