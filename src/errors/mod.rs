//! Centralized error handling for the IPTV arbiter
//!
//! # Error Categories
//!
//! - **Storage Errors**: job history, provider and title store failures
//! - **Provider Errors**: upstream authentication, catalog and transport failures
//! - **Job Errors**: engine admission (already running, blocked, not found) and run failures
//! - **Config Errors**: duration strings and job descriptor validation
//!
//! # Usage
//!
//! ```rust
//! use iptv_arbiter::errors::{AppError, AppResult};
//!
//! async fn example_function() -> AppResult<String> {
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for storage adapter Results
pub type StorageResult<T> = Result<T, StorageError>;

/// Convenience type alias for provider client Results
pub type ProviderResult<T> = Result<T, ProviderError>;
