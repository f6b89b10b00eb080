//! Storage adapters consumed by the job engine and the source selector
//!
//! # Architecture
//!
//! - [`traits`]: the storage surface (`JobHistoryRepository`,
//!   `ProviderRepository`, `TitleRepository`)
//! - [`job_history`]: in-memory and JSON-file job history
//! - [`memory`]: in-memory provider and title stores with JSON snapshots
//!
//! # Usage
//!
//! ```rust
//! use iptv_arbiter::repositories::{InMemoryJobHistory, JobHistoryRepository};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let history = InMemoryJobHistory::new();
//!     let recovered = history.reset_running_to_cancelled().await?;
//!     assert_eq!(recovered, 0);
//!     Ok(())
//! }
//! ```

pub mod job_history;
pub mod memory;
pub mod traits;

pub use job_history::{InMemoryJobHistory, JsonFileJobHistory};
pub use memory::{CatalogSnapshot, InMemoryProviderRepository, InMemoryTitleRepository};
pub use traits::*;
