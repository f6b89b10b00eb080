//! Job scheduling subsystem
//!
//! A fixed set of named jobs, declared once at start, scheduled by
//! descriptor:
//! - `JobRegistry`: validated, immutable descriptors
//! - `JobGate`: single-flight and conflict admission
//! - `JobEngine`: timers, runs, chaining, cancellation and shutdown
//! - `JobHistory`: persistence that logs instead of failing callers
//! - `JobSchedulingApi`: admin verbs and exit codes

pub mod api;
pub mod gate;
pub mod handler;
pub mod history;
pub mod job_engine;
pub mod registry;
pub mod types;

pub use api::{ExitStatus, JobSchedulingApi, SchedulingHealthStatus};
pub use gate::{Denied, GatePermit, JobGate};
pub use handler::{FnJobHandler, JobContext, JobHandler, job_fn};
pub use history::JobHistory;
pub use job_engine::{JobEngine, JobEngineBuilder};
pub use registry::JobRegistry;
pub use types::*;
