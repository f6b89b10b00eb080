//! Domain models shared by the job engine, the jobs and the source selector

pub mod job;
pub mod provider;
pub mod title;

pub use job::*;
pub use provider::*;
pub use title::*;
