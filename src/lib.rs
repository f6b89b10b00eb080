pub mod config;
pub mod errors;
pub mod job_scheduling;
pub mod jobs;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod services;
pub mod sources;
pub mod utils;
