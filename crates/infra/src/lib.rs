//! Infrastructure layer: persistence, application services, background jobs.

pub mod jobs;
pub mod services;
pub mod store;
