//! Background job scheduling.

mod job_runner;

pub use job_runner::JobRunner;
