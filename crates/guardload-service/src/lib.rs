//! Load generation against the guardrail rule-run endpoint.
//!
//! [`LoadRunner`] owns at most one active run. It drives a [`LoadProfile`]
//! (fatigue or step), whose workers hammer the target through a
//! [`RequestIssuer`] and feed a shared statistics window. Finished runs are
//! analysed and handed to a [`guardload_storage::HistoryStore`].
//!
//! [`LoadProfile`]: guardload_core::LoadProfile

pub mod config;
pub mod issuer;
pub mod profile;
pub mod runner;
pub mod worker;

pub use config::{
    Config, ConfigError, LoggingConfig, RunnerConfig, RunnerSettings, ServerConfig,
    TargetEndpointConfig,
};
pub use issuer::{probe, DryRunResult, HttpRequestIssuer, IssueError, RequestIssuer};
pub use profile::ProfileOutcome;
pub use runner::{LoadRunner, StatusSnapshot};
pub use worker::{RunContext, Worker, WorkerPool};
