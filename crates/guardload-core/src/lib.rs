//! Core domain types for the guardrail load-test engine.
//!
//! Everything in this crate is pure data and arithmetic: request shapes,
//! the rolling statistics window, persisted history records and the
//! post-run analysis. I/O lives in `guardload-storage` and
//! `guardload-service`.

pub mod analysis;
pub mod error;
pub mod history;
pub mod ids;
pub mod request;
pub mod stats;
pub mod target;

pub use analysis::{analyze, PerformanceAnalysis};
pub use error::{CoreError, CoreResult};
pub use history::{FinalStats, HistoryMeta, HistoryPoint, RunStatus, TestHistoryRecord};
pub use ids::TestId;
pub use request::{FatigueConfig, LoadProfile, StepConfig, TestPlan, TestRequest, TestType};
pub use stats::{percentile, round2, StatsWindow, WindowSample};
pub use target::{GuardrailPayload, TargetConfig};
