//! Test submission shapes and the validated load profile.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::target::TargetConfig;

/// Minimum total duration of a fatigue test, in seconds.
pub const MIN_FATIGUE_DURATION_SECS: u64 = 10;

/// Minimum duration of one step stage, in seconds.
pub const MIN_STEP_DURATION_SECS: u64 = 5;

/// Kind of load shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestType {
    /// Constant concurrency for a fixed duration.
    Fatigue,
    /// Concurrency increased in discrete stages.
    Step,
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatigue => write!(f, "FATIGUE"),
            Self::Step => write!(f, "STEP"),
        }
    }
}

/// Fatigue test parameters as submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatigueConfig {
    /// Number of concurrent workers (default: 10, min 1)
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Total duration in seconds (default: 60, min 10)
    #[serde(default = "default_fatigue_duration")]
    pub duration: u64,
}

/// Step test parameters as submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Workers in the first stage (default: 1, min 1)
    #[serde(default = "default_one")]
    pub initial_users: u32,

    /// Workers added per stage (default: 1, min 1)
    #[serde(default = "default_one")]
    pub step_size: u32,

    /// Duration of each stage in seconds (default: 10, min 5)
    #[serde(default = "default_step_duration")]
    pub step_duration: u64,

    /// Upper bound on concurrent workers (default: 50, min 1)
    #[serde(default = "default_max_users")]
    pub max_users: u32,
}

fn default_concurrency() -> u32 {
    10
}

fn default_fatigue_duration() -> u64 {
    60
}

fn default_one() -> u32 {
    1
}

fn default_step_duration() -> u64 {
    10
}

fn default_max_users() -> u32 {
    50
}

impl Default for FatigueConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            duration: default_fatigue_duration(),
        }
    }
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            initial_users: default_one(),
            step_size: default_one(),
            step_duration: default_step_duration(),
            max_users: default_max_users(),
        }
    }
}

/// Start request exactly as it arrives over the wire.
///
/// Persisted verbatim as `config.json` of the history record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRequest {
    pub test_type: TestType,
    pub target_config: TargetConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_config: Option<StepConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatigue_config: Option<FatigueConfig>,
}

/// Load profile defines how many workers exist over time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadProfile {
    /// Constant worker count for the whole run
    Fatigue {
        concurrency: u32,
        duration: Duration,
    },

    /// Stages of increasing worker count, each with ramp-up and plateau
    Step {
        initial_users: u32,
        step_size: u32,
        step_duration: Duration,
        max_users: u32,
    },
}

impl LoadProfile {
    pub fn test_type(&self) -> TestType {
        match self {
            Self::Fatigue { .. } => TestType::Fatigue,
            Self::Step { .. } => TestType::Step,
        }
    }

    /// Highest worker count this profile will ever reach.
    pub fn max_users(&self) -> u32 {
        match self {
            Self::Fatigue { concurrency, .. } => *concurrency,
            Self::Step { .. } => self.stages().last().copied().unwrap_or(0),
        }
    }

    /// Worker count of each stage, in order.
    ///
    /// A fatigue profile is a single stage.
    pub fn stages(&self) -> Vec<u32> {
        match self {
            Self::Fatigue { concurrency, .. } => vec![*concurrency],
            Self::Step {
                initial_users,
                step_size,
                max_users,
                ..
            } => {
                let step = (*step_size).max(1) as usize;
                (*initial_users..=*max_users).step_by(step).collect()
            }
        }
    }

    /// Nominal wall-clock length of the run if nobody stops it.
    pub fn planned_duration(&self) -> Duration {
        match self {
            Self::Fatigue { duration, .. } => *duration,
            Self::Step { step_duration, .. } => *step_duration * self.stages().len() as u32,
        }
    }

    /// Get description of this load profile
    pub fn description(&self) -> String {
        match self {
            Self::Fatigue {
                concurrency,
                duration,
            } => format!("Fatigue {} users for {}s", concurrency, duration.as_secs()),
            Self::Step {
                initial_users,
                step_size,
                step_duration,
                max_users,
            } => format!(
                "Step {} → {} users (+{} every {}s)",
                initial_users,
                max_users,
                step_size,
                step_duration.as_secs()
            ),
        }
    }
}

/// A validated test: what to hit and how hard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestPlan {
    pub target: TargetConfig,
    pub profile: LoadProfile,
    /// Submission kept for the persisted record.
    pub request: TestRequest,
}

impl TestRequest {
    /// Validate the submission and turn it into a runnable plan.
    pub fn into_plan(self) -> CoreResult<TestPlan> {
        if self.target_config.app_id.trim().is_empty() {
            return Err(CoreError::validation("target_config.app_id cannot be empty"));
        }

        let profile = match self.test_type {
            TestType::Fatigue => {
                let cfg = self.fatigue_config.as_ref().ok_or_else(|| {
                    CoreError::validation("fatigue_config is required for FATIGUE tests")
                })?;
                if cfg.concurrency < 1 {
                    return Err(CoreError::validation("concurrency must be at least 1"));
                }
                if cfg.duration < MIN_FATIGUE_DURATION_SECS {
                    return Err(CoreError::validation(format!(
                        "duration must be at least {}s, got {}s",
                        MIN_FATIGUE_DURATION_SECS, cfg.duration
                    )));
                }
                LoadProfile::Fatigue {
                    concurrency: cfg.concurrency,
                    duration: Duration::from_secs(cfg.duration),
                }
            }
            TestType::Step => {
                let cfg = self.step_config.as_ref().ok_or_else(|| {
                    CoreError::validation("step_config is required for STEP tests")
                })?;
                if cfg.initial_users < 1 || cfg.step_size < 1 || cfg.max_users < 1 {
                    return Err(CoreError::validation(
                        "initial_users, step_size and max_users must be at least 1",
                    ));
                }
                if cfg.step_duration < MIN_STEP_DURATION_SECS {
                    return Err(CoreError::validation(format!(
                        "step_duration must be at least {}s, got {}s",
                        MIN_STEP_DURATION_SECS, cfg.step_duration
                    )));
                }
                if cfg.initial_users > cfg.max_users {
                    return Err(CoreError::validation(format!(
                        "initial_users ({}) exceeds max_users ({})",
                        cfg.initial_users, cfg.max_users
                    )));
                }
                LoadProfile::Step {
                    initial_users: cfg.initial_users,
                    step_size: cfg.step_size,
                    step_duration: Duration::from_secs(cfg.step_duration),
                    max_users: cfg.max_users,
                }
            }
        };

        Ok(TestPlan {
            target: self.target_config.clone(),
            profile,
            request: self,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_request(initial: u32, step: u32, duration: u64, max: u32) -> TestRequest {
        TestRequest {
            test_type: TestType::Step,
            target_config: TargetConfig::new("app", "prompt"),
            step_config: Some(StepConfig {
                initial_users: initial,
                step_size: step,
                step_duration: duration,
                max_users: max,
            }),
            fatigue_config: None,
        }
    }

    #[test]
    fn test_step_stages() {
        let plan = step_request(1, 1, 5, 3).into_plan().unwrap();
        assert_eq!(plan.profile.stages(), vec![1, 2, 3]);
        assert_eq!(plan.profile.max_users(), 3);
        assert_eq!(plan.profile.planned_duration(), Duration::from_secs(15));
    }

    #[test]
    fn test_step_stages_stop_below_max() {
        let plan = step_request(1, 3, 5, 6).into_plan().unwrap();
        assert_eq!(plan.profile.stages(), vec![1, 4]);
        assert_eq!(plan.profile.max_users(), 4);
    }

    #[test]
    fn test_fatigue_defaults_from_wire() {
        let req: TestRequest = serde_json::from_str(
            r#"{"test_type":"FATIGUE","target_config":{"app_id":"a","input_prompt":"p"},"fatigue_config":{}}"#,
        )
        .unwrap();
        let plan = req.into_plan().unwrap();
        assert_eq!(
            plan.profile,
            LoadProfile::Fatigue {
                concurrency: 10,
                duration: Duration::from_secs(60)
            }
        );
    }

    #[test]
    fn test_minimums_enforced() {
        assert!(step_request(1, 1, 4, 3).into_plan().is_err());
        assert!(step_request(0, 1, 5, 3).into_plan().is_err());
        assert!(step_request(1, 0, 5, 3).into_plan().is_err());
        assert!(step_request(5, 1, 5, 3).into_plan().is_err());

        let short = TestRequest {
            test_type: TestType::Fatigue,
            target_config: TargetConfig::new("app", "p"),
            step_config: None,
            fatigue_config: Some(FatigueConfig {
                concurrency: 2,
                duration: 9,
            }),
        };
        assert!(matches!(short.into_plan(), Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_missing_config_block_rejected() {
        let req = TestRequest {
            test_type: TestType::Step,
            target_config: TargetConfig::new("app", "p"),
            step_config: None,
            fatigue_config: Some(FatigueConfig::default()),
        };
        assert!(matches!(req.into_plan(), Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_type_wire_names() {
        assert_eq!(serde_json::to_string(&TestType::Step).unwrap(), "\"STEP\"");
        assert_eq!(
            serde_json::from_str::<TestType>("\"FATIGUE\"").unwrap(),
            TestType::Fatigue
        );
    }
}
