//! Target configuration and the request body sent to the guardrail service.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies the application under test and the exact request template.
///
/// Immutable for the duration of one run; workers share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub app_id: String,
    pub input_prompt: String,
    #[serde(default)]
    pub use_customize_white: bool,
    #[serde(default)]
    pub use_customize_words: bool,
    #[serde(default)]
    pub use_customize_rule: bool,
    #[serde(default)]
    pub use_vip_black: bool,
    #[serde(default)]
    pub use_vip_white: bool,
}

/// JSON body accepted by the guardrail rule-run endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailPayload {
    pub request_id: String,
    pub app_id: String,
    pub apikey: String,
    pub input_prompt: String,
    pub use_customize_white: bool,
    pub use_customize_words: bool,
    pub use_customize_rule: bool,
    pub use_vip_black: bool,
    pub use_vip_white: bool,
}

impl TargetConfig {
    /// Create a target with all feature flags disabled.
    pub fn new(app_id: impl Into<String>, input_prompt: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            input_prompt: input_prompt.into(),
            use_customize_white: false,
            use_customize_words: false,
            use_customize_rule: false,
            use_vip_black: false,
            use_vip_white: false,
        }
    }

    /// Build one request body.
    ///
    /// Each call gets a fresh `request_id`; `api_key_suffix` is rendered as
    /// eight lowercase hex digits after the `perf-test-` prefix.
    pub fn build_payload(&self, api_key_suffix: u32) -> GuardrailPayload {
        GuardrailPayload {
            request_id: Uuid::new_v4().to_string(),
            app_id: self.app_id.clone(),
            apikey: format!("perf-test-{:08x}", api_key_suffix),
            input_prompt: self.input_prompt.clone(),
            use_customize_white: self.use_customize_white,
            use_customize_words: self.use_customize_words,
            use_customize_rule: self.use_customize_rule,
            use_vip_black: self.use_vip_black,
            use_vip_white: self.use_vip_white,
        }
    }
}
