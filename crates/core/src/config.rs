//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Request handlers never read environment variables; the binaries
//! read them once, parse them with the helpers below and build a [`CoreConfig`].

use crate::constants::{
    DEFAULT_ANTHROPIC_BASE_URL, DEFAULT_FEW_SHOT_LIMIT, DEFAULT_LLM_MAX_TOKENS, DEFAULT_LLM_MODEL,
    DEFAULT_LLM_TIMEOUT_SECS, DEFAULT_ORDER_DUPLICATE_WINDOW_DAYS, MAX_MODEL_USED_LEN,
    MAX_ORDER_DUPLICATE_WINDOW_DAYS,
};
use crate::{CarePlanError, CarePlanResult};
use std::path::{Path, PathBuf};

/// Settings for the outbound language model call.
#[derive(Clone)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub mock_mode: bool,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_ANTHROPIC_BASE_URL.into(),
            model: DEFAULT_LLM_MODEL.into(),
            mock_mode: false,
            timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
            max_tokens: DEFAULT_LLM_MAX_TOKENS,
        }
    }
}

// Hand-written so the API key never reaches a log line.
impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("mock_mode", &self.mock_mode)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    database_path: PathBuf,
    llm: LlmSettings,
    few_shot_limit: usize,
    order_duplicate_window_days: i64,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns `CarePlanError::InvalidInput` if:
    /// - the model name is blank or longer than the stored model column allows,
    /// - the duplicate window is not between one day and `MAX_ORDER_DUPLICATE_WINDOW_DAYS`, or
    /// - the timeout or token limit is zero.
    pub fn new(
        database_path: PathBuf,
        llm: LlmSettings,
        few_shot_limit: usize,
        order_duplicate_window_days: i64,
    ) -> CarePlanResult<Self> {
        if llm.model.trim().is_empty() {
            return Err(CarePlanError::InvalidInput("LLM model cannot be empty".into()));
        }
        if llm.model.chars().count() > MAX_MODEL_USED_LEN {
            return Err(CarePlanError::InvalidInput(format!(
                "LLM model must be at most {MAX_MODEL_USED_LEN} characters"
            )));
        }
        if !(1..=MAX_ORDER_DUPLICATE_WINDOW_DAYS).contains(&order_duplicate_window_days) {
            return Err(CarePlanError::InvalidInput(format!(
                "order duplicate window must be between 1 and {MAX_ORDER_DUPLICATE_WINDOW_DAYS} days"
            )));
        }
        if llm.timeout_secs == 0 || llm.max_tokens == 0 {
            return Err(CarePlanError::InvalidInput(
                "LLM timeout and max tokens must be greater than zero".into(),
            ));
        }

        Ok(Self {
            database_path,
            llm,
            few_shot_limit,
            order_duplicate_window_days,
        })
    }

    /// Configuration with every default, pointing at the given database.
    pub fn with_database(database_path: PathBuf) -> Self {
        Self {
            database_path,
            llm: LlmSettings::default(),
            few_shot_limit: DEFAULT_FEW_SHOT_LIMIT,
            order_duplicate_window_days: DEFAULT_ORDER_DUPLICATE_WINDOW_DAYS,
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn llm(&self) -> &LlmSettings {
        &self.llm
    }

    pub fn few_shot_limit(&self) -> usize {
        self.few_shot_limit
    }

    pub fn order_duplicate_window_days(&self) -> i64 {
        self.order_duplicate_window_days
    }
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a boolean flag from an optional environment value.
///
/// Accepts `true/false`, `1/0`, `yes/no` and `on/off` in any case. `None` or blank gives `default`.
pub fn bool_from_env_value(name: &str, value: Option<String>, default: bool) -> CarePlanResult<bool> {
    let Some(value) = present(value) else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(CarePlanError::InvalidInput(format!(
            "{name} must be a boolean, got '{value}'"
        ))),
    }
}

/// Parse a number from an optional environment value. `None` or blank gives `default`.
pub fn number_from_env_value<T>(name: &str, value: Option<String>, default: T) -> CarePlanResult<T>
where
    T: std::str::FromStr,
{
    match present(value) {
        None => Ok(default),
        Some(v) => v.parse::<T>().map_err(|_| {
            CarePlanError::InvalidInput(format!("{name} must be a number, got '{v}'"))
        }),
    }
}

/// Build [`LlmSettings`] from optional environment values, applying defaults.
pub fn llm_settings_from_env_values(
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    mock_mode: Option<String>,
    timeout_secs: Option<String>,
    max_tokens: Option<String>,
) -> CarePlanResult<LlmSettings> {
    Ok(LlmSettings {
        api_key: present(api_key),
        base_url: present(base_url).unwrap_or_else(|| DEFAULT_ANTHROPIC_BASE_URL.into()),
        model: present(model).unwrap_or_else(|| DEFAULT_LLM_MODEL.into()),
        mock_mode: bool_from_env_value("LLM_MOCK_MODE", mock_mode, false)?,
        timeout_secs: number_from_env_value("LLM_TIMEOUT_SECS", timeout_secs, DEFAULT_LLM_TIMEOUT_SECS)?,
        max_tokens: number_from_env_value("LLM_MAX_TOKENS", max_tokens, DEFAULT_LLM_MAX_TOKENS)?,
    })
}

/// Read the full configuration from the process environment.
///
/// Only binaries call this, once, before serving anything.
pub fn core_config_from_env() -> CarePlanResult<CoreConfig> {
    let var = |name: &str| std::env::var(name).ok();

    let database_path = present(var("CAREPLAN_DATABASE_PATH"))
        .unwrap_or_else(|| crate::constants::DEFAULT_DATABASE_PATH.into());
    let llm = llm_settings_from_env_values(
        var("ANTHROPIC_API_KEY"),
        var("ANTHROPIC_BASE_URL"),
        var("LLM_MODEL"),
        var("LLM_MOCK_MODE"),
        var("LLM_TIMEOUT_SECS"),
        var("LLM_MAX_TOKENS"),
    )?;
    let few_shot_limit =
        number_from_env_value("FEW_SHOT_EXAMPLE_LIMIT", var("FEW_SHOT_EXAMPLE_LIMIT"), DEFAULT_FEW_SHOT_LIMIT)?;
    let window = number_from_env_value(
        "ORDER_DUPLICATE_WINDOW_DAYS",
        var("ORDER_DUPLICATE_WINDOW_DAYS"),
        DEFAULT_ORDER_DUPLICATE_WINDOW_DAYS,
    )?;

    CoreConfig::new(PathBuf::from(database_path), llm, few_shot_limit, window)
}
