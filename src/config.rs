//! Environment configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use generation_provider::GenerationSettings;

use crate::pipeline::{Budget, PipelineConfig};
use crate::scanner::{ScanOptions, DEFAULT_MAX_HOPS};

pub const ENV_MAX_HOPS: &str = "CARET_CAPTURE_MAX_HOPS";
pub const ENV_PROBE_STEPS: &str = "CARET_CAPTURE_PROBE_STEPS";
pub const ENV_SWEEP_CHUNK_LIMIT: &str = "CARET_CAPTURE_SWEEP_CHUNK_LIMIT";
pub const ENV_HOP_DELAY_MS: &str = "CARET_CAPTURE_HOP_DELAY_MS";
pub const ENV_TOKEN_BUDGET: &str = "CARET_CAPTURE_TOKEN_BUDGET";
pub const ENV_CHARS_PER_TOKEN: &str = "CARET_CAPTURE_CHARS_PER_TOKEN";
pub const ENV_TEMPERATURE: &str = "CARET_CAPTURE_TEMPERATURE";
pub const ENV_MAX_OUTPUT_TOKENS: &str = "CARET_CAPTURE_MAX_OUTPUT_TOKENS";
pub const ENV_DISABLE_STREAM: &str = "CARET_CAPTURE_DISABLE_STREAM";
pub const ENV_MODEL: &str = "CARET_CAPTURE_MODEL";
pub const ENV_BASE_URL: &str = "CARET_CAPTURE_BASE_URL";
pub const ENV_LOG: &str = "CARET_CAPTURE_LOG";

#[derive(Debug, Clone, PartialEq)]
pub struct EnvConfig {
    pub max_hops: usize,
    pub scan: ScanOptions,
    pub budget: Budget,
    pub generation: GenerationSettings,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub log_level: Option<String>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            max_hops: DEFAULT_MAX_HOPS,
            scan: ScanOptions::default(),
            budget: Budget::default(),
            generation: GenerationSettings::default(),
            model: None,
            base_url: None,
            log_level: None,
        }
    }
}

impl EnvConfig {
    /// Reads every `CARET_CAPTURE_*` variable. Unset, blank or unparsable
    /// values keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let scan = ScanOptions {
            probe_steps: env_list_opt(ENV_PROBE_STEPS)
                .filter(|steps: &Vec<usize>| steps.iter().all(|step| *step > 0))
                .unwrap_or(defaults.scan.probe_steps),
            sweep_chunk_limit: env_parse_opt(ENV_SWEEP_CHUNK_LIMIT)
                .filter(|limit: &usize| *limit > 0)
                .or(defaults.scan.sweep_chunk_limit),
            hop_delay: env_parse_opt(ENV_HOP_DELAY_MS)
                .map(Duration::from_millis)
                .unwrap_or(defaults.scan.hop_delay),
        };

        let budget = Budget {
            target_token_budget: env_parse_opt(ENV_TOKEN_BUDGET)
                .unwrap_or(defaults.budget.target_token_budget),
            approx_chars_per_token: env_parse_opt(ENV_CHARS_PER_TOKEN)
                .filter(|chars: &usize| *chars > 0)
                .unwrap_or(defaults.budget.approx_chars_per_token),
        };

        let generation = GenerationSettings {
            temperature: env_parse_opt(ENV_TEMPERATURE)
                .filter(|value: &f32| value.is_finite())
                .unwrap_or(defaults.generation.temperature),
            max_output_tokens: env_parse_opt(ENV_MAX_OUTPUT_TOKENS)
                .unwrap_or(defaults.generation.max_output_tokens),
            stream: !env_flag(ENV_DISABLE_STREAM),
        };

        Self {
            max_hops: env_parse_opt(ENV_MAX_HOPS)
                .filter(|hops: &usize| *hops > 0)
                .unwrap_or(defaults.max_hops),
            scan,
            budget,
            generation,
            model: env_string_opt(ENV_MODEL),
            base_url: env_string_opt(ENV_BASE_URL),
            log_level: env_string_opt(ENV_LOG),
        }
    }

    /// Pipeline configuration derived from this environment.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_hops: self.max_hops,
            scan: self.scan.clone(),
            budget: self.budget,
            generation: self.generation,
        }
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

fn env_parse_opt<T: FromStr>(key: &str) -> Option<T> {
    let value = env_string_opt(key)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key, value = %value, "ignoring unparsable environment value");
            None
        }
    }
}

fn env_list_opt<T: FromStr>(key: &str) -> Option<Vec<T>> {
    let value = env_string_opt(key)?;
    let parsed: Result<Vec<T>, _> = value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::parse)
        .collect();

    match parsed {
        Ok(items) if !items.is_empty() => Some(items),
        _ => {
            tracing::warn!(key, value = %value, "ignoring unparsable environment list");
            None
        }
    }
}
