use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use sheets_client::a1;

use crate::error::EnrichError;
use crate::pipeline::PipelineSettings;
use crate::prompt::default_system_prompt;
use crate::resolver::ResolverSettings;
use crate::types::EnrichmentMode;

/// Request and batch sizes. Every value must be at least 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_groups_per_request: usize,
    pub max_posts_per_request: usize,
    pub gpt_groups_limit: usize,
    pub max_groups_to_send: usize,
    pub max_gpt_attempts: usize,
    pub get_post_attempts: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_groups_per_request: 500,
            max_posts_per_request: 100,
            gpt_groups_limit: 10,
            max_groups_to_send: 100,
            max_gpt_attempts: 3,
            get_post_attempts: 3,
        }
    }
}

impl BatchLimits {
    pub fn validate(&self) -> Result<(), EnrichError> {
        let checks = [
            ("MAX_GROUPS_PER_REQUEST", self.max_groups_per_request),
            ("MAX_POST_PER_REQUEST", self.max_posts_per_request),
            ("GPT_GROUPS_LIMIT", self.gpt_groups_limit),
            ("MAX_GROUPS_TO_SEND", self.max_groups_to_send),
            ("MAX_GPT_ATTEMPTS", self.max_gpt_attempts),
            ("GET_POST_ATTEMPTS", self.get_post_attempts),
        ];
        match checks.iter().find(|(_, value)| *value == 0) {
            Some((key, _)) => Err(EnrichError::Config(format!("{key} must be at least 1"))),
            None => Ok(()),
        }
    }
}

/// Run configuration loaded from environment variables (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    // VK
    pub vk_token: String,
    pub vk_api_version: String,

    // Spreadsheet
    pub google_auth_file: PathBuf,
    pub table_name: String,
    pub parse_sheet: String,
    pub url_column: u32,
    pub first_row: u32,
    pub data_start_column: String,

    // LLM
    pub openai_api_key: String,
    pub gpt_model: String,
    pub openai_base_url: Option<String>,
    pub mode: EnrichmentMode,
    /// Raw `SYSTEM_PROMPT`; see [`Config::system_prompt`].
    pub system_prompt_override: Option<String>,

    // Run window and tuning
    pub parse_offset: usize,
    pub parse_limit: Option<usize>,
    pub limits: BatchLimits,
    pub post_retry_delay: Duration,
    pub resolve_fixed_posts: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Required keys must be non-empty; tunables
    /// fall back to their defaults when unset but must parse when present.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string());
        let required = |key: &str| {
            var(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| EnrichError::Config(format!("{key} environment variable is required")))
        };
        let optional = |key: &str| var(key).filter(|v| !v.is_empty());

        let defaults = BatchLimits::default();
        let limits = BatchLimits {
            max_groups_per_request: parsed(&var, "MAX_GROUPS_PER_REQUEST", defaults.max_groups_per_request)?,
            max_posts_per_request: parsed(&var, "MAX_POST_PER_REQUEST", defaults.max_posts_per_request)?,
            gpt_groups_limit: parsed(&var, "GPT_GROUPS_LIMIT", defaults.gpt_groups_limit)?,
            max_groups_to_send: parsed(&var, "MAX_GROUPS_TO_SEND", defaults.max_groups_to_send)?,
            max_gpt_attempts: parsed(&var, "MAX_GPT_ATTEMPTS", defaults.max_gpt_attempts)?,
            get_post_attempts: parsed(&var, "GET_POST_ATTEMPTS", defaults.get_post_attempts)?,
        };
        limits.validate()?;

        let config = Self {
            vk_token: required("VK_TOKEN")?,
            vk_api_version: optional("VK_API_VERSION").unwrap_or_else(|| vk_client::DEFAULT_API_VERSION.to_string()),
            google_auth_file: PathBuf::from(required("GOOGLE_AUTH_FILE")?),
            table_name: required("TABLE_NAME")?,
            parse_sheet: optional("PARSE_SHEET").unwrap_or_else(|| "Sheet1".to_string()),
            url_column: parsed(&var, "URL_COLUMN", 1)?,
            first_row: parsed(&var, "FIRST_ROW", 1)?,
            data_start_column: optional("DATA_START_COLUMN").unwrap_or_else(|| "B".to_string()),
            openai_api_key: required("OPENAI_API_KEY")?,
            gpt_model: optional("GPT_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            openai_base_url: optional("OPENAI_BASE_URL"),
            mode: parsed(&var, "ENRICHMENT_MODE", EnrichmentMode::default())?,
            system_prompt_override: lookup("SYSTEM_PROMPT"),
            parse_offset: parsed(&var, "PARSE_OFFSET", 0)?,
            parse_limit: optional("PARSE_LIMIT")
                .map(|v| parse_value("PARSE_LIMIT", &v))
                .transpose()?
                .filter(|&limit| limit > 0),
            limits,
            post_retry_delay: Duration::from_millis(parsed(&var, "POST_RETRY_DELAY_MS", 500)?),
            resolve_fixed_posts: parsed(&var, "RESOLVE_FIXED_POSTS", true)?,
        };

        if config.url_column == 0 || config.first_row == 0 {
            return Err(EnrichError::Config("URL_COLUMN and FIRST_ROW are 1-based".to_string()).into());
        }
        a1::column_number(&config.data_start_column)
            .map_err(|e| EnrichError::Config(format!("DATA_START_COLUMN: {e}")))?;

        Ok(config)
    }

    /// Apply command-line overrides.
    pub fn with_overrides(
        mut self,
        offset: Option<usize>,
        limit: Option<usize>,
        mode: Option<EnrichmentMode>,
    ) -> Self {
        if let Some(offset) = offset {
            self.parse_offset = offset;
        }
        if let Some(limit) = limit {
            self.parse_limit = (limit > 0).then_some(limit);
        }
        if let Some(mode) = mode {
            self.mode = mode;
        }
        self
    }

    /// System-role message for the LLM: the mode's default when
    /// `SYSTEM_PROMPT` is unset, none when it is set but blank.
    pub fn system_prompt(&self) -> Option<String> {
        match &self.system_prompt_override {
            None => Some(default_system_prompt(self.mode).to_string()),
            Some(prompt) if prompt.trim().is_empty() => None,
            Some(prompt) => Some(prompt.clone()),
        }
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            max_groups_per_request: self.limits.max_groups_per_request,
            max_posts_per_request: self.limits.max_posts_per_request,
            get_post_attempts: self.limits.get_post_attempts,
            post_retry_delay: self.post_retry_delay,
            resolve_fixed_posts: self.resolve_fixed_posts,
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            sheet: self.parse_sheet.clone(),
            url_column: self.url_column,
            first_row: self.first_row,
            offset: self.parse_offset,
            limit: self.parse_limit,
            max_groups_per_request: self.limits.max_groups_per_request,
            gpt_groups_limit: self.limits.gpt_groups_limit,
            max_groups_to_send: self.limits.max_groups_to_send,
        }
    }

    pub fn log_redacted(&self) {
        fn preview(val: &str) -> String {
            let head: String = val.chars().take(4).collect();
            format!("{head}...({} chars)", val.chars().count())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  VK_TOKEN: {}", preview(&self.vk_token));
        tracing::info!("  OPENAI_API_KEY: {}", preview(&self.openai_api_key));
        tracing::info!("  GOOGLE_AUTH_FILE: {}", self.google_auth_file.display());
        tracing::info!("  TABLE_NAME: {} / {}", self.table_name, self.parse_sheet);
        tracing::info!(
            "  GPT_MODEL: {} ({}){}",
            self.gpt_model,
            self.mode,
            self.openai_base_url
                .as_deref()
                .map(|url| format!(" via {url}"))
                .unwrap_or_default()
        );
        tracing::info!(
            "  window: offset {} limit {}",
            self.parse_offset,
            self.parse_limit.map_or_else(|| "none".to_string(), |l| l.to_string())
        );
        tracing::info!("  limits: {:?}", self.limits);
    }
}

fn parsed<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, EnrichError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key).filter(|v| !v.is_empty()) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, EnrichError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| EnrichError::Config(format!("{key}={raw:?}: {e}")))
}
