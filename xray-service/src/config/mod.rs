use crate::models::DEFAULT_PROMPT;
use crate::services::credentials::DEFAULT_OAUTH_SCOPE;
use crate::services::providers::gemini::GEMINI_API_BASE;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_PORT: u16 = 5001;
const DEFAULT_CREDENTIALS_FILE: &str = "/app/service_account.json";
const DEFAULT_MODEL: &str = "gemini-1.5-pro-latest";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_UPLOAD_MAX_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct XrayConfig {
    pub common: core_config::Config,
    pub credentials: CredentialSettings,
    pub model: ModelSettings,
    pub upload: UploadSettings,
}

/// Where Gemini credentials come from. Exactly one source is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// OAuth tokens minted from `credentials_file`.
    ServiceAccount,
    /// Static `GOOGLE_API_KEY`.
    ApiKey,
}

impl FromStr for CredentialSource {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "service_account" | "oauth" => Ok(CredentialSource::ServiceAccount),
            "api_key" => Ok(CredentialSource::ApiKey),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "GENAI_CREDENTIAL_SOURCE must be 'service_account' or 'api_key', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CredentialSettings {
    pub source: CredentialSource,
    pub credentials_file: PathBuf,
    pub api_key: Option<Secret<String>>,
    pub oauth_scope: String,
    pub cache_tokens: bool,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub name: String,
    pub api_base: String,
    pub timeout_secs: u64,
    pub default_prompt: String,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub max_bytes: usize,
}

impl XrayConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load(DEFAULT_PORT)?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        let source: CredentialSource =
            get_env("GENAI_CREDENTIAL_SOURCE", Some("service_account"), is_prod)?.parse()?;

        let api_key = env::var("GOOGLE_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(Secret::new);

        let config = XrayConfig {
            common: common_config,
            credentials: CredentialSettings {
                source,
                credentials_file: PathBuf::from(get_env(
                    "GOOGLE_APPLICATION_CREDENTIALS",
                    Some(DEFAULT_CREDENTIALS_FILE),
                    is_prod && source == CredentialSource::ServiceAccount,
                )?),
                api_key,
                oauth_scope: get_env("GENAI_OAUTH_SCOPE", Some(DEFAULT_OAUTH_SCOPE), false)?,
                cache_tokens: parse_bool(
                    "GENAI_CACHE_TOKENS",
                    &get_env("GENAI_CACHE_TOKENS", Some("true"), false)?,
                )?,
            },
            model: ModelSettings {
                name: get_env("GENAI_MODEL", Some(DEFAULT_MODEL), false)?,
                api_base: get_env("GENAI_API_BASE", Some(GEMINI_API_BASE), false)?,
                timeout_secs: parse_number(
                    "GENAI_TIMEOUT_SECS",
                    &get_env("GENAI_TIMEOUT_SECS", Some(&DEFAULT_TIMEOUT_SECS.to_string()), false)?,
                )?,
                default_prompt: get_env("GENAI_DEFAULT_PROMPT", Some(DEFAULT_PROMPT), false)?,
            },
            upload: UploadSettings {
                max_bytes: parse_number(
                    "UPLOAD_MAX_BYTES",
                    &get_env(
                        "UPLOAD_MAX_BYTES",
                        Some(&DEFAULT_UPLOAD_MAX_BYTES.to_string()),
                        false,
                    )?,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks that `load` cannot express per variable.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.credentials.source == CredentialSource::ApiKey && self.credentials.api_key.is_none()
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "GOOGLE_API_KEY is required when GENAI_CREDENTIAL_SOURCE=api_key"
            )));
        }
        if self.model.timeout_secs == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "GENAI_TIMEOUT_SECS must be greater than zero"
            )));
        }
        if self.upload.max_bytes == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "UPLOAD_MAX_BYTES must be greater than zero"
            )));
        }
        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, required: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if required {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, AppError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AppError::ConfigError(anyhow::anyhow!(
            "{} must be a boolean, got '{}'",
            key,
            other
        ))),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("{} is not a valid number ({}): {}", key, value, e))
    })
}
