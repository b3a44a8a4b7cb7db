use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::ingestion::PipelineSettings;
use crate::llm_client::DEFAULT_MODEL;

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or a numeric one is malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gmail_client_id: String,
    pub gmail_client_secret: String,
    pub gmail_refresh_token: String,
    pub gmail_user_id: String,
    pub port: u16,
    pub rust_log: String,
    pub poll_interval: Duration,
    pub poll_batch_size: u32,
    pub mailbox_timeout: Duration,
    pub extraction_timeout: Duration,
    pub analysis_timeout: Duration,
    pub persist_timeout: Duration,
    pub max_message_attempts: u32,
    pub tesseract_bin: String,
    pub ocr_lang: String,
    pub extracted_text_dump_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            gemini_api_key: require_env("GEMINI_API_KEY")?,
            gemini_model: env_or("GEMINI_MODEL", DEFAULT_MODEL.to_string())?,
            gmail_client_id: require_env("GMAIL_CLIENT_ID")?,
            gmail_client_secret: require_env("GMAIL_CLIENT_SECRET")?,
            gmail_refresh_token: require_env("GMAIL_REFRESH_TOKEN")?,
            gmail_user_id: env_or("GMAIL_USER_ID", "me".to_string())?,
            port: env_or("PORT", 3003)?,
            rust_log: env_or("RUST_LOG", "info".to_string())?,
            poll_interval: secs("POLL_INTERVAL_SECS", 10)?,
            poll_batch_size: env_or("POLL_BATCH_SIZE", 10)?,
            mailbox_timeout: secs("MAILBOX_TIMEOUT_SECS", 30)?,
            extraction_timeout: secs("EXTRACTION_TIMEOUT_SECS", 60)?,
            analysis_timeout: secs("ANALYSIS_TIMEOUT_SECS", 60)?,
            persist_timeout: secs("PERSIST_TIMEOUT_SECS", 15)?,
            max_message_attempts: env_or("MAX_MESSAGE_ATTEMPTS", 3)?,
            tesseract_bin: env_or("TESSERACT_BIN", "tesseract".to_string())?,
            ocr_lang: env_or("OCR_LANG", "eng".to_string())?,
            extracted_text_dump_path: std::env::var_os("EXTRACTED_TEXT_DUMP_PATH")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        })
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            batch_size: self.poll_batch_size.max(1),
            mailbox_timeout: self.mailbox_timeout,
            extraction_timeout: self.extraction_timeout,
            analysis_timeout: self.analysis_timeout,
            persist_timeout: self.persist_timeout,
            max_attempts: self.max_message_attempts.max(1),
            dump_path: self.extracted_text_dump_path.clone(),
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => parse_var(key, &raw),
        _ => Ok(default),
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw:?}"))
}

/// Whole seconds; zero is rejected since a zero period or timeout never makes progress.
fn secs(key: &str, default: u64) -> Result<Duration> {
    let value: u64 = env_or(key, default)?;
    anyhow::ensure!(value > 0, "Environment variable '{key}' must be greater than zero");
    Ok(Duration::from_secs(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_trims_and_parses() {
        let port: u16 = parse_var("PORT", " 3003 ").unwrap();
        assert_eq!(port, 3003);
    }

    #[test]
    fn test_parse_var_names_the_variable_on_error() {
        let err = parse_var::<u16>("PORT", "eighty").unwrap_err();
        assert!(err.to_string().contains("'PORT'"));
    }

    #[test]
    fn test_env_or_falls_back_when_unset() {
        let batch: u32 = env_or("INTAKE_TEST_SURELY_UNSET_VAR", 10).unwrap();
        assert_eq!(batch, 10);
        assert_eq!(
            secs("INTAKE_TEST_SURELY_UNSET_SECS", 15).unwrap(),
            Duration::from_secs(15)
        );
    }
}
