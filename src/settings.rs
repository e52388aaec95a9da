//! Deployment settings: built-in defaults, then an optional TOML file, then
//! `ECOLENS_*` environment variables

use crate::config::*;
use crate::detector::DetectionPolicy;
use ::config::{Config, Environment, File, Source};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub host: String,
    pub port: u16,

    /// Tracing directive, used when `RUST_LOG` is unset
    pub log: String,

    /// AWS region override. Falls back to the SDK's provider chain
    pub region: Option<String>,

    /// SDK operation timeout, retries included
    pub timeout_secs: u64,

    pub max_body_bytes: usize,
    pub min_confidence: f32,
    pub max_labels: i32,
}

impl Settings {
    /// Load settings from `$ECOLENS_CONFIG` (or `ecolens.toml`) and the
    /// environment. A missing file is not an error
    pub fn load() -> Result<Self> {
        let path = env::var("ECOLENS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        Self::from_sources(
            File::with_name(&path).required(false),
            Environment::with_prefix(ENV_PREFIX).try_parsing(true),
        )
        .with_context(|| format!("failed to load settings (config file {path})"))
    }

    fn from_sources<F, E>(file: F, environment: E) -> Result<Self>
    where
        F: Source + Send + Sync + 'static,
        E: Source + Send + Sync + 'static,
    {
        let settings: Settings = Config::builder()
            .set_default("host", DEFAULT_HOST)?
            .set_default("port", i64::from(DEFAULT_PORT))?
            .set_default("log", RUST_LOG)?
            .set_default("timeout_secs", TIMEOUT_SECS as i64)?
            .set_default("max_body_bytes", MAX_BODY_BYTES as i64)?
            .set_default("min_confidence", f64::from(MIN_CONFIDENCE))?
            .set_default("max_labels", i64::from(MAX_LABELS))?
            .add_source(file)
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.min_confidence) {
            bail!(
                "min_confidence must be between 0 and 100, got {}",
                self.min_confidence
            );
        }
        if self.max_labels < 1 {
            bail!("max_labels must be at least 1, got {}", self.max_labels);
        }
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be at least 1");
        }
        Ok(())
    }

    pub fn policy(&self) -> DetectionPolicy {
        DetectionPolicy {
            min_confidence: self.min_confidence,
            max_labels: self.max_labels,
        }
    }
}
