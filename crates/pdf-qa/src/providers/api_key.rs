//! Google API key lookup
//!
//! Deployed instances read the key from a mounted secret file named by
//! `GOOGLE_API_KEY_PARAM`; local runs read `GOOGLE_API_KEY` (usually from
//! `.env`).

use std::path::Path;

use crate::config::ApiKeyConfig;
use crate::error::{Error, Result};

/// Resolves the Gemini API key
#[derive(Debug, Clone)]
pub struct ApiKeyLoader {
    config: ApiKeyConfig,
}

impl ApiKeyLoader {
    pub fn new(config: ApiKeyConfig) -> Self {
        Self { config }
    }

    /// Load from the secret file or the process environment
    pub fn load(&self) -> Result<String> {
        self.load_with(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the process environment
    pub fn load_with<F>(&self, lookup: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(param) = &self.config.param {
            tracing::info!("Google API Key Param: {}", param);
            let key = std::fs::read_to_string(Path::new(param)).map_err(|e| {
                Error::Config(format!("Failed to read API key parameter {}: {}", param, e))
            })?;
            return non_empty(key.trim(), param);
        }

        match lookup(&self.config.env_var) {
            Some(key) => non_empty(key.trim(), &self.config.env_var),
            None => Err(Error::Config(format!(
                "{} is not set and no API key parameter is configured",
                self.config.env_var
            ))),
        }
    }
}

fn non_empty(key: &str, origin: &str) -> Result<String> {
    if key.is_empty() {
        Err(Error::Config(format!("API key from {} is empty", origin)))
    } else {
        Ok(key.to_string())
    }
}
