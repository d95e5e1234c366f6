//! Runtime configuration and the persisted credential record.
//!
//! Settings come from the environment (optionally seeded from a `.env` file by
//! `main`). Email and password fall back to the credential record so a setup run
//! only needs to happen once.

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

use crate::client::DEFAULT_ENDPOINT;
use crate::switch::TokenStore;

pub const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";
pub const DEFAULT_POLL_SECS: u64 = 30;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    /// Account email; `None` when neither env nor the record provides one.
    pub email: Option<String>,
    pub password: Option<String>,
    /// Where the credential record lives.
    pub credentials_file: PathBuf,
    pub endpoint: String,
    /// Poll cadence for `poll`.
    pub poll_interval: Duration,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let credentials_file = non_empty("KASA_CREDENTIALS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CREDENTIALS_FILE));

        let endpoint = non_empty("KASA_CLOUD_URL").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(format!("KASA_CLOUD_URL must be an http(s) URL, got {}", endpoint));
        }

        let poll_secs = parse_secs(non_empty("KASA_POLL_INTERVAL_SECS"), "KASA_POLL_INTERVAL_SECS", DEFAULT_POLL_SECS)?;
        let timeout_secs = parse_secs(
            non_empty("KASA_HTTP_TIMEOUT_SECS"),
            "KASA_HTTP_TIMEOUT_SECS",
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?;

        Ok(Config {
            email: non_empty("KASA_EMAIL"),
            password: lookup("KASA_PASSWORD").filter(|v| !v.is_empty()),
            credentials_file,
            endpoint,
            poll_interval: Duration::from_secs(poll_secs),
            http_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Credentials to use: env values win over the stored record; the token
    /// always comes from the record and is dropped if the email changed.
    pub fn resolve_credentials(&self, stored: Option<Credentials>) -> Result<Credentials, String> {
        let email = self
            .email
            .clone()
            .or_else(|| stored.as_ref().map(|c| c.email.clone()))
            .ok_or_else(|| {
                format!(
                    "Missing credentials: set KASA_EMAIL/KASA_PASSWORD or run `setup` to create {}",
                    self.credentials_file.display()
                )
            })?;
        let password = self
            .password
            .clone()
            .or_else(|| stored.as_ref().map(|c| c.password.clone()))
            .ok_or_else(|| "Missing password: set KASA_PASSWORD".to_string())?;

        let (token, token_updated_at) = match stored {
            Some(c) if c.email == email => (c.token, c.token_updated_at),
            _ => (None, None),
        };
        Ok(Credentials {
            email,
            password,
            token,
            token_updated_at,
        })
    }
}

fn parse_secs(value: Option<String>, key: &str, default: u64) -> Result<u64, String> {
    match value {
        None => Ok(default),
        Some(s) => match s.parse::<u64>() {
            Ok(0) | Err(_) => Err(format!("{} must be a positive integer, got {}", key, s)),
            Ok(n) => Ok(n),
        },
    }
}

/// The single record persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_updated_at: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            email: email.into(),
            password: password.into(),
            token: None,
            token_updated_at: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token_updated_at = token.as_ref().map(|_| Utc::now());
        self.token = token;
        self
    }
}

/// JSON file holding [`Credentials`].
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CredentialStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no record has been written yet.
    pub fn load(&self) -> Result<Option<Credentials>, String> {
        match fs::read_to_string(&self.path) {
            Ok(s) => serde_json::from_str(&s)
                .map(Some)
                .map_err(|e| format!("failed to parse {}: {}", self.path.display(), e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(format!("failed to read {}: {}", self.path.display(), e)),
        }
    }

    pub fn save(&self, credentials: &Credentials) -> Result<(), String> {
        let json = serde_json::to_string_pretty(credentials)
            .map_err(|e| format!("failed to serialize credentials: {}", e))?;
        // Write a sibling file and rename it over the record.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| format!("failed to write {}: {}", tmp.display(), e))?;
        fs::rename(&tmp, &self.path).map_err(|e| format!("failed to replace {}: {}", self.path.display(), e))?;
        debug!("Credential record written to {}", self.path.display());
        Ok(())
    }
}

impl TokenStore for CredentialStore {
    fn store_token(&self, token: &str) -> Result<(), String> {
        let record = self
            .load()?
            .ok_or_else(|| format!("no credential record at {}", self.path.display()))?;
        self.save(&record.with_token(Some(token.to_string())))
    }
}
