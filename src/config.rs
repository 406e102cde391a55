use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

// --- Environment Variables ---

pub const BACKEND_URL_VAR: &str = "SKI_SAGE_BACKEND_URL";
pub const DB_PATH_VAR: &str = "SKI_SAGE_DB_PATH";
pub const STREAMING_VAR: &str = "SKI_SAGE_STREAMING";
pub const RENDER_INTERVAL_VAR: &str = "SKI_SAGE_RENDER_INTERVAL_MS";
pub const COMPLETION_GRACE_VAR: &str = "SKI_SAGE_COMPLETION_GRACE_MS";

const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
const DEFAULT_RENDER_INTERVAL_MS: u64 = 40;
const DEFAULT_COMPLETION_GRACE_MS: u64 = 100;
const DATA_DIR_NAME: &str = "ski-sage";
const DB_FILE_NAME: &str = "ski-sage.sqlite";

/// Runtime settings for the client.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub backend_url: String,
    pub database_path: PathBuf,
    /// Ask the backend for an event stream instead of a single JSON body.
    pub streaming: bool,
    pub render_interval: Duration,
    pub completion_grace: Duration,
}

impl AppConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable lookup, falling back to
    /// defaults for variables that are not set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend_url = lookup(BACKEND_URL_VAR)
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());

        let database_path = match lookup(DB_PATH_VAR) {
            Some(path) if !path.trim().is_empty() => PathBuf::from(path.trim()),
            _ => default_database_path()?,
        };

        let streaming = match lookup(STREAMING_VAR) {
            Some(value) => parse_bool(&value)
                .with_context(|| format!("Invalid value for {}: '{}'", STREAMING_VAR, value))?,
            None => true,
        };

        let render_interval = parse_millis(&lookup, RENDER_INTERVAL_VAR, DEFAULT_RENDER_INTERVAL_MS)?;
        let completion_grace =
            parse_millis(&lookup, COMPLETION_GRACE_VAR, DEFAULT_COMPLETION_GRACE_MS)?;

        log::debug!(
            "Loaded config: backend {}, database {}, streaming {}",
            backend_url,
            database_path.display(),
            streaming
        );

        Ok(Self {
            backend_url,
            database_path,
            streaming,
            render_interval,
            completion_grace,
        })
    }

    /// Full URL of the chat endpoint.
    pub fn chat_url(&self) -> String {
        format!("{}/api/chat", self.backend_url)
    }
}

fn default_database_path() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .context("Could not determine the local data directory; set SKI_SAGE_DB_PATH")?;
    Ok(data_dir.join(DATA_DIR_NAME).join(DB_FILE_NAME))
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow::anyhow!("expected true or false, got '{}'", other)),
    }
}

fn parse_millis<F>(lookup: &F, name: &str, default: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let millis = match lookup(name) {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("Invalid value for {}: '{}'", name, value))?,
        None => default,
    };
    Ok(Duration::from_millis(millis))
}
