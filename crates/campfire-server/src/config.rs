use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

/// Server settings, read from `CAMPFIRE_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub storage_dir: PathBuf,
    /// Base of the download URLs handed to clients.
    pub public_url: String,
    pub jwt_secret: String,
    /// Seconds between orphaned-blob sweeps.
    pub cleanup_interval_secs: u64,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = lookup("CAMPFIRE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("CAMPFIRE_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let port = var("CAMPFIRE_PORT", "3000");
        let port: u16 = port
            .parse()
            .with_context(|| format!("CAMPFIRE_PORT '{}' is not a port number", port))?;

        let interval = var("CAMPFIRE_CLEANUP_INTERVAL_SECS", "3600");
        let cleanup_interval_secs: u64 = interval.parse().with_context(|| {
            format!("CAMPFIRE_CLEANUP_INTERVAL_SECS '{}' is not a number", interval)
        })?;

        Ok(Self {
            host: var("CAMPFIRE_HOST", "0.0.0.0"),
            port,
            db_path: var("CAMPFIRE_DB_PATH", "campfire.db").into(),
            storage_dir: var("CAMPFIRE_STORAGE_DIR", "./object-storage").into(),
            public_url: var("CAMPFIRE_PUBLIC_URL", "http://localhost:3000"),
            jwt_secret,
            cleanup_interval_secs,
        })
    }
}
