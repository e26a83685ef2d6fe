use std::time::Duration;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: String,
    pub host: String,
    pub port: u16,
    pub io_timeout: Duration,
    pub public_url: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.into());

        let port = var("COURIER_PORT", "3000")
            .parse()
            .context("COURIER_PORT must be a port number")?;
        let timeout_ms: u64 = var("COURIER_IO_TIMEOUT_MS", "5000")
            .parse()
            .context("COURIER_IO_TIMEOUT_MS must be a number of milliseconds")?;

        Ok(Self {
            jwt_secret: var("COURIER_JWT_SECRET", "dev-secret-change-me"),
            db_path: var("COURIER_DB_PATH", "courier.db"),
            host: var("COURIER_HOST", "0.0.0.0"),
            port,
            io_timeout: Duration::from_millis(timeout_ms),
            public_url: var("COURIER_PUBLIC_URL", ""),
        })
    }
}
