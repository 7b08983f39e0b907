use std::{env, fmt::Display, str::FromStr};

use anyhow::Context;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub jwt_secret: String,
    pub cors_origin: String,
    pub max_reply_depth: usize,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let jwt_secret = var_or("JWT_SECRET", "dev-secret-change-me");
        if jwt_secret == "dev-secret-change-me" {
            warn!("JWT_SECRET is the development default; do not deploy like this");
        }

        Ok(Self {
            database_url: var_or("DATABASE_URL", "vrcface.db"),
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:8080"),
            jwt_secret,
            cors_origin: var_or("CORS_ORIGIN", "http://localhost:1313"),
            max_reply_depth: parse_or("MAX_REPLY_DEPTH", 64)?,
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    })
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr + Display,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key} value: {raw:?}")),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
