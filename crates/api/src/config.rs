//! Process configuration, read once at startup and threaded into constructors.

use std::net::SocketAddr;

use anyhow::{Context, bail};
use chrono::Duration;

use warden_observability::LogFormat;

pub const DEV_JWT_SECRET: &str = "dev-secret";

/// Where permission records live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    InMemory,
    Postgres { database_url: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub bind_addr: SocketAddr,
    pub log_format: LogFormat,
    /// Run admin routes through the decision engine.
    pub guard_admin: bool,
    /// Subject seeded into the `admin` role at boot, if any.
    pub admin_subject: Option<String>,
    pub persistence: Persistence,
}

impl AppConfig {
    /// Defaults suitable for tests and local runs.
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            token_ttl: Duration::seconds(3600),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_format: LogFormat::Json,
            guard_admin: false,
            admin_subject: None,
            persistence: Persistence::InMemory,
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Unset and empty values take the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let secret = var("WARDEN_JWT_SECRET").unwrap_or_else(|| DEV_JWT_SECRET.to_string());
        let mut config = Self::new(secret);

        if let Some(raw) = var("WARDEN_TOKEN_TTL_SECS") {
            let secs: i64 = raw
                .trim()
                .parse()
                .with_context(|| format!("WARDEN_TOKEN_TTL_SECS must be an integer, got '{raw}'"))?;
            if secs <= 0 {
                bail!("WARDEN_TOKEN_TTL_SECS must be positive, got {secs}");
            }
            config.token_ttl = Duration::seconds(secs);
        }

        if let Some(raw) = var("WARDEN_BIND_ADDR") {
            config.bind_addr = raw
                .trim()
                .parse()
                .with_context(|| format!("WARDEN_BIND_ADDR is not a socket address: '{raw}'"))?;
        }

        if let Some(raw) = var("WARDEN_LOG_FORMAT") {
            config.log_format = raw.parse()?;
        }

        if let Some(raw) = var("WARDEN_GUARD_ADMIN") {
            config.guard_admin = parse_bool("WARDEN_GUARD_ADMIN", &raw)?;
        }

        config.admin_subject = var("WARDEN_ADMIN_SUBJECT").map(|s| s.trim().to_string());

        let persistent = match var("USE_PERSISTENT_STORES") {
            Some(raw) => parse_bool("USE_PERSISTENT_STORES", &raw)?,
            None => false,
        };
        if persistent {
            let database_url = var("DATABASE_URL")
                .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;
            config.persistence = Persistence::Postgres { database_url };
        }

        Ok(config)
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

fn parse_bool(key: &str, raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("{key} must be a boolean, got '{raw}'"),
    }
}
