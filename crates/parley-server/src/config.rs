use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};

/// Secrets that ship in examples and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["", "changeme", "change-me", "secret", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub push_buffer: usize,
    pub node_id: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("PARLEY_JWT_SECRET").context("PARLEY_JWT_SECRET must be set")?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.trim()) {
            bail!("PARLEY_JWT_SECRET is a placeholder, set a real secret");
        }

        let push_buffer: usize = parse_or(&get, "PARLEY_PUSH_BUFFER", 64)?;
        if push_buffer == 0 {
            bail!("PARLEY_PUSH_BUFFER must be at least 1");
        }

        let node_id: u16 = parse_or(&get, "PARLEY_NODE_ID", 1)?;
        if node_id > parley_db::ids::MAX_NODE_ID {
            bail!("PARLEY_NODE_ID must be at most {}", parley_db::ids::MAX_NODE_ID);
        }

        Ok(Self {
            host: get("PARLEY_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, "PARLEY_PORT", 3000)?,
            db_path: get("PARLEY_DB_PATH").unwrap_or_else(|| "parley.db".into()).into(),
            jwt_secret,
            upload_dir: get("PARLEY_UPLOAD_DIR").unwrap_or_else(|| "./uploads".into()).into(),
            max_upload_bytes: parse_or(&get, "PARLEY_MAX_UPLOAD_BYTES", 50 * 1024 * 1024)?,
            push_buffer,
            node_id,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("{} has invalid value {:?}", key, raw)),
        None => Ok(default),
    }
}
