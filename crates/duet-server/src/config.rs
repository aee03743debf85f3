use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_name: String,
    pub production: bool,
    pub avatar_dir: PathBuf,
    pub public_url: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = get("DUET_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("DUET_JWT_SECRET is unset or still a placeholder");
        }

        let host = var("DUET_HOST", "0.0.0.0");
        let port: u16 = var("DUET_PORT", "5001")
            .parse()
            .context("DUET_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .context("DUET_HOST must be an IP address")?;

        Ok(Self {
            addr,
            db_path: var("DUET_DB_PATH", "duet.db").into(),
            jwt_secret,
            token_name: var("DUET_TOKEN_NAME", "jwt"),
            production: var("DUET_ENV", "development") == "production",
            avatar_dir: var("DUET_AVATAR_DIR", "./avatars").into(),
            public_url: var("DUET_PUBLIC_URL", &format!("http://localhost:{}", port)),
        })
    }
}
