use std::path::PathBuf;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub users_file: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = var("APP_HOST").unwrap_or_else(|| "localhost".into());
        let port = match var("APP_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("APP_PORT is not a valid port: {raw:?}"))?,
            None => 3300,
        };
        let users_file = var("USERS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data/user.json"));
        Ok(Self {
            host,
            port,
            users_file,
        })
    }
}
