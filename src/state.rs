use std::sync::Arc;

use anyhow::Context;

use crate::config::AppConfig;
use crate::users::repo::UserStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<UserStore>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        Self::from_config(config).await
    }

    /// Opens (and if needed creates) the users file named by the config.
    pub async fn from_config(config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let users = UserStore::open(&config.users_file)
            .await
            .with_context(|| format!("open users file {}", config.users_file.display()))?;
        Ok(Self {
            config,
            users: Arc::new(users),
        })
    }
}
