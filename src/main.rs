mod app;
mod config;
mod error;
mod state;
mod users;

use tracing_subscriber::EnvFilter;

use crate::{app::build_app, state::AppState};

const DEFAULT_LOG_FILTER: &str = "user_registry=debug,axum=info,tower_http=info";

/// `RUST_LOG` picks levels, `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => builder.with_target(false).json().init(),
        _ => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_tracing();

    let state = AppState::init().await?;
    tracing::info!(users_file = %state.users.path().display(), "users store ready");

    let config = state.config.clone();
    app::serve(build_app(state), &config).await
}
