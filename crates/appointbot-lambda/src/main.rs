use std::sync::Arc;

use lambda_http::{run, Error};
use tracing::info;

use appointbot_core::config;
use appointbot_core::service::http::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "appointbot=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .init();

    info!("appointbot Lambda starting...");

    // Credentials are checked per invocation, so a cold start never fails on them.
    let cfg = config::load_config_from_env();
    let state = Arc::new(AppState::from_config(cfg));

    let router = create_router(state);

    run(router).await?;

    Ok(())
}
