use tracing::info;
use tracing_subscriber::EnvFilter;

use adflux_server::{router, startup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    adflux_core::config::load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = adflux_core::Config::from_env();
    let addr = config.server.bind_addr();

    let state = startup::build_state(config).await?;
    let app = router::build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(startup::shutdown_signal(state.scheduler.clone()))
        .await?;

    Ok(())
}
