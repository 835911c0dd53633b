use std::net::SocketAddr;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use backend::api::{self, AppState};
use backend::coordinator::Coordinator;
use shaktris_core::game::GameConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    dotenv::dotenv().ok();

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(3000);
    let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string());

    let coordinator = Coordinator::new(GameConfig::default());
    let state = AppState::new(coordinator);
    let app = api::router(state);

    let addr: SocketAddr = format!("{bind_address}:{port}")
        .parse()
        .context("invalid BIND_ADDRESS/PORT")?;
    info!(%addr, "shaktris server listening");
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
