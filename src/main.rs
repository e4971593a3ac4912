use std::env;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use lorekeep_backend::logging;
use lorekeep_backend::server;
use lorekeep_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let state = AppState::initialize().await?;
    logging::init(&state.paths);

    let port = env::var("LOREKEEP_PORT")
        .ok()
        .and_then(|val| val.parse::<u16>().ok())
        .unwrap_or(0);
    let bind_addr = format!("127.0.0.1:{}", port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    println!("LOREKEEP_PORT={}", addr.port());
    tracing::info!("Listening on {}", addr);

    let app: Router = server::router::router(state.clone());

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
