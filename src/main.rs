mod bucket;
mod config;
mod db;
mod error;
mod feeds;
mod filter;
mod gapfill;
mod routes;
mod state;
mod ws;

use anyhow::Context;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use config::HubConfig;
use db::pool::open_ro_pool;
use db::sqlite::SqliteStore;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = HubConfig::from_env();
    let bind = cfg.bind.clone();
    let port = cfg.port;

    if cfg.db_init {
        db::schema::bootstrap(&cfg.db_path).context("bootstrapping database")?;
    }
    let pool = open_ro_pool(&cfg.db_path, cfg.db_pool_size)
        .with_context(|| format!("opening {}", cfg.db_path.display()))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = AppState::new(cfg, Arc::new(SqliteStore::new(pool)), shutdown_rx);
    let app = build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}")
        .parse()
        .context("invalid bind address")?;

    tracing::info!("Pulse hub listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("server error")?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::api_router())
        .merge(ws::routes())
        .route("/health", axum::routing::get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

/// Wait for Ctrl+C, then tell every open session to close.
async fn shutdown_signal(shutdown: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install Ctrl+C handler: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, gracefully stopping…");
    let _ = shutdown.send(true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::memory_pool;
    use futures::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    #[tokio::test]
    async fn health_and_streams_share_one_router() {
        let (_tx, rx) = watch::channel(false);
        let state = AppState::new(
            HubConfig::default(),
            Arc::new(SqliteStore::new(memory_pool())),
            rx,
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });

        let (mut ws, _resp) =
            tokio_tungstenite::connect_async(format!("ws://{addr}/ws/ticker_news?tickers=AAPL"))
                .await
                .unwrap();
        let first = ws.next().await.unwrap().unwrap();
        assert_eq!(first.to_text().unwrap(), "[]");
        ws.send(Message::Close(None)).await.unwrap();

        // Plain HTTP over the same listener.
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut body = String::new();
        stream.read_to_string(&mut body).await.unwrap();
        assert!(body.starts_with("HTTP/1.1 200"));
        assert!(body.ends_with(r#"{"status":"ok"}"#));
    }
}
