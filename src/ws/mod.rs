pub mod poller;
pub mod session;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::bucket::Granularity;
use crate::error::HubError;
use crate::feeds::news::TickerNews;
use crate::feeds::posts::KeywordPosts;
use crate::feeds::sentiment::SentimentStream;
use crate::feeds::trade_stats::TradeStats;
use crate::feeds::transactions::BigTransactions;
use crate::feeds::Feed;
use crate::state::AppState;
use poller::Poller;

// ── Query params ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SourceQuery {
    #[serde(default)]
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct KeywordQuery {
    #[serde(default)]
    keywords: Option<String>,
    #[serde(default)]
    subreddit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewsQuery {
    #[serde(default)]
    tickers: Option<String>,
    #[serde(default)]
    limit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SentimentQuery {
    #[serde(default)]
    keywords: Option<String>,
    #[serde(default)]
    aggregation_type: Option<String>,
    #[serde(default)]
    subreddit: Option<String>,
}

// ── Route definitions ────────────────────────────────────────────────────

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/whales/ws/big_transactions", get(ws_big_transactions))
        .route("/whales/ws/big_transactions/{pair}", get(ws_big_transactions_pair))
        .route("/ws/keyword_posts", get(ws_keyword_posts))
        .route("/ws/ticker_news", get(ws_ticker_news))
        .route(
            "/stats/ws/transaction_stats/{symbol}/{interval_seconds}",
            get(ws_transaction_stats),
        )
        .route("/ws/sentiment", get(ws_sentiment))
}

async fn ws_big_transactions(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<SourceQuery>,
) -> impl IntoResponse {
    let feed = BigTransactions::all(q.source.as_deref(), state.config.batch_limit);
    serve(ws, state, Ok(feed))
}

async fn ws_big_transactions_pair(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(pair): Path<String>,
    Query(q): Query<SourceQuery>,
) -> impl IntoResponse {
    let feed = BigTransactions::for_currency(&pair, q.source.as_deref(), state.config.batch_limit);
    serve(ws, state, feed)
}

async fn ws_keyword_posts(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<KeywordQuery>,
) -> impl IntoResponse {
    let feed = KeywordPosts::new(
        q.keywords.as_deref().unwrap_or_default(),
        q.subreddit.as_deref(),
        state.config.batch_limit,
    );
    serve(ws, state, feed)
}

async fn ws_ticker_news(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<NewsQuery>,
) -> impl IntoResponse {
    let feed = news_limit(q.limit.as_deref(), &state)
        .and_then(|limit| TickerNews::new(q.tickers.as_deref().unwrap_or_default(), limit));
    serve(ws, state, feed)
}

async fn ws_transaction_stats(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path((symbol, interval)): Path<(String, String)>,
    Query(q): Query<SourceQuery>,
) -> impl IntoResponse {
    let feed = Granularity::from_stats_seconds(&interval)
        .and_then(|g| {
            TradeStats::new(
                &symbol,
                g,
                q.source.as_deref(),
                Utc::now(),
                state.config.max_buckets,
            )
        });
    serve(ws, state, feed)
}

async fn ws_sentiment(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<SentimentQuery>,
) -> impl IntoResponse {
    let feed = Granularity::from_aggregation_type(q.aggregation_type.as_deref().unwrap_or_default())
        .and_then(|g| {
            SentimentStream::new(
                q.keywords.as_deref().unwrap_or_default(),
                g,
                q.subreddit.as_deref(),
                Utc::now(),
                state.config.max_buckets,
            )
        });
    serve(ws, state, feed)
}

/// Client-chosen news batch size, clamped to `[1, news_max_limit]`.
fn news_limit(raw: Option<&str>, state: &AppState) -> Result<usize, HubError> {
    let max = state.config.news_max_limit;
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(state.config.batch_limit.clamp(1, max)),
        Some(s) => s
            .parse::<i64>()
            .map(|n| n.clamp(1, max as i64) as usize)
            .map_err(|_| HubError::BadRequest("limit must be an integer".to_string())),
    }
}

/// Upgrade and run a session, or report a setup error on the socket and close.
///
/// Setup errors are reported after the upgrade so streaming clients always get
/// an `{"error": ...}` frame rather than a failed handshake.
fn serve<F: Feed>(
    ws: WebSocketUpgrade,
    state: Arc<AppState>,
    feed: Result<F, HubError>,
) -> axum::response::Response {
    ws.on_upgrade(move |socket| async move {
        let (mut sender, receiver) = socket.split();
        let feed = match feed {
            Ok(feed) => feed,
            Err(e) => {
                tracing::info!("rejected stream setup: {e}");
                reject(&mut sender, &e).await;
                return;
            }
        };
        let poller = Poller::new(feed, Arc::clone(&state.store));
        session::run(
            poller,
            sender,
            receiver,
            state.config.idle_timeout,
            state.shutdown.clone(),
        )
        .await;
    })
}

async fn reject(sender: &mut SplitSink<WebSocket, Message>, e: &HubError) {
    let frame = json!({ "error": e.client_message() });
    let _ = sender.send(Message::Text(frame.to_string().into())).await;
    let _ = sender.send(Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use crate::db::pool::memory_pool;
    use crate::db::sqlite::SqliteStore;
    use rusqlite::params;
    use serde_json::Value;
    use tokio::sync::watch;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    async fn spawn_app(seed: impl FnOnce(&rusqlite::Connection)) -> (String, watch::Sender<bool>) {
        let pool = memory_pool();
        {
            let conn = pool.get().unwrap();
            seed(&*conn);
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = AppState::new(
            HubConfig::default(),
            Arc::new(SqliteStore::new(pool)),
            shutdown_rx,
        );
        let app = routes().with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("ws://{addr}"), shutdown_tx)
    }

    fn text_json(msg: WsMessage) -> Value {
        serde_json::from_str(msg.to_text().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn invalid_interval_gets_error_frame_and_close() {
        let (base, _shutdown) = spawn_app(|_| {}).await;
        let (mut ws, _resp) =
            tokio_tungstenite::connect_async(format!("{base}/stats/ws/transaction_stats/BTC/7"))
                .await
                .unwrap();

        let first = ws.next().await.unwrap().unwrap();
        assert_eq!(
            text_json(first),
            json!({ "error": "Invalid interval. Must be 1, 10, 30, or 60 seconds." })
        );
        assert!(matches!(ws.next().await, Some(Ok(WsMessage::Close(_))) | None));
    }

    #[tokio::test]
    async fn pair_stream_bursts_then_reports_empty() {
        let (base, _shutdown) = spawn_app(|conn| {
            for (i, (base_ccy, quote_ccy)) in [("BTC", "USDT"), ("ETH", "BTC"), ("ETH", "USDT")]
                .into_iter()
                .enumerate()
            {
                conn.execute(
                    "INSERT INTO big_transactions
                     (id, ts_ms, symbol, base_currency, quote_currency, side, price, quantity, value, source)
                     VALUES (?1, ?2, ?3, ?4, ?5, 'buy', 1.0, 1.0, 1.0, 'kucoin')",
                    params![
                        i as i64 + 1,
                        1_000 * (i as i64 + 1),
                        format!("{base_ccy}-{quote_ccy}"),
                        base_ccy,
                        quote_ccy
                    ],
                )
                .unwrap();
            }
        })
        .await;
        let (mut ws, _resp) =
            tokio_tungstenite::connect_async(format!("{base}/whales/ws/big_transactions/btc"))
                .await
                .unwrap();

        let burst = text_json(ws.next().await.unwrap().unwrap());
        let ids: Vec<&str> = burst
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["2", "1"]);

        ws.send(WsMessage::Text("next".into())).await.unwrap();
        assert_eq!(text_json(ws.next().await.unwrap().unwrap()), json!([]));
    }

    #[tokio::test]
    async fn blank_keywords_are_rejected_on_the_socket() {
        let (base, _shutdown) = spawn_app(|_| {}).await;
        let (mut ws, _resp) =
            tokio_tungstenite::connect_async(format!("{base}/ws/keyword_posts?keywords=%20,"))
                .await
                .unwrap();

        let first = text_json(ws.next().await.unwrap().unwrap());
        assert_eq!(first, json!({ "error": "keywords must not be empty" }));
    }

    #[tokio::test]
    async fn shutdown_flag_closes_open_streams() {
        let (base, shutdown) = spawn_app(|_| {}).await;
        let (mut ws, _resp) = tokio_tungstenite::connect_async(format!(
            "{base}/ws/sentiment?keywords=btc&aggregation_type=minutes"
        ))
        .await
        .unwrap();

        assert_eq!(text_json(ws.next().await.unwrap().unwrap()), json!([]));
        shutdown.send(true).unwrap();
        assert!(matches!(ws.next().await, Some(Ok(WsMessage::Close(_))) | None));
    }

    #[test]
    fn news_limit_is_clamped() {
        let (_tx, rx) = watch::channel(false);
        let config = HubConfig {
            news_max_limit: 50,
            ..HubConfig::default()
        };
        let state = AppState::new(config, Arc::new(SqliteStore::new(memory_pool())), rx);

        assert_eq!(news_limit(None, &state).unwrap(), 50);
        assert_eq!(news_limit(Some("0"), &state).unwrap(), 1);
        assert_eq!(news_limit(Some("-3"), &state).unwrap(), 1);
        assert_eq!(news_limit(Some("20"), &state).unwrap(), 20);
        assert_eq!(news_limit(Some("500"), &state).unwrap(), 50);
        assert!(news_limit(Some("ten"), &state).is_err());
    }
}
