use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use std::sync::Arc;

use crate::error::HubError;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/cryptos/data", get(all_cryptos))
}

/// Every stored CoinGecko market document.
async fn all_cryptos(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Value>>, HubError> {
    let store = Arc::clone(&state.store);
    let docs = tokio::task::spawn_blocking(move || store.cryptos()).await??;
    tracing::debug!(count = docs.len(), "cryptos dump");
    Ok(Json(docs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use crate::db::pool::memory_pool;
    use crate::db::sqlite::SqliteStore;
    use tokio::sync::watch;

    #[tokio::test]
    async fn dump_lists_every_document() {
        let pool = memory_pool();
        pool.get()
            .unwrap()
            .execute_batch(
                r#"INSERT INTO coingecko_data (id, doc) VALUES
                   ('bitcoin', '{"symbol":"btc","market_cap_rank":1}'),
                   ('solana', '{"symbol":"sol","market_cap_rank":5}')"#,
            )
            .unwrap();
        let (_tx, rx) = watch::channel(false);
        let state = AppState::new(HubConfig::default(), Arc::new(SqliteStore::new(pool)), rx);

        let Json(docs) = all_cryptos(State(state)).await.unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d["_id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["bitcoin", "solana"]);
        assert_eq!(docs[1]["market_cap_rank"], 5);
    }

    #[tokio::test]
    async fn empty_collection_is_an_empty_list() {
        let (_tx, rx) = watch::channel(false);
        let state = AppState::new(
            HubConfig::default(),
            Arc::new(SqliteStore::new(memory_pool())),
            rx,
        );
        let Json(docs) = all_cryptos(State(state)).await.unwrap();
        assert!(docs.is_empty());
    }
}
