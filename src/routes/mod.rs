pub mod cryptos;
pub mod sentiment;
pub mod tickers;

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// Assemble the single-shot HTTP router.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(sentiment::routes())
        .merge(cryptos::routes())
        .merge(tickers::routes())
}
