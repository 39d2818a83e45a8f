use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

use crate::bucket::{align, bucket_count, generate, Granularity};
use crate::db::store::{F_CREATED_UTC, F_KEYWORD, F_SUBREDDIT};
use crate::error::HubError;
use crate::filter::{parse_values, Case, Clause, Cmp, Dimension, FilterTemplate};
use crate::gapfill::{fill, SentimentBucket, ZeroFill};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AggregationQuery {
    #[serde(default)]
    keywords: Option<String>,
    #[serde(default)]
    aggregation_type: Option<String>,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    subreddit: Option<String>,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/sentiment_aggregation", get(sentiment_aggregation))
}

/// Parse an ISO-8601 instant; values without an offset are taken as UTC.
fn parse_time(name: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, HubError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(Some(naive.and_utc()));
        }
    }
    Err(HubError::BadRequest(format!("{name} is not a valid datetime: {raw}")))
}

fn epoch_secs(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

/// Sentiment label counts per hour or minute over a closed time range.
///
/// The series is dense: every bucket between `start_time` and `end_time` is
/// present, with zero counts where no post landed.
async fn sentiment_aggregation(
    State(state): State<Arc<AppState>>,
    Query(q): Query<AggregationQuery>,
) -> Result<Json<Vec<SentimentBucket>>, HubError> {
    let granularity =
        Granularity::from_aggregation_type(q.aggregation_type.as_deref().unwrap_or_default())?;
    let keywords = parse_values("keywords", q.keywords.as_deref().unwrap_or_default(), Case::Lower)?;

    let end = parse_time("end_time", q.end_time.as_deref())?.unwrap_or_else(Utc::now);
    let start =
        parse_time("start_time", q.start_time.as_deref())?.unwrap_or(end - granularity.lookback());
    if start > end {
        return Ok(Json(Vec::new()));
    }
    let step = granularity.step();
    let (first, last) = (align(start, step), align(end, step));
    let max = state.config.max_buckets;
    let count = bucket_count(first, last, step);
    if count > max as u64 {
        return Err(HubError::BadRequest(format!(
            "time range spans {count} buckets; at most {max} are allowed"
        )));
    }

    let pred = FilterTemplate::new(
        Dimension::OneOf {
            field: F_KEYWORD,
            values: keywords,
        },
        F_CREATED_UTC,
    )
    .with_eq(F_SUBREDDIT, q.subreddit.as_deref())
    .base()
    .and(Clause::Compare {
        field: F_CREATED_UTC,
        op: Cmp::Gte,
        value: epoch_secs(start).into(),
    })
    .and(Clause::Compare {
        field: F_CREATED_UTC,
        op: Cmp::Lte,
        value: epoch_secs(end).into(),
    });

    let store = Arc::clone(&state.store);
    let rows = tokio::task::spawn_blocking(move || store.sentiment_buckets(&pred, step)).await??;

    let series = generate(first, last, step, max)?;
    tracing::debug!(
        buckets = series.len(),
        populated = rows.len(),
        "sentiment aggregation"
    );
    Ok(Json(fill(&mut ZeroFill { granularity }, &series, rows)))
}
