use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use voicetally_core::{SessionStore, StatKind, VoiceTallyError};
use voicetally_tracker::AggregationEngine;

/// Upper bound for `?limit=` on the stats endpoint.
const MAX_LIMIT: usize = 100;

/// Shared application state for API handlers.
pub struct AppState<S> {
    pub engine: AggregationEngine<S>,
    pub default_limit: usize,
}

/// Build the Axum router with all API routes.
pub fn build_router<S>(state: Arc<AppState<S>>) -> Router
where
    S: SessionStore + 'static,
{
    Router::new()
        .route("/api/health", get(health))
        .route("/api/guilds/:guild_id/stats/:kind", get(guild_stats::<S>))
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "voicetally",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
    pub limit: Option<usize>,
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

/// Ranking of closed voice time for one guild, by channel or by user.
async fn guild_stats<S>(
    State(state): State<Arc<AppState<S>>>,
    Path((guild_id, kind)): Path<(String, String)>,
    Query(params): Query<StatsParams>,
) -> Result<Json<Value>, ApiError>
where
    S: SessionStore + 'static,
{
    let kind: StatKind = kind
        .parse()
        .map_err(|e: String| api_error(StatusCode::BAD_REQUEST, e))?;
    let limit = params.limit.unwrap_or(state.default_limit).min(MAX_LIMIT);

    let rows = state
        .engine
        .top(kind, &guild_id, limit)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, guild_id = %guild_id, %kind, "Failed to fetch stats");
            match e {
                VoiceTallyError::Timeout(_) => {
                    api_error(StatusCode::GATEWAY_TIMEOUT, "aggregation timed out")
                }
                _ => api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to fetch stats"),
            }
        })?;

    let rows: Vec<Value> = rows
        .iter()
        .map(|row| {
            json!({
                "id": row.key,
                "total_time_ms": row.total_time_ms,
                "hours": row.hours(),
            })
        })
        .collect();

    Ok(Json(json!({
        "guild_id": guild_id,
        "kind": kind,
        "rows": rows,
    })))
}
