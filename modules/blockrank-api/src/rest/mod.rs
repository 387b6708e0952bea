use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use blockrank_common::{Actor, RecordFilter, UpdateOutcome};
use blockrank_scout::BatchSummary;

use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    id: Option<String>,
    keyword: Option<String>,
    limit: Option<u32>,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    outcomes: Vec<UpdateOutcome>,
    #[serde(flatten)]
    summary: BatchSummary,
}

fn actor_from_headers(headers: &HeaderMap) -> Actor {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let system = Actor::system();
    Actor {
        id: header("x-actor-id").unwrap_or(system.id),
        role: header("x-actor-role").unwrap_or(system.role),
    }
}

fn error_response(status: StatusCode, error: &str, detail: String) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": error, "detail": detail })),
    )
        .into_response()
}

/// `POST /api/rankings/refresh`: refresh the selected records and return
/// one outcome per record.
pub async fn api_refresh(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> Response {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let filter = RecordFilter {
        id: request.id,
        keyword: request.keyword,
        limit: request.limit,
    };
    let actor = actor_from_headers(&headers);

    let _guard = state.run_lock.lock().await;

    let records = match state.updater.store().load_records(&filter).await {
        Ok(records) => records,
        Err(e) => {
            error!(error = %e, ?filter, "Record lookup failed");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "record lookup failed",
                e.to_string(),
            );
        }
    };

    info!(records = records.len(), actor = %actor.id, "Refresh requested");

    match state.updater.run(&records, &actor).await {
        Ok(outcomes) => {
            let summary = BatchSummary::from_outcomes(&outcomes);
            (StatusCode::OK, Json(RefreshResponse { outcomes, summary })).into_response()
        }
        Err(e) if e.is_fatal() => {
            error!(error = %e, "Refresh aborted, no browser available");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "browser unavailable", e.to_string())
        }
        Err(e) => {
            error!(error = %e, "Refresh failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "refresh failed", e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn actor_defaults_to_system() {
        let actor = actor_from_headers(&HeaderMap::new());
        assert_eq!(actor.id, "system");
        assert_eq!(actor.role, "system");
    }

    #[test]
    fn actor_comes_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-actor-id", HeaderValue::from_static("admin-7"));
        headers.insert("x-actor-role", HeaderValue::from_static(" "));
        let actor = actor_from_headers(&headers);
        assert_eq!(actor.id, "admin-7");
        assert_eq!(actor.role, "system");
    }
}
