use arc_swap::ArcSwapOption;
use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::{
    guard::{ActionGuard, GuardRejection},
    middleware::{log_requests, rate_limit, ClientRateLimiter},
    models::{MatchRegistered, ReconciledStats},
    notifications::{JobQueue, NotificationJob, WebhookPayload},
    stats::{Standings, StatsError, StatsReader},
};

pub const DEFAULT_UPCOMING_DAYS: u32 = 7;
pub const MAX_UPCOMING_DAYS: u32 = 30;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub reader: Arc<StatsReader>,
    pub guard: ActionGuard,
    /// Last published standings snapshot, swapped in whole on rebuild.
    pub leaderboard: Arc<ArcSwapOption<Standings>>,
    pub jobs: JobQueue,
    /// Admin routes answer 401 while unset.
    pub admin_secret: Option<String>,
}

impl AppState {
    pub fn new(reader: Arc<StatsReader>, guard: ActionGuard, jobs: JobQueue, admin_secret: Option<String>) -> Self {
        Self {
            reader,
            guard,
            leaderboard: Arc::new(ArcSwapOption::empty()),
            jobs,
            admin_secret,
        }
    }
}

/// Routes and handlers only; no middleware.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/user-stats/:address", get(get_user_stats))
        .route("/api/matches/upcoming", get(get_upcoming_matches))
        .route("/api/leaderboard", get(get_leaderboard))
        .route("/api/admin/leaderboard/refresh", post(refresh_leaderboard))
        .route("/api/webhook", post(handle_webhook))
        .with_state(state)
}

/// Full router: rate limiting on `/api/*`, request logging, CORS and tracing.
///
/// Must be served with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_router(state: AppState, limiter: ClientRateLimiter) -> Router {
    api_router(state)
        .layer(middleware::from_fn_with_state(limiter, rate_limit))
        .layer(middleware::from_fn(log_requests))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

// ===== Route Handlers =====

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn get_user_stats(
    State(state): State<AppState>,
    Path(address): Path<String>,
    query: Result<Query<BlockRangeQuery>, QueryRejection>,
) -> Result<Json<ReconciledStats>, ApiError> {
    let Query(params) = query?;
    let stats = state
        .reader
        .get_reconciled_stats(&address, params.from_block)
        .await?;
    Ok(Json(stats))
}

async fn get_upcoming_matches(
    State(state): State<AppState>,
    query: Result<Query<UpcomingQuery>, QueryRejection>,
) -> Result<Json<UpcomingResponse>, ApiError> {
    let Query(params) = query?;
    let days = params.days.unwrap_or(DEFAULT_UPCOMING_DAYS);
    if !(1..=MAX_UPCOMING_DAYS).contains(&days) {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {}",
            MAX_UPCOMING_DAYS
        )));
    }

    let upcoming = state
        .reader
        .list_upcoming_matches(days, params.from_block)
        .await?;
    Ok(Json(UpcomingResponse {
        count: upcoming.len(),
        matches: upcoming.into_vec(),
    }))
}

async fn get_leaderboard(State(state): State<AppState>) -> Result<Json<Standings>, ApiError> {
    state
        .leaderboard
        .load_full()
        .map(|snapshot| Json(snapshot.as_ref().clone()))
        .ok_or_else(|| ApiError::NotFound("Leaderboard has not been built yet".to_string()))
}

/// Rebuilds the standings from the deployment block and publishes them.
async fn refresh_leaderboard(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let authorized = match (&state.admin_secret, &auth) {
        (Some(secret), Some(TypedHeader(authorization))) => authorization.token() == secret.as_str(),
        _ => false,
    };
    if !authorized {
        warn!(has_header = auth.is_some(), "unauthorized leaderboard refresh");
        return Err(ApiError::Unauthorized);
    }

    let permit = state.guard.try_acquire()?;
    info!("leaderboard refresh started");

    let standings = match state.reader.compute_standings(None).await {
        Ok(standings) => standings,
        Err(e) => {
            error!(error = %e, "leaderboard refresh failed");
            drop(permit);
            return Err(e.into());
        }
    };

    let response = RefreshResponse {
        success: true,
        players: standings.entries.len(),
        from_block: standings.from_block,
        to_block: standings.to_block,
        generated_at: standings.generated_at,
    };
    state.leaderboard.store(Some(Arc::new(standings)));
    permit.succeed();
    info!(players = response.players, "leaderboard published");

    Ok(Json(response))
}

async fn handle_webhook(State(state): State<AppState>, body: Bytes) -> Result<Json<serde_json::Value>, ApiError> {
    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid webhook payload: {}", e)))?;

    debug!(fid = payload.fid, event = payload.event.name(), "webhook received");
    state.jobs.enqueue(NotificationJob {
        fid: payload.fid,
        event: payload.event,
        received_at: Utc::now(),
    });

    Ok(Json(json!({ "success": true })))
}

// ===== Request/Response Types =====

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockRangeQuery {
    from_block: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpcomingQuery {
    days: Option<u32>,
    from_block: Option<u64>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct UpcomingResponse {
    count: usize,
    matches: Vec<MatchRegistered>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    success: bool,
    players: usize,
    from_block: u64,
    to_block: u64,
    generated_at: DateTime<Utc>,
}

// ===== Error Handling =====

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    NotFound(String),
    Busy,
    CoolingDown(Duration),
    Upstream(String),
}

impl From<StatsError> for ApiError {
    fn from(err: StatsError) -> Self {
        match err {
            StatsError::InvalidAddress(_) => ApiError::BadRequest(err.to_string()),
            StatsError::UpstreamUnavailable(_) => ApiError::Upstream(err.to_string()),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<GuardRejection> for ApiError {
    fn from(rejection: GuardRejection) -> Self {
        match rejection {
            GuardRejection::Busy => ApiError::Busy,
            GuardRejection::CoolingDown { retry_after } => ApiError::CoolingDown(retry_after),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Busy => (StatusCode::CONFLICT, GuardRejection::Busy.to_string()),
            ApiError::CoolingDown(retry_after) => {
                let secs = retry_after.as_secs().max(1);
                let body = Json(json!({
                    "error": format!("Refresh on cooldown, retry in {}s", secs),
                }));
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, secs.to_string())],
                    body,
                )
                    .into_response();
            }
            ApiError::Upstream(msg) => {
                error!("Upstream error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Ledger unavailable, try again later".to_string())
            }
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_stats_error_conversion() {
        let api_err: ApiError = StatsError::InvalidAddress("0x12".to_string()).into();
        assert!(matches!(api_err, ApiError::BadRequest(_)));
        assert_eq!(api_err.into_response().status(), StatusCode::BAD_REQUEST);

        let api_err: ApiError = StatsError::UpstreamUnavailable(anyhow!("timeout")).into();
        assert_eq!(api_err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_guard_rejection_conversion() {
        let resp = ApiError::from(GuardRejection::Busy).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = ApiError::from(GuardRejection::CoolingDown {
            retry_after: Duration::from_secs(90),
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers()[header::RETRY_AFTER], "90");
    }
}
