use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::{
    api::{error::ApiError, stream},
    auth::AuthBearer,
    controller::{AppState, Connectivity},
    dispatcher::DispatchOutcome,
    domain::{
        AuditEntry, ControlAction, HistoricalData, HistoryWindow, SecurityStatus, ThreatEvent,
        ThreatStats,
    },
    reconcile::EffectiveView,
    threats::ThreatSummary,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/snapshot", get(get_snapshot))
        .route("/connectivity", get(get_connectivity))
        .route("/control", post(post_control))
        .route("/threats", get(get_threats).delete(clear_threats))
        .route("/threats/summary", get(get_threat_summary))
        .route("/security-status", get(get_security_status))
        .route("/stats", get(get_stats))
        .route("/audit", get(get_audit))
        .route("/history", get(get_history))
        .route("/stream", get(stream::stream))
        .route("/healthz", get(healthz))
        .with_state(state)
}

pub async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

pub async fn get_snapshot(State(st): State<AppState>, AuthBearer: AuthBearer) -> Json<EffectiveView> {
    Json(st.console.effective())
}

pub async fn get_connectivity(
    State(st): State<AppState>,
    AuthBearer: AuthBearer,
) -> Json<Connectivity> {
    Json(st.console.connectivity())
}

#[derive(Debug, Deserialize)]
pub struct ControlBody {
    pub action: String,
}

pub async fn post_control(
    State(st): State<AppState>,
    AuthBearer: AuthBearer,
    Json(body): Json<ControlBody>,
) -> Result<Json<DispatchOutcome>, ApiError> {
    let action: ControlAction = body
        .action
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("unknown control action '{}'", body.action)))?;
    Ok(Json(st.console.dispatcher.dispatch(action).await))
}

#[derive(Debug, Deserialize)]
pub struct ThreatQuery {
    pub limit: Option<usize>,
    #[serde(default)]
    pub critical_only: bool,
}

pub async fn get_threats(
    State(st): State<AppState>,
    AuthBearer: AuthBearer,
    Query(q): Query<ThreatQuery>,
) -> Json<Vec<ThreatEvent>> {
    let events = st
        .console
        .threats
        .events()
        .into_iter()
        .filter(|e| !q.critical_only || e.is_critical())
        .take(q.limit.unwrap_or(usize::MAX))
        .collect();
    Json(events)
}

pub async fn clear_threats(State(st): State<AppState>, AuthBearer: AuthBearer) -> StatusCode {
    st.console.threats.clear();
    StatusCode::NO_CONTENT
}

pub async fn get_threat_summary(
    State(st): State<AppState>,
    AuthBearer: AuthBearer,
) -> Json<ThreatSummary> {
    Json(st.console.threats.summary())
}

pub async fn get_security_status(
    State(st): State<AppState>,
    AuthBearer: AuthBearer,
) -> Result<Json<SecurityStatus>, ApiError> {
    Ok(Json(st.console.api.fetch_security_status().await?))
}

pub async fn get_stats(
    State(st): State<AppState>,
    AuthBearer: AuthBearer,
) -> Result<Json<ThreatStats>, ApiError> {
    Ok(Json(st.console.api.fetch_stats().await?))
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

pub async fn get_audit(
    State(st): State<AppState>,
    AuthBearer: AuthBearer,
    Query(q): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    let limit = q.limit.unwrap_or(st.cfg.polling.threat_batch_limit);
    Ok(Json(st.console.api.fetch_audit_logs(limit).await?))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub hours: Option<i64>,
}

pub async fn get_history(
    State(st): State<AppState>,
    AuthBearer: AuthBearer,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<HistoricalData>, ApiError> {
    let hours = q.hours.unwrap_or(24);
    if !(1..=24 * 31).contains(&hours) {
        return Err(ApiError::BadRequest(format!("hours must be between 1 and 744, got {hours}")));
    }
    let window = HistoryWindow::last_hours(Utc::now(), hours);
    Ok(Json(st.console.api.fetch_historical(window).await?))
}
