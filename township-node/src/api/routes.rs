//! API handlers

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::{Stream, StreamExt};
use township_lifecycle::{
    Category, LifecycleStats, MasterVoteDecision, Notification, Priority, Report, ReportFilter,
    ReportId, ReportInput, ReportStatus, VoteDirection,
};
use tracing::{debug, warn};

use super::error::ApiJson;
use super::{ApiError, AppState};

type ApiResult<T> = Result<T, ApiError>;

fn parse_id(raw: &str) -> ApiResult<ReportId> {
    raw.parse()
        .map_err(|_| ApiError::MalformedId(raw.to_string()))
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        node: state.config.node.name.clone(),
        reports: state.engine.len(),
        stream_clients: state.hub.client_count(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub node: String,
    pub reports: usize,
    pub stream_clients: usize,
    pub version: &'static str,
}

// === Reports ===

/// Missing fields deserialize as blank so the engine reports them.
#[derive(Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub submitted_by: Option<String>,
}

/// POST /reports
pub async fn submit_report(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SubmitRequest>,
) -> ApiResult<(StatusCode, Json<Report>)> {
    let input = ReportInput {
        title: req.title,
        description: req.description,
        location: req.location,
        priority: req.priority,
        category: req.category,
        submitted_by: req.submitted_by,
    };
    let report = state.engine.submit_report(input).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// GET /reports?status=&priority=&q=
pub async fn list_reports(
    State(state): State<AppState>,
    Query(filter): Query<ReportFilter>,
) -> Json<Vec<Report>> {
    Json(state.engine.list(&filter).await)
}

/// GET /reports/:id
pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Report>> {
    let id = parse_id(&id)?;
    Ok(Json(state.engine.get(id).await?))
}

#[derive(Deserialize)]
pub struct VoteRequest {
    pub direction: VoteDirection,
    /// With a voter id, repeat votes toggle instead of accumulating
    #[serde(default)]
    pub voter_id: Option<String>,
}

/// POST /reports/:id/votes
pub async fn cast_vote(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<VoteRequest>,
) -> ApiResult<Json<Report>> {
    let id = parse_id(&id)?;
    let report = match req.voter_id {
        Some(voter) => state.engine.cast_ballot(id, &voter, req.direction).await?,
        None => state.engine.cast_vote(id, req.direction).await?,
    };
    Ok(Json(report))
}

#[derive(Deserialize)]
pub struct MasterVoteRequest {
    pub decision: MasterVoteDecision,
    #[serde(default)]
    pub moderator: Option<String>,
}

#[derive(Serialize)]
pub struct MasterVoteResponse {
    pub report: Report,
    /// False when an earlier decision stood
    pub recorded: bool,
    pub message: &'static str,
}

/// POST /reports/:id/master-vote
pub async fn master_vote(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<MasterVoteRequest>,
) -> ApiResult<Json<MasterVoteResponse>> {
    let id = parse_id(&id)?;
    let moderator = req.moderator.as_deref().unwrap_or("admin");
    let outcome = state.gate.decide(id, req.decision, moderator).await?;

    Ok(Json(MasterVoteResponse {
        recorded: outcome.was_recorded(),
        message: outcome.user_message(),
        report: outcome.into_report(),
    }))
}

/// POST /reports/:id/conclude
pub async fn conclude(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Report>> {
    let id = parse_id(&id)?;
    Ok(Json(state.engine.mark_concluded(id).await?))
}

#[derive(Deserialize)]
pub struct InitiativeRequest {
    #[serde(default)]
    pub initiator: String,
}

/// POST /reports/:id/initiative
pub async fn take_initiative(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<InitiativeRequest>,
) -> ApiResult<Json<Report>> {
    let id = parse_id(&id)?;
    Ok(Json(state.engine.take_initiative(id, &req.initiator).await?))
}

// === Admin setters ===

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: ReportStatus,
}

/// POST /reports/:id/status
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<StatusRequest>,
) -> ApiResult<Json<Report>> {
    let id = parse_id(&id)?;
    Ok(Json(state.engine.update_status(id, req.status).await?))
}

#[derive(Deserialize)]
pub struct PriorityRequest {
    pub priority: Priority,
}

/// POST /reports/:id/priority
pub async fn update_priority(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<PriorityRequest>,
) -> ApiResult<Json<Report>> {
    let id = parse_id(&id)?;
    Ok(Json(state.engine.update_priority(id, req.priority).await?))
}

#[derive(Deserialize)]
pub struct AssignmentRequest {
    /// `null` or blank clears the assignment
    #[serde(default)]
    pub assigned_to: Option<String>,
}

/// POST /reports/:id/assignment
pub async fn assign(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<AssignmentRequest>,
) -> ApiResult<Json<Report>> {
    let id = parse_id(&id)?;
    Ok(Json(state.engine.assign_to(id, req.assigned_to).await?))
}

#[derive(Deserialize)]
pub struct ProgressRequest {
    pub completion_rate: u8,
}

/// POST /reports/:id/progress
pub async fn update_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<ProgressRequest>,
) -> ApiResult<Json<Report>> {
    let id = parse_id(&id)?;
    Ok(Json(state.engine.update_progress(id, req.completion_rate).await?))
}

// === Notifications ===

/// GET /reports/:id/notifications
pub async fn report_notifications(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Notification>>> {
    let id = parse_id(&id)?;
    // 404 for unknown reports rather than an empty list
    state.engine.get(id).await?;
    Ok(Json(state.inbox.for_report(id)))
}

/// GET /notifications/stream
///
/// Server-Sent Events; the event name is the notification kind and the
/// event id its sequence number.
pub async fn notification_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(clients = state.hub.client_count() + 1, "SSE client connected");

    let stream = BroadcastStream::new(state.hub.subscribe()).filter_map(|msg| match msg {
        Ok(notification) => match Event::default()
            .event(notification.kind.as_str())
            .id(notification.sequence.to_string())
            .json_data(&notification)
        {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                warn!(error = %e, "Failed to encode notification");
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(skipped, "SSE client lagged, notifications dropped");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Json<LifecycleStats> {
    Json(state.engine.stats().await)
}
