use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::travel::{LeavingDecision, ReimbursementSummary, TravelOutcome, TravelSnapshot};
use crate::ports::geolocation::ReportedLocation;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/appointments/:id/travel", get(travel_state))
        .route("/appointments/:id/travel/start-drive", post(start_drive))
        .route("/appointments/:id/travel/arrive", post(arrive))
        .route("/appointments/:id/travel/leaving", get(initiate_leaving))
        .route("/appointments/:id/travel/next", post(choose_next))
        .route("/appointments/:id/travel/return", post(choose_return))
        .route("/appointments/:id/reimbursement", get(reimbursement))
}

#[derive(Deserialize)]
pub struct CheckpointRequest {
    pub location: ReportedLocation,
}

#[derive(Deserialize)]
pub struct ChooseNextRequest {
    pub next_appointment_id: Uuid,
    pub location: ReportedLocation,
}

async fn travel_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TravelSnapshot>, AppError> {
    Ok(Json(state.tracker.travel_state(id).await?))
}

async fn start_drive(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CheckpointRequest>,
) -> Result<Json<TravelOutcome>, AppError> {
    Ok(Json(state.tracker.start_drive(id, &payload.location).await?))
}

async fn arrive(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CheckpointRequest>,
) -> Result<Json<TravelOutcome>, AppError> {
    Ok(Json(state.tracker.arrive(id, &payload.location).await?))
}

async fn initiate_leaving(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<LeavingDecision>, AppError> {
    Ok(Json(state.tracker.initiate_leaving(id).await?))
}

async fn choose_next(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ChooseNextRequest>,
) -> Result<Json<TravelOutcome>, AppError> {
    let outcome = state
        .tracker
        .choose_next(id, payload.next_appointment_id, &payload.location)
        .await?;
    Ok(Json(outcome))
}

async fn choose_return(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CheckpointRequest>,
) -> Result<Json<TravelOutcome>, AppError> {
    Ok(Json(state.tracker.choose_return(id, &payload.location).await?))
}

async fn reimbursement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReimbursementSummary>, AppError> {
    Ok(Json(state.tracker.reimbursement(id).await?))
}
