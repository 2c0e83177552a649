use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::post;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::travel::CheckpointRequest;
use crate::error::AppError;
use crate::models::leg::TravelLeg;
use crate::models::travel::TravelOutcome;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/legs/:id/complete", post(complete_return))
        .route("/legs/:id/toll", post(confirm_toll))
}

#[derive(Deserialize)]
pub struct ConfirmTollRequest {
    pub actual_amount: f64,
}

async fn complete_return(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CheckpointRequest>,
) -> Result<Json<TravelOutcome>, AppError> {
    Ok(Json(state.tracker.complete_return(id, &payload.location).await?))
}

async fn confirm_toll(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ConfirmTollRequest>,
) -> Result<Json<TravelLeg>, AppError> {
    Ok(Json(state.tracker.confirm_toll(id, payload.actual_amount).await?))
}
