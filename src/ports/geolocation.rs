use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::timeout;

use crate::error::AppError;
use crate::models::location::GeoReading;
use crate::models::travel::TravelAction;

#[derive(Debug, Clone, Copy, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("position unavailable")]
    PositionUnavailable,

    #[error("position request timed out")]
    Timeout,
}

#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn current_position(&self, action: TravelAction) -> Result<GeoReading, LocationError>;
}

/// Position the client read on its side and sent along with the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportedLocation {
    Reading(GeoReading),
    Failure { error: LocationError },
}

#[async_trait]
impl GeolocationProvider for ReportedLocation {
    async fn current_position(&self, _action: TravelAction) -> Result<GeoReading, LocationError> {
        match self {
            ReportedLocation::Reading(reading) => Ok(*reading),
            ReportedLocation::Failure { error } => Err(*error),
        }
    }
}

/// Reads a position for `action`, bounded by `limit`. Out-of-range coordinates are rejected.
pub async fn read_position(
    provider: &dyn GeolocationProvider,
    action: TravelAction,
    limit: Duration,
) -> Result<GeoReading, AppError> {
    let reading = match timeout(limit, provider.current_position(action)).await {
        Ok(Ok(reading)) => reading,
        Ok(Err(err)) => return Err(AppError::LocationUnavailable(err.to_string())),
        Err(_) => {
            return Err(AppError::LocationUnavailable(format!(
                "no position within {}ms",
                limit.as_millis()
            )));
        }
    };

    if !reading.point().is_valid() {
        return Err(AppError::InvalidInput(format!(
            "coordinates out of range: {}, {}",
            reading.latitude, reading.longitude
        )));
    }

    Ok(reading)
}
