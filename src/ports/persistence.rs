use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::appointment::Appointment;
use crate::models::leg::TravelLeg;
use crate::models::travel::AppointmentTravelState;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("storage backend failed: {0}")]
    Backend(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => AppError::NotFound(msg),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Backend(msg) => AppError::Internal(msg),
        }
    }
}

/// Source of truth for travel legs. The tracker keeps no state between calls.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    async fn load_appointment_travel_state(
        &self,
        appointment_id: Uuid,
    ) -> Result<AppointmentTravelState, StoreError>;

    /// Writes `leg` onto its appointment if the appointment is still at `expected_revision`.
    /// Travel flags are recomputed and the revision bumped in the same step.
    async fn save_leg(
        &self,
        leg: &TravelLeg,
        expected_revision: u64,
    ) -> Result<AppointmentTravelState, StoreError>;

    async fn find_leg(&self, leg_id: Uuid) -> Result<TravelLeg, StoreError>;

    /// Earliest open appointment for `staff_id` starting after `after` and at most
    /// `within_minutes` later.
    async fn find_next_appointment(
        &self,
        staff_id: Uuid,
        after: DateTime<Utc>,
        within_minutes: i64,
    ) -> Result<Option<Appointment>, StoreError>;
}
