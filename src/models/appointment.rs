use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    Rescheduled,
}

impl AppointmentStatus {
    /// Whether staff can still travel to this appointment.
    pub fn accepts_travel(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::InProgress)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisitLocation {
    pub address: String,
    #[serde(default)]
    pub coordinates: Option<GeoPoint>,
}

/// Mirrors the leg records for quick reads. Recomputed by the store on every leg write.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TravelFlags {
    pub has_in_progress_leg: bool,
    pub has_completed_leg: bool,
    pub has_in_progress_return_leg: bool,
    pub return_leg_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub title: String,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub staff_id: Uuid,
    pub location: VisitLocation,
    pub priority: Priority,
    #[serde(default)]
    pub travel: TravelFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentSummary {
    pub id: Uuid,
    pub title: String,
    pub scheduled_start: DateTime<Utc>,
    pub address: String,
    pub priority: Priority,
}

impl From<&Appointment> for AppointmentSummary {
    fn from(appointment: &Appointment) -> Self {
        Self {
            id: appointment.id,
            title: appointment.title.clone(),
            scheduled_start: appointment.scheduled_start,
            address: appointment.location.address.clone(),
            priority: appointment.priority,
        }
    }
}
