use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::{GeoPoint, GeoReading};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LegKind {
    Outbound,
    Return,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EndLocationType {
    Visit,
    NextAppointment,
    Base,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TravelLeg {
    pub leg_id: Uuid,
    pub appointment_id: Uuid,
    pub leg_kind: LegKind,
    pub start_latitude: f64,
    pub start_longitude: f64,
    pub start_timestamp: DateTime<Utc>,
    pub end_latitude: Option<f64>,
    pub end_longitude: Option<f64>,
    pub end_timestamp: Option<DateTime<Utc>>,
    pub calculated_mileage: Option<f64>,
    pub estimated_toll_cost: Option<f64>,
    pub actual_toll_cost: Option<f64>,
    pub toll_confirmed: bool,
    pub is_final_leg: bool,
    pub end_location_name: Option<String>,
    pub end_location_type: EndLocationType,
    /// Appointment the staff member drove from when this outbound leg was chained.
    pub origin_appointment_id: Option<Uuid>,
    /// Outbound leg on the next appointment that a chained return leg hands off to.
    pub chained_leg_id: Option<Uuid>,
    pub idempotency_key: Option<String>,
}

impl TravelLeg {
    pub fn start(
        appointment_id: Uuid,
        leg_kind: LegKind,
        reading: &GeoReading,
        end_location_type: EndLocationType,
    ) -> Self {
        Self {
            leg_id: Uuid::new_v4(),
            appointment_id,
            leg_kind,
            start_latitude: reading.latitude,
            start_longitude: reading.longitude,
            start_timestamp: reading.timestamp,
            end_latitude: None,
            end_longitude: None,
            end_timestamp: None,
            calculated_mileage: None,
            estimated_toll_cost: None,
            actual_toll_cost: None,
            toll_confirmed: false,
            is_final_leg: false,
            end_location_name: None,
            end_location_type,
            origin_appointment_id: None,
            chained_leg_id: None,
            idempotency_key: None,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.end_timestamp.is_none()
    }

    pub fn is_complete(&self) -> bool {
        self.end_timestamp.is_some()
    }

    pub fn start_point(&self) -> GeoPoint {
        GeoPoint::new(self.start_latitude, self.start_longitude)
    }

    pub fn end_point(&self) -> Option<GeoPoint> {
        match (self.end_latitude, self.end_longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint::new(latitude, longitude)),
            _ => None,
        }
    }

    /// Sets the end checkpoint. Mileage is left for the caller to fill in.
    pub fn finish(&mut self, reading: &GeoReading) {
        self.end_latitude = Some(reading.latitude);
        self.end_longitude = Some(reading.longitude);
        self.end_timestamp = Some(reading.timestamp);
    }

    pub fn duration_minutes(&self) -> Option<i64> {
        self.end_timestamp
            .map(|end| (end - self.start_timestamp).num_minutes())
    }

    /// Toll that counts towards reimbursement: confirmed actual, else the estimate, else zero.
    pub fn toll_cost(&self) -> f64 {
        if self.toll_confirmed {
            if let Some(actual) = self.actual_toll_cost {
                return actual;
            }
        }
        self.estimated_toll_cost.unwrap_or(0.0)
    }
}
