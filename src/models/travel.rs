use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::appointment::{Appointment, AppointmentSummary, TravelFlags};
use crate::models::leg::TravelLeg;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TravelPhase {
    NotStarted,
    DrivingToVisit,
    AtVisit,
    LeavingDecision,
    DrivingToNext,
    ReturningToBase,
    Complete,
}

impl TravelPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelPhase::NotStarted => "not_started",
            TravelPhase::DrivingToVisit => "driving_to_visit",
            TravelPhase::AtVisit => "at_visit",
            TravelPhase::LeavingDecision => "leaving_decision",
            TravelPhase::DrivingToNext => "driving_to_next",
            TravelPhase::ReturningToBase => "returning_to_base",
            TravelPhase::Complete => "complete",
        }
    }
}

/// Operator actions that move an appointment through its travel phases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TravelAction {
    StartDrive,
    Arrive,
    InitiateLeaving,
    ChooseNext,
    ChooseReturn,
    CompleteReturn,
    ConfirmToll,
}

impl TravelAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelAction::StartDrive => "start_drive",
            TravelAction::Arrive => "arrive",
            TravelAction::InitiateLeaving => "initiate_leaving",
            TravelAction::ChooseNext => "choose_next",
            TravelAction::ChooseReturn => "choose_return",
            TravelAction::CompleteReturn => "complete_return",
            TravelAction::ConfirmToll => "confirm_toll",
        }
    }
}

/// Everything the tracker knows about one appointment, as read from the store.
#[derive(Debug, Clone)]
pub struct AppointmentTravelState {
    pub appointment: Appointment,
    pub outbound_leg: Option<TravelLeg>,
    pub return_leg: Option<TravelLeg>,
    pub revision: u64,
}

impl AppointmentTravelState {
    /// Phase derived from the persisted legs. `LeavingDecision` is never stored,
    /// so an appointment waiting on that choice reads as `AtVisit`.
    pub fn phase(&self) -> TravelPhase {
        match (&self.outbound_leg, &self.return_leg) {
            (None, _) => TravelPhase::NotStarted,
            (Some(outbound), _) if outbound.is_in_progress() => TravelPhase::DrivingToVisit,
            (Some(_), None) => TravelPhase::AtVisit,
            (Some(_), Some(ret)) if ret.is_complete() => TravelPhase::Complete,
            (Some(_), Some(ret)) if ret.is_final_leg => TravelPhase::ReturningToBase,
            (Some(_), Some(_)) => TravelPhase::DrivingToNext,
        }
    }

    pub fn legs(&self) -> impl Iterator<Item = &TravelLeg> {
        self.outbound_leg.iter().chain(self.return_leg.iter())
    }

    pub fn in_progress_legs(&self) -> usize {
        self.legs().filter(|leg| leg.is_in_progress()).count()
    }

    pub fn snapshot(&self) -> TravelSnapshot {
        TravelSnapshot {
            appointment_id: self.appointment.id,
            phase: self.phase(),
            flags: self.appointment.travel.clone(),
            revision: self.revision,
            outbound_leg: self.outbound_leg.clone().map(LegView::from),
            return_leg: self.return_leg.clone().map(LegView::from),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegView {
    #[serde(flatten)]
    pub leg: TravelLeg,
    pub duration_minutes: Option<i64>,
}

impl From<TravelLeg> for LegView {
    fn from(leg: TravelLeg) -> Self {
        let duration_minutes = leg.duration_minutes();
        Self {
            leg,
            duration_minutes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelSnapshot {
    pub appointment_id: Uuid,
    pub phase: TravelPhase,
    pub flags: TravelFlags,
    pub revision: u64,
    pub outbound_leg: Option<LegView>,
    pub return_leg: Option<LegView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackerWarning {
    /// Mileage could not be estimated; the leg was saved without it.
    EstimatorUnavailable { leg_id: Uuid, reason: String },
    /// Arrival was saved but the hand-off leg on the appointment the drive came from
    /// is still open. `leg_id` is the arrived outbound leg.
    ChainedLegNotClosed { leg_id: Uuid, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelOutcome {
    pub state: TravelSnapshot,
    pub warnings: Vec<TrackerWarning>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeavingDecision {
    pub appointment_id: Uuid,
    pub phase: TravelPhase,
    pub has_next: bool,
    pub next_appointment: Option<AppointmentSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReimbursementSummary {
    pub appointment_id: Uuid,
    pub outbound_miles: f64,
    pub return_miles: f64,
    pub toll_cost: f64,
    pub rate_per_mile: f64,
    pub total: f64,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use super::{AppointmentTravelState, TravelPhase};
    use crate::models::appointment::{
        Appointment, AppointmentStatus, Priority, TravelFlags, VisitLocation,
    };
    use crate::models::leg::{EndLocationType, LegKind, TravelLeg};
    use crate::models::location::GeoReading;

    fn state() -> AppointmentTravelState {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        AppointmentTravelState {
            appointment: Appointment {
                id: Uuid::from_u128(1),
                title: "Home visit".to_string(),
                scheduled_start: start,
                scheduled_end: start + Duration::hours(1),
                status: AppointmentStatus::Scheduled,
                staff_id: Uuid::from_u128(99),
                location: VisitLocation {
                    address: "12 Elm St".to_string(),
                    coordinates: None,
                },
                priority: Priority::Normal,
                travel: TravelFlags::default(),
            },
            outbound_leg: None,
            return_leg: None,
            revision: 0,
        }
    }

    fn reading() -> GeoReading {
        GeoReading {
            latitude: 40.0,
            longitude: -75.0,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap(),
        }
    }

    fn leg(kind: LegKind) -> TravelLeg {
        TravelLeg::start(Uuid::from_u128(1), kind, &reading(), EndLocationType::Visit)
    }

    #[test]
    fn phase_follows_legs_through_return_to_base() {
        let mut state = state();
        assert_eq!(state.phase(), TravelPhase::NotStarted);

        state.outbound_leg = Some(leg(LegKind::Outbound));
        assert_eq!(state.phase(), TravelPhase::DrivingToVisit);

        if let Some(outbound) = state.outbound_leg.as_mut() {
            outbound.finish(&reading());
        }
        assert_eq!(state.phase(), TravelPhase::AtVisit);

        let mut ret = leg(LegKind::Return);
        ret.is_final_leg = true;
        state.return_leg = Some(ret);
        assert_eq!(state.phase(), TravelPhase::ReturningToBase);
        assert_eq!(state.in_progress_legs(), 1);

        if let Some(ret) = state.return_leg.as_mut() {
            ret.finish(&reading());
        }
        assert_eq!(state.phase(), TravelPhase::Complete);
        assert_eq!(state.in_progress_legs(), 0);
    }

    #[test]
    fn non_final_return_leg_means_driving_to_next() {
        let mut state = state();
        let mut outbound = leg(LegKind::Outbound);
        outbound.finish(&reading());
        state.outbound_leg = Some(outbound);
        state.return_leg = Some(leg(LegKind::Return));

        assert_eq!(state.phase(), TravelPhase::DrivingToNext);
    }
}
