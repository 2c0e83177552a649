use crate::error::AppError;
use crate::models::appointment::Appointment;
use crate::models::leg::TravelLeg;
use crate::models::location::GeoReading;
use crate::models::travel::{TravelAction, TravelPhase};

/// Phase reached by applying `action` in `current`, or `InvalidTransition`.
pub fn next_phase(current: TravelPhase, action: TravelAction) -> Result<TravelPhase, AppError> {
    use TravelPhase::*;

    let next = match (current, action) {
        (NotStarted, TravelAction::StartDrive) => DrivingToVisit,
        (DrivingToVisit, TravelAction::Arrive) => AtVisit,
        (AtVisit | LeavingDecision, TravelAction::InitiateLeaving) => LeavingDecision,
        (AtVisit | LeavingDecision, TravelAction::ChooseNext) => DrivingToNext,
        (AtVisit | LeavingDecision, TravelAction::ChooseReturn) => ReturningToBase,
        (ReturningToBase, TravelAction::CompleteReturn) => Complete,
        (current, action) => {
            return Err(AppError::InvalidTransition(rejection_message(current, action)));
        }
    };

    Ok(next)
}

fn rejection_message(current: TravelPhase, action: TravelAction) -> String {
    use TravelPhase::*;

    let reason = match (current, action) {
        (_, TravelAction::StartDrive) => "drive already started",
        (NotStarted, TravelAction::Arrive) => "no drive in progress; start the drive first",
        (_, TravelAction::Arrive) => "no drive to the visit is in progress",
        (
            NotStarted | DrivingToVisit,
            TravelAction::InitiateLeaving | TravelAction::ChooseNext | TravelAction::ChooseReturn,
        ) => "must arrive at the visit before leaving",
        (
            _,
            TravelAction::InitiateLeaving | TravelAction::ChooseNext | TravelAction::ChooseReturn,
        ) => "already left this visit",
        (_, TravelAction::CompleteReturn) => "no return drive in progress",
        (_, TravelAction::ConfirmToll) => "tolls are confirmed per leg, not per phase",
    };

    format!("{reason} (phase {})", current.as_str())
}

pub fn ensure_accepts_travel(appointment: &Appointment) -> Result<(), AppError> {
    if appointment.status.accepts_travel() {
        Ok(())
    } else {
        Err(AppError::InvalidTransition(format!(
            "appointment {} is {:?}",
            appointment.id, appointment.status
        )))
    }
}

/// A checkpoint may not be earlier than the start of the leg it closes.
pub fn ensure_not_before_start(leg: &TravelLeg, reading: &GeoReading) -> Result<(), AppError> {
    if reading.timestamp < leg.start_timestamp {
        return Err(AppError::InvalidInput(format!(
            "checkpoint at {} precedes leg start at {}",
            reading.timestamp, leg.start_timestamp
        )));
    }
    Ok(())
}

/// Leaving can't be stamped before the arrival it follows.
pub fn ensure_after_arrival(
    outbound: Option<&TravelLeg>,
    reading: &GeoReading,
) -> Result<(), AppError> {
    match outbound.and_then(|leg| leg.end_timestamp) {
        Some(arrived_at) if reading.timestamp < arrived_at => Err(AppError::InvalidInput(format!(
            "leaving at {} precedes arrival at {arrived_at}",
            reading.timestamp
        ))),
        _ => Ok(()),
    }
}
