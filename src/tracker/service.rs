use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::models::appointment::AppointmentSummary;
use crate::models::leg::{EndLocationType, LegKind, TravelLeg};
use crate::models::location::GeoReading;
use crate::models::travel::{
    AppointmentTravelState, LeavingDecision, ReimbursementSummary, TrackerWarning, TravelAction,
    TravelOutcome, TravelPhase, TravelSnapshot,
};
use crate::observability::metrics::Metrics;
use crate::ports::estimator::DistanceEstimator;
use crate::ports::geolocation::{GeolocationProvider, read_position};
use crate::ports::persistence::PersistenceAdapter;
use crate::ports::rate::{CachedMileageRate, MileageRateSource};
use crate::tracker::machine::{
    ensure_accepts_travel, ensure_after_arrival, ensure_not_before_start, next_phase,
};
use crate::tracker::mileage::{compute_mileage, round_cents, summarize};

const BASE_LOCATION_NAME: &str = "Base";

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub geolocation_timeout: Duration,
    pub next_appointment_lookahead_minutes: i64,
}

impl From<&Config> for TrackerSettings {
    fn from(config: &Config) -> Self {
        Self {
            geolocation_timeout: config.geolocation_timeout,
            next_appointment_lookahead_minutes: config.next_appointment_lookahead_minutes,
        }
    }
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Runs checkpoint actions against persisted travel state. Holds no per-appointment
/// state of its own: every action reloads the appointment and writes back with the
/// revision it read.
pub struct TravelTracker {
    store: Arc<dyn PersistenceAdapter>,
    estimator: Arc<dyn DistanceEstimator>,
    mileage_rate: CachedMileageRate,
    metrics: Metrics,
    settings: TrackerSettings,
}

impl TravelTracker {
    pub fn new(
        store: Arc<dyn PersistenceAdapter>,
        estimator: Arc<dyn DistanceEstimator>,
        rate_source: Arc<dyn MileageRateSource>,
        metrics: Metrics,
        settings: TrackerSettings,
    ) -> Self {
        Self {
            store,
            estimator,
            mileage_rate: CachedMileageRate::new(rate_source),
            metrics,
            settings,
        }
    }

    pub async fn travel_state(&self, appointment_id: Uuid) -> Result<TravelSnapshot, AppError> {
        let state = self.store.load_appointment_travel_state(appointment_id).await?;
        Ok(state.snapshot())
    }

    pub async fn start_drive(
        &self,
        appointment_id: Uuid,
        geo: &dyn GeolocationProvider,
    ) -> Result<TravelOutcome, AppError> {
        let started = Instant::now();
        let result = self.start_drive_inner(appointment_id, geo).await;
        self.record(TravelAction::StartDrive, started, &result);
        result
    }

    pub async fn arrive(
        &self,
        appointment_id: Uuid,
        geo: &dyn GeolocationProvider,
    ) -> Result<TravelOutcome, AppError> {
        let started = Instant::now();
        let result = self.arrive_inner(appointment_id, geo).await;
        self.record(TravelAction::Arrive, started, &result);
        result
    }

    pub async fn initiate_leaving(
        &self,
        appointment_id: Uuid,
    ) -> Result<LeavingDecision, AppError> {
        let started = Instant::now();
        let result = self.initiate_leaving_inner(appointment_id).await;
        self.record(TravelAction::InitiateLeaving, started, &result);
        result
    }

    pub async fn choose_next(
        &self,
        appointment_id: Uuid,
        next_appointment_id: Uuid,
        geo: &dyn GeolocationProvider,
    ) -> Result<TravelOutcome, AppError> {
        let started = Instant::now();
        let result = self
            .choose_next_inner(appointment_id, next_appointment_id, geo)
            .await;
        self.record(TravelAction::ChooseNext, started, &result);
        result
    }

    pub async fn choose_return(
        &self,
        appointment_id: Uuid,
        geo: &dyn GeolocationProvider,
    ) -> Result<TravelOutcome, AppError> {
        let started = Instant::now();
        let result = self.choose_return_inner(appointment_id, geo).await;
        self.record(TravelAction::ChooseReturn, started, &result);
        result
    }

    pub async fn complete_return(
        &self,
        leg_id: Uuid,
        geo: &dyn GeolocationProvider,
    ) -> Result<TravelOutcome, AppError> {
        let started = Instant::now();
        let result = self.complete_return_inner(leg_id, geo).await;
        self.record(TravelAction::CompleteReturn, started, &result);
        result
    }

    pub async fn confirm_toll(
        &self,
        leg_id: Uuid,
        actual_amount: f64,
    ) -> Result<TravelLeg, AppError> {
        let started = Instant::now();
        let result = self.confirm_toll_inner(leg_id, actual_amount).await;
        self.record(TravelAction::ConfirmToll, started, &result);
        result
    }

    pub async fn reimbursement(
        &self,
        appointment_id: Uuid,
    ) -> Result<ReimbursementSummary, AppError> {
        let state = self.store.load_appointment_travel_state(appointment_id).await?;
        let rate = self.mileage_rate.get().await?;
        Ok(summarize(&state, rate))
    }

    async fn start_drive_inner(
        &self,
        appointment_id: Uuid,
        geo: &dyn GeolocationProvider,
    ) -> Result<TravelOutcome, AppError> {
        let state = self.store.load_appointment_travel_state(appointment_id).await?;
        ensure_accepts_travel(&state.appointment)?;
        next_phase(state.phase(), TravelAction::StartDrive)?;

        let reading = self.read(geo, TravelAction::StartDrive).await?;

        let mut leg = TravelLeg::start(
            appointment_id,
            LegKind::Outbound,
            &reading,
            EndLocationType::Visit,
        );
        leg.end_location_name = Some(state.appointment.location.address.clone());

        let saved = self.store.save_leg(&leg, state.revision).await?;
        info!(
            appointment_id = %appointment_id,
            leg_id = %leg.leg_id,
            phase = saved.phase().as_str(),
            "drive started"
        );

        Ok(outcome(&saved, Vec::new()))
    }

    async fn arrive_inner(
        &self,
        appointment_id: Uuid,
        geo: &dyn GeolocationProvider,
    ) -> Result<TravelOutcome, AppError> {
        let state = self.store.load_appointment_travel_state(appointment_id).await?;
        next_phase(state.phase(), TravelAction::Arrive)?;

        let mut leg = state.outbound_leg.clone().ok_or_else(|| {
            AppError::InvalidTransition("no drive to the visit is in progress".to_string())
        })?;

        let reading = self.read(geo, TravelAction::Arrive).await?;
        ensure_not_before_start(&leg, &reading)?;

        leg.finish(&reading);
        let mut warnings = Vec::new();
        self.apply_mileage(&mut leg, &mut warnings).await;

        let saved = self.store.save_leg(&leg, state.revision).await?;
        info!(
            appointment_id = %appointment_id,
            leg_id = %leg.leg_id,
            mileage = ?leg.calculated_mileage,
            "arrived at visit"
        );

        if let Some(origin_id) = leg.origin_appointment_id {
            self.close_chained_leg(origin_id, &leg, &reading, &mut warnings)
                .await;
        }

        Ok(outcome(&saved, warnings))
    }

    async fn initiate_leaving_inner(
        &self,
        appointment_id: Uuid,
    ) -> Result<LeavingDecision, AppError> {
        let state = self.store.load_appointment_travel_state(appointment_id).await?;
        let phase = next_phase(state.phase(), TravelAction::InitiateLeaving)?;

        let next = self
            .store
            .find_next_appointment(
                state.appointment.staff_id,
                state.appointment.scheduled_start,
                self.settings.next_appointment_lookahead_minutes,
            )
            .await?;

        debug!(
            appointment_id = %appointment_id,
            next_appointment_id = ?next.as_ref().map(|appointment| appointment.id),
            "leaving decision requested"
        );

        Ok(LeavingDecision {
            appointment_id,
            phase,
            has_next: next.is_some(),
            next_appointment: next.as_ref().map(AppointmentSummary::from),
        })
    }

    /// Two steps: start the next appointment's outbound leg, then record the hand-off on
    /// the current appointment. Both writes carry the same key, so a retry after a failed
    /// second step skips the first.
    async fn choose_next_inner(
        &self,
        appointment_id: Uuid,
        next_appointment_id: Uuid,
        geo: &dyn GeolocationProvider,
    ) -> Result<TravelOutcome, AppError> {
        if appointment_id == next_appointment_id {
            return Err(AppError::InvalidTransition(
                "cannot chain an appointment to itself".to_string(),
            ));
        }

        let key = chain_key(appointment_id, next_appointment_id);
        let current = self.store.load_appointment_travel_state(appointment_id).await?;

        if current
            .return_leg
            .as_ref()
            .is_some_and(|leg| leg.idempotency_key.as_deref() == Some(key.as_str()))
        {
            debug!(appointment_id = %appointment_id, key = %key, "chain already recorded");
            let next = self
                .store
                .load_appointment_travel_state(next_appointment_id)
                .await?;
            return Ok(outcome(&next, Vec::new()));
        }

        next_phase(current.phase(), TravelAction::ChooseNext)?;

        let next = self
            .store
            .load_appointment_travel_state(next_appointment_id)
            .await?;
        if next.appointment.staff_id != current.appointment.staff_id {
            return Err(AppError::InvalidTransition(format!(
                "appointment {next_appointment_id} belongs to another staff member"
            )));
        }
        ensure_accepts_travel(&next.appointment)?;

        let scheduled_next = self
            .store
            .find_next_appointment(
                current.appointment.staff_id,
                current.appointment.scheduled_start,
                self.settings.next_appointment_lookahead_minutes,
            )
            .await?;
        if scheduled_next.map(|appointment| appointment.id) != Some(next_appointment_id) {
            return Err(AppError::InvalidTransition(format!(
                "appointment {next_appointment_id} is not the next scheduled appointment"
            )));
        }

        let replayed_leg = match &next.outbound_leg {
            Some(existing) if existing.idempotency_key.as_deref() == Some(key.as_str()) => {
                Some(existing.clone())
            }
            Some(_) => {
                return Err(AppError::InvalidTransition(format!(
                    "appointment {next_appointment_id} already has a drive in progress or done"
                )));
            }
            None => None,
        };

        let reading = self.read(geo, TravelAction::ChooseNext).await?;
        ensure_after_arrival(current.outbound_leg.as_ref(), &reading)?;

        let (next_state, next_leg) = match replayed_leg {
            Some(existing) => {
                info!(
                    appointment_id = %appointment_id,
                    next_appointment_id = %next_appointment_id,
                    leg_id = %existing.leg_id,
                    "resuming chain; next drive already started"
                );
                (next, existing)
            }
            None => {
                let mut leg = TravelLeg::start(
                    next_appointment_id,
                    LegKind::Outbound,
                    &reading,
                    EndLocationType::Visit,
                );
                leg.end_location_name = Some(next.appointment.location.address.clone());
                leg.origin_appointment_id = Some(appointment_id);
                leg.idempotency_key = Some(key.clone());

                let saved = self.store.save_leg(&leg, next.revision).await?;
                info!(
                    appointment_id = %next_appointment_id,
                    leg_id = %leg.leg_id,
                    origin_appointment_id = %appointment_id,
                    "drive to next appointment started"
                );
                (saved, leg)
            }
        };

        let mut handoff = TravelLeg::start(
            appointment_id,
            LegKind::Return,
            &reading,
            EndLocationType::NextAppointment,
        );
        handoff.end_location_name = Some(next_state.appointment.location.address.clone());
        handoff.chained_leg_id = Some(next_leg.leg_id);
        handoff.idempotency_key = Some(key);
        // The next visit may have been reached before this step got retried.
        if let (Some(latitude), Some(longitude), Some(end_timestamp)) = (
            next_leg.end_latitude,
            next_leg.end_longitude,
            next_leg.end_timestamp,
        ) {
            let arrived = GeoReading {
                latitude,
                longitude,
                timestamp: end_timestamp.max(reading.timestamp),
            };
            handoff.finish(&arrived);
        }

        self.store.save_leg(&handoff, current.revision).await?;
        info!(
            appointment_id = %appointment_id,
            leg_id = %handoff.leg_id,
            chained_leg_id = %next_leg.leg_id,
            "left visit for next appointment"
        );

        Ok(outcome(&next_state, Vec::new()))
    }

    async fn choose_return_inner(
        &self,
        appointment_id: Uuid,
        geo: &dyn GeolocationProvider,
    ) -> Result<TravelOutcome, AppError> {
        let state = self.store.load_appointment_travel_state(appointment_id).await?;
        next_phase(state.phase(), TravelAction::ChooseReturn)?;

        let reading = self.read(geo, TravelAction::ChooseReturn).await?;
        ensure_after_arrival(state.outbound_leg.as_ref(), &reading)?;

        let mut leg = TravelLeg::start(
            appointment_id,
            LegKind::Return,
            &reading,
            EndLocationType::Base,
        );
        leg.is_final_leg = true;
        leg.end_location_name = Some(BASE_LOCATION_NAME.to_string());

        let saved = self.store.save_leg(&leg, state.revision).await?;
        info!(appointment_id = %appointment_id, leg_id = %leg.leg_id, "returning to base");

        Ok(outcome(&saved, Vec::new()))
    }

    async fn complete_return_inner(
        &self,
        leg_id: Uuid,
        geo: &dyn GeolocationProvider,
    ) -> Result<TravelOutcome, AppError> {
        let found = self.store.find_leg(leg_id).await?;
        let state = self
            .store
            .load_appointment_travel_state(found.appointment_id)
            .await?;

        let mut leg = state
            .return_leg
            .clone()
            .filter(|leg| leg.leg_id == leg_id)
            .ok_or_else(|| {
                AppError::InvalidTransition(format!("leg {leg_id} is not a return leg"))
            })?;
        if !leg.is_final_leg {
            return Err(AppError::InvalidTransition(format!(
                "leg {leg_id} continues to the next appointment and ends on arrival there"
            )));
        }
        next_phase(state.phase(), TravelAction::CompleteReturn)?;

        let reading = self.read(geo, TravelAction::CompleteReturn).await?;
        ensure_not_before_start(&leg, &reading)?;

        leg.finish(&reading);
        let mut warnings = Vec::new();
        self.apply_mileage(&mut leg, &mut warnings).await;

        let saved = self.store.save_leg(&leg, state.revision).await?;
        info!(
            appointment_id = %leg.appointment_id,
            leg_id = %leg_id,
            mileage = ?leg.calculated_mileage,
            "returned to base"
        );

        Ok(outcome(&saved, warnings))
    }

    async fn confirm_toll_inner(
        &self,
        leg_id: Uuid,
        actual_amount: f64,
    ) -> Result<TravelLeg, AppError> {
        if !actual_amount.is_finite() || actual_amount < 0.0 {
            return Err(AppError::InvalidInput(format!(
                "toll amount must be a non-negative number, got {actual_amount}"
            )));
        }

        let found = self.store.find_leg(leg_id).await?;
        let state = self
            .store
            .load_appointment_travel_state(found.appointment_id)
            .await?;
        let mut leg = state
            .legs()
            .find(|leg| leg.leg_id == leg_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("leg {leg_id} not found")))?;

        leg.actual_toll_cost = Some(round_cents(actual_amount));
        leg.toll_confirmed = true;

        self.store.save_leg(&leg, state.revision).await?;
        info!(leg_id = %leg_id, amount = actual_amount, "toll confirmed");

        Ok(leg)
    }

    async fn read(
        &self,
        geo: &dyn GeolocationProvider,
        action: TravelAction,
    ) -> Result<GeoReading, AppError> {
        read_position(geo, action, self.settings.geolocation_timeout)
            .await
            .inspect_err(|err| warn!(action = action.as_str(), error = %err, "no position"))
    }

    /// Fills in mileage and toll estimate on a finished leg. An estimator failure leaves
    /// mileage empty and adds a warning instead of failing the checkpoint.
    async fn apply_mileage(&self, leg: &mut TravelLeg, warnings: &mut Vec<TrackerWarning>) {
        let Some(end) = leg.end_point() else {
            return;
        };

        match compute_mileage(self.estimator.as_ref(), leg.start_point(), end).await {
            Ok(estimate) => {
                leg.calculated_mileage = Some(estimate.mileage_miles);
                leg.estimated_toll_cost = estimate.estimated_toll_cost;
            }
            Err(err) => {
                self.metrics.estimator_failures_total.inc();
                warn!(leg_id = %leg.leg_id, error = %err, "mileage not computed");
                leg.calculated_mileage = None;
                warnings.push(TrackerWarning::EstimatorUnavailable {
                    leg_id: leg.leg_id,
                    reason: err.to_string(),
                });
            }
        }
    }

    /// Ends the hand-off leg on the appointment the staff member came from. Failing here
    /// does not undo the arrival.
    async fn close_chained_leg(
        &self,
        origin_id: Uuid,
        arrived_leg: &TravelLeg,
        reading: &GeoReading,
        warnings: &mut Vec<TrackerWarning>,
    ) {
        let result: Result<(), AppError> = async {
            let origin = self.store.load_appointment_travel_state(origin_id).await?;
            let Some(mut handoff) = origin.return_leg.clone().filter(|leg| {
                leg.chained_leg_id == Some(arrived_leg.leg_id) && leg.is_in_progress()
            }) else {
                debug!(origin_appointment_id = %origin_id, "no open hand-off leg to close");
                return Ok(());
            };

            handoff.finish(reading);
            self.store.save_leg(&handoff, origin.revision).await?;
            debug!(
                origin_appointment_id = %origin_id,
                leg_id = %handoff.leg_id,
                "hand-off leg closed"
            );
            Ok(())
        }
        .await;

        if let Err(err) = result {
            warn!(
                origin_appointment_id = %origin_id,
                error = %err,
                "failed to close hand-off leg"
            );
            warnings.push(TrackerWarning::ChainedLegNotClosed {
                leg_id: arrived_leg.leg_id,
                reason: err.to_string(),
            });
        }
    }

    fn record<T>(&self, action: TravelAction, started: Instant, result: &Result<T, AppError>) {
        let outcome = match result {
            Ok(_) => "success",
            Err(err) => err.kind(),
        };

        self.metrics
            .checkpoint_transitions_total
            .with_label_values(&[action.as_str(), outcome])
            .inc();
        self.metrics
            .checkpoint_latency_seconds
            .with_label_values(&[action.as_str()])
            .observe(started.elapsed().as_secs_f64());
    }
}

fn chain_key(from: Uuid, to: Uuid) -> String {
    format!("chain:{from}:{to}")
}

fn outcome(state: &AppointmentTravelState, warnings: Vec<TrackerWarning>) -> TravelOutcome {
    debug_assert!(state.in_progress_legs() <= 1);
    debug_assert!(state.phase() != TravelPhase::LeavingDecision);

    TravelOutcome {
        state: state.snapshot(),
        warnings,
    }
}
