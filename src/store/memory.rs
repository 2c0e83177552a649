use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::appointment::{Appointment, TravelFlags};
use crate::models::leg::{LegKind, TravelLeg};
use crate::models::travel::AppointmentTravelState;
use crate::ports::persistence::{PersistenceAdapter, StoreError};

struct AppointmentRecord {
    appointment: Appointment,
    outbound_leg: Option<TravelLeg>,
    return_leg: Option<TravelLeg>,
    revision: u64,
}

impl AppointmentRecord {
    fn refresh_flags(&mut self) {
        let legs = self.outbound_leg.iter().chain(self.return_leg.iter());
        let mut flags = TravelFlags::default();
        for leg in legs {
            if leg.is_in_progress() {
                flags.has_in_progress_leg = true;
                if leg.leg_kind == LegKind::Return {
                    flags.has_in_progress_return_leg = true;
                }
            } else {
                flags.has_completed_leg = true;
            }
        }
        flags.return_leg_id = self.return_leg.as_ref().map(|leg| leg.leg_id);
        self.appointment.travel = flags;
    }

    fn to_state(&self) -> AppointmentTravelState {
        AppointmentTravelState {
            appointment: self.appointment.clone(),
            outbound_leg: self.outbound_leg.clone(),
            return_leg: self.return_leg.clone(),
            revision: self.revision,
        }
    }
}

/// Process-local persistence. Each appointment's revision check and write happen
/// under the same shard lock.
#[derive(Default)]
pub struct InMemoryStore {
    appointments: DashMap<Uuid, AppointmentRecord>,
    leg_index: DashMap<Uuid, Uuid>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces an appointment from the scheduling feed, keeping any legs
    /// already recorded for it.
    pub fn upsert_appointment(&self, appointment: Appointment) {
        match self.appointments.entry(appointment.id) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                record.appointment = appointment;
                record.revision += 1;
                record.refresh_flags();
            }
            Entry::Vacant(vacant) => {
                let mut record = AppointmentRecord {
                    appointment,
                    outbound_leg: None,
                    return_leg: None,
                    revision: 0,
                };
                record.refresh_flags();
                vacant.insert(record);
            }
        }
    }

    pub fn load_seed_file(&self, path: &Path) -> Result<usize, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AppError::Internal(format!("failed to read {}: {err}", path.display()))
        })?;
        let appointments: Vec<Appointment> = serde_json::from_str(&raw).map_err(|err| {
            AppError::Internal(format!("invalid appointments in {}: {err}", path.display()))
        })?;

        let count = appointments.len();
        for appointment in appointments {
            self.upsert_appointment(appointment);
        }

        info!(path = %path.display(), count, "appointments seeded");
        Ok(count)
    }

    pub fn appointment_count(&self) -> usize {
        self.appointments.len()
    }

    pub fn leg_count(&self) -> usize {
        self.leg_index.len()
    }

    pub fn legs_in_progress(&self) -> usize {
        self.appointments
            .iter()
            .map(|entry| {
                let record = entry.value();
                record
                    .outbound_leg
                    .iter()
                    .chain(record.return_leg.iter())
                    .filter(|leg| leg.is_in_progress())
                    .count()
            })
            .sum()
    }
}

#[async_trait]
impl PersistenceAdapter for InMemoryStore {
    async fn load_appointment_travel_state(
        &self,
        appointment_id: Uuid,
    ) -> Result<AppointmentTravelState, StoreError> {
        self.appointments
            .get(&appointment_id)
            .map(|record| record.to_state())
            .ok_or_else(|| StoreError::NotFound(format!("appointment {appointment_id} not found")))
    }

    async fn save_leg(
        &self,
        leg: &TravelLeg,
        expected_revision: u64,
    ) -> Result<AppointmentTravelState, StoreError> {
        let mut record = self.appointments.get_mut(&leg.appointment_id).ok_or_else(|| {
            StoreError::NotFound(format!("appointment {} not found", leg.appointment_id))
        })?;

        if record.revision != expected_revision {
            return Err(StoreError::Conflict(format!(
                "appointment {} changed since it was read (revision {} != {})",
                leg.appointment_id, record.revision, expected_revision
            )));
        }

        {
            let slot = match leg.leg_kind {
                LegKind::Outbound => &mut record.outbound_leg,
                LegKind::Return => &mut record.return_leg,
            };
            if let Some(existing) = slot.as_ref() {
                if existing.leg_id != leg.leg_id {
                    return Err(StoreError::Conflict(format!(
                        "appointment {} already has a {:?} leg",
                        leg.appointment_id, leg.leg_kind
                    )));
                }
            }
            *slot = Some(leg.clone());
        }

        record.revision += 1;
        record.refresh_flags();
        let state = record.to_state();
        drop(record);

        self.leg_index.insert(leg.leg_id, leg.appointment_id);
        Ok(state)
    }

    async fn find_leg(&self, leg_id: Uuid) -> Result<TravelLeg, StoreError> {
        let appointment_id = self
            .leg_index
            .get(&leg_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| StoreError::NotFound(format!("leg {leg_id} not found")))?;

        let record = self.appointments.get(&appointment_id).ok_or_else(|| {
            StoreError::NotFound(format!("appointment {appointment_id} not found"))
        })?;

        record
            .outbound_leg
            .iter()
            .chain(record.return_leg.iter())
            .find(|leg| leg.leg_id == leg_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("leg {leg_id} not found")))
    }

    async fn find_next_appointment(
        &self,
        staff_id: Uuid,
        after: DateTime<Utc>,
        within_minutes: i64,
    ) -> Result<Option<Appointment>, StoreError> {
        let until = Duration::try_minutes(within_minutes)
            .and_then(|window| after.checked_add_signed(window))
            .ok_or_else(|| {
                StoreError::Backend(format!(
                    "lookahead of {within_minutes} minutes is out of range"
                ))
            })?;

        let next = self
            .appointments
            .iter()
            .filter_map(|entry| {
                let appointment = &entry.value().appointment;
                let in_window =
                    appointment.scheduled_start > after && appointment.scheduled_start <= until;

                if appointment.staff_id == staff_id
                    && in_window
                    && appointment.status.accepts_travel()
                {
                    Some(appointment.clone())
                } else {
                    None
                }
            })
            .min_by_key(|appointment| appointment.scheduled_start);

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use super::InMemoryStore;
    use crate::models::appointment::{Appointment, AppointmentStatus, Priority, VisitLocation};
    use crate::models::leg::{EndLocationType, LegKind, TravelLeg};
    use crate::models::location::GeoReading;
    use crate::ports::persistence::{PersistenceAdapter, StoreError};

    fn appointment(seed: u128, staff: u128, hour: u32, status: AppointmentStatus) -> Appointment {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap();
        Appointment {
            id: Uuid::from_u128(seed),
            title: format!("visit {seed}"),
            scheduled_start: start,
            scheduled_end: start + Duration::hours(1),
            status,
            staff_id: Uuid::from_u128(staff),
            location: VisitLocation {
                address: format!("{seed} Main St"),
                coordinates: None,
            },
            priority: Priority::Normal,
            travel: Default::default(),
        }
    }

    fn outbound(appointment_id: u128) -> TravelLeg {
        let reading = GeoReading {
            latitude: 41.88,
            longitude: -87.63,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 2, 8, 40, 0).unwrap(),
        };
        TravelLeg::start(
            Uuid::from_u128(appointment_id),
            LegKind::Outbound,
            &reading,
            EndLocationType::Visit,
        )
    }

    #[tokio::test]
    async fn save_leg_recomputes_flags_and_bumps_revision() {
        let store = InMemoryStore::new();
        store.upsert_appointment(appointment(1, 9, 9, AppointmentStatus::Scheduled));

        let leg = outbound(1);
        let state = store.save_leg(&leg, 0).await.unwrap();

        assert_eq!(state.revision, 1);
        assert!(state.appointment.travel.has_in_progress_leg);
        assert!(!state.appointment.travel.has_completed_leg);
        assert!(state.appointment.travel.return_leg_id.is_none());
        assert_eq!(store.legs_in_progress(), 1);
        assert_eq!(store.find_leg(leg.leg_id).await.unwrap(), leg);
    }

    #[tokio::test]
    async fn stale_revision_is_a_conflict() {
        let store = InMemoryStore::new();
        store.upsert_appointment(appointment(1, 9, 9, AppointmentStatus::Scheduled));

        let mut leg = outbound(1);
        store.save_leg(&leg, 0).await.unwrap();

        leg.calculated_mileage = Some(3.0);
        let result = store.save_leg(&leg, 0).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn second_outbound_leg_is_rejected() {
        let store = InMemoryStore::new();
        store.upsert_appointment(appointment(1, 9, 9, AppointmentStatus::Scheduled));

        store.save_leg(&outbound(1), 0).await.unwrap();
        let result = store.save_leg(&outbound(1), 1).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn next_appointment_is_earliest_open_one_in_window() {
        let store = InMemoryStore::new();
        store.upsert_appointment(appointment(1, 9, 9, AppointmentStatus::Scheduled));
        store.upsert_appointment(appointment(2, 9, 13, AppointmentStatus::Scheduled));
        store.upsert_appointment(appointment(3, 9, 11, AppointmentStatus::Scheduled));
        store.upsert_appointment(appointment(4, 9, 10, AppointmentStatus::Cancelled));
        store.upsert_appointment(appointment(5, 8, 10, AppointmentStatus::Scheduled));

        let after = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let next = store
            .find_next_appointment(Uuid::from_u128(9), after, 480)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.id, Uuid::from_u128(3));

        let none = store
            .find_next_appointment(Uuid::from_u128(9), after, 60)
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn oversized_lookahead_is_an_error() {
        let store = InMemoryStore::new();
        store.upsert_appointment(appointment(1, 9, 9, AppointmentStatus::Scheduled));

        let after = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let result = store
            .find_next_appointment(Uuid::from_u128(9), after, i64::MAX)
            .await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
    }

    #[tokio::test]
    async fn upsert_keeps_recorded_legs() {
        let store = InMemoryStore::new();
        store.upsert_appointment(appointment(1, 9, 9, AppointmentStatus::Scheduled));
        let leg = outbound(1);
        store.save_leg(&leg, 0).await.unwrap();

        let mut rescheduled = appointment(1, 9, 10, AppointmentStatus::InProgress);
        rescheduled.title = "moved visit".to_string();
        store.upsert_appointment(rescheduled);

        let state = store
            .load_appointment_travel_state(Uuid::from_u128(1))
            .await
            .unwrap();
        assert_eq!(state.revision, 2);
        assert_eq!(state.appointment.title, "moved visit");
        assert_eq!(state.outbound_leg, Some(leg));
        assert!(state.appointment.travel.has_in_progress_leg);
    }

    #[test]
    fn concurrent_upserts_of_new_appointment_all_land() {
        let store = InMemoryStore::new();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    store.upsert_appointment(appointment(1, 9, 9, AppointmentStatus::Scheduled));
                });
            }
        });

        assert_eq!(store.appointment_count(), 1);
        let record = store.appointments.get(&Uuid::from_u128(1)).unwrap();
        assert_eq!(record.revision, 7);
    }

    #[tokio::test]
    async fn seed_file_registers_appointments() {
        let appointments = vec![
            appointment(1, 9, 9, AppointmentStatus::Scheduled),
            appointment(2, 9, 11, AppointmentStatus::Scheduled),
        ];
        let path = std::env::temp_dir().join(format!("seed-{}.json", Uuid::new_v4()));
        std::fs::write(&path, serde_json::to_string(&appointments).unwrap()).unwrap();

        let store = InMemoryStore::new();
        let count = store.load_seed_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(count, 2);
        assert_eq!(store.appointment_count(), 2);
        let state = store
            .load_appointment_travel_state(Uuid::from_u128(2))
            .await
            .unwrap();
        assert_eq!(state.revision, 0);
        assert!(state.outbound_leg.is_none());
    }

    #[tokio::test]
    async fn missing_appointment_is_not_found() {
        let store = InMemoryStore::new();
        let result = store.load_appointment_travel_state(Uuid::from_u128(1)).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
