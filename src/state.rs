use std::sync::Arc;

use crate::config::Config;
use crate::observability::metrics::Metrics;
use crate::ports::estimator::{DistanceEstimator, HaversineEstimator};
use crate::ports::rate::{ConfiguredMileageRate, MileageRateSource};
use crate::store::InMemoryStore;
use crate::tracker::{TrackerSettings, TravelTracker};

pub struct AppState {
    pub store: Arc<InMemoryStore>,
    pub tracker: TravelTracker,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: &Config, store: Arc<InMemoryStore>) -> Self {
        Self::with_collaborators(
            store,
            Arc::new(HaversineEstimator::new(config.road_distance_factor)),
            Arc::new(ConfiguredMileageRate(config.mileage_rate_per_mile)),
            TrackerSettings::from(config),
        )
    }

    pub fn with_collaborators(
        store: Arc<InMemoryStore>,
        estimator: Arc<dyn DistanceEstimator>,
        rate_source: Arc<dyn MileageRateSource>,
        settings: TrackerSettings,
    ) -> Self {
        let metrics = Metrics::new();
        let tracker = TravelTracker::new(
            store.clone(),
            estimator,
            rate_source,
            metrics.clone(),
            settings,
        );

        Self {
            store,
            tracker,
            metrics,
        }
    }
}
