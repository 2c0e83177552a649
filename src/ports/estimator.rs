use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::haversine_miles;
use crate::models::location::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RouteEstimate {
    pub miles: f64,
    pub estimated_toll_cost: Option<f64>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EstimatorError {
    #[error("distance estimator unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait DistanceEstimator: Send + Sync {
    async fn estimate(&self, from: GeoPoint, to: GeoPoint) -> Result<RouteEstimate, EstimatorError>;
}

/// Straight-line distance stretched by a fixed factor to approximate road routing.
/// Produces no toll estimate.
#[derive(Debug, Clone)]
pub struct HaversineEstimator {
    road_factor: f64,
}

impl HaversineEstimator {
    pub fn new(road_factor: f64) -> Self {
        Self { road_factor }
    }
}

#[async_trait]
impl DistanceEstimator for HaversineEstimator {
    async fn estimate(
        &self,
        from: GeoPoint,
        to: GeoPoint,
    ) -> Result<RouteEstimate, EstimatorError> {
        let miles = haversine_miles(&from, &to) * self.road_factor;
        if !miles.is_finite() {
            return Err(EstimatorError::Unavailable(
                "distance is not a finite number".to_string(),
            ));
        }

        Ok(RouteEstimate {
            miles,
            estimated_toll_cost: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{DistanceEstimator, HaversineEstimator};
    use crate::geo::haversine_miles;
    use crate::models::location::GeoPoint;

    #[tokio::test]
    async fn road_factor_scales_straight_line_distance() {
        let from = GeoPoint::new(39.7392, -104.9903);
        let to = GeoPoint::new(39.7555, -105.2211);

        let estimate = HaversineEstimator::new(1.25).estimate(from, to).await.unwrap();

        let straight = haversine_miles(&from, &to);
        assert!((estimate.miles - straight * 1.25).abs() < 1e-9);
        assert!(estimate.estimated_toll_cost.is_none());
    }
}
