use tracing::debug;

use crate::models::leg::TravelLeg;
use crate::models::location::GeoPoint;
use crate::models::travel::{AppointmentTravelState, ReimbursementSummary};
use crate::ports::estimator::{DistanceEstimator, EstimatorError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MileageEstimate {
    pub mileage_miles: f64,
    pub estimated_toll_cost: Option<f64>,
}

pub async fn compute_mileage(
    estimator: &dyn DistanceEstimator,
    start: GeoPoint,
    end: GeoPoint,
) -> Result<MileageEstimate, EstimatorError> {
    if start == end {
        debug!("same start and end point; skipping estimator");
        return Ok(MileageEstimate {
            mileage_miles: 0.0,
            estimated_toll_cost: None,
        });
    }

    let route = estimator.estimate(start, end).await?;
    if !route.miles.is_finite() {
        return Err(EstimatorError::Unavailable(format!(
            "estimator returned non-finite distance {}",
            route.miles
        )));
    }
    if let Some(toll) = route.estimated_toll_cost.filter(|toll| !toll.is_finite()) {
        return Err(EstimatorError::Unavailable(format!(
            "estimator returned non-finite toll {toll}"
        )));
    }

    Ok(MileageEstimate {
        mileage_miles: round_cents(route.miles.max(0.0)),
        estimated_toll_cost: route.estimated_toll_cost.map(|toll| round_cents(toll.max(0.0))),
    })
}

pub fn compute_reimbursement(
    outbound_miles: f64,
    return_miles: f64,
    toll_cost: f64,
    rate_per_mile: f64,
) -> f64 {
    round_cents((outbound_miles + return_miles) * rate_per_mile + toll_cost)
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Miles of a chained drive belong to the next appointment's outbound leg, so only a
/// final return leg counts as return mileage here.
pub fn summarize(state: &AppointmentTravelState, rate_per_mile: f64) -> ReimbursementSummary {
    let outbound_miles = state
        .outbound_leg
        .as_ref()
        .and_then(|leg| leg.calculated_mileage)
        .unwrap_or(0.0);
    let return_miles = state
        .return_leg
        .as_ref()
        .filter(|leg| leg.is_final_leg)
        .and_then(|leg| leg.calculated_mileage)
        .unwrap_or(0.0);
    let toll_cost = round_cents(state.legs().map(TravelLeg::toll_cost).sum());

    ReimbursementSummary {
        appointment_id: state.appointment.id,
        outbound_miles,
        return_miles,
        toll_cost,
        rate_per_mile,
        total: compute_reimbursement(outbound_miles, return_miles, toll_cost, rate_per_mile),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::{compute_mileage, compute_reimbursement, round_cents};
    use crate::models::location::GeoPoint;
    use crate::ports::estimator::{DistanceEstimator, EstimatorError, RouteEstimate};

    #[derive(Default)]
    struct FixedEstimator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DistanceEstimator for FixedEstimator {
        async fn estimate(
            &self,
            _from: GeoPoint,
            _to: GeoPoint,
        ) -> Result<RouteEstimate, EstimatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RouteEstimate {
                miles: 12.3456,
                estimated_toll_cost: Some(1.999),
            })
        }
    }

    #[test]
    fn reimbursement_adds_toll_to_rated_miles() {
        assert_eq!(compute_reimbursement(10.0, 5.0, 2.50, 0.67), 12.55);
        assert_eq!(compute_reimbursement(0.0, 0.0, 0.0, 0.67), 0.0);
    }

    #[test]
    fn rounds_to_cents() {
        assert_eq!(round_cents(3.14159), 3.14);
        assert_eq!(round_cents(2.005_1), 2.01);
    }

    #[tokio::test]
    async fn identical_points_skip_estimator() {
        let estimator = FixedEstimator::default();
        let point = GeoPoint::new(33.749, -84.388);

        let estimate = compute_mileage(&estimator, point, point).await.unwrap();

        assert_eq!(estimate.mileage_miles, 0.0);
        assert_eq!(estimator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn estimator_result_is_rounded() {
        let estimator = FixedEstimator::default();
        let estimate = compute_mileage(
            &estimator,
            GeoPoint::new(33.749, -84.388),
            GeoPoint::new(33.95, -84.55),
        )
        .await
        .unwrap();

        assert_eq!(estimate.mileage_miles, 12.35);
        assert_eq!(estimate.estimated_toll_cost, Some(2.0));
        assert_eq!(estimator.calls.load(Ordering::SeqCst), 1);
    }

    struct RawEstimator(RouteEstimate);

    #[async_trait]
    impl DistanceEstimator for RawEstimator {
        async fn estimate(
            &self,
            _from: GeoPoint,
            _to: GeoPoint,
        ) -> Result<RouteEstimate, EstimatorError> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn non_finite_estimates_are_unavailable() {
        let from = GeoPoint::new(33.749, -84.388);
        let to = GeoPoint::new(33.95, -84.55);

        for route in [
            RouteEstimate {
                miles: f64::NAN,
                estimated_toll_cost: None,
            },
            RouteEstimate {
                miles: f64::INFINITY,
                estimated_toll_cost: None,
            },
            RouteEstimate {
                miles: 4.0,
                estimated_toll_cost: Some(f64::NAN),
            },
        ] {
            let result = compute_mileage(&RawEstimator(route), from, to).await;
            assert!(matches!(result, Err(EstimatorError::Unavailable(_))));
        }
    }
}
