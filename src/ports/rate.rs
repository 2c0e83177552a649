use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::error::AppError;

#[async_trait]
pub trait MileageRateSource: Send + Sync {
    async fn rate_per_mile(&self) -> Result<f64, AppError>;
}

#[derive(Debug, Clone, Copy)]
pub struct ConfiguredMileageRate(pub f64);

#[async_trait]
impl MileageRateSource for ConfiguredMileageRate {
    async fn rate_per_mile(&self) -> Result<f64, AppError> {
        Ok(self.0)
    }
}

/// Fetches the rate once and keeps it for the life of the process.
pub struct CachedMileageRate {
    source: Arc<dyn MileageRateSource>,
    cached: OnceCell<f64>,
}

impl CachedMileageRate {
    pub fn new(source: Arc<dyn MileageRateSource>) -> Self {
        Self {
            source,
            cached: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<f64, AppError> {
        self.cached
            .get_or_try_init(|| self.source.rate_per_mile())
            .await
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::{CachedMileageRate, MileageRateSource};
    use crate::error::AppError;

    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MileageRateSource for CountingSource {
        async fn rate_per_mile(&self) -> Result<f64, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(0.655)
        }
    }

    #[tokio::test]
    async fn rate_is_fetched_once() {
        let source = Arc::new(CountingSource::default());
        let cached = CachedMileageRate::new(source.clone());

        assert_eq!(cached.get().await.unwrap(), 0.655);
        assert_eq!(cached.get().await.unwrap(), 0.655);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}
