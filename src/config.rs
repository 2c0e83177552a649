use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

/// One week.
pub const MAX_LOOKAHEAD_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub mileage_rate_per_mile: f64,
    pub geolocation_timeout: Duration,
    pub next_appointment_lookahead_minutes: i64,
    pub road_distance_factor: f64,
    pub appointments_seed_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            mileage_rate_per_mile: parse_or_default("MILEAGE_RATE_PER_MILE", 0.67)?,
            geolocation_timeout: Duration::from_millis(parse_or_default(
                "GEOLOCATION_TIMEOUT_MS",
                10_000u64,
            )?),
            next_appointment_lookahead_minutes: parse_or_default(
                "NEXT_APPOINTMENT_LOOKAHEAD_MINUTES",
                480,
            )?,
            road_distance_factor: parse_or_default("ROAD_DISTANCE_FACTOR", 1.2)?,
            appointments_seed_file: env::var("APPOINTMENTS_SEED_FILE").ok().map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if !self.mileage_rate_per_mile.is_finite() || self.mileage_rate_per_mile < 0.0 {
            return Err(AppError::Internal(
                "MILEAGE_RATE_PER_MILE must be a non-negative number".to_string(),
            ));
        }
        if !self.road_distance_factor.is_finite() || self.road_distance_factor < 1.0 {
            return Err(AppError::Internal(
                "ROAD_DISTANCE_FACTOR must be >= 1.0".to_string(),
            ));
        }
        if !(1..=MAX_LOOKAHEAD_MINUTES).contains(&self.next_appointment_lookahead_minutes) {
            return Err(AppError::Internal(format!(
                "NEXT_APPOINTMENT_LOOKAHEAD_MINUTES must be between 1 and {MAX_LOOKAHEAD_MINUTES}"
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            mileage_rate_per_mile: 0.67,
            geolocation_timeout: Duration::from_secs(10),
            next_appointment_lookahead_minutes: 480,
            road_distance_factor: 1.2,
            appointments_seed_file: None,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, MAX_LOOKAHEAD_MINUTES};

    fn with_lookahead(minutes: i64) -> Config {
        Config {
            next_appointment_lookahead_minutes: minutes,
            ..Config::default()
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn lookahead_must_fit_in_a_week() {
        assert!(with_lookahead(MAX_LOOKAHEAD_MINUTES).validate().is_ok());
        assert!(with_lookahead(MAX_LOOKAHEAD_MINUTES + 1).validate().is_err());
        assert!(with_lookahead(i64::MAX).validate().is_err());
        assert!(with_lookahead(0).validate().is_err());
        assert!(with_lookahead(-30).validate().is_err());
    }

    #[test]
    fn road_factor_below_one_is_rejected() {
        let config = Config {
            road_distance_factor: 0.9,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
