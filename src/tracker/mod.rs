pub mod machine;
pub mod mileage;
pub mod service;

pub use service::{TrackerSettings, TravelTracker};
