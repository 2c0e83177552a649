//! Narrow interfaces to the collaborators the tracker depends on.

pub mod estimator;
pub mod geolocation;
pub mod persistence;
pub mod rate;
