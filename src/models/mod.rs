pub mod appointment;
pub mod leg;
pub mod location;
pub mod travel;
