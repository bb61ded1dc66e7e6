pub mod appointment;
pub mod error;

pub use appointment::*;
