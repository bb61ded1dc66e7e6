pub mod creation;
pub mod query;

pub use creation::AppointmentCreationService;
pub use query::AppointmentQueryService;
