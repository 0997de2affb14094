pub mod app_config;
pub mod database;
pub mod seating_repo;
#[cfg(feature = "kafka")]
pub mod events;

pub use database::DbClient;
pub use seating_repo::PgSeatingStore;
#[cfg(feature = "kafka")]
pub use events::EventProducer;
