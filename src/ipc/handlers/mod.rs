pub mod attendance;
pub mod backup_exchange;
pub mod chapters;
pub mod core;
pub mod courses;
pub mod grades;
pub mod materials;
pub mod reports;
pub mod schedule;
pub mod session;
pub mod setup;
pub mod students;
pub mod users;
