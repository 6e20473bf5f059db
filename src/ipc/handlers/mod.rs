pub mod auth;
pub mod core;
pub mod marks;
pub mod reports;
pub mod students;
pub mod tests;
