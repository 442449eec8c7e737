pub mod models;
pub mod pending;
pub mod time;
