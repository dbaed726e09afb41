pub mod agents;
pub mod config;
pub mod health;
pub mod sessions;
pub mod upload;
