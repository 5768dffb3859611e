pub mod clients;
pub mod config;
pub mod errors;
pub mod models;
pub mod queue;
pub mod services;
