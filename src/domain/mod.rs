// Domain module - Configuration values and error taxonomy
pub mod config;
pub mod error;
