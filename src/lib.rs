// Core modules
pub mod config;
pub mod db;
pub mod exchange;
pub mod indicators;
pub mod mirror;
pub mod models;
pub mod oracle;
pub mod risk;
pub mod scanner;
pub mod scheduler;
pub mod trade;

// Re-export commonly used types
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
