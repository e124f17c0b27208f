//! The exchange driver: runs one user turn against the model, dispatching
//! tool calls as they become ready and looping back with their results
//! until the model answers without requesting tools.

pub mod config;
pub mod exchange;

pub use config::ExchangeConfig;
pub use exchange::run_exchange;
