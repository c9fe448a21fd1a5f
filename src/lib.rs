pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod filter;
pub mod logging;
pub mod observability;
pub mod orchestrator;
pub mod receiver;
pub mod refresher;
pub mod runtime;
pub mod types;
