pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod resolver;
pub mod server;
pub mod signals;

pub use logging::init_tracing;
