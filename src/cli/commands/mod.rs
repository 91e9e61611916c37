//! CLI command implementations.

mod ask;
mod batch;
mod cache;
mod config;
mod doctor;
mod serve;

pub use ask::run_ask;
pub use batch::run_batch;
pub use cache::run_cache;
pub use config::run_config;
pub use doctor::run_doctor;
pub use serve::run_serve;
