pub mod canonical;
pub mod error;
pub mod failures;
pub mod orchestrator;
pub mod rate_limiter;
pub mod retry;
pub mod store;
