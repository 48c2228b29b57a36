//! exrate server
//!
//! HTTP service answering current and historical exchange rate queries from
//! a Postgres-backed cache, with a daily backfill of today's rates.

pub mod api;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod service;
pub mod state;

pub use config::ServiceConfig;
pub use error::{ApiError, ApiResult};
pub use scheduler::{BackfillScheduler, Schedule};
pub use service::RateService;
pub use state::ServiceState;
