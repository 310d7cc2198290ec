//! Session service
//!
//! Admission control for capacity-bounded meetings and streams, plus the
//! membership and monetization ledgers that hang off each resource.

pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod services;

pub use config::Config;
pub use error::{ServiceError, ServiceResult};
