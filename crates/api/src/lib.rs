// API crate clippy configuration
// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Chartsight API Library
//!
//! This crate contains the HTTP server components for Chartsight: the JSON
//! REST surface, JWT auth middleware, the Telegram bot integration, the SMTP
//! mailer, and the forex calendar feed client.

pub mod auth;
pub mod calendar;
pub mod config;
pub mod email;
pub mod error;
pub mod routes;
pub mod state;
pub mod telegram;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
