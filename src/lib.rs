//! Core framework services for the credit-processing suite: activity
//! contexts, message lifecycle, configuration, credentials and tracing.

pub mod activity;
pub mod config;
pub mod error;
pub mod format;
pub mod message;
pub mod msginfo;
pub mod persistence;
pub mod security;
pub mod trace;
pub mod vendor;
