//! # Sitebill Common Library
//!
//! Shared code for Sitebill services including:
//! - Database pool initialization and persisted row models
//! - Progress event types and per-session progress bus
//! - Configuration loading and root folder resolution
//! - Error types

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
