//! Shared types and configuration for Meridian.
//!
//! This crate provides common types used across all other crates:
//! - Money types with decimal precision
//! - Typed IDs for type-safe entity references
//! - Engine configuration management

pub mod config;
pub mod types;

pub use config::LedgerConfig;
