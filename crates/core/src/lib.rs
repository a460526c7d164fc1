//! Core ledger logic for Meridian.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! All domain types, balance arithmetic, and invariant enforcement live here.
//!
//! # Modules
//!
//! - `chart` - Chart-of-accounts hierarchy and posting permission rules
//! - `account` - Customer account lifecycle, holds, and balance mutations
//! - `posting` - Double-entry posting coordination and GL balances
//! - `hierarchy` - Read-side nested tree projection
//! - `store` - Versioned in-memory registry with compare-and-swap
//! - `clock` - Time source abstraction

pub mod account;
pub mod chart;
pub mod clock;
pub mod hierarchy;
pub mod posting;
pub mod store;
