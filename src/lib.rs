//! venmo-sweep: log in to Venmo, read the balance, and sweep it to the
//! primary linked bank account.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod session;
pub mod extract;
pub mod venmo;
pub mod engine;
