//! Test utilities.
//!
//! This module provides:
//! - Test data factories and provider event payload builders
//! - An in-memory store implementing every repository trait
//! - A builder for `AppState` backed by that store

mod app_state_builder;
mod factories;
mod ledger_mocks;

pub use app_state_builder::*;
pub use factories::*;
pub use ledger_mocks::*;
