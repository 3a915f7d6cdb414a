//! Core domain model for the foreman automation engine.
//!
//! This crate holds everything the engine crate builds on: the persisted
//! and ephemeral data types, the `Store` contract with its redb-backed and
//! in-memory implementations, issue-key extraction, and the async traits
//! for the external collaborators (issue tracker, insight service).

pub mod config;
pub mod error;
pub mod insight;
pub mod keys;
pub mod store;
pub mod tracker;
pub mod types;

pub use config::AutomationConfig;
pub use error::{ForemanError, Result};
pub use store::{ActionFilter, Store};
