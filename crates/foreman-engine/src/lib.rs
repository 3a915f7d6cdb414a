//! Automation engine for foreman.
//!
//! The engine owns the run loop: on a timer or on demand it invokes every
//! enabled check module, persists the resulting actions, auto-executes
//! the high-confidence ones, and streams lifecycle events to subscribers
//! over the event bus.

pub mod bus;
pub mod checks;
pub mod engine;
pub mod executor;

pub use bus::{EngineEvent, EventBus, EventKind};
pub use checks::{CheckContext, CheckModule};
pub use engine::Engine;
pub use executor::{ExecutionResult, Executor};
