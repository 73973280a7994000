//! Integration test infrastructure for the VXLAN overlay manager
//!
//! Provides:
//! - An in-memory host that stands in for both tunnel and FDB backends
//! - A recording command executor with scripted responses
//! - Desired-state and backend-output fixtures
//! - Convergence verification helpers

pub mod fakes;
pub mod fixtures;
mod verification;

pub use fakes::{Call, FakeHost, RecordingExecutor};
pub use verification::*;
