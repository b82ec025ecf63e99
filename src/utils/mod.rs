//! Shared utilities: the crate-wide error type, remote-call outcomes and
//! logging initialization.

pub mod error;
pub mod logging;

pub use error::{CallOutcome, HubError};
