//! Handlers for executing fulfillment stage jobs.
//!
//! This module contains the handler that runs confirm, cook, and deliver
//! jobs leased from the queue: simulating the stage's real-world activity,
//! advancing the order state machine, and chaining the follow-up job.

pub mod stage;

pub use stage::{StageError, StageHandler};
