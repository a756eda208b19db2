//! Utility functions shared across the fulfillment pipeline.
//!
//! This module provides small helpers for timestamp retrieval and string
//! formatting used throughout the pipeline components.

pub mod formatting;
pub mod helpers;

pub use formatting::truncate_id;
pub use helpers::current_timestamp;
