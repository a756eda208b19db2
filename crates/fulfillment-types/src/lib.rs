//! Common types module for the fulfillment pipeline.
//!
//! This module defines the core data types and structures shared by the
//! pipeline components. It provides a centralized location for these types
//! to ensure consistency across checkout, queue, workers, and compensation.

/// Event types for pipeline-internal communication.
pub mod events;
/// Job types exchanged between checkout, the queue, and the worker pool.
pub mod job;
/// Order types including status enums and the refund sub-record.
pub mod order;
/// Storage types for managing persistent data.
pub mod storage;
/// Utility functions for timestamps and formatting.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

// Re-export all types for convenient access
pub use events::*;
pub use job::*;
pub use order::*;
pub use storage::*;
pub use utils::{current_timestamp, truncate_id};
pub use validation::*;
