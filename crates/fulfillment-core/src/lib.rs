//! Core engine for the order fulfillment pipeline.
//!
//! This crate provides the orchestration logic for the pipeline: the
//! checkout entry points, the state machine guarding order transitions,
//! the worker pool draining the job queue through the stage handler, the
//! stall watchdog, and the refund compensator. Engines are assembled from
//! pluggable storage, queue, and payment implementations via the builder
//! and its factory maps.

pub mod builder;
pub mod checkout;
pub mod compensator;
pub mod engine;
pub mod handlers;
pub mod state;
pub mod watchdog;
pub mod workers;

pub use builder::{BuilderError, FulfillmentBuilder, FulfillmentFactories};
pub use checkout::{CheckoutError, CheckoutService};
pub use compensator::RefundCompensator;
pub use engine::{event_bus::EventBus, EngineError, EngineHandle, FulfillmentEngine};
pub use handlers::{StageError, StageHandler};
pub use state::{OrderStateError, OrderStateMachine};
pub use watchdog::{StallWatchdog, WatchdogError};
pub use workers::{WorkerPool, WorkerPoolHandle};
