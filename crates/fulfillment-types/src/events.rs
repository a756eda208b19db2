//! Event types for pipeline-internal communication.
//!
//! This module defines the events published on the pipeline event bus:
//! stall and compensation signals for orders, and terminal job outcomes
//! reported by the worker pool.

use crate::JobId;
use serde::{Deserialize, Serialize};

/// Top-level event type published on the pipeline event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
	/// Order lifecycle events.
	Order(OrderEvent),
	/// Job outcome events from the worker pool.
	Job(JobEvent),
}

/// Events describing order-level transitions outside the stage chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderEvent {
	/// A paid order has gone too long without progress.
	Stalled {
		/// Identifier of the stalled order.
		order_id: String,
	},
	/// A stalled order was marked failed and its refund recorded.
	Compensated {
		/// Identifier of the compensated order.
		order_id: String,
	},
}

/// Terminal job outcomes observed by the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
	/// A stage job ran to completion.
	Completed {
		/// Identifier of the completed job.
		job_id: JobId,
		/// Completion message reported by the stage.
		message: String,
	},
	/// A stage job failed terminally.
	Failed {
		/// Identifier of the failed job.
		job_id: JobId,
		/// Failure reason reported by the stage.
		reason: String,
	},
}
