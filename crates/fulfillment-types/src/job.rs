//! Job types for the fulfillment queue.
//!
//! This module defines the stage jobs exchanged between order intake and the
//! worker pool, together with the outcome and metrics types of the queue
//! contract.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned to a job by the queue at enqueue time.
pub type JobId = u64;

/// The pipeline stage a job executes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
	/// Restaurant confirmation stage.
	Confirm,
	/// Kitchen preparation stage.
	Cook,
	/// Delivery stage.
	Deliver,
}

impl JobKind {
	/// The stage chained after this one, if any.
	pub fn next(&self) -> Option<JobKind> {
		match self {
			JobKind::Confirm => Some(JobKind::Cook),
			JobKind::Cook => Some(JobKind::Deliver),
			JobKind::Deliver => None,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			JobKind::Confirm => "confirm",
			JobKind::Cook => "cook",
			JobKind::Deliver => "deliver",
		}
	}
}

impl fmt::Display for JobKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A unit of work leased by a worker from the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
	/// Identifier assigned by the queue.
	pub id: JobId,
	/// The stage this job executes.
	pub kind: JobKind,
	/// Identifier of the order the stage acts on.
	pub order_id: String,
	/// Timestamp when the job was enqueued, in unix seconds.
	pub enqueued_at: u64,
}

/// Terminal outcome a worker reports for a leased job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobOutcome {
	/// The stage ran to completion.
	Completed {
		/// Human-readable completion message.
		message: String,
	},
	/// The stage failed and the job will not be retried.
	Failed {
		/// Human-readable failure reason.
		reason: String,
	},
}

/// A failed job retained by the queue for inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedJob {
	/// The job that failed.
	pub job: Job,
	/// Failure reason reported by the worker.
	pub reason: String,
	/// Timestamp when the failure was acknowledged, in unix seconds.
	pub failed_at: u64,
}

/// Point-in-time counters describing queue state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueMetrics {
	/// Jobs waiting to be leased.
	pub ready: usize,
	/// Jobs currently leased to workers.
	pub in_flight: usize,
	/// Failed jobs retained in the bounded failure log.
	pub failed: usize,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_job_kind_chain() {
		assert_eq!(JobKind::Confirm.next(), Some(JobKind::Cook));
		assert_eq!(JobKind::Cook.next(), Some(JobKind::Deliver));
		assert_eq!(JobKind::Deliver.next(), None);
	}

	#[test]
	fn test_job_kind_display() {
		assert_eq!(JobKind::Confirm.to_string(), "confirm");
		assert_eq!(JobKind::Cook.to_string(), "cook");
		assert_eq!(JobKind::Deliver.to_string(), "deliver");
	}
}
