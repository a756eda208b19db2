//! Job queue module for the order fulfillment pipeline.
//!
//! This module provides abstractions for the queue that carries stage jobs
//! from order intake to the worker pool. Backends enforce the pipeline-wide
//! concurrency limit at lease time, redeliver jobs whose lease expired, and
//! retain a bounded log of failed jobs for inspection.

use async_trait::async_trait;
use fulfillment_types::{
	truncate_id, ConfigSchema, FailedJob, Job, JobId, JobKind, JobOutcome, QueueMetrics,
};
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
}

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
	/// Error that occurs when the queue is closed or unreachable.
	/// Callers may retry the operation against a healthy queue.
	#[error("Connection error: {0}")]
	Connection(String),
	/// Error that occurs when acknowledging a job the queue is not tracking.
	#[error("Unknown job: {0}")]
	UnknownJob(JobId),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Limits applied by every queue backend.
///
/// These come from the top-level queue configuration rather than the
/// per-implementation table, so switching backends keeps the same
/// pipeline-wide behavior.
#[derive(Debug, Clone)]
pub struct QueueLimits {
	/// Maximum number of jobs leased out at any moment.
	pub concurrency: usize,
	/// How long a leased job stays invisible before redelivery.
	pub lease_timeout: Duration,
}

/// Trait defining the low-level interface for queue backends.
///
/// Jobs move through three states: ready (waiting to be leased), in-flight
/// (leased to a worker and invisible to others), and acknowledged (removed,
/// with failures retained in a bounded log). A job whose lease expires
/// returns to the front of the ready set.
#[async_trait]
pub trait QueueInterface: Send + Sync {
	/// Appends a stage job for the given order and returns its id.
	async fn enqueue(&self, kind: JobKind, order_id: &str) -> Result<JobId, QueueError>;

	/// Leases up to `count` jobs, bounded by the concurrency limit.
	///
	/// Returns an empty vector when nothing is ready or all execution
	/// slots are taken.
	async fn lease(&self, count: usize) -> Result<Vec<Job>, QueueError>;

	/// Acknowledges a leased job with its terminal outcome, removing it.
	///
	/// Acknowledgement is accepted even after [`close`](Self::close) so
	/// draining workers can finish their current job.
	async fn ack(&self, job_id: JobId, outcome: JobOutcome) -> Result<(), QueueError>;

	/// Returns point-in-time counters for the queue.
	async fn metrics(&self) -> Result<QueueMetrics, QueueError>;

	/// Returns the retained failed jobs, oldest first.
	async fn failed_jobs(&self) -> Result<Vec<FailedJob>, QueueError>;

	/// Closes the queue. Subsequent enqueues and leases fail with
	/// [`QueueError::Connection`].
	async fn close(&self) -> Result<(), QueueError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for queue factory functions.
///
/// This is the function signature that all queue implementations must
/// provide to create instances of their queue interface.
pub type QueueFactory =
	fn(&toml::Value, &QueueLimits) -> Result<Box<dyn QueueInterface>, QueueError>;

/// High-level queue service wrapping a backend implementation.
///
/// The service adds logging around enqueue operations and otherwise
/// delegates to the configured backend.
pub struct JobQueueService {
	/// The underlying queue backend implementation.
	implementation: Box<dyn QueueInterface>,
}

impl JobQueueService {
	/// Creates a new JobQueueService with the specified implementation.
	pub fn new(implementation: Box<dyn QueueInterface>) -> Self {
		Self { implementation }
	}

	/// Enqueues a stage job for the given order.
	pub async fn enqueue(&self, kind: JobKind, order_id: &str) -> Result<JobId, QueueError> {
		let job_id = self.implementation.enqueue(kind, order_id).await?;
		tracing::info!(
			job_id,
			kind = %kind,
			order_id = %truncate_id(order_id),
			"Job added to the queue"
		);
		Ok(job_id)
	}

	/// Leases up to `count` jobs from the queue.
	pub async fn lease(&self, count: usize) -> Result<Vec<Job>, QueueError> {
		self.implementation.lease(count).await
	}

	/// Acknowledges a leased job with its terminal outcome.
	pub async fn ack(&self, job_id: JobId, outcome: JobOutcome) -> Result<(), QueueError> {
		self.implementation.ack(job_id, outcome).await
	}

	/// Returns point-in-time counters for the queue.
	pub async fn metrics(&self) -> Result<QueueMetrics, QueueError> {
		self.implementation.metrics().await
	}

	/// Returns the retained failed jobs, oldest first.
	pub async fn failed_jobs(&self) -> Result<Vec<FailedJob>, QueueError> {
		self.implementation.failed_jobs().await
	}

	/// Closes the queue.
	pub async fn close(&self) -> Result<(), QueueError> {
		self.implementation.close().await
	}
}
