//! In-memory queue backend implementation for the fulfillment pipeline.
//!
//! This module provides a process-local implementation of the QueueInterface
//! trait. Ready jobs live in a FIFO deque; leased jobs are tracked with a
//! deadline and a slot permit so the pipeline-wide concurrency limit holds no
//! matter how many workers poll. Expired leases are reclaimed lazily on the
//! next lease call.

use crate::{QueueError, QueueInterface, QueueLimits};
use async_trait::async_trait;
use fulfillment_types::{
	current_timestamp, ConfigSchema, FailedJob, Field, FieldType, Job, JobId, JobKind, JobOutcome,
	QueueMetrics, Schema, ValidationError,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// A job leased to a worker.
///
/// Holds the slot permit for the duration of the lease; dropping the entry
/// (on ack or lease expiry) releases the execution slot.
struct LeasedJob {
	job: Job,
	deadline: Instant,
	_permit: OwnedSemaphorePermit,
}

/// Mutable queue state behind the lock.
struct QueueState {
	ready: VecDeque<Job>,
	in_flight: HashMap<JobId, LeasedJob>,
	failed: VecDeque<FailedJob>,
	next_id: JobId,
	closed: bool,
}

/// In-memory queue implementation.
///
/// Jobs survive only as long as the process; the interface matches durable
/// backends so one can be swapped in through configuration.
pub struct MemoryQueue {
	/// Queue state protected by a mutex.
	state: Mutex<QueueState>,
	/// Execution slots shared by all leases. The semaphore, not the number
	/// of polling workers, is what bounds concurrent stage execution.
	slots: Arc<Semaphore>,
	/// How long a leased job stays invisible before redelivery.
	lease_timeout: Duration,
	/// Maximum number of failed jobs retained for inspection.
	max_failed: usize,
}

impl MemoryQueue {
	/// Creates a new MemoryQueue with the given limits.
	pub fn new(concurrency: usize, lease_timeout: Duration, max_failed: usize) -> Self {
		Self {
			state: Mutex::new(QueueState {
				ready: VecDeque::new(),
				in_flight: HashMap::new(),
				failed: VecDeque::new(),
				next_id: 1,
				closed: false,
			}),
			slots: Arc::new(Semaphore::new(concurrency)),
			lease_timeout,
			max_failed,
		}
	}

	/// Moves jobs with expired leases back to the front of the ready set.
	///
	/// Dropping the leased entry releases its slot permit, so reclaimed
	/// capacity is immediately available to the caller.
	fn reclaim_expired(state: &mut QueueState) {
		let now = Instant::now();
		let expired: Vec<JobId> = state
			.in_flight
			.iter()
			.filter(|(_, leased)| leased.deadline <= now)
			.map(|(id, _)| *id)
			.collect();

		if expired.is_empty() {
			return;
		}

		let mut reclaimed = Vec::with_capacity(expired.len());
		for job_id in expired {
			if let Some(leased) = state.in_flight.remove(&job_id) {
				tracing::warn!(job_id, "Job lease expired, returning to queue");
				reclaimed.push(leased.job);
			}
		}

		// Oldest job ends up at the very front
		reclaimed.sort_by_key(|job| job.id);
		for job in reclaimed.into_iter().rev() {
			state.ready.push_front(job);
		}
	}
}

#[async_trait]
impl QueueInterface for MemoryQueue {
	async fn enqueue(&self, kind: JobKind, order_id: &str) -> Result<JobId, QueueError> {
		let mut state = self.state.lock().await;
		if state.closed {
			return Err(QueueError::Connection("queue is closed".into()));
		}

		let job_id = state.next_id;
		state.next_id += 1;
		state.ready.push_back(Job {
			id: job_id,
			kind,
			order_id: order_id.to_string(),
			enqueued_at: current_timestamp(),
		});

		Ok(job_id)
	}

	async fn lease(&self, count: usize) -> Result<Vec<Job>, QueueError> {
		let mut state = self.state.lock().await;
		if state.closed {
			return Err(QueueError::Connection("queue is closed".into()));
		}

		Self::reclaim_expired(&mut state);

		let mut leased = Vec::new();
		while leased.len() < count && !state.ready.is_empty() {
			let permit = match self.slots.clone().try_acquire_owned() {
				Ok(permit) => permit,
				// All execution slots taken
				Err(_) => break,
			};

			if let Some(job) = state.ready.pop_front() {
				state.in_flight.insert(
					job.id,
					LeasedJob {
						job: job.clone(),
						deadline: Instant::now() + self.lease_timeout,
						_permit: permit,
					},
				);
				leased.push(job);
			} else {
				break;
			}
		}

		Ok(leased)
	}

	async fn ack(&self, job_id: JobId, outcome: JobOutcome) -> Result<(), QueueError> {
		// Acks are accepted after close so draining workers can finish
		let mut state = self.state.lock().await;
		let leased = state
			.in_flight
			.remove(&job_id)
			.ok_or(QueueError::UnknownJob(job_id))?;
		let LeasedJob { job, .. } = leased;

		match outcome {
			JobOutcome::Completed { .. } => {},
			JobOutcome::Failed { reason } => {
				state.failed.push_back(FailedJob {
					job,
					reason,
					failed_at: current_timestamp(),
				});
				while state.failed.len() > self.max_failed {
					state.failed.pop_front();
				}
			},
		}

		Ok(())
	}

	async fn metrics(&self) -> Result<QueueMetrics, QueueError> {
		let state = self.state.lock().await;
		Ok(QueueMetrics {
			ready: state.ready.len(),
			in_flight: state.in_flight.len(),
			failed: state.failed.len(),
		})
	}

	async fn failed_jobs(&self) -> Result<Vec<FailedJob>, QueueError> {
		let state = self.state.lock().await;
		Ok(state.failed.iter().cloned().collect())
	}

	async fn close(&self) -> Result<(), QueueError> {
		let mut state = self.state.lock().await;
		state.closed = true;
		tracing::debug!(
			ready = state.ready.len(),
			in_flight = state.in_flight.len(),
			"Queue closed"
		);
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryQueueSchema)
	}
}

/// Configuration schema for MemoryQueue.
pub struct MemoryQueueSchema;

impl ConfigSchema for MemoryQueueSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![], // No required fields
			vec![Field::new(
				"max_failed_jobs",
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			)],
		);

		schema.validate(config)
	}
}

/// Factory function to create a memory queue backend from configuration.
///
/// Configuration parameters:
/// - `max_failed_jobs`: How many failed jobs to retain (default: 10)
pub fn create_queue(
	config: &toml::Value,
	limits: &QueueLimits,
) -> Result<Box<dyn QueueInterface>, QueueError> {
	MemoryQueueSchema
		.validate(config)
		.map_err(|e| QueueError::Configuration(e.to_string()))?;

	let max_failed = config
		.get("max_failed_jobs")
		.and_then(|v| v.as_integer())
		.map(|v| v as usize)
		.unwrap_or(10);

	Ok(Box::new(MemoryQueue::new(
		limits.concurrency,
		limits.lease_timeout,
		max_failed,
	)))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn queue(concurrency: usize) -> MemoryQueue {
		MemoryQueue::new(concurrency, Duration::from_secs(60), 10)
	}

	#[tokio::test]
	async fn test_enqueue_lease_ack() {
		let queue = queue(4);

		let job_id = queue.enqueue(JobKind::Confirm, "order-1").await.unwrap();
		assert_eq!(queue.metrics().await.unwrap().ready, 1);

		let jobs = queue.lease(1).await.unwrap();
		assert_eq!(jobs.len(), 1);
		assert_eq!(jobs[0].id, job_id);
		assert_eq!(jobs[0].kind, JobKind::Confirm);
		assert_eq!(jobs[0].order_id, "order-1");

		let metrics = queue.metrics().await.unwrap();
		assert_eq!(metrics.ready, 0);
		assert_eq!(metrics.in_flight, 1);

		queue
			.ack(
				job_id,
				JobOutcome::Completed {
					message: "Order order-1 is confirmed!".into(),
				},
			)
			.await
			.unwrap();

		let metrics = queue.metrics().await.unwrap();
		assert_eq!(metrics, QueueMetrics::default());
	}

	#[tokio::test]
	async fn test_leased_jobs_invisible() {
		let queue = queue(4);

		let first = queue.enqueue(JobKind::Confirm, "order-1").await.unwrap();
		let second = queue.enqueue(JobKind::Confirm, "order-2").await.unwrap();

		let jobs = queue.lease(1).await.unwrap();
		assert_eq!(jobs[0].id, first);

		// The leased job must not be handed out again
		let jobs = queue.lease(4).await.unwrap();
		assert_eq!(jobs.len(), 1);
		assert_eq!(jobs[0].id, second);
	}

	#[tokio::test]
	async fn test_concurrency_cap() {
		let queue = queue(4);

		for i in 0..6 {
			queue
				.enqueue(JobKind::Confirm, &format!("order-{}", i))
				.await
				.unwrap();
		}

		// Only four slots exist no matter how many jobs are requested
		let jobs = queue.lease(10).await.unwrap();
		assert_eq!(jobs.len(), 4);
		assert!(queue.lease(10).await.unwrap().is_empty());

		// Acking one job frees exactly one slot
		queue
			.ack(jobs[0].id, JobOutcome::Completed { message: "done".into() })
			.await
			.unwrap();
		assert_eq!(queue.lease(10).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_failed_jobs_bounded() {
		let queue = MemoryQueue::new(4, Duration::from_secs(60), 2);

		for i in 0..3 {
			queue
				.enqueue(JobKind::Deliver, &format!("order-{}", i))
				.await
				.unwrap();
		}
		let jobs = queue.lease(3).await.unwrap();
		for job in &jobs {
			queue
				.ack(
					job.id,
					JobOutcome::Failed {
						reason: "Order not found".into(),
					},
				)
				.await
				.unwrap();
		}

		// Only the two most recent failures are retained
		let failed = queue.failed_jobs().await.unwrap();
		assert_eq!(failed.len(), 2);
		assert_eq!(failed[0].job.id, jobs[1].id);
		assert_eq!(failed[1].job.id, jobs[2].id);
	}

	#[tokio::test]
	async fn test_expired_lease_requeued() {
		let queue = MemoryQueue::new(4, Duration::from_millis(50), 10);

		let job_id = queue.enqueue(JobKind::Cook, "order-1").await.unwrap();
		assert_eq!(queue.lease(1).await.unwrap()[0].id, job_id);

		tokio::time::sleep(Duration::from_millis(80)).await;

		// The expired job is redelivered and counts as in-flight again
		let jobs = queue.lease(1).await.unwrap();
		assert_eq!(jobs.len(), 1);
		assert_eq!(jobs[0].id, job_id);
		assert_eq!(queue.metrics().await.unwrap().in_flight, 1);
	}

	#[tokio::test]
	async fn test_expired_lease_goes_to_front() {
		let queue = MemoryQueue::new(1, Duration::from_millis(50), 10);

		let first = queue.enqueue(JobKind::Confirm, "order-1").await.unwrap();
		queue.enqueue(JobKind::Confirm, "order-2").await.unwrap();

		assert_eq!(queue.lease(1).await.unwrap()[0].id, first);
		tokio::time::sleep(Duration::from_millis(80)).await;

		// The reclaimed job is redelivered before the younger ready job
		assert_eq!(queue.lease(1).await.unwrap()[0].id, first);
	}

	#[tokio::test]
	async fn test_closed_queue() {
		let queue = queue(4);

		let job_id = queue.enqueue(JobKind::Confirm, "order-1").await.unwrap();
		let jobs = queue.lease(1).await.unwrap();
		assert_eq!(jobs.len(), 1);

		queue.close().await.unwrap();

		assert!(matches!(
			queue.enqueue(JobKind::Cook, "order-2").await,
			Err(QueueError::Connection(_))
		));
		assert!(matches!(
			queue.lease(1).await,
			Err(QueueError::Connection(_))
		));

		// In-flight work can still be acknowledged while draining
		queue
			.ack(job_id, JobOutcome::Completed { message: "done".into() })
			.await
			.unwrap();
		assert_eq!(queue.metrics().await.unwrap().in_flight, 0);
	}

	#[tokio::test]
	async fn test_ack_unknown_job() {
		let queue = queue(4);
		let result = queue
			.ack(99, JobOutcome::Completed { message: "done".into() })
			.await;
		assert!(matches!(result, Err(QueueError::UnknownJob(99))));
	}
}
