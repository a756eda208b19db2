//! Worker pool that drains the job queue.
//!
//! A fixed number of workers repeatedly lease jobs, run them through the
//! stage handler, and acknowledge the outcome. Workers idle on a poll
//! interval when the queue is empty and exit on the shutdown signal,
//! finishing any job already in flight first.

use crate::engine::event_bus::EventBus;
use crate::handlers::StageHandler;
use fulfillment_queue::JobQueueService;
use fulfillment_types::{Job, JobEvent, JobOutcome, PipelineEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Pool of queue workers executing fulfillment stage jobs.
pub struct WorkerPool {
	queue: Arc<JobQueueService>,
	handler: Arc<StageHandler>,
	event_bus: EventBus,
	count: usize,
	poll_interval: Duration,
}

/// Handle to a running worker pool.
///
/// Dropping the handle without calling [`stop`](Self::stop) leaves the
/// workers running until their tasks are torn down with the runtime.
pub struct WorkerPoolHandle {
	shutdown: watch::Sender<bool>,
	handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
	pub fn new(
		queue: Arc<JobQueueService>,
		handler: Arc<StageHandler>,
		event_bus: EventBus,
		count: usize,
		poll_interval: Duration,
	) -> Self {
		Self {
			queue,
			handler,
			event_bus,
			count,
			poll_interval,
		}
	}

	/// Spawns the workers and returns a handle for shutting them down.
	pub fn start(&self) -> WorkerPoolHandle {
		let (shutdown_tx, shutdown_rx) = watch::channel(false);

		let handles = (0..self.count)
			.map(|worker_id| {
				let queue = self.queue.clone();
				let handler = self.handler.clone();
				let event_bus = self.event_bus.clone();
				let poll_interval = self.poll_interval;
				let shutdown = shutdown_rx.clone();

				tokio::spawn(async move {
					run_worker(worker_id, queue, handler, event_bus, poll_interval, shutdown)
						.await;
				})
			})
			.collect();

		tracing::info!("Started {} fulfillment workers", self.count);

		WorkerPoolHandle {
			shutdown: shutdown_tx,
			handles,
		}
	}
}

impl WorkerPoolHandle {
	/// Signals all workers to stop and waits for them to drain.
	pub async fn stop(self) {
		let _ = self.shutdown.send(true);
		for handle in self.handles {
			if let Err(e) = handle.await {
				if e.is_panic() {
					tracing::error!("Worker task panicked: {}", e);
				}
			}
		}
		tracing::debug!("All fulfillment workers stopped");
	}
}

async fn run_worker(
	worker_id: usize,
	queue: Arc<JobQueueService>,
	handler: Arc<StageHandler>,
	event_bus: EventBus,
	poll_interval: Duration,
	mut shutdown: watch::Receiver<bool>,
) {
	tracing::debug!(worker = worker_id, "Fulfillment worker started");

	loop {
		if *shutdown.borrow() {
			break;
		}

		let jobs = match queue.lease(1).await {
			Ok(jobs) => jobs,
			Err(e) => {
				tracing::warn!(worker = worker_id, "Failed to lease job: {}", e);
				if wait_or_shutdown(poll_interval, &mut shutdown).await {
					break;
				}
				continue;
			}
		};

		if jobs.is_empty() {
			if wait_or_shutdown(poll_interval, &mut shutdown).await {
				break;
			}
			continue;
		}

		for job in jobs {
			process_job(&queue, &handler, &event_bus, job).await;
		}
	}

	tracing::debug!(worker = worker_id, "Fulfillment worker stopped");
}

/// Sleeps for the poll interval, returning early if shutdown is signalled.
/// Returns true when the worker should exit.
async fn wait_or_shutdown(poll_interval: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
	tokio::select! {
		_ = tokio::time::sleep(poll_interval) => false,
		changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
	}
}

async fn process_job(
	queue: &JobQueueService,
	handler: &StageHandler,
	event_bus: &EventBus,
	job: Job,
) {
	let job_id = job.id;
	match handler.execute(&job).await {
		Ok(message) => {
			if let Err(e) = queue
				.ack(job_id, JobOutcome::Completed {
					message: message.clone(),
				})
				.await
			{
				tracing::warn!(job_id, "Failed to ack completed job: {}", e);
			}
			event_bus
				.publish(PipelineEvent::Job(JobEvent::Completed { job_id, message }))
				.ok();
		}
		Err(e) => {
			let reason = e.to_string();
			if let Err(ack_err) = queue
				.ack(job_id, JobOutcome::Failed {
					reason: reason.clone(),
				})
				.await
			{
				tracing::warn!(job_id, "Failed to ack failed job: {}", ack_err);
			}
			event_bus
				.publish(PipelineEvent::Job(JobEvent::Failed { job_id, reason }))
				.ok();
		}
	}
}
