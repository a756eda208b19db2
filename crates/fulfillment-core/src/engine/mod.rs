//! Core fulfillment engine that orchestrates the order pipeline.
//!
//! This module contains the main FulfillmentEngine struct which wires the
//! checkout, worker pool, watchdog, and compensator together and runs the
//! event loop that reacts to job outcomes and stalled orders.

pub mod event_bus;
pub mod lifecycle;

use crate::checkout::CheckoutService;
use crate::compensator::RefundCompensator;
use crate::handlers::StageHandler;
use crate::state::OrderStateMachine;
use crate::watchdog::{StallWatchdog, WatchdogError};
use crate::workers::{WorkerPool, WorkerPoolHandle};
use fulfillment_config::Config;
use fulfillment_payment::PaymentService;
use fulfillment_queue::JobQueueService;
use fulfillment_storage::StorageService;
use fulfillment_types::{truncate_id, JobEvent, Order, OrderEvent, PipelineEvent};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Service error: {0}")]
	Service(String),
}

/// Main engine that orchestrates the order fulfillment pipeline.
#[derive(Clone)]
pub struct FulfillmentEngine {
	/// Pipeline configuration.
	pub(crate) config: Config,
	/// Storage service for persisting orders.
	pub(crate) storage: Arc<StorageService>,
	/// Durable job queue feeding the workers.
	pub(crate) queue: Arc<JobQueueService>,
	/// Event bus for job outcomes and stall notifications.
	pub(crate) event_bus: event_bus::EventBus,
	/// Checkout entry points (order creation, payment).
	pub(crate) checkout: Arc<CheckoutService>,
	/// Stall watchdog applied on order reads.
	pub(crate) watchdog: Arc<StallWatchdog>,
	/// Refund compensator for stalled orders.
	pub(crate) compensator: Arc<RefundCompensator>,
	/// Worker pool draining the job queue.
	pub(crate) workers: Arc<WorkerPool>,
}

/// Handle to a running engine, used to shut it down.
pub struct EngineHandle {
	pool: WorkerPoolHandle,
	dispatch: JoinHandle<()>,
	shutdown: watch::Sender<bool>,
}

impl FulfillmentEngine {
	/// Creates a new engine from the resolved services.
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		queue: Arc<JobQueueService>,
		payment: Arc<PaymentService>,
		event_bus: event_bus::EventBus,
	) -> Self {
		let state_machine = Arc::new(OrderStateMachine::new(storage.clone()));

		let stage_delay = Duration::from_secs(config.pipeline.stage_delay_seconds);
		let stall_timeout = Duration::from_secs(config.pipeline.stall_timeout_seconds);
		let payment_window = Duration::from_secs(config.pipeline.payment_window_seconds);

		let handler = Arc::new(StageHandler::new(
			state_machine.clone(),
			queue.clone(),
			stage_delay,
		));

		let workers = Arc::new(WorkerPool::new(
			queue.clone(),
			handler,
			event_bus.clone(),
			config.workers.count,
			Duration::from_millis(config.workers.poll_interval_ms),
		));

		let checkout = Arc::new(CheckoutService::new(
			state_machine.clone(),
			queue.clone(),
			payment,
			payment_window,
		));

		let watchdog = Arc::new(StallWatchdog::new(
			state_machine.clone(),
			event_bus.clone(),
			stall_timeout,
		));

		let compensator = Arc::new(RefundCompensator::new(state_machine, event_bus.clone()));

		Self {
			config,
			storage,
			queue,
			event_bus,
			checkout,
			watchdog,
			compensator,
			workers,
		}
	}

	/// Runs the engine until SIGINT or SIGTERM, then drains and stops.
	pub async fn run(&self) -> Result<(), EngineError> {
		tracing::info!(
			pipeline = %self.config.pipeline.id,
			workers = self.config.workers.count,
			"Fulfillment engine running"
		);

		let handle = self.start();
		lifecycle::shutdown_signal().await;
		self.stop(handle).await
	}

	/// Starts the worker pool and the event dispatch loop.
	pub fn start(&self) -> EngineHandle {
		let pool = self.workers.start();

		let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
		let mut events = self.event_bus.subscribe();
		let compensator = self.compensator.clone();

		let dispatch = tokio::spawn(async move {
			loop {
				tokio::select! {
					event = events.recv() => {
						match event {
							Ok(event) => dispatch_event(&compensator, event).await,
							Err(RecvError::Lagged(skipped)) => {
								tracing::warn!("Event loop lagging, skipped {} events", skipped);
							}
							Err(RecvError::Closed) => break,
						}
					}
					changed = shutdown_rx.changed() => {
						if changed.is_err() || *shutdown_rx.borrow() {
							break;
						}
					}
				}
			}
		});

		EngineHandle {
			pool,
			dispatch,
			shutdown: shutdown_tx,
		}
	}

	/// Stops the engine: drains the workers, then closes the queue.
	pub async fn stop(&self, handle: EngineHandle) -> Result<(), EngineError> {
		handle.pool.stop().await;

		let _ = handle.shutdown.send(true);
		if let Err(e) = handle.dispatch.await {
			if e.is_panic() {
				tracing::error!("Event dispatch task panicked: {}", e);
			}
		}

		self.queue
			.close()
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;

		tracing::info!("Fulfillment engine stopped");
		Ok(())
	}

	/// Loads an order, running the stall watchdog as a side effect.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, WatchdogError> {
		self.watchdog.read_order(order_id).await
	}

	/// Returns a reference to the checkout service.
	pub fn checkout(&self) -> &Arc<CheckoutService> {
		&self.checkout
	}

	/// Returns a reference to the storage service.
	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	/// Returns a reference to the job queue.
	pub fn queue(&self) -> &Arc<JobQueueService> {
		&self.queue
	}

	/// Returns a reference to the event bus.
	pub fn event_bus(&self) -> &event_bus::EventBus {
		&self.event_bus
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}
}

/// Reacts to one pipeline event.
///
/// Stall notifications fan out to the compensator on their own task so a
/// slow storage backend cannot hold up the loop; job outcomes are logged
/// here, mirroring the queue's side of the pipeline.
async fn dispatch_event(compensator: &Arc<RefundCompensator>, event: PipelineEvent) {
	match event {
		PipelineEvent::Order(OrderEvent::Stalled { order_id }) => {
			let compensator = compensator.clone();
			tokio::spawn(async move {
				compensator.compensate(&order_id).await;
			});
		}
		PipelineEvent::Order(OrderEvent::Compensated { order_id }) => {
			tracing::info!(order_id = %truncate_id(&order_id), "Order compensated");
		}
		PipelineEvent::Job(JobEvent::Completed { job_id, message }) => {
			tracing::info!(job_id, %message, "Job completed");
		}
		PipelineEvent::Job(JobEvent::Failed { job_id, reason }) => {
			tracing::warn!(job_id, %reason, "Job failed");
		}
	}
}
