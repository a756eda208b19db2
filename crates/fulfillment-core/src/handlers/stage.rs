//! Stage handler for executing confirm, cook, and deliver jobs.
//!
//! Each leased job simulates the stage's real-world activity with a timed
//! wait, advances the order through the state machine, and enqueues the
//! follow-up stage. The deliver stage additionally marks the order
//! fulfilled in the same persisted write that completes it.

use crate::state::{OrderStateError, OrderStateMachine};
use fulfillment_queue::JobQueueService;
use fulfillment_types::{current_timestamp, truncate_id, Job, JobKind, OrderStatus};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur while executing a stage job.
///
/// Stage errors are terminal for the job: the worker acknowledges the job
/// as failed and the order is left to the stall watchdog.
#[derive(Debug, Error)]
pub enum StageError {
	#[error("Order not found: {0}")]
	OrderNotFound(String),
	#[error("State error: {0}")]
	State(String),
	#[error("Queue error: {0}")]
	Queue(String),
}

/// Handler for executing fulfillment stage jobs.
///
/// The StageHandler runs one leased job at a time: it waits out the
/// configured stage delay, validates and persists the order's transition,
/// and chains the next stage job where one exists.
pub struct StageHandler {
	state_machine: Arc<OrderStateMachine>,
	queue: Arc<JobQueueService>,
	stage_delay: Duration,
}

impl StageHandler {
	pub fn new(
		state_machine: Arc<OrderStateMachine>,
		queue: Arc<JobQueueService>,
		stage_delay: Duration,
	) -> Self {
		Self {
			state_machine,
			queue,
			stage_delay,
		}
	}

	/// Executes one leased stage job and returns its completion message.
	#[instrument(skip_all, fields(job_id = job.id, kind = %job.kind, order_id = %truncate_id(&job.order_id)))]
	pub async fn execute(&self, job: &Job) -> Result<String, StageError> {
		match job.kind {
			JobKind::Confirm => self.handle_confirm(&job.order_id).await,
			JobKind::Cook => self.handle_cook(&job.order_id).await,
			JobKind::Deliver => self.handle_deliver(&job.order_id).await,
		}
	}

	/// Confirms the order with the restaurant and chains the cook stage.
	async fn handle_confirm(&self, order_id: &str) -> Result<String, StageError> {
		tokio::time::sleep(self.stage_delay).await;

		self.transition(order_id, OrderStatus::Confirmed).await?;
		self.enqueue_next(JobKind::Cook, order_id).await?;

		Ok(format!("Order {} is confirmed!", order_id))
	}

	/// Finishes kitchen preparation and chains the deliver stage.
	async fn handle_cook(&self, order_id: &str) -> Result<String, StageError> {
		tokio::time::sleep(self.stage_delay).await;

		self.transition(order_id, OrderStatus::Cooked).await?;
		self.enqueue_next(JobKind::Deliver, order_id).await?;

		Ok(format!("Order {} is ready!", order_id))
	}

	/// Delivers the order, completing and fulfilling it in one write.
	async fn handle_deliver(&self, order_id: &str) -> Result<String, StageError> {
		tokio::time::sleep(self.stage_delay).await;

		self.state_machine
			.transition_order_with(order_id, OrderStatus::Completed, |o| {
				o.fulfilled = true;
				o.delivered_at = Some(current_timestamp());
			})
			.await
			.map_err(map_state_error)?;

		Ok(format!("Order {} is delivered!", order_id))
	}

	async fn transition(&self, order_id: &str, status: OrderStatus) -> Result<(), StageError> {
		self.state_machine
			.transition_order_status(order_id, status)
			.await
			.map_err(map_state_error)?;
		Ok(())
	}

	async fn enqueue_next(&self, kind: JobKind, order_id: &str) -> Result<(), StageError> {
		self.queue
			.enqueue(kind, order_id)
			.await
			.map_err(|e| StageError::Queue(e.to_string()))?;
		Ok(())
	}
}

fn map_state_error(err: OrderStateError) -> StageError {
	match err {
		OrderStateError::OrderNotFound(id) => StageError::OrderNotFound(id),
		other => StageError::State(other.to_string()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use fulfillment_queue::implementations::memory::MemoryQueue;
	use fulfillment_storage::implementations::memory::MemoryStorage;
	use fulfillment_storage::StorageService;
	use fulfillment_types::{Order, PaymentStatus};
	use rust_decimal::Decimal;

	fn handler() -> (StageHandler, Arc<OrderStateMachine>, Arc<JobQueueService>) {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let state_machine = Arc::new(OrderStateMachine::new(storage));
		let queue = Arc::new(JobQueueService::new(Box::new(MemoryQueue::new(
			4,
			Duration::from_secs(60),
			10,
		))));
		let handler = StageHandler::new(state_machine.clone(), queue.clone(), Duration::ZERO);
		(handler, state_machine, queue)
	}

	async fn store_paid_order(state_machine: &OrderStateMachine, id: &str) {
		let mut order = Order::new(id.to_string(), Decimal::from(25), Duration::from_secs(1800));
		order.status = OrderStatus::Paid;
		order.payment_status = PaymentStatus::Paid;
		state_machine.store_order(&order).await.unwrap();
	}

	fn job(kind: JobKind, order_id: &str) -> Job {
		Job {
			id: 1,
			kind,
			order_id: order_id.to_string(),
			enqueued_at: current_timestamp(),
		}
	}

	#[tokio::test]
	async fn test_confirm_advances_and_chains_cook() {
		let (handler, state_machine, queue) = handler();
		store_paid_order(&state_machine, "order-1").await;

		let message = handler.execute(&job(JobKind::Confirm, "order-1")).await.unwrap();
		assert_eq!(message, "Order order-1 is confirmed!");

		let order = state_machine.get_order("order-1").await.unwrap();
		assert_eq!(order.status, OrderStatus::Confirmed);

		// Exactly one follow-up job, for the cook stage of the same order
		let next = queue.lease(10).await.unwrap();
		assert_eq!(next.len(), 1);
		assert_eq!(next[0].kind, JobKind::Cook);
		assert_eq!(next[0].order_id, "order-1");
	}

	#[tokio::test]
	async fn test_deliver_completes_and_fulfills() {
		let (handler, state_machine, queue) = handler();
		let mut order = Order::new(
			"order-1".to_string(),
			Decimal::from(25),
			Duration::from_secs(1800),
		);
		order.status = OrderStatus::Cooked;
		order.payment_status = PaymentStatus::Paid;
		state_machine.store_order(&order).await.unwrap();

		let message = handler.execute(&job(JobKind::Deliver, "order-1")).await.unwrap();
		assert_eq!(message, "Order order-1 is delivered!");

		let order = state_machine.get_order("order-1").await.unwrap();
		assert_eq!(order.status, OrderStatus::Completed);
		assert!(order.fulfilled);
		assert!(order.delivered_at.is_some());

		// The chain ends here
		assert!(queue.lease(10).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_missing_order_fails_without_chaining() {
		let (handler, _, queue) = handler();

		let result = handler.execute(&job(JobKind::Confirm, "ghost")).await;
		assert!(matches!(result, Err(StageError::OrderNotFound(_))));
		assert!(queue.lease(10).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_unpaid_order_rejected() {
		let (handler, state_machine, queue) = handler();
		let order = Order::new(
			"order-1".to_string(),
			Decimal::from(25),
			Duration::from_secs(1800),
		);
		state_machine.store_order(&order).await.unwrap();

		// A confirm job for a still-pending order is an invalid transition
		let result = handler.execute(&job(JobKind::Confirm, "order-1")).await;
		assert!(matches!(result, Err(StageError::State(_))));
		assert!(queue.lease(10).await.unwrap().is_empty());
	}
}
