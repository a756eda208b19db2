//! Checkout entry points: order creation and payment capture.
//!
//! Payment capture is the pipeline's front door. An approved charge
//! persists the paid order and enqueues the confirm job that starts the
//! fulfillment chain; a declined charge is recorded on the order and
//! surfaced as a domain error without queueing anything.

use crate::state::{OrderStateError, OrderStateMachine};
use fulfillment_payment::{PaymentOutcome, PaymentService};
use fulfillment_queue::JobQueueService;
use fulfillment_types::{
	current_timestamp, truncate_id, JobKind, Order, OrderStatus, PaymentStatus,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

/// Errors that can occur during checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
	#[error("Order not found: {0}")]
	OrderNotFound(String),
	#[error("Order {0} is already paid")]
	AlreadyPaid(String),
	#[error("Payment amount {actual} does not match order total {expected}")]
	AmountMismatch { expected: Decimal, actual: Decimal },
	#[error("Order {0} expired before payment")]
	OrderExpired(String),
	#[error("Payment declined: {0}")]
	PaymentDeclined(String),
	#[error("Payment error: {0}")]
	Payment(String),
	#[error("State error: {0}")]
	State(String),
	/// The charge went through but the confirm job could not be queued.
	/// Retryable; the caller must not assume the pipeline was started.
	#[error("Queue error: {0}")]
	Queue(String),
}

/// Service handling order creation and payment submission.
pub struct CheckoutService {
	state_machine: Arc<OrderStateMachine>,
	queue: Arc<JobQueueService>,
	payment: Arc<PaymentService>,
	payment_window: Duration,
}

impl CheckoutService {
	pub fn new(
		state_machine: Arc<OrderStateMachine>,
		queue: Arc<JobQueueService>,
		payment: Arc<PaymentService>,
		payment_window: Duration,
	) -> Self {
		Self {
			state_machine,
			queue,
			payment,
			payment_window,
		}
	}

	/// Creates and persists a new pending order awaiting payment.
	pub async fn create_order(&self, total_amount: Decimal) -> Result<Order, CheckoutError> {
		let order = Order::new(
			Uuid::new_v4().to_string(),
			total_amount,
			self.payment_window,
		);
		self.state_machine
			.store_order(&order)
			.await
			.map_err(|e| CheckoutError::State(e.to_string()))?;

		tracing::info!(
			order_id = %truncate_id(&order.id),
			%total_amount,
			"Order created"
		);
		Ok(order)
	}

	/// Charges the order and, on approval, starts the fulfillment chain.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn submit_payment(
		&self,
		order_id: &str,
		payment_method: &str,
		amount: Decimal,
	) -> Result<Order, CheckoutError> {
		let order = self.load_order(order_id).await?;

		if order.payment_status == PaymentStatus::Paid {
			return Err(CheckoutError::AlreadyPaid(order.id));
		}
		if amount != order.total_amount {
			return Err(CheckoutError::AmountMismatch {
				expected: order.total_amount,
				actual: amount,
			});
		}
		if current_timestamp() > order.expired_at {
			return Err(CheckoutError::OrderExpired(order.id));
		}

		let outcome = self
			.payment
			.submit(order_id, amount)
			.await
			.map_err(|e| CheckoutError::Payment(e.to_string()))?;

		match outcome {
			PaymentOutcome::Approved { reference } => {
				let method = payment_method.to_string();
				let updated = self
					.state_machine
					.transition_order_with(order_id, OrderStatus::Paid, |o| {
						o.payment_status = PaymentStatus::Paid;
						o.payment_method = Some(method);
						o.invoice_id = Some(reference);
					})
					.await
					.map_err(|e| CheckoutError::State(e.to_string()))?;

				self.queue
					.enqueue(JobKind::Confirm, order_id)
					.await
					.map_err(|e| CheckoutError::Queue(e.to_string()))?;

				tracing::info!(%amount, "Payment captured, confirmation queued");
				Ok(updated)
			}
			PaymentOutcome::Declined { reason } => {
				let method = payment_method.to_string();
				self.state_machine
					.update_order_with(order_id, |o| {
						o.payment_method = Some(method);
						o.payment_status = PaymentStatus::Failed;
					})
					.await
					.map_err(|e| CheckoutError::State(e.to_string()))?;

				tracing::warn!(%reason, "Payment declined");
				Err(CheckoutError::PaymentDeclined(reason))
			}
		}
	}

	async fn load_order(&self, order_id: &str) -> Result<Order, CheckoutError> {
		self.state_machine
			.get_order(order_id)
			.await
			.map_err(|e| match e {
				OrderStateError::OrderNotFound(id) => CheckoutError::OrderNotFound(id),
				other => CheckoutError::State(other.to_string()),
			})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use fulfillment_payment::implementations::simulated::SimulatedGateway;
	use fulfillment_queue::implementations::memory::MemoryQueue;
	use fulfillment_storage::implementations::memory::MemoryStorage;
	use fulfillment_storage::StorageService;

	fn checkout(approval_rate: f64) -> (CheckoutService, Arc<OrderStateMachine>, Arc<JobQueueService>) {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let state_machine = Arc::new(OrderStateMachine::new(storage));
		let queue = Arc::new(JobQueueService::new(Box::new(MemoryQueue::new(
			4,
			Duration::from_secs(60),
			10,
		))));
		let payment = Arc::new(PaymentService::new(Box::new(SimulatedGateway::new(
			approval_rate,
		))));
		let checkout = CheckoutService::new(
			state_machine.clone(),
			queue.clone(),
			payment,
			Duration::from_secs(1800),
		);
		(checkout, state_machine, queue)
	}

	#[tokio::test]
	async fn test_create_order_persists_pending_order() {
		let (checkout, state_machine, _) = checkout(1.0);
		let order = checkout.create_order(Decimal::new(3499, 2)).await.unwrap();

		assert_eq!(order.status, OrderStatus::Pending);
		assert_eq!(order.payment_status, PaymentStatus::Unpaid);
		assert!(!order.fulfilled);
		assert_eq!(order.expired_at, order.created_at + 1800);

		let stored = state_machine.get_order(&order.id).await.unwrap();
		assert_eq!(stored.total_amount, Decimal::new(3499, 2));
	}

	#[tokio::test]
	async fn test_approved_payment_queues_confirmation() {
		let (checkout, _, queue) = checkout(1.0);
		let order = checkout.create_order(Decimal::from(50)).await.unwrap();

		let paid = checkout
			.submit_payment(&order.id, "card", Decimal::from(50))
			.await
			.unwrap();

		assert_eq!(paid.status, OrderStatus::Paid);
		assert_eq!(paid.payment_status, PaymentStatus::Paid);
		assert_eq!(paid.payment_method.as_deref(), Some("card"));
		assert_eq!(paid.invoice_id.as_deref(), Some(format!("inv-{}", order.id).as_str()));

		let jobs = queue.lease(10).await.unwrap();
		assert_eq!(jobs.len(), 1);
		assert_eq!(jobs[0].kind, JobKind::Confirm);
		assert_eq!(jobs[0].order_id, order.id);
	}

	#[tokio::test]
	async fn test_declined_payment_recorded_without_job() {
		let (checkout, state_machine, queue) = checkout(0.0);
		let order = checkout.create_order(Decimal::from(50)).await.unwrap();

		let result = checkout
			.submit_payment(&order.id, "card", Decimal::from(50))
			.await;
		assert!(matches!(result, Err(CheckoutError::PaymentDeclined(_))));

		let stored = state_machine.get_order(&order.id).await.unwrap();
		assert_eq!(stored.status, OrderStatus::Pending);
		assert_eq!(stored.payment_status, PaymentStatus::Failed);
		assert_eq!(stored.payment_method.as_deref(), Some("card"));
		assert!(queue.lease(10).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_amount_mismatch_rejected_before_charge() {
		let (checkout, state_machine, queue) = checkout(1.0);
		let order = checkout.create_order(Decimal::from(50)).await.unwrap();

		let result = checkout
			.submit_payment(&order.id, "card", Decimal::from(49))
			.await;
		assert!(matches!(
			result,
			Err(CheckoutError::AmountMismatch { .. })
		));

		let stored = state_machine.get_order(&order.id).await.unwrap();
		assert_eq!(stored.payment_status, PaymentStatus::Unpaid);
		assert!(queue.lease(10).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_expired_order_rejected() {
		let (checkout, state_machine, queue) = checkout(1.0);
		let order = checkout.create_order(Decimal::from(50)).await.unwrap();
		state_machine
			.update_order_with(&order.id, |o| {
				o.expired_at = current_timestamp() - 10;
			})
			.await
			.unwrap();

		let result = checkout
			.submit_payment(&order.id, "card", Decimal::from(50))
			.await;
		assert!(matches!(result, Err(CheckoutError::OrderExpired(_))));
		assert!(queue.lease(10).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_second_payment_rejected() {
		let (checkout, _, queue) = checkout(1.0);
		let order = checkout.create_order(Decimal::from(50)).await.unwrap();

		checkout
			.submit_payment(&order.id, "card", Decimal::from(50))
			.await
			.unwrap();
		let result = checkout
			.submit_payment(&order.id, "card", Decimal::from(50))
			.await;
		assert!(matches!(result, Err(CheckoutError::AlreadyPaid(_))));

		// Still only the one confirm job from the first payment
		assert_eq!(queue.lease(10).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_unknown_order_rejected() {
		let (checkout, _, _) = checkout(1.0);
		let result = checkout
			.submit_payment("ghost", "card", Decimal::from(50))
			.await;
		assert!(matches!(result, Err(CheckoutError::OrderNotFound(_))));
	}
}
