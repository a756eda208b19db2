//! Stall detection for orders that stopped making progress.
//!
//! Every order read passes through the watchdog. An order counts as
//! stalled when it was paid, is not yet fulfilled, has not already
//! failed, and its last update is older than the stall timeout. Stalled
//! orders are reported on the event bus so the refund compensator can
//! pick them up.

use crate::engine::event_bus::EventBus;
use crate::state::{OrderStateError, OrderStateMachine};
use fulfillment_types::{
	current_timestamp, truncate_id, Order, OrderEvent, OrderStatus, PaymentStatus, PipelineEvent,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while reading an order through the watchdog.
#[derive(Debug, Error)]
pub enum WatchdogError {
	#[error("Order not found: {0}")]
	OrderNotFound(String),
	#[error("State error: {0}")]
	State(String),
}

/// Watchdog that flags paid orders whose pipeline has gone quiet.
pub struct StallWatchdog {
	state_machine: Arc<OrderStateMachine>,
	event_bus: EventBus,
	stall_timeout: Duration,
}

impl StallWatchdog {
	pub fn new(
		state_machine: Arc<OrderStateMachine>,
		event_bus: EventBus,
		stall_timeout: Duration,
	) -> Self {
		Self {
			state_machine,
			event_bus,
			stall_timeout,
		}
	}

	/// Loads an order, publishing a stall event if it has gone quiet.
	///
	/// The order is returned as stored; compensation happens
	/// asynchronously once the event is consumed.
	pub async fn read_order(&self, order_id: &str) -> Result<Order, WatchdogError> {
		let order = self
			.state_machine
			.get_order(order_id)
			.await
			.map_err(|e| match e {
				OrderStateError::OrderNotFound(id) => WatchdogError::OrderNotFound(id),
				other => WatchdogError::State(other.to_string()),
			})?;

		if self.is_stalled(&order, current_timestamp()) {
			tracing::warn!(
				order_id = %truncate_id(&order.id),
				status = %order.status,
				"Order stalled, scheduling refund"
			);
			self.event_bus
				.publish(PipelineEvent::Order(OrderEvent::Stalled {
					order_id: order.id.clone(),
				}))
				.ok();
		}

		Ok(order)
	}

	fn is_stalled(&self, order: &Order, now: u64) -> bool {
		order.payment_status == PaymentStatus::Paid
			&& !order.fulfilled
			&& order.status != OrderStatus::Failed
			&& now.saturating_sub(order.updated_at) > self.stall_timeout.as_secs()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use fulfillment_storage::implementations::memory::MemoryStorage;
	use fulfillment_storage::StorageService;
	use rust_decimal::Decimal;
	use tokio::sync::broadcast::error::TryRecvError;

	fn watchdog() -> (StallWatchdog, Arc<OrderStateMachine>, EventBus) {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let state_machine = Arc::new(OrderStateMachine::new(storage));
		let event_bus = EventBus::new(100);
		let watchdog = StallWatchdog::new(
			state_machine.clone(),
			event_bus.clone(),
			Duration::from_secs(300),
		);
		(watchdog, state_machine, event_bus)
	}

	fn paid_order(id: &str, updated_at: u64) -> Order {
		let mut order = Order::new(id.to_string(), Decimal::from(40), Duration::from_secs(1800));
		order.status = OrderStatus::Confirmed;
		order.payment_status = PaymentStatus::Paid;
		order.updated_at = updated_at;
		order
	}

	#[test]
	fn test_stall_rule() {
		let (watchdog, _, _) = watchdog();
		let now = 10_000;

		// Quiet for longer than the timeout
		assert!(watchdog.is_stalled(&paid_order("o", now - 301), now));
		// Exactly at the timeout is not yet stalled
		assert!(!watchdog.is_stalled(&paid_order("o", now - 300), now));
		// Recently updated
		assert!(!watchdog.is_stalled(&paid_order("o", now - 10), now));

		// Unpaid orders never stall
		let mut unpaid = paid_order("o", now - 301);
		unpaid.payment_status = PaymentStatus::Unpaid;
		assert!(!watchdog.is_stalled(&unpaid, now));

		// Fulfilled orders are done
		let mut fulfilled = paid_order("o", now - 301);
		fulfilled.fulfilled = true;
		assert!(!watchdog.is_stalled(&fulfilled, now));

		// Already-failed orders are not re-flagged
		let mut failed = paid_order("o", now - 301);
		failed.status = OrderStatus::Failed;
		assert!(!watchdog.is_stalled(&failed, now));
	}

	#[tokio::test]
	async fn test_read_publishes_stall_event() {
		let (watchdog, state_machine, event_bus) = watchdog();
		let order = paid_order("order-1", current_timestamp() - 301);
		state_machine.store_order(&order).await.unwrap();

		let mut events = event_bus.subscribe();
		let read = watchdog.read_order("order-1").await.unwrap();
		assert_eq!(read.status, OrderStatus::Confirmed);

		match events.try_recv().unwrap() {
			PipelineEvent::Order(OrderEvent::Stalled { order_id }) => {
				assert_eq!(order_id, "order-1");
			}
			other => panic!("unexpected event: {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_read_of_healthy_order_is_silent() {
		let (watchdog, state_machine, event_bus) = watchdog();
		let order = paid_order("order-1", current_timestamp());
		state_machine.store_order(&order).await.unwrap();

		let mut events = event_bus.subscribe();
		watchdog.read_order("order-1").await.unwrap();
		assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
	}

	#[tokio::test]
	async fn test_read_missing_order() {
		let (watchdog, _, _) = watchdog();
		let result = watchdog.read_order("ghost").await;
		assert!(matches!(result, Err(WatchdogError::OrderNotFound(_))));
	}
}
