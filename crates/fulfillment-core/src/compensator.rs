//! Refund compensation for stalled orders.
//!
//! When the watchdog flags a stalled order, the compensator fails the
//! order and records a full refund of the captured amount in the same
//! persisted write. Compensation is best-effort and idempotent: an order
//! that already reached a terminal state is left alone.

use crate::engine::event_bus::EventBus;
use crate::state::{OrderStateError, OrderStateMachine};
use fulfillment_types::{
	current_timestamp, truncate_id, OrderEvent, OrderStatus, PipelineEvent, RefundStatus,
};
use std::sync::Arc;
use tracing::instrument;

/// Compensator that refunds and fails orders flagged as stalled.
pub struct RefundCompensator {
	state_machine: Arc<OrderStateMachine>,
	event_bus: EventBus,
}

impl RefundCompensator {
	pub fn new(state_machine: Arc<OrderStateMachine>, event_bus: EventBus) -> Self {
		Self {
			state_machine,
			event_bus,
		}
	}

	/// Fails the order and records the refund.
	///
	/// Runs off the event loop, so failures are logged rather than
	/// returned. Orders already in a terminal state are skipped.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn compensate(&self, order_id: &str) {
		let order = match self.state_machine.get_order(order_id).await {
			Ok(order) => order,
			Err(e) => {
				tracing::warn!("Failed to load order for compensation: {}", e);
				return;
			}
		};

		let amount = order.total_amount;
		let result = self
			.state_machine
			.transition_order_with(order_id, OrderStatus::Failed, |o| {
				o.refund.status = RefundStatus::Paid;
				o.refund.amount = amount;
				o.refund.refunded_at = Some(current_timestamp());
			})
			.await;

		match result {
			Ok(_) => {
				tracing::info!(%amount, "Order failed and refund issued");
				self.event_bus
					.publish(PipelineEvent::Order(OrderEvent::Compensated {
						order_id: order.id,
					}))
					.ok();
			}
			Err(OrderStateError::InvalidTransition { from, to }) => {
				tracing::debug!(%from, %to, "Order already settled, skipping refund");
			}
			Err(e) => {
				tracing::warn!("Failed to compensate order: {}", e);
			}
		}
	}
}
