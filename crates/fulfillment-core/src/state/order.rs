//! Order state machine implementation.
//!
//! Manages order state transitions with validation, ensuring orders move
//! through valid lifecycle states: Pending -> Paid -> Confirmed -> Cooked ->
//! Completed, with Failed reachable from every non-terminal state. Every
//! persisted update flows through this machine so updated_at stays accurate.

use fulfillment_storage::{StorageError, StorageService};
use fulfillment_types::{Order, OrderStatus, StorageKey};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors that can occur during order state management.
///
/// These errors represent failures in storage operations,
/// invalid state transitions, missing orders, or time-related issues.
#[derive(Debug, Error)]
pub enum OrderStateError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Invalid state transition from {from:?} to {to:?}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	#[error("Order not found: {0}")]
	OrderNotFound(String),
	#[error("Time error: {0}")]
	TimeError(String),
}

impl OrderStateError {
	fn from_storage(order_id: &str, err: StorageError) -> Self {
		match err {
			StorageError::NotFound => OrderStateError::OrderNotFound(order_id.to_string()),
			other => OrderStateError::Storage(other.to_string()),
		}
	}
}

/// Manages order state transitions and persistence
pub struct OrderStateMachine {
	storage: Arc<StorageService>,
}

impl OrderStateMachine {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Updates an order with a closure and persists it
	pub async fn update_order_with<F>(
		&self,
		order_id: &str,
		updater: F,
	) -> Result<Order, OrderStateError>
	where
		F: FnOnce(&mut Order),
	{
		let mut order: Order = self
			.storage
			.retrieve(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(|e| OrderStateError::from_storage(order_id, e))?;

		// Apply the update
		updater(&mut order);

		// Automatically set updated_at timestamp
		order.updated_at = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map_err(|e| OrderStateError::TimeError(e.to_string()))?
			.as_secs();

		self.storage
			.update(StorageKey::Orders.as_str(), order_id, &order)
			.await
			.map_err(|e| OrderStateError::from_storage(order_id, e))?;

		Ok(order)
	}

	/// Transitions an order to a new status with validation, applying
	/// additional field updates in the same persisted write
	pub async fn transition_order_with<F>(
		&self,
		order_id: &str,
		new_status: OrderStatus,
		extra: F,
	) -> Result<Order, OrderStateError>
	where
		F: FnOnce(&mut Order),
	{
		let order: Order = self
			.storage
			.retrieve(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(|e| OrderStateError::from_storage(order_id, e))?;

		// Validate state transition
		if !Self::is_valid_transition(order.status, new_status) {
			return Err(OrderStateError::InvalidTransition {
				from: order.status,
				to: new_status,
			});
		}

		self.update_order_with(order_id, |o| {
			o.status = new_status;
			extra(o);
		})
		.await
	}

	/// Transitions an order to a new status with validation
	pub async fn transition_order_status(
		&self,
		order_id: &str,
		new_status: OrderStatus,
	) -> Result<Order, OrderStateError> {
		self.transition_order_with(order_id, new_status, |_| {}).await
	}

	/// Checks if a state transition is valid
	fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
		// Static transition table - each state maps to allowed next states
		static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
			let mut m = HashMap::new();
			m.insert(
				OrderStatus::Pending,
				HashSet::from([OrderStatus::Paid, OrderStatus::Failed]),
			);
			m.insert(
				OrderStatus::Paid,
				HashSet::from([OrderStatus::Confirmed, OrderStatus::Failed]),
			);
			m.insert(
				OrderStatus::Confirmed,
				HashSet::from([OrderStatus::Cooked, OrderStatus::Failed]),
			);
			m.insert(
				OrderStatus::Cooked,
				HashSet::from([OrderStatus::Completed, OrderStatus::Failed]),
			);
			m.insert(OrderStatus::Completed, HashSet::new()); // terminal
			m.insert(OrderStatus::Failed, HashSet::new()); // terminal
			m
		});

		TRANSITIONS
			.get(&from)
			.is_some_and(|set| set.contains(&to))
	}

	/// Gets an order by ID
	pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderStateError> {
		self.storage
			.retrieve(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(|e| OrderStateError::from_storage(order_id, e))
	}

	/// Stores a new order
	pub async fn store_order(&self, order: &Order) -> Result<(), OrderStateError> {
		self.storage
			.store(StorageKey::Orders.as_str(), &order.id, order)
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use fulfillment_storage::implementations::memory::MemoryStorage;
	use fulfillment_types::PaymentStatus;
	use rust_decimal::Decimal;
	use std::time::Duration;

	fn state_machine() -> OrderStateMachine {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		OrderStateMachine::new(storage)
	}

	fn test_order(id: &str) -> Order {
		Order::new(id.to_string(), Decimal::from(25), Duration::from_secs(1800))
	}

	#[tokio::test]
	async fn test_valid_transition_chain() {
		let machine = state_machine();
		machine.store_order(&test_order("order-1")).await.unwrap();

		for status in [
			OrderStatus::Paid,
			OrderStatus::Confirmed,
			OrderStatus::Cooked,
			OrderStatus::Completed,
		] {
			let order = machine
				.transition_order_status("order-1", status)
				.await
				.unwrap();
			assert_eq!(order.status, status);
		}
	}

	#[tokio::test]
	async fn test_stage_skip_rejected() {
		let machine = state_machine();
		machine.store_order(&test_order("order-1")).await.unwrap();

		let result = machine
			.transition_order_status("order-1", OrderStatus::Confirmed)
			.await;
		assert!(matches!(
			result,
			Err(OrderStateError::InvalidTransition {
				from: OrderStatus::Pending,
				to: OrderStatus::Confirmed,
			})
		));
	}

	#[tokio::test]
	async fn test_terminal_states_are_final() {
		let machine = state_machine();
		machine.store_order(&test_order("order-1")).await.unwrap();
		machine
			.transition_order_status("order-1", OrderStatus::Failed)
			.await
			.unwrap();

		for status in [OrderStatus::Paid, OrderStatus::Completed, OrderStatus::Failed] {
			let result = machine.transition_order_status("order-1", status).await;
			assert!(matches!(
				result,
				Err(OrderStateError::InvalidTransition { .. })
			));
		}
	}

	#[tokio::test]
	async fn test_transition_with_extra_fields() {
		let machine = state_machine();
		machine.store_order(&test_order("order-1")).await.unwrap();

		let order = machine
			.transition_order_with("order-1", OrderStatus::Paid, |o| {
				o.payment_status = PaymentStatus::Paid;
				o.payment_method = Some("card".to_string());
			})
			.await
			.unwrap();
		assert_eq!(order.status, OrderStatus::Paid);
		assert_eq!(order.payment_status, PaymentStatus::Paid);
		assert_eq!(order.payment_method.as_deref(), Some("card"));
	}

	#[tokio::test]
	async fn test_update_refreshes_updated_at() {
		let machine = state_machine();
		let mut order = test_order("order-1");
		order.updated_at = 1_000;
		machine.store_order(&order).await.unwrap();

		let updated = machine
			.update_order_with("order-1", |_| {})
			.await
			.unwrap();
		assert!(updated.updated_at > 1_000);
	}

	#[tokio::test]
	async fn test_missing_order() {
		let machine = state_machine();
		let result = machine.get_order("ghost").await;
		assert!(matches!(
			result,
			Err(OrderStateError::OrderNotFound(id)) if id == "ghost"
		));
	}
}
