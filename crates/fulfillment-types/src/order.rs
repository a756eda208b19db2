//! Order types for the fulfillment pipeline.
//!
//! This module defines the order record persisted by the pipeline together
//! with its status enums and the refund sub-record written by compensation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::utils::current_timestamp;

/// A customer order moving through the fulfillment pipeline.
///
/// The record is created at checkout and then advanced stage by stage until
/// it is delivered, or marked failed and refunded by compensation. All
/// timestamps are unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier for this order.
	pub id: String,
	/// Current fulfillment status of the order.
	pub status: OrderStatus,
	/// Outcome of payment processing for this order.
	pub payment_status: PaymentStatus,
	/// True once the order has been delivered. Holds exactly when
	/// `status` is [`OrderStatus::Completed`].
	pub fulfilled: bool,
	/// Total amount charged for the order.
	pub total_amount: Decimal,
	/// Payment method recorded at checkout.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub payment_method: Option<String>,
	/// Gateway reference for the accepted payment.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub invoice_id: Option<String>,
	/// Refund record, written only by the compensator.
	#[serde(default)]
	pub refund: Refund,
	/// Timestamp when this order was created.
	pub created_at: u64,
	/// Timestamp when this order was last updated.
	pub updated_at: u64,
	/// Deadline after which payment is no longer accepted.
	pub expired_at: u64,
	/// Timestamp when the order was delivered.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub delivered_at: Option<u64>,
}

impl Order {
	/// Creates a pending, unpaid order with the payment deadline derived
	/// from the given window.
	pub fn new(id: String, total_amount: Decimal, payment_window: Duration) -> Self {
		let now = current_timestamp();
		Self {
			id,
			status: OrderStatus::Pending,
			payment_status: PaymentStatus::Unpaid,
			fulfilled: false,
			total_amount,
			payment_method: None,
			invoice_id: None,
			refund: Refund::default(),
			created_at: now,
			updated_at: now,
			expired_at: now + payment_window.as_secs(),
			delivered_at: None,
		}
	}
}

/// Status of an order in the fulfillment pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
	/// Order has been created but payment has not been accepted.
	Pending,
	/// Payment accepted; the first stage job has been enqueued.
	Paid,
	/// The restaurant confirmed the order.
	Confirmed,
	/// The kitchen finished preparing the order.
	Cooked,
	/// Order has been delivered.
	Completed,
	/// Order was abandoned by the pipeline and will not progress.
	Failed,
}

impl OrderStatus {
	/// True for statuses no stage or compensation may move away from.
	pub fn is_terminal(&self) -> bool {
		matches!(self, OrderStatus::Completed | OrderStatus::Failed)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OrderStatus::Pending => write!(f, "pending"),
			OrderStatus::Paid => write!(f, "paid"),
			OrderStatus::Confirmed => write!(f, "confirmed"),
			OrderStatus::Cooked => write!(f, "cooked"),
			OrderStatus::Completed => write!(f, "completed"),
			OrderStatus::Failed => write!(f, "failed"),
		}
	}
}

/// Outcome of payment processing for an order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
	/// No payment has been accepted yet.
	Unpaid,
	/// The gateway approved the payment.
	Paid,
	/// The gateway declined the most recent payment attempt.
	Failed,
}

impl fmt::Display for PaymentStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PaymentStatus::Unpaid => write!(f, "unpaid"),
			PaymentStatus::Paid => write!(f, "paid"),
			PaymentStatus::Failed => write!(f, "failed"),
		}
	}
}

/// Refund record attached to an order.
///
/// A paid refund implies the order status is [`OrderStatus::Failed`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
	/// Current refund status.
	pub status: RefundStatus,
	/// Amount refunded to the customer.
	pub amount: Decimal,
	/// Timestamp when the refund was issued.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub refunded_at: Option<u64>,
}

impl Default for Refund {
	fn default() -> Self {
		Self {
			status: RefundStatus::Uninitiated,
			amount: Decimal::ZERO,
			refunded_at: None,
		}
	}
}

/// Status of the refund attached to an order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
	/// No refund has been issued.
	Uninitiated,
	/// The refund has been paid back to the customer.
	Paid,
}

impl fmt::Display for RefundStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RefundStatus::Uninitiated => write!(f, "uninitiated"),
			RefundStatus::Paid => write!(f, "paid"),
		}
	}
}
