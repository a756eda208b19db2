//! Payment gateway module for the order fulfillment pipeline.
//!
//! This module provides abstractions for submitting order payments to a
//! gateway. It defines the interface payment implementations integrate
//! through and a service wrapper used by checkout. A declined payment is a
//! normal outcome here, not an error; errors are reserved for gateway
//! failures.

use async_trait::async_trait;
use fulfillment_types::ConfigSchema;
use rust_decimal::Decimal;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod simulated;
}

/// Errors that can occur during payment operations.
#[derive(Debug, Error)]
pub enum PaymentError {
	/// Error that occurs when interacting with the gateway implementation.
	#[error("Implementation error: {0}")]
	Implementation(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Result of a payment submission the gateway actually processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
	/// The gateway approved the payment.
	Approved {
		/// Gateway reference recorded on the order as its invoice id.
		reference: String,
	},
	/// The gateway declined the payment.
	Declined {
		/// Reason given by the gateway.
		reason: String,
	},
}

/// Trait defining the interface for payment gateway implementations.
///
/// This trait must be implemented by any payment gateway that wants to
/// integrate with the pipeline. Implementations decide whether a submission
/// is approved or declined; checkout handles everything around that call.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
	/// Returns the configuration schema for this gateway implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Submits a payment for the given order and amount.
	async fn submit(&self, order_id: &str, amount: Decimal)
		-> Result<PaymentOutcome, PaymentError>;
}

/// Type alias for payment factory functions.
///
/// This is the function signature that all payment implementations must
/// provide to create instances of their gateway interface.
pub type PaymentFactory = fn(&toml::Value) -> Result<Box<dyn PaymentGateway>, PaymentError>;

/// Service that manages payment submissions.
///
/// This struct provides a high-level interface for payment processing,
/// wrapping an underlying gateway implementation.
pub struct PaymentService {
	/// The underlying payment gateway implementation.
	implementation: Box<dyn PaymentGateway>,
}

impl PaymentService {
	/// Creates a new PaymentService with the specified implementation.
	pub fn new(implementation: Box<dyn PaymentGateway>) -> Self {
		Self { implementation }
	}

	/// Submits a payment for the given order and amount.
	pub async fn submit(
		&self,
		order_id: &str,
		amount: Decimal,
	) -> Result<PaymentOutcome, PaymentError> {
		self.implementation.submit(order_id, amount).await
	}
}
