//! Simulated payment gateway implementation for the fulfillment pipeline.
//!
//! This module provides a deterministic stand-in for a real payment
//! gateway. Instead of sampling randomness, it approves a fixed share of
//! submissions per rotation of a counter, so a configured approval rate of
//! 0.9 approves exactly nine out of every ten submissions. This keeps
//! development runs and tests reproducible.

use crate::{PaymentError, PaymentGateway, PaymentOutcome};
use async_trait::async_trait;
use fulfillment_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};

/// Length of the approval rotation.
const CYCLE: u64 = 10;

/// Deterministic gateway approving a fixed share of submissions.
pub struct SimulatedGateway {
	/// How many submissions per rotation are approved.
	approved_per_cycle: u64,
	/// Position in the rotation.
	counter: AtomicU64,
}

impl SimulatedGateway {
	/// Creates a new SimulatedGateway approving the given share of
	/// submissions, rounded to tenths and clamped to [0.0, 1.0].
	pub fn new(approval_rate: f64) -> Self {
		let clamped = approval_rate.clamp(0.0, 1.0);
		Self {
			approved_per_cycle: (clamped * CYCLE as f64).round() as u64,
			counter: AtomicU64::new(0),
		}
	}
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SimulatedGatewaySchema)
	}

	async fn submit(
		&self,
		order_id: &str,
		_amount: Decimal,
	) -> Result<PaymentOutcome, PaymentError> {
		let position = self.counter.fetch_add(1, Ordering::Relaxed) % CYCLE;
		if position < self.approved_per_cycle {
			Ok(PaymentOutcome::Approved {
				reference: format!("inv-{}", order_id),
			})
		} else {
			Ok(PaymentOutcome::Declined {
				reason: "declined by issuer".to_string(),
			})
		}
	}
}

/// Configuration schema for SimulatedGateway.
pub struct SimulatedGatewaySchema;

impl ConfigSchema for SimulatedGatewaySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![], // No required fields
			vec![Field::new(
				"approval_rate",
				FieldType::Float {
					min: Some(0.0),
					max: Some(1.0),
				},
			)],
		);

		schema.validate(config)
	}
}

/// Factory function to create a simulated gateway from configuration.
///
/// Configuration parameters:
/// - `approval_rate`: Share of submissions approved per rotation of ten
///   (default: 0.9)
pub fn create_gateway(config: &toml::Value) -> Result<Box<dyn PaymentGateway>, PaymentError> {
	SimulatedGatewaySchema
		.validate(config)
		.map_err(|e| PaymentError::Configuration(e.to_string()))?;

	let approval_rate = match config.get("approval_rate") {
		Some(toml::Value::Float(f)) => *f,
		Some(toml::Value::Integer(i)) => *i as f64,
		_ => 0.9,
	};

	Ok(Box::new(SimulatedGateway::new(approval_rate)))
}
