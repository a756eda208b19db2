//! Builder pattern for constructing fulfillment engines.
//!
//! Provides a way to compose a FulfillmentEngine from pluggable storage,
//! queue, and payment implementations using factory functions keyed by
//! the implementation names in the configuration.

use crate::engine::{event_bus::EventBus, FulfillmentEngine};
use fulfillment_config::Config;
use fulfillment_payment::{PaymentError, PaymentGateway, PaymentService};
use fulfillment_queue::{JobQueueService, QueueError, QueueInterface, QueueLimits};
use fulfillment_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Container for all factory functions needed to build a FulfillmentEngine.
///
/// Each factory takes the implementation's TOML configuration value and
/// returns the boxed implementation. Queue factories additionally receive
/// the limits derived from the top-level queue configuration.
pub struct FulfillmentFactories<SF, QF, PF> {
	pub storage_factories: HashMap<String, SF>,
	pub queue_factories: HashMap<String, QF>,
	pub payment_factories: HashMap<String, PF>,
}

/// Builder for constructing a FulfillmentEngine with pluggable implementations.
pub struct FulfillmentBuilder {
	config: Config,
}

impl FulfillmentBuilder {
	/// Creates a new FulfillmentBuilder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the FulfillmentEngine using factories for each component type.
	pub fn build<SF, QF, PF>(
		self,
		factories: FulfillmentFactories<SF, QF, PF>,
	) -> Result<FulfillmentEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		QF: Fn(&toml::Value, &QueueLimits) -> Result<Box<dyn QueueInterface>, QueueError>,
		PF: Fn(&toml::Value) -> Result<Box<dyn PaymentGateway>, PaymentError>,
	{
		// Create storage implementations
		let mut storage_impls = HashMap::new();
		for (name, config) in &self.config.storage.implementations {
			if let Some(factory) = factories.storage_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						// Validation already happened in the factory
						storage_impls.insert(name.clone(), implementation);
						let is_primary = &self.config.storage.primary == name;
						tracing::info!(component = "storage", implementation = %name, enabled = %is_primary, "Loaded");
					}
					Err(e) => {
						tracing::error!(
							component = "storage",
							implementation = %name,
							error = %e,
							"Failed to create storage implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create storage implementation '{}': {}",
							name, e
						)));
					}
				}
			}
		}

		if storage_impls.is_empty() {
			return Err(BuilderError::Config(
				"No valid storage implementations available".into(),
			));
		}

		let primary_storage = &self.config.storage.primary;
		let storage_backend = storage_impls.remove(primary_storage).ok_or_else(|| {
			BuilderError::Config(format!(
				"Primary storage '{}' failed to load or has invalid configuration",
				primary_storage
			))
		})?;
		let storage = Arc::new(StorageService::new(storage_backend));

		// Create queue implementations
		let limits = QueueLimits {
			concurrency: self.config.queue.concurrency,
			lease_timeout: Duration::from_secs(self.config.queue.lease_timeout_seconds),
		};

		let mut queue_impls = HashMap::new();
		for (name, config) in &self.config.queue.implementations {
			if let Some(factory) = factories.queue_factories.get(name) {
				match factory(config, &limits) {
					Ok(implementation) => {
						queue_impls.insert(name.clone(), implementation);
						let is_primary = &self.config.queue.primary == name;
						tracing::info!(component = "queue", implementation = %name, enabled = %is_primary, "Loaded");
					}
					Err(e) => {
						tracing::error!(
							component = "queue",
							implementation = %name,
							error = %e,
							"Failed to create queue implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create queue implementation '{}': {}",
							name, e
						)));
					}
				}
			}
		}

		if queue_impls.is_empty() {
			return Err(BuilderError::Config(
				"No queue implementations available".to_string(),
			));
		}

		let primary_queue = &self.config.queue.primary;
		let queue_backend = queue_impls.remove(primary_queue).ok_or_else(|| {
			BuilderError::Config(format!(
				"Primary queue '{}' failed to load or has invalid configuration",
				primary_queue
			))
		})?;
		let queue = Arc::new(JobQueueService::new(queue_backend));

		// Create payment implementations
		let mut payment_impls = HashMap::new();
		for (name, config) in &self.config.payment.implementations {
			if let Some(factory) = factories.payment_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						payment_impls.insert(name.clone(), implementation);
						let is_primary = &self.config.payment.primary == name;
						tracing::info!(component = "payment", implementation = %name, enabled = %is_primary, "Loaded");
					}
					Err(e) => {
						tracing::error!(
							component = "payment",
							implementation = %name,
							error = %e,
							"Failed to create payment implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create payment implementation '{}': {}",
							name, e
						)));
					}
				}
			}
		}

		if payment_impls.is_empty() {
			return Err(BuilderError::Config(
				"No payment implementations available".to_string(),
			));
		}

		let primary_payment = &self.config.payment.primary;
		let payment_backend = payment_impls.remove(primary_payment).ok_or_else(|| {
			BuilderError::Config(format!(
				"Primary payment gateway '{}' failed to load or has invalid configuration",
				primary_payment
			))
		})?;
		let payment = Arc::new(PaymentService::new(payment_backend));

		Ok(FulfillmentEngine::new(
			self.config,
			storage,
			queue,
			payment,
			EventBus::new(1000),
		))
	}
}
