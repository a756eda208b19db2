//! Configuration module for the order fulfillment pipeline.
//!
//! This module provides structures and utilities for managing pipeline
//! configuration. It supports loading configuration from TOML files with
//! environment variable resolution and validates that all required values
//! are properly set before the pipeline starts.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the fulfillment pipeline.
///
/// This structure contains all configuration sections required for the
/// pipeline to operate: pipeline identity and timing, the storage backend,
/// the job queue, the payment gateway, and the worker pool.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Configuration specific to this pipeline instance.
	pub pipeline: PipelineConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Configuration for the job queue.
	pub queue: QueueConfig,
	/// Configuration for the payment gateway.
	pub payment: PaymentConfig,
	/// Configuration for the worker pool.
	#[serde(default)]
	pub workers: WorkerConfig,
}

/// Configuration specific to this pipeline instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
	/// Unique identifier for this pipeline instance.
	pub id: String,
	/// Simulated duration of each fulfillment stage, in seconds.
	/// Defaults to 10 seconds if not specified.
	#[serde(default = "default_stage_delay_seconds")]
	pub stage_delay_seconds: u64,
	/// Age of the last order update after which a paid, undelivered order
	/// counts as stalled. Defaults to 300 seconds (5 minutes).
	#[serde(default = "default_stall_timeout_seconds")]
	pub stall_timeout_seconds: u64,
	/// Window after order creation during which payment is accepted.
	/// Defaults to 1800 seconds (30 minutes).
	#[serde(default = "default_payment_window_seconds")]
	pub payment_window_seconds: u64,
}

/// Returns the default stage delay in seconds.
fn default_stage_delay_seconds() -> u64 {
	10
}

/// Returns the default stall timeout in seconds.
fn default_stall_timeout_seconds() -> u64 {
	300 // 5 minutes
}

/// Returns the default payment window in seconds.
fn default_payment_window_seconds() -> u64 {
	1800 // 30 minutes
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the job queue.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Maximum number of stage jobs executing at once, enforced by the
	/// queue regardless of worker pool size. Defaults to 4.
	#[serde(default = "default_queue_concurrency")]
	pub concurrency: usize,
	/// Seconds a leased job stays invisible before it is handed out again.
	/// Defaults to 60 seconds.
	#[serde(default = "default_lease_timeout_seconds")]
	pub lease_timeout_seconds: u64,
	/// Map of queue implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Returns the default queue concurrency limit.
fn default_queue_concurrency() -> usize {
	4
}

/// Returns the default lease timeout in seconds.
fn default_lease_timeout_seconds() -> u64 {
	60
}

/// Configuration for the payment gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of payment implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the worker pool.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
	/// Number of worker tasks leasing jobs from the queue.
	/// Defaults to 4.
	#[serde(default = "default_worker_count")]
	pub count: usize,
	/// How long an idle worker waits before polling the queue again,
	/// in milliseconds. Defaults to 250.
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
	fn default() -> Self {
		Self {
			count: default_worker_count(),
			poll_interval_ms: default_poll_interval_ms(),
		}
	}
}

/// Returns the default worker count.
fn default_worker_count() -> usize {
	4
}

/// Returns the default idle poll interval in milliseconds.
fn default_poll_interval_ms() -> u64 {
	250
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	// Limit input size to prevent ReDoS attacks
	const MAX_INPUT_SIZE: usize = 1024 * 1024; // 1MB
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let full_match = cap.get(0).unwrap();
		let var_name = cap.get(1).unwrap().as_str();
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name) {
			Ok(v) => v,
			Err(_) => {
				if let Some(default) = default_value {
					default.to_string()
				} else {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name
					)));
				}
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file.
	pub fn from_file(path: &str) -> Result<Self, ConfigError> {
		let contents = std::fs::read_to_string(path)?;
		contents.parse()
	}

	/// Loads configuration from a file without blocking the runtime.
	pub async fn from_file_async(path: &str) -> Result<Self, ConfigError> {
		let contents = tokio::fs::read_to_string(path).await?;
		contents.parse()
	}

	/// Validates the configuration to ensure all required fields are properly set.
	///
	/// This method checks every section:
	/// - Ensures the pipeline ID is not empty and timing values are usable
	/// - Validates that each backend section names a configured primary
	/// - Checks queue concurrency and worker pool sizing
	fn validate(&self) -> Result<(), ConfigError> {
		// Validate pipeline config
		if self.pipeline.id.is_empty() {
			return Err(ConfigError::Validation(
				"Pipeline ID cannot be empty".into(),
			));
		}
		if self.pipeline.stall_timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"stall_timeout_seconds must be greater than 0".into(),
			));
		}
		if self.pipeline.payment_window_seconds == 0 {
			return Err(ConfigError::Validation(
				"payment_window_seconds must be greater than 0".into(),
			));
		}

		// Validate storage config
		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if self.storage.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Storage primary implementation cannot be empty".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}

		// Validate queue config
		if self.queue.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one queue implementation must be configured".into(),
			));
		}
		if self.queue.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Queue primary implementation cannot be empty".into(),
			));
		}
		if !self.queue.implementations.contains_key(&self.queue.primary) {
			return Err(ConfigError::Validation(format!(
				"Primary queue '{}' not found in implementations",
				self.queue.primary
			)));
		}
		if self.queue.concurrency == 0 {
			return Err(ConfigError::Validation(
				"Queue concurrency must be at least 1".into(),
			));
		}
		if self.queue.lease_timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"lease_timeout_seconds must be greater than 0".into(),
			));
		}

		// Validate payment config
		if self.payment.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one payment implementation must be configured".into(),
			));
		}
		if self.payment.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Payment primary implementation cannot be empty".into(),
			));
		}
		if !self
			.payment
			.implementations
			.contains_key(&self.payment.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary payment gateway '{}' not found in implementations",
				self.payment.primary
			)));
		}

		// Validate worker pool config
		if self.workers.count == 0 {
			return Err(ConfigError::Validation(
				"Worker count must be at least 1".into(),
			));
		}
		if self.workers.poll_interval_ms == 0 {
			return Err(ConfigError::Validation(
				"poll_interval_ms must be greater than 0".into(),
			));
		}

		Ok(())
	}
}

/// Implementation of FromStr trait for Config to enable parsing from string.
///
/// Environment variables are resolved and the configuration is automatically
/// validated after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn minimal_config() -> String {
		r#"
[pipeline]
id = "fulfillment-test"

[storage]
primary = "memory"
[storage.implementations.memory]

[queue]
primary = "memory"
[queue.implementations.memory]

[payment]
primary = "simulated"
[payment.implementations.simulated]
approval_rate = 1.0
"#
		.to_string()
	}

	#[test]
	fn test_env_var_resolution() {
		// Set up test environment variables
		std::env::set_var("TEST_DATA_DIR", "/var/lib/orders");
		std::env::set_var("TEST_PIPELINE_NAME", "east-1");

		let input = "storage_path = \"${TEST_DATA_DIR}/${TEST_PIPELINE_NAME}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "storage_path = \"/var/lib/orders/east-1\"");

		// Clean up
		std::env::remove_var("TEST_DATA_DIR");
		std::env::remove_var("TEST_PIPELINE_NAME");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("MISSING_VAR"));
	}

	#[test]
	fn test_config_with_env_vars() {
		std::env::set_var("TEST_FULFILLMENT_ID", "fulfillment-east");

		let config_str = r#"
[pipeline]
id = "${TEST_FULFILLMENT_ID}"
stage_delay_seconds = 10
stall_timeout_seconds = 300
payment_window_seconds = 1800

[storage]
primary = "file"
[storage.implementations.file]
storage_path = "${TEST_ORDERS_DIR:-./data/orders}"

[queue]
primary = "memory"
concurrency = 4
lease_timeout_seconds = 60
[queue.implementations.memory]
max_failed_jobs = 10

[payment]
primary = "simulated"
[payment.implementations.simulated]
approval_rate = 0.9

[workers]
count = 4
poll_interval_ms = 250
"#;

		let config: Config = config_str.parse().unwrap();
		assert_eq!(config.pipeline.id, "fulfillment-east");
		let file_impl = &config.storage.implementations["file"];
		assert_eq!(
			file_impl.get("storage_path").and_then(|v| v.as_str()),
			Some("./data/orders")
		);

		// Clean up
		std::env::remove_var("TEST_FULFILLMENT_ID");
	}

	#[test]
	fn test_defaults_applied() {
		let config: Config = minimal_config().parse().unwrap();
		assert_eq!(config.pipeline.stage_delay_seconds, 10);
		assert_eq!(config.pipeline.stall_timeout_seconds, 300);
		assert_eq!(config.pipeline.payment_window_seconds, 1800);
		assert_eq!(config.queue.concurrency, 4);
		assert_eq!(config.queue.lease_timeout_seconds, 60);
		assert_eq!(config.workers.count, 4);
		assert_eq!(config.workers.poll_interval_ms, 250);
	}

	#[test]
	fn test_zero_concurrency_rejected() {
		let config_str = minimal_config().replace(
			"[queue]\nprimary = \"memory\"",
			"[queue]\nprimary = \"memory\"\nconcurrency = 0",
		);
		let result = Config::from_str(&config_str);
		assert!(result.is_err());
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("concurrency must be at least 1"));
	}

	#[test]
	fn test_unknown_primary_rejected() {
		let config_str = minimal_config().replace(
			"[queue]\nprimary = \"memory\"",
			"[queue]\nprimary = \"redis\"",
		);
		let result = Config::from_str(&config_str);
		assert!(result.is_err());
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("Primary queue 'redis' not found"));
	}

	#[test]
	fn test_zero_workers_rejected() {
		let config_str = format!("{}\n[workers]\ncount = 0\n", minimal_config());
		let result = Config::from_str(&config_str);
		assert!(result.is_err());
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("Worker count must be at least 1"));
	}

	#[test]
	fn test_empty_pipeline_id_rejected() {
		let config_str = minimal_config().replace("id = \"fulfillment-test\"", "id = \"\"");
		let result = Config::from_str(&config_str);
		assert!(result.is_err());
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("Pipeline ID cannot be empty"));
	}
}
