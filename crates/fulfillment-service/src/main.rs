//! Main entry point for the order fulfillment service.
//!
//! This binary runs the complete pipeline: it accepts paid orders into the
//! job queue and drives them through the confirm, cook, and deliver stages
//! with a pool of workers. It uses a modular architecture with pluggable
//! implementations for storage, queueing, and payment.

use clap::Parser;
use fulfillment_config::Config;
use fulfillment_core::{FulfillmentBuilder, FulfillmentEngine, FulfillmentFactories};
use std::path::PathBuf;

// Import implementations from individual crates
use fulfillment_payment::implementations::simulated::create_gateway;
use fulfillment_queue::implementations::memory::create_queue;
use fulfillment_storage::implementations::file::create_storage as create_file_storage;
use fulfillment_storage::implementations::memory::create_storage as create_memory_storage;

/// Command-line arguments for the fulfillment service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Main entry point for the fulfillment service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the fulfillment engine with all implementations
/// 5. Runs the engine until interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	// Create env filter with default from args
	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started fulfillment service");

	// Load configuration
	let config_path = args
		.config
		.to_str()
		.ok_or("Configuration path is not valid UTF-8")?;
	let config = Config::from_file_async(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.pipeline.id);

	// Build the engine with implementations and run until interrupted
	let engine = build_engine(config)?;
	engine.run().await?;

	tracing::info!("Stopped fulfillment service");
	Ok(())
}

/// Macro to create a factory HashMap with the appropriate type aliases
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};

    // Variant for queue factories that also receive the queue limits
    ($interface:path, $error:path, limits, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value, &fulfillment_queue::QueueLimits) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Builds the fulfillment engine with all necessary implementations.
///
/// This function wires up the concrete implementations for:
/// - Storage backends (in-memory, file)
/// - Job queues (in-memory with lease tracking)
/// - Payment gateways (simulated)
fn build_engine(config: Config) -> Result<FulfillmentEngine, Box<dyn std::error::Error>> {
	let builder = FulfillmentBuilder::new(config);

	// Storage factories (simple config-only interface)
	let storage_factories = create_factory_map!(
		fulfillment_storage::StorageInterface,
		fulfillment_storage::StorageError,
		"file" => create_file_storage,
		"memory" => create_memory_storage,
	);

	// Queue factories (config + limits)
	let queue_factories = create_factory_map!(
		fulfillment_queue::QueueInterface,
		fulfillment_queue::QueueError,
		limits,
		"memory" => create_queue,
	);

	// Payment factories (simple config-only interface)
	let payment_factories = create_factory_map!(
		fulfillment_payment::PaymentGateway,
		fulfillment_payment::PaymentError,
		"simulated" => create_gateway,
	);

	let factories = FulfillmentFactories {
		storage_factories,
		queue_factories,
		payment_factories,
	};

	Ok(builder.build(factories)?)
}
