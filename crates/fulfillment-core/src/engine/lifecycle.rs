//! Process shutdown signal handling.

use std::future::pending;

/// Waits for SIGINT (Ctrl+C) or, on unix, SIGTERM.
///
/// If a signal handler cannot be installed the future never resolves;
/// the engine then only stops when its runtime is torn down.
pub(crate) async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			tracing::error!("Failed to install Ctrl+C handler: {}", e);
			pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut signal) => {
				signal.recv().await;
			}
			Err(e) => {
				tracing::error!("Failed to install SIGTERM handler: {}", e);
				pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = pending::<()>();

	tokio::select! {
		_ = ctrl_c => {
			tracing::info!("Received Ctrl+C, shutting down");
		}
		_ = terminate => {
			tracing::info!("Received SIGTERM, shutting down");
		}
	}
}
