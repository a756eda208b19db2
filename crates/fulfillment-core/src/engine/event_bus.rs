//! Broadcast bus for pipeline events.
//!
//! Thin wrapper over a tokio broadcast channel. Publishing is
//! fire-and-forget for most producers; an error only means nobody is
//! currently subscribed.

use fulfillment_types::PipelineEvent;
use tokio::sync::broadcast;

/// Event bus connecting the pipeline components to the engine loop.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Publishes an event to all current subscribers.
	pub fn publish(
		&self,
		event: PipelineEvent,
	) -> Result<(), broadcast::error::SendError<PipelineEvent>> {
		self.sender.send(event).map(|_| ())
	}

	/// Creates a new subscription receiving events published from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
		self.sender.subscribe()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use fulfillment_types::{JobEvent, OrderEvent};

	#[tokio::test]
	async fn test_event_reaches_all_subscribers() {
		let bus = EventBus::new(16);
		let mut first = bus.subscribe();
		let mut second = bus.subscribe();

		bus.publish(PipelineEvent::Order(OrderEvent::Stalled {
			order_id: "order-1".to_string(),
		}))
		.unwrap();

		for receiver in [&mut first, &mut second] {
			match receiver.recv().await.unwrap() {
				PipelineEvent::Order(OrderEvent::Stalled { order_id }) => {
					assert_eq!(order_id, "order-1");
				}
				other => panic!("unexpected event: {:?}", other),
			}
		}
	}

	#[tokio::test]
	async fn test_publish_without_subscribers_is_an_error() {
		let bus = EventBus::new(16);
		let result = bus.publish(PipelineEvent::Job(JobEvent::Completed {
			job_id: 1,
			message: "done".to_string(),
		}));
		assert!(result.is_err());
	}
}
