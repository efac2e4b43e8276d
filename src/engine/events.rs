// Event system for template lifecycle notifications

//! # Event System
//!
//! The controller announces two things: a template was saved, and a template
//! was deleted. It does so through the [`TemplateNotifier`] trait so tests
//! can plug in a recorder, while the default [`EventBus`] fans events out over
//! a tokio broadcast channel to UI sessions, caches and anything else that
//! subscribes.
//!
//! Events are published after the store write has completed, at most once
//! per successful call. A failing notifier never rolls back the write.

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use crate::models::{ServerTemplate, TemplateEvent};
use crate::Result;

/// Something that wants to hear about committed template changes
#[async_trait::async_trait]
pub trait TemplateNotifier: Send + Sync {
    async fn notify(&self, event: TemplateEvent) -> Result<()>;
}

/// Default buffer per subscriber before slow receivers start lagging
pub const DEFAULT_EVENT_BUFFER: usize = 1000;

/// Event bus for publishing and subscribing to template events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TemplateEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_BUFFER)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Having no subscribers is not an error; the event is simply dropped.
    pub async fn publish(&self, event: TemplateEvent) -> Result<()> {
        let receivers = self.sender.send(event.clone()).unwrap_or(0);
        debug!(
            event_id = %event.id,
            server_template_id = event.server_template_id(),
            receivers,
            "Template event published"
        );
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TemplateEvent> {
        self.sender.subscribe()
    }

    /// Subscribe as a `Stream`, for consumers built on `StreamExt`
    pub fn stream(&self) -> BroadcastStream<TemplateEvent> {
        BroadcastStream::new(self.sender.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub async fn emit_template_updated(&self, template: &ServerTemplate) -> Result<()> {
        self.publish(TemplateEvent::updated(template.clone())).await
    }

    pub async fn emit_template_deleted(&self, server_template_id: &str) -> Result<()> {
        self.publish(TemplateEvent::deleted(server_template_id)).await
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TemplateNotifier for EventBus {
    async fn notify(&self, event: TemplateEvent) -> Result<()> {
        self.publish(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TemplateEventKind;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.emit_template_deleted("tpl").await.is_ok());
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_events_in_order() {
        let bus = EventBus::with_capacity(16);
        let mut first = bus.subscribe();
        let second = bus.stream();

        bus.emit_template_updated(&ServerTemplate::new("tpl", "Template"))
            .await
            .unwrap();
        bus.emit_template_deleted("tpl").await.unwrap();

        let event = first.recv().await.unwrap();
        assert!(matches!(event.kind, TemplateEventKind::Updated { ref template } if template.id == "tpl"));
        let event = first.recv().await.unwrap();
        assert!(matches!(event.kind, TemplateEventKind::Deleted { ref server_template_id } if server_template_id == "tpl"));

        let streamed: Vec<_> = second.take(2).collect().await;
        assert_eq!(streamed.len(), 2);
        assert!(streamed.iter().all(|event| event.is_ok()));
    }
}
