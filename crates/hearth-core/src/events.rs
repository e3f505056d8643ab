use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::Task;

/// Domain events emitted by task operations and the generation coordinator,
/// consumed by history/notification collaborators. Fire-and-forget,
/// at-least-once delivery is acceptable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DomainEvent {
    #[serde(rename = "task.created")]
    TaskCreated { actor: Option<Uuid>, task: Task },
    #[serde(rename = "task.updated")]
    TaskUpdated {
        actor: Option<Uuid>,
        before: Task,
        after: Task,
    },
    #[serde(rename = "task.completed")]
    TaskCompleted { actor: Option<Uuid>, task: Task },
    #[serde(rename = "task.deleted")]
    TaskDeleted { actor: Option<Uuid>, task: Task },
    #[serde(rename = "task.bulk-updated")]
    TaskBulkUpdated {
        actor: Option<Uuid>,
        task_ids: Vec<Uuid>,
    },
    #[serde(rename = "recurring.skipped")]
    RecurringSkipped {
        actor: Option<Uuid>,
        series_id: Uuid,
        date: NaiveDate,
        reason: Option<String>,
    },
    #[serde(rename = "recurring.generated")]
    RecurringGenerated {
        series_id: Uuid,
        task_id: Uuid,
        occurrence_date: NaiveDate,
    },
}

/// Emitting half of the event channel. Cloned into the repository; `emit`
/// never blocks and never fails the operation that produced the event.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<DomainEvent>,
}

impl EventBus {
    /// Creates the bus and the receiving end to hand to a dispatcher.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DomainEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// A bus with no consumer; every emit is dropped. For hosts that do not
    /// wire a dispatcher.
    pub fn disconnected() -> Self {
        let (bus, _rx) = Self::new();
        bus
    }

    pub fn emit(&self, event: DomainEvent) {
        // The receiver may be gone; generation correctness never depends on
        // event delivery.
        let _ = self.tx.send(event);
    }
}

/// A delivery target for domain events (history store, notification fan-out).
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: &DomainEvent) -> Result<(), CoreError>;
}

/// Drains the event channel into the registered sinks. A failing sink is
/// skipped for that event; delivery latency or failure never back-pressures
/// the emitting operations.
pub struct EventDispatcher {
    rx: mpsc::UnboundedReceiver<DomainEvent>,
    sinks: Vec<Box<dyn EventSink>>,
}

impl EventDispatcher {
    pub fn new(rx: mpsc::UnboundedReceiver<DomainEvent>) -> Self {
        Self {
            rx,
            sinks: Vec::new(),
        }
    }

    pub fn register(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    /// Runs until every sender is dropped.
    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            for sink in &self.sinks {
                let _ = sink.deliver(&event).await;
            }
        }
    }

    /// Delivers everything currently queued without waiting for more.
    pub async fn drain_pending(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(event) = self.rx.try_recv() {
            for sink in &self.sinks {
                let _ = sink.deliver(&event).await;
            }
            delivered += 1;
        }
        delivered
    }
}

/// In-memory sink collecting every delivered event. Used by tests and as a
/// minimal audit trail for embedded hosts.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: std::sync::Mutex<Vec<DomainEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().expect("event sink lock poisoned").clone()
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn deliver(&self, event: &DomainEvent) -> Result<(), CoreError> {
        self.events
            .lock()
            .expect("event sink lock poisoned")
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedSink(Arc<MemoryEventSink>);

    #[async_trait]
    impl EventSink for SharedSink {
        async fn deliver(&self, event: &DomainEvent) -> Result<(), CoreError> {
            self.0.deliver(event).await
        }
    }

    #[tokio::test]
    async fn test_dispatcher_delivers_to_registered_sinks() {
        let (bus, rx) = EventBus::new();
        let sink = SharedSink::default();
        let mut dispatcher = EventDispatcher::new(rx);
        dispatcher.register(Box::new(sink.clone()));

        bus.emit(DomainEvent::TaskBulkUpdated {
            actor: None,
            task_ids: vec![Uuid::now_v7()],
        });
        bus.emit(DomainEvent::RecurringGenerated {
            series_id: Uuid::now_v7(),
            task_id: Uuid::now_v7(),
            occurrence_date: chrono::NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
        });

        assert_eq!(dispatcher.drain_pending().await, 2);
        assert_eq!(sink.0.events().len(), 2);
    }

    #[test]
    fn test_emit_without_consumer_is_silent() {
        let bus = EventBus::disconnected();
        bus.emit(DomainEvent::TaskBulkUpdated {
            actor: None,
            task_ids: vec![],
        });
    }

    #[test]
    fn test_event_kind_tags() {
        let event = DomainEvent::RecurringSkipped {
            actor: None,
            series_id: Uuid::now_v7(),
            date: chrono::NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
            reason: Some("vacation".to_string()),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"recurring.skipped\""));
    }
}
