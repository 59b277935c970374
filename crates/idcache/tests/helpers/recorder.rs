//! Subscriber que guarda todos los eventos emitidos.

use idcache::{CacheOperation, InstrumentEvent, Subscriber};
use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct RecordingSubscriber {
    events: Mutex<Vec<InstrumentEvent>>,
}

impl RecordingSubscriber {
    pub fn events(&self) -> Vec<InstrumentEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Cache operations in emission order.
    pub fn cache_operations(&self) -> Vec<CacheOperation> {
        self.events
            .lock()
            .iter()
            .filter_map(InstrumentEvent::cache_operation)
            .collect()
    }

    pub fn count(&self, operation: CacheOperation) -> usize {
        self.cache_operations()
            .into_iter()
            .filter(|op| *op == operation)
            .count()
    }

    /// `(entity, statement)` of every query, in order.
    pub fn queries(&self) -> Vec<(String, String)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                InstrumentEvent::Query { entity, statement } => {
                    Some((entity.clone(), statement.clone()))
                },
                _ => None,
            })
            .collect()
    }

    pub fn query_count(&self) -> usize {
        self.events.lock().iter().filter(|e| e.is_query()).count()
    }

    /// Operations reported as degraded.
    pub fn degraded(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                InstrumentEvent::Degraded { operation, .. } => Some(operation.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Subscriber for RecordingSubscriber {
    fn on_event(&self, event: &InstrumentEvent) {
        self.events.lock().push(event.clone());
    }
}
