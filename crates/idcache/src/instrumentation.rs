//! Structured events for every cache and database operation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, warn};

/// Backend operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOperation {
    Read,
    ReadMulti,
    Write,
    WriteMulti,
    Delete,
}

impl CacheOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::ReadMulti => "read_multi",
            Self::Write => "write",
            Self::WriteMulti => "write_multi",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for CacheOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a backend operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    /// A read found `hits` of the requested keys.
    Read { hits: usize },
    /// A write stored `stored` of the submitted entries.
    Written { stored: usize },
    /// A delete, and whether the key existed.
    Deleted { existed: bool },
    /// The operation failed in transport.
    Failed { reason: String },
}

/// An observable step of the engine.
#[derive(Debug, Clone)]
pub enum InstrumentEvent {
    /// One call to the backend.
    Cache {
        operation: CacheOperation,
        keys: Vec<String>,
        outcome: CacheOutcome,
        duration: Duration,
    },
    /// One call to the data loader, emitted before it is made.
    Query { entity: String, statement: String },
    /// The cache was bypassed because the backend failed.
    Degraded { operation: String, reason: String },
}

impl InstrumentEvent {
    /// Returns the cache operation, if this is a cache event.
    pub fn cache_operation(&self) -> Option<CacheOperation> {
        match self {
            Self::Cache { operation, .. } => Some(*operation),
            _ => None,
        }
    }

    pub fn is_query(&self) -> bool {
        matches!(self, Self::Query { .. })
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Receives every instrumentation event.
///
/// Called synchronously on the emitting task; implementations must not block.
pub trait Subscriber: Send + Sync {
    fn on_event(&self, event: &InstrumentEvent);
}

/// Fans events out to the registered subscribers.
#[derive(Clone, Default)]
pub struct InstrumentationBus {
    subscribers: Arc<RwLock<Vec<Arc<dyn Subscriber>>>>,
}

impl InstrumentationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber. It sees every event emitted afterwards.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.write().push(subscriber);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Delivers an event to every subscriber, in registration order.
    pub fn emit(&self, event: InstrumentEvent) {
        let subscribers = self.subscribers.read().clone();
        for subscriber in &subscribers {
            subscriber.on_event(&event);
        }
    }

    /// Records a loader call.
    pub fn query(&self, entity: &str, statement: impl Into<String>) {
        self.emit(InstrumentEvent::Query {
            entity: entity.to_string(),
            statement: statement.into(),
        });
    }

    /// Records that the cache was bypassed.
    pub fn degraded(&self, operation: &str, reason: &dyn fmt::Display) {
        warn!(operation = %operation, reason = %reason, "cache degraded, falling back to loader");
        self.emit(InstrumentEvent::Degraded {
            operation: operation.to_string(),
            reason: reason.to_string(),
        });
    }
}

impl fmt::Debug for InstrumentationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentationBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Logs every event with `tracing` at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSubscriber;

impl Subscriber for LogSubscriber {
    fn on_event(&self, event: &InstrumentEvent) {
        match event {
            InstrumentEvent::Cache {
                operation,
                keys,
                outcome,
                duration,
            } => debug!(
                operation = %operation,
                keys = keys.len(),
                outcome = ?outcome,
                elapsed_us = duration.as_micros() as u64,
                "cache operation"
            ),
            InstrumentEvent::Query { entity, statement } => {
                debug!(entity = %entity, statement = %statement, "loader query")
            },
            InstrumentEvent::Degraded { operation, reason } => {
                debug!(operation = %operation, reason = %reason, "cache degraded")
            },
        }
    }
}
