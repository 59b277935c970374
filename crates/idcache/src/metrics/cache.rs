//! Cache metrics recording.

use metrics::{counter, histogram};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::instrumentation::{CacheOperation, CacheOutcome, InstrumentEvent, Subscriber};

/// Registra las metricas de cache.
/// Llamar una vez al inicio para registrar las metricas.
pub fn register_cache_metrics() {
    metrics::describe_counter!("idcache_cache_hits_total", "Total number of cache hits");
    metrics::describe_counter!("idcache_cache_misses_total", "Total number of cache misses");
    metrics::describe_counter!(
        "idcache_queries_total",
        "Total number of data loader queries"
    );
    metrics::describe_counter!(
        "idcache_degraded_total",
        "Total number of operations that bypassed a failing cache"
    );
    metrics::describe_histogram!(
        "idcache_cache_operation_seconds",
        "Time spent on cache operations"
    );
}

/// Recorder de metricas de cache.
/// Usa atomic counters internos para maximo rendimiento.
#[derive(Debug, Clone)]
pub struct CacheMetrics {
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    queries: Arc<AtomicU64>,
    degraded: Arc<AtomicU64>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self {
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            queries: Arc::new(AtomicU64::new(0)),
            degraded: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Registra cache hits
    pub fn record_hits(&self, count: u64) {
        self.hits.fetch_add(count, Ordering::Relaxed);
        counter!("idcache_cache_hits_total").increment(count);
    }

    /// Registra cache misses
    pub fn record_misses(&self, count: u64) {
        self.misses.fetch_add(count, Ordering::Relaxed);
        counter!("idcache_cache_misses_total").increment(count);
    }

    /// Registra una query al loader
    pub fn record_query(&self, entity: &str) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        counter!("idcache_queries_total", "entity" => entity.to_string()).increment(1);
    }

    pub fn record_degraded(&self, operation: &str) {
        self.degraded.fetch_add(1, Ordering::Relaxed);
        counter!("idcache_degraded_total", "operation" => operation.to_string()).increment(1);
    }

    /// Registra la duracion de una operacion
    pub fn record_operation_duration(&self, operation: CacheOperation, duration: Duration) {
        histogram!(
            "idcache_cache_operation_seconds",
            "operation" => operation.as_str()
        )
        .record(duration.as_secs_f64());
    }

    /// Calcula hit rate (para logging/debugging)
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        let total = hits + misses;
        if total == 0.0 { 0.0 } else { hits / total }
    }

    /// Retorna el numero de hits
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Retorna el numero de misses
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    pub fn degraded(&self) -> u64 {
        self.degraded.load(Ordering::Relaxed)
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Feeds instrumentation events into [`CacheMetrics`].
#[derive(Debug, Clone, Default)]
pub struct MetricsSubscriber {
    metrics: CacheMetrics,
}

impl MetricsSubscriber {
    pub fn new(metrics: CacheMetrics) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }
}

impl Subscriber for MetricsSubscriber {
    fn on_event(&self, event: &InstrumentEvent) {
        match event {
            InstrumentEvent::Cache {
                operation,
                keys,
                outcome,
                duration,
            } => {
                self.metrics.record_operation_duration(*operation, *duration);
                if let CacheOutcome::Read { hits } = outcome {
                    self.metrics.record_hits(*hits as u64);
                    self.metrics
                        .record_misses(keys.len().saturating_sub(*hits) as u64);
                }
            },
            InstrumentEvent::Query { entity, .. } => self.metrics.record_query(entity),
            InstrumentEvent::Degraded { operation, .. } => self.metrics.record_degraded(operation),
        }
    }
}
