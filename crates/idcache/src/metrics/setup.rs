//! Metrics setup and initialization.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

use super::cache::register_cache_metrics;

/// Inicializa el sistema de metricas y retorna el handle para exportarlas.
///
/// # Errors
///
/// Returns `BuildError` if a global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    // Buckets en segundos: las operaciones de cache son sub-milisegundo
    let handle = PrometheusBuilder::new()
        .set_buckets(&[
            0.00005, // 50 microsegundos
            0.0001,  // 100 microsegundos
            0.00025, // 250 microsegundos
            0.0005,  // 500 microsegundos
            0.001,   // 1 milisegundo
            0.0025,  // 2.5 milisegundos
            0.005,   // 5 milisegundos
            0.01,    // 10 milisegundos
            0.025,   // 25 milisegundos
            0.05,    // 50 milisegundos
            0.1,     // 100 milisegundos
            0.25,    // 250 milisegundos
            0.5,     // 500 milisegundos
            1.0,     // 1 segundo
        ])?
        .install_recorder()?;

    register_cache_metrics();

    info!("Metrics system initialized");
    Ok(handle)
}
