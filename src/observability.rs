use std::net::SocketAddr;

// ── Booking outcomes ────────────────────────────────────────────

/// Counter: stays committed, interactive and imported.
pub const STAYS_COMMITTED_TOTAL: &str = "bedpulse_stays_committed_total";

/// Counter: allocation attempts refused. Labels: reason.
pub const ALLOCATIONS_REJECTED_TOTAL: &str = "bedpulse_allocations_rejected_total";

/// Counter: allocations retried after the room changed under them.
pub const CONCURRENCY_RETRIES_TOTAL: &str = "bedpulse_concurrency_retries_total";

/// Counter: lifecycle transitions. Labels: to.
pub const STATE_TRANSITIONS_TOTAL: &str = "bedpulse_state_transitions_total";

/// Counter: tax calculations. Labels: outcome.
pub const TAX_CALCULATIONS_TOTAL: &str = "bedpulse_tax_calculations_total";

// ── Import ──────────────────────────────────────────────────────

/// Counter: import rows processed. Labels: entity, outcome (`success` or an error label).
pub const IMPORT_ROWS_TOTAL: &str = "bedpulse_import_rows_total";

/// Histogram: whole import run duration in seconds. Labels: entity.
pub const IMPORT_DURATION_SECONDS: &str = "bedpulse_import_duration_seconds";

// ── Resources ───────────────────────────────────────────────────

/// Gauge: properties with a loaded engine.
pub const PROPERTIES_ACTIVE: &str = "bedpulse_properties_active";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "bedpulse_journal_flush_duration_seconds";

/// Histogram: events per journal flush.
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "bedpulse_journal_flush_batch_size";

/// Counter: journal compactions.
pub const JOURNAL_COMPACTIONS_TOTAL: &str = "bedpulse_journal_compactions_total";

/// Install the Prometheus exporter on `port`. No-op if port is None.
pub fn init(port: Option<u16>) -> anyhow::Result<()> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
