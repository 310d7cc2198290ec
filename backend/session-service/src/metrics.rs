//! Service metrics: admission outcomes and ledger activity

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<ServiceMetricsInner> = OnceLock::new();

struct ServiceMetricsInner {
    admissions: IntCounterVec,
    leaves: IntCounter,
    ledger_entries: IntCounter,
}

impl ServiceMetricsInner {
    fn new() -> Self {
        Self {
            admissions: IntCounterVec::new(
                Opts::new(
                    "session_admission_decisions_total",
                    "Admission decisions by outcome",
                ),
                &["outcome"],
            )
            .expect("valid metric definition"),
            leaves: IntCounter::new("session_leaves_total", "Memberships ended")
                .expect("valid metric definition"),
            ledger_entries: IntCounter::new(
                "session_ledger_entries_total",
                "Ledger entries committed",
            )
            .expect("valid metric definition"),
        }
    }
}

fn get_metrics() -> &'static ServiceMetricsInner {
    METRICS.get_or_init(ServiceMetricsInner::new)
}

/// Register service metrics with a Prometheus registry
pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
    let metrics = get_metrics();
    registry.register(Box::new(metrics.admissions.clone()))?;
    registry.register(Box::new(metrics.leaves.clone()))?;
    registry.register(Box::new(metrics.ledger_entries.clone()))?;
    Ok(())
}

/// `outcome` is `admitted` or the snake_case denial reason
pub fn record_admission(outcome: &str) {
    get_metrics()
        .admissions
        .with_label_values(&[outcome])
        .inc();
}

pub fn record_leave() {
    get_metrics().leaves.inc();
}

pub fn record_ledger_entry() {
    get_metrics().ledger_entries.inc();
}
