use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry as MetricsRegistry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FlavorLabel {
    pub flavor: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EventKindLabel {
    pub kind: &'static str,
}

/// Reconciliation-loop metrics: fetch attempts/failures per upstream
/// flavor, events published per kind, and the registry's current size.
/// Registered once at startup and shared by both loops, the way
/// `k8s/index/src/metrics.rs` registers one `IndexMetrics` per process.
#[derive(Clone, Default)]
pub struct ReconcileMetrics {
    fetch_attempts: Family<FlavorLabel, Counter>,
    fetch_failures: Family<FlavorLabel, Counter>,
    events_emitted: Family<EventKindLabel, Counter>,
    registry_size: Gauge,
}

impl ReconcileMetrics {
    pub fn register(registry: &mut MetricsRegistry) -> Self {
        let metrics = Self::default();
        registry.register(
            "upstream_fetch_attempts",
            "Count of upstream fetch attempts per flavor",
            metrics.fetch_attempts.clone(),
        );
        registry.register(
            "upstream_fetch_failures",
            "Count of failed upstream fetches per flavor",
            metrics.fetch_failures.clone(),
        );
        registry.register(
            "service_events_emitted",
            "Count of service events published to the event bus, by kind",
            metrics.events_emitted.clone(),
        );
        registry.register(
            "registry_services",
            "Gauge of the number of services currently held in the registry",
            metrics.registry_size.clone(),
        );
        metrics
    }

    pub fn record_fetch(&self, flavor: &'static str, ok: bool) {
        self.fetch_attempts.get_or_create(&FlavorLabel { flavor }).inc();
        if !ok {
            self.fetch_failures.get_or_create(&FlavorLabel { flavor }).inc();
        }
    }

    pub fn record_event(&self, kind: &'static str) {
        self.events_emitted.get_or_create(&EventKindLabel { kind }).inc();
    }

    pub fn set_registry_size(&self, size: usize) {
        self.registry_size.set(size as i64);
    }
}
