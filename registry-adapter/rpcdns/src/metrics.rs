use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry as MetricsRegistry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DnsOpLabel {
    pub op: &'static str,
}

/// DNS-write metrics: update/delete attempts and failures, and the
/// number of rpcservices currently waiting for a ready pod.
#[derive(Clone, Default)]
pub struct DnsMetrics {
    dns_write_attempts: Family<DnsOpLabel, Counter>,
    dns_write_failures: Family<DnsOpLabel, Counter>,
    try_later_size: Gauge,
}

impl DnsMetrics {
    pub fn register(registry: &mut MetricsRegistry) -> Self {
        let metrics = Self::default();
        registry.register(
            "dns_write_attempts",
            "Count of DNS backend write attempts by operation",
            metrics.dns_write_attempts.clone(),
        );
        registry.register(
            "dns_write_failures",
            "Count of failed DNS backend writes by operation",
            metrics.dns_write_failures.clone(),
        );
        registry.register(
            "rpcservice_retry_queue_size",
            "Gauge of rpcservices awaiting a ready pod before their interfaces can be resolved",
            metrics.try_later_size.clone(),
        );
        metrics
    }

    pub fn record_write(&self, op: &'static str, ok: bool) {
        self.dns_write_attempts.get_or_create(&DnsOpLabel { op }).inc();
        if !ok {
            self.dns_write_failures.get_or_create(&DnsOpLabel { op }).inc();
        }
    }

    pub fn set_try_later_size(&self, size: usize) {
        self.try_later_size.set(size as i64);
    }
}
