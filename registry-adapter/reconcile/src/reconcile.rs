use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use registry_adapter_core::{subtract, Hostname, Registry, Service, ServiceEvent};
use registry_adapter_upstream::{normalize_dns_vip, DnsVipClient, RpcInterfaceClient, UpstreamError};
use registry_adapter_whitelist::WhitelistSource;
use tokio::task::JoinSet;
use tracing::{info_span, warn, Instrument};

use crate::bus::EventBus;
use crate::metrics::ReconcileMetrics;

/// Refresh periods shorter than this are raised to it. The original
/// upstream clients floor a non-positive or too-small period to a fixed
/// five minutes; here the floor is the period itself, not a jump to an
/// unrelated default, so an operator asking for "a bit more often than
/// the floor" is not silently overridden to something slower.
pub const MIN_REFRESH_PERIOD: Duration = Duration::from_secs(60);

pub fn clamp_refresh_period(period: Duration) -> Duration {
    period.max(MIN_REFRESH_PERIOD)
}

/// Runs the DNS/VIP reconciliation loop until cancelled. Every tick:
/// reads a fresh whitelist snapshot (replacing, never appending, the
/// previous one), prunes any domain present in the prior tick's
/// snapshot but absent from this one (a whitelist entry removed outright
/// must not linger in the registry forever), then fans fetches for every
/// still-whitelisted domain out as owned, independently spawned tasks
/// (so a shared loop variable can't be captured by the wrong closure the
/// way the original's per-domain goroutine loop did), and reconciles
/// each domain's result into the registry.
pub async fn run_dns_vip_loop(
    client: Arc<DnsVipClient>,
    whitelist: &mut WhitelistSource,
    registry: Registry,
    bus: EventBus,
    metrics: ReconcileMetrics,
    refresh_period: Duration,
) {
    let period = clamp_refresh_period(refresh_period);
    let mut interval = tokio::time::interval(period);
    let mut prev_domains: BTreeSet<Hostname> = BTreeSet::new();
    loop {
        interval.tick().await;
        let snapshot = whitelist.snapshot();

        let current_domains: BTreeSet<Hostname> = snapshot.by_domain.keys().cloned().collect();
        prev_domains = prune_dropped_domains(&registry, &bus, &metrics, prev_domains, current_domains).await;

        let mut tasks: JoinSet<(Hostname, Vec<String>, Result<Vec<String>, UpstreamError>)> =
            JoinSet::new();
        for (domain, urls) in snapshot.by_domain.clone() {
            let client = client.clone();
            let hostnames: Vec<String> = urls
                .iter()
                .map(|u| u.domain.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            tasks.spawn(
                async move {
                    let result = client.fetch_domain_ips(&domain).await;
                    (domain, hostnames, result)
                }
                .in_current_span(),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            let Ok((domain, hostnames, result)) = joined else {
                warn!("dns/vip fetch task panicked");
                continue;
            };
            let span = info_span!("reconcile_domain", domain = %domain);
            let _enter = span.enter();

            let ips = match result {
                Ok(ips) => {
                    metrics.record_fetch("dns_vip", true);
                    ips
                }
                Err(error) => {
                    metrics.record_fetch("dns_vip", false);
                    warn!(%error, "dns/vip fetch failed; leaving existing registry entries in place");
                    continue;
                }
            };

            if ips.is_empty() {
                for hostname in &hostnames {
                    prune_service(&registry, &bus, &metrics, hostname).await;
                }
                metrics.set_registry_size(registry.len());
                continue;
            }

            let urls = snapshot.by_domain.get(&domain).cloned().unwrap_or_default();
            let services = normalize_dns_vip(&ips, &urls);
            if services.is_empty() {
                for hostname in &hostnames {
                    prune_service(&registry, &bus, &metrics, hostname).await;
                }
                metrics.set_registry_size(registry.len());
                continue;
            }

            for (hostname, service) in services {
                apply_service(&registry, &bus, &metrics, &hostname, service).await;
            }
            metrics.set_registry_size(registry.len());
        }
    }
}

/// Runs the RPC-interface reconciliation loop. Shares the same per-tick
/// replace-whitelist / fan-out-owned-domains / exact-match-prune shape as
/// the DNS/VIP loop; the RPC-interface upstream already returns fully
/// normalized services; there is no separate URL cross-product step.
pub async fn run_rpc_interface_loop(
    client: Arc<RpcInterfaceClient>,
    whitelist: &mut WhitelistSource,
    registry: Registry,
    bus: EventBus,
    metrics: ReconcileMetrics,
    refresh_period: Duration,
) {
    let period = clamp_refresh_period(refresh_period);
    let mut interval = tokio::time::interval(period);
    let mut prev_domains: BTreeSet<Hostname> = BTreeSet::new();
    loop {
        interval.tick().await;
        let snapshot = whitelist.snapshot();

        let current_domains: BTreeSet<Hostname> = snapshot.entries.iter().cloned().collect();
        prev_domains = prune_dropped_domains(&registry, &bus, &metrics, prev_domains, current_domains).await;

        let mut tasks: JoinSet<(Hostname, Result<ahash::AHashMap<Hostname, Service>, UpstreamError>)> =
            JoinSet::new();
        for interface_name in snapshot.entries.clone() {
            let client = client.clone();
            tasks.spawn(
                async move {
                    let result = client.fetch_service(&interface_name).await;
                    (interface_name, result)
                }
                .in_current_span(),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            let Ok((interface_name, result)) = joined else {
                warn!("rpc-interface fetch task panicked");
                continue;
            };
            let span = info_span!("reconcile_interface", interface_name = %interface_name);
            let _enter = span.enter();

            let services = match result {
                Ok(services) => {
                    metrics.record_fetch("rpc_interface", true);
                    services
                }
                Err(error) => {
                    metrics.record_fetch("rpc_interface", false);
                    warn!(%error, "rpc-interface fetch failed; leaving existing registry entries in place");
                    continue;
                }
            };

            if services.is_empty() {
                prune_service(&registry, &bus, &metrics, &interface_name).await;
                metrics.set_registry_size(registry.len());
                continue;
            }

            for (hostname, service) in services {
                apply_service(&registry, &bus, &metrics, &hostname, service).await;
            }
            metrics.set_registry_size(registry.len());
        }
    }
}

/// Diffs a freshly fetched service against the registry's current view
/// and publishes exactly the events that changed, then swaps the new
/// service into the registry as a single atomic replace.
async fn apply_service(
    registry: &Registry,
    bus: &EventBus,
    metrics: &ReconcileMetrics,
    hostname: &Hostname,
    new_service: Service,
) {
    let existing = registry.get(hostname);

    if existing.is_none() {
        bus.publish(ServiceEvent::ServiceAdd(Arc::new(new_service.clone()))).await;
        metrics.record_event("service_add");
    }

    let old_instances = existing.as_ref().map(|s| s.instances().to_vec()).unwrap_or_default();
    let new_instances = new_service.instances().to_vec();

    for deleted in subtract(&old_instances, &new_instances) {
        bus.publish(ServiceEvent::ServiceInstanceDelete(deleted)).await;
        metrics.record_event("service_instance_delete");
    }
    for added in subtract(&new_instances, &old_instances) {
        bus.publish(ServiceEvent::ServiceInstanceAdd(added)).await;
        metrics.record_event("service_instance_add");
    }

    registry.replace(hostname.clone(), new_service);
}

/// Removes a service whose upstream fetch came back empty. Unlike the
/// original's suffix scan over every known service, this looks up the
/// hostname directly — an exact-match registry key lookup structurally
/// can't match anything but the service it names.
async fn prune_service(registry: &Registry, bus: &EventBus, metrics: &ReconcileMetrics, hostname: &str) {
    if let Some(removed) = registry.remove(hostname) {
        for instance in removed.instances() {
            bus.publish(ServiceEvent::ServiceInstanceDelete(instance.clone())).await;
            metrics.record_event("service_instance_delete");
        }
        bus.publish(ServiceEvent::ServiceDelete(removed)).await;
        metrics.record_event("service_delete");
    }
}

/// Prunes every domain present in `prev` but absent from `current`
/// (spec's "snapshot as prev, then prune anything the new whitelist
/// dropped" step), returning `current` so the caller can carry it as
/// `prev` into the next tick.
async fn prune_dropped_domains(
    registry: &Registry,
    bus: &EventBus,
    metrics: &ReconcileMetrics,
    prev: BTreeSet<Hostname>,
    current: BTreeSet<Hostname>,
) -> BTreeSet<Hostname> {
    for dropped in prev.difference(&current) {
        prune_service(registry, bus, metrics, dropped).await;
    }
    metrics.set_registry_size(registry.len());
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_adapter_core::{Instance, Port};

    #[test]
    fn clamp_refresh_period_floors_to_minimum() {
        assert_eq!(clamp_refresh_period(Duration::from_secs(5)), MIN_REFRESH_PERIOD);
        assert_eq!(clamp_refresh_period(Duration::from_secs(90)), Duration::from_secs(90));
    }

    #[tokio::test]
    async fn apply_service_emits_add_for_new_service() {
        let registry = Registry::new();
        let (bus, mut rx) = EventBus::channel(8);
        let metrics = ReconcileMetrics::default();
        let mut svc = Service::new("svc.example");
        svc.push_instance(Instance::new("10.0.0.1", Port::new("TCP", "80"), "svc.example".into()));

        apply_service(&registry, &bus, &metrics, &"svc.example".to_string(), svc).await;

        let mut saw_add = false;
        let mut saw_instance_add = false;
        while let Some(event) = rx.recv().await {
            match event {
                ServiceEvent::ServiceAdd(_) => saw_add = true,
                ServiceEvent::ServiceInstanceAdd(_) => saw_instance_add = true,
                _ => {}
            }
            if saw_add && saw_instance_add {
                break;
            }
        }
        assert!(saw_add && saw_instance_add);
        assert!(registry.get("svc.example").is_some());
    }

    #[tokio::test]
    async fn apply_service_diffs_instances_on_update() {
        let registry = Registry::new();
        let (bus, mut rx) = EventBus::channel(8);
        let metrics = ReconcileMetrics::default();

        let mut first = Service::new("svc.example");
        first.push_instance(Instance::new("10.0.0.1", Port::new("TCP", "80"), "svc.example".into()));
        apply_service(&registry, &bus, &metrics, &"svc.example".to_string(), first).await;
        // drain the add + instance-add events from the first apply
        let _ = rx.recv().await;
        let _ = rx.recv().await;

        let mut second = Service::new("svc.example");
        second.push_instance(Instance::new("10.0.0.2", Port::new("TCP", "80"), "svc.example".into()));
        apply_service(&registry, &bus, &metrics, &"svc.example".to_string(), second).await;

        let instances = registry.instances_of("svc.example");
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].host, "10.0.0.2");
    }

    #[tokio::test]
    async fn prune_service_removes_exact_hostname_only() {
        let registry = Registry::new();
        let (bus, mut rx) = EventBus::channel(8);
        let metrics = ReconcileMetrics::default();

        let mut other = Service::new("other.example");
        other.push_instance(Instance::new("10.0.0.9", Port::new("TCP", "80"), "other.example".into()));
        registry.replace("other.example".to_string(), other);

        let mut svc = Service::new("svc.example");
        svc.push_instance(Instance::new("10.0.0.1", Port::new("TCP", "80"), "svc.example".into()));
        registry.replace("svc.example".to_string(), svc);

        prune_service(&registry, &bus, &metrics, "svc.example").await;

        assert!(registry.get("svc.example").is_none());
        assert!(registry.get("other.example").is_some(), "suffix-adjacent service must survive");

        let mut saw_delete = false;
        while let Some(event) = rx.recv().await {
            if matches!(event, ServiceEvent::ServiceDelete(_)) {
                saw_delete = true;
                break;
            }
        }
        assert!(saw_delete);
    }

    #[tokio::test]
    async fn prune_dropped_domains_removes_entries_a_shrunk_whitelist_no_longer_covers() {
        // Testable Scenario 4: whitelist [A, B] -> [A] prunes B even though
        // B is never fetched again once it drops out of the whitelist.
        let registry = Registry::new();
        let (bus, mut rx) = EventBus::channel(8);
        let metrics = ReconcileMetrics::default();

        let mut a = Service::new("a.example");
        a.push_instance(Instance::new("10.0.0.1", Port::new("TCP", "80"), "a.example".into()));
        registry.replace("a.example".to_string(), a);
        let mut b = Service::new("b.example");
        b.push_instance(Instance::new("10.0.0.2", Port::new("TCP", "80"), "b.example".into()));
        registry.replace("b.example".to_string(), b);

        let prev: BTreeSet<Hostname> = ["a.example".to_string(), "b.example".to_string()].into();
        let current: BTreeSet<Hostname> = ["a.example".to_string()].into();

        let next = prune_dropped_domains(&registry, &bus, &metrics, prev, current.clone()).await;

        assert_eq!(next, current);
        assert!(registry.get("a.example").is_some(), "still-whitelisted domain must survive");
        assert!(registry.get("b.example").is_none(), "dropped domain must be pruned");

        let mut saw_delete = false;
        while let Some(event) = rx.recv().await {
            if matches!(event, ServiceEvent::ServiceDelete(_)) {
                saw_delete = true;
                break;
            }
        }
        assert!(saw_delete);
    }

    #[tokio::test]
    async fn prune_dropped_domains_is_a_no_op_when_whitelist_is_unchanged() {
        let registry = Registry::new();
        let (bus, _rx) = EventBus::channel(8);
        let metrics = ReconcileMetrics::default();

        let mut a = Service::new("a.example");
        a.push_instance(Instance::new("10.0.0.1", Port::new("TCP", "80"), "a.example".into()));
        registry.replace("a.example".to_string(), a);

        let domains: BTreeSet<Hostname> = ["a.example".to_string()].into();
        prune_dropped_domains(&registry, &bus, &metrics, domains.clone(), domains).await;

        assert!(registry.get("a.example").is_some());
    }
}
