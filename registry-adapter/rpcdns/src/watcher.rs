use std::sync::Arc;
use std::time::Duration;

use ahash::{AHashMap, AHashSet};
use k8s_openapi::api::core::v1::{Pod, Service};
use serde::Deserialize;
use tracing::{info, warn};

use crate::cache::{resource_key, ResourceCache};
use crate::crd::{RpcService, RpcServiceSpec};
use crate::dns_backend::DnsBackend;
use crate::metrics::DnsMetrics;

#[derive(Debug, Deserialize)]
struct RpcQueryResponse {
    success: bool,
    #[serde(default)]
    data: ServiceInterfaceData,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceInterfaceData {
    #[serde(default)]
    providers: Vec<ServiceInterfaceRecord>,
}

#[derive(Debug, Deserialize)]
struct ServiceInterfaceRecord {
    interface: String,
}

/// The RPC-to-DNS watcher's mutable state: every rpcservice's resolved
/// interface set, the reverse indices used to find which rpcservice a
/// changed cluster `Service`/`Pod` belongs to, and the set of rpcservices
/// whose last query found no ready pods and should be retried.
///
/// Single-threaded by construction — the dispatch loop is this state's
/// only caller, so no locking is needed, mirroring the original's
/// single-goroutine `main` select loop.
pub struct RpcDnsState {
    dns: Arc<dyn DnsBackend>,
    http: reqwest::Client,
    pod_port: u16,
    rpc_interfaces: AHashMap<String, AHashSet<String>>,
    service_to_rpc_service: AHashMap<String, String>,
    pod_to_rpc_service: AHashMap<String, String>,
    domain_to_ip: AHashMap<String, String>,
    try_later: AHashSet<String>,
    known_rpc_services: AHashMap<String, RpcService>,
    metrics: Option<DnsMetrics>,
}

impl RpcDnsState {
    pub fn new(dns: Arc<dyn DnsBackend>, pod_port: u16) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(5)).build()?;
        Ok(Self {
            dns,
            http,
            pod_port,
            rpc_interfaces: AHashMap::new(),
            service_to_rpc_service: AHashMap::new(),
            pod_to_rpc_service: AHashMap::new(),
            domain_to_ip: AHashMap::new(),
            try_later: AHashSet::new(),
            known_rpc_services: AHashMap::new(),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: DnsMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn upsert_rpc_service(&mut self, key: String, rs: RpcService) {
        self.known_rpc_services.insert(key, rs);
    }

    pub fn forget_rpc_service(&mut self, key: &str) -> Option<RpcService> {
        self.known_rpc_services.remove(key)
    }

    pub fn known_rpc_service(&self, key: &str) -> Option<RpcService> {
        self.known_rpc_services.get(key).cloned()
    }

    pub fn rpc_service_for_service(&self, svc_key: &str) -> Option<String> {
        self.service_to_rpc_service.get(svc_key).cloned()
    }

    pub fn rpc_service_for_pod(&self, pod_key: &str) -> Option<String> {
        self.pod_to_rpc_service.get(pod_key).cloned()
    }

    /// Resolves `key`'s interfaces from scratch: finds the single
    /// cluster `Service` matching the rpcservice's selector, then the
    /// first `Running` pod behind it, queries that pod's self-reported
    /// interface list, and publishes a DNS record per interface pointing
    /// at the service's cluster IP.
    pub async fn sync(
        &mut self,
        key: &str,
        rs: &RpcService,
        services: &ResourceCache<Service>,
        pods: &ResourceCache<Pod>,
    ) {
        let spec: &RpcServiceSpec = &rs.spec;
        if spec.selector.is_empty() {
            warn!(key, "rpcservice has an empty selector");
            return;
        }

        let matches = services.list_by_selector(&spec.selector);
        if matches.is_empty() {
            warn!(key, "no service matches rpcservice selector");
            return;
        }
        if matches.len() != 1 {
            warn!(key, count = matches.len(), "selector matched more than one service");
            return;
        }
        let service = matches[0];
        let svc_key = resource_key(
            service.metadata.namespace.as_deref().unwrap_or_default(),
            service.metadata.name.as_deref().unwrap_or_default(),
        );
        self.service_to_rpc_service.insert(svc_key, key.to_string());

        let cluster_ip = service
            .spec
            .as_ref()
            .and_then(|s| s.cluster_ip.clone())
            .unwrap_or_default();
        if cluster_ip.is_empty() || cluster_ip == "None" {
            warn!(key, "service has no usable cluster ip");
            self.delete(key, rs).await;
            return;
        }

        let selector_labels = service.metadata.labels.clone().unwrap_or_default();
        let matching_pods = pods.list_by_selector(&selector_labels);
        if matching_pods.is_empty() {
            self.try_later.insert(key.to_string());
            self.report_try_later_size();
            warn!(key, "service has no pods yet; will retry later");
            return;
        }

        if let Some(first) = matching_pods.first() {
            let pod_key = resource_key(
                first.metadata.namespace.as_deref().unwrap_or_default(),
                first.metadata.name.as_deref().unwrap_or_default(),
            );
            self.pod_to_rpc_service.insert(pod_key, key.to_string());
        }

        for pod in matching_pods {
            let running = pod.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Running");
            if !running {
                continue;
            }
            let Some(pod_ip) = pod.status.as_ref().and_then(|s| s.pod_ip.clone()) else {
                continue;
            };

            let url = format!("http://{pod_ip}:{}/rpc/interfaces", self.pod_port);
            let resp = match self.http.get(&url).send().await {
                Ok(resp) => resp,
                Err(error) => {
                    warn!(key, %error, "failed to query pod interface endpoint");
                    continue;
                }
            };
            let body = match resp.error_for_status() {
                Ok(resp) => match resp.text().await {
                    Ok(body) => body,
                    Err(error) => {
                        warn!(key, %error, "failed to read pod interface response body");
                        continue;
                    }
                },
                Err(error) => {
                    warn!(key, %error, "pod interface endpoint returned an error status");
                    continue;
                }
            };

            let parsed: RpcQueryResponse = match serde_json::from_str(&body) {
                Ok(parsed) => parsed,
                Err(error) => {
                    warn!(key, %error, "failed to decode pod interface response");
                    continue;
                }
            };

            if !parsed.success {
                warn!(key, "pod interface endpoint reported failure; will retry later");
                self.try_later.insert(key.to_string());
                self.report_try_later_size();
                return;
            }

            for provider in parsed.data.providers {
                let result = self.dns.update(&provider.interface, &cluster_ip, &spec.domain_suffix).await;
                if let Some(metrics) = &self.metrics {
                    metrics.record_write("update", result.is_ok());
                }
                if let Err(error) = result {
                    warn!(key, interface = %provider.interface, %error, "failed to update dns record");
                    continue;
                }
                self.domain_to_ip.insert(provider.interface.clone(), cluster_ip.clone());
                self.rpc_interfaces.entry(key.to_string()).or_default().insert(provider.interface);
            }

            // A single pod's interface list is authoritative for the service.
            break;
        }
    }

    /// Removes every DNS record `key` published and forgets its
    /// resolved interface set.
    pub async fn delete(&mut self, key: &str, rs: &RpcService) {
        let Some(domains) = self.rpc_interfaces.get(key).cloned() else {
            warn!(key, "rpcservice has no known interfaces to delete");
            return;
        };

        for domain in domains {
            let Some(ip) = self.domain_to_ip.get(&domain).cloned() else {
                warn!(key, domain, "missing recorded ip for domain; skipping delete");
                continue;
            };
            let result = self.dns.delete(&domain, &ip, &rs.spec.domain_suffix).await;
            if let Some(metrics) = &self.metrics {
                metrics.record_write("delete", result.is_ok());
            }
            match result {
                Ok(()) => {
                    self.domain_to_ip.remove(&domain);
                }
                Err(error) => warn!(key, domain, %error, "failed to delete dns record"),
            }
        }
        self.rpc_interfaces.remove(key);
    }

    fn report_try_later_size(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.set_try_later_size(self.try_later.len());
        }
    }

    /// Retries every rpcservice that previously found no ready pods.
    pub async fn retry_pending(&mut self, services: &ResourceCache<Service>, pods: &ResourceCache<Pod>) {
        if self.try_later.is_empty() {
            return;
        }
        let keys: Vec<String> = self.try_later.drain().collect();
        self.report_try_later_size();
        for key in keys {
            let Some(rs) = self.known_rpc_service(&key) else {
                continue;
            };
            info!(key, "retrying rpcservice with previously unready pods");
            self.sync(&key, &rs, services, pods).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::{PodSpec, PodStatus, ServiceSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::crd::RpcService;

    #[derive(Default)]
    struct FakeDns {
        updates: Mutex<Vec<(String, String, String)>>,
        deletes: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl DnsBackend for FakeDns {
        async fn update(&self, interface: &str, ip: &str, suffix: &str) -> Result<(), crate::dns_backend::DnsBackendError> {
            self.updates
                .lock()
                .unwrap()
                .push((interface.to_string(), ip.to_string(), suffix.to_string()));
            Ok(())
        }

        async fn delete(&self, interface: &str, ip: &str, suffix: &str) -> Result<(), crate::dns_backend::DnsBackendError> {
            self.deletes
                .lock()
                .unwrap()
                .push((interface.to_string(), ip.to_string(), suffix.to_string()));
            Ok(())
        }
    }

    fn rpc_service(selector_key: &str, selector_value: &str) -> RpcService {
        let mut selector = std::collections::BTreeMap::new();
        selector.insert(selector_key.to_string(), selector_value.to_string());
        RpcService::new(
            "orders",
            RpcServiceSpec {
                selector,
                domain_suffix: "rpc.cluster.local".to_string(),
            },
        )
    }

    fn service_with_ip(name: &str, labels: &[(&str, &str)], cluster_ip: &str) -> Service {
        let mut label_map = std::collections::BTreeMap::new();
        for (k, v) in labels {
            label_map.insert(k.to_string(), v.to_string());
        }
        Service {
            metadata: ObjectMeta {
                namespace: Some("default".to_string()),
                name: Some(name.to_string()),
                labels: Some(label_map),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                cluster_ip: Some(cluster_ip.to_string()),
                ..Default::default()
            }),
            status: None,
        }
    }

    fn running_pod(name: &str, labels: &[(&str, &str)], ip: &str) -> Pod {
        let mut label_map = std::collections::BTreeMap::new();
        for (k, v) in labels {
            label_map.insert(k.to_string(), v.to_string());
        }
        Pod {
            metadata: ObjectMeta {
                namespace: Some("default".to_string()),
                name: Some(name.to_string()),
                labels: Some(label_map),
                ..Default::default()
            },
            spec: Some(PodSpec::default()),
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                pod_ip: Some(ip.to_string()),
                ..Default::default()
            }),
        }
    }

    #[tokio::test]
    async fn sync_publishes_a_record_per_reported_interface() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rpc/interfaces"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": { "providers": [{"interface": "com.example.Orders"}] }
            })))
            .mount(&server)
            .await;
        let pod_ip = server.address().ip().to_string();
        let pod_port = server.address().port();

        let dns = Arc::new(FakeDns::default());
        let mut state = RpcDnsState::new(dns.clone(), pod_port).unwrap();

        let rs = rpc_service("app", "orders");
        let mut services = ResourceCache::new();
        services.apply(
            resource_key("default", "orders"),
            service_with_ip("orders", &[("app", "orders")], "10.0.0.5"),
        );
        let mut pods = ResourceCache::new();
        pods.apply(
            resource_key("default", "orders-0"),
            running_pod("orders-0", &[("app", "orders")], &pod_ip),
        );

        state.sync("default/orders", &rs, &services, &pods).await;

        let updates = dns.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0], ("com.example.Orders".to_string(), "10.0.0.5".to_string(), "rpc.cluster.local".to_string()));
        assert_eq!(state.rpc_service_for_service("default/orders"), Some("default/orders".to_string()));
        assert_eq!(state.rpc_service_for_pod("default/orders-0"), Some("default/orders".to_string()));
    }

    #[tokio::test]
    async fn sync_defers_when_no_pods_match() {
        let dns = Arc::new(FakeDns::default());
        let mut state = RpcDnsState::new(dns.clone(), 1).unwrap();

        let rs = rpc_service("app", "orders");
        let mut services = ResourceCache::new();
        services.apply(
            resource_key("default", "orders"),
            service_with_ip("orders", &[("app", "orders")], "10.0.0.5"),
        );
        let pods = ResourceCache::new();

        state.sync("default/orders", &rs, &services, &pods).await;

        assert!(dns.updates.lock().unwrap().is_empty());
        state.retry_pending(&services, &pods).await;
        assert!(dns.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sync_deletes_existing_records_when_cluster_ip_missing() {
        let dns = Arc::new(FakeDns::default());
        let mut state = RpcDnsState::new(dns.clone(), 1).unwrap();
        state
            .rpc_interfaces
            .entry("default/orders".to_string())
            .or_default()
            .insert("com.example.Orders".to_string());
        state
            .domain_to_ip
            .insert("com.example.Orders".to_string(), "10.0.0.5".to_string());

        let rs = rpc_service("app", "orders");
        let mut services = ResourceCache::new();
        services.apply(
            resource_key("default", "orders"),
            service_with_ip("orders", &[("app", "orders")], "None"),
        );
        let pods = ResourceCache::new();

        state.sync("default/orders", &rs, &services, &pods).await;

        let deletes = dns.deletes.lock().unwrap();
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].0, "com.example.Orders");
        assert!(!state.rpc_interfaces.contains_key("default/orders"));
    }

    #[tokio::test]
    async fn delete_removes_every_published_interface() {
        let dns = Arc::new(FakeDns::default());
        let mut state = RpcDnsState::new(dns.clone(), 1).unwrap();
        state
            .rpc_interfaces
            .entry("default/orders".to_string())
            .or_default()
            .insert("com.example.Orders".to_string());
        state
            .domain_to_ip
            .insert("com.example.Orders".to_string(), "10.0.0.5".to_string());

        let rs = rpc_service("app", "orders");
        state.delete("default/orders", &rs).await;

        let deletes = dns.deletes.lock().unwrap();
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0], ("com.example.Orders".to_string(), "10.0.0.5".to_string(), "rpc.cluster.local".to_string()));
        assert!(state.domain_to_ip.is_empty());
    }

    #[tokio::test]
    async fn retry_pending_resolves_rpcservices_with_newly_ready_pods() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rpc/interfaces"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": { "providers": [{"interface": "com.example.Orders"}] }
            })))
            .mount(&server)
            .await;
        let pod_ip = server.address().ip().to_string();
        let pod_port = server.address().port();

        let dns = Arc::new(FakeDns::default());
        let mut state = RpcDnsState::new(dns.clone(), pod_port).unwrap();

        let rs = rpc_service("app", "orders");
        state.upsert_rpc_service("default/orders".to_string(), rs.clone());

        let mut services = ResourceCache::new();
        services.apply(
            resource_key("default", "orders"),
            service_with_ip("orders", &[("app", "orders")], "10.0.0.5"),
        );
        let pods = ResourceCache::new();
        state.sync("default/orders", &rs, &services, &pods).await;
        assert!(dns.updates.lock().unwrap().is_empty());

        let mut pods = pods;
        pods.apply(
            resource_key("default", "orders-0"),
            running_pod("orders-0", &[("app", "orders")], &pod_ip),
        );
        state.retry_pending(&services, &pods).await;

        assert_eq!(dns.updates.lock().unwrap().len(), 1);
    }
}
