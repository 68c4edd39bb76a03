use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::model::{Instance, Service};
use crate::Hostname;

/// Shared, reader-writer-locked table of known services, keyed by
/// hostname. The reconciliation loop is the sole writer; the adapter
/// facade and the RPC-to-DNS watcher read from it concurrently.
///
/// `replace` swaps in a freshly built `Arc<Service>` under a single write
/// lock acquisition, so a concurrent reader always observes either the
/// entire old service or the entire new one, never a partially updated
/// one.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<AHashMap<Hostname, Arc<Service>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hostname: &str) -> Option<Arc<Service>> {
        self.inner.read().get(hostname).cloned()
    }

    pub fn list(&self) -> Vec<Arc<Service>> {
        self.inner.read().values().cloned().collect()
    }

    pub fn instances_of(&self, hostname: &str) -> Vec<Instance> {
        self.inner
            .read()
            .get(hostname)
            .map(|svc| svc.instances().to_vec())
            .unwrap_or_default()
    }

    /// Collects instances across a list of hostnames, in the order the
    /// hostnames are given. A linear scan over `hosts`, not an index —
    /// this is only ever called with the small lists the whitelist or a
    /// caller's domain group produces.
    pub fn instances_by_hosts(&self, hosts: &[String]) -> Vec<Instance> {
        let guard = self.inner.read();
        hosts
            .iter()
            .filter_map(|h| guard.get(h))
            .flat_map(|svc| svc.instances().iter().cloned())
            .collect()
    }

    pub fn replace(&self, hostname: Hostname, service: Service) {
        self.inner.write().insert(hostname, Arc::new(service));
    }

    pub fn remove(&self, hostname: &str) -> Option<Arc<Service>> {
        self.inner.write().remove(hostname)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Port;

    #[test]
    fn replace_then_get_roundtrips() {
        let reg = Registry::new();
        let mut svc = Service::new("svc.example");
        svc.push_instance(Instance::new("10.0.0.1", Port::new("TCP", "80"), "svc.example".into()));
        reg.replace("svc.example".to_string(), svc);

        let got = reg.get("svc.example").expect("service present");
        assert_eq!(got.instances().len(), 1);
    }

    #[test]
    fn remove_drops_service() {
        let reg = Registry::new();
        reg.replace("svc.example".to_string(), Service::new("svc.example"));
        assert!(reg.remove("svc.example").is_some());
        assert!(reg.get("svc.example").is_none());
    }

    #[test]
    fn instances_by_hosts_skips_missing() {
        let reg = Registry::new();
        let mut svc = Service::new("a");
        svc.push_instance(Instance::new("10.0.0.1", Port::new("TCP", "80"), "a".into()));
        reg.replace("a".to_string(), svc);

        let result = reg.instances_by_hosts(&["a".to_string(), "missing".to_string()]);
        assert_eq!(result.len(), 1);
    }
}
