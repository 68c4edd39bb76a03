use std::collections::BTreeMap;

use ahash::AHashMap;
use k8s_openapi::api::core::v1::{Pod, Service};

/// True if every key/value pair in `selector` is present in `labels` —
/// the usual Kubernetes label-selector subset match.
pub fn selector_matches(selector: &BTreeMap<String, String>, labels: &BTreeMap<String, String>) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

pub fn resource_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// An in-memory mirror of a watched resource kind, keyed by
/// `namespace/name`. Populated from `kube::runtime::watcher` apply/delete
/// events; read-only from the dispatch loop's point of view once
/// populated.
#[derive(Default)]
pub struct ResourceCache<T> {
    items: AHashMap<String, T>,
}

impl<T> ResourceCache<T> {
    pub fn new() -> Self {
        Self { items: AHashMap::new() }
    }

    pub fn apply(&mut self, key: String, item: T) {
        self.items.insert(key, item);
    }

    pub fn delete(&mut self, key: &str) -> Option<T> {
        self.items.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.items.get(key)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }
}

impl ResourceCache<Service> {
    pub fn list_by_selector(&self, selector: &BTreeMap<String, String>) -> Vec<&Service> {
        let empty = BTreeMap::new();
        self.values()
            .filter(|svc| selector_matches(selector, svc.metadata.labels.as_ref().unwrap_or(&empty)))
            .collect()
    }
}

impl ResourceCache<Pod> {
    pub fn list_by_selector(&self, selector: &BTreeMap<String, String>) -> Vec<&Pod> {
        let empty = BTreeMap::new();
        self.values()
            .filter(|pod| selector_matches(selector, pod.metadata.labels.as_ref().unwrap_or(&empty)))
            .collect()
    }
}
