use registry_adapter_core::{Instance, Labels, Registry, Service};
use serde::Serialize;

/// The default namespace and visibility every service is attributed to.
/// Neither upstream flavor reports a namespace or export scope, so both
/// flavors share this one fixed value, mirroring the original's
/// `IstioDefaultConfigNamespace` / `VisibilityPublic` constants.
pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ServiceAttributes {
    pub name: String,
    pub namespace: String,
    pub export_to_public: bool,
}

/// A service-mesh-facing view of a [`Service`]: the shape the control
/// plane's service discovery API consumes, independent of which upstream
/// flavor produced the underlying data.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MeshService {
    pub hostname: String,
    pub ports: Vec<MeshPort>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MeshPort {
    pub name: String,
    pub port: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MeshServiceInstance {
    pub address: String,
    pub family: AddressFamily,
    pub port: MeshPort,
    pub labels: registry_adapter_core::Labels,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AddressFamily {
    Tcp,
}

/// The adapter facade: the single entry point the mesh control plane
/// queries. Every method is a thin, synchronous read from the shared
/// registry — no upstream I/O happens here, matching the facade's role
/// as a read-only boundary in front of the reconciliation loop's writes.
#[derive(Clone)]
pub struct AdapterFacade {
    registry: Registry,
}

impl AdapterFacade {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn services(&self) -> Vec<MeshService> {
        self.registry.list().iter().map(|s| to_mesh_service(s)).collect()
    }

    pub fn get_service(&self, hostname: &str) -> Option<MeshService> {
        self.registry.get(hostname).map(|s| to_mesh_service(&s))
    }

    /// Filters `hostname`'s instances to those whose port-protocol name is
    /// in `port_names` (any port matches when `port_names` is empty) and
    /// whose labels are a superset of `labels` — the Rust analogue of the
    /// original's `name == instance.Port.Protocol && labels.HasSubsetOf(i.Labels)`.
    pub fn instances(&self, hostname: &str, port_names: &[String], labels: &Labels) -> Vec<MeshServiceInstance> {
        self.registry
            .instances_of(hostname)
            .iter()
            .filter(|i| port_names.is_empty() || port_names.iter().any(|name| name == &i.port.protocol))
            .filter(|i| has_subset_of(labels, &i.labels))
            .map(to_mesh_instance)
            .collect()
    }

    pub fn instances_by_port(&self, hostname: &str, port: u32, labels: &Labels) -> Vec<MeshServiceInstance> {
        self.registry
            .instances_of(hostname)
            .iter()
            .filter(|i| port == 0 || i.port.as_u32() == port)
            .filter(|i| has_subset_of(labels, &i.labels))
            .map(to_mesh_instance)
            .collect()
    }

    /// Finds instances reachable at any of the given addresses,
    /// regardless of which service they belong to — used to resolve a
    /// proxy's own workload identity back to its mesh-visible instances.
    pub fn proxy_service_instances(&self, addresses: &[String]) -> Vec<MeshServiceInstance> {
        self.registry
            .instances_by_hosts(addresses)
            .iter()
            .map(to_mesh_instance)
            .collect()
    }

    /// Always returns the single placeholder identity this adapter is
    /// grounded on. Workload-level identity is out of scope for either
    /// upstream flavor (neither reports a SPIFFE identity), so this
    /// mirrors the upstream's own fixed placeholder rather than
    /// inventing identity derivation this adapter has no data for.
    pub fn istio_service_accounts(&self, _hostname: &str) -> Vec<String> {
        vec!["spiffe://cluster.local/ns/default/sa/default".to_string()]
    }

    /// Returns the fixed attribute set every known service carries:
    /// public export scope and the default namespace. `None` when the
    /// hostname isn't in the registry, mirroring the original returning
    /// an error when `GetService` can't find it.
    pub fn service_attributes(&self, hostname: &str) -> Option<ServiceAttributes> {
        self.registry.get(hostname).map(|_| ServiceAttributes {
            name: hostname.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            export_to_public: true,
        })
    }
}

fn has_subset_of(query: &Labels, candidate: &Labels) -> bool {
    query.iter().all(|(key, value)| candidate.get(key) == Some(value))
}

fn to_mesh_service(service: &Service) -> MeshService {
    MeshService {
        hostname: service.hostname().to_string(),
        ports: service
            .ports()
            .iter()
            .map(|p| MeshPort {
                name: p.protocol.clone(),
                port: p.as_u32(),
            })
            .collect(),
    }
}

fn to_mesh_instance(instance: &Instance) -> MeshServiceInstance {
    MeshServiceInstance {
        address: instance.host.clone(),
        family: AddressFamily::Tcp,
        port: MeshPort {
            name: instance.port.protocol.clone(),
            port: instance.port.as_u32(),
        },
        labels: instance.labels.clone(),
    }
}
