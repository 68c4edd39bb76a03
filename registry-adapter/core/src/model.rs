use crate::Hostname;
use std::collections::BTreeMap;

/// An arbitrary string-to-string label map. Keys are unique; insertion
/// order is irrelevant, so a `BTreeMap` gives us deterministic iteration
/// for free without needing a separate ordered-set wrapper.
pub type Labels = BTreeMap<String, String>;

/// A `(protocol, port)` pair. `port` is kept as the upstream's decimal
/// string representation; [`Port::as_u32`] parses it for numeric
/// comparisons, yielding `0` for a malformed value rather than failing
/// the whole record (matching the upstream's "skip-with-log" posture for
/// individual fields).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Port {
    pub protocol: String,
    pub port: String,
}

impl Port {
    pub fn new(protocol: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            port: port.into(),
        }
    }

    /// Parses the port string into an integer, returning `0` if it is not
    /// a valid decimal number.
    pub fn as_u32(&self) -> u32 {
        self.port.parse().unwrap_or(0)
    }
}

/// A reachable endpoint of a service.
///
/// `service` names the owning service's hostname. It is a lookup
/// convenience, not ownership: the back-pointer described by the
/// specification is expressed here as the stable hostname key rather
/// than a reference cycle, so the registry can freely swap `Service`
/// values without invalidating instances that refer to them.
///
/// Identity for diffing purposes is `(host, port.port, port.protocol)`;
/// `labels` and `service` are not part of identity.
#[derive(Clone, Debug)]
pub struct Instance {
    pub host: String,
    pub port: Port,
    pub labels: Labels,
    pub service: Hostname,
}

impl Instance {
    pub fn new(host: impl Into<String>, port: Port, service: Hostname) -> Self {
        Self {
            host: host.into(),
            port,
            labels: Labels::new(),
            service,
        }
    }

    fn identity(&self) -> (&str, &str, &str) {
        (self.host.as_str(), self.port.port.as_str(), self.port.protocol.as_str())
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Instance {}

/// A service identified by a stable `hostname`. Ports are deduplicated on
/// `(protocol, port)`; every instance's port must already appear in
/// `ports` (callers build a `Service` through [`Service::push_instance`]
/// to uphold this).
#[derive(Clone, Debug)]
pub struct Service {
    hostname: Hostname,
    ports: Vec<Port>,
    instances: Vec<Instance>,
}

impl Service {
    pub fn new(hostname: impl Into<Hostname>) -> Self {
        Self {
            hostname: hostname.into(),
            ports: Vec::new(),
            instances: Vec::new(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    /// Appends a port to the service's port list if it is not already
    /// present, deduplicating on `(protocol, port)`.
    pub fn add_port(&mut self, port: Port) {
        if !self.ports.iter().any(|p| p.port == port.port && p.protocol == port.protocol) {
            self.ports.push(port);
        }
    }

    /// Adds an instance, registering its port on the service's port list.
    pub fn push_instance(&mut self, instance: Instance) {
        self.add_port(instance.port.clone());
        self.instances.push(instance);
    }
}
