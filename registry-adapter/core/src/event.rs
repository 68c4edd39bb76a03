use std::sync::Arc;

use crate::model::{Instance, Service};

/// Change notification emitted by the reconciliation loop onto the event
/// bus. Consumers (the adapter facade's cache, the RPC-to-DNS watcher's
/// mesh-side listeners) react to these rather than polling the registry.
#[derive(Clone, Debug)]
pub enum ServiceEvent {
    ServiceAdd(Arc<Service>),
    ServiceDelete(Arc<Service>),
    ServiceInstanceAdd(Instance),
    ServiceInstanceDelete(Instance),
}
