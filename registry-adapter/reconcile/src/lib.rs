//! Registry Adapter Reconcile
//!
//! The reconciliation loop (tick-driven fetch-diff-apply over the
//! registry), the event bus that loop publishes to, and the adapter
//! facade that serves the mesh-facing query API off the same registry.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod bus;
mod facade;
mod metrics;
mod reconcile;

pub use bus::{EventBus, EventBusReceiver};
pub use facade::{
    AdapterFacade, AddressFamily, MeshPort, MeshService, MeshServiceInstance, ServiceAttributes,
    DEFAULT_NAMESPACE,
};
pub use metrics::ReconcileMetrics;
pub use reconcile::{clamp_refresh_period, run_dns_vip_loop, run_rpc_interface_loop, MIN_REFRESH_PERIOD};
