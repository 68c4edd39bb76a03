//! Registry Adapter RPC-DNS
//!
//! The RPC-to-DNS watcher: the `RpcService` CRD, the DNS backend
//! abstraction with its REST and etcd implementations, and the
//! dispatch loop tying cluster `Service`/`Pod` watches to DNS record
//! publication.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod cache;
mod crd;
mod dispatch;
mod dns_backend;
mod metrics;
mod watcher;

pub use cache::{resource_key, ResourceCache};
pub use crd::{RpcService, RpcServiceSpec};
pub use dispatch::{run, RpcDnsConfig};
pub use dns_backend::{DnsBackend, DnsBackendError, EtcdDnsBackend, RestDnsBackend};
pub use metrics::DnsMetrics;
pub use watcher::RpcDnsState;
