//! Registry Adapter Upstream
//!
//! The upstream fetcher: signed HTTP clients for the two upstream
//! registry flavors (DNS/VIP, RPC-interface) and the translation of
//! their wire responses into `registry-adapter-core` data.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod dns_vip;
mod error;
mod rpc_interface;
mod signing;

pub use dns_vip::{normalize as normalize_dns_vip, DnsVipClient, DnsVipConfig};
pub use error::UpstreamError;
pub use rpc_interface::{RpcInterfaceClient, RpcInterfaceConfig};
pub use signing::sign_request;
