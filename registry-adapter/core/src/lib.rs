//! Registry Adapter Core
//!
//! Holds the data model shared by every upstream registry flavor
//! (DNS/VIP, RPC-interface) and the in-memory registry that the
//! reconciliation loop writes to and the adapter facade reads from.
//! This crate performs no I/O.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod diff;
mod event;
mod model;
pub mod normalize;
mod registry;
mod url_desc;

pub use diff::subtract;
pub use event::ServiceEvent;
pub use model::{Instance, Labels, Port, Service};
pub use registry::Registry;
pub use url_desc::UrlDescriptor;

/// The stable key identifying a service: a DNS name for the DNS/VIP
/// adapter, an RPC interface fully-qualified name for the RPC adapter.
pub type Hostname = String;
