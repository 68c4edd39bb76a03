//! Registry Adapter Whitelist
//!
//! The whitelist source: a Kubernetes `ConfigMap` watch that yields the
//! set of domains/interfaces the reconciliation loop is allowed to
//! fetch, parsed into per-domain URL groups for the DNS/VIP flavor.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod source;
mod url_desc;

pub use source::{spawn, WhitelistSnapshot, WhitelistSource, WhitelistSourceConfig};
pub use url_desc::{parse as parse_whitelist, ParsedWhitelist};
