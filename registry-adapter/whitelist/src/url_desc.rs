use ahash::AHashMap;
use registry_adapter_core::{Labels, UrlDescriptor};
use tracing::debug;
use url::Url;

/// A parsed whitelist: the raw comma-separated entries (used directly as
/// hostnames by registry flavors that whitelist by plain name, such as
/// RPC-interface), plus the subset that parse as URLs grouped by domain
/// (used by the DNS/VIP flavor, which whitelists `scheme://host:port/path?query`
/// entries and needs the scheme/port/path/query per domain).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedWhitelist {
    pub entries: Vec<String>,
    pub by_domain: AHashMap<String, Vec<UrlDescriptor>>,
}

/// Splits a comma-separated whitelist string into trimmed, non-empty
/// entries, then groups the URL-shaped ones by domain. An entry that
/// does not parse as a URL is kept in `entries` but contributes nothing
/// to `by_domain` — it is still usable as a plain domain/interface name.
pub fn parse(raw: &str) -> ParsedWhitelist {
    let mut entries = Vec::new();
    let mut by_domain: AHashMap<String, Vec<UrlDescriptor>> = AHashMap::new();

    for part in raw.split(',') {
        let entry = part.trim();
        if entry.is_empty() {
            continue;
        }
        entries.push(entry.to_string());

        match Url::parse(entry) {
            Ok(url) => match url.host_str() {
                Some(host) => {
                    let descriptor = to_descriptor(host, &url);
                    by_domain.entry(host.to_string()).or_default().push(descriptor);
                }
                None => debug!(entry, "whitelist url has no host; treating as plain name"),
            },
            Err(_) => debug!(entry, "whitelist entry is not a url; treating as plain name"),
        }
    }

    ParsedWhitelist { entries, by_domain }
}

fn to_descriptor(host: &str, url: &Url) -> UrlDescriptor {
    let port = url
        .port()
        .map(|p| p.to_string())
        .unwrap_or_else(|| default_port_for_scheme(url.scheme()).to_string());

    let mut query = Labels::new();
    for (key, value) in url.query_pairs() {
        query.insert(key.into_owned(), value.into_owned());
    }

    UrlDescriptor {
        domain: host.to_string(),
        scheme: url.scheme().to_string(),
        port,
        path: url.path().to_string(),
        query,
    }
}

fn default_port_for_scheme(scheme: &str) -> u16 {
    match scheme {
        "https" => 443,
        _ => 80,
    }
}
