use crate::model::Labels;

/// A whitelisted URL, already split into the pieces the DNS/VIP
/// normalizer needs: which domain it belongs to, the scheme/port an
/// instance should be reached on, and any path/query that become
/// instance labels. Parsing a raw URL string into this shape (via the
/// `url` crate) is the whitelist source's job; this crate only holds the
/// resulting data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UrlDescriptor {
    pub domain: String,
    pub scheme: String,
    pub port: String,
    pub path: String,
    pub query: Labels,
}

impl UrlDescriptor {
    pub fn new(domain: impl Into<String>, scheme: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            scheme: scheme.into(),
            port: port.into(),
            path: String::new(),
            query: Labels::new(),
        }
    }
}
