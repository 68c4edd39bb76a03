use std::time::Duration;

use ahash::AHashMap;
use registry_adapter_core::normalize::group_into_services;
use registry_adapter_core::{Hostname, Instance, Port, Service, UrlDescriptor};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::UpstreamError;
use crate::signing::sign_request;

/// Static configuration for the DNS/VIP upstream client. `app_code`,
/// `erp` and `secret_key` are the credentials the upstream's signature
/// scheme is built from.
#[derive(Clone, Debug)]
pub struct DnsVipConfig {
    pub base_url: String,
    pub app_code: String,
    pub erp: String,
    pub secret_key: String,
    pub timeout: Duration,
}

impl Default for DnsVipConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            app_code: String::new(),
            erp: String::new(),
            secret_key: String::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JdNpDnsResponse {
    #[allow(dead_code)]
    app_code: String,
    res_status: i64,
    res_msg: String,
    #[serde(default)]
    data: Vec<String>,
}

/// Client for the DNS/VIP upstream registry: queries a domain's current
/// IP set over signed HTTP GET requests.
pub struct DnsVipClient {
    http: reqwest::Client,
    config: DnsVipConfig,
}

impl DnsVipClient {
    pub fn new(config: DnsVipConfig) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    /// Fetches the current IP list backing `domain`. A non-200
    /// `resStatus` is an upstream-reported failure, not "no instances" —
    /// it is returned as `Err(UpstreamError::NonSuccess)` so the caller's
    /// fetch-error path skips the tick for this domain instead of pruning
    /// it. Only a genuinely empty `data` array means "no instances".
    pub async fn fetch_domain_ips(&self, domain: &str) -> Result<Vec<String>, UpstreamError> {
        let (timestamp, sign) = sign_request(&self.config.erp, &self.config.secret_key);

        let resp = self
            .http
            .get(&self.config.base_url)
            .query(&[("domain", domain)])
            .header("appCode", &self.config.app_code)
            .header("erp", &self.config.erp)
            .header("timestamp", timestamp)
            .header("sign", sign)
            .send()
            .await?
            .error_for_status()?;

        let body = resp.text().await?;
        let parsed: JdNpDnsResponse = serde_json::from_str(&body)?;

        if parsed.res_status != 200 {
            return Err(UpstreamError::NonSuccess {
                status: parsed.res_status,
                message: parsed.res_msg,
            });
        }
        if parsed.data.is_empty() {
            debug!(domain, "dns/vip upstream returned no ip entries");
        }
        Ok(parsed.data)
    }
}

/// Cross-products a domain's fetched IPs with its whitelisted URL
/// descriptors to build the services that back that domain, mirroring
/// the upstream's own IP x URL expansion: every IP reachable at every
/// whitelisted scheme/port/path/query combination becomes one instance.
pub fn normalize(ips: &[String], urls: &[UrlDescriptor]) -> AHashMap<Hostname, Service> {
    if ips.is_empty() || urls.is_empty() {
        if urls.is_empty() {
            warn!("no whitelisted urls for domain; skipping normalization");
        }
        return AHashMap::new();
    }

    let pairs = ips.iter().flat_map(|ip| {
        urls.iter().map(move |url| {
            let mut labels = url.query.clone();
            if !url.path.is_empty() {
                labels.insert("path".to_string(), url.path.clone());
            }
            let instance = Instance {
                host: ip.clone(),
                port: Port::new(url.scheme.clone(), url.port.clone()),
                labels,
                service: url.domain.clone(),
            };
            (url.domain.clone(), instance)
        })
    });

    group_into_services(pairs)
}
