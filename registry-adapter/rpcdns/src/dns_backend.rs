use std::time::Duration;

use async_trait::async_trait;
use etcd_client::Client as EtcdClient;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DnsBackendError {
    #[error("rest dns backend request failed: {0}")]
    Rest(#[from] reqwest::Error),

    #[error("etcd dns backend request failed: {0}")]
    Etcd(#[from] etcd_client::Error),
}

/// Publishes or removes a DNS record mapping an RPC interface name to a
/// service's cluster IP. Two implementations back this: a REST-fronted
/// coredns instance, or direct writes to the etcd store coredns' etcd
/// plugin reads from. Exactly one is active per process, chosen at
/// startup by whether a REST address was configured.
#[async_trait]
pub trait DnsBackend: Send + Sync {
    async fn update(&self, interface: &str, ip: &str, suffix: &str) -> Result<(), DnsBackendError>;
    async fn delete(&self, interface: &str, ip: &str, suffix: &str) -> Result<(), DnsBackendError>;
}

/// Talks to a coredns instance fronted by a small REST shim, rather than
/// writing its backing store directly.
pub struct RestDnsBackend {
    http: reqwest::Client,
    base_address: String,
}

#[derive(Serialize)]
struct RecordRequest<'a> {
    interface: &'a str,
    ip: &'a str,
    suffix: &'a str,
}

impl RestDnsBackend {
    pub fn new(base_address: String) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(5)).build()?;
        Ok(Self { http, base_address })
    }
}

#[async_trait]
impl DnsBackend for RestDnsBackend {
    async fn update(&self, interface: &str, ip: &str, suffix: &str) -> Result<(), DnsBackendError> {
        let url = format!("{}/dns/records", self.base_address.trim_end_matches('/'));
        self.http
            .post(url)
            .json(&RecordRequest { interface, ip, suffix })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete(&self, interface: &str, ip: &str, suffix: &str) -> Result<(), DnsBackendError> {
        let url = format!("{}/dns/records", self.base_address.trim_end_matches('/'));
        self.http
            .delete(url)
            .json(&RecordRequest { interface, ip, suffix })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Writes coredns' etcd plugin key format directly:
/// `/skydns/<suffix label>/.../<interface>` holding `{"host": ip}`.
pub struct EtcdDnsBackend {
    client: EtcdClient,
}

impl EtcdDnsBackend {
    pub async fn connect(endpoints: &[String]) -> Result<Self, DnsBackendError> {
        let client = EtcdClient::connect(endpoints, None).await?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DnsBackend for EtcdDnsBackend {
    async fn update(&self, interface: &str, ip: &str, suffix: &str) -> Result<(), DnsBackendError> {
        let key = etcd_key(interface, suffix);
        let value = serde_json::json!({ "host": ip }).to_string();
        self.client.clone().put(key, value, None).await?;
        Ok(())
    }

    async fn delete(&self, interface: &str, _ip: &str, suffix: &str) -> Result<(), DnsBackendError> {
        let key = etcd_key(interface, suffix);
        self.client.clone().delete(key, None).await?;
        Ok(())
    }
}

/// Builds the reversed-label etcd key coredns' etcd plugin expects for
/// the fully-qualified name `<interface>.<suffix>`.
fn etcd_key(interface: &str, suffix: &str) -> String {
    let fqdn = format!("{interface}.{suffix}");
    let trimmed = fqdn.trim_end_matches('.');
    let mut labels: Vec<&str> = trimmed.split('.').collect();
    labels.reverse();
    format!("/skydns/{}", labels.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etcd_key_reverses_labels() {
        assert_eq!(etcd_key("com.example.Svc", "rpc.local"), "/skydns/local/rpc/com.example.Svc");
    }

    #[test]
    fn etcd_key_strips_trailing_dot() {
        assert_eq!(etcd_key("svc", "rpc.local."), "/skydns/local/rpc/svc");
    }
}
