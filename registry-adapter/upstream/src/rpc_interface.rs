use std::time::Duration;

use ahash::AHashMap;
use registry_adapter_core::normalize::group_into_services;
use registry_adapter_core::{Hostname, Instance, Port, Service};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::UpstreamError;

/// Static configuration for the RPC-interface upstream client.
#[derive(Clone, Debug)]
pub struct RpcInterfaceConfig {
    pub base_url: String,
    pub app_id: String,
    pub erp: String,
    pub token: String,
    pub timeout: Duration,
}

impl Default for RpcInterfaceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            app_id: String::new(),
            erp: String::new(),
            token: String::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    #[serde(rename = "appId")]
    app_id: &'a str,
    erp: &'a str,
    token: &'a str,
    #[serde(rename = "interfaceName")]
    interface_name: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct InstanceRecord {
    #[serde(rename = "insKey")]
    ins_key: String,
    ip: String,
    weight: i64,
    pid: i64,
    room: i64,
    #[serde(rename = "srcType")]
    src_type: i64,
    timeout: i64,
    #[serde(rename = "optType")]
    opt_type: i64,
    random: bool,
    protocol: i64,
    #[serde(rename = "uniqKey")]
    uniq_key: String,
    port: i64,
    alias: String,
    #[serde(rename = "delTime")]
    del_time: i64,
    #[serde(rename = "startTime")]
    start_time: i64,
    #[serde(rename = "interfaceName")]
    interface_name: String,
    status: i64,
}

#[derive(Debug, Deserialize)]
struct ServiceResponse {
    #[allow(dead_code)]
    code: i64,
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Vec<InstanceRecord>,
}

/// Client for the RPC-interface upstream registry: queries an
/// interface's live instance list over a signed-free JSON POST.
pub struct RpcInterfaceClient {
    http: reqwest::Client,
    config: RpcInterfaceConfig,
}

impl RpcInterfaceClient {
    pub fn new(config: RpcInterfaceConfig) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    /// Fetches and normalizes the instances currently registered for
    /// `interface_name`. Instances are kept only when both `status == 1`
    /// and `optType == 1` (alive and online); a response the upstream
    /// marks unsuccessful is treated as "no instances", not a hard error.
    pub async fn fetch_service(
        &self,
        interface_name: &str,
    ) -> Result<AHashMap<Hostname, Service>, UpstreamError> {
        let body = QueryRequest {
            app_id: &self.config.app_id,
            erp: &self.config.erp,
            token: &self.config.token,
            interface_name,
        };

        let resp = self
            .http
            .post(&self.config.base_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let raw = resp.text().await?;
        let parsed: ServiceResponse = serde_json::from_str(&raw)?;

        if !parsed.success {
            debug!(interface_name, msg = %parsed.message, "rpc-interface upstream reported failure");
            return Ok(AHashMap::new());
        }

        Ok(normalize(parsed.result))
    }
}

fn normalize(records: Vec<InstanceRecord>) -> AHashMap<Hostname, Service> {
    let pairs = records
        .into_iter()
        .filter(|r| r.status == 1 && r.opt_type == 1)
        .map(|r| {
            let mut instance = Instance::new(
                r.ip.clone(),
                Port::new(r.protocol.to_string(), r.port.to_string()),
                r.interface_name.clone(),
            );
            instance.labels.insert("insKey".into(), r.ins_key);
            instance.labels.insert("weight".into(), r.weight.to_string());
            instance.labels.insert("pid".into(), r.pid.to_string());
            instance.labels.insert("room".into(), r.room.to_string());
            instance.labels.insert("srcType".into(), r.src_type.to_string());
            instance.labels.insert("timeout".into(), r.timeout.to_string());
            instance.labels.insert("optType".into(), r.opt_type.to_string());
            instance.labels.insert("random".into(), r.random.to_string());
            instance.labels.insert("uniqKey".into(), r.uniq_key);
            instance.labels.insert("alias".into(), r.alias);
            instance.labels.insert("delTime".into(), r.del_time.to_string());
            instance.labels.insert("startTime".into(), r.start_time.to_string());
            instance.labels.insert("interfaceName".into(), r.interface_name.clone());
            instance.labels.insert("status".into(), r.status.to_string());
            instance.labels.insert("protocol".into(), r.protocol.to_string());
            (r.interface_name, instance)
        });

    group_into_services(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: i64, opt_type: i64) -> InstanceRecord {
        InstanceRecord {
            ins_key: "k1".into(),
            ip: "10.0.0.1".into(),
            weight: 10,
            pid: 1,
            room: 1,
            src_type: 1,
            timeout: 3000,
            opt_type,
            random: false,
            protocol: 1,
            uniq_key: "u1".into(),
            port: 20880,
            alias: "alias1".into(),
            del_time: 0,
            start_time: 1700000000,
            interface_name: "com.example.Svc".into(),
            status,
        }
    }

    #[test]
    fn normalize_keeps_only_alive_and_online() {
        let records = vec![record(1, 1), record(0, 1), record(1, 0)];
        let services = normalize(records);
        assert_eq!(services.len(), 1);
        assert_eq!(services["com.example.Svc"].instances().len(), 1);
    }

    #[test]
    fn normalize_uses_interface_name_as_hostname() {
        let services = normalize(vec![record(1, 1)]);
        assert!(services.contains_key("com.example.Svc"));
    }

    #[test]
    fn normalize_preserves_all_fields_as_labels() {
        let services = normalize(vec![record(1, 1)]);
        let inst = &services["com.example.Svc"].instances()[0];
        assert_eq!(inst.labels.get("insKey"), Some(&"k1".to_string()));
        assert_eq!(inst.labels.get("alias"), Some(&"alias1".to_string()));
    }
}
