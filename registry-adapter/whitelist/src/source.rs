use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::runtime::watcher::{self, Event};
use kube::{Api, Client};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::url_desc::{self, ParsedWhitelist};

pub type WhitelistSnapshot = ParsedWhitelist;

/// Identifies the single `ConfigMap` that carries the whitelist, and the
/// key within it holding the comma-separated entry list.
#[derive(Clone, Debug)]
pub struct WhitelistSourceConfig {
    pub namespace: String,
    pub label_selector: String,
    pub configmap_name: String,
    pub data_key: String,
}

/// A live view of the whitelist. Readers observe a brand-new snapshot on
/// every change — there is no incremental append, matching the
/// requirement that a whitelist update replaces the prior list wholesale.
pub struct WhitelistSource {
    rx: watch::Receiver<WhitelistSnapshot>,
    ready: watch::Receiver<bool>,
}

impl WhitelistSource {
    pub fn snapshot(&self) -> WhitelistSnapshot {
        self.rx.borrow().clone()
    }

    /// True once the underlying watch has observed its initial list, i.e.
    /// the whitelist reflects real cluster state rather than the empty
    /// default.
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.rx.changed().await
    }
}

/// Spawns the watch driver and returns a handle to read from it plus the
/// future that runs it; the caller is expected to `tokio::spawn` the
/// future.
pub fn spawn(client: Client, config: WhitelistSourceConfig) -> (WhitelistSource, impl Future<Output = ()>) {
    let (tx, rx) = watch::channel(WhitelistSnapshot::default());
    let (ready_tx, ready_rx) = watch::channel(false);

    let source = WhitelistSource { rx, ready: ready_rx };
    let driver = run(client, config, tx, ready_tx);
    (source, driver)
}

async fn run(
    client: Client,
    config: WhitelistSourceConfig,
    tx: watch::Sender<WhitelistSnapshot>,
    ready_tx: watch::Sender<bool>,
) {
    let api: Api<ConfigMap> = Api::namespaced(client, &config.namespace);
    let watcher_config = watcher::Config::default()
        .labels(&config.label_selector)
        .fields(&format!("metadata.name={}", config.configmap_name));

    let mut stream = watcher::watcher(api, watcher_config).boxed();

    loop {
        match stream.next().await {
            Some(Ok(Event::Init)) => {}
            Some(Ok(Event::InitApply(cm))) => apply(&config, &tx, &cm),
            Some(Ok(Event::InitDone)) => {
                let _ = ready_tx.send(true);
                info!("whitelist source synced");
            }
            Some(Ok(Event::Apply(cm))) => apply(&config, &tx, &cm),
            Some(Ok(Event::Delete(_))) => {
                tx.send_replace(WhitelistSnapshot::default());
            }
            Some(Err(error)) => {
                warn!(%error, "whitelist configmap watch error; retrying");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            None => return,
        }
    }
}

fn apply(config: &WhitelistSourceConfig, tx: &watch::Sender<WhitelistSnapshot>, cm: &ConfigMap) {
    let raw = cm
        .data
        .as_ref()
        .and_then(|d| d.get(&config.data_key))
        .map(String::as_str)
        .unwrap_or("");
    tx.send_replace(url_desc::parse(raw));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_parses_configured_data_key() {
        let config = WhitelistSourceConfig {
            namespace: "default".into(),
            label_selector: "app=whitelist".into(),
            configmap_name: "registry-whitelist".into(),
            data_key: "whiteList".into(),
        };
        let (tx, rx) = watch::channel(WhitelistSnapshot::default());
        let mut cm = ConfigMap::default();
        let mut data = std::collections::BTreeMap::new();
        data.insert("whiteList".to_string(), "http://svc.example.com:8080".to_string());
        cm.data = Some(data);

        apply(&config, &tx, &cm);
        let snapshot = rx.borrow().clone();
        assert_eq!(snapshot.entries, vec!["http://svc.example.com:8080"]);
    }

    #[test]
    fn apply_with_missing_key_yields_empty_snapshot() {
        let config = WhitelistSourceConfig {
            namespace: "default".into(),
            label_selector: "app=whitelist".into(),
            configmap_name: "registry-whitelist".into(),
            data_key: "whiteList".into(),
        };
        let (tx, rx) = watch::channel(WhitelistSnapshot::default());
        apply(&config, &tx, &ConfigMap::default());
        assert!(rx.borrow().entries.is_empty());
    }
}
