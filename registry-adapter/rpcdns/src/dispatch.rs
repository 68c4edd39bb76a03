use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::runtime::watcher::{self, Event};
use kube::{Api, Client, ResourceExt};
use tracing::warn;

use crate::cache::{resource_key, ResourceCache};
use crate::crd::RpcService;
use crate::dns_backend::DnsBackend;
use crate::metrics::DnsMetrics;
use crate::watcher::RpcDnsState;

#[derive(Clone, Debug)]
pub struct RpcDnsConfig {
    pub pod_interface_port: u16,
    pub retry_interval: Duration,
}

impl Default for RpcDnsConfig {
    fn default() -> Self {
        Self {
            pod_interface_port: 10006,
            retry_interval: Duration::from_secs(10),
        }
    }
}

fn obj_key<T>(obj: &T) -> String
where
    T: kube::Resource,
    T::DynamicType: Default,
{
    resource_key(&obj.namespace().unwrap_or_default(), &obj.name_any())
}

/// The single dispatch loop: merges the rpcservice, cluster `Service`
/// and `Pod` watch streams with a retry ticker, driving every change
/// through [`RpcDnsState`] one event at a time. There is exactly one
/// writer of the shared caches and state, so no locking is needed —
/// this mirrors the original's single `main` select loop over sync,
/// delete, service, pod and timer channels.
pub async fn run(client: Client, dns: Arc<dyn DnsBackend>, metrics: DnsMetrics, config: RpcDnsConfig) {
    let mut state = match RpcDnsState::new(dns, config.pod_interface_port) {
        Ok(state) => state.with_metrics(metrics),
        Err(error) => {
            warn!(%error, "failed to build rpc-to-dns http client");
            return;
        }
    };
    let mut services_cache: ResourceCache<Service> = ResourceCache::new();
    let mut pods_cache: ResourceCache<Pod> = ResourceCache::new();

    let rpc_api: Api<RpcService> = Api::all(client.clone());
    let svc_api: Api<Service> = Api::all(client.clone());
    let pod_api: Api<Pod> = Api::all(client.clone());

    let mut rpc_stream = watcher::watcher(rpc_api, watcher::Config::default()).boxed();
    let mut svc_stream = watcher::watcher(svc_api, watcher::Config::default()).boxed();
    let mut pod_stream = watcher::watcher(pod_api, watcher::Config::default()).boxed();
    let mut ticker = tokio::time::interval(config.retry_interval);

    loop {
        tokio::select! {
            Some(event) = rpc_stream.next() => {
                match event {
                    Ok(Event::InitApply(rs)) | Ok(Event::Apply(rs)) => {
                        let key = obj_key(&rs);
                        state.upsert_rpc_service(key.clone(), rs.clone());
                        state.sync(&key, &rs, &services_cache, &pods_cache).await;
                    }
                    Ok(Event::Delete(rs)) => {
                        let key = obj_key(&rs);
                        if let Some(rs) = state.forget_rpc_service(&key) {
                            state.delete(&key, &rs).await;
                        }
                    }
                    Ok(Event::Init) | Ok(Event::InitDone) => {}
                    Err(error) => warn!(%error, "rpcservice watch error"),
                }
            }
            Some(event) = svc_stream.next() => {
                match event {
                    Ok(Event::InitApply(svc)) | Ok(Event::Apply(svc)) => {
                        let key = obj_key(&svc);
                        services_cache.apply(key.clone(), svc);
                        resync_owner(&mut state, state.rpc_service_for_service(&key), &services_cache, &pods_cache).await;
                    }
                    Ok(Event::Delete(svc)) => {
                        let key = obj_key(&svc);
                        services_cache.delete(&key);
                        if let Some(rpc_key) = state.rpc_service_for_service(&key) {
                            if let Some(rs) = state.known_rpc_service(&rpc_key) {
                                state.delete(&rpc_key, &rs).await;
                            }
                        }
                    }
                    Ok(Event::Init) | Ok(Event::InitDone) => {}
                    Err(error) => warn!(%error, "service watch error"),
                }
            }
            Some(event) = pod_stream.next() => {
                match event {
                    Ok(Event::InitApply(pod)) | Ok(Event::Apply(pod)) => {
                        let key = obj_key(&pod);
                        pods_cache.apply(key.clone(), pod);
                        resync_owner(&mut state, state.rpc_service_for_pod(&key), &services_cache, &pods_cache).await;
                    }
                    Ok(Event::Delete(pod)) => {
                        let key = obj_key(&pod);
                        pods_cache.delete(&key);
                        // A pod disappearing re-resolves the service rather than
                        // tearing down its dns record: other pods may still serve it.
                        resync_owner(&mut state, state.rpc_service_for_pod(&key), &services_cache, &pods_cache).await;
                    }
                    Ok(Event::Init) | Ok(Event::InitDone) => {}
                    Err(error) => warn!(%error, "pod watch error"),
                }
            }
            _ = ticker.tick() => {
                state.retry_pending(&services_cache, &pods_cache).await;
            }
        }
    }
}

async fn resync_owner(
    state: &mut RpcDnsState,
    rpc_key: Option<String>,
    services: &ResourceCache<Service>,
    pods: &ResourceCache<Pod>,
) {
    let Some(rpc_key) = rpc_key else { return };
    let Some(rs) = state.known_rpc_service(&rpc_key) else { return };
    state.sync(&rpc_key, &rs, services, pods).await;
}
