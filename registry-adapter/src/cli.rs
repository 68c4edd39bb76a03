use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use prometheus_client::registry::Registry as MetricsRegistry;
use registry_adapter_core::Registry;
use registry_adapter_reconcile::EventBus;
use registry_adapter_rpcdns::{DnsBackend, EtcdDnsBackend, RestDnsBackend, RpcDnsConfig};
use registry_adapter_upstream::{DnsVipClient, DnsVipConfig, RpcInterfaceClient, RpcInterfaceConfig};
use registry_adapter_whitelist::WhitelistSourceConfig;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "registry-adapter", about = "Service-registry adapter control-plane bridge")]
pub struct Args {
    #[clap(long, default_value = "registry_adapter=info,warn", env = "REGISTRY_ADAPTER_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Disables the DNS/VIP upstream reconciliation loop.
    #[clap(long)]
    dns_vip_disabled: bool,

    /// Disables the RPC-interface upstream reconciliation loop.
    #[clap(long)]
    rpc_interface_disabled: bool,

    /// Disables the RPC-to-DNS CRD watcher.
    #[clap(long)]
    rpc_dns_disabled: bool,

    #[clap(long, env = "REGISTRY_ADAPTER_DNS_VIP_BASE_URL", default_value = "")]
    dns_vip_base_url: String,

    #[clap(long, env = "REGISTRY_ADAPTER_DNS_VIP_APP_CODE", default_value = "")]
    dns_vip_app_code: String,

    #[clap(long, env = "REGISTRY_ADAPTER_DNS_VIP_ERP", default_value = "")]
    dns_vip_erp: String,

    #[clap(long, env = "REGISTRY_ADAPTER_DNS_VIP_SECRET_KEY", default_value = "")]
    dns_vip_secret_key: String,

    #[clap(long, env = "REGISTRY_ADAPTER_RPC_INTERFACE_BASE_URL", default_value = "")]
    rpc_interface_base_url: String,

    #[clap(long, env = "REGISTRY_ADAPTER_RPC_INTERFACE_APP_ID", default_value = "")]
    rpc_interface_app_id: String,

    #[clap(long, env = "REGISTRY_ADAPTER_RPC_INTERFACE_ERP", default_value = "")]
    rpc_interface_erp: String,

    #[clap(long, env = "REGISTRY_ADAPTER_RPC_INTERFACE_TOKEN", default_value = "")]
    rpc_interface_token: String,

    #[clap(long, default_value = "10")]
    upstream_timeout_secs: u64,

    #[clap(long, default_value = "60")]
    refresh_period_secs: u64,

    #[clap(long, default_value = "registry-adapter")]
    whitelist_namespace: String,

    #[clap(long, default_value = "app=registry-adapter-whitelist")]
    whitelist_label_selector: String,

    #[clap(long, default_value = "registry-adapter-whitelist")]
    whitelist_configmap_name: String,

    #[clap(long, default_value = "whiteList")]
    whitelist_data_key: String,

    #[clap(long, default_value = "256")]
    event_bus_capacity: usize,

    /// Base address of a REST-fronted coredns shim. Mutually exclusive
    /// with `--dns-backend-etcd-endpoints`; whichever is set selects the
    /// active `DnsBackend` implementation.
    #[clap(long)]
    dns_backend_rest_address: Option<String>,

    #[clap(long, value_delimiter = ',')]
    dns_backend_etcd_endpoints: Option<Vec<String>>,

    #[clap(long, default_value = "10006")]
    rpc_pod_interface_port: u16,

    #[clap(long, default_value = "10")]
    rpc_dns_retry_interval_secs: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let mut metrics = <MetricsRegistry>::default();
        let reconcile_metrics = registry_adapter_reconcile::ReconcileMetrics::register(&mut metrics);
        let dns_metrics = registry_adapter_rpcdns::DnsMetrics::register(&mut metrics);

        let runtime = kubert::Runtime::builder()
            .with_log(self.log_level.clone(), self.log_format.clone())
            .with_admin(self.admin.clone().into_builder().with_prometheus(metrics))
            .with_client(self.client.clone())
            .build()
            .await?;

        let registry = Registry::default();
        let (bus, mut bus_rx) = EventBus::channel(self.event_bus_capacity);

        tokio::spawn(
            async move {
                while let Some(event) = bus_rx.recv().await {
                    tracing::trace!(?event, "service event");
                }
            }
            .instrument(info_span!("event_bus_drain")),
        );

        let client = runtime.client();

        if !self.dns_vip_disabled {
            let config = WhitelistSourceConfig {
                namespace: self.whitelist_namespace.clone(),
                label_selector: self.whitelist_label_selector.clone(),
                configmap_name: self.whitelist_configmap_name.clone(),
                data_key: self.whitelist_data_key.clone(),
            };
            let (mut whitelist, driver) = registry_adapter_whitelist::spawn(client.clone(), config);
            tokio::spawn(driver.instrument(info_span!("dns_vip_whitelist")));

            let dns_vip_client = Arc::new(DnsVipClient::new(DnsVipConfig {
                base_url: self.dns_vip_base_url.clone(),
                app_code: self.dns_vip_app_code.clone(),
                erp: self.dns_vip_erp.clone(),
                secret_key: self.dns_vip_secret_key.clone(),
                timeout: Duration::from_secs(self.upstream_timeout_secs),
            })?);

            let registry = registry.clone();
            let bus = bus.clone();
            let metrics = reconcile_metrics.clone();
            let refresh_period = Duration::from_secs(self.refresh_period_secs);
            tokio::spawn(
                async move {
                    registry_adapter_reconcile::run_dns_vip_loop(
                        dns_vip_client,
                        &mut whitelist,
                        registry,
                        bus,
                        metrics,
                        refresh_period,
                    )
                    .await;
                }
                .instrument(info_span!("dns_vip_reconcile")),
            );
        }

        if !self.rpc_interface_disabled {
            let config = WhitelistSourceConfig {
                namespace: self.whitelist_namespace.clone(),
                label_selector: format!("{},flavor=rpc-interface", self.whitelist_label_selector),
                configmap_name: format!("{}-rpc", self.whitelist_configmap_name),
                data_key: self.whitelist_data_key.clone(),
            };
            let (mut whitelist, driver) = registry_adapter_whitelist::spawn(client.clone(), config);
            tokio::spawn(driver.instrument(info_span!("rpc_interface_whitelist")));

            let rpc_client = Arc::new(RpcInterfaceClient::new(RpcInterfaceConfig {
                base_url: self.rpc_interface_base_url.clone(),
                app_id: self.rpc_interface_app_id.clone(),
                erp: self.rpc_interface_erp.clone(),
                token: self.rpc_interface_token.clone(),
                timeout: Duration::from_secs(self.upstream_timeout_secs),
            })?);

            let registry = registry.clone();
            let bus = bus.clone();
            let metrics = reconcile_metrics.clone();
            let refresh_period = Duration::from_secs(self.refresh_period_secs);
            tokio::spawn(
                async move {
                    registry_adapter_reconcile::run_rpc_interface_loop(
                        rpc_client,
                        &mut whitelist,
                        registry,
                        bus,
                        metrics,
                        refresh_period,
                    )
                    .await;
                }
                .instrument(info_span!("rpc_interface_reconcile")),
            );
        }

        if !self.rpc_dns_disabled {
            let dns_backend = self.dns_backend().await?;
            let dns_metrics = dns_metrics.clone();
            let config = RpcDnsConfig {
                pod_interface_port: self.rpc_pod_interface_port,
                retry_interval: Duration::from_secs(self.rpc_dns_retry_interval_secs),
            };
            let client = client.clone();
            tokio::spawn(
                async move {
                    registry_adapter_rpcdns::run(client, dns_backend, dns_metrics, config).await;
                }
                .instrument(info_span!("rpc_dns_watcher")),
            );
        }

        // `registry_adapter_reconcile::AdapterFacade` is the mesh-facing query
        // surface over `registry`; no wire contract is in scope for this binary,
        // so it is a library entry point for an embedding control-plane process
        // rather than something served here.

        info!("registry-adapter running");
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }

    async fn dns_backend(&self) -> Result<Arc<dyn DnsBackend>> {
        match (&self.dns_backend_rest_address, &self.dns_backend_etcd_endpoints) {
            (Some(address), None) => Ok(Arc::new(RestDnsBackend::new(address.clone())?)),
            (None, Some(endpoints)) => Ok(Arc::new(EtcdDnsBackend::connect(endpoints).await?)),
            (None, None) => bail!("one of --dns-backend-rest-address or --dns-backend-etcd-endpoints is required"),
            (Some(_), Some(_)) => bail!("--dns-backend-rest-address and --dns-backend-etcd-endpoints are mutually exclusive"),
        }
    }
}
