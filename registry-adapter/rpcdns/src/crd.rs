use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Declares an RPC interface that should be published under a DNS
/// suffix: find the cluster `Service` matching `selector`, resolve the
/// interfaces its pods report, and write each as a DNS record pointing
/// at the service's cluster IP.
#[derive(Clone, Debug, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "registryadapter.io",
    version = "v1",
    kind = "RpcService",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct RpcServiceSpec {
    pub selector: BTreeMap<String, String>,
    pub domain_suffix: String,
}
