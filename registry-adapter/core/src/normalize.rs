use ahash::AHashMap;

use crate::model::{Instance, Service};
use crate::Hostname;

/// Groups already-translated `(hostname, instance)` pairs into services,
/// registering each instance's port on its service as it goes. This is
/// the common tail of both upstream flavors' normalizers: the DNS/VIP
/// client has already cross-produced IPs with whitelisted URLs, and the
/// RPC-interface client has already filtered to live/online instances
/// and picked their hostname from the `interfaceName` label — both just
/// need grouping into `Service`s at this point.
pub fn group_into_services(
    pairs: impl IntoIterator<Item = (Hostname, Instance)>,
) -> AHashMap<Hostname, Service> {
    let mut services: AHashMap<Hostname, Service> = AHashMap::new();
    for (hostname, instance) in pairs {
        let service = services
            .entry(hostname.clone())
            .or_insert_with(|| Service::new(hostname));
        service.push_instance(instance);
    }
    services
}
