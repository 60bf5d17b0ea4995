use super::{
    nutanix::{self, DEFAULT_PRISM_PORT},
    Architecture, ClusterNetworkEntry, Hyperthreading, InstallConfig, MachineNetworkEntry, MachinePool, Networking,
    PublishingStrategy, MACHINE_POOL_COMPUTE_ROLE_NAME, MACHINE_POOL_CONTROL_PLANE_ROLE_NAME,
};
use crate::ipnet::IpNet;
use lazy_static::lazy_static;
use std::{net::IpAddr, net::Ipv4Addr};

pub(crate) const DEFAULT_NETWORK_TYPE: &str = "OVNKubernetes";
pub(crate) const DEFAULT_REPLICAS: i64 = 3;
pub(crate) const DEFAULT_HOST_PREFIX: i32 = 23;

lazy_static! {
    pub(crate) static ref DEFAULT_MACHINE_CIDR: IpNet = IpNet {
        addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 0)),
        prefix: 16,
    };
    pub(crate) static ref DEFAULT_SERVICE_NETWORK: IpNet = IpNet {
        addr: IpAddr::V4(Ipv4Addr::new(172, 30, 0, 0)),
        prefix: 16,
    };
    pub(crate) static ref DEFAULT_CLUSTER_NETWORK: IpNet = IpNet {
        addr: IpAddr::V4(Ipv4Addr::new(10, 128, 0, 0)),
        prefix: 14,
    };
}

pub(crate) fn set_install_config_defaults(c: &mut InstallConfig) {
    if c.networking.is_none() {
        c.networking = Some(Networking::default());
    }
    if let Some(networking) = c.networking.as_mut() {
        set_networking_defaults(networking);
    }

    if c.control_plane.is_none() {
        c.control_plane = Some(MachinePool::default());
    }
    if let Some(control_plane) = c.control_plane.as_mut() {
        if control_plane.name.is_empty() {
            control_plane.name = MACHINE_POOL_CONTROL_PLANE_ROLE_NAME.to_string();
        }
        set_machine_pool_defaults(control_plane);
    }

    if c.compute.is_empty() {
        c.compute = vec![MachinePool {
            name: MACHINE_POOL_COMPUTE_ROLE_NAME.to_string(),
            ..Default::default()
        }];
    }
    for compute in c.compute.iter_mut() {
        set_machine_pool_defaults(compute);
    }

    if c.publish.is_empty() {
        c.publish = PublishingStrategy::External.to_string();
    }

    if let Some(nutanix) = c.platform.nutanix.as_mut() {
        set_nutanix_platform_defaults(nutanix);
    }
}

fn set_networking_defaults(networking: &mut Networking) {
    if networking.network_type.is_empty() {
        networking.network_type = DEFAULT_NETWORK_TYPE.to_string();
    }
    if networking.machine_network.is_empty() {
        networking.machine_network = vec![MachineNetworkEntry {
            cidr: *DEFAULT_MACHINE_CIDR,
        }];
    }
    if networking.service_network.is_empty() {
        networking.service_network = vec![*DEFAULT_SERVICE_NETWORK];
    }
    if networking.cluster_network.is_empty() {
        networking.cluster_network = vec![ClusterNetworkEntry {
            cidr: *DEFAULT_CLUSTER_NETWORK,
            host_prefix: DEFAULT_HOST_PREFIX,
        }];
    }
}

fn set_machine_pool_defaults(pool: &mut MachinePool) {
    if pool.replicas.is_none() {
        pool.replicas = Some(DEFAULT_REPLICAS);
    }
    if pool.hyperthreading.is_empty() {
        pool.hyperthreading = Hyperthreading::Enabled.to_string();
    }
    if pool.architecture.is_empty() {
        pool.architecture = Architecture::Amd64.to_string();
    }
}

fn set_nutanix_platform_defaults(platform: &mut nutanix::Platform) {
    if platform.prism_central.endpoint.port == 0 {
        platform.prism_central.endpoint.port = DEFAULT_PRISM_PORT;
    }
    for prism_element in platform.prism_elements.iter_mut() {
        if prism_element.endpoint.port == 0 {
            prism_element.endpoint.port = DEFAULT_PRISM_PORT;
        }
    }
    for failure_domain in platform.failure_domains.iter_mut() {
        if failure_domain.prism_element.endpoint.port == 0 {
            failure_domain.prism_element.endpoint.port = DEFAULT_PRISM_PORT;
        }
    }

    ipv4_first(&mut platform.api_vips);
    ipv4_first(&mut platform.ingress_vips);
}

/// A dual-stack VIP pair is always stored IPv4 first
fn ipv4_first(vips: &mut [String]) {
    if let [first, second] = vips {
        let (Ok(first_ip), Ok(second_ip)) = (first.parse::<IpAddr>(), second.parse::<IpAddr>()) else {
            return;
        };
        if first_ip.is_ipv6() && second_ip.is_ipv4() {
            std::mem::swap(first, second);
        }
    }
}

/// The Nutanix machine pool every role starts from, before the platform-wide
/// defaultMachinePlatform and the pool's own settings are layered on top
pub(crate) fn default_nutanix_machine_pool(role: &str) -> nutanix::MachinePool {
    nutanix::MachinePool {
        num_cpus: if role == MACHINE_POOL_CONTROL_PLANE_ROLE_NAME { 8 } else { 4 },
        num_cores_per_socket: 1,
        memory_mib: 16384,
        os_disk: nutanix::OsDisk { disk_size_gib: 120 },
        ..Default::default()
    }
}

/// The effective Nutanix settings for a pool: role defaults, then defaultMachinePlatform, then the
/// pool's own platform section
pub(crate) fn effective_nutanix_machine_pool(platform: &nutanix::Platform, pool: &MachinePool, role: &str) -> nutanix::MachinePool {
    let mut mpool = default_nutanix_machine_pool(role);
    mpool.set(platform.default_machine_platform.as_ref());
    mpool.set(pool.platform.nutanix.as_ref());
    mpool
}
