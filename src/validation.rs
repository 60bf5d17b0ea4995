//! Install-config validation. Every check appends to an [`ErrorList`] instead of failing fast so
//! that a single run reports every problem in the config.

use crate::{
    field::{Error, ErrorList, Path},
    ipnet::IpNet,
    types::{
        defaults::effective_nutanix_machine_pool, Architecture, CredentialsMode, Hyperthreading, InstallConfig, MachinePool, Networking, Platform, PlatformName, Proxy,
        PublishingStrategy, TrustBundlePolicy, INSTALL_CONFIG_VERSION, MACHINE_POOL_COMPUTE_ROLE_NAME,
        MACHINE_POOL_CONTROL_PLANE_ROLE_NAME, MACHINE_POOL_EDGE_ROLE_NAME,
    },
    validate,
};
use itertools::Itertools;
use lazy_regex::regex_is_match;
use std::{collections::BTreeMap, collections::BTreeSet, net::IpAddr, str::FromStr};
use strum::IntoEnumIterator;

pub(crate) mod nutanix;

const AWS_PLATFORM_NAME: &str = "aws";

/// Platforms that allow `publish: Internal`
const INTERNAL_PUBLISH_PLATFORMS: &[&str] = &["alibabacloud", "aws", "azure", "gcp", "ibmcloud", "powervs"];

/// Platforms that allow `publish: Mixed`
const MIXED_PUBLISH_PLATFORMS: &[&str] = &["azure"];

const FEATURE_SETS: &[&str] = &["", "Default", "TechPreviewNoUpgrade", "DevPreviewNoUpgrade", "CustomNoUpgrade"];

const NETWORK_TYPE_KURYR: &str = "Kuryr";
const NETWORK_TYPE_OPENSHIFT_SDN: &str = "OpenShiftSDN";

/// Network plugins that carve per-node subnets out of the cluster network
const PLUGINS_USING_HOST_PREFIX: &[&str] = &["OVNKubernetes", "OpenShiftSDN"];

pub(crate) fn validate_install_config(c: &InstallConfig) -> ErrorList {
    let mut all_errs = ErrorList::new();

    if c.api_version.is_empty() {
        return vec![Error::required(Path::new("apiVersion"), "install-config version required")].into();
    }
    if c.api_version != INSTALL_CONFIG_VERSION {
        return vec![Error::invalid(
            Path::new("apiVersion"),
            c.api_version.as_str(),
            format!("install-config version must be {:?}", INSTALL_CONFIG_VERSION),
        )]
        .into();
    }

    if c.fips {
        all_errs.extend(validate_fips_config(c));
    } else if !c.ssh_key.is_empty() {
        if let Err(err) = validate::ssh_public_key(&c.ssh_key) {
            all_errs.push(Error::invalid(Path::new("sshKey"), c.ssh_key.as_str(), err.to_string()));
        }
    }

    if !c.additional_trust_bundle.is_empty() {
        if let Err(err) = validate::ca_bundle(&c.additional_trust_bundle) {
            all_errs.push(Error::invalid(
                Path::new("additionalTrustBundle"),
                c.additional_trust_bundle.as_str(),
                format!("{:#}", err),
            ));
        }
    }
    if !c.additional_trust_bundle_policy.is_empty() && TrustBundlePolicy::from_str(&c.additional_trust_bundle_policy).is_err() {
        all_errs.push(Error::invalid(
            Path::new("additionalTrustBundlePolicy"),
            c.additional_trust_bundle_policy.as_str(),
            r#"supported values "Proxyonly", "Always""#,
        ));
    }

    all_errs.extend(validate_cluster_domain(c));

    match &c.networking {
        Some(networking) => {
            let path = Path::new("networking");
            all_errs.extend(validate_networking(networking, &path));
            all_errs.extend(validate_networking_ip_version(networking, &c.platform));
            all_errs.extend(validate_cluster_network_mtu(c, &path.child("clusterNetworkMTU")));
            all_errs.extend(validate_vips_for_platform(networking, &c.platform, &Path::new("platform")));
        }
        None => all_errs.push(Error::required(Path::new("networking"), "networking is required")),
    }

    all_errs.extend(validate_platform(c, &Path::new("platform")));

    match &c.control_plane {
        Some(control_plane) => all_errs.extend(validate_control_plane(&c.platform, control_plane, &Path::new("controlPlane"))),
        None => all_errs.push(Error::required(Path::new("controlPlane"), "controlPlane is required")),
    }
    all_errs.extend(validate_compute(&c.platform, c.control_plane.as_ref(), &c.compute, &Path::new("compute")));

    if let Err(err) = validate::image_pull_secret(&c.pull_secret) {
        all_errs.push(Error::invalid(Path::new("pullSecret"), c.pull_secret.as_str(), format!("{:#}", err)));
    }

    if let Some(proxy) = &c.proxy {
        all_errs.extend(validate_proxy(proxy, c.networking.as_ref(), &Path::new("proxy")));
    }

    all_errs.extend(validate_image_digest_sources(c, &Path::new("imageDigestSources")));
    all_errs.extend(validate_publish(c));
    all_errs.extend(validate_credentials_mode(c, &Path::new("credentialsMode")));

    if !FEATURE_SETS.contains(&c.feature_set.as_str()) {
        all_errs.push(Error::not_supported(Path::new("featureSet"), c.feature_set.as_str(), &FEATURE_SETS[1..]));
    }

    all_errs
}

fn validate_cluster_domain(c: &InstallConfig) -> ErrorList {
    let mut all_errs = ErrorList::new();

    let name_err = match c.platform.known_name() {
        Some(PlatformName::Nutanix) => validate::on_prem_cluster_name(&c.metadata.name),
        _ => validate::cluster_name(&c.metadata.name),
    };
    if let Err(err) = &name_err {
        all_errs.push(Error::invalid(
            Path::new("metadata").child("name"),
            c.metadata.name.as_str(),
            err.to_string(),
        ));
    }

    let base_domain_err = validate::domain_name(&c.base_domain, true);
    if let Err(err) = &base_domain_err {
        all_errs.push(Error::invalid(Path::new("baseDomain"), c.base_domain.as_str(), err.to_string()));
    }

    if name_err.is_ok() && base_domain_err.is_ok() {
        let cluster_domain = c.cluster_domain();
        if let Err(err) = validate::domain_name(&cluster_domain, true) {
            all_errs.push(Error::invalid(Path::new("baseDomain"), cluster_domain, err.to_string()));
        }
    }

    all_errs
}

/// With FIPS enabled only RSA and ECDSA keys are usable
fn validate_fips_config(c: &InstallConfig) -> ErrorList {
    let mut all_errs = ErrorList::new();

    if c.ssh_key.is_empty() {
        return all_errs;
    }

    match validate::ssh_public_key(&c.ssh_key) {
        Err(err) => all_errs.push(Error::invalid(
            Path::new("sshKey"),
            c.ssh_key.as_str(),
            format!("Fatal error trying to parse configured public key: {}", err),
        )),
        Ok(()) => {
            let key_type = c.ssh_key.split_whitespace().next().unwrap_or_default();
            if !regex_is_match!(r"^ecdsa-sha2-nistp\d{3}$|^ssh-rsa$", key_type) {
                all_errs.push(Error::invalid(
                    Path::new("sshKey"),
                    c.ssh_key.as_str(),
                    format!("SSH key type {} unavailable when FIPS is enabled. Please use rsa or ecdsa.", key_type),
                ));
            }
        }
    }

    all_errs
}

fn validate_networking(n: &Networking, path: &Path) -> ErrorList {
    let mut all_errs = ErrorList::new();

    if n.network_type.is_empty() {
        all_errs.push(Error::required(path.child("networkType"), "network provider type required"));
    }
    if n.network_type == NETWORK_TYPE_KURYR {
        all_errs.push(Error::invalid(
            path.child("networkType"),
            n.network_type.as_str(),
            "networkType Kuryr is not supported on OpenShift later than 4.14",
        ));
    }
    if n.network_type == NETWORK_TYPE_OPENSHIFT_SDN {
        all_errs.push(Error::invalid(
            path.child("networkType"),
            n.network_type.as_str(),
            "networkType OpenShiftSDN is not supported, please use OVNKubernetes",
        ));
    }

    if n.machine_network.is_empty() {
        all_errs.push(Error::required(path.child("machineNetwork"), "at least one machine network is required"));
    }
    for (i, network) in n.machine_network.iter().enumerate() {
        let network_path = path.child("machineNetwork").index(i);
        if let Err(err) = validate::subnet_cidr(&network.cidr) {
            all_errs.push(Error::invalid(network_path.clone(), network.cidr.to_string(), err.to_string()));
        }
        for (j, other) in n.machine_network[..i].iter().enumerate() {
            if network.cidr.overlaps(&other.cidr) {
                all_errs.push(Error::invalid(
                    network_path.clone(),
                    network.cidr.to_string(),
                    format!("machine network must not overlap with machine network {}", j),
                ));
            }
        }
    }

    for (i, service_network) in n.service_network.iter().enumerate() {
        let network_path = path.child("serviceNetwork").index(i);
        if let Err(err) = validate::service_subnet_cidr(service_network) {
            all_errs.push(Error::invalid(network_path.clone(), service_network.to_string(), err.to_string()));
        }
        if n.machine_network.iter().any(|network| service_network.overlaps(&network.cidr)) {
            all_errs.push(Error::invalid(
                network_path.clone(),
                service_network.to_string(),
                "service network must not overlap with any of the machine networks",
            ));
        }
        for (j, other) in n.service_network[..i].iter().enumerate() {
            if service_network.overlaps(other) {
                all_errs.push(Error::invalid(
                    network_path.clone(),
                    service_network.to_string(),
                    format!("service network must not overlap with service network {}", j),
                ));
            }
        }
    }
    if n.service_network.is_empty() {
        all_errs.push(Error::required(path.child("serviceNetwork"), "a service network is required"));
    }

    for i in 0..n.cluster_network.len() {
        all_errs.extend(validate_cluster_network(n, i, &path.child("clusterNetwork").index(i)));
    }
    if n.cluster_network.is_empty() {
        all_errs.push(Error::required(path.child("clusterNetwork"), "cluster network required"));
    }

    all_errs
}

fn validate_cluster_network(n: &Networking, idx: usize, path: &Path) -> ErrorList {
    let mut all_errs = ErrorList::new();
    let cn = &n.cluster_network[idx];
    let cidr_path = path.child("cidr");

    if let Err(err) = validate::subnet_cidr(&cn.cidr) {
        all_errs.push(Error::invalid(cidr_path.clone(), cn.cidr.to_string(), err.to_string()));
    }
    if n.machine_network.iter().any(|network| cn.cidr.overlaps(&network.cidr)) {
        all_errs.push(Error::invalid(
            cidr_path.clone(),
            cn.cidr.to_string(),
            "cluster network must not overlap with any of the machine networks",
        ));
    }
    for (i, service_network) in n.service_network.iter().enumerate() {
        if cn.cidr.overlaps(service_network) {
            all_errs.push(Error::invalid(
                cidr_path.clone(),
                cn.cidr.to_string(),
                format!("cluster network must not overlap with service network {}", i),
            ));
        }
    }
    for (i, other) in n.cluster_network[..idx].iter().enumerate() {
        if cn.cidr.overlaps(&other.cidr) {
            all_errs.push(Error::invalid(
                cidr_path.clone(),
                cn.cidr.to_string(),
                format!("cluster network must not overlap with cluster network {}", i),
            ));
        }
    }

    if cn.host_prefix < 0 {
        all_errs.push(Error::invalid(path.child("hostPrefix"), cn.host_prefix, "hostPrefix must be positive"));
    }

    // Plugins that don't use hostPrefix may leave it unset
    if PLUGINS_USING_HOST_PREFIX.contains(&n.network_type.as_str()) || cn.host_prefix != 0 {
        if cn.host_prefix < i32::from(cn.cidr.prefix) {
            all_errs.push(Error::invalid(
                path.child("hostPrefix"),
                cn.host_prefix,
                format!("cluster network host subnetwork prefix must not be larger size than CIDR {}", cn.cidr),
            ));
        } else if !cn.cidr.is_ipv4() && cn.host_prefix != 64 {
            all_errs.push(Error::invalid(
                path.child("hostPrefix"),
                cn.host_prefix,
                "cluster network host subnetwork prefix must be 64 for IPv6 networks",
            ));
        }
    }

    all_errs
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => IpFamily::V4,
            IpAddr::V6(_) => IpFamily::V6,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct AddressFamilies {
    ipv4: bool,
    ipv6: bool,
    primary: Option<IpFamily>,
}

/// The IP families present in each networking list, keyed by the list's field name. The cluster
/// as a whole is IPv4 and/or IPv6 according to its service networks.
#[derive(Debug, Default)]
struct NetworkFamilies {
    has_ipv4: bool,
    has_ipv6: bool,
    presence: BTreeMap<&'static str, AddressFamilies>,
    addresses: BTreeMap<&'static str, Vec<IpNet>>,
}

impl NetworkFamilies {
    fn infer(n: &Networking) -> Self {
        let mut families = Self::default();

        families
            .addresses
            .insert("machineNetwork", n.machine_network.iter().map(|network| network.cidr).collect());
        families.addresses.insert("serviceNetwork", n.service_network.clone());
        families
            .addresses
            .insert("clusterNetwork", n.cluster_network.iter().map(|network| network.cidr).collect());
        families.addresses.retain(|_, networks| !networks.is_empty());

        for (key, networks) in &families.addresses {
            let presence = families.presence.entry(*key).or_default();
            for (i, network) in networks.iter().enumerate() {
                let family = IpFamily::of(&network.addr);
                match family {
                    IpFamily::V4 => presence.ipv4 = true,
                    IpFamily::V6 => presence.ipv6 = true,
                }
                if i == 0 {
                    presence.primary = Some(family);
                }
                if *key == "serviceNetwork" {
                    match family {
                        IpFamily::V4 => families.has_ipv4 = true,
                        IpFamily::V6 => families.has_ipv6 = true,
                    }
                }
            }
        }

        families
    }

    fn is_dual_stack(&self) -> bool {
        self.has_ipv4 && self.has_ipv6
    }

    fn machine_network_primary(&self) -> Option<IpFamily> {
        self.presence.get("machineNetwork").and_then(|presence| presence.primary)
    }

    fn joined(&self, key: &str) -> String {
        self.addresses.get(key).map(|networks| networks.iter().join(", ")).unwrap_or_default()
    }
}

fn validate_networking_ip_version(n: &Networking, platform: &Platform) -> ErrorList {
    let mut all_errs = ErrorList::new();
    let families = NetworkFamilies::infer(n);
    let path = Path::new("networking");

    // Every platform this installer can target accepts single-stack IPv6 and IPv4-primary dual
    // stack, but none of them accepts IPv6-primary dual stack
    let platform_supports_ipv6 = matches!(
        platform.known_name(),
        Some(PlatformName::Nutanix | PlatformName::None | PlatformName::External)
    );

    if families.is_dual_stack() {
        if n.service_network.len() != 2 {
            all_errs.push(Error::invalid(
                path.child("serviceNetwork"),
                families.joined("serviceNetwork"),
                "when installing dual-stack IPv4/IPv6 you must provide two service networks, one for each IP address type",
            ));
        }

        if !platform_supports_ipv6 {
            all_errs.push(Error::invalid(
                path.clone(),
                "DualStack",
                "dual-stack IPv4/IPv6 is not supported for this platform, specify only one type of address",
            ));
        }

        for (key, presence) in &families.presence {
            if presence.ipv4 && !presence.ipv6 {
                all_errs.push(Error::invalid(
                    path.child(key),
                    families.joined(key),
                    "dual-stack IPv4/IPv6 requires an IPv6 network in this list",
                ));
            }
            if !presence.ipv4 && presence.ipv6 {
                all_errs.push(Error::invalid(
                    path.child(key),
                    families.joined(key),
                    "dual-stack IPv4/IPv6 requires an IPv4 network in this list",
                ));
            }
            if presence.ipv4 && presence.ipv6 && presence.primary != Some(IpFamily::V4) {
                all_errs.push(Error::invalid(
                    path.child(key),
                    families.joined(key),
                    "IPv4 addresses must be listed before IPv6 addresses",
                ));
            }
        }
    } else if families.has_ipv6 {
        if !platform_supports_ipv6 {
            all_errs.push(Error::invalid(path.clone(), "IPv6", "single-stack IPv6 is not supported for this platform"));
        }
    } else if families.has_ipv4 && n.service_network.len() > 1 {
        all_errs.push(Error::invalid(
            path.child("serviceNetwork"),
            families.joined("serviceNetwork"),
            "only one service network can be specified",
        ));
    }

    all_errs
}

fn validate_cluster_network_mtu(c: &InstallConfig, path: &Path) -> ErrorList {
    let mut all_errs = ErrorList::new();

    let Some(mtu) = c.networking.as_ref().and_then(|networking| networking.cluster_network_mtu) else {
        return all_errs;
    };
    if mtu == 0 {
        return all_errs;
    }

    if c.platform.name() != AWS_PLATFORM_NAME {
        all_errs.push(Error::invalid(path.clone(), mtu, "cluster network MTU is allowed only in AWS deployments"));
    }

    all_errs
}

fn validate_vips_for_platform(n: &Networking, platform: &Platform, path: &Path) -> ErrorList {
    let mut all_errs = ErrorList::new();

    let Some(nutanix) = &platform.nutanix else {
        return all_errs;
    };
    let path = path.child(PlatformName::Nutanix.as_ref());

    all_errs.extend(validate_dual_stack_vip_slice(&nutanix.api_vips, &path.child("apiVIPs")));
    all_errs.extend(validate_dual_stack_vip_slice(&nutanix.ingress_vips, &path.child("ingressVIPs")));

    // Nutanix neither requires VIPs nor requires them to be in a machine network
    all_errs.extend(validate_api_and_ingress_vips(
        &nutanix.api_vips,
        &nutanix.ingress_vips,
        false,
        false,
        nutanix.is_user_managed_load_balancer(),
        n,
        &path,
    ));

    all_errs
}

/// A dual-stack VIP slice must hold exactly one address per family. Defaulting has already moved
/// the IPv4 address to the front.
fn validate_dual_stack_vip_slice(vips: &[String], path: &Path) -> ErrorList {
    let mut all_errs = ErrorList::new();

    let mut families = BTreeSet::new();
    for vip in vips {
        match IpAddr::from_str(vip) {
            Ok(ip) => {
                families.insert(IpFamily::of(&ip) == IpFamily::V6);
            }
            Err(_) => {
                all_errs.push(Error::invalid(path.clone(), vips.to_vec(), format!("could not parse ip {:?}", vip)));
                return all_errs;
            }
        }
    }

    if families.len() == 2 && vips.len() != 2 {
        all_errs.push(Error::invalid(
            path.clone(),
            vips.to_vec(),
            "wrong number of VIPs given. Expecting 2 VIPs for dual stack",
        ));
    }

    all_errs
}

fn validate_ip_in_machine_cidr(vip: &str, n: &Networking) -> Result<(), String> {
    let ip = IpAddr::from_str(vip).map_err(|_| format!("{:?} is not a valid IP", vip))?;
    if n.machine_network.iter().any(|network| network.cidr.contains(&ip)) {
        return Ok(());
    }
    Err(format!(
        "IP expected to be in one of the machine networks: {}",
        n.machine_network.iter().map(|network| network.cidr.to_string()).join(",")
    ))
}

fn is_dual_stack_pair(vips: &[String]) -> bool {
    let families = vips
        .iter()
        .filter_map(|vip| IpAddr::from_str(vip).ok())
        .map(|ip| IpFamily::of(&ip) == IpFamily::V6)
        .collect::<BTreeSet<_>>();
    families.len() == 2
}

#[allow(clippy::too_many_arguments)]
fn validate_vip_list(
    vips: &[String],
    other_vips: &[String],
    kind: &str,
    (field, other_field): (&str, &str),
    vip_is_required: bool,
    req_vip_in_machine_cidr: bool,
    user_managed_lb: bool,
    n: &Networking,
    path: &Path,
) -> ErrorList {
    let mut all_errs = ErrorList::new();
    let field_path = path.child(field);

    if vips.is_empty() {
        if vip_is_required {
            all_errs.push(Error::required(field_path, format!("must specify at least one VIP for the {}", kind)));
        }
        return all_errs;
    }

    if vips.len() > 2 {
        all_errs.push(Error::too_many(field_path, vips.len(), 2));
        return all_errs;
    }

    for vip in vips {
        if let Err(err) = validate::ip(vip) {
            all_errs.push(Error::invalid(field_path.clone(), vip.as_str(), err.to_string()));
        }

        // A user-managed load balancer may share addresses between API and ingress and sit
        // outside the machine networks
        if !user_managed_lb {
            if kind == "API" {
                let api_ip = IpAddr::from_str(vip).ok();
                for ingress_vip in other_vips {
                    if api_ip.is_some() && api_ip == IpAddr::from_str(ingress_vip).ok() {
                        all_errs.push(Error::invalid(
                            field_path.clone(),
                            vip.as_str(),
                            "VIP for API must not be one of the Ingress VIPs",
                        ));
                    }
                }
            }

            if req_vip_in_machine_cidr {
                if let Err(err) = validate_ip_in_machine_cidr(vip, n) {
                    all_errs.push(Error::invalid(field_path.clone(), vip.as_str(), err));
                }
            }
        }
    }

    if kind == "API" && other_vips.is_empty() {
        all_errs.push(Error::required(path.child(other_field), "must specify VIP for ingress, when VIP for API is set"));
    }
    if kind == "Ingress" && other_vips.is_empty() {
        all_errs.push(Error::required(path.child(other_field), "must specify VIP for API, when VIP for ingress is set"));
    }

    match vips {
        [single] => {
            let families = NetworkFamilies::infer(n);
            let vip_family = match IpAddr::from_str(single) {
                Ok(ip) => IpFamily::of(&ip),
                Err(_) => IpFamily::V4,
            };
            if families.is_dual_stack() && Some(vip_family) != families.machine_network_primary() {
                all_errs.push(Error::invalid(
                    field_path,
                    single.as_str(),
                    format!(
                        "VIP for the {} must be of the same IP family with machine network's primary IP Family for dual-stack IPv4/IPv6",
                        kind
                    ),
                ));
            }
        }
        pair => {
            if !is_dual_stack_pair(pair) {
                all_errs.push(Error::invalid(
                    field_path,
                    pair.to_vec(),
                    format!("If two {} VIPs are given, one must be an IPv4 address, the other an IPv6", kind),
                ));
            }
        }
    }

    all_errs
}

fn validate_api_and_ingress_vips(
    api_vips: &[String],
    ingress_vips: &[String],
    vip_is_required: bool,
    req_vip_in_machine_cidr: bool,
    user_managed_lb: bool,
    n: &Networking,
    path: &Path,
) -> ErrorList {
    let mut all_errs = validate_vip_list(
        api_vips,
        ingress_vips,
        "API",
        ("apiVIPs", "ingressVIPs"),
        vip_is_required,
        req_vip_in_machine_cidr,
        user_managed_lb,
        n,
        path,
    );
    all_errs.extend(validate_vip_list(
        ingress_vips,
        api_vips,
        "Ingress",
        ("ingressVIPs", "apiVIPs"),
        vip_is_required,
        req_vip_in_machine_cidr,
        user_managed_lb,
        n,
        path,
    ));
    all_errs
}

fn supported_platform_names() -> Vec<String> {
    PlatformName::iter().map(|name| name.to_string()).sorted().collect()
}

fn validate_platform(c: &InstallConfig, path: &Path) -> ErrorList {
    let mut all_errs = ErrorList::new();
    let names = c.platform.names();
    let supported = supported_platform_names();

    let active = names.first().cloned().unwrap_or_default();
    if !supported.contains(&active) {
        all_errs.push(Error::invalid(
            path.clone(),
            active.as_str(),
            format!("must specify one of the platforms ({})", supported.join(", ")),
        ));
    }

    for other in names.iter().skip(1) {
        all_errs.push(Error::invalid(
            path.clone(),
            active.as_str(),
            format!("must only specify a single type of platform; cannot use both {:?} and {:?}", active, other),
        ));
    }

    if let Some(nutanix) = &c.platform.nutanix {
        all_errs.extend(nutanix::validate_platform(nutanix, &path.child(PlatformName::Nutanix.as_ref())));
    }

    all_errs
}

fn validate_control_plane(platform: &Platform, pool: &MachinePool, path: &Path) -> ErrorList {
    let mut all_errs = ErrorList::new();

    if pool.name != MACHINE_POOL_CONTROL_PLANE_ROLE_NAME {
        all_errs.push(Error::not_supported(
            path.child("name"),
            pool.name.as_str(),
            &[MACHINE_POOL_CONTROL_PLANE_ROLE_NAME],
        ));
    }
    if pool.replicas == Some(0) {
        all_errs.push(Error::invalid(
            path.child("replicas"),
            0,
            "number of control plane replicas must be positive",
        ));
    }
    all_errs.extend(validate_machine_pool(platform, pool, path));

    all_errs
}

fn validate_compute(platform: &Platform, control: Option<&MachinePool>, pools: &[MachinePool], path: &Path) -> ErrorList {
    let mut all_errs = ErrorList::new();
    let mut pool_names = BTreeSet::new();

    for (i, pool) in pools.iter().enumerate() {
        let pool_path = path.index(i);

        match pool.name.as_str() {
            MACHINE_POOL_COMPUTE_ROLE_NAME => {}
            MACHINE_POOL_EDGE_ROLE_NAME if platform.name() == AWS_PLATFORM_NAME => {}
            MACHINE_POOL_EDGE_ROLE_NAME => all_errs.push(Error::not_supported(
                pool_path.child("name"),
                pool.name.as_str(),
                &[MACHINE_POOL_COMPUTE_ROLE_NAME],
            )),
            _ => all_errs.push(Error::not_supported(
                pool_path.child("name"),
                pool.name.as_str(),
                &[MACHINE_POOL_COMPUTE_ROLE_NAME, MACHINE_POOL_EDGE_ROLE_NAME],
            )),
        }

        if !pool_names.insert(pool.name.as_str()) {
            all_errs.push(Error::duplicate(pool_path.child("name"), pool.name.as_str()));
        }

        if let Some(control) = control {
            if control.architecture != pool.architecture {
                all_errs.push(Error::invalid(
                    pool_path.child("architecture"),
                    pool.architecture.as_str(),
                    "heteregeneous multi-arch is not supported; compute pool architecture must match control plane",
                ));
            }
        }

        all_errs.extend(validate_machine_pool(platform, pool, &pool_path));
    }

    all_errs
}

fn validate_machine_pool(platform: &Platform, pool: &MachinePool, path: &Path) -> ErrorList {
    let mut all_errs = ErrorList::new();

    if let Some(replicas) = pool.replicas {
        if replicas < 0 {
            all_errs.push(Error::invalid(path.child("replicas"), replicas, "number of replicas must not be negative"));
        }
    }

    if Hyperthreading::from_str(&pool.hyperthreading).is_err() {
        all_errs.push(Error::not_supported(
            path.child("hyperthreading"),
            pool.hyperthreading.as_str(),
            &Hyperthreading::iter().map(|h| h.to_string()).collect::<Vec<_>>(),
        ));
    }

    if Architecture::from_str(&pool.architecture).is_err() {
        all_errs.push(Error::not_supported(
            path.child("architecture"),
            pool.architecture.as_str(),
            &Architecture::iter().map(|a| a.to_string()).collect::<Vec<_>>(),
        ));
    }

    let nutanix_path = path.child("platform").child(PlatformName::Nutanix.as_ref());
    let pool_errs = match (&pool.platform.nutanix, &platform.nutanix) {
        (Some(pool_platform), Some(nutanix)) => nutanix::validate_machine_pool(pool_platform, &nutanix_path, nutanix),
        (Some(_), None) => vec![Error::invalid(
            path.child("platform"),
            PlatformName::Nutanix.to_string(),
            format!("cannot specify \"nutanix\" for machine pool when cluster is using {:?}", platform.name()),
        )]
        .into(),
        (None, _) => ErrorList::new(),
    };

    // Role defaults and defaultMachinePlatform can still combine into an unusable CPU topology
    if pool_errs.is_empty() {
        if let Some(nutanix) = &platform.nutanix {
            let effective = effective_nutanix_machine_pool(nutanix, pool, &pool.name);
            all_errs.extend(nutanix::validate_cpu_topology(&effective, &nutanix_path));
        }
    }
    all_errs.extend(pool_errs);

    all_errs
}

fn validate_proxy(p: &Proxy, networking: Option<&Networking>, path: &Path) -> ErrorList {
    let mut all_errs = ErrorList::new();

    if p.http_proxy.is_empty() && p.https_proxy.is_empty() {
        all_errs.push(Error::required(path.clone(), "must include httpProxy or httpsProxy"));
    }

    for (value, field, schemes) in [
        (&p.http_proxy, "httpProxy", &["http"][..]),
        (&p.https_proxy, "httpsProxy", &["http", "https"][..]),
    ] {
        if value.is_empty() {
            continue;
        }
        all_errs.extend(validate_uri(value, &path.child(field), schemes));
        if let Some(networking) = networking {
            all_errs.extend(validate_ip_proxy(value, networking, &path.child(field)));
        }
    }

    if !p.no_proxy.is_empty() && p.no_proxy != "*" {
        if p.no_proxy.contains(' ') {
            all_errs.push(Error::invalid(path.child("noProxy"), p.no_proxy.as_str(), "noProxy must not have spaces"));
        }
        for (idx, element) in p.no_proxy.split(',').enumerate() {
            let element = element.trim();
            let is_domain = validate::no_proxy_domain_name(element).is_ok();
            let is_cidr = IpNet::parse(element).is_ok();
            let is_ip = IpAddr::from_str(element).is_ok();
            if !is_domain && !is_cidr && !is_ip {
                all_errs.push(Error::invalid(
                    path.child("noProxy"),
                    p.no_proxy.as_str(),
                    format!(
                        "each element of noProxy must be a IP, CIDR or domain without wildcard characters, which is violated by element {} {:?}",
                        idx, element
                    ),
                ));
            }
        }
    }

    all_errs
}

fn validate_uri(uri: &str, path: &Path, schemes: &[&str]) -> ErrorList {
    match url::Url::parse(uri) {
        Err(err) => vec![Error::invalid(path.clone(), uri, err.to_string())].into(),
        Ok(parsed) if schemes.contains(&parsed.scheme()) => ErrorList::new(),
        Ok(parsed) => vec![Error::not_supported(path.clone(), parsed.scheme(), schemes)].into(),
    }
}

/// A proxy given by IP address must not live inside the cluster or service networks
fn validate_ip_proxy(proxy: &str, n: &Networking, path: &Path) -> ErrorList {
    let mut all_errs = ErrorList::new();

    let Ok(parsed) = url::Url::parse(proxy) else {
        return all_errs;
    };
    let proxy_ip = match parsed.host() {
        Some(url::Host::Ipv4(ip)) => IpAddr::V4(ip),
        Some(url::Host::Ipv6(ip)) => IpAddr::V6(ip),
        _ => return all_errs,
    };

    if n.cluster_network.iter().any(|network| network.cidr.contains(&proxy_ip)) {
        all_errs.push(Error::invalid(path.clone(), proxy, "proxy value is part of the cluster networks"));
    }
    if n.service_network.iter().any(|network| network.contains(&proxy_ip)) {
        all_errs.push(Error::invalid(path.clone(), proxy, "proxy value is part of the service networks"));
    }

    all_errs
}

fn validate_image_digest_sources(c: &InstallConfig, path: &Path) -> ErrorList {
    let mut all_errs = ErrorList::new();

    for (i, group) in c.image_digest_sources.iter().enumerate() {
        let group_path = path.index(i);
        if let Err(err) = validate_named_repository(&group.source) {
            all_errs.push(Error::invalid(group_path.child("source"), group.source.as_str(), err));
        }
        for (j, mirror) in group.mirrors.iter().enumerate() {
            if let Err(err) = validate_named_repository(mirror) {
                all_errs.push(Error::invalid(group_path.child("mirrors").index(j), mirror.as_str(), err));
            }
        }
    }

    all_errs
}

/// A repository such as `quay.io/openshift/release`, or a bare registry host with an optional
/// port. Tags and digests are rejected.
fn validate_named_repository(r: &str) -> Result<(), String> {
    let last_component = r.rsplit('/').next().unwrap_or_default();
    if r.contains('@') || (r.contains('/') && last_component.contains(':')) {
        return Err("must be repository--not reference".to_string());
    }

    if !r.contains('/') {
        let host = r.rsplit_once(':').map(|(host, _)| host).unwrap_or(r);
        return validate::host(host).map_err(|err| format!("the repository provided is invalid: {}", err));
    }

    if !regex_is_match!(
        r"^[a-zA-Z0-9]([-a-zA-Z0-9.]*[a-zA-Z0-9])?(:[0-9]+)?(/[a-z0-9]+([._-]+[a-z0-9]+)*)+$",
        r
    ) {
        return Err("failed to parse: invalid reference format".to_string());
    }

    Ok(())
}

fn validate_publish(c: &InstallConfig) -> ErrorList {
    let mut all_errs = ErrorList::new();
    let platform_name = c.platform.name();

    match PublishingStrategy::from_str(&c.publish) {
        Err(_) => all_errs.push(Error::not_supported(
            Path::new("publish"),
            c.publish.as_str(),
            &PublishingStrategy::iter().map(|p| p.to_string()).sorted().collect::<Vec<_>>(),
        )),
        Ok(PublishingStrategy::Internal) if !INTERNAL_PUBLISH_PLATFORMS.contains(&platform_name.as_str()) => {
            all_errs.push(Error::invalid(
                Path::new("publish"),
                c.publish.as_str(),
                format!("Internal publish strategy is not supported on {:?} platform", platform_name),
            ))
        }
        Ok(PublishingStrategy::Mixed) if !MIXED_PUBLISH_PLATFORMS.contains(&platform_name.as_str()) => {
            all_errs.push(Error::invalid(
                Path::new("publish"),
                c.publish.as_str(),
                format!("mixed publish strategy is not supported on {:?} platform", platform_name),
            ))
        }
        Ok(_) => {}
    }

    all_errs
}

/// Credentials modes each platform accepts. Platforms missing from this list cannot set one.
fn valid_credentials_modes(platform_name: &str) -> Option<Vec<CredentialsMode>> {
    match platform_name {
        "aws" | "gcp" => Some(vec![CredentialsMode::Mint, CredentialsMode::Passthrough, CredentialsMode::Manual]),
        "azure" => Some(vec![CredentialsMode::Passthrough, CredentialsMode::Manual]),
        "alibabacloud" | "ibmcloud" | "powervs" | "nutanix" => Some(vec![CredentialsMode::Manual]),
        _ => None,
    }
}

fn validate_credentials_mode(c: &InstallConfig, path: &Path) -> ErrorList {
    let mut all_errs = ErrorList::new();

    if c.credentials_mode.is_empty() {
        return all_errs;
    }

    let platform_name = c.platform.name();
    match valid_credentials_modes(&platform_name) {
        Some(modes) => {
            let modes = modes.iter().map(|mode| mode.to_string()).sorted().collect::<Vec<_>>();
            if !modes.contains(&c.credentials_mode) {
                all_errs.push(Error::not_supported(path.clone(), c.credentials_mode.as_str(), &modes));
            }
        }
        None => all_errs.push(Error::invalid(
            path.clone(),
            c.credentials_mode.as_str(),
            format!("cannot be set when using the {:?} platform", platform_name),
        )),
    }

    all_errs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tests::nutanix_install_config;

    fn errors(c: &InstallConfig) -> Vec<String> {
        validate_install_config(c).iter().map(|err| err.to_string()).collect()
    }

    fn assert_single_error(c: &InstallConfig, expected: &str) {
        let errors = errors(c);
        assert_eq!(errors, vec![expected.to_string()], "unexpected errors: {:#?}", errors);
    }

    fn networking(c: &mut InstallConfig) -> &mut Networking {
        c.networking.as_mut().unwrap()
    }

    #[test]
    fn test_valid_config() {
        assert_eq!(errors(&nutanix_install_config()), Vec::<String>::new());
    }

    #[test]
    fn test_inherited_cpu_topology() {
        let mut c = nutanix_install_config();
        c.control_plane.as_mut().unwrap().platform.nutanix = Some(crate::types::nutanix::MachinePool {
            num_cores_per_socket: 16,
            ..Default::default()
        });
        assert_single_error(
            &c,
            "controlPlane.platform.nutanix.coresPerSocket: Invalid value: 16: cores per socket must be less than number of CPUs (8 with defaults applied)",
        );

        let mut c = nutanix_install_config();
        c.platform.nutanix.as_mut().unwrap().default_machine_platform = Some(crate::types::nutanix::MachinePool {
            num_cpus: 6,
            num_cores_per_socket: 4,
            ..Default::default()
        });
        let errors = errors(&c);
        assert!(
            errors.contains(&"controlPlane.platform.nutanix.cpus: Invalid value: 6: number of CPUs must be a multiple of cores per socket (4)".to_string()),
            "{:#?}",
            errors
        );
        assert!(
            errors.contains(&"compute[0].platform.nutanix.cpus: Invalid value: 6: number of CPUs must be a multiple of cores per socket (4)".to_string()),
            "{:#?}",
            errors
        );
    }

    #[test]
    fn test_api_version() {
        let mut c = nutanix_install_config();
        c.api_version = String::new();
        assert_single_error(&c, "apiVersion: Required value: install-config version required");

        c.api_version = "bad-version".to_string();
        assert_single_error(&c, r#"apiVersion: Invalid value: "bad-version": install-config version must be "v1""#);
    }

    #[test]
    fn test_ssh_key_and_trust_bundle() {
        let mut c = nutanix_install_config();
        c.ssh_key = "bad-ssh-key".to_string();
        assert_single_error(&c, r#"sshKey: Invalid value: "bad-ssh-key": ssh: no key found"#);

        let mut c = nutanix_install_config();
        c.additional_trust_bundle_policy = "Sometimes".to_string();
        assert_single_error(
            &c,
            r#"additionalTrustBundlePolicy: Invalid value: "Sometimes": supported values "Proxyonly", "Always""#,
        );
    }

    #[test]
    fn test_cluster_name_on_prem() {
        let mut c = nutanix_install_config();
        c.metadata.name = "test.cluster".to_string();
        assert_single_error(&c, r#"metadata.name: Invalid value: "test.cluster": cluster name must not contain '.'"#);
    }

    #[test]
    fn test_missing_networking() {
        let mut c = nutanix_install_config();
        c.networking = None;
        assert_single_error(&c, "networking: Required value: networking is required");
    }

    #[test]
    fn test_network_types() {
        let mut c = nutanix_install_config();
        networking(&mut c).network_type = String::new();
        assert_single_error(&c, "networking.networkType: Required value: network provider type required");

        networking(&mut c).network_type = "Kuryr".to_string();
        assert_single_error(
            &c,
            r#"networking.networkType: Invalid value: "Kuryr": networkType Kuryr is not supported on OpenShift later than 4.14"#,
        );

        networking(&mut c).network_type = "OpenShiftSDN".to_string();
        assert_single_error(
            &c,
            r#"networking.networkType: Invalid value: "OpenShiftSDN": networkType OpenShiftSDN is not supported, please use OVNKubernetes"#,
        );
    }

    #[test]
    fn test_machine_network_errors() {
        let mut c = nutanix_install_config();
        networking(&mut c).machine_network[0].cidr = IpNet::parse("10.0.128.0/16").unwrap();
        assert_single_error(
            &c,
            r#"networking.machineNetwork[0]: Invalid value: "10.0.128.0/16": invalid network address. got 10.0.128.0/16, expecting 10.0.0.0/16"#,
        );

        let mut c = nutanix_install_config();
        networking(&mut c).machine_network = vec![];
        assert_single_error(&c, "networking.machineNetwork: Required value: at least one machine network is required");
    }

    #[test]
    fn test_overlapping_networks() {
        let mut c = nutanix_install_config();
        networking(&mut c).service_network = vec![IpNet::parse("10.0.2.0/24").unwrap()];
        assert_single_error(
            &c,
            r#"networking.serviceNetwork[0]: Invalid value: "10.0.2.0/24": service network must not overlap with any of the machine networks"#,
        );

        let mut c = nutanix_install_config();
        networking(&mut c).cluster_network[0].cidr = IpNet::parse("172.30.0.0/16").unwrap();
        let errors = errors(&c);
        assert!(errors.contains(
            &r#"networking.clusterNetwork[0].cidr: Invalid value: "172.30.0.0/16": cluster network must not overlap with service network 0"#
                .to_string()
        ));
    }

    #[test]
    fn test_host_prefix() {
        let mut c = nutanix_install_config();
        networking(&mut c).cluster_network[0].host_prefix = 12;
        assert_single_error(
            &c,
            "networking.clusterNetwork[0].hostPrefix: Invalid value: 12: cluster network host subnetwork prefix must not be larger size than CIDR 10.128.0.0/14",
        );

        networking(&mut c).cluster_network[0].host_prefix = -1;
        let errors = errors(&c);
        assert!(errors.contains(&"networking.clusterNetwork[0].hostPrefix: Invalid value: -1: hostPrefix must be positive".to_string()));
    }

    #[test]
    fn test_ip_versions() {
        let mut c = nutanix_install_config();
        networking(&mut c).service_network.push(IpNet::parse("172.31.0.0/16").unwrap());
        assert!(errors(&c).contains(
            &r#"networking.serviceNetwork: Invalid value: "172.30.0.0/16, 172.31.0.0/16": only one service network can be specified"#
                .to_string()
        ));

        // Dual stack with IPv6 networks listed first
        let mut c = nutanix_install_config();
        let n = networking(&mut c);
        n.machine_network.insert(0, crate::types::MachineNetworkEntry { cidr: IpNet::parse("fd00::/48").unwrap() });
        n.service_network.push(IpNet::parse("fd02::/112").unwrap());
        n.cluster_network.push(crate::types::ClusterNetworkEntry {
            cidr: IpNet::parse("fd01::/48").unwrap(),
            host_prefix: 64,
        });
        assert!(errors(&c).contains(
            &r#"networking.machineNetwork: Invalid value: "fd00::/48, 10.0.0.0/16": IPv4 addresses must be listed before IPv6 addresses"#
                .to_string()
        ));
    }

    #[test]
    fn test_cluster_network_mtu() {
        let mut c = nutanix_install_config();
        networking(&mut c).cluster_network_mtu = Some(8000);
        assert_single_error(
            &c,
            "networking.clusterNetworkMTU: Invalid value: 8000: cluster network MTU is allowed only in AWS deployments",
        );
    }

    #[test]
    fn test_vips() {
        let mut c = nutanix_install_config();
        c.platform.nutanix.as_mut().unwrap().ingress_vips = vec!["10.0.0.5".to_string()];
        assert_single_error(
            &c,
            r#"platform.nutanix.apiVIPs: Invalid value: "10.0.0.5": VIP for API must not be one of the Ingress VIPs"#,
        );

        c.platform.nutanix.as_mut().unwrap().load_balancer = Some(crate::types::nutanix::LoadBalancer {
            lb_type: "UserManaged".to_string(),
        });
        assert_eq!(errors(&c), Vec::<String>::new());

        let mut c = nutanix_install_config();
        c.platform.nutanix.as_mut().unwrap().ingress_vips = vec![];
        assert_single_error(
            &c,
            "platform.nutanix.ingressVIPs: Required value: must specify VIP for ingress, when VIP for API is set",
        );

        let mut c = nutanix_install_config();
        c.platform.nutanix.as_mut().unwrap().api_vips = vec!["10.0.0.5".to_string(), "10.0.0.7".to_string()];
        assert_single_error(
            &c,
            r#"platform.nutanix.apiVIPs: Invalid value: ["10.0.0.5","10.0.0.7"]: If two API VIPs are given, one must be an IPv4 address, the other an IPv6"#,
        );

        let mut c = nutanix_install_config();
        c.platform.nutanix.as_mut().unwrap().api_vips = vec!["1.1.1.1".to_string(), "2.2.2.2".to_string(), "3.3.3.3".to_string()];
        assert_single_error(&c, "platform.nutanix.apiVIPs: Too many: 3: must have at most 2 items");

        // VIPs outside the machine network are fine on Nutanix
        let mut c = nutanix_install_config();
        c.platform.nutanix.as_mut().unwrap().api_vips = vec!["192.168.10.5".to_string()];
        assert_eq!(errors(&c), Vec::<String>::new());
    }

    #[test]
    fn test_platform() {
        let mut c = nutanix_install_config();
        c.platform.other.insert("aws".to_string(), serde_yaml::Value::Null);
        let errs = errors(&c);
        assert!(errs.contains(
            &r#"platform: Invalid value: "aws": must specify one of the platforms (external, none, nutanix)"#.to_string()
        ));
        assert!(errs.contains(
            &r#"platform: Invalid value: "aws": must only specify a single type of platform; cannot use both "aws" and "nutanix""#
                .to_string()
        ));

        let mut c = nutanix_install_config();
        c.platform.none = Some(serde_yaml::Value::Null);
        assert!(errors(&c).contains(
            &r#"platform: Invalid value: "none": must only specify a single type of platform; cannot use both "none" and "nutanix""#
                .to_string()
        ));
    }

    #[test]
    fn test_machine_pools() {
        let mut c = nutanix_install_config();
        c.control_plane.as_mut().unwrap().replicas = Some(0);
        assert_single_error(
            &c,
            "controlPlane.replicas: Invalid value: 0: number of control plane replicas must be positive",
        );

        let mut c = nutanix_install_config();
        c.control_plane.as_mut().unwrap().name = "primary".to_string();
        assert_single_error(
            &c,
            r#"controlPlane.name: Unsupported value: "primary": supported values: "master""#,
        );

        let mut c = nutanix_install_config();
        c.compute.push(c.compute[0].clone());
        assert_single_error(&c, r#"compute[1].name: Duplicate value: "worker""#);

        let mut c = nutanix_install_config();
        c.compute[0].name = "edge".to_string();
        assert_single_error(&c, r#"compute[0].name: Unsupported value: "edge": supported values: "worker""#);

        let mut c = nutanix_install_config();
        c.compute[0].architecture = "arm64".to_string();
        assert_single_error(
            &c,
            r#"compute[0].architecture: Invalid value: "arm64": heteregeneous multi-arch is not supported; compute pool architecture must match control plane"#,
        );
    }

    #[test]
    fn test_pull_secret() {
        let mut c = nutanix_install_config();
        c.pull_secret = r#"{"auths":{}}"#.to_string();
        assert_single_error(&c, r#"pullSecret: Invalid value: "{\"auths\":{}}": auths required"#);
    }

    #[test]
    fn test_proxy() {
        let mut c = nutanix_install_config();
        c.proxy = Some(Proxy::default());
        assert_single_error(&c, "proxy: Required value: must include httpProxy or httpsProxy");

        c.proxy = Some(Proxy {
            http_proxy: "https://proxy.example.com".to_string(),
            ..Default::default()
        });
        assert_single_error(&c, r#"proxy.httpProxy: Unsupported value: "https": supported values: "http""#);

        c.proxy = Some(Proxy {
            http_proxy: "http://172.30.0.10:3128".to_string(),
            ..Default::default()
        });
        assert_single_error(
            &c,
            r#"proxy.httpProxy: Invalid value: "http://172.30.0.10:3128": proxy value is part of the service networks"#,
        );

        c.proxy = Some(Proxy {
            http_proxy: "http://proxy.example.com:3128".to_string(),
            no_proxy: ".example.com,10.0.0.0/16,*.bad".to_string(),
            ..Default::default()
        });
        assert_single_error(
            &c,
            r#"proxy.noProxy: Invalid value: ".example.com,10.0.0.0/16,*.bad": each element of noProxy must be a IP, CIDR or domain without wildcard characters, which is violated by element 2 "*.bad""#,
        );
    }

    #[test]
    fn test_image_digest_sources() {
        assert!(validate_named_repository("quay.io/openshift-release-dev/ocp-release").is_ok());
        assert!(validate_named_repository("registry.example.com:5000").is_ok());
        assert_eq!(
            validate_named_repository("quay.io/openshift/release:4.16").unwrap_err(),
            "must be repository--not reference"
        );
        assert!(validate_named_repository("quay.io/Bad Repo").is_err());
    }

    #[test]
    fn test_publish_and_credentials_mode() {
        let mut c = nutanix_install_config();
        c.publish = "Internal".to_string();
        assert_single_error(
            &c,
            r#"publish: Invalid value: "Internal": Internal publish strategy is not supported on "nutanix" platform"#,
        );

        c.publish = "Sideways".to_string();
        assert_single_error(
            &c,
            r#"publish: Unsupported value: "Sideways": supported values: "External", "Internal", "Mixed""#,
        );

        let mut c = nutanix_install_config();
        c.credentials_mode = "Mint".to_string();
        assert_single_error(&c, r#"credentialsMode: Unsupported value: "Mint": supported values: "Manual""#);

        c.credentials_mode = "Manual".to_string();
        assert_eq!(errors(&c), Vec::<String>::new());
    }
}
