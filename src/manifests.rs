//! Cluster-scoped manifests: the install-config configmap, the Infrastructure object, and the
//! Nutanix cloud provider config and credentials.

use crate::{
    asset::{AssetFile, Assets, Manifest},
    cluster_id::ClusterId,
    types::{nutanix, InstallConfig},
};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use serde_with::{base64::Base64, serde_as};
use std::collections::BTreeMap;

pub(crate) const CLUSTER_CONFIG_FILENAME: &str = "manifests/cluster-config.yaml";
pub(crate) const INFRASTRUCTURE_FILENAME: &str = "manifests/cluster-infrastructure-02-config.yml";
pub(crate) const CLOUD_PROVIDER_CONFIG_FILENAME: &str = "manifests/cloud-provider-config.yaml";

pub(crate) const NUTANIX_CREDENTIALS_SECRET_NAME: &str = "nutanix-credentials";
pub(crate) const MACHINE_API_NAMESPACE: &str = "openshift-machine-api";
pub(crate) const CLOUD_CONTROLLER_MANAGER_NAMESPACE: &str = "openshift-cloud-controller-manager";

const CLOUD_PROVIDER_CONFIG_KEY: &str = "config";
const API_SERVER_PORT: u16 = 6443;

#[serde_as]
#[derive(Serialize)]
struct SecretData(#[serde_as(as = "BTreeMap<_, Base64>")] BTreeMap<String, Vec<u8>>);

/// An Opaque Secret; values are base64 encoded on the way out
pub(crate) fn secret(name: &str, namespace: &str, data: BTreeMap<String, Vec<u8>>) -> Result<Manifest> {
    Ok(Manifest::namespaced("v1", "Secret", name, namespace)
        .with("type", json!("Opaque"))
        .with_data(serde_json::to_value(SecretData(data)).context("encoding secret data")?))
}

pub(crate) fn config_map(name: &str, namespace: &str, data: BTreeMap<&str, String>) -> Manifest {
    Manifest::namespaced("v1", "ConfigMap", name, namespace).with_data(json!(data))
}

pub(crate) fn cluster_config(install_config: &InstallConfig) -> Result<Manifest> {
    Ok(config_map(
        "cluster-config-v1",
        "kube-system",
        BTreeMap::from([("install-config", install_config.to_yaml()?)]),
    ))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
pub(crate) enum TopologyMode {
    HighlyAvailable,
    SingleReplica,
}

/// Control plane and infrastructure topology as advertised in the Infrastructure status
pub(crate) fn determine_topologies(install_config: &InstallConfig) -> (TopologyMode, TopologyMode) {
    let control_plane_replicas = install_config
        .control_plane
        .as_ref()
        .and_then(|pool| pool.replicas)
        .unwrap_or_default();
    let control_plane_topology = if control_plane_replicas < 3 {
        TopologyMode::SingleReplica
    } else {
        TopologyMode::HighlyAvailable
    };

    let worker_replicas: i64 = install_config.compute.iter().filter_map(|pool| pool.replicas).sum();
    let infrastructure_topology = match worker_replicas {
        0 => control_plane_topology,
        1 => TopologyMode::SingleReplica,
        _ => TopologyMode::HighlyAvailable,
    };

    (control_plane_topology, infrastructure_topology)
}

fn uuid_identifier(uuid: &str) -> Value {
    json!({"type": "UUID", "uuid": uuid})
}

pub(crate) fn infrastructure(install_config: &InstallConfig, cluster_id: &ClusterId) -> Result<Manifest> {
    let cluster_domain = install_config.cluster_domain();
    let (control_plane_topology, infrastructure_topology) = determine_topologies(install_config);

    let mut spec = json!({
        "cloudConfig": {"name": ""},
        "platformSpec": {"type": "None"},
    });
    let mut status = json!({
        "infrastructureName": cluster_id.infra_id,
        "apiServerURL": format!("https://api.{}:{}", cluster_domain, API_SERVER_PORT),
        "apiServerInternalURI": format!("https://api-int.{}:{}", cluster_domain, API_SERVER_PORT),
        "controlPlaneTopology": control_plane_topology.to_string(),
        "infrastructureTopology": infrastructure_topology.to_string(),
        "cpuPartitioning": "None",
        "platform": "None",
        "platformStatus": {"type": "None"},
    });

    if let Some(nutanix) = &install_config.platform.nutanix {
        spec = json!({
            "cloudConfig": {"key": CLOUD_PROVIDER_CONFIG_KEY, "name": "cloud-provider-config"},
            "platformSpec": {"type": "Nutanix", "nutanix": nutanix_platform_spec(nutanix)},
        });

        status["platform"] = json!("Nutanix");
        status["platformStatus"] = json!({
            "type": "Nutanix",
            "nutanix": {
                "apiServerInternalIPs": nutanix.api_vips,
                "ingressIPs": nutanix.ingress_vips,
                "loadBalancer": {
                    "type": nutanix
                        .load_balancer
                        .as_ref()
                        .map(|load_balancer| load_balancer.lb_type.clone())
                        .unwrap_or_else(|| "OpenShiftManagedDefault".to_string()),
                },
            },
        });
    }

    Ok(Manifest::new("config.openshift.io/v1", "Infrastructure", "cluster")
        .with_spec(spec)
        .with("status", status))
}

fn nutanix_platform_spec(nutanix: &nutanix::Platform) -> Value {
    let prism_elements = nutanix
        .prism_elements
        .iter()
        .map(|prism_element| {
            json!({
                "endpoint": {
                    "address": prism_element.endpoint.address,
                    "port": prism_element.endpoint.port,
                },
                "name": prism_element.name,
            })
        })
        .collect::<Vec<_>>();

    let failure_domains = nutanix
        .failure_domains
        .iter()
        .map(|failure_domain| {
            json!({
                "name": failure_domain.name,
                "cluster": uuid_identifier(&failure_domain.prism_element.uuid),
                "subnets": failure_domain.subnet_uuids.iter().map(String::as_str).map(uuid_identifier).collect::<Vec<_>>(),
            })
        })
        .collect::<Vec<_>>();

    let mut spec = json!({
        "prismCentral": {
            "address": nutanix.prism_central.endpoint.address,
            "port": nutanix.prism_central.endpoint.port,
        },
        "prismElements": prism_elements,
    });
    if !failure_domains.is_empty() {
        spec["failureDomains"] = json!(failure_domains);
    }

    spec
}

/// The JSON the Nutanix cloud controller manager reads from the cloud-provider-config configmap
pub(crate) fn nutanix_cloud_config(nutanix: &nutanix::Platform) -> Result<String> {
    serde_json::to_string_pretty(&json!({
        "prismCentral": {
            "address": nutanix.prism_central.endpoint.address,
            "port": nutanix.prism_central.endpoint.port,
            "credentialRef": {
                "kind": "Secret",
                "name": NUTANIX_CREDENTIALS_SECRET_NAME,
                "namespace": CLOUD_CONTROLLER_MANAGER_NAMESPACE,
            },
        },
        "topologyDiscovery": {
            "type": "Prism",
            "topologyCategories": null,
        },
        "enableCustomLabeling": true,
    }))
    .context("serializing nutanix cloud config")
}

pub(crate) fn cloud_provider_config(nutanix: &nutanix::Platform) -> Result<Manifest> {
    Ok(config_map(
        "cloud-provider-config",
        "openshift-config",
        BTreeMap::from([(CLOUD_PROVIDER_CONFIG_KEY, nutanix_cloud_config(nutanix)?)]),
    ))
}

/// The credentials document both the machine API and the cloud controller manager consume
pub(crate) fn nutanix_credentials(nutanix: &nutanix::Platform) -> Result<String> {
    serde_json::to_string(&json!([{
        "type": "basic_auth",
        "data": {
            "prismCentral": {
                "username": nutanix.prism_central.username,
                "password": nutanix.prism_central.password,
            },
            "prismElements": null,
        },
    }]))
    .context("serializing nutanix credentials")
}

pub(crate) fn nutanix_credentials_secrets(nutanix: &nutanix::Platform) -> Result<Vec<(String, Manifest)>> {
    let credentials = nutanix_credentials(nutanix)?;

    [MACHINE_API_NAMESPACE, CLOUD_CONTROLLER_MANAGER_NAMESPACE]
        .into_iter()
        .map(|namespace| {
            Ok((
                format!("openshift/99_{}_{}-secret.yaml", namespace, NUTANIX_CREDENTIALS_SECRET_NAME),
                secret(
                    NUTANIX_CREDENTIALS_SECRET_NAME,
                    namespace,
                    BTreeMap::from([("credentials".to_string(), credentials.clone().into_bytes())]),
                )?,
            ))
        })
        .collect()
}

pub(crate) fn generate(install_config: &InstallConfig, cluster_id: &ClusterId) -> Result<Assets> {
    let mut assets = Assets::owning(&[
        CLUSTER_CONFIG_FILENAME,
        INFRASTRUCTURE_FILENAME,
        CLOUD_PROVIDER_CONFIG_FILENAME,
        "openshift/99_*_nutanix-credentials-secret.yaml",
    ]);

    assets.push(cluster_config(install_config)?.to_asset(CLUSTER_CONFIG_FILENAME)?);
    assets.push(infrastructure(install_config, cluster_id)?.to_asset(INFRASTRUCTURE_FILENAME)?);

    if let Some(nutanix) = &install_config.platform.nutanix {
        assets.push(cloud_provider_config(nutanix)?.to_asset(CLOUD_PROVIDER_CONFIG_FILENAME)?);
        for (filename, manifest) in nutanix_credentials_secrets(nutanix)? {
            assets.push(manifest.to_asset(filename)?);
        }
    }

    log::info!("Generated {} cluster manifests", assets.files.len());

    Ok(assets)
}

/// Parse a generated YAML asset back, for inspection
pub(crate) fn parse_asset(file: &AssetFile) -> Result<Value> {
    serde_yaml::from_slice(&file.data).context(format!("parsing {}", file.filename))
}
