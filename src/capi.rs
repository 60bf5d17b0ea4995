//! Cluster API manifests that stand up the control plane on Nutanix.

use crate::{
    asset::{Assets, Manifest},
    cluster_id::ClusterId,
    manifests,
    nutanix::NutanixMachineProviderConfig,
    types::{nutanix, InstallConfig},
};
use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub(crate) const CAPI_NAMESPACE: &str = "openshift-cluster-api-guests";
pub(crate) const CAPI_API_VERSION: &str = "cluster.x-k8s.io/v1beta1";
pub(crate) const CAPX_API_VERSION: &str = "infrastructure.cluster.x-k8s.io/v1beta1";

const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";
const CONTROL_PLANE_LABEL: &str = "cluster.x-k8s.io/control-plane";
const BOOTSTRAP_LABEL: &str = "install.openshift.io/bootstrap";
const API_SERVER_PORT: u16 = 6443;

fn credentials_secret_name(infra_id: &str) -> String {
    format!("{}-nutanix-credentials", infra_id)
}

/// Where the Cluster API controllers expect the control plane to answer: the first API VIP when
/// one is configured, the internal API name otherwise
pub(crate) fn control_plane_endpoint(install_config: &InstallConfig, platform: &nutanix::Platform) -> Value {
    let host = platform
        .api_vips
        .first()
        .cloned()
        .unwrap_or_else(|| format!("api-int.{}", install_config.cluster_domain()));
    json!({"host": host, "port": API_SERVER_PORT})
}

fn uuid_identifier(uuid: &str) -> Value {
    json!({"type": "uuid", "uuid": uuid})
}

pub(crate) fn nutanix_cluster(
    install_config: &InstallConfig,
    cluster_id: &ClusterId,
    platform: &nutanix::Platform,
) -> Manifest {
    let failure_domains = platform
        .failure_domains
        .iter()
        .map(|failure_domain| {
            json!({
                "name": failure_domain.name,
                "cluster": uuid_identifier(&failure_domain.prism_element.uuid),
                "subnets": failure_domain.subnet_uuids.iter().map(String::as_str).map(uuid_identifier).collect::<Vec<_>>(),
                "controlPlane": true,
            })
        })
        .collect::<Vec<_>>();

    let mut spec = json!({
        "prismCentral": {
            "address": platform.prism_central.endpoint.address,
            "port": platform.prism_central.endpoint.port,
            "insecure": false,
            "credentialRef": {
                "kind": "Secret",
                "name": credentials_secret_name(&cluster_id.infra_id),
                "namespace": CAPI_NAMESPACE,
            },
        },
        "controlPlaneEndpoint": control_plane_endpoint(install_config, platform),
    });
    if !failure_domains.is_empty() {
        spec["failureDomains"] = json!(failure_domains);
    }

    Manifest::namespaced(CAPX_API_VERSION, "NutanixCluster", &cluster_id.infra_id, CAPI_NAMESPACE).with_spec(spec)
}

pub(crate) fn cluster(cluster_id: &ClusterId) -> Manifest {
    Manifest::namespaced(CAPI_API_VERSION, "Cluster", &cluster_id.infra_id, CAPI_NAMESPACE).with_spec(json!({
        "clusterNetwork": {"apiServerPort": API_SERVER_PORT},
        "infrastructureRef": {
            "apiVersion": CAPX_API_VERSION,
            "kind": "NutanixCluster",
            "name": cluster_id.infra_id,
            "namespace": CAPI_NAMESPACE,
        },
    }))
}

/// Translate a machine API provider config into the NutanixMachine spec Cluster API consumes
pub(crate) fn nutanix_machine_spec(config: &NutanixMachineProviderConfig) -> Result<Value> {
    let mut spec = json!({
        "vcpusPerSocket": config.vcpus_per_socket,
        "vcpuSockets": config.vcpu_sockets,
        "memorySize": config.memory_size,
        "systemDiskSize": config.system_disk_size,
        "image": config.image,
        "cluster": config.cluster,
        "subnet": config.subnets,
    });

    match config.boot_type.as_str() {
        "" => {}
        "Legacy" => spec["bootType"] = json!("legacy"),
        "UEFI" | "SecureBoot" => spec["bootType"] = json!("uefi"),
        other => bail!("unsupported boot type {:?}", other),
    }
    if let Some(project) = &config.project {
        spec["project"] = json!(project);
    }
    if !config.categories.is_empty() {
        spec["additionalCategories"] = json!(config.categories);
    }
    if !config.gpus.is_empty() {
        spec["gpus"] = json!(config.gpus);
    }
    if !config.data_disks.is_empty() {
        spec["dataDisks"] = json!(config.data_disks);
    }

    Ok(spec)
}

fn machine_pair(
    cluster_id: &ClusterId,
    name: &str,
    config: &NutanixMachineProviderConfig,
    data_secret: &str,
    labels: &BTreeMap<String, String>,
) -> Result<(Manifest, Manifest)> {
    let nutanix_machine = Manifest::namespaced(CAPX_API_VERSION, "NutanixMachine", name, CAPI_NAMESPACE)
        .with_labels(labels.clone())
        .with_spec(nutanix_machine_spec(config).context(format!("translating machine {}", name))?);

    let mut machine_spec = json!({
        "clusterName": cluster_id.infra_id,
        "bootstrap": {"dataSecretName": data_secret},
        "infrastructureRef": {
            "apiVersion": CAPX_API_VERSION,
            "kind": "NutanixMachine",
            "name": name,
        },
    });
    if let Some(failure_domain) = &config.failure_domain {
        machine_spec["failureDomain"] = json!(failure_domain.name);
    }
    let machine = Manifest::namespaced(CAPI_API_VERSION, "Machine", name, CAPI_NAMESPACE)
        .with_labels(labels.clone())
        .with_spec(machine_spec);

    Ok((nutanix_machine, machine))
}

pub(crate) fn generate(
    install_config: &InstallConfig,
    cluster_id: &ClusterId,
    control_plane_configs: &[NutanixMachineProviderConfig],
) -> Result<Assets> {
    let mut assets = Assets::owning(&["cluster-api/*.yaml", "cluster-api/machines/*.yaml"]);

    let Some(platform) = &install_config.platform.nutanix else {
        log::info!("No Cluster API manifests for platform {:?}", install_config.platform.name());
        return Ok(assets);
    };
    let Some(bootstrap_config) = control_plane_configs.first() else {
        bail!("no control plane machines to build Cluster API machines from");
    };

    assets.push(Manifest::new("v1", "Namespace", CAPI_NAMESPACE).to_asset("cluster-api/000_capi-namespace.yaml")?);
    assets.push(cluster(cluster_id).to_asset("cluster-api/01_capi-cluster.yaml")?);
    assets.push(nutanix_cluster(install_config, cluster_id, platform).to_asset("cluster-api/01_nutanix-cluster.yaml")?);
    assets.push(
        manifests::secret(
            &credentials_secret_name(&cluster_id.infra_id),
            CAPI_NAMESPACE,
            BTreeMap::from([(
                "credentials".to_string(),
                manifests::nutanix_credentials(platform)?.into_bytes(),
            )]),
        )?
        .to_asset("cluster-api/01_nutanix-creds.yaml")?,
    );

    let mut labels = BTreeMap::from([(CLUSTER_NAME_LABEL.to_string(), cluster_id.infra_id.clone())]);
    labels.insert(CONTROL_PLANE_LABEL.to_string(), String::new());

    let mut push_pair = |name: &str, config: &NutanixMachineProviderConfig, data_secret: &str, labels: &BTreeMap<String, String>| -> Result<()> {
        let (nutanix_machine, machine) = machine_pair(cluster_id, name, config, data_secret, labels)?;
        assets.push(nutanix_machine.to_asset(format!("cluster-api/machines/10_inframachine_{}.yaml", name))?);
        assets.push(machine.to_asset(format!("cluster-api/machines/10_machine_{}.yaml", name))?);
        Ok(())
    };

    let mut bootstrap_labels = labels.clone();
    bootstrap_labels.insert(BOOTSTRAP_LABEL.to_string(), String::new());
    push_pair(
        &format!("{}-bootstrap", cluster_id.infra_id),
        bootstrap_config,
        &format!("{}-bootstrap", cluster_id.infra_id),
        &bootstrap_labels,
    )?;

    for (i, config) in control_plane_configs.iter().enumerate() {
        push_pair(
            &format!("{}-master-{}", cluster_id.infra_id, i),
            config,
            &format!("{}-master", cluster_id.infra_id),
            &labels,
        )?;
    }

    log::info!("Generated {} Cluster API manifests", assets.files.len());

    Ok(assets)
}
