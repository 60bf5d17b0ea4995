//! Translation of the Nutanix platform and machine pools into machine API objects.

use crate::{
    asset::{AssetFile, Assets, Manifest},
    cluster_id::ClusterId,
    manifests::{self, MACHINE_API_NAMESPACE, NUTANIX_CREDENTIALS_SECRET_NAME},
    types::{
        nutanix::{self, FailureDomain, ResourceIdentifier},
        InstallConfig, MACHINE_POOL_COMPUTE_ROLE_NAME, MACHINE_POOL_CONTROL_PLANE_ROLE_NAME,
    },
};
use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub(crate) mod machines;
pub(crate) mod machinesets;

pub(crate) const MACHINE_API_VERSION: &str = "machine.openshift.io/v1beta1";
pub(crate) const PROVIDER_CONFIG_API_VERSION: &str = "machine.openshift.io/v1";

pub(crate) const CLUSTER_LABEL: &str = "machine.openshift.io/cluster-api-cluster";
pub(crate) const ROLE_LABEL: &str = "machine.openshift.io/cluster-api-machine-role";
pub(crate) const TYPE_LABEL: &str = "machine.openshift.io/cluster-api-machine-type";
pub(crate) const MACHINESET_LABEL: &str = "machine.openshift.io/cluster-api-machineset";

pub(crate) const MASTER_USER_DATA_SECRET_NAME: &str = "master-user-data";
pub(crate) const WORKER_USER_DATA_SECRET_NAME: &str = "worker-user-data";

pub(crate) const MASTER_MACHINE_FILENAME_PATTERN: &str = "openshift/99_openshift-cluster-api_master-machines-*.yaml";
pub(crate) const WORKER_MACHINESET_FILENAME_PATTERN: &str = "openshift/99_openshift-cluster-api_worker-machineset-*.yaml";
pub(crate) const CONTROL_PLANE_MACHINE_SET_FILENAME: &str = "openshift/99_openshift-machine-api_master-control-plane-machine-set.yaml";

const MACHINE_CONFIG_SERVER_PORT: u16 = 22623;
const IGNITION_VERSION: &str = "3.2.0";
const BYTES_PER_GIB: i64 = 1024 * 1024 * 1024;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct LocalObjectReference {
    pub(crate) name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NutanixVmDisk {
    pub(crate) disk_size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) device_properties: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) storage_config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) data_source: Option<Value>,
}

/// The providerSpec value of every Nutanix Machine and MachineSet
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NutanixMachineProviderConfig {
    pub(crate) api_version: String,
    pub(crate) kind: String,
    pub(crate) cluster: ResourceIdentifier,
    pub(crate) image: ResourceIdentifier,
    pub(crate) subnets: Vec<ResourceIdentifier>,
    pub(crate) vcpus_per_socket: i64,
    pub(crate) vcpu_sockets: i64,
    pub(crate) memory_size: String,
    pub(crate) system_disk_size: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) boot_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) project: Option<ResourceIdentifier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) categories: Vec<nutanix::Category>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) gpus: Vec<nutanix::Gpu>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) data_disks: Vec<NutanixVmDisk>,
    pub(crate) credentials_secret: LocalObjectReference,
    pub(crate) user_data_secret: LocalObjectReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) failure_domain: Option<LocalObjectReference>,
}

fn uuid_identifier(uuid: &str) -> ResourceIdentifier {
    ResourceIdentifier {
        identifier_type: nutanix::IdentifierType::Uuid.to_string(),
        uuid: Some(uuid.to_string()),
        name: None,
    }
}

/// Render a byte count as a Kubernetes quantity, in Gi when it divides evenly
fn disk_quantity(bytes: i64) -> String {
    if bytes % BYTES_PER_GIB == 0 {
        format!("{}Gi", bytes / BYTES_PER_GIB)
    } else {
        bytes.to_string()
    }
}

fn data_disk(disk: &nutanix::DataDisk) -> NutanixVmDisk {
    NutanixVmDisk {
        disk_size: disk_quantity(disk.disk_size),
        device_properties: disk.device_properties.clone(),
        storage_config: disk.storage_config.clone(),
        data_source: disk.data_source_image.as_ref().map(|image| {
            let mut source = json!({"type": "uuid"});
            if !image.uuid.is_empty() {
                source["uuid"] = json!(image.uuid);
            }
            if !image.name.is_empty() {
                source["name"] = json!(image.name);
            }
            source
        }),
    }
}

/// Build the provider config for one machine. Cluster and subnets come from the failure domain
/// when there is one, otherwise from the platform's first Prism Element and its subnets.
pub(crate) fn provider_spec(
    platform: &nutanix::Platform,
    mpool: &nutanix::MachinePool,
    image_name: &str,
    user_data_secret: &str,
    failure_domain: Option<&FailureDomain>,
) -> Result<NutanixMachineProviderConfig> {
    ensure!(
        mpool.num_cores_per_socket > 0,
        "cores per socket must be positive, got {}",
        mpool.num_cores_per_socket
    );
    ensure!(
        mpool.num_cpus >= mpool.num_cores_per_socket && mpool.num_cpus % mpool.num_cores_per_socket == 0,
        "{} CPUs cannot be split into sockets of {} cores",
        mpool.num_cpus,
        mpool.num_cores_per_socket
    );

    let (cluster_uuid, subnet_uuids) = match failure_domain {
        Some(failure_domain) => (&failure_domain.prism_element.uuid, &failure_domain.subnet_uuids),
        None => match platform.prism_elements.first() {
            Some(prism_element) => (&prism_element.uuid, &platform.subnet_uuids),
            None => bail!("the nutanix platform defines no prism elements"),
        },
    };
    ensure!(!subnet_uuids.is_empty(), "no subnet UUIDs defined for prism element {}", cluster_uuid);

    Ok(NutanixMachineProviderConfig {
        api_version: PROVIDER_CONFIG_API_VERSION.to_string(),
        kind: "NutanixMachineProviderConfig".to_string(),
        cluster: uuid_identifier(cluster_uuid),
        image: ResourceIdentifier {
            identifier_type: nutanix::IdentifierType::Name.to_string(),
            name: Some(image_name.to_string()),
            uuid: None,
        },
        subnets: subnet_uuids.iter().map(|uuid| uuid_identifier(uuid)).collect(),
        vcpus_per_socket: mpool.num_cores_per_socket,
        vcpu_sockets: mpool.num_cpus / mpool.num_cores_per_socket,
        memory_size: format!("{}Mi", mpool.memory_mib),
        system_disk_size: format!("{}Gi", mpool.os_disk.disk_size_gib),
        boot_type: mpool.boot_type.clone(),
        project: mpool.project.clone(),
        categories: mpool.categories.clone(),
        gpus: mpool.gpus.clone(),
        data_disks: mpool.data_disks.iter().map(data_disk).collect(),
        credentials_secret: LocalObjectReference {
            name: NUTANIX_CREDENTIALS_SECRET_NAME.to_string(),
        },
        user_data_secret: LocalObjectReference {
            name: user_data_secret.to_string(),
        },
        failure_domain: failure_domain.map(|failure_domain| LocalObjectReference {
            name: failure_domain.name.clone(),
        }),
    })
}

pub(crate) fn machine_labels(infra_id: &str, role: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (CLUSTER_LABEL.to_string(), infra_id.to_string()),
        (ROLE_LABEL.to_string(), role.to_string()),
        (TYPE_LABEL.to_string(), role.to_string()),
    ])
}

/// Minimal Ignition config telling a machine to fetch its real config from the machine config
/// server
pub(crate) fn pointer_ignition(cluster_domain: &str, role: &str) -> Value {
    json!({
        "ignition": {
            "config": {
                "merge": [{
                    "source": format!("https://api-int.{}:{}/config/{}", cluster_domain, MACHINE_CONFIG_SERVER_PORT, role),
                }],
            },
            "version": IGNITION_VERSION,
        },
    })
}

pub(crate) fn user_data_secret(name: &str, cluster_domain: &str, role: &str) -> Result<Manifest> {
    let user_data = serde_json::to_vec(&pointer_ignition(cluster_domain, role)).context("serializing pointer ignition")?;
    manifests::secret(
        name,
        MACHINE_API_NAMESPACE,
        BTreeMap::from([
            ("disableTemplating".to_string(), b"true".to_vec()),
            ("userData".to_string(), user_data),
        ]),
    )
}

pub(crate) fn user_data_filename(role: &str) -> String {
    format!("openshift/99_openshift-cluster-api_{}-user-data-secret.yaml", role)
}

fn padded_index(index: usize, count: usize) -> String {
    let width = count.to_string().len();
    format!("{:0width$}", index, width = width)
}

/// Every machine API asset: user-data secrets, control plane machines and their
/// ControlPlaneMachineSet, and the compute machinesets. Platforms without a machine translator
/// only get the user-data secrets.
pub(crate) fn generate(install_config: &InstallConfig, cluster_id: &ClusterId) -> Result<Assets> {
    let mut assets = Assets::owning(&[
        MASTER_MACHINE_FILENAME_PATTERN,
        WORKER_MACHINESET_FILENAME_PATTERN,
        CONTROL_PLANE_MACHINE_SET_FILENAME,
        "openshift/99_openshift-cluster-api_*-user-data-secret.yaml",
    ]);

    let cluster_domain = install_config.cluster_domain();
    for (role, secret_name) in [
        (MACHINE_POOL_CONTROL_PLANE_ROLE_NAME, MASTER_USER_DATA_SECRET_NAME),
        (MACHINE_POOL_COMPUTE_ROLE_NAME, WORKER_USER_DATA_SECRET_NAME),
    ] {
        assets.push(user_data_secret(secret_name, &cluster_domain, role)?.to_asset(user_data_filename(role))?);
    }

    let Some(platform) = &install_config.platform.nutanix else {
        log::info!(
            "Platform {:?} has no machine translator, skipping machines",
            install_config.platform.name()
        );
        return Ok(assets);
    };

    let image_name = nutanix::rhcos_image_name(platform, &cluster_id.infra_id);

    let control_plane = install_config
        .control_plane
        .as_ref()
        .context("install-config has no control plane pool")?;
    let (mut masters, control_plane_machine_set) = machines::machines(
        cluster_id,
        platform,
        control_plane,
        &image_name,
        MACHINE_POOL_CONTROL_PLANE_ROLE_NAME,
        MASTER_USER_DATA_SECRET_NAME,
    )
    .context("creating master machine objects")?;
    machines::config_masters(&mut masters);

    let master_count = masters.len();
    for (i, machine) in masters.iter().enumerate() {
        assets.push(machine.to_asset(MASTER_MACHINE_FILENAME_PATTERN.replace('*', &padded_index(i, master_count)))?);
    }
    if let Some(control_plane_machine_set) = control_plane_machine_set {
        assets.push(control_plane_machine_set.to_asset(CONTROL_PLANE_MACHINE_SET_FILENAME)?);
    }

    let mut machine_sets = vec![];
    for pool in &install_config.compute {
        machine_sets.extend(
            machinesets::machine_sets(
                cluster_id,
                platform,
                pool,
                &image_name,
                MACHINE_POOL_COMPUTE_ROLE_NAME,
                WORKER_USER_DATA_SECRET_NAME,
            )
            .context(format!("creating machinesets for compute pool {:?}", pool.name))?,
        );
    }
    for (i, machine_set) in machine_sets.iter().enumerate() {
        assets.push(machine_set.to_asset(WORKER_MACHINESET_FILENAME_PATTERN.replace('*', &i.to_string()))?);
    }

    log::info!(
        "Generated {} control plane machines and {} compute machinesets",
        master_count,
        machine_sets.len()
    );

    Ok(assets)
}

/// Read the provider configs back out of generated control plane machine assets, in file order
pub(crate) fn control_plane_provider_configs(assets: &Assets) -> Result<Vec<NutanixMachineProviderConfig>> {
    let prefix = MASTER_MACHINE_FILENAME_PATTERN.trim_end_matches("*.yaml");

    let mut files: Vec<&AssetFile> = assets
        .files
        .iter()
        .filter(|file| file.filename.starts_with(prefix))
        .collect();
    files.sort_by(|a, b| a.filename.cmp(&b.filename));

    files
        .into_iter()
        .map(|file| {
            let machine: Manifest = serde_yaml::from_slice(&file.data).context(format!("parsing {}", file.filename))?;
            let value = machine
                .spec()
                .and_then(|spec| spec.pointer("/providerSpec/value"))
                .cloned()
                .context(format!("{} has no provider spec", file.filename))?;
            serde_json::from_value(value).context(format!("decoding provider spec of {}", file.filename))
        })
        .collect()
}
