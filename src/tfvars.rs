//! Terraform variable files for the cluster and for the Nutanix platform.

use crate::{
    asset::{AssetFile, Assets},
    cluster_id::ClusterId,
    nutanix::{pointer_ignition, NutanixMachineProviderConfig},
    types::{nutanix, InstallConfig, PlatformName, MACHINE_POOL_CONTROL_PLANE_ROLE_NAME},
};
use anyhow::{bail, ensure, Context, Result};
use fn_error_context::context;
use serde::Serialize;
use std::collections::BTreeMap;

pub(crate) const TF_VARS_FILENAME: &str = "terraform.tfvars.json";
pub(crate) const TF_PLATFORM_VARS_FILENAME: &str = "terraform.platform.auto.tfvars.json";

#[derive(Debug, Serialize)]
pub(crate) struct ClusterTfVars {
    pub(crate) cluster_id: String,
    pub(crate) cluster_domain: String,
    pub(crate) base_domain: String,
    pub(crate) machine_v4_cidrs: Vec<String>,
    pub(crate) machine_v6_cidrs: Vec<String>,
    pub(crate) use_ipv4: bool,
    pub(crate) use_ipv6: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) ignition_bootstrap: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) ignition_bootstrap_file_size: Option<usize>,
    pub(crate) ignition_master: String,
    pub(crate) master_count: usize,
    pub(crate) masters_schedulable: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct NutanixTfVars {
    pub(crate) nutanix_prism_central_address: String,
    pub(crate) nutanix_prism_central_port: String,
    pub(crate) nutanix_username: String,
    pub(crate) nutanix_password: String,
    pub(crate) nutanix_control_plane_memory_mib: i64,
    pub(crate) nutanix_control_plane_disk_mib: i64,
    pub(crate) nutanix_control_plane_num_cpus: i64,
    pub(crate) nutanix_control_plane_cores_per_socket: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub(crate) nutanix_control_plane_project_uuid: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub(crate) nutanix_control_plane_categories: BTreeMap<String, String>,
    pub(crate) nutanix_prism_element_uuids: Vec<String>,
    pub(crate) nutanix_subnet_uuids: Vec<String>,
    pub(crate) nutanix_image: String,
    pub(crate) nutanix_image_uri: String,
    pub(crate) nutanix_bootstrap_ignition_image: String,
    pub(crate) nutanix_bootstrap_ignition_image_filepath: String,
}

/// Inputs to the Terraform variables that do not come from the install-config itself
pub(crate) struct TfVarsSources<'a> {
    pub(crate) bootstrap_ignition: Option<&'a str>,
    pub(crate) image_uri: Option<&'a str>,
    pub(crate) bootstrap_image_path: String,
    pub(crate) control_plane_configs: &'a [NutanixMachineProviderConfig],
}

/// Convert a Kubernetes binary quantity (`Mi`, `Gi` or `Ti`) to MiB
#[context("parsing quantity {:?}", quantity)]
pub(crate) fn quantity_to_mib(quantity: &str) -> Result<i64> {
    let (number, multiplier) = if let Some(number) = quantity.strip_suffix("Mi") {
        (number, 1)
    } else if let Some(number) = quantity.strip_suffix("Gi") {
        (number, 1024)
    } else if let Some(number) = quantity.strip_suffix("Ti") {
        (number, 1024 * 1024)
    } else {
        bail!("unsupported unit")
    };

    let number: i64 = number.parse().context("invalid number")?;
    Ok(number * multiplier)
}

fn uuid_of(identifier: &nutanix::ResourceIdentifier) -> Result<String> {
    identifier
        .uuid
        .clone()
        .context(format!("expected a UUID identifier, got type {:?}", identifier.identifier_type))
}

pub(crate) fn cluster_tfvars(install_config: &InstallConfig, cluster_id: &ClusterId, sources: &TfVarsSources) -> Result<ClusterTfVars> {
    let networking = install_config.networking.as_ref().context("install-config has no networking")?;

    let (machine_v4_cidrs, machine_v6_cidrs): (Vec<_>, Vec<_>) =
        networking.machine_network.iter().map(|entry| entry.cidr).partition(|cidr| cidr.is_ipv4());

    let master_count = sources.control_plane_configs.len();
    ensure!(master_count > 0, "master slice cannot be empty");

    let worker_count: i64 = install_config.compute.iter().filter_map(|pool| pool.replicas).sum();

    Ok(ClusterTfVars {
        cluster_id: cluster_id.infra_id.clone(),
        cluster_domain: install_config.cluster_domain(),
        base_domain: install_config.base_domain.clone(),
        machine_v4_cidrs: machine_v4_cidrs.iter().map(ToString::to_string).collect(),
        machine_v6_cidrs: machine_v6_cidrs.iter().map(ToString::to_string).collect(),
        use_ipv4: networking.service_network.iter().any(|net| net.is_ipv4()),
        use_ipv6: networking.service_network.iter().any(|net| !net.is_ipv4()),
        ignition_bootstrap: sources.bootstrap_ignition.map(str::to_string),
        ignition_bootstrap_file_size: sources.bootstrap_ignition.map(str::len),
        ignition_master: serde_json::to_string(&pointer_ignition(
            &install_config.cluster_domain(),
            MACHINE_POOL_CONTROL_PLANE_ROLE_NAME,
        ))
        .context("serializing master pointer ignition")?,
        master_count,
        masters_schedulable: worker_count == 0,
    })
}

pub(crate) fn nutanix_tfvars(
    platform: &nutanix::Platform,
    cluster_id: &ClusterId,
    sources: &TfVarsSources,
) -> Result<NutanixTfVars> {
    let Some(first) = sources.control_plane_configs.first() else {
        bail!("no control plane machines");
    };

    let image_uri = if !platform.cluster_os_image.is_empty() {
        platform.cluster_os_image.clone()
    } else {
        sources
            .image_uri
            .context("no RHCOS image URI, set platform.nutanix.clusterOSImage or pass one explicitly")?
            .to_string()
    };

    Ok(NutanixTfVars {
        nutanix_prism_central_address: platform.prism_central.endpoint.address.clone(),
        nutanix_prism_central_port: platform.prism_central.endpoint.port.to_string(),
        nutanix_username: platform.prism_central.username.clone(),
        nutanix_password: platform.prism_central.password.clone(),
        nutanix_control_plane_memory_mib: quantity_to_mib(&first.memory_size)?,
        nutanix_control_plane_disk_mib: quantity_to_mib(&first.system_disk_size)?,
        nutanix_control_plane_num_cpus: first.vcpu_sockets * first.vcpus_per_socket,
        nutanix_control_plane_cores_per_socket: first.vcpus_per_socket,
        nutanix_control_plane_project_uuid: first
            .project
            .as_ref()
            .and_then(|project| project.uuid.clone())
            .unwrap_or_default(),
        nutanix_control_plane_categories: first
            .categories
            .iter()
            .map(|category| (category.key.clone(), category.value.clone()))
            .collect(),
        nutanix_prism_element_uuids: sources
            .control_plane_configs
            .iter()
            .map(|config| uuid_of(&config.cluster))
            .collect::<Result<_>>()?,
        nutanix_subnet_uuids: sources
            .control_plane_configs
            .iter()
            .map(|config| match config.subnets.first() {
                Some(subnet) => uuid_of(subnet),
                None => bail!("control plane machine has no subnet"),
            })
            .collect::<Result<_>>()?,
        nutanix_image: first.image.name.clone().unwrap_or_default(),
        nutanix_image_uri: image_uri,
        nutanix_bootstrap_ignition_image: nutanix::bootstrap_image_name(&cluster_id.infra_id),
        nutanix_bootstrap_ignition_image_filepath: sources.bootstrap_image_path.clone(),
    })
}

pub(crate) fn generate(install_config: &InstallConfig, cluster_id: &ClusterId, sources: &TfVarsSources) -> Result<Assets> {
    match install_config.platform.known_name() {
        Some(platform @ (PlatformName::None | PlatformName::External)) => {
            bail!("cannot create the cluster because {:?} is a UPI platform", platform.to_string())
        }
        _ => {}
    }

    let mut assets = Assets::owning(&[TF_VARS_FILENAME, TF_PLATFORM_VARS_FILENAME]);
    assets.push(AssetFile::json(
        TF_VARS_FILENAME,
        &cluster_tfvars(install_config, cluster_id, sources).context("building cluster terraform variables")?,
    )?);

    match &install_config.platform.nutanix {
        Some(platform) => assets.push(AssetFile::json(
            TF_PLATFORM_VARS_FILENAME,
            &nutanix_tfvars(platform, cluster_id, sources).context("building nutanix terraform variables")?,
        )?),
        None => log::warn!("unrecognized platform {:?}", install_config.platform.name()),
    }

    Ok(assets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        nutanix::{self as machine_api, tests::cluster_id},
        types::tests::nutanix_install_config,
    };
    use serde_json::{json, Value};

    #[test]
    fn test_quantity_to_mib() -> Result<()> {
        assert_eq!(quantity_to_mib("16384Mi")?, 16384);
        assert_eq!(quantity_to_mib("120Gi")?, 122880);
        assert_eq!(quantity_to_mib("1Ti")?, 1048576);
        assert!(quantity_to_mib("120G").is_err());
        assert!(quantity_to_mib("xGi").is_err());
        Ok(())
    }

    #[test]
    fn test_generate() -> Result<()> {
        let install_config = nutanix_install_config();
        let configs = machine_api::control_plane_provider_configs(&machine_api::generate(&install_config, &cluster_id())?)?;

        let assets = generate(
            &install_config,
            &cluster_id(),
            &TfVarsSources {
                bootstrap_ignition: Some(r#"{"ignition":{"version":"3.2.0"}}"#),
                image_uri: Some("https://example.com/rhcos.qcow2"),
                bootstrap_image_path: "/tmp/assets/test-cluster-x7k2p-bootstrap-ign.iso".to_string(),
                control_plane_configs: &configs,
            },
        )?;

        let tfvars: Value = serde_json::from_slice(&assets.get(TF_VARS_FILENAME).unwrap().data)?;
        assert_eq!(tfvars["cluster_id"], "test-cluster-x7k2p");
        assert_eq!(tfvars["cluster_domain"], "test-cluster.example.com");
        assert_eq!(tfvars["machine_v4_cidrs"], json!(["10.0.0.0/16"]));
        assert_eq!(tfvars["machine_v6_cidrs"], json!([]));
        assert_eq!(tfvars["use_ipv4"], true);
        assert_eq!(tfvars["master_count"], 3);
        assert_eq!(tfvars["masters_schedulable"], false);
        assert_eq!(tfvars["ignition_bootstrap_file_size"], 32);

        let platform: Value = serde_json::from_slice(&assets.get(TF_PLATFORM_VARS_FILENAME).unwrap().data)?;
        assert_eq!(
            platform,
            json!({
                "nutanix_prism_central_address": "pc.example.com",
                "nutanix_prism_central_port": "9440",
                "nutanix_username": "admin",
                "nutanix_password": "secret",
                "nutanix_control_plane_memory_mib": 16384,
                "nutanix_control_plane_disk_mib": 122880,
                "nutanix_control_plane_num_cpus": 8,
                "nutanix_control_plane_cores_per_socket": 1,
                "nutanix_prism_element_uuids": [
                    "0005b0f1-8f43-a0f2-02b7-3cecef193712",
                    "0005b0f1-8f43-a0f2-02b7-3cecef193712",
                    "0005b0f1-8f43-a0f2-02b7-3cecef193712",
                ],
                "nutanix_subnet_uuids": [
                    "c7938dc6-7659-453e-a688-e26020c68e43",
                    "c7938dc6-7659-453e-a688-e26020c68e43",
                    "c7938dc6-7659-453e-a688-e26020c68e43",
                ],
                "nutanix_image": "test-cluster-x7k2p-rhcos",
                "nutanix_image_uri": "https://example.com/rhcos.qcow2",
                "nutanix_bootstrap_ignition_image": "test-cluster-x7k2p-bootstrap-ign.iso",
                "nutanix_bootstrap_ignition_image_filepath": "/tmp/assets/test-cluster-x7k2p-bootstrap-ign.iso",
            })
        );

        Ok(())
    }

    #[test]
    fn test_cluster_os_image_wins() -> Result<()> {
        let mut install_config = nutanix_install_config();
        install_config.platform.nutanix.as_mut().unwrap().cluster_os_image = "https://mirror.example.com/rhcos.qcow2".to_string();
        let configs = machine_api::control_plane_provider_configs(&machine_api::generate(&install_config, &cluster_id())?)?;

        let tfvars = nutanix_tfvars(
            install_config.platform.nutanix.as_ref().unwrap(),
            &cluster_id(),
            &TfVarsSources {
                bootstrap_ignition: None,
                image_uri: None,
                bootstrap_image_path: String::new(),
                control_plane_configs: &configs,
            },
        )?;
        assert_eq!(tfvars.nutanix_image_uri, "https://mirror.example.com/rhcos.qcow2");

        Ok(())
    }

    #[test]
    fn test_upi_platform_rejected() {
        let mut install_config = nutanix_install_config();
        install_config.platform.nutanix = None;
        install_config.platform.none = Some(serde_yaml::Value::Null);

        let err = generate(
            &install_config,
            &cluster_id(),
            &TfVarsSources {
                bootstrap_ignition: None,
                image_uri: None,
                bootstrap_image_path: String::new(),
                control_plane_configs: &[],
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("UPI platform"));
    }

    #[test]
    fn test_empty_control_plane_rejected() {
        let install_config = nutanix_install_config();
        let sources = TfVarsSources {
            bootstrap_ignition: None,
            image_uri: Some("https://example.com/rhcos.qcow2"),
            bootstrap_image_path: String::new(),
            control_plane_configs: &[],
        };

        assert!(cluster_tfvars(&install_config, &cluster_id(), &sources).is_err());
    }
}
