use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

pub(crate) const DEFAULT_PRISM_PORT: i32 = 9440;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Platform {
    #[serde(default)]
    pub(crate) prism_central: PrismCentral,
    #[serde(default)]
    pub(crate) prism_elements: Vec<PrismElement>,
    #[serde(default, rename = "subnetUUIDs")]
    pub(crate) subnet_uuids: Vec<String>,
    #[serde(default, rename = "clusterOSImage", skip_serializing_if = "String::is_empty")]
    pub(crate) cluster_os_image: String,
    #[serde(default, rename = "preloadedOSImageName", skip_serializing_if = "String::is_empty")]
    pub(crate) preloaded_os_image_name: String,
    #[serde(default, rename = "apiVIPs", skip_serializing_if = "Vec::is_empty")]
    pub(crate) api_vips: Vec<String>,
    #[serde(default, rename = "ingressVIPs", skip_serializing_if = "Vec::is_empty")]
    pub(crate) ingress_vips: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) load_balancer: Option<LoadBalancer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) default_machine_platform: Option<MachinePool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) failure_domains: Vec<FailureDomain>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct PrismCentral {
    #[serde(default)]
    pub(crate) endpoint: PrismEndpoint,
    #[serde(default)]
    pub(crate) username: String,
    #[serde(default)]
    pub(crate) password: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct PrismEndpoint {
    #[serde(default)]
    pub(crate) address: String,
    #[serde(default)]
    pub(crate) port: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct PrismElement {
    #[serde(default)]
    pub(crate) uuid: String,
    #[serde(default)]
    pub(crate) endpoint: PrismEndpoint,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) name: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoadBalancer {
    #[serde(default, rename = "type")]
    pub(crate) lb_type: String,
}

pub(crate) const LOAD_BALANCER_TYPE_USER_MANAGED: &str = "UserManaged";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FailureDomain {
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) prism_element: PrismElement,
    #[serde(default, rename = "subnetUUIDs")]
    pub(crate) subnet_uuids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) storage_containers: Vec<StorageResourceReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) data_source_images: Vec<StorageResourceReference>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StorageResourceReference {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) reference_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) uuid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MachinePool {
    #[serde(default, rename = "cpus")]
    pub(crate) num_cpus: i64,
    #[serde(default, rename = "coresPerSocket")]
    pub(crate) num_cores_per_socket: i64,
    #[serde(default, rename = "memoryMiB")]
    pub(crate) memory_mib: i64,
    #[serde(default)]
    pub(crate) os_disk: OsDisk,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) boot_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) project: Option<ResourceIdentifier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) categories: Vec<Category>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) gpus: Vec<Gpu>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) data_disks: Vec<DataDisk>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) failure_domains: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OsDisk {
    #[serde(default, rename = "diskSizeGiB")]
    pub(crate) disk_size_gib: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub(crate) identifier_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) uuid: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Category {
    pub(crate) key: String,
    pub(crate) value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Gpu {
    #[serde(rename = "type")]
    pub(crate) gpu_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(default, rename = "deviceID", skip_serializing_if = "Option::is_none")]
    pub(crate) device_id: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DataDisk {
    /// Size in bytes, as in a Kubernetes quantity expanded to an integer
    pub(crate) disk_size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) device_properties: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) storage_config: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) data_source_image: Option<StorageResourceReference>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr, EnumString, EnumIter)]
pub(crate) enum BootType {
    Legacy,
    #[strum(serialize = "UEFI")]
    Uefi,
    SecureBoot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr, EnumString, EnumIter)]
pub(crate) enum IdentifierType {
    #[strum(serialize = "name")]
    Name,
    #[strum(serialize = "uuid")]
    Uuid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr, EnumString, EnumIter)]
pub(crate) enum GpuIdentifierType {
    Name,
    #[strum(serialize = "DeviceID")]
    DeviceId,
}

impl MachinePool {
    /// Overlay every field of `required` that has been explicitly set onto this pool
    pub(crate) fn set(&mut self, required: Option<&MachinePool>) {
        let Some(required) = required else {
            return;
        };

        if required.num_cpus != 0 {
            self.num_cpus = required.num_cpus;
        }
        if required.num_cores_per_socket != 0 {
            self.num_cores_per_socket = required.num_cores_per_socket;
        }
        if required.memory_mib != 0 {
            self.memory_mib = required.memory_mib;
        }
        if required.os_disk.disk_size_gib != 0 {
            self.os_disk.disk_size_gib = required.os_disk.disk_size_gib;
        }
        if !required.boot_type.is_empty() {
            self.boot_type = required.boot_type.clone();
        }
        if required.project.is_some() {
            self.project = required.project.clone();
        }
        if !required.categories.is_empty() {
            self.categories = required.categories.clone();
        }
        if !required.gpus.is_empty() {
            self.gpus = required.gpus.clone();
        }
        if !required.data_disks.is_empty() {
            self.data_disks = required.data_disks.clone();
        }
        if !required.failure_domains.is_empty() {
            self.failure_domains = required.failure_domains.clone();
        }
    }

    /// Make sure every failure domain this pool references is defined on the platform. Used right
    /// before machines are generated for `role`.
    pub(crate) fn validate_config(&self, platform: &Platform, role: &str) -> Result<()> {
        for name in &self.failure_domains {
            if platform.failure_domain(name).is_none() {
                bail!("the {} machine pool references failure domain {:?} which is not defined", role, name);
            }
        }

        Ok(())
    }
}

impl Platform {
    pub(crate) fn failure_domain(&self, name: &str) -> Option<&FailureDomain> {
        self.failure_domains.iter().find(|failure_domain| failure_domain.name == name)
    }

    /// Resolve the failure domains named by a machine pool, in the order the pool lists them
    pub(crate) fn failure_domains_for(&self, pool: &MachinePool) -> Result<Vec<&FailureDomain>> {
        pool.failure_domains
            .iter()
            .map(|name| match self.failure_domain(name) {
                Some(failure_domain) => Ok(failure_domain),
                None => bail!("failure domain {:?} not found", name),
            })
            .collect()
    }

    /// Every Prism Element the cluster will use, deduplicated by UUID
    pub(crate) fn all_prism_elements(&self) -> Vec<&PrismElement> {
        let mut prism_elements: Vec<&PrismElement> = vec![];
        for prism_element in self
            .prism_elements
            .iter()
            .chain(self.failure_domains.iter().map(|failure_domain| &failure_domain.prism_element))
        {
            if !prism_elements.iter().any(|existing| existing.uuid == prism_element.uuid) {
                prism_elements.push(prism_element);
            }
        }
        prism_elements
    }

    pub(crate) fn is_user_managed_load_balancer(&self) -> bool {
        self.load_balancer
            .as_ref()
            .is_some_and(|load_balancer| load_balancer.lb_type == LOAD_BALANCER_TYPE_USER_MANAGED)
    }
}

/// The name of the RHCOS image machines boot from. A preloaded image is used as-is, otherwise
/// the installer uploads one named after the infra ID.
pub(crate) fn rhcos_image_name(platform: &Platform, infra_id: &str) -> String {
    if !platform.preloaded_os_image_name.is_empty() {
        return platform.preloaded_os_image_name.clone();
    }
    format!("{}-rhcos", infra_id)
}

pub(crate) fn bootstrap_image_name(infra_id: &str) -> String {
    format!("{}-bootstrap-ign.iso", infra_id)
}
