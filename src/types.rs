use crate::ipnet::IpNet;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

pub(crate) mod defaults;
pub(crate) mod nutanix;

pub(crate) const INSTALL_CONFIG_VERSION: &str = "v1";
pub(crate) const INSTALL_CONFIG_FILENAME: &str = "install-config.yaml";

const REDACTED: &str = "<redacted>";

pub(crate) const MACHINE_POOL_CONTROL_PLANE_ROLE_NAME: &str = "master";
pub(crate) const MACHINE_POOL_COMPUTE_ROLE_NAME: &str = "worker";
pub(crate) const MACHINE_POOL_EDGE_ROLE_NAME: &str = "edge";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InstallConfig {
    #[serde(default)]
    pub(crate) api_version: String,
    #[serde(default)]
    pub(crate) metadata: ObjectMeta,
    #[serde(default)]
    pub(crate) base_domain: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) ssh_key: String,
    #[serde(default)]
    pub(crate) pull_secret: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) additional_trust_bundle: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) additional_trust_bundle_policy: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) fips: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) networking: Option<Networking>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) control_plane: Option<MachinePool>,
    #[serde(default)]
    pub(crate) compute: Vec<MachinePool>,
    #[serde(default)]
    pub(crate) platform: Platform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) proxy: Option<Proxy>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) publish: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) credentials_mode: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) image_digest_sources: Vec<ImageDigestSource>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) feature_set: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct ObjectMeta {
    #[serde(default)]
    pub(crate) name: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Networking {
    #[serde(default)]
    pub(crate) network_type: String,
    #[serde(default)]
    pub(crate) machine_network: Vec<MachineNetworkEntry>,
    #[serde(default)]
    pub(crate) cluster_network: Vec<ClusterNetworkEntry>,
    #[serde(default)]
    pub(crate) service_network: Vec<IpNet>,
    #[serde(default, rename = "clusterNetworkMTU", skip_serializing_if = "Option::is_none")]
    pub(crate) cluster_network_mtu: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct MachineNetworkEntry {
    pub(crate) cidr: IpNet,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ClusterNetworkEntry {
    pub(crate) cidr: IpNet,
    #[serde(default)]
    pub(crate) host_prefix: i32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MachinePool {
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) replicas: Option<i64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) hyperthreading: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) architecture: String,
    #[serde(default)]
    pub(crate) platform: MachinePoolPlatform,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct MachinePoolPlatform {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) nutanix: Option<nutanix::MachinePool>,
}

/// The platform section of the install-config. Exactly one key is expected to be set. Platforms
/// this installer has no translator for are still captured (in `other`) so that they can be
/// reported by validation rather than silently dropped by the parser.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct Platform {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) nutanix: Option<nutanix::Platform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) none: Option<serde_yaml::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) external: Option<ExternalPlatform>,
    #[serde(flatten)]
    pub(crate) other: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExternalPlatform {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) platform_name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr, EnumString, EnumIter)]
pub(crate) enum PlatformName {
    #[strum(serialize = "nutanix")]
    Nutanix,
    #[strum(serialize = "none")]
    None,
    #[strum(serialize = "external")]
    External,
}

impl Platform {
    /// Names of every platform key present, in a stable order
    pub(crate) fn names(&self) -> Vec<String> {
        let mut names = vec![];
        if self.nutanix.is_some() {
            names.push(PlatformName::Nutanix.to_string());
        }
        if self.none.is_some() {
            names.push(PlatformName::None.to_string());
        }
        if self.external.is_some() {
            names.push(PlatformName::External.to_string());
        }
        names.extend(self.other.keys().cloned());
        names.sort();
        names
    }

    /// The single platform this install-config targets, or an empty string when none or several
    /// are set (validation reports both cases)
    pub(crate) fn name(&self) -> String {
        match self.names().as_slice() {
            [single] => single.clone(),
            _ => String::new(),
        }
    }

    pub(crate) fn known_name(&self) -> Option<PlatformName> {
        self.name().parse().ok()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Proxy {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) http_proxy: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) https_proxy: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) no_proxy: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct ImageDigestSource {
    #[serde(default)]
    pub(crate) source: String,
    #[serde(default)]
    pub(crate) mirrors: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr, EnumString, EnumIter)]
pub(crate) enum PublishingStrategy {
    External,
    Internal,
    Mixed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr, EnumString, EnumIter)]
pub(crate) enum CredentialsMode {
    Mint,
    Passthrough,
    Manual,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr, EnumString, EnumIter)]
pub(crate) enum Hyperthreading {
    Enabled,
    Disabled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr, EnumString, EnumIter)]
pub(crate) enum Architecture {
    #[strum(serialize = "amd64")]
    Amd64,
    #[strum(serialize = "arm64")]
    Arm64,
    #[strum(serialize = "ppc64le")]
    Ppc64le,
    #[strum(serialize = "s390x")]
    S390x,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr, EnumString, EnumIter)]
pub(crate) enum TrustBundlePolicy {
    Proxyonly,
    Always,
}

impl InstallConfig {
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self> {
        let mut install_config: InstallConfig = serde_yaml::from_slice(bytes).context("parsing install-config YAML")?;
        defaults::set_install_config_defaults(&mut install_config);
        Ok(install_config)
    }

    /// Read `install-config.yaml` from the asset directory and apply defaults
    pub(crate) fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(INSTALL_CONFIG_FILENAME);
        let bytes = std::fs::read(&path).context(format!("reading {}", path.display()))?;
        Self::parse(&bytes).context(format!("loading {}", path.display()))
    }

    pub(crate) fn cluster_domain(&self) -> String {
        format!("{}.{}", self.metadata.name, self.base_domain.trim_end_matches('.'))
    }

    pub(crate) fn is_single_node_openshift(&self) -> bool {
        self.control_plane.as_ref().and_then(|pool| pool.replicas) == Some(1)
    }

    pub(crate) fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("serializing install-config")
    }

    /// A copy safe to put in logs and summaries
    pub(crate) fn redacted(&self) -> Self {
        let mut redacted = self.clone();
        if !redacted.pull_secret.is_empty() {
            redacted.pull_secret = REDACTED.to_string();
        }
        if let Some(nutanix) = redacted.platform.nutanix.as_mut() {
            nutanix.prism_central.password = REDACTED.to_string();
        }
        redacted
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const NUTANIX_INSTALL_CONFIG: &str = r#"
apiVersion: v1
baseDomain: example.com
metadata:
  name: test-cluster
pullSecret: '{"auths":{"quay.io":{"auth":"Zm9vOmJhcg=="}}}'
controlPlane:
  name: master
  replicas: 3
compute:
- name: worker
  replicas: 5
  platform:
    nutanix:
      failureDomains: [fd-a, fd-b]
networking:
  machineNetwork:
  - cidr: 10.0.0.0/16
platform:
  nutanix:
    prismCentral:
      endpoint:
        address: pc.example.com
        port: 9440
      username: admin
      password: secret
    prismElements:
    - uuid: 0005b0f1-8f43-a0f2-02b7-3cecef193712
      endpoint:
        address: pe.example.com
        port: 9440
      name: pe-0
    subnetUUIDs:
    - c7938dc6-7659-453e-a688-e26020c68e43
    apiVIPs: [10.0.0.5]
    ingressVIPs: [10.0.0.6]
    failureDomains:
    - name: fd-a
      prismElement:
        uuid: 0005b0f1-8f43-a0f2-02b7-3cecef19aaaa
        endpoint:
          address: pe-a.example.com
          port: 9440
        name: pe-a
      subnetUUIDs: [aaaa8dc6-7659-453e-a688-e26020c68e43]
    - name: fd-b
      prismElement:
        uuid: 0005b0f1-8f43-a0f2-02b7-3cecef19bbbb
        endpoint:
          address: pe-b.example.com
          port: 9440
        name: pe-b
      subnetUUIDs: [bbbb8dc6-7659-453e-a688-e26020c68e43]
"#;

    pub(crate) fn nutanix_install_config() -> InstallConfig {
        InstallConfig::parse(NUTANIX_INSTALL_CONFIG.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_applies_defaults() -> Result<()> {
        let install_config = InstallConfig::parse(NUTANIX_INSTALL_CONFIG.as_bytes())?;

        assert_eq!(install_config.platform.name(), "nutanix");
        assert_eq!(install_config.publish, "External");
        assert_eq!(install_config.cluster_domain(), "test-cluster.example.com");

        let networking = install_config.networking.as_ref().unwrap();
        assert_eq!(networking.network_type, "OVNKubernetes");
        assert_eq!(networking.service_network[0].to_string(), "172.30.0.0/16");
        assert_eq!(networking.cluster_network[0].host_prefix, 23);

        let control_plane = install_config.control_plane.as_ref().unwrap();
        assert_eq!(control_plane.hyperthreading, "Enabled");
        assert_eq!(control_plane.architecture, "amd64");

        assert_eq!(install_config.compute[0].replicas, Some(5));

        Ok(())
    }

    #[test]
    fn test_platform_names() -> Result<()> {
        let install_config = InstallConfig::parse(
            br#"
apiVersion: v1
metadata: {name: c}
platform:
  aws: {region: us-east-1}
  none: {}
"#,
        )?;

        assert_eq!(install_config.platform.names(), vec!["aws".to_string(), "none".to_string()]);
        assert_eq!(install_config.platform.name(), "");
        assert_eq!(install_config.platform.known_name(), None);

        Ok(())
    }

    #[test]
    fn test_redacted() {
        let install_config = nutanix_install_config();
        let redacted = install_config.redacted();

        assert_eq!(redacted.pull_secret, "<redacted>");
        assert_eq!(redacted.platform.nutanix.as_ref().unwrap().prism_central.password, "<redacted>");
        assert_eq!(redacted.platform.nutanix.as_ref().unwrap().prism_central.username, "admin");
        assert_eq!(install_config.platform.nutanix.as_ref().unwrap().prism_central.password, "secret");
    }
}
