use crate::{cluster_id::ClusterId, types::InstallConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub(crate) const METADATA_FILENAME: &str = "metadata.json";

/// What the destroy side needs to find the cluster's infrastructure again. Credentials other
/// than the username are never recorded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ClusterMetadata {
    pub(crate) cluster_name: String,
    #[serde(rename = "clusterID")]
    pub(crate) cluster_id: String,
    #[serde(rename = "infraID")]
    pub(crate) infra_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) nutanix: Option<NutanixMetadata>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NutanixMetadata {
    pub(crate) prism_central: String,
    pub(crate) port: String,
    pub(crate) username: String,
}

impl ClusterMetadata {
    pub(crate) fn new(install_config: &InstallConfig, cluster_id: &ClusterId) -> Self {
        Self {
            cluster_name: install_config.metadata.name.clone(),
            cluster_id: cluster_id.uuid.clone(),
            infra_id: cluster_id.infra_id.clone(),
            nutanix: install_config.platform.nutanix.as_ref().map(|nutanix| NutanixMetadata {
                prism_central: nutanix.prism_central.endpoint.address.clone(),
                port: nutanix.prism_central.endpoint.port.to_string(),
                username: nutanix.prism_central.username.clone(),
            }),
        }
    }

    pub(crate) fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(METADATA_FILENAME);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = std::fs::read(&path).context(format!("reading {}", path.display()))?;
        Ok(Some(
            serde_json::from_slice(&bytes).context(format!("parsing {}", path.display()))?,
        ))
    }

    pub(crate) fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("serializing cluster metadata")
    }

    pub(crate) fn write(&self, dir: &Path) -> Result<()> {
        let path = dir.join(METADATA_FILENAME);
        std::fs::write(&path, self.to_json()?).context(format!("writing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tests::nutanix_install_config;

    #[test]
    fn test_metadata_omits_password() -> Result<()> {
        let cluster_id = ClusterId {
            uuid: "5c0f2a0e-4f5c-4a4c-9d3c-9f58d0a6f1a1".to_string(),
            infra_id: "test-cluster-x7k2p".to_string(),
        };
        let metadata = ClusterMetadata::new(&nutanix_install_config(), &cluster_id);

        let json: serde_json::Value = serde_json::from_slice(&metadata.to_json()?)?;
        assert_eq!(
            json,
            serde_json::json!({
                "clusterName": "test-cluster",
                "clusterID": "5c0f2a0e-4f5c-4a4c-9d3c-9f58d0a6f1a1",
                "infraID": "test-cluster-x7k2p",
                "nutanix": {
                    "prismCentral": "pc.example.com",
                    "port": "9440",
                    "username": "admin",
                },
            })
        );

        Ok(())
    }

    #[test]
    fn test_load_missing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert_eq!(ClusterMetadata::load(dir.path())?, None);
        Ok(())
    }
}
