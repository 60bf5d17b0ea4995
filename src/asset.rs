//! Generated files and the Kubernetes objects most of them hold.

use crate::file_utils::globvec;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, path::Path};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct AssetFile {
    /// Path relative to the asset directory
    pub(crate) filename: String,
    pub(crate) data: Vec<u8>,
}

impl AssetFile {
    pub(crate) fn yaml<T: Serialize>(filename: impl Into<String>, value: &T) -> Result<Self> {
        let filename = filename.into();
        let data = serde_yaml::to_string(value)
            .context(format!("serializing {} as yaml", filename))?
            .into_bytes();
        Ok(Self { filename, data })
    }

    pub(crate) fn json<T: Serialize>(filename: impl Into<String>, value: &T) -> Result<Self> {
        let filename = filename.into();
        let data = serde_json::to_vec_pretty(value).context(format!("serializing {} as json", filename))?;
        Ok(Self { filename, data })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ManifestMetadata {
    pub(crate) name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub(crate) labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub(crate) annotations: BTreeMap<String, String>,
}

/// An untyped Kubernetes object. Everything besides apiVersion, kind and metadata (spec, data,
/// status, type, ...) lives in `body`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Manifest {
    pub(crate) api_version: String,
    pub(crate) kind: String,
    pub(crate) metadata: ManifestMetadata,
    #[serde(flatten)]
    pub(crate) body: Map<String, Value>,
}

impl Manifest {
    pub(crate) fn new(api_version: impl Into<String>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            metadata: ManifestMetadata {
                name: name.into(),
                ..Default::default()
            },
            body: Map::new(),
        }
    }

    pub(crate) fn namespaced(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        let mut manifest = Self::new(api_version, kind, name);
        manifest.metadata.namespace = Some(namespace.into());
        manifest
    }

    pub(crate) fn with(mut self, key: &str, value: Value) -> Self {
        self.body.insert(key.to_string(), value);
        self
    }

    pub(crate) fn with_spec(self, spec: Value) -> Self {
        self.with("spec", spec)
    }

    pub(crate) fn with_data(self, data: Value) -> Self {
        self.with("data", data)
    }

    pub(crate) fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    pub(crate) fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.metadata.labels.extend(labels);
        self
    }

    pub(crate) fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.annotations.insert(key.into(), value.into());
        self
    }

    pub(crate) fn spec(&self) -> Option<&Value> {
        self.body.get("spec")
    }

    pub(crate) fn spec_mut(&mut self) -> Option<&mut Value> {
        self.body.get_mut("spec")
    }

    pub(crate) fn to_asset(&self, filename: impl Into<String>) -> Result<AssetFile> {
        AssetFile::yaml(filename, self)
    }
}

/// Output of one generator: the files it produced plus the glob patterns (relative to the asset
/// directory) of every file it owns, so leftovers from an earlier run can be cleared first
#[derive(Debug, Default)]
pub(crate) struct Assets {
    pub(crate) files: Vec<AssetFile>,
    pub(crate) owned_patterns: Vec<String>,
}

impl Assets {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn owning(patterns: &[&str]) -> Self {
        Self {
            files: vec![],
            owned_patterns: patterns.iter().map(|pattern| pattern.to_string()).collect(),
        }
    }

    pub(crate) fn push(&mut self, file: AssetFile) {
        self.files.push(file);
    }

    pub(crate) fn extend(&mut self, other: Assets) {
        self.files.extend(other.files);
        self.owned_patterns.extend(other.owned_patterns);
    }

    pub(crate) fn filenames(&self) -> Vec<String> {
        self.files.iter().map(|file| file.filename.clone()).collect()
    }

    pub(crate) fn get(&self, filename: &str) -> Option<&AssetFile> {
        self.files.iter().find(|file| file.filename == filename)
    }

    pub(crate) fn remove_stale(&self, dir: &Path) -> Result<()> {
        for pattern in &self.owned_patterns {
            for stale in globvec(dir, pattern)? {
                log::debug!("Removing stale asset {}", stale.display());
                std::fs::remove_file(&stale).context(format!("removing stale asset {}", stale.display()))?;
            }
        }

        Ok(())
    }

    pub(crate) fn write_to(&self, dir: &Path) -> Result<()> {
        self.remove_stale(dir).context("removing stale assets")?;

        for file in &self.files {
            let path = dir.join(&file.filename);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).context(format!("creating {}", parent.display()))?;
            }
            std::fs::write(&path, &file.data).context(format!("writing {}", path.display()))?;
            log::info!("Wrote {}", path.display());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_manifest_serialization() -> Result<()> {
        let manifest = Manifest::namespaced("v1", "ConfigMap", "cloud-provider-config", "openshift-config")
            .with_label("app", "installer")
            .with_data(json!({"config": "{}"}));

        let value: Value = serde_yaml::from_slice(&manifest.to_asset("cm.yaml")?.data)?;
        assert_eq!(
            value,
            json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {
                    "name": "cloud-provider-config",
                    "namespace": "openshift-config",
                    "labels": {"app": "installer"},
                },
                "data": {"config": "{}"},
            })
        );

        Ok(())
    }

    #[test]
    fn test_write_to_removes_stale_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir_all(dir.path().join("openshift"))?;
        std::fs::write(dir.path().join("openshift/99_openshift-cluster-api_worker-machineset-7.yaml"), "stale")?;
        std::fs::write(dir.path().join("openshift/unrelated.yaml"), "keep")?;

        let mut assets = Assets::owning(&["openshift/99_openshift-cluster-api_worker-machineset-*.yaml"]);
        assets.push(AssetFile {
            filename: "openshift/99_openshift-cluster-api_worker-machineset-0.yaml".to_string(),
            data: b"fresh".to_vec(),
        });
        assets.write_to(dir.path())?;

        assert!(!dir.path().join("openshift/99_openshift-cluster-api_worker-machineset-7.yaml").exists());
        assert!(dir.path().join("openshift/unrelated.yaml").exists());
        assert_eq!(
            std::fs::read(dir.path().join("openshift/99_openshift-cluster-api_worker-machineset-0.yaml"))?,
            b"fresh"
        );

        Ok(())
    }
}
