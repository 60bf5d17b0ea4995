use crate::metadata::ClusterMetadata;
use anyhow::{Context, Result};
use lazy_regex::regex;
use rand::Rng;
use std::path::Path;

/// Length the infra ID is capped at, so that resource names derived from it stay within cloud
/// provider name limits
pub(crate) const INFRA_ID_MAX_LENGTH: usize = 27;

const RANDOM_SUFFIX_LENGTH: usize = 5;

/// Same alphabet Kubernetes uses for generated name suffixes, no vowels and no easily confused
/// characters
const RANDOM_SUFFIX_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub(crate) struct ClusterId {
    /// Globally unique cluster UUID
    pub(crate) uuid: String,
    /// Short, mostly human readable ID used to name and tag infrastructure
    pub(crate) infra_id: String,
}

impl ClusterId {
    pub(crate) fn generate(cluster_name: &str) -> Self {
        Self {
            uuid: uuid::Uuid::new_v4().to_string(),
            infra_id: generate_infra_id(cluster_name, INFRA_ID_MAX_LENGTH),
        }
    }

    /// Reuse the IDs recorded by a previous run in the same asset directory, if any, so that
    /// regenerating assets does not orphan infrastructure named after the old infra ID
    pub(crate) fn load_or_generate(dir: &Path, cluster_name: &str) -> Result<Self> {
        match ClusterMetadata::load(dir).context("loading previous cluster metadata")? {
            Some(metadata) if metadata.cluster_name == cluster_name => {
                log::info!("Reusing infra ID {} from existing metadata", metadata.infra_id);
                Ok(Self {
                    uuid: metadata.cluster_id,
                    infra_id: metadata.infra_id,
                })
            }
            Some(metadata) => {
                log::warn!(
                    "Ignoring existing metadata for cluster {:?}, install-config names cluster {:?}",
                    metadata.cluster_name,
                    cluster_name
                );
                Ok(Self::generate(cluster_name))
            }
            None => Ok(Self::generate(cluster_name)),
        }
    }
}

/// Derive an infra ID from `base`: characters outside `[A-Za-z0-9-]` become `-`, runs of `-`
/// collapse into one, the result is truncated so that it fits `max_len` together with a `-` and a random suffix
pub(crate) fn generate_infra_id(base: &str, max_len: usize) -> String {
    let max_base_len = max_len.saturating_sub(RANDOM_SUFFIX_LENGTH + 1);

    let base = regex!("[^A-Za-z0-9-]").replace_all(base, "-");
    let mut base = regex!("-{2,}").replace_all(&base, "-").into_owned();
    base.truncate(max_base_len);
    let base = base.trim_end_matches('-');

    format!("{}-{}", base, random_suffix(RANDOM_SUFFIX_LENGTH))
}

fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| RANDOM_SUFFIX_ALPHABET[rng.gen_range(0..RANDOM_SUFFIX_ALPHABET.len())] as char)
        .collect()
}
