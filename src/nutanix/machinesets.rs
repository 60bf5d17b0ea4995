use super::{machine_labels, provider_spec, CLUSTER_LABEL, MACHINESET_LABEL, MACHINE_API_VERSION};
use crate::{
    asset::Manifest,
    cluster_id::ClusterId,
    manifests::MACHINE_API_NAMESPACE,
    types::{defaults::effective_nutanix_machine_pool, nutanix, MachinePool},
};
use anyhow::{Context, Result};
use serde_json::json;

/// Split `total` replicas across `domains` buckets, earlier buckets taking the remainder one
/// replica each. Zero domains still yields a single bucket.
pub(crate) fn distribute_replicas(total: i64, domains: usize) -> Vec<i64> {
    if domains == 0 {
        return vec![total];
    }

    let domains_i64 = domains as i64;
    let (base, remainder) = (total / domains_i64, total % domains_i64);
    (0..domains_i64).map(|i| if i < remainder { base + 1 } else { base }).collect()
}

/// One MachineSet per failure domain of `pool` (a single one when it has none). An unset replica
/// count is treated as zero.
pub(crate) fn machine_sets(
    cluster_id: &ClusterId,
    platform: &nutanix::Platform,
    pool: &MachinePool,
    image_name: &str,
    role: &str,
    user_data_secret: &str,
) -> Result<Vec<Manifest>> {
    let mpool = effective_nutanix_machine_pool(platform, pool, role);
    mpool.validate_config(platform, role)?;
    let failure_domains = platform.failure_domains_for(&mpool)?;

    let total = pool.replicas.unwrap_or_default().max(0);
    let distribution = distribute_replicas(total, failure_domains.len());

    distribution
        .into_iter()
        .enumerate()
        .map(|(i, replicas)| {
            let failure_domain = failure_domains.get(i).copied();
            let name = match failure_domain {
                Some(_) => format!("{}-{}-{}", cluster_id.infra_id, pool.name, i),
                None => format!("{}-{}", cluster_id.infra_id, pool.name),
            };

            let spec = provider_spec(platform, &mpool, image_name, user_data_secret, failure_domain)
                .context(format!("creating provider spec for machineset {}", name))?;

            let mut template_labels = machine_labels(&cluster_id.infra_id, role);
            template_labels.insert(MACHINESET_LABEL.to_string(), name.clone());

            Ok(Manifest::namespaced(MACHINE_API_VERSION, "MachineSet", &name, MACHINE_API_NAMESPACE)
                .with_label(CLUSTER_LABEL, &cluster_id.infra_id)
                .with_spec(json!({
                    "replicas": replicas,
                    "selector": {
                        "matchLabels": {
                            CLUSTER_LABEL: cluster_id.infra_id,
                            MACHINESET_LABEL: name,
                        },
                    },
                    "template": {
                        "metadata": {"labels": template_labels},
                        "spec": {
                            "providerSpec": {"value": serde_json::to_value(&spec).context("encoding provider spec")?},
                        },
                    },
                })))
        })
        .collect()
}
