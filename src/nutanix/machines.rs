use super::{machine_labels, provider_spec, MACHINE_API_VERSION, PROVIDER_CONFIG_API_VERSION};
use crate::{
    asset::Manifest,
    cluster_id::ClusterId,
    manifests::MACHINE_API_NAMESPACE,
    types::{defaults::effective_nutanix_machine_pool, nutanix, MachinePool},
};
use anyhow::{Context, Result};
use serde_json::{json, Value};

const CONTROL_PLANE_NODE_ROLE_LABELS: [&str; 2] = ["node-role.kubernetes.io/control-plane", "node-role.kubernetes.io/master"];

/// One Machine per replica of `pool`, spread round-robin across the pool's failure domains, plus
/// the ControlPlaneMachineSet managing them when there is more than one replica
pub(crate) fn machines(
    cluster_id: &ClusterId,
    platform: &nutanix::Platform,
    pool: &MachinePool,
    image_name: &str,
    role: &str,
    user_data_secret: &str,
) -> Result<(Vec<Manifest>, Option<Manifest>)> {
    let mpool = effective_nutanix_machine_pool(platform, pool, role);
    mpool.validate_config(platform, role)?;
    let failure_domains = platform.failure_domains_for(&mpool)?;

    let replicas = pool.replicas.unwrap_or_default().max(0) as usize;
    let labels = machine_labels(&cluster_id.infra_id, role);

    let machines = (0..replicas)
        .map(|i| {
            let failure_domain = (!failure_domains.is_empty()).then(|| failure_domains[i % failure_domains.len()]);
            let spec = provider_spec(platform, &mpool, image_name, user_data_secret, failure_domain)
                .context(format!("creating provider spec for {} machine {}", role, i))?;

            Ok(
                Manifest::namespaced(
                    MACHINE_API_VERSION,
                    "Machine",
                    format!("{}-{}-{}", cluster_id.infra_id, role, i),
                    MACHINE_API_NAMESPACE,
                )
                .with_labels(labels.clone())
                .with_spec(json!({
                    "metadata": {},
                    "providerSpec": {"value": serde_json::to_value(&spec).context("encoding provider spec")?},
                })),
            )
        })
        .collect::<Result<Vec<_>>>()?;

    // Single node control planes are not managed by a ControlPlaneMachineSet
    if replicas <= 1 {
        return Ok((machines, None));
    }

    // The machine set template carries no placement of its own when failure domains are in use,
    // the operator fills cluster and subnets in from the referenced domain
    let mut template_spec = provider_spec(platform, &mpool, image_name, user_data_secret, None)
        .context(format!("creating provider spec for {} machine set", role))?;
    let failure_domains_section = if failure_domains.is_empty() {
        None
    } else {
        template_spec.cluster = nutanix::ResourceIdentifier::default();
        template_spec.subnets = vec![];
        Some(json!({
            "platform": "Nutanix",
            "nutanix": failure_domains
                .iter()
                .map(|failure_domain| json!({"name": failure_domain.name}))
                .collect::<Vec<_>>(),
        }))
    };

    let mut template = json!({
        "metadata": {"labels": labels},
        "spec": {
            "providerSpec": {"value": serde_json::to_value(&template_spec).context("encoding provider spec")?},
        },
    });
    if let Some(section) = failure_domains_section {
        template["failureDomains"] = section;
    }

    let control_plane_machine_set = Manifest::namespaced(
        PROVIDER_CONFIG_API_VERSION,
        "ControlPlaneMachineSet",
        "cluster",
        MACHINE_API_NAMESPACE,
    )
    .with_labels(labels.clone())
    .with_spec(json!({
        "replicas": replicas,
        "state": "Active",
        "strategy": {"type": "RollingUpdate"},
        "selector": {"matchLabels": labels},
        "template": {
            "machineType": "machines_v1beta1_machine_openshift_io",
            "machines_v1beta1_machine_openshift_io": template,
        },
    }));

    Ok((machines, Some(control_plane_machine_set)))
}

/// Give control plane machines the node role labels their nodes should register with
pub(crate) fn config_masters(machines: &mut [Manifest]) {
    for machine in machines.iter_mut() {
        let Some(spec) = machine.spec_mut() else {
            continue;
        };

        let metadata = &mut spec["metadata"];
        if !metadata.is_object() {
            *metadata = json!({});
        }
        let labels = &mut metadata["labels"];
        if !labels.is_object() {
            *labels = json!({});
        }
        for label in CONTROL_PLANE_NODE_ROLE_LABELS {
            labels[label] = Value::String(String::new());
        }
    }
}
