use crate::{
    asset::{AssetFile, Assets},
    capi,
    cluster_id::ClusterId,
    config::{Action, InstallerConfig},
    logging::RunSummary,
    manifests,
    metadata::{ClusterMetadata, METADATA_FILENAME},
    nutanix,
    prism::{self, PrismClient},
    tfvars::{self, TfVarsSources},
    types::{self, InstallConfig},
    validation,
};
use anyhow::{Context, Result};
use std::time::Instant;

use self::timing::{timed, RunTime, RunTimes};

pub(crate) mod timing;

pub(crate) async fn run(config: &InstallerConfig) -> Result<RunSummary> {
    let start = Instant::now();
    let mut run_times = RunTimes::default();

    let install_config = timed(&mut run_times.load, || InstallConfig::load(&config.dir)).context("loading install-config")?;

    timed(&mut run_times.validate, || {
        validation::validate_install_config(&install_config).into_result()
    })
    .context("invalid install-config")?;
    log::info!("install-config for cluster {:?} is valid", install_config.metadata.name);

    let assets = match config.action {
        Action::Validate => Assets::new(),
        Action::Manifests | Action::ClusterApi | Action::Tfvars | Action::All => {
            let cluster_id = ClusterId::load_or_generate(&config.dir, &install_config.metadata.name).context("determining cluster ID")?;
            log::info!("Generating {} assets for infra ID {}", config.action, cluster_id.infra_id);

            let assets = timed(&mut run_times.generate, || generate(config, &install_config, &cluster_id))
                .context(format!("generating {} assets", config.action))?;

            if config.dry_run {
                log::info!("Dry run, not writing {} assets to {}", assets.files.len(), config.dir);
            } else {
                timed(&mut run_times.write, || assets.write_to(&config.dir)).context("writing assets")?;
            }

            assets
        }
        Action::UploadImage => {
            let prism_start = Instant::now();
            upload_image(config, &install_config).await.context("uploading RHCOS image")?;
            run_times.prism = Some(RunTime::since_start(prism_start));
            Assets::new()
        }
        Action::WaitForTask => {
            let prism_start = Instant::now();
            wait_for_task(config, &install_config).await.context("waiting for prism central task")?;
            run_times.prism = Some(RunTime::since_start(prism_start));
            Assets::new()
        }
    };

    run_times.total = Some(RunTime::since_start(start));

    Ok(RunSummary {
        install_config: Some(install_config),
        assets: assets.filenames(),
        run_times,
    })
}

/// Generate everything `config.action` asks for in memory. Every generating action also records
/// `metadata.json` so that later runs against the same directory keep the infra ID.
fn generate(config: &InstallerConfig, install_config: &InstallConfig, cluster_id: &ClusterId) -> Result<Assets> {
    let generates = |action: Action| config.action == action || config.action == Action::All;

    let mut assets = Assets::new();

    // Cluster API and terraform both size the control plane from the machine manifests
    let machine_assets = nutanix::generate(install_config, cluster_id).context("generating machine manifests")?;
    let control_plane_configs = nutanix::control_plane_provider_configs(&machine_assets).context("reading control plane machines")?;

    if generates(Action::Manifests) {
        assets.extend(manifests::generate(install_config, cluster_id).context("generating cluster manifests")?);
        assets.extend(machine_assets);
    }

    if generates(Action::ClusterApi) {
        assets.extend(capi::generate(install_config, cluster_id, &control_plane_configs).context("generating cluster API manifests")?);
    }

    if generates(Action::Tfvars) {
        let bootstrap_ignition = match &config.bootstrap_ignition {
            Some(path) => Some(std::fs::read_to_string(&**path).context(format!("reading bootstrap ignition {}", path))?),
            None => None,
        };

        let sources = TfVarsSources {
            bootstrap_ignition: bootstrap_ignition.as_deref(),
            image_uri: config.rhcos_image_uri.as_deref(),
            bootstrap_image_path: config
                .dir
                .join(types::nutanix::bootstrap_image_name(&cluster_id.infra_id))
                .to_string_lossy()
                .into_owned(),
            control_plane_configs: &control_plane_configs,
        };

        assets.extend(tfvars::generate(install_config, cluster_id, &sources).context("generating terraform variables")?);
    }

    assets.push(AssetFile {
        filename: METADATA_FILENAME.to_string(),
        data: ClusterMetadata::new(install_config, cluster_id).to_json()?,
    });

    Ok(assets)
}

async fn upload_image(config: &InstallerConfig, install_config: &InstallConfig) -> Result<()> {
    let platform = install_config
        .platform
        .nutanix
        .as_ref()
        .context("uploading an image requires the nutanix platform")?;

    if !platform.preloaded_os_image_name.is_empty() {
        log::info!("Using preloaded image {:?}, nothing to upload", platform.preloaded_os_image_name);
        return Ok(());
    }

    let image_uri = if !platform.cluster_os_image.is_empty() {
        platform.cluster_os_image.as_str()
    } else {
        config
            .rhcos_image_uri
            .as_deref()
            .context("no RHCOS image URI, set platform.nutanix.clusterOSImage or rhcos_image_uri")?
    };

    let cluster_id = ClusterId::load_or_generate(&config.dir, &install_config.metadata.name).context("determining cluster ID")?;
    let image_name = types::nutanix::rhcos_image_name(platform, &cluster_id.infra_id);

    if config.dry_run {
        log::info!(
            "Dry run, not importing {} from {} onto {} prism elements",
            image_name,
            image_uri,
            platform.all_prism_elements().len()
        );
        return Ok(());
    }

    // The image is named after the infra ID, later runs must agree on it
    ClusterMetadata::new(install_config, &cluster_id)
        .write(&config.dir)
        .context("recording cluster metadata")?;

    let client = PrismClient::new(&platform.prism_central).context("creating prism central client")?;
    let created = prism::upload_rhcos_image(&client, platform, &image_name, image_uri, config.poll_interval(), config.poll_timeout()).await?;
    log::info!("Image {} is available, {} imports were needed", image_name, created);

    Ok(())
}

async fn wait_for_task(config: &InstallerConfig, install_config: &InstallConfig) -> Result<()> {
    let platform = install_config
        .platform
        .nutanix
        .as_ref()
        .context("waiting for a task requires the nutanix platform")?;
    let task_uuid = config.task_uuid.as_deref().context("no task UUID given")?;

    if config.dry_run {
        log::info!("Dry run, not waiting for task {}", task_uuid);
        return Ok(());
    }

    let client = PrismClient::new(&platform.prism_central).context("creating prism central client")?;
    prism::wait_for_task(&client, task_uuid, config.poll_interval(), config.poll_timeout()).await?;
    log::info!("Task {} succeeded", task_uuid);

    Ok(())
}
