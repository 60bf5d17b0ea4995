use anyhow::{Context, Result};
use config::InstallerConfig;

mod asset;
mod capi;
mod cluster_id;
mod config;
mod field;
mod file_utils;
mod installer;
mod ipnet;
mod logging;
mod manifests;
mod metadata;
mod nutanix;
mod prism;
mod runtime;
mod tfvars;
mod types;
mod validate;
mod validation;

fn main() -> Result<()> {
    let installer_config = InstallerConfig::new().context("parsing config")?;

    logging::init(installer_config.log_level).context("initializing logging")?;

    let runtime = runtime::prepare_tokio_runtime(installer_config.threads).context("preparing tokio runtime")?;

    let run_result = runtime.block_on(installer::run(&installer_config));

    if let Err(err) = &run_result {
        log::error!("{} failed: {:#}", installer_config.action, err);
    }

    logging::generate_summary(&installer_config, &run_result).context("generating summary")?;

    run_result.map(|summary| {
        log::info!("{} finished, {} assets", installer_config.action, summary.assets.len());
    })
}
