use super::Action;
use clap::Parser;
use clio::ClioPath;

/// Generate OpenShift installation assets for Nutanix
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Cli {
    /// What to generate or do
    #[clap(long, value_enum, default_value_t = Action::All)]
    pub(crate) action: Action,

    /// Asset directory. Must contain install-config.yaml, generated assets are written here
    #[clap(long, default_value = ".", value_parser = clap::value_parser!(ClioPath).exists().is_dir())]
    pub(crate) dir: ClioPath,

    /// Maximum log level (error, warn, info, debug or trace)
    #[clap(long, default_value = "info")]
    pub(crate) log_level: String,

    /// Generate everything in memory but don't write anything to the asset directory or create
    /// anything in Prism Central
    #[clap(long)]
    pub(crate) dry_run: bool,

    /// Number of tokio worker threads. Defaults to the number of CPUs
    #[clap(long)]
    pub(crate) threads: Option<usize>,

    /// URI of the RHCOS image, used when platform.nutanix.clusterOSImage is not set
    #[clap(long)]
    pub(crate) rhcos_image_uri: Option<String>,

    /// Bootstrap ignition config to embed in terraform.tfvars.json
    #[clap(long, value_parser = clap::value_parser!(ClioPath).exists().is_file())]
    pub(crate) bootstrap_ignition: Option<ClioPath>,

    /// UUID of the Prism Central task to wait for, with --action wait-for-task
    #[clap(long)]
    pub(crate) task_uuid: Option<String>,

    /// Seconds between Prism Central task polls
    #[clap(long, default_value_t = super::DEFAULT_POLL_INTERVAL_SECS)]
    pub(crate) poll_interval_secs: u64,

    /// Give up waiting for Prism Central tasks after this many seconds
    #[clap(long, default_value_t = super::DEFAULT_POLL_TIMEOUT_SECS)]
    pub(crate) poll_timeout_secs: u64,

    /// A file to write a summary of the run to, with secrets redacted
    #[clap(long)]
    pub(crate) summary_file: Option<ClioPath>,
}
