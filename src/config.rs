use std::{env, str::FromStr};

use anyhow::{ensure, Context, Result};
use clap::Parser;
use log::LevelFilter;
use serde::Serialize;
use serde_json::Value;
use strum_macros::{Display, EnumString};

use self::cli::Cli;
pub(crate) use self::path::ConfigPath;

mod cli;
mod path;

pub(crate) const CONFIG_ENV_VAR: &str = "OPENSHIFT_INSTALL_CONFIG";
pub(crate) const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub(crate) const DEFAULT_POLL_TIMEOUT_SECS: u64 = 3600;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Display, EnumString, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub(crate) enum Action {
    /// Load and validate install-config.yaml
    Validate,
    /// Cluster manifests, machines and machine sets
    Manifests,
    /// Cluster API objects for the control plane
    ClusterApi,
    /// Terraform variables
    Tfvars,
    /// Everything above plus metadata.json
    All,
    /// Import the RHCOS image into every Prism Element the cluster uses
    UploadImage,
    /// Wait for a Prism Central task to finish
    WaitForTask,
}

/// All parsed CLI arguments, coalesced into a single struct for convenience
#[derive(Serialize, Debug)]
pub(crate) struct InstallerConfig {
    pub(crate) action: Action,
    pub(crate) dir: ConfigPath,
    #[serde(serialize_with = "serialize_display")]
    pub(crate) log_level: LevelFilter,
    pub(crate) dry_run: bool,
    pub(crate) threads: Option<usize>,
    pub(crate) rhcos_image_uri: Option<String>,
    pub(crate) bootstrap_ignition: Option<ConfigPath>,
    pub(crate) task_uuid: Option<String>,
    pub(crate) poll_interval_secs: u64,
    pub(crate) poll_timeout_secs: u64,
    pub(crate) summary_file: Option<ConfigPath>,

    pub(crate) config_file_raw: Option<String>,
    pub(crate) cli_raw: Option<String>,
}

fn serialize_display<T: std::fmt::Display, S: serde::Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

fn parse_log_level(level: &str) -> Result<LevelFilter> {
    LevelFilter::from_str(level)
        .ok()
        .context(format!("invalid log level {:?}, expected one of off, error, warn, info, debug, trace", level))
}

fn optional_string(value: &mut serde_json::Map<String, Value>, key: &str) -> Result<Option<String>> {
    Ok(match value.remove(key) {
        Some(value) => Some(value.as_str().context(format!("{} must be a string", key))?.to_string()),
        None => None,
    })
}

fn optional_u64(value: &mut serde_json::Map<String, Value>, key: &str) -> Result<Option<u64>> {
    Ok(match value.remove(key) {
        Some(value) => Some(value.as_u64().context(format!("{} must be a non-negative integer", key))?),
        None => None,
    })
}

impl InstallerConfig {
    pub(crate) fn parse_from_config_file(config_bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_yaml::from_slice(config_bytes)?;

        let mut value = value.as_object().context("config file must be a YAML object")?.clone();

        let action = match optional_string(&mut value, "action")? {
            Some(action) => Action::from_str(&action).context(format!("unknown action {:?}", action))?,
            None => Action::All,
        };

        let dir = ConfigPath::existing_dir("dir", &optional_string(&mut value, "dir")?.unwrap_or_else(|| ".".to_string()))?;

        let log_level = match optional_string(&mut value, "log_level")? {
            Some(level) => parse_log_level(&level)?,
            None => LevelFilter::Info,
        };

        let dry_run = value
            .remove("dry_run")
            .unwrap_or(Value::Bool(false))
            .as_bool()
            .context("dry_run must be a boolean")?;

        let threads = match optional_u64(&mut value, "threads")? {
            Some(threads) => Some(threads.try_into().context("threads must fit in a usize")?),
            None => None,
        };

        let rhcos_image_uri = optional_string(&mut value, "rhcos_image_uri")?;

        let bootstrap_ignition = match optional_string(&mut value, "bootstrap_ignition")? {
            Some(path) => Some(ConfigPath::existing_file("bootstrap_ignition", &path)?),
            None => None,
        };

        let task_uuid = optional_string(&mut value, "task_uuid")?;

        let poll_interval_secs = optional_u64(&mut value, "poll_interval_secs")?.unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        let poll_timeout_secs = optional_u64(&mut value, "poll_timeout_secs")?.unwrap_or(DEFAULT_POLL_TIMEOUT_SECS);

        let summary_file = match optional_string(&mut value, "summary_file")? {
            Some(path) => Some(ConfigPath::new(&path).context("summary_file")?),
            None => None,
        };

        ensure!(
            value.is_empty(),
            "unknown keys {:?} in config file",
            value.keys().map(|key| key.to_string()).collect::<Vec<String>>().join(", ")
        );

        let installer_config = Self {
            action,
            dir,
            log_level,
            dry_run,
            threads,
            rhcos_image_uri,
            bootstrap_ignition,
            task_uuid,
            poll_interval_secs,
            poll_timeout_secs,
            summary_file,

            cli_raw: None,
            config_file_raw: Some(String::from_utf8_lossy(config_bytes).to_string()),
        };

        installer_config.check()?;

        Ok(installer_config)
    }

    pub(crate) fn parse_from_cli(cli: Cli) -> Result<Self> {
        let installer_config = Self {
            action: cli.action,
            dir: ConfigPath::from(cli.dir),
            log_level: parse_log_level(&cli.log_level)?,
            dry_run: cli.dry_run,
            threads: cli.threads,
            rhcos_image_uri: cli.rhcos_image_uri,
            bootstrap_ignition: cli.bootstrap_ignition.map(ConfigPath::from),
            task_uuid: cli.task_uuid,
            poll_interval_secs: cli.poll_interval_secs,
            poll_timeout_secs: cli.poll_timeout_secs,
            summary_file: cli.summary_file.map(ConfigPath::from),

            config_file_raw: None,
            cli_raw: Some(serde_json::to_string(&env::args().collect::<Vec<String>>())?),
        };

        installer_config.check()?;

        Ok(installer_config)
    }

    fn check(&self) -> Result<()> {
        ensure!(
            self.action != Action::WaitForTask || self.task_uuid.is_some(),
            "task_uuid is required with action wait-for-task"
        );
        ensure!(self.poll_interval_secs > 0, "poll_interval_secs must be positive");
        ensure!(
            self.poll_timeout_secs >= self.poll_interval_secs,
            "poll_timeout_secs must not be shorter than poll_interval_secs"
        );
        ensure!(self.threads != Some(0), "threads must be positive");

        Ok(())
    }

    pub(crate) fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }

    pub(crate) fn poll_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_timeout_secs)
    }

    pub(crate) fn new() -> Result<InstallerConfig> {
        Ok(match std::env::var(CONFIG_ENV_VAR) {
            Ok(var) => {
                let num_args = std::env::args().len();

                ensure!(
                    num_args == 1,
                    "{CONFIG_ENV_VAR} is set, but there are {num_args} CLI arguments. {CONFIG_ENV_VAR} is meant to be used with no arguments."
                );

                InstallerConfig::parse_from_config_file(&std::fs::read(&var).context(format!("reading {} file {}", CONFIG_ENV_VAR, var))?)
                    .context(format!("parsing {} file {}", CONFIG_ENV_VAR, var))?
            }
            Err(_) => InstallerConfig::parse_from_cli(Cli::parse()).context("CLI parsing")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn config_file(dir: &std::path::Path, extra: &str) -> String {
        format!("dir: {}\n{}", dir.display(), extra)
    }

    #[test]
    fn test_parse_from_config_file_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;

        let config = InstallerConfig::parse_from_config_file(config_file(dir.path(), "").as_bytes())?;

        assert_eq!(config.action, Action::All);
        assert_eq!(config.log_level, LevelFilter::Info);
        assert!(!config.dry_run);
        assert_eq!(config.threads, None);
        assert_eq!(config.poll_interval(), std::time::Duration::from_secs(5));
        assert_eq!(config.poll_timeout(), std::time::Duration::from_secs(3600));
        assert!(config.config_file_raw.is_some());
        assert!(config.cli_raw.is_none());

        Ok(())
    }

    #[test]
    fn test_parse_from_config_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let ignition = dir.path().join("bootstrap.ign");
        std::fs::write(&ignition, "{}")?;

        let config = InstallerConfig::parse_from_config_file(
            config_file(
                dir.path(),
                &format!(
                    "action: upload-image\nlog_level: debug\ndry_run: true\nthreads: 2\nrhcos_image_uri: https://example.com/rhcos.qcow2\nbootstrap_ignition: {}\npoll_interval_secs: 1\npoll_timeout_secs: 10\n",
                    ignition.display()
                ),
            )
            .as_bytes(),
        )?;

        assert_eq!(config.action, Action::UploadImage);
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert!(config.dry_run);
        assert_eq!(config.threads, Some(2));
        assert_eq!(config.rhcos_image_uri.as_deref(), Some("https://example.com/rhcos.qcow2"));
        assert_eq!(config.bootstrap_ignition.as_deref(), Some(ignition.as_path()));
        assert_eq!(config.poll_timeout_secs, 10);

        Ok(())
    }

    #[test]
    fn test_parse_from_config_file_errors() -> Result<()> {
        let dir = tempfile::tempdir()?;

        let err = InstallerConfig::parse_from_config_file(config_file(dir.path(), "install_dir: /tmp\n").as_bytes())
            .unwrap_err();
        assert!(format!("{:#}", err).contains("unknown keys"), "{:#}", err);

        let err = InstallerConfig::parse_from_config_file(config_file(dir.path(), "action: destroy\n").as_bytes()).unwrap_err();
        assert!(format!("{:#}", err).contains("unknown action"), "{:#}", err);

        let err = InstallerConfig::parse_from_config_file(config_file(dir.path(), "action: wait-for-task\n").as_bytes()).unwrap_err();
        assert!(format!("{:#}", err).contains("task_uuid is required"), "{:#}", err);

        let err = InstallerConfig::parse_from_config_file(config_file(dir.path(), "dry_run: yes please\n").as_bytes()).unwrap_err();
        assert!(format!("{:#}", err).contains("dry_run must be a boolean"), "{:#}", err);

        let err = InstallerConfig::parse_from_config_file(config_file(dir.path(), "log_level: loud\n").as_bytes()).unwrap_err();
        assert!(format!("{:#}", err).contains("invalid log level"), "{:#}", err);

        let err = InstallerConfig::parse_from_config_file(b"dir: /nonexistent/asset/dir\n").unwrap_err();
        assert!(format!("{:#}", err).contains("dir must exist"), "{:#}", err);

        Ok(())
    }

    #[test]
    fn test_action_names() {
        assert_eq!(Action::ClusterApi.to_string(), "cluster-api");
        assert_eq!(Action::from_str("wait-for-task").unwrap(), Action::WaitForTask);
        assert_eq!(serde_json::to_value(Action::UploadImage).unwrap(), "upload-image");
    }

    #[test]
    #[serial]
    fn test_config_env_var_rejects_cli_arguments() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config_path = dir.path().join("config.yaml");
        std::fs::write(&config_path, config_file(dir.path(), ""))?;

        // The test harness itself is invoked with arguments
        env::set_var(CONFIG_ENV_VAR, &config_path);
        let result = InstallerConfig::new();
        env::remove_var(CONFIG_ENV_VAR);

        if env::args().len() > 1 {
            let err = result.err().context("expected an error")?;
            assert!(err.to_string().contains("meant to be used with no arguments"), "{}", err);
        }

        Ok(())
    }
}
