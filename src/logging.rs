use crate::{config::InstallerConfig, installer::timing::RunTimes, types::InstallConfig};
use anyhow::{bail, Context, Result};
use lazy_static::lazy_static;
use log::{LevelFilter, Metadata, Record};
use std::sync::{Arc, Mutex};

struct InstallerLogger;

static LOGGER: InstallerLogger = InstallerLogger;

pub fn init(level: LevelFilter) -> Result<()> {
    match log::set_logger(&LOGGER) {
        Ok(_) => log::set_max_level(level),
        Err(_) => bail!("Logger initalization failed"),
    };

    Ok(())
}

lazy_static! {
    pub(crate) static ref LOG_RECORDS: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
}

fn format_record(record: &Record) -> String {
    format!(
        "{} - {} - {}:{}: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        record.level(),
        record.file().unwrap_or("unknown"),
        record.line().unwrap_or(0),
        record.args()
    )
}

impl log::Log for InstallerLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let log_string = format_record(record);

            {
                let mut log_records = match LOG_RECORDS.lock() {
                    Ok(log_records) => log_records,
                    Err(err) => {
                        println!("Failed to lock log records: {}", err);
                        return;
                    }
                };
                log_records.push(log_string.clone());
            }

            println!("{}", log_string);
        }
    }

    fn flush(&self) {}
}

/// What a run did, for `--summary-file`
#[derive(serde::Serialize, Debug)]
pub(crate) struct RunSummary {
    pub(crate) install_config: Option<InstallConfig>,
    pub(crate) assets: Vec<String>,
    pub(crate) run_times: RunTimes,
}

#[derive(serde::Serialize)]
struct Summary<'a> {
    installer_config: &'a InstallerConfig,
    install_config: Option<InstallConfig>,
    assets: Vec<String>,
    error: Option<String>,
    logs: Vec<String>,
    run_times: Option<RunTimes>,
}

pub(crate) fn generate_summary(installer_config: &InstallerConfig, run_result: &Result<RunSummary>) -> Result<()> {
    let Some(summary_file) = installer_config.summary_file.clone() else {
        return Ok(());
    };

    let logs = match LOG_RECORDS.lock() {
        Ok(logs) => logs.clone(),
        Err(err) => {
            vec![format!("Failed to lock log records: {}", err)]
        }
    };

    let summary = match run_result {
        Ok(run_summary) => Summary {
            installer_config,
            install_config: run_summary.install_config.as_ref().map(InstallConfig::redacted),
            assets: run_summary.assets.clone(),
            error: None,
            logs,
            run_times: Some(run_summary.run_times.clone()),
        },
        Err(err) => Summary {
            installer_config,
            install_config: None,
            assets: vec![],
            error: Some(format!("{:#}", err)),
            logs,
            run_times: None,
        },
    };

    let summary_file = summary_file.0.create().context("opening summary file for writing")?;
    serde_yaml::to_writer(summary_file, &summary).context("serializing summary into summary file")?;

    Ok(())
}
