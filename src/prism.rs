//! Minimal Nutanix Prism Central v3 client: task polling and RHCOS image upload.

use crate::types::nutanix;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use strum_macros::{Display, EnumString};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const V3_API_VERSION: &str = "3.1.0";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum TaskStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Aborted,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Task {
    #[serde(default)]
    pub(crate) uuid: String,
    #[serde(default)]
    pub(crate) status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) error_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) progress_message: Option<String>,
}

#[async_trait]
pub(crate) trait PrismApi: Send + Sync {
    async fn get_task(&self, uuid: &str) -> Result<Task>;

    /// UUID of the image called `name` that is placed on the given Prism Element, if any
    async fn find_image(&self, name: &str, prism_element_uuid: &str) -> Result<Option<String>>;

    /// Start importing an image from `source_uri` onto a Prism Element, returning the task UUID
    async fn create_image(&self, name: &str, source_uri: &str, prism_element_uuid: &str) -> Result<String>;
}

pub(crate) struct PrismClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl PrismClient {
    pub(crate) fn new(prism_central: &nutanix::PrismCentral) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .context("building prism central http client")?,
            base_url: format!(
                "https://{}:{}/api/nutanix/v3",
                prism_central.endpoint.address, prism_central.endpoint.port
            ),
            username: prism_central.username.clone(),
            password: prism_central.password.clone(),
        })
    }

    async fn request(&self, method: reqwest::Method, path: &str, body: Option<serde_json::Value>) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .basic_auth(&self.username, Some(&self.password));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.context(format!("{} {}", method, url))?;
        let status = response.status();
        if !(status.is_success() || status == StatusCode::ACCEPTED) {
            let body = response.text().await.unwrap_or_default();
            bail!("{} {} returned {}: {}", method, url, status, body);
        }

        response.json().await.context(format!("decoding response of {} {}", method, url))
    }
}

#[async_trait]
impl PrismApi for PrismClient {
    async fn get_task(&self, uuid: &str) -> Result<Task> {
        let value = self.request(reqwest::Method::GET, &format!("/tasks/{}", uuid), None).await?;
        serde_json::from_value(value).context("decoding task")
    }

    async fn find_image(&self, name: &str, prism_element_uuid: &str) -> Result<Option<String>> {
        let value = self
            .request(
                reqwest::Method::POST,
                "/images/list",
                Some(json!({"kind": "image", "filter": format!("name=={}", name)})),
            )
            .await?;

        let entities = value["entities"].as_array().cloned().unwrap_or_default();
        Ok(entities.iter().find_map(|entity| {
            let placed = entity["status"]["resources"]["current_cluster_reference_list"]
                .as_array()
                .is_some_and(|clusters| clusters.iter().any(|cluster| cluster["uuid"] == prism_element_uuid));
            let named = entity["spec"]["name"] == name || entity["status"]["name"] == name;
            (placed && named).then(|| entity["metadata"]["uuid"].as_str().map(str::to_string)).flatten()
        }))
    }

    async fn create_image(&self, name: &str, source_uri: &str, prism_element_uuid: &str) -> Result<String> {
        let value = self
            .request(
                reqwest::Method::POST,
                "/images",
                Some(json!({
                    "api_version": V3_API_VERSION,
                    "metadata": {"kind": "image"},
                    "spec": {
                        "name": name,
                        "resources": {
                            "image_type": "DISK_IMAGE",
                            "source_uri": source_uri,
                            "initial_placement_ref_list": [{"kind": "cluster", "uuid": prism_element_uuid}],
                        },
                    },
                })),
            )
            .await?;

        value["status"]["execution_context"]["task_uuid"]
            .as_str()
            .map(str::to_string)
            .context("image creation response carries no task UUID")
    }
}

async fn poll_task(api: &dyn PrismApi, uuid: &str, interval: Duration) -> Result<()> {
    loop {
        let task = api.get_task(uuid).await.context(format!("getting task {}", uuid))?;

        match task.status.parse::<TaskStatus>() {
            Ok(TaskStatus::Queued | TaskStatus::Running) => {
                log::debug!(
                    "Task {} is {}: {}",
                    uuid,
                    task.status,
                    task.progress_message.as_deref().unwrap_or_default()
                );
                tokio::time::sleep(interval).await;
            }
            Ok(TaskStatus::Succeeded) => return Ok(()),
            Ok(status @ (TaskStatus::Failed | TaskStatus::Aborted)) => bail!(
                "task {} {}: {}",
                uuid,
                status,
                task.error_detail.as_deref().unwrap_or("no error detail")
            ),
            Err(_) => bail!("unexpected task status: {:?}", task.status),
        }
    }
}

/// Poll a task every `interval` until it finishes or `timeout` elapses
pub(crate) async fn wait_for_task(api: &dyn PrismApi, uuid: &str, interval: Duration, timeout: Duration) -> Result<()> {
    match tokio::time::timeout(timeout, poll_task(api, uuid, interval)).await {
        Ok(result) => result,
        Err(_) => bail!("timeout while waiting for task UUID: {}", uuid),
    }
}

pub(crate) async fn wait_for_tasks(api: &dyn PrismApi, uuids: &[String], interval: Duration, timeout: Duration) -> Result<()> {
    join_all(uuids.iter().map(|uuid| wait_for_task(api, uuid, interval, timeout)))
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;
    Ok(())
}

/// Make sure the RHCOS image exists on every Prism Element the cluster uses, importing it from
/// `image_uri` where missing. Returns how many imports were started.
pub(crate) async fn upload_rhcos_image(
    api: &dyn PrismApi,
    platform: &nutanix::Platform,
    image_name: &str,
    image_uri: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<usize> {
    let mut task_uuids = vec![];

    for prism_element in platform.all_prism_elements() {
        if let Some(image_uuid) = api
            .find_image(image_name, &prism_element.uuid)
            .await
            .context(format!("looking up image {} on prism element {}", image_name, prism_element.uuid))?
        {
            log::info!(
                "Image {} already present on prism element {} as {}",
                image_name,
                prism_element.uuid,
                image_uuid
            );
            continue;
        }

        let task_uuid = api
            .create_image(image_name, image_uri, &prism_element.uuid)
            .await
            .context(format!("creating image {} on prism element {}", image_name, prism_element.uuid))?;
        log::info!(
            "Importing image {} onto prism element {}, task {}",
            image_name,
            prism_element.uuid,
            task_uuid
        );
        task_uuids.push(task_uuid);
    }

    wait_for_tasks(api, &task_uuids, interval, timeout)
        .await
        .context("waiting for image imports")?;

    Ok(task_uuids.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tests::nutanix_install_config;
    use std::{
        collections::{BTreeMap, BTreeSet, VecDeque},
        sync::Mutex,
    };

    const INTERVAL: Duration = Duration::from_millis(1);
    const TIMEOUT: Duration = Duration::from_secs(5);

    #[derive(Default)]
    struct MockPrism {
        /// Statuses each task reports on successive polls, the last one repeats
        task_statuses: Mutex<BTreeMap<String, VecDeque<Task>>>,
        /// (image name, prism element uuid) pairs that already exist
        images: BTreeSet<(String, String)>,
        created: Mutex<Vec<(String, String, String)>>,
    }

    impl MockPrism {
        fn with_task(self, uuid: &str, statuses: &[&str]) -> Self {
            self.task_statuses.lock().unwrap().insert(
                uuid.to_string(),
                statuses
                    .iter()
                    .map(|status| Task {
                        uuid: uuid.to_string(),
                        status: status.to_string(),
                        error_detail: (*status == "FAILED").then(|| "image source unreachable".to_string()),
                        progress_message: None,
                    })
                    .collect(),
            );
            self
        }
    }

    #[async_trait]
    impl PrismApi for MockPrism {
        async fn get_task(&self, uuid: &str) -> Result<Task> {
            let mut tasks = self.task_statuses.lock().unwrap();
            let statuses = tasks.get_mut(uuid).context("no such task")?;
            if statuses.len() > 1 {
                Ok(statuses.pop_front().unwrap())
            } else {
                statuses.front().cloned().context("no statuses")
            }
        }

        async fn find_image(&self, name: &str, prism_element_uuid: &str) -> Result<Option<String>> {
            Ok(self
                .images
                .contains(&(name.to_string(), prism_element_uuid.to_string()))
                .then(|| "existing-image-uuid".to_string()))
        }

        async fn create_image(&self, name: &str, source_uri: &str, prism_element_uuid: &str) -> Result<String> {
            let task_uuid = format!("task-{}", prism_element_uuid);
            self.created
                .lock()
                .unwrap()
                .push((name.to_string(), source_uri.to_string(), prism_element_uuid.to_string()));
            self.task_statuses.lock().unwrap().insert(
                task_uuid.clone(),
                VecDeque::from([
                    Task {
                        status: "QUEUED".to_string(),
                        ..Default::default()
                    },
                    Task {
                        status: "SUCCEEDED".to_string(),
                        ..Default::default()
                    },
                ]),
            );
            Ok(task_uuid)
        }
    }

    #[tokio::test]
    async fn test_wait_for_task_succeeds() -> Result<()> {
        let api = MockPrism::default().with_task("t1", &["QUEUED", "RUNNING", "RUNNING", "SUCCEEDED"]);
        wait_for_task(&api, "t1", INTERVAL, TIMEOUT).await
    }

    #[tokio::test]
    async fn test_wait_for_task_failed() {
        let api = MockPrism::default().with_task("t1", &["RUNNING", "FAILED"]);
        let err = wait_for_task(&api, "t1", INTERVAL, TIMEOUT).await.unwrap_err();
        assert_eq!(err.to_string(), "task t1 FAILED: image source unreachable");
    }

    #[tokio::test]
    async fn test_wait_for_task_aborted() {
        let api = MockPrism::default().with_task("t1", &["ABORTED"]);
        let err = wait_for_task(&api, "t1", INTERVAL, TIMEOUT).await.unwrap_err();
        assert_eq!(err.to_string(), "task t1 ABORTED: no error detail");
    }

    #[tokio::test]
    async fn test_wait_for_task_unexpected_status() {
        let api = MockPrism::default().with_task("t1", &["SUSPENDED"]);
        let err = wait_for_task(&api, "t1", INTERVAL, TIMEOUT).await.unwrap_err();
        assert!(err.to_string().starts_with("unexpected task status"));
    }

    #[tokio::test]
    async fn test_wait_for_task_timeout() {
        let api = MockPrism::default().with_task("t1", &["RUNNING"]);
        let err = wait_for_task(&api, "t1", INTERVAL, Duration::from_millis(30))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "timeout while waiting for task UUID: t1");
    }

    #[tokio::test]
    async fn test_wait_for_tasks() {
        let api = MockPrism::default()
            .with_task("t1", &["RUNNING", "SUCCEEDED"])
            .with_task("t2", &["QUEUED", "FAILED"]);

        assert!(wait_for_tasks(&api, &["t1".to_string()], INTERVAL, TIMEOUT).await.is_ok());
        assert!(wait_for_tasks(&api, &["t1".to_string(), "t2".to_string()], INTERVAL, TIMEOUT)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_upload_rhcos_image() -> Result<()> {
        let install_config = nutanix_install_config();
        let platform = install_config.platform.nutanix.as_ref().unwrap();

        let api = MockPrism {
            images: BTreeSet::from([(
                "test-cluster-x7k2p-rhcos".to_string(),
                "0005b0f1-8f43-a0f2-02b7-3cecef19aaaa".to_string(),
            )]),
            ..Default::default()
        };

        let started = upload_rhcos_image(
            &api,
            platform,
            "test-cluster-x7k2p-rhcos",
            "https://example.com/rhcos.qcow2",
            INTERVAL,
            TIMEOUT,
        )
        .await?;
        assert_eq!(started, 2);

        let created = api.created.lock().unwrap().clone();
        assert_eq!(
            created.iter().map(|(_, _, pe)| pe.as_str()).collect::<Vec<_>>(),
            vec!["0005b0f1-8f43-a0f2-02b7-3cecef193712", "0005b0f1-8f43-a0f2-02b7-3cecef19bbbb"]
        );
        assert!(created.iter().all(|(name, uri, _)| name == "test-cluster-x7k2p-rhcos" && uri == "https://example.com/rhcos.qcow2"));

        Ok(())
    }

    #[test]
    fn test_client_base_url() -> Result<()> {
        let install_config = nutanix_install_config();
        let client = PrismClient::new(&install_config.platform.nutanix.as_ref().unwrap().prism_central)?;
        assert_eq!(client.base_url, "https://pc.example.com:9440/api/nutanix/v3");
        Ok(())
    }
}
