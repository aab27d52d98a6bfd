//! HTTP client for the Photon Controller API.

use super::types::ApiErrorDetail;
use super::{
    CloudClient, CloudError, DiskCreateSpec, ImageUpload, PersistentDisk, PortFuture, Task,
    TaskState, Vm, VmCreateSpec, VmMetadata,
};
use crate::config::PhotonConfig;
use reqwest::multipart::{Form, Part};
use reqwest::{Client as HttpClient, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

const MAX_CONSECUTIVE_POLL_FAILURES: u32 = 3;
const USER_AGENT: &str = concat!("photon-cpi/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
enum Credentials {
    Anonymous,
    Bearer(String),
    Basic { username: String, password: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DiskOperation<'a> {
    disk_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct DiskPage {
    #[serde(default)]
    items: Vec<PersistentDisk>,
    #[serde(rename = "nextPageLink", default)]
    next_page_link: Option<String>,
}

pub struct PhotonClient {
    http: HttpClient,
    endpoint: Url,
    credentials: Credentials,
    poll_interval: Duration,
    task_timeout: Duration,
}

impl PhotonClient {
    /// # Errors
    /// Returns `CloudError::Transport` when the target is not a valid URL or
    /// the HTTP client cannot be built.
    pub fn new(config: &PhotonConfig) -> Result<Self, CloudError> {
        let mut endpoint = Url::parse(&config.target)
            .map_err(|e| CloudError::Transport(format!("invalid target '{}': {e}", config.target)))?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        let http = HttpClient::builder()
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(config.ignore_certificate)
            .build()
            .map_err(transport)?;

        let credentials = match (&config.token, &config.username, &config.password) {
            (Some(token), _, _) if !token.is_empty() => Credentials::Bearer(token.clone()),
            (_, Some(username), Some(password)) if !username.is_empty() => Credentials::Basic {
                username: username.clone(),
                password: password.clone(),
            },
            _ => Credentials::Anonymous,
        };

        Ok(Self {
            http,
            endpoint,
            credentials,
            poll_interval: config.task_poll_interval(),
            task_timeout: config.task_timeout(),
        })
    }

    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn url(&self, path: &str) -> Result<Url, CloudError> {
        self.endpoint
            .join(path.trim_start_matches('/'))
            .map_err(|e| CloudError::Transport(format!("invalid request path '{path}': {e}")))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Credentials::Anonymous => request,
            Credentials::Bearer(token) => request.bearer_auth(token),
            Credentials::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, CloudError> {
        let response = self.authorize(request).send().await.map_err(transport)?;
        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        if !status.is_success() {
            let detail: ApiErrorDetail = serde_json::from_str(&body).unwrap_or_else(|_| ApiErrorDetail {
                code: status.canonical_reason().unwrap_or("Unknown").to_string(),
                message: body.clone(),
            });
            return Err(CloudError::Api {
                status: status.as_u16(),
                code: detail.code,
                message: detail.message,
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| CloudError::Transport(format!("unexpected response body: {e}")))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, CloudError> {
        let url = self.url(path)?;
        self.send_json(self.http.get(url)).await
    }

    async fn submit(&self, request: RequestBuilder) -> Result<Task, CloudError> {
        let task: Task = self.send_json(request).await?;
        debug!(task_id = %task.id, operation = %task.operation, "submitted task");
        self.wait_for_task(task).await
    }

    async fn post_task<B: Serialize + Sync>(&self, path: &str, body: Option<&B>) -> Result<Task, CloudError> {
        let url = self.url(path)?;
        let request = match body {
            Some(body) => self.http.post(url).json(body),
            None => self.http.post(url),
        };
        self.submit(request).await
    }

    async fn delete_task(&self, path: &str) -> Result<Task, CloudError> {
        let url = self.url(path)?;
        self.submit(self.http.delete(url)).await
    }

    async fn wait_for_task(&self, task: Task) -> Result<Task, CloudError> {
        let started = Instant::now();
        let mut current = task;
        let mut poll_failures = 0_u32;

        loop {
            match current.state {
                TaskState::Completed => return Ok(current),
                TaskState::Error => {
                    return Err(CloudError::Task {
                        message: current.error_summary(),
                        task_id: current.id,
                        operation: current.operation,
                    })
                }
                TaskState::Queued | TaskState::Started => {}
            }

            if started.elapsed() >= self.task_timeout {
                return Err(CloudError::TaskTimeout {
                    task_id: current.id,
                    waited_secs: self.task_timeout.as_secs(),
                });
            }

            tokio::time::sleep(self.poll_interval).await;

            match self.get::<Task>(&format!("tasks/{}", current.id)).await {
                Ok(polled) => {
                    current = polled;
                    poll_failures = 0;
                }
                Err(CloudError::Transport(message)) if poll_failures < MAX_CONSECUTIVE_POLL_FAILURES => {
                    poll_failures += 1;
                    warn!(task_id = %current.id, attempt = poll_failures, error = %message, "task poll failed, retrying");
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn list_disk_pages(&self, project_id: &str) -> Result<Vec<PersistentDisk>, CloudError> {
        let mut disks = Vec::new();
        let mut page: DiskPage = self.get(&format!("projects/{project_id}/disks")).await?;
        loop {
            disks.append(&mut page.items);
            match page.next_page_link.take() {
                Some(link) if !link.is_empty() => page = self.get(&link).await?,
                _ => return Ok(disks),
            }
        }
    }

    async fn upload_iso(&self, vm_id: &str, iso_path: &Path) -> Result<Task, CloudError> {
        let bytes = tokio::fs::read(iso_path)
            .await
            .map_err(|e| CloudError::LocalFile(format!("{}: {e}", iso_path.display())))?;
        let file_name = iso_path
            .file_name()
            .map_or_else(|| "env.iso".to_string(), |name| name.to_string_lossy().to_string());
        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name));
        let url = self.url(&format!("vms/{vm_id}/attach_iso"))?;
        self.submit(self.http.post(url).multipart(form)).await
    }

    async fn upload_image(&self, upload: ImageUpload) -> Result<Task, CloudError> {
        let part = Part::stream(reqwest::Body::from(upload.file)).file_name(upload.name);
        let form = Form::new().part("file", part);
        let url = self.url("images")?;
        self.submit(self.http.post(url).multipart(form)).await
    }
}

fn transport(error: reqwest::Error) -> CloudError {
    CloudError::Transport(error.to_string())
}

impl CloudClient for PhotonClient {
    fn create_vm<'a>(&'a self, project_id: &'a str, spec: &'a VmCreateSpec) -> PortFuture<'a, Task> {
        Box::pin(async move {
            self.post_task(&format!("projects/{project_id}/vms"), Some(spec))
                .await
        })
    }

    fn get_vm<'a>(&'a self, vm_id: &'a str) -> PortFuture<'a, Vm> {
        Box::pin(async move { self.get(&format!("vms/{vm_id}")).await })
    }

    fn delete_vm<'a>(&'a self, vm_id: &'a str) -> PortFuture<'a, Task> {
        Box::pin(async move { self.delete_task(&format!("vms/{vm_id}")).await })
    }

    fn start_vm<'a>(&'a self, vm_id: &'a str) -> PortFuture<'a, Task> {
        Box::pin(async move { self.post_task::<()>(&format!("vms/{vm_id}/start"), None).await })
    }

    fn stop_vm<'a>(&'a self, vm_id: &'a str) -> PortFuture<'a, Task> {
        Box::pin(async move { self.post_task::<()>(&format!("vms/{vm_id}/stop"), None).await })
    }

    fn restart_vm<'a>(&'a self, vm_id: &'a str) -> PortFuture<'a, Task> {
        Box::pin(async move { self.post_task::<()>(&format!("vms/{vm_id}/restart"), None).await })
    }

    fn attach_disk<'a>(&'a self, vm_id: &'a str, disk_id: &'a str) -> PortFuture<'a, Task> {
        Box::pin(async move {
            self.post_task(
                &format!("vms/{vm_id}/attach_disk"),
                Some(&DiskOperation { disk_id }),
            )
            .await
        })
    }

    fn detach_disk<'a>(&'a self, vm_id: &'a str, disk_id: &'a str) -> PortFuture<'a, Task> {
        Box::pin(async move {
            self.post_task(
                &format!("vms/{vm_id}/detach_disk"),
                Some(&DiskOperation { disk_id }),
            )
            .await
        })
    }

    fn attach_iso<'a>(&'a self, vm_id: &'a str, iso_path: &'a Path) -> PortFuture<'a, Task> {
        Box::pin(async move { self.upload_iso(vm_id, iso_path).await })
    }

    fn detach_iso<'a>(&'a self, vm_id: &'a str) -> PortFuture<'a, Task> {
        Box::pin(async move { self.post_task::<()>(&format!("vms/{vm_id}/detach_iso"), None).await })
    }

    fn set_metadata<'a>(&'a self, vm_id: &'a str, metadata: &'a VmMetadata) -> PortFuture<'a, Task> {
        Box::pin(async move {
            self.post_task(&format!("vms/{vm_id}/set_metadata"), Some(metadata))
                .await
        })
    }

    fn create_disk<'a>(&'a self, project_id: &'a str, spec: &'a DiskCreateSpec) -> PortFuture<'a, Task> {
        Box::pin(async move {
            self.post_task(&format!("projects/{project_id}/disks"), Some(spec))
                .await
        })
    }

    fn get_disk<'a>(&'a self, disk_id: &'a str) -> PortFuture<'a, PersistentDisk> {
        Box::pin(async move { self.get(&format!("disks/{disk_id}")).await })
    }

    fn delete_disk<'a>(&'a self, disk_id: &'a str) -> PortFuture<'a, Task> {
        Box::pin(async move { self.delete_task(&format!("disks/{disk_id}")).await })
    }

    fn list_disks<'a>(&'a self, project_id: &'a str) -> PortFuture<'a, Vec<PersistentDisk>> {
        Box::pin(async move { self.list_disk_pages(project_id).await })
    }

    fn create_image(&self, upload: ImageUpload) -> PortFuture<'_, Task> {
        Box::pin(async move { self.upload_image(upload).await })
    }

    fn delete_image<'a>(&'a self, image_id: &'a str) -> PortFuture<'a, Task> {
        Box::pin(async move { self.delete_task(&format!("images/{image_id}")).await })
    }
}
