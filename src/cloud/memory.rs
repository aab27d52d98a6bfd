//! In-process control plane used by tests and local dry runs.
//!
//! Every call is journaled by operation name, and a fault can be armed
//! for the next call of a given operation.

use super::{
    AttachedDisk, CloudClient, CloudError, DiskCreateSpec, ImageUpload, PersistentDisk,
    PortFuture, Task, Vm, VmCreateSpec, VmMetadata,
};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct VmRecord {
    vm: Vm,
    iso: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
struct ImageRecord {
    name: String,
    content: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    vms: BTreeMap<String, VmRecord>,
    disks: BTreeMap<String, PersistentDisk>,
    images: BTreeMap<String, ImageRecord>,
    faults: HashMap<String, CloudError>,
    calls: Vec<String>,
}

impl State {
    fn begin(&mut self, operation: &str) -> Result<(), CloudError> {
        self.calls.push(operation.to_string());
        self.faults.remove(operation).map_or(Ok(()), Err)
    }

    fn vm_mut(&mut self, vm_id: &str) -> Result<&mut VmRecord, CloudError> {
        self.vms.get_mut(vm_id).ok_or_else(|| not_found("VmNotFound", vm_id))
    }

    fn disk_mut(&mut self, disk_id: &str) -> Result<&mut PersistentDisk, CloudError> {
        self.disks
            .get_mut(disk_id)
            .ok_or_else(|| not_found("DiskNotFound", disk_id))
    }
}

#[derive(Debug, Default)]
pub struct MemoryCloud {
    state: Mutex<State>,
    omit_attached_disk_ids: bool,
}

impl MemoryCloud {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Created VMs report their attached disks without ids.
    #[must_use]
    pub fn omitting_attached_disk_ids(mut self) -> Self {
        self.omit_attached_disk_ids = true;
        self
    }

    /// Fails the next call of `operation` with `error`.
    pub async fn inject_fault(&self, operation: &str, error: CloudError) {
        self.state
            .lock()
            .await
            .faults
            .insert(operation.to_string(), error);
    }

    /// Operation names in call order.
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    pub async fn insert_vm(&self, vm_id: &str) {
        let vm = Vm {
            id: vm_id.to_string(),
            name: "bosh-vm".to_string(),
            state: "STOPPED".to_string(),
            ..Vm::default()
        };
        self.state
            .lock()
            .await
            .vms
            .insert(vm_id.to_string(), VmRecord { vm, iso: None });
    }

    pub async fn insert_disk(&self, disk_id: &str, attached_to: &[&str]) {
        let disk = PersistentDisk {
            id: disk_id.to_string(),
            name: format!("disk-{disk_id}"),
            flavor: "core-100".to_string(),
            capacity_gb: 1,
            vms: attached_to.iter().map(ToString::to_string).collect(),
        };
        self.state
            .lock()
            .await
            .disks
            .insert(disk_id.to_string(), disk);
    }

    pub async fn insert_image(&self, image_id: &str, name: &str) {
        self.state
            .lock()
            .await
            .images
            .insert(
                image_id.to_string(),
                ImageRecord {
                    name: name.to_string(),
                    content: Vec::new(),
                },
            );
    }

    pub async fn vm(&self, vm_id: &str) -> Option<Vm> {
        self.state.lock().await.vms.get(vm_id).map(|r| r.vm.clone())
    }

    pub async fn disk(&self, disk_id: &str) -> Option<PersistentDisk> {
        self.state.lock().await.disks.get(disk_id).cloned()
    }

    pub async fn image_name(&self, image_id: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .images
            .get(image_id)
            .map(|image| image.name.clone())
    }

    /// Bytes received by the upload that created `image_id`.
    pub async fn image_content(&self, image_id: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .await
            .images
            .get(image_id)
            .map(|image| image.content.clone())
    }

    pub async fn attached_iso(&self, vm_id: &str) -> Option<PathBuf> {
        self.state
            .lock()
            .await
            .vms
            .get(vm_id)
            .and_then(|r| r.iso.clone())
    }

    pub async fn metadata(&self, vm_id: &str, key: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .vms
            .get(vm_id)
            .and_then(|r| r.vm.metadata.get(key).cloned())
    }

    /// Stores a raw metadata value, bypassing the journal.
    pub async fn put_metadata(&self, vm_id: &str, key: &str, value: &str) {
        if let Some(record) = self.state.lock().await.vms.get_mut(vm_id) {
            record.vm.metadata.insert(key.to_string(), value.to_string());
        }
    }

    async fn set_vm_state(&self, operation: &str, vm_id: &str, vm_state: &str) -> Result<Task, CloudError> {
        let mut state = self.state.lock().await;
        state.begin(operation)?;
        state.vm_mut(vm_id)?.vm.state = vm_state.to_string();
        Ok(completed(operation, vm_id))
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn completed(operation: &str, entity_id: &str) -> Task {
    Task::completed(new_id(), &operation.to_uppercase(), entity_id)
}

fn not_found(code: &str, id: &str) -> CloudError {
    CloudError::Api {
        status: CloudError::STATUS_NOT_FOUND,
        code: code.to_string(),
        message: format!("'{id}' not found"),
    }
}

impl CloudClient for MemoryCloud {
    fn create_vm<'a>(&'a self, _project_id: &'a str, spec: &'a VmCreateSpec) -> PortFuture<'a, Task> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.begin("create_vm")?;
            let attached_disks = spec
                .attached_disks
                .iter()
                .map(|disk| AttachedDisk {
                    id: if self.omit_attached_disk_ids {
                        String::new()
                    } else {
                        new_id()
                    },
                    ..disk.clone()
                })
                .collect();
            let vm = Vm {
                id: new_id(),
                name: spec.name.clone(),
                state: "STOPPED".to_string(),
                attached_disks,
                metadata: BTreeMap::new(),
            };
            let task = completed("create_vm", &vm.id);
            state.vms.insert(vm.id.clone(), VmRecord { vm, iso: None });
            Ok(task)
        })
    }

    fn get_vm<'a>(&'a self, vm_id: &'a str) -> PortFuture<'a, Vm> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.begin("get_vm")?;
            Ok(state.vm_mut(vm_id)?.vm.clone())
        })
    }

    fn delete_vm<'a>(&'a self, vm_id: &'a str) -> PortFuture<'a, Task> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.begin("delete_vm")?;
            state
                .vms
                .remove(vm_id)
                .ok_or_else(|| not_found("VmNotFound", vm_id))?;
            Ok(completed("delete_vm", vm_id))
        })
    }

    fn start_vm<'a>(&'a self, vm_id: &'a str) -> PortFuture<'a, Task> {
        Box::pin(self.set_vm_state("start_vm", vm_id, "STARTED"))
    }

    fn stop_vm<'a>(&'a self, vm_id: &'a str) -> PortFuture<'a, Task> {
        Box::pin(self.set_vm_state("stop_vm", vm_id, "STOPPED"))
    }

    fn restart_vm<'a>(&'a self, vm_id: &'a str) -> PortFuture<'a, Task> {
        Box::pin(self.set_vm_state("restart_vm", vm_id, "STARTED"))
    }

    fn attach_disk<'a>(&'a self, vm_id: &'a str, disk_id: &'a str) -> PortFuture<'a, Task> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.begin("attach_disk")?;
            state.vm_mut(vm_id)?;
            let disk = state.disk_mut(disk_id)?;
            if !disk.vms.iter().any(|id| id == vm_id) {
                disk.vms.push(vm_id.to_string());
            }
            Ok(completed("attach_disk", vm_id))
        })
    }

    fn detach_disk<'a>(&'a self, vm_id: &'a str, disk_id: &'a str) -> PortFuture<'a, Task> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.begin("detach_disk")?;
            state.vm_mut(vm_id)?;
            state.disk_mut(disk_id)?.vms.retain(|id| id != vm_id);
            Ok(completed("detach_disk", vm_id))
        })
    }

    fn attach_iso<'a>(&'a self, vm_id: &'a str, iso_path: &'a Path) -> PortFuture<'a, Task> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.begin("attach_iso")?;
            state.vm_mut(vm_id)?.iso = Some(iso_path.to_path_buf());
            Ok(completed("attach_iso", vm_id))
        })
    }

    fn detach_iso<'a>(&'a self, vm_id: &'a str) -> PortFuture<'a, Task> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.begin("detach_iso")?;
            if state.vm_mut(vm_id)?.iso.take().is_none() {
                return Err(CloudError::Task {
                    task_id: new_id(),
                    operation: "DETACH_ISO".to_string(),
                    message: format!("No ISO attached to VM '{vm_id}'"),
                });
            }
            Ok(completed("detach_iso", vm_id))
        })
    }

    fn set_metadata<'a>(&'a self, vm_id: &'a str, metadata: &'a VmMetadata) -> PortFuture<'a, Task> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.begin("set_metadata")?;
            state
                .vm_mut(vm_id)?
                .vm
                .metadata
                .extend(metadata.metadata.clone());
            Ok(completed("set_metadata", vm_id))
        })
    }

    fn create_disk<'a>(&'a self, _project_id: &'a str, spec: &'a DiskCreateSpec) -> PortFuture<'a, Task> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.begin("create_disk")?;
            let disk = PersistentDisk {
                id: new_id(),
                name: spec.name.clone(),
                flavor: spec.flavor.clone(),
                capacity_gb: spec.capacity_gb,
                vms: Vec::new(),
            };
            let task = completed("create_disk", &disk.id);
            state.disks.insert(disk.id.clone(), disk);
            Ok(task)
        })
    }

    fn get_disk<'a>(&'a self, disk_id: &'a str) -> PortFuture<'a, PersistentDisk> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.begin("get_disk")?;
            Ok(state.disk_mut(disk_id)?.clone())
        })
    }

    fn delete_disk<'a>(&'a self, disk_id: &'a str) -> PortFuture<'a, Task> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.begin("delete_disk")?;
            state
                .disks
                .remove(disk_id)
                .ok_or_else(|| not_found("DiskNotFound", disk_id))?;
            Ok(completed("delete_disk", disk_id))
        })
    }

    fn list_disks<'a>(&'a self, _project_id: &'a str) -> PortFuture<'a, Vec<PersistentDisk>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.begin("list_disks")?;
            Ok(state.disks.values().cloned().collect())
        })
    }

    fn create_image(&self, upload: ImageUpload) -> PortFuture<'_, Task> {
        Box::pin(async move {
            let ImageUpload { name, mut file } = upload;
            let mut content = Vec::new();
            file.read_to_end(&mut content)
                .await
                .map_err(|e| CloudError::LocalFile(format!("{name}: {e}")))?;

            let mut state = self.state.lock().await;
            state.begin("create_image")?;
            let image_id = new_id();
            state
                .images
                .insert(image_id.clone(), ImageRecord { name, content });
            Ok(completed("create_image", &image_id))
        })
    }

    fn delete_image<'a>(&'a self, image_id: &'a str) -> PortFuture<'a, Task> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.begin("delete_image")?;
            state
                .images
                .remove(image_id)
                .ok_or_else(|| not_found("ImageNotFound", image_id))?;
            Ok(completed("delete_image", image_id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryCloud;
    use crate::cloud::{CloudClient, CloudError};

    #[tokio::test]
    async fn given_armed_fault_when_operation_called_then_it_fails_once() -> Result<(), CloudError> {
        let cloud = MemoryCloud::new();
        cloud.insert_vm("vm-1").await;
        cloud
            .inject_fault("start_vm", CloudError::Transport("reset".to_string()))
            .await;

        let first = cloud.start_vm("vm-1").await;
        cloud.start_vm("vm-1").await?;

        assert_eq!(first, Err(CloudError::Transport("reset".to_string())));
        assert_eq!(cloud.calls().await, vec!["start_vm", "start_vm"]);
        Ok(())
    }

    #[tokio::test]
    async fn given_vm_without_iso_when_detached_then_task_failure_is_returned() {
        let cloud = MemoryCloud::new();
        cloud.insert_vm("vm-1").await;

        let result = cloud.detach_iso("vm-1").await;

        assert!(result.is_err_and(|e| e.is_task_failure()));
    }

    #[tokio::test]
    async fn given_unknown_vm_when_fetched_then_not_found_is_returned() {
        let cloud = MemoryCloud::new();

        let result = cloud.get_vm("missing").await;

        assert!(result.is_err_and(|e| e.is_not_found()));
    }
}
