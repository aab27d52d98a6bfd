#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Port to the virtualization control plane.
//!
//! Every mutating call submits a remote task and blocks until it reaches a
//! terminal state, so callers only ever see a completed [`Task`] or a
//! [`CloudError`].

pub mod memory;
pub mod photon;
mod types;

pub use types::{
    AttachedDisk, DiskCreateSpec, Entity, ImageUpload, PersistentDisk, Task, TaskState, Vm,
    VmCreateSpec, VmMetadata,
};

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use thiserror::Error;

pub type PortFuture<'a, T> =
    Pin<Box<dyn Future<Output = std::result::Result<T, CloudError>> + Send + 'a>>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CloudError {
    /// The API rejected the request.
    #[error("Photon API error: status {status}, code '{code}': {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// The request was accepted but its task finished in the error state.
    #[error("Photon task '{task_id}' ({operation}) failed: {message}")]
    Task {
        task_id: String,
        operation: String,
        message: String,
    },

    #[error("Timed out after {waited_secs}s waiting for task '{task_id}'")]
    TaskTimeout { task_id: String, waited_secs: u64 },

    #[error("HTTP transport error: {0}")]
    Transport(String),

    /// A local file the request needed could not be read.
    #[error("Local file error: {0}")]
    LocalFile(String),
}

impl CloudError {
    pub const STATUS_FORBIDDEN: u16 = 403;
    pub const STATUS_NOT_FOUND: u16 = 404;

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status == Self::STATUS_NOT_FOUND)
    }

    #[must_use]
    pub const fn is_forbidden(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status == Self::STATUS_FORBIDDEN)
    }

    #[must_use]
    pub const fn is_task_failure(&self) -> bool {
        matches!(self, Self::Task { .. })
    }
}

pub trait CloudClient: Send + Sync {
    fn create_vm<'a>(&'a self, project_id: &'a str, spec: &'a VmCreateSpec) -> PortFuture<'a, Task>;

    fn get_vm<'a>(&'a self, vm_id: &'a str) -> PortFuture<'a, Vm>;

    fn delete_vm<'a>(&'a self, vm_id: &'a str) -> PortFuture<'a, Task>;

    fn start_vm<'a>(&'a self, vm_id: &'a str) -> PortFuture<'a, Task>;

    fn stop_vm<'a>(&'a self, vm_id: &'a str) -> PortFuture<'a, Task>;

    fn restart_vm<'a>(&'a self, vm_id: &'a str) -> PortFuture<'a, Task>;

    fn attach_disk<'a>(&'a self, vm_id: &'a str, disk_id: &'a str) -> PortFuture<'a, Task>;

    fn detach_disk<'a>(&'a self, vm_id: &'a str, disk_id: &'a str) -> PortFuture<'a, Task>;

    fn attach_iso<'a>(&'a self, vm_id: &'a str, iso_path: &'a Path) -> PortFuture<'a, Task>;

    fn detach_iso<'a>(&'a self, vm_id: &'a str) -> PortFuture<'a, Task>;

    fn set_metadata<'a>(&'a self, vm_id: &'a str, metadata: &'a VmMetadata)
        -> PortFuture<'a, Task>;

    fn create_disk<'a>(
        &'a self,
        project_id: &'a str,
        spec: &'a DiskCreateSpec,
    ) -> PortFuture<'a, Task>;

    fn get_disk<'a>(&'a self, disk_id: &'a str) -> PortFuture<'a, PersistentDisk>;

    fn delete_disk<'a>(&'a self, disk_id: &'a str) -> PortFuture<'a, Task>;

    fn list_disks<'a>(&'a self, project_id: &'a str) -> PortFuture<'a, Vec<PersistentDisk>>;

    fn create_image(&self, upload: ImageUpload) -> PortFuture<'_, Task>;

    fn delete_image<'a>(&'a self, image_id: &'a str) -> PortFuture<'a, Task>;
}

#[cfg(test)]
mod tests {
    use super::CloudError;

    #[test]
    fn given_api_statuses_when_checked_then_not_found_and_forbidden_are_distinguished() {
        let not_found = CloudError::Api {
            status: 404,
            code: "VmNotFound".to_string(),
            message: "missing".to_string(),
        };
        let forbidden = CloudError::Api {
            status: 403,
            code: "AccessForbidden".to_string(),
            message: "denied".to_string(),
        };

        assert!(not_found.is_not_found());
        assert!(!not_found.is_forbidden());
        assert!(forbidden.is_forbidden());
        assert!(!CloudError::Transport("reset".to_string()).is_not_found());
    }
}
