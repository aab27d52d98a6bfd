use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Queued,
    Started,
    Completed,
    Error,
}

impl TaskState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(default)]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStep {
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub state: TaskState,
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub entity: Entity,
    #[serde(default)]
    pub steps: Vec<TaskStep>,
}

impl Task {
    #[must_use]
    pub fn completed(id: impl Into<String>, operation: &str, entity_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: TaskState::Completed,
            operation: operation.to_string(),
            entity: Entity {
                id: entity_id.into(),
                kind: String::new(),
            },
            steps: Vec::new(),
        }
    }

    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity.id
    }

    /// Step errors joined into one line, or a generic message when the
    /// task carries none.
    #[must_use]
    pub fn error_summary(&self) -> String {
        let messages: Vec<String> = self
            .steps
            .iter()
            .flat_map(|step| step.errors.iter())
            .map(|error| format!("{}: {}", error.code, error.message))
            .collect();
        if messages.is_empty() {
            format!("task {} ended in state {:?}", self.id, self.state)
        } else {
            messages.join("; ")
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDisk {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    pub kind: String,
    pub flavor: String,
    #[serde(rename = "capacityGb")]
    pub capacity_gb: u64,
    pub boot_disk: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmCreateSpec {
    pub name: String,
    pub flavor: String,
    pub source_image_id: String,
    pub attached_disks: Vec<AttachedDisk>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vm {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub attached_disks: Vec<AttachedDisk>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskCreateSpec {
    pub name: String,
    pub kind: String,
    pub flavor: String,
    #[serde(rename = "capacityGb")]
    pub capacity_gb: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentDisk {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub flavor: String,
    #[serde(default, rename = "capacityGb")]
    pub capacity_gb: u64,
    #[serde(default)]
    pub vms: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmMetadata {
    pub metadata: BTreeMap<String, String>,
}

impl VmMetadata {
    #[must_use]
    pub fn single(key: &str, value: String) -> Self {
        Self {
            metadata: BTreeMap::from([(key.to_string(), value)]),
        }
    }
}

/// A stemcell image opened for upload.
#[derive(Debug)]
pub struct ImageUpload {
    pub name: String,
    pub file: tokio::fs::File,
}
