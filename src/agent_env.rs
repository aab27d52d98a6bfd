#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! The agent environment document and its two copies: a media image
//! attached to the VM, and a mirror in the VM's metadata.

use crate::cloud::{CloudClient, VmMetadata};
use crate::config::AgentConfig;
use crate::context::CpiContext;
use crate::external_commands::CommandRunner;
use crate::scratch::{ScratchDir, ScratchFile};
use crate::{CpiError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

pub const METADATA_KEY: &str = "bosh-cpi";
/// Fits the ISO 9660 8.3 naming scheme.
pub const ENV_FILE_NAME: &str = "env";
pub const MEDIA_TOOL: &str = "mkisofs";
pub const EPHEMERAL_DEVICE_PATH: &str = "/dev/sdb";

const EPHEMERAL_KEY: &str = "ephemeral";
const PERSISTENT_KEY: &str = "persistent";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentEnv {
    pub agent_id: String,
    pub vm: VmSpec,
    pub mbus: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ntp: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub networks: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub env: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub disks: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub blobstore: BlobstoreSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmSpec {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobstoreSpec {
    #[serde(default, deserialize_with = "null_as_default")]
    pub provider: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub options: Map<String, Value>,
}

/// Reads an explicit `null` the same as a missing field.
///
/// # Errors
/// Returns the deserializer's error for any other mistyped value.
pub fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl AgentEnv {
    /// Environment for a freshly created VM with only its ephemeral disk.
    #[must_use]
    pub fn for_new_vm(
        agent_id: &str,
        vm: VmSpec,
        ephemeral_disk_id: &str,
        networks: Map<String, Value>,
        env: Map<String, Value>,
        agent: &AgentConfig,
    ) -> Self {
        let mut disks = Map::new();
        disks.insert(
            EPHEMERAL_KEY.to_string(),
            json!({"id": ephemeral_disk_id, "path": EPHEMERAL_DEVICE_PATH}),
        );
        Self {
            agent_id: agent_id.to_string(),
            vm,
            mbus: agent.mbus.clone(),
            ntp: agent.ntp.clone(),
            networks,
            env,
            disks,
            blobstore: agent.blobstore.clone(),
        }
    }

    /// Records a persistent disk with an empty device path, which the
    /// in-VM agent resolves itself.
    ///
    /// # Errors
    /// Returns `CpiError::Metadata` when `disks.persistent` is not a map.
    pub fn insert_persistent_disk(&mut self, disk_id: &str) -> Result<()> {
        let persistent = self
            .disks
            .entry(PERSISTENT_KEY)
            .or_insert(Value::Null);
        if persistent.is_null() {
            *persistent = Value::Object(Map::new());
        }
        let Value::Object(entries) = persistent else {
            return Err(unexpected_persistent_type());
        };
        entries.insert(disk_id.to_string(), json!({"id": disk_id, "path": ""}));
        Ok(())
    }

    /// Returns whether an entry was removed.
    ///
    /// # Errors
    /// Returns `CpiError::Metadata` when `disks.persistent` is not a map.
    pub fn remove_persistent_disk(&mut self, disk_id: &str) -> Result<bool> {
        match self.disks.get_mut(PERSISTENT_KEY) {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Object(entries)) => Ok(entries.remove(disk_id).is_some()),
            Some(_) => Err(unexpected_persistent_type()),
        }
    }

    #[must_use]
    pub fn persistent_disk_ids(&self) -> Vec<String> {
        self.disks
            .get(PERSISTENT_KEY)
            .and_then(Value::as_object)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}

fn unexpected_persistent_type() -> CpiError {
    CpiError::Metadata("Unexpected type found in VM metadata for persistent disks".to_string())
}

/// Writes `env` into a fresh media image and returns the image file.
///
/// # Errors
/// Returns `CpiError::MediaRender` with the tool's output when the image
/// tool fails, or the underlying I/O or serialization error.
pub async fn render_env_iso(runner: &dyn CommandRunner, env: &AgentEnv) -> Result<ScratchFile> {
    let document = serde_json::to_vec(env)?;
    let dir = ScratchDir::new("agent-iso-dir")?;
    let env_path = dir.join(ENV_FILE_NAME);
    tokio::fs::write(&env_path, &document).await?;

    let iso = ScratchFile::new("agent-env-iso", ".iso")?;
    let args = vec![
        "-o".to_string(),
        iso.path().to_string_lossy().to_string(),
        env_path.to_string_lossy().to_string(),
    ];
    let outcome = runner.run(MEDIA_TOOL, &args).await.map_err(|err| CpiError::MediaRender {
        message: err.to_string(),
        output: String::new(),
    })?;
    if !outcome.success {
        return Err(CpiError::MediaRender {
            message: format!("{MEDIA_TOOL} exited unsuccessfully"),
            output: outcome.output,
        });
    }
    Ok(iso)
}

/// # Errors
/// Returns `CpiError::Metadata` when the VM carries no agent environment,
/// `CpiError::Serialization` when it is malformed, or the remote failure.
pub async fn fetch_metadata(client: &dyn CloudClient, vm_id: &str) -> Result<AgentEnv> {
    let vm = client.get_vm(vm_id).await?;
    let document = vm.metadata.get(METADATA_KEY).ok_or_else(|| {
        CpiError::Metadata(format!(
            "No metadata found with key '{METADATA_KEY}' for VM '{vm_id}'"
        ))
    })?;
    Ok(serde_json::from_str(document)?)
}

/// # Errors
/// Returns the remote failure unchanged.
pub async fn store_metadata(client: &dyn CloudClient, vm_id: &str, env: &AgentEnv) -> Result<()> {
    let metadata = VmMetadata::single(METADATA_KEY, serde_json::to_string(env)?);
    client.set_metadata(vm_id, &metadata).await?;
    Ok(())
}

/// Renders the image, mirrors `env` into metadata, then swaps the
/// attached media for the new image.
///
/// # Errors
/// Any failure aborts the swap; a detach that fails because no media is
/// attached is not a failure.
pub async fn sync(ctx: &CpiContext, vm_id: &str, env: &AgentEnv) -> Result<()> {
    info!(vm_id, agent_id = %env.agent_id, "Creating agent env");
    let iso = render_env_iso(ctx.runner.as_ref(), env).await?;

    info!(vm_id, "Updating metadata for VM");
    store_metadata(ctx.client.as_ref(), vm_id, env).await?;

    match ctx.client.detach_iso(vm_id).await {
        Ok(_) => {}
        Err(err) if err.is_task_failure() => {
            warn!(vm_id, error = %err, "Ignoring ISO detach failure");
        }
        Err(err) => return Err(err.into()),
    }

    info!(vm_id, path = %iso.path().display(), "Attaching ISO");
    ctx.client.attach_iso(vm_id, iso.path()).await?;
    Ok(())
}
