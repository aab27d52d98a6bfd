use super::args::{required_string_property, ParseArgs, Positional, VmIdArgs};
use super::reports_absence;
use crate::agent_env;
use crate::cloud::DiskCreateSpec;
use crate::context::CpiContext;
use crate::error::ArgumentError;
use crate::Result;
use itertools::Itertools;
use serde_json::Value;
use tracing::info;

const PERSISTENT_DISK_KIND: &str = "persistent-disk";
const MIB_PER_GIB: f64 = 1000.0;

/// Converts a size in MiB to whole GiB, rounding up.
///
/// # Errors
/// Returns `InvalidValue` when the result is below 1 GiB.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn size_in_gb(size_mb: f64) -> std::result::Result<u64, ArgumentError> {
    let gb = (size_mb / MIB_PER_GIB).ceil();
    if !gb.is_finite() || gb < 1.0 {
        return Err(ArgumentError::InvalidValue {
            name: "size".to_string(),
            value: format!(
                "{size_mb} (must provide a size in MiB that rounds up to at least 1 GiB)"
            ),
        });
    }
    Ok(gb as u64)
}

struct CreateDiskArgs {
    size_gb: u64,
    flavor: String,
    vm_id: String,
}

impl ParseArgs for CreateDiskArgs {
    fn parse_args(args: &[Value]) -> std::result::Result<Self, ArgumentError> {
        let args = Positional::expect(args, 3)?;
        let size_gb = size_in_gb(args.number(0, "size")?)?;
        let flavor = required_string_property(args.object(1, "cloud_properties")?, "disk_flavor")?;
        let vm_id = args.string(2, "vm_cid")?;

        Ok(Self {
            size_gb,
            flavor: flavor.to_string(),
            vm_id: vm_id.to_string(),
        })
    }
}

struct DiskIdArgs {
    disk_id: String,
}

impl ParseArgs for DiskIdArgs {
    fn parse_args(args: &[Value]) -> std::result::Result<Self, ArgumentError> {
        let args = Positional::expect(args, 1)?;
        Ok(Self {
            disk_id: args.string(0, "disk_cid")?.to_string(),
        })
    }
}

struct VmDiskArgs {
    vm_id: String,
    disk_id: String,
}

impl ParseArgs for VmDiskArgs {
    fn parse_args(args: &[Value]) -> std::result::Result<Self, ArgumentError> {
        let args = Positional::expect(args, 2)?;
        Ok(Self {
            vm_id: args.string(0, "vm_cid")?.to_string(),
            disk_id: args.string(1, "disk_cid")?.to_string(),
        })
    }
}

pub async fn create_disk(ctx: &CpiContext, args: &[Value]) -> Result<Value> {
    let input = CreateDiskArgs::parse_args(args)?;
    info!(
        "CreateDisk with size: {} GiB, flavor: '{}', vm_cid: '{}'",
        input.size_gb, input.flavor, input.vm_id
    );

    let spec = DiskCreateSpec {
        name: format!("disk-for-vm-{}", input.vm_id),
        kind: PERSISTENT_DISK_KIND.to_string(),
        flavor: input.flavor,
        capacity_gb: input.size_gb,
    };
    let task = ctx.client.create_disk(ctx.project_id(), &spec).await?;
    Ok(Value::String(task.entity_id().to_string()))
}

pub async fn delete_disk(ctx: &CpiContext, args: &[Value]) -> Result<Value> {
    let DiskIdArgs { disk_id } = DiskIdArgs::parse_args(args)?;
    info!("DeleteDisk with disk_cid: '{disk_id}'");

    ctx.client.delete_disk(&disk_id).await?;
    Ok(Value::Null)
}

pub async fn has_disk(ctx: &CpiContext, args: &[Value]) -> Result<Value> {
    let DiskIdArgs { disk_id } = DiskIdArgs::parse_args(args)?;
    info!("HasDisk with disk_cid: '{disk_id}'");

    match ctx.client.get_disk(&disk_id).await {
        Ok(_) => Ok(Value::Bool(true)),
        Err(err) if reports_absence(&err, &ctx.config.photon) => {
            info!("Disk {disk_id} reported absent: {err}");
            Ok(Value::Bool(false))
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn get_disks(ctx: &CpiContext, args: &[Value]) -> Result<Value> {
    let VmIdArgs { vm_id } = VmIdArgs::parse_args(args)?;
    info!("GetDisks with vm_cid: '{vm_id}'");

    let disks = ctx.client.list_disks(ctx.project_id()).await?;
    let attached = disks
        .into_iter()
        .filter(|disk| disk.vms.contains(&vm_id))
        .map(|disk| disk.id)
        .unique()
        .map(Value::String)
        .collect();
    Ok(Value::Array(attached))
}

pub async fn attach_disk(ctx: &CpiContext, args: &[Value]) -> Result<Value> {
    let VmDiskArgs { vm_id, disk_id } = VmDiskArgs::parse_args(args)?;
    info!("AttachDisk with vm_cid: '{vm_id}', disk_cid: '{disk_id}'");

    ctx.client.attach_disk(&vm_id, &disk_id).await?;

    info!("Getting metadata for VM");
    let mut env = agent_env::fetch_metadata(ctx.client.as_ref(), &vm_id).await?;
    env.insert_persistent_disk(&disk_id)?;
    agent_env::sync(ctx, &vm_id, &env).await?;
    Ok(Value::Null)
}

pub async fn detach_disk(ctx: &CpiContext, args: &[Value]) -> Result<Value> {
    let VmDiskArgs { vm_id, disk_id } = VmDiskArgs::parse_args(args)?;
    info!("DetachDisk with vm_cid: '{vm_id}', disk_cid: '{disk_id}'");

    ctx.client.detach_disk(&vm_id, &disk_id).await?;

    info!("Getting metadata for VM");
    let mut env = agent_env::fetch_metadata(ctx.client.as_ref(), &vm_id).await?;
    if !env.remove_persistent_disk(&disk_id)? {
        info!("Disk {disk_id} was not recorded in the agent env of VM {vm_id}");
    }
    agent_env::sync(ctx, &vm_id, &env).await?;
    Ok(Value::Null)
}
