use super::args::{
    json_value_type_name, required_string_property, ParseArgs, Positional, VmIdArgs,
};
use super::reports_absence;
use crate::agent_env::{self, AgentEnv, VmSpec};
use crate::cloud::{AttachedDisk, VmCreateSpec};
use crate::context::CpiContext;
use crate::error::{ArgumentError, ErrorKind};
use crate::{CpiError, Result};
use serde_json::{Map, Value};
use tracing::info;

pub const VM_NAME: &str = "bosh-vm";
pub const BOOT_DISK_NAME: &str = "boot-disk";
pub const EPHEMERAL_DISK_NAME: &str = "bosh-ephemeral-disk";
pub const DEFAULT_ATTACHED_DISK_SIZE_GB: u64 = 16;

const EPHEMERAL_DISK_KIND: &str = "ephemeral-disk";
// The control plane sizes the boot disk from the image.
const BOOT_DISK_CAPACITY_GB: u64 = 50;

const VM_FLAVOR_KEY: &str = "vm_flavor";
const DISK_FLAVOR_KEY: &str = "disk_flavor";
const ATTACHED_DISK_SIZE_KEY: &str = "vm_attached_disk_size_gb";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudProperties {
    pub vm_flavor: String,
    pub disk_flavor: String,
    pub attached_disk_size_gb: u64,
}

impl CloudProperties {
    /// # Errors
    /// Returns an argument error when either flavor is missing or not a
    /// string, or the disk size is not a positive whole number.
    pub fn from_map(properties: &Map<String, Value>) -> std::result::Result<Self, ArgumentError> {
        let vm_flavor = required_string_property(properties, VM_FLAVOR_KEY)?;
        let disk_flavor = required_string_property(properties, DISK_FLAVOR_KEY)?;
        let attached_disk_size_gb = properties
            .get(ATTACHED_DISK_SIZE_KEY)
            .map_or(Ok(DEFAULT_ATTACHED_DISK_SIZE_GB), parse_disk_size)?;

        Ok(Self {
            vm_flavor: vm_flavor.to_string(),
            disk_flavor: disk_flavor.to_string(),
            attached_disk_size_gb,
        })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_disk_size(value: &Value) -> std::result::Result<u64, ArgumentError> {
    let invalid = || ArgumentError::InvalidValue {
        name: format!("cloud_properties.{ATTACHED_DISK_SIZE_KEY}"),
        value: value.to_string(),
    };
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|size| size.is_finite() && size.fract() == 0.0 && *size >= 1.0)
                    .map(|size| size as u64)
            })
            .filter(|size| *size > 0)
            .ok_or_else(invalid),
        other => Err(ArgumentError::InvalidType {
            name: format!("cloud_properties.{ATTACHED_DISK_SIZE_KEY}"),
            expected: "number",
            got: json_value_type_name(other),
        }),
    }
}

#[derive(Debug)]
struct CreateVmArgs {
    agent_id: String,
    stemcell_id: String,
    cloud_properties: CloudProperties,
    networks: Map<String, Value>,
    env: Map<String, Value>,
}

impl ParseArgs for CreateVmArgs {
    fn parse_args(args: &[Value]) -> std::result::Result<Self, ArgumentError> {
        let args = Positional::expect(args, 6)?;
        let agent_id = args.string(0, "agent_id")?;
        let stemcell_id = args.string(1, "stemcell_cid")?;
        let cloud_properties = CloudProperties::from_map(args.object(2, "cloud_properties")?)?;
        let networks = args.object(3, "networks")?;
        // Position 4 carries disk cids, which placement does not use.
        let env = args.object(5, "env")?;

        Ok(Self {
            agent_id: agent_id.to_string(),
            stemcell_id: stemcell_id.to_string(),
            cloud_properties,
            networks: networks.clone(),
            env: env.clone(),
        })
    }
}

fn vm_create_spec(stemcell_id: &str, props: &CloudProperties) -> VmCreateSpec {
    let disk = |name: &str, capacity_gb: u64, boot_disk: bool| AttachedDisk {
        name: name.to_string(),
        kind: EPHEMERAL_DISK_KIND.to_string(),
        flavor: props.disk_flavor.clone(),
        capacity_gb,
        boot_disk,
        state: "STARTED".to_string(),
        ..AttachedDisk::default()
    };
    VmCreateSpec {
        name: VM_NAME.to_string(),
        flavor: props.vm_flavor.clone(),
        source_image_id: stemcell_id.to_string(),
        attached_disks: vec![
            disk(BOOT_DISK_NAME, BOOT_DISK_CAPACITY_GB, true),
            disk(EPHEMERAL_DISK_NAME, props.attached_disk_size_gb, false),
        ],
    }
}

pub async fn create_vm(ctx: &CpiContext, args: &[Value]) -> Result<Value> {
    let input = CreateVmArgs::parse_args(args)?;
    info!(
        "CreateVM with agent_id: '{}', stemcell_cid: '{}', cloud_properties: '{:?}'",
        input.agent_id, input.stemcell_id, input.cloud_properties
    );

    let spec = vm_create_spec(&input.stemcell_id, &input.cloud_properties);
    let task = ctx.client.create_vm(ctx.project_id(), &spec).await?;
    let vm_id = task.entity_id().to_string();

    info!("Getting details of VM: {vm_id}");
    let vm = ctx.client.get_vm(&vm_id).await?;
    let ephemeral_disk_id = vm
        .attached_disks
        .iter()
        .find(|disk| disk.name == EPHEMERAL_DISK_NAME && !disk.id.is_empty())
        .map(|disk| disk.id.clone())
        .ok_or_else(|| {
            CpiError::bosh(
                ErrorKind::CloudError,
                false,
                format!("Could not find ID for ephemeral disk of new VM {}", vm.id),
            )
        })?;

    let env = AgentEnv::for_new_vm(
        &input.agent_id,
        VmSpec {
            name: vm.name.clone(),
            id: vm.id.clone(),
        },
        &ephemeral_disk_id,
        input.networks,
        input.env,
        &ctx.config.agent,
    );
    agent_env::sync(ctx, &vm_id, &env).await?;

    info!("Starting VM");
    ctx.client.start_vm(&vm_id).await?;
    Ok(Value::String(vm_id))
}

pub async fn delete_vm(ctx: &CpiContext, args: &[Value]) -> Result<Value> {
    let VmIdArgs { vm_id } = VmIdArgs::parse_args(args)?;
    info!("Deleting VM: {vm_id}");

    info!("Detaching disks");
    let disks = ctx.client.list_disks(ctx.project_id()).await?;
    for disk in disks.iter().filter(|disk| disk.vms.contains(&vm_id)) {
        info!("Detaching disk: {}", disk.id);
        ctx.client.detach_disk(&vm_id, &disk.id).await?;
    }

    info!("Stopping VM");
    ctx.client.stop_vm(&vm_id).await?;

    info!("Deleting VM");
    ctx.client.delete_vm(&vm_id).await?;
    Ok(Value::Null)
}

pub async fn has_vm(ctx: &CpiContext, args: &[Value]) -> Result<Value> {
    let VmIdArgs { vm_id } = VmIdArgs::parse_args(args)?;
    info!("Determining if VM exists: {vm_id}");

    match ctx.client.get_vm(&vm_id).await {
        Ok(_) => Ok(Value::Bool(true)),
        Err(err) if reports_absence(&err, &ctx.config.photon) => {
            info!("VM {vm_id} reported absent: {err}");
            Ok(Value::Bool(false))
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn restart_vm(ctx: &CpiContext, args: &[Value]) -> Result<Value> {
    let VmIdArgs { vm_id } = VmIdArgs::parse_args(args)?;
    info!("Restarting VM: {vm_id}");

    ctx.client.restart_vm(&vm_id).await?;
    Ok(Value::Null)
}
