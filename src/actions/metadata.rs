use super::args::{ParseArgs, Positional};
use crate::context::CpiContext;
use crate::error::ArgumentError;
use crate::Result;
use serde_json::{Map, Value};
use tracing::info;

struct SetVmMetadataArgs {
    vm_id: String,
    metadata: Map<String, Value>,
}

impl ParseArgs for SetVmMetadataArgs {
    fn parse_args(args: &[Value]) -> std::result::Result<Self, ArgumentError> {
        let args = Positional::expect(args, 2)?;
        Ok(Self {
            vm_id: args.string(0, "vm_cid")?.to_string(),
            metadata: args.object(1, "metadata")?.clone(),
        })
    }
}

/// Accepts the director's VM tags without storing them.
pub async fn set_vm_metadata(_ctx: &CpiContext, args: &[Value]) -> Result<Value> {
    let SetVmMetadataArgs { vm_id, metadata } = SetVmMetadataArgs::parse_args(args)?;
    info!(
        "SetVMMetadata with vm_cid: '{vm_id}', {} keys ignored",
        metadata.len()
    );
    Ok(Value::Null)
}
