#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! One handler per director method.

pub mod args;
pub mod disks;
pub mod metadata;
pub mod stemcell;
pub mod vms;

use crate::cloud::CloudError;
use crate::config::PhotonConfig;
use crate::dispatcher::{action, ActionTable};

#[must_use]
pub fn default_actions() -> ActionTable {
    let mut actions = ActionTable::new();
    actions.insert("create_stemcell", action!(stemcell::create_stemcell));
    actions.insert("delete_stemcell", action!(stemcell::delete_stemcell));
    actions.insert("create_vm", action!(vms::create_vm));
    actions.insert("delete_vm", action!(vms::delete_vm));
    actions.insert("has_vm", action!(vms::has_vm));
    actions.insert("restart_vm", action!(vms::restart_vm));
    actions.insert("set_vm_metadata", action!(metadata::set_vm_metadata));
    actions.insert("create_disk", action!(disks::create_disk));
    actions.insert("delete_disk", action!(disks::delete_disk));
    actions.insert("has_disk", action!(disks::has_disk));
    actions.insert("get_disks", action!(disks::get_disks));
    actions.insert("attach_disk", action!(disks::attach_disk));
    actions.insert("detach_disk", action!(disks::detach_disk));
    actions
}

/// A lookup failure that means the entity does not exist. With
/// credentials configured the API answers 403 for entities outside the
/// caller's reach, which is treated the same way.
pub(crate) fn reports_absence(err: &CloudError, photon: &PhotonConfig) -> bool {
    err.is_not_found() || (err.is_forbidden() && photon.has_credentials())
}
