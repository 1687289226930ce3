//! The Interface Status Table (C2): per-interface arbitration between
//! auto-created children and explicit claims.
//!
//! Three states, not two, because auto-creation (the Descriptor Walker) and
//! an explicit `claim_interface` race: the device-manager collaborator may
//! bind siblings recursively before a child's publish call returns. A
//! boolean "claimed" cannot distinguish "has a child that must be torn down
//! first" from "never existed."

use crate::child::{ChildId, ChildSpawner};
use crate::error::{self, Error};
use slab::Slab;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceStatus {
    Available,
    Claimed,
    ChildDevice,
}

struct Inner {
    status: Vec<InterfaceStatus>,
    children: Slab<ChildId>,
    child_keys: Vec<Option<usize>>,
    associations: Vec<ChildId>,
    is_hub: bool,
    hub_interface: Option<u8>,
}

impl Inner {
    fn new(num_interfaces: usize) -> Self {
        Self {
            status: vec![InterfaceStatus::Available; num_interfaces],
            children: Slab::new(),
            child_keys: vec![None; num_interfaces],
            associations: Vec::new(),
            is_hub: false,
            hub_interface: None,
        }
    }
}

/// Guards the status table, the children set, `is_hub` and `hub_intf`
/// behind one mutex, per the data model's invariant 5: all four status-table
/// mutations and all children-set mutations happen under this one lock.
///
/// A panic while this lock is held poisons it; every method here surfaces
/// that as `Error::Internal` rather than pressing on with a table that may
/// be mid-mutation (data-model invariant 5 would no longer be trustworthy).
pub struct InterfaceStatusTable {
    inner: Mutex<Inner>,
}

impl InterfaceStatusTable {
    pub fn new(num_interfaces: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::new(num_interfaces)),
        }
    }

    pub fn len(&self) -> Result<usize, Error> {
        Ok(self.inner.lock().map_err(error::poisoned)?.status.len())
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    pub fn status(&self, iid: u8) -> Result<InterfaceStatus, Error> {
        let inner = self.inner.lock().map_err(error::poisoned)?;
        inner.status.get(iid as usize).copied().ok_or(Error::BadState)
    }

    pub fn is_hub(&self) -> Result<bool, Error> {
        Ok(self.inner.lock().map_err(error::poisoned)?.is_hub)
    }

    pub fn set_hub(&self, hub_interface: u8) -> Result<(), Error> {
        let mut inner = self.inner.lock().map_err(error::poisoned)?;
        if hub_interface as usize >= inner.status.len() {
            return Err(Error::BadState);
        }
        inner.is_hub = true;
        inner.hub_interface = Some(hub_interface);
        Ok(())
    }

    /// `AVAILABLE → CLAIMED`, tearing down any existing `CHILD_DEVICE`
    /// first. Fails with `AlreadyBound` if already claimed, `BadState` if a
    /// `CHILD_DEVICE` entry has no matching child (a corrupted table) or if
    /// `iid` is outside the table.
    pub fn claim(&self, iid: u8, spawner: &dyn ChildSpawner) -> Result<(), Error> {
        let mut inner = self.inner.lock().map_err(error::poisoned)?;
        if iid as usize >= inner.status.len() {
            return Err(Error::BadState);
        }
        match inner.status[iid as usize] {
            InterfaceStatus::Claimed => return Err(Error::AlreadyBound),
            InterfaceStatus::ChildDevice => {
                let key = inner.child_keys[iid as usize].take().ok_or(Error::BadState)?;
                let child = inner.children.remove(key);
                spawner.remove(child);
            }
            InterfaceStatus::Available => {}
        }
        inner.status[iid as usize] = InterfaceStatus::Claimed;
        Ok(())
    }

    /// `AVAILABLE → CHILD_DEVICE`, called by the Descriptor Walker after a
    /// child has been published. If the status raced to `CLAIMED` in the
    /// meantime, the caller is expected to have already torn the child back
    /// down (see [`Self::status`] re-check in the walker); this method does
    /// not itself perform that re-check.
    pub fn mark_child(&self, iid: u8, child: ChildId) -> Result<(), Error> {
        let mut inner = self.inner.lock().map_err(error::poisoned)?;
        if iid as usize >= inner.status.len() {
            return Err(Error::BadState);
        }
        let key = inner.children.insert(child);
        inner.child_keys[iid as usize] = Some(key);
        inner.status[iid as usize] = InterfaceStatus::ChildDevice;
        Ok(())
    }

    /// Records an association (IAD) child for teardown bookkeeping. These
    /// children never occupy a per-interface slot — an association spans
    /// several interface numbers at once, none of which individually
    /// transition to `CHILD_DEVICE` — but they still have to be torn down
    /// by [`Self::reset_all`] along with everything else.
    pub fn mark_association(&self, child: ChildId) -> Result<(), Error> {
        let mut inner = self.inner.lock().map_err(error::poisoned)?;
        inner.associations.push(child);
        Ok(())
    }

    /// Removes the child just published for `iid`, used when the walker's
    /// post-publish re-check finds the status has become `CLAIMED` in the
    /// meantime.
    pub fn undo_mark(&self, iid: u8, spawner: &dyn ChildSpawner) -> Result<(), Error> {
        let mut inner = self.inner.lock().map_err(error::poisoned)?;
        let Some(slot) = inner.child_keys.get_mut(iid as usize) else {
            return Err(Error::BadState);
        };
        if let Some(key) = slot.take() {
            let child = inner.children.remove(key);
            spawner.remove(child);
        }
        Ok(())
    }

    /// Zeroes the table to `new_len` entries, all `AVAILABLE`, removing
    /// every existing per-interface and association child first. Used by
    /// `set_configuration` teardown and `unbind`.
    pub fn reset_all(&self, new_len: usize, spawner: &dyn ChildSpawner) -> Result<(), Error> {
        let mut inner = self.inner.lock().map_err(error::poisoned)?;
        for child in inner.children.drain() {
            spawner.remove(child);
        }
        for child in inner.associations.drain(..) {
            spawner.remove(child);
        }
        inner.child_keys.clear();
        inner.child_keys.resize(new_len, None);
        inner.status.clear();
        inner.status.resize(new_len, InterfaceStatus::Available);
        inner.is_hub = false;
        inner.hub_interface = None;
        Ok(())
    }

    /// The child published for `iid`, if its status is `CHILD_DEVICE`.
    pub fn child_for(&self, iid: u8) -> Result<Option<ChildId>, Error> {
        let inner = self.inner.lock().map_err(error::poisoned)?;
        let Some(key) = inner.child_keys.get(iid as usize).copied().flatten() else {
            return Ok(None);
        };
        Ok(inner.children.get(key).copied())
    }

    /// Number of children with interface id `iid` currently recorded: `1`
    /// if `CHILD_DEVICE`, else `0`.
    pub fn child_count(&self, iid: u8) -> Result<usize, Error> {
        let inner = self.inner.lock().map_err(error::poisoned)?;
        let Some(&status) = inner.status.get(iid as usize) else {
            return Ok(0);
        };
        Ok(match status {
            InterfaceStatus::ChildDevice => {
                usize::from(inner.child_keys[iid as usize].is_some())
            }
            _ => 0,
        })
    }
}

#[cfg(test)]
#[path = "tests/interface_status.rs"]
mod tests;
