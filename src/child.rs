//! The child-spawning and device-manager collaborators.
//!
//! Per-interface child device implementation, alternate-setting selection
//! and the device-manager's binding machinery all live outside this crate;
//! this module only states the interfaces the Descriptor Walker (C3) and
//! Device Lifecycle (C7) call through.

use crate::error::Error;
use crate::wire::DeviceDescriptor;

/// Opaque handle to a published child, returned by [`ChildSpawner`] and
/// threaded back unchanged through [`ChildSpawner::remove`] and
/// [`ChildSpawner::set_alt_setting`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildId(pub u64);

/// Publishes and tears down per-interface (or per-association) child
/// devices on behalf of the Descriptor Walker.
pub trait ChildSpawner: Send + Sync {
    /// Publishes a single top-level interface (and its alternate settings)
    /// as a child device.
    fn spawn_interface(
        &self,
        parent: &DeviceDescriptor,
        iid: u8,
        blob: &[u8],
    ) -> Result<ChildId, Error>;

    /// Publishes a contiguous run of interfaces named by an Interface
    /// Association Descriptor as one child device.
    fn spawn_association(
        &self,
        parent: &DeviceDescriptor,
        first_iid: u8,
        count: u8,
        blob: &[u8],
    ) -> Result<ChildId, Error>;

    /// Tears down a previously spawned child.
    fn remove(&self, child: ChildId);

    /// Delegates an alternate-setting change to the child owning `child`.
    fn set_alt_setting(&self, child: ChildId, alt: u8) -> Result<(), Error>;
}

/// Publishes and removes the top-level device node itself.
pub trait DeviceManager: Send + Sync {
    /// Publishes the top-level device with the bind properties from C7
    /// step 8. Returns once publication (and any recursive binding it
    /// triggers) has completed.
    fn publish(
        &self,
        device_id: u32,
        vendor_id: u16,
        product_id: u16,
        class: u8,
        subclass: u8,
        protocol: u8,
    ) -> Result<(), Error>;

    /// Requests removal of the top-level device node.
    fn remove(&self, device_id: u32);
}
