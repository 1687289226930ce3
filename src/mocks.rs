//! Mockall scaffolding for the collaborator traits, for use in this crate's
//! own unit tests that need to drive a [`Device`](crate::device::Device)
//! without a real host controller or bus tree. Built only under `cfg(test)`,
//! so it is not part of this crate's public API surface.

use crate::child::{ChildId, ChildSpawner, DeviceManager};
use crate::error::Error;
use crate::hci::{HostController, Request};
use crate::wire::DeviceDescriptor;
use mockall::mock;

mock! {
    pub HostController {}

    impl HostController for HostController {
        fn request_queue(&self, req: Request);
        fn cancel_all(&self, device_id: u32, endpoint: u8);
        fn reset_endpoint(&self, device_id: u32, endpoint: u8);
        fn get_max_transfer_size(&self, device_id: u32, endpoint: u8) -> usize;
        fn get_current_frame(&self) -> u64;
    }
}

mock! {
    pub ChildSpawner {}

    impl ChildSpawner for ChildSpawner {
        fn spawn_interface(
            &self,
            parent: &DeviceDescriptor,
            iid: u8,
            blob: &[u8],
        ) -> Result<ChildId, Error>;

        fn spawn_association(
            &self,
            parent: &DeviceDescriptor,
            first_iid: u8,
            count: u8,
            blob: &[u8],
        ) -> Result<ChildId, Error>;

        fn remove(&self, child: ChildId);

        fn set_alt_setting(&self, child: ChildId, alt: u8) -> Result<(), Error>;
    }
}

mock! {
    pub DeviceManager {}

    impl DeviceManager for DeviceManager {
        fn publish(
            &self,
            device_id: u32,
            vendor_id: u16,
            product_id: u16,
            class: u8,
            subclass: u8,
            protocol: u8,
        ) -> Result<(), Error>;

        fn remove(&self, device_id: u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_host_controller_reports_passthrough_calls() {
        let mut hci = MockHostController::new();
        hci.expect_get_current_frame().return_const(42u64);
        assert_eq!(hci.get_current_frame(), 42);
    }

    #[test]
    fn mock_child_spawner_reports_failures() {
        let mut spawner = MockChildSpawner::new();
        spawner
            .expect_spawn_interface()
            .returning(|_, _, _| Err(Error::NoMemory));
        let parent: DeviceDescriptor = bytemuck::Zeroable::zeroed();
        assert!(matches!(
            spawner.spawn_interface(&parent, 0, &[]),
            Err(Error::NoMemory)
        ));
    }
}
