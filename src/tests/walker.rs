use super::*;
use crate::child::ChildSpawner;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;

#[derive(Default)]
struct FakeSpawner {
    next_id: AtomicU64,
    spawned_interfaces: StdMutex<Vec<u8>>,
    spawned_associations: StdMutex<Vec<(u8, u8)>>,
    removed: StdMutex<Vec<ChildId>>,
    fail_iid: Option<u8>,
}

impl ChildSpawner for FakeSpawner {
    fn spawn_interface(
        &self,
        _parent: &DeviceDescriptor,
        iid: u8,
        _blob: &[u8],
    ) -> Result<ChildId, Error> {
        if self.fail_iid == Some(iid) {
            return Err(Error::NoMemory);
        }
        self.spawned_interfaces.lock().unwrap().push(iid);
        Ok(ChildId(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    fn spawn_association(
        &self,
        _parent: &DeviceDescriptor,
        first_iid: u8,
        count: u8,
        _blob: &[u8],
    ) -> Result<ChildId, Error> {
        self.spawned_associations
            .lock()
            .unwrap()
            .push((first_iid, count));
        Ok(ChildId(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    fn remove(&self, child: ChildId) {
        self.removed.lock().unwrap().push(child);
    }

    fn set_alt_setting(&self, _child: ChildId, _alt: u8) -> Result<(), Error> {
        Ok(())
    }
}

fn device() -> DeviceDescriptor {
    bytemuck::Zeroable::zeroed()
}

// bNumConfigurations=1, one HID interface, one endpoint.
const HID_MOUSE: &[u8] = &[
    9, 2, 34, 0, 1, 1, 0, 0x80, 50, // configuration header, wTotalLength=34
    9, 4, 0, 0, 1, 3, 1, 2, 0, // interface 0, class HID
    9, 33, 0x11, 1, 0, 1, 34, 0, 52, // HID class descriptor (class-specific, skipped)
    7, 5, 0x81, 3, 4, 0, 10, // endpoint
];

const IAD_COMPOSITE: &[u8] = &[
    9, 2, 56, 0, 2, 1, 0, 0x80, 50,
    8, 11, 0, 2, 2, 6, 0, 0,
    9, 4, 0, 0, 1, 2, 6, 0, 0,
    7, 5, 0x83, 3, 8, 0, 8,
    9, 4, 1, 0, 2, 10, 0, 0, 0,
    7, 5, 0x82, 2, 0x40, 0, 0,
    7, 5, 0x02, 2, 0x40, 0, 0,
];

#[test]
fn simple_hid_mouse_publishes_one_child() {
    let table = InterfaceStatusTable::new(1);
    let spawner = FakeSpawner::default();
    let parent = device();
    walk(&parent, HID_MOUSE, &table, &spawner).unwrap();
    assert_eq!(spawner.spawned_interfaces.lock().unwrap().as_slice(), &[0]);
    assert_eq!(table.status(0).unwrap(), InterfaceStatus::ChildDevice);
}

#[test]
fn composite_iad_publishes_one_association_and_no_status_change() {
    let table = InterfaceStatusTable::new(2);
    let spawner = FakeSpawner::default();
    let parent = device();
    walk(&parent, IAD_COMPOSITE, &table, &spawner).unwrap();
    assert_eq!(
        spawner.spawned_associations.lock().unwrap().as_slice(),
        &[(0, 2)]
    );
    assert!(spawner.spawned_interfaces.lock().unwrap().is_empty());
    assert_eq!(table.status(0).unwrap(), InterfaceStatus::Available);
    assert_eq!(table.status(1).unwrap(), InterfaceStatus::Available);
}

#[test]
fn composite_iad_child_is_torn_down_on_reset() {
    let table = InterfaceStatusTable::new(2);
    let spawner = FakeSpawner::default();
    let parent = device();
    walk(&parent, IAD_COMPOSITE, &table, &spawner).unwrap();
    table.reset_all(2, &spawner).unwrap();
    assert_eq!(spawner.removed.lock().unwrap().len(), 1);
}

#[test]
fn claimed_interface_is_skipped() {
    let table = InterfaceStatusTable::new(1);
    let spawner = FakeSpawner::default();
    table.claim(0, &spawner).unwrap();
    let parent = device();
    walk(&parent, HID_MOUSE, &table, &spawner).unwrap();
    assert!(spawner.spawned_interfaces.lock().unwrap().is_empty());
    assert_eq!(table.status(0).unwrap(), InterfaceStatus::Claimed);
}

#[test]
fn spawn_failure_is_recorded_but_walk_continues() {
    let table = InterfaceStatusTable::new(1);
    let spawner = FakeSpawner {
        fail_iid: Some(0),
        ..Default::default()
    };
    let parent = device();
    let result = walk(&parent, HID_MOUSE, &table, &spawner);
    assert!(matches!(result, Err(Error::NoMemory)));
    assert_eq!(table.status(0).unwrap(), InterfaceStatus::Available);
}

#[test]
fn interface_number_outside_the_table_is_skipped_not_panicked() {
    // Table only has room for 1 interface, but the descriptor claims
    // interface number 40 — legal on the wire, just unusual.
    let table = InterfaceStatusTable::new(1);
    let spawner = FakeSpawner::default();
    let parent = device();
    let out_of_range: &[u8] = &[
        9, 2, 34, 0, 1, 1, 0, 0x80, 50,
        9, 4, 40, 0, 1, 3, 1, 2, 0,
        9, 33, 0x11, 1, 0, 1, 34, 0, 52,
        7, 5, 0x81, 3, 4, 0, 10,
    ];
    let result = walk(&parent, out_of_range, &table, &spawner);
    assert!(matches!(result, Err(Error::BadState)));
    assert!(spawner.spawned_interfaces.lock().unwrap().is_empty());
}

// bNumConfigurations=1, one hub-class interface, one endpoint.
const HUB_DEVICE: &[u8] = &[
    9, 2, 34, 0, 1, 1, 0, 0x80, 50,
    9, 4, 0, 0, 1, 9, 0, 0, 0, // interface 0, class HUB_CLASSCODE (9)
    9, 33, 0x11, 1, 0, 1, 34, 0, 52,
    7, 5, 0x81, 3, 4, 0, 10,
];

#[test]
fn hub_class_interface_marks_the_table_as_a_hub() {
    let table = InterfaceStatusTable::new(1);
    let spawner = FakeSpawner::default();
    let parent = device();
    walk(&parent, HUB_DEVICE, &table, &spawner).unwrap();
    assert!(table.is_hub().unwrap());
}

#[test]
fn zero_total_length_header_only_walk_is_a_noop() {
    let table = InterfaceStatusTable::new(0);
    let spawner = FakeSpawner::default();
    let parent = device();
    let header_only = &[9, 2, 9, 0, 1, 1, 0, 0x80, 50];
    walk(&parent, header_only, &table, &spawner).unwrap();
    assert!(spawner.spawned_interfaces.lock().unwrap().is_empty());
}
