use super::*;
use crate::child::{ChildId, ChildSpawner, DeviceManager};
use crate::device::{Device, OverrideTable};
use crate::error::UsbError;
use crate::hci::{HostController, Request, RequestBuffer, Speed};
use crate::wire;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;

#[derive(Default)]
struct FakeSpawner {
    next_id: AtomicU64,
    alt_settings: StdMutex<Vec<(ChildId, u8)>>,
}

impl ChildSpawner for FakeSpawner {
    fn spawn_interface(
        &self,
        _parent: &wire::DeviceDescriptor,
        _iid: u8,
        _blob: &[u8],
    ) -> Result<ChildId, Error> {
        Ok(ChildId(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    fn spawn_association(
        &self,
        _parent: &wire::DeviceDescriptor,
        _first_iid: u8,
        _count: u8,
        _blob: &[u8],
    ) -> Result<ChildId, Error> {
        Ok(ChildId(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    fn remove(&self, _child: ChildId) {}

    fn set_alt_setting(&self, child: ChildId, alt: u8) -> Result<(), Error> {
        self.alt_settings.lock().unwrap().push((child, alt));
        Ok(())
    }
}

#[derive(Default)]
struct FakeManager;

impl DeviceManager for FakeManager {
    fn publish(&self, _: u32, _: u16, _: u16, _: u8, _: u8, _: u8) -> Result<(), Error> {
        Ok(())
    }
    fn remove(&self, _: u32) {}
}

/// Answers device/configuration/string descriptor reads and
/// `SET_CONFIGURATION` from fixed tables; counts cancel/reset/frame calls.
#[derive(Default)]
struct FakeHci {
    device_descriptor: [u8; 18],
    configs: Vec<Vec<u8>>,
    strings: StdMutex<Vec<(u8, u16, Vec<u8>)>>, // (desc_id, lang_id, utf16le payload)
    cancel_calls: StdMutex<Vec<u8>>,
    reset_calls: StdMutex<Vec<u8>>,
}

impl HostController for FakeHci {
    fn request_queue(&self, mut req: Request) {
        let setup = req.setup.expect("facade control-only test harness");
        match setup.bRequest {
            wire::GET_DESCRIPTOR => {
                let desc_type = (setup.wValue >> 8) as u8;
                let desc_id = (setup.wValue & 0xFF) as u8;
                let src: Vec<u8> = match desc_type {
                    wire::DEVICE_DESCRIPTOR => self.device_descriptor.to_vec(),
                    wire::CONFIGURATION_DESCRIPTOR => {
                        match self.configs.get(desc_id as usize) {
                            Some(blob) => blob.clone(),
                            None => {
                                req.complete(Err(UsbError::Stall));
                                return;
                            }
                        }
                    }
                    wire::STRING_DESCRIPTOR if desc_id == 0 => {
                        let langs = self.strings.lock().unwrap();
                        let ids: Vec<u16> = langs.iter().map(|(_, l, _)| *l).collect();
                        let mut blob = vec![0u8, wire::STRING_DESCRIPTOR];
                        for id in ids {
                            blob.extend_from_slice(&id.to_le_bytes());
                        }
                        blob[0] = blob.len() as u8;
                        blob
                    }
                    wire::STRING_DESCRIPTOR => {
                        let strings = self.strings.lock().unwrap();
                        match strings
                            .iter()
                            .find(|(id, lang, _)| *id == desc_id && *lang == setup.wIndex)
                        {
                            Some((_, _, payload)) => {
                                let mut blob = vec![0u8, wire::STRING_DESCRIPTOR];
                                blob.extend_from_slice(payload);
                                blob[0] = blob.len() as u8;
                                blob
                            }
                            None => {
                                req.complete(Err(UsbError::Stall));
                                return;
                            }
                        }
                    }
                    _ => {
                        req.complete(Err(UsbError::Stall));
                        return;
                    }
                };
                if let RequestBuffer::In(buf) = &mut req.buffer {
                    let n = buf.len().min(src.len());
                    buf[..n].copy_from_slice(&src[..n]);
                    req.complete(Ok(n));
                } else {
                    req.complete(Err(UsbError::Other));
                }
            }
            wire::SET_CONFIGURATION => req.complete(Ok(0)),
            _ => req.complete(Err(UsbError::Stall)),
        }
    }

    fn cancel_all(&self, _device_id: u32, endpoint: u8) {
        self.cancel_calls.lock().unwrap().push(endpoint);
    }
    fn reset_endpoint(&self, _device_id: u32, endpoint: u8) {
        self.reset_calls.lock().unwrap().push(endpoint);
    }
    fn get_max_transfer_size(&self, _device_id: u32, _endpoint: u8) -> usize {
        512
    }
    fn get_current_frame(&self) -> u64 {
        1234
    }
}

fn device_descriptor_bytes() -> [u8; 18] {
    let mut buf = [0u8; 18];
    buf[0] = 18;
    buf[1] = wire::DEVICE_DESCRIPTOR;
    buf[7] = 8;
    buf[8..10].copy_from_slice(&0x1234u16.to_le_bytes());
    buf[10..12].copy_from_slice(&0x5678u16.to_le_bytes());
    buf[17] = 1;
    buf
}

const HID_MOUSE: &[u8] = &[
    9, 2, 34, 0, 1, 1, 0, 0x80, 50,
    9, 4, 0, 0, 1, 3, 1, 2, 0,
    9, 33, 0x11, 1, 0, 1, 34, 0, 52,
    7, 5, 0x81, 3, 4, 0, 10,
];

fn make_facade(hci: Arc<FakeHci>, spawner: Arc<FakeSpawner>) -> DeviceFacade {
    let device = Device::add(
        1,
        2,
        Speed::Full,
        hci,
        spawner,
        Arc::new(FakeManager),
        &OverrideTable::empty(),
    )
    .unwrap();
    DeviceFacade::new(device)
}

#[test]
fn get_device_descriptor_round_trips_ids() {
    let hci = Arc::new(FakeHci {
        device_descriptor: device_descriptor_bytes(),
        configs: vec![HID_MOUSE.to_vec()],
        ..Default::default()
    });
    let facade = make_facade(hci, Arc::new(FakeSpawner::default()));
    let desc = facade.get_device_descriptor().unwrap();
    assert_eq!(desc.id_vendor(), 0x1234);
    assert_eq!(desc.id_product(), 0x5678);
}

#[test]
fn get_config_desc_matches_size_and_rejects_unknown_value() {
    let hci = Arc::new(FakeHci {
        device_descriptor: device_descriptor_bytes(),
        configs: vec![HID_MOUSE.to_vec()],
        ..Default::default()
    });
    let facade = make_facade(hci, Arc::new(FakeSpawner::default()));

    let size = facade.get_config_desc_size(1).unwrap();
    assert_eq!(size, HID_MOUSE.len());
    let mut buf = vec![0u8; size];
    let n = facade.get_config_desc(1, &mut buf).unwrap();
    assert_eq!(n, HID_MOUSE.len());
    assert_eq!(buf, HID_MOUSE);

    assert!(matches!(
        facade.get_config_desc_size(9),
        Err(Error::InvalidArgs)
    ));
}

#[test]
fn get_config_desc_into_short_buffer_is_buffer_too_small() {
    let hci = Arc::new(FakeHci {
        device_descriptor: device_descriptor_bytes(),
        configs: vec![HID_MOUSE.to_vec()],
        ..Default::default()
    });
    let facade = make_facade(hci, Arc::new(FakeSpawner::default()));
    let mut buf = [0u8; 4];
    assert!(matches!(
        facade.get_config_desc(1, &mut buf),
        Err(Error::BufferTooSmall)
    ));
}

#[test]
fn get_configuration_reflects_active_value() {
    let hci = Arc::new(FakeHci {
        device_descriptor: device_descriptor_bytes(),
        configs: vec![HID_MOUSE.to_vec()],
        ..Default::default()
    });
    let facade = make_facade(hci, Arc::new(FakeSpawner::default()));
    assert_eq!(facade.get_configuration().unwrap(), 1);
}

#[test]
fn set_interface_delegates_to_the_owning_child() {
    let hci = Arc::new(FakeHci {
        device_descriptor: device_descriptor_bytes(),
        configs: vec![HID_MOUSE.to_vec()],
        ..Default::default()
    });
    let spawner = Arc::new(FakeSpawner::default());
    let facade = make_facade(hci, spawner.clone());

    facade.set_interface(0, 2).unwrap();
    assert_eq!(spawner.alt_settings.lock().unwrap().len(), 1);
    assert_eq!(spawner.alt_settings.lock().unwrap()[0].1, 2);

    assert!(matches!(
        facade.set_interface(9, 0),
        Err(Error::InvalidArgs)
    ));
}

#[test]
fn claim_interface_removes_the_auto_published_child() {
    let hci = Arc::new(FakeHci {
        device_descriptor: device_descriptor_bytes(),
        configs: vec![HID_MOUSE.to_vec()],
        ..Default::default()
    });
    let spawner = Arc::new(FakeSpawner::default());
    let facade = make_facade(hci, spawner.clone());

    facade.claim_interface(0).unwrap();
    assert!(matches!(facade.set_interface(0, 0), Err(Error::InvalidArgs)));
}

#[test]
fn get_string_descriptor_negotiates_lang_id_then_fetches_string() {
    let payload: Vec<u8> = "hi".encode_utf16().flat_map(u16::to_le_bytes).collect();
    let hci = Arc::new(FakeHci {
        device_descriptor: device_descriptor_bytes(),
        configs: vec![HID_MOUSE.to_vec()],
        strings: StdMutex::new(vec![(3, 0x0409, payload.clone())]),
        ..Default::default()
    });
    let facade = make_facade(hci, Arc::new(FakeSpawner::default()));

    let mut lang_id = 0u16;
    let mut buf = vec![0u8; payload.len()];
    let n = facade.get_string_descriptor(3, &mut lang_id, &mut buf).unwrap();
    assert_eq!(lang_id, 0x0409);
    assert_eq!(n, payload.len());
    assert_eq!(buf, payload);
}

#[test]
fn endpoint_passthroughs_reach_the_hci() {
    let hci = Arc::new(FakeHci {
        device_descriptor: device_descriptor_bytes(),
        configs: vec![HID_MOUSE.to_vec()],
        ..Default::default()
    });
    let facade = make_facade(hci.clone(), Arc::new(FakeSpawner::default()));

    assert_eq!(facade.get_current_frame(), 1234);
    assert_eq!(facade.get_max_transfer_size(0x81), 512);
    facade.reset_endpoint(0x81);
    facade.cancel_all(0x81);
    assert_eq!(hci.reset_calls.lock().unwrap().as_slice(), &[0x81]);
    assert_eq!(hci.cancel_calls.lock().unwrap().as_slice(), &[0x81]);
}
