//! The Device Lifecycle (C7): enumeration, configuration switching, and
//! teardown of a single top-level USB device.

use crate::child::{ChildSpawner, DeviceManager};
use crate::control::ControlBridge;
use crate::descriptor_store::DescriptorStore;
use crate::error::{self, Error};
use crate::hci::{HostController, Speed};
use crate::interface_status::InterfaceStatusTable;
use crate::pump::CompletionPump;
use crate::queue::RequestQueueShim;
use crate::wire::{self, ConfigurationDescriptor, DeviceDescriptor};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_millis(500);

const CONFIG_HEADER_LEN: usize = std::mem::size_of::<ConfigurationDescriptor>();

/// `(idVendor, idProduct, configuration)` rows, checked in order against a
/// newly enumerated device's ids; the first match picks the configuration
/// to select instead of the default (1). The baseline keeps the Realtek
/// 0x0BDA:0x8153 row forced to configuration 2 and a terminating zero row,
/// both of which callers must not remove.
const DEFAULT_OVERRIDES: &[(u16, u16, u8)] = &[(0x0BDA, 0x8153, 2), (0, 0, 0)];

pub struct OverrideTable(Vec<(u16, u16, u8)>);

impl Default for OverrideTable {
    fn default() -> Self {
        Self(DEFAULT_OVERRIDES.to_vec())
    }
}

impl OverrideTable {
    /// An empty table with only the terminating row — useful for tests
    /// that don't want the baseline Realtek row to apply.
    pub fn empty() -> Self {
        Self(vec![(0, 0, 0)])
    }

    /// Appends a row ahead of the terminating zero row.
    pub fn add(&mut self, vendor_id: u16, product_id: u16, configuration: u8) {
        let last = self.0.len() - 1;
        self.0.insert(last, (vendor_id, product_id, configuration));
    }

    pub fn lookup(&self, vendor_id: u16, product_id: u16) -> Option<u8> {
        self.0[..self.0.len() - 1]
            .iter()
            .find(|&&(v, p, _)| v == vendor_id && p == product_id)
            .map(|&(_, _, cfg)| cfg)
    }
}

/// A single enumerated top-level USB device. Owns its descriptor blobs,
/// interface arbitration table, control-transfer bridge, and completion
/// pump for the device's lifetime.
pub struct Device {
    device_id: u32,
    hub_id: u32,
    speed: Speed,
    descriptors: Mutex<DescriptorStore>,
    table: InterfaceStatusTable,
    control: ControlBridge,
    queue: RequestQueueShim,
    pump: Arc<CompletionPump>,
    spawner: Arc<dyn ChildSpawner>,
    manager: Arc<dyn DeviceManager>,
}

fn read_config_header(
    control: &ControlBridge,
    index: u8,
) -> Result<([u8; CONFIG_HEADER_LEN], ConfigurationDescriptor), Error> {
    let mut buf = [0u8; CONFIG_HEADER_LEN];
    let n = control.control(
        wire::DEVICE_TO_HOST | wire::STANDARD_REQUEST | wire::RECIPIENT_DEVICE,
        wire::GET_DESCRIPTOR,
        (wire::CONFIGURATION_DESCRIPTOR as u16) << 8 | index as u16,
        0,
        &mut buf,
        CONFIG_HEADER_LEN as u16,
        DEFAULT_CONTROL_TIMEOUT,
    )?;
    if n < CONFIG_HEADER_LEN {
        return Err(Error::Io);
    }
    let header: ConfigurationDescriptor = *bytemuck::from_bytes(&buf);
    Ok((buf, header))
}

impl Device {
    /// Enumerates a newly detected device and publishes it: reads the
    /// device and configuration descriptors, picks a configuration,
    /// issues `SET_CONFIGURATION`, starts the completion pump, publishes
    /// through the device manager, then walks the active configuration to
    /// spawn children.
    pub fn add(
        hub_id: u32,
        device_id: u32,
        speed: Speed,
        hci: Arc<dyn HostController>,
        spawner: Arc<dyn ChildSpawner>,
        manager: Arc<dyn DeviceManager>,
        overrides: &OverrideTable,
    ) -> Result<Arc<Self>, Error> {
        let control = ControlBridge::new(device_id, hci);

        let mut device_buf = [0u8; std::mem::size_of::<DeviceDescriptor>()];
        let n = control.control(
            wire::DEVICE_TO_HOST | wire::STANDARD_REQUEST | wire::RECIPIENT_DEVICE,
            wire::GET_DESCRIPTOR,
            (wire::DEVICE_DESCRIPTOR as u16) << 8,
            0,
            &mut device_buf,
            device_buf.len() as u16,
            DEFAULT_CONTROL_TIMEOUT,
        )?;
        if n < device_buf.len() {
            return Err(Error::Io);
        }
        let device_descriptor: DeviceDescriptor = *bytemuck::from_bytes(&device_buf);
        log::debug!(
            "device {} enumerating: vendor={:#06x} product={:#06x} configs={}",
            device_id,
            device_descriptor.id_vendor(),
            device_descriptor.id_product(),
            device_descriptor.bNumConfigurations
        );

        let mut configs = Vec::with_capacity(device_descriptor.bNumConfigurations as usize);
        for index in 0..device_descriptor.bNumConfigurations {
            let (_, header) = read_config_header(&control, index)?;
            let total_len = header.w_total_length() as usize;
            let mut blob = vec![0u8; total_len];
            let n = control.control(
                wire::DEVICE_TO_HOST | wire::STANDARD_REQUEST | wire::RECIPIENT_DEVICE,
                wire::GET_DESCRIPTOR,
                (wire::CONFIGURATION_DESCRIPTOR as u16) << 8 | index as u16,
                0,
                &mut blob,
                total_len as u16,
                DEFAULT_CONTROL_TIMEOUT,
            )?;
            if n < total_len {
                return Err(Error::Io);
            }
            if log::log_enabled!(log::Level::Trace) {
                wire::parse_descriptors(&blob, &mut wire::ShowDescriptors);
            }
            configs.push(blob);
        }

        let configuration = overrides
            .lookup(device_descriptor.id_vendor(), device_descriptor.id_product())
            .unwrap_or(1);
        if configuration == 0 || configuration as usize > configs.len() {
            return Err(Error::Internal(
                "override table points past bNumConfigurations",
            ));
        }
        let current_config_index = (configuration - 1) as usize;
        log::debug!("device {} selecting configuration {}", device_id, configuration);

        control.control(
            wire::HOST_TO_DEVICE | wire::STANDARD_REQUEST | wire::RECIPIENT_DEVICE,
            wire::SET_CONFIGURATION,
            configuration as u16,
            0,
            &mut [],
            0,
            DEFAULT_CONTROL_TIMEOUT,
        )?;

        let num_interfaces = {
            let header: &ConfigurationDescriptor =
                bytemuck::from_bytes(&configs[current_config_index][..CONFIG_HEADER_LEN]);
            header.bNumInterfaces as usize
        };

        // Start the pump before publishing: publishing may recursively
        // bind drivers that immediately queue transfers.
        let pump = Arc::new(CompletionPump::start());
        let queue = RequestQueueShim::new(device_id, control.hci(), pump.clone());
        let table = InterfaceStatusTable::new(num_interfaces);
        let descriptors = Mutex::new(DescriptorStore::new(
            device_descriptor,
            configs,
            current_config_index,
        ));

        let device = Arc::new(Self {
            device_id,
            hub_id,
            speed,
            descriptors,
            table,
            control,
            queue,
            pump,
            spawner,
            manager,
        });

        device.manager.publish(
            device_id,
            device_descriptor.id_vendor(),
            device_descriptor.id_product(),
            device_descriptor.bDeviceClass,
            device_descriptor.bDeviceSubClass,
            device_descriptor.bDeviceProtocol,
        )?;

        device.spawn_children()?;
        log::debug!("device {} published", device_id);

        Ok(device)
    }

    fn spawn_children(&self) -> Result<(), Error> {
        let (parent, active) = {
            let descriptors = self.descriptors.lock().map_err(error::poisoned)?;
            (*descriptors.device_descriptor(), descriptors.active().to_vec())
        };
        crate::walker::walk(&parent, &active, &self.table, self.spawner.as_ref())
    }

    /// Resolves `value` to a configuration, issues `SET_CONFIGURATION`, then
    /// synchronously tears down the old children, resizes the status
    /// table, and re-walks the new configuration — all complete before
    /// this returns successfully.
    pub fn set_configuration(&self, value: u8) -> Result<(), Error> {
        log::debug!("device {} switching to configuration {}", self.device_id, value);
        let (index, num_interfaces) = {
            let descriptors = self.descriptors.lock().map_err(error::poisoned)?;
            let index = descriptors.index_for(value).ok_or(Error::InvalidArgs)?;
            let header: &ConfigurationDescriptor =
                bytemuck::from_bytes(&descriptors.blob_at(index)[..CONFIG_HEADER_LEN]);
            (index, header.bNumInterfaces as usize)
        };

        self.control.control(
            wire::HOST_TO_DEVICE | wire::STANDARD_REQUEST | wire::RECIPIENT_DEVICE,
            wire::SET_CONFIGURATION,
            value as u16,
            0,
            &mut [],
            0,
            DEFAULT_CONTROL_TIMEOUT,
        )?;

        {
            let mut descriptors = self.descriptors.lock().map_err(error::poisoned)?;
            descriptors.set_current_config_index(index)?;
        }

        self.table.reset_all(num_interfaces, self.spawner.as_ref())?;
        self.spawn_children()
    }

    /// Explicitly claims `iid` on behalf of a composite sibling driver,
    /// tearing down any auto-published child first. Fails with
    /// `AlreadyBound` if another claim already holds the interface.
    pub fn claim_interface(&self, iid: u8) -> Result<(), Error> {
        log::debug!("device {} claiming interface {}", self.device_id, iid);
        self.table.claim(iid, self.spawner.as_ref())
    }

    /// Tears down every child, then requests removal of this node.
    pub fn unbind(&self) -> Result<(), Error> {
        log::debug!("device {} unbinding", self.device_id);
        let len = self.table.len()?;
        self.table.reset_all(len, self.spawner.as_ref())?;
        self.manager.remove(self.device_id);
        Ok(())
    }

    /// Stops the pump (guaranteeing no client callback runs afterward) and
    /// frees the cached descriptors and status table.
    pub fn release(&self) -> Result<(), Error> {
        self.pump.shutdown()
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    pub fn hub_id(&self) -> u32 {
        self.hub_id
    }

    pub fn speed(&self) -> Speed {
        self.speed
    }

    pub(crate) fn control(&self) -> &ControlBridge {
        &self.control
    }

    pub(crate) fn queue(&self) -> &RequestQueueShim {
        &self.queue
    }

    pub(crate) fn table(&self) -> &InterfaceStatusTable {
        &self.table
    }

    pub(crate) fn descriptors(&self) -> &Mutex<DescriptorStore> {
        &self.descriptors
    }

    pub(crate) fn spawner(&self) -> &dyn ChildSpawner {
        self.spawner.as_ref()
    }
}

#[cfg(test)]
#[path = "tests/device.rs"]
mod tests;
