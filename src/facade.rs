//! The Device Protocol Facade (C8): the thin public surface client drivers
//! actually call. Reads hit the Descriptor Store (C1) directly; writes that
//! change topology re-invoke the Device Lifecycle (C7).

use crate::device::Device;
use crate::error::{self, Error};
use crate::hci::Speed;
use crate::wire::{self, ConfigurationDescriptor, DeviceDescriptor};
use std::sync::Arc;
use std::time::Duration;

const STRING_DESCRIPTOR_HEADER_LEN: usize = 2;
const DEFAULT_TIMEOUT: Duration = crate::device::DEFAULT_CONTROL_TIMEOUT;

/// Distinguishes this node (a top-level device) from the interface nodes
/// client drivers bind to — useful to callers that walk the bus tree
/// generically and need to know which kind of node they're holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Device,
    Interface,
}

/// Wraps a published [`Device`] with the public operations client drivers
/// use day to day.
pub struct DeviceFacade {
    device: Arc<Device>,
}

impl DeviceFacade {
    pub fn new(device: Arc<Device>) -> Self {
        Self { device }
    }

    pub fn get_device_type(&self) -> NodeKind {
        NodeKind::Device
    }

    pub fn get_device_speed(&self) -> Speed {
        self.device.speed()
    }

    pub fn get_device_id(&self) -> u32 {
        self.device.device_id()
    }

    pub fn get_device_hub_id(&self) -> u32 {
        self.device.hub_id()
    }

    pub fn get_device_descriptor(&self) -> Result<DeviceDescriptor, Error> {
        let descriptors = self.device.descriptors().lock().map_err(error::poisoned)?;
        Ok(*descriptors.device_descriptor())
    }

    pub fn get_config_desc_size(&self, value: u8) -> Result<usize, Error> {
        let descriptors = self.device.descriptors().lock().map_err(error::poisoned)?;
        descriptors
            .descriptor_for(value)
            .map(<[u8]>::len)
            .ok_or(Error::InvalidArgs)
    }

    pub fn get_config_desc(&self, value: u8, buf: &mut [u8]) -> Result<usize, Error> {
        let descriptors = self.device.descriptors().lock().map_err(error::poisoned)?;
        let blob = descriptors.descriptor_for(value).ok_or(Error::InvalidArgs)?;
        copy_whole(blob, buf)
    }

    pub fn get_descriptors_size(&self) -> Result<usize, Error> {
        let descriptors = self.device.descriptors().lock().map_err(error::poisoned)?;
        Ok(descriptors.active().len())
    }

    pub fn get_descriptors(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let descriptors = self.device.descriptors().lock().map_err(error::poisoned)?;
        copy_whole(descriptors.active(), buf)
    }

    pub fn get_configuration(&self) -> Result<u8, Error> {
        let descriptors = self.device.descriptors().lock().map_err(error::poisoned)?;
        let header: &ConfigurationDescriptor = bytemuck::from_bytes(
            &descriptors.active()[..std::mem::size_of::<ConfigurationDescriptor>()],
        );
        Ok(header.bConfigurationValue)
    }

    pub fn set_configuration(&self, value: u8) -> Result<(), Error> {
        self.device.set_configuration(value)
    }

    pub fn set_interface(&self, iid: u8, alt: u8) -> Result<(), Error> {
        let child = self
            .device
            .table()
            .child_for(iid)?
            .ok_or(Error::InvalidArgs)?;
        self.device.spawner().set_alt_setting(child, alt)
    }

    /// Explicitly claims interface `iid` for a composite sibling driver
    /// instead of letting it auto-publish as its own child device.
    pub fn claim_interface(&self, iid: u8) -> Result<(), Error> {
        self.device.claim_interface(iid)
    }

    /// Fetches and caches the device's supported language list on first
    /// call, then fetches the string named by `desc_id` in the negotiated
    /// language. `*lang_id == 0` means "let the device pick"; the id
    /// actually used is written back.
    pub fn get_string_descriptor(
        &self,
        desc_id: u8,
        lang_id: &mut u16,
        buf: &mut [u8],
    ) -> Result<usize, Error> {
        let control = self.device.control();
        let negotiated = {
            let descriptors = self.device.descriptors().lock().map_err(error::poisoned)?;
            let langs = descriptors.lang_ids_or_fetch_with(|| fetch_lang_ids(control))?;
            if *lang_id == 0 {
                *langs.first().ok_or(Error::NotSupported)?
            } else {
                *lang_id
            }
        };
        *lang_id = negotiated;

        let payload = fetch_string_payload(control, desc_id, negotiated)?;
        copy_whole(&payload, buf)
    }

    pub fn get_current_frame(&self) -> u64 {
        self.device.control().hci().get_current_frame()
    }

    pub fn reset_endpoint(&self, endpoint: u8) {
        self.device
            .control()
            .hci()
            .reset_endpoint(self.device.device_id(), endpoint);
    }

    pub fn cancel_all(&self, endpoint: u8) {
        self.device
            .control()
            .hci()
            .cancel_all(self.device.device_id(), endpoint);
    }

    pub fn get_max_transfer_size(&self, endpoint: u8) -> usize {
        self.device
            .control()
            .hci()
            .get_max_transfer_size(self.device.device_id(), endpoint)
    }
}

/// Copies `src` into `buf` whole, or fails with `BufferTooSmall` without
/// touching `buf` at all — info ops never return a truncated prefix.
fn copy_whole(src: &[u8], buf: &mut [u8]) -> Result<usize, Error> {
    if buf.len() < src.len() {
        return Err(Error::BufferTooSmall);
    }
    buf[..src.len()].copy_from_slice(src);
    Ok(src.len())
}

fn fetch_lang_ids(control: &crate::control::ControlBridge) -> Result<Vec<u16>, Error> {
    let mut header = [0u8; STRING_DESCRIPTOR_HEADER_LEN];
    control.control(
        wire::DEVICE_TO_HOST | wire::STANDARD_REQUEST | wire::RECIPIENT_DEVICE,
        wire::GET_DESCRIPTOR,
        (wire::STRING_DESCRIPTOR as u16) << 8,
        0,
        &mut header,
        header.len() as u16,
        DEFAULT_TIMEOUT,
    )?;
    let total_len = header[0] as usize;
    let mut blob = vec![0u8; total_len];
    control.control(
        wire::DEVICE_TO_HOST | wire::STANDARD_REQUEST | wire::RECIPIENT_DEVICE,
        wire::GET_DESCRIPTOR,
        (wire::STRING_DESCRIPTOR as u16) << 8,
        0,
        &mut blob,
        total_len as u16,
        DEFAULT_TIMEOUT,
    )?;
    let ids = blob[STRING_DESCRIPTOR_HEADER_LEN..]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    Ok(ids)
}

fn fetch_string_payload(
    control: &crate::control::ControlBridge,
    desc_id: u8,
    lang_id: u16,
) -> Result<Vec<u8>, Error> {
    let mut header = [0u8; STRING_DESCRIPTOR_HEADER_LEN];
    control.control(
        wire::DEVICE_TO_HOST | wire::STANDARD_REQUEST | wire::RECIPIENT_DEVICE,
        wire::GET_DESCRIPTOR,
        (wire::STRING_DESCRIPTOR as u16) << 8 | desc_id as u16,
        lang_id,
        &mut header,
        header.len() as u16,
        DEFAULT_TIMEOUT,
    )?;
    let total_len = header[0] as usize;
    let mut blob = vec![0u8; total_len];
    control.control(
        wire::DEVICE_TO_HOST | wire::STANDARD_REQUEST | wire::RECIPIENT_DEVICE,
        wire::GET_DESCRIPTOR,
        (wire::STRING_DESCRIPTOR as u16) << 8 | desc_id as u16,
        lang_id,
        &mut blob,
        total_len as u16,
        DEFAULT_TIMEOUT,
    )?;
    Ok(blob[STRING_DESCRIPTOR_HEADER_LEN..].to_vec())
}

#[cfg(test)]
#[path = "tests/facade.rs"]
mod tests;
