//! On-the-wire USB descriptor layouts and the low-level TLV walker.
//!
//! All multi-byte descriptor fields are little-endian on the wire. They are
//! represented here as byte arrays (never as native `u16`/`u32`) so that a
//! decode always goes through an explicit `from_le_bytes`, regardless of
//! host byte order.

/// A SETUP packet as transmitted on control endpoints.
///
/// The format of this packet (and the un-Rust-like names of its fields)
/// are defined in the USB 2.0 specification, section 9.3.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
#[allow(non_snake_case)] // These names are from USB 2.0 table 9-2
pub struct SetupPacket {
    pub bmRequestType: u8,
    pub bRequest: u8,
    pub wValue: u16,
    pub wIndex: u16,
    pub wLength: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
#[allow(non_snake_case)] // These names are from USB 2.0 table 9-8
pub struct DeviceDescriptor {
    pub bLength: u8,
    pub bDescriptorType: u8,
    pub bcdUSB: [u8; 2],
    pub bDeviceClass: u8,
    pub bDeviceSubClass: u8,
    pub bDeviceProtocol: u8,
    pub bMaxPacketSize0: u8,

    pub idVendor: [u8; 2],
    pub idProduct: [u8; 2],
    pub bcdDevice: [u8; 2],
    pub iManufacturer: u8,
    pub iProduct: u8,
    pub iSerialNumber: u8,
    pub bNumConfigurations: u8,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for DeviceDescriptor {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for DeviceDescriptor {}

impl DeviceDescriptor {
    pub fn id_vendor(&self) -> u16 {
        u16::from_le_bytes(self.idVendor)
    }

    pub fn id_product(&self) -> u16 {
        u16::from_le_bytes(self.idProduct)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
#[allow(non_snake_case)] // These names are from USB 2.0 table 9-10
pub struct ConfigurationDescriptor {
    pub bLength: u8,
    pub bDescriptorType: u8,
    pub wTotalLength: [u8; 2],
    pub bNumInterfaces: u8,
    pub bConfigurationValue: u8,
    pub iConfiguration: u8,
    pub bmAttributes: u8,
    pub bMaxPower: u8,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for ConfigurationDescriptor {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for ConfigurationDescriptor {}

impl ConfigurationDescriptor {
    pub fn w_total_length(&self) -> u16 {
        u16::from_le_bytes(self.wTotalLength)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
#[allow(non_snake_case)] // These names are from USB 2.0 table 9-12
pub struct InterfaceDescriptor {
    pub bLength: u8,
    pub bDescriptorType: u8,
    pub bInterfaceNumber: u8,
    pub bAlternateSetting: u8,
    pub bNumEndpoints: u8,
    pub bInterfaceClass: u8,
    pub bInterfaceSubClass: u8,
    pub bInterfaceProtocol: u8,
    pub iInterface: u8,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for InterfaceDescriptor {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for InterfaceDescriptor {}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
#[allow(non_snake_case)] // These names are from USB 2.0 table 9-13
pub struct EndpointDescriptor {
    pub bLength: u8,
    pub bDescriptorType: u8,
    pub bEndpointAddress: u8,
    pub bmAttributes: u8,
    pub wMaxPacketSize: [u8; 2],
    pub bInterval: u8,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for EndpointDescriptor {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for EndpointDescriptor {}

/// USB 3.x-style Interface Association Descriptor (engadget 2.0 ECN).
///
/// Groups `bInterfaceCount` consecutive top-level interfaces, starting at
/// `bFirstInterface`, into one logical function (e.g. CDC-ECM's control +
/// data pair).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
#[allow(non_snake_case)]
pub struct InterfaceAssociationDescriptor {
    pub bLength: u8,
    pub bDescriptorType: u8,
    pub bFirstInterface: u8,
    pub bInterfaceCount: u8,
    pub bFunctionClass: u8,
    pub bFunctionSubClass: u8,
    pub bFunctionProtocol: u8,
    pub iFunction: u8,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for InterfaceAssociationDescriptor {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for InterfaceAssociationDescriptor {}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
#[allow(non_snake_case)] // These names are from USB 2.0 table 11-13
pub struct HubDescriptor {
    pub bDescLength: u8,
    pub bDescriptorType: u8,
    pub bNbrPorts: u8,
    pub wHubCharacteristics: [u8; 2],
    pub bPwrOn2PwrGood: u8,
    pub bHubContrCurrent: u8,
    pub device_removable: u8, // NB only for hubs up to 8 (true) ports
    pub port_pwr_ctrl_mask: u8, // NB only for hubs up to 8 (true) ports
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for HubDescriptor {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for HubDescriptor {}

// For request_type (USB 2.0 table 9-2)
pub const DEVICE_TO_HOST: u8 = 0x80;
pub const HOST_TO_DEVICE: u8 = 0;
pub const STANDARD_REQUEST: u8 = 0;
pub const CLASS_REQUEST: u8 = 0x20;
pub const VENDOR_REQUEST: u8 = 0x40;
pub const RECIPIENT_DEVICE: u8 = 0;
pub const RECIPIENT_INTERFACE: u8 = 1;
pub const RECIPIENT_ENDPOINT: u8 = 2;
pub const RECIPIENT_OTHER: u8 = 3;

// For request (USB 2.0 table 9-4)
pub const GET_STATUS: u8 = 0;
pub const CLEAR_FEATURE: u8 = 1;
pub const SET_FEATURE: u8 = 3;
pub const SET_ADDRESS: u8 = 5;
pub const GET_DESCRIPTOR: u8 = 6;
pub const SET_DESCRIPTOR: u8 = 7;
pub const GET_CONFIGURATION: u8 = 8;
pub const SET_CONFIGURATION: u8 = 9;
pub const GET_INTERFACE: u8 = 10;
pub const SET_INTERFACE: u8 = 11;

// Descriptor types (USB 2.0 table 9-5, plus the IAD ECN)
pub const DEVICE_DESCRIPTOR: u8 = 1;
pub const CONFIGURATION_DESCRIPTOR: u8 = 2;
pub const STRING_DESCRIPTOR: u8 = 3;
pub const INTERFACE_DESCRIPTOR: u8 = 4;
pub const ENDPOINT_DESCRIPTOR: u8 = 5;
pub const INTERFACE_ASSOCIATION_DESCRIPTOR: u8 = 11;
pub const HUB_DESCRIPTOR: u8 = 0x29; // USB 2.0 table 11-13

// Class codes (DeviceDescriptor.bDeviceClass)
pub const HUB_CLASSCODE: u8 = 9;

/// Visitor callback for [`parse_descriptors`].
///
/// A blanket no-op default for every callback lets implementers only
/// override the descriptor kinds they care about.
pub trait DescriptorVisitor {
    fn on_configuration(&mut self, _c: &ConfigurationDescriptor) {}
    fn on_interface_association(&mut self, _a: &InterfaceAssociationDescriptor) {}
    fn on_interface(&mut self, _i: &InterfaceDescriptor) {}
    fn on_endpoint(&mut self, _e: &EndpointDescriptor) {}
    fn on_other(&mut self, _d: &[u8]) {}
}

pub struct ShowDescriptors;

impl DescriptorVisitor for ShowDescriptors {
    fn on_configuration(&mut self, c: &ConfigurationDescriptor) {
        log::trace!("{:?}", c);
    }
    fn on_interface_association(&mut self, a: &InterfaceAssociationDescriptor) {
        log::trace!("  {:?}", a);
    }
    fn on_interface(&mut self, i: &InterfaceDescriptor) {
        log::trace!("  {:?}", i);
    }
    fn on_endpoint(&mut self, e: &EndpointDescriptor) {
        log::trace!("    {:?}", e);
    }
    fn on_other(&mut self, d: &[u8]) {
        let dlen = d[0];
        let dtype = d[1];
        let domain = match dtype & 0x60 {
            0x00 => "standard",
            0x20 => "class",
            0x40 => "vendor",
            _ => "reserved",
        };
        log::trace!("  {} type {} len {} skipped", domain, dtype, dlen);
    }
}

/// Walks a flat TLV descriptor buffer, dispatching each header to `v`.
///
/// A zero or undersized `bLength`, or a length that would run past the end
/// of `buf`, terminates the walk defensively rather than erroring: callers
/// that need `wTotalLength`-bounded walking should slice `buf` to that
/// length first (see [`crate::descriptor_store`]).
pub fn parse_descriptors(buf: &[u8], v: &mut impl DescriptorVisitor) {
    let mut index = 0;

    while buf.len() > index + 2 {
        let dlen = buf[index] as usize;
        let dtype = buf[index + 1];

        if dlen < 2 || buf.len() < index + dlen {
            return;
        }

        match dtype {
            CONFIGURATION_DESCRIPTOR => {
                if let Ok(c) = bytemuck::try_from_bytes(&buf[index..index + dlen]) {
                    v.on_configuration(c);
                }
            }
            INTERFACE_ASSOCIATION_DESCRIPTOR => {
                if let Ok(a) = bytemuck::try_from_bytes(&buf[index..index + dlen]) {
                    v.on_interface_association(a);
                }
            }
            INTERFACE_DESCRIPTOR => {
                if let Ok(i) = bytemuck::try_from_bytes(&buf[index..index + dlen]) {
                    v.on_interface(i);
                }
            }
            ENDPOINT_DESCRIPTOR => {
                if let Ok(e) = bytemuck::try_from_bytes(&buf[index..index + dlen]) {
                    v.on_endpoint(e);
                }
            }
            _ => v.on_other(&buf[index..(index + dlen)]),
        }

        index += dlen;
    }
}

#[cfg(test)]
#[path = "tests/wire.rs"]
mod tests;
