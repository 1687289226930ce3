//! The Descriptor Walker (C3): turns a configuration blob into published
//! child devices.
//!
//! Classification is by `bDescriptorType`, looking only at the top level: an
//! Interface Association Descriptor claims a run of whole interfaces for one
//! logical function; a top-level interface (`bAlternateSetting == 0`) claims
//! itself and every alternate-setting/class-specific descriptor that follows
//! it, up to the next top-level interface or association.

use crate::bitset::BitSet;
use crate::child::ChildSpawner;
use crate::error::Error;
use crate::interface_status::{InterfaceStatus, InterfaceStatusTable};
use crate::wire::{
    DeviceDescriptor, InterfaceAssociationDescriptor, InterfaceDescriptor,
    INTERFACE_ASSOCIATION_DESCRIPTOR, INTERFACE_DESCRIPTOR,
};

fn header(buf: &[u8], index: usize) -> Option<(usize, u8)> {
    if buf.len() < index + 2 {
        return None;
    }
    let dlen = buf[index] as usize;
    let dtype = buf[index + 1];
    if dlen < 2 || buf.len() < index + dlen {
        return None;
    }
    Some((dlen, dtype))
}

fn interface_at(buf: &[u8], index: usize, dlen: usize) -> Option<InterfaceDescriptor> {
    bytemuck::try_from_bytes::<InterfaceDescriptor>(&buf[index..index + dlen])
        .ok()
        .copied()
}

/// Gathers a contiguous top-level interface and everything belonging to it
/// (alternates, class-specific descriptors) and returns the end offset.
fn gather_interface_group(buf: &[u8], start: usize, first_len: usize) -> usize {
    let mut pos = start + first_len;
    loop {
        let Some((dlen, dtype)) = header(buf, pos) else {
            return pos;
        };
        if dtype == INTERFACE_ASSOCIATION_DESCRIPTOR {
            return pos;
        }
        if dtype == INTERFACE_DESCRIPTOR {
            if let Some(iface) = interface_at(buf, pos, dlen) {
                if iface.bAlternateSetting == 0 {
                    return pos;
                }
            }
        }
        pos += dlen;
    }
}

/// Gathers the run of interfaces named by an association, stopping once
/// `count` distinct top-level interfaces have been seen, another
/// association begins, or the blob ends.
fn gather_association_group(buf: &[u8], start: usize, count: u8) -> usize {
    let mut pos = start;
    let mut seen = 0u8;
    while seen < count {
        let Some((dlen, dtype)) = header(buf, pos) else {
            return pos;
        };
        if dtype == INTERFACE_ASSOCIATION_DESCRIPTOR {
            return pos;
        }
        if dtype == INTERFACE_DESCRIPTOR {
            if let Some(iface) = interface_at(buf, pos, dlen) {
                if iface.bAlternateSetting == 0 {
                    seen += 1;
                }
            }
        }
        pos += dlen;
    }
    pos
}

/// Walks `config` (the full configuration blob, header included) and
/// publishes child devices through `spawner`, updating `table` for
/// per-interface (not association) children.
///
/// Returns the last non-OK status from a failed child spawn, if any;
/// earlier interfaces still got their chance (best-effort enumeration).
/// Returns `BadState` immediately, abandoning the rest of the walk, if the
/// same interface number reappears as a second top-level group — that can
/// only mean its alternate settings were not contiguous.
pub fn walk(
    parent: &DeviceDescriptor,
    config: &[u8],
    table: &InterfaceStatusTable,
    spawner: &dyn ChildSpawner,
) -> Result<(), Error> {
    let mut index = match header(config, 0) {
        Some((dlen, _)) => dlen,
        None => return Ok(()),
    };
    let table_len = table.len()?;
    let mut seen_iids = BitSet::new();
    let mut last_err = None;

    while let Some((dlen, dtype)) = header(config, index) {
        match dtype {
            INTERFACE_ASSOCIATION_DESCRIPTOR => {
                let Some(iad) =
                    bytemuck::try_from_bytes::<InterfaceAssociationDescriptor>(
                        &config[index..index + dlen],
                    )
                    .ok()
                else {
                    index += dlen;
                    continue;
                };
                if iad.bInterfaceCount == 0 {
                    index += dlen;
                    continue;
                }
                let start = index;
                let end = gather_association_group(config, index + dlen, iad.bInterfaceCount);
                let blob = &config[start..end];
                match spawner.spawn_association(
                    parent,
                    iad.bFirstInterface,
                    iad.bInterfaceCount,
                    blob,
                ) {
                    Ok(child) => {
                        // Association children don't occupy a per-interface
                        // status slot: status transitions only happen on the
                        // per-interface branch below. They still need tearing
                        // down on reconfiguration, so the table tracks them
                        // separately.
                        table.mark_association(child)?;
                    }
                    Err(e) => {
                        log::debug!(
                            "association starting at interface {} failed to spawn: {:?}",
                            iad.bFirstInterface,
                            e
                        );
                        last_err = Some(e);
                    }
                }
                index = end;
            }
            INTERFACE_DESCRIPTOR => {
                let Some(iface) = interface_at(config, index, dlen) else {
                    index += dlen;
                    continue;
                };
                if iface.bAlternateSetting != 0 {
                    // Structurally shouldn't happen at walker level; skip
                    // defensively rather than mis-grouping it.
                    index += dlen;
                    continue;
                }
                let iid = iface.bInterfaceNumber;
                if seen_iids.contains(iid) {
                    log::warn!(
                        "interface {} reappeared as a second top-level group, aborting walk",
                        iid
                    );
                    return Err(Error::BadState);
                }
                seen_iids.set(iid);

                let end = gather_interface_group(config, index, dlen);

                if iid as usize >= table_len {
                    log::warn!(
                        "interface {} falls outside the {}-entry status table, skipping",
                        iid,
                        table_len
                    );
                    last_err = Some(Error::BadState);
                    index = end;
                    continue;
                }

                let start = index;
                let blob = &config[start..end];

                if iface.bInterfaceClass == crate::wire::HUB_CLASSCODE {
                    table.set_hub(iid)?;
                }

                if table.status(iid)? == InterfaceStatus::Available {
                    match spawner.spawn_interface(parent, iid, blob) {
                        Ok(child) => {
                            if table.status(iid)? == InterfaceStatus::Claimed {
                                log::debug!(
                                    "interface {} was claimed while its child was spawning, tearing it down",
                                    iid
                                );
                                spawner.remove(child);
                            } else {
                                table.mark_child(iid, child)?;
                            }
                        }
                        Err(e) => {
                            log::debug!("interface {} failed to spawn: {:?}", iid, e);
                            last_err = Some(e);
                        }
                    }
                }
                index = end;
            }
            _ => {
                index += dlen;
            }
        }
    }

    match last_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
#[path = "tests/walker.rs"]
mod tests;
