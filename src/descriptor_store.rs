//! The Descriptor Store (C1): owns a device's descriptor blobs and the
//! lazily-fetched language-ID cache.

use crate::error::{self, Error};
use crate::wire::{ConfigurationDescriptor, DeviceDescriptor};
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::Mutex;

/// A one-shot, lazily-initialized, lock-free-to-read cache of a device's
/// supported string-descriptor language IDs.
///
/// Readers check `fetched` first (Acquire); once true, the pointer is
/// stable for the device's lifetime (data-model invariant 6) and can be
/// dereferenced without further synchronization. Only one thread is ever
/// allowed to actually populate the cache — callers serialize the HCI round
/// trip themselves (see [`DescriptorStore::lang_ids_or_fetch_with`]) — so
/// `publish` never races with itself.
pub struct LangIdCache {
    fetched: AtomicBool,
    data: AtomicPtr<Vec<u16>>,
}

impl Default for LangIdCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LangIdCache {
    pub const fn new() -> Self {
        Self {
            fetched: AtomicBool::new(false),
            data: AtomicPtr::new(std::ptr::null_mut()),
        }
    }

    pub fn get(&self) -> Option<&[u16]> {
        if self.fetched.load(Ordering::Acquire) {
            let p = self.data.load(Ordering::Acquire);
            debug_assert!(!p.is_null());
            Some(unsafe { &*p })
        } else {
            None
        }
    }

    /// Publishes `ids` as the cached value. Must only ever be called once
    /// per cache (the caller is responsible for serializing concurrent
    /// fetches so this invariant holds).
    fn publish(&self, ids: Vec<u16>) -> &[u16] {
        let boxed = Box::into_raw(Box::new(ids));
        self.data.store(boxed, Ordering::Release);
        self.fetched.store(true, Ordering::Release);
        unsafe { &*boxed }
    }
}

impl Drop for LangIdCache {
    fn drop(&mut self) {
        let p = *self.data.get_mut();
        if !p.is_null() {
            unsafe {
                drop(Box::from_raw(p));
            }
        }
    }
}

/// Owns the immutable device descriptor, the array of configuration blobs,
/// the active-configuration index and the language-ID cache.
pub struct DescriptorStore {
    device: DeviceDescriptor,
    configs: Vec<Vec<u8>>,
    current_config_index: usize,
    lang_ids: LangIdCache,
    fetch_gate: Mutex<()>,
}

impl DescriptorStore {
    pub fn new(
        device: DeviceDescriptor,
        configs: Vec<Vec<u8>>,
        current_config_index: usize,
    ) -> Self {
        Self {
            device,
            configs,
            current_config_index,
            lang_ids: LangIdCache::new(),
            fetch_gate: Mutex::new(()),
        }
    }

    pub fn device_descriptor(&self) -> &DeviceDescriptor {
        &self.device
    }

    /// Looks up the configuration blob whose header's `bConfigurationValue`
    /// matches `value`.
    pub fn descriptor_for(&self, value: u8) -> Option<&[u8]> {
        self.configs.iter().find_map(|blob| {
            let header: &ConfigurationDescriptor = bytemuck::try_from_bytes(
                &blob[..std::mem::size_of::<ConfigurationDescriptor>()],
            )
            .ok()?;
            (header.bConfigurationValue == value).then_some(blob.as_slice())
        })
    }

    pub fn active(&self) -> &[u8] {
        &self.configs[self.current_config_index]
    }

    pub fn blob_at(&self, index: usize) -> &[u8] {
        &self.configs[index]
    }

    /// Resolves a `bConfigurationValue` to its array index.
    pub fn index_for(&self, value: u8) -> Option<usize> {
        self.configs.iter().position(|blob| {
            let Ok(header) = bytemuck::try_from_bytes::<ConfigurationDescriptor>(
                &blob[..std::mem::size_of::<ConfigurationDescriptor>()],
            ) else {
                return false;
            };
            header.bConfigurationValue == value
        })
    }

    pub fn current_config_index(&self) -> usize {
        self.current_config_index
    }

    pub fn num_configurations(&self) -> usize {
        self.configs.len()
    }

    /// Switches the active configuration. Returns `InvalidArgs` if `index`
    /// is out of range.
    pub fn set_current_config_index(&mut self, index: usize) -> Result<(), Error> {
        if index >= self.configs.len() {
            return Err(Error::InvalidArgs);
        }
        self.current_config_index = index;
        Ok(())
    }

    pub fn lang_ids(&self) -> Option<&[u16]> {
        self.lang_ids.get()
    }

    /// Returns the cached language-ID table, fetching it via `fetch` on
    /// first call. `fetch` is only ever invoked by the single thread that
    /// wins the internal gate; concurrent callers block briefly on that
    /// gate rather than racing the HCI round trip.
    pub fn lang_ids_or_fetch_with(
        &self,
        fetch: impl FnOnce() -> Result<Vec<u16>, Error>,
    ) -> Result<&[u16], Error> {
        if let Some(ids) = self.lang_ids.get() {
            return Ok(ids);
        }
        let _guard = self.fetch_gate.lock().map_err(error::poisoned)?;
        if let Some(ids) = self.lang_ids.get() {
            return Ok(ids);
        }
        let ids = fetch()?;
        Ok(self.lang_ids.publish(ids))
    }
}

#[cfg(test)]
#[path = "tests/descriptor_store.rs"]
mod tests;
