//! A bound on outstanding zero-length control requests.
//!
//! Adapted from the allocate-or-wait bitmap [`Pool`](crate::bitset) pattern:
//! rather than handing out a bit index into a fixed-size slot array, this
//! hands out permission to build one more zero-length [`Request`], up to
//! `cap` outstanding at a time. A zero-length request carries no buffer, so
//! there is nothing to reuse across acquisitions; what is worth bounding is
//! the number of them in flight.
//!
//! The bridge (C4) only ever *tries* to acquire: on exhaustion it falls
//! back to an unpooled request rather than blocking, since the free list
//! exists to avoid churn in the common case, not to enforce a hard cap.

use crate::hci::{Request, RequestBuffer};
use crate::wire::SetupPacket;
use std::sync::Mutex;

pub struct ZeroLengthPool {
    in_use: Mutex<usize>,
    cap: usize,
}

impl ZeroLengthPool {
    pub fn new(cap: usize) -> Self {
        Self {
            in_use: Mutex::new(0),
            cap,
        }
    }

    /// Builds a zero-length control request for `device_id`/`setup`,
    /// counting it against the pool if there is room.
    ///
    /// A poisoned count is logged and recovered from rather than surfaced:
    /// the count is an in-flight tally, not an invariant-carrying structure,
    /// so a stale or reset count is no worse than the exhaustion case this
    /// pool already falls back from.
    pub fn acquire(&self, device_id: u32, setup: SetupPacket) -> Request {
        let mut in_use = self.in_use.lock().unwrap_or_else(|e| {
            log::warn!("zero-length pool count mutex poisoned, recovering");
            e.into_inner()
        });
        if *in_use < self.cap {
            *in_use += 1;
        }
        Request::control(device_id, setup, RequestBuffer::None)
    }

    /// Releases a zero-length request's slot back to the pool.
    pub fn release(&self) {
        let mut in_use = self.in_use.lock().unwrap_or_else(|e| {
            log::warn!("zero-length pool count mutex poisoned, recovering");
            e.into_inner()
        });
        *in_use = in_use.saturating_sub(1);
    }

    pub fn in_use(&self) -> usize {
        *self.in_use.lock().unwrap_or_else(|e| {
            log::warn!("zero-length pool count mutex poisoned, recovering");
            e.into_inner()
        })
    }
}

#[cfg(test)]
#[path = "tests/pool.rs"]
mod tests;
