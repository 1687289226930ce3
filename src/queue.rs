//! The Request Queue Shim (C5): intercepts client-submitted asynchronous
//! transfers to insert the Completion Pump's trampoline, then forwards to
//! the HCI.

use crate::hci::{HostController, Request};
use crate::pump::CompletionPump;
use std::sync::Arc;

pub struct RequestQueueShim {
    device_id: u32,
    hci: Arc<dyn HostController>,
    pump: Arc<CompletionPump>,
}

impl RequestQueueShim {
    pub fn new(device_id: u32, hci: Arc<dyn HostController>, pump: Arc<CompletionPump>) -> Self {
        Self {
            device_id,
            hci,
            pump,
        }
    }

    /// Stamps `req.device_id`, saves the caller's completion callback,
    /// substitutes the trampoline, and forwards to the HCI. All
    /// client-asynchronous transfers go through this shim; control
    /// transfers bypass it entirely (see [`crate::control`]).
    pub fn queue(&self, mut req: Request) {
        req.device_id = self.device_id;

        // First swap installs a throwaway callback just to recover the
        // client's real one; the second swap installs the real trampoline,
        // which closes over the callback just recovered.
        let saved = req.set_callback(|_req, _status| {});
        let Some(saved) = saved else {
            // A request with no callback installed at all can't be routed
            // through the pump meaningfully; submit it unchanged.
            self.hci.request_queue(req);
            return;
        };

        let pump = self.pump.clone();
        req.set_callback(move |req, status| {
            pump.produce(req, status, saved);
        });

        self.hci.request_queue(req);
    }
}

#[cfg(test)]
#[path = "tests/queue.rs"]
mod tests;
