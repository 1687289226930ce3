//! The Control Transfer Bridge (C4): turns the HCI's asynchronous
//! completion model into a synchronous call on endpoint 0, with a timeout
//! and mandatory cancel-and-drain.

use crate::error::{self, Error};
use crate::hci::{Completion, HostController, Request, RequestBuffer};
use crate::pool::ZeroLengthPool;
use crate::wire::SetupPacket;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

struct Signal {
    result: Mutex<Option<(Request, Completion)>>,
    condvar: Condvar,
}

impl Signal {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(None),
            condvar: Condvar::new(),
        })
    }

    /// Called from the HCI's own completion context, which has no `Result`
    /// channel of its own to report a poisoned lock through; the waiting
    /// side of the signal surfaces the poisoning instead (see
    /// [`Self::wait_timeout`]/[`Self::drain`]), so this recovers and
    /// delivers the completion rather than leaving the waiter stuck.
    fn post(&self, req: Request, result: Completion) {
        let mut slot = match self.result.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::error!("control signal mutex poisoned while posting a completion");
                poisoned.into_inner()
            }
        };
        *slot = Some((req, result));
        self.condvar.notify_one();
    }

    /// Waits up to `timeout` for a result. Returns `Ok(None)` on timeout,
    /// leaving the signal ready to be waited on again by [`Self::drain`].
    fn wait_timeout(&self, timeout: Duration) -> Result<Option<(Request, Completion)>, Error> {
        let guard = self.result.lock().map_err(error::poisoned)?;
        let (mut guard, _) = self
            .condvar
            .wait_timeout_while(guard, timeout, |r| r.is_none())
            .map_err(error::poisoned)?;
        Ok(guard.take())
    }

    /// Waits with no deadline; used for the mandatory post-cancel drain, so
    /// the request's buffer is never touched by the HCI again after this
    /// call returns.
    fn drain(&self) -> Result<(Request, Completion), Error> {
        let guard = self.result.lock().map_err(error::poisoned)?;
        let mut guard = self
            .condvar
            .wait_while(guard, |r| r.is_none())
            .map_err(error::poisoned)?;
        Ok(guard.take().expect("drain always observes a result"))
    }
}

/// Bridges synchronous control transfers for one device onto its HCI.
pub struct ControlBridge {
    device_id: u32,
    hci: Arc<dyn HostController>,
    zero_length: ZeroLengthPool,
}

impl ControlBridge {
    pub fn new(device_id: u32, hci: Arc<dyn HostController>) -> Self {
        Self {
            device_id,
            hci,
            zero_length: ZeroLengthPool::new(4),
        }
    }

    /// Issues a control transfer on endpoint 0 and blocks until it
    /// completes or `timeout` elapses.
    ///
    /// Submission bypasses the Request Queue Shim and calls the HCI
    /// directly: the control path is synchronous and already serialized by
    /// this call's own wait, and skipping the Completion Pump avoids a
    /// reentrancy deadlock when the caller is internal enumeration code
    /// holding setup-critical locks.
    #[allow(clippy::too_many_arguments)]
    pub fn control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &mut [u8],
        length: u16,
        timeout: Duration,
    ) -> Result<usize, Error> {
        let setup = SetupPacket {
            bmRequestType: request_type,
            bRequest: request,
            wValue: value,
            wIndex: index,
            wLength: length,
        };

        let is_in = request_type & crate::wire::DEVICE_TO_HOST != 0;

        let mut req = if length == 0 {
            self.zero_length.acquire(self.device_id, setup)
        } else if is_in {
            Request::control(self.device_id, setup, RequestBuffer::In(vec![0u8; length as usize]))
        } else {
            Request::control(
                self.device_id,
                setup,
                RequestBuffer::Out(data[..length as usize].to_vec()),
            )
        };

        let signal = Signal::new();
        let on_complete = {
            let signal = signal.clone();
            move |req: Request, status: Completion| signal.post(req, status)
        };
        req.set_callback(on_complete);
        self.hci.request_queue(req);

        let (completed, status) = match signal.wait_timeout(timeout)? {
            Some(outcome) => outcome,
            None => {
                // Mandatory drain: the request's buffer must not be
                // touched by the HCI after this call returns, so we wait
                // unboundedly for the forced completion rather than giving
                // up once the cancel is issued.
                self.hci.cancel_all(self.device_id, 0);
                let (completed, _) = signal.drain()?;
                self.release_if_pooled(length);
                log::warn!(
                    "control transfer to device {} timed out after {:?}",
                    self.device_id,
                    timeout
                );
                let _ = completed;
                return Err(Error::TimedOut);
            }
        };

        self.release_if_pooled(length);

        match status {
            Ok(actual) => {
                if is_in && length != 0 {
                    if let RequestBuffer::In(buf) = completed.buffer {
                        let n = actual.min(data.len()).min(buf.len());
                        data[..n].copy_from_slice(&buf[..n]);
                    }
                }
                Ok(actual)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn release_if_pooled(&self, length: u16) {
        if length == 0 {
            self.zero_length.release();
        }
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    pub(crate) fn hci(&self) -> Arc<dyn HostController> {
        self.hci.clone()
    }
}

#[cfg(test)]
#[path = "tests/control.rs"]
mod tests;
