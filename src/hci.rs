//! The Host Controller Interface (HCI) collaborator.
//!
//! This crate never talks to silicon directly: every transfer, cancellation
//! and timing query is forwarded to whatever implements [`HostController`].
//! Completions are delivered asynchronously, on a thread the HCI owns, via
//! the callback installed on the [`Request`] at submission time — the
//! Request Queue Shim and the Control Transfer Bridge each install their own
//! trampoline before calling [`HostController::request_queue`].

use crate::error::UsbError;
use crate::wire::SetupPacket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    Low,
    Full,
    High,
    Super,
}

/// The data stage of a transfer, borrowed for the duration of submission.
pub enum RequestBuffer {
    In(Vec<u8>),
    Out(Vec<u8>),
    None,
}

impl RequestBuffer {
    pub fn len(&self) -> usize {
        match self {
            RequestBuffer::In(b) | RequestBuffer::Out(b) => b.len(),
            RequestBuffer::None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The outcome of a completed transfer: either the number of bytes the HCI
/// actually moved, or the kind of failure it reported.
pub type Completion = Result<usize, UsbError>;

pub type CompletionCallback = Box<dyn FnOnce(Request, Completion) + Send>;

/// A single transfer, either a control transfer on endpoint 0 or a
/// client-submitted bulk/interrupt transfer queued through the Request
/// Queue Shim.
///
/// `callback` always runs exactly once, via [`Request::complete`], which the
/// HCI implementation calls from whatever thread observes the completion.
pub struct Request {
    pub device_id: u32,
    pub endpoint: u8,
    pub setup: Option<SetupPacket>,
    pub buffer: RequestBuffer,
    callback: Option<CompletionCallback>,
}

impl Request {
    pub fn control(device_id: u32, setup: SetupPacket, buffer: RequestBuffer) -> Self {
        Self {
            device_id,
            endpoint: 0,
            setup: Some(setup),
            buffer,
            callback: None,
        }
    }

    pub fn transfer(device_id: u32, endpoint: u8, buffer: RequestBuffer) -> Self {
        Self {
            device_id,
            endpoint,
            setup: None,
            buffer,
            callback: None,
        }
    }

    /// Installs the callback that will run on completion, returning
    /// whatever callback was previously installed (used by the Request
    /// Queue Shim to save the client's callback before substituting its own
    /// trampoline).
    pub fn set_callback(
        &mut self,
        callback: impl FnOnce(Request, Completion) + Send + 'static,
    ) -> Option<CompletionCallback> {
        self.callback.replace(Box::new(callback))
    }

    /// Called by the HCI implementation once the transfer has finished.
    ///
    /// Consumes `self` so a completed request's buffer can never be touched
    /// again by the caller that queued it.
    pub fn complete(mut self, status: Completion) {
        if let Some(cb) = self.callback.take() {
            cb(self, status);
        }
    }
}

/// The collaborator that owns the silicon and moves bytes over the wire.
///
/// Implementations run completions on their own thread context; this crate
/// never assumes `request_queue` completes synchronously, even for zero-byte
/// transfers.
pub trait HostController: Send + Sync {
    /// Submits `req`. The request's callback is guaranteed to be invoked
    /// exactly once, even if the device disconnects or the transfer is
    /// cancelled.
    fn request_queue(&self, req: Request);

    /// Cancels every outstanding transfer on `endpoint` for `device_id`.
    /// Cancelled requests still complete, with [`UsbError::Cancelled`].
    fn cancel_all(&self, device_id: u32, endpoint: u8);

    /// Resets the data-toggle state of `endpoint` for `device_id`.
    fn reset_endpoint(&self, device_id: u32, endpoint: u8);

    /// The largest single transfer `endpoint` can carry in one request.
    fn get_max_transfer_size(&self, device_id: u32, endpoint: u8) -> usize;

    /// The HCI's current (micro)frame counter.
    fn get_current_frame(&self) -> u64;
}
