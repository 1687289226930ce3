//! The Completion Pump (C6): one worker thread per device that invokes
//! client completion callbacks off the HCI's own completion context.
//!
//! Calling a client callback directly from HCI context is unsafe here
//! because clients routinely resubmit from within their callback, which
//! would reenter the HCI transitively. The pump is per device, not per
//! system, so completions for one device are never reordered relative to
//! each other (the HCI may deliver in order; the pump must preserve it).

use crate::error::{self, Error};
use crate::hci::{Completion, CompletionCallback, Request};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

struct State {
    completed: VecDeque<(Request, Completion, CompletionCallback)>,
    stop: bool,
}

/// Note the worker thread holds only `state`/`condvar` (both `Arc`-shared),
/// never a handle back to `CompletionPump` itself — otherwise the worker
/// would keep the pump alive forever and `Drop` could never run.
pub struct CompletionPump {
    state: Arc<Mutex<State>>,
    condvar: Arc<Condvar>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CompletionPump {
    pub fn start() -> Self {
        let state = Arc::new(Mutex::new(State {
            completed: VecDeque::new(),
            stop: false,
        }));
        let condvar = Arc::new(Condvar::new());

        let worker_state = state.clone();
        let worker_condvar = condvar.clone();
        let handle = std::thread::spawn(move || {
            log::debug!("completion pump worker started");
            Self::run(worker_state, worker_condvar);
            log::debug!("completion pump worker exiting");
        });

        Self {
            state,
            condvar,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Runs on the pump's own worker thread, which has no `Result` channel
    /// back to a caller; a poisoned state mutex is logged and recovered
    /// from rather than left to hang the worker forever.
    fn run(state: Arc<Mutex<State>>, condvar: Arc<Condvar>) {
        loop {
            let (local, should_stop) = {
                let guard = state.lock().unwrap_or_else(|e| {
                    log::error!("completion pump state mutex poisoned, recovering");
                    e.into_inner()
                });
                let mut guard = condvar
                    .wait_while(guard, |s| s.completed.is_empty() && !s.stop)
                    .unwrap_or_else(|e| {
                        log::error!("completion pump state mutex poisoned, recovering");
                        e.into_inner()
                    });
                let local = std::mem::take(&mut guard.completed);
                (local, guard.stop)
            };

            for (req, status, callback) in local {
                callback(req, status);
            }

            if should_stop {
                break;
            }
        }
    }

    /// The trampoline's producer half, called by the HCI on its own
    /// context: appends to the FIFO and signals the worker. `callback` is
    /// the client's original completion, saved by the Request Queue Shim
    /// when it installed this trampoline.
    pub fn produce(&self, req: Request, status: Completion, callback: CompletionCallback) {
        {
            let mut guard = self.state.lock().unwrap_or_else(|e| {
                log::error!("completion pump state mutex poisoned, recovering");
                e.into_inner()
            });
            guard.completed.push_back((req, status, callback));
        }
        self.condvar.notify_one();
    }

    /// Sets the stop flag, signals, and joins the worker. Guarantees no
    /// client callback runs after this returns. Idempotent: a second call
    /// after the worker has already been joined is a no-op.
    pub fn shutdown(&self) -> Result<(), Error> {
        {
            let mut guard = self.state.lock().map_err(error::poisoned)?;
            guard.stop = true;
        }
        self.condvar.notify_one();
        log::debug!("completion pump shutting down");
        if let Some(handle) = self.worker.lock().map_err(error::poisoned)?.take() {
            let _ = handle.join();
        }
        Ok(())
    }
}

impl Drop for CompletionPump {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("completion pump shutdown failed: {:?}", e);
        }
    }
}

#[cfg(test)]
#[path = "tests/pump.rs"]
mod tests;
