//! Streams: ordered asynchronous execution queues
//!
//! Each stream owns a worker thread that runs submitted work strictly in
//! issue order. Submission returns immediately; completion is observed only
//! through [`Stream::synchronize`] or [`Device::synchronize`].

use super::Device;
use crate::{runtime_error, Result};
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Pending-work counter with a blocking wait, plus a sticky fault slot.
#[derive(Debug, Default)]
pub(crate) struct WorkTracker {
    pending: Mutex<u64>,
    drained: Condvar,
    fault: Mutex<Option<String>>,
}

impl WorkTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn submit(&self) {
        *self.pending.lock() += 1;
    }

    pub(crate) fn complete(&self) {
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.drained.notify_all();
        }
    }

    pub(crate) fn pending(&self) -> u64 {
        *self.pending.lock()
    }

    pub(crate) fn wait_idle(&self) {
        let mut pending = self.pending.lock();
        while *pending > 0 {
            self.drained.wait(&mut pending);
        }
    }

    /// Keep the first fault until someone takes it
    pub(crate) fn record_fault(&self, message: String) {
        let mut fault = self.fault.lock();
        if fault.is_none() {
            *fault = Some(message);
        }
    }

    pub(crate) fn take_fault(&self) -> Option<String> {
        self.fault.lock().take()
    }
}

/// Stream for asynchronous device work.
pub struct Stream {
    device: Arc<Device>,
    index: u64,
    sender: Option<mpsc::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    tracker: Arc<WorkTracker>,
    total_ops: AtomicU64,
}

impl Stream {
    /// Create a stream on `device` and start its worker thread.
    pub fn new(device: Arc<Device>, index: u64) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let worker = std::thread::Builder::new()
            .name(format!("device{}-stream{}", device.id(), index))
            .spawn(move || {
                for job in receiver {
                    job();
                }
            })
            .map_err(|e| runtime_error!("Failed to start stream worker: {}", e))?;

        log::debug!("Created stream {} on device {}", index, device.id());
        Ok(Self {
            device,
            index,
            sender: Some(sender),
            worker: Some(worker),
            tracker: Arc::new(WorkTracker::new()),
            total_ops: AtomicU64::new(0),
        })
    }

    /// Device this stream executes on
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Index of this stream among the device's streams
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Queue `job` behind all earlier work on this stream.
    ///
    /// A panic inside `job` is caught and recorded as a device fault, which
    /// the next synchronize reports.
    pub fn enqueue<F>(&self, label: &str, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| runtime_error!("Stream {} has shut down", self.index))?;

        let stream_tracker = Arc::clone(&self.tracker);
        let device_tracker = Arc::clone(self.device.work());
        let device_id = self.device.id();
        let label = label.to_string();

        stream_tracker.submit();
        device_tracker.submit();

        let wrapped: Job = {
            let stream_tracker = Arc::clone(&stream_tracker);
            let device_tracker = Arc::clone(&device_tracker);
            Box::new(move || {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                    let message = panic_message(payload.as_ref());
                    log::warn!("'{}' faulted on device {}: {}", label, device_id, message);
                    device_tracker.record_fault(format!("'{}' faulted: {}", label, message));
                }
                stream_tracker.complete();
                device_tracker.complete();
            })
        };

        if sender.send(wrapped).is_err() {
            stream_tracker.complete();
            device_tracker.complete();
            return Err(runtime_error!(
                "Stream {} on device {} is no longer accepting work",
                self.index,
                device_id
            ));
        }
        self.total_ops.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Block until all work queued on this stream has finished.
    ///
    /// Like a device synchronize, this reports a pending device fault.
    pub fn synchronize(&self) -> Result<()> {
        self.tracker.wait_idle();
        self.device.take_fault()
    }

    /// Check if all stream operations are complete.
    pub fn is_complete(&self) -> bool {
        self.tracker.pending() == 0
    }

    /// Get the number of pending operations.
    pub fn pending_ops(&self) -> u64 {
        self.tracker.pending()
    }

    /// Get the total number of operations submitted.
    pub fn total_ops(&self) -> u64 {
        self.total_ops.load(Ordering::Relaxed)
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain what is queued and exit.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!(
                    "Worker for stream {} on device {} panicked",
                    self.index,
                    self.device.id()
                );
            }
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("device", &self.device.id())
            .field("index", &self.index)
            .field("pending", &self.pending_ops())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
