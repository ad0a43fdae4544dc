use crate::error::SinkError;
use crate::lock_or_recover;
use crate::sample::{Batch, Sample};
use crate::sinks::Sink;
use log::{debug, error};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Delivers batches to an inner sink on a dedicated worker thread
///
/// `update()` only enqueues the batch, so a slow inner sink no longer
/// delays the scheduler. Batches are delivered in order; errors from the
/// inner sink are logged on the worker thread. Dropping the wrapper drains
/// the remaining queue and joins the worker.
pub struct AsyncSink {
    sender: Mutex<Option<Sender<Batch>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncSink {
    /// Spawn the worker thread for `inner`
    ///
    /// # Errors
    ///
    /// Returns `SinkError::Io` if the worker thread cannot be spawned.
    pub fn spawn(inner: Arc<dyn Sink>) -> Result<Self, SinkError> {
        let (sender, receiver) = mpsc::channel::<Batch>();

        let worker = thread::Builder::new()
            .name("async-sink".to_string())
            .spawn(move || {
                debug!("Async sink worker started");
                for batch in receiver {
                    if let Err(e) = inner.update(&batch) {
                        error!("Async sink delivery failed: {}", e);
                    }
                }
                debug!("Async sink worker stopped");
            })?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }
}

impl Sink for AsyncSink {
    fn update(&self, batch: &[Sample]) -> Result<(), SinkError> {
        let sender = lock_or_recover(&self.sender);
        let sender = sender
            .as_ref()
            .ok_or_else(|| SinkError::WriteFailed("async sink is closed".to_string()))?;

        sender
            .send(batch.to_vec())
            .map_err(|_| SinkError::WriteFailed("async sink worker stopped".to_string()))
    }
}

impl Drop for AsyncSink {
    fn drop(&mut self) {
        // Closing the channel lets the worker finish the queue and exit
        lock_or_recover(&self.sender).take();
        if let Some(worker) = lock_or_recover(&self.worker).take() {
            if worker.join().is_err() {
                error!("Async sink worker panicked");
            }
        }
    }
}
