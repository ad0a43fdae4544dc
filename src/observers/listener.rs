use crate::error::{FeedError, ObserverError};
use crate::observers::{Feed, FeedCloser, Observer, Reaction, ThresholdBounds, ThresholdState};
use crate::sample::{Batch, Sample};
use log::{debug, error, info, warn};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

/// Passive (push-based) observer fed by a background receive loop
///
/// The receive loop runs on its own thread, stamps every value with the
/// instant it arrived and pushes it onto an unbounded queue. `measure()`
/// drains that queue without blocking. `stop()` closes the feed so that a
/// loop blocked in `receive()` returns, then joins the thread. Dropping a
/// running listener stops it.
pub struct Listener {
    state: ThresholdState,
    queue: Receiver<Sample>,
    closer: Option<FeedCloser>,
    thread_handle: Option<JoinHandle<()>>,
}

impl Listener {
    /// Start listening on a feed
    ///
    /// # Errors
    ///
    /// Returns `ObserverError::Feed` if the feed cannot produce a close handle
    /// and `ObserverError::Spawn` if the receive thread cannot be started.
    pub fn start(
        name: &str,
        feed: impl Feed,
        bounds: ThresholdBounds,
        reaction: Option<Reaction>,
    ) -> Result<Self, ObserverError> {
        let closer = feed.closer()?;
        let (sender, queue) = mpsc::channel();

        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(format!("listener-{}", name))
            .spawn(move || Self::receive_loop(thread_name, feed, sender))
            .map_err(ObserverError::Spawn)?;

        info!("Listener '{}' started", name);
        Ok(Self {
            state: ThresholdState::new(name, bounds, reaction),
            queue,
            closer: Some(closer),
            thread_handle: Some(handle),
        })
    }

    /// Whether the listener has been stopped
    pub fn is_stopped(&self) -> bool {
        self.closer.is_none()
    }

    /// Receive loop run on the listener thread
    ///
    /// Feed failures end the loop; retrying is left to the feed itself.
    fn receive_loop(name: String, mut feed: impl Feed, queue: Sender<Sample>) {
        debug!("Listener '{}' receive loop started", name);

        loop {
            match feed.receive() {
                Ok(value) => {
                    if queue.send(Sample::now(name.as_str(), value)).is_err() {
                        debug!("Listener '{}' queue dropped", name);
                        break;
                    }
                }
                Err(FeedError::Closed) => {
                    debug!("Listener '{}' feed closed", name);
                    break;
                }
                Err(e) => {
                    warn!("Listener '{}' receive loop terminated: {}", name, e);
                    break;
                }
            }
        }

        debug!("Listener '{}' receive loop finished", name);
    }
}

impl Observer for Listener {
    fn state(&self) -> &ThresholdState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ThresholdState {
        &mut self.state
    }

    fn measure(&mut self) -> Batch {
        let mut batch = Vec::new();
        loop {
            match self.queue.try_recv() {
                Ok(sample) => batch.push(sample),
                // Disconnected only means the loop ended; what was queued has been drained
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        batch
    }

    /// Close the feed and join the receive thread
    ///
    /// # Errors
    ///
    /// Returns `ObserverError::AlreadyStopped` on every call after the first.
    fn stop(&mut self) -> Result<(), ObserverError> {
        let closer = self
            .closer
            .take()
            .ok_or_else(|| ObserverError::AlreadyStopped(self.state.name().to_string()))?;

        closer.close();

        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("Listener '{}' receive thread panicked", self.state.name());
            }
        }

        info!("Listener '{}' stopped", self.state.name());
        Ok(())
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if !self.is_stopped() {
            let _ = self.stop();
        }
    }
}
