//! Push-based data feeds consumed by listeners
//!
//! A feed hands out one value per blocking `receive()` call. Closing is done
//! from another thread through a [`FeedCloser`], which must unblock a pending
//! `receive()` so the listener's receive loop can exit.

use crate::error::FeedError;
use log::{debug, warn};
use std::io::{BufRead, BufReader, Read};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

/// Longest accepted feed message, newline included
pub const MAX_MESSAGE_BYTES: u64 = 64 * 1024;

/// A blocking source of values for a passive observer
pub trait Feed: Send + 'static {
    /// Block until the next value arrives
    ///
    /// Returns `FeedError::Closed` once the feed has been closed.
    fn receive(&mut self) -> Result<f64, FeedError>;

    /// Handle that closes the feed from another thread
    fn closer(&self) -> Result<FeedCloser, FeedError>;
}

/// One-shot handle closing a feed's underlying connection
pub struct FeedCloser(Box<dyn FnOnce() + Send>);

impl FeedCloser {
    pub fn new(close: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(close))
    }

    pub fn close(self) {
        (self.0)()
    }
}

/// Parse one feed message: a bare JSON number or an object with a `value` field
pub fn parse_value(message: &str) -> Result<f64, FeedError> {
    let parsed: serde_json::Value = serde_json::from_str(message.trim())
        .map_err(|e| FeedError::Parse(format!("{}: {}", message.trim(), e)))?;

    let number = match &parsed {
        serde_json::Value::Object(fields) => fields.get("value"),
        other => Some(other),
    };

    number
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| FeedError::Parse(format!("no numeric value in {}", parsed)))
}

/// Feed reading newline-delimited values from a TCP connection
///
/// Malformed lines (bad JSON, invalid UTF-8, longer than
/// [`MAX_MESSAGE_BYTES`]) are logged and skipped; a dropped connection ends
/// the feed.
pub struct TcpFeed {
    address: String,
    reader: BufReader<TcpStream>,
    line: Vec<u8>,
}

impl TcpFeed {
    /// Connect to `host:port`
    pub fn connect(address: &str) -> Result<Self, FeedError> {
        let stream = TcpStream::connect(address)?;
        debug!("Connected TCP feed to {}", address);
        Ok(Self {
            address: address.to_string(),
            reader: BufReader::new(stream),
            line: Vec::new(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Read up to the next newline, at most `MAX_MESSAGE_BYTES` at a time
    fn read_chunk(&mut self) -> Result<usize, FeedError> {
        self.line.clear();
        let read = (&mut self.reader)
            .take(MAX_MESSAGE_BYTES)
            .read_until(b'\n', &mut self.line)?;
        Ok(read)
    }

    /// Whether the last chunk stopped at the size cap instead of a newline
    fn chunk_truncated(&self) -> bool {
        self.line.len() as u64 == MAX_MESSAGE_BYTES && self.line.last() != Some(&b'\n')
    }
}

impl Feed for TcpFeed {
    fn receive(&mut self) -> Result<f64, FeedError> {
        loop {
            if self.read_chunk()? == 0 {
                return Err(FeedError::Closed);
            }

            if self.chunk_truncated() {
                warn!(
                    "Skipping message from {} longer than {} bytes",
                    self.address, MAX_MESSAGE_BYTES
                );
                // Drop the remainder of the oversized line
                while self.read_chunk()? > 0 && self.chunk_truncated() {}
                continue;
            }

            let message = match std::str::from_utf8(&self.line) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Skipping non UTF-8 message from {}: {}", self.address, e);
                    continue;
                }
            };
            if message.trim().is_empty() {
                continue;
            }

            match parse_value(message) {
                Ok(value) => return Ok(value),
                Err(e) => warn!("Skipping malformed message from {}: {}", self.address, e),
            }
        }
    }

    fn closer(&self) -> Result<FeedCloser, FeedError> {
        let stream = self.reader.get_ref().try_clone()?;
        let address = self.address.clone();
        Ok(FeedCloser::new(move || {
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                debug!("Shutdown of TCP feed {} failed: {}", address, e);
            }
        }))
    }
}

/// In-process feed backed by a channel
///
/// Polls its receiver with a short timeout so that a close request is
/// observed even while no sender is active.
pub struct ChannelFeed {
    receiver: Receiver<f64>,
    closed: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl ChannelFeed {
    pub fn new(receiver: Receiver<f64>) -> Self {
        Self {
            receiver,
            closed: Arc::new(AtomicBool::new(false)),
            poll_interval: Duration::from_millis(20),
        }
    }

    /// Create a connected sender and feed
    pub fn pair() -> (Sender<f64>, Self) {
        let (sender, receiver) = mpsc::channel();
        (sender, Self::new(receiver))
    }
}

impl Feed for ChannelFeed {
    fn receive(&mut self) -> Result<f64, FeedError> {
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(FeedError::Closed);
            }
            match self.receiver.recv_timeout(self.poll_interval) {
                Ok(value) => return Ok(value),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(FeedError::Closed),
            }
        }
    }

    fn closer(&self) -> Result<FeedCloser, FeedError> {
        let closed = Arc::clone(&self.closed);
        Ok(FeedCloser::new(move || closed.store(true, Ordering::SeqCst)))
    }
}
