/// Threshold bounds with constructor-time validation
pub mod bounds;

/// Observer trait and shared threshold state machine
pub mod observer;

/// Active (pull-based) observers
pub mod watcher;

/// Passive (push-based) observers
pub mod listener;

/// Data feeds for passive observers
pub mod feed;

pub use bounds::ThresholdBounds;
pub use feed::{ChannelFeed, Feed, FeedCloser, TcpFeed};
pub use listener::Listener;
pub use observer::{Observer, Reaction, ThresholdState};
pub use watcher::{Measurement, Measurer, Watcher};
