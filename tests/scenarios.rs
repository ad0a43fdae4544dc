//! End-to-end monitor scenarios

use std::io::Write;
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use vigil::alerts::AlertChannel;
use vigil::observers::{ChannelFeed, Listener, Observer};
use vigil::sinks::Sink;
use vigil::{AlertError, Batch, Monitor, Sample, Schedule, SinkError, ThresholdBounds};

#[derive(Default)]
struct RecordingSink {
    batches: Mutex<Vec<Batch>>,
}

impl Sink for RecordingSink {
    fn update(&self, batch: &[Sample]) -> Result<(), SinkError> {
        self.batches.lock().unwrap().push(batch.to_vec());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingChannel {
    messages: Mutex<Vec<String>>,
}

impl AlertChannel for RecordingChannel {
    fn send(&self, message: &str) -> Result<(), AlertError> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

fn bounds(lower: f64, upper: f64) -> ThresholdBounds {
    ThresholdBounds::new(Some(lower), Some(upper)).unwrap()
}

#[test]
fn constant_value_within_bounds() {
    let monitor = Monitor::new(100);
    monitor.watch(|| 5.0, Some("constant"), bounds(0.0, 10.0), None);

    monitor.run_cycle();

    assert!(monitor.in_threshold());
    let rows = monitor.snapshot();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "constant");
    assert_eq!(rows[0].value, 5.0);
}

#[test]
fn reaction_and_alert_fire_once_on_exit() {
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    let mut values = vec![0.5, 0.5, 2.0].into_iter();

    let monitor = Monitor::new(100);
    monitor.watch(
        move || values.next().unwrap_or(0.5),
        Some("ratio"),
        bounds(0.0, 1.0),
        Some(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })),
    );
    let channel = Arc::new(RecordingChannel::default());
    monitor.add_alert_channel(channel.clone());

    monitor.run_cycle();
    monitor.run_cycle();
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(channel.messages.lock().unwrap().is_empty());

    monitor.run_cycle();
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    let messages = channel.messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("ratio"));
    assert!(!monitor.in_threshold());
}

#[test]
fn periodic_mode_does_not_drift() {
    let period = 0.1;
    let mut monitor = Monitor::new(1000);
    monitor.watch(|| 1.0, Some("tick"), ThresholdBounds::unbounded(), None);

    monitor
        .start(Schedule::periodic(Duration::from_secs_f64(period)).unwrap())
        .unwrap();
    thread::sleep(Duration::from_secs(5));
    monitor.shutdown();

    let rows = monitor.snapshot();
    assert!(rows.len() >= 40, "only {} cycles ran", rows.len());

    let deltas: Vec<f64> = rows
        .windows(2)
        .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_microseconds().unwrap() as f64 / 1e6)
        .collect();
    let mean = deltas.iter().sum::<f64>() / deltas.len() as f64;
    let variance =
        deltas.iter().map(|delta| (delta - mean).powi(2)).sum::<f64>() / deltas.len() as f64;
    let stddev = variance.sqrt();

    // Small floor for a machine with near-zero wakeup jitter
    assert!(
        (mean - period).abs() <= stddev + 1e-4,
        "mean {} stddev {}",
        mean,
        stddev
    );
}

#[test]
fn listener_drains_queued_values_in_one_batch() {
    let (sender, feed) = ChannelFeed::pair();
    let mut listener =
        Listener::start("queue", feed, ThresholdBounds::unbounded(), None).unwrap();

    for value in [1.0, 2.0, 3.0] {
        sender.send(value).unwrap();
    }

    // Give the receive loop time to queue everything, then drain exactly once
    thread::sleep(Duration::from_millis(300));
    let batch = listener.measure();

    let values: Vec<f64> = batch.iter().map(|sample| sample.value).collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0]);
    assert!(listener.measure().is_empty());
    listener.stop().unwrap();
}

#[test]
fn monitor_cycle_drains_passive_queue() {
    let (sender, feed) = ChannelFeed::pair();
    let monitor = Monitor::new(100);
    monitor
        .listen_feed("queue", feed, ThresholdBounds::unbounded(), None)
        .unwrap();
    let sink = Arc::new(RecordingSink::default());
    monitor.add_sink(sink.clone());

    for value in [1.0, 2.0, 3.0] {
        sender.send(value).unwrap();
    }
    thread::sleep(Duration::from_millis(300));

    let batch = monitor.run_cycle().unwrap();
    let values: Vec<f64> = batch.iter().map(|sample| sample.value).collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0]);
    assert_eq!(sink.batches.lock().unwrap().len(), 1);
}

#[test]
fn buffer_keeps_most_recent_points() {
    let mut values = (1..=5).map(f64::from);
    let monitor = Monitor::new(3);
    monitor.watch(
        move || values.next().unwrap_or(0.0),
        Some("seq"),
        ThresholdBounds::unbounded(),
        None,
    );

    for _ in 0..5 {
        monitor.run_cycle();
        thread::sleep(Duration::from_millis(2));
    }

    let rows = monitor.snapshot();
    let values: Vec<f64> = rows.iter().map(|sample| sample.value).collect();
    assert_eq!(values, vec![3.0, 4.0, 5.0]);
    assert!(rows.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp));
    assert_eq!(monitor.stats().rows_evicted, 2);
}

#[test]
fn tcp_feed_end_to_end() {
    let server = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = server.local_addr().unwrap().to_string();
    let writer = thread::spawn(move || {
        let (mut stream, _) = server.accept().unwrap();
        stream
            .write_all(b"0.5\nnot json\n{\"value\": 42.0}\n")
            .unwrap();
        // Keep the connection open until the monitor stops listening
        thread::sleep(Duration::from_millis(500));
    });

    let mut monitor = Monitor::new(100);
    monitor
        .listen("sensor", &address, bounds(0.0, 10.0), None)
        .unwrap();
    let channel = Arc::new(RecordingChannel::default());
    monitor.add_alert_channel(channel.clone());

    let deadline = Instant::now() + Duration::from_secs(2);
    while monitor.snapshot().len() < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
        monitor.run_cycle();
    }

    let values: Vec<f64> = monitor.snapshot().iter().map(|sample| sample.value).collect();
    assert_eq!(values, vec![0.5, 42.0]);
    assert_eq!(monitor.observer_in_threshold("sensor"), Some(false));
    assert_eq!(
        channel.messages.lock().unwrap().as_slice(),
        ["Observers [sensor] are out of threshold!".to_string()]
    );

    monitor.shutdown();
    writer.join().unwrap();
}
