use anyhow::{bail, Context};
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use vigil::alerts::{AlertChannel, LogAlertChannel, RateLimitedChannel};
use vigil::config::Config;
use vigil::sinks::{CsvFileSink, LogSink};
use vigil::{Monitor, Schedule};

/// Cycle period used when neither the command line nor the config sets one
const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

/// Command-line arguments for the monitoring daemon
#[derive(Parser)]
#[command(
    name = "vigil",
    about = "Reactive monitoring daemon - samples feeds, tracks thresholds and raises alerts",
    long_about = "Listens on the TCP feeds named in the configuration file, keeps a bounded \
                  in-memory time series of their values, logs every new batch (optionally to \
                  CSV) and raises an alert whenever the monitored values leave their bounds."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Sampling period in seconds
    #[arg(
        short,
        long,
        value_name = "SECS",
        help = "Sampling period in seconds (overrides scheduler.period_seconds)"
    )]
    period: Option<f64>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// # Returns
    ///
    /// `Ok(())` if all arguments are valid, `Err(String)` with error message otherwise
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            if config_path.exists() && !config_path.is_file() {
                return Err(format!(
                    "Configuration path is not a file: {}",
                    config_path.display()
                ));
            }

            if let Some(extension) = config_path.extension() {
                if extension != "toml" {
                    warn!(
                        "Configuration file does not have .toml extension: {}",
                        config_path.display()
                    );
                }
            }
        }

        if let Some(period) = self.period {
            if !(period.is_finite() && period > 0.0) {
                return Err(format!(
                    "Period must be a positive number of seconds, got {}",
                    period
                ));
            }
        }

        Ok(())
    }

    /// Sampling period: command line first, then config, then the default
    fn resolve_period(&self, config: &Config) -> Duration {
        self.period
            .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
            .filter(|period| !period.is_zero())
            .or_else(|| config.scheduler.period())
            .unwrap_or(DEFAULT_PERIOD)
    }
}

/// Load the configuration; a named file that cannot be loaded is fatal
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    match &cli.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Config::from_file(path)
                .with_context(|| format!("invalid configuration file '{}'", path.display()))
        }
        None => {
            info!("Using default configuration");
            Ok(Config::default())
        }
    }
}

/// Wire feeds, sinks and alert channels from the configuration
fn build_monitor(config: &Config) -> anyhow::Result<Monitor> {
    let monitor = Monitor::from_config(&config.monitor);

    for feed in &config.feeds {
        let bounds = feed.bounds()?;
        monitor
            .listen(&feed.name, &feed.address, bounds, None)
            .with_context(|| {
                format!("failed to listen on feed '{}' at {}", feed.name, feed.address)
            })?;
        info!(
            "Listening on feed '{}' at {} with bounds {}",
            feed.name, feed.address, bounds
        );
    }

    monitor.add_sink(Arc::new(LogSink));
    if let Some(csv) = &config.csv {
        info!("Logging samples to {}", csv.path.display());
        monitor.add_sink(Arc::new(CsvFileSink::new(&csv.path)));
    }

    let channel: Arc<dyn AlertChannel> = Arc::new(LogAlertChannel);
    match config.alerts.rate_limit_per_minute {
        Some(limit) => {
            info!("Alerts limited to {} per minute", limit);
            monitor.add_alert_channel(Arc::new(RateLimitedChannel::per_minute(channel, limit)));
        }
        None => monitor.add_alert_channel(channel),
    }

    Ok(monitor)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if let Err(e) = cli.validate() {
        bail!("Invalid arguments: {}", e);
    }

    let config = load_config(&cli)?;
    if config.feeds.is_empty() {
        warn!("No feeds configured, the monitor will only run empty cycles");
    }

    let mut monitor = build_monitor(&config)?;
    let period = cli.resolve_period(&config);

    let (shutdown_sender, shutdown_receiver) = mpsc::channel();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal (SIGINT), shutting down gracefully...");
        if let Err(e) = shutdown_sender.send(()) {
            error!("Failed to send shutdown signal: {}", e);
        }
    })
    .context("failed to install Ctrl+C handler")?;

    monitor.start(Schedule::periodic(period)?)?;
    info!("Vigil is running every {:?}. Press Ctrl+C to stop.", period);

    if let Err(e) = shutdown_receiver.recv() {
        error!("Error waiting for shutdown: {}", e);
    }

    monitor.shutdown();
    let stats = monitor.stats();
    info!(
        "Ran {} cycles ({} empty), ingested {} samples",
        stats.cycles, stats.empty_cycles, stats.samples_ingested
    );
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    info!("Starting vigil");

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }

    info!("Vigil shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn cli(config: Option<PathBuf>, period: Option<f64>) -> Cli {
        Cli {
            config,
            period,
            verbose: false,
        }
    }

    #[test]
    fn test_cli_validation_with_existing_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[monitor]\nmax_points = 10").unwrap();

        assert!(cli(Some(file.path().to_path_buf()), None).validate().is_ok());
    }

    #[test]
    fn test_cli_validation_with_directory() {
        let dir = TempDir::new().unwrap();
        assert!(cli(Some(dir.path().to_path_buf()), None).validate().is_err());
    }

    #[test]
    fn test_cli_validation_rejects_bad_period() {
        assert!(cli(None, Some(0.0)).validate().is_err());
        assert!(cli(None, Some(-1.0)).validate().is_err());
        assert!(cli(None, Some(f64::NAN)).validate().is_err());
        assert!(cli(None, Some(0.5)).validate().is_ok());
    }

    #[test]
    fn test_missing_config_file_is_fatal() {
        let args = cli(Some(PathBuf::from("/nonexistent/vigil.toml")), None);
        assert!(args.validate().is_ok());
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn test_no_config_uses_defaults() {
        let config = load_config(&cli(None, None)).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_period_resolution_order() {
        let config = Config::from_toml_str("[scheduler]\nperiod_seconds = 2.0").unwrap();

        assert_eq!(
            cli(None, Some(0.5)).resolve_period(&config),
            Duration::from_millis(500)
        );
        assert_eq!(
            cli(None, None).resolve_period(&config),
            Duration::from_secs(2)
        );
        assert_eq!(
            cli(None, None).resolve_period(&Config::default()),
            DEFAULT_PERIOD
        );
    }

    #[test]
    fn test_build_monitor_without_feeds() {
        let dir = TempDir::new().unwrap();
        let config = Config::from_toml_str(&format!(
            "[csv]\npath = \"{}\"\n[alerts]\nrate_limit_per_minute = 2\n",
            dir.path().join("out.csv").display()
        ))
        .unwrap();

        let monitor = build_monitor(&config).unwrap();
        assert!(monitor.observer_names().is_empty());
        assert!(monitor.run_cycle().is_none());
    }

    #[test]
    fn test_build_monitor_fails_on_unreachable_feed() {
        // Bind then drop to get a port with nothing listening
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = Config::from_toml_str(&format!(
            "[[feeds]]\nname = \"temp\"\naddress = \"127.0.0.1:{}\"\n",
            port
        ))
        .unwrap();

        assert!(build_monitor(&config).is_err());
    }
}
