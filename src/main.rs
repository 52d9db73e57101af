//! # Bioreactor Telemetry
//!
//! Live pH/temperature telemetry, CSV retention and threshold alerting for a
//! multi-tube bioreactor rig.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bioreactor_telemetry::alert::{AlertDispatcher, AlertTemplate, SmtpMailer, StakeholderList};
use bioreactor_telemetry::config::{AlertConfig, Config, LoggingConfig};
use bioreactor_telemetry::sensor::SimulatedSensor;
use bioreactor_telemetry::settings::{LookupTables, SettingsStore};
use bioreactor_telemetry::telemetry::{
    BufferSnapshot, SampleRecorder, TelemetryScheduler, ThresholdEvaluator,
};

/// Configuration file used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Main entry point for Bioreactor Telemetry
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load the TOML configuration (first argument, or `config/default.toml`)
///    - Set up console and daily-rolling file logging
///    - Load lookup tables, data settings and stakeholders; any failure here
///      aborts startup
///    - Log in to the mail server; a failed login only disables alerts
///
/// 2. **Main Loop**
///    - The scheduler task samples every read interval
///    - Each published snapshot is summarised at debug level
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Stop the scheduler after its current tick
///    - Alert deliveries already in flight are left to finish
///
/// # Errors
///
/// Returns error if configuration, settings or lookup files are missing or
/// invalid.
///
/// # Examples
///
/// ```bash
/// BIOREACTOR_SMTP_PASSWORD=... cargo run --release -- config/default.toml
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let _log_guard = init_logging(&config.logging)?;
    info!("Bioreactor Telemetry v{} starting...", env!("CARGO_PKG_VERSION"));

    let storage = &config.storage;
    let lookups = LookupTables::load(&storage.read_intervals_file, &storage.data_lifespans_file)
        .context("Failed to load lookup tables")?;
    let settings = SettingsStore::load(&storage.settings_file)
        .with_context(|| format!("Failed to load data settings from {}", storage.settings_file))?;
    let stakeholders = StakeholderList::load(&storage.stakeholders_file)
        .with_context(|| format!("Failed to load stakeholders from {}", storage.stakeholders_file))?;

    let dispatcher = build_dispatcher(&config.alerts, stakeholders).await?;

    let tube_count = usize::from(config.rig.tube_count);
    let scheduler = TelemetryScheduler::new(
        &config.rig,
        Arc::new(lookups),
        settings.get(),
        SampleRecorder::new(&storage.data_dir),
        ThresholdEvaluator::from_config(&config.thresholds, tube_count),
        dispatcher,
        Box::new(SimulatedSensor::new(tube_count)),
    )
    .context("Failed to build telemetry scheduler")?
    .with_alert_cooldown(Duration::from_secs(config.alerts.cooldown_secs));

    info!("Recording to {}", storage.data_dir);
    let handle = scheduler.start();
    let mut snapshots = handle.subscribe();

    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    warn!("Telemetry scheduler exited unexpectedly");
                    break;
                }
                log_snapshot(&snapshots.borrow_and_update());
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    let scheduler = handle.stop().await.context("Telemetry scheduler task failed")?;
    info!(
        "Stopped with {} points in the chart window",
        scheduler.buffer().timeline().len()
    );

    Ok(())
}

/// Console plus daily-rolling file logging
///
/// `RUST_LOG` overrides the configured level. An empty log directory logs to
/// the console only. The returned guard flushes the file writer when dropped,
/// so it must live for the whole of `main`.
fn init_logging(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .with_context(|| format!("Invalid log level {:?}", logging.level))?;

    let (file_layer, guard) = if logging.dir.is_empty() {
        (None, None)
    } else {
        std::fs::create_dir_all(&logging.dir)
            .with_context(|| format!("Failed to create log directory {}", logging.dir))?;
        let file_appender =
            tracing_appender::rolling::daily(&logging.dir, "bioreactor-telemetry.log");
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
        (
            Some(fmt::layer().with_ansi(false).with_writer(file_writer)),
            Some(guard),
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Log in to the mail server, or fall back to a disabled dispatcher
async fn build_dispatcher(
    alerts: &AlertConfig,
    stakeholders: StakeholderList,
) -> Result<AlertDispatcher> {
    let template = AlertTemplate::new(alerts.subject.clone(), alerts.greeting);

    if !alerts.enabled {
        info!("Alerts disabled in configuration");
        return Ok(AlertDispatcher::disabled(stakeholders, template));
    }

    let Ok(password) = std::env::var(&alerts.password_env) else {
        error!("{} is not set, alerts disabled", alerts.password_env);
        return Ok(AlertDispatcher::disabled(stakeholders, template));
    };

    let mailer = SmtpMailer::new(alerts, password).context("Invalid mail settings")?;
    Ok(AlertDispatcher::connect(Arc::new(mailer), stakeholders, template).await)
}

/// Headless stand-in for the live charts
fn log_snapshot(snapshot: &BufferSnapshot) {
    let Some(latest) = snapshot.timeline.last() else {
        return;
    };

    for series in snapshot.tubes.iter().filter(|s| s.enabled) {
        match series.samples.last().filter(|s| s.timestamp == *latest) {
            Some(sample) => debug!(
                "Tube {}: pH {:.2}, {:.2} °C ({} points)",
                series.tube_id,
                sample.ph,
                sample.temperature,
                series.samples.len()
            ),
            None => debug!("Tube {}: no reading at {}", series.tube_id, latest.format("%H:%M:%S")),
        }
    }
}
