//! compass-stream - stream compass headings to a WebSocket server
//!
//! Runs one session against a simulated device (or a CSV recording) and logs
//! connectivity changes until Ctrl-C or the requested duration elapses.

use anyhow::{Context, Result};
use clap::Parser;
use compass_stream::{
    AppConfig, ConnectionEvent, ReplaySource, SensorSource, SessionController, SimulatedSource,
    StopOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "compass-stream")]
#[command(about = "Stream compass headings over WebSocket", long_about = None)]
struct Args {
    /// WebSocket server URL
    #[arg(long)]
    server: Option<String>,

    /// Zero the heading on the first reading
    #[arg(long, default_value_t = false)]
    calibrate: bool,

    /// Milliseconds between headings
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Replay a CSV recording instead of simulating a device
    #[arg(long, value_name = "CSV")]
    replay: Option<PathBuf>,

    /// Rotation rate of the simulated device, deg/s
    #[arg(long, value_name = "DEG_PER_S")]
    rotation_rate: Option<f32>,

    /// Stop after this many seconds (0 = until Ctrl-C)
    #[arg(long, value_name = "SECONDS", default_value_t = 0)]
    duration: u64,
}

impl Args {
    /// File values first, then command-line overrides
    fn resolve(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => AppConfig::default(),
        };

        if let Some(server) = &self.server {
            config.server_address = server.clone();
        }
        if self.calibrate {
            config.calibrate = true;
        }
        if let Some(ms) = self.interval_ms {
            config.stream.tick_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(path) = &self.replay {
            config.replay = Some(path.clone());
        }
        if let Some(rate) = self.rotation_rate {
            config.sensor.rotation_rate = rate;
        }

        Ok(config)
    }
}

fn sensor_source(config: &AppConfig) -> Result<Arc<dyn SensorSource>> {
    match &config.replay {
        Some(path) => {
            let source = ReplaySource::from_path(path)
                .with_context(|| format!("loading recording {}", path.display()))?;
            info!(?path, frames = source.frames().len(), "Replaying recording");
            Ok(Arc::new(source))
        }
        None => {
            info!(rotation_rate = config.sensor.rotation_rate, "Using simulated device");
            Ok(Arc::new(SimulatedSource::new(config.sensor)))
        }
    }
}

async fn wait_for_exit(duration: u64) {
    if duration == 0 {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(?e, "Failed to listen for Ctrl-C");
        }
    } else {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(duration)) => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "compass_stream=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = args.resolve()?;
    info!(server = %config.server_address, calibrate = config.calibrate, "Compass stream starting");

    let source = sensor_source(&config)?;
    let (mut controller, mut events) = SessionController::new(source, config.stream);
    controller.start(config.session_config()).await?;

    // Stand-in for user notifications
    let notifier = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ConnectionEvent::Connected => info!("Connected to websocket server"),
                ConnectionEvent::Disconnected(reason) => {
                    info!(%reason, "Disconnected from websocket server")
                }
            }
        }
    });

    wait_for_exit(args.duration).await;

    match controller.stop().await? {
        StopOutcome::Stopped(report) => info!(
            ticks = report.ticks,
            sent = report.frames_sent,
            dropped = report.dropped_sends,
            "Stopped compass stream"
        ),
        StopOutcome::NotRunning => info!("Compass stream wasn't running"),
    }

    drop(controller);
    let _ = notifier.await;
    Ok(())
}
