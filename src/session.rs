//! Start/stop control for compass streaming sessions

use crate::error::Result;
use crate::sensor::SensorSource;
use crate::stream::{RunningLoop, StreamingLoop};
use crate::types::{ConnectionEvent, LoopPhase, SessionConfig, StopOutcome, StreamSettings};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Owns at most one active streaming session
///
/// Starting while a session is active first stops it, waiting for its close
/// handshake, so two sessions never hold connections at the same time.
/// Connectivity events from every session arrive on the receiver returned by
/// [`new`](Self::new).
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use compass_stream::{SessionConfig, SessionController, SimulatedSource, StreamSettings};
///
/// # async fn run() -> compass_stream::Result<()> {
/// let source = Arc::new(SimulatedSource::fixed(0.0));
/// let (mut controller, mut events) = SessionController::new(source, StreamSettings::default());
///
/// controller.start(SessionConfig::new("ws://127.0.0.1:1337/compass", true)).await?;
/// if let Some(event) = events.recv().await {
///     println!("{:?}", event);
/// }
/// controller.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionController {
    source: Arc<dyn SensorSource>,
    settings: StreamSettings,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    active: Option<RunningLoop>,
}

impl SessionController {
    /// Create an idle controller and the receiver for its connectivity events
    pub fn new(
        source: Arc<dyn SensorSource>,
        settings: StreamSettings,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let controller = Self {
            source,
            settings,
            events,
            active: None,
        };
        (controller, receiver)
    }

    /// Begin a session, replacing any active one
    ///
    /// # Errors
    /// [`Error::SensorUnavailable`](crate::Error::SensorUnavailable) when the
    /// source lacks a required sensor. The previous session, if any, has
    /// already been stopped by then.
    pub async fn start(&mut self, config: SessionConfig) -> Result<()> {
        if let Some(previous) = self.active.take() {
            info!("Replacing active compass session");
            if let Err(e) = previous.stop().await {
                warn!(error = %e, "Previous session ended with an error");
            }
        }

        let running = StreamingLoop::new(
            config,
            self.settings,
            Arc::clone(&self.source),
            self.events.clone(),
        )
        .start()?;

        self.active = Some(running);
        info!("Started compass session");
        Ok(())
    }

    /// Stop the active session, if any
    pub async fn stop(&mut self) -> Result<StopOutcome> {
        let Some(running) = self.active.take() else {
            info!("Compass session isn't running");
            return Ok(StopOutcome::NotRunning);
        };

        let report = running.stop().await?;
        info!("Stopped compass session");
        Ok(StopOutcome::Stopped(report))
    }

    /// A session has been started and not yet stopped
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Phase of the active session's loop
    pub fn phase(&self) -> Option<LoopPhase> {
        self.active.as_ref().map(RunningLoop::phase)
    }

    /// Settings applied to every session this controller starts
    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        // Cannot await here; the loop closes its connection on its own.
        if let Some(running) = &self.active {
            running.cancel();
        }
    }
}
