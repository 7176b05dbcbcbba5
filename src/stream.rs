//! Periodic heading stream
//!
//! One task per session: connect, register for samples, then once per tick
//! snapshot the registers, run the pipeline, and hand any reading to the
//! connection. Cancellation is cooperative and observed only while waiting
//! for the next tick, so a tick in progress always completes.

use crate::connection::{ConnectionManager, EventSink, NORMAL_CLOSURE};
use crate::error::{Error, Result};
use crate::orientation::OrientationState;
use crate::pipeline::HeadingPipeline;
use crate::sensor::SensorSource;
use crate::types::{LoopPhase, LoopReport, SensorKind, SessionConfig, StreamSettings};
use crate::wire::HeadingMessage;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

/// A session's streaming loop, not yet started
pub struct StreamingLoop {
    config: SessionConfig,
    settings: StreamSettings,
    source: Arc<dyn SensorSource>,
    events: EventSink,
}

impl StreamingLoop {
    /// Prepare a loop for one session
    pub fn new(
        config: SessionConfig,
        settings: StreamSettings,
        source: Arc<dyn SensorSource>,
        events: EventSink,
    ) -> Self {
        Self {
            config,
            settings,
            source,
            events,
        }
    }

    /// Spawn the loop on the current tokio runtime
    ///
    /// # Errors
    /// [`Error::Config`] when the settings fail
    /// [`StreamSettings::validate`], and [`Error::SensorUnavailable`] when
    /// the source lacks either required sensor. Nothing is spawned and no
    /// connection is attempted in either case.
    pub fn start(self) -> Result<RunningLoop> {
        self.settings.validate()?;

        for kind in SensorKind::ALL {
            if !self.source.has_sensor(kind) {
                warn!(%kind, "Required sensor unavailable");
                return Err(Error::SensorUnavailable(kind));
            }
        }

        let (cancel, cancelled) = watch::channel(false);
        let (phase, phase_rx) = watch::channel(LoopPhase::Idle);
        let task = tokio::spawn(self.run(cancelled, phase));

        Ok(RunningLoop {
            cancel,
            phase: phase_rx,
            task,
        })
    }

    async fn run(
        self,
        mut cancelled: watch::Receiver<bool>,
        phase: watch::Sender<LoopPhase>,
    ) -> Result<LoopReport> {
        phase.send_replace(LoopPhase::Running);
        info!(
            server = %self.config.server_address,
            calibrate = self.config.calibrate_on_start,
            "Compass stream running"
        );

        let mut connection =
            ConnectionManager::connect(&self.config.server_address, &self.settings, self.events);

        let orientation = Arc::new(OrientationState::new());
        let subscription = match self.source.subscribe(Arc::clone(&orientation)) {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(error = %e, "Sensor registration failed");
                connection.close(NORMAL_CLOSURE, "").await;
                phase.send_replace(LoopPhase::Terminated);
                return Err(e);
            }
        };

        let mut pipeline = HeadingPipeline::new(self.config.calibrate_on_start);
        let period = self.settings.tick_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut report = LoopReport::default();

        loop {
            if *cancelled.borrow_and_update() {
                break;
            }

            tokio::select! {
                biased;
                changed = cancelled.changed() => {
                    if changed.is_err() {
                        debug!("Session handle dropped");
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            report.ticks += 1;
            let snapshot = orientation.snapshot();
            let Some(heading) = pipeline.tick(&snapshot) else {
                continue;
            };
            report.readings += 1;

            match HeadingMessage::new(heading).encode() {
                Ok(payload) => {
                    debug!(azimuth = heading, "Sending azimuth");
                    connection.send(payload);
                }
                Err(e) => warn!(error = %e, "Failed to encode heading"),
            }
        }

        phase.send_replace(LoopPhase::Stopping);
        subscription.unregister();
        connection.close(NORMAL_CLOSURE, "").await;

        report.frames_sent = connection.frames_sent();
        report.dropped_sends = connection.dropped_sends();
        phase.send_replace(LoopPhase::Terminated);
        info!(?report, "Compass stream terminated");

        Ok(report)
    }
}

/// Handle to a spawned streaming loop
pub struct RunningLoop {
    cancel: watch::Sender<bool>,
    phase: watch::Receiver<LoopPhase>,
    task: JoinHandle<Result<LoopReport>>,
}

impl RunningLoop {
    /// Ask the loop to stop at its next iteration boundary
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Cancel and wait until the loop has closed its connection and terminated
    pub async fn stop(self) -> Result<LoopReport> {
        self.cancel();
        self.task.await?
    }

    /// Current phase of the loop
    pub fn phase(&self) -> LoopPhase {
        *self.phase.borrow()
    }

    /// Watch phase transitions
    pub fn subscribe_phase(&self) -> watch::Receiver<LoopPhase> {
        self.phase.clone()
    }

    /// The loop task has exited, by cancellation or failure
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
