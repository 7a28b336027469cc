//! Detection sessions.
//!
//! A session ties the readiness gate, the current settings and the detector
//! together. [`DetectionSession::run_once`] analyses one frame;
//! [`DetectionSession::start_periodic`] repeats that on a timer against a
//! [`FrameSource`], skipping ticks while a previous run is still working.

use crate::config::{DetectionSettings, SettingsStore, VisionProvider};
use crate::detection::classifier::ShapeClassifier;
use crate::detection::contours::ContourExtractor;
use crate::detection::{ContourDetector, DebugDump, RegionSet};
use crate::error::{Result, VisionError};
use crate::frame::{Frame, FrameSource};
use crate::models::{DetectedObject, DetectionResult, ObjectKind};
use crate::runtime::RuntimeGate;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub struct DetectionSession {
    gate: RuntimeGate,
    settings: SettingsStore,
    extractor: Option<Arc<dyn ContourExtractor>>,
    debug: Option<DebugDump>,
    in_flight: Arc<AtomicBool>,
}

impl DetectionSession {
    pub fn new(gate: RuntimeGate, settings: SettingsStore) -> Self {
        Self {
            gate,
            settings,
            extractor: None,
            debug: None,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the contour extractor used by every run
    pub fn with_extractor(mut self, extractor: Arc<dyn ContourExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_debug(mut self, debug: DebugDump) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn gate(&self) -> &RuntimeGate {
        &self.gate
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Analyse one frame with the current settings snapshot.
    ///
    /// Fails with [`VisionError::Busy`] while another run holds the session.
    pub fn run_once(&self, frame: &Frame) -> Result<DetectionResult> {
        self.gate.ensure_ready()?;
        let _permit = self.begin_run()?;
        self.detect(frame, &self.settings.snapshot())
    }

    /// Analyse one frame with explicitly supplied settings
    pub fn run_with(&self, frame: &Frame, settings: &DetectionSettings) -> Result<DetectionResult> {
        self.gate.ensure_ready()?;
        let _permit = self.begin_run()?;
        self.detect(frame, settings)
    }

    /// Acquire the current frame from `source` and analyse it
    pub fn run_source(&self, source: &dyn FrameSource) -> Result<DetectionResult> {
        self.gate.ensure_ready()?;
        let permit = self.begin_run()?;
        self.run_source_with(source, &permit)
    }

    /// Run detection on tokio's blocking pool so async callers stay responsive
    pub async fn detect_async(self: &Arc<Self>, frame: Frame) -> Result<DetectionResult> {
        self.gate.ensure_ready()?;
        let permit = self.begin_run()?;
        let session = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let result = session.detect(&frame, &session.settings.snapshot());
            drop(permit);
            result
        })
        .await
        .map_err(|e| VisionError::Worker(e.to_string()))?
    }

    /// Body of [`DetectionSession::run_source`] for a caller that already holds the run slot
    fn run_source_with(&self, source: &dyn FrameSource, _permit: &RunPermit) -> Result<DetectionResult> {
        self.gate.ensure_ready()?;
        let frame = source.current_frame()?;
        self.detect(&frame, &self.settings.snapshot())
    }

    fn detect(&self, frame: &Frame, settings: &DetectionSettings) -> Result<DetectionResult> {
        let started = Instant::now();

        if settings.vision_provider != VisionProvider::Opencv {
            debug!(
                provider = ?settings.vision_provider,
                model = %settings.model_type,
                "Provider has no local backend, using contour detection"
            );
        }

        let mut detector = ContourDetector::new(settings.contour).with_debug(self.debug.clone());
        if let Some(extractor) = &self.extractor {
            detector = detector.with_extractor(extractor.clone());
        }
        let classifier = ShapeClassifier::new(settings.classifier);

        let RegionSet { regions, synthetic } = detector.detect(frame);
        let mut rng = rand::thread_rng();

        let objects: Vec<DetectedObject> = regions
            .iter()
            .map(|region| {
                if region.synthetic {
                    let class = classifier.classify_synthetic(&mut rng);
                    DetectedObject {
                        id: format!("demo_{}", region.index),
                        label: class.label.to_string(),
                        confidence: class.confidence,
                        bounding_box: region.bounding_box,
                        area: None,
                        kind: ObjectKind::Demo,
                    }
                } else {
                    let class = classifier.classify(region);
                    DetectedObject {
                        id: format!("contour_{}", region.index),
                        label: class.label.to_string(),
                        confidence: class.confidence,
                        bounding_box: region.bounding_box,
                        area: Some(region.rounded_area()),
                        kind: ObjectKind::Contour,
                    }
                }
            })
            .filter(|object| settings.keeps(&object.label, object.confidence))
            .collect();

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(
            objects = objects.len(),
            regions = regions.len(),
            synthetic,
            elapsed_ms,
            "Detection complete"
        );

        Ok(DetectionResult::new(
            objects,
            OffsetDateTime::now_utc(),
            elapsed_ms,
            synthetic,
        ))
    }

    fn begin_run(&self) -> Result<RunPermit> {
        self.try_begin_run().ok_or(VisionError::Busy)
    }

    /// Claim the session's single run slot, if free
    pub fn try_begin_run(&self) -> Option<RunPermit> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                flag: self.in_flight.clone(),
            })
    }

    /// Start periodic detection against `source`.
    ///
    /// The interval defaults to the settings' frame rate. Every tick is
    /// reported on the returned channel; a failed tick never stops the timer.
    pub fn start_periodic(
        self: &Arc<Self>,
        source: Arc<dyn FrameSource>,
        interval: Option<Duration>,
    ) -> Result<(PeriodicHandle, mpsc::UnboundedReceiver<TickReport>)> {
        let settings = self.settings.snapshot();
        if !settings.camera_enabled {
            return Err(VisionError::CameraDisabled);
        }
        let period = interval.unwrap_or_else(|| settings.frame_interval());
        if period.is_zero() {
            return Err(VisionError::Config("periodic interval must be non-zero".to_string()));
        }

        let token = CancelToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(periodic_loop(
            Arc::clone(self),
            source,
            period,
            token.clone(),
            tx,
        ));

        info!(interval_ms = period.as_millis() as u64, "Periodic detection started");
        Ok((
            PeriodicHandle {
                token,
                task: Some(task),
            },
            rx,
        ))
    }
}

/// Exclusive right to run detection; released on drop
#[derive(Debug)]
pub struct RunPermit {
    flag: Arc<AtomicBool>,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub enum TickOutcome {
    Completed(DetectionResult),
    /// The previous run was still in flight
    Skipped,
    Failed(VisionError),
}

#[derive(Debug)]
pub struct TickReport {
    pub tick: u64,
    pub outcome: TickOutcome,
}

/// Idempotent cancellation flag shared between a handle and its loop
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the token was already cancelled
    pub fn cancel(&self) -> bool {
        let first = !self.inner.cancelled.swap(true, Ordering::AcqRel);
        if first {
            self.inner.notify.notify_one();
        }
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.inner.notify.notified().await;
        }
    }
}

/// Owner of a running periodic loop; dropping it cancels the loop
#[derive(Debug)]
pub struct PeriodicHandle {
    token: CancelToken,
    task: Option<JoinHandle<()>>,
}

impl PeriodicHandle {
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Stop the timer; safe to call any number of times
    pub fn cancel(&self) {
        if self.token.cancel() {
            debug!("Periodic detection cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel and wait for the loop to exit
    pub async fn stop(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Periodic detection task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for PeriodicHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

struct ReleaseOnExit(Arc<dyn FrameSource>);

impl Drop for ReleaseOnExit {
    fn drop(&mut self) {
        self.0.release();
    }
}

async fn periodic_loop(
    session: Arc<DetectionSession>,
    source: Arc<dyn FrameSource>,
    period: Duration,
    token: CancelToken,
    reports: mpsc::UnboundedSender<TickReport>,
) {
    let _release = ReleaseOnExit(source.clone());
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut tick = 0u64;
    let mut in_flight: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if token.is_cancelled() {
            break;
        }
        tick += 1;

        let Some(permit) = session.try_begin_run() else {
            debug!(tick, "Previous detection still running, skipping tick");
            if reports.send(TickReport { tick, outcome: TickOutcome::Skipped }).is_err() {
                break;
            }
            continue;
        };

        // The slot is free, so the previous run is only finishing its report
        if let Some(previous) = in_flight.take() {
            join_run(previous).await;
        }

        let session = Arc::clone(&session);
        let source = Arc::clone(&source);
        let reports = reports.clone();
        in_flight = Some(tokio::task::spawn_blocking(move || {
            let outcome = match session.run_source_with(source.as_ref(), &permit) {
                Ok(result) => TickOutcome::Completed(result),
                Err(err) => {
                    warn!(tick, "Periodic detection failed: {}", err);
                    TickOutcome::Failed(err)
                }
            };
            drop(permit);
            let _ = reports.send(TickReport { tick, outcome });
        }));
    }

    // Release the source only after the last run is done with it
    if let Some(run) = in_flight.take() {
        join_run(run).await;
    }
    info!(ticks = tick, "Periodic detection stopped");
}

async fn join_run(run: JoinHandle<()>) {
    if let Err(e) = run.await {
        warn!("Periodic detection run panicked: {}", e);
    }
}
