use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use webwatch_capture::{CaptureError, CaptureProvider};
use webwatch_common::capture::{Capture, Viewport};
use webwatch_common::config::{Config, ConfigError};
use webwatch_common::geometry::Region;
use webwatch_diff::{DifferenceSet, OverlayRenderer, RegionDetector};

use crate::artifact::ArtifactStore;
use crate::viewer::Viewer;

/// What to watch and how often.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub target: String,
    pub viewport: Viewport,
    pub full_page: bool,
    pub interval: Duration,
    pub roi: Option<Region>,
    /// 0 retries forever.
    pub max_consecutive_failures: u32,
}

impl MonitorSettings {
    pub fn from_config(target: &str, config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            target: target.to_string(),
            viewport: Viewport::new(config.capture.width, config.capture.height),
            full_page: config.capture.full_page,
            interval: config.monitor.interval()?,
            roi: config.detect.roi,
            max_consecutive_failures: config.monitor.max_consecutive_failures,
        })
    }
}

enum WatchState {
    /// No known-good capture yet.
    Idle,
    /// Holding the most recent successful capture as the comparison reference.
    Watching { baseline: Capture },
}

enum Wake {
    Tick,
    Signal { sender_alive: bool },
}

/// Result of a single tick.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// First good capture; nothing to compare against yet.
    Baseline { seq: u64 },
    Unchanged { baseline_seq: u64, seq: u64 },
    Changed {
        baseline_seq: u64,
        seq: u64,
        regions: DifferenceSet,
        persisted: bool,
    },
    /// Transient capture failure; the baseline was kept.
    CaptureFailed { consecutive: u32 },
    /// Both captures were fine but could not be compared (e.g. the page height changed).
    ComparisonFailed { baseline_seq: u64, seq: u64 },
}

/// Counters reported when the loop stops.
#[derive(Debug, Default)]
struct RunStats {
    ticks: u64,
    changes: u64,
    artifacts: u64,
    capture_failures: u64,
    comparison_failures: u64,
}

impl RunStats {
    fn record(&mut self, outcome: &TickOutcome) {
        self.ticks += 1;
        match outcome {
            TickOutcome::Baseline { .. } | TickOutcome::Unchanged { .. } => {}
            TickOutcome::Changed { persisted, .. } => {
                self.changes += 1;
                if *persisted {
                    self.artifacts += 1;
                }
            }
            TickOutcome::CaptureFailed { .. } => self.capture_failures += 1,
            TickOutcome::ComparisonFailed { .. } => self.comparison_failures += 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("capture provider failed permanently: {0}")]
    FatalCapture(CaptureError),
    #[error("giving up after {count} consecutive capture failures, last: {last}")]
    TooManyFailures { count: u32, last: CaptureError },
    #[error("failed to release capture provider: {0}")]
    Teardown(CaptureError),
}

/// The polling loop: capture, compare with the baseline, publish changes.
pub struct Monitor<P: CaptureProvider> {
    provider: P,
    settings: MonitorSettings,
    detector: RegionDetector,
    renderer: OverlayRenderer,
    artifacts: ArtifactStore,
    viewer: Option<Viewer>,
    state: WatchState,
    consecutive_failures: u32,
}

impl<P: CaptureProvider> Monitor<P> {
    pub fn new(
        provider: P,
        settings: MonitorSettings,
        detector: RegionDetector,
        renderer: OverlayRenderer,
        artifacts: ArtifactStore,
        viewer: Option<Viewer>,
    ) -> Self {
        Self {
            provider,
            settings,
            detector,
            renderer,
            artifacts,
            viewer,
            state: WatchState::Idle,
            consecutive_failures: 0,
        }
    }

    pub fn baseline_seq(&self) -> Option<u64> {
        match &self.state {
            WatchState::Idle => None,
            WatchState::Watching { baseline } => Some(baseline.seq),
        }
    }

    /// Poll until `stop` flips to true (or its sender goes away) or a fatal
    /// error occurs. The provider is closed on every exit path.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> Result<(), MonitorError> {
        info!(
            url = self.settings.target,
            provider = self.provider.name(),
            interval_secs = self.settings.interval.as_secs_f64(),
            "monitor started"
        );

        let mut stats = RunStats::default();
        let result = self.poll(&mut stop, &mut stats).await;

        let provider = self.provider;
        match (result, provider.close().await) {
            (Ok(()), Ok(())) => {
                info!(
                    ticks = stats.ticks,
                    changes = stats.changes,
                    artifacts = stats.artifacts,
                    capture_failures = stats.capture_failures,
                    comparison_failures = stats.comparison_failures,
                    "monitor stopped"
                );
                Ok(())
            }
            (Ok(()), Err(e)) => Err(MonitorError::Teardown(e)),
            (Err(e), release) => {
                if let Err(release_err) = release {
                    warn!(error = %release_err, "failed to release capture provider after fatal error");
                }
                Err(e)
            }
        }
    }

    async fn poll(
        &mut self,
        stop: &mut watch::Receiver<bool>,
        stats: &mut RunStats,
    ) -> Result<(), MonitorError> {
        let period = self.settings.interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let wake = tokio::select! {
                biased;
                changed = stop.changed() => Wake::Signal { sender_alive: changed.is_ok() },
                _ = ticker.tick() => Wake::Tick,
            };
            if let Wake::Signal { sender_alive: false } = wake {
                info!("stop handle dropped, stopping");
                return Ok(());
            }
            if *stop.borrow() {
                info!("stop requested");
                return Ok(());
            }
            if let Wake::Tick = wake {
                let outcome = self.tick().await?;
                stats.record(&outcome);
            }
        }
    }

    /// Run one capture/compare/publish cycle.
    ///
    /// Only fatal provider errors are returned; everything else is logged
    /// and reported through the outcome.
    pub async fn tick(&mut self) -> Result<TickOutcome, MonitorError> {
        let capture = match self
            .provider
            .capture(
                &self.settings.target,
                self.settings.viewport,
                self.settings.full_page,
            )
            .await
        {
            Ok(c) => {
                self.consecutive_failures = 0;
                c
            }
            Err(e) if e.is_fatal() => {
                error!(error = %e, url = self.settings.target, "capture failed permanently");
                return Err(MonitorError::FatalCapture(e));
            }
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    error = %e,
                    url = self.settings.target,
                    consecutive = self.consecutive_failures,
                    baseline_seq = ?self.baseline_seq(),
                    "capture failed, keeping baseline"
                );
                let limit = self.settings.max_consecutive_failures;
                if limit > 0 && self.consecutive_failures >= limit {
                    return Err(MonitorError::TooManyFailures {
                        count: self.consecutive_failures,
                        last: e,
                    });
                }
                return Ok(TickOutcome::CaptureFailed {
                    consecutive: self.consecutive_failures,
                });
            }
        };

        let outcome = match std::mem::replace(&mut self.state, WatchState::Idle) {
            WatchState::Idle => {
                let (width, height) = capture.dimensions();
                info!(seq = capture.seq, width, height, "IDLE→WATCHING: baseline captured");
                TickOutcome::Baseline { seq: capture.seq }
            }
            WatchState::Watching { baseline } => self.compare(&baseline, &capture).await,
        };

        // Both captures in the comparison succeeded, so the new one is the next reference.
        self.state = WatchState::Watching { baseline: capture };
        Ok(outcome)
    }

    async fn compare(&self, baseline: &Capture, capture: &Capture) -> TickOutcome {
        let (baseline_seq, seq) = (baseline.seq, capture.seq);

        let regions = match self
            .detector
            .detect(&baseline.image, &capture.image, self.settings.roi)
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, baseline_seq, seq, "comparison failed");
                return TickOutcome::ComparisonFailed { baseline_seq, seq };
            }
        };

        if regions.is_empty() {
            debug!(baseline_seq, seq, "no changes");
            return TickOutcome::Unchanged { baseline_seq, seq };
        }

        info!(
            baseline_seq,
            seq,
            regions = regions.len(),
            covered_px = regions.covered_area(),
            "changes detected"
        );
        let persisted = self.publish(capture, &regions).await;
        TickOutcome::Changed {
            baseline_seq,
            seq,
            regions,
            persisted,
        }
    }

    /// Render, persist and notify. Returns whether the artifact was written.
    async fn publish(&self, capture: &Capture, regions: &DifferenceSet) -> bool {
        let annotated = match self.renderer.render(&capture.image, regions) {
            Ok(img) => img,
            Err(e) => {
                error!(error = %e, seq = capture.seq, "failed to render overlay");
                return false;
            }
        };

        if let Err(e) = self.artifacts.persist(&annotated, capture).await {
            error!(error = %e, seq = capture.seq, "failed to persist artifact");
            return false;
        }
        info!(path = %self.artifacts.path().display(), seq = capture.seq, "artifact updated");

        if let Some(viewer) = &self.viewer {
            if let Err(e) = viewer.open(self.artifacts.path()).await {
                warn!(error = %e, "viewer notification failed");
            }
        }
        true
    }
}
