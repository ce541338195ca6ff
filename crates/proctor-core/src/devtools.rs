//! DevToolsHeuristic: best-effort inspector detection. May false-positive.
//!
//! Two detectors share one terminal action (replace the page with a notice):
//!
//! - **Viewport gap**: a docked inspector shrinks the inner viewport, so an
//!   outer-vs-inner gap above the threshold on either axis is treated as one.
//!   Resizing near the threshold or an undocked inspector fool it either way.
//! - **Tripwire**: a value whose `Debug` formatting fires the action. It is
//!   handed to the page console every tick; only an attached inspector
//!   formats it.
//!
//! Neither detector touches the violation ledger. A spurious fire is not
//! undoable from here.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::host::{InspectionSink, PageContent, ViewportProbe, ViewportSample};
use crate::session::SessionEvent;

pub const DEVTOOLS_NOTICE: &str = "Developer Tools are not allowed!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Detector {
    ViewportGap,
    PropertyTrap,
}

/// True when either axis gap is strictly above `threshold_px`.
pub fn exceeds_threshold(sample: &ViewportSample, threshold_px: u32) -> bool {
    sample.width_gap() > threshold_px || sample.height_gap() > threshold_px
}

struct DetectorInner {
    viewport: Arc<dyn ViewportProbe>,
    inspector: Arc<dyn InspectionSink>,
    page: Arc<dyn PageContent>,
    threshold_px: u32,
    required_samples: u32,
    interval: Duration,
    streak: AtomicU32,
    fired: AtomicBool,
    events: broadcast::Sender<SessionEvent>,
}

#[derive(Clone)]
pub struct DevToolsHeuristic {
    inner: Arc<DetectorInner>,
}

impl DevToolsHeuristic {
    pub fn new(
        viewport: Arc<dyn ViewportProbe>,
        inspector: Arc<dyn InspectionSink>,
        page: Arc<dyn PageContent>,
        threshold_px: u32,
        required_samples: u32,
        interval: Duration,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(DetectorInner {
                viewport,
                inspector,
                page,
                threshold_px,
                required_samples: required_samples.max(1),
                interval,
                streak: AtomicU32::new(0),
                fired: AtomicBool::new(false),
                events,
            }),
        }
    }

    pub fn has_fired(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Feed one viewport sample. Returns true if this sample fired the action.
    pub fn check_viewport(&self, sample: &ViewportSample) -> bool {
        let inner = &self.inner;
        if !exceeds_threshold(sample, inner.threshold_px) {
            inner.streak.store(0, Ordering::SeqCst);
            return false;
        }
        let streak = inner.streak.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            target: "proctor::devtools",
            width_gap = sample.width_gap(),
            height_gap = sample.height_gap(),
            streak,
            "viewport gap over threshold"
        );
        streak >= inner.required_samples && inner.fire(Detector::ViewportGap)
    }

    /// Hand a fresh tripwire to the page console.
    pub fn plant_tripwire(&self) {
        let wire = Tripwire {
            detector: Arc::downgrade(&self.inner),
        };
        self.inner.inspector.inspect(&wire);
    }

    /// One sampling tick: viewport check, then tripwire.
    pub fn tick(&self) {
        let sample = self.inner.viewport.sample();
        if self.check_viewport(&sample) {
            return;
        }
        self.plant_tripwire();
    }

    /// Run on a fixed timer regardless of session state, until it fires.
    pub fn spawn(&self) -> JoinHandle<()> {
        let detector = self.clone();
        let period = self.inner.interval;
        info!(
            target: "proctor::devtools",
            interval_ms = period.as_millis() as u64,
            threshold_px = self.inner.threshold_px,
            "inspector heuristic armed"
        );
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            while !detector.has_fired() {
                interval.tick().await;
                detector.tick();
            }
        })
    }
}

impl DetectorInner {
    /// Terminal action, at most once.
    fn fire(&self, detector: Detector) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        error!(target: "proctor::devtools", ?detector, "inspector detected; replacing page content");
        self.page.replace_with_notice(DEVTOOLS_NOTICE);
        let _ = self.events.send(SessionEvent::DevToolsDetected { detector });
        true
    }
}

/// Bait for the console's object formatter.
pub struct Tripwire {
    detector: Weak<DetectorInner>,
}

impl fmt::Debug for Tripwire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(inner) = self.detector.upgrade() {
            inner.fire(Detector::PropertyTrap);
        }
        f.write_str("Image { id: true }")
    }
}
