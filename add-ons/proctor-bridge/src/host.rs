//! Host bindings backed by the page shell on the other end of the pipe.
//!
//! Page actions are queued as [`BridgeOutput`] lines; page state is mirrored
//! from the shell's reports. Fullscreen entry is the only round trip: the
//! request carries an id and waits for the matching `fullscreen_result`.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use proctor_core::{
    HostBindings, HostError, InspectionSink, Notifier, PageContent, PresentationSurface,
    Severity, SubmissionTarget, ViewportProbe, ViewportSample,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::protocol::{BridgeOutput, HostReport};

type Pending = HashMap<u64, oneshot::Sender<Result<(), HostError>>>;

pub struct BridgeHost {
    outbox: mpsc::UnboundedSender<BridgeOutput>,
    selector: String,
    ack_timeout: Duration,
    presenting: AtomicBool,
    submit_present: AtomicBool,
    inspector_attached: AtomicBool,
    viewport: Mutex<ViewportSample>,
    next_request: AtomicU64,
    pending: Mutex<Pending>,
}

impl BridgeHost {
    pub fn new(
        outbox: mpsc::UnboundedSender<BridgeOutput>,
        selector: impl Into<String>,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            outbox,
            selector: selector.into(),
            ack_timeout,
            presenting: AtomicBool::new(false),
            submit_present: AtomicBool::new(true),
            inspector_attached: AtomicBool::new(false),
            viewport: Mutex::new(ViewportSample::default()),
            next_request: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn bindings(self: &Arc<Self>) -> HostBindings {
        HostBindings {
            surface: self.clone(),
            notifier: self.clone(),
            submission: self.clone(),
            page: self.clone(),
            viewport: self.clone(),
            inspector: self.clone(),
        }
    }

    /// Fold one state report from the shell into the mirror.
    pub fn apply(&self, report: HostReport) {
        trace!(target: "proctor::bridge", ?report, "host report");
        match report {
            HostReport::Presentation { active } => self.presenting.store(active, Ordering::SeqCst),
            HostReport::Viewport(sample) => *self.lock_viewport() = sample,
            HostReport::Inspector { attached } => {
                self.inspector_attached.store(attached, Ordering::SeqCst)
            }
            HostReport::SubmitTarget { present } => {
                self.submit_present.store(present, Ordering::SeqCst)
            }
            HostReport::FullscreenResult { id, ok, reason } => {
                let Some(waiter) = self.lock_pending().remove(&id) else {
                    debug!(target: "proctor::bridge", id, "late or unknown fullscreen result");
                    return;
                };
                let result = if ok {
                    self.presenting.store(true, Ordering::SeqCst);
                    Ok(())
                } else {
                    Err(HostError::Rejected(
                        reason.unwrap_or_else(|| "refused by the page".to_string()),
                    ))
                };
                let _ = waiter.send(result);
            }
        }
    }

    fn send(&self, output: BridgeOutput) -> Result<(), HostError> {
        self.outbox
            .send(output)
            .map_err(|_| HostError::Unavailable("output channel closed".to_string()))
    }

    fn lock_viewport(&self) -> MutexGuard<'_, ViewportSample> {
        self.viewport.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PresentationSurface for BridgeHost {
    fn is_presenting(&self) -> bool {
        self.presenting.load(Ordering::SeqCst)
    }

    async fn request_entry(&self) -> Result<(), HostError> {
        let id = self.next_request.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(id, tx);

        if let Err(e) = self.send(BridgeOutput::RequestFullscreen { id }) {
            self.lock_pending().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.ack_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(HostError::Unavailable("fullscreen request dropped".to_string())),
            Err(_) => {
                self.lock_pending().remove(&id);
                Err(HostError::Rejected(format!(
                    "no fullscreen result within {}ms",
                    self.ack_timeout.as_millis()
                )))
            }
        }
    }

    async fn request_exit(&self) -> Result<(), HostError> {
        self.presenting.store(false, Ordering::SeqCst);
        self.send(BridgeOutput::ExitFullscreen)
    }
}

impl Notifier for BridgeHost {
    fn notify(&self, message: &str, severity: Severity) {
        if let Err(e) = self.send(BridgeOutput::Notify {
            message: message.to_string(),
            severity,
        }) {
            warn!(target: "proctor::bridge", error = %e, "notice dropped");
        }
    }
}

impl SubmissionTarget for BridgeHost {
    fn selector(&self) -> &str {
        &self.selector
    }

    fn activate(&self) -> Result<(), HostError> {
        if !self.submit_present.load(Ordering::SeqCst) {
            return Err(HostError::TargetMissing(self.selector.clone()));
        }
        self.send(BridgeOutput::Click {
            selector: self.selector.clone(),
        })
    }
}

impl PageContent for BridgeHost {
    fn replace_with_notice(&self, notice: &str) {
        if let Err(e) = self.send(BridgeOutput::ReplacePage {
            notice: notice.to_string(),
        }) {
            warn!(target: "proctor::bridge", error = %e, "page replacement dropped");
        }
    }
}

impl ViewportProbe for BridgeHost {
    fn sample(&self) -> ViewportSample {
        *self.lock_viewport()
    }
}

impl InspectionSink for BridgeHost {
    // The shell reports whether its console is being inspected; only then
    // does the value get formatted.
    fn inspect(&self, value: &dyn fmt::Debug) {
        if self.inspector_attached.load(Ordering::SeqCst) {
            trace!(target: "proctor::bridge", value = ?value, "inspected");
            let _ = format!("{value:?}");
        }
    }
}
