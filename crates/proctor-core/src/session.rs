//! SessionController: `start_exam` / `end_exam` and the signal wiring.
//!
//! Owns the [`SessionGate`] every other component reads. Signals are handled
//! in arrival order: each one is checked against the input guard, folded into
//! the ledger, and may trigger a fullscreen reconciliation pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::ExamClock;
use crate::config::LockdownConfig;
use crate::devtools::{DevToolsHeuristic, Detector};
use crate::error::{LockdownError, LockdownResult};
use crate::fullscreen::{EnforcerStats, FullscreenEnforcer};
use crate::host::{HostBindings, Severity};
use crate::input_guard::{decide, Decision, InputAction, Profile, ViolationReason};
use crate::ledger::{ReportOutcome, TripCause, ViolationLedger, ViolationRecord};
use crate::signal::{KeyAction, Signal};

pub const START_NOTICE: &str = "Exam started. Please do not exit fullscreen mode.";

const EVENT_CAPACITY: usize = 64;

/// Shared read-only view of whether a session is active. Only the controller flips it.
#[derive(Debug, Clone, Default)]
pub struct SessionGate {
    active: Arc<AtomicBool>,
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn open(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    pub(crate) fn close(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Notifications for the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Started {
        session_id: Uuid,
    },
    Violation {
        record: ViolationRecord,
    },
    Tripped {
        cause: TripCause,
        count: u32,
    },
    Submitted {
        selector: String,
    },
    /// The host is misconfigured (e.g. no submission element). Needs attention.
    ConfigurationError {
        message: String,
    },
    Ended {
        session_id: Option<Uuid>,
        count: u32,
        tripped: bool,
    },
    DevToolsDetected {
        detector: Detector,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub active: bool,
    pub session_id: Option<Uuid>,
    pub profile: Profile,
    pub count: u32,
    pub max: u32,
    pub trip_cause: Option<TripCause>,
    pub records: Vec<ViolationRecord>,
    pub remaining_secs: Option<u64>,
    /// `HH:MM:SS` countdown for the timer label.
    pub remaining_label: Option<String>,
    pub fullscreen: EnforcerStats,
    pub devtools_fired: bool,
}

#[derive(Default)]
struct SessionState {
    session_id: Option<Uuid>,
    clock: Option<ExamClock>,
    deadline: Option<JoinHandle<()>>,
    devtools: Option<JoinHandle<()>>,
}

struct ControllerInner {
    config: LockdownConfig,
    gate: SessionGate,
    host: HostBindings,
    ledger: Mutex<ViolationLedger>,
    enforcer: FullscreenEnforcer,
    devtools: DevToolsHeuristic,
    events: broadcast::Sender<SessionEvent>,
    state: Mutex<SessionState>,
}

#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

impl SessionController {
    pub fn new(config: LockdownConfig, host: HostBindings) -> LockdownResult<Self> {
        config.validate()?;

        let gate = SessionGate::new();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let ledger = ViolationLedger::new(
            gate.clone(),
            config.max_warnings,
            Arc::clone(&host.notifier),
            Arc::clone(&host.submission),
        );
        let enforcer = FullscreenEnforcer::new(
            Arc::clone(&host.surface),
            gate.clone(),
            config.retry_delay(),
            config.sweep_interval(),
        );
        let devtools = DevToolsHeuristic::new(
            Arc::clone(&host.viewport),
            Arc::clone(&host.inspector),
            Arc::clone(&host.page),
            config.devtools_threshold_px,
            config.devtools_consecutive_samples,
            config.devtools_interval(),
            events.clone(),
        );

        info!(
            target: "proctor::session",
            profile = ?config.profile,
            max_warnings = config.max_warnings,
            submit_selector = %host.submission.selector(),
            "session controller ready"
        );

        Ok(Self {
            inner: Arc::new(ControllerInner {
                config,
                gate,
                host,
                ledger: Mutex::new(ledger),
                enforcer,
                devtools,
                events,
                state: Mutex::new(SessionState::default()),
            }),
        })
    }

    pub fn gate(&self) -> SessionGate {
        self.inner.gate.clone()
    }

    pub fn is_active(&self) -> bool {
        self.inner.gate.is_active()
    }

    pub fn profile(&self) -> Profile {
        self.inner.config.profile
    }

    pub fn enforcer(&self) -> &FullscreenEnforcer {
        &self.inner.enforcer
    }

    pub fn devtools(&self) -> &DevToolsHeuristic {
        &self.inner.devtools
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Arm the inspector heuristic. Runs independently of sessions; idempotent.
    pub fn watch_devtools(&self) {
        let mut state = self.inner.lock_state();
        if state.devtools.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        state.devtools = Some(self.inner.devtools.spawn());
    }

    /// Begin a session. Calling it mid-session is a full reset.
    pub async fn start_exam(&self) -> Uuid {
        let inner = &self.inner;
        inner.gate.open();
        inner.lock_ledger().reset();

        let session_id = Uuid::new_v4();
        {
            let mut state = inner.lock_state();
            if let Some(old) = state.deadline.take() {
                old.abort();
            }
            let clock = ExamClock::start(inner.config.time_limit());
            state.deadline = clock.limit().map(|limit| spawn_deadline(Arc::downgrade(inner), limit));
            state.clock = Some(clock);
            state.session_id = Some(session_id);
        }

        inner.enforcer.engage().await;
        inner.host.notifier.notify(START_NOTICE, Severity::Info);
        info!(target: "proctor::session", %session_id, "exam started");
        let _ = inner.events.send(SessionEvent::Started { session_id });
        session_id
    }

    /// End the session: close the gate, stop enforcement, leave fullscreen.
    pub async fn end_exam(&self) {
        let inner = &self.inner;
        inner.gate.close();

        let session_id = {
            let mut state = inner.lock_state();
            if let Some(deadline) = state.deadline.take() {
                deadline.abort();
            }
            state.clock = None;
            state.session_id
        };

        inner.enforcer.release().await;

        let (count, tripped) = {
            let ledger = inner.lock_ledger();
            (ledger.count(), ledger.is_tripped())
        };
        info!(target: "proctor::session", ?session_id, count, tripped, "exam ended");
        let _ = inner.events.send(SessionEvent::Ended {
            session_id,
            count,
            tripped,
        });
    }

    /// Handle one signal. For key and clipboard signals the returned decision
    /// tells the page whether to suppress the default action.
    pub async fn handle_signal(&self, signal: Signal) -> Decision {
        let inner = &self.inner;
        let active = inner.gate.is_active();
        debug!(target: "proctor::session", ?signal, active, "signal");

        match signal {
            Signal::PresentationModeChanged => {
                if active && !inner.host.surface.is_presenting() {
                    inner.report(ViolationReason::FullscreenExited);
                    inner.enforcer.reconcile().await;
                }
                Decision::Allow
            }
            Signal::PageVisibilityChanged { hidden: true } => {
                if active {
                    inner.report(ViolationReason::TabHidden);
                }
                Decision::Allow
            }
            Signal::PageVisibilityChanged { hidden: false } | Signal::WindowFocused => {
                inner.enforcer.reconcile().await;
                Decision::Allow
            }
            Signal::WindowBlurred => {
                if active {
                    inner.report(ViolationReason::FocusLost);
                }
                Decision::Allow
            }
            Signal::KeyPressed(key) => self.handle_key(key, active).await,
            Signal::ClipboardOrDragAttempted { kind } => {
                decide(&InputAction::Clipboard(kind), inner.config.profile, active)
            }
        }
    }

    async fn handle_key(&self, key: KeyAction, active: bool) -> Decision {
        let inner = &self.inner;
        let profile = inner.config.profile;
        let rearm = profile == Profile::Exam && key.key == "Escape";

        let decision = decide(&InputAction::Key(key), profile, active);
        if let Decision::BlockAndReport(reason) = decision {
            inner.report(reason);
        }
        if rearm {
            inner.enforcer.reconcile().await;
        }
        decision
    }

    /// Drain a subscription from a `SignalSource` until it closes.
    pub async fn consume(&self, mut signals: mpsc::UnboundedReceiver<Signal>) {
        while let Some(signal) = signals.recv().await {
            self.handle_signal(signal).await;
        }
        debug!(target: "proctor::session", "signal stream closed");
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = &self.inner;
        let (session_id, remaining_secs, remaining_label) = {
            let state = inner.lock_state();
            let clock = state.clock.as_ref();
            (
                state.session_id,
                clock.and_then(ExamClock::remaining).map(|d| d.as_secs()),
                clock.and_then(ExamClock::remaining_label),
            )
        };
        let ledger = inner.lock_ledger();
        SessionSnapshot {
            active: inner.gate.is_active(),
            session_id,
            profile: inner.config.profile,
            count: ledger.count(),
            max: ledger.max(),
            trip_cause: ledger.trip_cause(),
            records: ledger.records().to_vec(),
            remaining_secs,
            remaining_label,
            fullscreen: inner.enforcer.stats(),
            devtools_fired: inner.devtools.has_fired(),
        }
    }
}

impl ControllerInner {
    fn lock_ledger(&self) -> MutexGuard<'_, ViolationLedger> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn report(&self, reason: ViolationReason) {
        let (outcome, failure, count) = {
            let mut ledger = self.lock_ledger();
            let (outcome, failure) = ledger.report(reason);
            (outcome, failure, ledger.count())
        };

        match outcome {
            ReportOutcome::Ignored => {}
            ReportOutcome::Warned(record) => {
                let _ = self.events.send(SessionEvent::Violation { record });
            }
            ReportOutcome::Tripped { record, submitted } => {
                let _ = self.events.send(SessionEvent::Violation { record });
                self.announce_trip(TripCause::WarningsExhausted, count, submitted, failure);
            }
        }
    }

    fn expire(&self) {
        let (result, count) = {
            let mut ledger = self.lock_ledger();
            let result = ledger.expire();
            (result, ledger.count())
        };
        match result {
            Ok(false) => {}
            Ok(true) => self.announce_trip(TripCause::TimeLimit, count, true, None),
            Err(e) => self.announce_trip(TripCause::TimeLimit, count, false, Some(e)),
        }
    }

    fn announce_trip(
        &self,
        cause: TripCause,
        count: u32,
        submitted: bool,
        failure: Option<LockdownError>,
    ) {
        let _ = self.events.send(SessionEvent::Tripped { cause, count });
        if submitted {
            let _ = self.events.send(SessionEvent::Submitted {
                selector: self.host.submission.selector().to_string(),
            });
        }
        if let Some(e) = failure {
            error!(target: "proctor::session", error = %e, "auto-submit failed");
            let _ = self
                .events
                .send(SessionEvent::ConfigurationError { message: e.to_string() });
        }
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        if let Ok(state) = self.state.get_mut() {
            for handle in [state.deadline.take(), state.devtools.take()].into_iter().flatten() {
                handle.abort();
            }
        }
    }
}

fn spawn_deadline(inner: Weak<ControllerInner>, limit: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(limit).await;
        let Some(inner) = inner.upgrade() else { return };
        if !inner.gate.is_active() {
            return;
        }
        warn!(target: "proctor::session", limit_secs = limit.as_secs(), "exam time limit reached");
        inner.expire();
    })
}
