//! FullscreenEnforcer: keeps the document in presentation mode while a session is active.
//!
//! Three triggers feed one reconciliation pass: session start, signals that may
//! mean the mode was left, and a background sweep. A rejected entry request is
//! retried after a fixed delay with no cap until it succeeds or the session
//! ends. Both background tasks are aborted by [`FullscreenEnforcer::release`],
//! which is also the only place an exit request is issued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::host::PresentationSurface;
use crate::session::SessionGate;

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconcile {
    /// Session inactive; the enforcer stands down.
    Inactive,
    AlreadyPresenting,
    Requested,
    /// The browser refused; a retry loop is (or already was) running.
    RetryScheduled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcerStats {
    pub entry_requests: u64,
    pub rejections: u64,
    pub exit_requests: u64,
}

#[derive(Default)]
struct EnforcerTasks {
    sweep: Option<JoinHandle<()>>,
    retry: Option<JoinHandle<()>>,
}

impl EnforcerTasks {
    fn abort_all(&mut self) {
        if let Some(handle) = self.sweep.take() {
            handle.abort();
        }
        if let Some(handle) = self.retry.take() {
            handle.abort();
        }
    }
}

struct Inner {
    surface: Arc<dyn PresentationSurface>,
    gate: SessionGate,
    retry_delay: Duration,
    sweep_interval: Duration,
    tasks: Mutex<EnforcerTasks>,
    entry_requests: AtomicU64,
    rejections: AtomicU64,
    exit_requests: AtomicU64,
}

#[derive(Clone)]
pub struct FullscreenEnforcer {
    inner: Arc<Inner>,
}

impl FullscreenEnforcer {
    pub fn new(
        surface: Arc<dyn PresentationSurface>,
        gate: SessionGate,
        retry_delay: Duration,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                surface,
                gate,
                retry_delay,
                sweep_interval,
                tasks: Mutex::new(EnforcerTasks::default()),
                entry_requests: AtomicU64::new(0),
                rejections: AtomicU64::new(0),
                exit_requests: AtomicU64::new(0),
            }),
        }
    }

    /// Session start: launch the sweep and request entry unconditionally.
    pub async fn engage(&self) -> Reconcile {
        let inner = &self.inner;
        {
            let mut tasks = inner.lock_tasks();
            tasks.abort_all();
            tasks.sweep = Some(inner.spawn_sweep());
        }
        info!(
            target: "proctor::fullscreen",
            sweep_ms = inner.sweep_interval.as_millis() as u64,
            retry_ms = inner.retry_delay.as_millis() as u64,
            "enforcer engaged"
        );
        if !inner.gate.is_active() {
            return Reconcile::Inactive;
        }
        inner.request_entry().await
    }

    /// Re-request entry if the session is active and presentation mode is absent.
    pub async fn reconcile(&self) -> Reconcile {
        self.inner.reconcile().await
    }

    /// Session end: stop fighting and leave presentation mode.
    pub(crate) async fn release(&self) {
        self.inner.lock_tasks().abort_all();
        self.inner.exit_requests.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.inner.surface.request_exit().await {
            debug!(target: "proctor::fullscreen", error = %e, "exit request failed");
        }
        info!(target: "proctor::fullscreen", "enforcer released");
    }

    pub fn is_retrying(&self) -> bool {
        self.inner
            .lock_tasks()
            .retry
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    pub fn stats(&self) -> EnforcerStats {
        EnforcerStats {
            entry_requests: self.inner.entry_requests.load(Ordering::Relaxed),
            rejections: self.inner.rejections.load(Ordering::Relaxed),
            exit_requests: self.inner.exit_requests.load(Ordering::Relaxed),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.get_mut() {
            tasks.abort_all();
        }
    }
}

impl Inner {
    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, EnforcerTasks> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn reconcile(self: &Arc<Self>) -> Reconcile {
        if !self.gate.is_active() {
            return Reconcile::Inactive;
        }
        if self.surface.is_presenting() {
            return Reconcile::AlreadyPresenting;
        }
        self.request_entry().await
    }

    async fn request_entry(self: &Arc<Self>) -> Reconcile {
        self.entry_requests.fetch_add(1, Ordering::Relaxed);
        match self.surface.request_entry().await {
            Ok(()) => Reconcile::Requested,
            Err(e) => {
                self.rejections.fetch_add(1, Ordering::Relaxed);
                debug!(target: "proctor::fullscreen", error = %e, "entry rejected; scheduling retry");
                self.schedule_retry();
                Reconcile::RetryScheduled
            }
        }
    }

    /// At most one retry loop at a time; it owns all further attempts.
    fn schedule_retry(self: &Arc<Self>) {
        let mut tasks = self.lock_tasks();
        if tasks.retry.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        // Weak so an abandoned enforcer does not keep itself alive through its own task.
        let weak = Arc::downgrade(self);
        let delay = self.retry_delay;
        tasks.retry = Some(tokio::spawn(async move {
            let mut attempts: u64 = 0;
            loop {
                tokio::time::sleep(delay).await;
                let Some(inner) = weak.upgrade() else { break };
                if !inner.gate.is_active() || inner.surface.is_presenting() {
                    break;
                }
                attempts += 1;
                inner.entry_requests.fetch_add(1, Ordering::Relaxed);
                match inner.surface.request_entry().await {
                    Ok(()) => {
                        debug!(target: "proctor::fullscreen", attempts, "entry accepted after retry");
                        break;
                    }
                    Err(e) => {
                        inner.rejections.fetch_add(1, Ordering::Relaxed);
                        if attempts % 100 == 0 {
                            warn!(target: "proctor::fullscreen", attempts, error = %e, "fullscreen still refused");
                        }
                    }
                }
            }
        }));
    }

    fn spawn_sweep(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = self.sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                if matches!(inner.reconcile().await, Reconcile::Inactive) {
                    break;
                }
            }
        })
    }
}
