//! Recording fake of the page environment shared by integration tests.

#![allow(dead_code)]

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use proctor_core::{
    HostBindings, HostError, InspectionSink, LockdownConfig, Notifier, PageContent,
    PresentationSurface, SessionController, Severity, SubmissionTarget, ViewportProbe,
    ViewportSample,
};

pub const SELECTOR: &str = "#submit-exam-btn";

pub struct FakePage {
    pub presenting: AtomicBool,
    pub refuse_entry: AtomicBool,
    pub entry_requests: AtomicU32,
    pub exit_requests: AtomicU32,
    pub notices: Mutex<Vec<(String, Severity)>>,
    pub submit_present: AtomicBool,
    pub clicks: AtomicU32,
    pub replaced_with: Mutex<Vec<String>>,
    pub viewport: Mutex<ViewportSample>,
    pub inspector_attached: AtomicBool,
}

impl FakePage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            presenting: AtomicBool::new(false),
            refuse_entry: AtomicBool::new(false),
            entry_requests: AtomicU32::new(0),
            exit_requests: AtomicU32::new(0),
            notices: Mutex::new(Vec::new()),
            submit_present: AtomicBool::new(true),
            clicks: AtomicU32::new(0),
            replaced_with: Mutex::new(Vec::new()),
            viewport: Mutex::new(ViewportSample {
                outer_width: 1280,
                inner_width: 1280,
                outer_height: 800,
                inner_height: 800,
            }),
            inspector_attached: AtomicBool::new(false),
        })
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

    /// User pressed Escape / the browser dropped fullscreen.
    pub fn leave_fullscreen(&self) {
        self.presenting.store(false, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<String> {
        self.notices.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| *s == Severity::Warning)
            .map(|(m, _)| m.clone())
            .collect()
    }

    pub fn clicks(&self) -> u32 {
        self.clicks.load(Ordering::SeqCst)
    }

    pub fn set_viewport_gap(&self, width_gap: u32) {
        let mut v = self.viewport.lock().unwrap();
        v.inner_width = v.outer_width - width_gap;
    }
}

#[async_trait]
impl PresentationSurface for FakePage {
    fn is_presenting(&self) -> bool {
        self.presenting.load(Ordering::SeqCst)
    }

    async fn request_entry(&self) -> Result<(), HostError> {
        self.entry_requests.fetch_add(1, Ordering::SeqCst);
        if self.refuse_entry.load(Ordering::SeqCst) {
            return Err(HostError::Rejected("requires user gesture".into()));
        }
        self.presenting.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn request_exit(&self) -> Result<(), HostError> {
        self.exit_requests.fetch_add(1, Ordering::SeqCst);
        self.presenting.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl Notifier for FakePage {
    fn notify(&self, message: &str, severity: Severity) {
        self.notices.lock().unwrap().push((message.to_string(), severity));
    }
}

impl SubmissionTarget for FakePage {
    fn selector(&self) -> &str {
        SELECTOR
    }

    fn activate(&self) -> Result<(), HostError> {
        if !self.submit_present.load(Ordering::SeqCst) {
            return Err(HostError::TargetMissing(SELECTOR.to_string()));
        }
        self.clicks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl PageContent for FakePage {
    fn replace_with_notice(&self, notice: &str) {
        self.replaced_with.lock().unwrap().push(notice.to_string());
    }
}

impl ViewportProbe for FakePage {
    fn sample(&self) -> ViewportSample {
        *self.viewport.lock().unwrap()
    }
}

impl InspectionSink for FakePage {
    fn inspect(&self, value: &dyn fmt::Debug) {
        if self.inspector_attached.load(Ordering::SeqCst) {
            let _ = format!("{value:?}");
        }
    }
}

pub fn controller(config: LockdownConfig) -> (SessionController, Arc<FakePage>) {
    let page = FakePage::new();
    let controller = SessionController::new(config, page.bindings()).unwrap();
    (controller, page)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
