//! # Proctor Core - Exam Lockdown Monitor
//!
//! Browser-side lockdown for a timed online assessment: keep the exam page in
//! fullscreen, turn environment signals into a violation stream, and submit the
//! exam automatically once the warning budget is spent. A best-effort
//! deterrent, not an anti-cheating guarantee.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      SessionController                        │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐  │
//! │  │ SignalSource │ → │  InputGuard  │ → │ ViolationLedger  │  │
//! │  │ (raw events) │   │ (exam/login) │   │ (3 strikes, once)│  │
//! │  └──────────────┘   └──────────────┘   └──────────────────┘  │
//! │         ↓                                       ↓             │
//! │  ┌──────────────────┐                 ┌──────────────────┐   │
//! │  │FullscreenEnforcer│                 │ SubmissionTarget │   │
//! │  │ (retry + sweep)  │                 │   (#submit-…)    │   │
//! │  └──────────────────┘                 └──────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//!   DevToolsHeuristic runs on its own timer and never touches the ledger.
//! ```

pub mod clock;
pub mod config;
pub mod devtools;
pub mod error;
pub mod fullscreen;
pub mod host;
pub mod input_guard;
pub mod ledger;
pub mod session;
pub mod signal;

pub use clock::ExamClock;
pub use config::LockdownConfig;
pub use devtools::{exceeds_threshold, Detector, DevToolsHeuristic, DEVTOOLS_NOTICE};
pub use error::{HostError, LockdownError, LockdownResult};
pub use fullscreen::{EnforcerStats, FullscreenEnforcer, Reconcile};
pub use host::{
    HostBindings, InspectionSink, Notifier, PageContent, PresentationSurface, Severity,
    SubmissionTarget, ViewportProbe, ViewportSample,
};
pub use input_guard::{decide, Decision, InputAction, Profile, ViolationReason};
pub use ledger::{ReportOutcome, TripCause, ViolationLedger, ViolationRecord, TIME_UP_NOTICE, TRIP_NOTICE};
pub use session::{SessionController, SessionEvent, SessionGate, SessionSnapshot, START_NOTICE};
pub use signal::{ClipboardKind, KeyAction, RawEvent, Signal, SignalSource};
