//! Seams to the page environment.
//!
//! The core never touches a DOM directly. Each capability it needs is a trait
//! object handed in at construction, so the same state machine runs behind a
//! wasm binding, the JSON-lines bridge, or the recording fakes used in tests.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HostError;

/// Banner severity for the notification surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => f.write_str("info"),
            Self::Warning => f.write_str("warning"),
        }
    }
}

/// Exclusive presentation (fullscreen) mode of the document.
#[async_trait]
pub trait PresentationSurface: Send + Sync {
    /// True when any vendor's fullscreen element is currently set.
    fn is_presenting(&self) -> bool;

    /// Ask the browser to enter presentation mode. May be refused outside a user gesture.
    async fn request_entry(&self) -> Result<(), HostError>;

    async fn request_exit(&self) -> Result<(), HostError>;
}

/// Transient, auto-dismissing banner owned by the presentation layer.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}

/// The exam's submission control, located by a stable selector.
pub trait SubmissionTarget: Send + Sync {
    fn selector(&self) -> &str;

    /// Run the element's default activation. `Err(TargetMissing)` when nothing matches.
    fn activate(&self) -> Result<(), HostError>;
}

/// Terminal page action used by the inspector heuristic.
pub trait PageContent: Send + Sync {
    fn replace_with_notice(&self, notice: &str);
}

/// Window dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportSample {
    pub outer_width: u32,
    pub inner_width: u32,
    pub outer_height: u32,
    pub inner_height: u32,
}

impl ViewportSample {
    pub fn width_gap(&self) -> u32 {
        self.outer_width.saturating_sub(self.inner_width)
    }

    pub fn height_gap(&self) -> u32 {
        self.outer_height.saturating_sub(self.inner_height)
    }
}

pub trait ViewportProbe: Send + Sync {
    fn sample(&self) -> ViewportSample;
}

/// The page's inspection console. A real console only formats values while an
/// inspector is attached; that formatting pass is what the tripwire relies on.
pub trait InspectionSink: Send + Sync {
    fn inspect(&self, value: &dyn fmt::Debug);
}

/// Everything the core needs from the page, bundled for construction.
#[derive(Clone)]
pub struct HostBindings {
    pub surface: Arc<dyn PresentationSurface>,
    pub notifier: Arc<dyn Notifier>,
    pub submission: Arc<dyn SubmissionTarget>,
    pub page: Arc<dyn PageContent>,
    pub viewport: Arc<dyn ViewportProbe>,
    pub inspector: Arc<dyn InspectionSink>,
}

impl fmt::Debug for HostBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBindings")
            .field("submit_selector", &self.submission.selector())
            .finish_non_exhaustive()
    }
}
