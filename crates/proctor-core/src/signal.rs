//! SignalSource: raw page events normalized into one ordered signal stream.
//!
//! Vendor-prefixed fullscreen events collapse into a single variant at the
//! serde boundary, so nothing downstream branches per vendor. Each raw event
//! yields exactly one [`Signal`], delivered to every subscriber in arrival order.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// A key-down as the page observed it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyAction {
    /// `KeyboardEvent.key` (e.g. "a", "Tab", "F12", "Control").
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub meta: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub shift: bool,
}

impl KeyAction {
    pub fn plain(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn with_ctrl(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ctrl: true,
            ..Default::default()
        }
    }

    /// Ctrl, Meta or Alt held. Shift alone does not count.
    pub fn has_command_modifier(&self) -> bool {
        self.ctrl || self.meta || self.alt
    }

    /// The key itself is Ctrl, Meta or Alt (pressing Ctrl on its own).
    /// Shift and AltGraph are ordinary keys here, so Ctrl+Shift is a combination.
    pub fn is_modifier_key(&self) -> bool {
        matches!(self.key.as_str(), "Control" | "Meta" | "Alt")
    }

    /// A single character, e.g. a letter, digit, space or punctuation mark.
    pub fn is_single_character(&self) -> bool {
        let mut chars = self.key.chars();
        matches!((chars.next(), chars.next()), (Some(c), None) if !c.is_control())
    }
}

impl fmt::Display for KeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            f.write_str("Ctrl+")?;
        }
        if self.meta {
            f.write_str("Meta+")?;
        }
        if self.alt {
            f.write_str("Alt+")?;
        }
        if self.shift {
            f.write_str("Shift+")?;
        }
        f.write_str(&self.key)
    }
}

/// Clipboard, drag and selection gestures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipboardKind {
    ContextMenu,
    Copy,
    Paste,
    Cut,
    DragStart,
    Drop,
    SelectStart,
}

/// Raw DOM events as the page reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RawEvent {
    #[serde(
        rename = "fullscreenchange",
        alias = "webkitfullscreenchange",
        alias = "mozfullscreenchange",
        alias = "MSFullscreenChange",
        alias = "msfullscreenchange"
    )]
    FullscreenChange,
    #[serde(rename = "visibilitychange")]
    VisibilityChange { hidden: bool },
    #[serde(rename = "blur")]
    Blur,
    #[serde(rename = "focus")]
    Focus,
    #[serde(rename = "keydown")]
    KeyDown(KeyAction),
    #[serde(rename = "contextmenu")]
    ContextMenu,
    #[serde(rename = "copy")]
    Copy,
    #[serde(rename = "paste")]
    Paste,
    #[serde(rename = "cut")]
    Cut,
    #[serde(rename = "dragstart")]
    DragStart,
    #[serde(rename = "drop")]
    Drop,
    #[serde(rename = "selectstart")]
    SelectStart,
}

/// Normalized environment signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    PresentationModeChanged,
    PageVisibilityChanged { hidden: bool },
    WindowBlurred,
    WindowFocused,
    KeyPressed(KeyAction),
    ClipboardOrDragAttempted { kind: ClipboardKind },
}

impl From<RawEvent> for Signal {
    fn from(raw: RawEvent) -> Self {
        match raw {
            RawEvent::FullscreenChange => Signal::PresentationModeChanged,
            RawEvent::VisibilityChange { hidden } => Signal::PageVisibilityChanged { hidden },
            RawEvent::Blur => Signal::WindowBlurred,
            RawEvent::Focus => Signal::WindowFocused,
            RawEvent::KeyDown(key) => Signal::KeyPressed(key),
            RawEvent::ContextMenu => clipboard(ClipboardKind::ContextMenu),
            RawEvent::Copy => clipboard(ClipboardKind::Copy),
            RawEvent::Paste => clipboard(ClipboardKind::Paste),
            RawEvent::Cut => clipboard(ClipboardKind::Cut),
            RawEvent::DragStart => clipboard(ClipboardKind::DragStart),
            RawEvent::Drop => clipboard(ClipboardKind::Drop),
            RawEvent::SelectStart => clipboard(ClipboardKind::SelectStart),
        }
    }
}

fn clipboard(kind: ClipboardKind) -> Signal {
    Signal::ClipboardOrDragAttempted { kind }
}

/// Fan-out of normalized signals to subscribers. No buffering policy beyond the
/// unbounded channels; nothing is coalesced or reordered.
#[derive(Debug, Default)]
pub struct SignalSource {
    subscribers: Vec<mpsc::UnboundedSender<Signal>>,
    dispatched: u64,
}

impl SignalSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Signal> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Normalize and deliver one raw event. Returns the signal that was sent.
    pub fn dispatch(&mut self, raw: RawEvent) -> Signal {
        let signal = Signal::from(raw);
        self.dispatched += 1;
        trace!(target: "proctor::signal", seq = self.dispatched, ?signal, "dispatch");

        // Closed receivers are pruned so a dropped listener does not stall the rest.
        self.subscribers.retain(|tx| match tx.send(signal.clone()) {
            Ok(()) => true,
            Err(_) => {
                debug!(target: "proctor::signal", "subscriber dropped; removing");
                false
            }
        });
        signal
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }
}
