//! InputGuard: pure allow/deny policy for keys and clipboard gestures.
//!
//! Two independent rule sets. The exam profile lets navigation through and
//! reports modifier shortcuts while a session is active. The login profile
//! lets literal text through, blocks everything else silently, and never
//! reports: it has no ledger behind it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::signal::{ClipboardKind, KeyAction};

/// Keys the exam page needs for answering and moving between questions.
pub const EXAM_NAVIGATION_KEYS: &[&str] =
    &["Tab", "Enter", "ArrowLeft", "ArrowRight", "ArrowUp", "ArrowDown"];

/// Editing keys the login form accepts on top of literal characters.
pub const LOGIN_EDITING_KEYS: &[&str] = &["Delete", "ArrowLeft", "ArrowRight", "Tab", "Enter"];

/// Function, media and OS keys the login page swallows.
pub const LOGIN_BLOCKED_KEYS: &[&str] = &[
    "Escape", "Insert", "PrintScreen", "Alt", "AltGraph", "Meta", "OS", "Win", "Windows",
    "Command", "CommandOrControl", "ContextMenu",
    "F1", "F2", "F3", "F4", "F5", "F6", "F7", "F8", "F9", "F10", "F11", "F12",
    "Calculator", "LaunchApp1", "LaunchApp2", "LaunchApplication1", "LaunchApplication2",
    "LaunchMail", "LaunchMediaPlayer", "LaunchMusicPlayer", "LaunchScreenSaver",
    "LaunchSpreadsheet", "LaunchWebBrowser", "LaunchWebCam", "LaunchWordProcessor",
    "MediaPlayPause", "MediaStop", "MediaTrackNext", "MediaTrackPrevious",
    "AudioVolumeMute", "AudioVolumeUp", "AudioVolumeDown",
    "BrowserBack", "BrowserForward", "BrowserHome", "BrowserRefresh", "BrowserSearch",
];

/// Inspector hotkey swallowed on the exam page.
const INSPECTOR_KEY: &str = "F12";

/// Named rule set in force for a page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Exam,
    Login,
}

/// Why an input was reported to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationReason {
    FullscreenExited,
    TabHidden,
    FocusLost,
    KeyboardShortcut,
}

impl ViolationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullscreenExited => "Fullscreen mode was exited",
            Self::TabHidden => "Tab change detected",
            Self::FocusLost => "Window focus lost",
            Self::KeyboardShortcut => "Keyboard shortcut detected",
        }
    }
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user action subject to the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    Key(KeyAction),
    Clipboard(ClipboardKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    BlockSilent,
    BlockAndReport(ViolationReason),
}

/// Total over every `(action, profile, session_active)` triple.
pub fn decide(action: &InputAction, profile: Profile, session_active: bool) -> Decision {
    match profile {
        Profile::Exam => decide_exam(action, session_active),
        Profile::Login => decide_login(action),
    }
}

fn decide_exam(action: &InputAction, session_active: bool) -> Decision {
    let key = match action {
        InputAction::Clipboard(ClipboardKind::ContextMenu)
        | InputAction::Clipboard(ClipboardKind::Copy)
        | InputAction::Clipboard(ClipboardKind::Paste)
        | InputAction::Clipboard(ClipboardKind::Cut)
        | InputAction::Clipboard(ClipboardKind::DragStart)
        | InputAction::Clipboard(ClipboardKind::Drop)
        | InputAction::Clipboard(ClipboardKind::SelectStart) => return Decision::BlockSilent,
        InputAction::Key(key) => key,
    };

    if EXAM_NAVIGATION_KEYS.contains(&key.key.as_str()) {
        return Decision::Allow;
    }

    if key.has_command_modifier() && !key.is_modifier_key() {
        return if session_active {
            Decision::BlockAndReport(ViolationReason::KeyboardShortcut)
        } else {
            Decision::BlockSilent
        };
    }

    if key.key == "Escape" || key.key == INSPECTOR_KEY {
        return Decision::BlockSilent;
    }

    Decision::Allow
}

fn decide_login(action: &InputAction) -> Decision {
    let key = match action {
        InputAction::Clipboard(ClipboardKind::ContextMenu)
        | InputAction::Clipboard(ClipboardKind::SelectStart)
        | InputAction::Clipboard(ClipboardKind::DragStart)
        | InputAction::Clipboard(ClipboardKind::Drop) => return Decision::BlockSilent,
        InputAction::Clipboard(_) => return Decision::Allow,
        InputAction::Key(key) => key,
    };

    let literal = key.is_single_character() && !key.has_command_modifier();
    if literal || LOGIN_EDITING_KEYS.contains(&key.key.as_str()) {
        return Decision::Allow;
    }

    if key.has_command_modifier() {
        return Decision::BlockSilent;
    }

    if LOGIN_BLOCKED_KEYS.contains(&key.key.as_str()) {
        return Decision::BlockSilent;
    }

    Decision::Allow
}
