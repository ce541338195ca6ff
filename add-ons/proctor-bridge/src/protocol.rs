//! Line protocol spoken with the page shell.
//!
//! Every line is one JSON object tagged by `"type"`. Inbound lines are raw
//! DOM events, host state reports or commands; outbound lines are verdicts
//! and page actions.

use proctor_core::{
    Decision, LockdownError, LockdownResult, RawEvent, SessionEvent, SessionSnapshot, Severity,
    ViewportSample,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const REPORT_TYPES: &[&str] = &[
    "presentation",
    "viewport",
    "inspector",
    "submit_target",
    "fullscreen_result",
];

const COMMAND_TYPES: &[&str] = &["start_exam", "end_exam", "snapshot"];

/// Page state the shell mirrors into the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostReport {
    Presentation { active: bool },
    Viewport(ViewportSample),
    Inspector { attached: bool },
    SubmitTarget { present: bool },
    /// Outcome of a `request_fullscreen` with the same id.
    FullscreenResult {
        id: u64,
        ok: bool,
        #[serde(default)]
        reason: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    StartExam,
    EndExam,
    Snapshot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeInput {
    /// `seq` is echoed in the verdict; the bridge numbers events itself when absent.
    Event { seq: Option<u64>, event: RawEvent },
    Report(HostReport),
    Command(Command),
}

impl BridgeInput {
    /// Key and clipboard events are the ones the shell waits on.
    pub fn wants_verdict(event: &RawEvent) -> bool {
        !matches!(
            event,
            RawEvent::FullscreenChange
                | RawEvent::VisibilityChange { .. }
                | RawEvent::Blur
                | RawEvent::Focus
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeOutput {
    Verdict { seq: u64, decision: Decision },
    RequestFullscreen { id: u64 },
    ExitFullscreen,
    Notify { message: String, severity: Severity },
    Click { selector: String },
    ReplacePage { notice: String },
    Snapshot(SessionSnapshot),
    Event(SessionEvent),
    Error { message: String },
}

pub fn parse_line(line: &str) -> LockdownResult<BridgeInput> {
    let value: Value = serde_json::from_str(line)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| LockdownError::Protocol("missing \"type\" field".to_string()))?;

    if REPORT_TYPES.contains(&kind) {
        return Ok(BridgeInput::Report(serde_json::from_value(value)?));
    }
    if COMMAND_TYPES.contains(&kind) {
        return Ok(BridgeInput::Command(serde_json::from_value(value)?));
    }
    let seq = value.get("seq").and_then(Value::as_u64);
    Ok(BridgeInput::Event {
        seq,
        event: serde_json::from_value(value)?,
    })
}

pub fn encode(output: &BridgeOutput) -> LockdownResult<String> {
    Ok(serde_json::to_string(output)?)
}
