//! End-to-end behaviour of the lockdown against a recording fake page.
//!
//! - Warning budget: ordering, cap, exactly-once submission
//! - Session lifecycle: reset on start, nothing while inactive
//! - Fullscreen enforcement: retries, sweep, exit only on end
//! - Inspector heuristic: viewport gap and tripwire, outside the ledger

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{controller, init_tracing};
use proctor_core::{
    ClipboardKind, Decision, KeyAction, LockdownConfig, Profile, RawEvent, SessionEvent, Signal,
    SignalSource, TripCause, ViolationReason, DEVTOOLS_NOTICE, START_NOTICE, TIME_UP_NOTICE,
    TRIP_NOTICE,
};

fn drain(rx: &mut tokio::sync::broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn two_fullscreen_exits_and_a_shortcut_submit_once() {
    init_tracing();
    let (session, page) = controller(LockdownConfig::default());

    session.start_exam().await;
    assert!(page.presenting.load(Ordering::SeqCst));
    assert_eq!(page.messages(), vec![START_NOTICE.to_string()]);

    page.leave_fullscreen();
    session.handle_signal(Signal::PresentationModeChanged).await;
    page.leave_fullscreen();
    session.handle_signal(Signal::PresentationModeChanged).await;
    let decision = session
        .handle_signal(Signal::KeyPressed(KeyAction::with_ctrl("c")))
        .await;

    assert_eq!(
        decision,
        Decision::BlockAndReport(ViolationReason::KeyboardShortcut)
    );
    assert_eq!(
        page.warnings(),
        vec![
            "Warning 1/3: Fullscreen mode was exited".to_string(),
            "Warning 2/3: Fullscreen mode was exited".to_string(),
            "Warning 3/3: Keyboard shortcut detected".to_string(),
            TRIP_NOTICE.to_string(),
        ]
    );
    assert_eq!(page.clicks(), 1);

    // Past the budget nothing more is counted or submitted.
    session.handle_signal(Signal::WindowBlurred).await;
    let snap = session.snapshot();
    assert_eq!(snap.count, 3);
    assert_eq!(snap.trip_cause, Some(TripCause::WarningsExhausted));
    assert_eq!(page.clicks(), 1);

    // Each exit was fought back.
    assert!(page.presenting.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn ending_under_budget_does_not_submit_and_restart_resets() {
    let (session, page) = controller(LockdownConfig::default());

    session.start_exam().await;
    session.handle_signal(Signal::WindowBlurred).await;
    assert_eq!(session.snapshot().count, 1);

    session.end_exam().await;
    assert_eq!(page.clicks(), 0);
    assert!(!session.is_active());
    assert_eq!(page.exit_requests.load(Ordering::SeqCst), 1);

    session.start_exam().await;
    let snap = session.snapshot();
    assert!(snap.active);
    assert_eq!(snap.count, 0);
    assert!(snap.records.is_empty());
}

#[tokio::test(start_paused = true)]
async fn login_profile_blocks_modified_letters_without_reporting() {
    let config = LockdownConfig {
        profile: Profile::Login,
        ..Default::default()
    };
    let (session, page) = controller(config);

    for active in [false, true] {
        if active {
            session.start_exam().await;
        }
        assert_eq!(
            session
                .handle_signal(Signal::KeyPressed(KeyAction::plain("a")))
                .await,
            Decision::Allow
        );
        assert_eq!(
            session
                .handle_signal(Signal::KeyPressed(KeyAction::with_ctrl("a")))
                .await,
            Decision::BlockSilent
        );
        assert_eq!(
            session
                .handle_signal(Signal::ClipboardOrDragAttempted {
                    kind: ClipboardKind::ContextMenu
                })
                .await,
            Decision::BlockSilent
        );
    }

    assert_eq!(session.snapshot().count, 0);
    assert!(page.warnings().is_empty());
}

#[tokio::test(start_paused = true)]
async fn viewport_gap_threshold_decides_terminal_action() {
    let (session, page) = controller(LockdownConfig::default());
    session.start_exam().await;

    page.set_viewport_gap(100);
    session.devtools().tick();
    assert!(page.replaced_with.lock().unwrap().is_empty());

    page.set_viewport_gap(200);
    session.devtools().tick();
    assert_eq!(
        page.replaced_with.lock().unwrap().as_slice(),
        [DEVTOOLS_NOTICE.to_string()]
    );

    // The heuristic never feeds the ledger.
    assert_eq!(session.snapshot().count, 0);
    assert!(session.snapshot().devtools_fired);
}

#[tokio::test(start_paused = true)]
async fn devtools_watch_runs_without_a_session() {
    let (session, page) = controller(LockdownConfig::default());
    let mut events = session.subscribe();
    session.watch_devtools();

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert!(page.replaced_with.lock().unwrap().is_empty());

    page.inspector_attached.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1_000)).await;

    assert_eq!(page.replaced_with.lock().unwrap().len(), 1);
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, SessionEvent::DevToolsDetected { .. })));
    assert!(!session.is_active());
}

#[tokio::test(start_paused = true)]
async fn inactive_session_ignores_every_signal() {
    let (session, page) = controller(LockdownConfig::default());

    let signals = vec![
        Signal::PresentationModeChanged,
        Signal::PageVisibilityChanged { hidden: true },
        Signal::PageVisibilityChanged { hidden: false },
        Signal::WindowBlurred,
        Signal::WindowFocused,
        Signal::KeyPressed(KeyAction::with_ctrl("v")),
        Signal::KeyPressed(KeyAction::plain("Escape")),
        Signal::ClipboardOrDragAttempted {
            kind: ClipboardKind::Paste,
        },
    ];
    for signal in signals {
        session.handle_signal(signal).await;
    }

    assert_eq!(session.snapshot().count, 0);
    assert!(page.messages().is_empty());
    assert_eq!(page.entry_requests.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn restart_after_trip_allows_one_more_submission() {
    let (session, page) = controller(LockdownConfig::default());

    session.start_exam().await;
    for _ in 0..3 {
        session
            .handle_signal(Signal::PageVisibilityChanged { hidden: true })
            .await;
    }
    assert_eq!(page.clicks(), 1);

    session.start_exam().await;
    let snap = session.snapshot();
    assert_eq!(snap.count, 0);
    assert_eq!(snap.trip_cause, None);

    for _ in 0..4 {
        session.handle_signal(Signal::WindowBlurred).await;
    }
    assert_eq!(page.clicks(), 2);
}

#[tokio::test(start_paused = true)]
async fn exit_is_only_requested_by_end_exam() {
    let (session, page) = controller(LockdownConfig::default());
    session.start_exam().await;

    for _ in 0..3 {
        page.leave_fullscreen();
        session.handle_signal(Signal::WindowFocused).await;
        session
            .handle_signal(Signal::KeyPressed(KeyAction::plain("Escape")))
            .await;
        session.handle_signal(Signal::PresentationModeChanged).await;
    }
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(page.exit_requests.load(Ordering::SeqCst), 0);

    session.end_exam().await;
    assert_eq!(page.exit_requests.load(Ordering::SeqCst), 1);
    assert!(!page.presenting.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn refused_entry_is_retried_until_a_gesture_lands() {
    let (session, page) = controller(LockdownConfig::default());
    page.refuse_entry.store(true, Ordering::SeqCst);

    session.start_exam().await;
    tokio::time::sleep(Duration::from_millis(520)).await;
    assert!(page.entry_requests.load(Ordering::SeqCst) >= 10);
    assert!(session.enforcer().is_retrying());

    page.refuse_entry.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(page.presenting.load(Ordering::SeqCst));
    assert!(!session.enforcer().is_retrying());
}

#[tokio::test(start_paused = true)]
async fn end_exam_stops_retrying() {
    let (session, page) = controller(LockdownConfig::default());
    page.refuse_entry.store(true, Ordering::SeqCst);

    session.start_exam().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    session.end_exam().await;

    let settled = page.entry_requests.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(page.entry_requests.load(Ordering::SeqCst), settled);
}

#[tokio::test(start_paused = true)]
async fn sweep_restores_fullscreen_without_signals() {
    let (session, page) = controller(LockdownConfig::default());
    session.start_exam().await;

    page.leave_fullscreen();
    tokio::time::sleep(Duration::from_millis(1_050)).await;

    assert!(page.presenting.load(Ordering::SeqCst));
    // The sweep re-enters but does not count a violation on its own.
    assert_eq!(session.snapshot().count, 0);
}

#[tokio::test(start_paused = true)]
async fn escape_is_swallowed_and_rearms_fullscreen() {
    let (session, page) = controller(LockdownConfig::default());
    session.start_exam().await;
    page.leave_fullscreen();

    let decision = session
        .handle_signal(Signal::KeyPressed(KeyAction::plain("Escape")))
        .await;

    assert_eq!(decision, Decision::BlockSilent);
    assert!(page.presenting.load(Ordering::SeqCst));
    assert_eq!(session.snapshot().count, 0);
}

#[tokio::test(start_paused = true)]
async fn returning_to_the_tab_rearms_fullscreen_without_a_warning() {
    let (session, page) = controller(LockdownConfig::default());
    session.start_exam().await;
    let before = page.entry_requests.load(Ordering::SeqCst);
    page.leave_fullscreen();

    let decision = session
        .handle_signal(Signal::PageVisibilityChanged { hidden: false })
        .await;

    assert_eq!(decision, Decision::Allow);
    assert!(page.presenting.load(Ordering::SeqCst));
    assert_eq!(page.entry_requests.load(Ordering::SeqCst), before + 1);
    assert_eq!(session.snapshot().count, 0);
    assert!(page.warnings().is_empty());
}

#[tokio::test(start_paused = true)]
async fn missing_submit_button_is_reported_to_host() {
    let (session, page) = controller(LockdownConfig::default());
    page.submit_present.store(false, Ordering::SeqCst);
    let mut events = session.subscribe();

    session.start_exam().await;
    for _ in 0..3 {
        session.handle_signal(Signal::WindowBlurred).await;
    }

    let events = drain(&mut events);
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::ConfigurationError { message } if message.contains("#submit-exam-btn"))));
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::Submitted { .. })));
    assert_eq!(session.snapshot().trip_cause, Some(TripCause::WarningsExhausted));
}

#[tokio::test(start_paused = true)]
async fn time_limit_submits_through_the_same_guard() {
    let config = LockdownConfig {
        time_limit_secs: Some(60),
        ..Default::default()
    };
    let (session, page) = controller(config);
    session.start_exam().await;
    let snap = session.snapshot();
    assert_eq!(snap.remaining_secs, Some(60));
    assert_eq!(snap.remaining_label.as_deref(), Some("00:01:00"));

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(session.snapshot().remaining_label.as_deref(), Some("00:00:45"));

    tokio::time::sleep(Duration::from_secs(61)).await;

    assert_eq!(page.clicks(), 1);
    assert_eq!(session.snapshot().trip_cause, Some(TripCause::TimeLimit));
    assert!(page.messages().contains(&TIME_UP_NOTICE.to_string()));

    for _ in 0..3 {
        session.handle_signal(Signal::WindowBlurred).await;
    }
    assert_eq!(page.clicks(), 1);
}

#[tokio::test(start_paused = true)]
async fn end_exam_cancels_the_deadline() {
    let config = LockdownConfig {
        time_limit_secs: Some(30),
        ..Default::default()
    };
    let (session, page) = controller(config);
    session.start_exam().await;
    session.end_exam().await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(page.clicks(), 0);
}

#[tokio::test(start_paused = true)]
async fn signal_source_feeds_controller_in_order() {
    let (session, page) = controller(LockdownConfig::default());
    let mut source = SignalSource::new();
    let consumer = {
        let session = session.clone();
        let rx = source.subscribe();
        tokio::spawn(async move { session.consume(rx).await })
    };

    session.start_exam().await;
    page.leave_fullscreen();
    source.dispatch(RawEvent::FullscreenChange);
    source.dispatch(RawEvent::VisibilityChange { hidden: true });
    source.dispatch(RawEvent::Blur);
    tokio::time::sleep(Duration::from_millis(5)).await;

    let reasons: Vec<ViolationReason> = session
        .snapshot()
        .records
        .iter()
        .map(|r| r.reason)
        .collect();
    assert_eq!(
        reasons,
        vec![
            ViolationReason::FullscreenExited,
            ViolationReason::TabHidden,
            ViolationReason::FocusLost,
        ]
    );
    assert_eq!(page.clicks(), 1);

    drop(source);
    tokio_test::assert_ok!(consumer.await);
}
