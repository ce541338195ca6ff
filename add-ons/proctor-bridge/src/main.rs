//! Proctor bridge
//!
//! Hosts one lockdown session and talks to the page shell over stdio:
//!
//! ```text
//!  shell ──stdin──▶ reader ──reports──▶ BridgeHost (mirror)
//!                     │
//!                     └─events/commands─▶ SessionController ──▶ BridgeHost ──stdout──▶ shell
//! ```
//!
//! Logs go to stderr so stdout carries protocol lines only.

mod host;
mod protocol;

use std::sync::Arc;
use std::time::Duration;

use proctor_core::{LockdownConfig, LockdownResult, SessionController, SessionEvent, Signal};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use host::BridgeHost;
use protocol::{BridgeInput, BridgeOutput, Command};

/// How long a fullscreen request waits for the shell's result before it counts as refused.
const FULLSCREEN_ACK_TIMEOUT: Duration = Duration::from_millis(500);

/// Grace period for flushing queued output on shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[proctor-bridge] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "proctor bridge failed");
        std::process::exit(1);
    }
}

async fn run() -> LockdownResult<()> {
    let config = LockdownConfig::load()?;
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_outputs(out_rx));

    let host = Arc::new(BridgeHost::new(
        out_tx.clone(),
        config.submit_selector.clone(),
        FULLSCREEN_ACK_TIMEOUT,
    ));
    let controller = SessionController::new(config, host.bindings())?;
    controller.watch_devtools();

    let forwarder = forward_events(controller.subscribe(), out_tx.clone());
    let (input_tx, mut input_rx) = mpsc::unbounded_channel();
    let reader = tokio::spawn(read_inputs(Arc::clone(&host), input_tx, out_tx.clone()));

    info!(profile = ?controller.profile(), "proctor bridge started");

    loop {
        tokio::select! {
            input = input_rx.recv() => match input {
                Some(input) => handle_input(&controller, &host, input, &out_tx).await,
                None => {
                    info!("stdin closed; shutting down bridge");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("CTRL-C received; shutting down bridge");
                break;
            }
        }
    }

    if controller.is_active() {
        controller.end_exam().await;
    }

    reader.abort();
    forwarder.abort();
    drop(controller);
    drop(host);
    drop(out_tx);
    if tokio::time::timeout(DRAIN_TIMEOUT, writer).await.is_err() {
        warn!("output not fully drained before exit");
    }
    Ok(())
}

async fn handle_input(
    controller: &SessionController,
    host: &BridgeHost,
    input: BridgeInput,
    out: &mpsc::UnboundedSender<BridgeOutput>,
) {
    match input {
        BridgeInput::Event { seq, event } => {
            let wants_verdict = BridgeInput::wants_verdict(&event);
            let decision = controller.handle_signal(Signal::from(event)).await;
            if let (true, Some(seq)) = (wants_verdict, seq) {
                let _ = out.send(BridgeOutput::Verdict { seq, decision });
            }
        }
        BridgeInput::Report(report) => host.apply(report),
        BridgeInput::Command(Command::StartExam) => {
            controller.start_exam().await;
        }
        BridgeInput::Command(Command::EndExam) => controller.end_exam().await,
        BridgeInput::Command(Command::Snapshot) => {
            let _ = out.send(BridgeOutput::Snapshot(controller.snapshot()));
        }
    }
}

/// Reports are applied here so a pending fullscreen request can be answered
/// while the controller is still awaiting it.
async fn read_inputs(
    host: Arc<BridgeHost>,
    inputs: mpsc::UnboundedSender<BridgeInput>,
    out: mpsc::UnboundedSender<BridgeOutput>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut next_seq: u64 = 0;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let forwarded = match protocol::parse_line(&line) {
            Ok(BridgeInput::Report(report)) => {
                host.apply(report);
                continue;
            }
            Ok(BridgeInput::Event { seq, event }) => {
                next_seq += 1;
                BridgeInput::Event {
                    seq: Some(seq.unwrap_or(next_seq)),
                    event,
                }
            }
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "malformed input line");
                let _ = out.send(BridgeOutput::Error {
                    message: e.to_string(),
                });
                continue;
            }
        };
        if inputs.send(forwarded).is_err() {
            break;
        }
    }
    debug!("input reader finished");
}

fn forward_events(
    mut events: broadcast::Receiver<SessionEvent>,
    out: mpsc::UnboundedSender<BridgeOutput>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if out.send(BridgeOutput::Event(event)).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "session events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn write_outputs(mut outputs: mpsc::UnboundedReceiver<BridgeOutput>) {
    let mut stdout = tokio::io::stdout();
    while let Some(output) = outputs.recv().await {
        let mut line = match protocol::encode(&output) {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "failed to encode output");
                continue;
            }
        };
        line.push('\n');
        if let Err(e) = stdout.write_all(line.as_bytes()).await {
            error!(error = %e, "stdout write failed");
            break;
        }
        if let Err(e) = stdout.flush().await {
            error!(error = %e, "stdout flush failed");
            break;
        }
    }
}
