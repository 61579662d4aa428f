//! Runs capture actions against a text file loaded into a simulated host.
//!
//! The file is only reachable through the host's bounded caret window, so
//! every action exercises the same scan, owner-thread and streaming path a
//! real host integration uses.

use std::fs;
use std::io::{self, Write};
use std::sync::mpsc;

use caret_capture::{
    spawn_owner, spawn_pipeline, ActionOutcome, CaptureSession, EnvConfig, PipelineError,
    PipelineEvent, SessionAction,
};
use caret_proxy_mock::SimulatedHost;
use thiserror::Error;
use tracing::{info, warn};

pub mod args;
pub mod providers;

pub use args::{ApplyMode, CliAction, CliArgs, USAGE};
pub use providers::Provider;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Provider(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{}", .0.user_message())]
    Pipeline(#[from] PipelineError),
}

/// What a CLI run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliReport {
    pub generated: String,
    /// Status line of the applied edit, when one was requested.
    pub status: Option<String>,
    /// Document text after the run.
    pub document: String,
}

/// Runs one action end to end, streaming the response to `out`.
pub fn run_cli(
    args: &CliArgs,
    config: &EnvConfig,
    provider: Provider,
    out: &mut dyn Write,
) -> Result<CliReport, CliError> {
    let text = fs::read_to_string(&args.path)?;
    let mut host = SimulatedHost::new(&text).with_window_limit(args.window);
    if let Some(caret) = args.caret {
        host = host.with_caret(caret);
    }

    let (handle, owner) = spawn_owner(host)?;
    let session = CaptureSession::new(handle, provider.client, provider.credentials)
        .with_config(config.pipeline_config());

    let action = match &args.action {
        CliAction::Rewrite(kind) => SessionAction::Run(*kind),
        CliAction::Ask(question) => SessionAction::Ask(question.clone()),
    };

    let (events_tx, events_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel();
    let run = spawn_pipeline(
        session,
        action,
        move |event| {
            let _ = events_tx.send(event);
        },
        move |result| {
            let _ = done_tx.send(result);
        },
    )?;

    let mut printed = String::new();
    for event in events_rx {
        render_event(event, &mut printed, out)?;
    }
    writeln!(out)?;

    let mut session = run.join()?;
    let outcome = done_rx
        .recv()
        .map_err(|_| PipelineError::Worker("action finished without an outcome".to_string()))??;
    let generated = match outcome {
        ActionOutcome::Generated(outcome) => outcome.text,
        ActionOutcome::Applied(report) => report.status,
    };

    let status = match args.apply {
        ApplyMode::Preview => None,
        ApplyMode::Replace => Some(session.replace()?.status),
        ApplyMode::Insert => Some(session.insert()?.status),
    };
    drop(session);

    let host = owner.join()?;
    let document = host.text();
    if let Some(status) = &status {
        writeln!(out, "{status}")?;
        if args.in_place {
            fs::write(&args.path, &document)?;
            info!(path = %args.path.display(), "wrote edited document");
        } else {
            writeln!(out, "{document}")?;
        }
    }

    Ok(CliReport {
        generated,
        status,
        document,
    })
}

fn render_event(
    event: PipelineEvent,
    printed: &mut String,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    match event {
        PipelineEvent::CaptureStarted => info!("capturing document"),
        PipelineEvent::Captured { length, hops, .. } => {
            info!(length, hops, "document captured");
        }
        PipelineEvent::ScanStalled(warning) => warn!("{warning}"),
        PipelineEvent::Truncated {
            original_length,
            budget,
        } => info!(original_length, budget, "input truncated"),
        PipelineEvent::GenerationStarted { kind } => {
            writeln!(out, "{}:", kind.title())?;
        }
        PipelineEvent::Snapshot(state) if !state.is_final => {
            // Snapshots carry the full text; print only what is new.
            match state.accumulated_text.strip_prefix(printed.as_str()) {
                Some(new_text) => write!(out, "{new_text}")?,
                None => write!(out, "\n{}", state.accumulated_text)?,
            }
            out.flush()?;
            *printed = state.accumulated_text;
        }
        PipelineEvent::Snapshot(_) => {}
    }
    Ok(())
}
