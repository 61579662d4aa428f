//! Whole-document capture through a bounded caret window, feeding a streamed
//! text rewrite back into the document.
//!
//! Invariant: the scanner never mutates the document. Only
//! [`CaptureSession::replace`] and [`CaptureSession::insert`] issue
//! `delete_backward` or `insert_text`, and only after a generation succeeded.
//!
//! # Public API Overview
//! - Capture a document with [`DocumentScanner`] or [`capture`].
//! - Assemble streamed responses into snapshots with [`StreamAssembler`].
//! - Run actions (rewrite, ask, retry, replace, insert) through a
//!   [`CaptureSession`], in the foreground or via [`spawn_pipeline`] /
//!   [`PipelineDriver`].
//! - Keep caret calls on their owning context with [`proxy_channel`] or
//!   [`spawn_owner`].

pub mod assembler;
pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod owner;
pub mod pipeline;
pub mod scanner;

pub use crate::assembler::{AssembledStream, StreamAssembler, StreamState};
pub use crate::config::EnvConfig;
pub use crate::driver::{spawn_pipeline, DoneCallback, PipelineDriver, PipelineRun, ProgressCallback};
pub use crate::error::{PipelineError, ScanStalledWarning};
pub use crate::logging::init_logging;
pub use crate::owner::{proxy_channel, spawn_owner, OwnerThread, ProxyHandle, ProxyInbox};
pub use crate::pipeline::{
    truncate_to_budget, ActionOutcome, ApplyReport, Budget, CaptureSession, GenerationOutcome,
    PendingResult, PipelineConfig, PipelineEvent, SessionAction, TruncatedInput,
};
pub use crate::scanner::{
    capture, capture_with, measure_probe, CaptureResult, Direction, DocumentScanner,
    ProbeMeasurement, ScanOptions, ScanProgress, DEFAULT_MAX_HOPS,
};

pub use caret_proxy::{CaretWindow, CaretWindowProxy};
pub use generation_provider::{
    CancelSignal, CredentialProvider, EnvCredentialProvider, GenerationClient, GenerationError,
    GenerationKind, GenerationSettings, StaticCredential,
};
