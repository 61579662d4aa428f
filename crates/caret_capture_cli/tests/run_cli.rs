use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use caret_capture::{EnvConfig, GenerationKind, PipelineError, ScanOptions};
use caret_capture_cli::{run_cli, ApplyMode, CliAction, CliArgs, CliError, Provider};
use generation_provider::StaticCredential;
use generation_provider_mock::MockGenerationClient;
use pretty_assertions::assert_eq;

fn config() -> EnvConfig {
    EnvConfig {
        scan: ScanOptions::immediate(),
        ..EnvConfig::default()
    }
}

fn provider(client: MockGenerationClient, credential: StaticCredential) -> Provider {
    Provider {
        client: Arc::new(client),
        credentials: Arc::new(credential),
    }
}

fn args(action: CliAction, path: PathBuf, apply: ApplyMode, in_place: bool) -> CliArgs {
    CliArgs {
        action,
        path,
        apply,
        caret: None,
        window: 12,
        in_place,
    }
}

#[test]
fn replace_in_place_rewrites_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("draft.txt");
    fs::write(&path, "this draft needs a lot of work to read well").expect("write draft");

    let mut out: Vec<u8> = Vec::new();
    let report = run_cli(
        &args(
            CliAction::Rewrite(GenerationKind::Improve),
            path.clone(),
            ApplyMode::Replace,
            true,
        ),
        &config(),
        provider(
            MockGenerationClient::new(vec!["A polished ".to_string(), "draft.".to_string()]),
            StaticCredential::new("sk-test"),
        ),
        &mut out,
    )
    .expect("run succeeds");

    assert_eq!(report.generated, "A polished draft.");
    assert_eq!(report.status.as_deref(), Some("Text replaced"));
    assert_eq!(fs::read_to_string(&path).expect("read"), "A polished draft.");

    let printed = String::from_utf8(out).expect("utf8");
    assert!(printed.starts_with("Improved Text:\nA polished draft.\n"));
    assert!(printed.contains("Text replaced"));
}

#[test]
fn preview_leaves_the_document_alone() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("notes.txt");
    fs::write(&path, "short notes").expect("write notes");

    let mut out: Vec<u8> = Vec::new();
    let report = run_cli(
        &args(
            CliAction::Ask("summarize".to_string()),
            path.clone(),
            ApplyMode::Preview,
            false,
        ),
        &config(),
        provider(
            MockGenerationClient::one_shot("A summary."),
            StaticCredential::new("sk-test"),
        ),
        &mut out,
    )
    .expect("run succeeds");

    assert_eq!(report.status, None);
    assert_eq!(report.document, "short notes");
    assert_eq!(fs::read_to_string(&path).expect("read"), "short notes");
}

#[test]
fn missing_credential_fails_without_touching_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("draft.txt");
    fs::write(&path, "unchanged").expect("write draft");

    let mut out: Vec<u8> = Vec::new();
    let result = run_cli(
        &args(
            CliAction::Rewrite(GenerationKind::Shorten),
            path.clone(),
            ApplyMode::Replace,
            true,
        ),
        &config(),
        provider(MockGenerationClient::echo(), StaticCredential::missing()),
        &mut out,
    );

    assert!(matches!(
        result,
        Err(CliError::Pipeline(PipelineError::CredentialMissing))
    ));
    assert_eq!(fs::read_to_string(&path).expect("read"), "unchanged");
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");

    let result = run_cli(
        &args(
            CliAction::Rewrite(GenerationKind::Improve),
            dir.path().join("absent.txt"),
            ApplyMode::Preview,
            false,
        ),
        &config(),
        provider(MockGenerationClient::echo(), StaticCredential::new("sk-test")),
        &mut Vec::<u8>::new(),
    );

    assert!(matches!(result, Err(CliError::Io(_))));
}
