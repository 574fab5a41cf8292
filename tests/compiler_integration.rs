//! Compiler behaviour against stub `pdflatex` scripts.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

use pitorro::artifact::{ArtifactContent, ArtifactKind, ArtifactStore};
use pitorro::compiler::{CompileFailure, Compiler};
use pitorro::config::PdfConfig;
use pitorro::pdf::PdfGenerator;

const VERSION_PROBE: &str = r#"if [ "$1" = "--version" ]; then echo "pdfTeX 3.141592653-2.6-1.40.25 (stub)"; exit 0; fi"#;

/// Write an executable `pdflatex` stub whose compile branch runs `body`.
fn stub(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("pdflatex");
    fs::write(&path, format!("#!/bin/sh\n{VERSION_PROBE}\n{body}\n")).expect("write stub");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod stub");
    path
}

fn compiler(path: &Path, timeout: Duration) -> Compiler {
    Compiler::new(Some(path.to_string_lossy().into_owned()), true, timeout)
}

fn pdf_config(path: &Path, latex_fallback: bool) -> PdfConfig {
    PdfConfig {
        force_latex_only: false,
        force_pdf_generation: false,
        use_simple_pdflatex: true,
        latex_fallback,
        pdflatex_path: Some(path.to_string_lossy().into_owned()),
        compile_timeout_seconds: 5,
        artifact_ttl_seconds: 600,
        sweep_interval_seconds: 60,
        max_latex_length: 50_000,
    }
}

#[tokio::test]
#[serial]
async fn test_successful_compile_returns_pdf() {
    let bin = TempDir::new().unwrap();
    let path = stub(
        bin.path(),
        "printf '%%PDF-1.4\\n%%stub\\n' > documento.pdf\necho 'Output written on documento.pdf' > documento.log\nexit 0",
    );

    let compiler = compiler(&path, Duration::from_secs(5));
    let detected = compiler.detect().await.expect("stub detected");
    assert!(detected.version.contains("stub"));

    let pdf = compiler.compile("\\documentclass{article}\\begin{document}x\\end{document}").await.unwrap();
    assert!(pdf.bytes.starts_with(b"%PDF-"));
    assert!(pdf.log_tail.contains("Output written"));
}

#[tokio::test]
#[serial]
async fn test_work_directory_is_removed() {
    let bin = TempDir::new().unwrap();
    let marker = bin.path().join("workdir.txt");
    let path = stub(
        bin.path(),
        &format!("pwd > '{}'\nprintf '%%PDF-1.4' > documento.pdf\nexit 0", marker.display()),
    );

    compiler(&path, Duration::from_secs(5)).compile("x").await.unwrap();

    let workdir = fs::read_to_string(&marker).unwrap();
    assert!(!Path::new(workdir.trim()).exists());
}

#[tokio::test]
#[serial]
async fn test_failed_compile_captures_diagnostics() {
    let bin = TempDir::new().unwrap();
    let path = stub(
        bin.path(),
        "echo '! Undefined control sequence.' > documento.log\necho 'fatal' >&2\nexit 1",
    );

    let err = compiler(&path, Duration::from_secs(5)).compile("\\foo").await.unwrap_err();
    match &err {
        CompileFailure::Failed { exit_code, diagnostics } => {
            assert_eq!(*exit_code, Some(1));
            assert!(diagnostics.contains("Undefined control sequence"));
            assert!(diagnostics.contains("fatal"));
        }
        other => panic!("unexpected failure: {other:?}"),
    }
}

#[tokio::test]
#[serial]
async fn test_success_without_output_is_failure() {
    let bin = TempDir::new().unwrap();
    let path = stub(bin.path(), ": > documento.pdf\nexit 0");

    let err = compiler(&path, Duration::from_secs(5)).compile("x").await.unwrap_err();
    assert!(matches!(err, CompileFailure::NoOutput { .. }));
}

#[tokio::test]
#[serial]
async fn test_hung_compiler_times_out() {
    let bin = TempDir::new().unwrap();
    let path = stub(bin.path(), "exec sleep 30");

    let started = std::time::Instant::now();
    let err = compiler(&path, Duration::from_secs(1)).compile("x").await.unwrap_err();
    assert!(matches!(err, CompileFailure::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
#[serial]
async fn test_full_mode_runs_two_passes() {
    let bin = TempDir::new().unwrap();
    let counter = bin.path().join("passes.txt");
    let path = stub(
        bin.path(),
        &format!("echo pass >> '{}'\nprintf '%%PDF-1.4' > documento.pdf\nexit 0", counter.display()),
    );

    let compiler = Compiler::new(
        Some(path.to_string_lossy().into_owned()),
        false,
        Duration::from_secs(5),
    );
    compiler.compile("x").await.unwrap();
    assert_eq!(fs::read_to_string(&counter).unwrap().lines().count(), 2);
}

#[tokio::test]
#[serial]
async fn test_generator_without_fallback_keeps_store_empty() {
    let bin = TempDir::new().unwrap();
    let path = stub(bin.path(), "echo '! Emergency stop.' > documento.log\nexit 1");

    let config = pdf_config(&path, false);
    let store = ArtifactStore::new(Duration::from_secs(600));
    let generator = PdfGenerator::new(&config, Compiler::from_config(&config), store.clone());

    let err = generator.generate("\\broken").await.unwrap_err();
    assert_eq!(err.code(), "COMPILATION_ERROR");
    assert!(err.body().diagnostics.unwrap().contains("Emergency stop"));
    assert!(store.is_empty());
}

#[tokio::test]
#[serial]
async fn test_generator_falls_back_after_failure() {
    let bin = TempDir::new().unwrap();
    let path = stub(bin.path(), "echo '! Emergency stop.' > documento.log\nexit 1");

    let config = pdf_config(&path, true);
    let store = ArtifactStore::new(Duration::from_secs(600));
    let generator = PdfGenerator::new(&config, Compiler::from_config(&config), store);

    let artifact = generator.generate("Hello").await.unwrap();
    assert_eq!(artifact.kind(), ArtifactKind::LatexOnly);
    assert!(artifact.diagnostics.as_deref().unwrap().contains("Emergency stop"));
    assert!(matches!(&artifact.content, ArtifactContent::Latex(src) if src.contains("Hello")));
}

#[tokio::test]
#[serial]
async fn test_generator_stores_pdf() {
    let bin = TempDir::new().unwrap();
    let path = stub(bin.path(), "printf '%%PDF-1.5 generated' > documento.pdf\nexit 0");

    let config = pdf_config(&path, true);
    let generator = PdfGenerator::new(
        &config,
        Compiler::from_config(&config),
        ArtifactStore::new(Duration::from_secs(600)),
    );

    let artifact = generator.generate("Hello").await.unwrap();
    assert_eq!(artifact.kind(), ArtifactKind::Pdf);
    let fetched = generator.get(&artifact.id).unwrap();
    assert_eq!(fetched.content.as_bytes(), b"%PDF-1.5 generated");
}

#[tokio::test]
#[serial]
async fn test_self_test_reports_steps() {
    let bin = TempDir::new().unwrap();
    let path = stub(bin.path(), "printf '%%PDF-1.4' > test.pdf\necho done\nexit 0");

    let report = compiler(&path, Duration::from_secs(5)).self_test().await;
    assert!(report.pdflatex_available);
    assert_eq!(report.steps.len(), 4);
    assert!(report.pdf_exists);
    assert_eq!(report.pdf_size, Some(8));
    assert_eq!(report.exit_code, Some(0));
    assert!(report.files.contains(&"test.pdf".to_string()));
    assert_eq!(report.conclusion, "PDF generated successfully");
}
