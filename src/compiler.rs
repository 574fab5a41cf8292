//! `pdflatex` discovery and scoped compilation.
//!
//! Every compile runs in its own [`tempfile::TempDir`] with the child spawned
//! under `kill_on_drop`, so the directory is removed and the process reaped on
//! every exit path: success, failure, timeout or a dropped request future.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::PdfConfig;

/// Places a `pdflatex` binary is commonly found.
#[cfg(not(windows))]
pub const CANDIDATE_PATHS: &[&str] = &[
    "pdflatex",
    "/usr/bin/pdflatex",
    "/usr/local/bin/pdflatex",
    "/usr/texbin/pdflatex",
    "/Library/TeX/texbin/pdflatex",
    "/opt/homebrew/bin/pdflatex",
    "/bin/pdflatex",
];

/// Places a `pdflatex` binary is commonly found.
#[cfg(windows)]
pub const CANDIDATE_PATHS: &[&str] = &[
    "pdflatex.exe",
    r"C:\Program Files\MiKTeX\miktex\bin\x64\pdflatex.exe",
    r"C:\texlive\2024\bin\windows\pdflatex.exe",
    r"C:\texlive\2023\bin\win64\pdflatex.exe",
];

/// Packages the normalised preamble relies on.
pub const REQUIRED_PACKAGES: &[&str] =
    &["article", "inputenc", "fontenc", "amsmath", "amssymb", "graphicx"];

const TEX_ENV_VARS: &[&str] = &["TEXINPUTS", "TEXMFCNF", "TEXMFHOME"];

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const JOB_NAME: &str = "documento";
const SELF_TEST_JOB: &str = "test";
const SELF_TEST_DOCUMENT: &str = r"\documentclass{article}
\begin{document}
Test document to check that pdflatex works.
\end{document}
";
const LOG_TAIL_CHARS: usize = 1000;
const STDOUT_PREVIEW_CHARS: usize = 300;

/// A usable compiler binary.
#[derive(Debug, Clone)]
pub struct Detected {
    pub path: PathBuf,
    /// First line of `--version`.
    pub version: String,
}

/// Outcome of probing one candidate path.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub path: String,
    pub found: bool,
    pub message: String,
}

/// PDF produced by a successful compile.
#[derive(Debug, Clone)]
pub struct CompiledPdf {
    pub bytes: Vec<u8>,
    pub log_tail: String,
}

/// Why a compile produced no PDF.
#[derive(Debug, thiserror::Error)]
pub enum CompileFailure {
    #[error("pdflatex is not available on this host")]
    Unavailable,

    #[error("could not prepare compilation: {0}")]
    Io(#[from] io::Error),

    #[error("pdflatex exited with status {}", .exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string()))]
    Failed {
        exit_code: Option<i32>,
        diagnostics: String,
    },

    #[error("pdflatex finished but produced no PDF")]
    NoOutput { diagnostics: String },

    #[error("pdflatex did not finish within {}s", .timeout.as_secs())]
    Timeout {
        timeout: Duration,
        diagnostics: String,
    },
}

impl CompileFailure {
    /// Captured compiler output, when the compiler ran.
    #[must_use]
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::Failed { diagnostics, .. }
            | Self::NoOutput { diagnostics }
            | Self::Timeout { diagnostics, .. } => Some(diagnostics),
            Self::Unavailable | Self::Io(_) => None,
        }
    }
}

/// Everything observed during one run in a work directory.
#[derive(Debug, Default)]
struct CompileRun {
    command: String,
    exit_code: Option<i32>,
    success: bool,
    timed_out: bool,
    stdout: String,
    stderr: String,
    pdf: Option<Vec<u8>>,
    log_tail: String,
    files: Vec<String>,
}

impl CompileRun {
    fn diagnostics(&self) -> String {
        let mut out = format!(
            "command: {}\nexit code: {}\n",
            self.command,
            self.exit_code
                .map_or_else(|| "none".to_string(), |c| c.to_string())
        );
        if !self.stderr.trim().is_empty() {
            out.push_str("--- stderr ---\n");
            out.push_str(self.stderr.trim_end());
            out.push('\n');
        }
        if !self.log_tail.is_empty() {
            out.push_str("--- log ---\n");
            out.push_str(&self.log_tail);
        } else if !self.stdout.trim().is_empty() {
            out.push_str("--- stdout ---\n");
            out.push_str(tail(&self.stdout, LOG_TAIL_CHARS));
        }
        out
    }

    fn into_pdf(self, timeout: Duration) -> Result<CompiledPdf, CompileFailure> {
        if self.timed_out {
            return Err(CompileFailure::Timeout {
                timeout,
                diagnostics: self.diagnostics(),
            });
        }
        if !self.success {
            return Err(CompileFailure::Failed {
                exit_code: self.exit_code,
                diagnostics: self.diagnostics(),
            });
        }
        match self.pdf {
            Some(bytes) => Ok(CompiledPdf {
                bytes,
                log_tail: self.log_tail,
            }),
            None => Err(CompileFailure::NoOutput {
                diagnostics: self.diagnostics(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Error,
    Timeout,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelfTestStep {
    pub step: u8,
    pub description: &'static str,
    pub status: StepStatus,
}

/// Result of `GET /pdf/test-pdflatex`.
#[derive(Debug, Clone, Serialize)]
pub struct SelfTestReport {
    pub pdflatex_available: bool,
    pub simple_mode: bool,
    pub steps: Vec<SelfTestStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    pub pdf_exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_tail: Option<String>,
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub conclusion: String,
}

impl SelfTestReport {
    fn new(pdflatex_available: bool, simple_mode: bool) -> Self {
        Self {
            pdflatex_available,
            simple_mode,
            steps: Vec::new(),
            command: None,
            exit_code: None,
            stdout: None,
            stderr: None,
            pdf_exists: false,
            pdf_size: None,
            log_tail: None,
            files: Vec::new(),
            error: None,
            conclusion: String::new(),
        }
    }

    /// Report for a host configured never to compile.
    #[must_use]
    pub fn skipped(pdflatex_available: bool, simple_mode: bool) -> Self {
        Self {
            conclusion: "Test not run: the service is configured for LaTeX-only output".to_string(),
            ..Self::new(pdflatex_available, simple_mode)
        }
    }

    fn step(&mut self, description: &'static str, status: StepStatus) {
        let step = u8::try_from(self.steps.len() + 1).unwrap_or(u8::MAX);
        self.steps.push(SelfTestStep {
            step,
            description,
            status,
        });
    }

    fn fail(mut self, description: &'static str, error: String, conclusion: &str) -> Self {
        self.step(description, StepStatus::Error);
        self.error = Some(error);
        self.conclusion = conclusion.to_string();
        self
    }
}

/// Result of `GET /pdf/diagnostico-pdflatex`.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub os: &'static str,
    pub arch: &'static str,
    pub path_env: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub candidates: Vec<ProbeResult>,
    pub required_packages: &'static [&'static str],
    pub tex_env: BTreeMap<&'static str, Option<String>>,
}

/// Handle to the host's `pdflatex`. Cheap to clone; detection is shared.
#[derive(Debug, Clone)]
pub struct Compiler {
    configured_path: Option<String>,
    simple: bool,
    /// Attempt compilation even when detection found nothing.
    force: bool,
    timeout: Duration,
    detected: Arc<OnceCell<Option<Detected>>>,
}

impl Compiler {
    #[must_use]
    pub fn new(configured_path: Option<String>, simple: bool, timeout: Duration) -> Self {
        Self {
            configured_path: configured_path.filter(|p| !p.trim().is_empty()),
            simple,
            force: false,
            timeout,
            detected: Arc::new(OnceCell::new()),
        }
    }

    #[must_use]
    pub fn from_config(config: &PdfConfig) -> Self {
        Self::new(
            config.pdflatex_path.clone(),
            config.use_simple_pdflatex,
            config.compile_timeout(),
        )
        .forced(config.force_pdf_generation)
    }

    /// Run the first candidate even if it failed the `--version` probe.
    #[must_use]
    pub fn forced(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    #[must_use]
    pub fn is_simple(&self) -> bool {
        self.simple
    }

    fn candidates(&self) -> Vec<&str> {
        match &self.configured_path {
            Some(path) => vec![path.as_str()],
            None => CANDIDATE_PATHS.to_vec(),
        }
    }

    /// First working candidate. Probed once per process.
    pub async fn detect(&self) -> Option<&Detected> {
        self.detected
            .get_or_init(|| async {
                let candidates = self.candidates();
                debug!(count = candidates.len(), "Searching for pdflatex");
                for path in candidates {
                    let probe = probe(path).await;
                    if probe.found {
                        info!(path = %path, version = %probe.message, "pdflatex found");
                        return Some(Detected {
                            path: PathBuf::from(path),
                            version: probe.message,
                        });
                    }
                    debug!(path = %path, reason = %probe.message, "pdflatex candidate rejected");
                }
                warn!("pdflatex not found; PDFs can only be produced as LaTeX fallback");
                None
            })
            .await
            .as_ref()
    }

    pub async fn is_available(&self) -> bool {
        self.detect().await.is_some()
    }

    /// Compile `latex` into a PDF.
    pub async fn compile(&self, latex: &str) -> Result<CompiledPdf, CompileFailure> {
        let program = match self.detect().await {
            Some(detected) => detected.path.clone(),
            None if self.force => self.fallback_program(),
            None => return Err(CompileFailure::Unavailable),
        };
        let workdir = tempfile::Builder::new().prefix("pitorro-").tempdir()?;
        tokio::fs::write(workdir.path().join(format!("{JOB_NAME}.tex")), latex).await?;

        let started = std::time::Instant::now();
        let run = self.run(&program, workdir.path(), JOB_NAME).await?;
        debug!(
            exit_code = ?run.exit_code,
            timed_out = run.timed_out,
            pdf = run.pdf.is_some(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "pdflatex run finished"
        );
        run.into_pdf(self.timeout)
    }

    fn fallback_program(&self) -> PathBuf {
        PathBuf::from(self.candidates().first().copied().unwrap_or("pdflatex"))
    }

    fn args(&self, dir: &Path, job: &str) -> Vec<String> {
        let mut args = vec![
            "-interaction=nonstopmode".to_string(),
            "-output-directory".to_string(),
            dir.to_string_lossy().into_owned(),
        ];
        if self.simple {
            args.push("-no-shell-escape".to_string());
        }
        args.push(format!("{job}.tex"));
        args
    }

    /// Run the compiler over `dir/<job>.tex`: one pass in simple mode, two
    /// otherwise, all under a single deadline.
    async fn run(&self, program: &Path, dir: &Path, job: &str) -> io::Result<CompileRun> {
        let args = self.args(dir, job);
        let mut run = CompileRun {
            command: format!("{} {}", program.display(), args.join(" ")),
            ..CompileRun::default()
        };

        let passes = if self.simple { 1 } else { 2 };
        let deadline = tokio::time::Instant::now() + self.timeout;
        let mut last: Option<Output> = None;
        for _ in 0..passes {
            let child = Command::new(program)
                .args(&args)
                .current_dir(dir)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()?;

            match tokio::time::timeout_at(deadline, child.wait_with_output()).await {
                Ok(output) => {
                    let output = output?;
                    let ok = output.status.success();
                    last = Some(output);
                    if !ok {
                        break;
                    }
                }
                Err(_) => {
                    warn!(timeout_secs = self.timeout.as_secs(), "pdflatex timed out; killed");
                    run.timed_out = true;
                    break;
                }
            }
        }

        if let Some(output) = last {
            run.exit_code = output.status.code();
            run.success = output.status.success() && !run.timed_out;
            run.stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            run.stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        }
        run.pdf = find_pdf(dir, job).await?;
        run.log_tail = match tokio::fs::read(dir.join(format!("{job}.log"))).await {
            Ok(bytes) => tail(&String::from_utf8_lossy(&bytes), LOG_TAIL_CHARS).to_string(),
            Err(_) => String::new(),
        };
        run.files = list_files(dir).await?;
        Ok(run)
    }

    /// Compile a minimal document and report each step.
    pub async fn self_test(&self) -> SelfTestReport {
        let detected = self.detect().await;
        let mut report = SelfTestReport::new(detected.is_some(), self.simple);

        let workdir = match tempfile::Builder::new().prefix("pitorro-test-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                return report.fail(
                    "Create test directory",
                    e.to_string(),
                    "Could not create a temporary directory",
                );
            }
        };
        report.step("Create test directory", StepStatus::Completed);

        let tex = workdir.path().join(format!("{SELF_TEST_JOB}.tex"));
        if let Err(e) = tokio::fs::write(&tex, SELF_TEST_DOCUMENT).await {
            return report.fail(
                "Write minimal LaTeX document",
                e.to_string(),
                "Could not write the test document",
            );
        }
        report.step("Write minimal LaTeX document", StepStatus::Completed);

        let program = detected.map_or_else(|| self.fallback_program(), |d| d.path.clone());
        let run = match self.run(&program, workdir.path(), SELF_TEST_JOB).await {
            Ok(run) => run,
            Err(e) => {
                report.command = Some(format!("{} {}", program.display(), self.args(workdir.path(), SELF_TEST_JOB).join(" ")));
                return report.fail(
                    "Run pdflatex",
                    e.to_string(),
                    "pdflatex is not installed or not on PATH",
                );
            }
        };

        let status = if run.timed_out {
            report.error = Some(format!(
                "pdflatex exceeded the {}s time limit",
                self.timeout.as_secs()
            ));
            StepStatus::Timeout
        } else if run.success {
            StepStatus::Completed
        } else {
            StepStatus::Error
        };
        report.step("Run pdflatex", status);
        report.command = Some(run.command);
        report.exit_code = run.exit_code;
        report.stdout = Some(truncate(&run.stdout, STDOUT_PREVIEW_CHARS));
        report.stderr = (!run.stderr.is_empty()).then_some(run.stderr);
        report.files = run.files;

        report.pdf_exists = run.pdf.is_some();
        report.pdf_size = run.pdf.as_ref().map(Vec::len);
        if report.pdf_exists {
            report.step("Check generated PDF", StepStatus::Completed);
            report.conclusion = "PDF generated successfully".to_string();
        } else {
            report.step("Check generated PDF", StepStatus::Error);
            report.conclusion = "Could not generate the PDF".to_string();
            report.log_tail = (!run.log_tail.is_empty()).then_some(run.log_tail);
        }
        report
    }

    /// Probe every candidate and describe the host's TeX setup.
    pub async fn diagnostics(&self) -> DiagnosticsReport {
        let detected = self.detect().await;
        let mut candidates = Vec::new();
        for path in self.candidates() {
            candidates.push(probe(path).await);
        }

        DiagnosticsReport {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            path_env: std::env::var("PATH").unwrap_or_default(),
            available: detected.is_some(),
            detected_path: detected.map(|d| d.path.display().to_string()),
            version: detected.map(|d| d.version.clone()),
            candidates,
            required_packages: REQUIRED_PACKAGES,
            tex_env: TEX_ENV_VARS
                .iter()
                .map(|name| (*name, std::env::var(name).ok()))
                .collect(),
        }
    }
}

/// Run `<path> --version` with a short bound.
async fn probe(path: &str) -> ProbeResult {
    let output = Command::new(path)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let (found, message) = match tokio::time::timeout(PROBE_TIMEOUT, output).await {
        Err(_) => (false, "timed out".to_string()),
        Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => (false, "file not found".to_string()),
        Ok(Err(e)) => (false, e.to_string()),
        Ok(Ok(out)) if out.status.success() => {
            let stdout = String::from_utf8_lossy(&out.stdout);
            let version = stdout.lines().next().unwrap_or("unknown version").trim();
            (true, version.to_string())
        }
        Ok(Ok(out)) => (
            false,
            format!(
                "exit status {}: {}",
                out.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&out.stderr).trim()
            ),
        ),
    };

    ProbeResult {
        path: path.to_string(),
        found,
        message,
    }
}

/// `<job>.pdf`, else any other PDF in `dir`. Empty files do not count.
async fn find_pdf(dir: &Path, job: &str) -> io::Result<Option<Vec<u8>>> {
    let expected = dir.join(format!("{job}.pdf"));
    if let Ok(bytes) = tokio::fs::read(&expected).await
        && !bytes.is_empty()
    {
        return Ok(Some(bytes));
    }

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path == expected || path.extension().is_none_or(|ext| ext != "pdf") {
            continue;
        }
        let bytes = tokio::fs::read(&path).await?;
        if !bytes.is_empty() {
            debug!(file = %path.display(), "Using alternative PDF output");
            return Ok(Some(bytes));
        }
    }
    Ok(None)
}

async fn list_files(dir: &Path) -> io::Result<Vec<String>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    files.sort();
    Ok(files)
}

/// Last `max` characters of `s`.
pub(crate) fn tail(s: &str, max: usize) -> &str {
    let count = s.chars().count();
    if count <= max {
        return s;
    }
    let start = s
        .char_indices()
        .nth(count - max)
        .map_or(0, |(i, _)| i);
    &s[start..]
}

/// First `max` characters of `s`, with an ellipsis when cut.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => format!("{}...", &s[..i]),
        None => s.to_string(),
    }
}
