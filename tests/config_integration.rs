use pitorro::config::AppConfig;
use serial_test::serial;
use std::env;
use std::fs;

const MANAGED_VARS: &[&str] = &[
    "PORT",
    "HOST",
    "CONFIG_FILE",
    "ALLOWED_ORIGINS",
    "AI_PROVIDER",
    "GEMINI_MODEL",
    "LLM_MODEL",
    "API_KEY",
    "LLM_API_KEY",
    "LLM_BASE_URL",
    "TIMEOUT_SECONDS",
    "FORCE_LATEX_ONLY_MODE",
    "FORCE_PDF_GENERATION",
    "USE_SIMPLE_PDFLATEX",
    "LATEX_FALLBACK",
    "PDFLATEX_PATH",
    "COMPILE_TIMEOUT_SECONDS",
    "TEMP_FILE_TTL",
    "PITORRO_SERVER__PORT",
    "PITORRO_PDF__ARTIFACT_TTL_SECONDS",
    "PITORRO_AI__MODEL",
];

// Helper to clear environment variables that might interfere with tests
fn clear_env_vars() {
    for var in MANAGED_VARS {
        unsafe {
            env::remove_var(var);
        }
    }
}

fn load() -> Result<AppConfig, config::ConfigError> {
    // Explicit args so the test runner's own flags are not parsed
    AppConfig::load_from_args(["pitorro"])
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = load().expect("defaults must load");
    assert_eq!(config.server.port, 8000);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.ai.provider, "gemini");
    assert_eq!(config.ai.model, "gemini-1.5-flash");
    assert_eq!(config.ai.timeout_seconds, 30);
    assert!(config.ai.api_key().is_none());
    assert!(!config.pdf.force_latex_only);
    assert!(config.pdf.use_simple_pdflatex);
    assert!(config.pdf.latex_fallback);
    assert_eq!(config.pdf.artifact_ttl_seconds, 600);
    assert_eq!(
        config.server.allowed_origins(),
        vec!["https://graditox.netlify.app".to_string()]
    );
}

#[test]
#[serial]
fn test_prefixed_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("PITORRO_SERVER__PORT", "9090");
        env::set_var("PITORRO_PDF__ARTIFACT_TTL_SECONDS", "120");
    }

    let config = load().expect("Failed to load config");
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.pdf.artifact_ttl_seconds, 120);

    clear_env_vars();
}

#[test]
#[serial]
fn test_legacy_env_names() {
    clear_env_vars();
    unsafe {
        env::set_var("API_KEY", "secret");
        env::set_var("GEMINI_MODEL", "gemini-1.5-pro");
        env::set_var("TIMEOUT_SECONDS", "45");
        env::set_var("FORCE_LATEX_ONLY_MODE", "True");
        env::set_var("USE_SIMPLE_PDFLATEX", "no");
        env::set_var("TEMP_FILE_TTL", "300");
        env::set_var("ALLOWED_ORIGINS", "http://localhost:3000, https://example.org");
    }

    let config = load().expect("Failed to load config");
    assert_eq!(config.ai.api_key(), Some("secret"));
    assert_eq!(config.ai.model, "gemini-1.5-pro");
    assert_eq!(config.ai.timeout_seconds, 45);
    assert!(config.pdf.force_latex_only);
    assert!(!config.pdf.use_simple_pdflatex);
    assert_eq!(config.pdf.artifact_ttl_seconds, 300);
    assert_eq!(config.server.allowed_origins().len(), 2);

    clear_env_vars();
}

#[test]
#[serial]
fn test_legacy_beats_prefixed_and_port_beats_both() {
    clear_env_vars();
    unsafe {
        env::set_var("PITORRO_AI__MODEL", "from-prefixed");
        env::set_var("LLM_MODEL", "from-legacy");
        env::set_var("PITORRO_SERVER__PORT", "9000");
        env::set_var("PORT", "9191");
    }

    let config = load().expect("Failed to load config");
    assert_eq!(config.ai.model, "from-legacy");
    assert_eq!(config.server.port, 9191);

    clear_env_vars();
}

#[test]
#[serial]
fn test_openai_without_model_gets_openai_default() {
    clear_env_vars();
    unsafe {
        env::set_var("AI_PROVIDER", "openai");
    }

    let config = load().expect("Failed to load config");
    assert_eq!(config.ai.provider, "openai");
    assert_eq!(config.ai.model, "gpt-4o-mini");

    unsafe {
        env::set_var("LLM_MODEL", "llama3");
    }
    let config = load().expect("Failed to load config");
    assert_eq!(config.ai.model, "llama3");

    clear_env_vars();
}

#[test]
#[serial]
fn test_prefixed_env_single_underscore_after_prefix() {
    clear_env_vars();
    unsafe {
        env::set_var("PITORRO_AI__MODEL", "gemini-1.5-pro");
    }

    let config = load().expect("Failed to load config");
    assert_eq!(config.ai.model, "gemini-1.5-pro");

    clear_env_vars();
}

#[test]
#[serial]
fn test_unparseable_flag_is_ignored() {
    clear_env_vars();
    unsafe {
        env::set_var("LATEX_FALLBACK", "maybe");
    }

    let config = load().expect("Failed to load config");
    assert!(config.pdf.latex_fallback);

    clear_env_vars();
}

#[test]
#[serial]
fn test_conflicting_force_flags_rejected() {
    clear_env_vars();
    unsafe {
        env::set_var("FORCE_LATEX_ONLY_MODE", "1");
        env::set_var("FORCE_PDF_GENERATION", "1");
    }

    assert!(load().is_err());

    clear_env_vars();
}

#[test]
#[serial]
fn test_unknown_provider_rejected() {
    clear_env_vars();
    unsafe {
        env::set_var("AI_PROVIDER", "watson");
    }

    let err = load().unwrap_err();
    assert!(err.to_string().contains("watson"));

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_load() {
    clear_env_vars();

    let dir = tempfile::tempdir().expect("tempdir");
    let file_path = dir.path().join("pitorro.yaml");
    fs::write(
        &file_path,
        r"
server:
  port: 7070
pdf:
  latex_fallback: false
",
    )
    .expect("Failed to write temp config");

    let path = file_path.to_string_lossy().into_owned();
    let config = AppConfig::load_from_args(["pitorro", "--config", &path])
        .expect("Failed to load config from file");
    assert_eq!(config.server.port, 7070);
    assert!(!config.pdf.latex_fallback);

    // CLI flag beats the file
    let config = AppConfig::load_from_args(["pitorro", "--config", &path, "--port", "7171"])
        .expect("Failed to load config from file");
    assert_eq!(config.server.port, 7171);
}

#[test]
#[serial]
fn test_missing_explicit_file_fails() {
    clear_env_vars();
    assert!(AppConfig::load_from_args(["pitorro", "--config", "/nonexistent/pitorro.yaml"]).is_err());
}
