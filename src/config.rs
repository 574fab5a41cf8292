use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::time::Duration;

/// AI providers the converter knows how to talk to.
pub const SUPPORTED_PROVIDERS: &[&str] = &["gemini", "openai"];

/// Model used when none is configured, per provider.
const DEFAULT_MODELS: &[(&str, &str)] = &[("gemini", "gemini-1.5-flash"), ("openai", "gpt-4o-mini")];

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "HOST")]
    pub host: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ai: AiConfig,
    pub pdf: PdfConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Comma separated list; `*` allows any origin.
    pub allowed_origins: String,
    pub request_timeout_seconds: u64,
}

#[derive(Deserialize, Clone)]
pub struct AiConfig {
    pub provider: String,
    /// Blank means the provider's default model.
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PdfConfig {
    pub force_latex_only: bool,
    pub force_pdf_generation: bool,
    pub use_simple_pdflatex: bool,
    /// Store the raw LaTeX when compilation is unavailable or fails.
    pub latex_fallback: bool,
    #[serde(default)]
    pub pdflatex_path: Option<String>,
    pub compile_timeout_seconds: u64,
    pub artifact_ttl_seconds: u64,
    pub sweep_interval_seconds: u64,
    pub max_latex_length: usize,
}

/// Legacy variable names (kept for existing deployments) mapped to config keys.
/// Later entries win when several map to the same key.
const LEGACY_STRINGS: &[(&str, &str)] = &[
    ("ALLOWED_ORIGINS", "server.allowed_origins"),
    ("AI_PROVIDER", "ai.provider"),
    ("LLM_MODEL", "ai.model"),
    ("GEMINI_MODEL", "ai.model"),
    ("LLM_API_KEY", "ai.api_key"),
    ("API_KEY", "ai.api_key"),
    ("LLM_BASE_URL", "ai.base_url"),
    ("PDFLATEX_PATH", "pdf.pdflatex_path"),
];

const LEGACY_NUMBERS: &[(&str, &str)] = &[
    ("TIMEOUT_SECONDS", "ai.timeout_seconds"),
    ("COMPILE_TIMEOUT_SECONDS", "pdf.compile_timeout_seconds"),
    ("TEMP_FILE_TTL", "pdf.artifact_ttl_seconds"),
];

const LEGACY_FLAGS: &[(&str, &str)] = &[
    ("FORCE_LATEX_ONLY_MODE", "pdf.force_latex_only"),
    ("FORCE_PDF_GENERATION", "pdf.force_pdf_generation"),
    ("USE_SIMPLE_PDFLATEX", "pdf.use_simple_pdflatex"),
    ("LATEX_FALLBACK", "pdf.latex_fallback"),
];

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args).map_err(|e| ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("server.port", 8000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.allowed_origins", "https://graditox.netlify.app")?
            .set_default("server.request_timeout_seconds", 120)?
            .set_default("ai.provider", "gemini")?
            .set_default("ai.timeout_seconds", 30)?
            .set_default("pdf.force_latex_only", false)?
            .set_default("pdf.force_pdf_generation", false)?
            .set_default("pdf.use_simple_pdflatex", true)?
            .set_default("pdf.latex_fallback", true)?
            .set_default("pdf.compile_timeout_seconds", 30)?
            .set_default("pdf.artifact_ttl_seconds", 600)?
            .set_default("pdf.sweep_interval_seconds", 60)?
            .set_default("pdf.max_latex_length", 50_000)?;

        // 2. Config file: explicit path must exist, ./pitorro.* is optional
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::with_name("pitorro").required(false)),
        };

        // 3. Prefixed environment, e.g. PITORRO_PDF__ARTIFACT_TTL_SECONDS=120
        builder = builder.add_source(
            Environment::with_prefix("PITORRO")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. Legacy environment names
        for (var, key) in LEGACY_STRINGS {
            if let Ok(val) = env::var(var) {
                builder = builder.set_override(*key, val)?;
            }
        }
        for (var, key) in LEGACY_NUMBERS {
            if let Ok(val) = env::var(var) {
                match val.trim().parse::<i64>() {
                    Ok(n) => builder = builder.set_override(*key, n)?,
                    Err(_) => tracing::warn!(variable = %var, value = %val, "Ignoring non-numeric value"),
                }
            }
        }
        for (var, key) in LEGACY_FLAGS {
            if let Ok(val) = env::var(var) {
                match parse_flag(&val) {
                    Some(flag) => builder = builder.set_override(*key, flag)?,
                    None => tracing::warn!(variable = %var, value = %val, "Ignoring non-boolean value"),
                }
            }
        }

        // 5. CLI flags (clap also resolves PORT / HOST here)
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }

        let mut cfg: Self = builder.build()?.try_deserialize()?;
        cfg.ai.apply_default_model();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings that cannot produce a coherent service.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let provider = self.ai.provider.to_lowercase();
        if !SUPPORTED_PROVIDERS.contains(&provider.as_str()) {
            return Err(ConfigError::Message(format!(
                "Unknown AI provider '{}' (expected one of: {})",
                self.ai.provider,
                SUPPORTED_PROVIDERS.join(", ")
            )));
        }
        if self.ai.model.trim().is_empty() {
            return Err(ConfigError::Message("ai.model cannot be empty".to_string()));
        }
        if self.ai.timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "ai.timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.server.request_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "server.request_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.pdf.compile_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "pdf.compile_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.pdf.artifact_ttl_seconds == 0 {
            return Err(ConfigError::Message(
                "pdf.artifact_ttl_seconds must be greater than zero".to_string(),
            ));
        }
        if self.pdf.force_latex_only && self.pdf.force_pdf_generation {
            return Err(ConfigError::Message(
                "FORCE_LATEX_ONLY_MODE and FORCE_PDF_GENERATION cannot both be enabled".to_string(),
            ));
        }
        Ok(())
    }
}

impl ServerConfig {
    /// Parsed CORS origins, blanks removed.
    #[must_use]
    pub fn allowed_origins(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect()
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl AiConfig {
    /// The model a provider gets when none is configured.
    #[must_use]
    pub fn default_model(provider: &str) -> Option<&'static str> {
        let provider = provider.to_lowercase();
        DEFAULT_MODELS
            .iter()
            .find(|(name, _)| *name == provider)
            .map(|(_, model)| *model)
    }

    /// Fill a blank model from the provider's default.
    pub fn apply_default_model(&mut self) {
        if self.model.trim().is_empty()
            && let Some(model) = Self::default_model(&self.provider)
        {
            self.model = model.to_string();
        }
    }

    /// The API key, if one was supplied and is not blank.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl PdfConfig {
    #[must_use]
    pub fn artifact_ttl(&self) -> Duration {
        Duration::from_secs(self.artifact_ttl_seconds)
    }

    #[must_use]
    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_seconds)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

/// Parse the boolean spellings accepted by the legacy variables.
#[must_use]
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
