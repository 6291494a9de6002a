//! Configuration for the OpenCms cache and static export crates.
//!
//! A single TOML document with optional `[logging]`, `[memory_monitor]`, `[cache]` and
//! `[static_export]` sections. Each section converts into the settings type of the crate it
//! configures.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once, OnceLock};
use std::time::Duration;

use ocms_export::{ExportSettings, RfsRule, SiteExport, DEFAULT_SUFFIXES};
use ocms_memory::{CacheSettings, CacheType, MonitorSettings};
use thiserror::Error;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;

mod diagnostics;
mod schema;
mod validation;

pub use diagnostics::{
    ConfigDiagnostics, ConfigValidationError, ConfigWarning, ValidationDiagnostics,
};
pub use schema::json_schema;

/// Root of the TOML configuration.
///
/// ```toml
/// [logging]
/// level = "info"
///
/// [memory_monitor]
/// max_usage_percent = 90
/// email_receivers = ["admin@localhost"]
///
/// [cache]
/// resource = 8192
///
/// [static_export]
/// rfs_prefix = "/export"
///
/// [[static_export.sites]]
/// site_root = "/sites/default"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct OcmsConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub memory_monitor: MemoryMonitorConfig,

    /// Per-type cache capacities.
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub static_export: StaticExportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct LoggingConfig {
    /// A level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json: bool,

    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to this file as well. An unopenable file disables only this sink.
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            _ => trimmed.to_owned(),
        }
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// The effective filter: the configured directives, with `RUST_LOG` appended when set.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let config_directives = Self::normalize_level_directives(&self.level);

        match env_directives {
            Some(env_directives) => {
                let combined = format!("{config_directives},{env_directives}");
                tracing_subscriber::EnvFilter::try_new(combined)
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                    .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct MemoryMonitorConfig {
    /// Usage percentage above which caches are flushed and a warning is sent.
    #[serde(default = "MemoryMonitorConfig::default_max_usage_percent")]
    #[schemars(range(min = 1, max = 100))]
    pub max_usage_percent: u64,

    /// Seconds between status log reports; `0` disables them.
    #[serde(default = "MemoryMonitorConfig::default_log_interval_secs")]
    pub log_interval_secs: u64,

    /// Seconds between status mails; `0` disables them.
    #[serde(default)]
    pub email_interval_secs: u64,

    /// Minimum seconds between two warning mails.
    #[serde(default = "MemoryMonitorConfig::default_warning_interval_secs")]
    pub warning_interval_secs: u64,

    #[serde(default = "MemoryMonitorConfig::default_email_sender")]
    pub email_sender: String,

    #[serde(default)]
    pub email_receivers: Vec<String>,
}

impl MemoryMonitorConfig {
    fn default_max_usage_percent() -> u64 {
        90
    }

    fn default_log_interval_secs() -> u64 {
        600
    }

    fn default_warning_interval_secs() -> u64 {
        3600
    }

    fn default_email_sender() -> String {
        "ocms@localhost".to_owned()
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            max_usage_percent: self.max_usage_percent,
            log_interval: Duration::from_secs(self.log_interval_secs),
            email_interval: Duration::from_secs(self.email_interval_secs),
            warning_interval: Duration::from_secs(self.warning_interval_secs),
            email_sender: self.email_sender.clone(),
            email_receivers: self
                .email_receivers
                .iter()
                .map(|receiver| receiver.trim().to_string())
                .filter(|receiver| !receiver.is_empty())
                .collect(),
        }
    }
}

impl Default for MemoryMonitorConfig {
    fn default() -> Self {
        Self {
            max_usage_percent: Self::default_max_usage_percent(),
            log_interval_secs: Self::default_log_interval_secs(),
            email_interval_secs: 0,
            warning_interval_secs: Self::default_warning_interval_secs(),
            email_sender: Self::default_email_sender(),
            email_receivers: Vec::new(),
        }
    }
}

/// Capacity per cache type, keyed by the snake_case type name (`resource_list = 256`).
///
/// `0` keeps a cache unbounded until it is flushed. Types without an entry use their default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct CacheConfig {
    #[schemars(with = "BTreeMap<String, usize>")]
    pub limits: BTreeMap<CacheType, usize>,
}

impl CacheConfig {
    pub fn cache_settings(&self) -> CacheSettings {
        self.limits
            .iter()
            .fold(CacheSettings::new(), |settings, (ty, limit)| {
                settings.with_limit(*ty, *limit)
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct StaticExportConfig {
    #[serde(default = "StaticExportConfig::default_true")]
    pub enabled: bool,

    /// Export decision for resources without an `export` property.
    #[serde(default = "StaticExportConfig::default_true")]
    pub export_default: bool,

    /// Extensions exported by default, each with its leading dot.
    #[serde(default = "StaticExportConfig::default_suffixes")]
    pub default_suffixes: Vec<String>,

    #[serde(default = "StaticExportConfig::default_jsp_suffix")]
    pub jsp_suffix: String,

    #[serde(default = "StaticExportConfig::default_file")]
    pub default_file: String,

    #[serde(default = "StaticExportConfig::default_vfs_prefix")]
    pub vfs_prefix: String,

    #[serde(default = "StaticExportConfig::default_rfs_prefix")]
    pub rfs_prefix: String,

    #[serde(default)]
    pub locale_prefixing: bool,

    #[serde(default)]
    pub locales: Vec<String>,

    #[serde(default)]
    pub sites: Vec<SiteExportConfig>,

    /// Checked in order; the first rule whose `source` matches a VFS path wins.
    #[serde(default)]
    pub rules: Vec<RfsRuleConfig>,
}

impl StaticExportConfig {
    fn default_true() -> bool {
        true
    }

    fn default_suffixes() -> Vec<String> {
        DEFAULT_SUFFIXES.iter().map(|s| (*s).to_owned()).collect()
    }

    fn default_jsp_suffix() -> String {
        ".html".to_owned()
    }

    fn default_file() -> String {
        "index_export.html".to_owned()
    }

    fn default_vfs_prefix() -> String {
        "/opencms".to_owned()
    }

    fn default_rfs_prefix() -> String {
        "/export".to_owned()
    }

    pub fn export_settings(&self) -> Result<ExportSettings, ConfigError> {
        let rules = self
            .rules
            .iter()
            .map(|rule| {
                RfsRule::new(rule.name.clone(), &rule.source, rule.rfs_prefix.clone())
                    .map_err(|err| ConfigError::Invalid(format!("rfs rule `{}`: {err}", rule.name)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let sites = self
            .sites
            .iter()
            .map(|site| {
                let mut export = SiteExport::new(site.site_root.trim());
                export.rfs_prefix = site.rfs_prefix.clone();
                export.default_locale = site.default_locale.clone();
                export
            })
            .collect();

        Ok(ExportSettings {
            enabled: self.enabled,
            export_default: self.export_default,
            default_suffixes: self.default_suffixes.clone(),
            jsp_suffix: self.jsp_suffix.clone(),
            default_file: self.default_file.clone(),
            vfs_prefix: self.vfs_prefix.clone(),
            rfs_prefix: self.rfs_prefix.clone(),
            locale_prefixing: self.locale_prefixing,
            locales: self.locales.clone(),
            sites,
            rules,
        })
    }
}

impl Default for StaticExportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            export_default: true,
            default_suffixes: Self::default_suffixes(),
            jsp_suffix: Self::default_jsp_suffix(),
            default_file: Self::default_file(),
            vfs_prefix: Self::default_vfs_prefix(),
            rfs_prefix: Self::default_rfs_prefix(),
            locale_prefixing: false,
            locales: Vec::new(),
            sites: Vec::new(),
            rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct SiteExportConfig {
    pub site_root: String,
    #[serde(default)]
    pub rfs_prefix: Option<String>,
    #[serde(default)]
    pub default_locale: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct RfsRuleConfig {
    pub name: String,
    /// Regular expression matched against VFS root paths.
    pub source: String,
    pub rfs_prefix: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn sanitize_toml_error_message(message: &str) -> String {
    // Parse errors can echo scalar values from the document (`invalid type: string "..."`).
    static QUOTED_STRING_RE: OnceLock<regex::Regex> = OnceLock::new();
    static SINGLE_QUOTED_STRING_RE: OnceLock<regex::Regex> = OnceLock::new();

    let re = QUOTED_STRING_RE.get_or_init(|| {
        regex::Regex::new(r#""(?:\\.|[^"\\])*""#).expect("quoted-string regex should compile")
    });
    let mut out = re.replace_all(message, r#""<redacted>""#).into_owned();
    let re_single = SINGLE_QUOTED_STRING_RE.get_or_init(|| {
        regex::Regex::new(r"'(?:\\.|[^'\\])*'").expect("single-quoted-string regex should compile")
    });
    out = re_single.replace_all(&out, "'<redacted>'").into_owned();

    // `unknown field `x`, expected ...` echoes a user key; `missing field `x`` names the schema.
    let mut start = ["unknown field `", "unknown variant `"]
        .iter()
        .filter_map(|pattern| out.find(pattern).map(|pos| pos + pattern.len() - 1))
        .min();
    // Non-string scalars are echoed in backticks: `invalid type: integer `123`, expected ...`.
    if start.is_none() && (out.contains("invalid type:") || out.contains("invalid value:")) {
        let boundary = out.find(", expected").unwrap_or(out.len());
        start = out[..boundary].find('`');
        if start.is_none() && boundary == out.len() {
            start = out.find('`');
        }
    }
    if let Some(start) = start {
        let after_start = &out[start + 1..];
        let end_rel = after_start
            .find("`, expected")
            .or_else(|| after_start.find('`'));
        if let Some(end_rel) = end_rel {
            out.replace_range(start + 1..start + 1 + end_rel, "<redacted>");
        }
    }

    out
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The `Display` form includes a snippet of the source document; keep only the message.
        ConfigError::Toml(sanitize_toml_error_message(err.message()))
    }
}

impl OcmsConfig {
    /// Load and validate a TOML config file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = read_config(path)?;
        let config = Self::load_from_str(&text)?;
        tracing::debug!(target: "ocms.config", path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parse and validate a TOML document. Validation errors become [`ConfigError::Invalid`].
    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let config: OcmsConfig = toml::from_str(text)?;
        let validation = config.validate();
        for warning in &validation.warnings {
            tracing::warn!(target: "ocms.config", ?warning, "config warning");
        }
        if let Some(error) = validation.errors.first() {
            return Err(ConfigError::Invalid(error.to_string()));
        }
        Ok(config)
    }

    /// Load a config file and report unknown keys and validation problems instead of failing.
    pub fn load_from_path_with_diagnostics(
        path: impl AsRef<Path>,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let text = read_config(path.as_ref())?;
        Self::load_from_str_with_diagnostics(&text)
    }

    pub fn load_from_str_with_diagnostics(
        text: &str,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let (config, unknown_keys) =
            diagnostics::deserialize_toml_with_unknown_keys::<OcmsConfig>(text)?;

        let mut diagnostics = ConfigDiagnostics {
            unknown_keys,
            ..ConfigDiagnostics::default()
        };
        diagnostics.extend_validation(config.validate());

        Ok((config, diagnostics))
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        self.memory_monitor.monitor_settings()
    }

    pub fn cache_settings(&self) -> CacheSettings {
        self.cache.cache_settings()
    }

    pub fn export_settings(&self) -> Result<ExportSettings, ConfigError> {
        self.static_export.export_settings()
    }
}

fn read_config(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

static TRACING_INIT: Once = Once::new();

/// Installs the global `tracing` subscriber described by `config`.
///
/// Only the first call has an effect; it returns `true` when it installed the subscriber.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let mut installed = false;
    TRACING_INIT.call_once(|| {
        let filter = config.env_filter();

        let file = config.file.as_ref().and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
        let file_open_failed = config.file.is_some() && file.is_none();

        let mut make_writer = BoxMakeWriter::new(io::sink);
        if config.stderr {
            // Test output capture only sees `eprint!`, so debug builds go through `TestWriter`.
            if cfg!(debug_assertions) {
                make_writer = BoxMakeWriter::new(
                    make_writer.and(tracing_subscriber::fmt::writer::TestWriter::with_stderr),
                );
            } else {
                make_writer = BoxMakeWriter::new(make_writer.and(std::io::stderr));
            }
        }
        if let Some(file) = file {
            make_writer = BoxMakeWriter::new(make_writer.and(MutexFileMakeWriter {
                file: Arc::new(Mutex::new(file)),
            }));
        }

        let layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if config.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        };

        let subscriber = tracing_subscriber::registry().with(filter).with(layer);
        installed = tracing::subscriber::set_global_default(subscriber).is_ok();
        if installed && file_open_failed {
            if let Some(path) = config.file.as_ref() {
                tracing::warn!(
                    target: "ocms.config",
                    path = %path.display(),
                    "failed to open log file; file logging disabled"
                );
            }
        }
    });
    installed
}

struct MutexFileMakeWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl<'a> MakeWriter<'a> for MutexFileMakeWriter {
    type Writer = MutexFileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        MutexFileWriter {
            guard: self
                .file
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        }
    }
}

struct MutexFileWriter<'a> {
    guard: std::sync::MutexGuard<'a, std::fs::File>,
}

impl Write for MutexFileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.guard.flush()
    }
}
