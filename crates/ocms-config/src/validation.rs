use std::collections::BTreeSet;

use crate::diagnostics::{ConfigValidationError, ConfigWarning, ValidationDiagnostics};
use crate::{LoggingConfig, OcmsConfig};

impl OcmsConfig {
    /// Check semantic invariants, reporting every problem found in one pass.
    #[must_use]
    pub fn validate(&self) -> ValidationDiagnostics {
        let mut out = ValidationDiagnostics::default();

        validate_logging(self, &mut out);
        validate_memory_monitor(self, &mut out);
        validate_static_export(self, &mut out);

        out
    }
}

fn validate_logging(config: &OcmsConfig, out: &mut ValidationDiagnostics) {
    let normalized = LoggingConfig::normalize_level_directives(&config.logging.level);
    if !config.logging.level.trim().is_empty()
        && tracing_subscriber::EnvFilter::try_new(normalized.clone()).is_err()
    {
        out.warnings.push(ConfigWarning::LoggingLevelInvalid {
            value: config.logging.level.clone(),
            normalized,
        });
    }
}

fn validate_memory_monitor(config: &OcmsConfig, out: &mut ValidationDiagnostics) {
    let percent = config.memory_monitor.max_usage_percent;
    if !(1..=100).contains(&percent) {
        out.errors.push(ConfigValidationError::InvalidValue {
            toml_path: "memory_monitor.max_usage_percent".to_string(),
            message: format!("must be between 1 and 100, got {percent}"),
        });
    }
}

fn validate_static_export(config: &OcmsConfig, out: &mut ValidationDiagnostics) {
    let export = &config.static_export;

    for (idx, suffix) in export.default_suffixes.iter().enumerate() {
        let toml_path = format!("static_export.default_suffixes[{idx}]");
        if suffix.trim().is_empty() {
            out.errors.push(ConfigValidationError::InvalidValue {
                toml_path,
                message: "must not be empty".to_string(),
            });
        } else if !suffix.starts_with('.') {
            out.errors.push(ConfigValidationError::InvalidValue {
                toml_path,
                message: "must start with `.`".to_string(),
            });
        }
    }

    for (idx, rule) in export.rules.iter().enumerate() {
        if let Err(err) = regex::Regex::new(&rule.source) {
            out.errors.push(ConfigValidationError::InvalidRulePattern {
                toml_path: format!("static_export.rules[{idx}].source"),
                message: err.to_string(),
            });
        }
    }

    let mut roots = BTreeSet::new();
    for site in &export.sites {
        let root = site.site_root.trim().trim_end_matches('/').to_string();
        if !roots.insert(root.clone()) {
            out.warnings
                .push(ConfigWarning::DuplicateSiteRoot { site_root: root });
        }
    }

    let has_locale =
        !export.locales.is_empty() || export.sites.iter().any(|site| site.default_locale.is_some());
    if export.locale_prefixing && !has_locale {
        out.warnings.push(ConfigWarning::ExportLocalesMissing);
    }
}
