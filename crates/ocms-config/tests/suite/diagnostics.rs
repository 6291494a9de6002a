use ocms_config::{ConfigValidationError, ConfigWarning, OcmsConfig};

#[test]
fn reports_unknown_keys_with_full_paths() {
    let text = r#"
typo = 1

[memory_monitor]
max_usage_percnt = 80

[[static_export.sites]]
site_root = "/sites/default"
rfs_prefx = "/export"
"#;

    let (config, diagnostics) =
        OcmsConfig::load_from_str_with_diagnostics(text).expect("config should parse");

    assert_eq!(
        diagnostics.unknown_keys,
        vec![
            "memory_monitor.max_usage_percnt",
            "static_export.sites[0].rfs_prefx",
            "typo"
        ]
    );
    assert!(diagnostics.is_ok());
    assert_eq!(config.memory_monitor.max_usage_percent, 90);
}

#[test]
fn collects_every_validation_problem() {
    let text = r#"
[logging]
level = "ocms.memory=loud"

[memory_monitor]
max_usage_percent = 0

[static_export]
default_suffixes = ["html"]
locale_prefixing = true

[[static_export.sites]]
site_root = "/sites/default"

[[static_export.sites]]
site_root = "/sites/default/"

[[static_export.rules]]
name = "broken"
source = "("
rfs_prefix = "/x"
"#;

    let (_config, diagnostics) =
        OcmsConfig::load_from_str_with_diagnostics(text).expect("config should parse");

    assert!(!diagnostics.is_ok());
    assert_eq!(diagnostics.errors.len(), 3);
    assert!(matches!(
        &diagnostics.errors[0],
        ConfigValidationError::InvalidValue { toml_path, .. } if toml_path == "memory_monitor.max_usage_percent"
    ));
    assert!(matches!(
        &diagnostics.errors[2],
        ConfigValidationError::InvalidRulePattern { toml_path, .. } if toml_path == "static_export.rules[0].source"
    ));

    assert!(diagnostics
        .warnings
        .iter()
        .any(|w| matches!(w, ConfigWarning::LoggingLevelInvalid { .. })));
    assert!(diagnostics
        .warnings
        .contains(&ConfigWarning::DuplicateSiteRoot {
            site_root: "/sites/default".to_string()
        }));
    assert!(diagnostics
        .warnings
        .contains(&ConfigWarning::ExportLocalesMissing));
}

#[test]
fn clean_config_has_no_diagnostics() {
    let (_config, diagnostics) =
        OcmsConfig::load_from_str_with_diagnostics("[cache]\nresource = 10\n").unwrap();
    assert!(diagnostics.is_empty());
}
