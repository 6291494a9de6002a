use ocms_config::{ConfigError, OcmsConfig};
use ocms_memory::CacheType;
use std::time::Duration;

const FULL: &str = r#"
[logging]
level = "debug"
json = true

[memory_monitor]
max_usage_percent = 75
log_interval_secs = 300
email_interval_secs = 0
warning_interval_secs = 1800
email_sender = "cms@example.org"
email_receivers = ["admin@example.org", " "]

[cache]
acl = 10
resource_list = 20
lock = 0

[static_export]
enabled = true
export_default = false
default_suffixes = [".html", ".pdf"]
jsp_suffix = ".htm"
default_file = "index.html"
vfs_prefix = "/cms"
rfs_prefix = "/static"
locale_prefixing = true
locales = ["en", "de"]

[[static_export.sites]]
site_root = "/sites/default/"
rfs_prefix = "/static/default"
default_locale = "de"

[[static_export.rules]]
name = "system"
source = "^/system/.*"
rfs_prefix = "/static/system"
"#;

#[test]
fn empty_document_uses_defaults() {
    let config = OcmsConfig::load_from_str("").unwrap();
    assert_eq!(config, OcmsConfig::default());

    let monitor = config.monitor_settings();
    assert_eq!(monitor.max_usage_percent, 90);
    assert_eq!(monitor.log_interval, Duration::from_secs(600));
    assert_eq!(monitor.email_interval, Duration::ZERO);
    assert_eq!(monitor.warning_interval, Duration::from_secs(3600));
    assert!(monitor.email_receivers.is_empty());

    let export = config.export_settings().unwrap();
    assert_eq!(export, ocms_export::ExportSettings::default());
    assert_eq!(
        config.cache_settings().limit(CacheType::Resource),
        CacheType::Resource.default_limit()
    );
}

#[test]
fn full_document_converts_into_settings() {
    let config = OcmsConfig::load_from_str(FULL).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);

    let monitor = config.monitor_settings();
    assert_eq!(monitor.max_usage_percent, 75);
    assert_eq!(monitor.log_interval, Duration::from_secs(300));
    assert_eq!(monitor.warning_interval, Duration::from_secs(1800));
    assert_eq!(monitor.email_sender, "cms@example.org");
    assert_eq!(monitor.email_receivers, vec!["admin@example.org".to_string()]);

    let caches = config.cache_settings();
    assert_eq!(caches.limit(CacheType::Acl), 10);
    assert_eq!(caches.limit(CacheType::ResourceList), 20);
    assert_eq!(caches.limit(CacheType::Lock), 0);
    assert_eq!(caches.limit(CacheType::User), CacheType::User.default_limit());

    let export = config.export_settings().unwrap();
    assert!(!export.export_default);
    assert_eq!(export.default_suffixes, vec![".html", ".pdf"]);
    assert_eq!(export.jsp_suffix, ".htm");
    assert_eq!(export.default_file, "index.html");
    assert_eq!(export.vfs_prefix, "/cms");
    assert!(export.locale_prefixing);
    assert_eq!(export.sites.len(), 1);
    assert_eq!(export.sites[0].site_root, "/sites/default");
    assert_eq!(export.sites[0].default_locale.as_deref(), Some("de"));
    assert_eq!(export.rfs_prefix_for("/system/modules/a.css"), "/static/system");
    assert_eq!(export.rfs_prefix_for("/sites/default/a.html"), "/static/default");
    assert_eq!(export.rfs_prefix_for("/shared/a.html"), "/static");
}

#[test]
fn loads_from_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ocms.toml");
    std::fs::write(&path, FULL).unwrap();

    let config = OcmsConfig::load_from_path(&path).unwrap();
    assert_eq!(config.memory_monitor.max_usage_percent, 75);

    let missing = dir.path().join("missing.toml");
    let err = OcmsConfig::load_from_path(&missing).unwrap_err();
    assert!(matches!(err, ConfigError::Io { ref path, .. } if path.ends_with("missing.toml")));
}

#[test]
fn out_of_range_usage_percent_is_rejected() {
    for value in [0, 101] {
        let text = format!("[memory_monitor]\nmax_usage_percent = {value}\n");
        let err = OcmsConfig::load_from_str(&text).unwrap_err();
        match err {
            ConfigError::Invalid(message) => {
                assert!(message.contains("memory_monitor.max_usage_percent"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
    assert!(OcmsConfig::load_from_str("[memory_monitor]\nmax_usage_percent = 100\n").is_ok());
}

#[test]
fn bad_suffixes_and_rules_are_rejected() {
    let err = OcmsConfig::load_from_str("[static_export]\ndefault_suffixes = [\"html\"]\n")
        .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(ref message) if message.contains("default_suffixes[0]")));

    let err = OcmsConfig::load_from_str("[static_export]\ndefault_suffixes = [\".html\", \"\"]\n")
        .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(ref message) if message.contains("default_suffixes[1]")));

    let text = r#"
[[static_export.rules]]
name = "broken"
source = "([a-"
rfs_prefix = "/x"
"#;
    let err = OcmsConfig::load_from_str(text).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(ref message) if message.contains("rules[0].source")));
}

#[test]
fn parse_errors_do_not_echo_values() {
    let err = OcmsConfig::load_from_str("[logging]\njson = \"top-secret\"\n").unwrap_err();
    let message = err.to_string();
    assert!(matches!(err, ConfigError::Toml(_)));
    assert!(!message.contains("top-secret"), "{message}");

    let err = OcmsConfig::load_from_str("[cache]\nsecret_cache = 1\n").unwrap_err();
    let message = err.to_string();
    assert!(!message.contains("secret_cache"), "{message}");
}
