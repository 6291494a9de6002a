use ocms_config::{init_tracing, LoggingConfig};

// Installs the process-wide subscriber, so this is the only test in the binary that does.
#[test]
fn installs_once_and_writes_to_the_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ocms.log");
    let config = LoggingConfig {
        level: "info".to_string(),
        stderr: false,
        file: Some(path.clone()),
        ..LoggingConfig::default()
    };

    assert!(init_tracing(&config));
    assert!(!init_tracing(&config));

    tracing::warn!(target: "ocms.config", marker = "tracing-init-check", "file sink works");

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("tracing-init-check"), "{contents}");
}
