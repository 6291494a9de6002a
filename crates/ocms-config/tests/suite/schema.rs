#[test]
fn schema_lists_every_section() {
    let schema = serde_json::to_value(ocms_config::json_schema()).unwrap();
    let properties = schema["properties"].as_object().unwrap();
    for section in ["logging", "memory_monitor", "cache", "static_export"] {
        assert!(properties.contains_key(section), "missing {section}");
    }

    let monitor = &schema["definitions"]["MemoryMonitorConfig"]["properties"]["max_usage_percent"];
    assert_eq!(monitor["minimum"], 1.0);
    assert_eq!(monitor["maximum"], 100.0);
}
