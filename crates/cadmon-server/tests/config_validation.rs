use cadmon_notify::plugin::ChannelRegistry;
use cadmon_server::builder;
use cadmon_server::config::ServerConfig;

fn parse(toml_str: &str) -> ServerConfig {
    toml::from_str(toml_str).unwrap()
}

const VALID: &str = r#"
[[series]]
name = "m"
period_secs = 3600

[[series]]
name = "e"
period_secs = 3600

[[alarms]]
name = "daily-job"
expression = "IF(FILL(m, 0) == 1, 0, 1) + FILL(e, 0)"
operator = "gt"
threshold = 0.0
missing_data = "breaching"
period_secs = 86400
severity = "critical"

[[composites]]
name = "wrap"
rule = "daily-job"
"#;

#[test]
fn valid_config_builds() {
    let config = parse(VALID);
    let engine = builder::build_engine(&config, None).unwrap();
    assert_eq!(engine.alarms().count(), 1);
    assert_eq!(engine.composites().count(), 1);
}

#[test]
fn config_defaults_apply() {
    let config = parse(VALID);
    assert_eq!(config.http_port, 8080);
    assert_eq!(config.retention_days, 14);
    assert_eq!(config.series[0].retain_buckets, 168);
    assert_eq!(config.alarms[0].evaluation_window, 1);
    assert_eq!(config.alarms[0].breach_count, 1);
}

#[test]
fn unknown_series_in_expression_fails() {
    let config = parse(
        r#"
[[alarms]]
name = "a"
expression = "nope + 1"
operator = "gt"
threshold = 0.0
period_secs = 3600
"#,
    );
    let err = builder::build_engine(&config, None).unwrap_err();
    assert!(format!("{err:#}").contains("undefined series"), "{err:#}");
}

#[test]
fn malformed_expression_fails() {
    let config = parse(
        r#"
[[series]]
name = "m"
period_secs = 3600

[[alarms]]
name = "a"
expression = "FILL(m"
operator = "gt"
threshold = 0.0
period_secs = 3600
"#,
    );
    let err = builder::build_engine(&config, None).unwrap_err();
    assert!(format!("{err:#}").contains("parse error"), "{err:#}");
}

#[test]
fn breach_count_bounds_are_enforced() {
    let config = parse(
        r#"
[[series]]
name = "m"
period_secs = 3600

[[alarms]]
name = "a"
expression = "m"
operator = "gt"
threshold = 0.0
evaluation_window = 3
breach_count = 4
period_secs = 3600
"#,
    );
    let err = builder::build_engine(&config, None).unwrap_err();
    assert!(format!("{err:#}").contains("breach_count"), "{err:#}");
}

#[test]
fn period_mismatch_fails() {
    let config = parse(
        r#"
[[series]]
name = "m"
period_secs = 3600

[[alarms]]
name = "a"
expression = "m"
operator = "gt"
threshold = 0.0
period_secs = 5400
"#,
    );
    let err = builder::build_engine(&config, None).unwrap_err();
    assert!(format!("{err:#}").contains("whole multiple"), "{err:#}");
}

#[test]
fn window_exceeding_retention_fails() {
    let config = parse(
        r#"
[[series]]
name = "m"
period_secs = 3600
retain_buckets = 24

[[alarms]]
name = "a"
expression = "m"
operator = "gt"
threshold = 0.0
evaluation_window = 2
breach_count = 1
period_secs = 86400
"#,
    );
    // 2 daily buckets need 48 hourly source buckets, only 24 retained
    let err = builder::build_engine(&config, None).unwrap_err();
    assert!(format!("{err:#}").contains("retained"), "{err:#}");
}

#[test]
fn composite_with_unknown_alarm_fails() {
    let config = parse(
        r#"
[[composites]]
name = "c"
rule = "ghost"
"#,
    );
    let err = builder::build_engine(&config, None).unwrap_err();
    assert!(format!("{err:#}").contains("undefined alarm"), "{err:#}");
}

#[test]
fn duplicate_names_fail() {
    let config = parse(
        r#"
[[series]]
name = "m"
period_secs = 3600

[[series]]
name = "m"
period_secs = 60
"#,
    );
    let err = builder::build_engine(&config, None).unwrap_err();
    assert!(format!("{err:#}").contains("duplicate series"), "{err:#}");
}

#[test]
fn invalid_operator_fails() {
    let config = parse(
        r#"
[[series]]
name = "m"
period_secs = 3600

[[alarms]]
name = "a"
expression = "m"
operator = "between"
threshold = 0.0
period_secs = 3600
"#,
    );
    let err = builder::build_engine(&config, None).unwrap_err();
    assert!(format!("{err:#}").contains("unknown compare operator"), "{err:#}");
}

#[test]
fn notifier_builds_from_channel_config() {
    let config: ServerConfig = toml::from_str(
        r#"
[[channels]]
type = "log"

[[channels]]
type = "webhook"
min_severity = "critical"
config = { url = "http://localhost/hook" }
"#,
    )
    .unwrap();
    let registry = ChannelRegistry::default();
    let notifier = builder::build_notifier(&config, &registry).unwrap();
    assert_eq!(notifier.channel_count(), 2);
}

#[test]
fn notifier_rejects_unknown_channel_type() {
    let config: ServerConfig = toml::from_str(
        r#"
[[channels]]
type = "pager"
"#,
    )
    .unwrap();
    let registry = ChannelRegistry::default();
    assert!(builder::build_notifier(&config, &registry).is_err());
}

#[test]
fn shipped_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/cadmon.toml");
    let config = ServerConfig::load(path).unwrap();
    let engine = builder::build_engine(&config, None).unwrap();
    assert_eq!(engine.alarms().count(), 3);
    assert_eq!(engine.composites().count(), 1);
}
