use cadmon_common::types::{AlarmState, Sample, Transition};
use cadmon_server::builder;
use cadmon_server::config::ServerConfig;
use cadmon_storage::StateStore;
use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;

const WATCHDOG: &str = r#"
[[series]]
name = "job.invocations"
period_secs = 3600
retain_buckets = 168

[[series]]
name = "job.errors"
period_secs = 3600
retain_buckets = 168

[[alarms]]
name = "under-invoked"
expression = "job.invocations"
operator = "lt"
threshold = 1.0
evaluation_window = 24
breach_count = 24
missing_data = "breaching"
period_secs = 3600
severity = "critical"

[[alarms]]
name = "ran-once-clean"
expression = "IF(FILL(job.invocations, 0) == 1, 0, 1) + FILL(job.errors, 0)"
operator = "gt"
threshold = 0.0
evaluation_window = 1
breach_count = 1
missing_data = "breaching"
period_secs = 86400
severity = "critical"

[[composites]]
name = "daily-job"
rule = "under-invoked OR ran-once-clean"
severity = "critical"
"#;

fn ts(hours: i64) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + Duration::hours(hours)
}

fn config() -> ServerConfig {
    toml::from_str(WATCHDOG).unwrap()
}

/// Drives one day of hourly buckets; the job runs at `run_hour` within the
/// day when given, and `error_hour` reports one error.
fn drive_day(
    engine: &mut cadmon_alarm::engine::Engine,
    day: i64,
    run_hour: Option<i64>,
    error_hour: Option<i64>,
) -> Vec<Transition> {
    let mut outputs = Vec::new();
    for h in 0..24 {
        let hour = day * 24 + h;
        let inv = match run_hour {
            Some(r) if r == h => Sample::Count(1),
            _ => Sample::Missing,
        };
        let err = match error_hour {
            Some(r) if r == h => Sample::Count(1),
            _ => Sample::Missing,
        };
        outputs.extend(
            engine
                .append("job.invocations", ts(hour), inv)
                .unwrap(),
        );
        outputs.extend(engine.append("job.errors", ts(hour), err).unwrap());
    }
    outputs
}

#[test]
fn healthy_days_stay_quiet() {
    let mut engine = builder::build_engine(&config(), None).unwrap();

    for day in 0..3 {
        let outputs = drive_day(&mut engine, day, Some(9), None);
        assert!(outputs.is_empty(), "day {day} should not transition");
    }

    for alarm in engine.alarms() {
        assert_eq!(alarm.state(), AlarmState::Ok, "{}", alarm.name());
    }
    for (def, state) in engine.composites() {
        assert_eq!(state, AlarmState::Ok, "{}", def.name);
    }
}

#[test]
fn skipped_day_raises_the_composite() {
    let mut engine = builder::build_engine(&config(), None).unwrap();

    let outputs = drive_day(&mut engine, 0, Some(9), None);
    assert!(outputs.is_empty());

    // The job never runs on day 1: the combined expression breaches at the
    // day boundary and the under-invocation M-of-N trips an hour later
    // (24 consecutive sub-threshold hourly buckets starting at hour 9+1).
    let outputs = drive_day(&mut engine, 1, None, None);

    let alarm_names: Vec<&str> = outputs
        .iter()
        .filter_map(|t| match t {
            Transition::Alarm(t) => Some(t.alarm_name.as_str()),
            Transition::Composite(_) => None,
        })
        .collect();
    assert!(alarm_names.contains(&"ran-once-clean"), "{alarm_names:?}");
    assert!(alarm_names.contains(&"under-invoked"), "{alarm_names:?}");

    let composite: Vec<_> = outputs
        .iter()
        .filter_map(|t| match t {
            Transition::Composite(t) => Some((t.from_state, t.to_state)),
            Transition::Alarm(_) => None,
        })
        .collect();
    assert_eq!(composite, vec![(AlarmState::Ok, AlarmState::Alarm)]);
}

#[test]
fn errored_run_raises_the_combined_alarm() {
    let mut engine = builder::build_engine(&config(), None).unwrap();

    let outputs = drive_day(&mut engine, 0, Some(9), Some(9));
    let alarm_names: Vec<&str> = outputs
        .iter()
        .filter_map(|t| match t {
            Transition::Alarm(t) => Some(t.alarm_name.as_str()),
            Transition::Composite(_) => None,
        })
        .collect();
    assert_eq!(alarm_names, vec!["ran-once-clean"]);
}

#[test]
fn restart_restores_state_without_spurious_transitions() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::open(dir.path()).unwrap();
    let mut engine = builder::build_engine(&config(), Some(&store)).unwrap();

    // A bad day leaves the combined alarm in ALARM; persist as the server
    // request path would.
    drive_day(&mut engine, 0, None, None)
        .iter()
        .for_each(|t| store.record_transition(t).unwrap());
    for hour in 0..24 {
        store
            .record_bucket("job.invocations", ts(hour), None)
            .unwrap();
        store.record_bucket("job.errors", ts(hour), None).unwrap();
    }
    for alarm in engine.alarms() {
        store
            .upsert_alarm_state(alarm.name(), alarm.state(), alarm.last_evaluated())
            .unwrap();
    }
    let states_before: Vec<_> = engine
        .alarms()
        .map(|a| (a.name().to_string(), a.state()))
        .collect();
    drop(engine);

    // Rebuild from persistence: same states, no new transitions emitted
    let mut engine = builder::build_engine(&config(), Some(&store)).unwrap();
    let states_after: Vec<_> = engine
        .alarms()
        .map(|a| (a.name().to_string(), a.state()))
        .collect();
    assert_eq!(states_before, states_after);

    // The next appends continue the series where it left off; a still-bad
    // hour produces no duplicate ALARM event
    let outputs = engine
        .append("job.invocations", ts(24), Sample::Missing)
        .unwrap();
    let outputs: Vec<_> = outputs
        .iter()
        .filter(|t| matches!(t, Transition::Alarm(a) if a.to_state == AlarmState::Alarm && a.from_state == AlarmState::Ok))
        .collect();
    assert!(outputs.is_empty(), "no re-raised transitions after restart");
}
