use crate::store::StateStore;
use cadmon_common::types::{
    AlarmState, AlarmTransition, Sample, Severity, Transition,
};
use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;

fn setup() -> (TempDir, StateStore) {
    cadmon_common::id::init(1, 1);
    let dir = TempDir::new().unwrap();
    let store = StateStore::open(dir.path()).unwrap();
    (dir, store)
}

fn ts(hours: i64) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + Duration::hours(hours)
}

fn make_transition(name: &str, to_state: AlarmState, at: DateTime<Utc>) -> Transition {
    Transition::Alarm(AlarmTransition {
        id: cadmon_common::id::next_id(),
        alarm_name: name.to_string(),
        from_state: AlarmState::Ok,
        to_state,
        at_bucket: at,
        severity: Severity::Critical,
        message: "test".to_string(),
        created_at: at,
    })
}

#[test]
fn bucket_log_round_trip() {
    let (_dir, store) = setup();

    store.record_bucket("inv", ts(0), Some(1)).unwrap();
    store.record_bucket("inv", ts(1), None).unwrap();
    store.record_bucket("inv", ts(2), Some(3)).unwrap();
    store.record_bucket("other", ts(0), Some(9)).unwrap();

    let buckets = store.load_recent_buckets("inv", 10).unwrap();
    assert_eq!(buckets.len(), 3);
    assert_eq!(buckets[0].start, ts(0));
    assert_eq!(buckets[0].sample, Sample::Count(1));
    assert_eq!(buckets[1].sample, Sample::Missing);
    assert_eq!(buckets[2].sample, Sample::Count(3));
}

#[test]
fn load_recent_buckets_limits_to_newest() {
    let (_dir, store) = setup();
    for h in 0..10 {
        store.record_bucket("inv", ts(h), Some(h as u64)).unwrap();
    }

    let buckets = store.load_recent_buckets("inv", 3).unwrap();
    assert_eq!(buckets.len(), 3);
    assert_eq!(buckets[0].start, ts(7));
    assert_eq!(buckets[2].start, ts(9));
}

#[test]
fn alarm_state_upsert_and_load() {
    let (_dir, store) = setup();

    store
        .upsert_alarm_state("daily-job", AlarmState::Ok, None)
        .unwrap();
    store
        .upsert_alarm_state("daily-job", AlarmState::Alarm, Some(ts(5)))
        .unwrap();
    store
        .upsert_alarm_state("under-invoked", AlarmState::InsufficientData, Some(ts(2)))
        .unwrap();

    let rows = store.load_alarm_states().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].name, "daily-job");
    assert_eq!(rows[0].state, AlarmState::Alarm);
    assert_eq!(rows[0].at_bucket, Some(ts(5)));
    assert_eq!(rows[1].name, "under-invoked");
    assert_eq!(rows[1].state, AlarmState::InsufficientData);
}

#[test]
fn transition_history_round_trip_newest_first() {
    let (_dir, store) = setup();

    store
        .record_transition(&make_transition("a", AlarmState::Alarm, ts(1)))
        .unwrap();
    store
        .record_transition(&make_transition("b", AlarmState::InsufficientData, ts(2)))
        .unwrap();

    let listed = store.list_transitions(10, 0).unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].name(), "b");
    assert_eq!(listed[0].to_state(), AlarmState::InsufficientData);
    assert_eq!(listed[1].name(), "a");
    assert_eq!(listed[1].at_bucket(), ts(1));
    assert_eq!(listed[1].severity(), Severity::Critical);

    let paged = store.list_transitions(1, 1).unwrap();
    assert_eq!(paged.len(), 1);
    assert_eq!(paged[0].name(), "a");
}

#[test]
fn cleanup_removes_only_aged_rows() {
    let (_dir, store) = setup();

    let old = Utc::now() - Duration::days(30);
    let recent = Utc::now() - Duration::hours(1);
    store.record_bucket("inv", old, Some(1)).unwrap();
    store.record_bucket("inv", recent, Some(1)).unwrap();
    store
        .record_transition(&make_transition("a", AlarmState::Alarm, old))
        .unwrap();

    let removed = store.cleanup(7).unwrap();
    assert_eq!(removed, 2);

    let buckets = store.load_recent_buckets("inv", 10).unwrap();
    assert_eq!(buckets.len(), 1);
    assert_eq!(store.list_transitions(10, 0).unwrap().len(), 0);
}

#[test]
fn reopen_preserves_state() {
    let (dir, store) = setup();
    store
        .upsert_alarm_state("daily-job", AlarmState::Alarm, Some(ts(5)))
        .unwrap();
    drop(store);

    let store = StateStore::open(dir.path()).unwrap();
    let rows = store.load_alarm_states().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].state, AlarmState::Alarm);
}
