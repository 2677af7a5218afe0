use crate::alarm::Alarm;
use crate::composite::CompositeRule;
use cadmon_common::types::{
    AlarmState, CompositeTransition, Sample, Severity, Transition,
};
use cadmon_metric::error::SeriesError;
use cadmon_metric::series::SeriesSet;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// A named composite alarm: a boolean rule tree plus notification metadata.
#[derive(Debug)]
pub struct CompositeDef {
    pub name: String,
    /// Textual source of `rule`, kept for messages and the API.
    pub rule_text: String,
    pub rule: CompositeRule,
    pub severity: Severity,
}

/// The evaluation engine: series, alarms, and composite baselines behind a
/// single bucket-arrival entry point.
///
/// Callers serialize access (one engine lock); within one [`Engine::append`]
/// each alarm is evaluated at most once per completed target bucket, so a
/// given (alarm, bucket) pair can never emit two transitions.
#[derive(Debug)]
pub struct Engine {
    series: SeriesSet,
    alarms: Vec<Alarm>,
    composites: Vec<CompositeDef>,
    /// Last recomputed value per composite, kept only for diffing; the
    /// composite owns no state of its own.
    composite_states: HashMap<String, AlarmState>,
}

impl Engine {
    pub fn new(series: SeriesSet, alarms: Vec<Alarm>, composites: Vec<CompositeDef>) -> Self {
        let mut engine = Self {
            series,
            alarms,
            composites,
            composite_states: HashMap::new(),
        };
        engine.rebaseline_composites();
        engine
    }

    pub fn series(&self) -> &SeriesSet {
        &self.series
    }

    pub fn alarms(&self) -> impl Iterator<Item = &Alarm> {
        self.alarms.iter()
    }

    pub fn composites(&self) -> impl Iterator<Item = (&CompositeDef, AlarmState)> {
        self.composites.iter().map(|def| {
            let state = self
                .composite_states
                .get(&def.name)
                .copied()
                .unwrap_or(AlarmState::InsufficientData);
            (def, state)
        })
    }

    /// Seeds one alarm's state from persistence. Returns false if the
    /// alarm is not configured (stale row). Call before any new bucket is
    /// evaluated; composite baselines are recomputed without emitting.
    pub fn restore_alarm(
        &mut self,
        name: &str,
        state: AlarmState,
        at_bucket: Option<DateTime<Utc>>,
    ) -> bool {
        let Some(alarm) = self.alarms.iter_mut().find(|a| a.name() == name) else {
            return false;
        };
        alarm.restore(state, at_bucket);
        self.rebaseline_composites();
        true
    }

    /// The single bucket-arrival entry point: appends to the series, then
    /// evaluates every referencing alarm whose next target bucket has
    /// completed, and recomputes composites when a leaf transitioned.
    pub fn append(
        &mut self,
        name: &str,
        start: DateTime<Utc>,
        sample: Sample,
    ) -> Result<Vec<Transition>, SeriesError> {
        self.series.append(name, start, sample)?;

        let mut out: Vec<Transition> = Vec::new();
        for alarm in &mut self.alarms {
            if !alarm.rule.expr.metric_names().contains(name) {
                continue;
            }

            let Some(latest) = latest_complete_target(alarm, &self.series) else {
                continue;
            };
            let Some(genesis) = earliest_recorded_start(alarm, &self.series) else {
                continue;
            };

            // Evaluate each completed target bucket in order; one transition
            // may be emitted per bucket. Buckets that end before recorded
            // history began carry no information and are skipped.
            let period = alarm.rule.period;
            let mut at = match alarm.last_evaluated() {
                Some(prev) if prev + period <= latest => prev + period,
                Some(_) => continue,
                None => latest,
            };
            while at + period <= genesis {
                at = at + period;
            }
            while at <= latest {
                if let Some(transition) = alarm.evaluate(&self.series, at) {
                    tracing::info!(
                        alarm = %transition.alarm_name,
                        from = %transition.from_state,
                        to = %transition.to_state,
                        at_bucket = %transition.at_bucket,
                        "alarm transition"
                    );
                    out.push(Transition::Alarm(transition));
                }
                at = at + period;
            }
        }

        if !out.is_empty() {
            let at_bucket = out
                .iter()
                .map(|t| t.at_bucket())
                .max()
                .unwrap_or(start);
            let composite_transitions = self.recompute_composites(at_bucket);
            out.extend(composite_transitions);
        }

        Ok(out)
    }

    fn alarm_state_map(&self) -> HashMap<String, AlarmState> {
        self.alarms
            .iter()
            .map(|a| (a.name().to_string(), a.state()))
            .collect()
    }

    /// Recomputes every composite and resets baselines without emitting.
    fn rebaseline_composites(&mut self) {
        let states = self.alarm_state_map();
        self.composite_states = self
            .composites
            .iter()
            .map(|def| (def.name.clone(), def.rule.reduce(&states)))
            .collect();
    }

    /// Recomputes every composite against the current leaf snapshot and
    /// emits a transition for each whose value changed.
    fn recompute_composites(&mut self, at_bucket: DateTime<Utc>) -> Vec<Transition> {
        let states = self.alarm_state_map();
        let mut out = Vec::new();

        for def in &self.composites {
            let new_state = def.rule.reduce(&states);
            let prev = self
                .composite_states
                .get(&def.name)
                .copied()
                .unwrap_or(AlarmState::InsufficientData);
            if new_state == prev {
                continue;
            }
            self.composite_states.insert(def.name.clone(), new_state);

            tracing::info!(
                composite = %def.name,
                from = %prev,
                to = %new_state,
                at_bucket = %at_bucket,
                "composite transition"
            );
            out.push(Transition::Composite(CompositeTransition {
                id: cadmon_common::id::next_id(),
                composite_name: def.name.clone(),
                from_state: prev,
                to_state: new_state,
                at_bucket,
                severity: def.severity,
                message: format!("rule '{}' evaluated to {}", def.rule_text, new_state),
                created_at: Utc::now(),
            }));
        }

        out
    }
}

/// Earliest recorded bucket start across the series `alarm` references.
fn earliest_recorded_start(alarm: &Alarm, series: &SeriesSet) -> Option<DateTime<Utc>> {
    alarm
        .rule
        .expr
        .metric_names()
        .into_iter()
        .filter_map(|name| series.get(name).and_then(|s| s.first_start()))
        .min()
}

/// Start of the latest target bucket of `alarm` for which every referenced
/// series has appended through the bucket's end, or `None` when some series
/// is still empty or no bucket has completed.
fn latest_complete_target(alarm: &Alarm, series: &SeriesSet) -> Option<DateTime<Utc>> {
    let period = alarm.rule.period;
    let mut latest: Option<DateTime<Utc>> = None;

    for name in alarm.rule.expr.metric_names() {
        let s = series.get(name)?;
        let next = s.next_expected_start()?;
        let mut candidate = floor_to_period(next, period);
        if candidate + period > next {
            candidate = candidate - period;
        }
        latest = Some(match latest {
            Some(current) => current.min(candidate),
            None => candidate,
        });
    }

    latest
}

/// Floors a timestamp onto the period grid anchored at the Unix epoch.
pub fn floor_to_period(ts: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    let secs = period.num_seconds();
    if secs <= 0 {
        return ts;
    }
    let floored = ts.timestamp().div_euclid(secs) * secs;
    DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(floored)
}
