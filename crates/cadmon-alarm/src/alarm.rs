use cadmon_common::types::{AlarmState, AlarmTransition, MissingDataPolicy, Severity};
use cadmon_metric::expr::{Datum, Expr};
use cadmon_metric::series::SeriesSet;
use chrono::{DateTime, Duration, Utc};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
}

impl FromStr for CompareOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "greater_than" | "gt" => Ok(Self::GreaterThan),
            "less_than" | "lt" => Ok(Self::LessThan),
            "greater_equal" | "ge" | "gte" => Ok(Self::GreaterEqual),
            "less_equal" | "le" | "lte" => Ok(Self::LessEqual),
            _ => Err(format!("unknown compare operator: {s}")),
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GreaterThan => write!(f, "greater_than"),
            Self::LessThan => write!(f, "less_than"),
            Self::GreaterEqual => write!(f, "greater_equal"),
            Self::LessEqual => write!(f, "less_equal"),
        }
    }
}

impl CompareOp {
    fn check(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::LessThan => value < threshold,
            Self::GreaterEqual => value >= threshold,
            Self::LessEqual => value <= threshold,
        }
    }
}

/// Configuration of one alarm: a threshold expression, an M-of-N breach
/// policy, and a missing-data disposition.
#[derive(Debug)]
pub struct AlarmRule {
    pub name: String,
    /// Textual source of `expr`, kept for messages and the API.
    pub expression: String,
    pub expr: Expr,
    pub operator: CompareOp,
    pub threshold: f64,
    /// N: number of most-recent derived buckets considered.
    pub evaluation_window: usize,
    /// M: breaching buckets among N required to raise ALARM.
    pub breach_count: usize,
    pub missing_data: MissingDataPolicy,
    /// Width of one derived bucket.
    pub period: Duration,
    pub severity: Severity,
}

/// Per-alarm state machine. The only mutator is [`Alarm::evaluate`];
/// the engine serializes calls per alarm.
#[derive(Debug)]
pub struct Alarm {
    pub rule: AlarmRule,
    state: AlarmState,
    last_evaluated: Option<DateTime<Utc>>,
}

impl Alarm {
    pub fn new(rule: AlarmRule) -> Self {
        Self {
            rule,
            state: AlarmState::Ok,
            last_evaluated: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.rule.name
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    pub fn severity(&self) -> Severity {
        self.rule.severity
    }

    /// Start of the most recently evaluated derived bucket.
    pub fn last_evaluated(&self) -> Option<DateTime<Utc>> {
        self.last_evaluated
    }

    /// Seeds state from persistence before any new bucket is evaluated,
    /// so a restart does not re-emit the transition that led here.
    pub fn restore(&mut self, state: AlarmState, at_bucket: Option<DateTime<Utc>>) {
        self.state = state;
        self.last_evaluated = at_bucket;
    }

    /// Evaluates the derived bucket starting at `at` against the M-of-N
    /// policy and returns a transition event iff the state changed.
    ///
    /// The caller guarantees every referenced series has appended through
    /// the end of the bucket; re-evaluating an already-evaluated bucket is
    /// a no-op.
    pub fn evaluate(&mut self, series: &SeriesSet, at: DateTime<Utc>) -> Option<AlarmTransition> {
        if let Some(prev) = self.last_evaluated {
            if at <= prev {
                return None;
            }
        }

        let n = self.rule.evaluation_window;
        let end = at + self.rule.period;
        let window = match self.rule.expr.evaluate(series, self.rule.period, n, end) {
            Ok(window) => window,
            Err(e) => {
                // Unreachable for validated configuration; never crash the
                // evaluation loop on per-bucket data.
                tracing::error!(alarm = %self.rule.name, error = %e, "expression evaluation failed");
                return None;
            }
        };

        let mut breaching = 0usize;
        let mut missing = 0usize;
        let mut excluded = 0usize;
        for datum in &window {
            match datum {
                Datum::Padding => excluded += 1,
                Datum::Missing => match self.rule.missing_data {
                    MissingDataPolicy::Breaching => breaching += 1,
                    MissingDataPolicy::NotBreaching => {}
                    MissingDataPolicy::Ignore => excluded += 1,
                    MissingDataPolicy::AsMissing => missing += 1,
                },
                Datum::Num(v) => {
                    if self.rule.operator.check(*v, self.rule.threshold) {
                        breaching += 1;
                    }
                }
            }
        }

        let n_eff = n - excluded;
        let m = self.rule.breach_count;
        let new_state = if n_eff == 0 {
            AlarmState::InsufficientData
        } else if self.rule.missing_data == MissingDataPolicy::AsMissing
            && missing > n_eff.saturating_sub(m)
        {
            AlarmState::InsufficientData
        } else if breaching >= m {
            AlarmState::Alarm
        } else {
            AlarmState::Ok
        };

        self.last_evaluated = Some(at);
        if new_state == self.state {
            return None;
        }

        let from_state = self.state;
        self.state = new_state;

        let message = match new_state {
            AlarmState::Alarm => format!(
                "{} is {} {} in {} of {} buckets (need {})",
                self.rule.expression, self.rule.operator, self.rule.threshold, breaching, n_eff, m,
            ),
            AlarmState::Ok => format!(
                "{} is {} {} in only {} of {} buckets (need {})",
                self.rule.expression, self.rule.operator, self.rule.threshold, breaching, n_eff, m,
            ),
            AlarmState::InsufficientData => {
                if n_eff == 0 {
                    format!("no recorded data in the last {n} buckets")
                } else {
                    format!("{missing} of {n_eff} buckets missing (need {m} breaching)")
                }
            }
        };

        Some(AlarmTransition {
            id: cadmon_common::id::next_id(),
            alarm_name: self.rule.name.clone(),
            from_state,
            to_state: new_state,
            at_bucket: at,
            severity: self.rule.severity,
            message,
            created_at: Utc::now(),
        })
    }
}
