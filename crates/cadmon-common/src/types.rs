use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded (or synthesized) value for a bucket.
///
/// `Missing` is an explicitly recorded absence: the collector reported that
/// no data exists for the bucket, or the bucket sits inside recorded history
/// but was skipped. `Padding` is synthesized for positions that predate the
/// series' first recorded bucket. The two behave differently under alarm
/// evaluation: dispositions apply to `Missing`, while `Padding` shrinks the
/// evaluation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sample {
    Count(u64),
    Missing,
    Padding,
}

impl Sample {
    pub fn is_missing(&self) -> bool {
        matches!(self, Sample::Missing)
    }

    pub fn is_padding(&self) -> bool {
        matches!(self, Sample::Padding)
    }

    pub fn count(&self) -> Option<u64> {
        match self {
            Sample::Count(n) => Some(*n),
            _ => None,
        }
    }
}

/// A half-open time interval `[start, start + period)` and its sample.
/// The period is a property of the owning series, not the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub start: DateTime<Utc>,
    pub sample: Sample,
}

/// Alarm evaluation state.
///
/// # Examples
///
/// ```
/// use cadmon_common::types::AlarmState;
///
/// let state: AlarmState = "ALARM".parse().unwrap();
/// assert_eq!(state, AlarmState::Alarm);
/// assert_eq!(AlarmState::InsufficientData.to_string(), "INSUFFICIENT_DATA");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmState {
    Ok,
    Alarm,
    InsufficientData,
}

impl std::fmt::Display for AlarmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlarmState::Ok => write!(f, "OK"),
            AlarmState::Alarm => write!(f, "ALARM"),
            AlarmState::InsufficientData => write!(f, "INSUFFICIENT_DATA"),
        }
    }
}

impl std::str::FromStr for AlarmState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OK" => Ok(AlarmState::Ok),
            "ALARM" => Ok(AlarmState::Alarm),
            "INSUFFICIENT_DATA" => Ok(AlarmState::InsufficientData),
            _ => Err(format!("unknown alarm state: {s}")),
        }
    }
}

/// Alarm severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use cadmon_common::types::Severity;
///
/// let sev: Severity = "warning".parse().unwrap();
/// assert_eq!(sev, Severity::Warning);
/// assert_eq!(sev.to_string(), "warning");
/// assert!(Severity::Critical > Severity::Info);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Declared policy for a `Missing` bucket inside M-of-N evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDataPolicy {
    /// Treat the bucket as breaching.
    Breaching,
    /// Treat the bucket as not breaching.
    NotBreaching,
    /// Exclude the bucket from the count; the window shrinks by one.
    Ignore,
    /// Keep the bucket as missing; the alarm reports INSUFFICIENT_DATA
    /// when missing buckets dominate the window.
    AsMissing,
}

impl std::fmt::Display for MissingDataPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissingDataPolicy::Breaching => write!(f, "breaching"),
            MissingDataPolicy::NotBreaching => write!(f, "not_breaching"),
            MissingDataPolicy::Ignore => write!(f, "ignore"),
            MissingDataPolicy::AsMissing => write!(f, "as_missing"),
        }
    }
}

impl std::str::FromStr for MissingDataPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "breaching" => Ok(MissingDataPolicy::Breaching),
            "not_breaching" | "notbreaching" => Ok(MissingDataPolicy::NotBreaching),
            "ignore" => Ok(MissingDataPolicy::Ignore),
            "as_missing" | "asmissing" | "missing" => Ok(MissingDataPolicy::AsMissing),
            _ => Err(format!("unknown missing data policy: {s}")),
        }
    }
}

/// A state change of a single alarm, stamped with the bucket that caused it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmTransition {
    pub id: String,
    pub alarm_name: String,
    pub from_state: AlarmState,
    pub to_state: AlarmState,
    /// Start of the derived bucket whose evaluation caused the transition.
    pub at_bucket: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A state change of a composite alarm, derived by diffing successive
/// recomputations of its rule tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeTransition {
    pub id: String,
    pub composite_name: String,
    pub from_state: AlarmState,
    pub to_state: AlarmState,
    pub at_bucket: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Output of one engine evaluation step: either a leaf alarm transitioned,
/// or a composite recomputation changed value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    Alarm(AlarmTransition),
    Composite(CompositeTransition),
}

impl Transition {
    pub fn kind(&self) -> &'static str {
        match self {
            Transition::Alarm(_) => "alarm",
            Transition::Composite(_) => "composite",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Transition::Alarm(t) => &t.id,
            Transition::Composite(t) => &t.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Transition::Alarm(t) => &t.alarm_name,
            Transition::Composite(t) => &t.composite_name,
        }
    }

    pub fn from_state(&self) -> AlarmState {
        match self {
            Transition::Alarm(t) => t.from_state,
            Transition::Composite(t) => t.from_state,
        }
    }

    pub fn to_state(&self) -> AlarmState {
        match self {
            Transition::Alarm(t) => t.to_state,
            Transition::Composite(t) => t.to_state,
        }
    }

    pub fn at_bucket(&self) -> DateTime<Utc> {
        match self {
            Transition::Alarm(t) => t.at_bucket,
            Transition::Composite(t) => t.at_bucket,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Transition::Alarm(t) => t.severity,
            Transition::Composite(t) => t.severity,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Transition::Alarm(t) => &t.message,
            Transition::Composite(t) => &t.message,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Transition::Alarm(t) => t.created_at,
            Transition::Composite(t) => t.created_at,
        }
    }
}
