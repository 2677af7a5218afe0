use chrono::{DateTime, Utc};

/// Errors surfaced to the collector on bucket appends.
///
/// These indicate collector misuse and are never retried by the engine.
#[derive(Debug, thiserror::Error)]
pub enum SeriesError {
    /// The appended bucket starts before the most recent bucket.
    #[error("series '{series}': bucket {start} is older than the last appended bucket {last}")]
    OutOfOrderBucket {
        series: String,
        start: DateTime<Utc>,
        last: DateTime<Utc>,
    },

    /// A bucket with the same start was already appended.
    #[error("series '{series}': bucket {start} was already appended")]
    DuplicateBucket {
        series: String,
        start: DateTime<Utc>,
    },

    /// The bucket start does not sit on the series' period grid.
    #[error("series '{series}': bucket {start} is not aligned to the {period_secs}s period grid")]
    MisalignedBucket {
        series: String,
        start: DateTime<Utc>,
        period_secs: i64,
    },

    /// The named series does not exist.
    #[error("unknown series '{0}'")]
    UnknownSeries(String),
}

/// Errors detected when loading or validating an expression.
///
/// These are fatal at configuration load; a validated expression cannot
/// fail at evaluation time.
#[derive(Debug, thiserror::Error)]
pub enum ExprError {
    /// The textual form could not be parsed.
    #[error("expression parse error at offset {pos}: {message}")]
    Parse { pos: usize, message: String },

    /// The expression references a series that is not configured.
    #[error("expression references undefined series '{0}'")]
    UnknownSeries(String),

    /// The expression's output period is not a whole multiple of an input
    /// series' native period, so resampling by summation is undefined.
    #[error(
        "expression period {target_secs}s is not a whole multiple of series '{series}' period {source_secs}s"
    )]
    PeriodMismatch {
        series: String,
        target_secs: i64,
        source_secs: i64,
    },
}
