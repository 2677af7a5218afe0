use crate::error::SeriesError;
use crate::expr::Datum;
use cadmon_common::types::{Bucket, Sample};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, VecDeque};

/// Append-only, time-bucketed counter store for one metric.
///
/// Buckets sit on a fixed-period grid anchored at the first appended
/// bucket. Appends that skip grid boundaries backfill the gap with
/// explicit `Missing` buckets, so retained history is always contiguous.
/// The single mutator is [`MetricSeries::append`]; reads never mutate.
#[derive(Debug)]
pub struct MetricSeries {
    name: String,
    period: Duration,
    retain: usize,
    buckets: VecDeque<Bucket>,
}

impl MetricSeries {
    pub fn new(name: impl Into<String>, period: Duration, retain: usize) -> Self {
        Self {
            name: name.into(),
            period,
            retain: retain.max(1),
            buckets: VecDeque::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn retain(&self) -> usize {
        self.retain
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn first_start(&self) -> Option<DateTime<Utc>> {
        self.buckets.front().map(|b| b.start)
    }

    pub fn last_start(&self) -> Option<DateTime<Utc>> {
        self.buckets.back().map(|b| b.start)
    }

    /// Start of the next bucket the collector is expected to append.
    pub fn next_expected_start(&self) -> Option<DateTime<Utc>> {
        self.last_start().map(|s| s + self.period)
    }

    /// True once the series has recorded buckets covering all time up to
    /// (but excluding) `end`.
    pub fn covers_through(&self, end: DateTime<Utc>) -> bool {
        match self.next_expected_start() {
            Some(next) => next >= end,
            None => false,
        }
    }

    /// Appends one bucket. The first append anchors the period grid;
    /// subsequent appends must land on it, strictly after the last bucket.
    /// Skipped boundaries are backfilled with `Missing`.
    pub fn append(&mut self, start: DateTime<Utc>, sample: Sample) -> Result<(), SeriesError> {
        debug_assert!(!sample.is_padding(), "collectors never append padding");

        if let Some(last) = self.last_start() {
            if start == last {
                return Err(SeriesError::DuplicateBucket {
                    series: self.name.clone(),
                    start,
                });
            }
            if start < last {
                return Err(SeriesError::OutOfOrderBucket {
                    series: self.name.clone(),
                    start,
                    last,
                });
            }
            let offset = (start - last).num_seconds();
            if offset % self.period.num_seconds() != 0 {
                return Err(SeriesError::MisalignedBucket {
                    series: self.name.clone(),
                    start,
                    period_secs: self.period.num_seconds(),
                });
            }
            let mut next = last + self.period;
            while next < start {
                self.buckets.push_back(Bucket {
                    start: next,
                    sample: Sample::Missing,
                });
                next = next + self.period;
            }
        }

        self.buckets.push_back(Bucket { start, sample });
        while self.buckets.len() > self.retain {
            self.buckets.pop_front();
        }
        Ok(())
    }

    /// The most recent `n` buckets in chronological order, left-padded
    /// with `Padding` entries when history is shorter than `n`.
    pub fn window(&self, n: usize) -> Vec<Bucket> {
        let have = self.buckets.len().min(n);
        let pad = n - have;
        let mut out = Vec::with_capacity(n);

        let anchor = self
            .first_start()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        for i in 0..pad {
            out.push(Bucket {
                start: anchor - self.period * ((pad - i) as i32),
                sample: Sample::Padding,
            });
        }
        out.extend(self.buckets.iter().skip(self.buckets.len() - have).copied());
        out
    }

    /// Resamples the series onto a coarser grid: `n` target buckets of
    /// `period` width ending at `end` (exclusive). Source counts within a
    /// target interval are summed. A target bucket is `Missing` only if
    /// every recorded source bucket in its interval is missing; it is
    /// `Padding` only if the whole interval predates recorded history.
    pub fn window_resampled(
        &self,
        period: Duration,
        n: usize,
        end: DateTime<Utc>,
    ) -> Vec<(DateTime<Utc>, Datum)> {
        let mut out = Vec::with_capacity(n);
        let first = self.first_start();

        for i in 0..n {
            let t_start = end - period * ((n - i) as i32);
            let t_end = t_start + period;

            let datum = match first {
                None => Datum::Padding,
                Some(first) if t_end <= first => Datum::Padding,
                Some(_) => {
                    let mut sum: u64 = 0;
                    let mut saw_count = false;
                    let mut saw_recorded = false;
                    for b in &self.buckets {
                        if b.start < t_start || b.start >= t_end {
                            continue;
                        }
                        saw_recorded = true;
                        if let Sample::Count(c) = b.sample {
                            saw_count = true;
                            sum += c;
                        }
                    }
                    if saw_count {
                        Datum::Num(sum as f64)
                    } else if saw_recorded {
                        Datum::Missing
                    } else {
                        // Interval overlaps the recorded range but holds no
                        // bucket (ahead of the last append).
                        Datum::Missing
                    }
                }
            };
            out.push((t_start, datum));
        }
        out
    }
}

/// Named registry of metric series: one writer (the collector path),
/// many readers (alarm evaluation).
#[derive(Debug, Default)]
pub struct SeriesSet {
    series: BTreeMap<String, MetricSeries>,
}

impl SeriesSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, series: MetricSeries) {
        self.series.insert(series.name().to_string(), series);
    }

    pub fn get(&self, name: &str) -> Option<&MetricSeries> {
        self.series.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.series.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(|s| s.as_str())
    }

    pub fn append(
        &mut self,
        name: &str,
        start: DateTime<Utc>,
        sample: Sample,
    ) -> Result<(), SeriesError> {
        let series = self
            .series
            .get_mut(name)
            .ok_or_else(|| SeriesError::UnknownSeries(name.to_string()))?;
        series.append(start, sample)
    }
}
