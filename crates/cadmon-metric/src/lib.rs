//! Time-bucketed counter series and the metric-math expression language.
//!
//! A [`series::MetricSeries`] is an append-only store of fixed-period
//! counter buckets with explicit missing markers. Derived series are
//! computed by [`expr::Expr`], a small expression AST (arithmetic,
//! comparisons, `IF`, `FILL`, `RUNNING_SUM`) evaluated bucket-by-bucket
//! with explicit missing-value propagation. The textual expression form
//! (e.g. `IF(FILL(m, 0) == 1, 0, 1) + e`) is parsed by [`parse::parse_expr`].

pub mod error;
pub mod expr;
pub mod parse;
pub mod series;
