use crate::error::ExprError;
use crate::series::SeriesSet;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;

/// One derived bucket value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Datum {
    Num(f64),
    /// Recorded absence that no `FILL` intercepted.
    Missing,
    /// The bucket predates recorded history.
    Padding,
}

impl Datum {
    pub fn is_missing(&self) -> bool {
        matches!(self, Datum::Missing)
    }

    pub fn is_padding(&self) -> bool {
        matches!(self, Datum::Padding)
    }

    pub fn num(&self) -> Option<f64> {
        match self {
            Datum::Num(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl std::fmt::Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Gt => ">",
            BinOp::Lt => "<",
            BinOp::Ge => ">=",
            BinOp::Le => "<=",
        };
        write!(f, "{s}")
    }
}

/// Immutable metric-math expression AST.
///
/// Arithmetic, comparison, and conditional nodes are missing-propagating:
/// a `Missing` operand yields a `Missing` result unless a `Fill` node
/// intercepted it upstream. Comparisons yield `1.0`/`0.0`. A `Padding`
/// operand always yields `Padding` — pre-history cannot be filled in.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Reference to a named raw series, resampled to the evaluation period.
    Metric(String),
    Const(f64),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `IF(cond, then, else)`: nonzero condition selects `then`.
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
    },
    /// `FILL(e, default)`: replaces `Missing` with `default`, per bucket.
    Fill { expr: Box<Expr>, default: f64 },
    /// `RUNNING_SUM(e)`: cumulative sum across the evaluation window.
    /// A missing or padding position yields the same marker at that
    /// position only and contributes nothing to the accumulator.
    RunningSum(Box<Expr>),
}

impl Expr {
    /// Names of all raw series this expression reads.
    pub fn metric_names(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect_metric_names(&mut names);
        names
    }

    fn collect_metric_names<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Metric(name) => {
                names.insert(name.as_str());
            }
            Expr::Const(_) => {}
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_metric_names(names);
                rhs.collect_metric_names(names);
            }
            Expr::If { cond, then, els } => {
                cond.collect_metric_names(names);
                then.collect_metric_names(names);
                els.collect_metric_names(names);
            }
            Expr::Fill { expr, .. } => expr.collect_metric_names(names),
            Expr::RunningSum(expr) => expr.collect_metric_names(names),
        }
    }

    /// Checks every series reference against the registry and verifies the
    /// target period is a whole multiple of each input's native period.
    /// Called at configuration load; evaluation assumes it passed.
    pub fn validate(&self, series: &SeriesSet, period: Duration) -> Result<(), ExprError> {
        for name in self.metric_names() {
            let s = series
                .get(name)
                .ok_or_else(|| ExprError::UnknownSeries(name.to_string()))?;
            let source_secs = s.period().num_seconds();
            let target_secs = period.num_seconds();
            if target_secs < source_secs || target_secs % source_secs != 0 {
                return Err(ExprError::PeriodMismatch {
                    series: name.to_string(),
                    target_secs,
                    source_secs,
                });
            }
        }
        Ok(())
    }

    /// Evaluates the expression over `n` buckets of `period` width ending
    /// at `end` (exclusive), one `Datum` per aligned bucket.
    ///
    /// Evaluation is a pure function of the referenced series' current
    /// windows; re-evaluating an unchanged window yields identical output.
    pub fn evaluate(
        &self,
        series: &SeriesSet,
        period: Duration,
        n: usize,
        end: DateTime<Utc>,
    ) -> Result<Vec<Datum>, ExprError> {
        match self {
            Expr::Metric(name) => {
                let s = series
                    .get(name)
                    .ok_or_else(|| ExprError::UnknownSeries(name.clone()))?;
                Ok(s.window_resampled(period, n, end)
                    .into_iter()
                    .map(|(_, d)| d)
                    .collect())
            }
            Expr::Const(c) => Ok(vec![Datum::Num(*c); n]),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = lhs.evaluate(series, period, n, end)?;
                let rhs = rhs.evaluate(series, period, n, end)?;
                Ok(lhs
                    .into_iter()
                    .zip(rhs)
                    .map(|(a, b)| apply_binary(*op, a, b))
                    .collect())
            }
            Expr::If { cond, then, els } => {
                let cond = cond.evaluate(series, period, n, end)?;
                let then = then.evaluate(series, period, n, end)?;
                let els = els.evaluate(series, period, n, end)?;
                Ok(cond
                    .into_iter()
                    .zip(then.into_iter().zip(els))
                    .map(|(c, (t, e))| match c {
                        Datum::Num(v) if v != 0.0 => t,
                        Datum::Num(_) => e,
                        marker => marker,
                    })
                    .collect())
            }
            Expr::Fill { expr, default } => {
                let inner = expr.evaluate(series, period, n, end)?;
                Ok(inner
                    .into_iter()
                    .map(|d| match d {
                        Datum::Missing => Datum::Num(*default),
                        other => other,
                    })
                    .collect())
            }
            Expr::RunningSum(expr) => {
                let inner = expr.evaluate(series, period, n, end)?;
                let mut acc = 0.0;
                Ok(inner
                    .into_iter()
                    .map(|d| match d {
                        Datum::Num(v) => {
                            acc += v;
                            Datum::Num(acc)
                        }
                        marker => marker,
                    })
                    .collect())
            }
        }
    }
}

fn apply_binary(op: BinOp, a: Datum, b: Datum) -> Datum {
    if a.is_padding() || b.is_padding() {
        return Datum::Padding;
    }
    let (a, b) = match (a.num(), b.num()) {
        (Some(a), Some(b)) => (a, b),
        _ => return Datum::Missing,
    };
    match op {
        BinOp::Add => Datum::Num(a + b),
        BinOp::Sub => Datum::Num(a - b),
        BinOp::Mul => Datum::Num(a * b),
        BinOp::Div => {
            if b == 0.0 {
                Datum::Missing
            } else {
                Datum::Num(a / b)
            }
        }
        BinOp::Eq => Datum::Num(bool_num(a == b)),
        BinOp::Ne => Datum::Num(bool_num(a != b)),
        BinOp::Gt => Datum::Num(bool_num(a > b)),
        BinOp::Lt => Datum::Num(bool_num(a < b)),
        BinOp::Ge => Datum::Num(bool_num(a >= b)),
        BinOp::Le => Datum::Num(bool_num(a <= b)),
    }
}

fn bool_num(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}
