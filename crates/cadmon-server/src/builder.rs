use crate::config::ServerConfig;
use anyhow::{bail, Context, Result};
use cadmon_alarm::alarm::{Alarm, AlarmRule, CompareOp};
use cadmon_alarm::composite::parse_rule;
use cadmon_alarm::engine::{CompositeDef, Engine};
use cadmon_common::types::{MissingDataPolicy, Severity};
use cadmon_metric::parse::parse_expr;
use cadmon_metric::series::{MetricSeries, SeriesSet};
use cadmon_notify::manager::{ChannelRoute, NotificationManager};
use cadmon_notify::plugin::ChannelRegistry;
use cadmon_storage::StateStore;
use chrono::Duration;
use std::collections::BTreeSet;

/// Builds the engine from configuration, failing closed on any invalid
/// series, alarm, or composite. With a store, recent buckets are reloaded
/// into the series and persisted alarm states are restored before the
/// engine sees any new bucket.
pub fn build_engine(config: &ServerConfig, store: Option<&StateStore>) -> Result<Engine> {
    let series = build_series(config, store)?;
    let alarms = build_alarms(config, &series)?;
    let composites = build_composites(config, &alarms)?;

    let mut engine = Engine::new(series, alarms, composites);

    if let Some(store) = store {
        for row in store
            .load_alarm_states()
            .context("failed to load persisted alarm states")?
        {
            if engine.restore_alarm(&row.name, row.state, row.at_bucket) {
                tracing::info!(alarm = %row.name, state = %row.state, "restored alarm state");
            } else {
                tracing::warn!(alarm = %row.name, "persisted state for unknown alarm, skipping");
            }
        }
    }

    Ok(engine)
}

fn build_series(config: &ServerConfig, store: Option<&StateStore>) -> Result<SeriesSet> {
    let mut set = SeriesSet::new();
    for cfg in &config.series {
        if set.contains(&cfg.name) {
            bail!("duplicate series name '{}'", cfg.name);
        }
        if cfg.period_secs == 0 {
            bail!("series '{}': period_secs must be at least 1", cfg.name);
        }
        let mut series = MetricSeries::new(
            &cfg.name,
            Duration::seconds(cfg.period_secs as i64),
            cfg.retain_buckets,
        );

        if let Some(store) = store {
            let buckets = store
                .load_recent_buckets(&cfg.name, cfg.retain_buckets)
                .with_context(|| format!("failed to reload buckets for series '{}'", cfg.name))?;
            let count = buckets.len();
            for bucket in buckets {
                if let Err(e) = series.append(bucket.start, bucket.sample) {
                    tracing::warn!(series = %cfg.name, error = %e, "skipping persisted bucket");
                }
            }
            if count > 0 {
                tracing::info!(series = %cfg.name, buckets = count, "reloaded series history");
            }
        }

        set.insert(series);
    }
    Ok(set)
}

fn build_alarms(config: &ServerConfig, series: &SeriesSet) -> Result<Vec<Alarm>> {
    let mut alarms: Vec<Alarm> = Vec::with_capacity(config.alarms.len());
    for cfg in &config.alarms {
        if alarms.iter().any(|a| a.name() == cfg.name) {
            bail!("duplicate alarm name '{}'", cfg.name);
        }
        if cfg.period_secs == 0 {
            bail!("alarm '{}': period_secs must be at least 1", cfg.name);
        }
        if cfg.evaluation_window == 0 {
            bail!("alarm '{}': evaluation_window must be at least 1", cfg.name);
        }
        if cfg.breach_count == 0 || cfg.breach_count > cfg.evaluation_window {
            bail!(
                "alarm '{}': breach_count must satisfy 1 <= M <= N (got M={}, N={})",
                cfg.name,
                cfg.breach_count,
                cfg.evaluation_window
            );
        }

        let expr = parse_expr(&cfg.expression)
            .with_context(|| format!("alarm '{}': invalid expression", cfg.name))?;
        let period = Duration::seconds(cfg.period_secs as i64);
        expr.validate(series, period)
            .with_context(|| format!("alarm '{}': invalid expression", cfg.name))?;

        // The evaluation window must fit in every input's retained history.
        for name in expr.metric_names() {
            // Presence was checked by expr.validate
            let Some(s) = series.get(name) else { continue };
            let per_target = (cfg.period_secs / s.period().num_seconds() as u64).max(1) as usize;
            let needed = cfg.evaluation_window * per_target;
            if needed > s.retain() {
                bail!(
                    "alarm '{}': window needs {} buckets of series '{}' but only {} are retained",
                    cfg.name,
                    needed,
                    name,
                    s.retain()
                );
            }
        }

        let operator: CompareOp = cfg
            .operator
            .parse()
            .map_err(|e: String| anyhow::anyhow!("alarm '{}': {e}", cfg.name))?;
        let missing_data: MissingDataPolicy = cfg
            .missing_data
            .parse()
            .map_err(|e: String| anyhow::anyhow!("alarm '{}': {e}", cfg.name))?;
        let severity: Severity = cfg
            .severity
            .parse()
            .map_err(|e: String| anyhow::anyhow!("alarm '{}': {e}", cfg.name))?;

        alarms.push(Alarm::new(AlarmRule {
            name: cfg.name.clone(),
            expression: cfg.expression.clone(),
            expr,
            operator,
            threshold: cfg.threshold,
            evaluation_window: cfg.evaluation_window,
            breach_count: cfg.breach_count,
            missing_data,
            period,
            severity,
        }));
    }
    Ok(alarms)
}

fn build_composites(config: &ServerConfig, alarms: &[Alarm]) -> Result<Vec<CompositeDef>> {
    let known: BTreeSet<String> = alarms.iter().map(|a| a.name().to_string()).collect();

    let mut composites: Vec<CompositeDef> = Vec::with_capacity(config.composites.len());
    for cfg in &config.composites {
        if composites.iter().any(|c| c.name == cfg.name) {
            bail!("duplicate composite name '{}'", cfg.name);
        }
        let rule = parse_rule(&cfg.rule)
            .with_context(|| format!("composite '{}': invalid rule", cfg.name))?;
        rule.validate(&known)
            .with_context(|| format!("composite '{}': invalid rule", cfg.name))?;
        let severity: Severity = cfg
            .severity
            .parse()
            .map_err(|e: String| anyhow::anyhow!("composite '{}': {e}", cfg.name))?;

        composites.push(CompositeDef {
            name: cfg.name.clone(),
            rule_text: cfg.rule.clone(),
            rule,
            severity,
        });
    }
    Ok(composites)
}

/// Instantiates notification channels through the plugin registry,
/// failing closed on unknown types or invalid channel config.
pub fn build_notifier(
    config: &ServerConfig,
    registry: &ChannelRegistry,
) -> Result<NotificationManager> {
    let mut routes = Vec::with_capacity(config.channels.len());
    for cfg in &config.channels {
        let min_severity: Severity = cfg
            .min_severity
            .parse()
            .map_err(|e: String| anyhow::anyhow!("channel '{}': {e}", cfg.channel_type))?;
        let json_config = match &cfg.config {
            Some(value) => serde_json::to_value(value)
                .with_context(|| format!("channel '{}': invalid config", cfg.channel_type))?,
            None => serde_json::json!({}),
        };
        let channel = registry
            .create_channel(&cfg.channel_type, &json_config)
            .map_err(|e| anyhow::anyhow!("channel '{}': {e}", cfg.channel_type))?;
        routes.push(ChannelRoute {
            min_severity,
            channel,
        });
    }
    Ok(NotificationManager::new(routes))
}
