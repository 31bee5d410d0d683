//! Composite query execution
//!
//! [`QueryEngine::execute`] runs one [`QueryRangeRequest`]:
//!
//! ```text
//! ┌─────────────────┐
//! │      Plan       │  validate, order formulas, prune unused builders
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │    Dispatch     │  builder queries → store, bounded fan-out
//! └────────┬────────┘
//!          │ barrier
//! ┌────────▼────────┐
//! │    Formulas     │  topological order, aligned by series key
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │     Format      │  series or table per panel type
//! └─────────────────┘
//! ```
//!
//! Validation errors are raised before the store is called. The first store
//! error aborts the remaining evaluations; there are no partial results.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::composite::PanelType;
use super::evaluator::evaluate_formula;
use super::planner::QueryPlan;
use super::request::QueryRangeRequest;
use super::result::{QueryResponse, ResultFormatter};
use crate::config::EngineConfig;
use crate::error::{CancelReason, Error, Result, StoreError};
use crate::metrics;
use crate::store::{SeriesResult, SeriesStore};
use crate::types::{normalize_samples, EvalWindow, TimeRange};

/// Evaluates composite queries against an injected store
#[derive(Debug, Clone, Default)]
pub struct QueryEngine {
    config: EngineConfig,
}

impl QueryEngine {
    /// Create an engine with the given settings
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Engine settings
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate a request
    ///
    /// Cancelling `cancel` (or exceeding the configured timeout) aborts every
    /// in-flight store call and returns [`Error::Canceled`].
    pub async fn execute<S>(
        &self,
        request: &QueryRangeRequest,
        store: Arc<S>,
        cancel: &CancellationToken,
    ) -> Result<QueryResponse>
    where
        S: SeriesStore + ?Sized,
    {
        let started = Instant::now();
        let panel = panel_label(request.composite_query.panel_type);

        let outcome = self.run(request, store, cancel).await;

        let elapsed = started.elapsed();
        let status = match &outcome {
            Ok(_) => "success",
            Err(e) => e.api_error_type().as_str(),
        };
        metrics::record_query(panel, status, elapsed.as_secs_f64());
        match &outcome {
            Ok(_) => info!(
                panel,
                elapsed_ms = elapsed.as_millis() as u64,
                "Composite query completed"
            ),
            Err(e) => warn!(panel, error = %e, "Composite query failed"),
        }

        outcome
    }

    async fn run<S>(
        &self,
        request: &QueryRangeRequest,
        store: Arc<S>,
        cancel: &CancellationToken,
    ) -> Result<QueryResponse>
    where
        S: SeriesStore + ?Sized,
    {
        request.validate()?;
        let range = request.time_range()?;
        let composite = &request.composite_query;
        let plan = composite.plan()?;

        debug!(
            queries = composite.len(),
            dispatched = plan.builders().len(),
            formulas = plan.formulas().len(),
            "Planned composite query"
        );

        if cancel.is_cancelled() {
            return Err(canceled(CancelReason::Caller));
        }

        let request_token = cancel.child_token();
        let evaluation = self.evaluate(&plan, range, request.step, store, &request_token);

        let results = match tokio::time::timeout(self.config.query_timeout(), evaluation).await {
            Ok(results) => results?,
            Err(_) => {
                request_token.cancel();
                return Err(canceled(CancelReason::Timeout));
            }
        };

        Ok(ResultFormatter::new(composite, &plan).format(
            &results,
            request.format_for_web,
            request.version,
        ))
    }

    async fn evaluate<S>(
        &self,
        plan: &QueryPlan,
        range: TimeRange,
        request_step: Option<u64>,
        store: Arc<S>,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, Vec<SeriesResult>>>
    where
        S: SeriesStore + ?Sized,
    {
        let mut results = self.dispatch(plan, range, request_step, store, cancel).await?;

        for formula in plan.formulas() {
            if cancel.is_cancelled() {
                return Err(canceled(CancelReason::Caller));
            }
            let series = evaluate_formula(&formula.expr, &results)?;
            metrics::record_formula();
            debug!(formula = %formula.name, series = series.len(), "Evaluated formula");
            results.insert(formula.name.clone(), series);
        }

        Ok(results)
    }

    /// Evaluate every planned builder query concurrently
    async fn dispatch<S>(
        &self,
        plan: &QueryPlan,
        range: TimeRange,
        request_step: Option<u64>,
        store: Arc<S>,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, Vec<SeriesResult>>>
    where
        S: SeriesStore + ?Sized,
    {
        let mut join_set = JoinSet::new();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_queries.max(1)));
        let max_points = self.config.max_points_per_series;

        for query in plan.builders() {
            let step = query
                .step_interval
                .or(request_step)
                .unwrap_or(self.config.default_step_secs);
            let window = EvalWindow::new(range, Duration::from_secs(step));

            let store = Arc::clone(&store);
            let semaphore = Arc::clone(&semaphore);
            let token = cancel.clone();
            let query = query.clone();

            join_set.spawn(async move {
                let _permit = tokio::select! {
                    permit = semaphore.acquire_owned() => permit
                        .map_err(|e| Error::Internal(format!("fan-out limiter closed: {}", e)))?,
                    _ = token.cancelled() => return Err(canceled(CancelReason::Caller)),
                };

                let evaluated = tokio::select! {
                    evaluated = store.evaluate(&query, window) => evaluated,
                    _ = token.cancelled() => return Err(canceled(CancelReason::Caller)),
                };
                metrics::record_store_evaluation(evaluated.is_ok());

                let series = evaluated
                    .and_then(|series| check_series(series, max_points))
                    .map_err(|e| Error::store(&query.name, e))?;
                Ok::<_, Error>((query.name, series))
            });
        }

        let mut results = BTreeMap::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    join_set.abort_all();
                    return Err(canceled(CancelReason::Caller));
                }
                joined = join_set.join_next() => match joined {
                    None => break,
                    Some(Ok(Ok((name, series)))) => {
                        debug!(query = %name, series = series.len(), "Builder query evaluated");
                        results.insert(name, series);
                    }
                    Some(Ok(Err(e))) => {
                        cancel.cancel();
                        join_set.abort_all();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        cancel.cancel();
                        join_set.abort_all();
                        return Err(Error::Internal(format!("builder query task failed: {}", e)));
                    }
                },
            }
        }

        Ok(results)
    }
}

fn canceled(reason: CancelReason) -> Error {
    Error::Canceled { reason }
}

fn panel_label(panel: PanelType) -> &'static str {
    match panel {
        PanelType::Graph => "graph",
        PanelType::Value => "value",
        PanelType::Table => "table",
    }
}

/// Sort samples, reject duplicate keys and oversized series
fn check_series(
    mut series: Vec<SeriesResult>,
    max_points: usize,
) -> std::result::Result<Vec<SeriesResult>, StoreError> {
    let mut seen = HashSet::with_capacity(series.len());
    for s in &mut series {
        if !seen.insert(s.key.clone()) {
            return Err(StoreError::BadData(format!("duplicate series key {}", s.key)));
        }
        normalize_samples(&mut s.samples);
        if s.samples.len() > max_points {
            return Err(StoreError::BadData(format!(
                "series {} has {} points, limit is {}",
                s.key,
                s.samples.len(),
                max_points
            )));
        }
    }
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SeriesKey;
    use crate::types::Sample;

    #[test]
    fn test_check_series_normalizes() {
        let series = vec![SeriesResult::new(
            SeriesKey::empty(),
            vec![Sample::new(2, 2.0), Sample::new(1, 1.0)],
        )];
        let checked = check_series(series, 10).unwrap();
        assert_eq!(checked[0].samples[0].timestamp, 1);
    }

    #[test]
    fn test_check_series_rejects_duplicates_and_oversize() {
        let key = SeriesKey::from_pairs([("host_name", "a")]);
        let dup = vec![
            SeriesResult::new(key.clone(), vec![]),
            SeriesResult::new(key.clone(), vec![]),
        ];
        assert!(matches!(check_series(dup, 10), Err(StoreError::BadData(_))));

        let big = vec![SeriesResult::new(
            key,
            (0..5).map(|i| Sample::new(i, 0.0)).collect(),
        )];
        assert!(matches!(check_series(big, 4), Err(StoreError::BadData(_))));
    }
}
