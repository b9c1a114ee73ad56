//! Results aggregation: per-criterion weighted sub-scores and per-dormer totals.

use std::collections::HashMap;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{AggregationError, StoreError};
use crate::models::{
    ObjectiveScore, PeriodCriterion, PeriodResult, Resident, ResultPerCriterion, SubjectiveScore,
};
use crate::store::EvaluationStore;

/// Rows fetched per request when paging through score tables.
pub const DEFAULT_PAGE_SIZE: i64 = 1000;

/// Both derived row-sets produced for one period.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    pub results_per_criterion: Vec<ResultPerCriterion>,
    pub results: Vec<PeriodResult>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    sum: f64,
    count: usize,
}

impl Tally {
    fn add(&mut self, score: f64) {
        self.sum += score;
        self.count += 1;
    }

    fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

type PairKey = (Uuid, Uuid);

fn tally_objective(scores: &[ObjectiveScore]) -> HashMap<PairKey, Tally> {
    let mut tallies: HashMap<PairKey, Tally> = HashMap::new();
    for score in scores {
        tallies
            .entry((score.period_criteria_id, score.target_dormer_id))
            .or_default()
            .add(score.score);
    }
    tallies
}

fn tally_subjective(scores: &[SubjectiveScore]) -> HashMap<PairKey, Tally> {
    let mut tallies: HashMap<PairKey, Tally> = HashMap::new();
    for score in scores {
        tallies
            .entry((score.period_criteria_id, score.target_dormer_id))
            .or_default()
            .add(score.score);
    }
    tallies
}

/// Raw score for one pair: peer mean when any peer score exists, else the
/// objective mean, else zero.
fn raw_score(subjective: Option<&Tally>, objective: Option<&Tally>) -> f64 {
    subjective
        .and_then(Tally::mean)
        .or_else(|| objective.and_then(Tally::mean))
        .unwrap_or(0.0)
}

/// Computes the derived row-sets for a consistent snapshot of source rows.
///
/// Emits one sub-score row for every (dormer, period criterion) pair, zeros
/// included, in dormer-then-criterion order. Totals are emitted only when
/// strictly positive.
pub fn compute(
    period_id: Uuid,
    residents: &[Resident],
    criteria: &[PeriodCriterion],
    objective: &[ObjectiveScore],
    subjective: &[SubjectiveScore],
) -> Aggregation {
    let objective = tally_objective(objective);
    let subjective = tally_subjective(subjective);

    let mut aggregation = Aggregation {
        results_per_criterion: Vec::with_capacity(residents.len() * criteria.len()),
        results: Vec::new(),
    };

    for resident in residents {
        let mut total = 0.0;

        for pc in criteria {
            let key = (pc.id, resident.id);
            let raw = raw_score(subjective.get(&key), objective.get(&key));
            let normalized = raw / f64::from(pc.max_score);
            let weighted = normalized * pc.weight;
            total += weighted;

            aggregation.results_per_criterion.push(ResultPerCriterion {
                period_criteria_id: pc.id,
                target_dormer_id: resident.id,
                total_score: weighted,
                evaluation_period_id: period_id,
            });
        }

        if total > 0.0 {
            aggregation.results.push(PeriodResult {
                target_dormer_id: resident.id,
                total_weighted_score: total,
                evaluation_period_id: period_id,
            });
        }
    }

    aggregation
}

pub async fn fetch_objective_scores<S: EvaluationStore + ?Sized>(
    store: &S,
    period_id: Uuid,
    page_size: i64,
) -> Result<Vec<ObjectiveScore>, StoreError> {
    let page_size = page_size.max(1);
    let mut rows = Vec::new();
    let mut offset = 0;
    loop {
        let batch = store
            .objective_scores_page(period_id, offset, page_size)
            .await?;
        let fetched = batch.len() as i64;
        rows.extend(batch);
        if fetched < page_size {
            break;
        }
        offset += page_size;
    }
    Ok(rows)
}

pub async fn fetch_subjective_scores<S: EvaluationStore + ?Sized>(
    store: &S,
    period_id: Uuid,
    page_size: i64,
) -> Result<Vec<SubjectiveScore>, StoreError> {
    let page_size = page_size.max(1);
    let mut rows = Vec::new();
    let mut offset = 0;
    loop {
        let batch = store
            .subjective_scores_page(period_id, offset, page_size)
            .await?;
        let fetched = batch.len() as i64;
        rows.extend(batch);
        if fetched < page_size {
            break;
        }
        offset += page_size;
    }
    Ok(rows)
}

fn read_failed(source_set: &'static str) -> impl FnOnce(StoreError) -> AggregationError {
    move |source| AggregationError::Read { source_set, source }
}

fn write_failed(target_set: &'static str) -> impl FnOnce(StoreError) -> AggregationError {
    move |source| AggregationError::Write { target_set, source }
}

/// Reads the four source row-sets, computes, and inserts both derived sets.
///
/// Prior derived rows must already be cleared; see [`refresh_period`].
#[instrument(skip(store))]
pub async fn recompute<S: EvaluationStore + ?Sized>(
    store: &S,
    period_id: Uuid,
    page_size: i64,
) -> Result<Aggregation, AggregationError> {
    let residents = store
        .list_residents()
        .await
        .map_err(read_failed("dormers"))?;
    let criteria = store
        .list_period_criteria(period_id)
        .await
        .map_err(read_failed("period_criteria"))?;
    let subjective = fetch_subjective_scores(store, period_id, page_size)
        .await
        .map_err(read_failed("subjective_scores"))?;
    let objective = fetch_objective_scores(store, period_id, page_size)
        .await
        .map_err(read_failed("objective_scores"))?;

    let computed = compute(period_id, &residents, &criteria, &objective, &subjective);

    let results_per_criterion = store
        .insert_results_per_criterion(&computed.results_per_criterion)
        .await
        .map_err(write_failed("results_per_criteria"))?;
    let results = store
        .insert_results(&computed.results)
        .await
        .map_err(write_failed("results"))?;

    info!(
        dormers = residents.len(),
        criteria = criteria.len(),
        ranked = results.len(),
        "results stored"
    );

    Ok(Aggregation {
        results_per_criterion,
        results,
    })
}

/// Outcome of the delete-then-recompute sequence for one period.
#[derive(Debug)]
pub enum RefreshOutcome {
    Recomputed(Aggregation),
    /// The run failed; `fallback` holds whatever result rows remain stored.
    Failed {
        error: AggregationError,
        fallback: Vec<PeriodResult>,
    },
}

impl RefreshOutcome {
    /// Result rows to display, fresh or fallback.
    pub fn results(&self) -> &[PeriodResult] {
        match self {
            RefreshOutcome::Recomputed(aggregation) => &aggregation.results,
            RefreshOutcome::Failed { fallback, .. } => fallback,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RefreshOutcome::Recomputed(_))
    }
}

/// Clears the period's derived rows and recomputes them.
///
/// The delete and the inserts are not atomic: a failure in between leaves the
/// period with no derived rows until the next successful run.
#[instrument(skip(store))]
pub async fn refresh_period<S: EvaluationStore + ?Sized>(
    store: &S,
    period_id: Uuid,
    page_size: i64,
) -> RefreshOutcome {
    let attempt = match store.delete_results(period_id).await {
        Ok(()) => recompute(store, period_id, page_size).await,
        Err(source) => Err(AggregationError::Write {
            target_set: "results",
            source,
        }),
    };

    match attempt {
        Ok(aggregation) => RefreshOutcome::Recomputed(aggregation),
        Err(err) => {
            error!(error = %err, "failed to calculate results");
            let fallback = match store.list_results(period_id).await {
                Ok(rows) => rows,
                Err(read_err) => {
                    warn!(error = %read_err, "could not load stored results for fallback");
                    Vec::new()
                }
            };
            RefreshOutcome::Failed {
                error: err,
                fallback,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resident(name: &str) -> Resident {
        Resident {
            id: Uuid::new_v4(),
            first_name: name.to_string(),
            last_name: "Dormer".to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            room: "101".to_string(),
            course_year: "BSIT 3".to_string(),
        }
    }

    fn criterion(period: Uuid, weight: f64, max_score: i32) -> PeriodCriterion {
        PeriodCriterion {
            id: Uuid::new_v4(),
            evaluation_period_id: period,
            criterion_id: Uuid::new_v4(),
            weight,
            max_score,
        }
    }

    fn peer(period: Uuid, pc: Uuid, target: Uuid, score: f64) -> SubjectiveScore {
        SubjectiveScore {
            period_criteria_id: pc,
            period_evaluator_id: Uuid::new_v4(),
            target_dormer_id: target,
            score,
            evaluation_period_id: period,
        }
    }

    fn staff(period: Uuid, pc: Uuid, target: Uuid, score: f64) -> ObjectiveScore {
        ObjectiveScore {
            period_criteria_id: pc,
            target_dormer_id: target,
            score,
            evaluation_period_id: period,
        }
    }

    #[test]
    fn peer_mean_is_normalized_and_weighted() {
        let period = Uuid::new_v4();
        let a = resident("Avery");
        let b = resident("Jules");
        let pc = criterion(period, 50.0, 10);
        let subjective = vec![peer(period, pc.id, a.id, 8.0), peer(period, pc.id, a.id, 10.0)];

        let out = compute(period, &[a.clone(), b.clone()], &[pc], &[], &subjective);

        assert_eq!(out.results_per_criterion.len(), 2);
        assert_eq!(out.results_per_criterion[0].total_score, 45.0);
        assert_eq!(out.results_per_criterion[1].target_dormer_id, b.id);
        assert_eq!(out.results_per_criterion[1].total_score, 0.0);
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.results[0].target_dormer_id, a.id);
        assert_eq!(out.results[0].total_weighted_score, 45.0);
    }

    #[test]
    fn objective_scores_fill_in_without_peer_scores() {
        let period = Uuid::new_v4();
        let a = resident("Kiara");
        let conduct = criterion(period, 60.0, 20);
        let chores = criterion(period, 40.0, 10);
        let objective = vec![
            staff(period, conduct.id, a.id, 18.0),
            staff(period, chores.id, a.id, 9.0),
        ];

        let out = compute(period, &[a], &[conduct, chores], &objective, &[]);

        assert_eq!(out.results_per_criterion[0].total_score, 54.0);
        assert_eq!(out.results_per_criterion[1].total_score, 36.0);
        assert_eq!(out.results[0].total_weighted_score, 90.0);
    }

    #[test]
    fn peer_scores_take_precedence_over_objective() {
        let period = Uuid::new_v4();
        let a = resident("Avery");
        let pc = criterion(period, 20.0, 5);
        let objective = vec![staff(period, pc.id, a.id, 1.0)];
        let subjective = vec![peer(period, pc.id, a.id, 5.0)];

        let out = compute(period, &[a], &[pc], &objective, &subjective);

        assert_eq!(out.results_per_criterion[0].total_score, 20.0);
    }

    #[test]
    fn duplicate_objective_rows_are_averaged() {
        let period = Uuid::new_v4();
        let a = resident("Avery");
        let pc = criterion(period, 10.0, 10);
        let objective = vec![staff(period, pc.id, a.id, 4.0), staff(period, pc.id, a.id, 6.0)];

        let out = compute(period, &[a], &[pc], &objective, &[]);

        assert_eq!(out.results_per_criterion[0].total_score, 5.0);
    }

    #[test]
    fn scores_from_other_criteria_do_not_leak() {
        let period = Uuid::new_v4();
        let a = resident("Avery");
        let counted = criterion(period, 30.0, 10);
        let unrelated = Uuid::new_v4();
        let subjective = vec![peer(period, unrelated, a.id, 10.0)];

        let out = compute(period, &[a], &[counted], &[], &subjective);

        assert_eq!(out.results_per_criterion[0].total_score, 0.0);
        assert!(out.results.is_empty());
    }

    #[test]
    fn no_criteria_means_no_rows() {
        let period = Uuid::new_v4();
        let out = compute(period, &[resident("Avery")], &[], &[], &[]);
        assert_eq!(out, Aggregation::default());
    }
}
