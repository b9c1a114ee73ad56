//! Data-access seam for every evaluation operation.
//!
//! Operations receive an `&dyn EvaluationStore` (or a generic `S: EvaluationStore`)
//! instead of reaching for a shared client. `PgStore` in [`crate::db`] is the
//! production implementation; [`MemoryStore`] backs tests and dry runs.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    Criterion, EvaluationPeriod, EvaluatorAssignment, EvaluatorStatus, ObjectiveScore,
    PeriodCriterion, PeriodResult, PeriodStatus, Resident, ResultPerCriterion, SchoolYear,
    SubjectiveScore,
};

#[async_trait]
pub trait EvaluationStore: Send + Sync {
    async fn list_residents(&self) -> Result<Vec<Resident>, StoreError>;
    /// Writes each resident keyed by id, falling back to a non-blank email match
    /// (which keeps the stored id). Blank emails never match. Returns rows written.
    async fn upsert_residents(&self, residents: &[Resident]) -> Result<usize, StoreError>;
    /// Replaces every field of the resident with this id.
    async fn update_resident(&self, resident: &Resident) -> Result<(), StoreError>;
    /// Removes the resident together with their assignments, scores and results.
    async fn delete_resident(&self, id: Uuid) -> Result<(), StoreError>;

    async fn find_or_create_school_year(&self, year: &str) -> Result<SchoolYear, StoreError>;
    /// Periods ordered newest first.
    async fn list_periods(&self) -> Result<Vec<EvaluationPeriod>, StoreError>;
    async fn get_period(&self, id: Uuid) -> Result<EvaluationPeriod, StoreError>;
    async fn insert_period(&self, period: &EvaluationPeriod) -> Result<(), StoreError>;
    async fn update_period_status(&self, id: Uuid, status: PeriodStatus) -> Result<(), StoreError>;
    async fn delete_period(&self, id: Uuid) -> Result<(), StoreError>;

    async fn list_criteria(&self) -> Result<Vec<Criterion>, StoreError>;
    async fn insert_criterion(&self, criterion: &Criterion) -> Result<(), StoreError>;

    async fn list_period_criteria(
        &self,
        period_id: Uuid,
    ) -> Result<Vec<PeriodCriterion>, StoreError>;
    async fn get_period_criterion(&self, id: Uuid) -> Result<PeriodCriterion, StoreError>;
    async fn insert_period_criterion(&self, row: &PeriodCriterion) -> Result<(), StoreError>;
    async fn update_period_criterion(
        &self,
        id: Uuid,
        weight: f64,
        max_score: i32,
    ) -> Result<(), StoreError>;
    async fn delete_period_criterion(&self, id: Uuid) -> Result<(), StoreError>;

    async fn list_evaluators(
        &self,
        period_id: Uuid,
    ) -> Result<Vec<EvaluatorAssignment>, StoreError>;
    async fn get_evaluator(&self, id: Uuid) -> Result<EvaluatorAssignment, StoreError>;
    async fn insert_evaluators(&self, rows: &[EvaluatorAssignment]) -> Result<(), StoreError>;
    async fn delete_evaluators(&self, period_id: Uuid, ids: &[Uuid]) -> Result<usize, StoreError>;
    async fn set_evaluator_status(
        &self,
        id: Uuid,
        status: EvaluatorStatus,
    ) -> Result<(), StoreError>;

    async fn objective_scores_page(
        &self,
        period_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ObjectiveScore>, StoreError>;
    async fn subjective_scores_page(
        &self,
        period_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<SubjectiveScore>, StoreError>;
    /// Writes the whole batch or nothing, keyed by (period criterion, target).
    async fn upsert_objective_scores(&self, rows: &[ObjectiveScore]) -> Result<usize, StoreError>;
    /// Writes the whole batch or nothing, keyed by (period criterion, evaluator, target).
    async fn upsert_subjective_scores(
        &self,
        rows: &[SubjectiveScore],
    ) -> Result<usize, StoreError>;

    /// Removes both derived row-sets for the period.
    async fn delete_results(&self, period_id: Uuid) -> Result<(), StoreError>;
    async fn insert_results_per_criterion(
        &self,
        rows: &[ResultPerCriterion],
    ) -> Result<Vec<ResultPerCriterion>, StoreError>;
    async fn insert_results(&self, rows: &[PeriodResult]) -> Result<Vec<PeriodResult>, StoreError>;
    async fn list_results(&self, period_id: Uuid) -> Result<Vec<PeriodResult>, StoreError>;
    async fn list_results_per_criterion(
        &self,
        period_id: Uuid,
    ) -> Result<Vec<ResultPerCriterion>, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    residents: Vec<Resident>,
    school_years: Vec<SchoolYear>,
    periods: Vec<EvaluationPeriod>,
    criteria: Vec<Criterion>,
    period_criteria: Vec<PeriodCriterion>,
    evaluators: Vec<EvaluatorAssignment>,
    objective: Vec<ObjectiveScore>,
    subjective: Vec<SubjectiveScore>,
    results_per_criterion: Vec<ResultPerCriterion>,
    results: Vec<PeriodResult>,
}

/// In-process store with per-operation failure injection.
///
/// Operation names match the trait method names, e.g. `"insert_results"`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    failing: Mutex<HashSet<&'static str>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call of `operation` fail until [`MemoryStore::heal`].
    pub fn fail(&self, operation: &'static str) {
        self.failing_ops().insert(operation);
    }

    pub fn heal(&self, operation: &'static str) {
        self.failing_ops().remove(operation);
    }

    fn failing_ops(&self) -> std::sync::MutexGuard<'_, HashSet<&'static str>> {
        self.failing.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self, operation: &'static str) -> Result<(), StoreError> {
        if self.failing_ops().contains(operation) {
            return Err(StoreError::Injected(operation.to_string()));
        }
        Ok(())
    }
}

fn page<T: Clone>(rows: impl Iterator<Item = T>, offset: i64, limit: i64) -> Vec<T> {
    rows.skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

fn not_found(entity: &'static str, id: Uuid) -> StoreError {
    StoreError::NotFound { entity, id }
}

#[async_trait]
impl EvaluationStore for MemoryStore {
    async fn list_residents(&self) -> Result<Vec<Resident>, StoreError> {
        self.check("list_residents")?;
        Ok(self.state().residents.clone())
    }

    async fn upsert_residents(&self, residents: &[Resident]) -> Result<usize, StoreError> {
        self.check("upsert_residents")?;
        let mut state = self.state();
        for resident in residents {
            let email = resident.email.trim();
            let by_id = state.residents.iter().position(|existing| existing.id == resident.id);
            let by_email = match by_id {
                Some(_) => None,
                None => state
                    .residents
                    .iter()
                    .position(|existing| !email.is_empty() && existing.email == email),
            };

            match (by_id, by_email) {
                (Some(index), _) => {
                    state.residents[index] = Resident {
                        email: email.to_string(),
                        ..resident.clone()
                    };
                }
                (None, Some(index)) => {
                    let existing = &mut state.residents[index];
                    existing.first_name = resident.first_name.clone();
                    existing.last_name = resident.last_name.clone();
                    existing.room = resident.room.clone();
                    existing.course_year = resident.course_year.clone();
                }
                (None, None) => state.residents.push(Resident {
                    email: email.to_string(),
                    ..resident.clone()
                }),
            }
        }
        Ok(residents.len())
    }

    async fn update_resident(&self, resident: &Resident) -> Result<(), StoreError> {
        self.check("update_resident")?;
        let mut state = self.state();
        let existing = state
            .residents
            .iter_mut()
            .find(|existing| existing.id == resident.id)
            .ok_or_else(|| not_found("dormer", resident.id))?;
        *existing = Resident {
            email: resident.email.trim().to_string(),
            ..resident.clone()
        };
        Ok(())
    }

    async fn delete_resident(&self, id: Uuid) -> Result<(), StoreError> {
        self.check("delete_resident")?;
        let mut state = self.state();
        let before = state.residents.len();
        state.residents.retain(|resident| resident.id != id);
        if state.residents.len() == before {
            return Err(not_found("dormer", id));
        }

        let assignments: HashSet<Uuid> = state
            .evaluators
            .iter()
            .filter(|ev| ev.dormer_id == id)
            .map(|ev| ev.id)
            .collect();
        state.evaluators.retain(|ev| ev.dormer_id != id);
        state.objective.retain(|row| row.target_dormer_id != id);
        state.subjective.retain(|row| {
            row.target_dormer_id != id && !assignments.contains(&row.period_evaluator_id)
        });
        state.results_per_criterion.retain(|row| row.target_dormer_id != id);
        state.results.retain(|row| row.target_dormer_id != id);
        Ok(())
    }

    async fn find_or_create_school_year(&self, year: &str) -> Result<SchoolYear, StoreError> {
        self.check("find_or_create_school_year")?;
        let mut state = self.state();
        if let Some(existing) = state.school_years.iter().find(|sy| sy.year == year) {
            return Ok(existing.clone());
        }
        let created = SchoolYear {
            id: Uuid::new_v4(),
            year: year.to_string(),
        };
        state.school_years.push(created.clone());
        Ok(created)
    }

    async fn list_periods(&self) -> Result<Vec<EvaluationPeriod>, StoreError> {
        self.check("list_periods")?;
        let mut periods = self.state().periods.clone();
        periods.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(periods)
    }

    async fn get_period(&self, id: Uuid) -> Result<EvaluationPeriod, StoreError> {
        self.check("get_period")?;
        self.state()
            .periods
            .iter()
            .find(|period| period.id == id)
            .cloned()
            .ok_or_else(|| not_found("evaluation period", id))
    }

    async fn insert_period(&self, period: &EvaluationPeriod) -> Result<(), StoreError> {
        self.check("insert_period")?;
        self.state().periods.push(period.clone());
        Ok(())
    }

    async fn update_period_status(&self, id: Uuid, status: PeriodStatus) -> Result<(), StoreError> {
        self.check("update_period_status")?;
        let mut state = self.state();
        let period = state
            .periods
            .iter_mut()
            .find(|period| period.id == id)
            .ok_or_else(|| not_found("evaluation period", id))?;
        period.status = status;
        Ok(())
    }

    async fn delete_period(&self, id: Uuid) -> Result<(), StoreError> {
        self.check("delete_period")?;
        let mut state = self.state();
        let before = state.periods.len();
        state.periods.retain(|period| period.id != id);
        if state.periods.len() == before {
            return Err(not_found("evaluation period", id));
        }
        state.period_criteria.retain(|pc| pc.evaluation_period_id != id);
        state.evaluators.retain(|ev| ev.evaluation_period_id != id);
        state.objective.retain(|row| row.evaluation_period_id != id);
        state.subjective.retain(|row| row.evaluation_period_id != id);
        state.results_per_criterion.retain(|row| row.evaluation_period_id != id);
        state.results.retain(|row| row.evaluation_period_id != id);
        Ok(())
    }

    async fn list_criteria(&self) -> Result<Vec<Criterion>, StoreError> {
        self.check("list_criteria")?;
        Ok(self.state().criteria.clone())
    }

    async fn insert_criterion(&self, criterion: &Criterion) -> Result<(), StoreError> {
        self.check("insert_criterion")?;
        self.state().criteria.push(criterion.clone());
        Ok(())
    }

    async fn list_period_criteria(
        &self,
        period_id: Uuid,
    ) -> Result<Vec<PeriodCriterion>, StoreError> {
        self.check("list_period_criteria")?;
        Ok(self
            .state()
            .period_criteria
            .iter()
            .filter(|pc| pc.evaluation_period_id == period_id)
            .cloned()
            .collect())
    }

    async fn get_period_criterion(&self, id: Uuid) -> Result<PeriodCriterion, StoreError> {
        self.check("get_period_criterion")?;
        self.state()
            .period_criteria
            .iter()
            .find(|pc| pc.id == id)
            .cloned()
            .ok_or_else(|| not_found("period criterion", id))
    }

    async fn insert_period_criterion(&self, row: &PeriodCriterion) -> Result<(), StoreError> {
        self.check("insert_period_criterion")?;
        self.state().period_criteria.push(row.clone());
        Ok(())
    }

    async fn update_period_criterion(
        &self,
        id: Uuid,
        weight: f64,
        max_score: i32,
    ) -> Result<(), StoreError> {
        self.check("update_period_criterion")?;
        let mut state = self.state();
        let row = state
            .period_criteria
            .iter_mut()
            .find(|pc| pc.id == id)
            .ok_or_else(|| not_found("period criterion", id))?;
        row.weight = weight;
        row.max_score = max_score;
        Ok(())
    }

    async fn delete_period_criterion(&self, id: Uuid) -> Result<(), StoreError> {
        self.check("delete_period_criterion")?;
        let mut state = self.state();
        state.period_criteria.retain(|pc| pc.id != id);
        state.objective.retain(|row| row.period_criteria_id != id);
        state.subjective.retain(|row| row.period_criteria_id != id);
        state.results_per_criterion.retain(|row| row.period_criteria_id != id);
        Ok(())
    }

    async fn list_evaluators(
        &self,
        period_id: Uuid,
    ) -> Result<Vec<EvaluatorAssignment>, StoreError> {
        self.check("list_evaluators")?;
        Ok(self
            .state()
            .evaluators
            .iter()
            .filter(|ev| ev.evaluation_period_id == period_id)
            .cloned()
            .collect())
    }

    async fn get_evaluator(&self, id: Uuid) -> Result<EvaluatorAssignment, StoreError> {
        self.check("get_evaluator")?;
        self.state()
            .evaluators
            .iter()
            .find(|ev| ev.id == id)
            .cloned()
            .ok_or_else(|| not_found("evaluator", id))
    }

    async fn insert_evaluators(&self, rows: &[EvaluatorAssignment]) -> Result<(), StoreError> {
        self.check("insert_evaluators")?;
        self.state().evaluators.extend_from_slice(rows);
        Ok(())
    }

    async fn delete_evaluators(&self, period_id: Uuid, ids: &[Uuid]) -> Result<usize, StoreError> {
        self.check("delete_evaluators")?;
        let mut state = self.state();
        let removed: HashSet<Uuid> = state
            .evaluators
            .iter()
            .filter(|ev| ev.evaluation_period_id == period_id && ids.contains(&ev.id))
            .map(|ev| ev.id)
            .collect();
        state.evaluators.retain(|ev| !removed.contains(&ev.id));
        state
            .subjective
            .retain(|row| !removed.contains(&row.period_evaluator_id));
        Ok(removed.len())
    }

    async fn set_evaluator_status(
        &self,
        id: Uuid,
        status: EvaluatorStatus,
    ) -> Result<(), StoreError> {
        self.check("set_evaluator_status")?;
        let mut state = self.state();
        let evaluator = state
            .evaluators
            .iter_mut()
            .find(|ev| ev.id == id)
            .ok_or_else(|| not_found("evaluator", id))?;
        evaluator.status = status;
        Ok(())
    }

    async fn objective_scores_page(
        &self,
        period_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ObjectiveScore>, StoreError> {
        self.check("objective_scores_page")?;
        let state = self.state();
        Ok(page(
            state
                .objective
                .iter()
                .filter(|row| row.evaluation_period_id == period_id)
                .cloned(),
            offset,
            limit,
        ))
    }

    async fn subjective_scores_page(
        &self,
        period_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<SubjectiveScore>, StoreError> {
        self.check("subjective_scores_page")?;
        let state = self.state();
        Ok(page(
            state
                .subjective
                .iter()
                .filter(|row| row.evaluation_period_id == period_id)
                .cloned(),
            offset,
            limit,
        ))
    }

    async fn upsert_objective_scores(&self, rows: &[ObjectiveScore]) -> Result<usize, StoreError> {
        self.check("upsert_objective_scores")?;
        let mut state = self.state();
        for row in rows {
            match state.objective.iter_mut().find(|existing| {
                existing.period_criteria_id == row.period_criteria_id
                    && existing.target_dormer_id == row.target_dormer_id
            }) {
                Some(existing) => existing.score = row.score,
                None => state.objective.push(row.clone()),
            }
        }
        Ok(rows.len())
    }

    async fn upsert_subjective_scores(
        &self,
        rows: &[SubjectiveScore],
    ) -> Result<usize, StoreError> {
        self.check("upsert_subjective_scores")?;
        let mut state = self.state();
        for row in rows {
            match state.subjective.iter_mut().find(|existing| {
                existing.period_criteria_id == row.period_criteria_id
                    && existing.period_evaluator_id == row.period_evaluator_id
                    && existing.target_dormer_id == row.target_dormer_id
            }) {
                Some(existing) => existing.score = row.score,
                None => state.subjective.push(row.clone()),
            }
        }
        Ok(rows.len())
    }

    async fn delete_results(&self, period_id: Uuid) -> Result<(), StoreError> {
        self.check("delete_results")?;
        let mut state = self.state();
        state.results.retain(|row| row.evaluation_period_id != period_id);
        state
            .results_per_criterion
            .retain(|row| row.evaluation_period_id != period_id);
        Ok(())
    }

    async fn insert_results_per_criterion(
        &self,
        rows: &[ResultPerCriterion],
    ) -> Result<Vec<ResultPerCriterion>, StoreError> {
        self.check("insert_results_per_criterion")?;
        self.state().results_per_criterion.extend_from_slice(rows);
        Ok(rows.to_vec())
    }

    async fn insert_results(&self, rows: &[PeriodResult]) -> Result<Vec<PeriodResult>, StoreError> {
        self.check("insert_results")?;
        self.state().results.extend_from_slice(rows);
        Ok(rows.to_vec())
    }

    async fn list_results(&self, period_id: Uuid) -> Result<Vec<PeriodResult>, StoreError> {
        self.check("list_results")?;
        Ok(self
            .state()
            .results
            .iter()
            .filter(|row| row.evaluation_period_id == period_id)
            .cloned()
            .collect())
    }

    async fn list_results_per_criterion(
        &self,
        period_id: Uuid,
    ) -> Result<Vec<ResultPerCriterion>, StoreError> {
        self.check("list_results_per_criterion")?;
        Ok(self
            .state()
            .results_per_criterion
            .iter()
            .filter(|row| row.evaluation_period_id == period_id)
            .cloned()
            .collect())
    }
}
