//! Validated administrative operations over dormers, periods, criteria, evaluators
//! and scores.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::aggregate::fetch_subjective_scores;
use crate::error::{AdminError, StoreError};
use crate::models::{
    Criterion, CriterionKind, EvaluationPeriod, EvaluatorAssignment, EvaluatorStatus,
    ObjectiveScore, PeriodCriterion, PeriodStatus, Resident, Semester, SubjectiveScore,
};
use crate::store::EvaluationStore;

const MAX_PERIODS_PER_YEAR: usize = 2;
const WEIGHT_TOLERANCE: f64 = 0.001;

fn require(value: &str, field: &'static str) -> Result<String, AdminError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AdminError::Blank(field));
    }
    Ok(trimmed.to_string())
}

/// Field edits for [`edit_resident`]. `None` leaves the stored value as is.
#[derive(Debug, Clone, Default)]
pub struct ResidentChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub room: Option<String>,
    pub course_year: Option<String>,
}

async fn check_email_free<S: EvaluationStore + ?Sized>(
    store: &S,
    email: &str,
    owner: Option<Uuid>,
) -> Result<(), AdminError> {
    if email.is_empty() {
        return Ok(());
    }
    let taken = store
        .list_residents()
        .await?
        .iter()
        .any(|resident| resident.email == email && Some(resident.id) != owner);
    if taken {
        return Err(AdminError::DuplicateEmail(email.to_string()));
    }
    Ok(())
}

#[instrument(skip(store, resident))]
pub async fn add_resident<S: EvaluationStore + ?Sized>(
    store: &S,
    resident: Resident,
) -> Result<Resident, AdminError> {
    let resident = Resident {
        first_name: require(&resident.first_name, "first name")?,
        last_name: require(&resident.last_name, "last name")?,
        email: resident.email.trim().to_lowercase(),
        room: resident.room.trim().to_string(),
        course_year: resident.course_year.trim().to_string(),
        ..resident
    };
    check_email_free(store, &resident.email, None).await?;

    store.upsert_residents(std::slice::from_ref(&resident)).await?;
    info!(dormer = %resident.id, "dormer added");
    Ok(resident)
}

pub async fn edit_resident<S: EvaluationStore + ?Sized>(
    store: &S,
    id: Uuid,
    changes: ResidentChanges,
) -> Result<Resident, AdminError> {
    let mut resident = store
        .list_residents()
        .await?
        .into_iter()
        .find(|resident| resident.id == id)
        .ok_or(StoreError::NotFound { entity: "dormer", id })?;

    if let Some(first_name) = changes.first_name {
        resident.first_name = require(&first_name, "first name")?;
    }
    if let Some(last_name) = changes.last_name {
        resident.last_name = require(&last_name, "last name")?;
    }
    if let Some(email) = changes.email {
        resident.email = email.trim().to_lowercase();
        check_email_free(store, &resident.email, Some(id)).await?;
    }
    if let Some(room) = changes.room {
        resident.room = room.trim().to_string();
    }
    if let Some(course_year) = changes.course_year {
        resident.course_year = course_year.trim().to_string();
    }

    store.update_resident(&resident).await?;
    Ok(resident)
}

/// Deletes the dormer with every assignment, score and result that refers to them.
#[instrument(skip(store))]
pub async fn delete_resident<S: EvaluationStore + ?Sized>(
    store: &S,
    id: Uuid,
) -> Result<(), AdminError> {
    store.delete_resident(id).await?;
    info!(dormer = %id, "dormer deleted");
    Ok(())
}

#[instrument(skip(store))]
pub async fn create_period<S: EvaluationStore + ?Sized>(
    store: &S,
    title: &str,
    school_year: &str,
    semester: Semester,
) -> Result<EvaluationPeriod, AdminError> {
    let title = require(title, "title")?;
    let year = require(school_year, "school year")?;
    let school_year = store.find_or_create_school_year(&year).await?;

    let existing: Vec<EvaluationPeriod> = store
        .list_periods()
        .await?
        .into_iter()
        .filter(|period| period.school_year_id == school_year.id)
        .collect();

    if existing.len() >= MAX_PERIODS_PER_YEAR {
        return Err(AdminError::TooManyPeriods(school_year.year));
    }
    if existing.iter().any(|period| period.semester == semester) {
        return Err(AdminError::DuplicateSemester {
            year: school_year.year,
            semester: semester.ordinal().to_string(),
        });
    }

    let period = EvaluationPeriod {
        id: Uuid::new_v4(),
        title,
        school_year_id: school_year.id,
        school_year: school_year.year,
        semester,
        status: PeriodStatus::Pending,
        created_at: Utc::now(),
    };
    store.insert_period(&period).await?;
    info!(period = %period.id, "evaluation period created");
    Ok(period)
}

pub async fn set_period_status<S: EvaluationStore + ?Sized>(
    store: &S,
    period_id: Uuid,
    status: PeriodStatus,
) -> Result<(), AdminError> {
    store.update_period_status(period_id, status).await?;
    Ok(())
}

pub async fn delete_period<S: EvaluationStore + ?Sized>(
    store: &S,
    period_id: Uuid,
) -> Result<(), AdminError> {
    store.delete_period(period_id).await?;
    info!(period = %period_id, "evaluation period deleted");
    Ok(())
}

pub async fn add_criterion<S: EvaluationStore + ?Sized>(
    store: &S,
    name: &str,
    description: &str,
    kind: CriterionKind,
) -> Result<Criterion, AdminError> {
    let criterion = Criterion {
        id: Uuid::new_v4(),
        name: require(name, "criterion name")?,
        description: description.trim().to_string(),
        kind,
    };
    store.insert_criterion(&criterion).await?;
    Ok(criterion)
}

/// Percentage still available in a period, rounded to two decimals and floored at zero.
pub fn remaining_weight(criteria: &[PeriodCriterion]) -> f64 {
    let used: f64 = criteria.iter().map(|pc| pc.weight).sum();
    let remaining = ((100.0 - used) * 100.0).round() / 100.0;
    remaining.clamp(0.0, 100.0)
}

fn check_weight(weight: f64, remaining: f64) -> Result<(), AdminError> {
    if !weight.is_finite() || weight <= 0.0 {
        return Err(AdminError::InvalidWeight(weight));
    }
    if weight > remaining + WEIGHT_TOLERANCE {
        return Err(AdminError::WeightBudgetExceeded {
            requested: weight,
            remaining,
        });
    }
    Ok(())
}

fn check_max_score(max_score: i32) -> Result<(), AdminError> {
    if max_score < 1 {
        return Err(AdminError::InvalidMaxScore(max_score));
    }
    Ok(())
}

#[instrument(skip(store))]
pub async fn attach_criterion<S: EvaluationStore + ?Sized>(
    store: &S,
    period_id: Uuid,
    criterion_id: Uuid,
    weight: f64,
    max_score: i32,
) -> Result<PeriodCriterion, AdminError> {
    store.get_period(period_id).await?;
    let current = store.list_period_criteria(period_id).await?;
    check_weight(weight, remaining_weight(&current))?;
    check_max_score(max_score)?;

    let row = PeriodCriterion {
        id: Uuid::new_v4(),
        evaluation_period_id: period_id,
        criterion_id,
        weight,
        max_score,
    };
    store.insert_period_criterion(&row).await?;
    Ok(row)
}

/// Edits weight and optionally max score; the row's own weight returns to the budget first.
#[instrument(skip(store))]
pub async fn update_period_criterion<S: EvaluationStore + ?Sized>(
    store: &S,
    period_criteria_id: Uuid,
    weight: f64,
    max_score: Option<i32>,
) -> Result<PeriodCriterion, AdminError> {
    let existing = store.get_period_criterion(period_criteria_id).await?;
    let others: Vec<PeriodCriterion> = store
        .list_period_criteria(existing.evaluation_period_id)
        .await?
        .into_iter()
        .filter(|pc| pc.id != period_criteria_id)
        .collect();
    check_weight(weight, remaining_weight(&others))?;
    let max_score = max_score.unwrap_or(existing.max_score);
    check_max_score(max_score)?;

    store
        .update_period_criterion(period_criteria_id, weight, max_score)
        .await?;
    Ok(PeriodCriterion {
        weight,
        max_score,
        ..existing
    })
}

pub async fn detach_criterion<S: EvaluationStore + ?Sized>(
    store: &S,
    period_criteria_id: Uuid,
) -> Result<(), AdminError> {
    store.delete_period_criterion(period_criteria_id).await?;
    Ok(())
}

/// Adds the dormers not already assigned to the period as pending evaluators.
#[instrument(skip(store, dormer_ids), fields(requested = dormer_ids.len()))]
pub async fn assign_evaluators<S: EvaluationStore + ?Sized>(
    store: &S,
    period_id: Uuid,
    dormer_ids: &[Uuid],
) -> Result<Vec<EvaluatorAssignment>, AdminError> {
    store.get_period(period_id).await?;
    let assigned: HashSet<Uuid> = store
        .list_evaluators(period_id)
        .await?
        .into_iter()
        .map(|ev| ev.dormer_id)
        .collect();

    let mut seen = HashSet::new();
    let rows: Vec<EvaluatorAssignment> = dormer_ids
        .iter()
        .filter(|id| !assigned.contains(*id) && seen.insert(**id))
        .map(|dormer_id| EvaluatorAssignment {
            id: Uuid::new_v4(),
            evaluation_period_id: period_id,
            dormer_id: *dormer_id,
            status: EvaluatorStatus::Pending,
        })
        .collect();

    if rows.is_empty() {
        return Err(AdminError::EmptySelection("new dormers"));
    }

    store.insert_evaluators(&rows).await?;
    info!(added = rows.len(), "evaluators assigned");
    Ok(rows)
}

pub async fn remove_evaluators<S: EvaluationStore + ?Sized>(
    store: &S,
    period_id: Uuid,
    evaluator_ids: &[Uuid],
) -> Result<usize, AdminError> {
    if evaluator_ids.is_empty() {
        return Err(AdminError::EmptySelection("evaluators"));
    }
    Ok(store.delete_evaluators(period_id, evaluator_ids).await?)
}

/// Dormers, other than the evaluator, that the evaluator has not scored yet.
pub async fn pending_targets<S: EvaluationStore + ?Sized>(
    store: &S,
    evaluator: &EvaluatorAssignment,
    page_size: i64,
) -> Result<Vec<Uuid>, AdminError> {
    let scored: HashSet<Uuid> =
        fetch_subjective_scores(store, evaluator.evaluation_period_id, page_size)
            .await?
            .into_iter()
            .filter(|row| row.period_evaluator_id == evaluator.id)
            .map(|row| row.target_dormer_id)
            .collect();

    Ok(store
        .list_residents()
        .await?
        .into_iter()
        .map(|resident| resident.id)
        .filter(|id| *id != evaluator.dormer_id && !scored.contains(id))
        .collect())
}

#[instrument(skip(store))]
pub async fn complete_evaluator<S: EvaluationStore + ?Sized>(
    store: &S,
    evaluator_id: Uuid,
    page_size: i64,
) -> Result<(), AdminError> {
    let evaluator = store.get_evaluator(evaluator_id).await?;
    let pending = pending_targets(store, &evaluator, page_size).await?;
    if !pending.is_empty() {
        return Err(AdminError::PendingTargets(pending.len()));
    }
    store
        .set_evaluator_status(evaluator_id, EvaluatorStatus::Completed)
        .await?;
    info!("evaluator completed");
    Ok(())
}

/// One score as entered by staff or a peer evaluator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoreEntry {
    pub period_criteria_id: Uuid,
    pub target_dormer_id: Uuid,
    pub score: f64,
}

async fn criteria_by_id<S: EvaluationStore + ?Sized>(
    store: &S,
    period_id: Uuid,
) -> Result<HashMap<Uuid, (PeriodCriterion, CriterionKind)>, AdminError> {
    let kinds: HashMap<Uuid, CriterionKind> = store
        .list_criteria()
        .await?
        .into_iter()
        .map(|criterion| (criterion.id, criterion.kind))
        .collect();

    let mut by_id = HashMap::new();
    for pc in store.list_period_criteria(period_id).await? {
        if let Some(kind) = kinds.get(&pc.criterion_id) {
            by_id.insert(pc.id, (pc, *kind));
        }
    }
    Ok(by_id)
}

fn check_entry(
    entry: &ScoreEntry,
    criteria: &HashMap<Uuid, (PeriodCriterion, CriterionKind)>,
    expected: CriterionKind,
) -> Result<(), AdminError> {
    let (pc, kind) = criteria
        .get(&entry.period_criteria_id)
        .ok_or(AdminError::ForeignCriterion(entry.period_criteria_id))?;
    if *kind != expected {
        return Err(AdminError::WrongCriterionKind {
            id: pc.id,
            expected,
            actual: *kind,
        });
    }

    let max = f64::from(pc.max_score);
    let in_range = match expected {
        CriterionKind::Objective => (0.0..=max).contains(&entry.score),
        CriterionKind::Subjective => entry.score > 0.0 && entry.score <= max,
    };
    if !in_range {
        return Err(AdminError::ScoreOutOfRange {
            period_criteria_id: pc.id,
            score: entry.score,
            max_score: pc.max_score,
        });
    }
    Ok(())
}

/// Validates every entry, then upserts the batch as one write.
#[instrument(skip(store, entries), fields(entries = entries.len()))]
pub async fn record_objective_scores<S: EvaluationStore + ?Sized>(
    store: &S,
    period_id: Uuid,
    entries: &[ScoreEntry],
) -> Result<usize, AdminError> {
    if entries.is_empty() {
        return Err(AdminError::EmptySelection("scores"));
    }
    let criteria = criteria_by_id(store, period_id).await?;
    for entry in entries {
        check_entry(entry, &criteria, CriterionKind::Objective)?;
    }

    let rows: Vec<ObjectiveScore> = entries
        .iter()
        .map(|entry| ObjectiveScore {
            period_criteria_id: entry.period_criteria_id,
            target_dormer_id: entry.target_dormer_id,
            score: entry.score,
            evaluation_period_id: period_id,
        })
        .collect();
    Ok(store.upsert_objective_scores(&rows).await?)
}

/// Validates every entry for one evaluator, then upserts the batch as one write.
#[instrument(skip(store, entries), fields(entries = entries.len()))]
pub async fn record_subjective_scores<S: EvaluationStore + ?Sized>(
    store: &S,
    evaluator_id: Uuid,
    entries: &[ScoreEntry],
) -> Result<usize, AdminError> {
    if entries.is_empty() {
        return Err(AdminError::EmptySelection("scores"));
    }
    let evaluator = store.get_evaluator(evaluator_id).await?;
    let criteria = criteria_by_id(store, evaluator.evaluation_period_id).await?;
    for entry in entries {
        check_entry(entry, &criteria, CriterionKind::Subjective)?;
    }

    let rows: Vec<SubjectiveScore> = entries
        .iter()
        .map(|entry| SubjectiveScore {
            period_criteria_id: entry.period_criteria_id,
            period_evaluator_id: evaluator.id,
            target_dormer_id: entry.target_dormer_id,
            score: entry.score,
            evaluation_period_id: evaluator.evaluation_period_id,
        })
        .collect();
    Ok(store.upsert_subjective_scores(&rows).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn period_with_criteria(
        store: &MemoryStore,
    ) -> (EvaluationPeriod, PeriodCriterion, PeriodCriterion) {
        let period = create_period(store, "First Sem Review", "2025-2026", Semester::First)
            .await
            .unwrap();
        let cleanliness =
            add_criterion(store, "Cleanliness", "Room upkeep", CriterionKind::Objective)
                .await
                .unwrap();
        let conduct = add_criterion(store, "Conduct", "Peer rating", CriterionKind::Subjective)
            .await
            .unwrap();
        let objective = attach_criterion(store, period.id, cleanliness.id, 60.0, 20)
            .await
            .unwrap();
        let subjective = attach_criterion(store, period.id, conduct.id, 40.0, 10)
            .await
            .unwrap();
        (period, objective, subjective)
    }

    fn dormer(first: &str) -> Resident {
        Resident {
            id: Uuid::new_v4(),
            first_name: first.to_string(),
            last_name: "Reyes".to_string(),
            email: format!("{}@example.com", first.to_lowercase()),
            room: "3A".to_string(),
            course_year: "BSA 2".to_string(),
        }
    }

    #[tokio::test]
    async fn at_most_two_periods_per_school_year() {
        let store = MemoryStore::new();
        create_period(&store, "First", "2025-2026", Semester::First)
            .await
            .unwrap();

        let duplicate = create_period(&store, "Again", "2025-2026", Semester::First).await;
        assert!(matches!(duplicate, Err(AdminError::DuplicateSemester { .. })));

        create_period(&store, "Second", "2025-2026", Semester::Second)
            .await
            .unwrap();
        let third = create_period(&store, "Third", "2025-2026", Semester::Second).await;
        assert!(matches!(third, Err(AdminError::TooManyPeriods(_))));

        create_period(&store, "Next year", "2026-2027", Semester::First)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn weights_cannot_exceed_one_hundred() {
        let store = MemoryStore::new();
        let (period, objective, _) = period_with_criteria(&store).await;
        let extra = add_criterion(&store, "Curfew", "", CriterionKind::Objective)
            .await
            .unwrap();

        let over = attach_criterion(&store, period.id, extra.id, 0.5, 5).await;
        assert!(matches!(over, Err(AdminError::WeightBudgetExceeded { .. })));

        let updated = update_period_criterion(&store, objective.id, 50.0, None)
            .await
            .unwrap();
        assert_eq!(updated.max_score, 20);
        let criteria = store.list_period_criteria(period.id).await.unwrap();
        assert_eq!(remaining_weight(&criteria), 10.0);

        attach_criterion(&store, period.id, extra.id, 10.0, 5)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejects_bad_weight_and_max_score() {
        let store = MemoryStore::new();
        let period = create_period(&store, "P", "2030", Semester::First)
            .await
            .unwrap();
        let criterion = add_criterion(&store, "Chores", "", CriterionKind::Objective)
            .await
            .unwrap();

        assert!(matches!(
            attach_criterion(&store, period.id, criterion.id, 0.0, 10).await,
            Err(AdminError::InvalidWeight(_))
        ));
        assert!(matches!(
            attach_criterion(&store, period.id, criterion.id, 10.0, 0).await,
            Err(AdminError::InvalidMaxScore(0))
        ));
    }

    #[test]
    fn remaining_weight_rounds_and_floors() {
        let period = Uuid::new_v4();
        let rows: Vec<PeriodCriterion> = [33.333, 33.333, 33.333]
            .iter()
            .map(|weight| PeriodCriterion {
                id: Uuid::new_v4(),
                evaluation_period_id: period,
                criterion_id: Uuid::new_v4(),
                weight: *weight,
                max_score: 10,
            })
            .collect();
        assert_eq!(remaining_weight(&rows), 0.0);
        assert_eq!(remaining_weight(&rows[..1]), 66.67);
        assert_eq!(remaining_weight(&[]), 100.0);
    }

    #[tokio::test]
    async fn objective_batch_validates_kind_and_range() {
        let store = MemoryStore::new();
        let (period, objective, subjective) = period_with_criteria(&store).await;
        let target = Uuid::new_v4();

        let wrong_kind = record_objective_scores(
            &store,
            period.id,
            &[ScoreEntry {
                period_criteria_id: subjective.id,
                target_dormer_id: target,
                score: 5.0,
            }],
        )
        .await;
        assert!(matches!(wrong_kind, Err(AdminError::WrongCriterionKind { .. })));

        let too_high = record_objective_scores(
            &store,
            period.id,
            &[ScoreEntry {
                period_criteria_id: objective.id,
                target_dormer_id: target,
                score: 21.0,
            }],
        )
        .await;
        assert!(matches!(too_high, Err(AdminError::ScoreOutOfRange { .. })));

        let written = record_objective_scores(
            &store,
            period.id,
            &[ScoreEntry {
                period_criteria_id: objective.id,
                target_dormer_id: target,
                score: 0.0,
            }],
        )
        .await
        .unwrap();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn evaluator_completes_after_scoring_everyone_else() {
        let store = MemoryStore::new();
        let (period, _, subjective) = period_with_criteria(&store).await;
        let (evaluator_dormer, peer_a, peer_b) = (dormer("Mara"), dormer("Nico"), dormer("Olive"));
        store
            .upsert_residents(&[evaluator_dormer.clone(), peer_a.clone(), peer_b.clone()])
            .await
            .unwrap();

        let twice = [evaluator_dormer.id, evaluator_dormer.id];
        let assigned = assign_evaluators(&store, period.id, &twice).await.unwrap();
        assert_eq!(assigned.len(), 1);
        let evaluator = &assigned[0];

        let again = assign_evaluators(&store, period.id, &[evaluator_dormer.id]).await;
        assert!(matches!(again, Err(AdminError::EmptySelection(_))));

        record_subjective_scores(
            &store,
            evaluator.id,
            &[ScoreEntry {
                period_criteria_id: subjective.id,
                target_dormer_id: peer_a.id,
                score: 8.0,
            }],
        )
        .await
        .unwrap();

        let early = complete_evaluator(&store, evaluator.id, 1000).await;
        assert!(matches!(early, Err(AdminError::PendingTargets(1))));

        record_subjective_scores(
            &store,
            evaluator.id,
            &[ScoreEntry {
                period_criteria_id: subjective.id,
                target_dormer_id: peer_b.id,
                score: 9.0,
            }],
        )
        .await
        .unwrap();

        complete_evaluator(&store, evaluator.id, 1000).await.unwrap();
        let status = store.get_evaluator(evaluator.id).await.unwrap().status;
        assert_eq!(status, EvaluatorStatus::Completed);
    }

    #[tokio::test]
    async fn peer_score_of_zero_is_rejected() {
        let store = MemoryStore::new();
        let (period, _, subjective) = period_with_criteria(&store).await;
        let evaluator = assign_evaluators(&store, period.id, &[Uuid::new_v4()])
            .await
            .unwrap()
            .remove(0);

        let zero = record_subjective_scores(
            &store,
            evaluator.id,
            &[ScoreEntry {
                period_criteria_id: subjective.id,
                target_dormer_id: Uuid::new_v4(),
                score: 0.0,
            }],
        )
        .await;
        assert!(matches!(zero, Err(AdminError::ScoreOutOfRange { .. })));
    }

    #[tokio::test]
    async fn removals_cascade_to_scores() {
        let store = MemoryStore::new();
        let (period, objective, subjective) = period_with_criteria(&store).await;
        let (rater, target) = (dormer("Pia"), dormer("Quin"));
        store
            .upsert_residents(&[rater.clone(), target.clone()])
            .await
            .unwrap();
        let evaluator = assign_evaluators(&store, period.id, &[rater.id])
            .await
            .unwrap()
            .remove(0);
        record_subjective_scores(
            &store,
            evaluator.id,
            &[ScoreEntry {
                period_criteria_id: subjective.id,
                target_dormer_id: target.id,
                score: 7.0,
            }],
        )
        .await
        .unwrap();

        let removed = remove_evaluators(&store, period.id, &[evaluator.id])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store
            .subjective_scores_page(period.id, 0, 100)
            .await
            .unwrap()
            .is_empty());

        detach_criterion(&store, objective.id).await.unwrap();
        let remaining = store.list_period_criteria(period.id).await.unwrap();
        assert_eq!(remaining, vec![subjective.clone()]);
        assert_eq!(remaining_weight(&remaining), 60.0);

        update_period_criterion(&store, subjective.id, 100.0, None)
            .await
            .unwrap();
        let updated = store.get_period_criterion(subjective.id).await.unwrap();
        assert_eq!((updated.weight, updated.max_score), (100.0, 10));
    }

    #[tokio::test]
    async fn deleting_a_period_frees_its_semester() {
        let store = MemoryStore::new();
        let period = create_period(&store, "First", "2025-2026", Semester::First)
            .await
            .unwrap();
        set_period_status(&store, period.id, PeriodStatus::Closed)
            .await
            .unwrap();
        assert_eq!(
            store.get_period(period.id).await.unwrap().status,
            PeriodStatus::Closed
        );

        delete_period(&store, period.id).await.unwrap();
        assert!(matches!(
            delete_period(&store, period.id).await,
            Err(AdminError::Store(StoreError::NotFound { .. }))
        ));
        create_period(&store, "First again", "2025-2026", Semester::First)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn added_residents_are_trimmed_and_need_a_name() {
        let store = MemoryStore::new();
        let added = add_resident(
            &store,
            Resident {
                first_name: " Ana ".to_string(),
                email: " Ana@Example.com ".to_string(),
                ..dormer("Ana")
            },
        )
        .await
        .unwrap();
        assert_eq!(added.first_name, "Ana");
        assert_eq!(added.email, "ana@example.com");

        let nameless = add_resident(
            &store,
            Resident {
                last_name: "  ".to_string(),
                ..dormer("Ben")
            },
        )
        .await;
        assert!(matches!(nameless, Err(AdminError::Blank("last name"))));

        let taken = add_resident(&store, dormer("Ana")).await;
        assert!(matches!(taken, Err(AdminError::DuplicateEmail(_))));

        for first in ["Cid", "Dee"] {
            let blank = Resident {
                email: String::new(),
                ..dormer(first)
            };
            add_resident(&store, blank).await.unwrap();
        }
        assert_eq!(store.list_residents().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn editing_changes_only_the_given_fields() {
        let store = MemoryStore::new();
        let ana = add_resident(&store, dormer("Ana")).await.unwrap();
        let ben = add_resident(&store, dormer("Ben")).await.unwrap();

        let moved = edit_resident(
            &store,
            ana.id,
            ResidentChanges {
                room: Some("5B".to_string()),
                ..ResidentChanges::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(moved.room, "5B");
        assert_eq!(moved.email, ana.email);
        assert_eq!(store.list_residents().await.unwrap().len(), 2);

        let clash = edit_resident(
            &store,
            ana.id,
            ResidentChanges {
                email: Some(ben.email.clone()),
                ..ResidentChanges::default()
            },
        )
        .await;
        assert!(matches!(clash, Err(AdminError::DuplicateEmail(_))));

        let missing = edit_resident(&store, Uuid::new_v4(), ResidentChanges::default()).await;
        assert!(matches!(
            missing,
            Err(AdminError::Store(StoreError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn deleting_a_resident_removes_their_assignments() {
        let store = MemoryStore::new();
        let (period, _, _) = period_with_criteria(&store).await;
        let ana = add_resident(&store, dormer("Ana")).await.unwrap();
        let ben = add_resident(&store, dormer("Ben")).await.unwrap();
        assign_evaluators(&store, period.id, &[ana.id, ben.id])
            .await
            .unwrap();

        delete_resident(&store, ana.id).await.unwrap();

        let left = store.list_evaluators(period.id).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].dormer_id, ben.id);
        assert!(matches!(
            delete_resident(&store, ana.id).await,
            Err(AdminError::Store(StoreError::NotFound { .. }))
        ));
    }
}
