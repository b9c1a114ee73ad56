use std::collections::HashMap;
use std::fmt::Write;

use uuid::Uuid;

use crate::admin::remaining_weight;
use crate::aggregate::{fetch_objective_scores, fetch_subjective_scores};
use crate::email::{format_weight, CriterionLine};
use crate::error::StoreError;
use crate::models::{
    Criterion, CriterionKind, EvaluationPeriod, EvaluatorAssignment, EvaluatorStatus,
    PeriodCriterion, Resident, ResultPerCriterion,
};
use crate::ranking::{rank_label, Standing};
use crate::store::EvaluationStore;

/// A period criterion joined with its reusable criterion.
#[derive(Debug, Clone, PartialEq)]
pub struct CriterionInfo {
    pub period_criterion: PeriodCriterion,
    pub name: String,
    pub description: String,
    pub kind: Option<CriterionKind>,
}

pub fn join_criteria(
    period_criteria: &[PeriodCriterion],
    criteria: &[Criterion],
) -> Vec<CriterionInfo> {
    let by_id: HashMap<Uuid, &Criterion> = criteria.iter().map(|c| (c.id, c)).collect();
    period_criteria
        .iter()
        .map(|pc| {
            let criterion = by_id.get(&pc.criterion_id);
            CriterionInfo {
                period_criterion: pc.clone(),
                name: criterion
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| "Unknown Criteria".to_string()),
                description: criterion.map(|c| c.description.clone()).unwrap_or_default(),
                kind: criterion.map(|c| c.kind),
            }
        })
        .collect()
}

/// Email breakdown lines grouped by dormer, in stored row order.
pub fn group_lines(
    infos: &[CriterionInfo],
    rows: &[ResultPerCriterion],
) -> HashMap<Uuid, Vec<CriterionLine>> {
    let by_pc: HashMap<Uuid, &CriterionInfo> =
        infos.iter().map(|info| (info.period_criterion.id, info)).collect();
    let mut grouped: HashMap<Uuid, Vec<CriterionLine>> = HashMap::new();

    for row in rows {
        let info = by_pc.get(&row.period_criteria_id);
        grouped
            .entry(row.target_dormer_id)
            .or_default()
            .push(CriterionLine {
                name: info
                    .map(|i| i.name.clone())
                    .unwrap_or_else(|| "Unknown Criteria".to_string()),
                description: info.map(|i| i.description.clone()).unwrap_or_default(),
                weight: info.map(|i| i.period_criterion.weight).unwrap_or(0.0),
                score: row.total_score,
            });
    }

    grouped
}

pub async fn criterion_lines_by_dormer<S: EvaluationStore + ?Sized>(
    store: &S,
    period_id: Uuid,
) -> Result<HashMap<Uuid, Vec<CriterionLine>>, StoreError> {
    let infos = join_criteria(
        &store.list_period_criteria(period_id).await?,
        &store.list_criteria().await?,
    );
    let rows = store.list_results_per_criterion(period_id).await?;
    Ok(group_lines(&infos, &rows))
}

#[derive(Debug, Clone, PartialEq)]
pub struct CriterionBreakdown {
    pub info: CriterionInfo,
    /// Stored weighted sub-score, if a recompute has produced one.
    pub weighted_score: Option<f64>,
    pub objective_scores: Vec<f64>,
    /// (evaluator's dormer id, score); the dormer id is unknown for removed evaluators.
    pub subjective_scores: Vec<(Option<Uuid>, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResidentBreakdown {
    pub resident: Resident,
    pub total: Option<f64>,
    pub criteria: Vec<CriterionBreakdown>,
}

/// Stored sub-scores plus the raw staff and peer scores behind them.
pub async fn resident_breakdown<S: EvaluationStore + ?Sized>(
    store: &S,
    period_id: Uuid,
    dormer_id: Uuid,
    page_size: i64,
) -> Result<ResidentBreakdown, StoreError> {
    let resident = store
        .list_residents()
        .await?
        .into_iter()
        .find(|r| r.id == dormer_id)
        .ok_or(StoreError::NotFound {
            entity: "dormer",
            id: dormer_id,
        })?;

    let infos = join_criteria(
        &store.list_period_criteria(period_id).await?,
        &store.list_criteria().await?,
    );
    let weighted: HashMap<Uuid, f64> = store
        .list_results_per_criterion(period_id)
        .await?
        .into_iter()
        .filter(|row| row.target_dormer_id == dormer_id)
        .map(|row| (row.period_criteria_id, row.total_score))
        .collect();
    let total = store
        .list_results(period_id)
        .await?
        .into_iter()
        .find(|row| row.target_dormer_id == dormer_id)
        .map(|row| row.total_weighted_score);
    let evaluator_dormers: HashMap<Uuid, Uuid> = store
        .list_evaluators(period_id)
        .await?
        .into_iter()
        .map(|ev| (ev.id, ev.dormer_id))
        .collect();

    let objective: Vec<_> = fetch_objective_scores(store, period_id, page_size)
        .await?
        .into_iter()
        .filter(|row| row.target_dormer_id == dormer_id)
        .collect();
    let subjective: Vec<_> = fetch_subjective_scores(store, period_id, page_size)
        .await?
        .into_iter()
        .filter(|row| row.target_dormer_id == dormer_id)
        .collect();

    let criteria = infos
        .into_iter()
        .map(|info| {
            let pc_id = info.period_criterion.id;
            CriterionBreakdown {
                weighted_score: weighted.get(&pc_id).copied(),
                objective_scores: objective
                    .iter()
                    .filter(|row| row.period_criteria_id == pc_id)
                    .map(|row| row.score)
                    .collect(),
                subjective_scores: subjective
                    .iter()
                    .filter(|row| row.period_criteria_id == pc_id)
                    .map(|row| {
                        let evaluator = evaluator_dormers.get(&row.period_evaluator_id).copied();
                        (evaluator, row.score)
                    })
                    .collect(),
                info,
            }
        })
        .collect();

    Ok(ResidentBreakdown {
        resident,
        total,
        criteria,
    })
}

pub fn render_breakdown(breakdown: &ResidentBreakdown, residents: &[Resident]) -> String {
    let names: HashMap<Uuid, String> = residents.iter().map(|r| (r.id, r.full_name())).collect();
    let mut output = String::new();

    let _ = writeln!(
        output,
        "{} (room {}, {})",
        breakdown.resident.full_name(),
        breakdown.resident.room,
        breakdown.resident.course_year
    );
    match breakdown.total {
        Some(total) => {
            let _ = writeln!(output, "Total weighted score: {total:.2}");
        }
        None => {
            let _ = writeln!(output, "Unranked (no positive total)");
        }
    }

    for item in &breakdown.criteria {
        let kind = item.info.kind.map(|k| k.as_str()).unwrap_or("unknown");
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "{} [{}] weight {}% max {}",
            item.info.name,
            kind,
            format_weight(item.info.period_criterion.weight),
            item.info.period_criterion.max_score
        );
        match item.weighted_score {
            Some(score) => {
                let _ = writeln!(output, "  weighted: {score:.2}");
            }
            None => {
                let _ = writeln!(output, "  weighted: not calculated");
            }
        }
        for score in &item.objective_scores {
            let _ = writeln!(output, "  objective: {score}");
        }
        for (evaluator, score) in &item.subjective_scores {
            let who = evaluator
                .and_then(|id| names.get(&id).cloned())
                .unwrap_or_else(|| "unknown evaluator".to_string());
            let _ = writeln!(output, "  peer ({who}): {score}");
        }
    }

    output
}

pub fn build_report(
    period: &EvaluationPeriod,
    infos: &[CriterionInfo],
    standings: &[Standing],
    residents: &[Resident],
    evaluators: &[EvaluatorAssignment],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Dormitory Evaluation Report");
    let _ = writeln!(
        output,
        "Generated for {} (S.Y. {} {} Semester, {})",
        period.title,
        period.school_year,
        period.semester.ordinal(),
        period.status.as_str()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Criteria");

    if infos.is_empty() {
        let _ = writeln!(output, "No criteria configured for this period.");
    } else {
        for info in infos {
            let kind = info.kind.map(|k| k.as_str()).unwrap_or("unknown");
            let _ = writeln!(
                output,
                "- {} ({}): {}% of {} points",
                info.name,
                kind,
                format_weight(info.period_criterion.weight),
                info.period_criterion.max_score
            );
        }
        let rows: Vec<PeriodCriterion> = infos.iter().map(|i| i.period_criterion.clone()).collect();
        let remaining = remaining_weight(&rows);
        if remaining > 0.0 {
            let _ = writeln!(output, "- Unassigned weight: {}%", format_weight(remaining));
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Rankings");

    if standings.is_empty() {
        let _ = writeln!(output, "No dormers have a positive total for this period.");
    } else {
        for standing in standings {
            let name = standing
                .resident
                .as_ref()
                .map(|r| format!("{} (room {})", r.full_name(), r.room))
                .unwrap_or_else(|| standing.result.target_dormer_id.to_string());
            let flag = if standing.evicted { " - not retained" } else { "" };
            let _ = writeln!(
                output,
                "- {} {} score {:.2}{}",
                rank_label(standing.rank),
                name,
                standing.result.total_weighted_score,
                flag
            );
        }
    }

    let unranked = residents.len().saturating_sub(standings.len());
    let _ = writeln!(output);
    let _ = writeln!(output, "## Coverage");
    let _ = writeln!(output, "- Ranked dormers: {}", standings.len());
    let _ = writeln!(output, "- Unranked dormers: {unranked}");

    let completed = evaluators
        .iter()
        .filter(|ev| ev.status == EvaluatorStatus::Completed)
        .count();
    let _ = writeln!(
        output,
        "- Evaluators completed: {} of {}",
        completed,
        evaluators.len()
    );

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PeriodResult, PeriodStatus, Semester};
    use chrono::Utc;

    fn criterion(name: &str, kind: CriterionKind) -> Criterion {
        Criterion {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: format!("{name} description"),
            kind,
        }
    }

    fn bind(period: Uuid, criterion: &Criterion, weight: f64, max_score: i32) -> PeriodCriterion {
        PeriodCriterion {
            id: Uuid::new_v4(),
            evaluation_period_id: period,
            criterion_id: criterion.id,
            weight,
            max_score,
        }
    }

    #[test]
    fn lines_group_by_dormer_and_carry_weights() {
        let period = Uuid::new_v4();
        let chores = criterion("Chores", CriterionKind::Objective);
        let pc = bind(period, &chores, 25.0, 10);
        let orphan = Uuid::new_v4();
        let dormer = Uuid::new_v4();
        let rows = vec![
            ResultPerCriterion {
                period_criteria_id: pc.id,
                target_dormer_id: dormer,
                total_score: 20.0,
                evaluation_period_id: period,
            },
            ResultPerCriterion {
                period_criteria_id: orphan,
                target_dormer_id: dormer,
                total_score: 0.0,
                evaluation_period_id: period,
            },
        ];

        let infos = join_criteria(&[pc], &[chores]);
        let grouped = group_lines(&infos, &rows);

        let lines = &grouped[&dormer];
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].name, "Chores");
        assert_eq!(lines[0].weight, 25.0);
        assert_eq!(lines[1].name, "Unknown Criteria");
    }

    #[test]
    fn report_lists_criteria_rankings_and_coverage() {
        let period_id = Uuid::new_v4();
        let period = EvaluationPeriod {
            id: period_id,
            title: "Second Sem Review".to_string(),
            school_year_id: Uuid::new_v4(),
            school_year: "2025-2026".to_string(),
            semester: Semester::Second,
            status: PeriodStatus::Closed,
            created_at: Utc::now(),
        };
        let chores = criterion("Chores", CriterionKind::Objective);
        let infos = join_criteria(&[bind(period_id, &chores, 70.0, 10)], &[chores]);
        let resident = Resident {
            id: Uuid::new_v4(),
            first_name: "Kiara".to_string(),
            last_name: "Patel".to_string(),
            email: "kiara@example.com".to_string(),
            room: "2B".to_string(),
            course_year: "BSN 1".to_string(),
        };
        let idle = Resident {
            id: Uuid::new_v4(),
            first_name: "Idle".to_string(),
            ..resident.clone()
        };
        let standings = vec![Standing {
            rank: 1,
            result: PeriodResult {
                target_dormer_id: resident.id,
                total_weighted_score: 63.0,
                evaluation_period_id: period_id,
            },
            resident: Some(resident.clone()),
            evicted: true,
        }];

        let report = build_report(&period, &infos, &standings, &[resident, idle], &[]);

        assert!(report.contains("S.Y. 2025-2026 2nd Semester, closed"));
        assert!(report.contains("- Chores (objective): 70% of 10 points"));
        assert!(report.contains("- Unassigned weight: 30%"));
        assert!(report.contains("- Top Dormer Kiara Patel (room 2B) score 63.00 - not retained"));
        assert!(report.contains("- Unranked dormers: 1"));
        assert!(report.contains("- Evaluators completed: 0 of 0"));
    }

    #[tokio::test]
    async fn breakdown_shows_raw_scores_with_evaluators() {
        use crate::admin::{self, ScoreEntry};
        use crate::aggregate::refresh_period;
        use crate::store::MemoryStore;

        let store = MemoryStore::new();
        let rater = Resident {
            id: Uuid::new_v4(),
            first_name: "Mara".to_string(),
            last_name: "Santos".to_string(),
            email: "mara@example.com".to_string(),
            room: "3A".to_string(),
            course_year: "BSA 2".to_string(),
        };
        let target = Resident {
            id: Uuid::new_v4(),
            first_name: "Nico".to_string(),
            email: "nico@example.com".to_string(),
            ..rater.clone()
        };
        store
            .upsert_residents(&[rater.clone(), target.clone()])
            .await
            .unwrap();
        let period = admin::create_period(&store, "Review", "2025-2026", Semester::First)
            .await
            .unwrap();
        let conduct =
            admin::add_criterion(&store, "Conduct", "Peer rating", CriterionKind::Subjective)
                .await
                .unwrap();
        let pc = admin::attach_criterion(&store, period.id, conduct.id, 50.0, 10)
            .await
            .unwrap();
        let evaluator = admin::assign_evaluators(&store, period.id, &[rater.id])
            .await
            .unwrap()
            .remove(0);
        admin::record_subjective_scores(
            &store,
            evaluator.id,
            &[ScoreEntry {
                period_criteria_id: pc.id,
                target_dormer_id: target.id,
                score: 8.0,
            }],
        )
        .await
        .unwrap();
        refresh_period(&store, period.id, 1000).await;

        let breakdown = resident_breakdown(&store, period.id, target.id, 1000)
            .await
            .unwrap();

        assert_eq!(breakdown.total, Some(40.0));
        assert_eq!(breakdown.criteria.len(), 1);
        assert_eq!(breakdown.criteria[0].weighted_score, Some(40.0));
        assert_eq!(breakdown.criteria[0].subjective_scores, vec![(Some(rater.id), 8.0)]);

        let rendered = render_breakdown(&breakdown, &[rater, target]);
        assert!(rendered.contains("Conduct [subjective] weight 50% max 10"));
        assert!(rendered.contains("peer (Mara Santos): 8"));

        let missing = resident_breakdown(&store, period.id, Uuid::new_v4(), 1000).await;
        assert!(matches!(missing, Err(StoreError::NotFound { entity: "dormer", .. })));
    }
}
