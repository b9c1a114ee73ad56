use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::admin::ScoreEntry;
use crate::error::StoreError;
use crate::models::{
    Criterion, EvaluationPeriod, EvaluatorAssignment, EvaluatorStatus, ObjectiveScore,
    PeriodCriterion, PeriodResult, PeriodStatus, Resident, ResultPerCriterion, SchoolYear,
    SubjectiveScore,
};
use crate::store::EvaluationStore;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed [`EvaluationStore`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_text<T>(table: &'static str, value: String) -> Result<T, StoreError>
where
    T: FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|reason| StoreError::InvalidRow { table, reason })
}

fn resident_from_row(row: &PgRow) -> Result<Resident, StoreError> {
    Ok(Resident {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        room: row.try_get("room")?,
        course_year: row.try_get("course_year")?,
    })
}

fn period_from_row(row: &PgRow) -> Result<EvaluationPeriod, StoreError> {
    Ok(EvaluationPeriod {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        school_year_id: row.try_get("school_year_id")?,
        school_year: row.try_get("year")?,
        semester: parse_text("evaluation_period", row.try_get("semester")?)?,
        status: parse_text("evaluation_period", row.try_get("status")?)?,
        created_at: row.try_get("created_at")?,
    })
}

fn period_criterion_from_row(row: &PgRow) -> Result<PeriodCriterion, StoreError> {
    PeriodCriterion {
        id: row.try_get("id")?,
        evaluation_period_id: row.try_get("evaluation_period_id")?,
        criterion_id: row.try_get("criteria_id")?,
        weight: row.try_get("weight")?,
        max_score: row.try_get("max_score")?,
    }
    .validate()
}

fn evaluator_from_row(row: &PgRow) -> Result<EvaluatorAssignment, StoreError> {
    Ok(EvaluatorAssignment {
        id: row.try_get("id")?,
        evaluation_period_id: row.try_get("evaluation_period_id")?,
        dormer_id: row.try_get("evaluator_id")?,
        status: parse_text("period_evaluators", row.try_get("evaluator_status")?)?,
    })
}

fn not_found(entity: &'static str, id: Uuid) -> StoreError {
    StoreError::NotFound { entity, id }
}

const PERIOD_SELECT: &str = "SELECT p.id, p.title, p.school_year_id, sy.year, p.semester, \
     p.status, p.created_at \
     FROM dorm_eval.evaluation_period p \
     JOIN dorm_eval.school_year sy ON sy.id = p.school_year_id";

const UPDATE_RESIDENT: &str = r#"
    UPDATE dorm_eval.dormers
    SET first_name = $2,
        last_name = $3,
        email = NULLIF($4, ''),
        room = $5,
        course_year = $6
    WHERE id = $1
"#;

#[async_trait]
impl EvaluationStore for PgStore {
    async fn list_residents(&self) -> Result<Vec<Resident>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, first_name, last_name, COALESCE(email, '') AS email, room, course_year
            FROM dorm_eval.dormers
            ORDER BY last_name, first_name, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(resident_from_row).collect()
    }

    #[instrument(skip(self, residents), fields(count = residents.len()))]
    async fn upsert_residents(&self, residents: &[Resident]) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0usize;

        for resident in residents {
            let updated = sqlx::query(UPDATE_RESIDENT)
                .bind(resident.id)
                .bind(&resident.first_name)
                .bind(&resident.last_name)
                .bind(resident.email.trim())
                .bind(&resident.room)
                .bind(&resident.course_year)
                .execute(&mut *tx)
                .await?;
            if updated.rows_affected() > 0 {
                written += 1;
                continue;
            }

            // NULL emails never conflict, so blank-email rows always insert.
            let result = sqlx::query(
                r#"
                INSERT INTO dorm_eval.dormers
                (id, first_name, last_name, email, room, course_year)
                VALUES ($1, $2, $3, NULLIF($4, ''), $5, $6)
                ON CONFLICT (email) DO UPDATE
                SET first_name = EXCLUDED.first_name,
                    last_name = EXCLUDED.last_name,
                    room = EXCLUDED.room,
                    course_year = EXCLUDED.course_year
                "#,
            )
            .bind(resident.id)
            .bind(&resident.first_name)
            .bind(&resident.last_name)
            .bind(resident.email.trim())
            .bind(&resident.room)
            .bind(&resident.course_year)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(written)
    }

    async fn update_resident(&self, resident: &Resident) -> Result<(), StoreError> {
        let result = sqlx::query(UPDATE_RESIDENT)
            .bind(resident.id)
            .bind(&resident.first_name)
            .bind(&resident.last_name)
            .bind(resident.email.trim())
            .bind(&resident.room)
            .bind(&resident.course_year)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_found("dormer", resident.id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_resident(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM dorm_eval.dormers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_found("dormer", id));
        }
        Ok(())
    }

    async fn find_or_create_school_year(&self, year: &str) -> Result<SchoolYear, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO dorm_eval.school_year (id, year)
            VALUES ($1, $2)
            ON CONFLICT (year) DO UPDATE SET year = EXCLUDED.year
            RETURNING id, year
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(year)
        .fetch_one(&self.pool)
        .await?;

        Ok(SchoolYear {
            id: row.try_get("id")?,
            year: row.try_get("year")?,
        })
    }

    async fn list_periods(&self) -> Result<Vec<EvaluationPeriod>, StoreError> {
        let rows = sqlx::query(&format!("{PERIOD_SELECT} ORDER BY p.created_at DESC"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(period_from_row).collect()
    }

    async fn get_period(&self, id: Uuid) -> Result<EvaluationPeriod, StoreError> {
        let row = sqlx::query(&format!("{PERIOD_SELECT} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("evaluation period", id))?;
        period_from_row(&row)
    }

    async fn insert_period(&self, period: &EvaluationPeriod) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO dorm_eval.evaluation_period
            (id, title, school_year_id, semester, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(period.id)
        .bind(&period.title)
        .bind(period.school_year_id)
        .bind(period.semester.as_str())
        .bind(period.status.as_str())
        .bind(period.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_period_status(&self, id: Uuid, status: PeriodStatus) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE dorm_eval.evaluation_period SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_found("evaluation period", id));
        }
        Ok(())
    }

    async fn delete_period(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM dorm_eval.evaluation_period WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_found("evaluation period", id));
        }
        Ok(())
    }

    async fn list_criteria(&self) -> Result<Vec<Criterion>, StoreError> {
        let rows =
            sqlx::query("SELECT id, name, description, type FROM dorm_eval.criteria ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        let mut criteria = Vec::with_capacity(rows.len());
        for row in rows {
            criteria.push(Criterion {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                description: row.try_get("description")?,
                kind: parse_text("criteria", row.try_get("type")?)?,
            });
        }
        Ok(criteria)
    }

    async fn insert_criterion(&self, criterion: &Criterion) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO dorm_eval.criteria (id, name, description, type) VALUES ($1, $2, $3, $4)",
        )
        .bind(criterion.id)
        .bind(&criterion.name)
        .bind(&criterion.description)
        .bind(criterion.kind.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_period_criteria(
        &self,
        period_id: Uuid,
    ) -> Result<Vec<PeriodCriterion>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, evaluation_period_id, criteria_id, weight, max_score
            FROM dorm_eval.period_criteria
            WHERE evaluation_period_id = $1
            ORDER BY seq
            "#,
        )
        .bind(period_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(period_criterion_from_row).collect()
    }

    async fn get_period_criterion(&self, id: Uuid) -> Result<PeriodCriterion, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, evaluation_period_id, criteria_id, weight, max_score
            FROM dorm_eval.period_criteria
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found("period criterion", id))?;
        period_criterion_from_row(&row)
    }

    async fn insert_period_criterion(&self, row: &PeriodCriterion) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO dorm_eval.period_criteria
            (id, evaluation_period_id, criteria_id, weight, max_score)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(row.id)
        .bind(row.evaluation_period_id)
        .bind(row.criterion_id)
        .bind(row.weight)
        .bind(row.max_score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_period_criterion(
        &self,
        id: Uuid,
        weight: f64,
        max_score: i32,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE dorm_eval.period_criteria SET weight = $2, max_score = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(weight)
        .bind(max_score)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(not_found("period criterion", id));
        }
        Ok(())
    }

    async fn delete_period_criterion(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM dorm_eval.period_criteria WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_evaluators(
        &self,
        period_id: Uuid,
    ) -> Result<Vec<EvaluatorAssignment>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, evaluation_period_id, evaluator_id, evaluator_status
            FROM dorm_eval.period_evaluators
            WHERE evaluation_period_id = $1
            ORDER BY seq
            "#,
        )
        .bind(period_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(evaluator_from_row).collect()
    }

    async fn get_evaluator(&self, id: Uuid) -> Result<EvaluatorAssignment, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, evaluation_period_id, evaluator_id, evaluator_status
            FROM dorm_eval.period_evaluators
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found("evaluator", id))?;
        evaluator_from_row(&row)
    }

    async fn insert_evaluators(&self, rows: &[EvaluatorAssignment]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO dorm_eval.period_evaluators
                (id, evaluation_period_id, evaluator_id, evaluator_status)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(row.id)
            .bind(row.evaluation_period_id)
            .bind(row.dormer_id)
            .bind(row.status.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_evaluators(&self, period_id: Uuid, ids: &[Uuid]) -> Result<usize, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM dorm_eval.period_evaluators
            WHERE evaluation_period_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(period_id)
        .bind(ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn set_evaluator_status(
        &self,
        id: Uuid,
        status: EvaluatorStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE dorm_eval.period_evaluators SET evaluator_status = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(not_found("evaluator", id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn objective_scores_page(
        &self,
        period_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ObjectiveScore>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT period_criteria_id, target_dormer_id, score, evaluation_period_id
            FROM dorm_eval.objective_scores
            WHERE evaluation_period_id = $1
            ORDER BY seq
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(period_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut scores = Vec::with_capacity(rows.len());
        for row in rows {
            scores.push(ObjectiveScore {
                period_criteria_id: row.try_get("period_criteria_id")?,
                target_dormer_id: row.try_get("target_dormer_id")?,
                score: row.try_get("score")?,
                evaluation_period_id: row.try_get("evaluation_period_id")?,
            });
        }
        debug!(rows = scores.len(), "objective page read");
        Ok(scores)
    }

    #[instrument(skip(self))]
    async fn subjective_scores_page(
        &self,
        period_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<SubjectiveScore>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT period_criteria_id, period_evaluator_id, target_dormer_id, score,
                   evaluation_period_id
            FROM dorm_eval.subjective_scores
            WHERE evaluation_period_id = $1
            ORDER BY seq
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(period_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut scores = Vec::with_capacity(rows.len());
        for row in rows {
            scores.push(SubjectiveScore {
                period_criteria_id: row.try_get("period_criteria_id")?,
                period_evaluator_id: row.try_get("period_evaluator_id")?,
                target_dormer_id: row.try_get("target_dormer_id")?,
                score: row.try_get("score")?,
                evaluation_period_id: row.try_get("evaluation_period_id")?,
            });
        }
        debug!(rows = scores.len(), "subjective page read");
        Ok(scores)
    }

    #[instrument(skip(self, rows), fields(count = rows.len()))]
    async fn upsert_objective_scores(&self, rows: &[ObjectiveScore]) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO dorm_eval.objective_scores
                (period_criteria_id, target_dormer_id, evaluation_period_id, score)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (period_criteria_id, target_dormer_id) DO UPDATE
                SET score = EXCLUDED.score
                "#,
            )
            .bind(row.period_criteria_id)
            .bind(row.target_dormer_id)
            .bind(row.evaluation_period_id)
            .bind(row.score)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(rows.len())
    }

    #[instrument(skip(self, rows), fields(count = rows.len()))]
    async fn upsert_subjective_scores(
        &self,
        rows: &[SubjectiveScore],
    ) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO dorm_eval.subjective_scores
                (period_criteria_id, period_evaluator_id, target_dormer_id,
                 evaluation_period_id, score)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (period_criteria_id, period_evaluator_id, target_dormer_id) DO UPDATE
                SET score = EXCLUDED.score
                "#,
            )
            .bind(row.period_criteria_id)
            .bind(row.period_evaluator_id)
            .bind(row.target_dormer_id)
            .bind(row.evaluation_period_id)
            .bind(row.score)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(rows.len())
    }

    #[instrument(skip(self))]
    async fn delete_results(&self, period_id: Uuid) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM dorm_eval.results_per_criteria WHERE evaluation_period_id = $1")
            .bind(period_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM dorm_eval.results WHERE evaluation_period_id = $1")
            .bind(period_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, rows), fields(count = rows.len()))]
    async fn insert_results_per_criterion(
        &self,
        rows: &[ResultPerCriterion],
    ) -> Result<Vec<ResultPerCriterion>, StoreError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let criteria: Vec<Uuid> = rows.iter().map(|r| r.period_criteria_id).collect();
        let dormers: Vec<Uuid> = rows.iter().map(|r| r.target_dormer_id).collect();
        let periods: Vec<Uuid> = rows.iter().map(|r| r.evaluation_period_id).collect();
        let scores: Vec<f64> = rows.iter().map(|r| r.total_score).collect();

        sqlx::query(
            r#"
            INSERT INTO dorm_eval.results_per_criteria
            (period_criteria_id, target_dormer_id, evaluation_period_id, total_score)
            SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::uuid[], $4::float8[])
            "#,
        )
        .bind(&criteria)
        .bind(&dormers)
        .bind(&periods)
        .bind(&scores)
        .execute(&self.pool)
        .await?;
        Ok(rows.to_vec())
    }

    #[instrument(skip(self, rows), fields(count = rows.len()))]
    async fn insert_results(&self, rows: &[PeriodResult]) -> Result<Vec<PeriodResult>, StoreError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let dormers: Vec<Uuid> = rows.iter().map(|r| r.target_dormer_id).collect();
        let periods: Vec<Uuid> = rows.iter().map(|r| r.evaluation_period_id).collect();
        let totals: Vec<f64> = rows.iter().map(|r| r.total_weighted_score).collect();

        sqlx::query(
            r#"
            INSERT INTO dorm_eval.results
            (target_dormer_id, evaluation_period_id, total_weighted_score)
            SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::float8[])
            "#,
        )
        .bind(&dormers)
        .bind(&periods)
        .bind(&totals)
        .execute(&self.pool)
        .await?;
        Ok(rows.to_vec())
    }

    async fn list_results(&self, period_id: Uuid) -> Result<Vec<PeriodResult>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT target_dormer_id, total_weighted_score, evaluation_period_id
            FROM dorm_eval.results
            WHERE evaluation_period_id = $1
            ORDER BY seq
            "#,
        )
        .bind(period_id)
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            results.push(PeriodResult {
                target_dormer_id: row.try_get("target_dormer_id")?,
                total_weighted_score: row.try_get("total_weighted_score")?,
                evaluation_period_id: row.try_get("evaluation_period_id")?,
            });
        }
        Ok(results)
    }

    async fn list_results_per_criterion(
        &self,
        period_id: Uuid,
    ) -> Result<Vec<ResultPerCriterion>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT period_criteria_id, target_dormer_id, total_score, evaluation_period_id
            FROM dorm_eval.results_per_criteria
            WHERE evaluation_period_id = $1
            ORDER BY seq
            "#,
        )
        .bind(period_id)
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            results.push(ResultPerCriterion {
                period_criteria_id: row.try_get("period_criteria_id")?,
                target_dormer_id: row.try_get("target_dormer_id")?,
                total_score: row.try_get("total_score")?,
                evaluation_period_id: row.try_get("evaluation_period_id")?,
            });
        }
        Ok(results)
    }
}

/// Loads a small evaluation: four dormers, one active period, two criteria,
/// staff and peer scores. Safe to run repeatedly.
pub async fn seed(pool: &PgPool) -> anyhow::Result<Uuid> {
    let dormers = vec![
        (
            Uuid::parse_str("5e2a9c14-7b3d-4f08-a6c1-92d4e0b7f351")?,
            "Avery",
            "Lee",
            "avery.lee@dorm.example.edu",
            "201",
            "BSCS 2",
        ),
        (
            Uuid::parse_str("a41f6d08-3c5e-4b97-8d2a-6e0f1c9b4a73")?,
            "Jules",
            "Moreno",
            "jules.moreno@dorm.example.edu",
            "201",
            "BSN 3",
        ),
        (
            Uuid::parse_str("7c9e0b26-d418-4a5f-b3e7-1f8a2c6d09e5")?,
            "Kiara",
            "Patel",
            "kiara.patel@dorm.example.edu",
            "305",
            "BSA 1",
        ),
        (
            Uuid::parse_str("8f1c2e9a-6b3d-4c71-9a0e-2d5f7b8c1e34")?,
            "Noel",
            "Garcia",
            "noel.garcia@dorm.example.edu",
            "305",
            "BSED 4",
        ),
    ];

    for (id, first_name, last_name, email, room, course_year) in &dormers {
        sqlx::query(
            r#"
            INSERT INTO dorm_eval.dormers (id, first_name, last_name, email, room, course_year)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (email) DO UPDATE
            SET first_name = EXCLUDED.first_name, last_name = EXCLUDED.last_name,
                room = EXCLUDED.room, course_year = EXCLUDED.course_year
            "#,
        )
        .bind(id)
        .bind(first_name)
        .bind(last_name)
        .bind(email)
        .bind(room)
        .bind(course_year)
        .execute(pool)
        .await?;
    }

    let school_year_id = Uuid::parse_str("6a0b8d52-1f3e-4c7a-b9d4-0e2f6a8c4b17")?;
    let period_id = Uuid::parse_str("b7e3c1d9-4a2f-4e6b-8c5d-1f9a0e3b7d62")?;
    let cleanliness = Uuid::parse_str("c1a2b3c4-d5e6-4f70-8192-a3b4c5d6e7f8")?;
    let conduct = Uuid::parse_str("d2b3c4d5-e6f7-4081-92a3-b4c5d6e7f809")?;
    let cleanliness_pc = Uuid::parse_str("e3c4d5e6-f708-4192-a3b4-c5d6e7f8091a")?;
    let conduct_pc = Uuid::parse_str("f4d5e6f7-0819-42a3-b4c5-d6e7f8091a2b")?;

    sqlx::query(
        r#"
        INSERT INTO dorm_eval.school_year (id, year)
        VALUES ($1, '2025-2026')
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(school_year_id)
    .execute(pool)
    .await?;
    let school_year_id: Uuid =
        sqlx::query("SELECT id FROM dorm_eval.school_year WHERE year = '2025-2026'")
            .fetch_one(pool)
            .await?
            .get("id");

    sqlx::query(
        r#"
        INSERT INTO dorm_eval.evaluation_period (id, title, school_year_id, semester, status)
        VALUES ($1, 'First Semester Evaluation', $2, '1', 'active')
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(period_id)
    .bind(school_year_id)
    .execute(pool)
    .await?;
    let period_id: Uuid = sqlx::query(
        "SELECT id FROM dorm_eval.evaluation_period WHERE school_year_id = $1 AND semester = '1'",
    )
    .bind(school_year_id)
    .fetch_one(pool)
    .await?
    .get("id");

    let criteria = vec![
        (cleanliness, "Room Cleanliness", "Weekly room inspection", "objective"),
        (conduct, "Conduct", "Respect for dorm mates and house rules", "subjective"),
    ];
    for (id, name, description, kind) in criteria {
        sqlx::query(
            r#"
            INSERT INTO dorm_eval.criteria (id, name, description, type)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(kind)
        .execute(pool)
        .await?;
    }

    for (id, criterion_id, weight, max_score) in [
        (cleanliness_pc, cleanliness, 60.0_f64, 10_i32),
        (conduct_pc, conduct, 40.0_f64, 5_i32),
    ] {
        sqlx::query(
            r#"
            INSERT INTO dorm_eval.period_criteria
            (id, evaluation_period_id, criteria_id, weight, max_score)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(period_id)
        .bind(criterion_id)
        .bind(weight)
        .bind(max_score)
        .execute(pool)
        .await?;
    }

    let evaluators = [
        (
            Uuid::parse_str("0a1b2c3d-4e5f-4061-8293-a4b5c6d7e8f9")?,
            dormers[0].0,
        ),
        (
            Uuid::parse_str("1b2c3d4e-5f60-4172-93a4-b5c6d7e8f90a")?,
            dormers[2].0,
        ),
    ];
    for (id, dormer_id) in evaluators {
        sqlx::query(
            r#"
            INSERT INTO dorm_eval.period_evaluators (id, evaluation_period_id, evaluator_id)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(id)
        .bind(period_id)
        .bind(dormer_id)
        .execute(pool)
        .await?;
    }

    for ((dormer_id, ..), score) in dormers.iter().zip([9.0_f64, 7.0, 8.5, 6.0]) {
        sqlx::query(
            r#"
            INSERT INTO dorm_eval.objective_scores
            (period_criteria_id, target_dormer_id, evaluation_period_id, score)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (period_criteria_id, target_dormer_id) DO NOTHING
            "#,
        )
        .bind(cleanliness_pc)
        .bind(dormer_id)
        .bind(period_id)
        .bind(score)
        .execute(pool)
        .await?;
    }

    let peer_scores = [
        (evaluators[0].0, dormers[1].0, 4.0_f64),
        (evaluators[0].0, dormers[2].0, 5.0),
        (evaluators[0].0, dormers[3].0, 3.0),
        (evaluators[1].0, dormers[0].0, 4.0),
        (evaluators[1].0, dormers[1].0, 3.0),
        (evaluators[1].0, dormers[3].0, 2.0),
    ];
    for (evaluator_id, dormer_id, score) in peer_scores {
        sqlx::query(
            r#"
            INSERT INTO dorm_eval.subjective_scores
            (period_criteria_id, period_evaluator_id, target_dormer_id, evaluation_period_id, score)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (period_criteria_id, period_evaluator_id, target_dormer_id) DO NOTHING
            "#,
        )
        .bind(conduct_pc)
        .bind(evaluator_id)
        .bind(dormer_id)
        .bind(period_id)
        .bind(score)
        .execute(pool)
        .await?;
    }

    Ok(period_id)
}

#[derive(serde::Deserialize)]
struct ResidentCsvRow {
    #[serde(default)]
    id: Option<Uuid>,
    first_name: String,
    last_name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    room: String,
    #[serde(default)]
    course_year: String,
}

/// Reads `first_name,last_name,email,room,course_year` rows. An optional `id`
/// column lets a re-import update residents that have no email.
pub fn parse_residents<R: std::io::Read>(input: R) -> anyhow::Result<Vec<Resident>> {
    let mut reader = csv::Reader::from_reader(input);
    let mut residents = Vec::new();

    for (index, result) in reader.deserialize::<ResidentCsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid resident row {}", index + 1))?;
        residents.push(Resident {
            id: row.id.unwrap_or_else(Uuid::new_v4),
            first_name: row.first_name.trim().to_string(),
            last_name: row.last_name.trim().to_string(),
            email: row.email.trim().to_lowercase(),
            room: row.room.trim().to_string(),
            course_year: row.course_year.trim().to_string(),
        });
    }

    Ok(residents)
}

pub fn read_residents_csv(path: &Path) -> anyhow::Result<Vec<Resident>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    parse_residents(file)
}

/// Reads `period_criteria_id,target_dormer_id,score` rows.
pub fn parse_scores<R: std::io::Read>(input: R) -> anyhow::Result<Vec<ScoreEntry>> {
    let mut reader = csv::Reader::from_reader(input);
    let mut entries = Vec::new();

    for (index, result) in reader.deserialize::<ScoreEntry>().enumerate() {
        entries.push(result.with_context(|| format!("invalid score row {}", index + 1))?);
    }

    Ok(entries)
}

pub fn read_scores_csv(path: &Path) -> anyhow::Result<Vec<ScoreEntry>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    parse_scores(file)
}
