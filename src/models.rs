use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resident {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub room: String,
    pub course_year: String,
}

impl Resident {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn has_email(&self) -> bool {
        !self.email.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Semester {
    First,
    Second,
}

impl Semester {
    pub fn as_str(&self) -> &'static str {
        match self {
            Semester::First => "1",
            Semester::Second => "2",
        }
    }

    /// Label used in correspondence, e.g. "1st".
    pub fn ordinal(&self) -> &'static str {
        match self {
            Semester::First => "1st",
            Semester::Second => "2nd",
        }
    }
}

impl FromStr for Semester {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "1" | "1st" | "first" => Ok(Semester::First),
            "2" | "2nd" | "second" => Ok(Semester::Second),
            other => Err(format!("unknown semester '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodStatus {
    Pending,
    Active,
    Closed,
}

impl PeriodStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodStatus::Pending => "pending",
            PeriodStatus::Active => "active",
            PeriodStatus::Closed => "closed",
        }
    }
}

impl FromStr for PeriodStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(PeriodStatus::Pending),
            "active" => Ok(PeriodStatus::Active),
            "closed" => Ok(PeriodStatus::Closed),
            other => Err(format!("unknown period status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchoolYear {
    pub id: Uuid,
    pub year: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationPeriod {
    pub id: Uuid,
    pub title: String,
    pub school_year_id: Uuid,
    /// Display label of the linked school year, e.g. "2025-2026".
    pub school_year: String,
    pub semester: Semester,
    pub status: PeriodStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CriterionKind {
    Objective,
    Subjective,
}

impl CriterionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CriterionKind::Objective => "objective",
            CriterionKind::Subjective => "subjective",
        }
    }
}

impl fmt::Display for CriterionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CriterionKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "objective" => Ok(CriterionKind::Objective),
            "subjective" => Ok(CriterionKind::Subjective),
            other => Err(format!("unknown criterion type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub kind: CriterionKind,
}

/// A criterion bound to a period with a percentage weight and a max raw score.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodCriterion {
    pub id: Uuid,
    pub evaluation_period_id: Uuid,
    pub criterion_id: Uuid,
    pub weight: f64,
    pub max_score: i32,
}

impl PeriodCriterion {
    /// Checks the shape guarantees the aggregator relies on.
    pub fn validate(self) -> Result<Self, StoreError> {
        if !self.weight.is_finite() || !(0.0..=100.0).contains(&self.weight) {
            return Err(StoreError::InvalidRow {
                table: "period_criteria",
                reason: format!("weight {} outside 0..=100 for {}", self.weight, self.id),
            });
        }
        if self.max_score < 1 {
            return Err(StoreError::InvalidRow {
                table: "period_criteria",
                reason: format!("max_score {} below 1 for {}", self.max_score, self.id),
            });
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluatorStatus {
    Pending,
    Completed,
}

impl EvaluatorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluatorStatus::Pending => "pending",
            EvaluatorStatus::Completed => "completed",
        }
    }
}

impl FromStr for EvaluatorStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(EvaluatorStatus::Pending),
            "completed" => Ok(EvaluatorStatus::Completed),
            other => Err(format!("unknown evaluator status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorAssignment {
    pub id: Uuid,
    pub evaluation_period_id: Uuid,
    pub dormer_id: Uuid,
    pub status: EvaluatorStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveScore {
    pub period_criteria_id: Uuid,
    pub target_dormer_id: Uuid,
    pub score: f64,
    pub evaluation_period_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectiveScore {
    pub period_criteria_id: Uuid,
    pub period_evaluator_id: Uuid,
    pub target_dormer_id: Uuid,
    pub score: f64,
    pub evaluation_period_id: Uuid,
}

/// Derived weighted sub-score for one (period-criterion, resident) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPerCriterion {
    pub period_criteria_id: Uuid,
    pub target_dormer_id: Uuid,
    pub total_score: f64,
    pub evaluation_period_id: Uuid,
}

/// Derived total for one resident in one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodResult {
    pub target_dormer_id: Uuid,
    pub total_weighted_score: f64,
    pub evaluation_period_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period_criterion(weight: f64, max_score: i32) -> PeriodCriterion {
        PeriodCriterion {
            id: Uuid::new_v4(),
            evaluation_period_id: Uuid::new_v4(),
            criterion_id: Uuid::new_v4(),
            weight,
            max_score,
        }
    }

    #[test]
    fn semester_parses_and_formats() {
        assert_eq!("1".parse::<Semester>(), Ok(Semester::First));
        assert_eq!("2nd".parse::<Semester>(), Ok(Semester::Second));
        assert!("3".parse::<Semester>().is_err());
        assert_eq!(Semester::Second.ordinal(), "2nd");
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [PeriodStatus::Pending, PeriodStatus::Active, PeriodStatus::Closed] {
            assert_eq!(status.as_str().parse::<PeriodStatus>(), Ok(status));
        }
        assert_eq!(
            "Completed".parse::<EvaluatorStatus>(),
            Ok(EvaluatorStatus::Completed)
        );
    }

    #[test]
    fn validate_rejects_zero_max_score() {
        assert!(period_criterion(20.0, 0).validate().is_err());
        assert!(period_criterion(120.0, 10).validate().is_err());
        assert!(period_criterion(f64::NAN, 10).validate().is_err());
        assert!(period_criterion(12.5, 1).validate().is_ok());
    }

    #[test]
    fn full_name_joins_first_and_last() {
        let resident = Resident {
            id: Uuid::new_v4(),
            first_name: "Avery".to_string(),
            last_name: "Lee".to_string(),
            email: String::new(),
            room: "204".to_string(),
            course_year: "BSCS 2".to_string(),
        };
        assert_eq!(resident.full_name(), "Avery Lee");
        assert!(!resident.has_email());
    }
}
