//! Error types shared across the store, aggregation and mail layers.

use thiserror::Error;
use uuid::Uuid;

/// Failures reading from or writing to the evaluation store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// A row failed validation at the read boundary.
    #[error("invalid row in {table}: {reason}")]
    InvalidRow { table: &'static str, reason: String },

    /// Failure raised on purpose by the in-memory store.
    #[error("injected failure: {0}")]
    Injected(String),
}

/// Rejections raised by administrative operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("{0} must not be blank")]
    Blank(&'static str),

    #[error("cannot create more than 2 evaluations for school year {0}")]
    TooManyPeriods(String),

    #[error("an evaluation for semester {semester} already exists for school year {year}")]
    DuplicateSemester { year: String, semester: String },

    #[error("weight must be greater than 0, got {0}")]
    InvalidWeight(f64),

    #[error("weight {requested} exceeds remaining percentage {remaining:.2}")]
    WeightBudgetExceeded { requested: f64, remaining: f64 },

    #[error("max score must be at least 1, got {0}")]
    InvalidMaxScore(i32),

    #[error("score {score} for period criterion {period_criteria_id} is outside the allowed range (max {max_score})")]
    ScoreOutOfRange {
        period_criteria_id: Uuid,
        score: f64,
        max_score: i32,
    },

    #[error("period criterion {0} does not belong to this evaluation")]
    ForeignCriterion(Uuid),

    #[error("period criterion {id} is {actual}, expected {expected}")]
    WrongCriterionKind {
        id: Uuid,
        expected: crate::models::CriterionKind,
        actual: crate::models::CriterionKind,
    },

    #[error("evaluator must score {0} more dormer(s) before completing")]
    PendingTargets(usize),

    #[error("no {0} selected")]
    EmptySelection(&'static str),

    #[error("email {0} already belongs to another dormer")]
    DuplicateEmail(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures of a results recompute, tagged with the row-set involved.
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("failed to read {source_set}: {source}")]
    Read {
        source_set: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("failed to write {target_set}: {source}")]
    Write {
        target_set: &'static str,
        #[source]
        source: StoreError,
    },
}

/// Failures handing a message to an outbound mail transport.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail relay rejected message (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("dormer has no email address")]
    MissingRecipient,

    #[error("failed to build message: {0}")]
    Compose(String),

    #[error("outbox write failed: {0}")]
    Io(#[from] std::io::Error),
}
