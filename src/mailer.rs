//! Outbound mail transports and batch dispatch with per-recipient outcomes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::email::{self, CriterionLine, ResultsLetter};
use crate::error::{MailError, StoreError};
use crate::ranking::Standing;
use crate::report;
use crate::store::EvaluationStore;

const RELAY_TIMEOUT_SECS: u64 = 30;

/// Subject, recipient and HTML body: the whole contract with a transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, message: &OutboundMessage) -> Result<(), MailError>;
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    to: &'a str,
    subject: &'a str,
    html: &'a str,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
}

/// Posts messages as JSON to an HTTP mail relay that owns the SMTP session.
pub struct RelayTransport {
    endpoint: String,
    from: Option<String>,
    client: reqwest::Client,
}

impl RelayTransport {
    pub fn new(endpoint: &str, from: Option<String>) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(RELAY_TIMEOUT_SECS))
            .build()
            .map_err(|e| MailError::Network(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            from,
            client,
        })
    }
}

#[async_trait]
impl MailTransport for RelayTransport {
    fn name(&self) -> &str {
        "relay"
    }

    #[instrument(skip(self, message), fields(to = %message.to))]
    async fn send(&self, message: &OutboundMessage) -> Result<(), MailError> {
        let payload = RelayPayload {
            to: &message.to,
            subject: &message.subject,
            html: &message.html,
            text: email::strip_tags(&message.html),
            from: self.from.as_deref(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| MailError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected { status, body });
        }
        Ok(())
    }
}

/// Writes each message to a directory instead of sending it.
pub struct OutboxTransport {
    dir: PathBuf,
    sequence: AtomicUsize,
}

impl OutboxTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, MailError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            sequence: AtomicUsize::new(0),
        })
    }

    fn file_name(&self, recipient: &str) -> String {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let safe: String = recipient
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        format!("{n:04}-{safe}.html")
    }
}

#[async_trait]
impl MailTransport for OutboxTransport {
    fn name(&self) -> &str {
        "outbox"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), MailError> {
        let path = self.dir.join(self.file_name(&message.to));
        let contents = format!(
            "<!-- to: {} -->\n<!-- subject: {} -->\n{}",
            message.to, message.subject, message.html
        );
        tokio::fs::write(&path, contents).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryStatus {
    Sent,
    /// Not attempted; the dormer has no email address.
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub dormer_id: Uuid,
    pub recipient: Option<String>,
    pub status: DeliveryStatus,
}

/// Per-item outcomes of one batch; failures never abort the batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    pub deliveries: Vec<Delivery>,
}

impl DispatchReport {
    pub fn sent(&self) -> usize {
        self.count(|status| matches!(status, DeliveryStatus::Sent))
    }

    pub fn failed(&self) -> usize {
        self.count(|status| matches!(status, DeliveryStatus::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|status| matches!(status, DeliveryStatus::Skipped))
    }

    fn count(&self, predicate: impl Fn(&DeliveryStatus) -> bool) -> usize {
        self.deliveries
            .iter()
            .filter(|delivery| predicate(&delivery.status))
            .count()
    }
}

/// A message ready to send, or the reason it could not be composed.
#[derive(Debug)]
pub struct Outgoing {
    pub dormer_id: Uuid,
    pub message: Result<OutboundMessage, MailError>,
}

/// Sends each message in order, recording one outcome per item.
#[instrument(skip(transport, batch), fields(via = transport.name(), size = batch.len()))]
pub async fn dispatch<T: MailTransport + ?Sized>(
    transport: &T,
    batch: Vec<Outgoing>,
) -> DispatchReport {
    let mut report = DispatchReport::default();

    for item in batch {
        let delivery = match item.message {
            Ok(message) => {
                let status = match transport.send(&message).await {
                    Ok(()) => DeliveryStatus::Sent,
                    Err(err) => {
                        warn!(to = %message.to, error = %err, "failed to send email");
                        DeliveryStatus::Failed(err.to_string())
                    }
                };
                Delivery {
                    dormer_id: item.dormer_id,
                    recipient: Some(message.to),
                    status,
                }
            }
            Err(err) => Delivery {
                dormer_id: item.dormer_id,
                recipient: None,
                status: DeliveryStatus::Failed(err.to_string()),
            },
        };
        report.deliveries.push(delivery);
    }

    info!(
        sent = report.sent(),
        failed = report.failed(),
        skipped = report.skipped(),
        "batch dispatched"
    );
    report
}

/// Composes and sends a results notice for each standing.
///
/// Standings flagged as evicted receive the eviction notice. Dormers without
/// an email, or without breakdown rows, count as failures.
#[instrument(skip(store, transport, standings), fields(count = standings.len()))]
pub async fn send_results<S, T>(
    store: &S,
    transport: &T,
    period_id: Uuid,
    standings: &[Standing],
) -> Result<DispatchReport, StoreError>
where
    S: EvaluationStore + ?Sized,
    T: MailTransport + ?Sized,
{
    let period = store.get_period(period_id).await?;
    let lines_by_dormer: HashMap<Uuid, Vec<CriterionLine>> =
        report::criterion_lines_by_dormer(store, period_id).await?;

    let batch = standings
        .iter()
        .map(|standing| {
            let dormer_id = standing.result.target_dormer_id;
            let message = match standing.resident.as_ref().filter(|r| r.has_email()) {
                None => Err(MailError::MissingRecipient),
                Some(resident) => match lines_by_dormer.get(&dormer_id) {
                    None => Err(MailError::Compose(format!(
                        "no criteria results stored for {}",
                        resident.full_name()
                    ))),
                    Some(lines) => {
                        let name = resident.full_name();
                        let letter = ResultsLetter {
                            dormer_name: &name,
                            criteria: lines,
                            total_score: standing.result.total_weighted_score,
                            rank: standing.rank,
                            school_year: &period.school_year,
                            semester: period.semester,
                        };
                        let html = if standing.evicted {
                            email::evicted_results_email(&letter)
                        } else {
                            email::results_email(&letter)
                        };
                        Ok(OutboundMessage {
                            to: resident.email.clone(),
                            subject: email::SUBJECT.to_string(),
                            html,
                        })
                    }
                },
            };
            Outgoing { dormer_id, message }
        })
        .collect();

    Ok(dispatch(transport, batch).await)
}

/// Emails every evaluator of the period a link to their scoring page.
///
/// Evaluators whose dormer has no email are skipped rather than failed.
#[instrument(skip(store, transport))]
pub async fn send_invitations<S, T>(
    store: &S,
    transport: &T,
    period_id: Uuid,
    base_url: &str,
) -> Result<DispatchReport, StoreError>
where
    S: EvaluationStore + ?Sized,
    T: MailTransport + ?Sized,
{
    let evaluators = store.list_evaluators(period_id).await?;
    let emails: HashMap<Uuid, String> = store
        .list_residents()
        .await?
        .into_iter()
        .filter(|r| r.has_email())
        .map(|r| (r.id, r.email))
        .collect();

    let mut skipped = Vec::new();
    let mut batch = Vec::new();
    for evaluator in &evaluators {
        match emails.get(&evaluator.dormer_id) {
            Some(address) => {
                let link = email::evaluator_link(base_url, evaluator.id);
                batch.push(Outgoing {
                    dormer_id: evaluator.dormer_id,
                    message: Ok(OutboundMessage {
                        to: address.clone(),
                        subject: email::SUBJECT.to_string(),
                        html: email::evaluator_invitation_email(&link),
                    }),
                });
            }
            None => skipped.push(Delivery {
                dormer_id: evaluator.dormer_id,
                recipient: None,
                status: DeliveryStatus::Skipped,
            }),
        }
    }

    let mut report = dispatch(transport, batch).await;
    report.deliveries.extend(skipped);
    Ok(report)
}
