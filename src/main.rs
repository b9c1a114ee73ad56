use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use dorm_eval::aggregate::{self, RefreshOutcome};
use dorm_eval::config::AppConfig;
use dorm_eval::db::{self, PgStore};
use dorm_eval::mailer::{
    self, DeliveryStatus, DispatchReport, MailTransport, OutboxTransport, RelayTransport,
};
use dorm_eval::admin::ResidentChanges;
use dorm_eval::models::{CriterionKind, PeriodResult, PeriodStatus, Resident, Semester};
use dorm_eval::ranking::{self, RankingQuery, SortOrder, Standing};
use dorm_eval::store::EvaluationStore;
use dorm_eval::{admin, report, telemetry};

#[derive(Parser)]
#[command(name = "dorm-eval")]
#[command(about = "Dormitory evaluation periods, scoring and results", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a small sample evaluation
    Seed,
    /// Import or update dormers from a CSV file
    ImportResidents {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Add a single dormer
    AddResident {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "")]
        room: String,
        #[arg(long, default_value = "")]
        course_year: String,
    },
    /// Change a dormer's details; omitted fields are left as they are
    EditResident {
        #[arg(long)]
        dormer: Uuid,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        /// Pass an empty value to clear the email
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        room: Option<String>,
        #[arg(long)]
        course_year: Option<String>,
    },
    /// Delete a dormer with their assignments, scores and results
    DeleteResident {
        #[arg(long)]
        dormer: Uuid,
    },
    /// Open a new evaluation period
    CreatePeriod {
        #[arg(long)]
        title: String,
        /// School year label, e.g. 2025-2026
        #[arg(long)]
        school_year: String,
        /// 1 or 2
        #[arg(long)]
        semester: Semester,
    },
    /// Change a period's status (pending, active, closed)
    SetStatus {
        #[arg(long)]
        period: Uuid,
        #[arg(long)]
        status: PeriodStatus,
    },
    /// Delete a period with its criteria, evaluators, scores and results
    DeletePeriod {
        #[arg(long)]
        period: Uuid,
    },
    /// Add a reusable criterion
    AddCriterion {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// objective or subjective
        #[arg(long)]
        kind: CriterionKind,
    },
    /// Bind a criterion to a period with a weight and max score
    AttachCriterion {
        #[arg(long)]
        period: Uuid,
        #[arg(long)]
        criterion: Uuid,
        #[arg(long)]
        weight: f64,
        #[arg(long)]
        max_score: i32,
    },
    /// Change a period criterion's weight and optionally its max score
    UpdateCriterion {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        weight: f64,
        #[arg(long)]
        max_score: Option<i32>,
    },
    /// Remove a criterion from a period
    DetachCriterion {
        #[arg(long)]
        id: Uuid,
    },
    /// Assign dormers as peer evaluators for a period
    AssignEvaluators {
        #[arg(long)]
        period: Uuid,
        #[arg(long = "dormer", required = true)]
        dormers: Vec<Uuid>,
    },
    /// Remove evaluator assignments and their scores
    RemoveEvaluators {
        #[arg(long)]
        period: Uuid,
        #[arg(long = "evaluator", required = true)]
        evaluators: Vec<Uuid>,
    },
    /// Mark an evaluator as done once every other dormer is scored
    CompleteEvaluator {
        #[arg(long)]
        evaluator: Uuid,
    },
    /// Import scores from a CSV file (period_criteria_id,target_dormer_id,score)
    #[command(group(
        ArgGroup::new("scope")
            .args(["period", "evaluator"])
            .required(true)
            .multiple(false)
    ))]
    ImportScores {
        #[arg(long)]
        csv: PathBuf,
        /// Staff (objective) scores for this period
        #[arg(long)]
        period: Option<Uuid>,
        /// Peer (subjective) scores from this evaluator
        #[arg(long)]
        evaluator: Option<Uuid>,
    },
    /// Clear and recompute a period's results
    Recompute {
        #[arg(long)]
        period: Uuid,
    },
    /// Show the ranking for a period
    Rank {
        #[arg(long)]
        period: Uuid,
        /// Room to show, or "all"
        #[arg(long)]
        room: Option<String>,
        #[arg(long)]
        search: Option<String>,
        /// desc (highest first) or asc (lowest first)
        #[arg(long, default_value = "desc")]
        order: SortOrder,
        /// Number of lowest-ranked dormers to flag for eviction
        #[arg(long, default_value_t = 0)]
        evict: usize,
    },
    /// Show one dormer's scores for a period
    Breakdown {
        #[arg(long)]
        period: Uuid,
        #[arg(long)]
        dormer: Uuid,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        period: Uuid,
        #[arg(long, default_value_t = 0)]
        evict: usize,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Email results to ranked dormers
    SendResults {
        #[arg(long)]
        period: Uuid,
        #[arg(long, default_value_t = 0)]
        evict: usize,
        /// Only these dormers; defaults to every ranked dormer
        #[arg(long = "dormer")]
        dormers: Vec<Uuid>,
        /// Write messages here instead of using MAIL_RELAY_URL
        #[arg(long)]
        outbox: Option<PathBuf>,
    },
    /// Email every evaluator of a period their scoring link
    InviteEvaluators {
        #[arg(long)]
        period: Uuid,
        #[arg(long)]
        outbox: Option<PathBuf>,
    },
}

fn mail_transport(
    config: &AppConfig,
    outbox: Option<PathBuf>,
) -> anyhow::Result<Box<dyn MailTransport>> {
    if let Some(dir) = outbox {
        return Ok(Box::new(OutboxTransport::new(dir)?));
    }
    let endpoint = config
        .mail
        .relay_url
        .as_deref()
        .context("set MAIL_RELAY_URL or pass --outbox <dir>")?;
    Ok(Box::new(RelayTransport::new(endpoint, config.mail.from.clone())?))
}

fn print_dispatch(report: &DispatchReport) {
    println!(
        "Sent {} email(s), {} failed, {} skipped.",
        report.sent(),
        report.failed(),
        report.skipped()
    );
    for delivery in &report.deliveries {
        if let DeliveryStatus::Failed(reason) = &delivery.status {
            println!(
                "- {} ({}): {}",
                delivery.dormer_id,
                delivery.recipient.as_deref().unwrap_or("no email"),
                reason
            );
        }
    }
}

fn print_standings(standings: &[Standing]) {
    for standing in standings {
        let name = standing
            .resident
            .as_ref()
            .map(|r| format!("{} (room {})", r.full_name(), r.room))
            .unwrap_or_else(|| standing.result.target_dormer_id.to_string());
        let flag = if standing.evicted { " [evict]" } else { "" };
        println!(
            "- #{} {} score {:.2}{}",
            standing.rank, name, standing.result.total_weighted_score, flag
        );
    }
}

async fn ranked(
    store: &PgStore,
    results: &[PeriodResult],
    query: &RankingQuery,
) -> anyhow::Result<Vec<Standing>> {
    let residents = store.list_residents().await?;
    Ok(ranking::standings(results, &residents, query))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load().context("invalid configuration")?;
    telemetry::init(&config.telemetry).context("failed to initialise logging")?;

    let database_url = config
        .database_url()
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = PgStore::new(pool);
    let page_size = config.database.page_size;

    match cli.command {
        Commands::InitDb => {
            db::init_db(store.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let period_id = db::seed(store.pool()).await?;
            println!("Seed data inserted for period {period_id}.");
        }
        Commands::ImportResidents { csv } => {
            let residents = db::read_residents_csv(&csv)?;
            let written = store.upsert_residents(&residents).await?;
            println!("Imported {written} dormers from {}.", csv.display());
        }
        Commands::AddResident {
            first_name,
            last_name,
            email,
            room,
            course_year,
        } => {
            let resident = Resident {
                id: Uuid::new_v4(),
                first_name,
                last_name,
                email,
                room,
                course_year,
            };
            let resident = admin::add_resident(&store, resident).await?;
            println!("Added dormer {} ({}).", resident.full_name(), resident.id);
        }
        Commands::EditResident {
            dormer,
            first_name,
            last_name,
            email,
            room,
            course_year,
        } => {
            let changes = ResidentChanges {
                first_name,
                last_name,
                email,
                room,
                course_year,
            };
            let resident = admin::edit_resident(&store, dormer, changes).await?;
            println!("Updated dormer {} ({}).", resident.full_name(), resident.id);
        }
        Commands::DeleteResident { dormer } => {
            admin::delete_resident(&store, dormer).await?;
            println!("Deleted dormer {dormer}.");
        }
        Commands::CreatePeriod {
            title,
            school_year,
            semester,
        } => {
            let period = admin::create_period(&store, &title, &school_year, semester).await?;
            println!(
                "Created period {} (S.Y. {} {} Semester).",
                period.id,
                period.school_year,
                period.semester.ordinal()
            );
        }
        Commands::SetStatus { period, status } => {
            admin::set_period_status(&store, period, status).await?;
            println!("Period {period} is now {}.", status.as_str());
        }
        Commands::DeletePeriod { period } => {
            admin::delete_period(&store, period).await?;
            println!("Deleted period {period}.");
        }
        Commands::AddCriterion {
            name,
            description,
            kind,
        } => {
            let criterion = admin::add_criterion(&store, &name, &description, kind).await?;
            println!("Created {} criterion {} ({}).", criterion.kind, criterion.name, criterion.id);
        }
        Commands::AttachCriterion {
            period,
            criterion,
            weight,
            max_score,
        } => {
            let row = admin::attach_criterion(&store, period, criterion, weight, max_score).await?;
            let remaining = admin::remaining_weight(&store.list_period_criteria(period).await?);
            println!("Attached as {}; {remaining:.2}% weight remaining.", row.id);
        }
        Commands::UpdateCriterion {
            id,
            weight,
            max_score,
        } => {
            admin::update_period_criterion(&store, id, weight, max_score).await?;
            println!("Updated period criterion {id}.");
        }
        Commands::DetachCriterion { id } => {
            admin::detach_criterion(&store, id).await?;
            println!("Detached period criterion {id}.");
        }
        Commands::AssignEvaluators { period, dormers } => {
            let assigned = admin::assign_evaluators(&store, period, &dormers).await?;
            println!("Assigned {} evaluator(s).", assigned.len());
            for assignment in &assigned {
                println!("- {} for dormer {}", assignment.id, assignment.dormer_id);
            }
        }
        Commands::RemoveEvaluators { period, evaluators } => {
            let removed = admin::remove_evaluators(&store, period, &evaluators).await?;
            println!("Removed {removed} evaluator(s).");
        }
        Commands::CompleteEvaluator { evaluator } => {
            admin::complete_evaluator(&store, evaluator, page_size).await?;
            println!("Evaluator {evaluator} marked completed.");
        }
        Commands::ImportScores {
            csv,
            period,
            evaluator,
        } => {
            let entries = db::read_scores_csv(&csv)?;
            let written = match (period, evaluator) {
                (Some(period), _) => {
                    admin::record_objective_scores(&store, period, &entries).await?
                }
                (None, Some(evaluator)) => {
                    admin::record_subjective_scores(&store, evaluator, &entries).await?
                }
                (None, None) => anyhow::bail!("pass --period or --evaluator"),
            };
            println!("Recorded {written} score(s) from {}.", csv.display());
        }
        Commands::Recompute { period } => {
            match aggregate::refresh_period(&store, period, page_size).await {
                RefreshOutcome::Recomputed(aggregation) => {
                    println!(
                        "Stored {} criterion result(s) and {} total(s).",
                        aggregation.results_per_criterion.len(),
                        aggregation.results.len()
                    );
                }
                RefreshOutcome::Failed { error, fallback } => {
                    println!("Showing {} previously stored result(s).", fallback.len());
                    let standings = ranked(&store, &fallback, &RankingQuery::default()).await?;
                    print_standings(&standings);
                    return Err(error).context("failed to calculate results");
                }
            }
        }
        Commands::Rank {
            period,
            room,
            search,
            order,
            evict,
        } => {
            let results = store.list_results(period).await?;
            if results.is_empty() {
                println!("No results for this period. Run recompute first.");
                return Ok(());
            }
            let query = RankingQuery {
                room,
                search,
                order,
                evict_count: evict,
            };
            let standings = ranked(&store, &results, &query).await?;
            if standings.is_empty() {
                println!("No dormers match these filters.");
                let rooms = ranking::rooms(&store.list_residents().await?);
                if !rooms.is_empty() {
                    println!("Rooms: {}", rooms.join(", "));
                }
                return Ok(());
            }
            println!("Dormer ranking:");
            print_standings(&standings);
        }
        Commands::Breakdown { period, dormer } => {
            let breakdown = report::resident_breakdown(&store, period, dormer, page_size).await?;
            let residents = store.list_residents().await?;
            print!("{}", report::render_breakdown(&breakdown, &residents));
        }
        Commands::Report { period, evict, out } => {
            let evaluation = store.get_period(period).await?;
            let infos = report::join_criteria(
                &store.list_period_criteria(period).await?,
                &store.list_criteria().await?,
            );
            let residents = store.list_residents().await?;
            let query = RankingQuery {
                evict_count: evict,
                ..RankingQuery::default()
            };
            let standings =
                ranking::standings(&store.list_results(period).await?, &residents, &query);
            let evaluators = store.list_evaluators(period).await?;
            let report =
                report::build_report(&evaluation, &infos, &standings, &residents, &evaluators);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::SendResults {
            period,
            evict,
            dormers,
            outbox,
        } => {
            let transport = mail_transport(&config, outbox)?;
            let query = RankingQuery {
                evict_count: evict,
                ..RankingQuery::default()
            };
            let results = store.list_results(period).await?;
            let standings: Vec<Standing> = ranked(&store, &results, &query)
                .await?
                .into_iter()
                .filter(|s| dormers.is_empty() || dormers.contains(&s.result.target_dormer_id))
                .collect();
            if standings.is_empty() {
                println!("No ranked dormers selected.");
                return Ok(());
            }
            let report =
                mailer::send_results(&store, transport.as_ref(), period, &standings).await?;
            print_dispatch(&report);
        }
        Commands::InviteEvaluators { period, outbox } => {
            let transport = mail_transport(&config, outbox)?;
            let report =
                mailer::send_invitations(&store, transport.as_ref(), period, &config.app_base_url)
                    .await?;
            print_dispatch(&report);
        }
    }

    Ok(())
}
