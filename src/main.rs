use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

mod config;
mod db;
mod error;
mod import;
mod models;
mod pipeline;
mod report;
mod risk;
mod seed;
mod signals;
mod store;
mod telemetry;
mod workflow;

use config::AssessmentConfig;
use db::PgStore;
use models::{InterventionKind, InterventionStatus};
use pipeline::RefreshOptions;
use store::{MemoryStore, RetentionStore};

#[derive(Parser)]
#[command(name = "usm-retention")]
#[command(about = "Student retention risk scoring for USM-IA", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score the demo dataset in memory, without a database
    Demo {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    #[command(flatten)]
    Database(DatabaseCommand),
}

/// Commands that need `DATABASE_URL`.
#[derive(Subcommand)]
enum DatabaseCommand {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo students, attendance and alerts, then score them
    Seed,
    /// Import attendance from a CSV file
    ImportAttendance {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Recompute the prediction for one student
    Assess {
        #[arg(long)]
        student: Uuid,
    },
    /// Recompute predictions for every active student
    Refresh {
        /// Open academic and attendance alerts past the thresholds
        #[arg(long)]
        raise_alerts: bool,
    },
    /// List the highest risk students
    Top {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "retention-report.md")]
        out: PathBuf,
    },
    /// Mark an alert as resolved
    ResolveAlert {
        #[arg(long)]
        alert: Uuid,
        #[arg(long)]
        resolver: Uuid,
    },
    /// Open a pending intervention for a student
    OpenIntervention {
        #[arg(long)]
        student: Uuid,
        #[arg(long = "type")]
        kind: InterventionKind,
        #[arg(long, default_value_t = 3)]
        priority: i32,
        #[arg(long)]
        assigned_to: Option<Uuid>,
        #[arg(long)]
        due: Option<NaiveDate>,
    },
    /// Move an intervention to its next status
    AdvanceIntervention {
        #[arg(long)]
        intervention: Uuid,
        #[arg(long)]
        status: InterventionStatus,
        #[arg(long)]
        results: Option<String>,
        #[arg(long)]
        effectiveness: Option<i32>,
    },
}

async fn print_top(store: &dyn RetentionStore, limit: usize) -> anyhow::Result<()> {
    let predictions = store.list_predictions().await?;
    if predictions.is_empty() {
        println!("No predictions yet. Run `refresh` first.");
        return Ok(());
    }

    println!("Top students by risk score:");
    for prediction in predictions.iter().take(limit) {
        let label = match store.fetch_student(prediction.student_id).await? {
            Some(student) => format!("{} ({}, {})", student.full_name, student.email, student.career),
            None => prediction.student_id.to_string(),
        };
        println!(
            "- {} score {} [{}] {}",
            label,
            prediction.risk_score,
            models::RiskLevel::from_score(prediction.risk_score),
            prediction.recommendations.active().join(", ")
        );
    }
    Ok(())
}

async fn write_report(store: &dyn RetentionStore, out: Option<&PathBuf>) -> anyhow::Result<()> {
    let report = report::render_report(store, Utc::now()).await?;
    match out {
        Some(path) => {
            std::fs::write(path, report)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Report written to {}.", path.display());
        }
        None => print!("{report}"),
    }
    Ok(())
}

async fn run_demo(config: &AssessmentConfig, out: Option<PathBuf>) -> anyhow::Result<()> {
    let store = MemoryStore::new();
    seed::load_demo(&store, Utc::now().date_naive()).await;

    let summary =
        pipeline::update_student_predictions(&store, config, RefreshOptions { raise_alerts: true })
            .await?;
    println!(
        "Assessed {} students, raised {} alerts.",
        summary.assessed, summary.alerts_raised
    );
    write_report(&store, out.as_ref()).await
}

fn demo_config(config: &AssessmentConfig) -> AssessmentConfig {
    AssessmentConfig {
        model_version: config.model_version.clone(),
        ..AssessmentConfig::demo()
    }
}

async fn connect() -> anyhow::Result<PgStore> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to the retention Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(PgStore::new(pool))
}

async fn run_database_command(
    command: DatabaseCommand,
    config: &AssessmentConfig,
) -> anyhow::Result<()> {
    let store = connect().await?;

    match command {
        DatabaseCommand::InitDb => {
            db::init_db(store.pool()).await?;
            println!("Schema ready.");
        }
        DatabaseCommand::Seed => {
            let seeded = seed::load_demo(&store, Utc::now().date_naive()).await;
            let summary = pipeline::update_student_predictions(
                &store,
                &demo_config(config),
                RefreshOptions::default(),
            )
            .await?;
            println!(
                "Seeded {} students, {} attendance rows, {} alerts ({} failed); scored {} students.",
                seeded.students, seeded.attendance, seeded.alerts, seeded.failed, summary.written
            );
        }
        DatabaseCommand::ImportAttendance { csv } => {
            let summary = import::import_attendance_csv(&store, &csv).await?;
            println!(
                "Inserted {} attendance rows from {} ({} already recorded, {} unknown students, {} failed).",
                summary.inserted,
                csv.display(),
                summary.duplicates,
                summary.unknown_students,
                summary.failed
            );
        }
        DatabaseCommand::Assess { student } => {
            let assessment = pipeline::assess_student(&store, config, student).await?;
            let prediction = &assessment.prediction;
            println!(
                "{}: score {} (gpa {:.2}, attendance {:.0}%, {} open alerts)",
                assessment.student.full_name,
                prediction.risk_score,
                assessment.signals.gpa,
                assessment.signals.attendance_rate,
                assessment.signals.open_alert_count
            );
            println!("Recommended: {}", prediction.recommendations.active().join(", "));
            if !assessment.written {
                println!("Warning: the prediction could not be stored.");
            }
        }
        DatabaseCommand::Refresh { raise_alerts } => {
            let summary = pipeline::update_student_predictions(
                &store,
                config,
                RefreshOptions { raise_alerts },
            )
            .await?;
            println!(
                "Assessed {} students: {} stored, {} failed, {} alerts raised.",
                summary.assessed, summary.written, summary.failed, summary.alerts_raised
            );
        }
        DatabaseCommand::Top { limit } => print_top(&store, limit).await?,
        DatabaseCommand::Report { out } => write_report(&store, Some(&out)).await?,
        DatabaseCommand::ResolveAlert { alert, resolver } => {
            let alert = workflow::resolve_alert(&store, alert, resolver).await?;
            println!("Resolved alert \"{}\".", alert.title);
        }
        DatabaseCommand::OpenIntervention {
            student,
            kind,
            priority,
            assigned_to,
            due,
        } => {
            let intervention =
                workflow::open_intervention(&store, student, kind, priority, assigned_to, due)
                    .await?;
            println!("Opened {} intervention {}.", kind, intervention.id);
        }
        DatabaseCommand::AdvanceIntervention {
            intervention,
            status,
            results,
            effectiveness,
        } => {
            let updated =
                workflow::advance_intervention(&store, intervention, status, results, effectiveness)
                    .await?;
            println!("Intervention {} is now {}.", updated.id, updated.status);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_telemetry();
    let cli = Cli::parse();
    let config = AssessmentConfig::from_env()?;

    match cli.command {
        Commands::Demo { out } => run_demo(&demo_config(&config), out).await,
        Commands::Database(command) => run_database_command(command, &config).await,
    }
}
