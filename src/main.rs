use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

mod config;
mod db;
mod error;
mod gpa;
mod models;
mod report;

use config::AppConfig;
use gpa::RecordSet;
use models::{CourseRecord, GradingScale, RecordSetPayload, StoredCourse};

#[derive(Parser)]
#[command(name = "grademaster")]
#[command(about = "GPA/CGPA tracker with 4.0 and 5.0 grading scales", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute GPA for a JSON record-set file without touching the database
    Calc {
        #[arg(long)]
        file: PathBuf,
    },
    #[command(flatten)]
    Stored(StoredCommands),
}

#[derive(Subcommand)]
enum StoredCommands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Register a user (updates the name if the email exists)
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    /// Add a course to a user's record set
    AddCourse {
        #[arg(long)]
        email: String,
        /// Grading scale: 4.0 or 5.0
        #[arg(long, default_value = "5.0")]
        scale: GradingScale,
        #[arg(long)]
        course: String,
        #[arg(long)]
        credit: i64,
        #[arg(long)]
        grade: String,
        #[arg(long, default_value = "")]
        semester: String,
        #[arg(long, default_value = "")]
        level: String,
    },
    /// Remove a course by id
    RemoveCourse {
        #[arg(long)]
        email: String,
        #[arg(long)]
        course_id: Uuid,
    },
    /// Move every course of one scale group to the other scale
    Rescale {
        #[arg(long)]
        email: String,
        #[arg(long)]
        from: GradingScale,
        #[arg(long)]
        to: GradingScale,
    },
    /// Show a user's courses, averages, and classification
    Show {
        #[arg(long)]
        email: String,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// List CGPA history snapshots, newest first
    History {
        #[arg(long)]
        email: String,
        #[arg(long)]
        scale: Option<GradingScale>,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Import courses from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Generate a markdown transcript
    Report {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "transcript.md")]
        out: PathBuf,
    },
}

/// A calc file holds one record-set payload or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum PayloadFile {
    Many(Vec<RecordSetPayload>),
    One(RecordSetPayload),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Calc { file } => calc(&file),
        Commands::Stored(command) => {
            let config = AppConfig::from_env()?;
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(&config.database_url)
                .await
                .context("failed to connect to Postgres")?;
            run(&pool, command).await
        }
    }
}

fn calc(file: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let payloads = match serde_json::from_str::<PayloadFile>(&content)
        .with_context(|| format!("{} is not a record-set payload", file.display()))?
    {
        PayloadFile::Many(payloads) => payloads,
        PayloadFile::One(payload) => vec![payload],
    };

    let set = RecordSet::from_payloads(&payloads)
        .inspect_err(|err| warn!(error = %err, "record set rejected"))?;
    print_summary(&set)
}

async fn run(pool: &PgPool, command: StoredCommands) -> anyhow::Result<()> {
    match command {
        StoredCommands::InitDb => {
            db::init_db(pool).await?;
            println!("Schema ready.");
        }
        StoredCommands::Seed => {
            db::seed(pool).await?;
            println!("Seed data inserted.");
        }
        StoredCommands::Register { name, email } => {
            let id = db::register_user(pool, &name, &email).await?;
            println!("Registered {name} ({id}).");
        }
        StoredCommands::AddCourse {
            email,
            scale,
            course,
            credit,
            grade,
            semester,
            level,
        } => {
            let user = db::find_user(pool, &email).await?;
            let record = CourseRecord::new(&course, credit, &grade, scale, &semester, &level)
                .inspect_err(|err| warn!(error = %err, "course rejected"))?;
            let summary = db::add_course(pool, user.id, scale, &record).await?;
            println!(
                "Added {} to the {} group; group GPA now {:.2}.",
                record.name,
                scale,
                summary.rounded()
            );
        }
        StoredCommands::RemoveCourse { email, course_id } => {
            let user = db::find_user(pool, &email).await?;
            match db::remove_course(pool, user.id, course_id).await? {
                Some(removed) => match removed.remaining {
                    Some(summary) => println!(
                        "Removed {}; {} group GPA now {:.2}.",
                        removed.record.name,
                        removed.scale,
                        summary.rounded()
                    ),
                    None => println!(
                        "Removed {}; the {} group is now empty.",
                        removed.record.name, removed.scale
                    ),
                },
                None => println!("No course {course_id} found for {}.", user.email),
            }
        }
        StoredCommands::Rescale { email, from, to } => {
            let user = db::find_user(pool, &email).await?;
            if db::rescale(pool, user.id, from, to).await? {
                println!("Moved the {from} group onto the {to} scale.");
            } else {
                println!("Nothing to move from the {from} scale.");
            }
        }
        StoredCommands::Show { email, json } => {
            let user = db::find_user(pool, &email).await?;
            let courses = db::fetch_courses(pool, user.id).await?;
            let set = RecordSet::from_records(
                courses
                    .iter()
                    .map(|course| (course.scale, course.record.clone())),
            )?;

            if json {
                let overall = set.overall()?;
                let body = serde_json::json!({
                    "user": { "id": user.id, "name": user.full_name, "email": user.email },
                    "recordSet": set,
                    "overall": overall,
                    "overallRounded": overall.rounded_average(),
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                println!("{} <{}>", user.full_name, user.email);
                print_courses(&courses);
                print_summary(&set)?;
            }
        }
        StoredCommands::History {
            email,
            scale,
            limit,
        } => {
            let user = db::find_user(pool, &email).await?;
            let history = db::fetch_history(pool, user.id, scale, limit).await?;

            if history.is_empty() {
                println!("No history recorded for {}.", user.email);
                return Ok(());
            }

            println!("CGPA history for {} (newest first):", user.email);
            for entry in &history {
                println!(
                    "- {} {:.2} on {} scale{}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    gpa::round2(entry.average),
                    entry.scale,
                    entry
                        .semester
                        .as_deref()
                        .map(|semester| format!(" ({semester})"))
                        .unwrap_or_default()
                );
            }
        }
        StoredCommands::Import { csv } => {
            let inserted = db::import_csv(pool, &csv).await?;
            println!("Inserted {inserted} courses from {}.", csv.display());
        }
        StoredCommands::Report { email, out } => {
            let user = db::find_user(pool, &email).await?;
            let set = db::load_record_set(pool, user.id).await?;
            let history = db::fetch_history(pool, user.id, None, 5).await?;
            let report = report::build_report(&user, Utc::now().date_naive(), &set, &history)?;
            std::fs::write(&out, report)?;
            info!(user = %user.id, path = %out.display(), "report written");
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn print_courses(courses: &[StoredCourse]) {
    if courses.is_empty() {
        println!("No courses recorded.");
        return;
    }

    for course in courses {
        println!(
            "- [{}] {} scale: {} ({} units, grade {}, {}, level {})",
            course.id,
            course.scale,
            course.record.name,
            course.record.credit_units,
            course.record.grade,
            course.record.semester,
            course.record.level
        );
    }
}

fn print_summary(set: &RecordSet) -> anyhow::Result<()> {
    if set.is_empty() {
        println!("Overall CGPA 0.00: no courses recorded.");
        return Ok(());
    }

    println!("{} courses in {} scale groups", set.course_count(), set.groups().count());
    for group in set.groups() {
        let summary = group.summary();
        println!(
            "{} scale: GPA {:.2} over {} courses ({} credit units)",
            group.scale(),
            summary.rounded(),
            group.courses().len(),
            summary.total_credits
        );
    }

    let overall = set.overall()?;
    match (overall.scale, overall.classification) {
        (Some(scale), Some(classification)) => println!(
            "Overall CGPA {:.2} ({} scale): {}",
            overall.rounded_average(),
            scale,
            classification
        ),
        _ => println!("Overall CGPA {:.2}", overall.rounded_average()),
    }

    Ok(())
}
