use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use student_outcome_predictor::{
    artifacts, batch, db, report, ArtifactPaths, ChainedPredictor, InferenceError, StudentRecord,
};

#[derive(Parser)]
#[command(name = "student-outcome")]
#[command(about = "Chained CGPA and academic risk prediction for students", long_about = None)]
struct Cli {
    #[command(flatten)]
    artifacts: ArtifactArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ArtifactArgs {
    /// Directory holding the trained models and label encoders
    #[arg(long, global = true, env = "STUDENT_OUTCOME_ARTIFACTS", default_value = "artifacts")]
    artifacts: PathBuf,
    /// Override the GPA regressor file
    #[arg(long, global = true)]
    gpa_model: Option<PathBuf>,
    /// Override the risk classifier file
    #[arg(long, global = true)]
    risk_model: Option<PathBuf>,
    /// Override the label encoder file
    #[arg(long, global = true)]
    encoders: Option<PathBuf>,
}

impl ArtifactArgs {
    fn paths(&self) -> ArtifactPaths {
        let mut paths = ArtifactPaths::in_dir(&self.artifacts);
        if let Some(path) = &self.gpa_model {
            paths.gpa_model = path.clone();
        }
        if let Some(path) = &self.risk_model {
            paths.risk_model = path.clone();
        }
        if let Some(path) = &self.encoders {
            paths.encoders = path.clone();
        }
        paths
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the prediction history schema
    InitDb,
    /// Print the feature lists each model expects
    Schema,
    /// Predict CGPA and risk level for one JSON record
    Predict {
        /// JSON file with one student record; reads stdin when omitted or "-"
        #[arg(long)]
        input: Option<PathBuf>,
        /// Store the prediction in Postgres
        #[arg(long)]
        record: bool,
    },
    /// Score every row of a CSV file
    Batch {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = "predictions.csv")]
        out: PathBuf,
        /// Store successful predictions in Postgres
        #[arg(long)]
        record: bool,
    },
    /// List recent stored predictions
    History {
        #[arg(long)]
        risk: Option<String>,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Generate a markdown report of stored predictions
    Report {
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

fn load_predictor(args: &ArtifactArgs) -> anyhow::Result<ChainedPredictor> {
    artifacts::load_predictor(&args.paths()).context("failed to load model artifacts")
}

fn read_input(input: Option<&PathBuf>) -> anyhow::Result<StudentRecord> {
    let data = match input {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    serde_json::from_str(&data).context("input must be a JSON object of student fields")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("student_outcome=info".parse()?)
                .add_directive("student_outcome_predictor=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Schema => {
            let predictor = load_predictor(&cli.artifacts)?;
            let schemas = serde_json::json!({
                "expected_gpa_features": &**predictor.gpa_schema(),
                "expected_dropout_features": &**predictor.risk_schema(),
            });
            println!("{}", serde_json::to_string_pretty(&schemas)?);
        }
        Commands::Predict { input, record } => {
            let predictor = load_predictor(&cli.artifacts)?;
            let student = read_input(input.as_ref())?;

            let result = match predictor.infer(&student) {
                Ok(result) => result,
                Err(err @ InferenceError::UnknownCategory(_)) => {
                    anyhow::bail!("invalid input: {err}");
                }
                Err(err) => return Err(err.into()),
            };
            println!("{}", serde_json::to_string_pretty(&result)?);

            if record {
                let pool = connect().await?;
                let id = db::insert_prediction(&pool, &student, &result).await?;
                info!(%id, "Prediction stored");
            }
        }
        Commands::Batch { csv, out, record } => {
            let predictor = load_predictor(&cli.artifacts)?;
            let records = batch::read_records(&csv)?;
            let outcome = batch::score_records(&predictor, records)?;
            batch::write_results(&out, &outcome.rows)?;
            predictor.stats().log_summary();

            if record {
                let pool = connect().await?;
                for (student, result) in &outcome.scored {
                    db::insert_prediction(&pool, student, result).await?;
                }
            }

            println!(
                "Scored {} of {} rows from {} into {}.",
                outcome.scored.len(),
                outcome.rows.len(),
                csv.display(),
                out.display()
            );
            if outcome.rejected > 0 {
                println!("{} rows rejected; see the error column.", outcome.rejected);
            }
        }
        Commands::History {
            risk,
            since_days,
            limit,
        } => {
            let pool = connect().await?;
            let since = report::cutoff_time(since_days);
            let rows = db::fetch_predictions(&pool, since, risk.as_deref(), limit).await?;

            if rows.is_empty() {
                println!("No predictions found for this window.");
                return Ok(());
            }

            println!("Recent predictions:");
            for row in rows.iter() {
                println!(
                    "- {} {} ({}) CGPA {:.2}, {} risk",
                    row.created_at.format("%Y-%m-%d %H:%M"),
                    row.student_name.as_deref().unwrap_or("unnamed"),
                    row.enrollment_no.as_deref().unwrap_or("-"),
                    row.predicted_gpa,
                    row.risk_label
                );
            }
        }
        Commands::Report { since_days, out } => {
            let pool = connect().await?;
            let since = report::cutoff_time(since_days);
            let summaries = db::fetch_risk_mix(&pool, since).await?;
            let lowest = db::fetch_lowest_predictions(&pool, since, report::LOWEST_LISTED).await?;
            let report = report::build_report(since_days, since, &summaries, &lowest);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
