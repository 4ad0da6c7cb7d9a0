use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use log::info;
use sqlx::postgres::{PgPool, PgPoolOptions};

mod config;
mod db;
mod error;
mod features;
mod models;
mod predictor;
mod registry;
mod report;
mod ridge;
mod risk;
mod service;
mod states;
mod store;
mod trainer;
mod trend;

use config::{DataSource, Settings};
use registry::{FileRegistry, MemoryRegistry, ModelRegistry};
use service::ForecastMode;
use store::{EnrolmentStore, MemoryStore};

#[derive(Parser)]
#[command(name = "enrolment-insights")]
#[command(about = "Enrolment forecasts and district risk scoring", long_about = None)]
struct Cli {
    /// Read enrolment records from a CSV extract instead of Postgres
    #[arg(long, global = true)]
    csv: Option<PathBuf>,
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,
    /// Directory holding trained per-state models
    #[arg(long, global = true, env = "ENROLMENT_MODEL_DIR")]
    model_dir: Option<PathBuf>,
    /// Keep trained models in memory for this run only
    #[arg(long, global = true)]
    no_persist: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Import enrolment records from a CSV file
    Import {
        #[arg(long)]
        file: PathBuf,
    },
    /// Train forecast models
    #[command(group(
        ArgGroup::new("scope")
            .args(["state", "all"])
            .required(true)
            .multiple(false)
    ))]
    Train {
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        all: bool,
    },
    /// List trained models
    Models,
    /// Forecast daily enrolments for a state
    Forecast {
        #[arg(long)]
        state: String,
        #[arg(long, default_value_t = config::DEFAULT_HORIZON_DAYS)]
        horizon: usize,
        /// Only use an already trained model
        #[arg(long)]
        cached: bool,
        #[arg(long)]
        json: bool,
    },
    /// Rank districts of a state by enrolment shortfall risk
    Risks {
        #[arg(long)]
        state: String,
        #[arg(long, default_value_t = config::DEFAULT_WINDOW_DAYS)]
        window_days: i64,
        #[arg(long, default_value_t = config::DEFAULT_RISK_LIMIT)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        state: String,
        #[arg(long, default_value_t = config::DEFAULT_HORIZON_DAYS)]
        horizon: usize,
        #[arg(long, default_value_t = config::DEFAULT_WINDOW_DAYS)]
        window_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = Settings::resolve(cli.csv, cli.database_url, cli.model_dir)?;

    let (store, pool): (Box<dyn EnrolmentStore>, Option<PgPool>) = match &settings.source {
        DataSource::Csv(path) => {
            let store = MemoryStore::from_csv(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            (Box::new(store) as Box<dyn EnrolmentStore>, None)
        }
        DataSource::Postgres(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await
                .context("failed to connect to Postgres")?;
            (
                Box::new(db::PgStore::new(pool.clone())) as Box<dyn EnrolmentStore>,
                Some(pool),
            )
        }
    };
    let registry: Box<dyn ModelRegistry> = if cli.no_persist {
        Box::new(MemoryRegistry::new())
    } else {
        Box::new(FileRegistry::open(&settings.model_dir).with_context(|| {
            format!("cannot open model dir {}", settings.model_dir.display())
        })?)
    };

    match cli.command {
        Commands::InitDb => {
            let pool = pool.context("init-db needs DATABASE_URL, not --csv")?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Import { file } => {
            let pool = pool.context("import needs DATABASE_URL, not --csv")?;
            let inserted = db::import_csv(&pool, &file).await?;
            println!("Inserted {inserted} records from {}.", file.display());
        }
        Commands::Train { state, all } => {
            if all {
                let outcomes = service::train_all(store.as_ref(), registry.as_ref()).await?;
                for outcome in outcomes {
                    match outcome.result {
                        Ok(model) => println!(
                            "- {}: trained on {} rows, {}",
                            outcome.state,
                            model.sample_count,
                            model.cv_metrics.summary()
                        ),
                        Err(err) if err.is_recoverable() => {
                            println!("- {}: waiting for data ({err})", outcome.state)
                        }
                        Err(err) => println!("- {}: failed ({err})", outcome.state),
                    }
                }
            } else if let Some(state) = state {
                let model = service::train(store.as_ref(), registry.as_ref(), &state).await?;
                println!(
                    "Trained {} on {} rows ({} to {}), {}.",
                    model.state,
                    model.sample_count,
                    model.training_window.start,
                    model.training_window.end,
                    model.cv_metrics.summary()
                );
            }
        }
        Commands::Models => {
            let states = registry.states()?;
            if states.is_empty() {
                println!("No trained models.");
            }
            for state in states {
                if let Some(model) = registry.get(&state)? {
                    println!(
                        "- {}: {} to {}, {} rows, {}, trained {}",
                        model.state,
                        model.training_window.start,
                        model.training_window.end,
                        model.sample_count,
                        model.cv_metrics.summary(),
                        model.trained_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }
        Commands::Forecast {
            state,
            horizon,
            cached,
            json,
        } => {
            let mode = if cached {
                ForecastMode::CachedOnly
            } else {
                ForecastMode::TrainIfStale
            };
            let response =
                service::forecast(store.as_ref(), registry.as_ref(), &state, horizon, mode).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
                return Ok(());
            }

            println!("Forecast for {} ({} days):", response.state, response.horizon_days);
            for point in &response.forecast {
                println!(
                    "- {} {:.0} [{:.0}, {:.0}]",
                    point.date, point.value, point.lower, point.upper
                );
            }
        }
        Commands::Risks {
            state,
            window_days,
            limit,
            json,
        } => {
            let report =
                service::district_risks(store.as_ref(), &state, window_days, Some(limit)).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }

            if report.districts.is_empty() {
                println!("No districts with enough data in this window.");
            } else {
                println!(
                    "Districts by risk score (avg {:.2}, {} severe):",
                    report.avg_risk_score, report.critical_count
                );
                for district in &report.districts {
                    println!(
                        "- {} score {:.2} ({}), total {} across {} records",
                        district.district,
                        district.risk_score,
                        district.severity,
                        district.district_total,
                        district.record_count
                    );
                }
            }
            for status in &report.insufficient {
                println!(
                    "- {} not scored: {} of {} days",
                    status.district, status.active_days, status.required_days
                );
            }
        }
        Commands::Report {
            state,
            horizon,
            window_days,
            out,
        } => {
            let forecast = service::forecast(
                store.as_ref(),
                registry.as_ref(),
                &state,
                horizon,
                ForecastMode::TrainIfStale,
            )
            .await;
            let risks = service::district_risks(store.as_ref(), &state, window_days, None).await?;
            let report = report::build_report(&forecast, &risks);
            std::fs::write(&out, report)?;
            info!("report for {} written", risks.state);
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
