use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use visitor_forecast::align::{columns, SeriesAligner};
use visitor_forecast::models::YearMonth;
use visitor_forecast::pipeline::{Pipeline, PipelineConfig, PipelineInputs};
use visitor_forecast::{db, io};

#[derive(Parser)]
#[command(name = "visitor-forecast")]
#[command(about = "Monthly and site-level visitor forecasts from tourism statistics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Run the forecast pipeline over CSV inputs
    Forecast {
        /// Year, VisitorType, Nights
        #[arg(long)]
        annual: PathBuf,
        /// Month, OccupancyRate
        #[arg(long)]
        monthly: PathBuf,
        /// Region, Metric, VisitorType, AvgStayNights
        #[arg(long)]
        stay: PathBuf,
        /// SiteId, Ratio
        #[arg(long)]
        ratios: PathBuf,
        #[arg(long)]
        region: String,
        #[arg(long)]
        stay_metric: String,
        #[arg(long, default_value_t = 0.98)]
        phi: f64,
        #[arg(long, default_value_t = 10)]
        horizon: usize,
        /// First month (YYYY-MM) of the representative seasonal window
        #[arg(long)]
        season_start: Option<YearMonth>,
        /// Restrict the site view; repeat for several sites
        #[arg(long = "site")]
        sites: Vec<String>,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Persist the run to Postgres (needs DATABASE_URL)
        #[arg(long)]
        publish: bool,
    },
    /// List recently published forecast runs
    Runs {
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Forecast {
            annual,
            monthly,
            stay,
            ratios,
            region,
            stay_metric,
            phi,
            horizon,
            season_start,
            sites,
            out,
            publish,
        } => {
            let aligner = SeriesAligner::new();
            let annual = aligner.annual_long(
                &io::read_table(&annual)?,
                columns::YEAR,
                columns::VISITOR_TYPE,
                columns::NIGHTS,
            )?;
            let monthly = aligner.monthly(
                &io::read_table(&monthly)?,
                columns::MONTH,
                columns::OCCUPANCY_RATE,
            )?;
            let stay = aligner.stay_durations(&io::read_table(&stay)?, &region, &stay_metric)?;
            let ratios = aligner.site_ratios(&io::read_table(&ratios)?)?;

            let config = PipelineConfig {
                phi,
                horizon,
                season_start,
            };
            let inputs = PipelineInputs {
                annual,
                monthly,
                stay,
                ratios,
                sites: (!sites.is_empty()).then_some(sites),
            };
            let output = Pipeline::new(config).run(&inputs)?;
            let run_id = Uuid::new_v4();

            println!("Forecast run {run_id}");
            let index = output
                .seasonal_index
                .values()
                .iter()
                .map(|v| format!("{v:.3}"))
                .collect::<Vec<_>>()
                .join(" ");
            println!("Seasonal index (Jan-Dec): {index}");

            if let Some(first) = output.trend.points().first() {
                println!("Average daily visitors for {}:", first.year);
                for total in output
                    .daily
                    .total_by_month()
                    .iter()
                    .filter(|t| t.year == first.year)
                {
                    println!("- {}-{:02}: {:.0}", total.year, total.month, total.daily_visitors);
                }
            }

            println!(
                "{} monthly rows, {} daily rows, {} site rows.",
                output.monthly.rows().len(),
                output.daily.rows().len(),
                output.sites.len()
            );
            if !output.coverage_gap.is_empty() {
                println!(
                    "Sites without a trip ratio (excluded): {}",
                    output.coverage_gap.sites.join(", ")
                );
            }

            if let Some(path) = out {
                io::write_json(&path, run_id, &output)?;
                println!("Forecast written to {}.", path.display());
            }

            if publish {
                let pool = connect().await?;
                let inserted = db::publish_run(&pool, run_id, &config, &output).await?;
                println!("Published {inserted} rows for run {run_id}.");
            }
        }
        Commands::Runs { limit } => {
            let pool = connect().await?;
            let runs = db::fetch_runs(&pool, limit).await?;

            if runs.is_empty() {
                println!("No forecast runs published yet.");
                return Ok(());
            }

            println!("Recent forecast runs:");
            for run in runs {
                println!(
                    "- {} at {} (phi {:.2}, {} years, season from {}) {} site rows",
                    run.run_id,
                    run.created_at.format("%Y-%m-%d %H:%M"),
                    run.phi,
                    run.horizon,
                    run.season_start.as_deref().unwrap_or("start"),
                    run.site_rows
                );
            }
        }
    }

    Ok(())
}
