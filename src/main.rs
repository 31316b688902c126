use baito_match::{config::Config, error::PipelineError, pipeline, PipelineState};
use chrono::{NaiveDate, Utc};
use clap::Parser;

/// Daily matching pipeline: ingest the day's job CSV, score the corpus,
/// pick 40 jobs per subscriber across six sections, and fill the delivery
/// queue for the external renderer.
#[derive(Debug, Parser)]
#[command(name = "baito-match", version, about)]
struct Args {
    /// Batch date to own (defaults to today, UTC)
    #[arg(long, value_name = "YYYY-MM-DD")]
    batch_date: Option<NaiveDate>,

    /// Jobs CSV path, overriding BM_JOBS_CSV
    #[arg(long, value_name = "PATH")]
    csv: Option<String>,
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .json()
        .init();

    let args = Args::parse();

    if let Err(err) = run(args).await {
        tracing::error!(error = %err, exit_code = err.exit_code(), "batch failed");
        std::process::exit(err.exit_code());
    }
}

async fn run(args: Args) -> Result<(), PipelineError> {
    let mut config = Config::from_env()?;
    if let Some(csv) = args.csv {
        config.jobs_csv_path = csv;
    }

    let batch_date = args.batch_date.unwrap_or_else(|| Utc::now().date_naive());
    tracing::info!(%batch_date, csv = %config.jobs_csv_path, "starting daily matching batch");

    let state = PipelineState::new(config).await?;
    let summary = pipeline::run(&state, batch_date).await?;

    tracing::info!(
        batch_id = %summary.batch_id,
        users_processed = summary.users_processed,
        picks_written = summary.picks_written,
        "done"
    );
    Ok(())
}
