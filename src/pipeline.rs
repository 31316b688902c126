use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::watch;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::services::ingest::IngestService;
use crate::services::masters::MasterCache;
use crate::services::matcher::MatcherService;
use crate::services::popularity::PopularityService;
use crate::services::profile::ProfileService;
use crate::services::queue::QueueService;
use crate::services::scorer::ScorerService;
use crate::PipelineState;

/// The per-batch summary event, also persisted to `batch_runs`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub batch_id: Uuid,
    pub batch_date: NaiveDate,
    pub users_processed: u64,
    pub jobs_scored: u64,
    pub picks_written: u64,
    pub queue_rows: u64,
    pub low_inventory_users: u64,
}

/// Run the whole batch under the hard wall-clock deadline. On exceedance the
/// cancel signal is raised so workers exit between chunks/users, leaving
/// partial transactions rolled back, and the run is recorded as failed.
pub async fn run(state: &PipelineState, batch_date: NaiveDate) -> Result<BatchSummary> {
    let batch_id = Uuid::new_v4();
    let started_at = Utc::now();
    let hard_deadline = Duration::from_secs(state.config.hard_deadline_seconds);
    let (cancel_tx, cancel_rx) = watch::channel(false);

    tracing::info!(%batch_id, %batch_date, "batch starting");

    let outcome = tokio::time::timeout(
        hard_deadline,
        run_stages(state, batch_id, batch_date, cancel_rx),
    )
    .await;

    match outcome {
        Ok(Ok(summary)) => {
            record_batch_run(&state.db, &summary, started_at, "completed").await?;
            tracing::info!(
                batch_id = %summary.batch_id,
                users_processed = summary.users_processed,
                jobs_scored = summary.jobs_scored,
                picks_written = summary.picks_written,
                queue_rows = summary.queue_rows,
                low_inventory_users = summary.low_inventory_users,
                "batch complete"
            );
            Ok(summary)
        }
        Ok(Err(err)) => {
            record_failure(&state.db, batch_id, batch_date, started_at).await;
            Err(err)
        }
        Err(_elapsed) => {
            let _ = cancel_tx.send(true);
            record_failure(&state.db, batch_id, batch_date, started_at).await;
            Err(PipelineError::DeadlineExceeded(
                state.config.hard_deadline_seconds,
            ))
        }
    }
}

async fn run_stages(
    state: &PipelineState,
    batch_id: Uuid,
    batch_date: NaiveDate,
    cancel: watch::Receiver<bool>,
) -> Result<BatchSummary> {
    let db = state.db.clone();
    let config = Arc::clone(&state.config);
    let now = Utc::now();

    // A: masters — loaded once, read-only for the rest of the run.
    let masters = Arc::new(MasterCache::load(&db).await?);

    // B: ingest. Everything downstream reads the job store it commits.
    let ingest = IngestService::new(db.clone(), Arc::clone(&config), Arc::clone(&masters));
    let stage = StageClock::start("ingest", config.soft_deadlines.ingest);
    let import_stats = ingest.run(batch_id, batch_date, now, cancel.clone()).await?;
    stage.finish(import_stats.read, import_stats.accepted, import_stats.rejected);

    // C ∥ D: popularity and profiles only need actions + the job store.
    let popularity_service = PopularityService::new(db.clone(), Arc::clone(&config));
    let profile_service = ProfileService::new(db.clone(), Arc::clone(&config));

    let popularity_stage = StageClock::start("popularity", config.soft_deadlines.popularity);
    let profile_stage = StageClock::start("profile", config.soft_deadlines.profile);
    let (popularity, (users, profiles)) = tokio::try_join!(
        async {
            popularity_service
                .run(now)
                .await
                .map_err(|e| PipelineError::Scoring(format!("popularity stage: {e}")))
        },
        async {
            profile_service
                .run(now, cancel.clone())
                .await
                .map_err(|e| PipelineError::Matching(format!("profile stage: {e}")))
        },
    )?;
    popularity_stage.finish(popularity.len() as u64, popularity.len() as u64, 0);
    profile_stage.finish(users.len() as u64, profiles.len() as u64, 0);

    // E: scoring requires popularity.
    let scorer = ScorerService::new(db.clone(), Arc::clone(&config), Arc::clone(&masters));
    let stage = StageClock::start("scorer", config.soft_deadlines.scorer);
    let corpus = scorer.run(now, Arc::new(popularity), cancel.clone()).await?;
    let jobs_scored = corpus.enrichments.len() as u64;
    stage.finish(corpus.jobs.len() as u64, jobs_scored, 0);

    // F + G: matching and allocation, one worker per user shard.
    let matcher = MatcherService::new(db.clone(), Arc::clone(&config), Arc::clone(&masters));
    let stage = StageClock::start("matcher", config.soft_deadlines.matcher);
    let users_in = users.len() as u64;
    let match_outcome = matcher
        .run(
            users,
            Arc::new(profiles),
            Arc::new(corpus),
            batch_date,
            cancel.clone(),
        )
        .await?;
    stage.finish(users_in, match_outcome.users_processed, match_outcome.users_skipped);

    // H: queue writer drains after matching.
    let queue = QueueService::new(db.clone());
    let queue_rows = queue
        .run(&match_outcome.summaries, batch_date)
        .await
        .map_err(|e| PipelineError::Matching(format!("queue stage: {e}")))?;

    // Retention: age out old partitions. Non-fatal by design.
    if let Err(err) = retention_sweep(&db, &config, batch_date).await {
        tracing::warn!(error = %err, "retention sweep failed; continuing");
    }

    Ok(BatchSummary {
        batch_id,
        batch_date,
        users_processed: match_outcome.users_processed,
        jobs_scored,
        picks_written: match_outcome.picks_written,
        queue_rows,
        low_inventory_users: match_outcome.low_inventory_users,
    })
}

/// Per-stage wall-clock bookkeeping. A soft-deadline miss is a warning; only
/// the hard total aborts.
struct StageClock {
    stage: &'static str,
    soft_deadline_secs: u64,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl StageClock {
    fn start(stage: &'static str, soft_deadline_secs: u64) -> Self {
        tracing::info!(stage, "stage starting");
        Self {
            stage,
            soft_deadline_secs,
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    fn finish(self, records_in: u64, records_out: u64, rejections: u64) {
        let elapsed = self.started.elapsed();
        if elapsed > Duration::from_secs(self.soft_deadline_secs) {
            tracing::warn!(
                stage = self.stage,
                elapsed_secs = elapsed.as_secs(),
                soft_deadline_secs = self.soft_deadline_secs,
                "stage exceeded its soft deadline"
            );
        }
        tracing::info!(
            stage = self.stage,
            started_at = %self.started_at,
            finished_at = %Utc::now(),
            records_in,
            records_out,
            rejections,
            "stage complete"
        );
    }
}

/// Age out per-batch partitions and old action months.
async fn retention_sweep(
    db: &PgPool,
    config: &Config,
    batch_date: NaiveDate,
) -> std::result::Result<(), sqlx::Error> {
    let partition_cutoff = batch_date - chrono::Duration::days(config.retention_days);

    let mappings = sqlx::query("DELETE FROM user_job_mappings WHERE batch_date < $1")
        .bind(partition_cutoff)
        .execute(db)
        .await?
        .rows_affected();
    let picks = sqlx::query("DELETE FROM daily_job_picks WHERE pick_date < $1")
        .bind(partition_cutoff)
        .execute(db)
        .await?
        .rows_affected();
    let queue = sqlx::query("DELETE FROM daily_email_queue WHERE scheduled_date < $1")
        .bind(partition_cutoff)
        .execute(db)
        .await?
        .rows_affected();

    let action_cutoff = batch_date
        .checked_sub_months(chrono::Months::new(config.action_retention_months as u32))
        .unwrap_or(batch_date);
    let actions = sqlx::query("DELETE FROM user_actions WHERE action_at < $1")
        .bind(action_cutoff.and_hms_opt(0, 0, 0).map(|t| t.and_utc()))
        .execute(db)
        .await?
        .rows_affected();

    tracing::info!(mappings, picks, queue, actions, "retention sweep complete");
    Ok(())
}

async fn record_batch_run(
    db: &PgPool,
    summary: &BatchSummary,
    started_at: DateTime<Utc>,
    status: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO batch_runs (batch_id, batch_date, status, users_processed, jobs_scored, \
         picks_written, queue_rows, low_inventory_users, started_at, finished_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW()) \
         ON CONFLICT (batch_id) DO UPDATE SET \
            status = EXCLUDED.status, \
            users_processed = EXCLUDED.users_processed, \
            jobs_scored = EXCLUDED.jobs_scored, \
            picks_written = EXCLUDED.picks_written, \
            queue_rows = EXCLUDED.queue_rows, \
            low_inventory_users = EXCLUDED.low_inventory_users, \
            finished_at = EXCLUDED.finished_at",
    )
    .bind(summary.batch_id)
    .bind(summary.batch_date)
    .bind(status)
    .bind(summary.users_processed as i64)
    .bind(summary.jobs_scored as i64)
    .bind(summary.picks_written as i64)
    .bind(summary.queue_rows as i64)
    .bind(summary.low_inventory_users as i64)
    .bind(started_at)
    .execute(db)
    .await?;
    Ok(())
}

/// Best-effort failure ledger; the original error is what propagates.
async fn record_failure(
    db: &PgPool,
    batch_id: Uuid,
    batch_date: NaiveDate,
    started_at: DateTime<Utc>,
) {
    let summary = BatchSummary {
        batch_id,
        batch_date,
        users_processed: 0,
        jobs_scored: 0,
        picks_written: 0,
        queue_rows: 0,
        low_inventory_users: 0,
    };
    if let Err(err) = record_batch_run(db, &summary, started_at, "failed").await {
        tracing::error!(error = %err, "failed to record failed batch run");
    }
}
