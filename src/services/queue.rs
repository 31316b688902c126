use chrono::NaiveDate;
use sqlx::{PgPool, QueryBuilder};

use crate::error::Result;
use crate::services::matcher::UserPickSummary;

/// Queue rows are upserted in chunks this big.
const WRITE_CHUNK: usize = 200;

/// Expanded by the external renderer; the pipeline only commits to the
/// placeholders.
const SUBJECT_TEMPLATE: &str =
    "{{user_name}}さん向け｜{{pick_date}}のおすすめバイト{{pick_count}}件";

const TEMPLATE_VERSION: &str = "v1";
const GENERATOR_NAME: &str = "baito-match";

pub struct QueueService {
    db: PgPool,
}

impl QueueService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// One delivery row per matched user, idempotent per
    /// (user_id, scheduled_date). Users skipped by the matcher never appear
    /// here, so they get no row.
    pub async fn run(
        &self,
        summaries: &[UserPickSummary],
        scheduled_date: NaiveDate,
    ) -> Result<u64> {
        let mut written = 0u64;

        for chunk in summaries.chunks(WRITE_CHUNK) {
            let mut builder = QueryBuilder::new(
                "INSERT INTO daily_email_queue (user_id, scheduled_date, subject_template, \
                 recipient, pick_job_ids, generator_meta, status, retry_count, low_inventory, \
                 generated_at) ",
            );
            builder.push_values(chunk, |mut b, summary| {
                // Picks arrive in section order from the allocator.
                let pick_job_ids: Vec<i64> = summary.picks.iter().map(|p| p.job_id).collect();
                let meta = serde_json::json!({
                    "generator": GENERATOR_NAME,
                    "template_version": TEMPLATE_VERSION,
                    "fallback_used": summary.fallback_used,
                    "pick_count": summary.picks.len(),
                });
                b.push_bind(summary.user_id)
                    .push_bind(scheduled_date)
                    .push_bind(SUBJECT_TEMPLATE)
                    .push_bind(&summary.contact_token)
                    .push_bind(pick_job_ids)
                    .push_bind(meta)
                    .push_bind(crate::models::picks::QueueStatus::Pending)
                    .push_bind(0i32)
                    .push_bind(summary.low_inventory)
                    .push_bind(chrono::Utc::now());
            });
            builder.push(
                " ON CONFLICT (user_id, scheduled_date) DO UPDATE SET \
                 subject_template = EXCLUDED.subject_template, \
                 recipient = EXCLUDED.recipient, \
                 pick_job_ids = EXCLUDED.pick_job_ids, \
                 generator_meta = EXCLUDED.generator_meta, \
                 status = EXCLUDED.status, \
                 retry_count = EXCLUDED.retry_count, \
                 low_inventory = EXCLUDED.low_inventory, \
                 generated_at = EXCLUDED.generated_at",
            );
            let result = builder.build().execute(&self.db).await?;
            written += result.rows_affected();
        }

        tracing::info!(queue_rows = written, "delivery queue written");
        Ok(written)
    }
}
