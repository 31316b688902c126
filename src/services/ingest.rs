use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, QueryBuilder};
use tokio::sync::{mpsc, watch, Mutex};
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::models::job::{DerivedFlags, Job, JobCsvRow};
use crate::services::masters::MasterCache;
use crate::utils::salary;

/// Chunk upsert retry schedule (seconds): 3 attempts with exponential backoff.
const RETRY_DELAYS_SECS: [u64; 3] = [1, 2, 4];

// ============================================================================
// REJECTION REASONS
// ============================================================================

/// Why a CSV row was dropped. Rejections never abort the chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    SchemaInvalid,
    FeeTooLow,
    SalaryBoundsInverted,
    MissingSalaryBound,
    InvalidEndAt,
    Expired,
    UnknownPrefecture,
    UnknownCity,
    InvalidEmploymentType,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::SchemaInvalid => "schema_invalid",
            RejectReason::FeeTooLow => "fee_too_low",
            RejectReason::SalaryBoundsInverted => "salary_bounds_inverted",
            RejectReason::MissingSalaryBound => "missing_salary_bound",
            RejectReason::InvalidEndAt => "invalid_end_at",
            RejectReason::Expired => "expired",
            RejectReason::UnknownPrefecture => "unknown_prefecture",
            RejectReason::UnknownCity => "unknown_city",
            RejectReason::InvalidEmploymentType => "invalid_employment_type",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub job_id: Option<i64>,
    pub reason: RejectReason,
}

/// Ingest contract: counters plus the per-row rejection log.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ImportStats {
    pub read: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub rejections: Vec<Rejection>,
    /// Jobs flipped inactive by the end-of-run sweep
    pub deactivated: u64,
}

impl ImportStats {
    fn merge(&mut self, other: ImportStats) {
        self.read += other.read;
        self.accepted += other.accepted;
        self.rejected += other.rejected;
        self.rejections.extend(other.rejections);
        self.deactivated += other.deactivated;
    }

    fn reject(&mut self, job_id: Option<i64>, reason: RejectReason) {
        self.rejected += 1;
        self.rejections.push(Rejection { job_id, reason });
    }

    pub fn reason_counts(&self) -> HashMap<&'static str, u64> {
        let mut counts = HashMap::new();
        for rejection in &self.rejections {
            *counts.entry(rejection.reason.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

// ============================================================================
// ROW CLEANING
// ============================================================================

fn trimmed(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn trimmed_opt(raw: &Option<String>) -> Option<String> {
    raw.as_deref()
        .map(trimmed)
        .filter(|s| !s.is_empty())
}

/// Feature codes arrive comma-separated; empties between commas are dropped.
pub fn split_feature_codes(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// The feed writes end_at as RFC 3339, as a naive timestamp, or as a bare
/// date (interpreted as midnight UTC).
pub fn parse_end_at(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

/// Validate and normalize one CSV row into a job-store row, or say why not.
pub fn clean_row(
    row: JobCsvRow,
    masters: &MasterCache,
    config: &Config,
    now: DateTime<Utc>,
) -> std::result::Result<Job, RejectReason> {
    if row.validate().is_err() {
        return Err(RejectReason::SchemaInvalid);
    }

    let pref_cd = trimmed(&row.pref_cd);
    let city_cd = trimmed(&row.city_cd);
    if !masters.has_prefecture(&pref_cd) {
        return Err(RejectReason::UnknownPrefecture);
    }
    if !masters.has_city(&city_cd) {
        return Err(RejectReason::UnknownCity);
    }

    if row.fee <= config.fee_min {
        return Err(RejectReason::FeeTooLow);
    }

    if !config.valid_employment_types.contains(&row.employment_type_cd) {
        return Err(RejectReason::InvalidEmploymentType);
    }

    // Salary: blank is fine, but a lone bound is not. The min field may carry
    // a full display range ("¥1,200〜1,500/時") that supplies both bounds and
    // the type at once.
    let min_raw = trimmed_opt(&row.min_salary);
    let max_raw = trimmed_opt(&row.max_salary);
    let type_raw = trimmed_opt(&row.salary_type);

    let parsed_min = min_raw.as_deref().and_then(salary::parse_salary_text);
    let parsed_max = max_raw.as_deref().and_then(salary::parse_amount);

    let (min_salary, max_salary, salary_type) = match (&min_raw, &max_raw) {
        (None, None) => (None, None, None),
        (Some(_), _) => {
            let parsed = parsed_min.ok_or(RejectReason::MissingSalaryBound)?;
            let max = parsed_max.or(parsed.max).ok_or(RejectReason::MissingSalaryBound)?;
            let salary_type = type_raw
                .as_deref()
                .and_then(salary::parse_salary_type)
                .or(parsed.salary_type);
            (Some(parsed.min), Some(max), salary_type)
        }
        (None, Some(_)) => return Err(RejectReason::MissingSalaryBound),
    };

    if let (Some(min), Some(max)) = (min_salary, max_salary) {
        if max < min {
            return Err(RejectReason::SalaryBoundsInverted);
        }
    }

    let end_at = match trimmed_opt(&row.end_at) {
        Some(raw) => Some(parse_end_at(&raw).ok_or(RejectReason::InvalidEndAt)?),
        None => None,
    };
    if let Some(end) = end_at {
        if end <= now {
            return Err(RejectReason::Expired);
        }
    }

    let feature_codes = split_feature_codes(row.feature_codes.as_deref());
    let flags = DerivedFlags::derive(&feature_codes, salary_type, min_salary);

    Ok(Job {
        job_id: row.job_id,
        endcl_cd: trimmed(&row.endcl_cd),
        company_name: trimmed(&row.company_name),
        application_name: trimmed(&row.application_name),
        pref_cd,
        city_cd,
        station_name: trimmed_opt(&row.station_name_eki),
        latitude: row.latitude,
        longitude: row.longitude,
        min_salary,
        max_salary,
        salary_type,
        fee: row.fee,
        hours: trimmed_opt(&row.hours),
        work_days: trimmed_opt(&row.work_days),
        description: trimmed_opt(&row.description),
        benefits: trimmed_opt(&row.benefits),
        occupation_cd1: trimmed(&row.occupation_cd1),
        occupation_cd2: trimmed_opt(&row.occupation_cd2),
        employment_type_cd: row.employment_type_cd,
        feature_codes,
        posting_date: row.posting_date,
        end_at,
        is_active: true,
        has_daily_payment: flags.has_daily_payment,
        has_weekly_payment: flags.has_weekly_payment,
        has_no_experience: flags.has_no_experience,
        has_student_welcome: flags.has_student_welcome,
        has_remote_work: flags.has_remote_work,
        has_transportation: flags.has_transportation,
        has_high_income: flags.has_high_income,
    })
}

// ============================================================================
// INGEST SERVICE
// ============================================================================

struct WorkerOutcome {
    stats: ImportStats,
    seen_job_ids: Vec<i64>,
}

pub struct IngestService {
    db: PgPool,
    config: Arc<Config>,
    masters: Arc<MasterCache>,
}

impl IngestService {
    pub fn new(db: PgPool, config: Arc<Config>, masters: Arc<MasterCache>) -> Self {
        Self { db, config, masters }
    }

    /// Stream the day's CSV through the worker pool, upsert accepted rows,
    /// run the deactivation sweep, and persist the import-batch ledger row.
    pub async fn run(
        &self,
        batch_id: Uuid,
        batch_date: NaiveDate,
        now: DateTime<Utc>,
        cancel: watch::Receiver<bool>,
    ) -> Result<ImportStats> {
        let started_at = Utc::now();
        let outcome = self.run_inner(now, cancel).await;

        match outcome {
            Ok(stats) => {
                self.record_import_batch(batch_id, batch_date, &stats, started_at, "completed")
                    .await?;
                Ok(stats)
            }
            Err(err) => {
                // Best effort: the ledger row should reflect the failure even
                // when the batch is going down.
                if let Err(record_err) = self
                    .record_import_batch(batch_id, batch_date, &ImportStats::default(), started_at, "failed")
                    .await
                {
                    tracing::error!(error = %record_err, "failed to record failed import batch");
                }
                Err(err)
            }
        }
    }

    async fn run_inner(
        &self,
        now: DateTime<Utc>,
        cancel: watch::Receiver<bool>,
    ) -> Result<ImportStats> {
        let workers = self.config.workers_ingest;
        let (tx, rx) = mpsc::channel::<Vec<JobCsvRow>>(2 * workers);
        let rx = Arc::new(Mutex::new(rx));

        let reader = self.spawn_reader(tx, cancel.clone());

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let db = self.db.clone();
            let config = Arc::clone(&self.config);
            let masters = Arc::clone(&self.masters);
            let rx = Arc::clone(&rx);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                ingest_worker(worker_id, db, config, masters, rx, cancel, now).await
            }));
        }
        // Workers hold the only receiver handles: if they all exit, the
        // reader's send fails instead of blocking forever.
        drop(rx);

        let mut stats = reader
            .await
            .map_err(|e| PipelineError::Ingest(format!("csv reader panicked: {e}")))??;

        let mut seen_job_ids: Vec<i64> = Vec::new();
        for handle in handles {
            let outcome = handle
                .await
                .map_err(|e| PipelineError::Ingest(format!("ingest worker panicked: {e}")))??;
            stats.merge(outcome.stats);
            seen_job_ids.extend(outcome.seen_job_ids);
        }

        stats.deactivated = self.deactivate_missing(&seen_job_ids, now).await?;

        tracing::info!(
            read = stats.read,
            accepted = stats.accepted,
            rejected = stats.rejected,
            deactivated = stats.deactivated,
            "ingest complete"
        );
        Ok(stats)
    }

    /// Single reader task: streams the CSV into the bounded chunk queue.
    /// Row-level deserialize failures are rejections; an unreadable file is a
    /// batch failure.
    fn spawn_reader(
        &self,
        tx: mpsc::Sender<Vec<JobCsvRow>>,
        cancel: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<Result<ImportStats>> {
        let path = self.config.jobs_csv_path.clone();
        let batch_size = self.config.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut stats = ImportStats::default();
            let mut reader = csv::ReaderBuilder::new()
                .trim(csv::Trim::All)
                .from_path(&path)?;

            let mut chunk: Vec<JobCsvRow> = Vec::with_capacity(batch_size);
            for record in reader.deserialize::<JobCsvRow>() {
                if *cancel.borrow() {
                    tracing::warn!("ingest reader observed cancellation; stopping early");
                    break;
                }
                stats.read += 1;
                match record {
                    Ok(row) => chunk.push(row),
                    Err(err) => {
                        tracing::debug!(error = %err, "csv row failed to deserialize");
                        stats.reject(None, RejectReason::SchemaInvalid);
                    }
                }
                if chunk.len() >= batch_size {
                    let full = std::mem::replace(&mut chunk, Vec::with_capacity(batch_size));
                    if tx.blocking_send(full).is_err() {
                        // All workers are gone; their error surfaces at join.
                        return Ok(stats);
                    }
                }
            }
            if !chunk.is_empty() {
                let _ = tx.blocking_send(chunk);
            }
            Ok(stats)
        })
    }

    /// Jobs present in the store but absent from this run's CSV, whose end_at
    /// is older than the grace window, are retired.
    async fn deactivate_missing(&self, seen_job_ids: &[i64], now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - chrono::Duration::days(self.config.deactivation_grace_days);
        let result = sqlx::query(
            "UPDATE jobs SET is_active = FALSE, updated_at = NOW() \
             WHERE is_active \
               AND end_at IS NOT NULL \
               AND end_at < $1 \
               AND NOT (job_id = ANY($2))",
        )
        .bind(cutoff)
        .bind(seen_job_ids)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected())
    }

    async fn record_import_batch(
        &self,
        batch_id: Uuid,
        batch_date: NaiveDate,
        stats: &ImportStats,
        started_at: DateTime<Utc>,
        status: &str,
    ) -> Result<()> {
        let reasons = serde_json::to_value(stats.reason_counts())
            .unwrap_or_else(|_| serde_json::json!({}));
        sqlx::query(
            "INSERT INTO import_batches \
                (batch_id, batch_date, read_count, accepted_count, rejected_count, \
                 deactivated_count, rejection_reasons, started_at, finished_at, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), $9) \
             ON CONFLICT (batch_id) DO UPDATE SET \
                read_count = EXCLUDED.read_count, \
                accepted_count = EXCLUDED.accepted_count, \
                rejected_count = EXCLUDED.rejected_count, \
                deactivated_count = EXCLUDED.deactivated_count, \
                rejection_reasons = EXCLUDED.rejection_reasons, \
                finished_at = EXCLUDED.finished_at, \
                status = EXCLUDED.status",
        )
        .bind(batch_id)
        .bind(batch_date)
        .bind(stats.read as i64)
        .bind(stats.accepted as i64)
        .bind(stats.rejected as i64)
        .bind(stats.deactivated as i64)
        .bind(reasons)
        .bind(started_at)
        .bind(status)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

async fn ingest_worker(
    worker_id: usize,
    db: PgPool,
    config: Arc<Config>,
    masters: Arc<MasterCache>,
    rx: Arc<Mutex<mpsc::Receiver<Vec<JobCsvRow>>>>,
    cancel: watch::Receiver<bool>,
    now: DateTime<Utc>,
) -> Result<WorkerOutcome> {
    let mut stats = ImportStats::default();
    let mut seen_job_ids = Vec::new();

    loop {
        if *cancel.borrow() {
            tracing::warn!(worker_id, "ingest worker observed cancellation; exiting");
            break;
        }
        let chunk = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };
        let Some(chunk) = chunk else { break };

        let mut accepted: Vec<Job> = Vec::with_capacity(chunk.len());
        for row in chunk {
            let job_id = row.job_id;
            match clean_row(row, &masters, &config, now) {
                Ok(job) => accepted.push(job),
                Err(reason) => {
                    tracing::debug!(job_id, reason = reason.as_str(), "row rejected");
                    stats.reject(Some(job_id), reason);
                }
            }
        }

        if !accepted.is_empty() {
            upsert_chunk_with_retry(&db, &accepted).await?;
            stats.accepted += accepted.len() as u64;
            seen_job_ids.extend(accepted.iter().map(|j| j.job_id));
        }
    }

    tracing::debug!(
        worker_id,
        accepted = stats.accepted,
        rejected = stats.rejected,
        "ingest worker finished"
    );
    Ok(WorkerOutcome { stats, seen_job_ids })
}

/// A chunk is one transaction; transient failures retry with backoff, then
/// promote to a batch failure.
async fn upsert_chunk_with_retry(db: &PgPool, jobs: &[Job]) -> Result<()> {
    let mut last_err: Option<sqlx::Error> = None;
    for (attempt, delay_secs) in RETRY_DELAYS_SECS.iter().enumerate() {
        match upsert_chunk(db, jobs).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                tracing::warn!(
                    attempt = attempt + 1,
                    error = %err,
                    "chunk upsert failed; backing off {delay_secs}s"
                );
                last_err = Some(err);
                tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
            }
        }
    }
    Err(PipelineError::Ingest(format!(
        "chunk upsert failed after {} attempts: {}",
        RETRY_DELAYS_SECS.len(),
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}

async fn upsert_chunk(db: &PgPool, jobs: &[Job]) -> std::result::Result<(), sqlx::Error> {
    let mut tx = db.begin().await?;

    let mut builder = QueryBuilder::new(
        "INSERT INTO jobs (job_id, endcl_cd, company_name, application_name, pref_cd, city_cd, \
         station_name, latitude, longitude, min_salary, max_salary, salary_type, fee, hours, \
         work_days, description, benefits, occupation_cd1, occupation_cd2, employment_type_cd, \
         feature_codes, posting_date, end_at, is_active, has_daily_payment, has_weekly_payment, \
         has_no_experience, has_student_welcome, has_remote_work, has_transportation, \
         has_high_income) ",
    );
    builder.push_values(jobs, |mut b, job| {
        b.push_bind(job.job_id)
            .push_bind(&job.endcl_cd)
            .push_bind(&job.company_name)
            .push_bind(&job.application_name)
            .push_bind(&job.pref_cd)
            .push_bind(&job.city_cd)
            .push_bind(&job.station_name)
            .push_bind(job.latitude)
            .push_bind(job.longitude)
            .push_bind(job.min_salary)
            .push_bind(job.max_salary)
            .push_bind(job.salary_type)
            .push_bind(job.fee)
            .push_bind(&job.hours)
            .push_bind(&job.work_days)
            .push_bind(&job.description)
            .push_bind(&job.benefits)
            .push_bind(&job.occupation_cd1)
            .push_bind(&job.occupation_cd2)
            .push_bind(job.employment_type_cd)
            .push_bind(&job.feature_codes)
            .push_bind(job.posting_date)
            .push_bind(job.end_at)
            .push_bind(job.is_active)
            .push_bind(job.has_daily_payment)
            .push_bind(job.has_weekly_payment)
            .push_bind(job.has_no_experience)
            .push_bind(job.has_student_welcome)
            .push_bind(job.has_remote_work)
            .push_bind(job.has_transportation)
            .push_bind(job.has_high_income);
    });
    // Re-appearing jobs keep their original posting_date and become active
    // again; everything else reflects the newest row.
    builder.push(
        " ON CONFLICT (job_id) DO UPDATE SET \
         endcl_cd = EXCLUDED.endcl_cd, \
         company_name = EXCLUDED.company_name, \
         application_name = EXCLUDED.application_name, \
         pref_cd = EXCLUDED.pref_cd, \
         city_cd = EXCLUDED.city_cd, \
         station_name = EXCLUDED.station_name, \
         latitude = EXCLUDED.latitude, \
         longitude = EXCLUDED.longitude, \
         min_salary = EXCLUDED.min_salary, \
         max_salary = EXCLUDED.max_salary, \
         salary_type = EXCLUDED.salary_type, \
         fee = EXCLUDED.fee, \
         hours = EXCLUDED.hours, \
         work_days = EXCLUDED.work_days, \
         description = EXCLUDED.description, \
         benefits = EXCLUDED.benefits, \
         occupation_cd1 = EXCLUDED.occupation_cd1, \
         occupation_cd2 = EXCLUDED.occupation_cd2, \
         employment_type_cd = EXCLUDED.employment_type_cd, \
         feature_codes = EXCLUDED.feature_codes, \
         end_at = EXCLUDED.end_at, \
         is_active = TRUE, \
         has_daily_payment = EXCLUDED.has_daily_payment, \
         has_weekly_payment = EXCLUDED.has_weekly_payment, \
         has_no_experience = EXCLUDED.has_no_experience, \
         has_student_welcome = EXCLUDED.has_student_welcome, \
         has_remote_work = EXCLUDED.has_remote_work, \
         has_transportation = EXCLUDED.has_transportation, \
         has_high_income = EXCLUDED.has_high_income, \
         updated_at = NOW()",
    );
    builder.build().execute(&mut *tx).await?;

    tx.commit().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::master::{City, EmploymentType, Prefecture};

    fn masters() -> MasterCache {
        MasterCache::from_parts(
            vec![
                Prefecture {
                    pref_cd: "13".into(),
                    name: "東京都".into(),
                    region: "関東".into(),
                },
                Prefecture {
                    pref_cd: "14".into(),
                    name: "神奈川県".into(),
                    region: "関東".into(),
                },
            ],
            vec![
                City {
                    city_cd: "13101".into(),
                    pref_cd: "13".into(),
                    name: "千代田区".into(),
                    latitude: None,
                    longitude: None,
                    adjacent_city_cds: vec!["13102".into()],
                },
                City {
                    city_cd: "13102".into(),
                    pref_cd: "13".into(),
                    name: "中央区".into(),
                    latitude: None,
                    longitude: None,
                    adjacent_city_cds: vec!["13101".into()],
                },
            ],
            vec![],
            vec![EmploymentType {
                employment_type_cd: 1,
                name: "アルバイト".into(),
            }],
            vec![],
            vec![],
        )
        .unwrap()
    }

    fn config() -> Config {
        Config::with_defaults("postgres://localhost/baito")
    }

    fn row() -> JobCsvRow {
        JobCsvRow {
            job_id: 42,
            endcl_cd: "E123".into(),
            company_name: " テスト 商事 ".into(),
            application_name: "ホールスタッフ募集".into(),
            pref_cd: "13".into(),
            city_cd: "13101".into(),
            station_name_eki: None,
            latitude: None,
            longitude: None,
            min_salary: Some("¥1,200〜1,500/時".into()),
            max_salary: None,
            salary_type: None,
            fee: 2_000,
            hours: Some("10:00-18:00".into()),
            work_days: None,
            occupation_cd1: "100".into(),
            occupation_cd2: None,
            employment_type_cd: 1,
            feature_codes: Some("D01, ,S01,".into()),
            description: None,
            benefits: None,
            posting_date: NaiveDate::from_ymd_opt(2025, 9, 10).unwrap(),
            end_at: None,
        }
    }

    fn now() -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2025, 9, 14)
            .unwrap()
            .and_hms_opt(5, 0, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn display_salary_collapses_into_typed_bounds() {
        let job = clean_row(row(), &masters(), &config(), now()).unwrap();
        assert_eq!(job.min_salary, Some(1_200));
        assert_eq!(job.max_salary, Some(1_500));
        assert_eq!(job.salary_type, Some(crate::models::job::SalaryType::Hourly));
        assert_eq!(job.company_name, "テスト 商事");
        assert_eq!(job.feature_codes, vec!["D01".to_string(), "S01".to_string()]);
        assert!(job.has_daily_payment);
        assert!(job.has_student_welcome);
        assert!(!job.has_high_income);
    }

    #[test]
    fn fee_at_floor_is_rejected_but_one_above_passes() {
        let mut r = row();
        r.fee = 500;
        assert_eq!(
            clean_row(r, &masters(), &config(), now()).unwrap_err(),
            RejectReason::FeeTooLow
        );

        let mut r = row();
        r.fee = 501;
        assert!(clean_row(r, &masters(), &config(), now()).is_ok());
    }

    #[test]
    fn inverted_salary_bounds_are_rejected() {
        let mut r = row();
        r.min_salary = Some("1500".into());
        r.max_salary = Some("1000".into());
        assert_eq!(
            clean_row(r, &masters(), &config(), now()).unwrap_err(),
            RejectReason::SalaryBoundsInverted
        );
    }

    #[test]
    fn lone_salary_bound_is_rejected() {
        let mut r = row();
        r.min_salary = None;
        r.max_salary = Some("1500".into());
        assert_eq!(
            clean_row(r, &masters(), &config(), now()).unwrap_err(),
            RejectReason::MissingSalaryBound
        );

        let mut r = row();
        r.min_salary = Some("1200".into());
        r.max_salary = None;
        assert_eq!(
            clean_row(r, &masters(), &config(), now()).unwrap_err(),
            RejectReason::MissingSalaryBound
        );
    }

    #[test]
    fn blank_salary_is_accepted_as_null() {
        let mut r = row();
        r.min_salary = None;
        r.max_salary = None;
        r.salary_type = None;
        let job = clean_row(r, &masters(), &config(), now()).unwrap();
        assert_eq!(job.min_salary, None);
        assert_eq!(job.max_salary, None);
        assert!(!job.has_high_income);
    }

    #[test]
    fn expired_rows_are_rejected() {
        let mut r = row();
        r.end_at = Some("2025-09-13 00:00:00".into());
        assert_eq!(
            clean_row(r, &masters(), &config(), now()).unwrap_err(),
            RejectReason::Expired
        );
    }

    #[test]
    fn unparseable_end_at_is_rejected() {
        let mut r = row();
        r.end_at = Some("来週まで".into());
        assert_eq!(
            clean_row(r, &masters(), &config(), now()).unwrap_err(),
            RejectReason::InvalidEndAt
        );
    }

    #[test]
    fn unknown_location_codes_are_rejected() {
        let mut r = row();
        r.pref_cd = "47".into();
        assert_eq!(
            clean_row(r, &masters(), &config(), now()).unwrap_err(),
            RejectReason::UnknownPrefecture
        );

        let mut r = row();
        r.city_cd = "13999".into();
        assert_eq!(
            clean_row(r, &masters(), &config(), now()).unwrap_err(),
            RejectReason::UnknownCity
        );
    }

    #[test]
    fn non_whitelisted_employment_type_is_rejected() {
        let mut r = row();
        r.employment_type_cd = 2;
        assert_eq!(
            clean_row(r, &masters(), &config(), now()).unwrap_err(),
            RejectReason::InvalidEmploymentType
        );
    }

    #[test]
    fn end_at_formats_parse() {
        assert!(parse_end_at("2025-10-01T12:00:00+09:00").is_some());
        assert!(parse_end_at("2025-10-01 12:00:00").is_some());
        assert!(parse_end_at("2025-10-01").is_some());
        assert!(parse_end_at("soon").is_none());
    }

    #[test]
    fn distinct_reason_codes_per_scenario() {
        let mut stats = ImportStats::default();
        stats.reject(Some(1), RejectReason::FeeTooLow);
        stats.reject(Some(2), RejectReason::SalaryBoundsInverted);
        stats.reject(Some(3), RejectReason::FeeTooLow);
        let counts = stats.reason_counts();
        assert_eq!(counts["fee_too_low"], 2);
        assert_eq!(counts["salary_bounds_inverted"], 1);
        assert_eq!(stats.rejected, 3);
    }
}
