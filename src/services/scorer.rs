use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, QueryBuilder};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::models::enrichment::{EmployerPopularity, JobEnrichment, NeedsCategory};
use crate::models::job::Job;
use crate::models::master::SeoKeyword;
use crate::services::masters::MasterCache;

// ============================================================================
// SCORE WEIGHTS
// ============================================================================

const BASIC_WAGE_WEIGHT: f64 = 0.40;
const BASIC_FEE_WEIGHT: f64 = 0.30;
const BASIC_POPULARITY_WEIGHT: f64 = 0.30;

pub const COMPOSITE_BASIC_WEIGHT: f64 = 0.3;
pub const COMPOSITE_SEO_WEIGHT: f64 = 0.2;
pub const COMPOSITE_PERSONALIZED_WEIGHT: f64 = 0.5;

/// Unknown employers score this instead of 0; a brand-new employer is not
/// evidence of a bad one.
const UNKNOWN_EMPLOYER_POPULARITY: f64 = 30.0;

/// At most this many distinct matched keywords count toward the SEO score.
const SEO_MAX_KEYWORDS: usize = 7;

const SEO_TITLE_WEIGHT: f64 = 1.5;
const SEO_COMPANY_WEIGHT: f64 = 1.5;
const SEO_SALARY_WEIGHT: f64 = 0.3;
const SEO_HOURS_WEIGHT: f64 = 0.3;
const SEO_STATION_WEIGHT: f64 = 0.5;
const SEO_FEATURES_WEIGHT: f64 = 0.8;

/// Enrichment rows are upserted in chunks this big.
const WRITE_CHUNK: usize = 500;

// ============================================================================
// AREA SALARY STATS
// ============================================================================

/// Salary distribution of one area's eligible jobs (midpoints, yen).
#[derive(Debug, Clone, Copy)]
pub struct SalaryBand {
    pub min: f64,
    pub max: f64,
    /// Top-quartile boundary, used by the high-income widening fallback
    pub p75: f64,
    pub count: usize,
}

fn band_of(mut salaries: Vec<f64>) -> Option<SalaryBand> {
    if salaries.is_empty() {
        return None;
    }
    salaries.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let count = salaries.len();
    let p75_index = ((count as f64) * 0.75).ceil() as usize;
    let p75 = salaries[p75_index.saturating_sub(1).min(count - 1)];
    Some(SalaryBand {
        min: salaries[0],
        max: salaries[count - 1],
        p75,
        count,
    })
}

/// Per-(pref, city) salary bands with pref-level and national fallbacks for
/// thin areas.
pub struct AreaSalaryStats {
    by_city: HashMap<(String, String), SalaryBand>,
    by_pref: HashMap<String, SalaryBand>,
    national: Option<SalaryBand>,
    min_area_jobs: usize,
}

impl AreaSalaryStats {
    pub fn build(jobs: &[Job], min_area_jobs: usize) -> Self {
        let mut city_salaries: HashMap<(String, String), Vec<f64>> = HashMap::new();
        let mut pref_salaries: HashMap<String, Vec<f64>> = HashMap::new();
        let mut national_salaries: Vec<f64> = Vec::new();

        for job in jobs {
            let Some(avg) = job.avg_salary() else { continue };
            city_salaries
                .entry((job.pref_cd.clone(), job.city_cd.clone()))
                .or_default()
                .push(avg);
            pref_salaries
                .entry(job.pref_cd.clone())
                .or_default()
                .push(avg);
            national_salaries.push(avg);
        }

        Self {
            by_city: city_salaries
                .into_iter()
                .filter_map(|(k, v)| band_of(v).map(|b| (k, b)))
                .collect(),
            by_pref: pref_salaries
                .into_iter()
                .filter_map(|(k, v)| band_of(v).map(|b| (k, b)))
                .collect(),
            national: band_of(national_salaries),
            min_area_jobs,
        }
    }

    /// City band when it is thick enough, then pref, then national.
    pub fn band_for(&self, pref_cd: &str, city_cd: &str) -> Option<SalaryBand> {
        if let Some(band) = self
            .by_city
            .get(&(pref_cd.to_string(), city_cd.to_string()))
        {
            if band.count >= self.min_area_jobs {
                return Some(*band);
            }
        }
        if let Some(band) = self.by_pref.get(pref_cd) {
            if band.count >= self.min_area_jobs {
                return Some(*band);
            }
        }
        self.national
    }
}

// ============================================================================
// SCORE COMPONENTS
// ============================================================================

fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}

/// Where the job's salary midpoint sits within its area's band. Jobs without
/// salary (or areas without a band) are neutral.
pub fn wage_component(job: &Job, area_stats: &AreaSalaryStats) -> f64 {
    let Some(avg) = job.avg_salary() else { return 50.0 };
    let Some(band) = area_stats.band_for(&job.pref_cd, &job.city_cd) else {
        return 50.0;
    };
    if band.max <= band.min {
        return 50.0;
    }
    clamp_score(100.0 * (avg - band.min) / (band.max - band.min))
}

/// Piecewise linear over the bid: 0 at the floor, 100 at the ceiling.
pub fn fee_component(fee: i32, config: &Config) -> f64 {
    let floor = config.fee_min as f64;
    let ceiling = config.fee_max as f64;
    clamp_score(100.0 * (fee as f64 - floor) / (ceiling - floor))
}

fn employer_component(
    endcl_cd: &str,
    popularity: &HashMap<String, EmployerPopularity>,
) -> f64 {
    popularity
        .get(endcl_cd)
        .map(|p| p.popularity_score)
        .unwrap_or(UNKNOWN_EMPLOYER_POPULARITY)
}

pub fn basic_score(
    job: &Job,
    area_stats: &AreaSalaryStats,
    popularity: &HashMap<String, EmployerPopularity>,
    config: &Config,
) -> f64 {
    clamp_score(
        BASIC_WAGE_WEIGHT * wage_component(job, area_stats)
            + BASIC_FEE_WEIGHT * fee_component(job.fee, config)
            + BASIC_POPULARITY_WEIGHT * employer_component(&job.endcl_cd, popularity),
    )
}

/// Weighted keyword coverage over the job's text fields. A keyword counts
/// once, at the weight of the strongest field containing it; only the first
/// `SEO_MAX_KEYWORDS` matched keywords (in master order) contribute.
pub fn seo_score(job: &Job, keywords: &[SeoKeyword]) -> f64 {
    let title = job.application_name.to_lowercase();
    let company = job.company_name.to_lowercase();
    let salary = job.salary_text().to_lowercase();
    let hours = job.hours.as_deref().unwrap_or("").to_lowercase();
    let station = job.station_name.as_deref().unwrap_or("").to_lowercase();
    let features = job.feature_codes.join(",").to_lowercase();

    let fields = [
        (title.as_str(), SEO_TITLE_WEIGHT),
        (company.as_str(), SEO_COMPANY_WEIGHT),
        (salary.as_str(), SEO_SALARY_WEIGHT),
        (hours.as_str(), SEO_HOURS_WEIGHT),
        (station.as_str(), SEO_STATION_WEIGHT),
        (features.as_str(), SEO_FEATURES_WEIGHT),
    ];

    let mut matched = 0usize;
    let mut total = 0.0;
    for keyword in keywords {
        if matched >= SEO_MAX_KEYWORDS {
            break;
        }
        let needle = keyword.keyword.to_lowercase();
        if needle.is_empty() {
            continue;
        }
        let field_weight = fields
            .iter()
            .filter(|(text, _)| !text.is_empty() && text.contains(&needle))
            .map(|(_, weight)| *weight)
            .fold(0.0, f64::max);
        if field_weight > 0.0 {
            matched += 1;
            total += keyword.base_points() * field_weight;
        }
    }
    clamp_score(total)
}

/// Population-level conversion signal: does anyone actually apply from this
/// posting, regardless of who is looking.
pub fn personalized_base(applications_30d: i64, clicks_30d: i64, config: &Config) -> f64 {
    let signal = applications_30d as f64 + 0.2 * clicks_30d as f64;
    clamp_score(100.0 * (signal / config.personalized_k).min(1.0))
}

pub fn composite_score(basic: f64, seo: f64, personalized: f64) -> f64 {
    COMPOSITE_BASIC_WEIGHT * basic
        + COMPOSITE_SEO_WEIGHT * seo
        + COMPOSITE_PERSONALIZED_WEIGHT * personalized
}

// ============================================================================
// PURE SCORING CORE
// ============================================================================

/// Rolling 30-day engagement counters for one job.
#[derive(Debug, Clone, Copy, Default)]
pub struct Engagement30d {
    pub views: i64,
    pub clicks: i64,
    pub applications: i64,
}

pub struct ScoreContext<'a> {
    pub popularity: &'a HashMap<String, EmployerPopularity>,
    pub area_stats: &'a AreaSalaryStats,
    pub keywords: &'a [SeoKeyword],
    pub engagement: &'a HashMap<i64, Engagement30d>,
    pub config: &'a Config,
}

pub fn score_job(job: &Job, ctx: &ScoreContext) -> JobEnrichment {
    let engagement = ctx.engagement.get(&job.job_id).copied().unwrap_or_default();

    let basic = basic_score(job, ctx.area_stats, ctx.popularity, ctx.config);
    let seo = seo_score(job, ctx.keywords);
    let personalized = personalized_base(engagement.applications, engagement.clicks, ctx.config);

    JobEnrichment {
        job_id: job.job_id,
        basic_score: basic,
        seo_score: seo,
        personalized_score_base: personalized,
        composite_score: composite_score(basic, seo, personalized),
        needs_categories: NeedsCategory::for_job(job),
        views_30d: engagement.views,
        clicks_30d: engagement.clicks,
        applications_30d: engagement.applications,
        needs_recalculation: false,
    }
}

// ============================================================================
// SCORED CORPUS
// ============================================================================

/// The day's eligible jobs with their enrichment, shared read-only by the
/// matcher workers.
pub struct ScoredCorpus {
    pub jobs: Vec<Job>,
    pub enrichments: HashMap<i64, JobEnrichment>,
    pub area_stats: AreaSalaryStats,
}

impl ScoredCorpus {
    pub fn enrichment(&self, job_id: i64) -> Option<&JobEnrichment> {
        self.enrichments.get(&job_id)
    }
}

// ============================================================================
// SCORER SERVICE
// ============================================================================

#[derive(Debug, Clone, FromRow)]
struct EngagementRow {
    job_id: i64,
    views_30d: i64,
    clicks_30d: i64,
    applications_30d: i64,
}

pub struct ScorerService {
    db: PgPool,
    config: Arc<Config>,
    masters: Arc<MasterCache>,
}

impl ScorerService {
    pub fn new(db: PgPool, config: Arc<Config>, masters: Arc<MasterCache>) -> Self {
        Self { db, config, masters }
    }

    /// Score every eligible job, persist the enrichment table, and hand the
    /// in-memory corpus to the matcher.
    pub async fn run(
        &self,
        now: DateTime<Utc>,
        popularity: Arc<HashMap<String, EmployerPopularity>>,
        cancel: watch::Receiver<bool>,
    ) -> Result<ScoredCorpus> {
        let jobs = self.load_eligible_jobs(now).await?;
        let engagement = Arc::new(self.load_engagement(now).await?);
        let area_stats = Arc::new(AreaSalaryStats::build(&jobs, self.config.area_min_jobs));
        let jobs = Arc::new(jobs);
        let keywords: Arc<Vec<SeoKeyword>> = Arc::new(self.masters.keywords().to_vec());

        let workers = self.config.workers_score;
        let mut set: JoinSet<Vec<JobEnrichment>> = JoinSet::new();

        for shard in 0..workers {
            let jobs = Arc::clone(&jobs);
            let engagement = Arc::clone(&engagement);
            let area_stats = Arc::clone(&area_stats);
            let keywords = Arc::clone(&keywords);
            let popularity = Arc::clone(&popularity);
            let config = Arc::clone(&self.config);
            let cancel = cancel.clone();
            set.spawn_blocking(move || {
                let ctx = ScoreContext {
                    popularity: &popularity,
                    area_stats: &area_stats,
                    keywords: keywords.as_slice(),
                    engagement: &engagement,
                    config: &config,
                };
                let mut out = Vec::new();
                for job in jobs
                    .iter()
                    .filter(|j| (j.job_id.unsigned_abs() as usize) % workers == shard)
                {
                    if *cancel.borrow() {
                        tracing::warn!(shard, "scorer worker observed cancellation; exiting");
                        break;
                    }
                    out.push(score_job(job, &ctx));
                }
                out
            });
        }

        let mut enrichments: HashMap<i64, JobEnrichment> = HashMap::with_capacity(jobs.len());
        while let Some(joined) = set.join_next().await {
            let shard_rows = joined
                .map_err(|e| PipelineError::Scoring(format!("scorer worker panicked: {e}")))?;
            for enrichment in shard_rows {
                enrichments.insert(enrichment.job_id, enrichment);
            }
        }

        self.persist(&enrichments)
            .await
            .map_err(|e| PipelineError::Scoring(format!("enrichment write failed: {e}")))?;

        tracing::info!(jobs_scored = enrichments.len(), "scoring complete");

        let jobs = Arc::try_unwrap(jobs).unwrap_or_else(|arc| (*arc).clone());
        let area_stats =
            Arc::try_unwrap(area_stats).unwrap_or_else(|_| AreaSalaryStats::build(&jobs, self.config.area_min_jobs));
        Ok(ScoredCorpus {
            jobs,
            enrichments,
            area_stats,
        })
    }

    async fn load_eligible_jobs(&self, now: DateTime<Utc>) -> Result<Vec<Job>> {
        let jobs: Vec<Job> = sqlx::query_as(
            "SELECT job_id, endcl_cd, company_name, application_name, pref_cd, city_cd, \
                    station_name, latitude, longitude, min_salary, max_salary, salary_type, fee, \
                    hours, work_days, description, benefits, occupation_cd1, occupation_cd2, \
                    employment_type_cd, feature_codes, posting_date, end_at, is_active, \
                    has_daily_payment, has_weekly_payment, has_no_experience, has_student_welcome, \
                    has_remote_work, has_transportation, has_high_income \
             FROM jobs \
             WHERE is_active \
               AND fee > $1 \
               AND employment_type_cd = ANY($2) \
               AND (end_at IS NULL OR end_at > $3)",
        )
        .bind(self.config.fee_min)
        .bind(&self.config.valid_employment_types)
        .bind(now)
        .fetch_all(&self.db)
        .await?;
        Ok(jobs)
    }

    async fn load_engagement(&self, now: DateTime<Utc>) -> Result<HashMap<i64, Engagement30d>> {
        let window_start = now - chrono::Duration::days(30);
        let rows: Vec<EngagementRow> = sqlx::query_as(
            "SELECT job_id, \
                COUNT(*) FILTER (WHERE action_type = 'view') AS views_30d, \
                COUNT(*) FILTER (WHERE action_type = 'click') AS clicks_30d, \
                COUNT(*) FILTER (WHERE action_type IN ('apply', 'application')) AS applications_30d \
             FROM user_actions \
             WHERE job_id IS NOT NULL AND action_at >= $1 \
             GROUP BY job_id",
        )
        .bind(window_start)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    r.job_id,
                    Engagement30d {
                        views: r.views_30d,
                        clicks: r.clicks_30d,
                        applications: r.applications_30d,
                    },
                )
            })
            .collect())
    }

    async fn persist(&self, enrichments: &HashMap<i64, JobEnrichment>) -> Result<()> {
        let rows: Vec<&JobEnrichment> = enrichments.values().collect();
        for chunk in rows.chunks(WRITE_CHUNK) {
            let mut builder = QueryBuilder::new(
                "INSERT INTO job_enrichment (job_id, basic_score, seo_score, \
                 personalized_score_base, composite_score, needs_categories, views_30d, \
                 clicks_30d, applications_30d, needs_recalculation) ",
            );
            builder.push_values(chunk, |mut b, e| {
                let categories: Vec<String> = e
                    .needs_categories
                    .iter()
                    .map(|c| c.as_str().to_string())
                    .collect();
                b.push_bind(e.job_id)
                    .push_bind(e.basic_score)
                    .push_bind(e.seo_score)
                    .push_bind(e.personalized_score_base)
                    .push_bind(e.composite_score)
                    .push_bind(categories)
                    .push_bind(e.views_30d)
                    .push_bind(e.clicks_30d)
                    .push_bind(e.applications_30d)
                    .push_bind(e.needs_recalculation);
            });
            builder.push(
                " ON CONFLICT (job_id) DO UPDATE SET \
                 basic_score = EXCLUDED.basic_score, \
                 seo_score = EXCLUDED.seo_score, \
                 personalized_score_base = EXCLUDED.personalized_score_base, \
                 composite_score = EXCLUDED.composite_score, \
                 needs_categories = EXCLUDED.needs_categories, \
                 views_30d = EXCLUDED.views_30d, \
                 clicks_30d = EXCLUDED.clicks_30d, \
                 applications_30d = EXCLUDED.applications_30d, \
                 needs_recalculation = FALSE, \
                 updated_at = NOW()",
            );
            builder.build().execute(&self.db).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::SalaryType;
    use chrono::NaiveDate;

    fn config() -> Config {
        Config::with_defaults("postgres://localhost/baito")
    }

    fn job(job_id: i64, city_cd: &str, min: i32, max: i32) -> Job {
        Job {
            job_id,
            endcl_cd: format!("E{job_id}"),
            company_name: "株式会社サンプル".to_string(),
            application_name: "カフェ ホールスタッフ".to_string(),
            pref_cd: "13".to_string(),
            city_cd: city_cd.to_string(),
            station_name: Some("新宿駅".to_string()),
            latitude: None,
            longitude: None,
            min_salary: Some(min),
            max_salary: Some(max),
            salary_type: Some(SalaryType::Hourly),
            fee: 2_750,
            hours: Some("9:00-17:00".to_string()),
            work_days: None,
            description: None,
            benefits: None,
            occupation_cd1: "100".to_string(),
            occupation_cd2: None,
            employment_type_cd: 1,
            feature_codes: vec!["D01".to_string()],
            posting_date: NaiveDate::from_ymd_opt(2025, 9, 10).unwrap(),
            end_at: None,
            is_active: true,
            has_daily_payment: true,
            has_weekly_payment: false,
            has_no_experience: false,
            has_student_welcome: false,
            has_remote_work: false,
            has_transportation: false,
            has_high_income: false,
        }
    }

    fn keyword(text: &str, volume: i64) -> SeoKeyword {
        SeoKeyword {
            keyword: text.to_string(),
            search_volume: volume,
            difficulty: None,
            category: None,
        }
    }

    #[test]
    fn fee_component_is_piecewise_linear() {
        let cfg = config();
        assert_eq!(fee_component(500, &cfg), 0.0);
        assert_eq!(fee_component(400, &cfg), 0.0);
        assert_eq!(fee_component(5_000, &cfg), 100.0);
        assert_eq!(fee_component(6_000, &cfg), 100.0);
        assert!((fee_component(2_750, &cfg) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn wage_component_interpolates_within_area_band() {
        // 25 jobs spanning 1000..=1480, so the city band is used directly.
        let jobs: Vec<Job> = (0..25)
            .map(|i| job(i, "13101", 1_000 + i as i32 * 20, 1_000 + i as i32 * 20))
            .collect();
        let stats = AreaSalaryStats::build(&jobs, 20);

        let bottom = job(100, "13101", 1_000, 1_000);
        let top = job(101, "13101", 1_480, 1_480);
        assert_eq!(wage_component(&bottom, &stats), 0.0);
        assert_eq!(wage_component(&top, &stats), 100.0);

        let above = job(102, "13101", 2_000, 2_000);
        assert_eq!(wage_component(&above, &stats), 100.0);
    }

    #[test]
    fn thin_city_falls_back_to_pref_then_national() {
        // 13101 has only 2 jobs; pref 13 has 25 via 13102.
        let mut jobs: Vec<Job> = (0..25)
            .map(|i| job(i, "13102", 1_000, 1_000 + i as i32 * 40))
            .collect();
        jobs.push(job(100, "13101", 1_200, 1_200));
        jobs.push(job(101, "13101", 1_300, 1_300));

        let stats = AreaSalaryStats::build(&jobs, 20);
        let band = stats.band_for("13", "13101").unwrap();
        assert!(band.count >= 20);

        // An unknown pref lands on the national band.
        assert!(stats.band_for("47", "47201").is_some());
    }

    #[test]
    fn missing_salary_is_neutral() {
        let jobs = vec![job(1, "13101", 1_000, 1_200)];
        let stats = AreaSalaryStats::build(&jobs, 20);
        let mut no_salary = job(2, "13101", 0, 0);
        no_salary.min_salary = None;
        no_salary.max_salary = None;
        assert_eq!(wage_component(&no_salary, &stats), 50.0);
    }

    #[test]
    fn unknown_employer_defaults_to_30() {
        let popularity = HashMap::new();
        assert_eq!(employer_component("E404", &popularity), 30.0);
    }

    #[test]
    fn personalized_base_saturates_at_k() {
        let cfg = config();
        assert_eq!(personalized_base(0, 0, &cfg), 0.0);
        // 40 + 0.2·50 = 50 = k
        assert!((personalized_base(40, 50, &cfg) - 100.0).abs() < 1e-9);
        assert_eq!(personalized_base(500, 500, &cfg), 100.0);
        // 10 + 0.2·25 = 15 → 30
        assert!((personalized_base(10, 25, &cfg) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn composite_is_the_stated_weighted_sum() {
        let composite = composite_score(80.0, 50.0, 60.0);
        assert!((composite - (0.3 * 80.0 + 0.2 * 50.0 + 0.5 * 60.0)).abs() < 1e-6);
    }

    #[test]
    fn seo_matches_strongest_field_once_per_keyword() {
        let j = job(1, "13101", 1_200, 1_500);
        // "カフェ" appears in the title (weight 1.5), volume ≥ 10K → 15 pts
        let score = seo_score(&j, &[keyword("カフェ", 12_000)]);
        assert!((score - 22.5).abs() < 1e-9);

        // station-only match uses the station weight
        let score = seo_score(&j, &[keyword("新宿", 12_000)]);
        assert!((score - 7.5).abs() < 1e-9);
    }

    #[test]
    fn seo_counts_at_most_seven_keywords() {
        let j = job(1, "13101", 1_200, 1_500);
        // 10 keywords that all match the title at 15·1.5 = 22.5 each; capped
        // at 7 matches and then clamped to 100.
        let keywords: Vec<SeoKeyword> = (0..10).map(|_| keyword("カフェ", 12_000)).collect();
        let score = seo_score(&j, &keywords);
        assert_eq!(score, 100.0);
    }

    #[test]
    fn seo_ignores_unmatched_keywords() {
        let j = job(1, "13101", 1_200, 1_500);
        let score = seo_score(&j, &[keyword("居酒屋", 12_000)]);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn score_job_is_deterministic_and_bounded() {
        let jobs: Vec<Job> = (0..25).map(|i| job(i, "13101", 1_000, 1_500)).collect();
        let stats = AreaSalaryStats::build(&jobs, 20);
        let popularity = HashMap::new();
        let engagement = HashMap::from([(
            1i64,
            Engagement30d {
                views: 100,
                clicks: 50,
                applications: 10,
            },
        )]);
        let cfg = config();
        let keywords = vec![keyword("カフェ", 12_000)];
        let ctx = ScoreContext {
            popularity: &popularity,
            area_stats: &stats,
            keywords: &keywords,
            engagement: &engagement,
            config: &cfg,
        };

        let a = score_job(&jobs[1], &ctx);
        let b = score_job(&jobs[1], &ctx);
        assert_eq!(a.basic_score, b.basic_score);
        assert_eq!(a.seo_score, b.seo_score);
        assert_eq!(a.composite_score, b.composite_score);

        for score in [a.basic_score, a.seo_score, a.personalized_score_base] {
            assert!((0.0..=100.0).contains(&score));
        }
        let expected = COMPOSITE_BASIC_WEIGHT * a.basic_score
            + COMPOSITE_SEO_WEIGHT * a.seo_score
            + COMPOSITE_PERSONALIZED_WEIGHT * a.personalized_score_base;
        assert!((a.composite_score - expected).abs() < 1e-6);
    }
}
