use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, QueryBuilder};

use crate::config::Config;
use crate::error::Result;
use crate::models::enrichment::EmployerPopularity;

/// Employers are upserted in chunks this big.
const WRITE_CHUNK: usize = 500;

/// Raw window counts for one employer, straight from the aggregation scan.
#[derive(Debug, Clone, Default, FromRow)]
pub struct PopularityCounts {
    pub endcl_cd: String,
    pub total_views: i64,
    pub total_clicks: i64,
    pub total_applications: i64,
    pub views_7d: i64,
    pub clicks_7d: i64,
    pub applications_7d: i64,
    pub views_30d: i64,
    pub clicks_30d: i64,
    pub applications_30d: i64,
    pub views_360d: i64,
    pub clicks_360d: i64,
    pub applications_360d: i64,
}

/// Saturating blend of quality (application rate) and volume (application
/// count), normalized to 0-100. The tunables are configuration; the shape is
/// the contract.
pub fn popularity_score(application_rate: f64, applications_360d: i64, config: &Config) -> f64 {
    let rate_cap = config.popularity_rate_cap;
    let w_rate = config.popularity_rate_weight;

    let rate_term = (application_rate.clamp(0.0, rate_cap)) / rate_cap;
    let volume_term =
        (applications_360d as f64 / config.popularity_volume_cap as f64).min(1.0);

    100.0 * w_rate * rate_term + 100.0 * (1.0 - w_rate) * volume_term
}

/// Turn raw counts into the persisted aggregate.
pub fn finalize(counts: PopularityCounts, config: &Config) -> EmployerPopularity {
    let application_rate =
        counts.applications_360d as f64 / (counts.clicks_360d.max(1)) as f64;
    let score = popularity_score(application_rate, counts.applications_360d, config);

    EmployerPopularity {
        endcl_cd: counts.endcl_cd,
        total_views: counts.total_views,
        total_clicks: counts.total_clicks,
        total_applications: counts.total_applications,
        views_7d: counts.views_7d,
        clicks_7d: counts.clicks_7d,
        applications_7d: counts.applications_7d,
        views_30d: counts.views_30d,
        clicks_30d: counts.clicks_30d,
        applications_30d: counts.applications_30d,
        views_360d: counts.views_360d,
        clicks_360d: counts.clicks_360d,
        applications_360d: counts.applications_360d,
        application_rate,
        popularity_score: score,
    }
}

pub struct PopularityService {
    db: PgPool,
    config: Arc<Config>,
}

impl PopularityService {
    pub fn new(db: PgPool, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    /// One scan over the action window, grouped by employer. Returns the map
    /// the scorer consumes and persists it for downstream consumers.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<HashMap<String, EmployerPopularity>> {
        let window_start = now - chrono::Duration::days(self.config.popularity_window_days);
        let d7 = now - chrono::Duration::days(7);
        let d30 = now - chrono::Duration::days(30);

        let rows: Vec<PopularityCounts> = sqlx::query_as(
            "SELECT endcl_cd, \
                COUNT(*) FILTER (WHERE action_type = 'view') AS total_views, \
                COUNT(*) FILTER (WHERE action_type = 'click') AS total_clicks, \
                COUNT(*) FILTER (WHERE action_type IN ('apply', 'application')) AS total_applications, \
                COUNT(*) FILTER (WHERE action_type = 'view' AND action_at >= $2) AS views_7d, \
                COUNT(*) FILTER (WHERE action_type = 'click' AND action_at >= $2) AS clicks_7d, \
                COUNT(*) FILTER (WHERE action_type IN ('apply', 'application') AND action_at >= $2) AS applications_7d, \
                COUNT(*) FILTER (WHERE action_type = 'view' AND action_at >= $3) AS views_30d, \
                COUNT(*) FILTER (WHERE action_type = 'click' AND action_at >= $3) AS clicks_30d, \
                COUNT(*) FILTER (WHERE action_type IN ('apply', 'application') AND action_at >= $3) AS applications_30d, \
                COUNT(*) FILTER (WHERE action_type = 'view' AND action_at >= $1) AS views_360d, \
                COUNT(*) FILTER (WHERE action_type = 'click' AND action_at >= $1) AS clicks_360d, \
                COUNT(*) FILTER (WHERE action_type IN ('apply', 'application') AND action_at >= $1) AS applications_360d \
             FROM user_actions \
             WHERE endcl_cd IS NOT NULL AND action_at >= $1 \
             GROUP BY endcl_cd",
        )
        .bind(window_start)
        .bind(d7)
        .bind(d30)
        .fetch_all(&self.db)
        .await?;

        let map: HashMap<String, EmployerPopularity> = rows
            .into_iter()
            .map(|counts| {
                let popularity = finalize(counts, &self.config);
                (popularity.endcl_cd.clone(), popularity)
            })
            .collect();

        self.persist(&map).await?;

        tracing::info!(employers = map.len(), "popularity aggregation complete");
        Ok(map)
    }

    async fn persist(&self, map: &HashMap<String, EmployerPopularity>) -> Result<()> {
        let rows: Vec<&EmployerPopularity> = map.values().collect();
        for chunk in rows.chunks(WRITE_CHUNK) {
            let mut builder = QueryBuilder::new(
                "INSERT INTO employer_popularity (endcl_cd, total_views, total_clicks, \
                 total_applications, views_7d, clicks_7d, applications_7d, views_30d, \
                 clicks_30d, applications_30d, views_360d, clicks_360d, applications_360d, \
                 application_rate, popularity_score) ",
            );
            builder.push_values(chunk, |mut b, p| {
                b.push_bind(&p.endcl_cd)
                    .push_bind(p.total_views)
                    .push_bind(p.total_clicks)
                    .push_bind(p.total_applications)
                    .push_bind(p.views_7d)
                    .push_bind(p.clicks_7d)
                    .push_bind(p.applications_7d)
                    .push_bind(p.views_30d)
                    .push_bind(p.clicks_30d)
                    .push_bind(p.applications_30d)
                    .push_bind(p.views_360d)
                    .push_bind(p.clicks_360d)
                    .push_bind(p.applications_360d)
                    .push_bind(p.application_rate)
                    .push_bind(p.popularity_score);
            });
            builder.push(
                " ON CONFLICT (endcl_cd) DO UPDATE SET \
                 total_views = EXCLUDED.total_views, \
                 total_clicks = EXCLUDED.total_clicks, \
                 total_applications = EXCLUDED.total_applications, \
                 views_7d = EXCLUDED.views_7d, \
                 clicks_7d = EXCLUDED.clicks_7d, \
                 applications_7d = EXCLUDED.applications_7d, \
                 views_30d = EXCLUDED.views_30d, \
                 clicks_30d = EXCLUDED.clicks_30d, \
                 applications_30d = EXCLUDED.applications_30d, \
                 views_360d = EXCLUDED.views_360d, \
                 clicks_360d = EXCLUDED.clicks_360d, \
                 applications_360d = EXCLUDED.applications_360d, \
                 application_rate = EXCLUDED.application_rate, \
                 popularity_score = EXCLUDED.popularity_score, \
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

    fn config() -> Config {
        Config::with_defaults("postgres://localhost/baito")
    }

    fn counts(clicks: i64, applications: i64) -> PopularityCounts {
        PopularityCounts {
            endcl_cd: "E001".into(),
            clicks_360d: clicks,
            applications_360d: applications,
            ..Default::default()
        }
    }

    #[test]
    fn zero_clicks_means_zero_rate() {
        let popularity = finalize(counts(0, 0), &config());
        assert_eq!(popularity.application_rate, 0.0);
        assert_eq!(popularity.popularity_score, 0.0);
    }

    #[test]
    fn score_is_bounded_at_100() {
        // Perfect rate and saturated volume.
        let popularity = finalize(counts(1_000, 1_000), &config());
        assert!(popularity.popularity_score <= 100.0);
        assert!((popularity.popularity_score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn rate_clips_at_cap() {
        let cfg = config();
        // rate 0.5 and 0.9 score the same rate term once clipped at 0.5
        let at_cap = popularity_score(0.5, 0, &cfg);
        let over_cap = popularity_score(0.9, 0, &cfg);
        assert_eq!(at_cap, over_cap);
        assert!((at_cap - 60.0).abs() < 1e-9);
    }

    #[test]
    fn volume_saturates_at_cap() {
        let cfg = config();
        let at_cap = popularity_score(0.0, 500, &cfg);
        let over_cap = popularity_score(0.0, 5_000, &cfg);
        assert_eq!(at_cap, over_cap);
        assert!((at_cap - 40.0).abs() < 1e-9);
    }

    #[test]
    fn blend_weights_rate_over_volume() {
        let cfg = config();
        // Half-cap rate, half-cap volume: 60·0.5 + 40·0.5 = 50
        let score = popularity_score(0.25, 250, &cfg);
        assert!((score - 50.0).abs() < 1e-9);
    }
}
