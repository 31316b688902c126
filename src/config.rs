use std::env;

/// Fixed per-section pick quotas. Must sum to [`Config::total_picks`].
#[derive(Clone, Copy, Debug)]
pub struct SectionQuotas {
    pub editorial: usize,
    pub top5: usize,
    pub regional: usize,
    pub nearby: usize,
    pub high_income: usize,
    pub new: usize,
}

impl SectionQuotas {
    pub fn total(&self) -> usize {
        self.editorial + self.top5 + self.regional + self.nearby + self.high_income + self.new
    }
}

impl Default for SectionQuotas {
    fn default() -> Self {
        Self {
            editorial: 5,
            top5: 5,
            regional: 10,
            nearby: 8,
            high_income: 7,
            new: 5,
        }
    }
}

/// Soft per-stage deadlines in seconds. Missing one logs a warning; only the
/// hard total aborts the batch.
#[derive(Clone, Copy, Debug)]
pub struct SoftDeadlines {
    pub ingest: u64,
    pub popularity: u64,
    pub profile: u64,
    pub scorer: u64,
    pub matcher: u64,
}

impl Default for SoftDeadlines {
    fn default() -> Self {
        Self {
            ingest: 600,
            popularity: 180,
            profile: 300,
            scorer: 600,
            matcher: 900,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Ingest
    pub jobs_csv_path: String,
    pub batch_size: usize,
    pub workers_ingest: usize,
    /// Jobs absent from the day's CSV with end_at older than this are deactivated
    pub deactivation_grace_days: i64,

    // Scoring
    pub workers_score: usize,
    /// Minimum jobs per (pref, city) before falling back to pref-level salary stats
    pub area_min_jobs: usize,
    /// Saturation constant for the personalized base score
    pub personalized_k: f64,

    // Popularity
    pub popularity_window_days: i64,
    /// Application-rate clip ceiling in the popularity blend
    pub popularity_rate_cap: f64,
    /// Volume saturation point (applications over the window)
    pub popularity_volume_cap: i64,
    /// Weight of the rate term vs the volume term
    pub popularity_rate_weight: f64,

    // Profiles
    pub workers_profile: usize,
    pub profile_window_days: i64,
    pub recent_window_days: i64,

    // Matching
    pub workers_match: usize,
    pub top_k: usize,
    pub total_picks: usize,
    pub section_quotas: SectionQuotas,
    pub fee_min: i32,
    pub fee_max: i32,
    pub valid_employment_types: Vec<i16>,
    pub new_window_days: i64,

    // Retention
    pub retention_days: i64,
    pub action_retention_months: i64,

    // Deadlines
    pub soft_deadlines: SoftDeadlines,
    pub hard_deadline_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config {
            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL".to_string()))?,
            database_max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10")?,

            // Ingest
            jobs_csv_path: env::var("BM_JOBS_CSV").unwrap_or_else(|_| "jobs.csv".to_string()),
            batch_size: parse_env("BM_BATCH_SIZE", "1000")?,
            workers_ingest: parse_env("BM_WORKERS_INGEST", "4")?,
            deactivation_grace_days: parse_env("BM_DEACTIVATION_GRACE_DAYS", "7")?,

            // Scoring
            workers_score: parse_env("BM_WORKERS_SCORE", "8")?,
            area_min_jobs: parse_env("BM_AREA_MIN_JOBS", "20")?,
            personalized_k: parse_env("BM_PERSONALIZED_K", "50")?,

            // Popularity
            popularity_window_days: parse_env("BM_POPULARITY_WINDOW_DAYS", "360")?,
            popularity_rate_cap: parse_env("BM_POPULARITY_RATE_CAP", "0.5")?,
            popularity_volume_cap: parse_env("BM_POPULARITY_VOLUME_CAP", "500")?,
            popularity_rate_weight: parse_env("BM_POPULARITY_RATE_WEIGHT", "0.6")?,

            // Profiles
            workers_profile: parse_env("BM_WORKERS_PROFILE", "8")?,
            profile_window_days: parse_env("BM_PROFILE_WINDOW_DAYS", "180")?,
            recent_window_days: parse_env("BM_RECENT_WINDOW_DAYS", "14")?,

            // Matching
            workers_match: parse_env("BM_WORKERS_MATCH", "8")?,
            top_k: parse_env("BM_TOP_K", "200")?,
            total_picks: parse_env("BM_TOTAL_PICKS", "40")?,
            section_quotas: SectionQuotas {
                editorial: parse_env("BM_QUOTA_EDITORIAL", "5")?,
                top5: parse_env("BM_QUOTA_TOP5", "5")?,
                regional: parse_env("BM_QUOTA_REGIONAL", "10")?,
                nearby: parse_env("BM_QUOTA_NEARBY", "8")?,
                high_income: parse_env("BM_QUOTA_HIGH_INCOME", "7")?,
                new: parse_env("BM_QUOTA_NEW", "5")?,
            },
            fee_min: parse_env("BM_FEE_MIN", "500")?,
            fee_max: parse_env("BM_FEE_MAX", "5000")?,
            valid_employment_types: parse_list_env("BM_VALID_EMPLOYMENT_TYPES", "1,3,6,8")?,
            new_window_days: parse_env("BM_NEW_WINDOW_DAYS", "7")?,

            // Retention
            retention_days: parse_env("BM_RETENTION_DAYS", "30")?,
            action_retention_months: parse_env("BM_ACTION_RETENTION_MONTHS", "13")?,

            // Deadlines
            soft_deadlines: SoftDeadlines {
                ingest: parse_env("BM_SOFT_DEADLINE_INGEST", "600")?,
                popularity: parse_env("BM_SOFT_DEADLINE_POPULARITY", "180")?,
                profile: parse_env("BM_SOFT_DEADLINE_PROFILE", "300")?,
                scorer: parse_env("BM_SOFT_DEADLINE_SCORER", "600")?,
                matcher: parse_env("BM_SOFT_DEADLINE_MATCHER", "900")?,
            },
            hard_deadline_seconds: parse_env("BM_HARD_DEADLINE_SECONDS", "1800")?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.section_quotas.total() != self.total_picks {
            return Err(ConfigError::InvalidValue(format!(
                "section quotas sum to {}, expected {}",
                self.section_quotas.total(),
                self.total_picks
            )));
        }
        if self.top_k < self.total_picks {
            return Err(ConfigError::InvalidValue(format!(
                "BM_TOP_K ({}) must be at least the pick count ({})",
                self.top_k, self.total_picks
            )));
        }
        if self.fee_max <= self.fee_min {
            return Err(ConfigError::InvalidValue(
                "BM_FEE_MAX must exceed BM_FEE_MIN".to_string(),
            ));
        }
        if self.valid_employment_types.is_empty() {
            return Err(ConfigError::InvalidValue(
                "BM_VALID_EMPLOYMENT_TYPES must not be empty".to_string(),
            ));
        }
        for workers in [
            self.workers_ingest,
            self.workers_score,
            self.workers_profile,
            self.workers_match,
        ] {
            if workers == 0 {
                return Err(ConfigError::InvalidValue(
                    "worker counts must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

fn parse_list_env(key: &str, default: &str) -> Result<Vec<i16>, ConfigError> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .split(',')
        .map(|s| {
            s.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Config {
    /// A config with every tunable at its documented default, for tests and
    /// fixtures. Not read from the environment.
    pub fn with_defaults(database_url: &str) -> Self {
        Config {
            database_url: database_url.to_string(),
            database_max_connections: 10,
            jobs_csv_path: "jobs.csv".to_string(),
            batch_size: 1000,
            workers_ingest: 4,
            deactivation_grace_days: 7,
            workers_score: 8,
            area_min_jobs: 20,
            personalized_k: 50.0,
            popularity_window_days: 360,
            popularity_rate_cap: 0.5,
            popularity_volume_cap: 500,
            popularity_rate_weight: 0.6,
            workers_profile: 8,
            profile_window_days: 180,
            recent_window_days: 14,
            workers_match: 8,
            top_k: 200,
            total_picks: 40,
            section_quotas: SectionQuotas::default(),
            fee_min: 500,
            fee_max: 5000,
            valid_employment_types: vec![1, 3, 6, 8],
            new_window_days: 7,
            retention_days: 30,
            action_retention_months: 13,
            soft_deadlines: SoftDeadlines::default(),
            hard_deadline_seconds: 1800,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config::with_defaults("postgres://localhost/baito")
    }

    #[test]
    fn default_quotas_sum_to_forty() {
        assert_eq!(SectionQuotas::default().total(), 40);
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn mismatched_quotas_are_rejected() {
        let mut config = base_config();
        config.section_quotas.regional = 11;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn top_k_smaller_than_pick_count_is_rejected() {
        let mut config = base_config();
        config.top_k = 39;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_employment_types_are_rejected() {
        let mut config = base_config();
        config.valid_employment_types.clear();
        assert!(config.validate().is_err());
    }
}
