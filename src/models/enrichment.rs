use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::job::Job;

// ============================================================================
// NEEDS CATEGORIES
// ============================================================================

/// Why a job is interesting for a class of users. Stored as snake_case tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeedsCategory {
    DailyPayment,
    WeeklyPayment,
    HighIncome,
    NoExperience,
    StudentWelcome,
    Remote,
    TransportSupported,
}

impl NeedsCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            NeedsCategory::DailyPayment => "daily_payment",
            NeedsCategory::WeeklyPayment => "weekly_payment",
            NeedsCategory::HighIncome => "high_income",
            NeedsCategory::NoExperience => "no_experience",
            NeedsCategory::StudentWelcome => "student_welcome",
            NeedsCategory::Remote => "remote",
            NeedsCategory::TransportSupported => "transport_supported",
        }
    }

    /// One tag per satisfied predicate, in a fixed order.
    pub fn for_job(job: &Job) -> Vec<NeedsCategory> {
        let mut categories = Vec::new();
        if job.has_daily_payment {
            categories.push(NeedsCategory::DailyPayment);
        }
        if job.has_weekly_payment {
            categories.push(NeedsCategory::WeeklyPayment);
        }
        if job.has_high_income {
            categories.push(NeedsCategory::HighIncome);
        }
        if job.has_no_experience {
            categories.push(NeedsCategory::NoExperience);
        }
        if job.has_student_welcome {
            categories.push(NeedsCategory::StudentWelcome);
        }
        if job.has_remote_work {
            categories.push(NeedsCategory::Remote);
        }
        if job.has_transportation {
            categories.push(NeedsCategory::TransportSupported);
        }
        categories
    }
}

// ============================================================================
// JOB ENRICHMENT
// ============================================================================

/// Per-job scoring result, regenerated each run for every eligible job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnrichment {
    pub job_id: i64,

    /// Fee + wage + employer popularity blend, 0-100
    pub basic_score: f64,
    /// Weighted keyword coverage, 0-100
    pub seo_score: f64,
    /// Population-level conversion signal, 0-100
    pub personalized_score_base: f64,
    /// 0.3·basic + 0.2·seo + 0.5·personalized_base
    pub composite_score: f64,

    pub needs_categories: Vec<NeedsCategory>,

    // Rolling 30-day engagement counters
    pub views_30d: i64,
    pub clicks_30d: i64,
    pub applications_30d: i64,

    /// Set by upstream triggers when the job row changed outside a batch;
    /// cleared when the scorer rewrites the row.
    pub needs_recalculation: bool,
}

// ============================================================================
// EMPLOYER POPULARITY
// ============================================================================

/// Per-employer engagement aggregates over the rolling windows.
#[derive(Debug, Clone, Default, Serialize, Deserialize, FromRow)]
pub struct EmployerPopularity {
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

    /// applications_360d / max(clicks_360d, 1)
    pub application_rate: f64,
    /// Saturating blend of rate quality and application volume, 0-100
    pub popularity_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::SalaryType;
    use chrono::NaiveDate;

    fn flagged_job() -> Job {
        Job {
            job_id: 1,
            endcl_cd: "E001".to_string(),
            company_name: "会社".to_string(),
            application_name: "仕事".to_string(),
            pref_cd: "13".to_string(),
            city_cd: "13101".to_string(),
            station_name: None,
            latitude: None,
            longitude: None,
            min_salary: Some(1_600),
            max_salary: Some(1_800),
            salary_type: Some(SalaryType::Hourly),
            fee: 1_000,
            hours: None,
            work_days: None,
            description: None,
            benefits: None,
            occupation_cd1: "100".to_string(),
            occupation_cd2: None,
            employment_type_cd: 1,
            feature_codes: vec![],
            posting_date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            end_at: None,
            is_active: true,
            has_daily_payment: true,
            has_weekly_payment: false,
            has_no_experience: true,
            has_student_welcome: false,
            has_remote_work: false,
            has_transportation: true,
            has_high_income: true,
        }
    }

    #[test]
    fn categories_mirror_flags() {
        let categories = NeedsCategory::for_job(&flagged_job());
        assert_eq!(
            categories,
            vec![
                NeedsCategory::DailyPayment,
                NeedsCategory::HighIncome,
                NeedsCategory::NoExperience,
                NeedsCategory::TransportSupported,
            ]
        );
    }

    #[test]
    fn tags_serialize_as_snake_case() {
        assert_eq!(NeedsCategory::TransportSupported.as_str(), "transport_supported");
        assert_eq!(
            serde_json::to_string(&NeedsCategory::DailyPayment).unwrap(),
            "\"daily_payment\""
        );
    }
}
