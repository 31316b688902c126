use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use validator::Validate;

// ============================================================================
// FEATURE CODES (semantics are master-defined; these are the wired ones)
// ============================================================================

pub const FEATURE_DAILY_PAYMENT: &str = "D01";
pub const FEATURE_WEEKLY_PAYMENT: &str = "W01";
pub const FEATURE_NO_EXPERIENCE: &str = "N01";
pub const FEATURE_STUDENT_WELCOME: &str = "S01";
pub const FEATURE_REMOTE_WORK: &str = "R01";
pub const FEATURE_TRANSPORTATION: &str = "T01";

/// High-income thresholds by salary type (yen).
pub const HIGH_INCOME_HOURLY_MIN: i32 = 1_500;
pub const HIGH_INCOME_DAILY_MIN: i32 = 12_000;

// ============================================================================
// ENUMS (matching PostgreSQL enums from 0002_create_jobs.sql)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "salary_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SalaryType {
    Hourly,
    Daily,
    Monthly,
}

// ============================================================================
// CORE JOB STRUCT
// ============================================================================

/// One job posting with its ingest-derived flags. Rows survive deactivation:
/// `is_active = false` retires a job from matching without deleting it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    // Identity
    pub job_id: i64,
    /// End-client (employer) code
    pub endcl_cd: String,

    // Display
    pub company_name: String,
    pub application_name: String,

    // Location
    pub pref_cd: String,
    pub city_cd: String,
    pub station_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    // Compensation
    pub min_salary: Option<i32>,
    pub max_salary: Option<i32>,
    pub salary_type: Option<SalaryType>,
    /// Employer's per-application bid in yen
    pub fee: i32,

    // Free text
    pub hours: Option<String>,
    pub work_days: Option<String>,
    pub description: Option<String>,
    pub benefits: Option<String>,

    // Classification
    pub occupation_cd1: String,
    pub occupation_cd2: Option<String>,
    pub employment_type_cd: i16,
    pub feature_codes: Vec<String>,

    // Lifecycle
    pub posting_date: NaiveDate,
    pub end_at: Option<DateTime<Utc>>,
    pub is_active: bool,

    // Derived flags (materialized at ingest)
    pub has_daily_payment: bool,
    pub has_weekly_payment: bool,
    pub has_no_experience: bool,
    pub has_student_welcome: bool,
    pub has_remote_work: bool,
    pub has_transportation: bool,
    pub has_high_income: bool,
}

/// The six feature-driven flags plus the salary-derived high-income flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DerivedFlags {
    pub has_daily_payment: bool,
    pub has_weekly_payment: bool,
    pub has_no_experience: bool,
    pub has_student_welcome: bool,
    pub has_remote_work: bool,
    pub has_transportation: bool,
    pub has_high_income: bool,
}

impl DerivedFlags {
    /// Materialize flags from feature codes and salary fields. Deterministic:
    /// re-deriving from the same inputs always yields the same flags.
    pub fn derive(
        feature_codes: &[String],
        salary_type: Option<SalaryType>,
        min_salary: Option<i32>,
    ) -> Self {
        let has = |code: &str| feature_codes.iter().any(|c| c == code);

        let has_high_income = match (salary_type, min_salary) {
            (Some(SalaryType::Hourly), Some(min)) => min >= HIGH_INCOME_HOURLY_MIN,
            (Some(SalaryType::Daily), Some(min)) => min >= HIGH_INCOME_DAILY_MIN,
            _ => false,
        };

        Self {
            has_daily_payment: has(FEATURE_DAILY_PAYMENT),
            has_weekly_payment: has(FEATURE_WEEKLY_PAYMENT),
            has_no_experience: has(FEATURE_NO_EXPERIENCE),
            has_student_welcome: has(FEATURE_STUDENT_WELCOME),
            has_remote_work: has(FEATURE_REMOTE_WORK),
            has_transportation: has(FEATURE_TRANSPORTATION),
            has_high_income,
        }
    }
}

impl Job {
    /// Matching eligibility: active, whitelisted employment type, bid above
    /// the floor, and not expired.
    pub fn is_eligible(
        &self,
        now: DateTime<Utc>,
        fee_min: i32,
        valid_employment_types: &[i16],
    ) -> bool {
        self.is_active
            && valid_employment_types.contains(&self.employment_type_cd)
            && self.fee > fee_min
            && self.end_at.map_or(true, |end| end > now)
    }

    /// Midpoint of the salary bounds, used by wage scoring and salary-fit.
    pub fn avg_salary(&self) -> Option<f64> {
        match (self.min_salary, self.max_salary) {
            (Some(min), Some(max)) => Some((min + max) as f64 / 2.0),
            _ => None,
        }
    }

    /// Display form of the salary fields, fed to SEO keyword matching.
    pub fn salary_text(&self) -> String {
        let unit = match self.salary_type {
            Some(SalaryType::Hourly) => "時給",
            Some(SalaryType::Daily) => "日給",
            Some(SalaryType::Monthly) => "月給",
            None => "",
        };
        match (self.min_salary, self.max_salary) {
            (Some(min), Some(max)) if min != max => format!("{}{}円〜{}円", unit, min, max),
            (Some(min), _) => format!("{}{}円", unit, min),
            _ => String::new(),
        }
    }
}

// ============================================================================
// CSV ROW DTO
// ============================================================================

/// Raw CSV row as exported by the upstream feed. Salary fields stay `String`
/// until the ingest cleaner collapses display forms ("¥1,200〜1,500/時") into
/// typed bounds. Unknown extra columns are ignored by the reader.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct JobCsvRow {
    pub job_id: i64,

    #[validate(length(min = 1, max = 20, message = "endcl_cd must be 1-20 characters"))]
    pub endcl_cd: String,

    #[validate(length(min = 1, max = 255, message = "company_name must be 1-255 characters"))]
    pub company_name: String,

    #[validate(length(min = 1, max = 255, message = "application_name must be 1-255 characters"))]
    pub application_name: String,

    #[validate(length(min = 1, max = 2, message = "pref_cd must be 1-2 characters"))]
    pub pref_cd: String,

    #[validate(length(min = 1, max = 5, message = "city_cd must be 1-5 characters"))]
    pub city_cd: String,

    #[serde(default)]
    pub station_name_eki: Option<String>,

    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,

    #[serde(default)]
    pub min_salary: Option<String>,
    #[serde(default)]
    pub max_salary: Option<String>,
    #[serde(default)]
    pub salary_type: Option<String>,

    /// Per-application bid in yen
    #[validate(range(min = 0, max = 5000, message = "fee must be 0-5000"))]
    pub fee: i32,

    #[serde(default)]
    pub hours: Option<String>,
    #[serde(default)]
    pub work_days: Option<String>,

    #[validate(length(min = 1, max = 10, message = "occupation_cd1 must be 1-10 characters"))]
    pub occupation_cd1: String,

    #[serde(default)]
    pub occupation_cd2: Option<String>,

    pub employment_type_cd: i16,

    /// Comma-separated feature codes; empties are dropped at ingest
    #[serde(default)]
    pub feature_codes: Option<String>,

    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub benefits: Option<String>,

    pub posting_date: NaiveDate,

    #[serde(default)]
    pub end_at: Option<String>,
}
