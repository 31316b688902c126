use std::collections::HashMap;

use chrono::NaiveDate;

use baito_match::config::Config;
use baito_match::models::job::{Job, SalaryType};
use baito_match::models::master::{City, EmploymentType, Occupation, Prefecture};
use baito_match::models::user::User;
use baito_match::services::masters::MasterCache;
use baito_match::services::scorer::{
    score_job, AreaSalaryStats, Engagement30d, ScoreContext, ScoredCorpus,
};

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, 14).unwrap()
}

pub fn config() -> Config {
    Config::with_defaults("postgres://localhost/baito_test")
}

/// Tokyo (13) with three cities, Kanagawa (14) and Osaka (27). 13101 and
/// 13102 are adjacent.
pub fn masters() -> MasterCache {
    let prefecture = |cd: &str, name: &str, region: &str| Prefecture {
        pref_cd: cd.to_string(),
        name: name.to_string(),
        region: region.to_string(),
    };
    let city = |cd: &str, pref: &str, name: &str, adjacent: &[&str]| City {
        city_cd: cd.to_string(),
        pref_cd: pref.to_string(),
        name: name.to_string(),
        latitude: None,
        longitude: None,
        adjacent_city_cds: adjacent.iter().map(|s| s.to_string()).collect(),
    };
    MasterCache::from_parts(
        vec![
            prefecture("13", "東京都", "関東"),
            prefecture("14", "神奈川県", "関東"),
            prefecture("27", "大阪府", "関西"),
        ],
        vec![
            city("13101", "13", "千代田区", &["13102"]),
            city("13102", "13", "中央区", &["13101", "13103"]),
            city("13103", "13", "港区", &["13102"]),
            city("14101", "14", "横浜市鶴見区", &[]),
            city("27101", "27", "大阪市都島区", &[]),
        ],
        vec![
            Occupation {
                occupation_cd: "100".to_string(),
                name: "飲食".to_string(),
            },
            Occupation {
                occupation_cd: "200".to_string(),
                name: "販売".to_string(),
            },
        ],
        vec![
            EmploymentType {
                employment_type_cd: 1,
                name: "アルバイト".to_string(),
            },
            EmploymentType {
                employment_type_cd: 3,
                name: "派遣".to_string(),
            },
        ],
        vec![],
        vec![],
    )
    .expect("test masters")
}

pub struct JobSpec {
    pub job_id: i64,
    pub endcl_cd: String,
    pub pref_cd: String,
    pub city_cd: String,
    pub occupation_cd1: String,
    pub fee: i32,
    pub min_salary: i32,
    pub max_salary: i32,
    pub posting_days_ago: i64,
}

pub fn job(spec: JobSpec) -> Job {
    Job {
        job_id: spec.job_id,
        endcl_cd: spec.endcl_cd,
        company_name: format!("会社{}", spec.job_id),
        application_name: format!("求人{}", spec.job_id),
        pref_cd: spec.pref_cd,
        city_cd: spec.city_cd,
        station_name: None,
        latitude: None,
        longitude: None,
        min_salary: Some(spec.min_salary),
        max_salary: Some(spec.max_salary),
        salary_type: Some(SalaryType::Hourly),
        fee: spec.fee,
        hours: None,
        work_days: None,
        description: None,
        benefits: None,
        occupation_cd1: spec.occupation_cd1,
        occupation_cd2: None,
        employment_type_cd: 1,
        feature_codes: vec![],
        posting_date: today() - chrono::Duration::days(spec.posting_days_ago),
        end_at: None,
        is_active: true,
        has_daily_payment: false,
        has_weekly_payment: false,
        has_no_experience: false,
        has_student_welcome: false,
        has_remote_work: false,
        has_transportation: false,
        has_high_income: false,
    }
}

pub fn user_in(pref_cd: &str, city_cd: &str) -> User {
    User {
        user_id: 1,
        contact_token: "tok-0001".to_string(),
        pref_cd: Some(pref_cd.to_string()),
        city_cd: Some(city_cd.to_string()),
        is_active: true,
        is_subscribed: true,
    }
}

/// Score a corpus the way the scorer stage would, entirely in memory.
pub fn score_corpus(jobs: Vec<Job>, engagement: HashMap<i64, Engagement30d>) -> ScoredCorpus {
    let cfg = config();
    let area_stats = AreaSalaryStats::build(&jobs, cfg.area_min_jobs);
    let popularity = HashMap::new();
    let ctx = ScoreContext {
        popularity: &popularity,
        area_stats: &area_stats,
        keywords: &[],
        engagement: &engagement,
        config: &cfg,
    };
    let enrichments = jobs
        .iter()
        .map(|j| (j.job_id, score_job(j, &ctx)))
        .collect();
    ScoredCorpus {
        jobs,
        enrichments,
        area_stats,
    }
}
