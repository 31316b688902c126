use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, QueryBuilder};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::models::profile::{SalaryStats, UserProfile};
use crate::models::user::{ActionType, User};

/// Profiles are upserted in chunks this big.
const WRITE_CHUNK: usize = 200;

/// One action joined with the attributes of the job it touched. The tag stays
/// a string until [`build_profile`] so retired action types in the history
/// degrade to a warning instead of a decode failure.
#[derive(Debug, Clone, FromRow)]
pub struct ProfileActionRow {
    pub user_id: i32,
    pub action_type: String,
    pub action_at: DateTime<Utc>,
    pub endcl_cd: Option<String>,
    pub pref_cd: Option<String>,
    pub city_cd: Option<String>,
    pub occupation_cd1: Option<String>,
    pub employment_type_cd: Option<i16>,
    pub job_avg_salary: Option<f64>,
}

/// Fold one user's window of actions into their preference profile.
///
/// Applications weigh 3, clicks and mail clicks 1; passive actions only move
/// the rolling counters. Attributes missing on an action (job deleted, action
/// without a job reference) simply do not contribute.
pub fn build_profile(
    user_id: i32,
    actions: &[ProfileActionRow],
    now: DateTime<Utc>,
    recent_window_days: i64,
) -> UserProfile {
    let mut profile = UserProfile::new(user_id);
    let recent_cutoff = now - chrono::Duration::days(recent_window_days);
    let mut applied_salaries: Vec<f64> = Vec::new();

    for action in actions {
        let Some(action_type) = ActionType::parse(&action.action_type) else {
            tracing::warn!(
                user_id,
                action_type = %action.action_type,
                "unknown action type in history; skipping"
            );
            continue;
        };

        match action_type {
            ActionType::View => profile.view_count += 1,
            ActionType::Click => profile.click_count += 1,
            _ => {}
        }

        if action_type.is_application() {
            profile.application_count += 1;
            let date = action.action_at.date_naive();
            if profile.last_application_date.map_or(true, |d| date > d) {
                profile.last_application_date = Some(date);
            }
            if let Some(avg) = action.job_avg_salary {
                applied_salaries.push(avg);
            }
            if action.action_at >= recent_cutoff {
                if let Some(endcl) = &action.endcl_cd {
                    profile.recent_employers.insert(endcl.clone());
                }
            }
        }

        let Some(weight) = action_type.profile_weight() else {
            continue;
        };
        if let Some(pref) = &action.pref_cd {
            *profile.pref_freq.entry(pref.clone()).or_insert(0) += weight;
        }
        if let Some(city) = &action.city_cd {
            *profile.city_freq.entry(city.clone()).or_insert(0) += weight;
        }
        if let Some(occupation) = &action.occupation_cd1 {
            *profile
                .occupation_freq
                .entry(occupation.clone())
                .or_insert(0) += weight;
        }
        if let Some(employment) = action.employment_type_cd {
            *profile.employment_freq.entry(employment).or_insert(0) += weight;
        }
        if let Some(endcl) = &action.endcl_cd {
            *profile.employer_freq.entry(endcl.clone()).or_insert(0) += weight;
        }
    }

    if !applied_salaries.is_empty() {
        let sum: f64 = applied_salaries.iter().sum();
        let min = applied_salaries.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = applied_salaries
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        profile.salary = Some(SalaryStats {
            avg: sum / applied_salaries.len() as f64,
            min,
            max,
        });
    }

    profile
}

pub struct ProfileService {
    db: PgPool,
    config: Arc<Config>,
}

impl ProfileService {
    pub fn new(db: PgPool, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    /// Build (and persist) a profile for every active, subscribed user.
    /// Sharded by `user_id mod workers`; each user is handled wholly by one
    /// worker.
    pub async fn run(
        &self,
        now: DateTime<Utc>,
        cancel: watch::Receiver<bool>,
    ) -> Result<(Vec<User>, HashMap<i32, UserProfile>)> {
        let users: Vec<User> = sqlx::query_as(
            "SELECT user_id, contact_token, pref_cd, city_cd, is_active, is_subscribed \
             FROM users WHERE is_active AND is_subscribed",
        )
        .fetch_all(&self.db)
        .await?;

        let workers = self.config.workers_profile;
        let mut set: JoinSet<Result<HashMap<i32, UserProfile>>> = JoinSet::new();

        for shard in 0..workers {
            let db = self.db.clone();
            let config = Arc::clone(&self.config);
            let cancel = cancel.clone();
            let shard_users: Vec<i32> = users
                .iter()
                .map(|u| u.user_id)
                .filter(|id| (id.unsigned_abs() as usize) % workers == shard)
                .collect();
            set.spawn(async move {
                profile_shard(shard, db, config, shard_users, now, cancel).await
            });
        }

        let mut profiles: HashMap<i32, UserProfile> = HashMap::with_capacity(users.len());
        while let Some(joined) = set.join_next().await {
            let shard_profiles =
                joined.map_err(|e| PipelineError::Matching(format!("profile worker panicked: {e}")))??;
            profiles.extend(shard_profiles);
        }

        self.persist(&profiles).await?;

        tracing::info!(users = users.len(), profiles = profiles.len(), "profiles built");
        Ok((users, profiles))
    }

    async fn persist(&self, profiles: &HashMap<i32, UserProfile>) -> Result<()> {
        let rows: Vec<&UserProfile> = profiles.values().collect();
        for chunk in rows.chunks(WRITE_CHUNK) {
            let mut builder = QueryBuilder::new(
                "INSERT INTO user_profiles (user_id, pref_freq, city_freq, occupation_freq, \
                 employment_freq, employer_freq, salary_avg, salary_min, salary_max, \
                 application_count, click_count, view_count, last_application_date, \
                 recent_employers) ",
            );
            builder.push_values(chunk, |mut b, p| {
                let recent: Vec<String> = p.recent_employers.iter().cloned().collect();
                b.push_bind(p.user_id)
                    .push_bind(serde_json::to_value(&p.pref_freq).unwrap_or_default())
                    .push_bind(serde_json::to_value(&p.city_freq).unwrap_or_default())
                    .push_bind(serde_json::to_value(&p.occupation_freq).unwrap_or_default())
                    .push_bind(serde_json::to_value(&p.employment_freq).unwrap_or_default())
                    .push_bind(serde_json::to_value(&p.employer_freq).unwrap_or_default())
                    .push_bind(p.salary.map(|s| s.avg))
                    .push_bind(p.salary.map(|s| s.min))
                    .push_bind(p.salary.map(|s| s.max))
                    .push_bind(p.application_count as i32)
                    .push_bind(p.click_count as i32)
                    .push_bind(p.view_count as i32)
                    .push_bind(p.last_application_date)
                    .push_bind(recent);
            });
            builder.push(
                " ON CONFLICT (user_id) DO UPDATE SET \
                 pref_freq = EXCLUDED.pref_freq, \
                 city_freq = EXCLUDED.city_freq, \
                 occupation_freq = EXCLUDED.occupation_freq, \
                 employment_freq = EXCLUDED.employment_freq, \
                 employer_freq = EXCLUDED.employer_freq, \
                 salary_avg = EXCLUDED.salary_avg, \
                 salary_min = EXCLUDED.salary_min, \
                 salary_max = EXCLUDED.salary_max, \
                 application_count = EXCLUDED.application_count, \
                 click_count = EXCLUDED.click_count, \
                 view_count = EXCLUDED.view_count, \
                 last_application_date = EXCLUDED.last_application_date, \
                 recent_employers = EXCLUDED.recent_employers, \
                 updated_at = NOW()",
            );
            builder.build().execute(&self.db).await?;
        }
        Ok(())
    }
}

async fn profile_shard(
    shard: usize,
    db: PgPool,
    config: Arc<Config>,
    shard_users: Vec<i32>,
    now: DateTime<Utc>,
    cancel: watch::Receiver<bool>,
) -> Result<HashMap<i32, UserProfile>> {
    let window_start = now - chrono::Duration::days(config.profile_window_days);

    let rows: Vec<ProfileActionRow> = sqlx::query_as(
        "SELECT a.user_id, a.action_type::text AS action_type, a.action_at, \
                COALESCE(a.endcl_cd, j.endcl_cd) AS endcl_cd, \
                j.pref_cd, j.city_cd, j.occupation_cd1, j.employment_type_cd, \
                CASE WHEN j.min_salary IS NOT NULL AND j.max_salary IS NOT NULL \
                     THEN ((j.min_salary + j.max_salary) / 2.0)::float8 END AS job_avg_salary \
         FROM user_actions a \
         LEFT JOIN jobs j ON j.job_id = a.job_id \
         WHERE a.action_at >= $1 AND a.user_id = ANY($2) \
         ORDER BY a.user_id, a.action_at",
    )
    .bind(window_start)
    .bind(&shard_users)
    .fetch_all(&db)
    .await
    .map_err(|e| PipelineError::Matching(format!("profile shard {shard} load failed: {e}")))?;

    let mut by_user: HashMap<i32, Vec<ProfileActionRow>> = HashMap::new();
    for row in rows {
        by_user.entry(row.user_id).or_default().push(row);
    }

    let mut profiles = HashMap::with_capacity(shard_users.len());
    for user_id in shard_users {
        if *cancel.borrow() {
            tracing::warn!(shard, "profile worker observed cancellation; exiting");
            break;
        }
        let actions = by_user.remove(&user_id).unwrap_or_default();
        profiles.insert(
            user_id,
            build_profile(user_id, &actions, now, config.recent_window_days),
        );
    }
    Ok(profiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 14, 5, 0, 0).unwrap()
    }

    fn action(
        action_type: &str,
        days_ago: i64,
        endcl_cd: &str,
        salary: Option<f64>,
    ) -> ProfileActionRow {
        ProfileActionRow {
            user_id: 1,
            action_type: action_type.to_string(),
            action_at: now() - chrono::Duration::days(days_ago),
            endcl_cd: Some(endcl_cd.to_string()),
            pref_cd: Some("13".to_string()),
            city_cd: Some("13101".to_string()),
            occupation_cd1: Some("100".to_string()),
            employment_type_cd: Some(1),
            job_avg_salary: salary,
        }
    }

    #[test]
    fn applications_weigh_three_clicks_one() {
        let actions = vec![
            action("apply", 30, "E1", Some(1_300.0)),
            action("click", 10, "E1", None),
            action("email_click", 9, "E2", None),
        ];
        let profile = build_profile(1, &actions, now(), 14);
        assert_eq!(profile.pref_freq["13"], 5);
        assert_eq!(profile.employer_freq["E1"], 4);
        assert_eq!(profile.employer_freq["E2"], 1);
    }

    #[test]
    fn passive_actions_only_move_counters() {
        let actions = vec![
            action("view", 5, "E1", None),
            action("favorite", 4, "E1", None),
        ];
        let profile = build_profile(1, &actions, now(), 14);
        assert_eq!(profile.view_count, 1);
        assert!(profile.pref_freq.is_empty());
        assert!(profile.is_empty());
    }

    #[test]
    fn recent_employers_is_a_14_day_window() {
        let actions = vec![
            action("apply", 3, "E_recent", Some(1_200.0)),
            action("apply", 90, "E_old", Some(1_200.0)),
        ];
        let profile = build_profile(1, &actions, now(), 14);
        assert!(profile.recent_employers.contains("E_recent"));
        assert!(!profile.recent_employers.contains("E_old"));
        // The old application still feeds the frequency maps.
        assert_eq!(profile.employer_freq["E_old"], 3);
    }

    #[test]
    fn salary_stats_come_from_applications_only() {
        let actions = vec![
            action("apply", 3, "E1", Some(1_200.0)),
            action("apply", 6, "E2", Some(1_400.0)),
            action("click", 2, "E3", Some(9_999.0)),
        ];
        let profile = build_profile(1, &actions, now(), 14);
        let stats = profile.salary.unwrap();
        assert!((stats.avg - 1_300.0).abs() < 1e-9);
        assert_eq!(stats.min, 1_200.0);
        assert_eq!(stats.max, 1_400.0);
    }

    #[test]
    fn unknown_action_types_are_skipped() {
        let actions = vec![action("poke", 2, "E1", None)];
        let profile = build_profile(1, &actions, now(), 14);
        assert!(profile.is_empty());
        assert_eq!(profile.application_count, 0);
    }

    #[test]
    fn last_application_date_tracks_the_newest() {
        let actions = vec![
            action("apply", 20, "E1", None),
            action("application", 7, "E2", None),
        ];
        let profile = build_profile(1, &actions, now(), 14);
        assert_eq!(
            profile.last_application_date,
            Some((now() - chrono::Duration::days(7)).date_naive())
        );
        assert_eq!(profile.application_count, 2);
    }

    #[test]
    fn no_actions_yields_empty_profile() {
        let profile = build_profile(1, &[], now(), 14);
        assert!(profile.is_empty());
        assert!(profile.recent_employers.is_empty());
    }
}
