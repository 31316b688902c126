use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use sqlx::{PgPool, QueryBuilder};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::models::job::Job;
use crate::models::picks::{DailyJobPick, UserJobMapping};
use crate::models::profile::{max_freq, UserProfile};
use crate::models::user::User;
use crate::services::allocator;
use crate::services::masters::MasterCache;
use crate::services::scorer::ScoredCorpus;

// ============================================================================
// AFFINITY WEIGHTS (renormalized over the components a profile can answer)
// ============================================================================

const AFFINITY_PREF_WEIGHT: f64 = 0.20;
const AFFINITY_CITY_WEIGHT: f64 = 0.15;
const AFFINITY_OCCUPATION_WEIGHT: f64 = 0.20;
const AFFINITY_EMPLOYMENT_WEIGHT: f64 = 0.15;
const AFFINITY_SALARY_WEIGHT: f64 = 0.15;
const AFFINITY_EMPLOYER_WEIGHT: f64 = 0.15;

/// Neutral component value for users with no signal on a slot that still
/// must answer (prefecture, salary fit).
const NEUTRAL_AFFINITY: f64 = 50.0;

/// Adjacent-city matches earn half of the applied city's credit.
const ADJACENT_CITY_CREDIT: f64 = 0.5;

pub const USER_COMPOSITE_JOB_WEIGHT: f64 = 0.55;
pub const USER_COMPOSITE_AFFINITY_WEIGHT: f64 = 0.45;

/// Jobs from an employer the user applied to within the recent window keep
/// 10% of their score. A soft penalty, not a filter: with no alternatives the
/// job can still surface.
pub const RECENT_EMPLOYER_PENALTY: f64 = 0.1;

// ============================================================================
// AFFINITY
// ============================================================================

fn freq_ratio_str(freq: &HashMap<String, u32>, key: &str) -> f64 {
    let max = max_freq(freq);
    if max == 0 {
        return 0.0;
    }
    100.0 * freq.get(key).copied().unwrap_or(0) as f64 / max as f64
}

fn pref_component(profile: &UserProfile, job: &Job) -> Option<f64> {
    if profile.pref_freq.is_empty() {
        return Some(NEUTRAL_AFFINITY);
    }
    Some(freq_ratio_str(&profile.pref_freq, &job.pref_cd))
}

/// Direct city credit, or half credit when the job's city is adjacent to a
/// city the user applied in.
fn city_component(profile: &UserProfile, job: &Job, masters: &MasterCache) -> Option<f64> {
    if profile.city_freq.is_empty() {
        return None;
    }
    let max = max_freq(&profile.city_freq) as f64;
    let direct = freq_ratio_str(&profile.city_freq, &job.city_cd);
    let adjacent = profile
        .city_freq
        .iter()
        .filter(|(applied_city, _)| {
            masters
                .adjacent_cities(applied_city)
                .iter()
                .any(|adj| adj == &job.city_cd)
        })
        .map(|(_, count)| ADJACENT_CITY_CREDIT * 100.0 * *count as f64 / max)
        .fold(0.0, f64::max);
    Some(direct.max(adjacent))
}

fn occupation_component(profile: &UserProfile, job: &Job) -> Option<f64> {
    if profile.occupation_freq.is_empty() {
        return None;
    }
    Some(freq_ratio_str(&profile.occupation_freq, &job.occupation_cd1))
}

fn employment_component(profile: &UserProfile, job: &Job) -> Option<f64> {
    if profile.employment_freq.is_empty() {
        return None;
    }
    let max = max_freq(&profile.employment_freq);
    if max == 0 {
        return None;
    }
    Some(
        100.0
            * profile
                .employment_freq
                .get(&job.employment_type_cd)
                .copied()
                .unwrap_or(0) as f64
            / max as f64,
    )
}

/// Gaussian fit around the user's applied-salary average. Jobs without a
/// salary do not contribute; users without salary history answer neutrally.
fn salary_component(profile: &UserProfile, job: &Job) -> Option<f64> {
    let Some(stats) = profile.salary else {
        return Some(NEUTRAL_AFFINITY);
    };
    let job_avg = job.avg_salary()?;
    let sigma = (stats.avg * 0.15).max(200.0);
    let z = (job_avg - stats.avg) / sigma;
    Some(100.0 * (-z * z).exp())
}

fn employer_component(profile: &UserProfile, job: &Job) -> Option<f64> {
    if profile.employer_freq.is_empty() {
        return None;
    }
    Some(freq_ratio_str(&profile.employer_freq, &job.endcl_cd))
}

/// Per-user affinity in [0, 100]: weighted average of the six components,
/// skipping the ones this profile cannot answer and renormalizing. An empty
/// profile lands exactly on the neutral 50.
pub fn affinity(profile: &UserProfile, job: &Job, masters: &MasterCache) -> f64 {
    let components = [
        (pref_component(profile, job), AFFINITY_PREF_WEIGHT),
        (city_component(profile, job, masters), AFFINITY_CITY_WEIGHT),
        (occupation_component(profile, job), AFFINITY_OCCUPATION_WEIGHT),
        (employment_component(profile, job), AFFINITY_EMPLOYMENT_WEIGHT),
        (salary_component(profile, job), AFFINITY_SALARY_WEIGHT),
        (employer_component(profile, job), AFFINITY_EMPLOYER_WEIGHT),
    ];

    let mut weighted = 0.0;
    let mut weight_sum = 0.0;
    for (value, weight) in components {
        if let Some(value) = value {
            weighted += value * weight;
            weight_sum += weight;
        }
    }
    if weight_sum == 0.0 {
        return NEUTRAL_AFFINITY;
    }
    (weighted / weight_sum).clamp(0.0, 100.0)
}

// ============================================================================
// RANKING
// ============================================================================

/// One ranked candidate for a user. Carries the tiebreak keys so sorting
/// never reaches back into the corpus.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Index into `ScoredCorpus::jobs`
    pub job_index: usize,
    pub job_id: i64,
    /// Per-user composite after the recent-employer penalty
    pub score: f64,
    pub affinity: f64,
    pub penalized: bool,
    pub job_composite: f64,
    pub posting_date: NaiveDate,
}

/// Score and sort the whole eligible corpus for one user, descending.
/// Ties break by (job composite desc, posting_date desc, job_id asc).
pub fn rank_user(
    profile: &UserProfile,
    corpus: &ScoredCorpus,
    masters: &MasterCache,
) -> Vec<Candidate> {
    let mut ranked: Vec<Candidate> = corpus
        .jobs
        .iter()
        .enumerate()
        .filter_map(|(job_index, job)| {
            let enrichment = corpus.enrichment(job.job_id)?;
            let affinity = affinity(profile, job, masters);
            let mut score = USER_COMPOSITE_JOB_WEIGHT * enrichment.composite_score
                + USER_COMPOSITE_AFFINITY_WEIGHT * affinity;
            let penalized = profile.recent_employers.contains(&job.endcl_cd);
            if penalized {
                score *= RECENT_EMPLOYER_PENALTY;
            }
            Some(Candidate {
                job_index,
                job_id: job.job_id,
                score,
                affinity,
                penalized,
                job_composite: enrichment.composite_score,
                posting_date: job.posting_date,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.job_composite
                    .partial_cmp(&a.job_composite)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| b.posting_date.cmp(&a.posting_date))
            .then_with(|| a.job_id.cmp(&b.job_id))
    });
    ranked
}

// ============================================================================
// MATCHER SERVICE
// ============================================================================

/// Everything the queue writer needs about one matched user.
#[derive(Debug, Clone)]
pub struct UserPickSummary {
    pub user_id: i32,
    pub contact_token: String,
    pub picks: Vec<DailyJobPick>,
    pub low_inventory: bool,
    pub fallback_used: bool,
}

#[derive(Debug, Default)]
pub struct MatchOutcome {
    pub summaries: Vec<UserPickSummary>,
    pub users_processed: u64,
    pub users_skipped: u64,
    pub picks_written: u64,
    pub mappings_written: u64,
    pub low_inventory_users: u64,
}

pub struct MatcherService {
    db: PgPool,
    config: Arc<Config>,
    masters: Arc<MasterCache>,
}

impl MatcherService {
    pub fn new(db: PgPool, config: Arc<Config>, masters: Arc<MasterCache>) -> Self {
        Self { db, config, masters }
    }

    /// Match and allocate every user, sharded by `user_id mod workers`. Each
    /// user is handled entirely by one worker; there is no cross-user state.
    pub async fn run(
        &self,
        users: Vec<User>,
        profiles: Arc<HashMap<i32, UserProfile>>,
        corpus: Arc<ScoredCorpus>,
        batch_date: NaiveDate,
        cancel: watch::Receiver<bool>,
    ) -> Result<MatchOutcome> {
        let workers = self.config.workers_match;
        let users = Arc::new(users);
        let mut set: JoinSet<Result<MatchOutcome>> = JoinSet::new();

        for shard in 0..workers {
            let db = self.db.clone();
            let config = Arc::clone(&self.config);
            let masters = Arc::clone(&self.masters);
            let users = Arc::clone(&users);
            let profiles = Arc::clone(&profiles);
            let corpus = Arc::clone(&corpus);
            let cancel = cancel.clone();
            set.spawn(async move {
                match_shard(
                    shard, workers, db, config, masters, users, profiles, corpus, batch_date,
                    cancel,
                )
                .await
            });
        }

        let mut outcome = MatchOutcome::default();
        while let Some(joined) = set.join_next().await {
            let shard_outcome = joined
                .map_err(|e| PipelineError::Matching(format!("match worker panicked: {e}")))??;
            outcome.summaries.extend(shard_outcome.summaries);
            outcome.users_processed += shard_outcome.users_processed;
            outcome.users_skipped += shard_outcome.users_skipped;
            outcome.picks_written += shard_outcome.picks_written;
            outcome.mappings_written += shard_outcome.mappings_written;
            outcome.low_inventory_users += shard_outcome.low_inventory_users;
        }

        tracing::info!(
            users_processed = outcome.users_processed,
            users_skipped = outcome.users_skipped,
            picks_written = outcome.picks_written,
            low_inventory_users = outcome.low_inventory_users,
            "matching complete"
        );
        Ok(outcome)
    }
}

#[allow(clippy::too_many_arguments)]
async fn match_shard(
    shard: usize,
    workers: usize,
    db: PgPool,
    config: Arc<Config>,
    masters: Arc<MasterCache>,
    users: Arc<Vec<User>>,
    profiles: Arc<HashMap<i32, UserProfile>>,
    corpus: Arc<ScoredCorpus>,
    batch_date: NaiveDate,
    cancel: watch::Receiver<bool>,
) -> Result<MatchOutcome> {
    let mut outcome = MatchOutcome::default();
    let empty_profile = UserProfile::default();

    for user in users
        .iter()
        .filter(|u| (u.user_id.unsigned_abs() as usize) % workers == shard)
    {
        if *cancel.borrow() {
            tracing::warn!(shard, "match worker observed cancellation; exiting");
            break;
        }

        let profile = profiles.get(&user.user_id).unwrap_or(&empty_profile);
        let ranked = rank_user(profile, &corpus, &masters);
        if ranked.is_empty() {
            tracing::warn!(user_id = user.user_id, "no eligible candidates; skipping user");
            outcome.users_skipped += 1;
            continue;
        }

        let top_k_len = ranked.len().min(config.top_k);
        let allocation = allocator::allocate(&allocator::AllocationInput {
            user,
            profile,
            ranked: &ranked,
            corpus: &corpus,
            masters: &masters,
            today: batch_date,
            config: &config,
        });

        let mappings: Vec<UserJobMapping> = ranked[..top_k_len]
            .iter()
            .enumerate()
            .map(|(i, candidate)| {
                let job = &corpus.jobs[candidate.job_index];
                UserJobMapping {
                    user_id: user.user_id,
                    job_id: candidate.job_id,
                    batch_date,
                    score: candidate.score,
                    rank: (i + 1) as i32,
                    section_hints: allocator::section_hints(
                        job, corpus.enrichment(job.job_id), user, profile, &masters, batch_date,
                        &config,
                    ),
                }
            })
            .collect();

        match persist_user(&db, user.user_id, batch_date, &mappings, &allocation.picks).await {
            Ok(()) => {
                outcome.users_processed += 1;
                outcome.mappings_written += mappings.len() as u64;
                outcome.picks_written += allocation.picks.len() as u64;
                if allocation.low_inventory {
                    outcome.low_inventory_users += 1;
                }
                outcome.summaries.push(UserPickSummary {
                    user_id: user.user_id,
                    contact_token: user.contact_token.clone(),
                    picks: allocation.picks,
                    low_inventory: allocation.low_inventory,
                    fallback_used: allocation.fallback_used,
                });
            }
            Err(err) => {
                // Recoverable: this user gets no queue row today.
                tracing::error!(user_id = user.user_id, error = %err, "user match write failed; skipping");
                outcome.users_skipped += 1;
            }
        }
    }
    Ok(outcome)
}

/// One transaction per user: replace the day's partition rows so re-runs are
/// idempotent.
async fn persist_user(
    db: &PgPool,
    user_id: i32,
    batch_date: NaiveDate,
    mappings: &[UserJobMapping],
    picks: &[DailyJobPick],
) -> std::result::Result<(), sqlx::Error> {
    let mut tx = db.begin().await?;

    sqlx::query("DELETE FROM user_job_mappings WHERE user_id = $1 AND batch_date = $2")
        .bind(user_id)
        .bind(batch_date)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM daily_job_picks WHERE user_id = $1 AND pick_date = $2")
        .bind(user_id)
        .bind(batch_date)
        .execute(&mut *tx)
        .await?;

    if !mappings.is_empty() {
        let mut builder = QueryBuilder::new(
            "INSERT INTO user_job_mappings (user_id, job_id, batch_date, score, rank, \
             section_hints) ",
        );
        builder.push_values(mappings, |mut b, m| {
            let hints: Vec<String> = m
                .section_hints
                .iter()
                .map(|s| s.as_str().to_string())
                .collect();
            b.push_bind(m.user_id)
                .push_bind(m.job_id)
                .push_bind(m.batch_date)
                .push_bind(m.score)
                .push_bind(m.rank)
                .push_bind(hints);
        });
        builder.build().execute(&mut *tx).await?;
    }

    if !picks.is_empty() {
        let mut builder = QueryBuilder::new(
            "INSERT INTO daily_job_picks (user_id, job_id, pick_date, section, section_rank, \
             score, pick_reason) ",
        );
        builder.push_values(picks, |mut b, p| {
            b.push_bind(p.user_id)
                .push_bind(p.job_id)
                .push_bind(p.pick_date)
                .push_bind(p.section)
                .push_bind(p.section_rank)
                .push_bind(p.score)
                .push_bind(&p.pick_reason);
        });
        builder.build().execute(&mut *tx).await?;
    }

    tx.commit().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::profile::SalaryStats;
    use crate::services::test_fixtures::{corpus_with, fixture_job, fixture_masters};

    fn empty_profile() -> UserProfile {
        UserProfile::new(1)
    }

    #[test]
    fn new_user_has_neutral_affinity() {
        let masters = fixture_masters();
        let job = fixture_job(1, "13", "13101", 2_000);
        let a = affinity(&empty_profile(), &job, &masters);
        assert!((a - 50.0).abs() < 1e-9);
    }

    #[test]
    fn occupation_match_raises_affinity() {
        let masters = fixture_masters();
        let mut profile = empty_profile();
        profile.occupation_freq.insert("100".to_string(), 6);
        profile.occupation_freq.insert("200".to_string(), 2);

        let mut matching = fixture_job(1, "13", "13101", 2_000);
        matching.occupation_cd1 = "100".to_string();
        let mut other = fixture_job(2, "13", "13101", 2_000);
        other.occupation_cd1 = "200".to_string();
        let mut unseen = fixture_job(3, "13", "13101", 2_000);
        unseen.occupation_cd1 = "300".to_string();

        let a_match = affinity(&profile, &matching, &masters);
        let a_other = affinity(&profile, &other, &masters);
        let a_unseen = affinity(&profile, &unseen, &masters);
        assert!(a_match > a_other);
        assert!(a_other > a_unseen);
    }

    #[test]
    fn adjacent_city_earns_half_credit() {
        let masters = fixture_masters();
        let mut profile = empty_profile();
        // Applied in 13101; 13102 is adjacent, 14101 is not.
        profile.city_freq.insert("13101".to_string(), 4);

        let home = fixture_job(1, "13", "13101", 2_000);
        let adjacent = fixture_job(2, "13", "13102", 2_000);
        let far = fixture_job(3, "14", "14101", 2_000);

        let a_home = affinity(&profile, &home, &masters);
        let a_adjacent = affinity(&profile, &adjacent, &masters);
        let a_far = affinity(&profile, &far, &masters);
        assert!(a_home > a_adjacent);
        assert!(a_adjacent > a_far);
    }

    #[test]
    fn salary_fit_peaks_at_profile_average() {
        let masters = fixture_masters();
        let mut profile = empty_profile();
        profile.salary = Some(SalaryStats {
            avg: 1_300.0,
            min: 1_200.0,
            max: 1_400.0,
        });

        let mut near = fixture_job(1, "13", "13101", 2_000);
        near.min_salary = Some(1_300);
        near.max_salary = Some(1_300);
        let mut far = fixture_job(2, "13", "13101", 2_000);
        far.min_salary = Some(2_500);
        far.max_salary = Some(2_500);

        assert!(affinity(&profile, &near, &masters) > affinity(&profile, &far, &masters));
    }

    #[test]
    fn recent_employer_score_is_cut_to_a_tenth() {
        let masters = fixture_masters();
        let jobs = vec![
            fixture_job(1, "13", "13101", 2_000),
            fixture_job(2, "13", "13101", 2_000),
        ];
        let corpus = corpus_with(jobs);

        let mut profile = empty_profile();
        let clean = rank_user(&profile, &corpus, &masters);
        let clean_score: f64 = clean.iter().find(|c| c.job_id == 1).unwrap().score;

        profile.recent_employers.insert("E1".to_string());
        let penalized = rank_user(&profile, &corpus, &masters);
        let hit = penalized.iter().find(|c| c.job_id == 1).unwrap();
        assert!(hit.penalized);
        assert!((hit.score - clean_score * 0.1).abs() < 1e-9);
        // The untouched job now outranks it.
        assert_eq!(penalized[0].job_id, 2);
    }

    #[test]
    fn ties_break_by_composite_then_date_then_id() {
        let masters = fixture_masters();
        // Identical jobs except id; scores tie exactly.
        let jobs = vec![
            fixture_job(9, "13", "13101", 2_000),
            fixture_job(3, "13", "13101", 2_000),
        ];
        let corpus = corpus_with(jobs);
        let ranked = rank_user(&empty_profile(), &corpus, &masters);
        assert_eq!(ranked[0].job_id, 3);
        assert_eq!(ranked[1].job_id, 9);
    }

    #[test]
    fn ranking_is_deterministic() {
        let masters = fixture_masters();
        let jobs: Vec<Job> = (0..50)
            .map(|i| fixture_job(i, "13", "13101", 1_000 + (i as i32 % 7) * 300))
            .collect();
        let corpus = corpus_with(jobs);
        let first = rank_user(&empty_profile(), &corpus, &masters);
        let second = rank_user(&empty_profile(), &corpus, &masters);
        let ids_first: Vec<i64> = first.iter().map(|c| c.job_id).collect();
        let ids_second: Vec<i64> = second.iter().map(|c| c.job_id).collect();
        assert_eq!(ids_first, ids_second);
    }
}
