use std::collections::HashSet;

use chrono::NaiveDate;

use crate::config::Config;
use crate::models::enrichment::JobEnrichment;
use crate::models::job::Job;
use crate::models::picks::{DailyJobPick, Section, SECTION_ORDER};
use crate::models::profile::UserProfile;
use crate::models::user::User;
use crate::services::masters::MasterCache;
use crate::services::matcher::Candidate;
use crate::services::scorer::ScoredCorpus;

// ============================================================================
// LOCATION WEIGHT TIERS
// ============================================================================

const LOC_WEIGHT_SAME_CITY: f64 = 1.0;
const LOC_WEIGHT_ADJACENT_CITY: f64 = 0.7;
const LOC_WEIGHT_SAME_PREF: f64 = 0.5;
const LOC_WEIGHT_OTHER: f64 = 0.3;

/// Geographic proximity multiplier for the editorial sort key.
pub fn loc_weight(user: &User, job: &Job, masters: &MasterCache) -> f64 {
    if let Some(city) = &user.city_cd {
        if *city == job.city_cd {
            return LOC_WEIGHT_SAME_CITY;
        }
        if masters
            .adjacent_cities(city)
            .iter()
            .any(|c| c == &job.city_cd)
        {
            return LOC_WEIGHT_ADJACENT_CITY;
        }
    }
    if let Some(pref) = &user.pref_cd {
        if *pref == job.pref_cd {
            return LOC_WEIGHT_SAME_PREF;
        }
    }
    LOC_WEIGHT_OTHER
}

// ============================================================================
// SECTION PREDICATES
// ============================================================================

fn base_predicate(
    section: Section,
    job: &Job,
    enrichment: Option<&JobEnrichment>,
    user: &User,
    profile: &UserProfile,
    masters: &MasterCache,
    today: NaiveDate,
    config: &Config,
) -> bool {
    match section {
        Section::EditorialPicks => {
            let applications_30d = enrichment.map(|e| e.applications_30d).unwrap_or(0);
            job.fee as i64 * applications_30d > 0
                && !profile.recent_employers.contains(&job.endcl_cd)
        }
        Section::Top5 => true,
        Section::Regional => user.pref_cd.as_deref() == Some(job.pref_cd.as_str()),
        Section::Nearby => user
            .city_cd
            .as_deref()
            .map_or(false, |city| masters.is_same_or_adjacent(city, &job.city_cd)),
        Section::HighIncome => job.has_high_income || job.has_daily_payment,
        Section::New => {
            job.posting_date >= today - chrono::Duration::days(config.new_window_days)
        }
    }
}

/// One-step predicate relaxation for starving sections. Sections without a
/// defined relaxation return false for everything and fall through to the
/// score borrow.
fn relaxed_predicate(
    section: Section,
    job: &Job,
    user: &User,
    corpus: &ScoredCorpus,
    masters: &MasterCache,
    today: NaiveDate,
) -> bool {
    match section {
        // Same region instead of same prefecture
        Section::Regional => match (user.pref_cd.as_deref(), masters.region_of(&job.pref_cd)) {
            (Some(user_pref), Some(job_region)) => {
                masters.region_of(user_pref) == Some(job_region)
            }
            _ => false,
        },
        // Same prefecture instead of adjacency
        Section::Nearby => user.pref_cd.as_deref() == Some(job.pref_cd.as_str()),
        // Top-quartile salary for the job's own area
        Section::HighIncome => match (job.avg_salary(), corpus.area_stats.band_for(&job.pref_cd, &job.city_cd)) {
            (Some(avg), Some(band)) => avg >= band.p75,
            _ => false,
        },
        // 14 days instead of 7
        Section::New => job.posting_date >= today - chrono::Duration::days(14),
        Section::EditorialPicks | Section::Top5 => false,
    }
}

/// Base-predicate hints for the mapping table, in section order.
pub fn section_hints(
    job: &Job,
    enrichment: Option<&JobEnrichment>,
    user: &User,
    profile: &UserProfile,
    masters: &MasterCache,
    today: NaiveDate,
    config: &Config,
) -> Vec<Section> {
    SECTION_ORDER
        .iter()
        .copied()
        .filter(|&section| {
            base_predicate(section, job, enrichment, user, profile, masters, today, config)
        })
        .collect()
}

// ============================================================================
// ALLOCATION
// ============================================================================

pub struct AllocationInput<'a> {
    pub user: &'a User,
    pub profile: &'a UserProfile,
    /// Full ranked candidate list, descending; the top-K prefix is the
    /// primary pool, the rest exists for widening.
    pub ranked: &'a [Candidate],
    pub corpus: &'a ScoredCorpus,
    pub masters: &'a MasterCache,
    pub today: NaiveDate,
    pub config: &'a Config,
}

#[derive(Debug)]
pub struct AllocationOutcome {
    pub picks: Vec<DailyJobPick>,
    /// The eligible corpus could not fill the pick count even after widening
    pub low_inventory: bool,
    /// At least one pick came from the predicate-free borrow step
    pub fallback_used: bool,
}

fn quota_for(section: Section, config: &Config) -> usize {
    let quotas = &config.section_quotas;
    match section {
        Section::EditorialPicks => quotas.editorial,
        Section::Top5 => quotas.top5,
        Section::Regional => quotas.regional,
        Section::Nearby => quotas.nearby,
        Section::HighIncome => quotas.high_income,
        Section::New => quotas.new,
    }
}

fn editorial_key(candidate: &Candidate, input: &AllocationInput) -> f64 {
    let job = &input.corpus.jobs[candidate.job_index];
    let applications_30d = input
        .corpus
        .enrichment(candidate.job_id)
        .map(|e| e.applications_30d)
        .unwrap_or(0);
    job.fee as f64 * applications_30d as f64 * loc_weight(input.user, job, input.masters)
}

/// Order a section pool by its sort key. Pools arrive in ranked (score) order,
/// which already is the key for most sections.
fn sort_pool(section: Section, pool: &mut Vec<&Candidate>, input: &AllocationInput) {
    match section {
        Section::EditorialPicks => {
            pool.sort_by(|a, b| {
                editorial_key(b, input)
                    .partial_cmp(&editorial_key(a, input))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        b.score
                            .partial_cmp(&a.score)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .then_with(|| a.job_id.cmp(&b.job_id))
            });
        }
        Section::New => {
            pool.sort_by(|a, b| {
                b.posting_date
                    .cmp(&a.posting_date)
                    .then_with(|| {
                        b.score
                            .partial_cmp(&a.score)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .then_with(|| a.job_id.cmp(&b.job_id))
            });
        }
        _ => {}
    }
}

/// Assign exactly `total_picks` jobs into the six sections, in priority
/// order, deduplicating globally. Pure: same inputs, same picks.
pub fn allocate(input: &AllocationInput) -> AllocationOutcome {
    let total_picks = input.config.total_picks;
    let top_k = &input.ranked[..input.ranked.len().min(input.config.top_k)];

    let mut selected: HashSet<i64> = HashSet::with_capacity(total_picks);
    let mut picks: Vec<DailyJobPick> = Vec::with_capacity(total_picks);
    let mut fallback_used = false;

    for section in SECTION_ORDER {
        let quota = quota_for(section, input.config);
        let mut chosen: Vec<(&Candidate, Option<&'static str>)> = Vec::with_capacity(quota);

        // Primary pool: the user's top-K filtered by the section predicate.
        let mut pool: Vec<&Candidate> = top_k
            .iter()
            .filter(|c| !selected.contains(&c.job_id))
            .filter(|c| {
                let job = &input.corpus.jobs[c.job_index];
                base_predicate(
                    section,
                    job,
                    input.corpus.enrichment(c.job_id),
                    input.user,
                    input.profile,
                    input.masters,
                    input.today,
                    input.config,
                )
            })
            .collect();
        sort_pool(section, &mut pool, input);
        for candidate in pool.into_iter().take(quota) {
            chosen.push((candidate, None));
        }

        // Widening (a): the whole eligible corpus, same predicate.
        if chosen.len() < quota {
            let chosen_ids: HashSet<i64> = chosen.iter().map(|(c, _)| c.job_id).collect();
            let mut pool: Vec<&Candidate> = input
                .ranked
                .iter()
                .filter(|c| !selected.contains(&c.job_id) && !chosen_ids.contains(&c.job_id))
                .filter(|c| {
                    let job = &input.corpus.jobs[c.job_index];
                    base_predicate(
                        section,
                        job,
                        input.corpus.enrichment(c.job_id),
                        input.user,
                        input.profile,
                        input.masters,
                        input.today,
                        input.config,
                    )
                })
                .collect();
            sort_pool(section, &mut pool, input);
            for candidate in pool.into_iter().take(quota - chosen.len()) {
                chosen.push((candidate, None));
            }
        }

        // Widening (b): relax the predicate one step.
        if chosen.len() < quota {
            let chosen_ids: HashSet<i64> = chosen.iter().map(|(c, _)| c.job_id).collect();
            let mut pool: Vec<&Candidate> = input
                .ranked
                .iter()
                .filter(|c| !selected.contains(&c.job_id) && !chosen_ids.contains(&c.job_id))
                .filter(|c| {
                    let job = &input.corpus.jobs[c.job_index];
                    relaxed_predicate(
                        section,
                        job,
                        input.user,
                        input.corpus,
                        input.masters,
                        input.today,
                    )
                })
                .collect();
            sort_pool(section, &mut pool, input);
            for candidate in pool.into_iter().take(quota - chosen.len()) {
                chosen.push((candidate, Some("relaxed")));
            }
        }

        // Widening (c): borrow the best unselected candidates outright.
        // Editorial still never shows an employer the user just applied to.
        if chosen.len() < quota {
            let chosen_ids: HashSet<i64> = chosen.iter().map(|(c, _)| c.job_id).collect();
            let borrowable = input
                .ranked
                .iter()
                .filter(|c| !selected.contains(&c.job_id) && !chosen_ids.contains(&c.job_id))
                .filter(|c| {
                    section != Section::EditorialPicks
                        || !input
                            .profile
                            .recent_employers
                            .contains(&input.corpus.jobs[c.job_index].endcl_cd)
                })
                .take(quota - chosen.len());
            for candidate in borrowable {
                fallback_used = true;
                chosen.push((candidate, Some("fallback")));
            }
        }

        for (section_rank, (candidate, reason)) in chosen.into_iter().enumerate() {
            selected.insert(candidate.job_id);
            picks.push(DailyJobPick {
                user_id: input.user.user_id,
                job_id: candidate.job_id,
                pick_date: input.today,
                section,
                section_rank: (section_rank + 1) as i32,
                score: candidate.score,
                pick_reason: reason.map(str::to_string),
            });
        }
    }

    AllocationOutcome {
        low_inventory: picks.len() < total_picks,
        picks,
        fallback_used,
    }
}
