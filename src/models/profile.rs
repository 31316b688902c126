use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Salary aggregates over the midpoints of the user's applied jobs, in yen
/// per the job's own salary period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SalaryStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// Per-user derived preference state, rebuilt each run from the action
/// history and frozen before matching starts.
///
/// The source schema carries these maps as "code:count" strings; they are
/// parsed into typed maps at load and only serialized back at the
/// persistence edge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: i32,

    // Preference frequency maps (code → weighted count)
    pub pref_freq: HashMap<String, u32>,
    pub city_freq: HashMap<String, u32>,
    pub occupation_freq: HashMap<String, u32>,
    pub employment_freq: HashMap<i16, u32>,
    pub employer_freq: HashMap<String, u32>,

    pub salary: Option<SalaryStats>,

    // Rolling counters over the profile window
    pub application_count: u32,
    pub click_count: u32,
    pub view_count: u32,
    pub last_application_date: Option<NaiveDate>,

    /// Employers the user applied to within the recent window (14 days);
    /// consulted at match time for the dedup penalty.
    pub recent_employers: HashSet<String>,
}

impl UserProfile {
    pub fn new(user_id: i32) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }

    /// True when the user has no preference signal at all; the matcher then
    /// substitutes the neutral affinity.
    pub fn is_empty(&self) -> bool {
        self.pref_freq.is_empty()
            && self.city_freq.is_empty()
            && self.occupation_freq.is_empty()
            && self.employment_freq.is_empty()
            && self.employer_freq.is_empty()
            && self.salary.is_none()
    }
}

/// Largest count in a frequency map; 0 for an empty map.
pub fn max_freq<K>(map: &HashMap<K, u32>) -> u32
where
    K: std::hash::Hash + Eq,
{
    map.values().copied().max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_profile_is_empty() {
        let profile = UserProfile::new(7);
        assert!(profile.is_empty());
        assert_eq!(profile.user_id, 7);
    }

    #[test]
    fn any_frequency_makes_profile_non_empty() {
        let mut profile = UserProfile::new(7);
        profile.occupation_freq.insert("100".to_string(), 3);
        assert!(!profile.is_empty());
    }

    #[test]
    fn max_freq_of_empty_map_is_zero() {
        let map: HashMap<String, u32> = HashMap::new();
        assert_eq!(max_freq(&map), 0);
    }
}
