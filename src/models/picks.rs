use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;

// ============================================================================
// SECTIONS
// ============================================================================

/// The six themed mail sections, in allocation priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "mail_section", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Section {
    EditorialPicks,
    Top5,
    Regional,
    Nearby,
    HighIncome,
    New,
}

/// Fixed processing order: once a section places a job, later sections may
/// not reuse it.
pub const SECTION_ORDER: [Section; 6] = [
    Section::EditorialPicks,
    Section::Top5,
    Section::Regional,
    Section::Nearby,
    Section::HighIncome,
    Section::New,
];

impl Section {
    pub fn as_str(self) -> &'static str {
        match self {
            Section::EditorialPicks => "editorial_picks",
            Section::Top5 => "top5",
            Section::Regional => "regional",
            Section::Nearby => "nearby",
            Section::HighIncome => "high_income",
            Section::New => "new",
        }
    }
}

// ============================================================================
// PER-BATCH SCORING ARTIFACTS
// ============================================================================

/// One row of the per-user candidate matrix (top-K only), partitioned by
/// batch_date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserJobMapping {
    pub user_id: i32,
    pub job_id: i64,
    pub batch_date: NaiveDate,
    /// Per-user composite (job composite blended with affinity, after penalty)
    pub score: f64,
    /// 1-based rank within the user's candidate list
    pub rank: i32,
    /// Sections whose predicate this candidate satisfies for this user
    pub section_hints: Vec<Section>,
}

/// One of the user's picks for the day. Unique per (user_id, job_id,
/// pick_date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyJobPick {
    pub user_id: i32,
    pub job_id: i64,
    pub pick_date: NaiveDate,
    pub section: Section,
    /// 1-based within the section, in sort-key order
    pub section_rank: i32,
    pub score: f64,
    /// Set when the pick came from a widened pool ("fallback", "relaxed")
    pub pick_reason: Option<String>,
}

// ============================================================================
// DELIVERY QUEUE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "queue_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Sent,
    Failed,
    Cancelled,
}

/// One delivery row per (user, scheduled_date). The external renderer expands
/// the subject template and body from the referenced picks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyEmailQueue {
    pub user_id: i32,
    pub scheduled_date: NaiveDate,
    pub subject_template: String,
    pub recipient: String,
    /// Pick job ids in section order
    pub pick_job_ids: Vec<i64>,
    /// Generator name, template version, fallback usage
    pub generator_meta: serde_json::Value,
    pub status: QueueStatus,
    pub retry_count: i32,
    pub low_inventory: bool,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_order_is_the_contract_order() {
        let names: Vec<&str> = SECTION_ORDER.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            vec!["editorial_picks", "top5", "regional", "nearby", "high_income", "new"]
        );
    }
}
