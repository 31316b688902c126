use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

/// A subscriber. Contact identity is an opaque token the external sender
/// resolves; the pipeline never sees raw addresses.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: i32,
    pub contact_token: String,
    /// Estimated home location, when known
    pub pref_cd: Option<String>,
    pub city_cd: Option<String>,
    pub is_active: bool,
    pub is_subscribed: bool,
}

// ============================================================================
// ACTIONS
// ============================================================================

/// Closed set of tracked behaviors. Extending it is a code change on purpose:
/// every consumer (profile weights, popularity windows) must decide how a new
/// type counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "action_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    View,
    Click,
    Apply,
    Application,
    EmailOpen,
    EmailClick,
    Favorite,
    Save,
    Share,
}

impl ActionType {
    /// Parse a stored tag. Returns None for retired types that may linger in
    /// the append-only history; callers skip those with a warning.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "view" => Some(ActionType::View),
            "click" => Some(ActionType::Click),
            "apply" => Some(ActionType::Apply),
            "application" => Some(ActionType::Application),
            "email_open" => Some(ActionType::EmailOpen),
            "email_click" => Some(ActionType::EmailClick),
            "favorite" => Some(ActionType::Favorite),
            "save" => Some(ActionType::Save),
            "share" => Some(ActionType::Share),
            _ => None,
        }
    }

    /// `apply` and `application` are the same intent recorded by two
    /// different upstream surfaces.
    pub fn is_application(self) -> bool {
        matches!(self, ActionType::Apply | ActionType::Application)
    }

    /// Contribution to the preference frequency maps; None means the action
    /// carries no preference signal.
    pub fn profile_weight(self) -> Option<u32> {
        match self {
            ActionType::Apply | ActionType::Application => Some(3),
            ActionType::Click | ActionType::EmailClick => Some(1),
            _ => None,
        }
    }
}

/// One row of the append-only action history (partitioned by month).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserAction {
    pub user_id: i32,
    pub job_id: Option<i64>,
    pub endcl_cd: Option<String>,
    pub action_type: ActionType,
    pub action_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_weight_is_three() {
        assert_eq!(ActionType::Apply.profile_weight(), Some(3));
        assert_eq!(ActionType::Application.profile_weight(), Some(3));
    }

    #[test]
    fn click_weights_are_one() {
        assert_eq!(ActionType::Click.profile_weight(), Some(1));
        assert_eq!(ActionType::EmailClick.profile_weight(), Some(1));
    }

    #[test]
    fn passive_actions_carry_no_weight() {
        for action in [
            ActionType::View,
            ActionType::EmailOpen,
            ActionType::Favorite,
            ActionType::Save,
            ActionType::Share,
        ] {
            assert_eq!(action.profile_weight(), None);
        }
    }

    #[test]
    fn both_apply_variants_are_applications() {
        assert!(ActionType::Apply.is_application());
        assert!(ActionType::Application.is_application());
        assert!(!ActionType::Click.is_application());
    }
}
