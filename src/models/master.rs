use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Prefecture master row (JIS code, display name, region grouping).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Prefecture {
    pub pref_cd: String,
    pub name: String,
    /// Region grouping ("関東", "関西", ...) used by the regional fallback
    pub region: String,
}

/// City master row. `adjacent_city_cds` is curated ground truth — adjacency is
/// never derived from coordinates at run time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct City {
    pub city_cd: String,
    pub pref_cd: String,
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub adjacent_city_cds: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Occupation {
    pub occupation_cd: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmploymentType {
    pub employment_type_cd: i16,
    pub name: String,
}

/// Feature-code master row ("D01" = daily payment, "S01" = student welcome, ...).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeatureMaster {
    pub feature_cd: String,
    pub name: String,
}

/// One SEMrush keyword row used by the SEO score.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SeoKeyword {
    pub keyword: String,
    pub search_volume: i64,
    pub difficulty: Option<f64>,
    pub category: Option<String>,
}

impl SeoKeyword {
    /// Base points by search-volume tier.
    pub fn base_points(&self) -> f64 {
        if self.search_volume >= 10_000 {
            15.0
        } else if self.search_volume >= 5_000 {
            10.0
        } else if self.search_volume >= 1_000 {
            7.0
        } else {
            3.0
        }
    }
}
