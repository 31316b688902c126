use std::collections::HashMap;

use sqlx::PgPool;

use crate::error::{PipelineError, Result};
use crate::models::master::{City, EmploymentType, FeatureMaster, Occupation, Prefecture, SeoKeyword};

/// In-memory master data for one run. Loaded once before Ingest, read-only
/// afterwards, shared across workers behind an Arc.
pub struct MasterCache {
    prefectures: HashMap<String, Prefecture>,
    cities: HashMap<String, City>,
    occupations: HashMap<String, Occupation>,
    employment_types: HashMap<i16, EmploymentType>,
    features: HashMap<String, FeatureMaster>,
    keywords: Vec<SeoKeyword>,
}

impl MasterCache {
    pub async fn load(db: &PgPool) -> Result<Self> {
        let prefectures: Vec<Prefecture> =
            sqlx::query_as("SELECT pref_cd, name, region FROM prefectures")
                .fetch_all(db)
                .await?;

        let cities: Vec<City> = sqlx::query_as(
            "SELECT city_cd, pref_cd, name, latitude, longitude, adjacent_city_cds FROM cities",
        )
        .fetch_all(db)
        .await?;

        let occupations: Vec<Occupation> =
            sqlx::query_as("SELECT occupation_cd, name FROM occupations")
                .fetch_all(db)
                .await?;

        let employment_types: Vec<EmploymentType> =
            sqlx::query_as("SELECT employment_type_cd, name FROM employment_types")
                .fetch_all(db)
                .await?;

        let features: Vec<FeatureMaster> =
            sqlx::query_as("SELECT feature_cd, name FROM features")
                .fetch_all(db)
                .await?;

        let keywords: Vec<SeoKeyword> = sqlx::query_as(
            "SELECT keyword, search_volume, difficulty, category \
             FROM seo_keywords ORDER BY search_volume DESC, keyword",
        )
        .fetch_all(db)
        .await?;

        let cache = Self::from_parts(
            prefectures,
            cities,
            occupations,
            employment_types,
            features,
            keywords,
        )?;

        tracing::info!(
            prefectures = cache.prefectures.len(),
            cities = cache.cities.len(),
            occupations = cache.occupations.len(),
            employment_types = cache.employment_types.len(),
            features = cache.features.len(),
            keywords = cache.keywords.len(),
            "master cache loaded"
        );

        Ok(cache)
    }

    /// Build from already-loaded rows. Fails fast on empty masters or a city
    /// referencing a missing prefecture; a dangling adjacency code is only a
    /// warning (curated adjacency data can lag a municipal merger).
    pub fn from_parts(
        prefectures: Vec<Prefecture>,
        cities: Vec<City>,
        occupations: Vec<Occupation>,
        employment_types: Vec<EmploymentType>,
        features: Vec<FeatureMaster>,
        keywords: Vec<SeoKeyword>,
    ) -> Result<Self> {
        if prefectures.is_empty() {
            return Err(PipelineError::MasterData("prefectures table is empty".into()));
        }
        if cities.is_empty() {
            return Err(PipelineError::MasterData("cities table is empty".into()));
        }
        if employment_types.is_empty() {
            return Err(PipelineError::MasterData("employment_types table is empty".into()));
        }

        let prefectures: HashMap<String, Prefecture> = prefectures
            .into_iter()
            .map(|p| (p.pref_cd.clone(), p))
            .collect();

        for city in &cities {
            if !prefectures.contains_key(&city.pref_cd) {
                return Err(PipelineError::MasterData(format!(
                    "city {} references missing prefecture {}",
                    city.city_cd, city.pref_cd
                )));
            }
        }

        let cities: HashMap<String, City> =
            cities.into_iter().map(|c| (c.city_cd.clone(), c)).collect();

        for city in cities.values() {
            for adjacent in &city.adjacent_city_cds {
                if !cities.contains_key(adjacent) {
                    tracing::warn!(
                        city_cd = %city.city_cd,
                        adjacent_cd = %adjacent,
                        "adjacency references unknown city; ignoring"
                    );
                }
            }
        }

        Ok(Self {
            prefectures,
            cities,
            occupations: occupations
                .into_iter()
                .map(|o| (o.occupation_cd.clone(), o))
                .collect(),
            employment_types: employment_types
                .into_iter()
                .map(|e| (e.employment_type_cd, e))
                .collect(),
            features: features
                .into_iter()
                .map(|f| (f.feature_cd.clone(), f))
                .collect(),
            keywords,
        })
    }

    pub fn has_prefecture(&self, pref_cd: &str) -> bool {
        self.prefectures.contains_key(pref_cd)
    }

    pub fn has_city(&self, city_cd: &str) -> bool {
        self.cities.contains_key(city_cd)
    }

    pub fn city(&self, city_cd: &str) -> Option<&City> {
        self.cities.get(city_cd)
    }

    /// Region grouping of a prefecture, for the regional widening fallback.
    pub fn region_of(&self, pref_cd: &str) -> Option<&str> {
        self.prefectures.get(pref_cd).map(|p| p.region.as_str())
    }

    /// Curated adjacency list for a city; empty when the city is unknown.
    pub fn adjacent_cities(&self, city_cd: &str) -> &[String] {
        self.cities
            .get(city_cd)
            .map(|c| c.adjacent_city_cds.as_slice())
            .unwrap_or(&[])
    }

    /// True when `other` is `city_cd` itself or in its adjacency set.
    pub fn is_same_or_adjacent(&self, city_cd: &str, other: &str) -> bool {
        city_cd == other || self.adjacent_cities(city_cd).iter().any(|c| c == other)
    }

    pub fn has_occupation(&self, occupation_cd: &str) -> bool {
        self.occupations.contains_key(occupation_cd)
    }

    pub fn has_employment_type(&self, employment_type_cd: i16) -> bool {
        self.employment_types.contains_key(&employment_type_cd)
    }

    pub fn feature_name(&self, feature_cd: &str) -> Option<&str> {
        self.features.get(feature_cd).map(|f| f.name.as_str())
    }

    pub fn keywords(&self) -> &[SeoKeyword] {
        &self.keywords
    }
}
