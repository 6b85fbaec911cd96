use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::null_as_empty;

/// Catalog entry, identified by its TMDB id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Movie {
    pub tmdb_id: String,
    #[serde(default)]
    pub tmdb_homepage: String,
    pub title: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    /// Runtime in minutes
    #[serde(default)]
    pub runtime: i32,
    #[serde(default)]
    pub director: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub actors: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub genres: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub budget: i64,
    #[serde(default)]
    pub revenue: i64,
    #[serde(default)]
    pub popularity: f64,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub vote_count: i32,
}

impl Movie {
    /// Minimal catalog entry; remaining attributes take their empty defaults
    pub fn new(tmdb_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            tmdb_id: tmdb_id.into(),
            tmdb_homepage: String::new(),
            title: title.into(),
            language: String::new(),
            release_date: None,
            runtime: 0,
            director: String::new(),
            actors: Vec::new(),
            genres: Vec::new(),
            keywords: Vec::new(),
            overview: String::new(),
            budget: 0,
            revenue: 0,
            popularity: 0.0,
            vote_average: 0.0,
            vote_count: 0,
        }
    }

    pub fn with_popularity(mut self, popularity: f64) -> Self {
        self.popularity = popularity;
        self
    }
}
