use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Lowest accepted rating value
pub const MIN_RATING: f64 = 1.0;
/// Highest accepted rating value
pub const MAX_RATING: f64 = 5.0;

/// One user's rating of one movie; `(user_id, tmdb_id)` is unique
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Rating {
    pub user_id: String,
    pub tmdb_id: String,
    pub rating: f64,
    pub updated_at: DateTime<Utc>,
}

/// A rating joined with the movie fields a client needs to display it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct DisplayRating {
    pub tmdb_id: String,
    pub tmdb_homepage: String,
    pub title: String,
    pub release_date: Option<NaiveDate>,
    pub rating: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddRatingRequest {
    pub tmdb_id: String,
    pub rating: f64,
}

impl AddRatingRequest {
    /// Checks a single item; failures only affect this item in a batch
    pub fn validate(&self) -> Result<(), String> {
        if self.tmdb_id.trim().is_empty() {
            return Err("tmdb_id cannot be empty".to_string());
        }
        if !self.rating.is_finite() || !(MIN_RATING..=MAX_RATING).contains(&self.rating) {
            return Err(format!(
                "rating must be within [{}, {}], got {}",
                MIN_RATING, MAX_RATING, self.rating
            ));
        }
        Ok(())
    }
}

/// Per-batch counts returned by the rating aggregator
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddRatingsResponse {
    pub cnt_added: usize,
    pub cnt_updated: usize,
    pub cnt_failed: usize,
}

/// Which branch a single rating write took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(tmdb_id: &str, rating: f64) -> AddRatingRequest {
        AddRatingRequest {
            tmdb_id: tmdb_id.to_string(),
            rating,
        }
    }

    #[test]
    fn test_validate_accepts_bounds() {
        assert!(request("603", 1.0).validate().is_ok());
        assert!(request("603", 5.0).validate().is_ok());
        assert!(request("603", 3.5).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(request("603", 0.5).validate().is_err());
        assert!(request("603", 5.5).validate().is_err());
        assert!(request("603", f64::NAN).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_id() {
        let err = request("  ", 4.0).validate().unwrap_err();
        assert!(err.contains("tmdb_id"));
    }
}
