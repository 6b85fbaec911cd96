//! Relational storage for users, movies and ratings.
//!
//! Services depend on the store traits below; [`PgStore`] backs them with
//! PostgreSQL and [`MemoryStore`] with process memory (no `DATABASE_URL`, tests).
use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    models::{DisplayRating, Movie, Rating, UpdateUserRequest, UpsertOutcome, User},
};

pub mod memory;
pub mod postgres;
pub mod redis;

pub use memory::MemoryStore;
pub use postgres::{create_pool, PgStore};
pub use self::redis::create_redis_client;
pub use self::redis::Cache;
pub use self::redis::CacheKey;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MovieCatalog: Send + Sync {
    /// Movies for the given ids in no particular order; unknown ids are skipped
    async fn get_by_ids(&self, ids: &[String]) -> AppResult<Vec<Movie>>;

    async fn get_movie(&self, tmdb_id: &str) -> AppResult<Option<Movie>>;

    /// Creates or replaces the movie with the same `tmdb_id`
    async fn upsert_movie(&self, movie: &Movie) -> AppResult<()>;

    /// Returns whether a movie was removed
    async fn delete_movie(&self, tmdb_id: &str) -> AppResult<bool>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RatingStore: Send + Sync {
    /// All ratings by one user, ordered by `tmdb_id`
    async fn ratings_for_user(&self, user_id: &str) -> AppResult<Vec<Rating>>;

    /// A user's ratings joined with catalog fields, most recent first
    async fn display_ratings(&self, user_id: &str) -> AppResult<Vec<DisplayRating>>;

    /// Inserts the rating, or updates the existing one for the same
    /// `(user_id, tmdb_id)`, in a single atomic write
    async fn upsert_rating(&self, rating: &Rating) -> AppResult<UpsertOutcome>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a new user; `Conflict` when the email is already registered
    async fn create_user(&self, user: &User) -> AppResult<()>;

    async fn get_user(&self, user_id: &str) -> AppResult<Option<User>>;

    /// Updates profile fields; `None` when the user does not exist and
    /// `Conflict` when the new email belongs to another user
    async fn update_user(
        &self,
        user_id: &str,
        update: &UpdateUserRequest,
        updated_at: DateTime<Utc>,
    ) -> AppResult<Option<User>>;

    /// Removes the user and their ratings; returns whether a user was removed
    async fn delete_user(&self, user_id: &str) -> AppResult<bool>;
}
