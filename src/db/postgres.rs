use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    db::{MovieCatalog, RatingStore, UserStore},
    error::{AppError, AppResult},
    models::{DisplayRating, Movie, Rating, UpdateUserRequest, UpsertOutcome, User},
};

const MOVIE_COLUMNS: &str = "tmdb_id, tmdb_homepage, title, language, release_date, runtime, \
     director, actors, genres, keywords, overview, budget, revenue, popularity, vote_average, \
     vote_count";

const USER_COLUMNS: &str = "user_id, email, hashed_password, fname, lname, updated_at";

/// Creates a PostgreSQL connection pool
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Postgres-backed implementation of every store trait
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies pending migrations from `migrations/`
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait::async_trait]
impl MovieCatalog for PgStore {
    async fn get_by_ids(&self, ids: &[String]) -> AppResult<Vec<Movie>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let movies = sqlx::query_as::<_, Movie>(&format!(
            "SELECT {} FROM movies WHERE tmdb_id = ANY($1)",
            MOVIE_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(movies)
    }

    async fn get_movie(&self, tmdb_id: &str) -> AppResult<Option<Movie>> {
        let movie = sqlx::query_as::<_, Movie>(&format!(
            "SELECT {} FROM movies WHERE tmdb_id = $1",
            MOVIE_COLUMNS
        ))
        .bind(tmdb_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(movie)
    }

    async fn upsert_movie(&self, movie: &Movie) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO movies (tmdb_id, tmdb_homepage, title, language, release_date, runtime, \
             director, actors, genres, keywords, overview, budget, revenue, popularity, \
             vote_average, vote_count, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, NOW()) \
             ON CONFLICT (tmdb_id) DO UPDATE SET \
             tmdb_homepage = EXCLUDED.tmdb_homepage, title = EXCLUDED.title, \
             language = EXCLUDED.language, release_date = EXCLUDED.release_date, \
             runtime = EXCLUDED.runtime, director = EXCLUDED.director, \
             actors = EXCLUDED.actors, genres = EXCLUDED.genres, keywords = EXCLUDED.keywords, \
             overview = EXCLUDED.overview, budget = EXCLUDED.budget, \
             revenue = EXCLUDED.revenue, popularity = EXCLUDED.popularity, \
             vote_average = EXCLUDED.vote_average, vote_count = EXCLUDED.vote_count, \
             updated_at = EXCLUDED.updated_at",
        )
        .bind(&movie.tmdb_id)
        .bind(&movie.tmdb_homepage)
        .bind(&movie.title)
        .bind(&movie.language)
        .bind(movie.release_date)
        .bind(movie.runtime)
        .bind(&movie.director)
        .bind(&movie.actors)
        .bind(&movie.genres)
        .bind(&movie.keywords)
        .bind(&movie.overview)
        .bind(movie.budget)
        .bind(movie.revenue)
        .bind(movie.popularity)
        .bind(movie.vote_average)
        .bind(movie.vote_count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_movie(&self, tmdb_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM movies WHERE tmdb_id = $1")
            .bind(tmdb_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl RatingStore for PgStore {
    async fn ratings_for_user(&self, user_id: &str) -> AppResult<Vec<Rating>> {
        let ratings = sqlx::query_as::<_, Rating>(
            "SELECT user_id, tmdb_id, rating, updated_at FROM ratings \
             WHERE user_id = $1 ORDER BY tmdb_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ratings)
    }

    async fn display_ratings(&self, user_id: &str) -> AppResult<Vec<DisplayRating>> {
        let ratings = sqlx::query_as::<_, DisplayRating>(
            "SELECT m.tmdb_id, m.tmdb_homepage, m.title, m.release_date, r.rating \
             FROM ratings r JOIN movies m ON m.tmdb_id = r.tmdb_id \
             WHERE r.user_id = $1 \
             ORDER BY r.updated_at DESC, m.tmdb_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ratings)
    }

    async fn upsert_rating(&self, rating: &Rating) -> AppResult<UpsertOutcome> {
        // xmax is zero only for a freshly inserted row version
        let (inserted,): (bool,) = sqlx::query_as(
            "INSERT INTO ratings (user_id, tmdb_id, rating, updated_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id, tmdb_id) DO UPDATE SET \
             rating = EXCLUDED.rating, updated_at = EXCLUDED.updated_at \
             RETURNING (xmax = 0) AS inserted",
        )
        .bind(&rating.user_id)
        .bind(&rating.tmdb_id)
        .bind(rating.rating)
        .bind(rating.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(if inserted {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }
}

#[async_trait::async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: &User) -> AppResult<()> {
        let result = sqlx::query(
            "INSERT INTO users (user_id, email, hashed_password, fname, lname, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (email) DO NOTHING",
        )
        .bind(&user.user_id)
        .bind(&user.email)
        .bind(&user.hashed_password)
        .bind(&user.fname)
        .bind(&user.lname)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "Email {} is already registered",
                user.email
            )));
        }
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE user_id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn update_user(
        &self,
        user_id: &str,
        update: &UpdateUserRequest,
        updated_at: DateTime<Utc>,
    ) -> AppResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET email = $2, fname = $3, lname = $4, updated_at = $5 \
             WHERE user_id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(&update.email)
        .bind(&update.fname)
        .bind(&update.lname)
        .bind(updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Email {} is already registered", update.email))
            } else {
                AppError::Database(e)
            }
        })
    }

    async fn delete_user(&self, user_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
        assert!(!is_unique_violation(&sqlx::Error::PoolTimedOut));
    }

    #[test]
    fn test_movie_columns_match_model_fields() {
        let columns: Vec<&str> = MOVIE_COLUMNS.split(',').map(str::trim).collect();
        assert_eq!(columns.len(), 16);
        assert_eq!(columns[0], "tmdb_id");
        assert!(columns.contains(&"popularity"));
    }
}
