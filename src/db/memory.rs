use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    db::{MovieCatalog, RatingStore, UserStore},
    error::{AppError, AppResult},
    models::{DisplayRating, Movie, Rating, UpdateUserRequest, UpsertOutcome, User},
};

/// In-memory store for running without Postgres and for tests.
///
/// Every write takes the single write lock, so the email-uniqueness check and
/// the insert happen as one unit just like the conditional insert in Postgres.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    users: HashMap<String, User>,
    movies: HashMap<String, Movie>,
    /// user_id → (tmdb_id → rating)
    ratings: HashMap<String, BTreeMap<String, Rating>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl MovieCatalog for MemoryStore {
    async fn get_by_ids(&self, ids: &[String]) -> AppResult<Vec<Movie>> {
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.movies.get(id).cloned())
            .collect())
    }

    async fn get_movie(&self, tmdb_id: &str) -> AppResult<Option<Movie>> {
        Ok(self.inner.read().await.movies.get(tmdb_id).cloned())
    }

    async fn upsert_movie(&self, movie: &Movie) -> AppResult<()> {
        self.inner
            .write()
            .await
            .movies
            .insert(movie.tmdb_id.clone(), movie.clone());
        Ok(())
    }

    async fn delete_movie(&self, tmdb_id: &str) -> AppResult<bool> {
        Ok(self.inner.write().await.movies.remove(tmdb_id).is_some())
    }
}

#[async_trait::async_trait]
impl RatingStore for MemoryStore {
    async fn ratings_for_user(&self, user_id: &str) -> AppResult<Vec<Rating>> {
        let inner = self.inner.read().await;
        Ok(inner
            .ratings
            .get(user_id)
            .map(|by_movie| by_movie.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn display_ratings(&self, user_id: &str) -> AppResult<Vec<DisplayRating>> {
        let inner = self.inner.read().await;
        let Some(by_movie) = inner.ratings.get(user_id) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<(DateTime<Utc>, DisplayRating)> = by_movie
            .values()
            .filter_map(|rating| {
                inner.movies.get(&rating.tmdb_id).map(|movie| {
                    (
                        rating.updated_at,
                        DisplayRating {
                            tmdb_id: movie.tmdb_id.clone(),
                            tmdb_homepage: movie.tmdb_homepage.clone(),
                            title: movie.title.clone(),
                            release_date: movie.release_date,
                            rating: rating.rating,
                        },
                    )
                })
            })
            .collect();

        rows.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.tmdb_id.cmp(&b.1.tmdb_id)));
        Ok(rows.into_iter().map(|(_, row)| row).collect())
    }

    async fn upsert_rating(&self, rating: &Rating) -> AppResult<UpsertOutcome> {
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(&rating.user_id) {
            return Err(AppError::NotFound(format!("User {} not found", rating.user_id)));
        }

        let previous = inner
            .ratings
            .entry(rating.user_id.clone())
            .or_default()
            .insert(rating.tmdb_id.clone(), rating.clone());

        Ok(match previous {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        })
    }
}

#[async_trait::async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: &User) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.email == user.email) {
            return Err(AppError::Conflict(format!(
                "Email {} is already registered",
                user.email
            )));
        }
        inner.users.insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> AppResult<Option<User>> {
        Ok(self.inner.read().await.users.get(user_id).cloned())
    }

    async fn update_user(
        &self,
        user_id: &str,
        update: &UpdateUserRequest,
        updated_at: DateTime<Utc>,
    ) -> AppResult<Option<User>> {
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(user_id) {
            return Ok(None);
        }
        if inner
            .users
            .values()
            .any(|u| u.email == update.email && u.user_id != user_id)
        {
            return Err(AppError::Conflict(format!(
                "Email {} is already registered",
                update.email
            )));
        }

        Ok(inner.users.get_mut(user_id).map(|user| {
            user.email = update.email.clone();
            user.fname = update.fname.clone();
            user.lname = update.lname.clone();
            user.updated_at = updated_at;
            user.clone()
        }))
    }

    async fn delete_user(&self, user_id: &str) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        inner.ratings.remove(user_id);
        Ok(inner.users.remove(user_id).is_some())
    }
}
