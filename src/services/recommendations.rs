//! Ranking engine: turns collaborative, semantic and popularity signals into
//! one ordered list of recommendations.
//!
//! Every flow ends the same way: a [`ScoreSeries`] is ordered with
//! [`score::rank`] (descending score, ascending id on ties), hydrated from the
//! catalog in that order and cut to the first `k` catalogued movies. Collaborator calls are bounded by
//! `upstream_timeout`; no flow retries.
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use crate::{
    config::Config,
    db::{MovieCatalog, RatingStore},
    error::{AppError, AppResult},
    models::{Movie, Recommendation},
    services::{
        providers::{EmbeddingProvider, Namespace, VectorIndex},
        score::{self, ScoreSeries},
        with_timeout,
    },
};

/// Liked movies used as seeds for the collaborative neighbor search
const MAX_SEEDS: usize = 20;

/// Ceiling on neighbors requested per seed
const MAX_NEIGHBORS_PER_SEED: usize = 1000;

#[derive(Debug, Clone)]
pub struct RankingConfig {
    /// Default weight of the query-match signal in blended rankings
    pub query_score_weight: f64,
    pub liked_rating_threshold: f64,
    /// Minimum number of candidates pulled from an index before ranking
    pub candidate_pool_size: usize,
    pub max_k: usize,
    pub upstream_timeout: Duration,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            query_score_weight: 0.8,
            liked_rating_threshold: 3.5,
            candidate_pool_size: 50,
            max_k: 100,
            upstream_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&Config> for RankingConfig {
    fn from(config: &Config) -> Self {
        Self {
            query_score_weight: config.query_score_weight,
            liked_rating_threshold: config.liked_rating_threshold,
            candidate_pool_size: config.candidate_pool_size,
            max_k: config.max_k,
            upstream_timeout: config.upstream_timeout(),
        }
    }
}

#[derive(Clone)]
pub struct RankingEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    content_index: Arc<dyn VectorIndex>,
    collaborative_index: Arc<dyn VectorIndex>,
    catalog: Arc<dyn MovieCatalog>,
    ratings: Arc<dyn RatingStore>,
    config: RankingConfig,
}

impl RankingEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        content_index: Arc<dyn VectorIndex>,
        collaborative_index: Arc<dyn VectorIndex>,
        catalog: Arc<dyn MovieCatalog>,
        ratings: Arc<dyn RatingStore>,
        config: RankingConfig,
    ) -> Self {
        Self {
            embedder,
            content_index,
            collaborative_index,
            catalog,
            ratings,
            config,
        }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Collaborative recommendations from the user's liked movies.
    ///
    /// Candidates are neighbors of the liked movies in the collaborative
    /// index, minus everything the user already rated. Each is scored by its
    /// mean cosine similarity to the liked movies. A user without ratings, or
    /// whose ratings are all below the like threshold, gets an empty list.
    #[instrument(skip(self))]
    pub async fn recommend_for_user(
        &self,
        user_id: &str,
        k: usize,
    ) -> AppResult<Vec<Recommendation>> {
        self.validate_k(k)?;

        let ratings = with_timeout(
            self.config.upstream_timeout,
            "rating store",
            self.ratings.ratings_for_user(user_id),
        )
        .await?;

        if ratings.is_empty() {
            tracing::info!(user_id = %user_id, "User has no ratings, nothing to recommend");
            return Ok(Vec::new());
        }

        let rated: BTreeSet<&str> = ratings.iter().map(|r| r.tmdb_id.as_str()).collect();

        let mut liked: Vec<_> = ratings
            .iter()
            .filter(|r| r.rating >= self.config.liked_rating_threshold)
            .collect();
        if liked.is_empty() {
            tracing::info!(
                user_id = %user_id,
                rated = ratings.len(),
                threshold = self.config.liked_rating_threshold,
                "No ratings at or above the like threshold"
            );
            return Ok(Vec::new());
        }

        // Strongest likes seed the neighbor search; every like is scored against
        liked.sort_by(|a, b| {
            b.rating
                .total_cmp(&a.rating)
                .then_with(|| a.tmdb_id.cmp(&b.tmdb_id))
        });
        let liked_ids: Vec<String> = liked.iter().map(|r| r.tmdb_id.clone()).collect();

        let liked_vectors = self
            .fetch_vectors(&self.collaborative_index, Namespace::Movies, &liked_ids)
            .await?;
        let liked_embeddings: Vec<&[f32]> = liked_ids
            .iter()
            .filter_map(|id| liked_vectors.get(id).map(Vec::as_slice))
            .collect();

        if liked_embeddings.is_empty() {
            tracing::warn!(
                user_id = %user_id,
                liked = liked_ids.len(),
                "No collaborative embeddings for any liked movie"
            );
            return Ok(Vec::new());
        }
        let seeds = &liked_embeddings[..liked_embeddings.len().min(MAX_SEEDS)];

        let per_seed = (self.config.candidate_pool_size.max(k) + rated.len())
            .min(MAX_NEIGHBORS_PER_SEED);
        let neighbor_lists = futures::future::try_join_all(seeds.iter().map(|seed| {
            with_timeout(
                self.config.upstream_timeout,
                self.collaborative_index.name(),
                self.collaborative_index
                    .query(Namespace::Movies, seed, per_seed),
            )
        }))
        .await?;

        let candidate_ids: Vec<String> = neighbor_lists
            .into_iter()
            .flatten()
            .map(|m| m.id)
            .filter(|id| !rated.contains(id.as_str()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let candidate_vectors = self
            .fetch_vectors(&self.collaborative_index, Namespace::Movies, &candidate_ids)
            .await?;

        let affinity: ScoreSeries = candidate_vectors
            .iter()
            .filter(|(id, _)| !rated.contains(id.as_str()))
            .filter_map(|(id, vector)| {
                score::mean_cosine_similarity(vector, &liked_embeddings)
                    .map(|s| (id.clone(), s))
            })
            .collect();

        let recommendations = self.hydrate(score::rank(&affinity), k).await?;

        tracing::info!(
            user_id = %user_id,
            liked = liked_embeddings.len(),
            seeds = seeds.len(),
            candidates = affinity.len(),
            returned = recommendations.len(),
            "User recommendations ranked"
        );
        Ok(recommendations)
    }

    /// Semantic recommendations for free text, scored by content-index similarity
    #[instrument(skip(self))]
    pub async fn recommend_for_query(
        &self,
        query: &str,
        k: usize,
    ) -> AppResult<Vec<Recommendation>> {
        self.validate_k(k)?;
        let query = validate_query(query)?;

        let embedding = self.embed(query).await?;
        let query_scores = self.query_content(&embedding, k).await?;

        let ranked = score::rank(&score::combine(&[(&query_scores, 1.0)]));
        let recommendations = self.hydrate(ranked, k).await?;

        tracing::info!(
            matches = query_scores.len(),
            returned = recommendations.len(),
            "Query recommendations ranked"
        );
        Ok(recommendations)
    }

    /// Blends query similarity with per-user affinity.
    ///
    /// Affinity is the cosine similarity between the user's collaborative
    /// embedding and each candidate's. Without a user, or when the user has
    /// no collaborative embedding yet, candidate popularity stands in. Both
    /// series are min-max normalized, then combined as
    /// `weight * query + (1 - weight) * affinity`.
    #[instrument(skip(self))]
    pub async fn recommend_for_user_and_query(
        &self,
        user_id: Option<&str>,
        query: &str,
        k: usize,
        weight: Option<f64>,
    ) -> AppResult<Vec<Recommendation>> {
        self.validate_k(k)?;
        let query = validate_query(query)?;
        let weight = match weight {
            Some(w) if w > 0.0 && w < 1.0 => w,
            Some(w) => {
                return Err(AppError::Validation(format!(
                    "weight must be strictly between 0 and 1, got {}",
                    w
                )))
            }
            None => self.config.query_score_weight,
        };

        let (embedding, user_vector) = match user_id {
            Some(user_id) => {
                tokio::try_join!(self.embed(query), self.user_vector(user_id))?
            }
            None => (self.embed(query).await?, None),
        };

        let pool = self.config.candidate_pool_size.max(k);
        let query_scores = self.query_content(&embedding, pool).await?;
        if query_scores.is_empty() {
            return Ok(Vec::new());
        }
        let candidate_ids: Vec<String> = query_scores.ids().cloned().collect();

        let (affinity, movies) = match user_vector {
            Some(user_vector) => {
                let vectors = self
                    .fetch_vectors(&self.collaborative_index, Namespace::Movies, &candidate_ids)
                    .await?;
                let affinity: ScoreSeries = vectors
                    .iter()
                    .filter_map(|(id, v)| {
                        score::cosine_similarity(&user_vector, v).map(|s| (id.clone(), s))
                    })
                    .collect();
                (affinity, None)
            }
            None => {
                if let Some(user_id) = user_id {
                    tracing::warn!(
                        user_id = %user_id,
                        "No collaborative embedding for user, ranking by popularity"
                    );
                }
                let movies = self.fetch_movies(&candidate_ids).await?;
                let popularity: ScoreSeries = movies
                    .values()
                    .map(|m| (m.tmdb_id.clone(), m.popularity))
                    .collect();
                (popularity, Some(movies))
            }
        };

        let combined = score::combine(&[
            (&score::normalize(&query_scores), weight),
            (&score::normalize(&affinity), 1.0 - weight),
        ]);
        let ranked = score::rank(&combined);

        let movies = match movies {
            Some(movies) => movies,
            None => {
                let ids: Vec<String> = ranked.iter().map(|(id, _)| id.clone()).collect();
                self.fetch_movies(&ids).await?
            }
        };
        let recommendations = attach_movies(ranked, &movies, k);

        tracing::info!(
            personalized = user_id.is_some(),
            weight,
            candidates = combined.len(),
            returned = recommendations.len(),
            "Blended recommendations ranked"
        );
        Ok(recommendations)
    }

    fn validate_k(&self, k: usize) -> AppResult<()> {
        if k == 0 || k > self.config.max_k {
            return Err(AppError::Validation(format!(
                "k must be between 1 and {}, got {}",
                self.config.max_k, k
            )));
        }
        Ok(())
    }

    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        with_timeout(
            self.config.upstream_timeout,
            "embedding provider",
            self.embedder.embed(text),
        )
        .await
    }

    /// The user's collaborative embedding, `None` if the index has none
    async fn user_vector(&self, user_id: &str) -> AppResult<Option<Vec<f32>>> {
        let ids = [user_id.to_string()];
        let mut vectors = self
            .fetch_vectors(&self.collaborative_index, Namespace::Users, &ids)
            .await?;
        Ok(vectors.remove(user_id))
    }

    async fn query_content(&self, embedding: &[f32], top_k: usize) -> AppResult<ScoreSeries> {
        let matches = with_timeout(
            self.config.upstream_timeout,
            self.content_index.name(),
            self.content_index.query(Namespace::Default, embedding, top_k),
        )
        .await?;

        Ok(matches.into_iter().map(|m| (m.id, m.score)).collect())
    }

    async fn fetch_vectors(
        &self,
        index: &Arc<dyn VectorIndex>,
        namespace: Namespace,
        ids: &[String],
    ) -> AppResult<HashMap<String, Vec<f32>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        with_timeout(
            self.config.upstream_timeout,
            index.name(),
            index.fetch(namespace, ids),
        )
        .await
    }

    async fn fetch_movies(&self, ids: &[String]) -> AppResult<HashMap<String, Movie>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let movies = with_timeout(
            self.config.upstream_timeout,
            "movie catalog",
            self.catalog.get_by_ids(ids),
        )
        .await?;

        Ok(movies.into_iter().map(|m| (m.tmdb_id.clone(), m)).collect())
    }

    /// Attaches catalog records to the full ranking, then keeps the first `k`
    /// that the catalog knows
    async fn hydrate(&self, ranked: Vec<(String, f64)>, k: usize) -> AppResult<Vec<Recommendation>> {
        let ids: Vec<String> = ranked.iter().map(|(id, _)| id.clone()).collect();
        let movies = self.fetch_movies(&ids).await?;
        Ok(attach_movies(ranked, &movies, k))
    }
}

fn validate_query(query: &str) -> AppResult<&str> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("query cannot be empty".to_string()));
    }
    Ok(trimmed)
}

/// Pairs ranked ids with catalog records, keeping rank order, up to `k`.
/// Ids the catalog does not know are dropped and the next ranked id moves up.
fn attach_movies(
    ranked: Vec<(String, f64)>,
    movies: &HashMap<String, Movie>,
    k: usize,
) -> Vec<Recommendation> {
    let mut missing = Vec::new();
    let mut recommendations = Vec::with_capacity(k.min(ranked.len()));
    for (id, score) in ranked {
        if recommendations.len() == k {
            break;
        }
        match movies.get(&id) {
            Some(movie) => recommendations.push(Recommendation {
                movie: movie.clone(),
                score,
            }),
            None => missing.push(id),
        }
    }

    if !missing.is_empty() {
        tracing::warn!(
            missing_count = missing.len(),
            missing = ?missing,
            "Ranked movies missing from catalog"
        );
    }
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, UserStore};
    use crate::models::{Rating, User};
    use crate::services::providers::{IndexMatch, MockEmbeddingProvider, MockVectorIndex};
    use chrono::Utc;
    use std::collections::BTreeMap;

    /// Exact-search index over fixed vectors
    #[derive(Default)]
    struct FakeIndex {
        vectors: HashMap<Namespace, BTreeMap<String, Vec<f32>>>,
        /// Raw scores returned for content queries, bypassing vector math
        fixed_matches: Option<Vec<IndexMatch>>,
    }

    impl FakeIndex {
        fn with(mut self, namespace: Namespace, id: &str, vector: Vec<f32>) -> Self {
            self.vectors
                .entry(namespace)
                .or_default()
                .insert(id.to_string(), vector);
            self
        }

        fn with_matches(mut self, matches: &[(&str, f64)]) -> Self {
            self.fixed_matches = Some(
                matches
                    .iter()
                    .map(|(id, score)| IndexMatch {
                        id: id.to_string(),
                        score: *score,
                    })
                    .collect(),
            );
            self
        }
    }

    #[async_trait::async_trait]
    impl VectorIndex for FakeIndex {
        async fn query(
            &self,
            namespace: Namespace,
            vector: &[f32],
            top_k: usize,
        ) -> AppResult<Vec<IndexMatch>> {
            let mut matches: Vec<IndexMatch> = match &self.fixed_matches {
                Some(fixed) => fixed.clone(),
                None => self
                    .vectors
                    .get(&namespace)
                    .into_iter()
                    .flatten()
                    .filter_map(|(id, v)| {
                        score::cosine_similarity(vector, v).map(|score| IndexMatch {
                            id: id.clone(),
                            score,
                        })
                    })
                    .collect(),
            };
            matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
            matches.truncate(top_k);
            Ok(matches)
        }

        async fn fetch(
            &self,
            namespace: Namespace,
            ids: &[String],
        ) -> AppResult<HashMap<String, Vec<f32>>> {
            let stored = self.vectors.get(&namespace);
            Ok(ids
                .iter()
                .filter_map(|id| {
                    stored
                        .and_then(|s| s.get(id))
                        .map(|v| (id.clone(), v.clone()))
                })
                .collect())
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    fn fixed_embedder() -> MockEmbeddingProvider {
        let mut embedder = MockEmbeddingProvider::new();
        embedder.expect_embed().returning(|_| Ok(vec![1.0, 0.0]));
        embedder
    }

    async fn store_with_movies(ids: &[(&str, f64)]) -> MemoryStore {
        let store = MemoryStore::new();
        for (id, popularity) in ids {
            store
                .upsert_movie(&Movie::new(*id, format!("Movie {}", id)).with_popularity(*popularity))
                .await
                .unwrap();
        }
        store
    }

    async fn rate(store: &MemoryStore, user_id: &str, ratings: &[(&str, f64)]) {
        if store.get_user(user_id).await.unwrap().is_none() {
            store
                .create_user(&User {
                    user_id: user_id.to_string(),
                    email: format!("{}@example.com", user_id),
                    hashed_password: "hash".to_string(),
                    fname: "Test".to_string(),
                    lname: "User".to_string(),
                    updated_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        for (tmdb_id, value) in ratings {
            store
                .upsert_rating(&Rating {
                    user_id: user_id.to_string(),
                    tmdb_id: tmdb_id.to_string(),
                    rating: *value,
                    updated_at: Utc::now(),
                })
                .await
                .unwrap();
        }
    }

    fn engine(
        embedder: impl EmbeddingProvider + 'static,
        content: impl VectorIndex + 'static,
        collaborative: impl VectorIndex + 'static,
        store: MemoryStore,
    ) -> RankingEngine {
        let store = Arc::new(store);
        RankingEngine::new(
            Arc::new(embedder),
            Arc::new(content),
            Arc::new(collaborative),
            store.clone(),
            store,
            RankingConfig::default(),
        )
    }

    fn ids(recommendations: &[Recommendation]) -> Vec<&str> {
        recommendations
            .iter()
            .map(|r| r.movie.tmdb_id.as_str())
            .collect()
    }

    /// A and B liked, C disliked; D sits at 0.8 from both likes, E at 0.3
    fn scenario_collaborative() -> FakeIndex {
        FakeIndex::default()
            .with(Namespace::Movies, "A", vec![1.0, 0.0])
            .with(Namespace::Movies, "B", vec![1.0, 0.0])
            .with(Namespace::Movies, "C", vec![0.0, 1.0])
            .with(Namespace::Movies, "D", vec![0.8, 0.6])
            .with(Namespace::Movies, "E", vec![0.3, 0.91_f32.sqrt()])
    }

    #[tokio::test]
    async fn test_user_recommendations_scenario() {
        let store =
            store_with_movies(&[("A", 1.0), ("B", 1.0), ("C", 1.0), ("D", 1.0), ("E", 1.0)]).await;
        rate(&store, "U", &[("A", 5.0), ("B", 4.0), ("C", 1.0)]).await;

        let engine = engine(
            MockEmbeddingProvider::new(),
            FakeIndex::default(),
            scenario_collaborative(),
            store,
        );
        let recs = engine.recommend_for_user("U", 2).await.unwrap();

        assert_eq!(ids(&recs), vec!["D", "E"]);
        assert!((recs[0].score - 0.8).abs() < 1e-6);
        assert!((recs[1].score - 0.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_user_recommendations_never_include_rated() {
        let store =
            store_with_movies(&[("A", 1.0), ("B", 1.0), ("C", 1.0), ("D", 1.0), ("E", 1.0)]).await;
        rate(&store, "U", &[("A", 5.0), ("B", 4.0), ("C", 1.0)]).await;

        let engine = engine(
            MockEmbeddingProvider::new(),
            FakeIndex::default(),
            scenario_collaborative(),
            store,
        );
        let recs = engine.recommend_for_user("U", 100).await.unwrap();

        // bounded by the unrated candidates that have embeddings
        assert_eq!(ids(&recs), vec!["D", "E"]);
    }

    #[tokio::test]
    async fn test_user_without_ratings_gets_empty_list() {
        let engine = engine(
            MockEmbeddingProvider::new(),
            FakeIndex::default(),
            MockVectorIndex::new(),
            MemoryStore::new(),
        );
        assert!(engine.recommend_for_user("nobody", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_user_with_only_dislikes_gets_empty_list() {
        let store = store_with_movies(&[("A", 1.0), ("D", 1.0)]).await;
        rate(&store, "U", &[("A", 2.0)]).await;

        // the collaborative index must not be consulted
        let engine = engine(
            MockEmbeddingProvider::new(),
            FakeIndex::default(),
            MockVectorIndex::new(),
            store,
        );
        assert!(engine.recommend_for_user("U", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_user_recommendations_tie_break_by_id() {
        let store = store_with_movies(&[("A", 1.0), ("Y", 1.0), ("X", 1.0)]).await;
        rate(&store, "U", &[("A", 5.0)]).await;

        let collaborative = FakeIndex::default()
            .with(Namespace::Movies, "A", vec![1.0, 0.0])
            .with(Namespace::Movies, "Y", vec![0.6, 0.8])
            .with(Namespace::Movies, "X", vec![0.6, -0.8]);
        let engine = engine(
            MockEmbeddingProvider::new(),
            FakeIndex::default(),
            collaborative,
            store,
        );

        let recs = engine.recommend_for_user("U", 2).await.unwrap();
        assert_eq!(ids(&recs), vec!["X", "Y"]);
        assert_eq!(recs[0].score, recs[1].score);
    }

    #[tokio::test]
    async fn test_user_score_averages_over_every_like() {
        // More likes than seeds: the last like only shows up in the mean
        let liked: Vec<String> = (0..=MAX_SEEDS).map(|i| format!("L{:02}", i)).collect();
        let mut catalog: Vec<(&str, f64)> = liked.iter().map(|id| (id.as_str(), 1.0)).collect();
        catalog.push(("D", 1.0));
        let store = store_with_movies(&catalog).await;
        let ratings: Vec<(&str, f64)> = liked.iter().map(|id| (id.as_str(), 5.0)).collect();
        rate(&store, "U", &ratings).await;

        let mut collaborative = FakeIndex::default().with(Namespace::Movies, "D", vec![1.0, 0.0]);
        for (i, id) in liked.iter().enumerate() {
            let vector = if i < MAX_SEEDS {
                vec![1.0, 0.0]
            } else {
                vec![0.0, 1.0]
            };
            collaborative = collaborative.with(Namespace::Movies, id, vector);
        }
        let engine = engine(
            MockEmbeddingProvider::new(),
            FakeIndex::default(),
            collaborative,
            store,
        );

        let recs = engine.recommend_for_user("U", 1).await.unwrap();
        assert_eq!(ids(&recs), vec!["D"]);
        let expected = MAX_SEEDS as f64 / (MAX_SEEDS + 1) as f64;
        assert!((recs[0].score - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_user_recommendations_backfill_past_uncatalogued() {
        let store = store_with_movies(&[("A", 1.0), ("E", 1.0), ("F", 1.0)]).await;
        rate(&store, "U", &[("A", 5.0)]).await;

        let collaborative = FakeIndex::default()
            .with(Namespace::Movies, "A", vec![1.0, 0.0])
            .with(Namespace::Movies, "D", vec![1.0, 0.0])
            .with(Namespace::Movies, "E", vec![0.8, 0.6])
            .with(Namespace::Movies, "F", vec![0.0, 1.0]);
        let engine = engine(
            MockEmbeddingProvider::new(),
            FakeIndex::default(),
            collaborative,
            store,
        );

        let recs = engine.recommend_for_user("U", 2).await.unwrap();
        assert_eq!(ids(&recs), vec!["E", "F"]);
    }

    #[tokio::test]
    async fn test_query_recommendations_scenario() {
        let store = store_with_movies(&[("M1", 10.0), ("M2", 20.0)]).await;
        let content = FakeIndex::default().with_matches(&[("M2", 0.7), ("M1", 0.9)]);

        let engine = engine(fixed_embedder(), content, MockVectorIndex::new(), store);
        let recs = engine.recommend_for_query("space adventure", 2).await.unwrap();

        assert_eq!(ids(&recs), vec!["M1", "M2"]);
        assert_eq!(recs[0].score, 0.9);
        assert_eq!(recs[1].score, 0.7);
    }

    #[tokio::test]
    async fn test_query_recommendations_drop_uncatalogued_movies() {
        let store = store_with_movies(&[("M1", 1.0), ("M3", 1.0)]).await;
        let content = FakeIndex::default().with_matches(&[("M1", 0.9), ("M2", 0.8), ("M3", 0.7)]);

        let engine = engine(fixed_embedder(), content, MockVectorIndex::new(), store);
        let recs = engine.recommend_for_query("heist", 3).await.unwrap();

        assert_eq!(ids(&recs), vec!["M1", "M3"]);
    }

    #[tokio::test]
    async fn test_query_recommendations_are_deterministic() {
        let store = store_with_movies(&[("a", 1.0), ("b", 1.0), ("c", 1.0), ("d", 1.0)]).await;
        let content =
            FakeIndex::default().with_matches(&[("d", 0.5), ("c", 0.5), ("b", 0.5), ("a", 0.9)]);
        let engine = engine(fixed_embedder(), content, MockVectorIndex::new(), store);

        let first = engine.recommend_for_query("noir", 4).await.unwrap();
        assert_eq!(ids(&first), vec!["a", "b", "c", "d"]);
        for _ in 0..5 {
            assert_eq!(engine.recommend_for_query("noir", 4).await.unwrap(), first);
        }
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let mut embedder = MockEmbeddingProvider::new();
        embedder
            .expect_embed()
            .times(1)
            .returning(|_| Err(AppError::UpstreamUnavailable("quota exceeded".into())));

        let engine = engine(
            embedder,
            MockVectorIndex::new(),
            MockVectorIndex::new(),
            MemoryStore::new(),
        );
        let err = engine.recommend_for_query("anything", 5).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_invalid_input_makes_no_calls() {
        let mut embedder = MockEmbeddingProvider::new();
        embedder.expect_embed().times(0);
        let mut content = MockVectorIndex::new();
        content.expect_query().times(0);

        let engine = engine(embedder, content, MockVectorIndex::new(), MemoryStore::new());

        for k in [0, 101] {
            let err = engine.recommend_for_query("heist", k).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
        let err = engine.recommend_for_query("   ", 5).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = engine
            .recommend_for_user_and_query(None, "heist", 5, Some(1.5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_embedding_times_out() {
        struct SlowEmbedder;

        #[async_trait::async_trait]
        impl EmbeddingProvider for SlowEmbedder {
            async fn embed(&self, _text: &str) -> AppResult<Vec<f32>> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(vec![1.0, 0.0])
            }
        }

        let engine = engine(
            SlowEmbedder,
            MockVectorIndex::new(),
            MockVectorIndex::new(),
            MemoryStore::new(),
        );
        let err = engine.recommend_for_query("heist", 5).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_blended_scenario_with_user() {
        let store = store_with_movies(&[("M1", 1.0), ("M2", 1.0)]).await;
        let content = FakeIndex::default().with_matches(&[("M1", 0.9), ("M2", 0.7)]);
        // user affinity: M1 ~ 0.2, M2 ~ 0.6
        let collaborative = FakeIndex::default()
            .with(Namespace::Users, "U", vec![1.0, 0.0])
            .with(Namespace::Movies, "M1", vec![0.2, 0.96_f32.sqrt()])
            .with(Namespace::Movies, "M2", vec![0.6, 0.8]);

        let engine = engine(fixed_embedder(), content, collaborative, store);
        let recs = engine
            .recommend_for_user_and_query(Some("U"), "space adventure", 2, Some(0.8))
            .await
            .unwrap();

        // normalized: query {M1: 1, M2: 0}, affinity {M1: 0, M2: 1}
        assert_eq!(ids(&recs), vec!["M1", "M2"]);
        assert!((recs[0].score - 0.8).abs() < 1e-9);
        assert!((recs[1].score - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_blended_affinity_can_overturn_query_order() {
        let store = store_with_movies(&[("M1", 1.0), ("M2", 1.0)]).await;
        let content = FakeIndex::default().with_matches(&[("M1", 0.9), ("M2", 0.7)]);
        let collaborative = FakeIndex::default()
            .with(Namespace::Users, "U", vec![1.0, 0.0])
            .with(Namespace::Movies, "M1", vec![0.2, 0.96_f32.sqrt()])
            .with(Namespace::Movies, "M2", vec![0.6, 0.8]);

        let engine = engine(fixed_embedder(), content, collaborative, store);
        let recs = engine
            .recommend_for_user_and_query(Some("U"), "space adventure", 2, Some(0.3))
            .await
            .unwrap();

        assert_eq!(ids(&recs), vec!["M2", "M1"]);
    }

    #[tokio::test]
    async fn test_blended_without_user_uses_popularity() {
        let store = store_with_movies(&[("M1", 5.0), ("M2", 50.0), ("M3", 20.0)]).await;
        let content = FakeIndex::default().with_matches(&[("M1", 0.9), ("M2", 0.85), ("M3", 0.7)]);

        let engine = engine(fixed_embedder(), content, MockVectorIndex::new(), store);
        let recs = engine
            .recommend_for_user_and_query(None, "heist", 3, Some(0.5))
            .await
            .unwrap();

        // query {M1: 1, M2: 0.75, M3: 0}, popularity {M1: 0, M2: 1, M3: 1/3}
        assert_eq!(ids(&recs), vec!["M2", "M1", "M3"]);
    }

    #[tokio::test]
    async fn test_blended_user_without_embedding_falls_back_to_popularity() {
        let store = store_with_movies(&[("M1", 1.0), ("M2", 100.0)]).await;
        let content = FakeIndex::default().with_matches(&[("M1", 0.9), ("M2", 0.8)]);

        let engine = engine(fixed_embedder(), content, FakeIndex::default(), store);
        let recs = engine
            .recommend_for_user_and_query(Some("new-user"), "heist", 2, Some(0.4))
            .await
            .unwrap();

        assert_eq!(ids(&recs), vec!["M2", "M1"]);
    }

    #[tokio::test]
    async fn test_blended_drops_candidates_missing_collaborative_vector() {
        let store = store_with_movies(&[("M1", 1.0), ("M2", 1.0), ("M3", 1.0)]).await;
        let content = FakeIndex::default().with_matches(&[("M1", 0.9), ("M2", 0.8), ("M3", 0.7)]);
        let collaborative = FakeIndex::default()
            .with(Namespace::Users, "U", vec![1.0, 0.0])
            .with(Namespace::Movies, "M1", vec![1.0, 0.0])
            .with(Namespace::Movies, "M3", vec![0.0, 1.0]);

        let engine = engine(fixed_embedder(), content, collaborative, store);
        let recs = engine
            .recommend_for_user_and_query(Some("U"), "heist", 3, None)
            .await
            .unwrap();

        assert_eq!(ids(&recs), vec!["M1", "M3"]);
    }

    #[tokio::test]
    async fn test_blended_respects_top_k() {
        let store = store_with_movies(&[("M1", 3.0), ("M2", 2.0), ("M3", 1.0)]).await;
        let content = FakeIndex::default().with_matches(&[("M1", 0.9), ("M2", 0.8), ("M3", 0.7)]);

        let engine = engine(fixed_embedder(), content, MockVectorIndex::new(), store);
        let recs = engine
            .recommend_for_user_and_query(None, "heist", 1, None)
            .await
            .unwrap();

        assert_eq!(ids(&recs), vec!["M1"]);
    }
}
