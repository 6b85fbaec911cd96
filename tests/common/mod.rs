use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum_test::TestServer;

use reelrank_api::{
    api::{create_router, AppState},
    db::{MemoryStore, MovieCatalog},
    error::AppResult,
    models::{ChatMessage, ChatRole, Movie},
    services::{
        providers::{EmbeddingProvider, IndexMatch, Namespace, TextGenerator, VectorIndex},
        score::cosine_similarity,
        ChatSearchService, MemorySessionStore, RankingConfig, RankingEngine,
    },
};

/// Embeds every text onto the same axis so content scores are predictable
pub struct FixedEmbedder(pub Vec<f32>);

#[async_trait::async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed(&self, _text: &str) -> AppResult<Vec<f32>> {
        Ok(self.0.clone())
    }
}

/// Brute-force cosine index over vectors kept in memory
#[derive(Default)]
pub struct InMemoryIndex {
    vectors: RwLock<HashMap<Namespace, BTreeMap<String, Vec<f32>>>>,
}

impl InMemoryIndex {
    pub fn insert(&self, namespace: Namespace, id: &str, vector: Vec<f32>) {
        self.vectors
            .write()
            .unwrap()
            .entry(namespace)
            .or_default()
            .insert(id.to_string(), vector);
    }
}

#[async_trait::async_trait]
impl VectorIndex for InMemoryIndex {
    async fn query(
        &self,
        namespace: Namespace,
        vector: &[f32],
        top_k: usize,
    ) -> AppResult<Vec<IndexMatch>> {
        let vectors = self.vectors.read().unwrap();
        let mut matches: Vec<IndexMatch> = vectors
            .get(&namespace)
            .into_iter()
            .flatten()
            .filter_map(|(id, v)| {
                cosine_similarity(vector, v).map(|score| IndexMatch {
                    id: id.clone(),
                    score,
                })
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn fetch(
        &self,
        namespace: Namespace,
        ids: &[String],
    ) -> AppResult<HashMap<String, Vec<f32>>> {
        let vectors = self.vectors.read().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| {
                vectors
                    .get(&namespace)
                    .and_then(|ns| ns.get(id))
                    .map(|v| (id.clone(), v.clone()))
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}

/// Echoes its inputs so assertions can see what the service passed along
pub struct EchoGenerator;

#[async_trait::async_trait]
impl TextGenerator for EchoGenerator {
    async fn condense(&self, history: &[ChatMessage], latest: &str) -> AppResult<String> {
        let previous = history
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        Ok(format!("{} {}", previous, latest))
    }

    async fn respond(&self, query: &str, movies: &[Movie]) -> AppResult<String> {
        Ok(format!("{} results for {}", movies.len(), query))
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<MemoryStore>,
    pub collaborative: Arc<InMemoryIndex>,
}

/// Catalog m1..m4 with content vectors around the query axis `[1, 0]` and
/// collaborative vectors where m2 sits next to m1.
pub async fn spawn_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let content = Arc::new(InMemoryIndex::default());
    let collaborative = Arc::new(InMemoryIndex::default());

    for (id, title, popularity) in [
        ("m1", "Solaris", 10.0),
        ("m2", "Stalker", 20.0),
        ("m3", "Mirror", 30.0),
        ("m4", "Nostalghia", 5.0),
    ] {
        store
            .upsert_movie(&Movie::new(id, title).with_popularity(popularity))
            .await
            .unwrap();
    }

    content.insert(Namespace::Default, "m1", vec![1.0, 0.0]);
    content.insert(Namespace::Default, "m2", vec![0.8, 0.6]);
    content.insert(Namespace::Default, "m3", vec![0.0, 1.0]);

    collaborative.insert(Namespace::Movies, "m1", vec![1.0, 0.0]);
    collaborative.insert(Namespace::Movies, "m2", vec![0.9, 0.1]);
    collaborative.insert(Namespace::Movies, "m3", vec![0.0, 1.0]);
    collaborative.insert(Namespace::Movies, "m4", vec![0.7, 0.7]);

    let engine = RankingEngine::new(
        Arc::new(FixedEmbedder(vec![1.0, 0.0])),
        content.clone(),
        collaborative.clone(),
        store.clone(),
        store.clone(),
        RankingConfig::default(),
    );
    let sessions = Arc::new(MemorySessionStore::new(40, Duration::from_secs(3600)));
    let search = ChatSearchService::new(engine.clone(), sessions, Arc::new(EchoGenerator));

    let state = AppState::new(engine, search, store.clone(), store.clone(), store.clone());
    let server = TestServer::new(create_router(state)).unwrap();

    TestApp {
        server,
        store,
        collaborative,
    }
}
