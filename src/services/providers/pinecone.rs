/// Pinecone vector index client
///
/// One instance per index host. The content index holds movie semantic
/// embeddings; the collaborative index holds behavioral embeddings split into
/// the `users` and `movies` namespaces.
///
/// API Flow:
/// 1. Query: POST {host}/query → `matches[{id, score}]`
/// 2. Fetch: GET {host}/vectors/fetch?ids=..&namespace=.. → `vectors{id: {values}}`
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::{
    error::AppResult,
    services::providers::{
        check_status, openai::build_http_client, upstream_error, IndexMatch, IndexMetric,
        Namespace, VectorIndex,
    },
};

/// Ids per fetch request, keeps the query string well under URL limits
const FETCH_BATCH_SIZE: usize = 100;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    top_k: usize,
    include_values: bool,
    include_metadata: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<ApiMatch>,
}

#[derive(Debug, Deserialize)]
struct ApiMatch {
    id: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: HashMap<String, ApiVector>,
}

#[derive(Debug, Deserialize)]
struct ApiVector {
    values: Vec<f32>,
}

#[derive(Clone)]
pub struct PineconeIndex {
    name: &'static str,
    http_client: HttpClient,
    api_key: String,
    host: String,
    metric: IndexMetric,
}

impl PineconeIndex {
    pub fn new(
        name: &'static str,
        api_key: String,
        host: String,
        metric: IndexMetric,
        timeout: Duration,
    ) -> AppResult<Self> {
        Ok(Self {
            name,
            http_client: build_http_client(timeout)?,
            api_key,
            host: host.trim_end_matches('/').to_string(),
            metric,
        })
    }

    /// Converts raw matches to similarities, best first, ties by id
    fn convert_matches(&self, response: QueryResponse) -> Vec<IndexMatch> {
        let mut matches: Vec<IndexMatch> = response
            .matches
            .into_iter()
            .map(|m| IndexMatch {
                score: self.metric.to_similarity(m.score),
                id: m.id,
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        matches
    }

    async fn fetch_batch(
        &self,
        namespace: Namespace,
        ids: &[String],
    ) -> AppResult<HashMap<String, Vec<f32>>> {
        let url = format!("{}/vectors/fetch", self.host);

        let mut params: Vec<(&str, &str)> = ids.iter().map(|id| ("ids", id.as_str())).collect();
        params.push(("namespace", namespace.as_str()));

        let response = self
            .http_client
            .get(&url)
            .header("Api-Key", &self.api_key)
            .query(&params)
            .send()
            .await
            .map_err(|e| upstream_error(self.name, e))?;

        let response = check_status(self.name, response).await?;
        let body: FetchResponse = response
            .json()
            .await
            .map_err(|e| upstream_error(self.name, e))?;

        Ok(body
            .vectors
            .into_iter()
            .map(|(id, vector)| (id, vector.values))
            .collect())
    }
}

#[async_trait::async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(
        &self,
        namespace: Namespace,
        vector: &[f32],
        top_k: usize,
    ) -> AppResult<Vec<IndexMatch>> {
        let url = format!("{}/query", self.host);

        let response = self
            .http_client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .json(&QueryRequest {
                namespace: namespace.as_str(),
                vector,
                top_k,
                include_values: false,
                include_metadata: false,
            })
            .send()
            .await
            .map_err(|e| upstream_error(self.name, e))?;

        let response = check_status(self.name, response).await?;
        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| upstream_error(self.name, e))?;

        let matches = self.convert_matches(body);
        tracing::debug!(
            index = self.name,
            namespace = %namespace,
            top_k,
            matches = matches.len(),
            "Index query completed"
        );
        Ok(matches)
    }

    async fn fetch(
        &self,
        namespace: Namespace,
        ids: &[String],
    ) -> AppResult<HashMap<String, Vec<f32>>> {
        let mut vectors = HashMap::with_capacity(ids.len());

        for batch in ids.chunks(FETCH_BATCH_SIZE) {
            vectors.extend(self.fetch_batch(namespace, batch).await?);
        }

        if vectors.len() < ids.len() {
            tracing::debug!(
                index = self.name,
                namespace = %namespace,
                requested = ids.len(),
                found = vectors.len(),
                "Some ids have no stored vector"
            );
        }

        Ok(vectors)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
