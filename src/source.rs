//! Data sources: where tree fragments, detail records and search candidates
//! come from.
//!
//! The view only ever talks to [`DataSource`]; the worker owns one behind an
//! `Arc` and calls it from spawned tasks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::error::{FetchError, Result};
use crate::tree::{decorate_name, Node};

/// Maximum number of candidates a local search returns
pub const SEARCH_LIMIT: usize = 20;

/// Expanded, fetched-on-demand data for one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub other_names: Option<String>,
    #[serde(default)]
    pub extant: Option<bool>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
}

impl DetailRecord {
    /// Bare record for a node that has no stored details.
    pub fn from_node(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            name: node.name.clone(),
            description: None,
            other_names: None,
            extant: node.attributes.extant,
            image: None,
            created_at: None,
            modified: None,
        }
    }

    pub fn last_edited(&self) -> Option<DateTime<Utc>> {
        self.modified.or(self.created_at)
    }
}

/// One row of a search response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub other_names: Option<String>,
    #[serde(default)]
    pub extant: Option<bool>,
}

impl SearchCandidate {
    pub fn label(&self) -> String {
        decorate_name(&self.name, self.extant)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch the fragment rooted at `root`, or the default root when `None`.
    async fn fetch_tree(&self, root: Option<String>) -> std::result::Result<Node, FetchError>;

    async fn fetch_detail(&self, id: String) -> std::result::Result<DetailRecord, FetchError>;

    /// Candidates for a non-empty free-text query, in relevance order.
    async fn search(&self, query: String) -> std::result::Result<Vec<SearchCandidate>, FetchError>;
}

/// Secondary, best-effort lookup of an illustration for a taxon name.
#[async_trait]
pub trait ImageLookup: Send + Sync {
    async fn find_image(&self, name: &str) -> Option<String>;
}

/// REST client for the clade API.
pub struct HttpDataSource {
    client: reqwest::Client,
    base: Url,
}

impl HttpDataSource {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("clade-explorer/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(FetchError::from)?;
        Ok(Self { client, base })
    }

    fn endpoint(&self, path: &str) -> std::result::Result<Url, FetchError> {
        self.base
            .join(path)
            .map_err(|e| FetchError::ValidationFailure(e.to_string()))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> std::result::Result<T, FetchError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound);
        }
        if status == reqwest::StatusCode::BAD_REQUEST {
            return Err(FetchError::ValidationFailure(format!("server rejected request ({})", status)));
        }
        if !status.is_success() {
            return Err(FetchError::TransportFailure(format!("server returned {}", status)));
        }
        response.json::<T>().await.map_err(FetchError::transport)
    }
}

#[async_trait]
impl DataSource for HttpDataSource {
    async fn fetch_tree(&self, root: Option<String>) -> std::result::Result<Node, FetchError> {
        let mut url = self.endpoint("api/tree")?;
        if let Some(root) = &root {
            url.query_pairs_mut().append_pair("node_id", root);
        }
        log::debug!("http: GET {}", url);
        let response = self.client.get(url).send().await?;
        // The tree endpoint answers `null` for an unknown root
        Self::read_json::<Option<Node>>(response)
            .await?
            .ok_or(FetchError::NotFound)
    }

    async fn fetch_detail(&self, id: String) -> std::result::Result<DetailRecord, FetchError> {
        if id.is_empty() {
            return Err(FetchError::ValidationFailure("ID is required".to_string()));
        }
        let mut url = self.endpoint("api/clade/")?;
        url.path_segments_mut()
            .map_err(|_| FetchError::ValidationFailure("base URL cannot have a path".to_string()))?
            .pop_if_empty()
            .push(&id);
        log::debug!("http: GET {}", url);
        let response = self.client.get(url).send().await?;
        Self::read_json(response).await
    }

    async fn search(&self, query: String) -> std::result::Result<Vec<SearchCandidate>, FetchError> {
        if query.is_empty() {
            return Err(FetchError::ValidationFailure("empty query".to_string()));
        }
        let url = self.endpoint("api/search")?;
        log::debug!("http: POST {} query={:?}", url, query);
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await?;
        Self::read_json(response).await
    }
}

/// Looks up the lead image of the Wikipedia article named after the taxon.
pub struct WikipediaImageLookup {
    client: reqwest::Client,
    base: Url,
}

#[derive(Deserialize)]
struct WikiSummary {
    thumbnail: Option<WikiImage>,
    originalimage: Option<WikiImage>,
}

#[derive(Deserialize)]
struct WikiImage {
    source: String,
}

impl WikipediaImageLookup {
    pub fn new() -> Result<Self> {
        Self::with_base("https://en.wikipedia.org/api/rest_v1/page/summary/")
    }

    pub fn with_base(base: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("clade-explorer/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(FetchError::from)?;
        Ok(Self {
            client,
            base: Url::parse(base)?,
        })
    }

    async fn lookup(&self, name: &str) -> std::result::Result<Option<String>, FetchError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::ValidationFailure("bad image lookup base".to_string()))?
            .pop_if_empty()
            .push(name);
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let summary: WikiSummary = response.json().await?;
        Ok(summary.thumbnail.or(summary.originalimage).map(|img| img.source))
    }
}

#[async_trait]
impl ImageLookup for WikipediaImageLookup {
    async fn find_image(&self, name: &str) -> Option<String> {
        match self.lookup(name).await {
            Ok(image) => image,
            Err(e) => {
                log::debug!("image lookup for '{}' failed: {}", name, e);
                None
            }
        }
    }
}

/// Decorates a source so detail records gain an image from a secondary
/// lookup when they do not carry one already.
pub struct ImageEnrichedSource {
    inner: Arc<dyn DataSource>,
    images: Arc<dyn ImageLookup>,
}

impl ImageEnrichedSource {
    pub fn new(inner: Arc<dyn DataSource>, images: Arc<dyn ImageLookup>) -> Self {
        Self { inner, images }
    }
}

#[async_trait]
impl DataSource for ImageEnrichedSource {
    async fn fetch_tree(&self, root: Option<String>) -> std::result::Result<Node, FetchError> {
        self.inner.fetch_tree(root).await
    }

    async fn fetch_detail(&self, id: String) -> std::result::Result<DetailRecord, FetchError> {
        let mut record = self.inner.fetch_detail(id).await?;
        if record.image.is_none() {
            record.image = self.images.find_image(&record.name).await;
        }
        Ok(record)
    }

    async fn search(&self, query: String) -> std::result::Result<Vec<SearchCandidate>, FetchError> {
        self.inner.search(query).await
    }
}

/// On-disk dataset format for [`FixtureDataSource`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub tree: Node,
    #[serde(default)]
    pub details: HashMap<String, DetailRecord>,
}

impl Fixture {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Serves a whole dataset from memory, optionally with artificial latency.
pub struct FixtureDataSource {
    fixture: Fixture,
    latency: Duration,
}

impl FixtureDataSource {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            fixture,
            latency: Duration::ZERO,
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(Fixture::load_from_file(path)?))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn subtree(&self, root: Option<&str>) -> std::result::Result<Node, FetchError> {
        match root {
            None => Ok(self.fixture.tree.clone()),
            Some(id) => self.fixture.tree.subtree(id).cloned().ok_or(FetchError::NotFound),
        }
    }

    fn detail(&self, id: &str) -> std::result::Result<DetailRecord, FetchError> {
        if let Some(record) = self.fixture.details.get(id) {
            return Ok(record.clone());
        }
        self.fixture
            .tree
            .subtree(id)
            .map(DetailRecord::from_node)
            .ok_or(FetchError::NotFound)
    }

    /// Fuzzy match over names and other names, best score first.
    fn rank(&self, query: &str) -> Vec<SearchCandidate> {
        let matcher = SkimMatcherV2::default();
        let mut scored: Vec<(i64, SearchCandidate)> = Vec::new();
        let mut stack = vec![&self.fixture.tree];
        while let Some(node) = stack.pop() {
            stack.extend(node.children.iter().rev());

            let details = self.fixture.details.get(&node.id);
            let other_names = details.and_then(|d| d.other_names.clone());
            let name_score = matcher.fuzzy_match(&node.name, query);
            let other_score = other_names
                .as_deref()
                .and_then(|names| matcher.fuzzy_match(names, query));
            if let Some(score) = name_score.max(other_score) {
                scored.push((
                    score,
                    SearchCandidate {
                        id: node.id.clone(),
                        name: node.name.clone(),
                        other_names,
                        extant: node.attributes.extant.or(details.and_then(|d| d.extant)),
                    },
                ));
            }
        }
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(SEARCH_LIMIT).map(|(_, c)| c).collect()
    }
}

#[async_trait]
impl DataSource for FixtureDataSource {
    async fn fetch_tree(&self, root: Option<String>) -> std::result::Result<Node, FetchError> {
        self.delay().await;
        self.subtree(root.as_deref())
    }

    async fn fetch_detail(&self, id: String) -> std::result::Result<DetailRecord, FetchError> {
        self.delay().await;
        self.detail(&id)
    }

    async fn search(&self, query: String) -> std::result::Result<Vec<SearchCandidate>, FetchError> {
        if query.is_empty() {
            return Err(FetchError::ValidationFailure("empty query".to_string()));
        }
        self.delay().await;
        Ok(self.rank(&query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::tests::sample_root;
    use maplit::hashmap;

    fn fixture() -> Fixture {
        Fixture {
            tree: sample_root(),
            details: hashmap! {
                "felidae".to_string() => DetailRecord {
                    id: "felidae".to_string(),
                    name: "Felidae".to_string(),
                    description: Some("Cats.".to_string()),
                    other_names: Some("Cats".to_string()),
                    extant: Some(true),
                    image: None,
                    created_at: None,
                    modified: None,
                },
            },
        }
    }

    #[tokio::test]
    async fn test_fixture_tree_roots() {
        let source = FixtureDataSource::new(fixture());
        let whole = source.fetch_tree(None).await.unwrap();
        assert_eq!(whole.id, "amniota");

        let sub = source.fetch_tree(Some("mammalia".to_string())).await.unwrap();
        assert_eq!(sub.children.len(), 2);

        let missing = source.fetch_tree(Some("ursidae".to_string())).await;
        assert_eq!(missing.unwrap_err(), FetchError::NotFound);
    }

    #[tokio::test]
    async fn test_fixture_detail_falls_back_to_node() {
        let source = FixtureDataSource::new(fixture());
        let stored = source.fetch_detail("felidae".to_string()).await.unwrap();
        assert_eq!(stored.description.as_deref(), Some("Cats."));

        let bare = source.fetch_detail("dinosauria".to_string()).await.unwrap();
        assert_eq!(bare.name, "Dinosauria");
        assert_eq!(bare.extant, Some(false));
        assert!(bare.description.is_none());

        assert!(source.fetch_detail("nothing".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_fixture_search_matches_other_names() {
        let source = FixtureDataSource::new(fixture());
        let results = source.search("cats".to_string()).await.unwrap();
        assert_eq!(results[0].id, "felidae");

        let dinos = source.search("dino".to_string()).await.unwrap();
        assert_eq!(dinos[0].label(), "†Dinosauria");

        assert!(source.search(String::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_image_enrichment_only_fills_missing() {
        struct FixedImage;
        #[async_trait]
        impl ImageLookup for FixedImage {
            async fn find_image(&self, name: &str) -> Option<String> {
                Some(format!("https://img/{}.jpg", name))
            }
        }

        let mut data = fixture();
        data.details.insert(
            "aves".to_string(),
            DetailRecord {
                image: Some("https://img/own.jpg".to_string()),
                ..DetailRecord::from_node(&Node::new("aves", "Aves"))
            },
        );
        let source = ImageEnrichedSource::new(Arc::new(FixtureDataSource::new(data)), Arc::new(FixedImage));

        let felidae = source.fetch_detail("felidae".to_string()).await.unwrap();
        assert_eq!(felidae.image.as_deref(), Some("https://img/Felidae.jpg"));
        let aves = source.fetch_detail("aves".to_string()).await.unwrap();
        assert_eq!(aves.image.as_deref(), Some("https://img/own.jpg"));
    }

    #[test]
    fn test_detail_record_json() {
        let json = r#"{
            "id": "57a8baf1343108933d3a8f36",
            "name": "Felidae",
            "description": "Family of cats",
            "other_names": "Cats",
            "created_at": "2017-01-18T12:00:00Z",
            "modified": null
        }"#;
        let record: DetailRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.last_edited().unwrap().to_rfc3339(), "2017-01-18T12:00:00+00:00");
        assert!(record.image.is_none());
    }

    #[test]
    fn test_fixture_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("clades.json");
        std::fs::write(&path, serde_json::to_string(&fixture()).unwrap()).unwrap();
        let loaded = Fixture::load_from_file(&path).unwrap();
        assert_eq!(loaded.tree, sample_root());
        assert!(loaded.details.contains_key("felidae"));
    }

    #[tokio::test]
    async fn test_http_source_rejects_empty_query_without_request() {
        let source = HttpDataSource::new("http://127.0.0.1:9").unwrap();
        let err = source.search(String::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
