//! Cache-first fiche resolution.
//!
//! A norm's fiche lives in one of three states: nothing cached, raw HTML
//! cached, or parsed JSON cached. Resolution walks the states forward
//! (live fetch, then extraction), writing each tier through to the store,
//! so a fiche is fetched over the network at most once and parsed at most
//! once as long as the cache persists.

use std::sync::atomic::{AtomicUsize, Ordering};

use digesto_core::{Fiche, NormId, PipelineConfig, RetryPolicy};
use digesto_store::{RemoteStore, StoreError, join_path};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::extract::Extractor;
use crate::source::DocumentSource;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("cache store error: {0}")]
    Cache(#[from] StoreError),
    #[error("encoding parsed fiche: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Where the two cache tiers live in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    pub raw_folder: String,
    pub parsed_folder: String,
}

impl CacheLayout {
    pub const RAW_EXT: &'static str = "html";
    pub const PARSED_EXT: &'static str = "json";

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            raw_folder: config.raw_folder.clone(),
            parsed_folder: config.parsed_folder.clone(),
        }
    }

    pub fn raw_path(&self, id: &NormId) -> String {
        join_path(&self.raw_folder, &format!("{id}.{}", Self::RAW_EXT))
    }

    pub fn parsed_path(&self, id: &NormId) -> String {
        join_path(&self.parsed_folder, &format!("{id}.{}", Self::PARSED_EXT))
    }

    /// The norm id of a raw-tier file name, e.g. `"594.html"`.
    pub fn raw_id(name: &str) -> Option<NormId> {
        name.strip_suffix(".html").and_then(NormId::parse)
    }

    /// The norm id of a parsed-tier file name, e.g. `"594.json"`.
    pub fn parsed_id(name: &str) -> Option<NormId> {
        name.strip_suffix(".json").and_then(NormId::parse)
    }
}

impl Default for CacheLayout {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// What the cache holds for a norm.
#[derive(Debug)]
enum CacheState {
    Absent,
    RawOnly(String),
    Parsed(Fiche),
}

/// Counters over a resolver's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    pub parsed_hits: usize,
    pub raw_hits: usize,
    pub live_fetches: usize,
    pub fetch_failures: usize,
}

#[derive(Default)]
struct Counters {
    parsed_hits: AtomicUsize,
    raw_hits: AtomicUsize,
    live_fetches: AtomicUsize,
    fetch_failures: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub struct FicheResolver<S, D> {
    store: S,
    source: D,
    layout: CacheLayout,
    extractor: Extractor,
    retry: RetryPolicy,
    counters: Counters,
}

impl<S: RemoteStore, D: DocumentSource> FicheResolver<S, D> {
    pub fn new(store: S, source: D, config: &PipelineConfig) -> Self {
        Self {
            store,
            source,
            layout: CacheLayout::from_config(config),
            extractor: Extractor::new(config.document_base_url.clone()),
            retry: config.retry.clone(),
            counters: Counters::default(),
        }
    }

    pub fn with_extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn stats(&self) -> ResolveStats {
        let c = &self.counters;
        ResolveStats {
            parsed_hits: c.parsed_hits.load(Ordering::Relaxed),
            raw_hits: c.raw_hits.load(Ordering::Relaxed),
            live_fetches: c.live_fetches.load(Ordering::Relaxed),
            fetch_failures: c.fetch_failures.load(Ordering::Relaxed),
        }
    }

    /// Return the parsed fiche for `id`, consulting the parsed tier, then the
    /// raw tier, then the live source.
    ///
    /// `Ok(None)` means the fiche is unavailable: every fetch attempt failed,
    /// or the page carries no fiche container. Store failures are errors.
    pub async fn resolve(&self, id: &NormId) -> Result<Option<Fiche>, ResolveError> {
        let mut state = self.lookup(id).await?;
        loop {
            state = match state {
                CacheState::Parsed(fiche) => return Ok(Some(fiche)),
                CacheState::RawOnly(html) => match self.extractor.extract(id, &html) {
                    Some(fiche) => {
                        let json = serde_json::to_vec(&fiche)?;
                        self.store.put(&self.layout.parsed_path(id), json).await?;
                        debug!(%id, "parsed fiche cached");
                        CacheState::Parsed(fiche)
                    }
                    None => {
                        warn!(%id, "page has no fiche container");
                        return Ok(None);
                    }
                },
                CacheState::Absent => match self.fetch_live(id).await {
                    Some(html) => {
                        self.store
                            .put(&self.layout.raw_path(id), html.as_bytes().to_vec())
                            .await?;
                        debug!(%id, "raw fiche cached");
                        CacheState::RawOnly(html)
                    }
                    None => return Ok(None),
                },
            };
        }
    }

    /// Drop both cached tiers for `id`, forcing the next resolve to refetch.
    pub async fn invalidate(&self, id: &NormId) -> Result<(), ResolveError> {
        self.store.delete(&self.layout.parsed_path(id)).await?;
        self.store.delete(&self.layout.raw_path(id)).await?;
        info!(%id, "fiche cache invalidated");
        Ok(())
    }

    async fn lookup(&self, id: &NormId) -> Result<CacheState, ResolveError> {
        if let Some(bytes) = self.store.get(&self.layout.parsed_path(id)).await? {
            match serde_json::from_slice::<Fiche>(&bytes) {
                Ok(fiche) if fiche.id == *id => {
                    bump(&self.counters.parsed_hits);
                    return Ok(CacheState::Parsed(fiche));
                }
                Ok(fiche) => {
                    warn!(%id, cached = %fiche.id, "parsed cache entry has wrong id, ignoring");
                }
                Err(e) => warn!(%id, error = %e, "unreadable parsed cache entry, ignoring"),
            }
        }

        if let Some(bytes) = self.store.get(&self.layout.raw_path(id)).await? {
            bump(&self.counters.raw_hits);
            return Ok(CacheState::RawOnly(String::from_utf8_lossy(&bytes).into_owned()));
        }
        Ok(CacheState::Absent)
    }

    /// Up to `retry.max_attempts` fetches, `retry.delay()` apart.
    async fn fetch_live(&self, id: &NormId) -> Option<String> {
        let attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=attempts {
            bump(&self.counters.live_fetches);
            match self.source.fetch(id).await {
                Ok(html) => return Some(html),
                Err(e) => warn!(%id, attempt, attempts, error = %e, "fiche fetch failed"),
            }
            if attempt < attempts {
                tokio::time::sleep(self.retry.delay()).await;
            }
        }
        bump(&self.counters.fetch_failures);
        None
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use digesto_store::{ListEntry, MemoryStore};

    use super::*;
    use crate::source::FetchError;

    const PAGE: &str = r#"<div id="Textos_Completos"><h1>Ley 10</h1></div>
        <p>modifica a <a href="verNorma.do?id=20">Ley 20</a></p>"#;

    /// Replays scripted responses and counts calls.
    #[derive(Clone, Default)]
    struct ScriptedSource {
        responses: Arc<Mutex<VecDeque<Result<String, FetchError>>>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<String, FetchError>>) -> Self {
            Self {
                responses: Arc::new(Mutex::new(responses.into())),
                calls: Arc::default(),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DocumentSource for ScriptedSource {
        async fn fetch(&self, _id: &NormId) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::Other("script exhausted".into())))
        }
    }

    /// A store whose every operation fails.
    struct FailingStore;

    #[async_trait]
    impl RemoteStore for FailingStore {
        async fn list(&self, _: &str) -> Result<Vec<ListEntry>, StoreError> {
            Err(StoreError::Other("down".into()))
        }
        async fn get(&self, _: &str) -> Result<Option<Vec<u8>>, StoreError> {
            Err(StoreError::Other("down".into()))
        }
        async fn put(&self, _: &str, _: Vec<u8>) -> Result<(), StoreError> {
            Err(StoreError::Other("down".into()))
        }
        async fn delete(&self, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Other("down".into()))
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            retry: RetryPolicy::immediate(3),
            ..PipelineConfig::default()
        }
    }

    fn id(raw: &str) -> NormId {
        NormId::parse(raw).unwrap()
    }

    fn resolver(
        store: Arc<MemoryStore>,
        source: ScriptedSource,
    ) -> FicheResolver<Arc<MemoryStore>, ScriptedSource> {
        FicheResolver::new(store, source, &config())
    }

    #[tokio::test]
    async fn second_resolve_hits_parsed_cache() {
        let store = Arc::new(MemoryStore::new());
        let source = ScriptedSource::new(vec![Ok(PAGE.into())]);
        let resolver = resolver(store.clone(), source.clone());

        let first = resolver.resolve(&id("10")).await.unwrap().unwrap();
        let second = resolver.resolve(&id("10")).await.unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(source.calls(), 1);
        assert!(store.contains("/fichas_html/10.html"));
        assert!(store.contains("/fichas_json/10.json"));
        assert_eq!(first.relations.modifica[0].target_id(), Some("20"));
        let stats = resolver.stats();
        assert_eq!(stats.parsed_hits, 1);
        assert_eq!(stats.live_fetches, 1);
    }

    #[tokio::test]
    async fn exhausted_retries_return_none_without_writes() {
        let store = Arc::new(MemoryStore::new());
        let source = ScriptedSource::new(vec![
            Err(FetchError::Status { status: 503 }),
            Err(FetchError::Status { status: 503 }),
            Err(FetchError::Status { status: 503 }),
            Ok(PAGE.into()),
        ]);
        let resolver = resolver(store.clone(), source.clone());

        assert!(resolver.resolve(&id("10")).await.unwrap().is_none());
        assert_eq!(source.calls(), 3);
        assert!(store.is_empty());
        assert_eq!(resolver.stats().fetch_failures, 1);
    }

    #[tokio::test]
    async fn transient_failure_then_success() {
        let store = Arc::new(MemoryStore::new());
        let source = ScriptedSource::new(vec![Err(FetchError::Other("reset".into())), Ok(PAGE.into())]);
        let resolver = resolver(store.clone(), source.clone());

        assert!(resolver.resolve(&id("10")).await.unwrap().is_some());
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn raw_tier_is_parsed_and_written_through() {
        let store = Arc::new(MemoryStore::new());
        store
            .put("/fichas_html/10.html", PAGE.as_bytes().to_vec())
            .await
            .unwrap();
        let source = ScriptedSource::default();
        let resolver = resolver(store.clone(), source.clone());

        let fiche = resolver.resolve(&id("10")).await.unwrap().unwrap();
        assert_eq!(fiche.heading.as_deref(), Some("Ley 10"));
        assert_eq!(source.calls(), 0);

        let cached = store.get("/fichas_json/10.json").await.unwrap().unwrap();
        let cached: Fiche = serde_json::from_slice(&cached).unwrap();
        assert_eq!(cached, fiche);
    }

    #[tokio::test]
    async fn corrupt_parsed_entry_falls_back_to_raw() {
        let store = Arc::new(MemoryStore::new());
        store.put("/fichas_json/10.json", b"{not json".to_vec()).await.unwrap();
        store
            .put("/fichas_html/10.html", PAGE.as_bytes().to_vec())
            .await
            .unwrap();
        let resolver = resolver(store.clone(), ScriptedSource::default());

        let fiche = resolver.resolve(&id("10")).await.unwrap().unwrap();
        assert_eq!(fiche.id, id("10"));
        let repaired = store.get("/fichas_json/10.json").await.unwrap().unwrap();
        assert!(serde_json::from_slice::<Fiche>(&repaired).is_ok());
    }

    #[tokio::test]
    async fn parsed_entry_with_other_id_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let foreign = serde_json::to_vec(&Fiche::empty(id("99"))).unwrap();
        store.put("/fichas_json/10.json", foreign).await.unwrap();
        let source = ScriptedSource::new(vec![Ok(PAGE.into())]);
        let resolver = resolver(store.clone(), source.clone());

        let fiche = resolver.resolve(&id("10")).await.unwrap().unwrap();
        assert_eq!(fiche.id, id("10"));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn page_without_container_is_unavailable_but_not_refetched() {
        let store = Arc::new(MemoryStore::new());
        let source = ScriptedSource::new(vec![Ok("<html><body>Error</body></html>".into())]);
        let resolver = resolver(store.clone(), source.clone());

        assert!(resolver.resolve(&id("10")).await.unwrap().is_none());
        assert!(resolver.resolve(&id("10")).await.unwrap().is_none());
        assert_eq!(source.calls(), 1);
        assert!(store.contains("/fichas_html/10.html"));
        assert!(!store.contains("/fichas_json/10.json"));
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let source = ScriptedSource::new(vec![Ok(PAGE.into())]);
        let resolver = FicheResolver::new(FailingStore, source.clone(), &config());

        let err = resolver.resolve(&id("10")).await.unwrap_err();
        assert!(matches!(err, ResolveError::Cache(StoreError::Other(_))));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let store = Arc::new(MemoryStore::new());
        let source = ScriptedSource::new(vec![Ok(PAGE.into()), Ok(PAGE.into())]);
        let resolver = resolver(store.clone(), source.clone());

        resolver.resolve(&id("10")).await.unwrap();
        resolver.invalidate(&id("10")).await.unwrap();
        assert!(store.is_empty());
        resolver.resolve(&id("10")).await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[test]
    fn layout_paths_and_names() {
        let layout = CacheLayout::default();
        assert_eq!(layout.raw_path(&id("594")), "/fichas_html/594.html");
        assert_eq!(layout.parsed_path(&id("594")), "/fichas_json/594.json");
        assert_eq!(CacheLayout::raw_id("594.html"), Some(id("594")));
        assert_eq!(CacheLayout::parsed_id("594.0.json"), Some(id("594")));
        assert_eq!(CacheLayout::parsed_id("594.html"), None);
        assert_eq!(CacheLayout::raw_id("nan.html"), None);
    }
}
