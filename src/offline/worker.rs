use super::manifest::{normalize_url, sha256_hex};
use super::{CacheError, CacheStorage, Manifest, Request, Response, Transport};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Lifecycle of one cache generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Active,
    /// Install failed; this generation will never serve
    Redundant,
}

/// One generation of the offline cache
///
/// Interception always consults the live bucket recorded in storage, so a
/// generation that failed to install leaves the previous one serving.
pub struct OfflineCache {
    manifest: Manifest,
    storage: CacheStorage,
    transport: Arc<dyn Transport>,
    state: RwLock<WorkerState>,
}

impl OfflineCache {
    pub fn new(manifest: Manifest, storage: CacheStorage, transport: Arc<dyn Transport>) -> Self {
        OfflineCache {
            manifest,
            storage,
            transport,
            state: RwLock::new(WorkerState::Parsed),
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    async fn set_state(&self, next: WorkerState) {
        let mut state = self.state.write().await;
        debug!("Cache {} state {:?} -> {:?}", self.manifest.bucket_name(), *state, next);
        *state = next;
    }

    /// Install then activate straight away
    ///
    /// When this generation is already live nothing is fetched; it just
    /// resumes serving.
    pub async fn register(&self) -> Result<Vec<String>, CacheError> {
        let bucket = self.manifest.bucket_name();
        if self.storage.live_bucket().await?.as_deref() == Some(bucket.as_str()) {
            info!("Offline cache {} already live", bucket);
            self.set_state(WorkerState::Active).await;
            return Ok(Vec::new());
        }

        self.install().await?;
        self.activate().await
    }

    /// Fetches the whole manifest and stores it in this generation's bucket
    ///
    /// Nothing is written unless every asset was fetched successfully.
    pub async fn install(&self) -> Result<(), CacheError> {
        let bucket = self.manifest.bucket_name();
        info!("Installing offline cache {}", bucket);
        self.set_state(WorkerState::Installing).await;

        let result = self.fetch_manifest().await;
        let entries = match result {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Offline cache {} install aborted: {}", bucket, e);
                self.set_state(WorkerState::Redundant).await;
                return Err(e);
            }
        };

        let count = entries.len();
        if let Err(e) = self.storage.put_bucket(&bucket, entries).await {
            warn!("Offline cache {} could not be stored: {}", bucket, e);
            self.set_state(WorkerState::Redundant).await;
            return Err(CacheError::InstallFailed {
                asset: bucket,
                reason: e.to_string(),
            });
        }

        info!("Offline cache {} installed with {} assets", bucket, count);
        self.set_state(WorkerState::Installed).await;
        Ok(())
    }

    async fn fetch_manifest(&self) -> Result<Vec<(String, Response)>, CacheError> {
        let mut entries = Vec::with_capacity(self.manifest.assets().len());

        for entry in self.manifest.assets() {
            let failed = |reason: String| CacheError::InstallFailed {
                asset: entry.path.clone(),
                reason,
            };
            let url = self
                .manifest
                .asset_url(entry)
                .map_err(|e| failed(e.to_string()))?;

            let response = self
                .transport
                .fetch(&Request::get(url.clone()))
                .await
                .map_err(|e| failed(e.to_string()))?;

            if !response.is_success() {
                return Err(failed(format!("HTTP status {}", response.status)));
            }

            if let Some(expected) = &entry.sha256 {
                let actual = sha256_hex(&response.body);
                if !actual.eq_ignore_ascii_case(expected) {
                    return Err(failed(format!(
                        "content hash {} does not match manifest hash {}",
                        actual, expected
                    )));
                }
            }

            entries.push((url, response));
        }

        Ok(entries)
    }

    /// Drops every other generation and makes this one live
    ///
    /// Returns the names of the buckets that were deleted.
    pub async fn activate(&self) -> Result<Vec<String>, CacheError> {
        let actual = self.state().await;
        if actual != WorkerState::Installed {
            return Err(CacheError::InvalidState {
                expected: WorkerState::Installed,
                actual,
            });
        }

        let bucket = self.manifest.bucket_name();
        self.set_state(WorkerState::Activating).await;

        let dropped = match self.storage.promote(&bucket).await {
            Ok(dropped) => dropped,
            Err(e) => {
                self.set_state(WorkerState::Installed).await;
                return Err(e);
            }
        };
        for name in &dropped {
            info!("Deleted stale offline cache {}", name);
        }

        self.set_state(WorkerState::Active).await;
        info!("Offline cache {} is live", bucket);
        Ok(dropped)
    }

    /// Answers an intercepted request
    ///
    /// GET requests stored in the live bucket are served from it as-is. All
    /// other requests go to the network unchanged and the result, error
    /// included, is passed back without being cached.
    pub async fn handle(&self, request: &Request) -> Result<Response, CacheError> {
        if request.method.eq_ignore_ascii_case("GET") {
            if let Some(live) = self.storage.live_bucket().await? {
                let key = normalize_url(&request.url);
                if let Some(cached) = self.storage.match_entry(&live, &key).await? {
                    debug!("Serving {} from {}", request.url, live);
                    return Ok(cached);
                }
            }
        }

        debug!("Forwarding {} {} to network", request.method, request.url);
        self.transport.fetch(request).await
    }

    pub async fn live_bucket(&self) -> Result<Option<String>, CacheError> {
        self.storage.live_bucket().await
    }

    pub async fn bucket_names(&self) -> Result<Vec<String>, CacheError> {
        self.storage.bucket_names().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::{default_assets, AssetEntry};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const ORIGIN: &str = "http://notes.test";

    struct MockTransport {
        responses: HashMap<String, Response>,
        offline: AtomicBool,
        calls: AtomicUsize,
    }

    impl MockTransport {
        /// Serves every default asset with a body tagged by `tag`
        fn serving(tag: &str) -> Self {
            let responses = default_assets()
                .into_iter()
                .map(|entry| {
                    let url = format!("{}{}", ORIGIN, entry.path);
                    let body = format!("{} {}", tag, entry.path).into_bytes();
                    (url, ok(body))
                })
                .collect();
            MockTransport {
                responses,
                offline: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn go_offline(&self) {
            self.offline.store(true, Ordering::SeqCst);
        }
    }

    fn ok(body: Vec<u8>) -> Response {
        Response {
            status: 200,
            headers: vec![],
            body,
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn fetch(&self, request: &Request) -> Result<Response, CacheError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                return Err(CacheError::Network("offline".to_string()));
            }
            Ok(self.responses.get(&request.url).cloned().unwrap_or(Response {
                status: 404,
                headers: vec![],
                body: b"not found".to_vec(),
            }))
        }
    }

    fn cache(
        version: &str,
        assets: Vec<AssetEntry>,
        storage: &CacheStorage,
        transport: &Arc<MockTransport>,
    ) -> OfflineCache {
        let manifest = Manifest::new("notes", ORIGIN, Some(version), assets).unwrap();
        OfflineCache::new(manifest, storage.clone(), transport.clone())
    }

    fn url(path: &str) -> String {
        format!("{}{}", ORIGIN, path)
    }

    #[tokio::test]
    async fn test_activation_leaves_exactly_one_bucket() {
        let storage = CacheStorage::open_in_memory().unwrap();
        let net_v1 = Arc::new(MockTransport::serving("v1"));
        let net_v2 = Arc::new(MockTransport::serving("v2"));

        let v1 = cache("v1", default_assets(), &storage, &net_v1);
        v1.register().await.unwrap();
        assert_eq!(v1.state().await, WorkerState::Active);

        let v2 = cache("v2", default_assets(), &storage, &net_v2);
        let dropped = v2.register().await.unwrap();

        assert_eq!(dropped, vec!["notes-v1".to_string()]);
        assert_eq!(v2.bucket_names().await.unwrap(), vec!["notes-v2".to_string()]);
        assert_eq!(v2.live_bucket().await.unwrap().as_deref(), Some("notes-v2"));

        let served = v1.handle(&Request::get(url("/app.js"))).await.unwrap();
        assert_eq!(served.body, b"v2 /app.js".to_vec());
    }

    #[tokio::test]
    async fn test_cached_asset_served_without_network() {
        let storage = CacheStorage::open_in_memory().unwrap();
        let net = Arc::new(MockTransport::serving("v1"));
        let worker = cache("v1", default_assets(), &storage, &net);
        worker.register().await.unwrap();

        let calls_after_install = net.calls();
        assert_eq!(calls_after_install, default_assets().len());
        net.go_offline();

        let response = worker.handle(&Request::get(url("/index.html"))).await.unwrap();
        assert_eq!(response.body, b"v1 /index.html".to_vec());
        assert_eq!(net.calls(), calls_after_install);
    }

    #[tokio::test]
    async fn test_failed_install_keeps_previous_generation() {
        let storage = CacheStorage::open_in_memory().unwrap();
        let net_v1 = Arc::new(MockTransport::serving("v1"));
        let v1 = cache("v1", default_assets(), &storage, &net_v1);
        v1.register().await.unwrap();

        let mut assets = default_assets();
        assets.push(AssetEntry::new("/missing.js"));
        let net_v2 = Arc::new(MockTransport::serving("v2"));
        let v2 = cache("v2", assets, &storage, &net_v2);

        let err = v2.register().await.unwrap_err();
        match err {
            CacheError::InstallFailed { asset, .. } => assert_eq!(asset, "/missing.js"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(v2.state().await, WorkerState::Redundant);
        assert_eq!(storage.bucket_names().await.unwrap(), vec!["notes-v1".to_string()]);
        assert_eq!(storage.live_bucket().await.unwrap().as_deref(), Some("notes-v1"));

        net_v2.go_offline();
        let served = v2.handle(&Request::get(url("/styles.css"))).await.unwrap();
        assert_eq!(served.body, b"v1 /styles.css".to_vec());
    }

    #[tokio::test]
    async fn test_network_error_during_install_fails_install() {
        let storage = CacheStorage::open_in_memory().unwrap();
        let net = Arc::new(MockTransport::serving("v1"));
        net.go_offline();

        let worker = cache("v1", default_assets(), &storage, &net);
        assert!(matches!(
            worker.install().await,
            Err(CacheError::InstallFailed { .. })
        ));
        assert!(storage.bucket_names().await.unwrap().is_empty());
        assert!(storage.live_bucket().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_hash_mismatch_fails_install() {
        let storage = CacheStorage::open_in_memory().unwrap();
        let net = Arc::new(MockTransport::serving("v1"));
        let good = sha256_hex(b"v1 /app.js");

        let matching = cache("v1", vec![AssetEntry::with_hash("/app.js", good)], &storage, &net);
        matching.install().await.unwrap();

        let wrong = cache(
            "v2",
            vec![AssetEntry::with_hash("/app.js", sha256_hex(b"something else"))],
            &storage,
            &net,
        );
        assert!(matches!(
            wrong.install().await,
            Err(CacheError::InstallFailed { .. })
        ));
        assert_eq!(storage.bucket_names().await.unwrap(), vec!["notes-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_uncached_request_goes_to_network_and_is_not_stored() {
        let storage = CacheStorage::open_in_memory().unwrap();
        let net = Arc::new(MockTransport::serving("v1"));
        let worker = cache("v1", vec![AssetEntry::new("/index.html")], &storage, &net);
        worker.register().await.unwrap();

        let before = net.calls();
        let first = worker.handle(&Request::get(url("/app.js"))).await.unwrap();
        assert_eq!(first.body, b"v1 /app.js".to_vec());
        assert_eq!(net.calls(), before + 1);
        assert_eq!(storage.entry_count("notes-v1").await.unwrap(), 1);

        net.go_offline();
        let second = worker.handle(&Request::get(url("/app.js"))).await;
        assert!(matches!(second, Err(CacheError::Network(_))));
    }

    #[tokio::test]
    async fn test_non_get_request_bypasses_cache() {
        let storage = CacheStorage::open_in_memory().unwrap();
        let net = Arc::new(MockTransport::serving("v1"));
        let worker = cache("v1", default_assets(), &storage, &net);
        worker.register().await.unwrap();
        net.go_offline();

        let mut post = Request::get(url("/index.html"));
        post.method = "POST".to_string();
        assert!(matches!(worker.handle(&post).await, Err(CacheError::Network(_))));
    }

    #[tokio::test]
    async fn test_activate_requires_install() {
        let storage = CacheStorage::open_in_memory().unwrap();
        let net = Arc::new(MockTransport::serving("v1"));
        let worker = cache("v1", default_assets(), &storage, &net);

        let result = worker.activate().await;
        assert!(matches!(
            result,
            Err(CacheError::InvalidState {
                expected: WorkerState::Installed,
                actual: WorkerState::Parsed
            })
        ));
    }

    #[tokio::test]
    async fn test_equivalent_urls_hit_the_cache() {
        let storage = CacheStorage::open_in_memory().unwrap();
        let net = Arc::new(MockTransport::serving("v1"));
        let worker = cache("v1", default_assets(), &storage, &net);
        worker.register().await.unwrap();
        net.go_offline();

        let anchored = worker
            .handle(&Request::get(url("/index.html#top")))
            .await
            .unwrap();
        assert_eq!(anchored.body, b"v1 /index.html".to_vec());

        let bare_origin = worker.handle(&Request::get(ORIGIN)).await.unwrap();
        assert_eq!(bare_origin.body, b"v1 /".to_vec());
    }

    #[tokio::test]
    async fn test_reregistering_live_version_offline_keeps_serving() {
        let storage = CacheStorage::open_in_memory().unwrap();
        let net = Arc::new(MockTransport::serving("v1"));
        cache("v1", default_assets(), &storage, &net)
            .register()
            .await
            .unwrap();
        let calls_after_install = net.calls();
        net.go_offline();

        let restarted = cache("v1", default_assets(), &storage, &net);
        let dropped = restarted.register().await.unwrap();

        assert!(dropped.is_empty());
        assert_eq!(restarted.state().await, WorkerState::Active);
        assert_eq!(net.calls(), calls_after_install);
        assert_eq!(storage.live_bucket().await.unwrap().as_deref(), Some("notes-v1"));

        let served = restarted.handle(&Request::get(url("/app.js"))).await.unwrap();
        assert_eq!(served.body, b"v1 /app.js".to_vec());
    }

    #[tokio::test]
    async fn test_unresolvable_asset_path_is_install_failure() {
        let storage = CacheStorage::open_in_memory().unwrap();
        let net = Arc::new(MockTransport::serving("v1"));
        let worker = cache("v1", vec![AssetEntry::new("http://[::1")], &storage, &net);

        match worker.install().await {
            Err(CacheError::InstallFailed { asset, .. }) => assert_eq!(asset, "http://[::1"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(worker.state().await, WorkerState::Redundant);
        assert_eq!(net.calls(), 0);
    }

    #[tokio::test]
    async fn test_requests_before_any_install_go_to_network() {
        let storage = CacheStorage::open_in_memory().unwrap();
        let net = Arc::new(MockTransport::serving("v1"));
        let worker = cache("v1", default_assets(), &storage, &net);

        let response = worker.handle(&Request::get(url("/"))).await.unwrap();
        assert_eq!(response.body, b"v1 /".to_vec());
        assert_eq!(net.calls(), 1);
    }
}
