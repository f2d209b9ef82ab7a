/// Image fetching with per-URL request coalescing
///
/// Results live in the ephemeral storage tier keyed by the SHA-256 of the
/// source URL. While a fetch is in flight, further requests for the same URL
/// queue behind it and receive the same result.
use crate::error::FetchError;
use crate::host::{ImageFetcher, KeyValueStore};
use crate::url_parts::parse_url;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::channel::oneshot;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::HashMap;
use url::Url;

type FetchResult = Result<String, FetchError>;

pub fn content_hash(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// What the ephemeral tier holds for a fetched URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CachedImage {
    Loaded { data: String, time: f64 },
    Failed { failed: bool, time: f64 },
}

impl CachedImage {
    fn into_result(self, url: &str) -> FetchResult {
        match self {
            CachedImage::Loaded { data, .. } => Ok(data),
            CachedImage::Failed { .. } => Err(FetchError::Failed(url.to_string())),
        }
    }
}

/// Lifecycle of one coalesced fetch; only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FetchState {
    Pending,
    Loading,
    Complete,
}

impl FetchState {
    fn advance(self, next: FetchState) -> FetchState {
        debug_assert!(next >= self, "fetch state cannot go from {self:?} to {next:?}");
        next.max(self)
    }
}

struct PendingFetch {
    state: FetchState,
    waiters: Vec<oneshot::Sender<FetchResult>>,
}

enum Admission {
    /// Caller must perform the fetch
    Leader,
    /// Another caller is fetching; wait on the queued receiver
    Follower,
}

pub struct ImageCache {
    store: Box<dyn KeyValueStore>,
    pending: RefCell<HashMap<String, PendingFetch>>,
    extension_url: String,
    timeout_ms: u32,
}

impl ImageCache {
    pub fn new(store: Box<dyn KeyValueStore>, extension_url: String, timeout_ms: u32) -> Self {
        ImageCache {
            store,
            pending: RefCell::new(HashMap::new()),
            extension_url,
            timeout_ms,
        }
    }

    pub fn state(&self, url: &str) -> Option<FetchState> {
        self.pending.borrow().get(&content_hash(url)).map(|entry| entry.state)
    }

    /// Resolve `url` to a data URL
    ///
    /// When `url` is unusable, or nothing is cached for it yet, an image
    /// previously fetched for the domain of `guide_url` is used instead.
    pub async fn fetch_image<F: ImageFetcher>(
        &self,
        fetcher: &F,
        url: &str,
        guide_url: Option<&str>,
    ) -> FetchResult {
        if !is_fetchable(url) {
            if !self.extension_url.is_empty() && url.starts_with(&self.extension_url) {
                return Ok(url.to_string());
            }

            return self
                .cached_by_guide(guide_url)
                .ok_or_else(|| FetchError::NotFound(url.to_string()));
        }

        let key = content_hash(url);

        if let Some(cached) = self.cached(&key) {
            return cached.into_result(url);
        }

        if let Some(image) = self.cached_by_guide(guide_url) {
            return Ok(image);
        }

        let result = self.fetch_coalesced(fetcher, url, &key).await;
        self.remember_guide(guide_url, &key);
        result
    }

    async fn fetch_coalesced<F: ImageFetcher>(&self, fetcher: &F, url: &str, key: &str) -> FetchResult {
        let (tx, rx) = oneshot::channel();

        match self.admit(key, tx) {
            Admission::Follower => {
                debug!("Joining in-flight fetch for {}", url);
                return rx.await.unwrap_or(Err(FetchError::Abandoned));
            }
            Admission::Leader => {}
        }

        let mut guard = InFlight { cache: self, key, done: false };

        let outcome = match fetcher.fetch(url, self.timeout_ms).await {
            Ok(response) if response.status == 200 => Ok(to_data_url(&response.body)),
            Ok(response) => {
                warn!("Image fetch for {} returned {}", url, response.status);
                Err(FetchError::Failed(url.to_string()))
            }
            Err(e) => {
                warn!("Image fetch for {} failed: {}", url, e);
                Err(FetchError::Failed(url.to_string()))
            }
        };

        let cached = match &outcome {
            Ok(data) => CachedImage::Loaded {
                data: data.clone(),
                time: fetcher.now_millis(),
            },
            Err(_) => CachedImage::Failed {
                failed: true,
                time: fetcher.now_millis(),
            },
        };

        self.complete(key, Some(cached), outcome);
        guard.done = true;

        rx.await.unwrap_or(Err(FetchError::Abandoned))
    }

    /// Register `waiter` for `key` and decide who fetches
    ///
    /// Entries leave the map in the same step that completes them, so a
    /// finished result is only ever found in the store.
    fn admit(&self, key: &str, waiter: oneshot::Sender<FetchResult>) -> Admission {
        let mut pending = self.pending.borrow_mut();

        if let Some(entry) = pending.get_mut(key) {
            debug_assert_eq!(entry.state, FetchState::Loading);
            entry.waiters.push(waiter);
            return Admission::Follower;
        }

        let mut entry = PendingFetch {
            state: FetchState::Pending,
            waiters: vec![waiter],
        };
        entry.state = entry.state.advance(FetchState::Loading);
        pending.insert(key.to_string(), entry);

        Admission::Leader
    }

    /// Mark `key` complete, persist, then wake every waiter in arrival order
    fn complete(&self, key: &str, cached: Option<CachedImage>, outcome: FetchResult) {
        let waiters = {
            let mut pending = self.pending.borrow_mut();
            match pending.get_mut(key) {
                Some(entry) => {
                    entry.state = entry.state.advance(FetchState::Complete);
                    std::mem::take(&mut entry.waiters)
                }
                None => Vec::new(),
            }
        };

        if let Some(cached) = cached {
            match serde_json::to_value(&cached) {
                Ok(value) => {
                    if let Err(e) = self.store.set_item(key, value) {
                        warn!("Failed to cache image {}: {}", key, e);
                    }
                }
                Err(e) => warn!("Failed to encode cached image {}: {}", key, e),
            }
        }

        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }

        self.pending.borrow_mut().remove(key);
    }

    fn cached(&self, key: &str) -> Option<CachedImage> {
        let value = self.store.get_item(key)?;
        serde_json::from_value(value).ok()
    }

    fn cached_by_guide(&self, guide_url: Option<&str>) -> Option<String> {
        let guide_url = guide_url.filter(|guide| !guide.is_empty())?;
        let guide_key = content_hash(&parse_url(guide_url).domain);

        let url_key = self.store.get_item(&guide_key)?;
        match self.cached(url_key.as_str()?)? {
            CachedImage::Loaded { data, .. } => Some(data),
            CachedImage::Failed { .. } => None,
        }
    }

    fn remember_guide(&self, guide_url: Option<&str>, url_key: &str) {
        let Some(guide_url) = guide_url.filter(|guide| !guide.is_empty()) else {
            return;
        };

        let guide_key = content_hash(&parse_url(guide_url).domain);
        if let Err(e) = self.store.set_item(&guide_key, url_key.into()) {
            warn!("Failed to remember guide image for {}: {}", guide_url, e);
        }
    }
}

/// Wakes waiters if the leading fetch is dropped before it completes
struct InFlight<'a> {
    cache: &'a ImageCache,
    key: &'a str,
    done: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.cache.complete(self.key, None, Err(FetchError::Abandoned));
        }
    }
}

fn is_fetchable(url: &str) -> bool {
    Url::parse(url)
        .map(|parsed| matches!(parsed.scheme(), "http" | "https") && parsed.has_host())
        .unwrap_or(false)
}

fn image_extension(bytes: &[u8]) -> &'static str {
    match bytes {
        [0xff, 0xd8, .., 0xff, 0xd9] => "jpeg",
        [0x89, 0x50, 0x4e, 0x47, ..] => "png",
        [0x47, 0x49, 0x46, 0x38, ..] => "gif",
        _ => "jpeg",
    }
}

fn to_data_url(bytes: &[u8]) -> String {
    format!("data:image/{};base64,{}", image_extension(bytes), STANDARD.encode(bytes))
}
