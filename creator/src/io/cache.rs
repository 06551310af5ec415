//! Response caching with content-addressed storage.
//!
//! Replies are stored at `{cache_dir}/{seed}/{request_hash}.json`. The hash
//! covers the full wire request (model, messages, limits), so any prompt or
//! history change misses the cache. Changing the seed starts a fresh cache.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::core::digest::sha256_hex;
use crate::io::llm::{ChatBackend, ChatReply, ChatRequest};

/// On-disk store of chat replies.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
}

impl ResponseCache {
    pub fn new(cache_dir: &Path, seed: u64) -> Self {
        Self {
            dir: cache_dir.join(seed.to_string()),
        }
    }

    /// Cache key for a request.
    pub fn key(request: &ChatRequest) -> Result<String> {
        let payload = serde_json::to_vec(request).context("serialize chat request")?;
        Ok(sha256_hex(&payload))
    }

    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Load a cached reply if it exists.
    pub fn get(&self, key: &str) -> Result<Option<ChatReply>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        debug!(path = %path.display(), "loading cached reply");
        let content =
            fs::read_to_string(&path).with_context(|| format!("read cache {}", path.display()))?;
        let reply = serde_json::from_str(&content)
            .with_context(|| format!("parse cache {}", path.display()))?;
        Ok(Some(reply))
    }

    /// Save a reply to the cache.
    pub fn put(&self, key: &str, reply: &ChatReply) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create cache dir {}", self.dir.display()))?;
        let path = self.entry_path(key);
        debug!(path = %path.display(), "saving reply to cache");
        let content = serde_json::to_string_pretty(reply)?;
        fs::write(&path, content).with_context(|| format!("write cache {}", path.display()))?;
        Ok(())
    }
}

/// Backend wrapper that consults a [`ResponseCache`] before calling `inner`.
pub struct CachedBackend<B> {
    inner: B,
    cache: Option<ResponseCache>,
}

impl<B: ChatBackend> CachedBackend<B> {
    /// Wrap `inner`; `cache = None` passes every request through.
    pub fn new(inner: B, cache: Option<ResponseCache>) -> Self {
        Self { inner, cache }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

impl<B: ChatBackend> ChatBackend for CachedBackend<B> {
    fn complete(&self, request: &ChatRequest) -> Result<ChatReply> {
        let Some(cache) = &self.cache else {
            return self.inner.complete(request);
        };
        let key = ResponseCache::key(request)?;
        match cache.get(&key) {
            Ok(Some(reply)) => {
                debug!(agent = %request.agent, key = %key, "cache hit");
                return Ok(reply);
            }
            Ok(None) => {}
            Err(err) => warn!(err = %err, "ignoring unreadable cache entry"),
        }
        let reply = self.inner.complete(request)?;
        if let Err(err) = cache.put(&key, &reply) {
            warn!(err = %err, "failed to cache reply");
        }
        Ok(reply)
    }
}
