//! Pluggable identity matching with memoized verdicts
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::frame::RawFrame;
use crate::memory::LruCache;
use log::debug;
use std::sync::Arc;

/// A recognizer that decides whether a frame shows someone it does not know.
/// Chosen once when the controller is built.
pub trait IdentityBackend: Send + Sync {
    fn name(&self) -> &str;

    fn unknown_present(&self, frame: &RawFrame) -> bool;
}

/// Backend wrapper that remembers verdicts per fingerprint (a face hash, a
/// track id, ...) so repeated sightings skip the expensive match.
pub struct CachedIdentity {
    backend: Box<dyn IdentityBackend>,
    cache: Arc<LruCache<String, bool>>,
}

impl CachedIdentity {
    pub fn new(backend: Box<dyn IdentityBackend>, cache: Arc<LruCache<String, bool>>) -> Self {
        CachedIdentity { backend, cache }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn unknown_present(&self, fingerprint: &str, frame: &RawFrame) -> bool {
        let key = fingerprint.to_string();
        if let Some(verdict) = self.cache.get(&key) {
            return verdict;
        }

        let verdict = self.backend.unknown_present(frame);
        if let Some((evicted, _)) = self.cache.put(key, verdict) {
            debug!("Identity cache evicted {evicted}");
        }
        verdict
    }
}
