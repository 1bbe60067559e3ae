//! Virtual Sample Store
//!
//! Caches decoded sample buffers by opaque content key. Each key owns an
//! async once-cell, so concurrent loads of the same key share a single
//! fetch + decode and a failed load caches nothing.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::engine::io::{decode_wav, SampleSource, SourceRef};
use crate::error::{MixgraphError, Result};

/// Metadata for a decoded sample. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VfsEntry {
    /// 1 (mono) or 2 (stereo)
    pub channels: u16,
    /// Length in sample frames
    pub duration: u64,
    /// Native sample rate of the decoded file
    pub sample_rate: u32,
}

impl VfsEntry {
    /// Full source length in seconds (not a clip's trimmed length)
    pub fn duration_secs(&self) -> f64 {
        self.duration as f64 / self.sample_rate as f64
    }
}

/// A decoded sample: its metadata plus one shared slice per channel
#[derive(Debug)]
pub struct LoadedSample {
    pub entry: VfsEntry,
    pub channels: Vec<Arc<[f32]>>,
}

/// Renderer file-system path for one channel of a sample
pub fn channel_path(key: &str, channel: usize) -> String {
    format!("{}:{}", key, channel)
}

type Slot = Arc<OnceCell<Arc<LoadedSample>>>;

/// Keyed cache of decoded samples
pub struct VirtualSampleStore {
    source: Arc<dyn SampleSource>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl std::fmt::Debug for VirtualSampleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualSampleStore")
            .field("loaded", &self.loaded_keys())
            .finish()
    }
}

impl VirtualSampleStore {
    pub fn new(source: Arc<dyn SampleSource>) -> Self {
        Self {
            source,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Load `key` from `source`, or return the cached sample
    ///
    /// Idempotent: once a key is cached, `source` is never fetched again.
    /// Concurrent calls for a key that is still loading wait on the same
    /// in-flight decode.
    pub async fn load(&self, key: &str, source: &SourceRef) -> Result<Arc<LoadedSample>> {
        let slot = self
            .slots()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = slot
            .get_or_try_init(|| self.fetch_and_decode(key, source))
            .await
            .map(Arc::clone);

        match result {
            Ok(sample) => {
                // A prune may have dropped the slot while the decode was in flight
                self.slots().entry(key.to_string()).or_insert(slot);
                Ok(sample)
            }
            Err(e) => {
                let mut slots = self.slots();
                let stale = slots
                    .get(key)
                    .is_some_and(|current| Arc::ptr_eq(current, &slot) && !current.initialized());
                if stale {
                    slots.remove(key);
                }
                Err(e)
            }
        }
    }

    async fn fetch_and_decode(&self, key: &str, source: &SourceRef) -> Result<Arc<LoadedSample>> {
        debug!(key, ?source, "fetching sample");
        let bytes = self.source.fetch(key, source).await?;

        let buffer = tokio::task::spawn_blocking(move || decode_wav(&bytes))
            .await
            .map_err(|e| MixgraphError::InvalidAudio {
                reason: format!("decode task failed: {}", e),
                source: Some(Box::new(e)),
            })??;

        let entry = VfsEntry {
            channels: buffer.channels() as u16,
            duration: buffer.len() as u64,
            sample_rate: buffer.sample_rate,
        };
        info!(
            key,
            channels = entry.channels,
            frames = entry.duration,
            sample_rate = entry.sample_rate,
            "sample decoded"
        );

        Ok(Arc::new(LoadedSample {
            entry,
            channels: buffer.into_shared_channels(),
        }))
    }

    /// Whether `key` has finished loading
    pub fn is_loaded(&self, key: &str) -> bool {
        self.slots()
            .get(key)
            .is_some_and(|slot| slot.initialized())
    }

    /// Metadata for a loaded key
    pub fn entry(&self, key: &str) -> Option<VfsEntry> {
        self.sample(key).map(|sample| sample.entry)
    }

    /// Decoded sample for a loaded key
    pub fn sample(&self, key: &str) -> Option<Arc<LoadedSample>> {
        self.slots().get(key).and_then(|slot| slot.get().cloned())
    }

    /// Snapshot of every loaded entry
    pub fn entries(&self) -> HashMap<String, VfsEntry> {
        self.slots()
            .iter()
            .filter_map(|(key, slot)| slot.get().map(|s| (key.clone(), s.entry)))
            .collect()
    }

    fn loaded_keys(&self) -> Vec<String> {
        self.slots()
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Drop every key not in `active_keys`
    ///
    /// Returns the keys whose loaded buffers were released, so the caller
    /// can tell the renderer to free them.
    pub fn prune(&self, active_keys: &HashSet<String>) -> Vec<String> {
        let mut released = Vec::new();
        self.slots().retain(|key, slot| {
            let keep = active_keys.contains(key);
            if !keep && slot.initialized() {
                released.push(key.clone());
            }
            keep
        });
        if !released.is_empty() {
            info!(count = released.len(), "pruned samples");
        }
        released
    }

    /// Forget everything
    pub fn clear(&self) {
        self.slots().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::{encode_wav, generate_test_tone};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Serves a fixed WAV for every key and counts fetches
    struct CountingSource {
        wav: Vec<u8>,
        fetches: AtomicUsize,
        delay: Duration,
    }

    impl CountingSource {
        fn new(delay: Duration) -> Arc<Self> {
            let tone = generate_test_tone(440.0, 0.5, 44100);
            Arc::new(Self {
                wav: encode_wav(&tone, 16).unwrap(),
                fetches: AtomicUsize::new(0),
                delay,
            })
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SampleSource for CountingSource {
        async fn fetch(&self, key: &str, _source: &SourceRef) -> Result<Vec<u8>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if key.starts_with("broken") {
                return Ok(b"not audio".to_vec());
            }
            Ok(self.wav.clone())
        }
    }

    fn any_source() -> SourceRef {
        SourceRef::Url("https://example.invalid/take.wav".to_string())
    }

    #[tokio::test]
    async fn test_load_records_entry() {
        let store = VirtualSampleStore::new(CountingSource::new(Duration::ZERO));
        let sample = store.load("take-1", &any_source()).await.unwrap();

        assert_eq!(
            sample.entry,
            VfsEntry {
                channels: 1,
                duration: 22050,
                sample_rate: 44100
            }
        );
        assert!(store.is_loaded("take-1"));
        assert_eq!(store.entry("take-1"), Some(sample.entry));
        assert_eq!(sample.channels.len(), 1);
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let source = CountingSource::new(Duration::ZERO);
        let store = VirtualSampleStore::new(source.clone());

        let first = store.load("take-1", &any_source()).await.unwrap();
        let second = store.load("take-1", &any_source()).await.unwrap();

        assert_eq!(first.entry, second.entry);
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_fetch() {
        let source = CountingSource::new(Duration::from_millis(20));
        let store = VirtualSampleStore::new(source.clone());
        let src = any_source();

        let (a, b) = tokio::join!(store.load("take-1", &src), store.load("take-1", &src));

        assert_eq!(a.unwrap().entry, b.unwrap().entry);
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn test_failed_decode_leaves_no_entry() {
        let source = CountingSource::new(Duration::ZERO);
        let store = VirtualSampleStore::new(source.clone());

        let result = store.load("broken-1", &any_source()).await;
        assert!(matches!(result, Err(MixgraphError::InvalidAudio { .. })));
        assert!(!store.is_loaded("broken-1"));
        assert_eq!(store.entry("broken-1"), None);
        assert!(store.entries().is_empty());

        // Nothing was cached, so a retry fetches again
        let _ = store.load("broken-1", &any_source()).await;
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn test_prune_keeps_only_active() {
        let store = VirtualSampleStore::new(CountingSource::new(Duration::ZERO));
        for key in ["a", "b", "c"] {
            store.load(key, &any_source()).await.unwrap();
        }

        let active: HashSet<String> = ["a", "c", "never-loaded"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let released = store.prune(&active);

        assert_eq!(released, vec!["b".to_string()]);
        assert!(store.is_loaded("a"));
        assert!(!store.is_loaded("b"));
        assert!(store.is_loaded("c"));
        assert_eq!(store.entries().len(), 2);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = VirtualSampleStore::new(CountingSource::new(Duration::ZERO));
        store.load("a", &any_source()).await.unwrap();
        store.clear();
        assert!(!store.is_loaded("a"));
        assert!(store.entries().is_empty());
    }

    #[test]
    fn test_channel_path() {
        assert_eq!(channel_path("kick", 0), "kick:0");
        assert_eq!(channel_path("kick", 1), "kick:1");
    }

    #[test]
    fn test_entry_duration_secs() {
        let entry = VfsEntry {
            channels: 2,
            duration: 88200,
            sample_rate: 44100,
        };
        assert_eq!(entry.duration_secs(), 2.0);
    }
}
