use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::Transcript;
use crate::extractors::VideoId;

/// Successful transcripts keyed by video id, with a time-to-live and a size cap.
///
/// Built once at startup and handed to the fetcher. When full, the oldest
/// entry is evicted.
pub struct TranscriptCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, (Instant, Transcript)>>,
}

impl TranscriptCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, video_id: &VideoId) -> Option<Transcript> {
        self.get_at(video_id, Instant::now())
    }

    pub fn insert(&self, video_id: &VideoId, transcript: Transcript) {
        self.insert_at(video_id, transcript, Instant::now());
    }

    fn get_at(&self, video_id: &VideoId, now: Instant) -> Option<Transcript> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let expired = match entries.get(video_id.as_str()) {
            Some((stored_at, _)) => now.saturating_duration_since(*stored_at) >= self.ttl,
            None => return None,
        };

        if expired {
            entries.remove(video_id.as_str());
            return None;
        }

        entries.get(video_id.as_str()).map(|(_, t)| t.clone())
    }

    fn insert_at(&self, video_id: &VideoId, transcript: Transcript, now: Instant) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        entries.retain(|_, (stored_at, _)| now.saturating_duration_since(*stored_at) < self.ttl);

        if !entries.contains_key(video_id.as_str()) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, (stored_at, _))| *stored_at)
                .map(|(key, _)| key.clone());
            if let Some(key) = oldest {
                entries.remove(&key);
            }
        }

        entries.insert(video_id.as_str().to_string(), (now, transcript));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
