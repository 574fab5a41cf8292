//! In-memory artifact store with time-to-live.
//!
//! Expiry is enforced on every lookup; a background sweeper only reclaims
//! memory. Expiry instants use [`tokio::time::Instant`] so tests can drive
//! them with paused time.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// What an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArtifactKind {
    #[serde(rename = "pdf")]
    Pdf,
    /// Degraded result: the LaTeX source itself.
    #[serde(rename = "latex-only")]
    LatexOnly,
}

impl ArtifactKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::LatexOnly => "latex-only",
        }
    }

    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::LatexOnly => "application/x-tex",
        }
    }

    /// File name offered to the client on download.
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Pdf => "documento.pdf",
            Self::LatexOnly => "documento.tex",
        }
    }

    #[must_use]
    pub fn content_disposition(self) -> &'static str {
        match self {
            Self::Pdf => "attachment; filename=documento.pdf",
            Self::LatexOnly => "attachment; filename=documento.tex",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactContent {
    Pdf(Vec<u8>),
    Latex(String),
}

impl ArtifactContent {
    #[must_use]
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::Pdf(_) => ArtifactKind::Pdf,
            Self::Latex(_) => ArtifactKind::LatexOnly,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Pdf(bytes) => bytes,
            Self::Latex(text) => text.as_bytes(),
        }
    }
}

/// A stored deliverable. Immutable once inserted.
#[derive(Debug)]
pub struct Artifact {
    pub id: String,
    pub content: ArtifactContent,
    /// LaTeX the artifact was produced from.
    pub source: String,
    /// Compiler output worth keeping (log tail, or the reason for a fallback).
    pub diagnostics: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Instant,
    pub ttl: Duration,
}

impl Artifact {
    #[must_use]
    pub fn kind(&self) -> ArtifactKind {
        self.content.kind()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.content.as_bytes().len()
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Time left before the artifact becomes unreachable.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Wall-clock expiry, for display.
    #[must_use]
    pub fn expires_at_utc(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| self.created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Shared map of live artifacts. Cloning shares the same store.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    inner: Arc<RwLock<HashMap<String, Arc<Artifact>>>>,
    ttl: Duration,
}

impl ArtifactStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store a fully built artifact under a fresh id.
    pub fn insert(
        &self,
        content: ArtifactContent,
        source: String,
        diagnostics: Option<String>,
    ) -> Arc<Artifact> {
        let artifact = Arc::new(Artifact {
            id: uuid::Uuid::new_v4().to_string(),
            content,
            source,
            diagnostics,
            created_at: Utc::now(),
            expires_at: Instant::now() + self.ttl,
            ttl: self.ttl,
        });

        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(artifact.id.clone(), Arc::clone(&artifact));

        info!(
            artifact_id = %artifact.id,
            kind = %artifact.kind(),
            size = artifact.size(),
            ttl_secs = self.ttl.as_secs(),
            "Artifact stored"
        );
        artifact
    }

    /// Live artifact for `id`. An expired entry is evicted and reported missing.
    pub fn get(&self, id: &str) -> Option<Arc<Artifact>> {
        let found = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()?;

        if !found.is_expired() {
            return Some(found);
        }

        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if map.get(id).is_some_and(|a| a.is_expired()) {
            map.remove(id);
            debug!(artifact_id = %id, "Expired artifact evicted on access");
        }
        None
    }

    /// Remove every expired artifact, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = map.len();
        map.retain(|_, a| a.expires_at > now);
        before - map.len()
    }

    /// Number of stored entries, expired ones included until swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Periodically purge expired artifacts until the task is aborted.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let removed = store.purge_expired();
                if removed > 0 {
                    debug!(removed, remaining = store.len(), "Swept expired artifacts");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(600);

    #[tokio::test(start_paused = true)]
    async fn test_lookup_before_and_after_expiry() {
        let store = ArtifactStore::new(TTL);
        let stored = store.insert(
            ArtifactContent::Pdf(b"%PDF-1.5 body".to_vec()),
            "src".to_string(),
            None,
        );

        tokio::time::advance(TTL - Duration::from_millis(1)).await;
        let found = store.get(&stored.id).expect("still live");
        assert_eq!(found.content, ArtifactContent::Pdf(b"%PDF-1.5 body".to_vec()));

        tokio::time::advance(Duration::from_millis(2)).await;
        assert!(store.get(&stored.id).is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_same_source_gets_distinct_ids() {
        let store = ArtifactStore::new(TTL);
        let a = store.insert(ArtifactContent::Latex("x".into()), "x".into(), None);
        let b = store.insert(ArtifactContent::Latex("x".into()), "x".into(), None);
        assert_ne!(a.id, b.id);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_id() {
        let store = ArtifactStore::new(TTL);
        assert!(store.get("unknown-id").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_keeps_live_entries() {
        let store = ArtifactStore::new(TTL);
        store.insert(ArtifactContent::Latex("old".into()), "old".into(), None);
        tokio::time::advance(TTL / 2).await;
        let young = store.insert(ArtifactContent::Latex("new".into()), "new".into(), None);
        tokio::time::advance(TTL / 2).await;

        assert_eq!(store.purge_expired(), 1);
        assert!(store.get(&young.id).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_reclaims_expired() {
        let store = ArtifactStore::new(Duration::from_secs(10));
        store.insert(ArtifactContent::Latex("x".into()), "x".into(), None);
        let sweeper = store.spawn_sweeper(Duration::from_secs(1));

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(store.len(), 0);
        sweeper.abort();
    }

    #[test]
    fn test_kind_metadata() {
        assert_eq!(ArtifactKind::Pdf.content_type(), "application/pdf");
        assert_eq!(ArtifactKind::LatexOnly.file_name(), "documento.tex");
        assert_eq!(
            serde_json::to_value(ArtifactKind::LatexOnly).unwrap(),
            "latex-only"
        );
    }
}
