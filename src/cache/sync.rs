//! Cache synchronization engine.
//!
//! Decides which derived cache entries are stale and repopulates them from
//! the persistent store. Every per-key write is idempotent, so concurrent
//! refreshes for the same user converge on the store's state; readers may
//! observe a brief window where some headings are refreshed and others are
//! not, which is acceptable because no caller assumes all-or-nothing across
//! headings.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::context::UserContext;
use crate::application::repos::{ItemSetsRepo, RepoError};
use crate::cache::keys;
use crate::cache::store::{CacheStore, CacheValue};

const SOURCE: &str = "cache::sync";

/// Which headings a refresh covers.
#[derive(Debug, Clone)]
pub enum RefreshTarget {
    /// Every heading currently known: from the cached header list when
    /// present, otherwise read fresh from the store.
    All,
    Headings(Vec<String>),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no item set stored under heading `{heading}`")]
    HeadingNotFound { heading: String },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Outcome of a multi-heading refresh. Headings absent from the store are
/// dropped from the refresh rather than failing it.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub refreshed: Vec<String>,
    pub missing: Vec<String>,
}

pub struct CacheSyncEngine {
    item_sets: Arc<dyn ItemSetsRepo>,
    cache: Arc<dyn CacheStore>,
    /// Window size W: the capped item-list prefix kept per heading.
    window: usize,
}

impl CacheSyncEngine {
    pub fn new(item_sets: Arc<dyn ItemSetsRepo>, cache: Arc<dyn CacheStore>, window: usize) -> Self {
        Self {
            item_sets,
            cache,
            window,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Read all headings for the user from the store, overwrite the
    /// header-list entry unconditionally, and return the list. The store is
    /// authoritative; any previous entry is replaced.
    pub async fn refresh_headers(&self, cx: &UserContext) -> Result<Vec<String>, SyncError> {
        let headings = self.item_sets.list_headings(cx.user_code()).await?;
        self.cache_set(
            &keys::header_list(cx.user_code()),
            CacheValue::Items(headings.clone()),
        );
        Ok(headings)
    }

    /// Reload item windows and full-availability flags for the targeted
    /// headings. Missing headings are skipped with a diagnostic and listed
    /// in the report.
    pub async fn refresh_items(
        &self,
        cx: &UserContext,
        target: RefreshTarget,
    ) -> Result<RefreshReport, SyncError> {
        let headings = match target {
            RefreshTarget::Headings(headings) => headings,
            RefreshTarget::All => match self.cached_header_list(cx) {
                Some(cached) => cached,
                // A missing or malformed header-list entry means "no
                // headings cached yet"; read the truth from the store.
                None => self.item_sets.list_headings(cx.user_code()).await?,
            },
        };

        let mut report = RefreshReport::default();
        for heading in headings {
            match self.item_sets.find(cx.user_code(), &heading).await? {
                Some(record) => {
                    self.write_window(cx, &heading, &record.items);
                    report.refreshed.push(heading);
                }
                None => {
                    debug!(
                        target: "stampino::cache",
                        source = SOURCE,
                        user = %cx.user_code(),
                        heading,
                        "heading absent in store, dropped from refresh"
                    );
                    report.missing.push(heading);
                }
            }
        }
        Ok(report)
    }

    /// Cached window lookup; on miss, refreshes that single heading and
    /// retries once. Returns the window items and the full-availability
    /// flag.
    pub async fn get_window(
        &self,
        cx: &UserContext,
        heading: &str,
    ) -> Result<(Vec<String>, bool), SyncError> {
        if let Some(window) = self.read_window(cx, heading) {
            counter!("stampino_cache_window_hit_total").increment(1);
            return Ok(window);
        }
        counter!("stampino_cache_window_miss_total").increment(1);

        self.refresh_items(cx, RefreshTarget::Headings(vec![heading.to_string()]))
            .await?;

        self.read_window(cx, heading).ok_or_else(|| SyncError::HeadingNotFound {
            heading: heading.to_string(),
        })
    }

    /// Cache the entire item list for one heading and raise the full flag.
    /// Used when the consumer explicitly requests the complete list.
    pub async fn cache_full_list(
        &self,
        cx: &UserContext,
        heading: &str,
    ) -> Result<Vec<String>, SyncError> {
        let record = self
            .item_sets
            .find(cx.user_code(), heading)
            .await?
            .ok_or_else(|| SyncError::HeadingNotFound {
                heading: heading.to_string(),
            })?;

        if !keys::heading_collides_with_header_key(heading) {
            self.cache_set(
                &keys::item_window(cx.user_code(), heading),
                CacheValue::Items(record.items.clone()),
            );
            self.cache_set(&keys::full_flag(cx.user_code(), heading), CacheValue::Flag(true));
        }
        Ok(record.items)
    }

    /// The full-availability flag for a heading; absent reads as false.
    pub fn full_available(&self, cx: &UserContext, heading: &str) -> bool {
        self.cache_get(&keys::full_flag(cx.user_code(), heading))
            .and_then(|value| value.as_flag())
            .unwrap_or(false)
    }

    /// Drop the window and flag entries for one heading. Called when an
    /// item set is deleted or renamed away from the heading.
    pub fn evict_heading(&self, cx: &UserContext, heading: &str) {
        self.cache_delete(&keys::item_window(cx.user_code(), heading));
        self.cache_delete(&keys::full_flag(cx.user_code(), heading));
    }

    /// Drop every cache entry belonging to the user. Called on logout.
    pub fn purge_user(&self, cx: &UserContext) {
        if let Err(err) = self.cache.delete_prefix(&keys::user_prefix(cx.user_code())) {
            warn!(
                target: "stampino::cache",
                source = SOURCE,
                user = %cx.user_code(),
                error = %err,
                "cache purge failed"
            );
        }
    }

    /// Truncate to the window, write the item entry (skipping the write if
    /// the heading would clobber the header-list key), and recompute the
    /// full flag from the current length. The flag is never carried over:
    /// a list can shrink below or grow above the window threshold between
    /// refreshes.
    fn write_window(&self, cx: &UserContext, heading: &str, items: &[String]) {
        let full = items.len() <= self.window;
        if keys::heading_collides_with_header_key(heading) {
            warn!(
                target: "stampino::cache",
                source = SOURCE,
                user = %cx.user_code(),
                heading,
                "heading collides with the header-list key, item write skipped"
            );
        } else {
            let window: Vec<String> = items.iter().take(self.window).cloned().collect();
            self.cache_set(
                &keys::item_window(cx.user_code(), heading),
                CacheValue::Items(window),
            );
        }
        self.cache_set(&keys::full_flag(cx.user_code(), heading), CacheValue::Flag(full));
    }

    fn read_window(&self, cx: &UserContext, heading: &str) -> Option<(Vec<String>, bool)> {
        let items = self
            .cache_get(&keys::item_window(cx.user_code(), heading))?
            .as_items()?
            .to_vec();
        let full = self.full_available(cx, heading);
        Some((items, full))
    }

    fn cached_header_list(&self, cx: &UserContext) -> Option<Vec<String>> {
        self.cache_get(&keys::header_list(cx.user_code()))
            .and_then(|value| value.as_items().map(<[String]>::to_vec))
    }

    // Cache-layer failures are never authoritative: log and carry on, the
    // persistent store remains the fallback on the read path.

    fn cache_get(&self, key: &str) -> Option<CacheValue> {
        match self.cache.get(key) {
            Ok(value) => value,
            Err(err) => {
                warn!(target: "stampino::cache", source = SOURCE, key, error = %err, "cache read failed");
                None
            }
        }
    }

    fn cache_set(&self, key: &str, value: CacheValue) {
        if let Err(err) = self.cache.set(key, value) {
            warn!(target: "stampino::cache", source = SOURCE, key, error = %err, "cache write failed");
        }
    }

    fn cache_delete(&self, key: &str) {
        if let Err(err) = self.cache.delete(key) {
            warn!(target: "stampino::cache", source = SOURCE, key, error = %err, "cache delete failed");
        }
    }
}
