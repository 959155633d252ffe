//! Item-set editing: the operations behind the edit surface, each one
//! keeping the cache in step with the store.

use std::sync::Arc;

use tracing::info;

use crate::application::context::UserContext;
use crate::application::repos::{ItemSetsRepo, NewItemSet, RepoError, UpdateItemSetParams};
use crate::cache::{CacheSyncEngine, RefreshTarget, SyncError};
use crate::domain::error::DomainError;
use crate::domain::types::RgbaColor;

#[derive(Debug, thiserror::Error)]
pub enum ItemSetError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Where appended items land relative to the stored list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendPosition {
    Top,
    Bottom,
}

/// Style and naming fields the edit form can change.
#[derive(Debug, Clone)]
pub struct ItemSetUpdate {
    pub heading: String,
    pub position_x: i32,
    pub position_y: i32,
    pub font_name: String,
    pub font_size: i32,
    pub color: RgbaColor,
}

pub struct ItemSetService {
    item_sets: Arc<dyn ItemSetsRepo>,
    engine: Arc<CacheSyncEngine>,
}

impl ItemSetService {
    pub fn new(item_sets: Arc<dyn ItemSetsRepo>, engine: Arc<CacheSyncEngine>) -> Self {
        Self { item_sets, engine }
    }

    /// Start a new item set with no heading yet. At most one such draft
    /// exists per user; calling again returns the existing one.
    pub async fn create_blank(
        &self,
        cx: &UserContext,
    ) -> Result<crate::domain::entities::ItemSetRecord, ItemSetError> {
        if let Some(existing) = self.item_sets.find(cx.user_code(), "").await? {
            return Ok(existing);
        }
        let record = self
            .item_sets
            .insert(NewItemSet {
                user_code: cx.user_code().clone(),
                heading: String::new(),
                items: Vec::new(),
            })
            .await?;
        Ok(record)
    }

    /// Rename and restyle an item set in one atomic write, then bring the
    /// cache in line: the old heading's entries are evicted on rename, the
    /// header list is rewritten, and the new heading is refreshed.
    pub async fn update(
        &self,
        cx: &UserContext,
        current_heading: &str,
        update: ItemSetUpdate,
    ) -> Result<crate::domain::entities::ItemSetRecord, ItemSetError> {
        validate_heading(&update.heading)?;

        let current = self
            .item_sets
            .find(cx.user_code(), current_heading)
            .await?
            .ok_or_else(|| DomainError::not_found("item set"))?;

        let renaming = update.heading != current_heading;
        if renaming
            && let Some(occupant) = self.item_sets.find(cx.user_code(), &update.heading).await?
        {
            return Err(DomainError::HeadingConflict {
                heading: update.heading,
                existing_items: occupant.items,
                incoming_items: current.items,
            }
            .into());
        }

        let record = self
            .item_sets
            .update(
                cx.user_code(),
                UpdateItemSetParams {
                    id: current.id,
                    heading: update.heading,
                    position_x: update.position_x,
                    position_y: update.position_y,
                    font_name: update.font_name,
                    font_size: update.font_size,
                    color: update.color,
                },
            )
            .await?;

        if renaming {
            self.engine.evict_heading(cx, current_heading);
        }
        self.engine.refresh_headers(cx).await?;
        self.engine
            .refresh_items(cx, RefreshTarget::Headings(vec![record.heading.clone()]))
            .await?;

        info!(user_code = %cx.user_code(), heading = %record.heading, renamed = renaming, "item set updated");
        Ok(record)
    }

    /// Splice new items onto the stored list and refresh that heading's
    /// cache entries.
    pub async fn append_items(
        &self,
        cx: &UserContext,
        heading: &str,
        new_items: Vec<String>,
        position: AppendPosition,
    ) -> Result<(), ItemSetError> {
        let current = self
            .item_sets
            .find(cx.user_code(), heading)
            .await?
            .ok_or_else(|| DomainError::not_found("item set"))?;

        let merged = match position {
            AppendPosition::Top => {
                let mut merged = new_items;
                merged.extend(current.items);
                merged
            }
            AppendPosition::Bottom => {
                let mut merged = current.items;
                merged.extend(new_items);
                merged
            }
        };

        self.item_sets
            .replace_items(cx.user_code(), heading, merged)
            .await?;
        self.engine
            .refresh_items(cx, RefreshTarget::Headings(vec![heading.to_string()]))
            .await?;
        Ok(())
    }

    /// Hand back the complete item list, caching it whole and raising the
    /// full-availability flag.
    pub async fn load_full(
        &self,
        cx: &UserContext,
        heading: &str,
    ) -> Result<Vec<String>, ItemSetError> {
        Ok(self.engine.cache_full_list(cx, heading).await?)
    }

    /// The cached window for one heading plus whether the full list is
    /// already cached.
    pub async fn window(
        &self,
        cx: &UserContext,
        heading: &str,
    ) -> Result<(Vec<String>, bool), ItemSetError> {
        Ok(self.engine.get_window(cx, heading).await?)
    }

    /// Remove an item set and everything cached under its heading.
    pub async fn delete(&self, cx: &UserContext, heading: &str) -> Result<(), ItemSetError> {
        self.item_sets.delete(cx.user_code(), heading).await?;
        self.engine.evict_heading(cx, heading);
        self.engine.refresh_headers(cx).await?;
        info!(user_code = %cx.user_code(), heading, "item set deleted");
        Ok(())
    }
}

/// A heading must not shadow the cache's header-list key; everything else
/// is the user's choice.
fn validate_heading(heading: &str) -> Result<(), DomainError> {
    if crate::cache::keys::heading_collides_with_header_key(heading) {
        return Err(DomainError::validation(
            "this heading name is reserved, pick another",
        ));
    }
    Ok(())
}
