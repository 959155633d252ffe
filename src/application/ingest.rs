//! Column ingestion: bulk-loading item sets from an external tabular
//! source. Parsing the source format is the caller's problem; this
//! boundary takes already-extracted ordered columns.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;

use crate::application::context::UserContext;
use crate::application::repos::{ItemSetsRepo, NewItemSet, RepoError};
use crate::cache::{CacheSyncEngine, RefreshTarget, SyncError};
use crate::domain::error::DomainError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// One column of the source: a heading and its ordered values.
#[derive(Debug, Clone)]
pub struct Column {
    pub heading: String,
    pub items: Vec<String>,
}

pub struct IngestService {
    item_sets: Arc<dyn ItemSetsRepo>,
    engine: Arc<CacheSyncEngine>,
}

impl IngestService {
    pub fn new(item_sets: Arc<dyn ItemSetsRepo>, engine: Arc<CacheSyncEngine>) -> Self {
        Self { item_sets, engine }
    }

    /// Store every column as a new item set, all or nothing.
    ///
    /// Headings are normalized first (leading capital, remainder lowered,
    /// spaces to underscores). A batch that repeats a normalized heading is
    /// rejected outright; a heading already stored for the user is a
    /// conflict carrying both the stored and the incoming items. Afterwards
    /// the user's whole cache view is rebuilt.
    pub async fn ingest(&self, cx: &UserContext, columns: Vec<Column>) -> Result<(), IngestError> {
        let mut seen = HashSet::new();
        let mut batch = Vec::with_capacity(columns.len());
        for column in columns {
            let heading = normalize_heading(&column.heading);
            if !seen.insert(heading.clone()) {
                return Err(DomainError::validation(format!(
                    "column heading `{heading}` appears more than once in the batch"
                ))
                .into());
            }
            if let Some(existing) = self.item_sets.find(cx.user_code(), &heading).await? {
                return Err(DomainError::HeadingConflict {
                    heading,
                    existing_items: existing.items,
                    incoming_items: column.items,
                }
                .into());
            }
            batch.push(NewItemSet {
                user_code: cx.user_code().clone(),
                heading,
                items: column.items,
            });
        }

        let count = batch.len();
        self.item_sets.insert_many(batch).await?;

        self.engine.refresh_headers(cx).await?;
        self.engine.refresh_items(cx, RefreshTarget::All).await?;

        info!(user_code = %cx.user_code(), columns = count, "column batch ingested");
        Ok(())
    }
}

/// Match the heading shape users see elsewhere: `first name` → `First_name`.
fn normalize_heading(raw: &str) -> String {
    let mut chars = raw.trim().chars();
    let capitalized: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    };
    capitalized.replace(' ', "_")
}
