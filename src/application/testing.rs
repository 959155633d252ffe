//! Hand-rolled in-memory repository fakes shared by unit tests.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::media::{MediaError, MediaFolder, MediaStore, StoredAsset};
use crate::application::repos::{
    ImagesRepo, ItemSetsRepo, NewItemSet, NewUser, RepoError, UpdateItemSetParams, UsersRepo,
};
use crate::domain::entities::{ImageRecord, ItemSetRecord, UserRecord};
use crate::domain::types::UserCode;

fn default_item_set(user_code: UserCode, heading: String, items: Vec<String>) -> ItemSetRecord {
    ItemSetRecord {
        id: Uuid::new_v4(),
        user_code,
        heading,
        items,
        position_x: 0,
        position_y: 0,
        font_name: "arial".to_string(),
        font_size: 12,
        color: "#aa33ffff".parse().expect("default color"),
        created_at: OffsetDateTime::now_utc(),
    }
}

#[derive(Default)]
pub(crate) struct FakeItemSets {
    rows: RwLock<Vec<ItemSetRecord>>,
}

impl FakeItemSets {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a row, preserving insertion order on replace.
    pub(crate) fn seed(&self, code: &str, heading: &str, items: Vec<String>) {
        let code = UserCode::new(code).expect("valid test code");
        let mut rows = self.rows.write().expect("fake lock");
        if let Some(row) = rows
            .iter_mut()
            .find(|row| row.user_code == code && row.heading == heading)
        {
            row.items = items;
        } else {
            rows.push(default_item_set(code, heading.to_string(), items));
        }
    }

    pub(crate) fn snapshot(&self, code: &str, heading: &str) -> Option<ItemSetRecord> {
        let code = UserCode::new(code).expect("valid test code");
        self.rows
            .read()
            .expect("fake lock")
            .iter()
            .find(|row| row.user_code == code && row.heading == heading)
            .cloned()
    }
}

#[async_trait]
impl ItemSetsRepo for FakeItemSets {
    async fn list_headings(&self, user_code: &UserCode) -> Result<Vec<String>, RepoError> {
        Ok(self
            .rows
            .read()
            .expect("fake lock")
            .iter()
            .filter(|row| &row.user_code == user_code)
            .map(|row| row.heading.clone())
            .collect())
    }

    async fn find(
        &self,
        user_code: &UserCode,
        heading: &str,
    ) -> Result<Option<ItemSetRecord>, RepoError> {
        Ok(self
            .rows
            .read()
            .expect("fake lock")
            .iter()
            .find(|row| &row.user_code == user_code && row.heading == heading)
            .cloned())
    }

    async fn list_for_user(&self, user_code: &UserCode) -> Result<Vec<ItemSetRecord>, RepoError> {
        Ok(self
            .rows
            .read()
            .expect("fake lock")
            .iter()
            .filter(|row| &row.user_code == user_code)
            .cloned()
            .collect())
    }

    async fn insert(&self, item_set: NewItemSet) -> Result<ItemSetRecord, RepoError> {
        let mut rows = self.rows.write().expect("fake lock");
        if rows
            .iter()
            .any(|row| row.user_code == item_set.user_code && row.heading == item_set.heading)
        {
            return Err(RepoError::Duplicate {
                constraint: "item_sets_user_code_heading_key".to_string(),
            });
        }
        let record = default_item_set(item_set.user_code, item_set.heading, item_set.items);
        rows.push(record.clone());
        Ok(record)
    }

    async fn insert_many(&self, item_sets: Vec<NewItemSet>) -> Result<(), RepoError> {
        // Atomic like the transactional Postgres impl: validate everything
        // before mutating.
        {
            let rows = self.rows.read().expect("fake lock");
            for item_set in &item_sets {
                if rows
                    .iter()
                    .any(|row| row.user_code == item_set.user_code && row.heading == item_set.heading)
                {
                    return Err(RepoError::Duplicate {
                        constraint: "item_sets_user_code_heading_key".to_string(),
                    });
                }
            }
        }
        let mut rows = self.rows.write().expect("fake lock");
        for item_set in item_sets {
            rows.push(default_item_set(
                item_set.user_code,
                item_set.heading,
                item_set.items,
            ));
        }
        Ok(())
    }

    async fn update(
        &self,
        user_code: &UserCode,
        params: UpdateItemSetParams,
    ) -> Result<ItemSetRecord, RepoError> {
        let mut rows = self.rows.write().expect("fake lock");
        if rows.iter().any(|row| {
            &row.user_code == user_code && row.heading == params.heading && row.id != params.id
        }) {
            return Err(RepoError::Duplicate {
                constraint: "item_sets_user_code_heading_key".to_string(),
            });
        }
        let row = rows
            .iter_mut()
            .find(|row| &row.user_code == user_code && row.id == params.id)
            .ok_or(RepoError::NotFound)?;
        row.heading = params.heading;
        row.position_x = params.position_x;
        row.position_y = params.position_y;
        row.font_name = params.font_name;
        row.font_size = params.font_size;
        row.color = params.color;
        Ok(row.clone())
    }

    async fn replace_items(
        &self,
        user_code: &UserCode,
        heading: &str,
        items: Vec<String>,
    ) -> Result<(), RepoError> {
        let mut rows = self.rows.write().expect("fake lock");
        let row = rows
            .iter_mut()
            .find(|row| &row.user_code == user_code && row.heading == heading)
            .ok_or(RepoError::NotFound)?;
        row.items = items;
        Ok(())
    }

    async fn delete(&self, user_code: &UserCode, heading: &str) -> Result<(), RepoError> {
        let mut rows = self.rows.write().expect("fake lock");
        let before = rows.len();
        rows.retain(|row| !(&row.user_code == user_code && row.heading == heading));
        if rows.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn delete_for_user(&self, user_code: &UserCode) -> Result<u64, RepoError> {
        let mut rows = self.rows.write().expect("fake lock");
        let before = rows.len();
        rows.retain(|row| &row.user_code != user_code);
        Ok((before - rows.len()) as u64)
    }
}

#[derive(Default)]
pub(crate) struct FakeUsers {
    rows: RwLock<Vec<UserRecord>>,
}

impl FakeUsers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn seed(&self, code: &str, email: &str, registered: bool) {
        self.rows.write().expect("fake lock").push(UserRecord {
            id: Uuid::new_v4(),
            code: UserCode::new(code).expect("valid test code"),
            email: email.to_string(),
            allow_promotional: false,
            registered,
            created_at: OffsetDateTime::now_utc(),
        });
    }
}

#[async_trait]
impl UsersRepo for FakeUsers {
    async fn code_exists(&self, code: &UserCode) -> Result<bool, RepoError> {
        Ok(self
            .rows
            .read()
            .expect("fake lock")
            .iter()
            .any(|row| &row.code == code))
    }

    async fn find_by_code(&self, code: &UserCode) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .rows
            .read()
            .expect("fake lock")
            .iter()
            .find(|row| &row.code == code)
            .cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<UserRecord, RepoError> {
        let mut rows = self.rows.write().expect("fake lock");
        if rows.iter().any(|row| row.code == user.code) {
            return Err(RepoError::Duplicate {
                constraint: "users_code_key".to_string(),
            });
        }
        let record = UserRecord {
            id: Uuid::new_v4(),
            code: user.code,
            email: user.email,
            allow_promotional: user.allow_promotional,
            registered: user.registered,
            created_at: OffsetDateTime::now_utc(),
        };
        rows.push(record.clone());
        Ok(record)
    }

    async fn register(
        &self,
        code: &UserCode,
        email: &str,
        allow_promotional: bool,
    ) -> Result<UserRecord, RepoError> {
        let mut rows = self.rows.write().expect("fake lock");
        let row = rows
            .iter_mut()
            .find(|row| &row.code == code)
            .ok_or(RepoError::NotFound)?;
        row.email = email.to_string();
        row.allow_promotional = allow_promotional;
        row.registered = true;
        Ok(row.clone())
    }

    async fn delete_unregistered_by_email(
        &self,
        email: &str,
        keep: &UserCode,
    ) -> Result<Vec<UserCode>, RepoError> {
        let mut rows = self.rows.write().expect("fake lock");
        let stale =
            |row: &UserRecord| !row.registered && row.email.contains(email) && &row.code != keep;
        let purged: Vec<UserCode> = rows
            .iter()
            .filter(|row| stale(row))
            .map(|row| row.code.clone())
            .collect();
        rows.retain(|row| !stale(row));
        Ok(purged)
    }
}

#[derive(Default)]
pub(crate) struct FakeImages {
    rows: RwLock<Vec<ImageRecord>>,
}

impl FakeImages {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn seed(&self, code: &str, file_name: &str, image_url: &str) {
        self.rows.write().expect("fake lock").push(ImageRecord {
            id: Uuid::new_v4(),
            user_code: UserCode::new(code).expect("valid test code"),
            file_name: file_name.to_string(),
            image_url: image_url.to_string(),
            preview_url: None,
            export_image_count: 0,
            exports: 0,
            created_at: OffsetDateTime::now_utc(),
        });
    }

    pub(crate) fn snapshot(&self, code: &str) -> Option<ImageRecord> {
        let code = UserCode::new(code).expect("valid test code");
        self.rows
            .read()
            .expect("fake lock")
            .iter()
            .find(|row| row.user_code == code)
            .cloned()
    }
}

#[async_trait]
impl ImagesRepo for FakeImages {
    async fn find_for_user(&self, user_code: &UserCode) -> Result<Option<ImageRecord>, RepoError> {
        Ok(self
            .rows
            .read()
            .expect("fake lock")
            .iter()
            .find(|row| &row.user_code == user_code)
            .cloned())
    }

    async fn replace(
        &self,
        user_code: &UserCode,
        file_name: &str,
        image_url: &str,
    ) -> Result<ImageRecord, RepoError> {
        let mut rows = self.rows.write().expect("fake lock");
        rows.retain(|row| &row.user_code != user_code);
        let record = ImageRecord {
            id: Uuid::new_v4(),
            user_code: user_code.clone(),
            file_name: file_name.to_string(),
            image_url: image_url.to_string(),
            preview_url: None,
            export_image_count: 0,
            exports: 0,
            created_at: OffsetDateTime::now_utc(),
        };
        rows.push(record.clone());
        Ok(record)
    }

    async fn set_preview_url(&self, user_code: &UserCode, url: &str) -> Result<(), RepoError> {
        let mut rows = self.rows.write().expect("fake lock");
        let row = rows
            .iter_mut()
            .find(|row| &row.user_code == user_code)
            .ok_or(RepoError::NotFound)?;
        row.preview_url = Some(url.to_string());
        Ok(())
    }

    async fn record_export(&self, user_code: &UserCode, rendered: i32) -> Result<(), RepoError> {
        let mut rows = self.rows.write().expect("fake lock");
        let row = rows
            .iter_mut()
            .find(|row| &row.user_code == user_code)
            .ok_or(RepoError::NotFound)?;
        row.export_image_count = rendered;
        row.exports += 1;
        Ok(())
    }
}

/// In-memory object store keyed by URL, with folder/tag bookkeeping.
#[derive(Default)]
pub(crate) struct FakeMedia {
    objects: RwLock<HashMap<String, StoredObject>>,
    counter: AtomicU64,
}

struct StoredObject {
    folder: MediaFolder,
    tag: String,
    bytes: Vec<u8>,
}

impl FakeMedia {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make `fetch(url)` return the given bytes without an upload.
    pub(crate) fn seed(&self, url: &str, bytes: Vec<u8>) {
        self.objects.write().expect("fake lock").insert(
            url.to_string(),
            StoredObject {
                folder: MediaFolder::Main,
                tag: String::new(),
                bytes,
            },
        );
    }

    pub(crate) fn urls_in(&self, folder: MediaFolder, tag: &str) -> Vec<String> {
        let mut urls: Vec<String> = self
            .objects
            .read()
            .expect("fake lock")
            .iter()
            .filter(|(_, obj)| obj.folder == folder && obj.tag == tag)
            .map(|(url, _)| url.clone())
            .collect();
        urls.sort();
        urls
    }
}

#[async_trait]
impl MediaStore for FakeMedia {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, MediaError> {
        self.objects
            .read()
            .expect("fake lock")
            .get(url)
            .map(|obj| obj.bytes.clone())
            .ok_or_else(|| MediaError::BadResponse {
                detail: format!("no object at {url}"),
            })
    }

    async fn upload(
        &self,
        folder: MediaFolder,
        file_name: &str,
        bytes: Vec<u8>,
        tag: &str,
    ) -> Result<StoredAsset, MediaError> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let asset_id = format!("asset-{n}");
        let url = format!("https://media.test/{}/{n}/{file_name}", folder.as_str());
        self.objects.write().expect("fake lock").insert(
            url.clone(),
            StoredObject {
                folder,
                tag: tag.to_string(),
                bytes,
            },
        );
        Ok(StoredAsset { asset_id, url })
    }

    async fn delete_by_tag(&self, folder: MediaFolder, tag: &str) -> Result<u64, MediaError> {
        let mut objects = self.objects.write().expect("fake lock");
        let before = objects.len();
        objects.retain(|_, obj| !(obj.folder == folder && obj.tag == tag));
        Ok((before - objects.len()) as u64)
    }
}
