//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::{ImageRecord, ItemSetRecord, UserRecord};
use crate::domain::types::{RgbaColor, UserCode};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub code: UserCode,
    pub email: String,
    pub allow_promotional: bool,
    pub registered: bool,
}

#[derive(Debug, Clone)]
pub struct NewItemSet {
    pub user_code: UserCode,
    pub heading: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateItemSetParams {
    pub id: Uuid,
    pub heading: String,
    pub position_x: i32,
    pub position_y: i32,
    pub font_name: String,
    pub font_size: i32,
    pub color: RgbaColor,
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn code_exists(&self, code: &UserCode) -> Result<bool, RepoError>;

    async fn find_by_code(&self, code: &UserCode) -> Result<Option<UserRecord>, RepoError>;

    async fn insert(&self, user: NewUser) -> Result<UserRecord, RepoError>;

    /// Promote a placeholder account to a registered one.
    async fn register(
        &self,
        code: &UserCode,
        email: &str,
        allow_promotional: bool,
    ) -> Result<UserRecord, RepoError>;

    /// Remove unregistered placeholder accounts carrying this email,
    /// except the one being promoted, and return their codes so dependent
    /// data can be purged.
    async fn delete_unregistered_by_email(
        &self,
        email: &str,
        keep: &UserCode,
    ) -> Result<Vec<UserCode>, RepoError>;
}

#[async_trait]
pub trait ItemSetsRepo: Send + Sync {
    /// All headings for a user, in creation order.
    async fn list_headings(&self, user_code: &UserCode) -> Result<Vec<String>, RepoError>;

    async fn find(
        &self,
        user_code: &UserCode,
        heading: &str,
    ) -> Result<Option<ItemSetRecord>, RepoError>;

    async fn list_for_user(&self, user_code: &UserCode) -> Result<Vec<ItemSetRecord>, RepoError>;

    async fn insert(&self, item_set: NewItemSet) -> Result<ItemSetRecord, RepoError>;

    /// Insert a whole batch atomically. Either every column lands or none.
    async fn insert_many(&self, item_sets: Vec<NewItemSet>) -> Result<(), RepoError>;

    /// Rename plus styling update as one atomic write against the store.
    async fn update(
        &self,
        user_code: &UserCode,
        params: UpdateItemSetParams,
    ) -> Result<ItemSetRecord, RepoError>;

    async fn replace_items(
        &self,
        user_code: &UserCode,
        heading: &str,
        items: Vec<String>,
    ) -> Result<(), RepoError>;

    async fn delete(&self, user_code: &UserCode, heading: &str) -> Result<(), RepoError>;

    async fn delete_for_user(&self, user_code: &UserCode) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait ImagesRepo: Send + Sync {
    async fn find_for_user(&self, user_code: &UserCode) -> Result<Option<ImageRecord>, RepoError>;

    /// Create or replace the user's single image record.
    async fn replace(
        &self,
        user_code: &UserCode,
        file_name: &str,
        image_url: &str,
    ) -> Result<ImageRecord, RepoError>;

    async fn set_preview_url(&self, user_code: &UserCode, url: &str) -> Result<(), RepoError>;

    /// Record one export run producing `rendered` files.
    async fn record_export(&self, user_code: &UserCode, rendered: i32) -> Result<(), RepoError>;
}
