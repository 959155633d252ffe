//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{RgbaColor, UserCode};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub code: UserCode,
    pub email: String,
    pub allow_promotional: bool,
    /// False while the account is an anonymous placeholder.
    pub registered: bool,
    pub created_at: OffsetDateTime,
}

/// One named, ordered list of short text values with its overlay styling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemSetRecord {
    pub id: Uuid,
    pub user_code: UserCode,
    pub heading: String,
    pub items: Vec<String>,
    pub position_x: i32,
    pub position_y: i32,
    pub font_name: String,
    pub font_size: i32,
    pub color: RgbaColor,
    pub created_at: OffsetDateTime,
}

/// The single background image owned by a user, plus derived preview state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRecord {
    pub id: Uuid,
    pub user_code: UserCode,
    pub file_name: String,
    pub image_url: String,
    pub preview_url: Option<String>,
    /// Renditions produced by the most recent export.
    pub export_image_count: i32,
    /// Total number of export runs.
    pub exports: i32,
    pub created_at: OffsetDateTime,
}
