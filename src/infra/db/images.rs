use async_trait::async_trait;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{ImagesRepo, RepoError};
use crate::domain::entities::ImageRecord;
use crate::domain::types::UserCode;

use super::PostgresRepositories;
use super::users::parse_stored_code;
use super::util::map_sqlx_error;

#[derive(FromRow)]
struct ImageRow {
    id: Uuid,
    user_code: String,
    file_name: String,
    image_url: String,
    preview_url: Option<String>,
    export_image_count: i32,
    exports: i32,
    created_at: OffsetDateTime,
}

impl TryFrom<ImageRow> for ImageRecord {
    type Error = RepoError;

    fn try_from(row: ImageRow) -> Result<Self, RepoError> {
        Ok(Self {
            id: row.id,
            user_code: parse_stored_code(&row.user_code)?,
            file_name: row.file_name,
            image_url: row.image_url,
            preview_url: row.preview_url,
            export_image_count: row.export_image_count,
            exports: row.exports,
            created_at: row.created_at,
        })
    }
}

const IMAGE_COLUMNS: &str =
    "id, user_code, file_name, image_url, preview_url, export_image_count, exports, created_at";

#[async_trait]
impl ImagesRepo for PostgresRepositories {
    async fn find_for_user(&self, user_code: &UserCode) -> Result<Option<ImageRecord>, RepoError> {
        let row = sqlx::query_as::<_, ImageRow>(&format!(
            "SELECT {IMAGE_COLUMNS} FROM images WHERE user_code = $1"
        ))
        .bind(user_code.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(ImageRecord::try_from).transpose()
    }

    async fn replace(
        &self,
        user_code: &UserCode,
        file_name: &str,
        image_url: &str,
    ) -> Result<ImageRecord, RepoError> {
        // One image per user: a new upload supersedes the previous record
        // and starts its counters over.
        let row = sqlx::query_as::<_, ImageRow>(&format!(
            "INSERT INTO images (user_code, file_name, image_url) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (user_code) DO UPDATE \
             SET file_name = EXCLUDED.file_name, \
                 image_url = EXCLUDED.image_url, \
                 preview_url = NULL, \
                 export_image_count = 0, \
                 exports = 0, \
                 created_at = now() \
             RETURNING {IMAGE_COLUMNS}"
        ))
        .bind(user_code.as_str())
        .bind(file_name)
        .bind(image_url)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.try_into()
    }

    async fn set_preview_url(&self, user_code: &UserCode, url: &str) -> Result<(), RepoError> {
        let result = sqlx::query("UPDATE images SET preview_url = $2 WHERE user_code = $1")
            .bind(user_code.as_str())
            .bind(url)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn record_export(&self, user_code: &UserCode, rendered: i32) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE images SET export_image_count = $2, exports = exports + 1 WHERE user_code = $1",
        )
        .bind(user_code.as_str())
        .bind(rendered)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
