use async_trait::async_trait;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    ItemSetsRepo, NewItemSet, RepoError, UpdateItemSetParams,
};
use crate::domain::entities::ItemSetRecord;
use crate::domain::types::UserCode;

use super::PostgresRepositories;
use super::users::parse_stored_code;
use super::util::map_sqlx_error;

#[derive(FromRow)]
struct ItemSetRow {
    id: Uuid,
    user_code: String,
    heading: String,
    items: Vec<String>,
    position_x: i32,
    position_y: i32,
    font_name: String,
    font_size: i32,
    color: String,
    created_at: OffsetDateTime,
}

impl TryFrom<ItemSetRow> for ItemSetRecord {
    type Error = RepoError;

    fn try_from(row: ItemSetRow) -> Result<Self, RepoError> {
        let color = row.color.parse().map_err(|err| {
            RepoError::from_persistence(format!("stored color invalid: {err}"))
        })?;
        Ok(Self {
            id: row.id,
            user_code: parse_stored_code(&row.user_code)?,
            heading: row.heading,
            items: row.items,
            position_x: row.position_x,
            position_y: row.position_y,
            font_name: row.font_name,
            font_size: row.font_size,
            color,
            created_at: row.created_at,
        })
    }
}

const ITEM_SET_COLUMNS: &str = "id, user_code, heading, items, position_x, position_y, \
     font_name, font_size, color, created_at";

#[async_trait]
impl ItemSetsRepo for PostgresRepositories {
    async fn list_headings(&self, user_code: &UserCode) -> Result<Vec<String>, RepoError> {
        sqlx::query_scalar::<_, String>(
            "SELECT heading FROM item_sets WHERE user_code = $1 ORDER BY created_at, heading",
        )
        .bind(user_code.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn find(
        &self,
        user_code: &UserCode,
        heading: &str,
    ) -> Result<Option<ItemSetRecord>, RepoError> {
        let row = sqlx::query_as::<_, ItemSetRow>(&format!(
            "SELECT {ITEM_SET_COLUMNS} FROM item_sets WHERE user_code = $1 AND heading = $2"
        ))
        .bind(user_code.as_str())
        .bind(heading)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(ItemSetRecord::try_from).transpose()
    }

    async fn list_for_user(&self, user_code: &UserCode) -> Result<Vec<ItemSetRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ItemSetRow>(&format!(
            "SELECT {ITEM_SET_COLUMNS} FROM item_sets \
             WHERE user_code = $1 ORDER BY created_at, heading"
        ))
        .bind(user_code.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ItemSetRecord::try_from).collect()
    }

    async fn insert(&self, item_set: NewItemSet) -> Result<ItemSetRecord, RepoError> {
        let row = sqlx::query_as::<_, ItemSetRow>(&format!(
            "INSERT INTO item_sets (user_code, heading, items) \
             VALUES ($1, $2, $3) \
             RETURNING {ITEM_SET_COLUMNS}"
        ))
        .bind(item_set.user_code.as_str())
        .bind(&item_set.heading)
        .bind(&item_set.items)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.try_into()
    }

    async fn insert_many(&self, item_sets: Vec<NewItemSet>) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        for item_set in &item_sets {
            sqlx::query("INSERT INTO item_sets (user_code, heading, items) VALUES ($1, $2, $3)")
                .bind(item_set.user_code.as_str())
                .bind(&item_set.heading)
                .bind(&item_set.items)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn update(
        &self,
        user_code: &UserCode,
        params: UpdateItemSetParams,
    ) -> Result<ItemSetRecord, RepoError> {
        let row = sqlx::query_as::<_, ItemSetRow>(&format!(
            "UPDATE item_sets \
             SET heading = $3, position_x = $4, position_y = $5, \
                 font_name = $6, font_size = $7, color = $8 \
             WHERE user_code = $1 AND id = $2 \
             RETURNING {ITEM_SET_COLUMNS}"
        ))
        .bind(user_code.as_str())
        .bind(params.id)
        .bind(&params.heading)
        .bind(params.position_x)
        .bind(params.position_y)
        .bind(&params.font_name)
        .bind(params.font_size)
        .bind(params.color.to_string())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        row.try_into()
    }

    async fn replace_items(
        &self,
        user_code: &UserCode,
        heading: &str,
        items: Vec<String>,
    ) -> Result<(), RepoError> {
        let result =
            sqlx::query("UPDATE item_sets SET items = $3 WHERE user_code = $1 AND heading = $2")
                .bind(user_code.as_str())
                .bind(heading)
                .bind(&items)
                .execute(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, user_code: &UserCode, heading: &str) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM item_sets WHERE user_code = $1 AND heading = $2")
            .bind(user_code.as_str())
            .bind(heading)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn delete_for_user(&self, user_code: &UserCode) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM item_sets WHERE user_code = $1")
            .bind(user_code.as_str())
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
