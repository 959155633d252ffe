use async_trait::async_trait;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{NewUser, RepoError, UsersRepo};
use crate::domain::entities::UserRecord;
use crate::domain::types::UserCode;

use super::PostgresRepositories;
use super::util::{escape_like, map_sqlx_error};

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    code: String,
    email: String,
    allow_promotional: bool,
    registered: bool,
    created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = RepoError;

    fn try_from(row: UserRow) -> Result<Self, RepoError> {
        Ok(Self {
            id: row.id,
            code: parse_stored_code(&row.code)?,
            email: row.email,
            allow_promotional: row.allow_promotional,
            registered: row.registered,
            created_at: row.created_at,
        })
    }
}

/// Codes are validated before insert, so a bad stored code means the table
/// was tampered with outside the application.
pub(super) fn parse_stored_code(raw: &str) -> Result<UserCode, RepoError> {
    UserCode::new(raw)
        .map_err(|err| RepoError::from_persistence(format!("stored user code invalid: {err}")))
}

const USER_COLUMNS: &str = "id, code, email, allow_promotional, registered, created_at";

#[async_trait]
impl UsersRepo for PostgresRepositories {
    async fn code_exists(&self, code: &UserCode) -> Result<bool, RepoError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE code = $1)")
            .bind(code.as_str())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn find_by_code(&self, code: &UserCode) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE code = $1"
        ))
        .bind(code.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(UserRecord::try_from).transpose()
    }

    async fn insert(&self, user: NewUser) -> Result<UserRecord, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (code, email, allow_promotional, registered) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user.code.as_str())
        .bind(&user.email)
        .bind(user.allow_promotional)
        .bind(user.registered)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.try_into()
    }

    async fn register(
        &self,
        code: &UserCode,
        email: &str,
        allow_promotional: bool,
    ) -> Result<UserRecord, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users \
             SET email = $2, allow_promotional = $3, registered = TRUE \
             WHERE code = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(code.as_str())
        .bind(email)
        .bind(allow_promotional)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        row.try_into()
    }

    async fn delete_unregistered_by_email(
        &self,
        email: &str,
        keep: &UserCode,
    ) -> Result<Vec<UserCode>, RepoError> {
        // The signup email lands inside a LIKE pattern; wildcards in it must
        // match literally, never widen the delete.
        let codes = sqlx::query_scalar::<_, String>(
            "DELETE FROM users \
             WHERE registered = FALSE \
               AND email LIKE '%' || $1 || '%' ESCAPE '\\' \
               AND code <> $2 \
             RETURNING code",
        )
        .bind(escape_like(email))
        .bind(keep.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        codes
            .iter()
            .map(|code| parse_stored_code(code))
            .collect()
    }
}
