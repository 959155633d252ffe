//! Request handlers. Each one resolves the acting user, delegates to an
//! application service, and shapes the response; no business rules here.

use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::application::context::UserContext;
use crate::application::error::AppError;
use crate::application::item_sets::{AppendPosition, ItemSetUpdate};
use crate::application::media::MediaFolder;
use crate::domain::entities::{ItemSetRecord, UserRecord};
use crate::domain::types::{ExportFormat, RgbaColor};

use super::middleware::Identity;
use super::{AppState, db_health_response};

fn require_cx(identity: &Identity) -> Result<UserContext, AppError> {
    Ok(UserContext::require(identity.0.clone())?)
}

fn identity_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((state.cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct BootstrapRequest {
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub code: String,
    pub email: String,
    pub registered: bool,
}

impl From<UserRecord> for AccountResponse {
    fn from(record: UserRecord) -> Self {
        Self {
            code: record.code.to_string(),
            email: record.email,
            registered: record.registered,
        }
    }
}

pub async fn bootstrap_account(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<BootstrapRequest>,
) -> Result<impl IntoResponse, AppError> {
    let record = state
        .accounts
        .bootstrap_anonymous(body.email.as_deref())
        .await?;
    let token = state.identity.seal(&record.code);
    let jar = jar.add(identity_cookie(&state, token));
    Ok((jar, Json(AccountResponse::from(record))))
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    #[serde(default)]
    pub allow_promotional: bool,
}

pub async fn signup(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<SignupRequest>,
) -> Result<Json<AccountResponse>, AppError> {
    let cx = require_cx(&identity)?;
    let record = state
        .accounts
        .signup(&cx, &body.email, body.allow_promotional)
        .await?;
    Ok(Json(AccountResponse::from(record)))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let cx = require_cx(&identity)?;
    state.accounts.logout(&cx);
    let jar = jar.remove(Cookie::from(state.cookie_name.clone()));
    Ok((jar, StatusCode::NO_CONTENT))
}

pub async fn list_headings(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<String>>, AppError> {
    let cx = require_cx(&identity)?;
    let headings = state.engine.refresh_headers(&cx).await.map_err(AppError::from)?;
    Ok(Json(headings))
}

pub async fn create_blank(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ItemSetRecord>, AppError> {
    let cx = require_cx(&identity)?;
    let record = state.item_sets.create_blank(&cx).await?;
    Ok(Json(record))
}

#[derive(Debug, Serialize)]
pub struct WindowResponse {
    pub items: Vec<String>,
    pub full_available: bool,
}

pub async fn heading_window(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(heading): Path<String>,
) -> Result<Json<WindowResponse>, AppError> {
    let cx = require_cx(&identity)?;
    let (items, full_available) = state.item_sets.window(&cx, &heading).await?;
    Ok(Json(WindowResponse {
        items,
        full_available,
    }))
}

pub async fn load_full(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(heading): Path<String>,
) -> Result<Json<Vec<String>>, AppError> {
    let cx = require_cx(&identity)?;
    let items = state.item_sets.load_full(&cx, &heading).await?;
    Ok(Json(items))
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemSetRequest {
    pub heading: String,
    pub position_x: i32,
    pub position_y: i32,
    pub font_name: String,
    pub font_size: i32,
    pub color: RgbaColor,
}

pub async fn update_item_set(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(current_heading): Path<String>,
    Json(body): Json<UpdateItemSetRequest>,
) -> Result<Json<ItemSetRecord>, AppError> {
    let cx = require_cx(&identity)?;
    if !state.fonts.is_available(&body.font_name) {
        return Err(AppError::validation(format!(
            "font `{}` is not available",
            body.font_name
        )));
    }
    let record = state
        .item_sets
        .update(
            &cx,
            &current_heading,
            ItemSetUpdate {
                heading: body.heading,
                position_x: body.position_x,
                position_y: body.position_y,
                font_name: body.font_name,
                font_size: body.font_size,
                color: body.color,
            },
        )
        .await?;
    Ok(Json(record))
}

pub async fn delete_item_set(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(heading): Path<String>,
) -> Result<StatusCode, AppError> {
    let cx = require_cx(&identity)?;
    state.item_sets.delete(&cx, &heading).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct AppendItemsRequest {
    pub items: Vec<String>,
    pub position: String,
}

pub async fn append_items(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(heading): Path<String>,
    Json(body): Json<AppendItemsRequest>,
) -> Result<StatusCode, AppError> {
    let cx = require_cx(&identity)?;
    let position = match body.position.as_str() {
        "top" => AppendPosition::Top,
        "bottom" => AppendPosition::Bottom,
        other => {
            return Err(AppError::validation(format!(
                "position must be `top` or `bottom`, got `{other}`"
            )));
        }
    };
    state
        .item_sets
        .append_items(&cx, &heading, body.items, position)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub columns: Vec<IngestColumn>,
}

#[derive(Debug, Deserialize)]
pub struct IngestColumn {
    pub heading: String,
    pub items: Vec<String>,
}

pub async fn ingest_columns(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<IngestRequest>,
) -> Result<StatusCode, AppError> {
    let cx = require_cx(&identity)?;
    let columns = body
        .columns
        .into_iter()
        .map(|column| crate::application::ingest::Column {
            heading: column.heading,
            items: column.items,
        })
        .collect();
    state.ingest.ingest(&cx, columns).await?;
    Ok(StatusCode::CREATED)
}

pub async fn upload_image(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    mut multipart: Multipart,
) -> Result<Json<crate::domain::entities::ImageRecord>, AppError> {
    let cx = require_cx(&identity)?;
    let code = cx.user_code();

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::validation(format!("malformed multipart body: {err}")))?
    {
        if field.name() == Some("file") {
            let file_name = field
                .file_name()
                .map(str::to_string)
                .ok_or_else(|| AppError::validation("upload is missing a file name"))?;
            let bytes = field
                .bytes()
                .await
                .map_err(|err| AppError::validation(format!("upload stream failed: {err}")))?;
            upload = Some((file_name, bytes.to_vec()));
        }
    }
    let (file_name, bytes) =
        upload.ok_or_else(|| AppError::validation("multipart field `file` is required"))?;

    // The previous background (if any) is superseded in storage first, then
    // in the database. A failed commit rolls the new object back out so
    // storage and database stay consistent.
    state.media.delete_by_tag(MediaFolder::Main, code.as_str()).await?;
    let asset = state
        .media
        .upload(MediaFolder::Main, &file_name, bytes, code.as_str())
        .await?;

    match state.images.replace(code, &file_name, &asset.url).await {
        Ok(record) => Ok(Json(record)),
        Err(err) => {
            if let Err(cleanup) = state
                .media
                .delete_by_tag(MediaFolder::Main, code.as_str())
                .await
            {
                warn!(
                    target = "stampino::http",
                    user_code = %code,
                    error = %cleanup,
                    "compensating delete after failed image commit also failed",
                );
            }
            Err(err.into())
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub preview_url: String,
}

pub async fn refresh_preview(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<PreviewResponse>, AppError> {
    let cx = require_cx(&identity)?;
    let preview_url = state.preview.refresh(&cx).await?;
    Ok(Json(PreviewResponse { preview_url }))
}

pub async fn export_archive(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(format): Path<String>,
) -> Result<Response, AppError> {
    let cx = require_cx(&identity)?;
    let format: ExportFormat = format.parse().map_err(AppError::Domain)?;
    let archive = state.export.export(&cx, format).await?;

    let disposition = format!("attachment; filename=\"{}\"", archive.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        archive.bytes,
    )
        .into_response())
}

pub async fn db_health(State(state): State<AppState>) -> Response {
    db_health_response(state.db.health_check().await)
}
