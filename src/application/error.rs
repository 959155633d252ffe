//! The error surface handlers return: every service error funnels into
//! [`AppError`], which knows its HTTP status and a public message, and
//! attaches a full cause chain to the response for the logging middleware.

use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::application::accounts::AccountError;
use crate::application::context::SessionValueMissing;
use crate::application::export::ExportError;
use crate::application::ingest::IngestError;
use crate::application::item_sets::ItemSetError;
use crate::application::media::MediaError;
use crate::application::preview::PreviewError;
use crate::application::repos::RepoError;
use crate::application::render::RenderError;
use crate::cache::SyncError;
use crate::domain::error::DomainError;
use crate::infra::error::InfraError;

/// Internal diagnostics for one failed request, carried on the response so
/// the trace middleware can log the chain without re-deriving it.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Session(#[from] SessionValueMissing),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    ItemSet(#[from] ItemSetError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Preview(#[from] PreviewError),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Session(_) => StatusCode::UNAUTHORIZED,
            AppError::Domain(err)
            | AppError::ItemSet(ItemSetError::Domain(err))
            | AppError::Ingest(IngestError::Domain(err)) => domain_status(err),
            AppError::Repo(err)
            | AppError::ItemSet(ItemSetError::Repo(err))
            | AppError::Ingest(IngestError::Repo(err))
            | AppError::Account(AccountError::Repo(err))
            | AppError::Export(ExportError::Repo(err))
            | AppError::Preview(PreviewError::Repo(err)) => repo_status(err),
            AppError::Sync(err)
            | AppError::ItemSet(ItemSetError::Sync(err))
            | AppError::Ingest(IngestError::Sync(err)) => sync_status(err),
            AppError::Account(AccountError::CodeSpaceExhausted) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Export(ExportError::MissingImage)
            | AppError::Preview(PreviewError::MissingImage) => StatusCode::NOT_FOUND,
            AppError::Export(ExportError::Media(_))
            | AppError::Preview(PreviewError::Media(_))
            | AppError::Media(_) => StatusCode::BAD_GATEWAY,
            AppError::Export(_) | AppError::Preview(PreviewError::Render(_)) | AppError::Render(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Infra(InfraError::Database { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Infra(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn presentation_message(&self) -> &'static str {
        match self.status_code() {
            StatusCode::UNAUTHORIZED => "Session expired, please start over",
            StatusCode::NOT_FOUND => "Resource not found",
            StatusCode::CONFLICT => "That heading already exists and holds data",
            StatusCode::BAD_REQUEST => "Request could not be processed",
            StatusCode::BAD_GATEWAY => "Media storage is unreachable",
            StatusCode::SERVICE_UNAVAILABLE => "Service temporarily unavailable",
            _ => "Unexpected error occurred",
        }
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::Validation { .. } => StatusCode::BAD_REQUEST,
        DomainError::HeadingConflict { .. } => StatusCode::CONFLICT,
        DomainError::Invariant { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn repo_status(err: &RepoError) -> StatusCode {
    match err {
        RepoError::NotFound => StatusCode::NOT_FOUND,
        RepoError::Duplicate { .. } => StatusCode::CONFLICT,
        RepoError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        RepoError::Timeout | RepoError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn sync_status(err: &SyncError) -> StatusCode {
    match err {
        SyncError::HeadingNotFound { .. } => StatusCode::NOT_FOUND,
        SyncError::Repo(inner) => repo_status(inner),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.presentation_message();
        let report = ErrorReport::from_error("application::error::AppError", status, &self);
        let mut response = (status, message).into_response();
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_409_with_both_payloads_in_the_report() {
        let err = AppError::from(DomainError::HeadingConflict {
            heading: "Name".to_string(),
            existing_items: vec!["old".to_string()],
            incoming_items: vec!["new".to_string()],
        });
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn session_loss_is_unauthorized() {
        let err = AppError::from(SessionValueMissing);
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            err.presentation_message(),
            "Session expired, please start over"
        );
    }

    #[test]
    fn report_collects_the_cause_chain() {
        let err = AppError::from(SyncError::Repo(RepoError::Persistence(
            "connection reset".to_string(),
        )));
        let report =
            ErrorReport::from_error("test", err.status_code(), &err);
        assert_eq!(report.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(report.messages.iter().any(|m| m.contains("connection reset")));
    }
}
