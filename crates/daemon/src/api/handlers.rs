// Route handlers. Each one parses the request, runs a coordinator on the
// blocking pool, and maps its outcome onto the wire types.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use gitseal_common::notebook::Notebook;
use gitseal_common::protocol::api::{
    CommitRequest, CommitResponse, ErrorCode, LockRequest, LockResponse, RemoveSignatureRequest,
    RemoveSignatureResponse, RepositoryStatusRequest, RepositoryStatusResponse, StatusRequest,
    StatusResponse, UnlockRequest, UnlockResponse, UserInfoQuery, UserInfoResponse,
};
use serde_json::Value;
use tracing::error;

use crate::api::error::ApiError;
use crate::api::validation::ValidatedJson;
use crate::command::CommandExecutor;
use crate::seal::{SealError, SealService};

pub struct AppState<E> {
    pub seal: Arc<SealService<E>>,
}

impl<E> Clone for AppState<E> {
    fn clone(&self) -> Self {
        Self { seal: Arc::clone(&self.seal) }
    }
}

pub async fn lock_notebook<E: CommandExecutor + 'static>(
    State(state): State<AppState<E>>,
    ValidatedJson(request): ValidatedJson<LockRequest>,
) -> Result<Json<LockResponse>, ApiError> {
    let path = notebook_path(&request.path)?;
    let document = parse_document(request.document)?;
    let message = request.commit_message;
    let outcome = run_blocking(&state, move |seal| seal.lock(&path, &document, &message)).await?;
    Ok(Json(LockResponse {
        success: true,
        message: outcome.message,
        metadata: outcome.metadata,
        commit_hash: outcome.commit_hash,
        signed: outcome.signed,
        warnings: outcome.warnings,
    }))
}

pub async fn unlock_notebook<E: CommandExecutor + 'static>(
    State(state): State<AppState<E>>,
    ValidatedJson(request): ValidatedJson<UnlockRequest>,
) -> Result<Json<UnlockResponse>, ApiError> {
    let path = notebook_path(&request.path)?;
    let document = parse_document(request.document)?;
    let outcome = run_blocking(&state, move |seal| seal.unlock(&path, &document)).await?;
    Ok(Json(UnlockResponse {
        success: true,
        message: outcome.message,
        signature_verification_passed: outcome.signature_verification_passed,
        was_gpg_signed: outcome.was_gpg_signed,
        commit_hash: outcome.commit_hash,
        metadata: outcome.metadata,
        warnings: outcome.warnings,
    }))
}

pub async fn notebook_status<E: CommandExecutor + 'static>(
    State(state): State<AppState<E>>,
    ValidatedJson(request): ValidatedJson<StatusRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let path = match request.path.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(PathBuf::from(raw)),
        _ => None,
    };
    let document = parse_document(request.document)?;
    let report = run_blocking(&state, move |seal| seal.status(&document, path.as_deref())).await?;
    Ok(Json(StatusResponse {
        success: true,
        locked: report.locked,
        signature_valid: report.signature_valid,
        message: report.message,
        metadata: report.metadata,
    }))
}

pub async fn commit_notebook<E: CommandExecutor + 'static>(
    State(state): State<AppState<E>>,
    ValidatedJson(request): ValidatedJson<CommitRequest>,
) -> Result<Json<CommitResponse>, ApiError> {
    let path = notebook_path(&request.path)?;
    let document = parse_document(request.document)?;
    let message = request.commit_message;
    let report = run_blocking(&state, move |seal| seal.commit(&path, &document, &message)).await?;
    Ok(Json(CommitResponse {
        success: true,
        message: report.message,
        commit_hash: report.commit_hash,
        signed: report.signed,
        metadata: report.metadata,
        warnings: report.warnings,
    }))
}

pub async fn remove_signature<E: CommandExecutor + 'static>(
    State(state): State<AppState<E>>,
    ValidatedJson(request): ValidatedJson<RemoveSignatureRequest>,
) -> Result<Json<RemoveSignatureResponse>, ApiError> {
    let path = notebook_path(&request.path)?;
    let document = parse_document(request.document)?;
    let removal = run_blocking(&state, move |seal| seal.remove_signature(&path, &document)).await?;
    Ok(Json(RemoveSignatureResponse {
        success: true,
        message: removal.message,
        document: removal.document.into_value(),
    }))
}

pub async fn repository_status<E: CommandExecutor + 'static>(
    State(state): State<AppState<E>>,
    ValidatedJson(request): ValidatedJson<RepositoryStatusRequest>,
) -> Result<Json<RepositoryStatusResponse>, ApiError> {
    let path = notebook_path(&request.path)?;
    let status = run_blocking(&state, move |seal| seal.repository_status(&path)).await?;
    Ok(Json(RepositoryStatusResponse { success: true, repository_status: status }))
}

pub async fn user_info<E: CommandExecutor + 'static>(
    State(state): State<AppState<E>>,
    Query(query): Query<UserInfoQuery>,
) -> Result<Json<UserInfoResponse>, ApiError> {
    let identity = run_blocking(&state, move |seal| seal.current_identity(query.refresh)).await?;
    Ok(Json(match identity {
        Some(identity) => UserInfoResponse { success: true, user_info: Some(identity), message: None },
        None => UserInfoResponse {
            success: false,
            user_info: None,
            message: Some("Git user configuration not found".to_string()),
        },
    }))
}

// ── Helpers ────────────────────────────────────────────────────────

fn notebook_path(raw: &str) -> Result<PathBuf, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("path must not be empty"));
    }
    Ok(PathBuf::from(trimmed))
}

fn parse_document(value: Value) -> Result<Notebook, ApiError> {
    Notebook::from_value(value)
        .map_err(|error| ApiError::validation(format!("invalid notebook document: {error}")))
}

/// Coordinators shell out to git and gpg, so they run off the async workers.
async fn run_blocking<E, T, F>(state: &AppState<E>, flow: F) -> Result<T, ApiError>
where
    E: CommandExecutor + 'static,
    T: Send + 'static,
    F: FnOnce(&SealService<E>) -> Result<T, SealError> + Send + 'static,
{
    let seal = Arc::clone(&state.seal);
    tokio::task::spawn_blocking(move || flow(&seal))
        .await
        .map_err(|join_error| {
            error!(error = %join_error, "coordinator task did not complete");
            ApiError::from_code(ErrorCode::InternalError)
        })?
        .map_err(ApiError::from)
}
