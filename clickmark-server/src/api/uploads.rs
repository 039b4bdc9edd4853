//! Stimulus upload

use std::path::{Path, PathBuf};

use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::session::SessionContext;
use crate::AppState;

/// Multipart field carrying the files
pub const FILES_FIELD: &str = "files[]";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub files: Vec<String>,
}

/// Reject names that would leave the upload folder
///
/// Same-named uploads overwrite each other; only path-like names are refused.
pub fn validate_file_name(name: &str) -> AppResult<&str> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        return Err(AppError::InvalidInput(format!("invalid file name '{}'", name)));
    }
    Ok(name)
}

/// Stream one part into a hidden staging file next to its final location
async fn stage_part(
    upload_dir: &Path,
    field: &mut Field<'_>,
    staged: &mut Vec<(PathBuf, String)>,
    file_name: String,
) -> AppResult<()> {
    let staging = upload_dir.join(format!(".upload-{}", Uuid::new_v4()));
    let mut file = File::create(&staging).await?;
    staged.push((staging, file_name));

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::InvalidInput(e.to_string()))?
    {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

/// Read every `files[]` part into staging files
async fn stage_upload(
    upload_dir: &Path,
    multipart: &mut Multipart,
    staged: &mut Vec<(PathBuf, String)>,
) -> AppResult<()> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(e.to_string()))?
    {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }
        let file_name = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => continue,
        };
        if let Err(e) = validate_file_name(&file_name) {
            warn!("Rejected upload: {}", e);
            return Err(e);
        }

        stage_part(upload_dir, &mut field, staged, file_name).await?;
    }
    Ok(())
}

async fn discard(staged: &[(PathBuf, String)]) {
    for (staging, _) in staged {
        if let Err(e) = tokio::fs::remove_file(staging).await {
            warn!("Failed to remove staging file {}: {}", staging.display(), e);
        }
    }
}

/// POST /upload
///
/// Every `files[]` part is staged first; only when the whole request has been
/// read are the files moved to their client file names, in request order.
/// Any rejected part leaves the upload folder untouched.
pub async fn upload_files(
    State(state): State<AppState>,
    ctx: SessionContext,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    if !ctx.is_authenticated() {
        return Err(AppError::SessionExpired);
    }

    let mut staged = Vec::new();
    if let Err(e) = stage_upload(&state.upload_dir, &mut multipart, &mut staged).await {
        discard(&staged).await;
        return Err(e);
    }
    if staged.is_empty() {
        return Err(AppError::NoFiles);
    }

    let mut saved = Vec::with_capacity(staged.len());
    for (i, (staging, file_name)) in staged.iter().enumerate() {
        if let Err(e) = tokio::fs::rename(staging, state.upload_dir.join(file_name)).await {
            discard(&staged[i..]).await;
            return Err(e.into());
        }
        saved.push(file_name.clone());
    }

    info!("Uploaded {} file(s) to {}", saved.len(), state.upload_dir.display());

    Ok(Json(UploadResponse {
        message: "Files uploaded successfully".to_string(),
        files: saved,
    }))
}
