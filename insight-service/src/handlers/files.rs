use crate::dtos::{AnalysisResponse, FileResponse, MessageResponse};
use crate::error::InsightError;
use crate::middleware::CurrentUser;
use crate::services::UploadedFile;
use crate::startup::AppState;
use axum::{
    extract::{multipart::Field, Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

const FILE_FIELD: &str = "file";

/// Reads a field chunk by chunk, failing as soon as `max_bytes` is crossed.
async fn read_limited(mut field: Field<'_>, max_bytes: usize) -> Result<Vec<u8>, InsightError> {
    let mut data = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| InsightError::BadRequest(format!("Failed to read upload: {}", e)))?
    {
        if data.len() + chunk.len() > max_bytes {
            return Err(InsightError::PayloadTooLarge(format!(
                "File exceeds the {} byte limit",
                max_bytes
            )));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

pub async fn upload_file(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let max_bytes = state.config.upload.max_bytes;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| InsightError::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let original_name = field.file_name().unwrap_or("upload.csv").to_string();
        let data = read_limited(field, max_bytes).await?;
        upload = Some(UploadedFile {
            original_name,
            data,
        });
        break;
    }

    let upload = upload
        .filter(|u| !u.data.is_empty())
        .ok_or_else(|| InsightError::BadRequest("No file uploaded".to_string()))?;

    let record = state.files.upload(&ctx.user, upload).await?;
    Ok((StatusCode::CREATED, Json(FileResponse::from(record))))
}

pub async fn list_files(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let files: Vec<FileResponse> = state
        .files
        .list(&ctx.user.id)
        .await?
        .into_iter()
        .map(FileResponse::from)
        .collect();
    Ok(Json(files))
}

pub async fn file_content(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let content = state.files.content(&ctx.user.id, &file_id).await?;
    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], content))
}

pub async fn analyze_file(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let results = state.analysis.analyze(&ctx.user.id, &file_id).await?;
    Ok(Json(AnalysisResponse::new(file_id, results)))
}

pub async fn delete_file(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.files.delete(&ctx.user.id, &file_id).await?;
    Ok(Json(MessageResponse::new("File deleted successfully")))
}
