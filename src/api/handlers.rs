use axum::extract::multipart::Field;
use axum::extract::{Multipart, Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{debug, info, warn};

use super::{ApiError, ApiState};
use crate::error::VidError;
use crate::framer::FrameRequest;
use crate::storage::FileProperties;

/// Multipart field carrying the uploaded file
const UPLOAD_FIELD: &str = "filename";

#[derive(Debug, Default, Deserialize)]
pub struct FrameQuery {
    pub width: Option<String>,
    pub height: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VideoList {
    pub files: Vec<FileProperties>,
}

/// Parse a non-negative integer parameter; absent or empty means 0
fn parse_param(name: &str, value: Option<&str>) -> Result<u32, ApiError> {
    match value {
        None | Some("") => Ok(0),
        Some(value) => value
            .parse()
            .map_err(|e| ApiError::bad_request(format!("{} parsing error: {}", name, e))),
    }
}

/// GET /video/:filename
pub async fn get_video(
    State(state): State<ApiState>,
    Path(filename): Path<String>,
    request: Request,
) -> Result<Response, ApiError> {
    let path = state.storage.path_for(&filename)?;
    let response = match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    Ok(response.into_response())
}

/// GET /video/:filename/frame/:index?width=&height=
pub async fn get_frame(
    State(state): State<ApiState>,
    Path((filename, index)): Path<(String, String)>,
    Query(query): Query<FrameQuery>,
) -> Result<Response, ApiError> {
    let width = parse_param("width", query.width.as_deref())?;
    let height = parse_param("height", query.height.as_deref())?;

    extract_frame(&state, &filename, &index, width, height, false).await
}

/// GET /video/:filename/frame/:index/thumbnail
pub async fn get_thumbnail(
    State(state): State<ApiState>,
    Path((filename, index)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let (width, height) = (state.config.thumbnail_width, state.config.thumbnail_height);

    extract_frame(&state, &filename, &index, width, height, true).await
}

async fn extract_frame(
    state: &ApiState,
    filename: &str,
    index: &str,
    width: u32,
    height: u32,
    thumbnail: bool,
) -> Result<Response, ApiError> {
    let index: u32 = index
        .parse()
        .map_err(|e| ApiError::bad_request(format!("frame index parsing error: {}", e)))?;
    let path = state.storage.path_for(filename)?;

    // Cancelled on shutdown, or when this future is dropped because the client went away
    let cancel = state.shutdown.child_token();
    let _guard = cancel.clone().drop_guard();

    let request = FrameRequest::new(path, index, width, height, thumbnail);
    let receiver = state.framer.submit(&cancel, request).await;

    let data = match receiver.await {
        Err(_) => return Err(ApiError::internal("context closed")),
        Ok(Err(e)) => return Err(ApiError::internal(format!("ffmpeg error: {}", e))),
        Ok(Ok(data)) => data,
    };

    if data.is_empty() {
        return Err(ApiError::bad_request("frame index out of bounds"));
    }

    debug!("Serving frame {} of {} ({} bytes)", index, filename, data.len());
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], data).into_response())
}

/// GET /videos
pub async fn list_videos(State(state): State<ApiState>) -> Result<Json<VideoList>, ApiError> {
    let storage = Arc::clone(&state.storage);
    let files = tokio::task::spawn_blocking(move || storage.list())
        .await
        .map_err(|e| ApiError::internal(e.to_string()))??;

    Ok(Json(VideoList { files }))
}

/// POST /upload
pub async fn upload_video(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<StatusCode, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Err(ApiError::bad_request("request does not contain a filename")),
        };

        if state.storage.exists(&filename).await? {
            return Err(ApiError::bad_request("file exists"));
        }

        let file = state.storage.create(&filename).await?;
        return match store_field(field, file).await {
            Ok(size) => {
                info!("Uploaded {} ({} bytes)", filename, size);
                Ok(StatusCode::CREATED)
            }
            Err(e) => {
                if let Err(remove_err) = state.storage.remove(&filename).await {
                    warn!("Failed to remove partial upload {}: {}", filename, remove_err);
                }
                Err(e)
            }
        };
    }

    Err(ApiError::bad_request("request does not contain a filename"))
}

/// Copy a multipart field into `file` chunk by chunk
async fn store_field(mut field: Field<'_>, mut file: File) -> Result<u64, ApiError> {
    let mut size = 0u64;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::internal(format!("upload interrupted: {}", e)))?
    {
        file.write_all(&chunk).await.map_err(VidError::from)?;
        size += chunk.len() as u64;
    }
    file.flush().await.map_err(VidError::from)?;
    Ok(size)
}
