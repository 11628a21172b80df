//! HTTP surface of the media service.

use crate::service::{MediaService, Upload};
use agora_core::model::Media;
use agora_web::{
    ApiResponse, AppError, AuthenticatedUser, Query, WebResult, correlation_id_layer,
    server::health_routes,
};
use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;

/// Multipart framing allowed on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the media router.
///
/// When `files_root` is set the blobs under it are served at `/files`.
pub fn router(service: Arc<MediaService>, files_root: Option<PathBuf>) -> Router {
    let body_limit = service.max_bytes().saturating_add(MULTIPART_OVERHEAD);

    let mut router = Router::new()
        .route(
            "/api/media/upload",
            post(upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/media/get-media", get(get_media))
        .with_state(service)
        .merge(health_routes("media-service"));

    if let Some(root) = files_root {
        router = router.nest_service("/files", ServeDir::new(root));
    }
    router.layer(correlation_id_layer())
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::payload_too_large("File too large")
    } else {
        AppError::bad_request(err.body_text())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadBody {
    media_id: String,
    url: String,
}

async fn upload(
    State(service): State<Arc<MediaService>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    mut multipart: Multipart,
) -> WebResult<ApiResponse<UploadBody>> {
    let mut file = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let original_name = field.file_name().unwrap_or("upload").to_string();
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        file = Some(Upload {
            original_name,
            mime_type,
            bytes: bytes.to_vec(),
        });
        break;
    }

    let upload = file.ok_or_else(|| AppError::bad_request("No file uploaded"))?;
    let media = service.upload(&user_id, upload).await?;
    Ok(ApiResponse::created(UploadBody {
        media_id: media.id,
        url: media.url,
    })
    .with_message("Media uploaded successfully"))
}

#[derive(Deserialize)]
struct IdsQuery {
    ids: Option<String>,
}

#[derive(Serialize)]
struct MediaBody {
    results: Vec<Media>,
}

async fn get_media(
    State(service): State<Arc<MediaService>>,
    Query(query): Query<IdsQuery>,
) -> WebResult<ApiResponse<MediaBody>> {
    let ids: Option<Vec<String>> = query
        .ids
        .map(|ids| ids.split(',').map(ToString::to_string).collect());
    let results = service.find(ids.as_deref()).await?;
    Ok(ApiResponse::ok(MediaBody { results }))
}
