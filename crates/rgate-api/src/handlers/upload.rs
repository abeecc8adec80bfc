//! Source upload handler.

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::info;

use rgate_storage::StoredFile;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Form field carrying the file.
pub const UPLOAD_FIELD: &str = "file";

/// `{ok:true, fileId, filePath, publicUrl, filename, size, mimetype}`.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub file: StoredFile,
}

/// Store the first file part of a multipart form in the uploads store.
///
/// `filePath` is the reference to pass as `sourcePath` or inside a plan.
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let mut multipart = multipart?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) && field.file_name().is_none() {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "upload.bin".to_string());
        let mimetype = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let data = field.bytes().await?;
        if data.is_empty() {
            return Err(ApiError::bad_request("Uploaded file is empty"));
        }

        let file = state.uploads.save_bytes(&filename, &mimetype, &data).await?;
        info!(file_id = %file.file_id, size = file.size, "Accepted upload {}", filename);
        metrics::record_upload(file.size);

        return Ok(Json(UploadResponse { ok: true, file }));
    }

    Err(ApiError::bad_request(format!(
        "Multipart body has no '{}' file part",
        UPLOAD_FIELD
    )))
}
