use axum::{
    Extension, Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

use parley_types::api::{Claims, SendFileResponse};
use parley_types::models::{ConversationId, FileInfo, MessageId};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::sniff;
use crate::storage::blob_key;

/// POST /conversations/{id}/files, multipart with a `file` part.
pub async fn upload(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(conversation_id): Path<ConversationId>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let (original_name, data) = loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(&e))?
            .ok_or_else(|| ApiError::bad_request("no file provided"))?;
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or("file").to_string();
        let data = field.bytes().await.map_err(|e| multipart_error(&e))?;
        break (name, data);
    };

    if data.is_empty() {
        return Err(ApiError::bad_request("file is empty"));
    }
    if data.len() > state.max_upload_bytes {
        return Err(ApiError::PayloadTooLarge);
    }

    // Fail before touching storage when the sender cannot post here.
    let sender_id = claims.sub;
    if !state.run(move |db| db.is_member(sender_id, conversation_id)).await? {
        return Err(parley_db::Error::Forbidden.into());
    }

    let (stem, extension) = split_name(&original_name);
    let message_id = state.db.next_id();
    let key = blob_key(message_id, extension);

    state.blobs.put(&key, &data).await.map_err(|e| {
        error!("Failed to store blob {}: {}", key, e);
        ApiError::Internal
    })?;

    let file = FileInfo {
        file_name: stem.to_string(),
        file_url: key,
        file_size: data.len() as u64,
        file_type: sniff::content_type(&data, extension),
    };

    let record = file.clone();
    if let Err(e) = state
        .run(move |db| db.send_file(sender_id, conversation_id, message_id, &record))
        .await
    {
        warn!("Blob {} left without a message", file.file_url);
        return Err(e);
    }

    info!("File message {} ({} bytes) in conversation {}", message_id, file.file_size, conversation_id);

    Ok((
        StatusCode::CREATED,
        Json(SendFileResponse {
            message_id,
            file_name: file.file_name,
            file_size: file.file_size,
            file_type: file.file_type,
        }),
    ))
}

/// GET /messages/{id}/file, streaming the stored bytes.
pub async fn download(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(message_id): Path<MessageId>,
) -> ApiResult<impl IntoResponse> {
    let file = state
        .run(move |db| db.file_for_download(claims.sub, message_id))
        .await?;

    let reader = state.blobs.open(&file.file_url).await.map_err(|e| {
        error!("Blob {} for message {} unreadable: {}", file.file_url, message_id, e);
        ApiError::Store(parley_db::Error::NotFound)
    })?;

    let disposition = content_disposition(&file.file_name, &file.file_url);

    Ok((
        [
            (header::CONTENT_TYPE, file.file_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(reader)),
    ))
}

/// Attachment header for a stored file, named after the upload with the
/// stored extension. Characters a quoted header value cannot carry are dropped.
fn content_disposition(file_name: &str, key: &str) -> String {
    let name = match key.split_once('.') {
        Some((_, ext)) => format!("{}.{}", file_name, ext),
        None => file_name.to_string(),
    };
    let safe: String = name
        .chars()
        .filter(|c| !c.is_ascii_control() && !matches!(c, '"' | '\\'))
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

/// `"report.final.pdf"` -> `("report.final", Some("pdf"))`.
fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}

fn multipart_error(e: &axum::extract::multipart::MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::bad_request(format!("invalid multipart body: {}", e.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::{content_disposition, split_name};

    #[test]
    fn splits_on_last_dot() {
        assert_eq!(split_name("report.final.pdf"), ("report.final", Some("pdf")));
        assert_eq!(split_name("README"), ("README", None));
        assert_eq!(split_name(".bashrc"), (".bashrc", None));
    }

    #[test]
    fn disposition_drops_unsafe_characters() {
        let value = content_disposition("bad\r\n\x07\"name\\", "12.txt");
        assert_eq!(value, "attachment; filename=\"badname.txt\"");
        assert!(HeaderValue::from_str(&value).is_ok());

        assert_eq!(content_disposition("notes", "12"), "attachment; filename=\"notes\"");
        assert_eq!(
            content_disposition("café", "12.pdf"),
            "attachment; filename=\"café.pdf\""
        );
    }
}
