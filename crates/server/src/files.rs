use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use opsgate_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use opsgate_core::ActionRequest;

use crate::auth::require_bearer;
use crate::error::ApiError;
use crate::state::AppState;

const KEY_SUFFIX_LEN: usize = 6;
const KEY_SUFFIX_CHARSET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Build the storage key `org=<org>/owner=<owner>/<purpose>/<millis>-<rand>`.
/// The random suffix guards against two uploads landing in the same
/// millisecond.
pub fn storage_key(org_id: &str, owner_id: &str, purpose: &str, timestamp_millis: i64) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..KEY_SUFFIX_LEN)
        .map(|_| KEY_SUFFIX_CHARSET[rng.gen_range(0..KEY_SUFFIX_CHARSET.len())] as char)
        .collect();
    format!("org={org_id}/owner={owner_id}/{purpose}/{timestamp_millis}-{suffix}")
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub key: String,
    pub size: usize,
}

struct UploadParts {
    file_bytes: Vec<u8>,
    mime: String,
    org_id: String,
    owner_id: String,
    purpose: String,
}

async fn read_multipart(mut multipart: Multipart) -> Result<UploadParts, ApiError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut mime = "application/octet-stream".to_string();
    let mut org_id: Option<String> = None;
    let mut owner_id: Option<String> = None;
    let mut purpose = "intake".to_string();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| ApiError::bad_request(format!("Malformed multipart body: {error}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                if let Some(content_type) = field.content_type() {
                    mime = content_type.to_string();
                }
                let bytes = field.bytes().await.map_err(|error| {
                    ApiError::bad_request(format!("Could not read file part: {error}"))
                })?;
                file_bytes = Some(bytes.to_vec());
            }
            "org_id" => org_id = Some(read_text_field(field).await?),
            "owner_id" => owner_id = Some(read_text_field(field).await?),
            "purpose" => purpose = read_text_field(field).await?,
            _ => {}
        }
    }

    Ok(UploadParts {
        file_bytes: file_bytes.ok_or_else(|| ApiError::bad_request("No file provided"))?,
        mime,
        org_id: org_id.ok_or_else(|| ApiError::bad_request("Missing org_id"))?,
        owner_id: owner_id.ok_or_else(|| ApiError::bad_request("Missing owner_id"))?,
        purpose,
    })
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|error| ApiError::bad_request(format!("Could not read form field: {error}")))
}

/// `POST /files/upload` — stream the file to the object store under a unique
/// key, then record the metadata through the execution forwarder. The store
/// write happens first; a failure between the two leaves an orphaned object
/// for an external sweep, never a metadata record without bytes.
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    require_bearer(&headers)?;
    let correlation_id = Uuid::new_v4().to_string();

    let multipart =
        multipart.map_err(|_| ApiError::bad_request("Expected multipart/form-data"))?;
    let parts = read_multipart(multipart).await?;

    let key = storage_key(
        &parts.org_id,
        &parts.owner_id,
        &parts.purpose,
        chrono::Utc::now().timestamp_millis(),
    );
    let size = parts.file_bytes.len();

    state.store.put(&key, parts.file_bytes, &parts.mime).await?;

    state
        .backend
        .execute(&ActionRequest::new(
            "recordFile",
            json!({
                "org_id": parts.org_id,
                "owner_id": parts.owner_id,
                "purpose": parts.purpose,
                "storage_key": key,
                "size": size,
                "mime": parts.mime,
            }),
        ))
        .await?;

    state.audit.emit(
        AuditEvent::new(
            &correlation_id,
            "files.uploaded",
            AuditCategory::Storage,
            &parts.owner_id,
            AuditOutcome::Success,
        )
        .with_metadata("key", &key)
        .with_metadata("size", size.to_string()),
    );

    Ok(Json(UploadResponse { key, size }))
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub key: Option<String>,
}

/// `GET /files/download?key=` — stream the object back with content headers.
/// Which keys a caller may fetch is the backend's concern; the router only
/// enforces bearer auth here.
pub async fn download(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    require_bearer(&headers)?;

    let key = query
        .key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing key parameter"))?;

    let object = state.store.get(key).await?.ok_or_else(|| ApiError::not_found("File"))?;

    let filename = key.rsplit('/').next().unwrap_or(key);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, object.content_type.as_str())
        .header(header::CONTENT_LENGTH, object.size())
        .header(header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\""))
        .body(object.bytes.into())
        .map_err(|error| {
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Could not build download response: {error}"),
                "response_build_failed",
            )
        })
}

#[cfg(test)]
mod tests {
    use super::storage_key;

    #[test]
    fn key_carries_org_owner_purpose_and_timestamp() {
        let key = storage_key("o1", "u1", "intake", 1_700_000_000_123);
        assert!(key.starts_with("org=o1/owner=u1/intake/1700000000123-"));
        let suffix = key.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit()));
    }

    #[test]
    fn same_millisecond_keys_differ() {
        let first = storage_key("o1", "u1", "intake", 42);
        let second = storage_key("o1", "u1", "intake", 42);
        assert_ne!(first, second);
    }
}
