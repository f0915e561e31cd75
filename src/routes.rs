use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::backend::{NewDocument, ProfileUpdate};
use crate::download::{self, DownloadFormat};
use crate::error::ApiError;
use crate::generation::Attachment;
use crate::state::AppState;

pub fn create_routes() -> Router<AppState> {
    Router::new()
        // WebSocket relay
        .route("/ws", get(crate::websocket::websocket_handler))
        // Health check
        .route("/api/health", get(health_check))
        // Documents
        .route("/api/documents", post(save_document).get(list_documents))
        .route("/api/documents/:id", get(load_document).delete(delete_document))
        .route("/api/documents/:id/rename", patch(rename_document))
        .route("/api/documents/:id/pin", patch(pin_document))
        .route("/api/documents/:id/download/:format", get(download_document))
        // Generation and transcription
        .route("/api/generate", post(generate_content))
        .route("/api/transcribe", post(transcribe_audio))
        // Profile
        .route("/api/profile", get(get_profile).patch(update_profile))
}

/// The caller's bearer token, forwarded to the managed backend which
/// enforces ownership. Missing or malformed header is a 401 here.
fn bearer_token(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .ok_or(ApiError::Unauthorized)
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let speech_ok = state.speech.health_check().await;
    let datastore_ok = state.backend.health_check().await;
    Json(json!({
        "status": "ok",
        "speech_api": speech_ok,
        "datastore": datastore_ok,
        "active_connections": state.connections.len(),
    }))
}

async fn save_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(new): Json<NewDocument>,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers)?;
    if new.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title is required".into()));
    }
    let document = state.backend.save_document(&token, new).await?;
    Ok(Json(document))
}

async fn list_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers)?;
    let documents = state.backend.list_documents(&token).await?;
    Ok(Json(documents))
}

async fn load_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers)?;
    let document = state.backend.get_document(&token, id).await?;
    Ok(Json(document))
}

#[derive(Debug, Deserialize)]
struct RenameRequest {
    title: String,
}

async fn rename_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<RenameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers)?;
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title is required".into()));
    }
    let document = state.backend.rename_document(&token, id, &req.title).await?;
    Ok(Json(document))
}

#[derive(Debug, Deserialize)]
struct PinRequest {
    pinned: bool,
}

async fn pin_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<PinRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers)?;
    let document = state.backend.set_pinned(&token, id, req.pinned).await?;
    Ok(Json(document))
}

async fn delete_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers)?;
    state.backend.delete_document(&token, id).await?;
    Ok(Json(json!({ "deleted": id })))
}

async fn download_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, format)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers)?;
    let format = DownloadFormat::parse(&format)
        .ok_or_else(|| ApiError::BadRequest(format!("unsupported format: {}", format)))?;

    let document = state.backend.get_document(&token, id).await?;
    let bytes = download::render(&document, format)?;
    let filename = download::download_filename(&document.title, format);

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    ))
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    transcript: String,
    instruction: Option<String>,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

async fn generate_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<GenerateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    bearer_token(&headers)?;
    if req.transcript.trim().is_empty() {
        return Err(ApiError::BadRequest("transcript is required".into()));
    }

    let content = state
        .generation
        .generate(&req.transcript, req.instruction.as_deref(), &req.attachments)
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    Ok(Json(json!({ "content": content })))
}

/// Multipart upload: a `file` field with the audio, optionally a
/// `document_id` field to persist the transcription against.
async fn transcribe_audio(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers)?;

    let mut audio: Option<(Vec<u8>, String)> = None;
    let mut document_id: Option<Uuid> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        match field.name() {
            Some("file") => {
                let mime = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                audio = Some((data.to_vec(), mime));
            }
            Some("document_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                let id = text
                    .parse()
                    .map_err(|_| ApiError::BadRequest("invalid document_id".into()))?;
                document_id = Some(id);
            }
            _ => {}
        }
    }

    let (audio, mime) = audio.ok_or_else(|| ApiError::BadRequest("no audio file provided".into()))?;
    if audio.is_empty() {
        return Err(ApiError::BadRequest("audio file is empty".into()));
    }

    info!("Transcribing uploaded audio ({} bytes, {})", audio.len(), mime);
    let transcript = state
        .speech
        .transcribe(audio, &mime)
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    if let Some(id) = document_id {
        state
            .backend
            .insert_transcription(&token, id, &transcript.text, transcript.duration_secs)
            .await?;
    }

    Ok(Json(json!({
        "text": transcript.text,
        "duration_secs": transcript.duration_secs,
    })))
}

async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers)?;
    let profile = state.backend.get_profile(&token).await?;
    Ok(Json(profile))
}

async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<ProfileUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers)?;
    let profile = state.backend.update_profile(&token, update).await?;
    Ok(Json(profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc123"),
        );
        assert_eq!(bearer_token(&headers).unwrap(), "abc123");
    }

    #[test]
    fn missing_or_malformed_auth_is_rejected() {
        let headers = HeaderMap::new();
        assert!(matches!(bearer_token(&headers), Err(ApiError::Unauthorized)));

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert!(matches!(bearer_token(&headers), Err(ApiError::Unauthorized)));

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(matches!(bearer_token(&headers), Err(ApiError::Unauthorized)));
    }
}
