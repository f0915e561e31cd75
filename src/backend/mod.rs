use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::config::DatastoreConfig;
use crate::error::ApiError;

/// Client for the managed relational backend's REST interface. The backend
/// owns validation and row-level access control; every call forwards the
/// end user's bearer token so ownership is enforced there, not here.
#[derive(Debug, Clone)]
pub struct BackendClient {
    config: DatastoreConfig,
    http: reqwest::Client,
}

/// A document belongs to exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A transcription belongs to exactly one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    pub id: Uuid,
    pub document_id: Uuid,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub preferences: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct NewDocument {
    pub id: Option<Uuid>,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub preferences: Option<serde_json::Value>,
}

impl BackendClient {
    pub fn new(config: DatastoreConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.config.base_url, path))
            .header("apikey", &self.config.service_key)
            .header("Authorization", format!("Bearer {}", token))
            .header("Prefer", "return=representation")
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::Unauthorized),
            s if s.is_client_error() => Err(ApiError::BadRequest(body)),
            _ => Err(ApiError::Upstream(format!("datastore returned {}", status))),
        }
    }

    /// Representation responses come back as a row array, even for single
    /// writes.
    async fn single_row<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
        entity: &'static str,
    ) -> Result<T, ApiError> {
        let rows: Vec<T> = Self::check(response).await?.json().await?;
        rows.into_iter().next().ok_or(ApiError::NotFound(entity))
    }

    pub async fn save_document(
        &self,
        token: &str,
        new: NewDocument,
    ) -> Result<Document, ApiError> {
        let response = match new.id {
            Some(id) => {
                self.request(Method::PATCH, &format!("documents?id=eq.{}", id), token)
                    .json(&json!({
                        "title": new.title,
                        "content": new.content,
                        "updated_at": Utc::now(),
                    }))
                    .send()
                    .await?
            }
            None => {
                self.request(Method::POST, "documents", token)
                    .json(&json!({ "title": new.title, "content": new.content }))
                    .send()
                    .await?
            }
        };
        Self::single_row(response, "document").await
    }

    /// Owner's documents, pinned first, most recently updated first.
    pub async fn list_documents(&self, token: &str) -> Result<Vec<Document>, ApiError> {
        let response = self
            .request(
                Method::GET,
                "documents?select=*&order=pinned.desc,updated_at.desc",
                token,
            )
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn get_document(&self, token: &str, id: Uuid) -> Result<Document, ApiError> {
        let response = self
            .request(Method::GET, &format!("documents?id=eq.{}&select=*", id), token)
            .send()
            .await?;
        Self::single_row(response, "document").await
    }

    pub async fn rename_document(
        &self,
        token: &str,
        id: Uuid,
        title: &str,
    ) -> Result<Document, ApiError> {
        let response = self
            .request(Method::PATCH, &format!("documents?id=eq.{}", id), token)
            .json(&json!({ "title": title, "updated_at": Utc::now() }))
            .send()
            .await?;
        Self::single_row(response, "document").await
    }

    pub async fn set_pinned(
        &self,
        token: &str,
        id: Uuid,
        pinned: bool,
    ) -> Result<Document, ApiError> {
        let response = self
            .request(Method::PATCH, &format!("documents?id=eq.{}", id), token)
            .json(&json!({ "pinned": pinned }))
            .send()
            .await?;
        Self::single_row(response, "document").await
    }

    /// Transcriptions cascade at the backend via the foreign key.
    pub async fn delete_document(&self, token: &str, id: Uuid) -> Result<(), ApiError> {
        let response = self
            .request(Method::DELETE, &format!("documents?id=eq.{}", id), token)
            .send()
            .await?;
        let rows: Vec<Document> = Self::check(response).await?.json().await?;
        ensure_deleted(&rows)
    }

    pub async fn insert_transcription(
        &self,
        token: &str,
        document_id: Uuid,
        text: &str,
        duration_secs: Option<f64>,
    ) -> Result<Transcription, ApiError> {
        let response = self
            .request(Method::POST, "transcriptions", token)
            .json(&json!({
                "document_id": document_id,
                "text": text,
                "duration_secs": duration_secs,
            }))
            .send()
            .await?;
        Self::single_row(response, "transcription").await
    }

    /// The caller's own profile row; row-level policies scope the query.
    pub async fn get_profile(&self, token: &str) -> Result<Profile, ApiError> {
        let response = self
            .request(Method::GET, "profiles?select=*", token)
            .send()
            .await?;
        Self::single_row(response, "profile").await
    }

    pub async fn update_profile(
        &self,
        token: &str,
        update: ProfileUpdate,
    ) -> Result<Profile, ApiError> {
        let mut changes = serde_json::Map::new();
        if let Some(name) = update.display_name {
            changes.insert("display_name".to_string(), json!(name));
        }
        if let Some(preferences) = update.preferences {
            changes.insert("preferences".to_string(), preferences);
        }
        if changes.is_empty() {
            return Err(ApiError::BadRequest("no profile fields to update".into()));
        }

        let response = self
            .request(Method::PATCH, "profiles", token)
            .json(&serde_json::Value::Object(changes))
            .send()
            .await?;
        Self::single_row(response, "profile").await
    }

    pub async fn health_check(&self) -> bool {
        self.http
            .get(format!("{}/", self.config.base_url))
            .header("apikey", &self.config.service_key)
            .send()
            .await
            .is_ok()
    }
}

/// With `return=representation`, an empty row array means the filter
/// matched nothing: the document does not exist or is not owned by the
/// caller.
fn ensure_deleted(rows: &[Document]) -> Result<(), ApiError> {
    if rows.is_empty() {
        return Err(ApiError::NotFound("document"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_row_deserializes() {
        let raw = r##"{
            "id": "4f5c1b9e-8a31-4e6f-9f2a-7d8e3c1b5a42",
            "user_id": "user-123",
            "title": "Standup notes",
            "content": "# Standup",
            "pinned": true,
            "created_at": "2026-08-01T09:00:00Z",
            "updated_at": "2026-08-02T10:30:00Z"
        }"##;
        let doc: Document = serde_json::from_str(raw).unwrap();
        assert_eq!(doc.title, "Standup notes");
        assert!(doc.pinned);
    }

    #[test]
    fn pinned_defaults_to_false() {
        let raw = r##"{
            "id": "4f5c1b9e-8a31-4e6f-9f2a-7d8e3c1b5a42",
            "user_id": "user-123",
            "title": "Untitled",
            "content": "",
            "created_at": "2026-08-01T09:00:00Z",
            "updated_at": "2026-08-01T09:00:00Z"
        }"##;
        let doc: Document = serde_json::from_str(raw).unwrap();
        assert!(!doc.pinned);
    }

    #[test]
    fn delete_of_unmatched_filter_is_not_found() {
        assert!(matches!(
            ensure_deleted(&[]),
            Err(ApiError::NotFound("document"))
        ));

        let deleted = Document {
            id: Uuid::new_v4(),
            user_id: "user-123".to_string(),
            title: "Standup notes".to_string(),
            content: String::new(),
            pinned: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(ensure_deleted(&[deleted]).is_ok());
    }
}
