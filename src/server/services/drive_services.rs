use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};

pub type DynRemoteDriveClient = Arc<dyn RemoteDriveClient + Send + Sync>;

const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType, description, thumbnailLink, \
                           videoMediaMetadata, modifiedTime, size)";
const METADATA_FIELDS: &str = "id, name, mimeType, size, modifiedTime, md5Checksum, videoMediaMetadata";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DriveError {
    #[error("remote folder {0} was not found")]
    FolderNotFound(String),
    #[error("drive rejected our credentials: {0}")]
    Unauthorized(String),
    #[error("drive access token is not configured")]
    NotConfigured,
    #[error("drive request failed: {0}")]
    Request(String),
    #[error("drive request timed out")]
    Timeout,
    #[error("unexpected drive response: {0}")]
    Decode(String),
}

impl DriveError {
    /// errors that make the whole sync pointless, as opposed to one bad page
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::FolderNotFound(_) | Self::Unauthorized(_) | Self::NotConfigured
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListFilter {
    pub mime_prefix: String,
}

impl ListFilter {
    pub fn videos() -> Self {
        Self {
            mime_prefix: "video/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoMediaMetadata {
    // drive sends this as a string, older payloads as a number
    pub duration_millis: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: String,
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub description: Option<String>,
    pub thumbnail_link: Option<String>,
    pub modified_time: Option<String>,
    pub size: Option<String>,
    pub md5_checksum: Option<String>,
    pub video_media_metadata: Option<VideoMediaMetadata>,
}

impl RemoteFile {
    pub fn duration_ms(&self) -> Result<Option<i64>, String> {
        let Some(raw) = self
            .video_media_metadata
            .as_ref()
            .and_then(|m| m.duration_millis.as_ref())
        else {
            return Ok(None);
        };

        match raw {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| format!("duration {} is not an integer", n)),
            serde_json::Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| format!("duration '{}' is not a number", s)),
            other => Err(format!("unexpected duration value {}", other)),
        }
    }

    pub fn size_bytes(&self) -> Result<Option<u64>, String> {
        self.size
            .as_deref()
            .map(|s| {
                s.parse::<u64>()
                    .map_err(|_| format!("size '{}' is not a number", s))
            })
            .transpose()
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FilePage {
    #[serde(default)]
    pub files: Vec<RemoteFile>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFileMetadata {
    pub id: String,
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<u64>,
    pub duration_ms: Option<i64>,
    pub modified_time: Option<String>,
    pub md5_checksum: Option<String>,
}

#[automock]
#[async_trait]
pub trait RemoteDriveClient {
    async fn list_files(
        &self,
        folder_id: &str,
        filter: &ListFilter,
        page_token: Option<String>,
        page_size: u32,
    ) -> Result<FilePage, DriveError>;

    async fn get_metadata(&self, file_id: &str) -> Result<RemoteFileMetadata, DriveError>;
}

/// drive v3 over plain rest, the access token is minted elsewhere (service account tooling)
pub struct GoogleDriveClient {
    http: reqwest::Client,
    api_base: String,
    access_token: Option<String>,
}

impl GoogleDriveClient {
    pub fn new(api_base: &str, access_token: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    fn token(&self) -> Result<&str, DriveError> {
        self.access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(DriveError::NotConfigured)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        subject: &str,
    ) -> Result<reqwest::Response, DriveError> {
        let response = request.bearer_auth(self.token()?).send().await.map_err(|e| {
            error!("drive request for {} failed: {}", subject, e);
            if e.is_timeout() {
                DriveError::Timeout
            } else {
                DriveError::Request(e.to_string())
            }
        })?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(DriveError::FolderNotFound(subject.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                Err(DriveError::Unauthorized(body))
            }
            status => {
                error!("drive returned {} for {}", status, subject);
                Err(DriveError::Request(format!("status {}", status)))
            }
        }
    }
}

#[async_trait]
impl RemoteDriveClient for GoogleDriveClient {
    async fn list_files(
        &self,
        folder_id: &str,
        filter: &ListFilter,
        page_token: Option<String>,
        page_size: u32,
    ) -> Result<FilePage, DriveError> {
        let query = format!(
            "'{}' in parents and mimeType contains '{}' and trashed = false",
            folder_id.replace('\'', "\\'"),
            filter.mime_prefix
        );
        let page_size = page_size.to_string();

        let mut params: Vec<(&str, &str)> = vec![
            ("q", query.as_str()),
            ("spaces", "drive"),
            ("fields", LIST_FIELDS),
            ("pageSize", page_size.as_str()),
            ("orderBy", "name"),
        ];
        if let Some(token) = page_token.as_deref() {
            params.push(("pageToken", token));
        }

        debug!("listing drive folder {} (page token: {:?})", folder_id, page_token);

        let request = self
            .http
            .get(format!("{}/files", self.api_base))
            .query(&params);

        self.send(request, folder_id)
            .await?
            .json::<FilePage>()
            .await
            .map_err(|e| DriveError::Decode(e.to_string()))
    }

    async fn get_metadata(&self, file_id: &str) -> Result<RemoteFileMetadata, DriveError> {
        let request = self
            .http
            .get(format!(
                "{}/files/{}",
                self.api_base,
                urlencoding::encode(file_id)
            ))
            .query(&[("fields", METADATA_FIELDS)]);

        let file: RemoteFile = self
            .send(request, file_id)
            .await?
            .json()
            .await
            .map_err(|e| DriveError::Decode(e.to_string()))?;

        Ok(RemoteFileMetadata {
            duration_ms: file.duration_ms().map_err(DriveError::Decode)?,
            size: file.size_bytes().map_err(DriveError::Decode)?,
            id: file.id,
            name: file.name,
            mime_type: file.mime_type,
            modified_time: file.modified_time,
            md5_checksum: file.md5_checksum,
        })
    }
}
