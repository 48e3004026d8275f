// shared fakes for the integration tests, not every test file uses all of them
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tierstream::AppConfig;
use tierstream::database::catalog::{
    CatalogRepository, MembershipTier, Provider, RemoteFolder, UserMembership, VideoReference,
};
use tierstream::server::services::app_services::AppServices;
use tierstream::server::services::audit_services::{DynAuditSink, LogAuditSink};
use tierstream::server::services::drive_services::{
    DriveError, DynRemoteDriveClient, FilePage, ListFilter, RemoteDriveClient, RemoteFile,
    RemoteFileMetadata,
};

/// catalog kept in plain maps, enough for reconciliation and playback scenarios
#[derive(Default)]
pub struct InMemoryCatalog {
    videos: Mutex<HashMap<String, VideoReference>>,
    folders: Mutex<HashMap<String, RemoteFolder>>,
    memberships: Mutex<HashMap<i64, UserMembership>>,
    views: Mutex<HashMap<String, u64>>,
}

impl InMemoryCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn video(&self, video_id: &str) -> Option<VideoReference> {
        self.videos.lock().unwrap().get(video_id).cloned()
    }

    pub fn by_remote_id(&self, folder_id: &str, remote_id: &str) -> Option<VideoReference> {
        self.videos
            .lock()
            .unwrap()
            .values()
            .find(|v| {
                v.folder_id.as_deref() == Some(folder_id)
                    && v.remote_file_id.as_deref() == Some(remote_id)
            })
            .cloned()
    }

    pub fn folder(&self, folder_id: &str) -> Option<RemoteFolder> {
        self.folders.lock().unwrap().get(folder_id).cloned()
    }

    pub fn views(&self, video_id: &str) -> u64 {
        self.views.lock().unwrap().get(video_id).copied().unwrap_or(0)
    }

    pub fn all_videos(&self) -> Vec<VideoReference> {
        self.videos.lock().unwrap().values().cloned().collect()
    }

    pub fn video_count(&self) -> usize {
        self.videos.lock().unwrap().len()
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalog {
    async fn get_video(&self, video_id: &str) -> Result<Option<VideoReference>> {
        Ok(self.video(video_id).map(|mut v| {
            v.views = self.views(video_id);
            v
        }))
    }

    async fn save_video(&self, video: &VideoReference) -> Result<()> {
        self.videos
            .lock()
            .unwrap()
            .insert(video.id.clone(), video.clone());
        Ok(())
    }

    async fn delete_video(&self, video_id: &str) -> Result<()> {
        self.videos.lock().unwrap().remove(video_id);
        Ok(())
    }

    async fn find_video_by_remote_id(
        &self,
        folder_id: &str,
        remote_file_id: &str,
    ) -> Result<Option<VideoReference>> {
        Ok(self.by_remote_id(folder_id, remote_file_id))
    }

    async fn list_folder_videos(&self, folder_id: &str) -> Result<Vec<VideoReference>> {
        let mut videos: Vec<VideoReference> = self
            .videos
            .lock()
            .unwrap()
            .values()
            .filter(|v| v.folder_id.as_deref() == Some(folder_id))
            .cloned()
            .collect();
        videos.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(videos)
    }

    async fn active_remote_ids(&self, folder_id: &str) -> Result<HashSet<String>> {
        Ok(self
            .list_folder_videos(folder_id)
            .await?
            .into_iter()
            .filter(|v| v.is_active)
            .filter_map(|v| v.remote_file_id)
            .collect())
    }

    async fn soft_delete_remote_ids(
        &self,
        folder_id: &str,
        remote_file_ids: &HashSet<String>,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let mut videos = self.videos.lock().unwrap();
        let mut deleted = 0;
        for video in videos.values_mut() {
            let matches = video.folder_id.as_deref() == Some(folder_id)
                && video
                    .remote_file_id
                    .as_ref()
                    .is_some_and(|id| remote_file_ids.contains(id));
            if matches && video.is_active {
                video.soft_delete(at);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn increment_views(&self, video_id: &str) -> Result<u64> {
        let mut views = self.views.lock().unwrap();
        let count = views.entry(video_id.to_string()).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn get_folder(&self, folder_id: &str) -> Result<Option<RemoteFolder>> {
        Ok(self.folder(folder_id))
    }

    async fn save_folder(&self, folder: &RemoteFolder) -> Result<()> {
        self.folders
            .lock()
            .unwrap()
            .insert(folder.id.clone(), folder.clone());
        Ok(())
    }

    async fn delete_folder(&self, folder_id: &str) -> Result<()> {
        self.folders.lock().unwrap().remove(folder_id);
        Ok(())
    }

    async fn get_membership(&self, user_id: i64) -> Result<Option<UserMembership>> {
        Ok(self.memberships.lock().unwrap().get(&user_id).cloned())
    }

    async fn save_membership(&self, membership: &UserMembership) -> Result<()> {
        self.memberships
            .lock()
            .unwrap()
            .insert(membership.user_id, membership.clone());
        Ok(())
    }
}

/// remote folder whose contents the test can change between runs
#[derive(Default)]
pub struct FakeDrive {
    files: Mutex<Vec<RemoteFile>>,
    checksums: Mutex<HashMap<String, String>>,
    delay: Mutex<Option<Duration>>,
    pub list_calls: Mutex<u32>,
}

impl FakeDrive {
    pub fn with_files(ids: &[&str]) -> Arc<Self> {
        let drive = Arc::new(Self::default());
        drive.set_files(ids);
        drive
    }

    pub fn set_files(&self, ids: &[&str]) {
        *self.files.lock().unwrap() = ids.iter().map(|id| remote_file(id)).collect();
    }

    pub fn set_raw_files(&self, files: Vec<RemoteFile>) {
        *self.files.lock().unwrap() = files;
    }

    pub fn set_checksum(&self, file_id: &str, checksum: &str) {
        self.checksums
            .lock()
            .unwrap()
            .insert(file_id.to_string(), checksum.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl RemoteDriveClient for FakeDrive {
    async fn list_files(
        &self,
        _folder_id: &str,
        _filter: &ListFilter,
        page_token: Option<String>,
        page_size: u32,
    ) -> Result<FilePage, DriveError> {
        *self.list_calls.lock().unwrap() += 1;

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let files = self.files.lock().unwrap().clone();
        let start: usize = page_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let end = (start + page_size as usize).min(files.len());

        Ok(FilePage {
            files: files[start.min(end)..end].to_vec(),
            next_page_token: (end < files.len()).then(|| end.to_string()),
        })
    }

    async fn get_metadata(&self, file_id: &str) -> Result<RemoteFileMetadata, DriveError> {
        let checksum = self
            .checksums
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| DriveError::FolderNotFound(file_id.to_string()))?;

        Ok(RemoteFileMetadata {
            id: file_id.to_string(),
            name: None,
            mime_type: Some("video/mp4".to_string()),
            size: None,
            duration_ms: None,
            modified_time: None,
            md5_checksum: Some(checksum),
        })
    }
}

pub fn remote_file(id: &str) -> RemoteFile {
    RemoteFile {
        id: id.to_string(),
        name: Some(format!("{}.mp4", id)),
        mime_type: Some("video/mp4".to_string()),
        size: Some("2048".to_string()),
        modified_time: Some("2026-01-01T00:00:00Z".to_string()),
        ..Default::default()
    }
}

pub fn member(user_id: i64, tier: MembershipTier, days_left: i64) -> UserMembership {
    UserMembership {
        user_id,
        email: format!("user{}@example.com", user_id),
        username: format!("user{}", user_id),
        tier,
        start_date: Some(Utc::now() - chrono::Duration::days(30)),
        end_date: Some(Utc::now() + chrono::Duration::days(days_left)),
        is_staff: false,
    }
}

pub fn video(provider: Provider, link: &str, tier: MembershipTier) -> VideoReference {
    VideoReference::new("Lesson", link, provider, tier)
}

pub fn audit() -> DynAuditSink {
    Arc::new(LogAuditSink)
}

pub fn services(catalog: Arc<InMemoryCatalog>, drive: DynRemoteDriveClient) -> AppServices {
    AppServices::with_backends(catalog, drive, audit(), Arc::new(AppConfig::default()))
}
