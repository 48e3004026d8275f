use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, warn};

use crate::database::catalog::{DynCatalogRepository, Provider, RemoteFolder, VideoReference};
use crate::server::services::drive_services::{DriveError, DynRemoteDriveClient, ListFilter, RemoteFile};
use crate::server::utils::link_utils;

pub type DynSyncService = Arc<dyn SyncServiceTrait + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    PartialSuccess,
    Error,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub status: SyncStatus,
    pub folder_id: String,
    pub total_found: u64,
    pub new_count: u64,
    pub updated_count: u64,
    pub unchanged_count: u64,
    pub deleted_count: u64,
    pub errors: Vec<String>,
    /// whether the whole remote listing was walked
    pub completed: bool,
    pub duration_secs: f64,
    pub timestamp: DateTime<Utc>,
}

impl SyncReport {
    fn empty(folder_id: &str) -> Self {
        Self {
            status: SyncStatus::Success,
            folder_id: folder_id.to_string(),
            total_found: 0,
            new_count: 0,
            updated_count: 0,
            unchanged_count: 0,
            deleted_count: 0,
            errors: Vec::new(),
            completed: false,
            duration_secs: 0.0,
            timestamp: Utc::now(),
        }
    }

    /// unrecoverable failure, counts are wiped so nobody reads meaning into them
    fn failed(folder_id: &str, error: String, started: Instant) -> Self {
        Self {
            status: SyncStatus::Error,
            errors: vec![error],
            duration_secs: started.elapsed().as_secs_f64(),
            ..Self::empty(folder_id)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub page_size: u32,
    pub page_timeout: Duration,
    /// stop paging once this passes, what was committed so far stays
    pub deadline: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemChange {
    Created,
    Updated,
    Unchanged,
}

impl ItemChange {
    fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

/// the fields a sync run owns, everything else on the record is left to admins
#[derive(Debug, Clone, PartialEq)]
struct RemoteFields {
    title: String,
    description: String,
    thumbnail_url: Option<String>,
    duration_ms: Option<i64>,
    mime_type: Option<String>,
    modified_time: Option<String>,
    size_bytes: Option<u64>,
}

impl RemoteFields {
    fn from_remote(file: &RemoteFile) -> Result<Self, String> {
        if file.id.trim().is_empty() {
            return Err("remote item has no id".to_string());
        }

        Ok(Self {
            title: file.name.clone().unwrap_or_default(),
            description: file.description.clone().unwrap_or_default(),
            thumbnail_url: file.thumbnail_link.clone().filter(|t| !t.is_empty()),
            duration_ms: file.duration_ms()?,
            mime_type: file.mime_type.clone(),
            modified_time: file.modified_time.clone(),
            size_bytes: file.size_bytes()?,
        })
    }

    fn matches(&self, video: &VideoReference) -> bool {
        self.title == video.title
            && self.description == video.description
            && self.thumbnail_url == video.thumbnail_url
            && self.duration_ms == video.duration_ms
            && self.mime_type == video.mime_type
            && self.modified_time == video.modified_time
            && self.size_bytes == video.size_bytes
    }

    fn apply(self, video: &mut VideoReference) {
        video.title = self.title;
        video.description = self.description;
        video.thumbnail_url = self.thumbnail_url;
        video.duration_ms = self.duration_ms;
        video.mime_type = self.mime_type;
        video.modified_time = self.modified_time;
        video.size_bytes = self.size_bytes;
    }
}

/// per folder mutual exclusion, shared by sync runs and every folder edit so a run never races a
/// move or a delete of the folder it is reconciling
#[derive(Clone, Default)]
pub struct FolderLocks {
    locks: Arc<std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl FolderLocks {
    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// waits for the folder's lock, runs for different folders do not wait on each other
    pub async fn acquire(&self, folder_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .entries()
            .entry(folder_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// drops the entry of a deleted folder, call it while still holding that folder's guard
    pub fn forget(&self, folder_id: &str) {
        self.entries().remove(folder_id);
    }

    pub fn tracked(&self) -> usize {
        self.entries().len()
    }
}

#[async_trait]
pub trait SyncServiceTrait {
    /// reconciles the local catalog of one folder against its remote listing
    async fn sync_folder(&self, folder: &RemoteFolder) -> SyncReport;

    async fn sync_folder_with(&self, folder: &RemoteFolder, options: SyncOptions) -> SyncReport;
}

pub struct SyncService {
    repository: DynCatalogRepository,
    drive: DynRemoteDriveClient,
    page_size: u32,
    page_timeout: Duration,
    locks: FolderLocks,
}

impl SyncService {
    pub fn new(
        repository: DynCatalogRepository,
        drive: DynRemoteDriveClient,
        locks: FolderLocks,
        page_size: u32,
        page_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            drive,
            page_size: page_size.clamp(1, 1000),
            page_timeout,
            locks,
        }
    }

    pub fn default_options(&self) -> SyncOptions {
        SyncOptions {
            page_size: self.page_size,
            page_timeout: self.page_timeout,
            deadline: None,
        }
    }

    /// upserts one remote item, keyed on (folder, remote id)
    async fn upsert_item(
        &self,
        folder: &RemoteFolder,
        file: &RemoteFile,
        now: DateTime<Utc>,
    ) -> Result<ItemChange, String> {
        let fields = RemoteFields::from_remote(file)?;

        let existing = self
            .repository
            .find_video_by_remote_id(&folder.id, &file.id)
            .await
            .map_err(|e| format!("{:#}", e))?;

        let (video, change) = match existing {
            Some(mut video) => {
                let restored = !video.is_active;
                if !restored && fields.matches(&video) {
                    return Ok(ItemChange::Unchanged);
                }

                fields.apply(&mut video);
                video.is_active = true;
                video.deleted_at = None;
                video.updated_at = now;
                (video, ItemChange::Updated)
            }
            None => {
                let mut video = VideoReference::new(
                    "",
                    link_utils::build_drive_url(&file.id),
                    Provider::Gdrive,
                    folder.required_tier,
                );
                fields.apply(&mut video);
                video.remote_file_id = Some(file.id.clone());
                video.folder_id = Some(folder.id.clone());
                video.created_at = now;
                video.updated_at = now;
                (video, ItemChange::Created)
            }
        };

        self.repository
            .save_video(&video)
            .await
            .map_err(|e| format!("{:#}", e))?;

        Ok(change)
    }
}

#[async_trait]
impl SyncServiceTrait for SyncService {
    async fn sync_folder(&self, folder: &RemoteFolder) -> SyncReport {
        self.sync_folder_with(folder, self.default_options()).await
    }

    async fn sync_folder_with(&self, folder: &RemoteFolder, options: SyncOptions) -> SyncReport {
        let _guard = self.locks.acquire(&folder.id).await;
        let started = Instant::now();

        // the caller's copy may predate an earlier run, a move or a delete
        let folder = match self.repository.get_folder(&folder.id).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                warn!("folder {} was deleted before its sync started", folder.id);
                return finish(SyncReport::failed(
                    &folder.id,
                    "folder no longer exists".to_string(),
                    started,
                ));
            }
            Err(e) => {
                error!("could not load folder {}: {:#}", folder.id, e);
                return finish(SyncReport::failed(
                    &folder.id,
                    "failed to read folder".to_string(),
                    started,
                ));
            }
        };

        let mut report = SyncReport::empty(&folder.id);
        info!("syncing folder {} ({})", folder.name, folder.remote_id);

        let known_ids = match self.repository.active_remote_ids(&folder.id).await {
            Ok(ids) => ids,
            Err(e) => {
                error!("could not snapshot folder {}: {:#}", folder.id, e);
                return finish(SyncReport::failed(
                    &folder.id,
                    "failed to read local catalog".to_string(),
                    started,
                ));
            }
        };

        let filter = ListFilter::videos();
        let mut found_ids: HashSet<String> = HashSet::new();
        let mut page_token: Option<String> = None;
        let mut page_number = 0u32;

        loop {
            if options.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                warn!("sync of folder {} ran past its deadline", folder.id);
                report.errors.push("sync deadline exceeded".to_string());
                break;
            }

            page_number += 1;
            let page_timeout = match options.deadline {
                Some(deadline) => options
                    .page_timeout
                    .min(deadline.saturating_duration_since(Instant::now())),
                None => options.page_timeout,
            };
            let listing = tokio::time::timeout(
                page_timeout,
                self.drive.list_files(
                    &folder.remote_id,
                    &filter,
                    page_token.clone(),
                    options.page_size.clamp(1, 1000),
                ),
            )
            .await
            .unwrap_or(Err(DriveError::Timeout));

            let page = match listing {
                Ok(page) => page,
                Err(e) if e.is_fatal() => {
                    error!("sync of folder {} aborted: {}", folder.id, e);
                    return finish(SyncReport::failed(&folder.id, e.to_string(), started));
                }
                Err(e) => {
                    error!("page {} of folder {} failed: {}", page_number, folder.id, e);
                    report
                        .errors
                        .push(format!("error fetching videos page {}: {}", page_number, e));
                    break;
                }
            };

            debug!(
                "page {} of folder {} has {} items",
                page_number,
                folder.id,
                page.files.len()
            );

            let now = Utc::now();
            for file in &page.files {
                if !file.id.is_empty() {
                    found_ids.insert(file.id.clone());
                }

                match self.upsert_item(&folder, file, now).await {
                    Ok(change) => {
                        metrics::counter!("catalog_sync_items_total", "change" => change.label())
                            .increment(1);
                        match change {
                            ItemChange::Created => report.new_count += 1,
                            ItemChange::Updated => report.updated_count += 1,
                            ItemChange::Unchanged => report.unchanged_count += 1,
                        }
                    }
                    Err(e) => {
                        let name = file.name.as_deref().unwrap_or("unknown");
                        error!("failed to sync video {} in folder {}: {}", name, folder.id, e);
                        report
                            .errors
                            .push(format!("error processing video {}: {}", name, e));
                    }
                }
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => {
                    report.completed = true;
                    break;
                }
            }
        }

        report.total_found = found_ids.len() as u64;
        let now = Utc::now();

        // a partial listing says nothing about what disappeared remotely
        if report.completed {
            let vanished: HashSet<String> = known_ids.difference(&found_ids).cloned().collect();
            if !vanished.is_empty() {
                match self
                    .repository
                    .soft_delete_remote_ids(&folder.id, &vanished, now)
                    .await
                {
                    Ok(count) => report.deleted_count = count,
                    Err(e) => {
                        error!("soft delete in folder {} failed: {:#}", folder.id, e);
                        report.errors.push("failed to mark removed videos".to_string());
                    }
                }
            }
        } else {
            info!(
                "folder {} listing incomplete, skipping removal of {} known videos",
                folder.id,
                known_ids.len()
            );
        }

        // only bookkeeping on a folder that still exists, saving a deleted one would bring it back
        let mut folder_gone = false;
        match self.repository.get_folder(&folder.id).await {
            Ok(Some(mut stored)) => {
                if report.completed {
                    stored.video_count = report.total_found;
                }
                stored.last_synced = Some(now);
                if let Err(e) = self.repository.save_folder(&stored).await {
                    error!("failed to save folder {} after sync: {:#}", folder.id, e);
                    report.errors.push("failed to update folder".to_string());
                }
            }
            Ok(None) => {
                warn!("folder {} disappeared while it was syncing", folder.id);
                report.errors.push("folder was deleted during sync".to_string());
                folder_gone = true;
            }
            Err(e) => {
                error!("could not reload folder {} after sync: {:#}", folder.id, e);
                report.errors.push("failed to update folder".to_string());
            }
        }

        report.status = if folder_gone {
            SyncStatus::Error
        } else if report.errors.is_empty() {
            SyncStatus::Success
        } else {
            SyncStatus::PartialSuccess
        };
        report.duration_secs = started.elapsed().as_secs_f64();
        report.timestamp = now;

        finish(report)
    }
}

fn finish(report: SyncReport) -> SyncReport {
    metrics::counter!("catalog_sync_runs_total", "status" => report.status.as_str()).increment(1);
    info!(
        "folder {} synced: {} ({} found, {} new, {} updated, {} deleted, {} errors) in {:.2}s",
        report.folder_id,
        report.status.as_str(),
        report.total_found,
        report.new_count,
        report.updated_count,
        report.deleted_count,
        report.errors.len(),
        report.duration_secs
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::catalog::MembershipTier;

    fn remote(id: &str, name: &str) -> RemoteFile {
        RemoteFile {
            id: id.into(),
            name: Some(name.into()),
            mime_type: Some("video/mp4".into()),
            size: Some("1024".into()),
            ..Default::default()
        }
    }

    #[test]
    fn identical_remote_fields_match_the_stored_record() {
        let file = remote("a", "A.mp4");
        let fields = RemoteFields::from_remote(&file).unwrap();

        let mut video = VideoReference::new("x", "l", Provider::Gdrive, MembershipTier::Regular);
        fields.clone().apply(&mut video);

        assert!(fields.matches(&video));
        video.title = "renamed".into();
        assert!(!fields.matches(&video));
    }

    #[test]
    fn bad_size_is_an_item_error() {
        let mut file = remote("a", "A.mp4");
        file.size = Some("lots".into());
        assert!(RemoteFields::from_remote(&file).is_err());
    }
}
