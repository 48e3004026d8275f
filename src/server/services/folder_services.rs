use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::database::catalog::{
    DynCatalogRepository, MembershipTier, RemoteFolder, UserMembership, VideoReference,
};
use crate::server::error::{AppResult, Error};
use crate::server::services::audit_services::{
    AuditAction, AuditEntry, DynAuditSink, record_in_background,
};
use crate::server::services::sync_services::FolderLocks;
use crate::server::utils::{access_utils, link_utils};

pub type DynFolderService = Arc<dyn FolderServiceTrait + Send + Sync>;

// no real hierarchy gets anywhere near this, a longer chain means the data is already broken
const MAX_FOLDER_DEPTH: usize = 64;

#[async_trait]
pub trait FolderServiceTrait {
    async fn create_folder(
        &self,
        remote_input: &str,
        name: &str,
        required_tier: MembershipTier,
        parent_id: Option<String>,
        actor: &str,
    ) -> AppResult<RemoteFolder>;

    async fn get_folder(&self, folder_id: &str) -> AppResult<RemoteFolder>;

    async fn set_parent(
        &self,
        folder_id: &str,
        parent_id: Option<String>,
        actor: &str,
    ) -> AppResult<RemoteFolder>;

    /// removes the folder, its videos are detached and soft deleted rather than dropped
    async fn delete_folder(&self, folder_id: &str, actor: &str) -> AppResult<u64>;

    async fn accessible_videos(
        &self,
        folder_id: &str,
        viewer: Option<&UserMembership>,
    ) -> AppResult<Vec<VideoReference>>;
}

pub struct FolderService {
    repository: DynCatalogRepository,
    audit: DynAuditSink,
    locks: FolderLocks,
}

impl FolderService {
    /// `locks` must be the set the sync service uses
    pub fn new(repository: DynCatalogRepository, audit: DynAuditSink, locks: FolderLocks) -> Self {
        Self {
            repository,
            audit,
            locks,
        }
    }

    async fn existing(&self, folder_id: &str) -> AppResult<RemoteFolder> {
        self.repository
            .get_folder(folder_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("folder {} not found", folder_id)))
    }

    /// rejects a parent whose ancestor chain runs back into `folder_id`
    async fn ensure_acyclic(&self, folder_id: &str, parent_id: &str) -> AppResult<()> {
        if folder_id == parent_id {
            return Err(Error::Conflict("a folder cannot be its own parent".to_string()));
        }

        let mut seen = HashSet::new();
        let mut cursor = Some(parent_id.to_string());

        while let Some(current) = cursor {
            if current == folder_id {
                return Err(Error::Conflict(
                    "moving the folder there would create a cycle".to_string(),
                ));
            }
            if !seen.insert(current.clone()) || seen.len() > MAX_FOLDER_DEPTH {
                warn!("folder hierarchy above {} is already broken", parent_id);
                return Err(Error::Conflict("folder hierarchy is inconsistent".to_string()));
            }

            cursor = self.existing(&current).await?.parent_id;
        }

        Ok(())
    }
}

#[async_trait]
impl FolderServiceTrait for FolderService {
    async fn create_folder(
        &self,
        remote_input: &str,
        name: &str,
        required_tier: MembershipTier,
        parent_id: Option<String>,
        actor: &str,
    ) -> AppResult<RemoteFolder> {
        let remote_id = link_utils::extract_drive_folder_id(remote_input)
            .ok_or_else(|| Error::BadRequest("not a drive folder link or id".to_string()))?;

        let mut folder = RemoteFolder::new(remote_id, name.trim(), required_tier);
        if let Some(parent_id) = parent_id {
            // a brand new folder has no children, so only existence matters
            self.existing(&parent_id).await?;
            folder.parent_id = Some(parent_id);
        }

        self.repository.save_folder(&folder).await?;
        info!("created folder {} for remote {}", folder.id, folder.remote_id);

        record_in_background(
            &self.audit,
            AuditEntry::new(
                actor,
                AuditAction::FolderUpdate,
                format!("created folder: {}", folder.name),
            ),
        );

        Ok(folder)
    }

    async fn get_folder(&self, folder_id: &str) -> AppResult<RemoteFolder> {
        self.existing(folder_id).await
    }

    async fn set_parent(
        &self,
        folder_id: &str,
        parent_id: Option<String>,
        actor: &str,
    ) -> AppResult<RemoteFolder> {
        let _guard = self.locks.acquire(folder_id).await;
        let mut folder = self.existing(folder_id).await?;

        if let Some(parent_id) = parent_id.as_deref() {
            self.ensure_acyclic(folder_id, parent_id).await?;
        }

        folder.parent_id = parent_id;
        self.repository.save_folder(&folder).await?;

        record_in_background(
            &self.audit,
            AuditEntry::new(
                actor,
                AuditAction::FolderUpdate,
                format!(
                    "moved folder {} under {}",
                    folder.name,
                    folder.parent_id.as_deref().unwrap_or("root")
                ),
            ),
        );

        Ok(folder)
    }

    async fn delete_folder(&self, folder_id: &str, actor: &str) -> AppResult<u64> {
        // waits out a running sync, a run queued behind us finds the folder gone
        let _guard = self.locks.acquire(folder_id).await;
        let folder = self.existing(folder_id).await?;
        let now = Utc::now();

        let mut retired = 0;
        for mut video in self.repository.list_folder_videos(folder_id).await? {
            if video.is_active {
                video.soft_delete(now);
                retired += 1;
            }
            video.folder_id = None;
            self.repository.save_video(&video).await?;
        }

        self.repository.delete_folder(folder_id).await?;
        self.locks.forget(folder_id);
        info!("deleted folder {} and retired {} videos", folder_id, retired);

        record_in_background(
            &self.audit,
            AuditEntry::new(
                actor,
                AuditAction::FolderDelete,
                format!("deleted folder: {} ({} videos retired)", folder.name, retired),
            ),
        );

        Ok(retired)
    }

    async fn accessible_videos(
        &self,
        folder_id: &str,
        viewer: Option<&UserMembership>,
    ) -> AppResult<Vec<VideoReference>> {
        self.existing(folder_id).await?;
        let videos = self.repository.list_folder_videos(folder_id).await?;

        Ok(access_utils::accessible_videos(viewer, &videos, Utc::now())
            .into_iter()
            .cloned()
            .collect())
    }
}
