mod model;
mod redis_repository;

pub use model::*;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use mockall::automock;

pub type DynCatalogRepository = Arc<dyn CatalogRepository + Send + Sync>;

/// everything the streaming core needs from storage
///
/// videos synced from a folder are unique on (folder_id, remote_file_id), the implementation is
/// expected to keep an index for that pair so `find_video_by_remote_id` stays cheap
#[automock]
#[async_trait::async_trait]
pub trait CatalogRepository {
    async fn get_video(&self, video_id: &str) -> Result<Option<VideoReference>>;
    async fn save_video(&self, video: &VideoReference) -> Result<()>;
    async fn delete_video(&self, video_id: &str) -> Result<()>;
    async fn find_video_by_remote_id(
        &self,
        folder_id: &str,
        remote_file_id: &str,
    ) -> Result<Option<VideoReference>>;
    async fn list_folder_videos(&self, folder_id: &str) -> Result<Vec<VideoReference>>;
    /// remote ids of the folder's videos that are not soft deleted
    async fn active_remote_ids(&self, folder_id: &str) -> Result<HashSet<String>>;
    /// marks the matching videos inactive, returns how many actually changed
    async fn soft_delete_remote_ids(
        &self,
        folder_id: &str,
        remote_file_ids: &HashSet<String>,
        at: DateTime<Utc>,
    ) -> Result<u64>;
    /// atomic, returns the new count
    async fn increment_views(&self, video_id: &str) -> Result<u64>;

    async fn get_folder(&self, folder_id: &str) -> Result<Option<RemoteFolder>>;
    async fn save_folder(&self, folder: &RemoteFolder) -> Result<()>;
    async fn delete_folder(&self, folder_id: &str) -> Result<()>;

    async fn get_membership(&self, user_id: i64) -> Result<Option<UserMembership>>;
    async fn save_membership(&self, membership: &UserMembership) -> Result<()>;
}
