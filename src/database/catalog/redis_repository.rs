use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use tracing::{debug, warn};

use super::{CatalogRepository, RemoteFolder, UserMembership, VideoReference};
use crate::database::RedisDatabase;

// view counts live outside the video document so increments never race a document rewrite
const VIEWS_KEY: &str = "catalog:video_views";

fn video_key(video_id: &str) -> String {
    format!("catalog:video:{}", video_id)
}

fn folder_key(folder_id: &str) -> String {
    format!("catalog:folder:{}", folder_id)
}

/// remote_file_id -> video_id for one folder
fn folder_index_key(folder_id: &str) -> String {
    format!("catalog:folder_videos:{}", folder_id)
}

fn membership_key(user_id: i64) -> String {
    format!("catalog:membership:{}", user_id)
}

impl RedisDatabase {
    async fn load_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn
            .get(key)
            .await
            .with_context(|| format!("failed to read {}", key))?;

        raw.map(|json| {
            serde_json::from_str(&json).with_context(|| format!("corrupt document at {}", key))
        })
        .transpose()
    }

    async fn store_json<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value).context("failed to serialize document")?;
        let mut conn = self.connection.clone();
        let _: () = conn
            .set(key, json)
            .await
            .with_context(|| format!("failed to write {}", key))?;
        Ok(())
    }

    async fn load_videos(&self, video_ids: &[String]) -> Result<Vec<VideoReference>> {
        if video_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in video_ids {
            pipe.get(video_key(id));
        }

        let mut conn = self.connection.clone();
        let raw: Vec<Option<String>> = pipe
            .query_async(&mut conn)
            .await
            .context("failed to batch read videos")?;

        let mut videos = Vec::with_capacity(raw.len());
        for (id, json) in video_ids.iter().zip(raw) {
            match json {
                Some(json) => match serde_json::from_str::<VideoReference>(&json) {
                    Ok(video) => videos.push(video),
                    Err(e) => warn!("skipping corrupt video document {}: {}", id, e),
                },
                // index points at a video that was removed by hand
                None => debug!("dangling folder index entry for video {}", id),
            }
        }

        Ok(videos)
    }

    async fn folder_index(&self, folder_id: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.connection.clone();
        conn.hgetall(folder_index_key(folder_id))
            .await
            .context("failed to read folder index")
    }
}

#[async_trait::async_trait]
impl CatalogRepository for RedisDatabase {
    async fn get_video(&self, video_id: &str) -> Result<Option<VideoReference>> {
        let Some(mut video) = self.load_json::<VideoReference>(&video_key(video_id)).await? else {
            return Ok(None);
        };

        let mut conn = self.connection.clone();
        let views: Option<u64> = conn
            .hget(VIEWS_KEY, video_id)
            .await
            .context("failed to read view counter")?;
        if let Some(views) = views {
            video.views = views;
        }

        Ok(Some(video))
    }

    async fn save_video(&self, video: &VideoReference) -> Result<()> {
        self.store_json(&video_key(&video.id), video).await?;

        if let (Some(folder_id), Some(remote_id)) = (&video.folder_id, &video.remote_file_id) {
            let mut conn = self.connection.clone();
            let _: () = conn
                .hset(folder_index_key(folder_id), remote_id, &video.id)
                .await
                .context("failed to index synced video")?;
        }

        Ok(())
    }

    async fn delete_video(&self, video_id: &str) -> Result<()> {
        let existing = self.load_json::<VideoReference>(&video_key(video_id)).await?;
        let mut conn = self.connection.clone();

        let mut pipe = redis::pipe();
        pipe.atomic().del(video_key(video_id)).hdel(VIEWS_KEY, video_id);
        if let Some(VideoReference {
            folder_id: Some(folder_id),
            remote_file_id: Some(remote_id),
            ..
        }) = existing
        {
            pipe.hdel(folder_index_key(&folder_id), remote_id);
        }

        let _: () = pipe
            .query_async(&mut conn)
            .await
            .context("failed to delete video")?;
        Ok(())
    }

    async fn find_video_by_remote_id(
        &self,
        folder_id: &str,
        remote_file_id: &str,
    ) -> Result<Option<VideoReference>> {
        let mut conn = self.connection.clone();
        let video_id: Option<String> = conn
            .hget(folder_index_key(folder_id), remote_file_id)
            .await
            .context("failed to read folder index")?;

        match video_id {
            Some(id) => self.get_video(&id).await,
            None => Ok(None),
        }
    }

    async fn list_folder_videos(&self, folder_id: &str) -> Result<Vec<VideoReference>> {
        let ids: Vec<String> = self.folder_index(folder_id).await?.into_values().collect();
        let mut videos = self.load_videos(&ids).await?;
        videos.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(videos)
    }

    async fn active_remote_ids(&self, folder_id: &str) -> Result<HashSet<String>> {
        let ids: Vec<String> = self.folder_index(folder_id).await?.into_values().collect();

        Ok(self
            .load_videos(&ids)
            .await?
            .into_iter()
            .filter(|video| video.is_active)
            .filter_map(|video| video.remote_file_id)
            .collect())
    }

    async fn soft_delete_remote_ids(
        &self,
        folder_id: &str,
        remote_file_ids: &HashSet<String>,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        if remote_file_ids.is_empty() {
            return Ok(0);
        }

        let index = self.folder_index(folder_id).await?;
        let ids: Vec<String> = remote_file_ids
            .iter()
            .filter_map(|remote_id| index.get(remote_id).cloned())
            .collect();

        let mut deleted = 0;
        for mut video in self.load_videos(&ids).await? {
            if !video.is_active {
                continue;
            }
            video.soft_delete(at);
            self.store_json(&video_key(&video.id), &video).await?;
            deleted += 1;
        }

        Ok(deleted)
    }

    async fn increment_views(&self, video_id: &str) -> Result<u64> {
        let mut conn = self.connection.clone();
        conn.hincr(VIEWS_KEY, video_id, 1u64)
            .await
            .context("failed to increment view counter")
    }

    async fn get_folder(&self, folder_id: &str) -> Result<Option<RemoteFolder>> {
        self.load_json(&folder_key(folder_id)).await
    }

    async fn save_folder(&self, folder: &RemoteFolder) -> Result<()> {
        self.store_json(&folder_key(&folder.id), folder).await
    }

    async fn delete_folder(&self, folder_id: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = redis::pipe()
            .atomic()
            .del(folder_key(folder_id))
            .del(folder_index_key(folder_id))
            .query_async(&mut conn)
            .await
            .context("failed to delete folder")?;
        Ok(())
    }

    async fn get_membership(&self, user_id: i64) -> Result<Option<UserMembership>> {
        self.load_json(&membership_key(user_id)).await
    }

    async fn save_membership(&self, membership: &UserMembership) -> Result<()> {
        self.store_json(&membership_key(membership.user_id), membership)
            .await
    }
}
