use serde::{Deserialize, Serialize};

use crate::database::catalog::{MembershipTier, VideoReference};
use crate::server::services::playback_services::PlaybackGrant;

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlayResponse {
    Granted(PlaybackGrant),
    Unavailable { message: String },
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GrantQuery {
    pub grant: Option<String>,
}

/// listing entry, the source link never leaves the server
#[derive(Debug, Serialize)]
pub struct VideoSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub duration: String,
    pub thumbnail_url: Option<String>,
    pub required_tier: MembershipTier,
    pub is_free: bool,
    pub views: u64,
}

impl From<VideoReference> for VideoSummary {
    fn from(video: VideoReference) -> Self {
        Self {
            duration: video.display_duration(),
            id: video.id,
            title: video.title,
            description: video.description,
            thumbnail_url: video.thumbnail_url,
            required_tier: video.required_tier,
            is_free: video.is_free,
            views: video.views,
        }
    }
}
