use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// membership levels, ordered by rank so comparisons are just `>=`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MembershipTier {
    #[default]
    Regular,
    Vip,
    Diamond,
}

impl MembershipTier {
    pub const ALL: [MembershipTier; 3] = [Self::Regular, Self::Vip, Self::Diamond];

    pub const fn rank(self) -> u8 {
        match self {
            Self::Regular => 0,
            Self::Vip => 1,
            Self::Diamond => 2,
        }
    }

    /// true when a holder of `self` may see content that requires `required`
    pub const fn can_access(self, required: MembershipTier) -> bool {
        self.rank() >= required.rank()
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Regular => "Regular",
            Self::Vip => "VIP",
            Self::Diamond => "Diamond",
        }
    }
}

impl PartialOrd for MembershipTier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MembershipTier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for MembershipTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for MembershipTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "regular" => Ok(Self::Regular),
            "vip" => Ok(Self::Vip),
            "diamond" => Ok(Self::Diamond),
            other => Err(format!("unknown membership tier: {}", other)),
        }
    }
}

/// hosting services that actually hold the video bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Mega,
    Gdrive,
    Pcloud,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mega => "mega",
            Self::Gdrive => "gdrive",
            Self::Pcloud => "pcloud",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserMembership {
    pub user_id: i64,
    pub email: String,
    pub username: String,
    pub tier: MembershipTier,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_staff: bool,
}

impl UserMembership {
    /// a membership only counts while its end date is set and still ahead of us
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        matches!(self.end_date, Some(end) if end > now)
    }

    /// the tier actually used for access checks, expiry demotes to regular
    pub fn effective_tier(&self, now: DateTime<Utc>) -> MembershipTier {
        if self.is_staff {
            return MembershipTier::Diamond;
        }

        if self.is_active(now) {
            self.tier
        } else {
            MembershipTier::Regular
        }
    }

    /// what ends up on the watermark and inside tokens
    pub fn identifier(&self) -> &str {
        if self.email.is_empty() {
            &self.username
        } else {
            &self.email
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoReference {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub source_link: String,
    pub provider: Provider,
    pub required_tier: MembershipTier,
    #[serde(default)]
    pub is_free: bool,
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub views: u64,
    pub is_active: bool,
    pub thumbnail_url: Option<String>,
    #[serde(default = "default_true")]
    pub secure_playback: bool,
    #[serde(default = "default_true")]
    pub watermark_enabled: bool,
    // only present on synced videos
    pub remote_file_id: Option<String>,
    pub folder_id: Option<String>,
    pub mime_type: Option<String>,
    pub modified_time: Option<String>,
    pub size_bytes: Option<u64>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl VideoReference {
    pub fn new(
        title: impl Into<String>,
        source_link: impl Into<String>,
        provider: Provider,
        required_tier: MembershipTier,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: nanoid::nanoid!(),
            title: title.into(),
            description: String::new(),
            source_link: source_link.into(),
            provider,
            required_tier,
            is_free: false,
            duration_ms: None,
            views: 0,
            is_active: true,
            thumbnail_url: None,
            secure_playback: true,
            watermark_enabled: true,
            remote_file_id: None,
            folder_id: None,
            mime_type: None,
            modified_time: None,
            size_bytes: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// `m:ss` or `h:mm:ss`
    pub fn display_duration(&self) -> String {
        let Some(ms) = self.duration_ms.filter(|ms| *ms > 0) else {
            return "Unknown".to_string();
        };

        let total_seconds = ms / 1000;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            format!("{}:{:02}", minutes, seconds)
        }
    }

    pub fn soft_delete(&mut self, at: DateTime<Utc>) {
        self.is_active = false;
        self.deleted_at = Some(at);
        self.updated_at = at;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Course {
    pub id: String,
    pub title: String,
    pub required_tier: MembershipTier,
    pub video_ids: Vec<String>,
}

/// anything that can be gated by tier
#[derive(Debug, Clone, Copy)]
pub enum ContentRef<'a> {
    Video(&'a VideoReference),
    Course(&'a Course),
}

impl ContentRef<'_> {
    pub fn required_tier(&self) -> MembershipTier {
        match self {
            Self::Video(video) => video.required_tier,
            Self::Course(course) => course.required_tier,
        }
    }

    /// courses are never free, only single videos can be
    pub fn is_free(&self) -> bool {
        match self {
            Self::Video(video) => video.is_free,
            Self::Course(_) => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteFolder {
    pub id: String,
    /// the drive side folder id
    pub remote_id: String,
    pub name: String,
    pub required_tier: MembershipTier,
    pub last_synced: Option<DateTime<Utc>>,
    #[serde(default)]
    pub video_count: u64,
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RemoteFolder {
    pub fn new(
        remote_id: impl Into<String>,
        name: impl Into<String>,
        required_tier: MembershipTier,
    ) -> Self {
        Self {
            id: nanoid::nanoid!(),
            remote_id: remote_id.into(),
            name: name.into(),
            required_tier,
            last_synced: None,
            video_count: 0,
            parent_id: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn membership(tier: MembershipTier, end: Option<DateTime<Utc>>) -> UserMembership {
        UserMembership {
            user_id: 1,
            email: "a@b.c".into(),
            username: "a".into(),
            tier,
            start_date: None,
            end_date: end,
            is_staff: false,
        }
    }

    #[test]
    fn missing_end_date_is_inactive() {
        let now = Utc::now();
        let m = membership(MembershipTier::Diamond, None);
        assert!(!m.is_active(now));
        assert_eq!(m.effective_tier(now), MembershipTier::Regular);
    }

    #[test]
    fn future_end_date_keeps_tier() {
        let now = Utc::now();
        let m = membership(MembershipTier::Vip, Some(now + Duration::days(3)));
        assert_eq!(m.effective_tier(now), MembershipTier::Vip);
    }

    #[test]
    fn tier_parses_loosely() {
        assert_eq!("  VIP ".parse::<MembershipTier>(), Ok(MembershipTier::Vip));
        assert!("gold".parse::<MembershipTier>().is_err());
    }

    #[test]
    fn duration_formats() {
        let mut video = VideoReference::new("t", "l", Provider::Mega, MembershipTier::Regular);
        assert_eq!(video.display_duration(), "Unknown");
        video.duration_ms = Some(65_000);
        assert_eq!(video.display_duration(), "1:05");
        video.duration_ms = Some(3_725_000);
        assert_eq!(video.display_duration(), "1:02:05");
    }
}
