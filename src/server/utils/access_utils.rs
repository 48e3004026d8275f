use chrono::{DateTime, Utc};

use crate::database::catalog::{ContentRef, MembershipTier, UserMembership, VideoReference};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Granted,
    /// anonymous viewer on gated content
    LoginRequired,
    UpgradeRequired(MembershipTier),
}

/// free content is open to everyone, everything else compares the viewer's effective tier
/// (expired memberships count as regular) against the content's required tier
pub fn evaluate(
    viewer: Option<&UserMembership>,
    content: ContentRef<'_>,
    now: DateTime<Utc>,
) -> AccessDecision {
    if content.is_free() {
        return AccessDecision::Granted;
    }

    let Some(viewer) = viewer else {
        return AccessDecision::LoginRequired;
    };

    let required = content.required_tier();
    if viewer.effective_tier(now).can_access(required) {
        AccessDecision::Granted
    } else {
        AccessDecision::UpgradeRequired(required)
    }
}

pub fn can_access(
    viewer: Option<&UserMembership>,
    content: ContentRef<'_>,
    now: DateTime<Utc>,
) -> bool {
    evaluate(viewer, content, now) == AccessDecision::Granted
}

/// progress tracking and other writes need a real account, even on free videos
pub fn may_record_progress(viewer: Option<&UserMembership>) -> bool {
    viewer.is_some()
}

/// active videos the viewer is allowed to open, in the order given
pub fn accessible_videos<'a>(
    viewer: Option<&UserMembership>,
    videos: &'a [VideoReference],
    now: DateTime<Utc>,
) -> Vec<&'a VideoReference> {
    videos
        .iter()
        .filter(|video| video.is_active)
        .filter(|video| can_access(viewer, ContentRef::Video(video), now))
        .collect()
}
