use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::database::catalog::MembershipTier;
use crate::server::services::sync_services::SyncReport;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateFolderRequest {
    /// drive folder url or bare id
    #[validate(length(min = 1, max = 512))]
    pub remote: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    pub required_tier: MembershipTier,
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetParentRequest {
    #[validate(length(min = 1, max = 64))]
    pub parent_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteFolderResponse {
    pub folder_id: String,
    pub retired_videos: u64,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub message: String,
    #[serde(flatten)]
    pub report: SyncReport,
}

impl From<SyncReport> for SyncResponse {
    fn from(report: SyncReport) -> Self {
        let mut message = format!(
            "synced {} videos ({} new, {} updated, {} deleted)",
            report.total_found, report.new_count, report.updated_count, report.deleted_count
        );
        if !report.errors.is_empty() {
            message.push_str(&format!(" with {} errors", report.errors.len()));
        }

        Self { message, report }
    }
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}
