use axum::{
    Json, Router,
    extract::{Path, Query},
    routing::{delete, get, post, put},
};
use serde_json::json;
use tracing::info;

use crate::config::SiteSettings;
use crate::database::catalog::RemoteFolder;
use crate::server::{
    dtos::{
        folder_dto::{
            AuditQuery, CreateFolderRequest, DeleteFolderResponse, SetParentRequest, SyncResponse,
        },
        settings_dto::UpdateSettingsRequest,
    },
    error::AppResult,
    extractors::{AdminViewer, ValidatedJson},
    services::{
        audit_services::{AuditAction, AuditEntry, record_in_background},
        sync_services::SyncStatus,
    },
};

const DEFAULT_AUDIT_LIMIT: usize = 100;
const MAX_AUDIT_LIMIT: usize = 1_000;

pub struct AdminController;

impl AdminController {
    pub fn app() -> Router {
        Router::new()
            .route("/folders", post(Self::create_folder))
            .route("/folders/{id}", delete(Self::delete_folder))
            .route("/folders/{id}/parent", put(Self::set_parent))
            .route("/folders/{id}/sync", post(Self::sync_folder))
            .route("/settings", get(Self::get_settings).put(Self::update_settings))
            .route("/audit", get(Self::recent_audit))
    }

    async fn create_folder(
        AdminViewer {
            admin, services, ..
        }: AdminViewer,
        ValidatedJson(request): ValidatedJson<CreateFolderRequest>,
    ) -> AppResult<Json<RemoteFolder>> {
        let folder = services
            .folders
            .create_folder(
                &request.remote,
                &request.name,
                request.required_tier,
                request.parent_id,
                &admin.user_id.to_string(),
            )
            .await?;

        Ok(Json(folder))
    }

    async fn set_parent(
        AdminViewer {
            admin, services, ..
        }: AdminViewer,
        Path(folder_id): Path<String>,
        ValidatedJson(request): ValidatedJson<SetParentRequest>,
    ) -> AppResult<Json<RemoteFolder>> {
        let folder = services
            .folders
            .set_parent(&folder_id, request.parent_id, &admin.user_id.to_string())
            .await?;

        Ok(Json(folder))
    }

    async fn delete_folder(
        AdminViewer {
            admin, services, ..
        }: AdminViewer,
        Path(folder_id): Path<String>,
    ) -> AppResult<Json<DeleteFolderResponse>> {
        let retired_videos = services
            .folders
            .delete_folder(&folder_id, &admin.user_id.to_string())
            .await?;

        Ok(Json(DeleteFolderResponse {
            folder_id,
            retired_videos,
        }))
    }

    async fn sync_folder(
        AdminViewer {
            admin,
            ip,
            services,
        }: AdminViewer,
        Path(folder_id): Path<String>,
    ) -> AppResult<Json<SyncResponse>> {
        let folder = services.folders.get_folder(&folder_id).await?;
        let report = services.sync.sync_folder(&folder).await;

        let details = json!({
            "total_videos": report.total_found,
            "new_videos": report.new_count,
            "updated_videos": report.updated_count,
            "deleted_videos": report.deleted_count,
            "sync_duration": report.duration_secs,
            "errors": (!report.errors.is_empty()).then(|| report.errors.clone()),
        });

        record_in_background(
            &services.audit,
            AuditEntry::new(
                admin.user_id.to_string(),
                AuditAction::FolderSync,
                format!("synced folder: {} {}", folder.name, details),
            )
            .with_ip(ip.as_deref())
            .with_status(report.status.as_str()),
        );

        if report.status == SyncStatus::Error {
            info!("sync of folder {} failed: {:?}", folder.id, report.errors);
        }

        Ok(Json(SyncResponse::from(report)))
    }

    async fn get_settings(AdminViewer { services, .. }: AdminViewer) -> Json<SiteSettings> {
        Json(services.settings.read().await.clone())
    }

    async fn update_settings(
        AdminViewer {
            admin,
            ip,
            services,
        }: AdminViewer,
        ValidatedJson(request): ValidatedJson<UpdateSettingsRequest>,
    ) -> AppResult<Json<SiteSettings>> {
        let settings = SiteSettings::from(request);

        // swapped as a whole, readers only ever see one version
        *services.settings.write().await = settings.clone();
        info!(
            "site settings replaced by user {} (maintenance: {})",
            admin.user_id, settings.maintenance_mode
        );

        record_in_background(
            &services.audit,
            AuditEntry::new(
                admin.user_id.to_string(),
                AuditAction::SettingsUpdate,
                format!("updated site settings: maintenance={}", settings.maintenance_mode),
            )
            .with_ip(ip.as_deref()),
        );

        Ok(Json(settings))
    }

    async fn recent_audit(
        AdminViewer { services, .. }: AdminViewer,
        Query(query): Query<AuditQuery>,
    ) -> Json<Vec<AuditEntry>> {
        let limit = query
            .limit
            .unwrap_or(DEFAULT_AUDIT_LIMIT)
            .min(MAX_AUDIT_LIMIT);
        Json(services.audit.recent(limit).await)
    }
}
