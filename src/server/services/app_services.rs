use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::RwLock;
use tracing::info;

use crate::{
    config::{AppConfig, SharedSettings, SiteSettings},
    database::{RedisDatabase, catalog::DynCatalogRepository},
    server::utils::{
        session_utils::SessionKeys, signature_utils::SignatureUtil,
        token_utils::PlaybackTokenCipher,
    },
};

use super::{
    audit_services::{DynAuditSink, RedisAuditSink},
    drive_services::{DynRemoteDriveClient, GoogleDriveClient},
    folder_services::{DynFolderService, FolderService},
    playback_services::{DynPlaybackService, PlaybackService},
    sync_services::{DynSyncService, FolderLocks, SyncService},
};

/// everything a handler can reach, cloned into each request through an extension
#[derive(Clone)]
pub struct AppServices {
    pub repository: DynCatalogRepository,
    pub playback: DynPlaybackService,
    pub sync: DynSyncService,
    pub folders: DynFolderService,
    pub audit: DynAuditSink,
    pub sessions: Arc<SessionKeys>,
    pub settings: SharedSettings,
    pub redis: Option<Arc<RedisDatabase>>,
    pub metrics: Option<PrometheusHandle>,
    pub config: Arc<AppConfig>,
}

impl AppServices {
    pub fn new(redis_db: RedisDatabase, config: Arc<AppConfig>, metrics: Option<PrometheusHandle>) -> Self {
        info!("starting services...");

        let redis = Arc::new(redis_db);
        let repository = redis.clone() as DynCatalogRepository;
        let audit = Arc::new(RedisAuditSink::new(redis.clone())) as DynAuditSink;
        let drive = Arc::new(GoogleDriveClient::new(
            &config.drive_api_base,
            config.drive_access_token.clone(),
        )) as DynRemoteDriveClient;

        if config.drive_access_token.is_none() {
            info!("no drive access token configured, folder sync will be refused");
        }

        let mut services = Self::with_backends(repository, drive, audit, config);
        services.redis = Some(redis);
        services.metrics = metrics;
        services
    }

    /// wires the services over arbitrary backends, used by `new` and by tests
    pub fn with_backends(
        repository: DynCatalogRepository,
        drive: DynRemoteDriveClient,
        audit: DynAuditSink,
        config: Arc<AppConfig>,
    ) -> Self {
        // key material is derived once here and only read afterwards
        let tokens = Arc::new(PlaybackTokenCipher::new(&config.playback_token_secret));
        let grants = Arc::new(SignatureUtil::new(config.provider_grant_secret.clone()));
        let sessions = Arc::new(SessionKeys::new(&config.session_secret));
        info!("token keys ok, starting remaining services...");

        let settings: SharedSettings = Arc::new(RwLock::new(SiteSettings::from_config(&config)));

        let playback = Arc::new(PlaybackService::new(
            repository.clone(),
            drive.clone(),
            audit.clone(),
            tokens,
            grants,
            settings.clone(),
            &config.public_base_url,
            config.token_ttl_minutes,
        )) as DynPlaybackService;

        let locks = FolderLocks::default();
        let sync = Arc::new(SyncService::new(
            repository.clone(),
            drive,
            locks.clone(),
            config.page_size(),
            Duration::from_secs(config.sync_page_timeout_secs),
        )) as DynSyncService;

        let folders = Arc::new(FolderService::new(repository.clone(), audit.clone(), locks))
            as DynFolderService;

        Self {
            repository,
            playback,
            sync,
            folders,
            audit,
            sessions,
            settings,
            redis: None,
            metrics: None,
            config,
        }
    }
}
