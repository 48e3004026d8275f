pub mod app_services;
pub mod audit_services;
pub mod drive_services;
pub mod folder_services;
pub mod playback_services;
pub mod sync_services;

pub use audit_services::DynAuditSink;
pub use drive_services::DynRemoteDriveClient;
pub use folder_services::DynFolderService;
pub use playback_services::DynPlaybackService;
pub use sync_services::DynSyncService;
