mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{FakeDrive, InMemoryCatalog, remote_file};
use tierstream::database::catalog::{
    CatalogRepository, MembershipTier, MockCatalogRepository, RemoteFolder,
};
use tierstream::server::services::drive_services::{
    DriveError, FilePage, MockRemoteDriveClient,
};
use tierstream::server::services::folder_services::{FolderService, FolderServiceTrait};
use tierstream::server::services::sync_services::{
    FolderLocks, SyncOptions, SyncService, SyncServiceTrait, SyncStatus,
};

fn sync_service(catalog: &Arc<InMemoryCatalog>, drive: Arc<FakeDrive>) -> SyncService {
    SyncService::new(
        catalog.clone(),
        drive,
        FolderLocks::default(),
        100,
        Duration::from_secs(5),
    )
}

async fn folder(catalog: &Arc<InMemoryCatalog>) -> RemoteFolder {
    let folder = RemoteFolder::new("remote-folder", "Course A", MembershipTier::Vip);
    catalog.save_folder(&folder).await.unwrap();
    folder
}

#[tokio::test]
async fn create_every_video_on_first_sync() {
    let catalog = InMemoryCatalog::new();
    let folder = folder(&catalog).await;
    let sync = sync_service(&catalog, FakeDrive::with_files(&["A", "B", "C"]));

    let report = sync.sync_folder(&folder).await;

    assert_eq!(report.status, SyncStatus::Success);
    assert!(report.completed);
    assert_eq!(report.total_found, 3);
    assert_eq!(report.new_count, 3);
    assert_eq!(report.deleted_count, 0);

    let video = catalog.by_remote_id(&folder.id, "B").unwrap();
    assert_eq!(video.title, "B.mp4");
    assert_eq!(video.required_tier, MembershipTier::Vip);
    assert_eq!(video.size_bytes, Some(2048));
    assert_eq!(video.source_link, "https://drive.google.com/file/d/B/view");

    let stored = catalog.folder(&folder.id).unwrap();
    assert_eq!(stored.video_count, 3);
    assert!(stored.last_synced.is_some());
}

#[tokio::test]
async fn change_nothing_when_run_twice() {
    let catalog = InMemoryCatalog::new();
    let folder = folder(&catalog).await;
    let sync = sync_service(&catalog, FakeDrive::with_files(&["A", "B", "C"]));

    sync.sync_folder(&folder).await;
    let before = catalog.by_remote_id(&folder.id, "A").unwrap();
    let second = sync.sync_folder(&folder).await;

    assert_eq!(second.status, SyncStatus::Success);
    assert_eq!(second.new_count, 0);
    assert_eq!(second.updated_count, 0);
    assert_eq!(second.deleted_count, 0);
    assert_eq!(second.unchanged_count, 3);
    assert_eq!(catalog.video_count(), 3);
    assert_eq!(catalog.by_remote_id(&folder.id, "A").unwrap(), before);
}

#[tokio::test]
async fn soft_delete_vanished_and_create_new_videos() {
    let catalog = InMemoryCatalog::new();
    let folder = folder(&catalog).await;
    let drive = FakeDrive::with_files(&["A", "B", "C"]);
    let sync = sync_service(&catalog, drive.clone());
    sync.sync_folder(&folder).await;

    drive.set_files(&["B", "C", "D"]);
    let report = sync.sync_folder(&folder).await;

    assert_eq!(report.new_count, 1);
    assert_eq!(report.deleted_count, 1);
    assert_eq!(report.updated_count, 0);
    assert_eq!(report.total_found, 3);

    let removed = catalog.by_remote_id(&folder.id, "A").unwrap();
    assert!(!removed.is_active);
    assert!(removed.deleted_at.is_some());
    assert!(catalog.by_remote_id(&folder.id, "D").unwrap().is_active);
    assert_eq!(catalog.folder(&folder.id).unwrap().video_count, 3);
}

#[tokio::test]
async fn restore_a_video_that_comes_back() {
    let catalog = InMemoryCatalog::new();
    let folder = folder(&catalog).await;
    let drive = FakeDrive::with_files(&["A", "B"]);
    let sync = sync_service(&catalog, drive.clone());
    sync.sync_folder(&folder).await;

    drive.set_files(&["B"]);
    sync.sync_folder(&folder).await;
    drive.set_files(&["A", "B"]);
    let report = sync.sync_folder(&folder).await;

    assert_eq!(report.updated_count, 1);
    assert_eq!(report.new_count, 0);
    let restored = catalog.by_remote_id(&folder.id, "A").unwrap();
    assert!(restored.is_active);
    assert!(restored.deleted_at.is_none());
}

#[tokio::test]
async fn count_remote_edits_as_updates() {
    let catalog = InMemoryCatalog::new();
    let folder = folder(&catalog).await;
    let drive = FakeDrive::with_files(&["A", "B"]);
    let sync = sync_service(&catalog, drive.clone());
    sync.sync_folder(&folder).await;

    let mut renamed = remote_file("A");
    renamed.name = Some("Intro.mp4".to_string());
    drive.set_raw_files(vec![renamed, remote_file("B")]);
    let report = sync.sync_folder(&folder).await;

    assert_eq!(report.updated_count, 1);
    assert_eq!(report.unchanged_count, 1);
    assert_eq!(catalog.by_remote_id(&folder.id, "A").unwrap().title, "Intro.mp4");
}

#[tokio::test]
async fn walk_every_page() {
    let catalog = InMemoryCatalog::new();
    let folder = folder(&catalog).await;
    let drive = FakeDrive::with_files(&["A", "B", "C", "D", "E"]);
    let sync = SyncService::new(
        catalog.clone(),
        drive.clone(),
        FolderLocks::default(),
        2,
        Duration::from_secs(5),
    );

    let report = sync.sync_folder(&folder).await;

    assert_eq!(report.total_found, 5);
    assert_eq!(report.new_count, 5);
    assert_eq!(*drive.list_calls.lock().unwrap(), 3);
}

#[tokio::test]
async fn keep_going_past_a_bad_item() {
    let catalog = InMemoryCatalog::new();
    let folder = folder(&catalog).await;
    let drive = FakeDrive::with_files(&[]);
    let mut broken = remote_file("B");
    broken.size = Some("huge".to_string());
    drive.set_raw_files(vec![remote_file("A"), broken, remote_file("C")]);
    let sync = sync_service(&catalog, drive);

    let report = sync.sync_folder(&folder).await;

    assert_eq!(report.status, SyncStatus::PartialSuccess);
    assert_eq!(report.new_count, 2);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("B.mp4"));
    assert!(report.completed);
}

#[tokio::test]
async fn report_error_and_touch_nothing_when_folder_is_gone() {
    let catalog = InMemoryCatalog::new();
    let folder = folder(&catalog).await;

    let mut drive = MockRemoteDriveClient::new();
    drive
        .expect_list_files()
        .times(1)
        .returning(|folder_id, _, _, _| Err(DriveError::FolderNotFound(folder_id.to_string())));
    let sync = SyncService::new(
        catalog.clone(),
        Arc::new(drive),
        FolderLocks::default(),
        100,
        Duration::from_secs(5),
    );

    let report = sync.sync_folder(&folder).await;

    assert_eq!(report.status, SyncStatus::Error);
    assert_eq!(report.total_found, 0);
    assert_eq!(report.new_count, 0);
    assert_eq!(report.errors.len(), 1);
    assert!(catalog.folder(&folder.id).unwrap().last_synced.is_none());
}

#[tokio::test]
async fn keep_committed_pages_when_a_later_page_fails() {
    let catalog = InMemoryCatalog::new();
    let folder = folder(&catalog).await;

    // an older copy of X that the broken listing never reaches
    let seed = FakeDrive::with_files(&["X"]);
    sync_service(&catalog, seed).sync_folder(&folder).await;

    let mut drive = MockRemoteDriveClient::new();
    drive
        .expect_list_files()
        .withf(|_, _, token, _| token.is_none())
        .returning(|_, _, _, _| {
            Ok(FilePage {
                files: vec![remote_file("A"), remote_file("B")],
                next_page_token: Some("page-2".to_string()),
            })
        });
    drive
        .expect_list_files()
        .withf(|_, _, token, _| token.as_deref() == Some("page-2"))
        .returning(|_, _, _, _| Err(DriveError::Request("status 500".to_string())));
    let sync = SyncService::new(
        catalog.clone(),
        Arc::new(drive),
        FolderLocks::default(),
        2,
        Duration::from_secs(5),
    );

    let report = sync.sync_folder(&folder).await;

    assert_eq!(report.status, SyncStatus::PartialSuccess);
    assert!(!report.completed);
    assert_eq!(report.new_count, 2);
    assert_eq!(report.deleted_count, 0);
    assert!(catalog.by_remote_id(&folder.id, "A").is_some());
    assert!(catalog.by_remote_id(&folder.id, "X").unwrap().is_active);

    let stored = catalog.folder(&folder.id).unwrap();
    assert_eq!(stored.video_count, 1);
    assert!(stored.last_synced.is_some());
}

#[tokio::test]
async fn give_up_on_a_page_that_hangs() {
    let catalog = InMemoryCatalog::new();
    let folder = folder(&catalog).await;
    let drive = FakeDrive::with_files(&["A"]);
    drive.set_delay(Duration::from_millis(500));
    let sync = sync_service(&catalog, drive);

    let options = SyncOptions {
        page_size: 100,
        page_timeout: Duration::from_millis(20),
        deadline: None,
    };
    let report = sync.sync_folder_with(&folder, options).await;

    assert_eq!(report.status, SyncStatus::PartialSuccess);
    assert!(!report.completed);
    assert!(report.errors[0].contains("timed out"));
}

#[tokio::test]
async fn stop_at_an_expired_deadline() {
    let catalog = InMemoryCatalog::new();
    let folder = folder(&catalog).await;
    let drive = FakeDrive::with_files(&["A"]);
    let sync = sync_service(&catalog, drive.clone());

    let options = SyncOptions {
        page_size: 100,
        page_timeout: Duration::from_secs(5),
        deadline: Some(Instant::now()),
    };
    let report = sync.sync_folder_with(&folder, options).await;

    assert_eq!(report.status, SyncStatus::PartialSuccess);
    assert_eq!(*drive.list_calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn serialize_runs_for_the_same_folder() {
    let catalog = InMemoryCatalog::new();
    let folder = folder(&catalog).await;
    let sync = sync_service(&catalog, FakeDrive::with_files(&["A", "B", "C"]));

    let (first, second) = futures::join!(sync.sync_folder(&folder), sync.sync_folder(&folder));

    assert_eq!(first.new_count + second.new_count, 3);
    assert_eq!(catalog.video_count(), 3);
}

#[tokio::test]
async fn cut_a_slow_page_short_at_the_deadline() {
    let catalog = InMemoryCatalog::new();
    let folder = folder(&catalog).await;
    let drive = FakeDrive::with_files(&["A"]);
    drive.set_delay(Duration::from_secs(2));
    let sync = sync_service(&catalog, drive);

    let started = Instant::now();
    let options = SyncOptions {
        page_size: 100,
        page_timeout: Duration::from_secs(10),
        deadline: Some(Instant::now() + Duration::from_millis(50)),
    };
    let report = sync.sync_folder_with(&folder, options).await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(report.status, SyncStatus::PartialSuccess);
    assert!(!report.completed);
}

#[tokio::test]
async fn let_a_folder_delete_wait_for_the_running_sync() {
    let catalog = InMemoryCatalog::new();
    let folder = folder(&catalog).await;
    let drive = FakeDrive::with_files(&["A", "B"]);
    drive.set_delay(Duration::from_millis(200));
    let services = common::services(catalog.clone(), drive);

    let sync = services.sync.clone();
    let queued = folder.clone();
    let run = tokio::spawn(async move { sync.sync_folder(&queued).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let retired = services.folders.delete_folder(&folder.id, "1").await.unwrap();
    let report = run.await.unwrap();

    assert_eq!(report.status, SyncStatus::Success);
    assert_eq!(report.new_count, 2);
    assert_eq!(retired, 2);
    assert!(catalog.folder(&folder.id).is_none());
    assert!(catalog
        .all_videos()
        .iter()
        .all(|v| !v.is_active && v.folder_id.is_none()));
}

#[tokio::test]
async fn refuse_to_sync_a_deleted_folder() {
    let catalog = InMemoryCatalog::new();
    let folder = folder(&catalog).await;
    let drive = FakeDrive::with_files(&["A", "B"]);
    let services = common::services(catalog.clone(), drive.clone());
    services.folders.delete_folder(&folder.id, "1").await.unwrap();

    let report = services.sync.sync_folder(&folder).await;

    assert_eq!(report.status, SyncStatus::Error);
    assert_eq!(*drive.list_calls.lock().unwrap(), 0);
    assert_eq!(catalog.video_count(), 0);
    assert!(catalog.folder(&folder.id).is_none());
}

#[tokio::test]
async fn forget_the_lock_of_a_deleted_folder() {
    let catalog = InMemoryCatalog::new();
    let folder = folder(&catalog).await;
    let locks = FolderLocks::default();
    let sync = SyncService::new(
        catalog.clone(),
        FakeDrive::with_files(&["A"]),
        locks.clone(),
        100,
        Duration::from_secs(5),
    );
    let folders = FolderService::new(catalog.clone(), common::audit(), locks.clone());

    sync.sync_folder(&folder).await;
    assert_eq!(locks.tracked(), 1);

    folders.delete_folder(&folder.id, "1").await.unwrap();
    assert_eq!(locks.tracked(), 0);
}

#[tokio::test]
async fn keep_a_video_whose_save_failed_out_of_the_removals() {
    let folder = RemoteFolder::new("remote-folder", "Course A", MembershipTier::Vip);

    let mut catalog = MockCatalogRepository::new();
    let stored = folder.clone();
    catalog
        .expect_get_folder()
        .times(2)
        .returning(move |_| Ok(Some(stored.clone())));
    catalog
        .expect_active_remote_ids()
        .returning(|_| Ok(["A", "B"].into_iter().map(String::from).collect()));
    catalog
        .expect_find_video_by_remote_id()
        .returning(|_, _| Ok(None));
    catalog
        .expect_save_video()
        .withf(|video| video.remote_file_id.as_deref() == Some("B"))
        .returning(|_| Err(anyhow::anyhow!("write refused")));
    catalog
        .expect_save_video()
        .withf(|video| video.remote_file_id.as_deref() == Some("A"))
        .times(1)
        .returning(|_| Ok(()));
    catalog.expect_soft_delete_remote_ids().never();
    catalog
        .expect_save_folder()
        .withf(|saved| saved.video_count == 2 && saved.last_synced.is_some())
        .times(1)
        .returning(|_| Ok(()));

    let sync = SyncService::new(
        Arc::new(catalog),
        FakeDrive::with_files(&["A", "B"]),
        FolderLocks::default(),
        100,
        Duration::from_secs(5),
    );
    let report = sync.sync_folder(&folder).await;

    assert_eq!(report.status, SyncStatus::PartialSuccess);
    assert!(report.completed);
    assert_eq!(report.new_count, 1);
    assert_eq!(report.deleted_count, 0);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("B.mp4"));
}
