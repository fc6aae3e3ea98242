use std::sync::Arc;
use std::time::Duration;

use campfire_api::auth::{AppState, AppStateInner};
use campfire_api::routes::router;
use campfire_client::activities::ActivityWatch;
use campfire_client::{ActivityEntry, ActivityTime, Campfire, Error, IdentityCache, RemoteBackend, SessionId};
use campfire_db::Database;
use campfire_gateway::dispatcher::Dispatcher;
use campfire_storage::Storage;

/// Serve the full API on an ephemeral port. Returns its base URL.
async fn start_server() -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let storage = Storage::new(dir.path().join("objects"), &base).await.unwrap();
    let state: AppState = Arc::new(AppStateInner {
        db: Arc::new(Database::open_in_memory().unwrap()),
        storage: Arc::new(storage),
        dispatcher: Dispatcher::new(),
        jwt_secret: "remote-test-secret".to_string(),
    });
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    (dir, base)
}

async fn next(watch: &mut ActivityWatch) -> Vec<ActivityEntry> {
    tokio::time::timeout(Duration::from_secs(5), watch.next())
        .await
        .expect("no emission")
        .expect("watch ended")
        .expect("watch failed")
}

async fn client(base: &str) -> Campfire {
    let backend = RemoteBackend::new(base).unwrap().into_backend();
    let app = Campfire::new(backend, IdentityCache::in_memory().unwrap());
    app.sign_in().await.unwrap();
    app
}

#[tokio::test]
async fn two_devices_share_a_session_over_the_network() {
    let (_dir, base) = start_server().await;
    let alice = client(&base).await;
    let bob = client(&base).await;
    let camp = SessionId::parse("camp21").unwrap();

    alice.directory().create_session(&camp).await.unwrap();
    assert!(matches!(
        bob.directory().create_session(&camp).await,
        Err(Error::SessionTaken)
    ));
    bob.directory().import_session(&camp).await.unwrap();

    let mut watch = bob.activities().subscribe(&camp).await.unwrap();
    assert!(next(&mut watch).await.is_empty());

    let key = alice
        .activities()
        .add_activity(&camp, ActivityTime::new(9, 0).unwrap(), "Hike")
        .await
        .unwrap();
    let seen = next(&mut watch).await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].key, key);
    assert_eq!(seen[0].time, "09:00");

    let denied = bob.activities().delete_activity(&camp, &key).await;
    assert!(matches!(denied, Err(Error::PermissionDenied(_))));

    alice.activities().delete_activity(&camp, &key).await.unwrap();
    assert!(next(&mut watch).await.is_empty());
}

#[tokio::test]
async fn images_download_through_their_url() {
    let (_dir, base) = start_server().await;
    let alice = client(&base).await;
    let camp = SessionId::parse("camp 21").unwrap();
    alice.directory().create_session(&camp).await.unwrap();

    let entry = alice
        .gallery()
        .upload_image_bytes(&camp, "sunset", b"jpeg bytes".to_vec())
        .await
        .unwrap();
    assert!(entry.download_url.starts_with(&format!("{}/objects/", base)));

    let body = reqwest::get(&entry.download_url).await.unwrap();
    assert!(body.status().is_success());
    assert_eq!(&body.bytes().await.unwrap()[..], b"jpeg bytes");

    alice
        .gallery()
        .delete_image(&camp, "sunset", &entry.key)
        .await
        .unwrap();
    assert!(alice.gallery().list_images(&camp).await.unwrap().is_empty());

    let gone = reqwest::get(&entry.download_url).await.unwrap();
    assert_eq!(gone.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cached_token_resumes_the_same_user() {
    let (_dir, base) = start_server().await;
    let cache = IdentityCache::in_memory().unwrap();

    let first = Campfire::new(RemoteBackend::new(&base).unwrap().into_backend(), cache.clone());
    let uid = first.sign_in().await.unwrap();
    assert!(cache.auth_token().unwrap().is_some());

    let second = Campfire::new(RemoteBackend::new(&base).unwrap().into_backend(), cache);
    assert_eq!(second.sign_in().await.unwrap(), uid);
}
