use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use campfire_client::activities::ActivityWatch;
use campfire_client::view::ViewState;
use campfire_client::{
    ActivityEntry, ActivityTime, Backend, Campfire, Error, IdentityCache, LocalServer, RealtimeDb,
    SessionId, Subscription,
};
use campfire_types::paths::{NodePath, ObjectPath};

async fn server() -> (tempfile::TempDir, LocalServer) {
    let dir = tempfile::tempdir().unwrap();
    let server = LocalServer::open(dir.path()).await.unwrap();
    (dir, server)
}

async fn client(server: &LocalServer) -> (Campfire, String) {
    let app = Campfire::new(server.backend(), IdentityCache::in_memory().unwrap());
    let uid = app.sign_in().await.unwrap();
    (app, uid)
}

fn sid(s: &str) -> SessionId {
    SessionId::parse(s).unwrap()
}

/// Wait for the first emission satisfying `pred`.
async fn next_matching(
    watch: &mut ActivityWatch,
    pred: impl Fn(&[ActivityEntry]) -> bool,
) -> Vec<ActivityEntry> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let entries = watch.next().await.expect("watch ended").expect("watch failed");
            if pred(entries.as_slice()) {
                return entries;
            }
        }
    })
    .await
    .expect("no matching emission")
}

#[tokio::test]
async fn shared_session_round_trip() {
    let (_dir, server) = server().await;
    let (alice, _) = client(&server).await;
    let (bob, _) = client(&server).await;
    let camp = sid("camp21");

    alice.directory().create_session(&camp).await.unwrap();
    bob.directory().import_session(&camp).await.unwrap();
    assert_eq!(bob.identity().current_session().unwrap().as_deref(), Some("camp21"));

    let mut bob_view = bob.activities().subscribe(&camp).await.unwrap();
    next_matching(&mut bob_view, |e| e.is_empty()).await;

    let key = alice
        .activities()
        .add_activity(&camp, ActivityTime::new(9, 0).unwrap(), "Hike")
        .await
        .unwrap();

    let seen = next_matching(&mut bob_view, |e| !e.is_empty()).await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].key, key);
    assert_eq!(seen[0].time, "09:00");
    assert_eq!(seen[0].activity, "Hike");

    alice.activities().delete_activity(&camp, &key).await.unwrap();
    next_matching(&mut bob_view, |e| e.is_empty()).await;
}

#[tokio::test]
async fn create_and_import_preconditions() {
    let (_dir, server) = server().await;
    let (alice, alice_uid) = client(&server).await;
    let (bob, _) = client(&server).await;
    let camp = sid("camp21");

    assert!(!alice.directory().session_exists(&camp).await.unwrap());
    assert!(matches!(
        bob.directory().import_session(&camp).await,
        Err(Error::SessionNotFound)
    ));

    alice.directory().create_session(&camp).await.unwrap();
    assert!(alice.directory().session_exists(&camp).await.unwrap());
    assert_eq!(
        bob.directory().get_creator(&camp).await.unwrap(),
        Some(alice_uid.clone())
    );

    let err = bob.directory().create_session(&camp).await.unwrap_err();
    assert!(matches!(err, Error::SessionTaken));
    assert_eq!(err.to_string(), "Session with the given name already exists");
    // The failed create wrote nothing.
    assert_eq!(bob.directory().get_creator(&camp).await.unwrap(), Some(alice_uid));
    assert_eq!(bob.identity().current_session().unwrap(), None);
}

#[tokio::test]
async fn racing_creators_have_one_winner() {
    let (_dir, server) = server().await;
    let (alice, _) = client(&server).await;
    let (bob, _) = client(&server).await;
    let camp = sid("camp21");

    let alice_dir = alice.directory();
    let bob_dir = bob.directory();
    let (a, b) = tokio::join!(
        alice_dir.create_session(&camp),
        bob_dir.create_session(&camp)
    );
    assert!(a.is_ok() ^ b.is_ok());
    assert!(matches!(a.err().or(b.err()), Some(Error::SessionTaken)));
}

#[tokio::test]
async fn every_added_activity_is_listed_once() {
    let (_dir, server) = server().await;
    let (alice, _) = client(&server).await;
    let camp = sid("camp21");
    alice.directory().create_session(&camp).await.unwrap();

    let feed = alice.activities();
    let mut keys = Vec::new();
    for minute in 0..5 {
        let time = ActivityTime::new(10, minute).unwrap();
        keys.push(feed.add_activity(&camp, time, "Swim").await.unwrap());
    }

    let mut watch = feed.subscribe(&camp).await.unwrap();
    let listed = next_matching(&mut watch, |e| e.len() == 5).await;
    let listed_keys: Vec<String> = listed.iter().map(|e| e.key.clone()).collect();
    assert_eq!(listed_keys, keys);
    assert_eq!(listed[4].time, "10:04");

    feed.delete_activity(&camp, &keys[2]).await.unwrap();
    let after = next_matching(&mut watch, |e| e.len() == 4).await;
    assert!(after.iter().all(|e| e.key != keys[2]));

    assert!(matches!(
        feed.add_activity(&camp, ActivityTime::new(11, 0).unwrap(), "   ").await,
        Err(Error::Validation(_))
    ));

    feed.add_activity(&camp, ActivityTime::new(12, 0).unwrap(), "  Lunch by the lake ")
        .await
        .unwrap();
    let typed = next_matching(&mut watch, |e| e.len() == 5).await;
    assert_eq!(typed[4].activity, "  Lunch by the lake ");
}

#[tokio::test]
async fn only_the_creator_can_edit() {
    let (_dir, server) = server().await;
    let (alice, _) = client(&server).await;
    let (bob, _) = client(&server).await;
    let camp = sid("camp21");

    alice.directory().create_session(&camp).await.unwrap();
    bob.directory().import_session(&camp).await.unwrap();

    let mut alice_view = alice.session_view();
    assert_eq!(alice_view.state(), &ViewState::Unresolved);
    alice_view.focus().await.unwrap();
    assert!(alice_view.can_edit());
    assert_eq!(alice_view.require_edit().unwrap(), &camp);

    let mut bob_view = bob.session_view();
    bob_view.focus().await.unwrap();
    assert_eq!(bob_view.session().unwrap().id, camp);
    assert!(!bob_view.can_edit());
    assert!(matches!(bob_view.require_edit(), Err(Error::NotCreator)));

    let denied = bob
        .activities()
        .add_activity(&camp, ActivityTime::new(9, 0).unwrap(), "Sneaky")
        .await;
    assert!(matches!(denied, Err(Error::PermissionDenied(_))));

    let denied = bob.gallery().upload_image_bytes(&camp, "sneaky", vec![1]).await;
    assert!(matches!(denied, Err(Error::PermissionDenied(_))));
}

#[tokio::test]
async fn session_view_follows_the_current_session() {
    let (_dir, server) = server().await;
    let (alice, _) = client(&server).await;

    let mut view = alice.session_view();
    view.focus().await.unwrap();
    assert_eq!(view.state(), &ViewState::Resolved { session: None });
    assert!(view.activities().is_none());

    alice.directory().create_session(&sid("camp21")).await.unwrap();
    alice.directory().create_session(&sid("lake")).await.unwrap();
    view.focus().await.unwrap();
    assert_eq!(view.session().unwrap().id, sid("lake"));

    view.switch_session(&sid("camp21")).await.unwrap();
    assert_eq!(view.session().unwrap().id, sid("camp21"));
    assert!(view.can_edit());

    let watch = view.activities().unwrap();
    let first = watch.next().await.unwrap().unwrap();
    assert!(first.is_empty());
}

#[tokio::test]
async fn membership_lists_each_session_once() {
    let (_dir, server) = server().await;
    let (alice, _) = client(&server).await;
    let (bob, bob_uid) = client(&server).await;

    alice.directory().create_session(&sid("camp21")).await.unwrap();
    alice.directory().create_session(&sid("lake")).await.unwrap();
    for id in ["camp21", "lake", "camp21"] {
        bob.directory().import_session(&sid(id)).await.unwrap();
    }

    let mut sessions = bob.membership().list_sessions(&bob_uid).await.unwrap();
    let listed = tokio::time::timeout(Duration::from_secs(5), sessions.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(listed, vec![sid("camp21"), sid("lake")]);

    // Writing someone else's list is refused.
    let err = alice.membership().join_session(&bob_uid, &sid("lake")).await;
    assert!(matches!(err, Err(Error::PermissionDenied(_))));
}

#[tokio::test]
async fn image_upload_list_delete() {
    let (_dir, server) = server().await;
    let (alice, _) = client(&server).await;
    let (bob, _) = client(&server).await;
    let camp = sid("camp21");
    alice.directory().create_session(&camp).await.unwrap();

    let gallery = alice.gallery();
    let entry = gallery
        .upload_image_bytes(&camp, "sunset", b"jpeg bytes".to_vec())
        .await
        .unwrap();

    let listed = bob.gallery().list_images(&camp).await.unwrap();
    assert_eq!(listed, vec![entry.clone()]);
    assert_eq!(
        server.resolve_download(&entry.download_url).await.unwrap().as_deref(),
        Some(&b"jpeg bytes"[..])
    );

    let dup = gallery.upload_image_bytes(&camp, "sunset", b"other".to_vec()).await;
    assert!(matches!(dup, Err(Error::ImageNameTaken(name)) if name == "sunset"));
    // The rejected duplicate did not touch the stored blob.
    assert!(server.resolve_download(&entry.download_url).await.unwrap().is_some());

    gallery.delete_image(&camp, "sunset", &entry.key).await.unwrap();
    assert!(gallery.list_images(&camp).await.unwrap().is_empty());
    assert_eq!(server.resolve_download(&entry.download_url).await.unwrap(), None);

    // Deleting again finds nothing and is still fine.
    gallery.delete_image(&camp, "sunset", &entry.key).await.unwrap();

    let empty = gallery.upload_image_bytes(&camp, "blank", Vec::new()).await;
    assert!(matches!(empty, Err(Error::Validation(_))));
    assert!(gallery.list_images(&camp).await.unwrap().is_empty());
}

#[tokio::test]
async fn image_upload_from_file() {
    let (dir, server) = server().await;
    let (alice, _) = client(&server).await;
    let camp = sid("camp21");
    alice.directory().create_session(&camp).await.unwrap();

    let file = dir.path().join("picked.jpg");
    std::fs::write(&file, b"from disk").unwrap();

    let mut watch = alice.gallery().subscribe(&camp).await.unwrap();
    assert!(watch.next().await.unwrap().unwrap().is_empty());

    alice.gallery().upload_image(&camp, "picked", &file).await.unwrap();
    let images = tokio::time::timeout(Duration::from_secs(5), watch.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].name, "picked");

    let missing = alice
        .gallery()
        .upload_image(&camp, "ghost", &dir.path().join("nope.jpg"))
        .await;
    assert!(matches!(missing, Err(Error::LocalStorage(_))));
}

/// Realtime tree whose pushes always fail.
struct PushFails(Arc<dyn RealtimeDb>);

#[async_trait]
impl RealtimeDb for PushFails {
    async fn get(&self, path: &NodePath) -> campfire_client::Result<Option<Value>> {
        self.0.get(path).await
    }
    async fn set(&self, path: &NodePath, value: Value) -> campfire_client::Result<()> {
        self.0.set(path, value).await
    }
    async fn push(&self, _path: &NodePath, _value: Value) -> campfire_client::Result<String> {
        Err(Error::Backend("tree unavailable".into()))
    }
    async fn remove(&self, path: &NodePath) -> campfire_client::Result<()> {
        self.0.remove(path).await
    }
    async fn set_if_absent(&self, path: &NodePath, value: Value) -> campfire_client::Result<bool> {
        self.0.set_if_absent(path, value).await
    }
    async fn subscribe(&self, path: &NodePath) -> campfire_client::Result<Subscription> {
        self.0.subscribe(path).await
    }
}

#[tokio::test]
async fn failed_metadata_write_removes_the_blob() {
    let (_dir, server) = server().await;
    let (alice, _) = client(&server).await;
    let camp = sid("camp21");
    alice.directory().create_session(&camp).await.unwrap();

    let real = alice.backend().clone();
    let flaky = Campfire::new(
        Backend {
            db: Arc::new(PushFails(real.db.clone())),
            storage: real.storage.clone(),
            auth: real.auth.clone(),
        },
        IdentityCache::in_memory().unwrap(),
    );

    let err = flaky
        .gallery()
        .upload_image_bytes(&camp, "sunset", b"x".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Backend(_)));

    let object = ObjectPath::image(&camp, "sunset").unwrap();
    assert_eq!(real.storage.download_url(&object).await.unwrap(), None);
    assert!(alice.gallery().list_images(&camp).await.unwrap().is_empty());
}

/// Reads under `sessions/broken` fail, everything else passes through.
struct BrokenSessionReads(Arc<dyn RealtimeDb>);

impl BrokenSessionReads {
    fn check(path: &NodePath) -> campfire_client::Result<()> {
        if path.as_str().starts_with("sessions/broken") {
            return Err(Error::Backend("network down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RealtimeDb for BrokenSessionReads {
    async fn get(&self, path: &NodePath) -> campfire_client::Result<Option<Value>> {
        Self::check(path)?;
        self.0.get(path).await
    }
    async fn set(&self, path: &NodePath, value: Value) -> campfire_client::Result<()> {
        self.0.set(path, value).await
    }
    async fn push(&self, path: &NodePath, value: Value) -> campfire_client::Result<String> {
        self.0.push(path, value).await
    }
    async fn remove(&self, path: &NodePath) -> campfire_client::Result<()> {
        self.0.remove(path).await
    }
    async fn set_if_absent(&self, path: &NodePath, value: Value) -> campfire_client::Result<bool> {
        self.0.set_if_absent(path, value).await
    }
    async fn subscribe(&self, path: &NodePath) -> campfire_client::Result<Subscription> {
        Self::check(path)?;
        self.0.subscribe(path).await
    }
}

#[tokio::test]
async fn failed_switch_keeps_the_previous_session_live() {
    let (_dir, server) = server().await;
    let (alice, _) = client(&server).await;
    let camp = sid("camp21");
    alice.directory().create_session(&camp).await.unwrap();

    let real = alice.backend().clone();
    let flaky = Campfire::new(
        Backend {
            db: Arc::new(BrokenSessionReads(real.db.clone())),
            storage: real.storage.clone(),
            auth: real.auth.clone(),
        },
        alice.identity().clone(),
    );

    let mut view = flaky.session_view();
    view.focus().await.unwrap();
    assert_eq!(view.session().unwrap().id, camp);

    let err = view.switch_session(&sid("broken")).await.unwrap_err();
    assert!(matches!(err, Error::Backend(_)));
    assert_eq!(view.session().unwrap().id, camp);
    assert!(view.activities().is_some());
    assert!(view.images().is_some());

    view.switch_session(&camp).await.unwrap();
    assert_eq!(view.session().unwrap().id, camp);
    assert!(view.can_edit());

    let watch = view.activities().expect("live activity list");
    let first = watch.next().await.unwrap().unwrap();
    assert!(first.is_empty());
}

#[tokio::test]
async fn sign_in_is_remembered() {
    let (_dir, server) = server().await;
    let cache = IdentityCache::in_memory().unwrap();

    let first = Campfire::new(server.backend(), cache.clone());
    let uid = first.sign_in().await.unwrap();
    assert_eq!(cache.current_user().unwrap().as_deref(), Some(uid.as_str()));

    let again = Campfire::new(server.backend(), cache);
    assert_eq!(again.sign_in().await.unwrap(), uid);
    assert_eq!(again.current_user(), Some(uid));
}
