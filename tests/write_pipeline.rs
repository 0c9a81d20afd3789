mod support;

use base64::{Engine, engine::general_purpose::STANDARD};
use gitfolio::application::auth::AuthError;
use gitfolio::application::store::LocalMirror;
use gitfolio::application::writer::WriteError;
use gitfolio::domain::site_config::SiteConfigPatch;
use gitfolio::domain::works::{WorkCategory, WorkItemInput};
use serde_json::json;

use support::{ADMIN_HANDLE, ADMIN_SESSION, Harness, OTHER_HANDLE, OTHER_SESSION};

const CONFIG: &str = ".obsidian-log/config.json";
const ICON: &str = ".obsidian-log/author-icon.png";

fn title_patch(title: &str) -> SiteConfigPatch {
    SiteConfigPatch {
        site_title: Some(title.to_string()),
        ..SiteConfigPatch::default()
    }
}

#[tokio::test]
async fn write_replaces_the_revision_it_read() {
    let harness = Harness::new();
    let before = harness.store.revision(CONFIG).expect("seeded");

    let receipt = harness
        .app
        .settings
        .update(ADMIN_SESSION, None, title_patch("Renamed"))
        .await
        .expect("config written");

    let after = harness.store.revision(CONFIG).expect("still present");
    assert_ne!(before, after);
    assert_eq!(receipt.revision, after);
    assert_eq!(receipt.attempts, 1);

    let stored = harness.store.json(CONFIG);
    assert_eq!(stored["site_title"], "Renamed");
    // Untouched fields survive the whole-document rewrite.
    assert_eq!(stored["site_subtitle"], "Things I wrote down");
    assert_eq!(stored["admins"], json!([ADMIN_HANDLE]));
    assert_eq!(stored["github_repo_url"], "https://github.com/octo/notes");
}

#[tokio::test]
async fn title_change_shows_on_the_next_home_page() {
    let harness = Harness::new();
    harness.store.seed_json(
        "scraps/hello.json",
        json!({ "title": "Hello", "created_at": "2024-05-01T00:00:00Z" }),
    );

    let home = harness.app.content.home_page().await;
    assert_eq!(home.site_title, "Field Notes");
    assert_eq!(home.scraps.len(), 1);
    let scrap = harness.app.content.scrap("hello").await.expect("scrap");
    assert_eq!(scrap.scrap.title, "Hello");

    // Changed behind the cache's back; only the TTL can surface it.
    harness.store.seed_json(
        "scraps/hello.json",
        json!({ "title": "Edited", "created_at": "2024-05-01T00:00:00Z" }),
    );

    harness
        .app
        .settings
        .update(ADMIN_SESSION, None, title_patch("Renamed"))
        .await
        .expect("config written");

    assert_eq!(harness.app.content.home_page().await.site_title, "Renamed");
    assert_eq!(harness.app.content.config().await.site_title, "Renamed");
    let scrap = harness.app.content.scrap("hello").await.expect("scrap");
    assert_eq!(scrap.scrap.title, "Hello");
}

#[tokio::test]
async fn malformed_repository_url_fails_before_any_remote_call() {
    let harness = Harness::new();
    let patch = SiteConfigPatch {
        github_repo_url: Some("https://gitlab.com/octo/notes".to_string()),
        ..SiteConfigPatch::default()
    };

    let err = harness
        .app
        .settings
        .update(ADMIN_SESSION, None, patch)
        .await
        .expect_err("rejected");

    assert!(matches!(err, WriteError::Validation(_)));
    assert_eq!(harness.identity.calls(), 0);
    assert_eq!(harness.store.reads(), 0);
    assert_eq!(harness.store.writes(), 0);
}

#[tokio::test]
async fn non_admin_is_rejected_without_touching_the_store() {
    let harness = Harness::new();

    let err = harness
        .app
        .settings
        .update(OTHER_SESSION, None, title_patch("Mine now"))
        .await
        .expect_err("rejected");

    assert_eq!(err, WriteError::Unauthorized(AuthError::NotAuthorized));
    assert_eq!(err.to_string(), "not authorized");
    assert_eq!(harness.store.writes(), 0);
    assert_eq!(harness.store.json(CONFIG)["site_title"], "Field Notes");
}

#[tokio::test]
async fn allow_list_change_applies_to_the_next_authorization() {
    let harness = Harness::new();
    assert_eq!(
        harness.app.gate.authorize(OTHER_SESSION).await.map(|_| ()),
        Err(AuthError::NotAuthorized)
    );

    let patch = SiteConfigPatch {
        admins: Some(vec![ADMIN_HANDLE.to_string(), OTHER_HANDLE.to_string()]),
        ..SiteConfigPatch::default()
    };
    harness
        .app
        .settings
        .update(ADMIN_SESSION, None, patch)
        .await
        .expect("config written");

    let authorized = harness
        .app
        .gate
        .authorize(OTHER_SESSION)
        .await
        .expect("now an admin");
    assert_eq!(authorized.handle(), OTHER_HANDLE);
}

#[tokio::test]
async fn conflicts_are_retried_with_a_fresh_revision() {
    let harness = Harness::new();
    harness.store.lose_next_races(2);

    let receipt = harness
        .app
        .settings
        .update(ADMIN_SESSION, None, title_patch("Third time"))
        .await
        .expect("written on the third attempt");

    assert_eq!(receipt.attempts, 3);
    assert_eq!(harness.store.writes(), 3);
    assert_eq!(harness.store.json(CONFIG)["site_title"], "Third time");
}

#[tokio::test]
async fn exhausted_retries_report_a_conflict() {
    let harness = Harness::new();
    harness.store.lose_next_races(3);

    let err = harness
        .app
        .settings
        .update(ADMIN_SESSION, None, title_patch("Never"))
        .await
        .expect_err("gives up");

    assert_eq!(err, WriteError::ConflictExhausted { attempts: 3 });
    assert_eq!(err.to_string(), "could not save, try again");
    assert_eq!(harness.store.writes(), 3);
}

#[tokio::test]
async fn concurrent_icon_uploads_both_land() {
    let harness = Harness::new();
    harness.store.lose_next_races(1);
    let first = STANDARD.encode(b"\x89PNG first");
    let second = STANDARD.encode(b"\x89PNG second");

    let (a, b) = tokio::join!(
        harness
            .app
            .uploads
            .upload_author_icon(ADMIN_SESSION, None, "a.png", &first),
        harness
            .app
            .uploads
            .upload_author_icon(ADMIN_SESSION, None, "b.png", &second),
    );
    let a = a.expect("first upload");
    let b = b.expect("second upload");

    assert_eq!(a.write.attempts + b.write.attempts, 3);
    assert_eq!(a.url, "memory://octo/notes/.obsidian-log/author-icon.png");
    assert_eq!(a.url, b.url);

    let stored = harness.store.content(ICON).expect("icon stored");
    assert!(&stored[..] == b"\x89PNG first" || &stored[..] == b"\x89PNG second");
    let current = harness.store.revision(ICON).expect("revision");
    assert!(current == a.write.revision || current == b.write.revision);
}

#[tokio::test]
async fn works_replacement_reaches_the_author_page() {
    let harness = Harness::new();
    assert!(harness.app.content.author_page().await.personal_items.is_empty());

    let items = vec![WorkItemInput {
        id: None,
        title: "Gitfolio".to_string(),
        start_date: "2024-01".to_string(),
        end_date: None,
        is_current: true,
        coming_soon: None,
        description: Some("This site".to_string()),
        href: None,
        tags: Some(vec!["rust".to_string()]),
        thumbnail: None,
        category: WorkCategory::Personal,
    }];
    harness
        .app
        .works
        .replace(ADMIN_SESSION, Some("caller-token"), items)
        .await
        .expect("works written");

    let page = harness.app.content.author_page().await;
    assert_eq!(page.personal_items.len(), 1);
    assert_eq!(page.personal_items[0].title, "Gitfolio");
    assert!(page.personal_items[0].id.starts_with("work-"));
    assert!(page.professional_items.is_empty());

    let mirrored = harness
        .local
        .read_document(".obsidian-log/works.json")
        .await
        .expect("local read")
        .expect("mirrored");
    let mirrored: serde_json::Value = serde_json::from_slice(&mirrored).expect("json");
    assert_eq!(mirrored["items"][0]["title"], "Gitfolio");
}

#[tokio::test]
async fn untitled_work_is_rejected_before_authorization() {
    let harness = Harness::new();
    let items = vec![WorkItemInput {
        id: Some("work-1".to_string()),
        title: "  ".to_string(),
        start_date: "2024-01".to_string(),
        end_date: None,
        is_current: false,
        coming_soon: None,
        description: None,
        href: None,
        tags: None,
        thumbnail: None,
        category: WorkCategory::Sidejob,
    }];

    let err = harness
        .app
        .works
        .replace(ADMIN_SESSION, None, items)
        .await
        .expect_err("rejected");
    assert!(matches!(err, WriteError::Validation(_)));
    assert_eq!(harness.identity.calls(), 0);
    assert_eq!(harness.store.writes(), 0);
}
