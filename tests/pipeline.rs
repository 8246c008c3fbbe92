//! End-to-end aggregation: HTTP feed -> parser -> store -> browse.
//!
//! Feeds are served by wiremock; the database is in-memory per test.

use gator::commands;
use gator::feed::{FetchClient, ACCEPT_RSS, USER_AGENT};
use gator::scheduler::{CycleOutcome, CycleStage, PollScheduler};
use gator::storage::Database;
use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BOOT_DEV: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Boot.dev Blog</title>
    <link>https://blog.boot.dev/</link>
    <description>Recent content on Boot.dev Blog</description>
    <atom:link href="https://blog.boot.dev/index.xml" rel="self" type="application/rss+xml"/>
    <item>
      <title>The Zen of Proverbs</title>
      <link>https://blog.boot.dev/clean-code/zen-of-proverbs/</link>
      <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate>
      <guid>https://blog.boot.dev/clean-code/zen-of-proverbs/</guid>
      <description><![CDATA[Twenty rules of thumb for <b>writing</b> better code.]]></description>
    </item>
    <item>
      <title>Broken entry</title>
      <pubDate>Tue, 02 Jan 2024 00:00:00 GMT</pubDate>
      <description>This one has no link</description>
    </item>
    <item>
      <title>Tom &amp; Jerry go to production</title>
      <link>https://blog.boot.dev/news/tom-and-jerry/</link>
      <pubDate>Wed, 03 Jan 2024 09:30:00 +0100</pubDate>
      <description></description>
    </item>
  </channel>
</rss>"#;

async fn serve(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .and(header("user-agent", USER_AGENT))
        .and(header("accept", ACCEPT_RSS))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn scheduler(db: &Database) -> PollScheduler {
    PollScheduler::new(
        db.clone(),
        FetchClient::new(None).unwrap(),
        "1m".parse().unwrap(),
    )
}

#[tokio::test]
async fn test_aggregated_posts_show_up_in_browse() {
    let server = MockServer::start().await;
    serve(&server, "/index.xml", BOOT_DEV).await;

    let db = Database::open(":memory:").await.unwrap();
    let user = commands::register(&db, "kahya").await.unwrap();
    commands::add_feed(&db, &user, "Boot.dev", &format!("{}/index.xml", server.uri()))
        .await
        .unwrap();

    let outcome = scheduler(&db).poll_once().await.unwrap();
    let CycleOutcome::Polled(report) = outcome else {
        panic!("expected the feed to be polled");
    };
    assert_eq!(report.feed_name, "Boot.dev");
    assert_eq!(report.new_posts, 2);
    assert_eq!(report.skipped_items, 1);

    let posts = db.get_posts_for_user(user.id, 10).await.unwrap();
    let browse: Vec<(&str, Option<&str>)> = posts
        .iter()
        .map(|p| (p.post.title.as_str(), p.post.description.as_deref()))
        .collect();
    assert_eq!(
        browse,
        vec![
            ("Tom & Jerry go to production", None),
            (
                "The Zen of Proverbs",
                Some("Twenty rules of thumb for <b>writing</b> better code.")
            ),
        ]
    );
}

#[tokio::test]
async fn test_polling_cycles_through_all_feeds_without_duplicates() {
    let server = MockServer::start().await;
    serve(&server, "/one", BOOT_DEV).await;
    serve(&server, "/two", BOOT_DEV).await;

    let db = Database::open(":memory:").await.unwrap();
    let user = commands::register(&db, "kahya").await.unwrap();
    let (one, _) = commands::add_feed(&db, &user, "One", &format!("{}/one", server.uri()))
        .await
        .unwrap();
    let (two, _) = commands::add_feed(&db, &user, "Two", &format!("{}/two", server.uri()))
        .await
        .unwrap();

    let scheduler = scheduler(&db);
    for _ in 0..4 {
        scheduler.poll_once().await.unwrap();
    }

    // Same links under different feeds are distinct posts
    assert_eq!(db.get_posts_for_feed(one.id).await.unwrap().len(), 2);
    assert_eq!(db.get_posts_for_feed(two.id).await.unwrap().len(), 2);
    assert_eq!(db.get_posts_for_user(user.id, 100).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_invalid_feed_fails_cycle_but_not_the_next_one() {
    let server = MockServer::start().await;
    serve(&server, "/junk", "<rss><channel><title>only a title</title></channel></rss>").await;
    serve(&server, "/good", BOOT_DEV).await;

    let db = Database::open(":memory:").await.unwrap();
    let user = commands::register(&db, "kahya").await.unwrap();
    commands::add_feed(&db, &user, "Junk", &format!("{}/junk", server.uri()))
        .await
        .unwrap();
    commands::add_feed(&db, &user, "Good", &format!("{}/good", server.uri()))
        .await
        .unwrap();

    let scheduler = scheduler(&db);
    let err = scheduler.poll_once().await.unwrap_err();
    assert_eq!(err.stage(), CycleStage::Parsing);

    let outcome = scheduler.poll_once().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Polled(r) if r.feed_name == "Good"));
}
