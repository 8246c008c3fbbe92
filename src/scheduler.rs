//! The aggregation loop.
//!
//! Every tick the [`PollScheduler`] picks the feed that has waited longest,
//! fetches it, parses it and stores its new posts. Exactly one feed is polled
//! per cycle and cycles never overlap.

use std::fmt;
use std::future::Future;

use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use crate::feed::{self, FetchClient, FetchError, ParseError};
use crate::storage::{Database, DatabaseError};
use crate::util::PollInterval;

/// Stage of a poll cycle, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    Selecting,
    Fetching,
    Parsing,
    Ingesting,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleStage::Selecting => "selecting",
            CycleStage::Fetching => "fetching",
            CycleStage::Parsing => "parsing",
            CycleStage::Ingesting => "ingesting",
        };
        f.write_str(name)
    }
}

/// A failure that aborted one poll cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    /// Picking the next feed or stamping it failed
    #[error("failed to select next feed: {0}")]
    Store(#[source] DatabaseError),

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    /// The body was not a usable RSS document
    #[error("invalid feed at {url}: {source}")]
    InvalidFeed {
        url: String,
        #[source]
        source: ParseError,
    },

    #[error("failed to store posts for feed {feed_id}: {source}")]
    Ingest {
        feed_id: i64,
        #[source]
        source: DatabaseError,
    },
}

impl CycleError {
    pub fn stage(&self) -> CycleStage {
        match self {
            CycleError::Store(_) => CycleStage::Selecting,
            CycleError::Fetch { .. } => CycleStage::Fetching,
            CycleError::InvalidFeed { .. } => CycleStage::Parsing,
            CycleError::Ingest { .. } => CycleStage::Ingesting,
        }
    }
}

/// What a successful cycle did with the feed it polled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub feed_id: i64,
    pub feed_name: String,
    pub new_posts: usize,
    /// Items dropped by validation
    pub skipped_items: usize,
    pub duplicates: usize,
    /// Items dropped for an unparsable publish date
    pub undated: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No feeds are registered
    Idle,
    Polled(CycleReport),
}

/// Totals for one [`PollScheduler::run_until`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub failures: u64,
}

pub struct PollScheduler {
    db: Database,
    client: FetchClient,
    interval: PollInterval,
}

impl PollScheduler {
    pub fn new(db: Database, client: FetchClient, interval: PollInterval) -> Self {
        Self {
            db,
            client,
            interval,
        }
    }

    /// Run one cycle: select, stamp, fetch, parse, ingest.
    ///
    /// The selected feed's `last_fetched_at` is stamped before the request
    /// goes out, so a feed that keeps failing moves to the back of the queue
    /// like any other.
    pub async fn poll_once(&self) -> Result<CycleOutcome, CycleError> {
        let span = tracing::info_span!("poll_cycle", feed_id = tracing::field::Empty);
        self.cycle().instrument(span).await
    }

    async fn cycle(&self) -> Result<CycleOutcome, CycleError> {
        let Some(feed) = self
            .db
            .select_feed_with_oldest_fetch()
            .await
            .map_err(CycleError::Store)?
        else {
            return Ok(CycleOutcome::Idle);
        };
        tracing::Span::current().record("feed_id", feed.id);

        self.db
            .mark_feed_fetched(feed.id)
            .await
            .map_err(CycleError::Store)?;

        tracing::debug!(url = %feed.url, "Fetching feed");
        let body = self
            .client
            .fetch(&feed.url)
            .await
            .map_err(|source| CycleError::Fetch {
                url: feed.url.clone(),
                source,
            })?;

        let parsed = feed::parse_feed(&body).map_err(|source| CycleError::InvalidFeed {
            url: feed.url.clone(),
            source,
        })?;

        let report = feed::ingest(&self.db, feed.id, &parsed.document)
            .await
            .map_err(|source| CycleError::Ingest {
                feed_id: feed.id,
                source,
            })?;

        Ok(CycleOutcome::Polled(CycleReport {
            feed_id: feed.id,
            feed_name: feed.name,
            new_posts: report.posts.len(),
            skipped_items: parsed.skipped,
            duplicates: report.duplicates,
            undated: report.undated,
        }))
    }

    /// Poll on every tick until `shutdown` resolves.
    ///
    /// The first cycle starts immediately. A cycle that outlasts the interval
    /// delays the next tick instead of queueing extra cycles. `shutdown` is
    /// only observed between cycles, so an in-flight cycle always completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RunSummary
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ticker = tokio::time::interval(self.interval.as_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval = %self.interval, "Collecting feeds");
        let mut summary = RunSummary::default();

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping aggregator");
                    break;
                }

                _ = ticker.tick() => {}
            }

            summary.cycles += 1;
            match self.poll_once().await {
                Ok(CycleOutcome::Idle) => {
                    tracing::info!("No feeds to fetch");
                }
                Ok(CycleOutcome::Polled(report)) => {
                    tracing::info!(
                        feed = %report.feed_name,
                        new_posts = report.new_posts,
                        skipped = report.skipped_items,
                        duplicates = report.duplicates,
                        undated = report.undated,
                        "Feed collected"
                    );
                }
                Err(e) => {
                    summary.failures += 1;
                    tracing::warn!(stage = %e.stage(), error = %e, "Poll cycle failed");
                }
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rss(items: &[(&str, &str)]) -> String {
        let items: String = items
            .iter()
            .map(|(title, link)| {
                format!(
                    "<item><title>{title}</title><link>{link}</link>\
                     <description>d</description>\
                     <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate></item>"
                )
            })
            .collect();
        format!(
            "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel>\
             <title>t</title><link>https://example.com</link>\
             <description>d</description>{items}</channel></rss>"
        )
    }

    async fn mount(server: &MockServer, route: &str, body: String) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    async fn setup() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("lane").await.unwrap();
        (db, user.id)
    }

    fn scheduler(db: &Database, interval: &str) -> PollScheduler {
        PollScheduler::new(
            db.clone(),
            FetchClient::new(None).unwrap(),
            interval.parse().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_idle_without_feeds() {
        let (db, _) = setup().await;
        let outcome = scheduler(&db, "1s").poll_once().await.unwrap();
        assert_eq!(outcome, CycleOutcome::Idle);
    }

    #[tokio::test]
    async fn test_rotation_follows_oldest_fetch() {
        let server = MockServer::start().await;
        let (db, user_id) = setup().await;

        for name in ["a", "b", "c"] {
            let link = format!("https://{name}.example/1");
            mount(&server, &format!("/{name}"), rss(&[(name, link.as_str())])).await;
        }

        let a = db
            .create_feed("A", &format!("{}/a", server.uri()), user_id)
            .await
            .unwrap();
        let b = db
            .create_feed("B", &format!("{}/b", server.uri()), user_id)
            .await
            .unwrap();
        let c = db
            .create_feed("C", &format!("{}/c", server.uri()), user_id)
            .await
            .unwrap();
        // A never fetched, B before C
        db.mark_feed_fetched_at(b.id, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .await
            .unwrap();
        db.mark_feed_fetched_at(c.id, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
            .await
            .unwrap();

        let scheduler = scheduler(&db, "1s");
        let mut order = Vec::new();
        for _ in 0..6 {
            match scheduler.poll_once().await.unwrap() {
                CycleOutcome::Polled(report) => order.push(report.feed_id),
                CycleOutcome::Idle => panic!("feeds exist"),
            }
        }

        assert_eq!(order, vec![a.id, b.id, c.id, a.id, b.id, c.id]);
    }

    #[tokio::test]
    async fn test_fetch_failure_still_advances_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let (db, user_id) = setup().await;
        let url = format!("{}/broken", server.uri());
        db.create_feed("Broken", &url, user_id).await.unwrap();

        let err = scheduler(&db, "1s").poll_once().await.unwrap_err();
        assert_eq!(err.stage(), CycleStage::Fetching);
        assert!(matches!(
            err,
            CycleError::Fetch {
                source: FetchError::Status { status: 500, .. },
                ..
            }
        ));

        let feed = db.get_feed_by_url(&url).await.unwrap().unwrap();
        assert!(feed.last_fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_failing_feed_does_not_starve_others() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        mount(&server, "/ok", rss(&[("Fine", "https://ok.example/1")])).await;

        let (db, user_id) = setup().await;
        db.create_feed("Broken", &format!("{}/broken", server.uri()), user_id)
            .await
            .unwrap();
        let ok = db
            .create_feed("Ok", &format!("{}/ok", server.uri()), user_id)
            .await
            .unwrap();

        let scheduler = scheduler(&db, "1s");
        assert!(scheduler.poll_once().await.is_err());
        match scheduler.poll_once().await.unwrap() {
            CycleOutcome::Polled(report) => {
                assert_eq!(report.feed_id, ok.id);
                assert_eq!(report.new_posts, 1);
            }
            CycleOutcome::Idle => panic!("feeds exist"),
        }
    }

    #[tokio::test]
    async fn test_non_rss_body_is_parsing_failure() {
        let server = MockServer::start().await;
        mount(&server, "/html", "<html><body>hi</body></html>".to_string()).await;
        let (db, user_id) = setup().await;
        db.create_feed("Html", &format!("{}/html", server.uri()), user_id)
            .await
            .unwrap();

        let err = scheduler(&db, "1s").poll_once().await.unwrap_err();
        assert_eq!(err.stage(), CycleStage::Parsing);
        assert_eq!(err.stage().to_string(), "parsing");
    }

    #[tokio::test]
    async fn test_end_to_end_drops_item_without_link() {
        let server = MockServer::start().await;
        let body = "<rss><channel><title>T</title><link>https://example.com</link>\
                    <description>D</description>\
                    <item><title>A</title><link>u1</link><description>x</description>\
                    <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate></item>\
                    <item><title>B</title><description>y</description>\
                    <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate></item>\
                    </channel></rss>";
        mount(&server, "/feed", body.to_string()).await;
        let (db, user_id) = setup().await;
        let feed = db
            .create_feed("T", &format!("{}/feed", server.uri()), user_id)
            .await
            .unwrap();

        let outcome = scheduler(&db, "1s").poll_once().await.unwrap();
        let CycleOutcome::Polled(report) = outcome else {
            panic!("expected a polled feed");
        };
        assert_eq!(report.new_posts, 1);
        assert_eq!(report.skipped_items, 1);

        let posts = db.get_posts_for_feed(feed.id).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "A");
        assert_eq!(posts[0].url, "u1");
    }

    #[tokio::test]
    async fn test_repeat_poll_creates_no_duplicates() {
        let server = MockServer::start().await;
        mount(&server, "/feed", rss(&[("A", "u1"), ("B", "u2")])).await;
        let (db, user_id) = setup().await;
        let feed = db
            .create_feed("T", &format!("{}/feed", server.uri()), user_id)
            .await
            .unwrap();

        let scheduler = scheduler(&db, "1s");
        scheduler.poll_once().await.unwrap();
        let CycleOutcome::Polled(second) = scheduler.poll_once().await.unwrap() else {
            panic!("expected a polled feed");
        };
        assert_eq!(second.new_posts, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(db.get_posts_for_feed(feed.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_run_until_first_tick_is_immediate() {
        let (db, _) = setup().await;
        let summary = scheduler(&db, "1h")
            .run_until(tokio::time::sleep(Duration::from_millis(200)))
            .await;
        assert_eq!(
            summary,
            RunSummary {
                cycles: 1,
                failures: 0
            }
        );
    }

    /// Resolves once the server has seen `count` requests.
    async fn after_requests(server: &MockServer, count: usize) {
        loop {
            let seen = server.received_requests().await.map_or(0, |r| r.len());
            if seen >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_run_until_counts_failures_and_keeps_going() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let (db, user_id) = setup().await;
        db.create_feed("Down", &format!("{}/feed", server.uri()), user_id)
            .await
            .unwrap();

        let summary = scheduler(&db, "10ms")
            .run_until(after_requests(&server, 3))
            .await;
        assert!(summary.cycles >= 3, "{summary:?}");
        assert_eq!(summary.failures, summary.cycles);
    }

    #[tokio::test]
    async fn test_run_until_finishes_in_flight_cycle() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(rss(&[("A", "u1"), ("B", "u2")]))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        let (db, user_id) = setup().await;
        let feed = db
            .create_feed("Slow", &format!("{}/slow", server.uri()), user_id)
            .await
            .unwrap();

        // Shutdown resolves while the response is still delayed
        let summary = scheduler(&db, "1h")
            .run_until(after_requests(&server, 1))
            .await;

        assert_eq!(
            summary,
            RunSummary {
                cycles: 1,
                failures: 0
            }
        );
        assert_eq!(db.get_posts_for_feed(feed.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_slow_cycles_never_overlap() {
        let delay = Duration::from_millis(200);
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(rss(&[("A", "u1")]))
                    .set_delay(delay),
            )
            .mount(&server)
            .await;
        let (db, user_id) = setup().await;
        db.create_feed("Slow", &format!("{}/feed", server.uri()), user_id)
            .await
            .unwrap();

        let started = std::time::Instant::now();
        let summary = scheduler(&db, "50ms")
            .run_until(after_requests(&server, 3))
            .await;
        let elapsed = started.elapsed();

        let requests = server.received_requests().await.unwrap().len();
        assert_eq!(summary.failures, 0);
        assert_eq!(requests as u64, summary.cycles);
        // Back-to-back responses, each delayed in full
        assert!(
            elapsed >= delay * requests as u32,
            "{requests} requests in {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn test_run_until_stops_when_already_shut_down() {
        let (db, _) = setup().await;
        let summary = scheduler(&db, "1s").run_until(std::future::ready(())).await;
        assert_eq!(summary, RunSummary::default());
    }
}
