//! Integration tests for the collection pipeline: fetch, extract, forward.
//!
//! Feeds and the sink are served by separate wiremock servers so request
//! order on the feed server reflects crawl order. Each test builds its own
//! collector from a programmatic `Config`.

use feed_collector::collector::{Collector, CollectorState, Source};
use feed_collector::config::Config;
use pretty_assertions::assert_eq;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn rss(items: &[(&str, &str)]) -> String {
    let body: String = items
        .iter()
        .enumerate()
        .map(|(i, (title, description))| {
            format!(
                "<item><title>{title}</title><description>{description}</description>\
                 <link>https://example.com/{i}</link><pubDate> Tue, 01 Oct 2024 08:00:00 GMT </pubDate></item>"
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>Test</title>{body}</channel></rss>"
    )
}

async fn mount_feed(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body, "application/rss+xml"),
        )
        .mount(server)
        .await;
}

async fn accepting_sink() -> MockServer {
    let sink = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/news/add"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&sink)
        .await;
    sink
}

fn config(sources: Vec<Source>, sink: &MockServer) -> Config {
    Config {
        collection_interval_seconds: 60,
        fetch_timeout_seconds: 5,
        forward_timeout_seconds: 5,
        sink_url: format!("{}/news/add", sink.uri()),
        sources,
        ..Default::default()
    }
}

fn source(name: &str, server: &MockServer, route: &str) -> Source {
    Source::new(name, format!("{}{}", server.uri(), route), "general")
}

async fn posted(sink: &MockServer) -> Vec<serde_json::Value> {
    sink.received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

async fn wait_for_cycles(collector: &Collector, n: u64) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while collector.status().cycles_completed < n {
        assert!(Instant::now() < deadline, "timed out waiting for {n} cycles");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

// ============================================================================
// Single cycle
// ============================================================================

#[tokio::test]
async fn test_cycle_visits_sources_in_registry_order() {
    let feeds = MockServer::start().await;
    mount_feed(&feeds, "/c", rss(&[("C1", "c one")])).await;
    mount_feed(&feeds, "/a", rss(&[("A1", "a one"), ("A2", "a two")])).await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&feeds)
        .await;
    let sink = accepting_sink().await;

    let collector = Collector::from_config(&config(
        vec![
            source("C", &feeds, "/c"),
            source("B", &feeds, "/b"),
            source("A", &feeds, "/a"),
        ],
        &sink,
    ))
    .unwrap();

    let report = collector.run_cycle().await;

    assert_eq!(report.sources_visited, 3);
    assert_eq!(report.sources_failed, 1);
    assert_eq!(report.items_extracted, 3);
    assert_eq!(report.items_forwarded, 3);
    assert!(!report.interrupted);

    let order: Vec<String> = feeds
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect();
    assert_eq!(order, vec!["/c", "/b", "/a"]);

    let titles: Vec<String> = posted(&sink)
        .await
        .iter()
        .map(|v| v["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, vec!["C1", "A1", "A2"]);
}

#[tokio::test]
async fn test_failed_fetch_forwards_nothing() {
    let feeds = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&feeds)
        .await;
    let sink = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&sink)
        .await;

    let collector =
        Collector::from_config(&config(vec![source("Gone", &feeds, "/rss")], &sink)).unwrap();
    let report = collector.run_cycle().await;

    assert_eq!(report.sources_visited, 1);
    assert_eq!(report.sources_failed, 1);
    assert_eq!(report.items_forwarded, 0);
}

#[tokio::test]
async fn test_feed_without_usable_items_is_skipped() {
    let feeds = MockServer::start().await;
    mount_feed(&feeds, "/rss", rss(&[("Title only", ""), ("", "Description only")])).await;
    let sink = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&sink)
        .await;

    let collector =
        Collector::from_config(&config(vec![source("Empty", &feeds, "/rss")], &sink)).unwrap();
    let report = collector.run_cycle().await;

    assert_eq!(report.sources_failed, 1);
    assert_eq!(report.items_extracted, 0);
}

#[tokio::test]
async fn test_file_source_round_trips_to_sink() {
    let dir = std::env::temp_dir().join("feed_collector_it_file_source");
    std::fs::create_dir_all(&dir).unwrap();
    let feed_path = dir.join("local.xml");
    std::fs::write(
        &feed_path,
        r#"<rss><channel>
<item>
  <title><![CDATA[Local <b>headline</b>]]></title>
  <description>Caf&eacute; &amp; bar &mdash; open</description>
  <link>https://local.example.com/1</link>
  <pubDate>
    2024-10-01T08:00:00Z
  </pubDate>
</item>
</channel></rss>"#,
    )
    .unwrap();

    let sink = accepting_sink().await;
    let collector = Collector::from_config(&config(
        vec![Source::new(
            "Local",
            format!("file://{}", feed_path.display()),
            "regional",
        )],
        &sink,
    ))
    .unwrap();

    let report = collector.run_cycle().await;
    assert_eq!(report.items_forwarded, 1);

    let bodies = posted(&sink).await;
    assert_eq!(
        bodies[0],
        serde_json::json!({
            "title": "Local headline",
            "content": "Caf&eacute; & bar \u{2014} open",
            "source": "Local",
            "category": "regional",
            "url": "https://local.example.com/1",
            "published_at": "2024-10-01T08:00:00Z",
        })
    );

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_sink_failures_are_counted_not_retried() {
    let feeds = MockServer::start().await;
    mount_feed(&feeds, "/one", rss(&[("One", "first")])).await;
    mount_feed(&feeds, "/two", rss(&[("Two", "second")])).await;
    let sink = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&sink)
        .await;

    let collector = Collector::from_config(&config(
        vec![source("One", &feeds, "/one"), source("Two", &feeds, "/two")],
        &sink,
    ))
    .unwrap();
    let report = collector.run_cycle().await;

    assert_eq!(report.sources_visited, 2);
    assert_eq!(report.sources_failed, 0);
    assert_eq!(report.items_forwarded, 0);
    assert_eq!(report.items_failed, 2);
}

// ============================================================================
// Repeated cycles and the recently-seen cache
// ============================================================================

#[tokio::test]
async fn test_unchanged_feed_is_re_emitted_every_cycle() {
    let feeds = MockServer::start().await;
    mount_feed(&feeds, "/rss", rss(&[("Same", "story")])).await;
    let sink = accepting_sink().await;

    let collector =
        Collector::from_config(&config(vec![source("S", &feeds, "/rss")], &sink)).unwrap();
    collector.run_cycle().await;
    collector.run_cycle().await;

    assert_eq!(posted(&sink).await.len(), 2);
    assert_eq!(collector.status().cycles_completed, 2);
}

#[tokio::test]
async fn test_recently_seen_cache_suppresses_repeats() {
    let feeds = MockServer::start().await;
    mount_feed(&feeds, "/rss", rss(&[("Same", "story")])).await;
    let sink = accepting_sink().await;

    let mut cfg = config(vec![source("S", &feeds, "/rss")], &sink);
    cfg.dedupe_capacity = 16;
    let collector = Collector::from_config(&cfg).unwrap();

    let first = collector.run_cycle().await;
    let second = collector.run_cycle().await;

    assert_eq!(first.items_forwarded, 1);
    assert_eq!(second.items_forwarded, 0);
    assert_eq!(second.items_suppressed, 1);
    assert_eq!(posted(&sink).await.len(), 1);
    assert_eq!(collector.status().recently_seen, Some(1));
}

#[tokio::test]
async fn test_rejected_items_are_not_remembered() {
    let feeds = MockServer::start().await;
    mount_feed(&feeds, "/rss", rss(&[("Retry me", "story")])).await;
    let sink = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&sink)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&sink)
        .await;

    let mut cfg = config(vec![source("S", &feeds, "/rss")], &sink);
    cfg.dedupe_capacity = 16;
    let collector = Collector::from_config(&cfg).unwrap();

    assert_eq!(collector.run_cycle().await.items_failed, 1);
    assert_eq!(collector.run_cycle().await.items_forwarded, 1);
}

// ============================================================================
// Background loop lifecycle
// ============================================================================

#[tokio::test]
async fn test_loop_repeats_cycles_until_stopped() {
    let feeds = MockServer::start().await;
    mount_feed(&feeds, "/rss", rss(&[("Tick", "tock")])).await;
    let sink = accepting_sink().await;

    let mut cfg = config(vec![source("S", &feeds, "/rss")], &sink);
    cfg.collection_interval_seconds = 1;
    let mut collector = Collector::from_config(&cfg).unwrap();

    collector.start();
    assert!(collector.is_running());
    wait_for_cycles(&collector, 2).await;

    collector.stop().await;
    assert_eq!(collector.state(), CollectorState::Stopped);
    assert!(!collector.is_running());
    assert!(posted(&sink).await.len() >= 2);
}

#[tokio::test]
async fn test_stop_during_interval_sleep_is_prompt() {
    let feeds = MockServer::start().await;
    mount_feed(&feeds, "/rss", rss(&[("Only", "once")])).await;
    let sink = accepting_sink().await;

    let mut collector =
        Collector::from_config(&config(vec![source("S", &feeds, "/rss")], &sink)).unwrap();
    collector.start();
    wait_for_cycles(&collector, 1).await;

    let stop_started = Instant::now();
    collector.stop().await;

    assert!(
        stop_started.elapsed() < Duration::from_millis(1500),
        "stop took {:?}",
        stop_started.elapsed()
    );
    assert_eq!(collector.status().cycles_completed, 1);
}

#[tokio::test]
async fn test_stop_mid_source_finishes_current_source_only() {
    let feeds = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(rss(&[("Slow", "but finished")]))
                .set_delay(Duration::from_millis(1500)),
        )
        .mount(&feeds)
        .await;
    mount_feed(&feeds, "/never", rss(&[("Never", "reached")])).await;
    let sink = accepting_sink().await;

    let mut collector = Collector::from_config(&config(
        vec![source("Slow", &feeds, "/slow"), source("Never", &feeds, "/never")],
        &sink,
    ))
    .unwrap();

    collector.start();
    tokio::time::sleep(Duration::from_millis(300)).await;
    collector.stop().await;

    let paths: Vec<String> = feeds
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect();
    assert_eq!(paths, vec!["/slow"]);

    let titles: Vec<String> = posted(&sink)
        .await
        .iter()
        .map(|v| v["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, vec!["Slow"]);

    let status = collector.status();
    assert_eq!(status.status, CollectorState::Stopped);
    let last = status.last_cycle.expect("cycle should be recorded");
    assert!(last.interrupted);
    assert_eq!(last.sources_visited, 1);
}

#[tokio::test]
async fn test_status_serializes_for_health_endpoint() {
    let feeds = MockServer::start().await;
    let sink = accepting_sink().await;
    let collector =
        Collector::from_config(&config(vec![source("S", &feeds, "/rss")], &sink)).unwrap();

    let json = serde_json::to_value(collector.status()).unwrap();
    assert_eq!(json["service"], "CollectorService");
    assert_eq!(json["status"], "idle");
    assert_eq!(json["running"], false);
    assert_eq!(json["sources"], 1);
    assert_eq!(json["interval_seconds"], 60);
    assert!(json["recently_seen"].is_null());
    assert!(json["last_cycle"].is_null());
}
