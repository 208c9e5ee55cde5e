use std::path::Path;
use std::time::Duration;
use sumi_fetch::config::{Config, UserAgentConfig};
use sumi_fetch::crawler::{self, InputFormat, WorkItem};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration reading from and writing to `dir`
fn create_test_config(dir: &Path, raw: bool) -> Config {
    let mut config = Config::default();
    config.user_agent = UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    };
    config.fetcher.max_concurrent_fetches = 8;
    config.fetcher.valve_wait_ms = 2_000;
    config.politeness.min_fetch_interval_ms = 1; // Very short for testing
    config.io.input_path = Some(dir.join("input").display().to_string());
    config.io.output_path = Some(dir.join("out.xml").display().to_string());
    config.io.requeue_path = Some(dir.join("requeue").display().to_string());
    config.io.raw_input = raw;
    config
}

fn write_input(config: &Config, lines: &[String]) {
    let path = config.io.input_path.as_ref().unwrap();
    std::fs::write(path, lines.join("\n") + "\n").expect("Failed to write input");
}

fn read_output(config: &Config) -> String {
    std::fs::read_to_string(config.io.output_path.as_ref().unwrap()).expect("Failed to read output")
}

fn read_requeue(config: &Config) -> Vec<String> {
    std::fs::read_to_string(config.io.requeue_path.as_ref().unwrap())
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

async fn mount_page(server: &MockServer, page: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_run_honors_robots() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    // robots.txt must be fetched exactly once for the host
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private/"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "/", "<html>home</html>").await;
    mount_page(&mock_server, "/page1", "<html>one</html>").await;
    mount_page(&mock_server, "/private/secret", "<html>secret</html>").await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), false);
    let lines: Vec<String> = ["/", "/page1", "/private/secret"]
        .iter()
        .map(|p| {
            WorkItem::new(format!("{}{}", base_url, p))
                .with_source(format!("{}/", base_url))
                .to_line(InputFormat::Structured)
                .unwrap()
        })
        .collect();
    write_input(&config, &lines);

    let summary = crawler::run(&config).await.expect("Fetch run failed");

    assert_eq!(summary.read, 3);
    assert_eq!(summary.dispatched, 3);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.robots_denied, 1);
    assert_eq!(summary.requeued, 0);

    let output = read_output(&config);
    assert!(output.starts_with("<?xml"));
    assert!(output.trim_end().ends_with("</resources>"));
    assert_eq!(output.matches("<resource ").count(), 2);
    assert!(output.contains(&format!("uri=\"{}/page1\"", base_url)));
    assert!(!output.contains("/private/secret\""));

    let requests = mock_server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() != "/private/secret"));
}

#[tokio::test]
async fn test_unparseable_line_stops_the_run() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "/a", "a").await;
    mount_page(&mock_server, "/b", "b").await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), true);
    write_input(
        &config,
        &[
            format!("{}/a", mock_server.uri()),
            "mailto:someone@example.com".to_string(),
            String::new(),
            format!("{}/b", mock_server.uri()),
        ],
    );

    let summary = crawler::run(&config).await.expect("Fetch run failed");

    // The mailto item is skipped, the blank line ends the input
    assert_eq!(summary.read, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.completed, 1);
    assert_eq!(read_output(&config).matches("<resource ").count(), 1);
}

#[tokio::test]
async fn test_same_host_fetches_are_spaced_under_pressure() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path(), true);
    // Every item goes through host politeness
    config.fetcher.pressure_threshold = 0;
    config.politeness.min_fetch_interval_ms = 200;
    write_input(
        &config,
        &(0..3)
            .map(|i| format!("{}/item{}", mock_server.uri(), i))
            .collect::<Vec<_>>(),
    );

    let start = std::time::Instant::now();
    let summary = crawler::run(&config).await.expect("Fetch run failed");

    assert_eq!(summary.completed, 3);
    assert_eq!(summary.rejected, 0);
    assert!(start.elapsed() >= Duration::from_millis(400));
}

#[tokio::test]
async fn test_impatient_valve_requeues_instead_of_fetching() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path(), true);
    config.fetcher.pressure_threshold = 0;
    config.fetcher.valve_wait_ms = 20;
    config.politeness.min_fetch_interval_ms = 60_000;
    let items: Vec<String> = (0..4)
        .map(|i| format!("{}/item{}", mock_server.uri(), i))
        .collect();
    write_input(&config, &items);

    let summary = crawler::run(&config).await.expect("Fetch run failed");

    // One grant for the host, the rest time out in the valve
    assert_eq!(summary.dispatched, 4);
    assert_eq!(summary.rejected, 3);
    assert_eq!(summary.requeued, 3);

    let mut requeued = read_requeue(&config);
    requeued.sort();
    assert_eq!(requeued.len(), 3);
    for line in &requeued {
        assert!(items.contains(line));
    }
}

#[tokio::test]
async fn test_missing_input_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), true);

    let err = crawler::run(&config).await.unwrap_err();
    assert!(matches!(err, sumi_fetch::SumiError::OpenFile { .. }));
}
