//! Fetch orchestration
//!
//! The orchestrator reads work items one line at a time and drives each
//! through the same pipeline:
//!
//! 1. Parse; a malformed line ends the input
//! 2. Skip items whose target cannot be fetched
//! 3. Requeue items outside this node's hash partition
//! 4. Wait for one of `max-concurrent-fetches` slots
//! 5. Spawn a task that passes the pressure relief valve, checks robots.txt
//!    and fetches, requeueing the item when the valve or a retryable error
//!    turns it away
//!
//! Once the input is exhausted the orchestrator drains outstanding tasks,
//! reporting status periodically, then closes both output streams.

use crate::config::{Config, IoConfig};
use crate::crawler::admission::HostPoliteness;
use crate::crawler::fetcher::{FetchRequest, FetchService, HttpFetchService};
use crate::crawler::output::{EnvelopeWriter, RequeueWriter};
use crate::crawler::work_item::{InputFormat, WorkItem};
use crate::partition::{host_hash, HashRange};
use crate::politeness::HostCache;
use crate::robots::{HttpRobotsFetcher, RobotsFetcher};
use crate::valve::PressureReliefValve;
use crate::SumiError;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval_at, Instant};

/// Lifecycle of an orchestrator run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Reading,
    Draining,
    Closed,
}

/// Counters describing a finished (or running) fetch loop
///
/// Every dispatched item ends in exactly one of `rejected`, `robots_denied`
/// or `completed`, so those three add up to `dispatched` unless a task
/// panicked (a panic counts as `failed` only).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Lines parsed into work items
    pub read: u64,
    /// Items skipped because their target cannot be fetched
    pub skipped: u64,
    /// Items outside this node's partition
    pub out_of_partition: u64,
    /// Items handed to a fetch task
    pub dispatched: u64,
    /// Items the valve turned away
    pub rejected: u64,
    /// Items disallowed by robots.txt
    pub robots_denied: u64,
    /// Fetch attempts that finished, successfully or not
    pub completed: u64,
    /// Fetch attempts that failed without a recorded outcome
    pub failed: u64,
    /// Items written to the requeue stream
    pub requeued: u64,
}

#[derive(Default)]
struct RunStats {
    read: AtomicU64,
    skipped: AtomicU64,
    out_of_partition: AtomicU64,
    dispatched: AtomicU64,
    rejected: AtomicU64,
    robots_denied: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl RunStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn summary(&self, requeue: &RequeueWriter) -> RunSummary {
        RunSummary {
            read: self.read.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            out_of_partition: self.out_of_partition.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            robots_denied: self.robots_denied.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            requeued: requeue.written(),
        }
    }
}

/// Shared state handed to every fetch task
struct TaskContext {
    valve: Arc<PressureReliefValve<WorkItem>>,
    hosts: Arc<HostCache>,
    fetch_service: Arc<dyn FetchService>,
    envelope: Arc<EnvelopeWriter>,
    requeue: Arc<RequeueWriter>,
    stats: Arc<RunStats>,
    agent: String,
}

impl TaskContext {
    fn requeue(&self, item: &WorkItem) {
        if let Err(e) = self.requeue.requeue(item) {
            tracing::error!("Failed to requeue {}: {}", item.target_uri, e);
        }
    }
}

/// Drives work items through admission, politeness and fetching
pub struct Orchestrator {
    hosts: Arc<HostCache>,
    valve: Arc<PressureReliefValve<WorkItem>>,
    fetch_service: Arc<dyn FetchService>,
    slots: Arc<Semaphore>,
    partition: Option<HashRange>,
    format: InputFormat,
    agent: String,
    slot_wait_log: Duration,
    status_interval: Duration,
    phase: RunPhase,
}

impl Orchestrator {
    /// Builds an orchestrator from configuration and collaborators
    ///
    /// The valve consults host politeness once more than
    /// `pressure-threshold` items are in flight.
    pub fn new(
        config: &Config,
        fetch_service: Arc<dyn FetchService>,
        robots_fetcher: Arc<dyn RobotsFetcher>,
    ) -> Result<Self, SumiError> {
        let agent = config.user_agent.crawler_name.clone();
        let hosts = Arc::new(HostCache::from_config(
            &config.politeness,
            &agent,
            robots_fetcher,
        ));
        let valve = Arc::new(PressureReliefValve::new(
            config.fetcher.pressure_threshold,
            Duration::from_millis(config.fetcher.valve_wait_ms),
            Arc::new(HostPoliteness::new(Arc::clone(&hosts))),
        ));
        let partition = config
            .partition
            .as_ref()
            .map(crate::config::partition_range)
            .transpose()?;

        Ok(Self {
            hosts,
            valve,
            fetch_service,
            slots: Arc::new(Semaphore::new(config.fetcher.max_concurrent_fetches.max(1))),
            partition,
            format: input_format(&config.io),
            agent,
            slot_wait_log: Duration::from_millis(config.fetcher.slot_wait_log_ms.max(1)),
            status_interval: Duration::from_millis(config.fetcher.status_interval_ms.max(1)),
            phase: RunPhase::Idle,
        })
    }

    /// Builds an orchestrator that fetches over HTTP
    pub fn from_config(config: &Config) -> Result<Self, SumiError> {
        let client = crate::crawler::build_http_client(&config.user_agent)?;
        let fetch_service = Arc::new(HttpFetchService::new(
            client.clone(),
            config.user_agent.header_value(),
        ));
        let robots_fetcher = Arc::new(HttpRobotsFetcher::new(client));
        Self::new(config, fetch_service, robots_fetcher)
    }

    /// Replaces the admission valve
    pub fn with_valve(mut self, valve: Arc<PressureReliefValve<WorkItem>>) -> Self {
        self.valve = valve;
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn host_cache(&self) -> &Arc<HostCache> {
        &self.hosts
    }

    pub fn valve(&self) -> &Arc<PressureReliefValve<WorkItem>> {
        &self.valve
    }

    /// Whether `item` belongs to this node's slice of the hash space
    pub fn in_partition(&self, item: &WorkItem) -> bool {
        match (&self.partition, item.host()) {
            (None, _) => true,
            (Some(range), Some(host)) => range.contains(&host_hash(&host)),
            (Some(_), None) => false,
        }
    }

    /// Opens the configured input and outputs, then runs the fetch loop
    ///
    /// Failing to open any of the three streams is fatal.
    pub async fn run_with_io(&mut self, io: &IoConfig) -> Result<RunSummary, SumiError> {
        let input: Box<dyn AsyncBufRead + Unpin + Send> = match &io.input_path {
            Some(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|source| SumiError::OpenFile {
                        path: path.clone(),
                        source,
                    })?;
                Box::new(BufReader::new(file))
            }
            None => Box::new(BufReader::new(tokio::io::stdin())),
        };
        let envelope = Arc::new(match &io.output_path {
            Some(path) => EnvelopeWriter::create(Path::new(path))?,
            None => EnvelopeWriter::stdout()?,
        });
        let requeue = Arc::new(match &io.requeue_path {
            Some(path) => RequeueWriter::open(Path::new(path), self.format)?,
            None => RequeueWriter::disabled(self.format),
        });

        self.run(input, envelope, requeue).await
    }

    /// Runs the fetch loop over `input` until it is exhausted and every
    /// dispatched item has finished
    pub async fn run<R>(
        &mut self,
        input: R,
        envelope: Arc<EnvelopeWriter>,
        requeue: Arc<RequeueWriter>,
    ) -> Result<RunSummary, SumiError>
    where
        R: AsyncBufRead + Unpin,
    {
        let stats = Arc::new(RunStats::default());
        let context = Arc::new(TaskContext {
            valve: Arc::clone(&self.valve),
            hosts: Arc::clone(&self.hosts),
            fetch_service: Arc::clone(&self.fetch_service),
            envelope: Arc::clone(&envelope),
            requeue: Arc::clone(&requeue),
            stats: Arc::clone(&stats),
            agent: self.agent.clone(),
        });
        let mut tasks = JoinSet::new();

        self.enter_phase(RunPhase::Reading);
        tracing::info!(
            "Reading work items ({} slots, pressure threshold {})",
            self.slots.available_permits(),
            self.valve.threshold()
        );

        let mut lines = input.lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to read input, stopping: {}", e);
                    break;
                }
            };

            let Some(item) = WorkItem::parse_line(&line, self.format) else {
                tracing::warn!("Unparseable work item, stopping input: {:?}", line);
                break;
            };
            RunStats::bump(&stats.read);

            if let Some(issue) = item.issue() {
                tracing::debug!("Skipping {}: {}", item.target_uri, issue);
                RunStats::bump(&stats.skipped);
                continue;
            }

            if !self.in_partition(&item) {
                tracing::trace!("{} is outside this partition", item.target_uri);
                RunStats::bump(&stats.out_of_partition);
                context.requeue(&item);
                continue;
            }

            let Some(slot) = self.acquire_slot(&mut tasks, &stats).await else {
                tracing::error!("Fetch slots closed, stopping input");
                break;
            };
            RunStats::bump(&stats.dispatched);
            tasks.spawn(process_item(Arc::clone(&context), item, slot));
        }

        self.enter_phase(RunPhase::Draining);
        tracing::info!("Input exhausted, draining {} tasks", tasks.len());
        self.drain(&mut tasks, &stats).await;

        self.enter_phase(RunPhase::Closed);
        requeue.flush()?;
        envelope.close()?;

        let summary = stats.summary(&requeue);
        tracing::info!(
            "Run finished: {} read, {} dispatched, {} completed, {} failed, {} requeued",
            summary.read,
            summary.dispatched,
            summary.completed,
            summary.failed,
            summary.requeued
        );
        Ok(summary)
    }

    fn enter_phase(&mut self, phase: RunPhase) {
        tracing::debug!("Orchestrator {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Waits for a free fetch slot, reaping finished tasks meanwhile
    async fn acquire_slot(
        &self,
        tasks: &mut JoinSet<()>,
        stats: &RunStats,
    ) -> Option<OwnedSemaphorePermit> {
        let started = Instant::now();
        let mut report = interval_at(started + self.slot_wait_log, self.slot_wait_log);
        let acquire = Arc::clone(&self.slots).acquire_owned();
        tokio::pin!(acquire);

        loop {
            tokio::select! {
                permit = &mut acquire => return permit.ok(),
                Some(joined) = tasks.join_next() => reap(joined, stats),
                _ = report.tick() => {
                    tracing::info!(
                        "Waited {:?} for a fetch slot ({} in valve, {} completed)",
                        started.elapsed(),
                        self.valve.in_valve(),
                        stats.completed.load(Ordering::Relaxed)
                    );
                }
            }
        }
    }

    async fn drain(&self, tasks: &mut JoinSet<()>, stats: &RunStats) {
        let mut status = interval_at(Instant::now() + self.status_interval, self.status_interval);
        while !tasks.is_empty() {
            tokio::select! {
                Some(joined) = tasks.join_next() => reap(joined, stats),
                _ = status.tick() => {
                    tracing::info!(
                        "STATUS: {} tasks outstanding, {} in valve, {} completed, {} hosts cached",
                        tasks.len(),
                        self.valve.in_valve(),
                        stats.completed.load(Ordering::Relaxed),
                        self.hosts.len()
                    );
                }
            }
        }
    }
}

fn input_format(io: &IoConfig) -> InputFormat {
    if io.raw_input {
        InputFormat::Raw
    } else {
        InputFormat::Structured
    }
}

fn reap(joined: Result<(), JoinError>, stats: &RunStats) {
    if let Err(e) = joined {
        tracing::error!("Fetch task panicked: {}", e);
        RunStats::bump(&stats.failed);
    }
}

/// Admits, checks and fetches one item while holding a fetch slot
async fn process_item(context: Arc<TaskContext>, item: WorkItem, _slot: OwnedSemaphorePermit) {
    let stats = &context.stats;

    let Some(admission) = context.valve.enter(&item).await else {
        tracing::debug!("Valve turned away {}, requeueing", item.target_uri);
        RunStats::bump(&stats.rejected);
        context.requeue(&item);
        return;
    };

    let (Some(target), Some(host)) = (item.target_url(), item.host()) else {
        RunStats::bump(&stats.failed);
        return;
    };

    if let Some(robots) = context.hosts.get_robots_file(&host).await {
        if !robots.is_allowed(target.as_str(), &context.agent) {
            tracing::info!("URL {} disallowed by robots.txt", target);
            RunStats::bump(&stats.robots_denied);
            return;
        }
    }

    // Under pressure the valve predicate already took this host's grant
    if !admission.predicate_passed() {
        context.hosts.wait_to_fetch(&host, None).await;
    }

    let request = FetchRequest::now(target);
    let result = context
        .fetch_service
        .fetch_one(&request, &context.envelope)
        .await;
    RunStats::bump(&stats.completed);

    match result {
        Ok(()) => {}
        Err(e) if e.is_retryable() => {
            tracing::info!("Requeueing {}: {}", item.target_uri, e);
            RunStats::bump(&stats.failed);
            context.requeue(&item);
        }
        Err(e) => {
            tracing::warn!("Fetch failed for {}: {}", item.target_uri, e);
            RunStats::bump(&stats.failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PartitionConfig;
    use crate::crawler::output::{FetchOutcome, FetchRecord};
    use crate::partition::Md5Hash;
    use crate::robots::ParsedRobots;
    use crate::valve::WaitPredicate;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Fetch service that records targets and writes an empty 200 response
    #[derive(Default)]
    struct RecordingFetcher {
        targets: Mutex<Vec<String>>,
        fail_with_timeout: bool,
    }

    impl RecordingFetcher {
        fn targets(&self) -> Vec<String> {
            self.targets.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FetchService for RecordingFetcher {
        async fn fetch_one(
            &self,
            request: &FetchRequest,
            writer: &EnvelopeWriter,
        ) -> Result<(), SumiError> {
            self.targets.lock().unwrap().push(request.target.to_string());
            if self.fail_with_timeout {
                return Err(SumiError::Timeout {
                    url: request.target.to_string(),
                });
            }
            writer.write_record(&FetchRecord {
                uri: request.target.to_string(),
                fetched_at: Utc::now(),
                request: format!("GET {}", request.target),
                outcome: FetchOutcome::Response {
                    status: 200,
                    headers: String::new(),
                    body: Vec::new(),
                },
            })
        }
    }

    /// Robots fetcher serving the same rules for every host
    struct StaticRobots(Option<&'static str>);

    #[async_trait]
    impl RobotsFetcher for StaticRobots {
        async fn fetch_robots(&self, _host: &str) -> Result<Option<ParsedRobots>, SumiError> {
            Ok(self.0.map(ParsedRobots::from_content))
        }
    }

    struct Never;

    #[async_trait]
    impl WaitPredicate<WorkItem> for Never {
        async fn wait(&self, _item: &WorkItem, _timeout: Duration) -> bool {
            false
        }
    }

    fn test_config(raw: bool) -> Config {
        let mut config = Config::default();
        config.io.raw_input = raw;
        config.fetcher.max_concurrent_fetches = 4;
        config.fetcher.valve_wait_ms = 50;
        config.politeness.min_fetch_interval_ms = 1;
        config
    }

    struct Harness {
        _dir: TempDir,
        out_path: std::path::PathBuf,
        requeue_path: std::path::PathBuf,
        envelope: Arc<EnvelopeWriter>,
        requeue: Arc<RequeueWriter>,
    }

    impl Harness {
        fn new(format: InputFormat) -> Self {
            let dir = TempDir::new().unwrap();
            let out_path = dir.path().join("out.xml");
            let requeue_path = dir.path().join("requeue.txt");
            let envelope = Arc::new(EnvelopeWriter::create(&out_path).unwrap());
            let requeue = Arc::new(RequeueWriter::open(&requeue_path, format).unwrap());
            Self {
                _dir: dir,
                out_path,
                requeue_path,
                envelope,
                requeue,
            }
        }

        fn output(&self) -> String {
            std::fs::read_to_string(&self.out_path).unwrap()
        }

        fn requeued_lines(&self) -> Vec<String> {
            std::fs::read_to_string(&self.requeue_path)
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    async fn run(
        orchestrator: &mut Orchestrator,
        input: &str,
        harness: &Harness,
    ) -> RunSummary {
        orchestrator
            .run(
                input.as_bytes(),
                Arc::clone(&harness.envelope),
                Arc::clone(&harness.requeue),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_skips_unfetchable_items_and_fetches_the_rest() {
        let fetcher = Arc::new(RecordingFetcher::default());
        let mut orchestrator = Orchestrator::new(
            &test_config(false),
            fetcher.clone(),
            Arc::new(StaticRobots(None)),
        )
        .unwrap();
        let harness = Harness::new(InputFormat::Structured);

        let input = concat!(
            "{\"target_uri\":\"https://a.example/1\"}\n",
            "{\"target_uri\":\"not a uri\"}\n",
            "{\"target_uri\":\"https://b.example/2\"}\n",
        );
        let summary = run(&mut orchestrator, input, &harness).await;

        assert_eq!(summary.read, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.dispatched, 2);
        assert_eq!(summary.completed, 2);
        let mut targets = fetcher.targets();
        targets.sort();
        assert_eq!(targets, vec!["https://a.example/1", "https://b.example/2"]);

        let output = harness.output();
        assert_eq!(output.matches("<resource ").count(), 2);
        assert!(output.ends_with("</resources>\n"));
        assert_eq!(orchestrator.phase(), RunPhase::Closed);
        assert_eq!(orchestrator.valve().in_valve(), 0);
    }

    #[tokio::test]
    async fn test_malformed_line_stops_input() {
        let fetcher = Arc::new(RecordingFetcher::default());
        let mut orchestrator = Orchestrator::new(
            &test_config(false),
            fetcher.clone(),
            Arc::new(StaticRobots(None)),
        )
        .unwrap();
        let harness = Harness::new(InputFormat::Structured);

        let input = concat!(
            "{\"target_uri\":\"https://a.example/1\"}\n",
            "garbage\n",
            "{\"target_uri\":\"https://b.example/2\"}\n",
        );
        let summary = run(&mut orchestrator, input, &harness).await;

        assert_eq!(summary.read, 1);
        assert_eq!(fetcher.targets(), vec!["https://a.example/1"]);
    }

    #[tokio::test]
    async fn test_rejected_items_are_requeued_count_for_count() {
        let fetcher = Arc::new(RecordingFetcher::default());
        let config = test_config(true);
        let valve = Arc::new(PressureReliefValve::new(
            0,
            Duration::from_millis(10),
            Arc::new(Never),
        ));
        let mut orchestrator =
            Orchestrator::new(&config, fetcher.clone(), Arc::new(StaticRobots(None)))
                .unwrap()
                .with_valve(valve);
        let harness = Harness::new(InputFormat::Raw);

        let input = "https://a.example/1\nhttps://b.example/2\nhttps://a.example/3\n";
        let summary = run(&mut orchestrator, input, &harness).await;

        assert_eq!(summary.dispatched, 3);
        assert_eq!(summary.rejected, 3);
        assert_eq!(summary.requeued, 3);
        assert!(fetcher.targets().is_empty());

        let mut requeued = harness.requeued_lines();
        requeued.sort();
        assert_eq!(
            requeued,
            vec![
                "https://a.example/1",
                "https://a.example/3",
                "https://b.example/2"
            ]
        );
        assert_eq!(harness.output().matches("<resource ").count(), 0);
    }

    #[tokio::test]
    async fn test_robots_denied_items_are_not_fetched() {
        let fetcher = Arc::new(RecordingFetcher::default());
        let mut orchestrator = Orchestrator::new(
            &test_config(true),
            fetcher.clone(),
            Arc::new(StaticRobots(Some("User-agent: *\nDisallow: /private/\n"))),
        )
        .unwrap();
        let harness = Harness::new(InputFormat::Raw);

        let input = "https://a.example/private/x\nhttps://a.example/public\n";
        let summary = run(&mut orchestrator, input, &harness).await;

        assert_eq!(summary.robots_denied, 1);
        assert_eq!(fetcher.targets(), vec!["https://a.example/public"]);
        assert_eq!(
            summary.rejected + summary.robots_denied + summary.completed,
            summary.dispatched
        );
    }

    #[tokio::test]
    async fn test_retryable_failures_are_requeued() {
        let fetcher = Arc::new(RecordingFetcher {
            fail_with_timeout: true,
            ..Default::default()
        });
        let mut orchestrator = Orchestrator::new(
            &test_config(true),
            fetcher.clone(),
            Arc::new(StaticRobots(None)),
        )
        .unwrap();
        let harness = Harness::new(InputFormat::Raw);

        let summary = run(&mut orchestrator, "https://a.example/slow\n", &harness).await;

        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(harness.requeued_lines(), vec!["https://a.example/slow"]);
    }

    #[tokio::test]
    async fn test_items_outside_partition_are_requeued() {
        let host = "a.example";
        let hash = host_hash(host);
        let mut config = test_config(true);
        // A one-hash partition that contains only this host
        config.partition = Some(PartitionConfig {
            min: hash.to_string(),
            max: hash.to_string(),
        });

        let fetcher = Arc::new(RecordingFetcher::default());
        let mut orchestrator =
            Orchestrator::new(&config, fetcher.clone(), Arc::new(StaticRobots(None))).unwrap();
        let harness = Harness::new(InputFormat::Raw);

        let input = "https://a.example/in\nhttps://b.example/out\n";
        let summary = run(&mut orchestrator, input, &harness).await;

        assert_eq!(summary.out_of_partition, 1);
        assert_eq!(fetcher.targets(), vec!["https://a.example/in"]);
        assert_eq!(harness.requeued_lines(), vec!["https://b.example/out"]);
        assert!(host_hash("b.example") != hash);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_host_fetches_are_spaced_below_pressure_threshold() {
        struct TimingFetcher {
            started: Mutex<Vec<Instant>>,
        }

        #[async_trait]
        impl FetchService for TimingFetcher {
            async fn fetch_one(
                &self,
                _request: &FetchRequest,
                _writer: &EnvelopeWriter,
            ) -> Result<(), SumiError> {
                self.started.lock().unwrap().push(Instant::now());
                Ok(())
            }
        }

        // Defaults: 5s interval, threshold 100, so the valve never consults politeness
        let mut config = Config::default();
        config.io.raw_input = true;
        let interval = Duration::from_millis(config.politeness.min_fetch_interval_ms);

        let fetcher = Arc::new(TimingFetcher {
            started: Mutex::new(Vec::new()),
        });
        let mut orchestrator =
            Orchestrator::new(&config, fetcher.clone(), Arc::new(StaticRobots(None))).unwrap();
        let harness = Harness::new(InputFormat::Raw);

        let input = "https://a.example/1\nhttps://a.example/2\nhttps://a.example/3\n";
        let summary = run(&mut orchestrator, input, &harness).await;
        assert_eq!(summary.completed, 3);

        let mut started = fetcher.started.lock().unwrap().clone();
        started.sort();
        assert_eq!(started.len(), 3);
        for pair in started.windows(2) {
            assert!(pair[1] - pair[0] >= interval, "gap {:?}", pair[1] - pair[0]);
        }
    }

    #[test]
    fn test_invalid_partition_is_rejected() {
        let mut config = test_config(true);
        config.partition = Some(PartitionConfig {
            min: Md5Hash::MAX.to_string(),
            max: Md5Hash::MIN.to_string(),
        });
        let result = Orchestrator::new(
            &config,
            Arc::new(RecordingFetcher::default()),
            Arc::new(StaticRobots(None)),
        );
        assert!(matches!(result, Err(SumiError::Config(_))));
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_slots() {
        struct SlowFetcher {
            active: std::sync::atomic::AtomicUsize,
            peak: std::sync::atomic::AtomicUsize,
        }

        #[async_trait]
        impl FetchService for SlowFetcher {
            async fn fetch_one(
                &self,
                _request: &FetchRequest,
                _writer: &EnvelopeWriter,
            ) -> Result<(), SumiError> {
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.active.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let fetcher = Arc::new(SlowFetcher {
            active: Default::default(),
            peak: Default::default(),
        });
        let mut config = test_config(true);
        config.fetcher.max_concurrent_fetches = 2;
        let mut orchestrator =
            Orchestrator::new(&config, fetcher.clone(), Arc::new(StaticRobots(None))).unwrap();
        let harness = Harness::new(InputFormat::Raw);

        let input: String = (0..8)
            .map(|i| format!("https://host{}.example/\n", i))
            .collect();
        let summary = run(&mut orchestrator, &input, &harness).await;

        assert_eq!(summary.completed, 8);
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 2);
    }
}
