/// spectest's run engine.
///
/// A run goes through: normalize -> validate -> enqueue on the lane of its URL ->
/// dispatch -> checks -> sealed [`RunRecord`]. Everything up to the enqueue happens
/// on the caller's task and fails synchronously. The rest happens on the lane's
/// dispatcher; the caller waits for it for a bounded time only.
use chrono::Utc;
use eyre::WrapErr;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::{
    ops::Deref,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::{broadcast, oneshot};
use tracing::*;

use crate::{
    check::{self, Context},
    config::EngineConfig,
    dispatch,
    format::Format,
    http::{self, HttpClient},
    masking,
    model::{RunRecord, RunStatus, Specification},
    normalize,
    queue::{self, RunQueue},
    store::Store,
    validate::{self, ValidatedSpec},
    Error, Result,
};

/// Run-level error marker in the result log.
pub const RESULT_ERROR: &str = "resultError";
/// Text of the run-level error under this key.
pub const RESULT_ERROR_DETAIL: &str = "resultErrorDetail";
pub const TEST_RUN_ERROR: &str = "TEST RUN ERROR";

type Channel = Arc<Mutex<Option<broadcast::Sender<Message>>>>;

/// Identity of a run as seen by reporters.
#[derive(Debug, Clone, PartialEq)]
pub struct RunInfo {
    pub spec_id: u64,
    pub name: String,
    pub method: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub enum Message {
    Start(RunInfo),
    End(RunInfo, Box<RunRecord>),
}

/// What the caller gets back from [`Engine::build_test_run`].
#[derive(Debug)]
pub enum RunOutcome {
    /// The run finished within the wait deadline.
    Completed(RunRecord),
    /// Accepted and still processing. The record is stored once the run ends.
    Pending(PendingRun),
}

impl RunOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, RunOutcome::Pending(_))
    }

    /// Wait for the record regardless of how the call ended.
    pub async fn into_record(self) -> Result<RunRecord> {
        match self {
            RunOutcome::Completed(record) => Ok(record),
            RunOutcome::Pending(pending) => pending.wait().await,
        }
    }
}

/// Handle on a run that outlived the wait deadline. Dropping it does not cancel the run.
#[derive(Debug)]
pub struct PendingRun {
    pub spec_id: u64,
    receiver: oneshot::Receiver<RunRecord>,
}

impl PendingRun {
    pub async fn wait(self) -> Result<RunRecord> {
        let spec_id = self.spec_id;
        self.receiver.await.map_err(|_| Error::RunAborted(spec_id))
    }
}

pub struct Engine {
    client: Arc<dyn HttpClient>,
    store: Arc<dyn Store>,
    queue: RunQueue,
    wait_timeout: Duration,
    channel: Channel,
}

impl Engine {
    /// Engine with the default settings.
    pub fn new(client: Arc<dyn HttpClient>, store: Arc<dyn Store>) -> Engine {
        Engine::with_config(client, store, &EngineConfig::default())
    }

    pub fn with_config(
        client: Arc<dyn HttpClient>,
        store: Arc<dyn Store>,
        cfg: &EngineConfig,
    ) -> Engine {
        Engine {
            client,
            store,
            queue: RunQueue::new(cfg.queue_capacity),
            wait_timeout: cfg.wait_timeout,
            channel: Arc::new(Mutex::new(Some(broadcast::channel(1000).0))),
        }
    }

    /// Engine talking HTTP through [`http::Client`] with the configured request timeout.
    pub fn from_config(store: Arc<dyn Store>, cfg: &EngineConfig) -> eyre::Result<Engine> {
        masking::set_mask_sensitive(cfg.mask_sensitive);
        let client = http::Client::with_timeout(cfg.request_timeout)
            .wrap_err("failed to build the HTTP client")?;
        Ok(Engine::with_config(Arc::new(client), store, cfg))
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn queue(&self) -> &RunQueue {
        &self.queue
    }

    /// Subscribe to the channel to see the real-time run events.
    pub fn subscribe(&self) -> eyre::Result<broadcast::Receiver<Message>> {
        let Ok(guard) = self.channel.lock() else {
            eyre::bail!("failed to acquire engine channel lock");
        };
        let Some(tx) = guard.deref() else {
            eyre::bail!("engine channel has been already closed");
        };

        Ok(tx.subscribe())
    }

    /// Close the event channel. Subscribers see the end of the stream once the
    /// runs still in flight have published their last event.
    pub fn close_channel(&self) -> eyre::Result<()> {
        let Ok(mut guard) = self.channel.lock() else {
            eyre::bail!("failed to acquire engine channel lock");
        };
        guard.take();
        Ok(())
    }

    /// Execute `spec` and wait for its record up to the configured deadline.
    ///
    /// Parse and validation failures, as well as a full queue, are returned right
    /// away and leave no trace. Past the deadline the run keeps going and
    /// [`RunOutcome::Pending`] is returned.
    pub async fn build_test_run(&self, spec: &Specification) -> Result<RunOutcome> {
        info!("building test run for specification {} ({})", spec.id, spec.name);
        let tree = normalize::normalize(&spec.raw_text, spec.format)?;
        let validated = validate::validate(tree)?;

        let info = RunInfo {
            spec_id: spec.id,
            name: spec.name.clone(),
            method: validated.method.clone(),
            url: validated.url.clone(),
        };
        let key = validated.url.clone();
        let (sender, mut receiver) = oneshot::channel();
        let task = run_task(
            RunTask {
                info,
                validated,
                format: spec.format,
                client: self.client.clone(),
                store: self.store.clone(),
                channel: self.channel.clone(),
            },
            sender,
        );
        self.queue.submit(&key, task)?;

        match tokio::time::timeout(self.wait_timeout, &mut receiver).await {
            Ok(Ok(record)) => Ok(RunOutcome::Completed(record)),
            Ok(Err(_)) => Err(Error::RunAborted(spec.id)),
            Err(_) => {
                info!(
                    "specification {} still queued or running after {:?}, check the result later",
                    spec.id, self.wait_timeout
                );
                Ok(RunOutcome::Pending(PendingRun {
                    spec_id: spec.id,
                    receiver,
                }))
            }
        }
    }
}

struct RunTask {
    info: RunInfo,
    validated: ValidatedSpec,
    format: Format,
    client: Arc<dyn HttpClient>,
    store: Arc<dyn Store>,
    channel: Channel,
}

/// The unit of work queued on a lane. Persists the record, then hands it to the
/// caller if it is still listening.
async fn run_task(task: RunTask, sender: oneshot::Sender<RunRecord>) {
    let RunTask {
        info,
        validated,
        format,
        client,
        store,
        channel,
    } = task;

    if let Err(e) = publish(&channel, Message::Start(info.clone())) {
        debug!("{e:#}");
    }

    let started_at = Utc::now();
    let run = execute_run(client.as_ref(), &validated, format, info.spec_id);
    let record = match AssertUnwindSafe(run).catch_unwind().await {
        Ok(record) => record,
        Err(panic) => {
            let message = queue::panic_message(&*panic);
            error!("run of specification {} panicked: {message}", info.spec_id);
            let mut log = base_log(&validated);
            mark_error(&mut log, format!("panic: {message}"));
            RunRecord {
                spec_id: info.spec_id,
                status: RunStatus::Error,
                result_log: log,
                started_at,
                finished_at: Utc::now(),
            }
        }
    };

    info!(
        "specification {} finished with {} in {}ms",
        info.spec_id,
        record.status,
        (record.finished_at - record.started_at).num_milliseconds()
    );

    if let Err(e) = store.append_run(record.clone()).await {
        warn!("failed to store run of specification {}: {e}", info.spec_id);
    }

    if let Err(e) = publish(&channel, Message::End(info, Box::new(record.clone()))) {
        debug!("{e:#}");
    }

    if sender.send(record).is_err() {
        debug!("caller stopped waiting, run record only stored");
    }
}

/// Dispatch and check one validated specification. Never fails: a transport error
/// becomes an ERROR record.
pub async fn execute_run(
    client: &dyn HttpClient,
    validated: &ValidatedSpec,
    format: Format,
    spec_id: u64,
) -> RunRecord {
    let started_at = Utc::now();
    let mut log = base_log(validated);

    let status = match dispatch::execute(client, validated, format).await {
        Ok((response, body)) => {
            let ctx = Context {
                spec: &validated.tree,
                body: &body,
                response: &response,
            };
            check::evaluate(&ctx, &mut log, RunStatus::Pass)
        }
        Err(e) => {
            warn!("run of specification {spec_id} failed: {e}");
            mark_error(&mut log, e.to_string());
            RunStatus::Error
        }
    };

    RunRecord {
        spec_id,
        status,
        result_log: log,
        started_at,
        finished_at: Utc::now(),
    }
}

fn base_log(validated: &ValidatedSpec) -> Map<String, Value> {
    let mut log = Map::new();
    log.insert(validate::URL.into(), validated.url.clone().into());
    log.insert(validate::METHOD.into(), validated.method.clone().into());
    log
}

fn mark_error(log: &mut Map<String, Value>, detail: String) {
    log.insert(RESULT_ERROR.into(), TEST_RUN_ERROR.into());
    log.insert(RESULT_ERROR_DETAIL.into(), detail.into());
}

fn publish(channel: &Channel, msg: Message) -> eyre::Result<()> {
    let Ok(guard) = channel.lock() else {
        eyre::bail!("failed to acquire engine channel lock");
    };
    let Some(tx) = guard.deref() else {
        eyre::bail!("engine channel has been already closed");
    };

    tx.send(msg)
        .wrap_err("no subscriber is listening on the engine channel")?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        http::{Request, Response},
        store::{MemoryStore, NewSpecification},
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Instant;

    /// Answers every request after `delay` with `status` and a JSON body, or fails.
    struct StubClient {
        delay: Duration,
        status: u16,
        fail: bool,
    }

    impl StubClient {
        fn ok(status: u16) -> Arc<StubClient> {
            Arc::new(StubClient {
                delay: Duration::ZERO,
                status,
                fail: false,
            })
        }

        fn slow(delay: Duration) -> Arc<StubClient> {
            Arc::new(StubClient {
                delay,
                status: 200,
                fail: false,
            })
        }

        fn failing() -> Arc<StubClient> {
            Arc::new(StubClient {
                delay: Duration::ZERO,
                status: 0,
                fail: true,
            })
        }
    }

    #[async_trait::async_trait]
    impl HttpClient for StubClient {
        async fn send(&self, _request: Request) -> std::result::Result<Response, http::Error> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(http::Error::InvalidRequest("connection refused".into()));
            }
            Ok(Response {
                status: self.status,
                content_type: Some("application/json".into()),
                body: br#"{"id": 1}"#.to_vec(),
                ..Default::default()
            })
        }
    }

    fn config(wait: Duration, capacity: usize) -> EngineConfig {
        EngineConfig {
            wait_timeout: wait,
            queue_capacity: capacity,
            ..Default::default()
        }
    }

    async fn register(store: &MemoryStore, name: &str, raw: &str) -> eyre::Result<Specification> {
        Ok(store
            .create(NewSpecification {
                name: name.into(),
                format: crate::format::resolve(raw)?,
                raw_text: raw.into(),
            })
            .await?)
    }

    const SPEC: &str = r#"{"url": "https://api.example.com/users/1", "method": "GET", "expectedStatusCode": 200}"#;

    #[tokio::test]
    async fn completed_run_is_stored_once() -> eyre::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let spec = register(&store, "user", SPEC).await?;
        let engine = Engine::new(StubClient::ok(200), store.clone());

        let RunOutcome::Completed(record) = engine.build_test_run(&spec).await? else {
            eyre::bail!("run should complete within the deadline");
        };

        assert_eq!(record.status, RunStatus::Pass);
        assert_eq!(record.result_log["url"], json!("https://api.example.com/users/1"));
        assert_eq!(record.result_log["method"], json!("GET"));
        assert_eq!(store.runs_for(spec.id).await?, vec![record]);
        Ok(())
    }

    #[tokio::test]
    async fn failed_check_is_fail() -> eyre::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let spec = register(&store, "user", SPEC).await?;
        let engine = Engine::new(StubClient::ok(404), store.clone());

        let record = engine.build_test_run(&spec).await?.into_record().await?;
        assert_eq!(record.status, RunStatus::Fail);
        assert_eq!(
            record.result_log["statusCodeCheckResult"],
            json!({"expectedStatusCode": 200, "receivedStatusCode": 404, "result": "FAIL"})
        );
        Ok(())
    }

    #[tokio::test]
    async fn slow_run_is_pending_then_stored_once() -> eyre::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let spec = register(&store, "slow", SPEC).await?;
        let engine = Engine::with_config(
            StubClient::slow(Duration::from_millis(300)),
            store.clone(),
            &config(Duration::from_millis(50), 10),
        );

        let started = Instant::now();
        let outcome = engine.build_test_run(&spec).await?;
        assert!(started.elapsed() < Duration::from_millis(250));
        let RunOutcome::Pending(pending) = outcome else {
            eyre::bail!("run should outlive the deadline");
        };
        assert!(store.runs_for(spec.id).await?.is_empty());

        let record = pending.wait().await?;
        assert_eq!(record.status, RunStatus::Pass);
        assert_eq!(store.runs_for(spec.id).await?, vec![record]);
        Ok(())
    }

    #[tokio::test]
    async fn dropped_pending_run_still_completes() -> eyre::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let spec = register(&store, "slow", SPEC).await?;
        let engine = Engine::with_config(
            StubClient::slow(Duration::from_millis(100)),
            store.clone(),
            &config(Duration::from_millis(10), 10),
        );
        let mut rx = engine.subscribe()?;

        assert!(engine.build_test_run(&spec).await?.is_pending());

        loop {
            if let Message::End(info, _) = rx.recv().await? {
                assert_eq!(info.spec_id, spec.id);
                break;
            }
        }
        assert_eq!(store.runs_for(spec.id).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn transport_error_is_error() -> eyre::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let spec = register(&store, "down", SPEC).await?;
        let engine = Engine::new(StubClient::failing(), store.clone());

        let record = engine.build_test_run(&spec).await?.into_record().await?;
        assert_eq!(record.status, RunStatus::Error);
        assert_eq!(record.result_log[RESULT_ERROR], json!(TEST_RUN_ERROR));
        assert!(record.result_log[RESULT_ERROR_DETAIL]
            .as_str()
            .unwrap_or_default()
            .contains("connection refused"));
        assert!(!record.result_log.contains_key("statusCodeCheckResult"));
        assert_eq!(store.runs_for(spec.id).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_spec_leaves_no_trace() -> eyre::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let missing_url = register(&store, "no-url", r#"{"method": "GET"}"#).await?;
        let relative = register(&store, "relative", "url: /users\nmethod: GET").await?;
        let engine = Engine::new(StubClient::ok(200), store.clone());

        for spec in [&missing_url, &relative] {
            let result = engine.build_test_run(spec).await;
            assert!(matches!(result, Err(Error::InvalidSpec { .. })), "{result:?}");
            assert!(store.runs_for(spec.id).await?.is_empty());
        }
        assert_eq!(engine.queue().lanes(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn full_queue_is_rejected() -> eyre::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let spec = register(&store, "busy", SPEC).await?;
        let engine = Engine::with_config(
            StubClient::slow(Duration::from_millis(500)),
            store.clone(),
            &config(Duration::from_millis(20), 1),
        );

        // one running, one waiting
        let running = engine.build_test_run(&spec).await?;
        let waiting = engine.build_test_run(&spec).await?;
        assert!(running.is_pending() && waiting.is_pending());

        let rejected = engine.build_test_run(&spec).await;
        assert!(matches!(rejected, Err(Error::QueueFull { .. })), "{rejected:?}");

        running.into_record().await?;
        waiting.into_record().await?;
        assert_eq!(store.runs_for(spec.id).await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn publishes_start_and_end() -> eyre::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let spec = register(&store, "events", SPEC).await?;
        let engine = Engine::new(StubClient::ok(200), store.clone());
        let mut rx = engine.subscribe()?;

        engine.build_test_run(&spec).await?;
        engine.close_channel()?;

        let Message::Start(start) = rx.recv().await? else {
            eyre::bail!("first event should be Start");
        };
        assert_eq!(start.name, "events");
        assert_eq!(start.method, "GET");
        let Message::End(end, record) = rx.recv().await? else {
            eyre::bail!("second event should be End");
        };
        assert_eq!(end, start);
        assert_eq!(record.status, RunStatus::Pass);
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert!(engine.subscribe().is_err());
        Ok(())
    }
}
