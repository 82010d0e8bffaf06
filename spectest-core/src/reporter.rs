use console::{style, Term};
use eyre::WrapErr;
use tokio::sync::broadcast;
use tracing::*;

use crate::{
    model::{RunRecord, RunStatus},
    runner::{Message, RunInfo},
};

/// Reporter trait. The trait is based on the "template method" pattern.
/// You can implement on_xxx methods to hook into the engine. This way is enough for most usecases.
/// If you need more control, you can override the "run" method.
#[async_trait::async_trait]
pub trait Reporter {
    /// Consume engine events until the channel is closed.
    async fn run(&mut self, mut rx: broadcast::Receiver<Message>) -> eyre::Result<()> {
        loop {
            match rx.recv().await {
                Ok(Message::Start(info)) => {
                    self.on_start(info).await?;
                }
                Ok(Message::End(info, record)) => {
                    self.on_end(info, record).await?;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("engine channel has been closed");
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("reporter lagged behind, {skipped} events skipped");
                    continue;
                }
            }
        }

        Ok(())
    }

    /// Called when a run leaves the queue and starts executing.
    async fn on_start(&mut self, _info: RunInfo) -> eyre::Result<()> {
        Ok(())
    }

    /// Called when a run is sealed.
    async fn on_end(&mut self, _info: RunInfo, _record: Box<RunRecord>) -> eyre::Result<()> {
        Ok(())
    }
}

pub struct NullReporter;

#[async_trait::async_trait]
impl Reporter for NullReporter {}

/// Prints one line per finished run, optionally followed by its result log.
pub struct ListReporter {
    terminal: Term,
    show_log: bool,
    summary: Summary,
}

/// Number of finished runs per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
}

impl Summary {
    fn count(&mut self, status: RunStatus) {
        match status {
            RunStatus::Pass => self.passed += 1,
            RunStatus::Fail => self.failed += 1,
            RunStatus::Error => self.errored += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.errored
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }
}

impl ListReporter {
    pub fn new(show_log: bool) -> ListReporter {
        ListReporter {
            terminal: Term::stdout(),
            show_log,
            summary: Summary::default(),
        }
    }

    pub fn summary(&self) -> Summary {
        self.summary
    }
}

#[async_trait::async_trait]
impl Reporter for ListReporter {
    async fn on_end(&mut self, info: RunInfo, record: Box<RunRecord>) -> eyre::Result<()> {
        self.summary.count(record.status);

        let RunInfo {
            name, method, url, ..
        } = info;
        let elapsed = (record.finished_at - record.started_at).num_milliseconds();
        match record.status {
            RunStatus::Pass => {
                let status = style("✓").green();
                self.terminal
                    .write_line(&format!("{status} [{name}] {method} {url} ({elapsed}ms)"))?;
            }
            other => {
                let status = style("✘").red();
                self.terminal.write_line(&format!(
                    "{status} [{name}] {method} {url}: {other} ({elapsed}ms)"
                ))?;
            }
        }

        if self.show_log {
            let log = serde_json::to_string_pretty(&record.result_log)
                .wrap_err("failed to render result log")?;
            for line in log.lines() {
                write(&self.terminal, format!("    {line}"))?;
            }
        }

        Ok(())
    }
}

fn write(term: &Term, s: impl AsRef<str>) -> eyre::Result<()> {
    let colored = style(s.as_ref()).dim();
    term.write_line(&format!("{colored}"))
        .wrap_err("failed to write character on terminal")
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::Map;

    fn info(spec_id: u64) -> RunInfo {
        RunInfo {
            spec_id,
            name: format!("spec-{spec_id}"),
            method: "GET".into(),
            url: "https://example.com".into(),
        }
    }

    fn record(spec_id: u64, status: RunStatus) -> Box<RunRecord> {
        let now = Utc::now();
        Box::new(RunRecord {
            spec_id,
            status,
            result_log: Map::new(),
            started_at: now,
            finished_at: now,
        })
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    #[async_trait::async_trait]
    impl Reporter for Recorder {
        async fn on_start(&mut self, info: RunInfo) -> eyre::Result<()> {
            self.events.push(format!("start {}", info.spec_id));
            Ok(())
        }

        async fn on_end(&mut self, info: RunInfo, record: Box<RunRecord>) -> eyre::Result<()> {
            self.events.push(format!("end {} {}", info.spec_id, record.status));
            Ok(())
        }
    }

    #[tokio::test]
    async fn dispatches_until_closed() -> eyre::Result<()> {
        let (tx, rx) = broadcast::channel(16);
        tx.send(Message::Start(info(1)))?;
        tx.send(Message::End(info(1), record(1, RunStatus::Fail)))?;
        drop(tx);

        let mut reporter = Recorder::default();
        reporter.run(rx).await?;
        assert_eq!(reporter.events, vec!["start 1", "end 1 FAIL"]);
        Ok(())
    }

    #[tokio::test]
    async fn list_reporter_counts_statuses() -> eyre::Result<()> {
        let (tx, rx) = broadcast::channel(16);
        tx.send(Message::End(info(1), record(1, RunStatus::Pass)))?;
        tx.send(Message::End(info(2), record(2, RunStatus::Fail)))?;
        tx.send(Message::End(info(3), record(3, RunStatus::Error)))?;
        drop(tx);

        let mut reporter = ListReporter::new(true);
        reporter.run(rx).await?;
        let summary = reporter.summary();
        assert_eq!(
            summary,
            Summary {
                passed: 1,
                failed: 1,
                errored: 1
            }
        );
        assert_eq!(summary.total(), 3);
        assert!(!summary.all_passed());
        Ok(())
    }

    #[tokio::test]
    async fn null_reporter_drains() -> eyre::Result<()> {
        let (tx, rx) = broadcast::channel(4);
        tx.send(Message::Start(info(1)))?;
        drop(tx);
        NullReporter.run(rx).await
    }
}
