//! Specification management and run entry points on top of a [`Store`] and an
//! [`Engine`].

use futures::future::join_all;
use std::sync::Arc;
use tracing::*;

use crate::{
    format,
    model::{RunRecord, Specification},
    runner::{Engine, RunOutcome},
    store::{NewSpecification, Store},
    Result,
};

/// Result of one specification in a batch run.
#[derive(Debug)]
pub struct BatchEntry {
    pub spec: Specification,
    pub outcome: Result<RunOutcome>,
}

pub struct Service {
    engine: Arc<Engine>,
}

impl Service {
    pub fn new(engine: Arc<Engine>) -> Service {
        Service { engine }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    fn store(&self) -> &Arc<dyn Store> {
        self.engine.store()
    }

    /// Register `raw_text` under a unique `name`. The format is resolved from the text.
    pub async fn create_spec(&self, name: &str, raw_text: &str) -> Result<Specification> {
        info!("creating specification '{name}'");
        let format = format::resolve(raw_text)?;
        let created = self
            .store()
            .create(NewSpecification {
                name: name.to_string(),
                format,
                raw_text: raw_text.to_string(),
            })
            .await?;
        info!("created specification '{name}' with id {}", created.id);
        Ok(created)
    }

    pub async fn get_spec(&self, id: u64) -> Result<Specification> {
        debug!("looking up specification {id}");
        self.store().get(id).await
    }

    pub async fn get_spec_by_name(&self, name: &str) -> Result<Specification> {
        debug!("looking up specification '{name}'");
        self.store().get_by_name(name).await
    }

    pub async fn list_specs(&self) -> Result<Vec<Specification>> {
        self.store().list().await
    }

    /// A specification with every run recorded for it so far.
    pub async fn spec_with_runs(&self, id: u64) -> Result<(Specification, Vec<RunRecord>)> {
        let spec = self.store().get(id).await?;
        let runs = self.store().runs_for(id).await?;
        Ok((spec, runs))
    }

    /// Replace the text of specification `id`, keeping its name.
    pub async fn update_spec(&self, id: u64, raw_text: &str) -> Result<Specification> {
        info!("updating specification {id}");
        let current = self.store().get(id).await?;
        self.replace(current, raw_text).await
    }

    pub async fn update_spec_by_name(&self, name: &str, raw_text: &str) -> Result<Specification> {
        info!("updating specification '{name}'");
        let current = self.store().get_by_name(name).await?;
        self.replace(current, raw_text).await
    }

    async fn replace(&self, current: Specification, raw_text: &str) -> Result<Specification> {
        let format = format::resolve(raw_text)?;
        self.store()
            .update(
                current.id,
                NewSpecification {
                    name: current.name,
                    format,
                    raw_text: raw_text.to_string(),
                },
            )
            .await
    }

    pub async fn delete_spec(&self, id: u64) -> Result<Specification> {
        info!("deleting specification {id}");
        self.store().delete(id).await
    }

    pub async fn delete_spec_by_name(&self, name: &str) -> Result<Specification> {
        info!("deleting specification '{name}'");
        let spec = self.store().get_by_name(name).await?;
        self.store().delete(spec.id).await
    }

    pub async fn run_by_id(&self, id: u64) -> Result<RunOutcome> {
        info!("running specification {id}");
        let spec = self.store().get(id).await?;
        self.engine.build_test_run(&spec).await
    }

    pub async fn run_by_name(&self, name: &str) -> Result<RunOutcome> {
        info!("running specification '{name}'");
        let spec = self.store().get_by_name(name).await?;
        self.engine.build_test_run(&spec).await
    }

    /// Run every specification with an id in `from..=to`.
    pub async fn run_range(&self, from: u64, to: u64) -> Result<Vec<BatchEntry>> {
        info!("running specifications {from} to {to}");
        let specs = self.store().list_range(from, to).await?;
        Ok(self.run_batch(specs).await)
    }

    pub async fn run_all(&self) -> Result<Vec<BatchEntry>> {
        info!("running all specifications");
        let specs = self.store().list().await?;
        Ok(self.run_batch(specs).await)
    }

    /// Submit all at once; runs sharing a URL still execute one after another.
    async fn run_batch(&self, specs: Vec<Specification>) -> Vec<BatchEntry> {
        join_all(specs.into_iter().map(|spec| async move {
            let outcome = self.engine.build_test_run(&spec).await;
            if let Err(e) = &outcome {
                warn!("specification {} was not run: {e}", spec.id);
            }
            BatchEntry { spec, outcome }
        }))
        .await
    }
}
