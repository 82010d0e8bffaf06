//! Persistence of specifications and their run records.

use chrono::Utc;
use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::sync::RwLock;
use tracing::*;

use crate::{
    format::Format,
    model::{RunRecord, Specification},
    Error, Result,
};

/// Fields supplied when registering or replacing a specification. Identity and
/// creation time are assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSpecification {
    pub name: String,
    pub format: Format,
    pub raw_text: String,
}

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Fails with [`Error::DuplicateSpecName`] when the name is taken.
    async fn create(&self, spec: NewSpecification) -> Result<Specification>;

    async fn get(&self, id: u64) -> Result<Specification>;

    async fn get_by_name(&self, name: &str) -> Result<Specification>;

    /// Every specification, ordered by id.
    async fn list(&self) -> Result<Vec<Specification>>;

    /// Specifications whose id lies in `from..=to`, ordered by id.
    async fn list_range(&self, from: u64, to: u64) -> Result<Vec<Specification>>;

    /// Replace name, format and text of `id`, keeping its identity and creation time.
    async fn update(&self, id: u64, spec: NewSpecification) -> Result<Specification>;

    /// Remove a specification together with its run records.
    async fn delete(&self, id: u64) -> Result<Specification>;

    async fn append_run(&self, record: RunRecord) -> Result<()>;

    /// Run records of `spec_id` in the order they were appended.
    async fn runs_for(&self, spec_id: u64) -> Result<Vec<RunRecord>>;
}

#[derive(Default)]
struct Tables {
    specs: BTreeMap<u64, Specification>,
    runs: HashMap<u64, Vec<RunRecord>>,
}

impl Tables {
    fn name_taken(&self, name: &str, except: Option<u64>) -> bool {
        self.specs
            .values()
            .any(|spec| spec.name == name && Some(spec.id) != except)
    }
}

/// Store kept in process memory. Ids start at 1.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    last_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn create(&self, spec: NewSpecification) -> Result<Specification> {
        let mut tables = self.tables.write().await;
        if tables.name_taken(&spec.name, None) {
            warn!("specification with name '{}' already exists", spec.name);
            return Err(Error::DuplicateSpecName(spec.name));
        }

        let NewSpecification {
            name,
            format,
            raw_text,
        } = spec;
        let created = Specification {
            id: self.last_id.fetch_add(1, Ordering::SeqCst) + 1,
            name,
            format,
            raw_text,
            created_at: Utc::now(),
        };
        tables.specs.insert(created.id, created.clone());
        debug!("stored specification '{}' with id {}", created.name, created.id);
        Ok(created)
    }

    async fn get(&self, id: u64) -> Result<Specification> {
        self.tables
            .read()
            .await
            .specs
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::SpecNotFound(format!("id: '{id}'")))
    }

    async fn get_by_name(&self, name: &str) -> Result<Specification> {
        self.tables
            .read()
            .await
            .specs
            .values()
            .find(|spec| spec.name == name)
            .cloned()
            .ok_or_else(|| Error::SpecNotFound(format!("name: '{name}'")))
    }

    async fn list(&self) -> Result<Vec<Specification>> {
        Ok(self.tables.read().await.specs.values().cloned().collect())
    }

    async fn list_range(&self, from: u64, to: u64) -> Result<Vec<Specification>> {
        if from > to {
            return Ok(Vec::new());
        }
        Ok(self
            .tables
            .read()
            .await
            .specs
            .range(from..=to)
            .map(|(_, spec)| spec.clone())
            .collect())
    }

    async fn update(&self, id: u64, spec: NewSpecification) -> Result<Specification> {
        let mut tables = self.tables.write().await;
        if tables.name_taken(&spec.name, Some(id)) {
            warn!("specification with name '{}' already exists", spec.name);
            return Err(Error::DuplicateSpecName(spec.name));
        }
        let stored = tables
            .specs
            .get_mut(&id)
            .ok_or_else(|| Error::SpecNotFound(format!("id: '{id}'")))?;
        stored.name = spec.name;
        stored.format = spec.format;
        stored.raw_text = spec.raw_text;
        debug!("updated specification {id}");
        Ok(stored.clone())
    }

    async fn delete(&self, id: u64) -> Result<Specification> {
        let mut tables = self.tables.write().await;
        let removed = tables
            .specs
            .remove(&id)
            .ok_or_else(|| Error::SpecNotFound(format!("id: '{id}'")))?;
        tables.runs.remove(&id);
        debug!("deleted specification {id}");
        Ok(removed)
    }

    async fn append_run(&self, record: RunRecord) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.specs.contains_key(&record.spec_id) {
            warn!(
                "dropping run record of unknown specification {}",
                record.spec_id
            );
            return Err(Error::SpecNotFound(format!("id: '{}'", record.spec_id)));
        }
        tables.runs.entry(record.spec_id).or_default().push(record);
        Ok(())
    }

    async fn runs_for(&self, spec_id: u64) -> Result<Vec<RunRecord>> {
        let tables = self.tables.read().await;
        if !tables.specs.contains_key(&spec_id) {
            return Err(Error::SpecNotFound(format!("id: '{spec_id}'")));
        }
        Ok(tables.runs.get(&spec_id).cloned().unwrap_or_default())
    }
}
