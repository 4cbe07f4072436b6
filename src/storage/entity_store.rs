use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::entity::{Article, Collection, Prompt, Record, Role, Scenario, Snapshot};
use crate::error::{PromptloomError, Result};

use super::{read_json, write_json_atomic};

pub const WORKSPACE_DIR: &str = ".promptloom";

/// Find the workspace root by walking up from the current directory looking
/// for `.promptloom/`. Falls back to the current directory.
pub fn find_workspace_root() -> PathBuf {
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let mut current = cwd.as_path();
    loop {
        if current.join(WORKSPACE_DIR).exists() {
            return current.to_path_buf();
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return cwd,
        }
    }
}

/// In-memory collections backed by one JSON file per collection.
///
/// Every mutation rewrites the affected collection file in full before
/// returning, so the durable copy never lags the in-memory one.
pub struct EntityStore {
    dir: PathBuf,
    data: Snapshot,
}

impl EntityStore {
    /// Initialize a new workspace under `root`
    pub fn init(root: &Path) -> Result<Self> {
        let dir = root.join(WORKSPACE_DIR);

        if dir.exists() {
            return Err(PromptloomError::AlreadyInitialized);
        }

        fs::create_dir_all(&dir)?;

        let store = Self {
            dir,
            data: Snapshot::default(),
        };
        for collection in Collection::ALL {
            store.persist(collection)?;
        }

        Ok(store)
    }

    /// Open an existing workspace under `root`
    pub fn open(root: &Path) -> Result<Self> {
        let dir = root.join(WORKSPACE_DIR);

        if !dir.is_dir() {
            return Err(PromptloomError::NotInitialized);
        }

        let data = Self::load(&dir);
        Ok(Self { dir, data })
    }

    /// Read the last durable snapshot. Collections that are missing or fail
    /// to decode come back empty; this never fails.
    pub fn load(dir: &Path) -> Snapshot {
        Snapshot {
            roles: load_collection(dir, Collection::Roles),
            scenarios: load_collection(dir, Collection::Scenarios),
            prompts: load_collection(dir, Collection::Prompts),
            articles: load_collection(dir, Collection::Articles),
        }
    }

    /// The workspace directory (`<root>/.promptloom`)
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.data
    }

    pub fn list<T: Record>(&self) -> &[T] {
        T::items(&self.data)
    }

    pub fn get<T: Record>(&self, id: &str) -> Option<&T> {
        T::items(&self.data).iter().find(|r| r.id() == id)
    }

    /// Look up a record by exact id, failing with `NotFound`.
    pub fn require<T: Record>(&self, id: &str) -> Result<&T> {
        self.get(id)
            .ok_or_else(|| PromptloomError::not_found(T::KIND, id))
    }

    /// Look up a record by exact id or unique id prefix.
    pub fn resolve<T: Record>(&self, id_or_prefix: &str) -> Result<&T> {
        if let Some(record) = self.get::<T>(id_or_prefix) {
            return Ok(record);
        }

        let mut matches = T::items(&self.data)
            .iter()
            .filter(|r| !id_or_prefix.is_empty() && r.id().starts_with(id_or_prefix));

        match (matches.next(), matches.next()) {
            (Some(record), None) => Ok(record),
            (Some(_), Some(_)) => Err(PromptloomError::AmbiguousId(id_or_prefix.to_string())),
            _ => Err(PromptloomError::not_found(T::KIND, id_or_prefix)),
        }
    }

    /// Swap an entire collection, e.g. after a remote pull.
    pub fn replace_all<T: Record>(&mut self, records: Vec<T>) -> Result<()> {
        *T::items_mut(&mut self.data) = records;
        self.persist(T::COLLECTION)
    }

    /// Replace every collection with the given snapshot.
    pub fn replace_snapshot(&mut self, snapshot: Snapshot) -> Result<()> {
        self.data = snapshot;
        for collection in Collection::ALL {
            self.persist(collection)?;
        }
        Ok(())
    }

    /// Insert a record, or replace the one with the same id in place.
    pub fn upsert_local<T: Record>(&mut self, record: T) -> Result<()> {
        let items = T::items_mut(&mut self.data);
        match items.iter_mut().find(|r| r.id() == record.id()) {
            Some(existing) => *existing = record,
            None => items.push(record),
        }
        self.persist(T::COLLECTION)
    }

    /// Delete a record by id along with its direct dependents (a role's
    /// scenarios, a scenario's prompts). Returns the removed record.
    pub fn remove_local<T: Record>(&mut self, id: &str) -> Result<T> {
        let items = T::items_mut(&mut self.data);
        let index = items
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| PromptloomError::not_found(T::KIND, id))?;
        let removed = items.remove(index);

        let touched = T::cascade(&mut self.data, id);
        self.persist(T::COLLECTION)?;
        for collection in touched {
            self.persist(collection)?;
        }

        Ok(removed)
    }

    /// Keep only the prompts for which `keep` returns true. Returns how many
    /// were removed.
    pub fn retain_prompts<F>(&mut self, mut keep: F) -> Result<usize>
    where
        F: FnMut(&Prompt) -> bool,
    {
        let before = self.data.prompts.len();
        self.data.prompts.retain(|p| keep(p));
        let removed = before - self.data.prompts.len();
        if removed > 0 {
            self.persist(Collection::Prompts)?;
        }
        Ok(removed)
    }

    /// Drop all local records (used on sign-out).
    pub fn clear(&mut self) -> Result<()> {
        self.replace_snapshot(Snapshot::default())
    }

    /// Write one collection to its file
    fn persist(&self, collection: Collection) -> Result<()> {
        let path = collection_path(&self.dir, collection);
        match collection {
            Collection::Roles => write_json_atomic(&path, &self.data.roles),
            Collection::Scenarios => write_json_atomic(&path, &self.data.scenarios),
            Collection::Prompts => write_json_atomic(&path, &self.data.prompts),
            Collection::Articles => write_json_atomic(&path, &self.data.articles),
        }
    }

    /// Scenarios belonging to a role, in creation order
    pub fn scenarios_for_role(&self, role_id: &str) -> Vec<&Scenario> {
        self.data
            .scenarios
            .iter()
            .filter(|s| s.role_id == role_id)
            .collect()
    }

    /// Prompts belonging to a scenario, in creation order
    pub fn prompts_for_scenario(&self, scenario_id: &str) -> Vec<&Prompt> {
        self.data
            .prompts
            .iter()
            .filter(|p| p.scenario_id == scenario_id)
            .collect()
    }

    pub fn roles(&self) -> &[Role] {
        &self.data.roles
    }

    pub fn articles(&self) -> &[Article] {
        &self.data.articles
    }
}

fn collection_path(dir: &Path, collection: Collection) -> PathBuf {
    dir.join(format!("{}.json", collection.key()))
}

fn load_collection<T: Record>(dir: &Path, collection: Collection) -> Vec<T> {
    match read_json::<Vec<T>>(&collection_path(dir, collection)) {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!("Treating {} as empty: {}", collection, e);
            Vec::new()
        }
    }
}
