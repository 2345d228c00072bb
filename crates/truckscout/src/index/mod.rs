//! In-memory entity index.
//!
//! The index is published as immutable [`IndexSnapshot`]s through a
//! [`tokio::sync::watch`] channel. Writers build the next snapshot and swap it in;
//! readers clone the current `Arc` and keep a consistent view for as long as they
//! hold it, so a reader sees either the old or the new contents, never a mix.
//! Mutations are expected from a single logical owner.

use std::sync::Arc;

use ahash::AHashMap as HashMap;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use truckscout_data::{Entity, Position};

/// One indexed entity plus the position it can be ranked by.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub entity: Arc<Entity>,
    /// `None` when the entity is unlocatable (no position, or an invalid one).
    pub location: Option<Position>,
}

impl IndexEntry {
    fn new(entity: Entity) -> Self {
        let location = entity.valid_position();
        if let (None, Some(raw)) = (location, entity.position) {
            warn!(
                id = %entity.id,
                latitude = raw.latitude,
                longitude = raw.longitude,
                "Out-of-range position, entity flagged unlocatable"
            );
        }
        Self {
            entity: Arc::new(entity),
            location,
        }
    }

    pub fn is_locatable(&self) -> bool {
        self.location.is_some()
    }
}

/// An immutable view of the index contents.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    entries: Vec<IndexEntry>,
    slots: HashMap<String, usize>,
    version: u64,
}

impl IndexSnapshot {
    fn from_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let mut snapshot = Self::default();
        for entity in entities {
            snapshot.upsert(entity);
        }
        snapshot
    }

    fn upsert(&mut self, entity: Entity) {
        let entry = IndexEntry::new(entity);
        match self.slots.get(&entry.entity.id) {
            Some(&slot) => self.entries[slot] = entry,
            None => {
                self.slots.insert(entry.entity.id.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    fn remove(&mut self, id: &str) -> bool {
        let Some(slot) = self.slots.remove(id) else {
            return false;
        };
        self.entries.remove(slot);
        for entry in &self.entries[slot..] {
            if let Some(s) = self.slots.get_mut(&entry.entity.id) {
                *s -= 1;
            }
        }
        true
    }

    /// Entries in index iteration order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.slots.get(id).map(|&slot| &self.entries[slot])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bumped on every change to the contents.
    pub fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug)]
pub struct EntityIndex {
    tx: watch::Sender<Arc<IndexSnapshot>>,
}

impl Default for EntityIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityIndex {
    /// An empty index.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(IndexSnapshot::default()));
        Self { tx }
    }

    /// Swap in an entirely new set of entities.
    ///
    /// Entities without a usable position are kept but flagged unlocatable.
    /// Duplicate ids within `entities` collapse to the last occurrence.
    #[instrument(name = "Replace index contents", level = "debug", skip_all)]
    pub fn replace_all(&self, entities: impl IntoIterator<Item = Entity>) {
        let mut snapshot = IndexSnapshot::from_entities(entities);
        let entities = snapshot.len();
        let unlocatable = snapshot.entries.iter().filter(|e| !e.is_locatable()).count();
        // Numbered under the channel lock so concurrent writers never share a version.
        let mut version = 0;
        self.tx.send_modify(|current| {
            version = current.version + 1;
            snapshot.version = version;
            *current = Arc::new(snapshot);
        });
        info!(entities, unlocatable, version, "Index contents replaced");
    }

    /// Insert or overwrite by id.
    pub fn upsert(&self, entity: Entity) {
        debug!(id = %entity.id, "Upserting entity");
        self.tx.send_modify(|current| {
            let next = Arc::make_mut(current);
            next.upsert(entity);
            next.version += 1;
        });
    }

    /// Remove by id. Returns whether anything was removed; an absent id is not an error.
    pub fn remove(&self, id: &str) -> bool {
        self.tx.send_if_modified(|current| {
            if current.get(id).is_none() {
                return false;
            }
            let next = Arc::make_mut(current);
            next.remove(id);
            next.version += 1;
            true
        })
    }

    /// Every entity, in index iteration order.
    pub fn all(&self) -> Vec<Arc<Entity>> {
        self.snapshot()
            .entries
            .iter()
            .map(|e| Arc::clone(&e.entity))
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Entity>> {
        self.tx.borrow().get(id).map(|e| Arc::clone(&e.entity))
    }

    pub fn unlocatable_ids(&self) -> Vec<String> {
        self.snapshot()
            .entries
            .iter()
            .filter(|e| !e.is_locatable())
            .map(|e| e.entity.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    /// Version of the current contents; changes on every write.
    pub fn generation(&self) -> u64 {
        self.tx.borrow().version
    }

    /// The current contents. Later writes do not affect the returned snapshot.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        Arc::clone(&self.tx.borrow())
    }

    /// Be notified whenever the contents change.
    pub fn subscribe(&self) -> watch::Receiver<Arc<IndexSnapshot>> {
        self.tx.subscribe()
    }
}
